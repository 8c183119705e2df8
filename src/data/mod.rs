//! Session data: row model, file naming clock, and the CSV sink.
pub mod clock;
pub mod row;
pub mod storage;

pub use clock::{FixedClock, SystemClock, WallClock};
pub use row::{ColumnLayout, LogRow, STOP_MARKER};
pub use storage::{CsvSink, SinkManager};
