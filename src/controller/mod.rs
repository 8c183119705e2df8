//! PLC link: wire protocol, connections, command listener, and telemetry sender.

pub mod connection;
pub mod listener;
pub mod protocol;
pub mod telemetry;

pub use connection::{connect_with_retry, ControllerLinks, InboundStream, OutboundStream};
pub use listener::CommandListener;
pub use protocol::{decode_f32, encode_f32, Command, FrameAssembler};
pub use telemetry::TelemetrySender;
