//! Polling loops feeding the session file.
//!
//! Each loop owns its device or socket, ticks at its own rate, and exits at the next
//! tick after the run flag is cleared.

pub mod force;
pub mod temperature;
pub mod velocity;

pub use force::{echo_line, ForceLoop};
pub use temperature::TemperatureLoop;
pub use velocity::VelocityLoop;
