//! Utility re-exports and helper macros for the differential-drive bot.
//!
//! - `config`: tunable constants for the control loop and interlock
//! - `connection`: gain parameter cell and the HTTP/WebSocket command server
//! - `controllers`: motor, IMU, emergency input, interlock and the control loop
//! - `math`: mapping a scalar control effort onto the two wheels
//! - `frontend`: the static index page served by the command server
//!
//! The `mk_static!` macro simplifies static initialization in no-std contexts.

pub mod config;
pub mod connection;
pub mod controllers;
pub(crate) mod frontend;
pub mod math;

pub use config::ControlConfig;
pub use connection::gain::GainParameter;
pub use connection::server::run as http;
pub use controllers::SystemController;
pub use embassy_time::*;

#[macro_export]
/// Initialize a no-std static cell and write the given value into it.
///
/// This macro creates a `static_cell::StaticCell` for type `$t` and initializes
/// it with `$val`, returning a mutable reference to the stored value.
macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        STATIC_CELL.uninit().write($val)
    }};
}
