//! Control loop, safety interlock and drivers for a two-motor differential-drive
//! bot on no-std embedded platforms.
//!
//! For a runnable host simulation, see the `ddb-app/mock-mcu` binary.
#![cfg_attr(not(test), no_std)]

pub mod utils;
