//! Math utilities for the differential-drive bot.
//!
//! This module maps the scalar control effort onto the two drive wheels.

pub mod mixing;
