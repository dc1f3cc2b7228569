//! Real-time acquisition core for ultrasonic anemometers.
//!
//! Reads ASCII frames from a uSonic-3 (3D, UVWT plus optional analog
//! blocks) or uSonic-2 (2D, UVTQ) sonic over a serial link at ~10 Hz,
//! time-stamps and appends them to hourly binary raw files, dispatches an
//! external post-processor over completed intervals, and keeps a circular
//! window of recent samples from which multi-depth turbulence statistics
//! and Lagrangian particle outputs (forward plume, backward footprint)
//! are produced.

pub mod acquisition;
pub mod buffer;
pub mod config;
pub mod decode;
pub mod dispatch;
pub mod error;
pub mod particles;
pub mod stats;
pub mod timing;
