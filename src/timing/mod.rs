//! Clock readings and time-bucket arithmetic.
//!
//! Two clocks drive the acquisition loop: a monotonic one for the
//! high-resolution sample timestamps, and the wall clock shifted by the
//! station timezone "fuse" for file naming, bucket boundaries and child
//! activation times.

mod clock;

pub use clock::{wall_from_epoch, wall_now, MonotonicClock, TimeStep, WallTime};
