//! Lagrangian particle engines driven by sampled turbulent winds.
//!
//! Two flavours share the fixed-capacity ring discipline of the sample
//! buffer: the forward plume advects source emissions downwind with
//! perfect ground reflection, the backward footprint releases tracer
//! particles at the sensor and advects them upwind until they ground,
//! recording where.

mod footprint;
mod plume;

pub use footprint::{Footprint, FootprintSummary};
pub use plume::{Plume, Source};

/// Largest admissible number of emission sources.
pub const MAX_SOURCES: usize = 999;
