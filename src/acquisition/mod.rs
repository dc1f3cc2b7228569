//! Serial acquisition: port handling, hourly raw files, status snapshots,
//! the command pipe and the supervisor loop tying them together.

pub mod command;
pub mod raw_writer;
pub mod serial;
pub mod status;
pub mod supervisor;

pub use command::{Command, CommandPipe};
pub use raw_writer::HourlyRawWriter;
pub use serial::{LineRead, SonicPort};
pub use status::{Status, StatusPublisher};
pub use supervisor::{Supervisor, VariantSpec};
