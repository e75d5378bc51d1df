pub mod checksum;
pub mod command;
pub mod fs;
pub mod signal;

pub use checksum::ChecksumVerifier;
pub use command::{CommandRunner, SystemRunner};
pub use fs::Workspace;
pub use signal::Interrupt;
