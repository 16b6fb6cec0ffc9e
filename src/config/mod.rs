/// Configuration subsystem - editor options
///
/// Options come from a .vidbrc file and may be overridden on the command line.

pub mod rc;

pub use rc::{RcConfig, RcLoader};
