//! Shared types used by every Cortex control-plane crate: the error
//! taxonomy and the host descriptor consumed by variant matching.

mod error;
mod host;

pub use error::{Error, ErrorEnvelope, ErrorKind, Result};
pub use host::{HostDescriptor, SimdLevel};
