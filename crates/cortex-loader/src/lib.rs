//! The Engine Loader (C5): loads native engine plugins via `libloading`,
//! constructs in-process adapters for remote families, and mediates access
//! through refcounted borrows so the Dispatcher never outlives an unload.

pub mod loader;
pub mod native;
pub mod plugin;
pub mod remote;

pub use loader::{BorrowedHandle, EngineLoader, FamilyMetadata, FamilySource};
pub use plugin::{EnginePlugin, EngineResult, EngineTaskId, Usage};
pub use remote::RemoteEngineConfig;
