//! The Thread/Message Repository (C7): owns all on-disk thread and message
//! state under `<data>/threads/`; mutation happens only through this crate.

pub mod layout;
pub mod lock;
pub mod repository;
pub mod types;

pub use repository::ThreadRepository;
pub use types::{ContentPart, Message, MessageContent, MessageRole, Metadata, MetadataValue, SortOrder, Thread};
