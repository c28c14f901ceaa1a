//! Wire types shared between the transfer engine and remote store clients.

pub mod constants;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use messages::{FileHeader, UploadReceipt, UploadRequest};
pub use types::{Attribute, AttributeKind, FileAttributes, FileId, FileLocator, ParseError};
