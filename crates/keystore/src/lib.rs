//! Local keystore mapping remote file ids to raw key files.
//!
//! A keystore is a single directory holding an index file
//! ([`INDEX_FILE`]) and one `*.key` file per registered key. All index
//! writes go through one lock and are written atomically, so concurrent
//! workers can register keys without corrupting the index.
//!
//! Deleting keys for good goes through [`shred`], a best-effort
//! multi-pass overwrite. It does not defeat copy-on-write filesystems,
//! snapshots or flash wear levelling, where old blocks may survive.

mod error;
mod index;
mod keystore;
pub mod shred;

pub use error::KeystoreError;
pub use keystore::{Keystore, KeystoreEntry, KeystoreInfo};
pub use shred::{ShredConfig, shred_dir, shred_file};

/// Name of the index file inside a keystore directory.
pub const INDEX_FILE: &str = "keystore.json";

/// Extension of key files created by the keystore.
pub const KEY_EXTENSION: &str = "key";
