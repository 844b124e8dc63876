//! Per-user directory of profiles, encrypted secrets, and uploaded files.
//!
//! This module is the single owner of durable user state. It holds three
//! logical collections, all keyed by the provider-issued subject id:
//!
//! - `users` — profile plus the storage-root descriptor
//! - `secrets` — the encrypted long-lived refresh credential
//! - `files` — uploaded-file references, nested under the owning user
//!
//! Writes are merge-style upserts; reads are point lookups. Refresh
//! credentials are encrypted with AES-256-GCM before they reach the store
//! and decrypted on the way out.
//!
//! # Security
//!
//! - Refresh credentials are never stored in plaintext
//! - Each secret has a unique nonce (never reused)
//! - Master key must be 32 bytes (256 bits), kept in memory only

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod encryption;
mod store;

pub use encryption::{decrypt, decrypt_secret, encrypt, validate_key, EncryptedSecret};
pub use store::DirectoryStore;

/// Sentinel storage root for users whose folder has not been provisioned.
/// The provider treats it as an alias for the account's top level.
pub const DEFAULT_ROOT_FOLDER_ID: &str = "root";

/// Display path paired with the sentinel root.
pub const DEFAULT_ROOT_PATH: &str = "/";

/// Storage-root descriptor nested in a user record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DriveRoot {
    /// Provider-assigned folder id, or the `"root"` sentinel.
    #[serde(rename = "rootFolderId")]
    pub folder_id: String,

    /// Derived display path (`/<folder name>`), or `"/"`.
    #[serde(rename = "rootPath")]
    pub path: String,
}

impl Default for DriveRoot {
    fn default() -> Self {
        Self {
            folder_id: DEFAULT_ROOT_FOLDER_ID.to_string(),
            path: DEFAULT_ROOT_PATH.to_string(),
        }
    }
}

impl DriveRoot {
    /// True while no real folder has been provisioned for this user.
    pub fn is_default(&self) -> bool {
        self.folder_id == DEFAULT_ROOT_FOLDER_ID
    }
}

/// A user profile record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserRecord {
    /// Provider-issued subject id (document key).
    pub sub: String,

    /// Email as reported by the identity provider.
    pub email: Option<String>,

    /// Display name as reported by the identity provider.
    pub name: Option<String>,

    /// Storage-root descriptor. Assigned at most once; never overwritten
    /// once non-default.
    pub drive: DriveRoot,

    /// Set on first write, immutable afterwards.
    pub created_at: DateTime<Utc>,

    /// Refreshed on every upsert.
    pub updated_at: DateTime<Utc>,
}

/// An uploaded-file reference, nested under the owning user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Provider-assigned file id (document key).
    pub id: String,

    /// Browser-view link, when the provider returned one.
    #[serde(rename = "webViewLink")]
    pub web_view_link: Option<String>,

    /// Logical destination path supplied by the client.
    pub path: String,

    /// Display file name as stored at the provider.
    #[serde(rename = "fileName")]
    pub file_name: String,
}

/// A stored secret record, as persisted (still encrypted).
#[derive(Clone, Debug)]
pub struct SecretRecord {
    pub secret: EncryptedSecret,
    pub updated_at: DateTime<Utc>,
}
