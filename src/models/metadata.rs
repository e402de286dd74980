//! Represents user-defined metadata associated with files.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Maximum length of a metadata key.
pub const METADATA_KEY_MAX_LEN: usize = 50;

/// Maximum length of a metadata value.
pub const METADATA_VALUE_MAX_LEN: usize = 255;

/// Key-value metadata entry attached to a file.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct FileMetadata {
    /// Reference to the associated file.
    pub file_id: Uuid,

    /// Metadata key (e.g., "author").
    pub key: String,

    /// Metadata value as plain text.
    pub value: String,
}
