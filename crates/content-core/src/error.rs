//! Error types for content ingestion.

/// Error type for content model operations.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    /// The payload could not be parsed as JSON of the expected shape
    #[error("Failed to parse content payload: {0}")]
    Json(#[from] serde_json::Error),

    /// `sys.type` is not one of Entry, Asset, DeletedEntry, DeletedAsset
    #[error("Unsupported item type '{kind}' for item '{id}'")]
    UnsupportedKind { id: String, kind: String },

    /// An Entry arrived without `sys.contentType.sys.id`
    #[error("Entry '{0}' has no content type")]
    MissingContentType(String),

    /// An asset sub-object is missing a required key or has the wrong type
    #[error("Asset file is missing required key '{0}'")]
    AssetShape(&'static str),
}
