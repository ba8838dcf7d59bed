use thiserror::Error;

/// Failures surfaced to callers of the store, auth, ingestion and conversion
/// operations. Scraping-side faults never show up here: they are absorbed
/// into the ingestion counts.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Could not validate credentials")]
    Unauthorized,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl TrackerError {
    /// Same message whether the row is missing or belongs to someone else.
    pub fn not_found(entity: &str, id: i64) -> Self {
        TrackerError::NotFound(format!("{} #{} not found", entity, id))
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;

/// Rejects empty or whitespace-only required text, returning it trimmed.
pub fn require_text(field: &str, value: &str) -> TrackerResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TrackerError::Validation(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}
