#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Unknown module role: {0}")]
    UnknownRole(String),

    #[error("Invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },
}
