use thiserror::Error;

/// Result type alias for settings operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building [`Settings`](crate::Settings)
///
/// Inference itself never fails, only the configuration surface does.
#[derive(Debug, Error)]
pub enum Error {
    /// The settings document could not be deserialized
    #[error("invalid settings: {0}")]
    InvalidSettings(#[from] serde_json::Error),

    /// A free-form key collides with one of the typed proxy settings
    #[error("`{0}` is a reserved setting and cannot be set as a free-form key")]
    ReservedKey(String),
}
