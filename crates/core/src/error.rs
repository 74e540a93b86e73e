/// Result alias that carries the custom [`PlayerError`] type.
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Common error type for the core crate.
///
/// None of these are fatal to the host: playback failures roll state back,
/// graph failures disable the visualisation.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    /// The media element refused a start or stop request (autoplay policy,
    /// decode failure).
    #[error("playback rejected: {0}")]
    PlaybackRejected(String),
    /// The audio analysis graph could not be built or a second binding to
    /// the same element was attempted.
    #[error("audio graph unavailable: {0}")]
    GraphInitFailed(String),
    /// The current source failed to load or decode.
    #[error("failed to load `{source_url}`: {reason}")]
    LoadError { source_url: String, reason: String },
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("fft failed: {0}")]
    Fft(#[from] realfft::FftError),
}

impl PlayerError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for PlayerError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for PlayerError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
