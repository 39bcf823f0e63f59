#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("credential request failed: {0}")]
    Credential(String),

    #[error("voice connection failed: {0}")]
    Connection(String),

    #[error("microphone unavailable: {0}")]
    Microphone(String),

    #[error("appointment API error: {0}")]
    Api(String),

    #[error("realtime channel error: {0}")]
    Realtime(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("not found: {0}")]
    NotFound(String),
}
