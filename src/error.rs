pub type ForgeResult<T> = Result<T, ForgeError>;

#[derive(thiserror::Error, Debug)]
pub enum ForgeError {
    #[error("batch input error: {0}")]
    BatchInput(String),

    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("unsupported animation '{0}'")]
    UnsupportedAnimation(String),

    #[error("service error: {0}")]
    Service(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ForgeError {
    pub fn batch_input(msg: impl Into<String>) -> Self {
        Self::BatchInput(msg.into())
    }

    pub fn missing_input(msg: impl Into<String>) -> Self {
        Self::MissingInput(msg.into())
    }

    pub fn service(msg: impl Into<String>) -> Self {
        Self::Service(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}
