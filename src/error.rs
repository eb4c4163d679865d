use thiserror::Error;

/// Error taxonomy of the renderer core.
///
/// Field loading and transfer function editing problems are recoverable;
/// everything below the data path (GPU calls, shader builds, texture limits)
/// is treated as fatal by the renderer driver.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("bad field header: {0}")]
    BadHeader(String),

    #[error("bad field data: {0}")]
    BadFieldData(String),

    #[error("cannot exceed limit of {limit} textures")]
    TextureLimitExceeded { limit: usize },

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("shader compilation failed: {0}")]
    ShaderCompile(String),

    #[error("shader linking failed: {0}")]
    ShaderLink(String),

    #[error("unknown resource name: {0}")]
    UnknownName(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
