use std::path::PathBuf;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input image: {0}")]
    InvalidInput(String),
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    /// The recognizer's own error, passed through untouched.
    #[error("recognizer failed")]
    Recognizer(#[source] BoxError),
    #[error("failed to parse font file {}", path.display())]
    Font { path: PathBuf },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
