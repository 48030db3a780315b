//! Error type shared by the converter and the client

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GuideError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("XML error: {0}")]
    Xml(String),
    #[error("archive error: {0}")]
    Archive(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<zip::result::ZipError> for GuideError {
    fn from(e: zip::result::ZipError) -> Self {
        GuideError::Archive(e.to_string())
    }
}

impl From<ureq::Error> for GuideError {
    fn from(e: ureq::Error) -> Self {
        GuideError::Http(e.to_string())
    }
}

impl From<toml::de::Error> for GuideError {
    fn from(e: toml::de::Error) -> Self {
        GuideError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GuideError>;
