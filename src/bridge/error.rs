use thiserror::Error;

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("engine initialization failed (datapath: {datapath}, language: {language})")]
    Init { datapath: String, language: String },

    #[error("invalid engine mode: {0}")]
    InvalidEngineMode(i32),

    #[error("invalid page segmentation mode: {0}")]
    InvalidPageSegMode(i32),

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("engine is not initialized")]
    NotInitialized,

    #[error("engine returned no text")]
    NoText,
}
