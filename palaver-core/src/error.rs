use thiserror::Error;

#[derive(Error, Debug)]
pub enum PalaverError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("AI service error: {0}")]
    Ai(#[from] crate::ai::AiError),
}
