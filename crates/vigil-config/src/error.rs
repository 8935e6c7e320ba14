use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config load failed: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
