use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
  #[error("Codec: {0}")]
  Codec(String),

  #[error("Invalid key: {0}")]
  InvalidKey(String),

  #[error("Configuration: {0}")]
  Configuration(String),

  #[error("IO: {0}")]
  Io(#[from] std::io::Error),

  #[error("TOML: {0}")]
  Toml(#[from] toml::de::Error),
}

impl Error {
  pub fn codec(msg: impl Into<String>) -> Self {
    Self::Codec(msg.into())
  }

  pub fn invalid_key(msg: impl Into<String>) -> Self {
    Self::InvalidKey(msg.into())
  }

  pub fn configuration(msg: impl Into<String>) -> Self {
    Self::Configuration(msg.into())
  }
}

pub type Result<T> = std::result::Result<T, Error>;
