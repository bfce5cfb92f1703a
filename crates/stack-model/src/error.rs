use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} cannot be empty")]
    EmptyField(&'static str),
    #[error("host name \"{0}\" is reserved for the local machine")]
    ReservedName(String),
    #[error("invalid port \"{0}\": expected a number between 0 and 65535")]
    InvalidPort(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("host {0} already exists")]
    Duplicate(String),
    #[error("host {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

#[derive(Debug, Error)]
pub enum StatusParseError {
    #[error("invalid compose ps output: {0}")]
    Json(#[from] serde_json::Error),
}
