use thiserror::Error;

#[derive(Debug, Error)]
pub enum WardenError {
    #[error("docker binary unavailable: {0}")]
    MissingDockerBinary(String),
    #[error("compose directory invalid: {0}")]
    InvalidComposeDir(String),
    #[error("config file invalid or unreadable: {0}")]
    InvalidConfig(String),
}
