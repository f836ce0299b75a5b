use thiserror::Error;

/// Client pool errors
#[derive(Debug, Error)]
pub enum PoolError {
    /// The factory failed to construct a client
    #[error("Failed to create client for {service_name}: {message}")]
    ClientCreation {
        service_name: String,
        message: String,
    },

    /// Service name rejected before construction
    #[error("Invalid service name: {0:?}")]
    InvalidServiceName(String),
}

impl PoolError {
    pub fn client_creation(service_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ClientCreation {
            service_name: service_name.into(),
            message: message.into(),
        }
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
