use crate::sensors::SensorType;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum ServiceError {
    #[error("No {0} sensor available on this device")]
    SensorUnavailable(SensorType),

    #[error("Sensor provider is not available")]
    ProviderUnavailable,

    #[error("Service has already been destroyed")]
    AlreadyDestroyed,

    #[error("Listener '{listener}' failed to handle broadcast on {channel}: {reason}")]
    PublishFailure {
        listener: String,
        channel: String,
        reason: String,
    },

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
