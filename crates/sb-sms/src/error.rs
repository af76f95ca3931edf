//! Error types for sb-sms

use thiserror::Error;

/// sb-sms error type
#[derive(Error, Debug)]
pub enum SmsError {
    #[error("SMS gateway URL not set")]
    GatewayNotConfigured,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SMS gateway returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("delivery failed after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

impl From<SmsError> for sb_core::Error {
    fn from(err: SmsError) -> Self {
        match err {
            SmsError::Exhausted { attempts } => sb_core::Error::DeliveryExhausted { attempts },
            SmsError::GatewayNotConfigured => sb_core::Error::Config(err.to_string()),
            other => sb_core::Error::TransientDelivery(other.to_string()),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, SmsError>;
