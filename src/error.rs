use rust_decimal::Decimal;
use thiserror::Error;

/// Why a single instrument was skipped in a run.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request for {identifier} failed: {cause:#}")]
    Request {
        identifier: String,
        cause: anyhow::Error,
    },
    #[error("no price found on the quote page of {identifier}")]
    PriceNotFound { identifier: String },
    #[error("reference price of {short_code} is zero")]
    ZeroReference { short_code: String },
    #[error("drift of {short_code} from {reference} to {current} is out of range")]
    DriftOverflow {
        short_code: String,
        current: Decimal,
        reference: Decimal,
    },
}

impl FetchError {
    pub fn request(identifier: &str, cause: anyhow::Error) -> Self {
        FetchError::Request {
            identifier: identifier.to_string(),
            cause,
        }
    }

    pub fn not_found(identifier: &str) -> Self {
        FetchError::PriceNotFound {
            identifier: identifier.to_string(),
        }
    }
}
