//! Tunnel lifecycle error types.

use std::fmt::Write;

use crate::api::types::{BASE_ERRORS, FieldErrors};
use crate::api::{ApiError, ErrorEnvelope};

const LIMIT_REACHED: [&str; 2] = ["limit_reached", "tunnel_limit_reached"];
const TRIAL_EXPIRED: &str = "trial_expired";
const ACCOUNT_SUSPENDED: &str = "account_suspended";

/// Heading of the aggregated validation message.
pub const VALIDATION_HEADING: &str =
    "We were unable to create your tunnel for the following reasons: ";

/// Errors from tunnel operations on the control API.
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    /// The request was rejected; `message` aggregates every reason given.
    #[error("{message}")]
    Validation {
        message: String,
        field_errors: FieldErrors,
    },

    #[error("{0}")]
    LimitReached(String),

    #[error("{0}")]
    TrialExpired(String),

    #[error("{0}")]
    AccountSuspended(String),

    #[error("Tunnel not found")]
    NotFound,

    #[error(transparent)]
    Api(ApiError),
}

impl TunnelError {
    /// Classify a control API failure.
    pub fn from_api(err: ApiError) -> Self {
        match err {
            ApiError::Rejected { envelope, .. } => Self::from_envelope(envelope),
            ApiError::NotFound => Self::NotFound,
            other => Self::Api(other),
        }
    }

    fn from_envelope(envelope: ErrorEnvelope) -> Self {
        let kind = envelope.kind.to_ascii_lowercase();
        if LIMIT_REACHED.contains(&kind.as_str()) {
            Self::LimitReached(envelope.message)
        } else if kind == TRIAL_EXPIRED {
            Self::TrialExpired(envelope.message)
        } else if kind == ACCOUNT_SUSPENDED {
            Self::AccountSuspended(envelope.message)
        } else {
            Self::Validation {
                message: validation_message(&envelope),
                field_errors: envelope.field_errors,
            }
        }
    }
}

/// Aggregate every reason in an error envelope: base-level errors first on
/// one line, then one `<field> <message>` line per field error in the order
/// the server sent them.
pub fn validation_message(envelope: &ErrorEnvelope) -> String {
    let mut message = format!("{VALIDATION_HEADING}\n");

    if let Some(base) = envelope.field_errors.get(BASE_ERRORS) {
        let _ = writeln!(message, " {}", base.join(", "));
    }
    for (field, reasons) in envelope.field_errors.iter() {
        if field == BASE_ERRORS {
            continue;
        }
        for reason in reasons {
            let _ = writeln!(message, " {field} {reason}");
        }
    }
    if envelope.field_errors.is_empty() && !envelope.message.is_empty() {
        let _ = writeln!(message, " {}", envelope.message);
    }
    message
}

/// The tunnel never reported ready within the polling bound.
#[derive(Debug, thiserror::Error)]
#[error("Tunnel {id} did not become ready after {attempts} status checks")]
pub struct TunnelUnreachable {
    pub id: String,
    pub attempts: u32,
}
