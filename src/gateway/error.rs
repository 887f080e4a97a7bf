//! Mapping of gateway failures onto HTTP responses.
//!
//! Validation problems are the caller's fault (400). A lost or missing credential means
//! the gateway cannot serve anything until an operator intervenes (503). Every other
//! CRM failure is reported as a bad gateway (502) with the CRM's hint, when it sent one.

use crate::client_error::CrmRequestError;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

/// Malformed or missing inbound parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing parameters")]
    MissingParameters,

    #[error("Wrong ID of contact")]
    WrongContactId,

    #[error("Wrong ID of lead")]
    WrongLeadId,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Crm(#[from] CrmRequestError),
}

/// JSON body of every error response.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Crm(crm) if crm.is_auth() => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Crm(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let hint = match self {
            GatewayError::Validation(_) => None,
            GatewayError::Crm(crm) if crm.is_auth() => {
                error!(error = %crm, "CRM credential unusable");
                crm.hint().map(String::from)
            }
            GatewayError::Crm(crm) => {
                warn!(error = %crm, "CRM request failed");
                crm.hint().map(String::from)
            }
        };

        HttpResponse::build(self.status_code()).json(ErrorBody {
            description: self.to_string(),
            hint,
        })
    }
}
