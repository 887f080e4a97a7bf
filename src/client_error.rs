use crate::response::CrmErrorPayload;
use reqwest::StatusCode;
use thiserror::Error;

/// Various errors returned while talking to the amoCRM REST API.
#[derive(Debug, Error)]
pub enum CrmRequestError {
    /// The request never produced an HTTP response (DNS, connect, TLS, body read...).
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    /// amoCRM answered with a 4xx/5xx status. `message` is the payload's hint when
    /// there is one.
    #[error("{message}")]
    Api {
        status: StatusCode,
        payload: Option<CrmErrorPayload>,
        message: String,
    },

    /// The response body could not be decoded into the expected type.
    #[error("unexpected response from CRM: {0}")]
    Decode(#[from] serde_json::Error),

    /// Query parameters could not be encoded.
    #[error("could not encode query: {0}")]
    Encode(#[from] serde_urlencoded::ser::Error),

    /// The request path could not be joined with the base URL.
    #[error("invalid CRM path {path:?}: {source}")]
    Path {
        path: String,
        source: url::ParseError,
    },

    /// A body was required but the CRM answered with an empty one (e.g. `204 No Content`).
    #[error("CRM returned an empty response body")]
    EmptyBody,

    /// The CRM answered but the expected `_embedded` collection was empty.
    #[error("CRM response carried no {0}")]
    MissingEmbedded(&'static str),

    /// No credential has been installed yet.
    #[error("not authenticated with the CRM")]
    NotAuthenticated,

    /// The credential could not be refreshed and the process is no longer authenticated.
    #[error("authentication with the CRM was lost: {0}")]
    AuthenticationLost(String),
}

impl CrmRequestError {
    /// Build the error for a non-success response from its status and raw body.
    pub fn from_response(status: StatusCode, body: &[u8]) -> CrmRequestError {
        let payload = CrmErrorPayload::from_body(body);
        let message = match &payload {
            Some(payload) => payload.message(),
            None => {
                let text = String::from_utf8_lossy(body);
                let text = text.trim();
                if text.is_empty() {
                    status.to_string()
                } else {
                    format!("{}: {}", status, text)
                }
            }
        };

        CrmRequestError::Api {
            status,
            payload,
            message,
        }
    }

    /// HTTP status reported by the CRM, if the request got that far.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            CrmRequestError::Api { status, .. } => Some(*status),
            CrmRequestError::Transport(error) => error.status(),
            _ => None,
        }
    }

    /// The CRM's `hint`, when it sent one.
    pub fn hint(&self) -> Option<&str> {
        match self {
            CrmRequestError::Api {
                payload: Some(payload),
                ..
            } => payload.hint.as_deref(),
            _ => None,
        }
    }

    /// Whether the failure is about the credential rather than the request itself.
    pub fn is_auth(&self) -> bool {
        match self {
            CrmRequestError::NotAuthenticated | CrmRequestError::AuthenticationLost(_) => true,
            CrmRequestError::Api { status, .. } => *status == StatusCode::UNAUTHORIZED,
            _ => false,
        }
    }
}
