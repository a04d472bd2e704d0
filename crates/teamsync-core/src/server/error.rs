//! HTTP rendering of [`TeamError`].

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{ErrorKind, TeamError};

/// Body of every non-2xx answer produced by this node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

impl IntoResponse for TeamError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        match self {
            // A forwarded failure goes back exactly as the leader sent it
            TeamError::Remote { body, .. } => {
                debug!(%status, "Relaying remote error");
                (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
            }
            other => {
                let kind = other.kind();
                if kind == ErrorKind::Internal {
                    error!(error = %other, "Request failed");
                } else {
                    debug!(error = %other, kind = kind.as_str(), "Request rejected");
                }
                let body = ErrorBody {
                    error: other.to_string(),
                    kind: kind.as_str().to_string(),
                };
                (status, Json(body)).into_response()
            }
        }
    }
}
