//! Error handling for the web layer.
//! Errors from lower layers are translated here so that `web` can return
//! appropriate HTTP status codes and the short machine-readable reason
//! tokens clients key off of. Nothing beyond the token leaks into a
//! response body.
use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use domain::error::{AccessErrorKind, DomainErrorKind, Error as DomainError};

use log::*;

#[derive(Debug)]
pub enum Error {
    Domain(DomainError),
    Web(WebErrorKind),
}

#[derive(Debug)]
pub enum WebErrorKind {
    /// Malformed JSON, missing required field, or malformed channel.
    BadRequest,
    NotFound,
    Other,
}

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

fn reason(status: StatusCode, token: &'static str) -> Response {
    (status, Json(json!({ "error": token }))).into_response()
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::Domain(ref domain_error) => self.handle_domain_error(domain_error),
            Error::Web(ref web_error_kind) => self.handle_web_error(web_error_kind),
        }
    }
}

impl Error {
    fn handle_domain_error(&self, domain_error: &DomainError) -> Response {
        match domain_error.error_kind {
            DomainErrorKind::Access(AccessErrorKind::Unauthenticated) => {
                warn!(
                    "AccessErrorKind::Unauthenticated: Responding with 401 Unauthorized. Error: {self:?}"
                );
                reason(StatusCode::UNAUTHORIZED, "unauthenticated")
            }
            DomainErrorKind::Access(AccessErrorKind::UnauthorizedService) => {
                warn!(
                    "AccessErrorKind::UnauthorizedService: Responding with 403 Forbidden. Error: {self:?}"
                );
                reason(StatusCode::FORBIDDEN, "unauthorized_service")
            }
            DomainErrorKind::Internal(ref internal_error_kind) => {
                warn!(
                    "InternalErrorKind::{internal_error_kind:?}: Responding with 500 Internal Server Error. Error: {self:?}"
                );
                reason(StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        }
    }

    fn handle_web_error(&self, web_error_kind: &WebErrorKind) -> Response {
        match web_error_kind {
            WebErrorKind::BadRequest => {
                warn!("WebErrorKind::BadRequest: Responding with 400 Bad Request. Error: {self:?}");
                reason(StatusCode::BAD_REQUEST, "bad_request")
            }
            WebErrorKind::NotFound => {
                debug!("WebErrorKind::NotFound: Responding with 404 Not Found");
                reason(StatusCode::NOT_FOUND, "not_found")
            }
            WebErrorKind::Other => {
                warn!(
                    "WebErrorKind::Other: Responding with 500 Internal Server Error. Error: {self:?}"
                );
                reason(StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        }
    }
}

impl<E> From<E> for Error
where
    E: Into<DomainError>,
{
    fn from(err: E) -> Self {
        Error::Domain(err.into())
    }
}
