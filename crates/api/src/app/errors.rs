use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use accessgate_core::DomainError;

/// Handler result: both arms are complete HTTP responses.
pub type ApiResult = Result<Response, Response>;

pub fn status_for(err: &DomainError) -> StatusCode {
    match err {
        DomainError::Validation(_) => StatusCode::BAD_REQUEST,
        DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::Conflict(_) | DomainError::InvalidState(_) => StatusCode::CONFLICT,
        DomainError::PolicyViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DomainError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::warn!(error = %err, "engine unavailable");
    }
    json_error(status, err.code(), err.to_string())
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn forbidden(message: impl Into<String>) -> Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_statuses() {
        let cases = [
            (DomainError::validation("x"), StatusCode::BAD_REQUEST),
            (DomainError::not_found("role", "ROLE_X"), StatusCode::NOT_FOUND),
            (DomainError::conflict("x"), StatusCode::CONFLICT),
            (DomainError::invalid_state("x"), StatusCode::CONFLICT),
            (DomainError::policy("x"), StatusCode::UNPROCESSABLE_ENTITY),
            (DomainError::unavailable("x"), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(status_for(&err), status, "{err}");
            assert_eq!(domain_error_to_response(err).status(), status);
        }
    }
}
