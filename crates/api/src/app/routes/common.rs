use axum::response::Response;

use accessgate_core::DomainResult;

use crate::app::errors;

/// Validate an identifier taken from the URL path (400 on a malformed id).
pub fn parse_id<T>(raw: &str, parse: fn(&str) -> DomainResult<T>) -> Result<T, Response> {
    parse(raw).map_err(errors::domain_error_to_response)
}
