use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use accessgate_core::PrincipalId;

use crate::app::errors;
use crate::context::CallerContext;

pub const PRINCIPAL_HEADER: &str = "x-principal-id";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Derive the [`CallerContext`] from the gateway headers.
///
/// Authentication happens upstream; a missing or malformed principal header
/// is rejected with 401.
pub async fn caller_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let principal = extract_principal(req.headers()).map_err(|message| {
        errors::json_error(StatusCode::UNAUTHORIZED, "unauthenticated", message)
    })?;
    let source = extract_source(req.headers());

    req.extensions_mut().insert(CallerContext::new(principal, source));
    Ok(next.run(req).await)
}

fn extract_principal(headers: &HeaderMap) -> Result<PrincipalId, String> {
    let header = headers
        .get(PRINCIPAL_HEADER)
        .ok_or_else(|| format!("missing {PRINCIPAL_HEADER} header"))?;

    let value = header
        .to_str()
        .map_err(|_| format!("{PRINCIPAL_HEADER} is not valid text"))?
        .trim();

    PrincipalId::parse(value).map_err(|e| e.to_string())
}

/// First hop of `x-forwarded-for` (the original client).
fn extract_source(headers: &HeaderMap) -> Option<String> {
    headers
        .get(FORWARDED_FOR_HEADER)?
        .to_str()
        .ok()?
        .split(',')
        .map(str::trim)
        .find(|hop| !hop.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn principal_header_is_required_and_validated() {
        assert!(extract_principal(&headers(&[])).is_err());
        assert!(extract_principal(&headers(&[(PRINCIPAL_HEADER, "not a name")])).is_err());
        assert_eq!(
            extract_principal(&headers(&[(PRINCIPAL_HEADER, " john.doe ")])).unwrap(),
            PrincipalId::new("john.doe")
        );
    }

    #[test]
    fn source_is_first_forwarded_hop() {
        let h = headers(&[(FORWARDED_FOR_HEADER, "192.168.1.100, 10.0.0.1")]);
        assert_eq!(extract_source(&h).as_deref(), Some("192.168.1.100"));
        assert_eq!(extract_source(&headers(&[])), None);
    }
}
