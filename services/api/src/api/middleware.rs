//! Request middleware shared by the router.
use axum::extract::Request;
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

/// Redirect plain-HTTP requests seen by the TLS-terminating proxy.
///
/// Only `X-Forwarded-Proto: http` triggers the redirect; requests without
/// the header are passed through so direct health probes keep working. The
/// target host comes from `Host`, never from `X-Forwarded-Host`.
pub async fn enforce_https(request: Request, next: Next) -> Response {
    match https_location(request.headers(), request.uri()) {
        Some(location) => (
            StatusCode::PERMANENT_REDIRECT,
            [(header::LOCATION, location)],
        )
            .into_response(),
        None => next.run(request).await,
    }
}

fn https_location(headers: &HeaderMap, uri: &axum::http::Uri) -> Option<String> {
    let proto = headers.get("x-forwarded-proto")?.to_str().ok()?;
    if !proto.trim().eq_ignore_ascii_case("http") {
        return None;
    }
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| uri.host())?;
    let path = uri
        .path_and_query()
        .map(|value| value.as_str())
        .unwrap_or("/");
    Some(format!("https://{host}{path}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Uri};

    #[test]
    fn forwarded_http_gets_https_location() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-proto", HeaderValue::from_static("http"));
        headers.insert(header::HOST, HeaderValue::from_static("api.example.com"));
        let uri: Uri = "/api/v1/expenses?limit=5".parse().unwrap();
        assert_eq!(
            https_location(&headers, &uri).as_deref(),
            Some("https://api.example.com/api/v1/expenses?limit=5")
        );
    }

    #[test]
    fn https_and_direct_requests_pass_through() {
        let uri: Uri = "/healthz".parse().unwrap();
        assert!(https_location(&HeaderMap::new(), &uri).is_none());
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        headers.insert(header::HOST, HeaderValue::from_static("api.example.com"));
        assert!(https_location(&headers, &uri).is_none());
    }

    #[test]
    fn redirect_target_ignores_forwarded_host() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-proto", HeaderValue::from_static("http"));
        headers.insert("x-forwarded-host", HeaderValue::from_static("evil.example"));
        headers.insert(header::HOST, HeaderValue::from_static("api.example.com"));
        let uri: Uri = "/api/v1/users/me".parse().unwrap();
        assert_eq!(
            https_location(&headers, &uri).as_deref(),
            Some("https://api.example.com/api/v1/users/me")
        );
    }
}
