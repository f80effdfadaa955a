use lambda_http::http::HeaderValue;
use lambda_http::{Body, Response};

const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization";
const MAX_AGE: &str = "3600";

/// Add CORS headers to a response.
///
/// An origin that is not a valid header value falls back to `*`.
pub fn add_cors_headers(mut response: Response<Body>, allowed_origin: &str) -> Response<Body> {
    let headers = response.headers_mut();

    let origin =
        HeaderValue::from_str(allowed_origin).unwrap_or_else(|_| HeaderValue::from_static("*"));

    headers.insert("Access-Control-Allow-Origin", origin);
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    headers.insert("Access-Control-Max-Age", HeaderValue::from_static(MAX_AGE));

    response
}

/// 200 with CORS headers and an empty body, for OPTIONS requests
pub fn preflight_response(allowed_origin: &str) -> Response<Body> {
    add_cors_headers(Response::new(Body::Empty), allowed_origin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_cors_headers() {
        let response = add_cors_headers(Response::new(Body::Empty), "https://example.com");

        let headers = response.headers();
        assert_eq!(
            headers.get("Access-Control-Allow-Origin").unwrap(),
            "https://example.com"
        );
        assert_eq!(
            headers.get("Access-Control-Allow-Methods").unwrap(),
            ALLOW_METHODS
        );
        assert_eq!(
            headers.get("Access-Control-Allow-Headers").unwrap(),
            ALLOW_HEADERS
        );
        assert_eq!(headers.get("Access-Control-Max-Age").unwrap(), "3600");
    }

    #[test]
    fn test_invalid_origin_falls_back_to_wildcard() {
        let response = add_cors_headers(Response::new(Body::Empty), "bad\norigin");
        assert_eq!(
            response.headers().get("Access-Control-Allow-Origin").unwrap(),
            "*"
        );
    }

    #[test]
    fn test_preflight_response() {
        let response = preflight_response("*");

        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers().get("Access-Control-Allow-Origin").unwrap(),
            "*"
        );
        assert!(matches!(response.body(), Body::Empty));
    }

    #[test]
    fn test_cors_headers_preserve_existing_response() {
        let mut response = Response::new(Body::Text(r#"{"error":"NOT_FOUND"}"#.to_string()));
        *response.status_mut() = lambda_http::http::StatusCode::NOT_FOUND;
        response.headers_mut().insert(
            "Content-Type",
            HeaderValue::from_static("application/json"),
        );

        let response = add_cors_headers(response, "https://test.com");

        assert_eq!(response.status(), 404);
        assert_eq!(
            response.headers().get("Content-Type").unwrap(),
            "application/json"
        );
        assert_eq!(
            response.headers().get("Access-Control-Allow-Origin").unwrap(),
            "https://test.com"
        );
    }
}
