//! Request and response types served by the compiled router

use bytes::Bytes;

pub type Request = http::Request<Bytes>;
pub type Response = http::Response<Bytes>;

fn with_body(status: u16, content_type: &str, body: impl Into<Bytes>) -> Response {
    let mut response = http::Response::new(body.into());
    *response.status_mut() =
        http::StatusCode::from_u16(status).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
    if let Ok(value) = http::HeaderValue::from_str(content_type) {
        response.headers_mut().insert(http::header::CONTENT_TYPE, value);
    }
    response
}

/// Plain text response
pub fn text(body: impl Into<String>) -> Response {
    with_body(200, "text/plain", body.into())
}

/// JSON response from a `serde_json::Value`
pub fn json(body: serde_json::Value) -> Response {
    with_body(200, "application/json", body.to_string())
}

/// JSON error body with the given status
pub fn error(status: u16, message: &str) -> Response {
    with_body(
        status,
        "application/json",
        serde_json::json!({ "message": message }).to_string(),
    )
}

pub fn not_found() -> Response {
    error(404, "Not Found")
}

/// Request with an empty body, mostly for tests and introspection
pub fn request(method: http::Method, path: &str) -> Request {
    let mut request = http::Request::new(Bytes::new());
    *request.method_mut() = method;
    if let Ok(uri) = path.parse() {
        *request.uri_mut() = uri;
    }
    request
}
