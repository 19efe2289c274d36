//! Request descriptors, replies, and response classification.
//!
//! Classification is a pure function of method, status, and body so that the
//! status-to-error mapping can be tested without a server.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use convergence::{StatusId, TransportError};

/// Longest response-body excerpt embedded in an error message, in bytes.
pub const MAX_ERROR_BODY: usize = 2048;

/// One request: method, path relative to the endpoint, optional query and body.
///
/// Built per call and consumed by [`crate::Client::execute`].
#[derive(Debug)]
pub struct RequestDescriptor<'a, B: ?Sized = ()> {
    pub method: Method,
    pub path: &'a str,
    pub query: Vec<(String, String)>,
    pub body: Option<&'a B>,
}

impl<'a> RequestDescriptor<'a, ()> {
    /// A bodiless request.
    pub fn new(method: Method, path: &'a str) -> Self {
        Self {
            method,
            path,
            query: Vec::new(),
            body: None,
        }
    }

    /// A bodiless `GET`.
    pub fn get(path: &'a str) -> Self {
        Self::new(Method::GET, path)
    }

    /// A bodiless `DELETE`.
    pub fn delete(path: &'a str) -> Self {
        Self::new(Method::DELETE, path)
    }
}

impl<'a, B: Serialize + ?Sized> RequestDescriptor<'a, B> {
    /// A request carrying `body`, serialized as JSON before sending.
    pub fn with_body(method: Method, path: &'a str, body: &'a B) -> Self {
        Self {
            method,
            path,
            query: Vec::new(),
            body: Some(body),
        }
    }

    /// Appends query parameters.
    pub fn with_query<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

/// A successful exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    /// The deserialized body; `None` for no-content replies.
    pub value: Option<T>,
    /// HTTP status of the response.
    pub status: u16,
    /// The `Location` response header, if any.
    pub location: Option<String>,
}

impl<T> Reply<T> {
    /// Returns the body, failing if the reply had none.
    pub fn into_value(self) -> Result<T, TransportError> {
        self.value.ok_or_else(|| {
            TransportError::with_status("expected a response body but the reply had none", self.status)
        })
    }

    /// The asynchronous-task ID in a `Location` header of the form
    /// `<endpoint>/status/<id>/`.
    pub fn status_id(&self) -> Option<StatusId> {
        self.location.as_deref().and_then(status_id_from_location)
    }
}

pub(crate) fn status_id_from_location(location: &str) -> Option<StatusId> {
    let mut segments = location.split('/');
    segments.find(|s| *s == "status")?;
    segments.find(|s| !s.is_empty()).and_then(StatusId::new)
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    /// Absolute URL of the next page; absent or empty on the last one.
    #[serde(default)]
    pub next: Option<String>,
}

/// Cause attached when the server answered with a redirect.
///
/// The status endpoint of a finished task redirects to the object it created,
/// so callers polling task status treat this as completion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("request was redirected to {location}")]
pub struct Redirected {
    /// Where the redirect led.
    pub location: String,
}

/// Returns the [`Redirected`] cause of `err`, if it has one.
pub fn redirected(err: &TransportError) -> Option<&Redirected> {
    match err {
        TransportError::Generic {
            cause: Some(cause), ..
        } => cause.downcast_ref::<Redirected>(),
        _ => None,
    }
}

/// Returns `true` if `status` in reply to `method` carries no body by contract.
pub fn is_no_content(method: &Method, status: StatusCode) -> bool {
    match status {
        StatusCode::NO_CONTENT => {
            *method == Method::DELETE || *method == Method::PATCH || *method == Method::PUT
        }
        StatusCode::ACCEPTED => *method == Method::PATCH,
        _ => false,
    }
}

/// A completed exchange awaiting classification.
pub(crate) struct Exchange<'a> {
    pub method: &'a Method,
    pub url: &'a str,
    pub status: StatusCode,
    pub body: &'a [u8],
    /// Reproducible command line appended to failures in debug mode.
    pub echo: Option<&'a str>,
}

/// Maps an exchange onto the error taxonomy or a typed value.
///
/// 404 and 401 are classified before anything else, so their bodies are
/// never inspected.
pub(crate) fn classify<T: DeserializeOwned>(exchange: &Exchange<'_>) -> Result<Option<T>, TransportError> {
    let Exchange {
        method,
        url,
        status,
        body,
        echo,
    } = *exchange;

    match status {
        StatusCode::NOT_FOUND => return Err(TransportError::not_found(url)),
        StatusCode::UNAUTHORIZED => return Err(TransportError::unauthorized(url)),
        _ => {}
    }

    if !status.is_success() {
        let mut message = format!("{method} request {url} : response {status} {}", excerpt(body));
        if let Some(echo) = echo {
            message.push_str(echo);
        }
        return Err(TransportError::with_status(message, status.as_u16()));
    }

    if is_no_content(method, status) {
        return Ok(None);
    }

    // An empty body deserializes as JSON `null`, which suits `()`, `Option<_>`,
    // and `IgnoredAny` but still fails for structs.
    let payload: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        body
    };
    serde_json::from_slice(payload).map(Some).map_err(|e| TransportError::Generic {
        message: format!(
            "failed to deserialize {method} {url} response ({status}): {e}; body: {}",
            excerpt(body)
        ),
        status: Some(status.as_u16()),
        cause: Some(Box::new(e)),
    })
}

/// Lossy UTF-8 rendering of at most [`MAX_ERROR_BODY`] bytes of `body`.
pub(crate) fn excerpt(body: &[u8]) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return String::from_utf8_lossy(body).into_owned();
    }
    let mut text = String::from_utf8_lossy(&body[..MAX_ERROR_BODY]).into_owned();
    text.push_str(&format!("... ({} bytes truncated)", body.len() - MAX_ERROR_BODY));
    text
}

#[cfg(test)]
mod tests {
    use serde::de::IgnoredAny;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Dataset {
        id: String,
    }

    fn exchange<'a>(method: &'a Method, status: u16, body: &'a [u8]) -> Exchange<'a> {
        Exchange {
            method,
            url: "https://example.test/api/v2/datasets/1/",
            status: StatusCode::from_u16(status).unwrap(),
            body,
            echo: None,
        }
    }

    #[test]
    fn success_statuses_deserialize() {
        for status in [200, 201, 202, 203, 206, 299] {
            let got: Option<Dataset> = classify(&exchange(&Method::GET, status, br#"{"id":"1"}"#)).unwrap();
            assert_eq!(got, Some(Dataset { id: "1".into() }), "status {status}");
        }
    }

    #[test]
    fn not_found_and_unauthorized_ignore_body() {
        for body in [&b""[..], br#"{"message":"oops"}"#, b"<html>"] {
            let err = classify::<Dataset>(&exchange(&Method::GET, 404, body)).unwrap_err();
            assert!(err.is_not_found());
            let err = classify::<Dataset>(&exchange(&Method::POST, 401, body)).unwrap_err();
            assert!(err.is_unauthorized());
        }
    }

    #[test]
    fn other_failures_carry_method_url_status_and_body() {
        let err = classify::<Dataset>(&exchange(&Method::POST, 422, br#"{"message":"bad name"}"#))
            .unwrap_err();
        assert_eq!(err.status(), Some(422));
        let text = err.to_string();
        assert!(text.starts_with("POST request https://example.test/api/v2/datasets/1/ : response 422"));
        assert!(text.contains("bad name"));
    }

    #[test]
    fn echo_is_appended_to_failures() {
        let mut ex = exchange(&Method::GET, 500, b"boom");
        ex.echo = Some(" (curl -X GET 'x')");
        let err = classify::<Dataset>(&ex).unwrap_err();
        assert!(err.to_string().ends_with("(curl -X GET 'x')"));
    }

    #[test]
    fn no_content_replies_are_empty() {
        for (method, status) in [
            (Method::DELETE, 204),
            (Method::PATCH, 204),
            (Method::PUT, 204),
            (Method::PATCH, 202),
        ] {
            let got: Option<Dataset> = classify(&exchange(&method, status, b"")).unwrap();
            assert!(got.is_none(), "{method} {status}");
        }
    }

    #[test]
    fn accepted_post_still_deserializes() {
        assert!(!is_no_content(&Method::POST, StatusCode::ACCEPTED));
        assert!(!is_no_content(&Method::POST, StatusCode::NO_CONTENT));
        let got: Option<Dataset> = classify(&exchange(&Method::POST, 202, br#"{"id":"9"}"#)).unwrap();
        assert_eq!(got.unwrap().id, "9");
    }

    #[test]
    fn empty_success_body_suits_unit_like_shapes() {
        let got: Option<IgnoredAny> = classify(&exchange(&Method::DELETE, 200, b"")).unwrap();
        assert!(got.is_some());
        let err = classify::<Dataset>(&exchange(&Method::POST, 201, b"")).unwrap_err();
        assert!(err.to_string().contains("failed to deserialize"));
    }

    #[test]
    fn malformed_body_is_generic() {
        let err = classify::<Dataset>(&exchange(&Method::GET, 200, b"{not json")).unwrap_err();
        assert!(matches!(err, TransportError::Generic { status: Some(200), .. }));
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = vec![b'x'; MAX_ERROR_BODY + 10];
        let text = excerpt(&body);
        assert!(text.ends_with("... (10 bytes truncated)"));
    }

    #[test]
    fn status_id_comes_from_location_segment() {
        assert_eq!(
            status_id_from_location("https://app.datarobot.com/api/v2/status/abc123/")
                .unwrap()
                .as_str(),
            "abc123"
        );
        assert!(status_id_from_location("https://app.datarobot.com/api/v2/datasets/1/").is_none());
        assert!(status_id_from_location("https://app.datarobot.com/api/v2/status/").is_none());
    }

    #[test]
    fn redirected_cause_is_found() {
        let err = TransportError::Generic {
            message: "request was redirected".into(),
            status: Some(303),
            cause: Some(Box::new(Redirected {
                location: "/datasets/1/".into(),
            })),
        };
        assert_eq!(redirected(&err).unwrap().location, "/datasets/1/");
        assert!(redirected(&TransportError::generic("x")).is_none());
    }
}
