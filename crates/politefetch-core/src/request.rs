//! Caller-facing request and result types.

use std::time::Duration;

use uuid::Uuid;

use crate::error::FetchError;
use crate::transport::{find_header, HttpMethod};

/// One outbound intent. Consumed by a single logical fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    id: Uuid,
    url: String,
    method: HttpMethod,
    extra_headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            method: HttpMethod::Get,
            extra_headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    /// Attaches a body. A plain GET becomes a POST.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        if self.method == HttpMethod::Get {
            self.method = HttpMethod::Post;
        }
        self
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Identity echoed on the matching [`FetchResult`].
    pub const fn id(&self) -> Uuid {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub const fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn extra_headers(&self) -> &[(String, String)] {
        &self.extra_headers
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }
}

/// Outcome of one logical fetch, after every internal retry.
///
/// Either `status_code` is present and `error` is absent, or `error` is
/// present. A non-2xx final response keeps its status, headers and body next
/// to the `HttpStatus` error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub request_id: Uuid,
    pub url: String,
    pub status_code: Option<u16>,
    /// Raw bytes; decoding is the caller's business.
    pub body: Vec<u8>,
    /// Ordered as received.
    pub headers: Vec<(String, String)>,
    pub elapsed: Duration,
    /// Transport attempts made, including the final one.
    pub attempts: u32,
    pub error: Option<FetchError>,
}

impl FetchResult {
    pub(crate) fn succeeded(
        request: &FetchRequest,
        status_code: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
        attempts: u32,
        elapsed: Duration,
    ) -> Self {
        Self {
            request_id: request.id,
            url: request.url.clone(),
            status_code: Some(status_code),
            body,
            headers,
            elapsed,
            attempts,
            error: None,
        }
    }

    pub(crate) fn failed(request: &FetchRequest, error: FetchError, elapsed: Duration) -> Self {
        Self {
            request_id: request.id,
            url: request.url.clone(),
            status_code: None,
            body: Vec::new(),
            headers: Vec::new(),
            elapsed,
            attempts: error.attempts(),
            error: Some(error),
        }
    }

    /// Terminal non-2xx answer: keeps what the server sent.
    pub(crate) fn rejected(
        request: &FetchRequest,
        status_code: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
        error: FetchError,
        elapsed: Duration,
    ) -> Self {
        Self {
            status_code: Some(status_code),
            headers,
            body,
            ..Self::failed(request, error, elapsed)
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && matches!(self.status_code, Some(200..=299))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchErrorKind;

    #[test]
    fn body_turns_get_into_post_but_keeps_explicit_methods() {
        let posted = FetchRequest::new("https://example.test/").with_body("a=1");
        assert_eq!(posted.method(), HttpMethod::Post);

        let head = FetchRequest::new("https://example.test/")
            .with_method(HttpMethod::Head)
            .with_body("ignored by servers");
        assert_eq!(head.method(), HttpMethod::Head);
    }

    #[test]
    fn every_request_gets_a_distinct_id() {
        let first = FetchRequest::new("https://example.test/");
        let second = FetchRequest::new("https://example.test/");
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn rejected_result_keeps_status_and_error() {
        let request = FetchRequest::new("https://example.test/missing");
        let result = FetchResult::rejected(
            &request,
            404,
            vec![(String::from("Content-Type"), String::from("text/plain"))],
            b"nope".to_vec(),
            FetchError::http_status(request.url(), 404).with_attempts(1),
            Duration::from_millis(3),
        );

        assert!(!result.is_success());
        assert_eq!(result.status_code, Some(404));
        assert_eq!(result.header("content-type"), Some("text/plain"));
        assert_eq!(result.attempts, 1);
        assert_eq!(
            result.error.as_ref().map(FetchError::kind),
            Some(FetchErrorKind::HttpStatus(404))
        );
        assert_eq!(result.request_id, request.id());
    }
}
