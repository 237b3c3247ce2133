/// A request or response payload. Text bodies are compared and persisted
/// verbatim; binary bodies are base64-encoded in the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Text(String),
    Binary(Vec<u8>),
}

impl Body {
    /// Length in bytes, as advertised in a `Content-Length` header.
    pub fn len(&self) -> usize {
        match self {
            Body::Text(text) => text.len(),
            Body::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(text) => Some(text),
            Body::Binary(_) => None,
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::Text(String::new())
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.into())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Binary(bytes)
    }
}

/// Where an interaction is in its life. An interaction is owned by the
/// session that created it and is not touched again after `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionState {
    Created,
    RequestNoted,
    ResponseNoted,
    Closed,
}

#[derive(Debug, Clone, Default)]
pub struct RequestDetails {
    pub method: String,
    pub url: String,
    /// `"Name: Value"` lines, insertion order meaningful.
    pub headers: Vec<String>,
    pub body: Body,
    pub content_type: String,
}

#[derive(Debug, Clone, Default)]
pub struct ResponseDetails {
    pub status_code: u16,
    pub headers: Vec<String>,
    pub body: Body,
    pub content_type: String,
}

/// One recorded or replayed request/response exchange, identified by its
/// zero-based position in the script.
#[derive(Debug, Clone)]
pub struct Interaction {
    index: usize,
    context: String,
    state: InteractionState,
    pub request: RequestDetails,
    pub response: ResponseDetails,
}

impl Interaction {
    pub fn new<S: Into<String>>(index: usize, context: S) -> Self {
        Interaction {
            index,
            context: context.into(),
            state: InteractionState::Created,
            request: RequestDetails::default(),
            response: ResponseDetails::default(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Free-form label (usually a test name) used in diagnostics only.
    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    pub fn note_request<S1: Into<String>, S2: Into<String>, S3: Into<String>>(
        &mut self,
        method: S1,
        url: S2,
        headers: Vec<String>,
        body: Body,
        content_type: S3,
    ) {
        self.request = RequestDetails {
            method: method.into(),
            url: url.into(),
            headers,
            body,
            content_type: content_type.into(),
        };
        self.state = InteractionState::RequestNoted;
    }

    pub fn note_response<S: Into<String>>(
        &mut self,
        headers: Vec<String>,
        body: Body,
        status_code: u16,
        content_type: S,
    ) {
        self.response = ResponseDetails {
            status_code,
            headers,
            body,
            content_type: content_type.into(),
        };
        self.state = InteractionState::ResponseNoted;
    }

    pub fn close(&mut self) {
        self.state = InteractionState::Closed;
    }
}

/// An immutable snapshot of a service response. Revision operations return
/// new instances rather than mutating in place.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceResponse {
    pub body: Body,
    pub content_type: String,
    pub status_code: u16,
    pub headers: Vec<String>,
}

impl ServiceResponse {
    pub fn new<S: Into<String>>(
        body: Body,
        content_type: S,
        status_code: u16,
        headers: Vec<String>,
    ) -> Self {
        ServiceResponse {
            body,
            content_type: content_type.into(),
            status_code,
            headers,
        }
    }

    pub fn with_revised_headers(&self, headers: Vec<String>) -> ServiceResponse {
        ServiceResponse {
            body: self.body.clone(),
            content_type: self.content_type.clone(),
            status_code: self.status_code,
            headers,
        }
    }

    /// Replace the body, rewriting an existing `Content-Length` header (any
    /// name casing) to the new body's length. All other headers are left
    /// untouched.
    pub fn with_revised_body(&self, body: Body) -> ServiceResponse {
        let mut headers = self.headers.clone();
        for line in headers.iter_mut() {
            if let Some(colon) = line.find(':') {
                if line[..colon].eq_ignore_ascii_case("content-length") {
                    *line = format!("{}: {}", &line[..colon], body.len());
                    break;
                }
            }
        }
        ServiceResponse {
            body,
            content_type: self.content_type.clone(),
            status_code: self.status_code,
            headers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revising_the_body_updates_content_length() {
        let response = ServiceResponse::new(
            Body::from("before"),
            "text/plain",
            200,
            vec![
                "Server: test".into(),
                "Content-Length: 6".into(),
                "Connection: close".into(),
            ],
        );

        let revised = response.with_revised_body(Body::from("a longer body"));

        assert_eq!(revised.body, Body::from("a longer body"));
        assert_eq!(
            revised.headers,
            vec![
                "Server: test".to_string(),
                "Content-Length: 13".to_string(),
                "Connection: close".to_string(),
            ]
        );
        // the original is untouched
        assert_eq!(response.headers[1], "Content-Length: 6");
    }

    #[test]
    fn content_length_is_found_case_insensitively_and_keeps_its_casing() {
        let response = ServiceResponse::new(
            Body::from("x"),
            "text/plain",
            200,
            vec!["content-length: 1".into()],
        );

        let revised = response.with_revised_body(Body::from("abc"));

        assert_eq!(revised.headers, vec!["content-length: 3".to_string()]);
    }

    #[test]
    fn revising_the_body_without_content_length_changes_no_headers() {
        let response =
            ServiceResponse::new(Body::from("x"), "text/plain", 200, vec!["Server: test".into()]);

        let revised = response.with_revised_body(Body::from("yy"));

        assert_eq!(revised.headers, vec!["Server: test".to_string()]);
    }

    #[test]
    fn binary_body_length_counts_bytes() {
        assert_eq!(Body::Binary(vec![0x00, 0xFF, 0x10]).len(), 3);
        assert_eq!(Body::from("héllo").len(), 6);
    }

    #[test]
    fn interaction_walks_through_its_lifecycle() {
        let mut interaction = Interaction::new(3, "some test");
        assert_eq!(interaction.state(), InteractionState::Created);
        assert_eq!(interaction.index(), 3);

        interaction.note_request(
            "GET",
            "http://localhost/items",
            vec!["accept: */*".into()],
            Body::default(),
            "",
        );
        assert_eq!(interaction.state(), InteractionState::RequestNoted);

        interaction.note_response(vec!["content-type: text/plain".into()], Body::from("ok"), 200, "text/plain");
        assert_eq!(interaction.state(), InteractionState::ResponseNoted);

        interaction.close();
        assert_eq!(interaction.state(), InteractionState::Closed);
    }
}
