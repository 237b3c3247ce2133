use std::fmt::{self, Debug};

/// Transform hooks invoked at fixed points in the request/response journey.
/// Every hook defaults to the identity, so an implementation only overrides
/// the points it cares about. Hooks must be pure transforms over the value
/// they receive; returning the input unchanged is always valid.
pub trait InteractionManipulations: Debug + Send + Sync {
    /// Transform the outgoing URL before it is dispatched to the real service.
    fn change_url_for_request_to_real_service(&self, url: String) -> String {
        url
    }

    /// Called once per request header, right after it has been appended to
    /// `headers`. The hook may edit the whole list.
    fn change_single_header_for_request_to_real_service(
        &self,
        _just_added: &str,
        _headers: &mut Vec<String>,
    ) {
    }

    /// Add, remove or reorder request headers after the per-header pass.
    fn change_all_headers_for_request_to_real_service(&self, _headers: &mut Vec<String>) {}

    /// Transform the outgoing request body before it is sent.
    fn change_body_for_request_to_real_service(&self, body: String) -> String {
        body
    }

    /// Transform one response header before recording. Returning `None`
    /// drops the header; this is the only hook with a drop sentinel.
    fn change_single_header_returned_back_from_real_service(
        &self,
        _index: usize,
        header: String,
    ) -> Option<String> {
        Some(header)
    }

    /// Add, remove or reorder response headers after the per-header pass.
    fn change_all_headers_returned_back_from_real_service(&self, _headers: &mut Vec<String>) {}

    /// Transform the response body before it is persisted.
    fn change_body_returned_back_from_real_service_for_recording(&self, body: String) -> String {
        body
    }

    /// Transform the already-recorded response body before it goes back to
    /// the client. Changes here never reach the script.
    fn change_body_for_client_response_after_recording(&self, body: String) -> String {
        body
    }

    /// Single override point for header values, applied in both directions.
    fn header_replacement(&self, _name: &str, value: &str) -> String {
        value.to_string()
    }
}

/// Always-present identity implementation, so call sites never need to
/// check for an absent pipeline.
#[derive(Debug, Default)]
pub struct NullManipulations;

impl InteractionManipulations for NullManipulations {}

type UrlHook = Box<dyn Fn(String) -> String + Send + Sync>;
type SingleRequestHeaderHook = Box<dyn Fn(&str, &mut Vec<String>) + Send + Sync>;
type HeaderListHook = Box<dyn Fn(&mut Vec<String>) + Send + Sync>;
type BodyHook = Box<dyn Fn(String) -> String + Send + Sync>;
type SingleResponseHeaderHook = Box<dyn Fn(usize, String) -> Option<String> + Send + Sync>;
type HeaderValueHook = Box<dyn Fn(&str, &str) -> String + Send + Sync>;

/// Builds an [`InteractionManipulations`] out of plain closures, one slot
/// per hook point. Unset slots keep their identity default.
#[derive(Default)]
pub struct ManipulationsBuilder {
    url: Option<UrlHook>,
    single_request_header: Option<SingleRequestHeaderHook>,
    all_request_headers: Option<HeaderListHook>,
    request_body: Option<BodyHook>,
    single_response_header: Option<SingleResponseHeaderHook>,
    all_response_headers: Option<HeaderListHook>,
    response_body_for_recording: Option<BodyHook>,
    response_body_after_recording: Option<BodyHook>,
    header_value: Option<HeaderValueHook>,
}

impl ManipulationsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rewrite_url<F: Fn(String) -> String + Send + Sync + 'static>(mut self, hook: F) -> Self {
        self.url = Some(Box::new(hook));
        self
    }

    pub fn on_each_request_header<F: Fn(&str, &mut Vec<String>) + Send + Sync + 'static>(
        mut self,
        hook: F,
    ) -> Self {
        self.single_request_header = Some(Box::new(hook));
        self
    }

    pub fn rewrite_request_headers<F: Fn(&mut Vec<String>) + Send + Sync + 'static>(
        mut self,
        hook: F,
    ) -> Self {
        self.all_request_headers = Some(Box::new(hook));
        self
    }

    pub fn rewrite_request_body<F: Fn(String) -> String + Send + Sync + 'static>(
        mut self,
        hook: F,
    ) -> Self {
        self.request_body = Some(Box::new(hook));
        self
    }

    pub fn on_each_response_header<
        F: Fn(usize, String) -> Option<String> + Send + Sync + 'static,
    >(
        mut self,
        hook: F,
    ) -> Self {
        self.single_response_header = Some(Box::new(hook));
        self
    }

    pub fn rewrite_response_headers<F: Fn(&mut Vec<String>) + Send + Sync + 'static>(
        mut self,
        hook: F,
    ) -> Self {
        self.all_response_headers = Some(Box::new(hook));
        self
    }

    pub fn rewrite_response_body_for_recording<F: Fn(String) -> String + Send + Sync + 'static>(
        mut self,
        hook: F,
    ) -> Self {
        self.response_body_for_recording = Some(Box::new(hook));
        self
    }

    pub fn rewrite_response_body_after_recording<
        F: Fn(String) -> String + Send + Sync + 'static,
    >(
        mut self,
        hook: F,
    ) -> Self {
        self.response_body_after_recording = Some(Box::new(hook));
        self
    }

    pub fn substitute_header_values<F: Fn(&str, &str) -> String + Send + Sync + 'static>(
        mut self,
        hook: F,
    ) -> Self {
        self.header_value = Some(Box::new(hook));
        self
    }

    pub fn build(self) -> BuiltManipulations {
        BuiltManipulations { hooks: self }
    }
}

/// Closure-backed pipeline produced by [`ManipulationsBuilder`].
pub struct BuiltManipulations {
    hooks: ManipulationsBuilder,
}

impl Debug for BuiltManipulations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltManipulations")
            .field("url", &self.hooks.url.is_some())
            .field("single_request_header", &self.hooks.single_request_header.is_some())
            .field("all_request_headers", &self.hooks.all_request_headers.is_some())
            .field("request_body", &self.hooks.request_body.is_some())
            .field(
                "single_response_header",
                &self.hooks.single_response_header.is_some(),
            )
            .field("all_response_headers", &self.hooks.all_response_headers.is_some())
            .field(
                "response_body_for_recording",
                &self.hooks.response_body_for_recording.is_some(),
            )
            .field(
                "response_body_after_recording",
                &self.hooks.response_body_after_recording.is_some(),
            )
            .field("header_value", &self.hooks.header_value.is_some())
            .finish()
    }
}

impl InteractionManipulations for BuiltManipulations {
    fn change_url_for_request_to_real_service(&self, url: String) -> String {
        match &self.hooks.url {
            Some(hook) => hook(url),
            None => url,
        }
    }

    fn change_single_header_for_request_to_real_service(
        &self,
        just_added: &str,
        headers: &mut Vec<String>,
    ) {
        if let Some(hook) = &self.hooks.single_request_header {
            hook(just_added, headers);
        }
    }

    fn change_all_headers_for_request_to_real_service(&self, headers: &mut Vec<String>) {
        if let Some(hook) = &self.hooks.all_request_headers {
            hook(headers);
        }
    }

    fn change_body_for_request_to_real_service(&self, body: String) -> String {
        match &self.hooks.request_body {
            Some(hook) => hook(body),
            None => body,
        }
    }

    fn change_single_header_returned_back_from_real_service(
        &self,
        index: usize,
        header: String,
    ) -> Option<String> {
        match &self.hooks.single_response_header {
            Some(hook) => hook(index, header),
            None => Some(header),
        }
    }

    fn change_all_headers_returned_back_from_real_service(&self, headers: &mut Vec<String>) {
        if let Some(hook) = &self.hooks.all_response_headers {
            hook(headers);
        }
    }

    fn change_body_returned_back_from_real_service_for_recording(&self, body: String) -> String {
        match &self.hooks.response_body_for_recording {
            Some(hook) => hook(body),
            None => body,
        }
    }

    fn change_body_for_client_response_after_recording(&self, body: String) -> String {
        match &self.hooks.response_body_after_recording {
            Some(hook) => hook(body),
            None => body,
        }
    }

    fn header_replacement(&self, name: &str, value: &str) -> String {
        match &self.hooks.header_value {
            Some(hook) => hook(name, value),
            None => value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_null_object_is_an_identity_everywhere() {
        let manipulations = NullManipulations;

        assert_eq!(
            manipulations.change_url_for_request_to_real_service("http://x/y".into()),
            "http://x/y"
        );
        assert_eq!(
            manipulations.change_body_for_request_to_real_service("body".into()),
            "body"
        );
        assert_eq!(
            manipulations.change_single_header_returned_back_from_real_service(0, "a: 1".into()),
            Some("a: 1".to_string())
        );
        assert_eq!(manipulations.header_replacement("authorization", "secret"), "secret");

        let mut headers = vec!["a: 1".to_string()];
        manipulations.change_all_headers_for_request_to_real_service(&mut headers);
        assert_eq!(headers, vec!["a: 1".to_string()]);
    }

    #[test]
    fn built_hooks_are_applied_and_unset_slots_stay_identity() {
        let manipulations = ManipulationsBuilder::new()
            .rewrite_url(|url| url.replace("localhost:8080", "api.example.com"))
            .substitute_header_values(|name, value| {
                if name == "authorization" {
                    "REDACTED".into()
                } else {
                    value.into()
                }
            })
            .build();

        assert_eq!(
            manipulations.change_url_for_request_to_real_service("http://localhost:8080/v1".into()),
            "http://api.example.com/v1"
        );
        assert_eq!(manipulations.header_replacement("authorization", "Bearer x"), "REDACTED");
        assert_eq!(manipulations.header_replacement("accept", "*/*"), "*/*");
        assert_eq!(
            manipulations.change_body_for_request_to_real_service("unchanged".into()),
            "unchanged"
        );
    }

    #[test]
    fn the_per_response_header_hook_can_drop_a_header() {
        let manipulations = ManipulationsBuilder::new()
            .on_each_response_header(|_, header| {
                if header.starts_with("set-cookie") {
                    None
                } else {
                    Some(header)
                }
            })
            .build();

        assert_eq!(
            manipulations
                .change_single_header_returned_back_from_real_service(0, "set-cookie: id=1".into()),
            None
        );
        assert_eq!(
            manipulations
                .change_single_header_returned_back_from_real_service(1, "server: nginx".into()),
            Some("server: nginx".to_string())
        );
    }

    #[test]
    fn bulk_header_hooks_may_edit_the_list_in_place() {
        let manipulations = ManipulationsBuilder::new()
            .rewrite_request_headers(|headers| {
                headers.retain(|line| !line.starts_with("cookie"));
                headers.push("x-added: yes".into());
            })
            .build();

        let mut headers = vec!["cookie: a=1".to_string(), "accept: */*".to_string()];
        manipulations.change_all_headers_for_request_to_real_service(&mut headers);
        assert_eq!(headers, vec!["accept: */*".to_string(), "x-added: yes".to_string()]);
    }
}
