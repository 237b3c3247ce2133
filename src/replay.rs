use crate::data::{Body, Interaction, ServiceResponse};
use crate::error::Error;
use crate::interactor::Interactor;
use crate::monitor::{
    DefaultMonitor, Mismatch, ReplayMonitor, VerificationError, VerificationErrorKind,
};
use crate::script::{anchor_for, ScriptDocument};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use regex::Regex;
use std::sync::Arc;

pub(crate) const REQUEST_HEADERS_HEADING: &str = "### Request headers recorded for playback";
pub(crate) const REQUEST_BODY_HEADING: &str = "### Request body recorded for playback";
pub(crate) const RESPONSE_HEADERS_HEADING: &str = "### Response headers recorded for playback";
pub(crate) const RESPONSE_BODY_HEADING: &str = "### Response body recorded for playback";
pub(crate) const BASE64_MARKER: &str = " - Base64 below";

const CODE_FENCE: &str = "\n```\n";

/// Parse position threaded through one interaction's replay; every search
/// is a forward scan from the previous position, never a backtrack.
struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Cursor { text, pos: 0 }
    }

    /// Advance to the next occurrence of `pattern`, or `None` if absent.
    fn seek(&mut self, pattern: &str) -> Option<usize> {
        match self.text[self.pos..].find(pattern) {
            Some(offset) => {
                self.pos += offset;
                Some(self.pos)
            }
            None => None,
        }
    }

    /// The rest of the line beginning at `start`.
    fn line_at(&self, start: usize) -> &'a str {
        match self.text[start..].find('\n') {
            Some(offset) => &self.text[start..start + offset],
            None => &self.text[start..],
        }
    }

    /// The content of the next code block; the cursor ends up past its
    /// closing fence.
    fn code_block(&mut self) -> Option<&'a str> {
        let open = self.text[self.pos..].find(CODE_FENCE)? + self.pos;
        let content_start = open + CODE_FENCE.len();
        let close = self.text[content_start..].find(CODE_FENCE)? + content_start;
        self.pos = close + CODE_FENCE.len();
        Some(&self.text[content_start..close])
    }

    /// The parenthesised token on the heading line at the cursor position.
    fn heading_parens(&self) -> Option<&'a str> {
        let line = self.line_at(self.pos);
        let open = line.find('(')?;
        let close = line.find(')')?;
        if close < open {
            return None;
        }
        Some(&line[open + 1..close])
    }
}

/// Plays a previously recorded script back against live requests. Each
/// interaction's block is parsed with a forward-only scan and the actual
/// request is verified against the recorded method, URL suffix, headers,
/// body and content type. Failures go to the [`ReplayMonitor`]; the first
/// one it raises is what the caller gets back.
#[derive(Debug)]
pub struct MarkdownReplayer {
    document: ScriptDocument,
    monitor: Arc<dyn ReplayMonitor>,
    alpha_sort_headers: bool,
    replacements: Vec<(Regex, String)>,
}

impl MarkdownReplayer {
    pub fn new(document: ScriptDocument) -> Self {
        Self::with_monitor(document, Arc::new(DefaultMonitor))
    }

    pub fn with_monitor(document: ScriptDocument, monitor: Arc<dyn ReplayMonitor>) -> Self {
        MarkdownReplayer {
            document,
            monitor,
            alpha_sort_headers: false,
            replacements: Vec::new(),
        }
    }

    /// Compare header sets ignoring line order, for services known to
    /// reorder headers across invocations. Both sides are sorted
    /// lexicographically as whole `"Name: Value"` strings.
    pub fn with_alpha_sorting_of_headers(mut self) -> Self {
        self.alpha_sort_headers = true;
        self
    }

    /// Rewrite matches of `pattern` in each live header line before
    /// comparison, so values recorded redacted still match their live
    /// counterparts.
    pub fn with_replacement_in_playback<S: Into<String>>(
        mut self,
        pattern: Regex,
        replacement: S,
    ) -> Self {
        self.replacements.push((pattern, replacement.into()));
        self
    }

    pub fn document(&self) -> &ScriptDocument {
        &self.document
    }

    fn redact(&self, line: &str) -> String {
        let mut line = line.to_string();
        for (pattern, replacement) in &self.replacements {
            line = pattern.replace_all(&line, replacement.as_str()).into_owned();
        }
        line
    }

    fn reorder_maybe(&self, headers: &mut Vec<String>) {
        if self.alpha_sort_headers {
            headers.sort();
        }
    }

    fn require_section(
        &self,
        cursor: &mut Cursor<'_>,
        heading: &str,
        interaction: &Interaction,
    ) -> Result<(), Error> {
        if cursor.seek(heading).is_some() {
            return Ok(());
        }
        let diagnostic = Mismatch::new(heading, "(section heading absent)");
        self.monitor.section_heading_missing(
            interaction.index(),
            heading,
            self.document.filename(),
            interaction.context(),
            diagnostic,
        )?;
        Err(self.section_missing(heading, interaction))
    }

    fn require_code_block<'a>(
        &self,
        cursor: &mut Cursor<'a>,
        heading: &str,
        interaction: &Interaction,
    ) -> Result<&'a str, Error> {
        if let Some(block) = cursor.code_block() {
            return Ok(block);
        }
        let diagnostic = Mismatch::new("a fenced code block", "(code block absent)");
        self.monitor.section_heading_missing(
            interaction.index(),
            heading,
            self.document.filename(),
            interaction.context(),
            diagnostic,
        )?;
        Err(self.section_missing(heading, interaction))
    }

    fn section_missing(&self, heading: &str, interaction: &Interaction) -> Error {
        Error::Verification(VerificationError::new(
            VerificationErrorKind::SectionMissing,
            format!(
                "Expected '{}' for interaction #{} in {}, but it was not there",
                heading,
                interaction.index(),
                self.document.filename()
            ),
            None,
        ))
    }

    fn replay(
        &self,
        method: &str,
        url: &str,
        headers: &[String],
        interaction: &Interaction,
    ) -> Result<ServiceResponse, Error> {
        let filename = self.document.filename();
        let context = interaction.context();
        let index = interaction.index();

        let block = match self.document.block(index) {
            Some(block) => block,
            None => {
                let diagnostic = Mismatch::new(
                    format!("a block for interaction #{}", index),
                    format!("{} parsed interaction(s)", self.document.interaction_count()),
                );
                self.monitor
                    .unexpected_interaction_request(index, filename, diagnostic)?;
                return Err(self.out_of_range(index));
            }
        };
        let mut cursor = Cursor::new(block);

        let anchor = anchor_for(index);
        let anchor_pos = match cursor.seek(&anchor) {
            Some(pos) => pos,
            None => {
                let diagnostic = Mismatch::new(anchor.as_str(), "(anchor line absent)");
                self.monitor
                    .could_not_find_interaction(index, filename, context, diagnostic)?;
                return Err(Error::Verification(VerificationError::new(
                    VerificationErrorKind::InteractionNotFound,
                    format!("Could not find interaction #{} in file '{}'", index, filename),
                    None,
                )));
            }
        };

        // "<n>: <METHOD> <url-suffix>" follows the anchor prefix
        let heading = cursor.line_at(anchor_pos);
        let mut tokens = heading[crate::script::INTERACTION_ANCHOR.len()..].split(' ');
        let _ordinal = tokens.next();
        let recorded_method = tokens.next().unwrap_or("");
        let recorded_url = tokens.next().unwrap_or("");

        // The value checks all run and all report, but only the first
        // monitor-raised failure travels back to the caller.
        let mut first_failure: Option<VerificationError> = None;
        fn note(first: &mut Option<VerificationError>, outcome: Result<(), VerificationError>) {
            if let Err(failure) = outcome {
                if first.is_none() {
                    *first = Some(failure);
                }
            }
        }

        if method != recorded_method {
            let diagnostic = Mismatch::new(recorded_method, method);
            note(
                &mut first_failure,
                self.monitor.unexpected_client_request_method(
                    index,
                    filename,
                    recorded_method,
                    method,
                    context,
                    url,
                    diagnostic,
                ),
            );
        }

        if !url.ends_with(recorded_url) {
            let diagnostic = Mismatch::new(format!("a URL ending in {}", recorded_url), url);
            note(
                &mut first_failure,
                self.monitor.unexpected_client_request_url(
                    index,
                    filename,
                    recorded_method,
                    recorded_url,
                    url,
                    context,
                    diagnostic,
                ),
            );
        }

        self.require_section(&mut cursor, REQUEST_HEADERS_HEADING, interaction)?;
        let recorded_header_block =
            self.require_code_block(&mut cursor, REQUEST_HEADERS_HEADING, interaction)?;

        self.require_section(&mut cursor, REQUEST_BODY_HEADING, interaction)?;
        let recorded_content_type = cursor.heading_parens().unwrap_or("").to_string();
        let recorded_body =
            self.require_code_block(&mut cursor, REQUEST_BODY_HEADING, interaction)?;

        match &interaction.request.body {
            Body::Text(text) if text == recorded_body => {}
            Body::Text(text) => {
                let diagnostic = Mismatch::new(recorded_body, text.as_str());
                note(
                    &mut first_failure,
                    self.monitor.unexpected_client_request_body(
                        index,
                        recorded_method,
                        filename,
                        context,
                        diagnostic,
                    ),
                );
            }
            Body::Binary(_) => {
                let diagnostic = Mismatch::new(recorded_body, "(binary request body)");
                note(
                    &mut first_failure,
                    self.monitor.unexpected_client_request_body(
                        index,
                        recorded_method,
                        filename,
                        context,
                        diagnostic,
                    ),
                );
            }
        }

        if interaction.request.content_type != recorded_content_type {
            let diagnostic = Mismatch::new(
                recorded_content_type.as_str(),
                interaction.request.content_type.as_str(),
            );
            note(
                &mut first_failure,
                self.monitor.unexpected_client_request_content_type(
                    index,
                    recorded_method,
                    filename,
                    context,
                    diagnostic,
                ),
            );
        }

        let mut recorded_headers: Vec<String> =
            recorded_header_block.split('\n').map(str::to_string).collect();
        let mut actual_headers: Vec<String> =
            headers.iter().map(|line| self.redact(line)).collect();
        self.reorder_maybe(&mut recorded_headers);
        self.reorder_maybe(&mut actual_headers);
        if actual_headers != recorded_headers {
            let diagnostic =
                Mismatch::new(recorded_headers.join(", "), actual_headers.join(", "));
            note(
                &mut first_failure,
                self.monitor.unexpected_client_request_headers(
                    index,
                    recorded_method,
                    filename,
                    context,
                    diagnostic,
                ),
            );
        }

        if let Some(failure) = first_failure {
            return Err(Error::Verification(failure));
        }

        self.require_section(&mut cursor, RESPONSE_HEADERS_HEADING, interaction)?;
        let response_headers: Vec<String> = self
            .require_code_block(&mut cursor, RESPONSE_HEADERS_HEADING, interaction)?
            .split('\n')
            .map(str::to_string)
            .collect();

        self.require_section(&mut cursor, RESPONSE_BODY_HEADING, interaction)?;
        let status_and_content_type = cursor.heading_parens().unwrap_or("").to_string();
        let mut parts = status_and_content_type.splitn(2, ": ");
        let status_code: u16 = parts.next().unwrap_or("").parse().map_err(|_| {
            Error::ScriptFormat(format!(
                "Invalid status code on the response body heading of interaction #{} in '{}'",
                index, filename
            ))
        })?;
        let content_type = parts.next().unwrap_or("").to_string();

        let body_block = self.require_code_block(&mut cursor, RESPONSE_BODY_HEADING, interaction)?;
        let (content_type, body) = if content_type.ends_with(BASE64_MARKER.trim_start()) {
            let truncated = match content_type.find(' ') {
                Some(space) => content_type[..space].to_string(),
                None => content_type,
            };
            let bytes = BASE64.decode(body_block.trim().as_bytes()).map_err(|_| {
                Error::ScriptFormat(format!(
                    "Invalid base64 response body for interaction #{} in '{}'",
                    index, filename
                ))
            })?;
            (truncated, Body::Binary(bytes))
        } else {
            (content_type, Body::Text(body_block.to_string()))
        };

        Ok(ServiceResponse::new(body, content_type, status_code, response_headers))
    }

    fn out_of_range(&self, index: usize) -> Error {
        Error::Verification(VerificationError::new(
            VerificationErrorKind::InteractionIndexOutOfRange,
            format!(
                "Replay of script '{}' hit a problem when interaction #{} was sought, but there were no more",
                self.document.filename(),
                index
            ),
            None,
        ))
    }
}

#[async_trait]
impl Interactor for MarkdownReplayer {
    fn new_interaction(
        &self,
        _method: &str,
        _path: &str,
        index: usize,
        _url: &str,
        context: &str,
    ) -> Result<Interaction, Error> {
        if index >= self.document.interaction_count() {
            let diagnostic = Mismatch::new(
                format!("an interaction #{}", index),
                format!("{} recorded interaction(s)", self.document.interaction_count()),
            );
            self.monitor.unexpected_interaction_request(
                index,
                self.document.filename(),
                diagnostic,
            )?;
            return Err(self.out_of_range(index));
        }
        Ok(Interaction::new(index, context))
    }

    async fn get_service_response_for_request(
        &self,
        method: &str,
        url: &str,
        headers: &[String],
        interaction: &mut Interaction,
        _lower_case_headers: bool,
    ) -> Result<ServiceResponse, Error> {
        self.replay(method, url, headers, interaction)
    }

    fn finished_script(&self, last_played: Option<usize>, failed: bool) -> Result<(), Error> {
        if failed {
            return Ok(());
        }
        let total = self.document.interaction_count();
        let consumed = match last_played {
            Some(index) => index + 1,
            None => 0,
        };
        if total != consumed {
            let diagnostic = Mismatch::new(
                format!("{} interaction(s) replayed", total),
                format!("{} interaction(s) replayed", consumed),
            );
            self.monitor.finished_but_more_interactions_yet_to_do(
                last_played,
                self.document.filename(),
                diagnostic,
            )?;
        }
        Ok(())
    }

    fn add_interaction(&self, mut interaction: Interaction) -> Result<(), Error> {
        // nothing to persist on replay; the script already holds this exchange
        interaction.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::CollectingMonitor;

    const SCRIPT: &str = "\
## Interaction 0: GET /api/v1/items?x=1

### Request headers recorded for playback

```
accept: application/json
x-session: token=REDACTED
```

### Request body recorded for playback ()

```

```

### Response headers recorded for playback

```
content-type: application/json
content-length: 15
```

### Response body recorded for playback (200: application/json)

```
{\"items\":[1,2]}
```

## Interaction 1: POST /api/v1/items

### Request headers recorded for playback

```
accept: application/json
content-type: application/json
```

### Request body recorded for playback (application/json)

```
{\"name\":\"new\"}
```

### Response headers recorded for playback

```
content-type: application/json
content-length: 11
```

### Response body recorded for playback (201: application/json)

```
{\"id\":\"17\"}
```
";

    fn replayer() -> MarkdownReplayer {
        MarkdownReplayer::new(ScriptDocument::parse(SCRIPT).unwrap())
    }

    fn get_interaction() -> Interaction {
        let mut interaction = Interaction::new(0, "a test");
        interaction.note_request(
            "GET",
            "http://localhost:9000/api/v1/items?x=1",
            vec!["accept: application/json".into(), "x-session: token=REDACTED".into()],
            Body::default(),
            "",
        );
        interaction
    }

    fn replay_with(replayer: &MarkdownReplayer, interaction: &Interaction) -> Result<ServiceResponse, Error> {
        let request = interaction.request.clone();
        replayer.replay(&request.method, &request.url, &request.headers, interaction)
    }

    fn verification_kind(error: Error) -> VerificationErrorKind {
        match error {
            Error::Verification(e) => e.kind(),
            other => panic!("expected a verification error, got {:?}", other),
        }
    }

    #[test]
    fn a_matching_request_gets_the_recorded_response() {
        let response = replay_with(&replayer(), &get_interaction()).unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(response.content_type, "application/json");
        assert_eq!(response.body, Body::from("{\"items\":[1,2]}"));
        assert_eq!(
            response.headers,
            vec![
                "content-type: application/json".to_string(),
                "content-length: 15".to_string(),
            ]
        );
    }

    #[test]
    fn the_second_interaction_is_matched_by_its_own_block() {
        let replayer = replayer();
        let mut interaction = Interaction::new(1, "a test");
        interaction.note_request(
            "POST",
            "http://localhost:9000/api/v1/items",
            vec![
                "accept: application/json".into(),
                "content-type: application/json".into(),
            ],
            Body::from("{\"name\":\"new\"}"),
            "application/json",
        );

        let response = replay_with(&replayer, &interaction).unwrap();

        assert_eq!(response.status_code, 201);
        assert_eq!(response.body, Body::from("{\"id\":\"17\"}"));
    }

    #[test]
    fn a_wrong_method_is_a_method_mismatch() {
        let mut interaction = get_interaction();
        interaction.request.method = "DELETE".into();

        let error = replay_with(&replayer(), &interaction).unwrap_err();
        assert_eq!(verification_kind(error), VerificationErrorKind::MethodMismatch);
    }

    #[test]
    fn the_url_must_end_with_the_recorded_suffix() {
        let replayer = replayer();

        let mut ok = get_interaction();
        ok.request.url = "http://127.0.0.1:61417/api/v1/items?x=1".into();
        assert!(replay_with(&replayer, &ok).is_ok());

        let mut wrong = get_interaction();
        wrong.request.url = "http://localhost:9000/api/v1/other".into();
        let error = replay_with(&replayer, &wrong).unwrap_err();
        assert_eq!(verification_kind(error), VerificationErrorKind::UrlMismatch);
    }

    #[test]
    fn a_different_body_is_a_body_mismatch() {
        let mut interaction = get_interaction();
        interaction.request.body = Body::from("unexpected payload");

        let error = replay_with(&replayer(), &interaction).unwrap_err();
        assert_eq!(verification_kind(error), VerificationErrorKind::BodyMismatch);
    }

    #[test]
    fn a_different_content_type_is_a_content_type_mismatch() {
        let mut interaction = get_interaction();
        interaction.request.content_type = "text/csv".into();

        let error = replay_with(&replayer(), &interaction).unwrap_err();
        assert_eq!(verification_kind(error), VerificationErrorKind::ContentTypeMismatch);
    }

    #[test]
    fn reordered_headers_mismatch_without_order_tolerance() {
        let mut interaction = get_interaction();
        interaction.request.headers = vec![
            "x-session: token=REDACTED".into(),
            "accept: application/json".into(),
        ];

        let error = replay_with(&replayer(), &interaction).unwrap_err();
        assert_eq!(verification_kind(error), VerificationErrorKind::HeaderMismatch);
    }

    #[test]
    fn reordered_headers_match_with_order_tolerance() {
        let replayer = replayer().with_alpha_sorting_of_headers();
        let mut interaction = get_interaction();
        interaction.request.headers = vec![
            "x-session: token=REDACTED".into(),
            "accept: application/json".into(),
        ];

        assert!(replay_with(&replayer, &interaction).is_ok());
    }

    #[test]
    fn a_missing_header_is_still_a_mismatch_with_order_tolerance() {
        let replayer = replayer().with_alpha_sorting_of_headers();
        let mut interaction = get_interaction();
        interaction.request.headers = vec!["accept: application/json".into()];

        let error = replay_with(&replayer, &interaction).unwrap_err();
        assert_eq!(verification_kind(error), VerificationErrorKind::HeaderMismatch);
    }

    #[test]
    fn redactions_apply_to_live_headers_before_comparison() {
        let replayer = replayer().with_replacement_in_playback(
            Regex::new(r"token=\w+").unwrap(),
            "token=REDACTED",
        );
        let mut interaction = get_interaction();
        interaction.request.headers = vec![
            "accept: application/json".into(),
            "x-session: token=abc123".into(),
        ];

        assert!(replay_with(&replayer, &interaction).is_ok());
    }

    #[test]
    fn a_binary_response_body_decodes_from_base64() {
        let script = "\
## Interaction 0: GET /blob

### Request headers recorded for playback

```
accept: */*
```

### Request body recorded for playback ()

```

```

### Response headers recorded for playback

```
content-type: application/octet-stream
```

### Response body recorded for playback (200: application/octet-stream - Base64 below)

```
AP8Q
```
";
        let replayer = MarkdownReplayer::new(ScriptDocument::parse(script).unwrap());
        let mut interaction = Interaction::new(0, "binary test");
        interaction.note_request(
            "GET",
            "http://localhost/blob",
            vec!["accept: */*".into()],
            Body::default(),
            "",
        );

        let response = replay_with(&replayer, &interaction).unwrap();

        assert_eq!(response.body, Body::Binary(vec![0x00, 0xFF, 0x10]));
        assert_eq!(response.content_type, "application/octet-stream");
    }

    #[test]
    fn a_missing_section_heading_is_reported_by_name() {
        let script = "\
## Interaction 0: GET /broken

### Request headers recorded for playback

```
accept: */*
```
";
        let replayer = MarkdownReplayer::new(ScriptDocument::parse(script).unwrap());
        let mut interaction = Interaction::new(0, "broken script");
        interaction.note_request("GET", "http://x/broken", vec!["accept: */*".into()], Body::default(), "");

        let error = replay_with(&replayer, &interaction).unwrap_err();
        match error {
            Error::Verification(e) => {
                assert_eq!(e.kind(), VerificationErrorKind::SectionMissing);
                assert!(e.message().contains(REQUEST_BODY_HEADING));
            }
            other => panic!("expected a verification error, got {:?}", other),
        }
    }

    #[test]
    fn the_first_failure_wins_but_every_check_reports() {
        let monitor = Arc::new(CollectingMonitor::new());
        let replayer =
            MarkdownReplayer::with_monitor(ScriptDocument::parse(SCRIPT).unwrap(), monitor.clone());
        let mut interaction = get_interaction();
        interaction.request.method = "PUT".into();
        interaction.request.body = Body::from("also wrong");
        interaction.request.content_type = "text/csv".into();

        // a collecting monitor swallows every report, so the replay succeeds
        let response = replay_with(&replayer, &interaction).unwrap();
        assert_eq!(response.status_code, 200);

        let kinds: Vec<VerificationErrorKind> =
            monitor.take_failures().iter().map(|failure| failure.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                VerificationErrorKind::MethodMismatch,
                VerificationErrorKind::BodyMismatch,
                VerificationErrorKind::ContentTypeMismatch,
            ]
        );
    }

    #[test]
    fn with_the_default_monitor_the_first_failure_is_returned() {
        let mut interaction = get_interaction();
        interaction.request.method = "PUT".into();
        interaction.request.body = Body::from("also wrong");

        let error = replay_with(&replayer(), &interaction).unwrap_err();
        assert_eq!(verification_kind(error), VerificationErrorKind::MethodMismatch);
    }

    #[test]
    fn an_interaction_beyond_the_script_is_out_of_range() {
        let error = replayer()
            .new_interaction("GET", "/api/v1/items", 2, "http://x/api/v1/items", "test")
            .unwrap_err();
        assert_eq!(
            verification_kind(error),
            VerificationErrorKind::InteractionIndexOutOfRange
        );
    }

    #[test]
    fn finishing_after_the_last_interaction_succeeds() {
        assert!(replayer().finished_script(Some(1), false).is_ok());
    }

    #[test]
    fn finishing_early_reports_leftover_interactions() {
        let error = replayer().finished_script(Some(0), false).unwrap_err();
        assert_eq!(verification_kind(error), VerificationErrorKind::LeftoverInteractions);

        let error = replayer().finished_script(None, false).unwrap_err();
        assert_eq!(verification_kind(error), VerificationErrorKind::LeftoverInteractions);
    }

    #[test]
    fn a_failed_session_skips_the_leftover_check() {
        assert!(replayer().finished_script(Some(0), true).is_ok());
    }
}
