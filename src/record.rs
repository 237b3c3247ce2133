use crate::data::{Body, Interaction, ServiceResponse};
use crate::error::Error;
use crate::interactor::Interactor;
use crate::interop::{HyperServiceInteroperation, ServiceInteroperation};
use crate::manipulations::{InteractionManipulations, NullManipulations};
use crate::replay::{
    BASE64_MARKER, REQUEST_BODY_HEADING, REQUEST_HEADERS_HEADING, RESPONSE_BODY_HEADING,
    RESPONSE_HEADERS_HEADING,
};
use crate::util;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Records live interactions and writes them out as a playback script when
/// the session finishes. Responses come from the real service through the
/// [`ServiceInteroperation`] collaborator.
#[derive(Debug)]
pub struct MarkdownRecorder {
    script_path: PathBuf,
    base_url: String,
    interop: Arc<dyn ServiceInteroperation>,
    manipulations: Arc<dyn InteractionManipulations>,
    interactions: Mutex<Vec<Interaction>>,
}

impl MarkdownRecorder {
    /// `base_url` is the real service this recording session forwards to,
    /// e.g. `https://api.example.com`.
    pub fn new<P: AsRef<Path>, S: Into<String>>(script_path: P, base_url: S) -> Self {
        MarkdownRecorder {
            script_path: script_path.as_ref().to_path_buf(),
            base_url: base_url.into(),
            interop: Arc::new(HyperServiceInteroperation::new()),
            manipulations: Arc::new(NullManipulations),
            interactions: Mutex::new(Vec::new()),
        }
    }

    pub fn with_service_interoperation(mut self, interop: Arc<dyn ServiceInteroperation>) -> Self {
        self.interop = interop;
        self
    }

    pub fn with_manipulations(mut self, manipulations: Arc<dyn InteractionManipulations>) -> Self {
        self.manipulations = manipulations;
        self
    }

    /// Render interactions in the script wire format.
    pub fn render_script(interactions: &[Interaction]) -> String {
        let mut out = String::new();
        for interaction in interactions {
            Self::render_interaction(&mut out, interaction);
        }
        out
    }

    fn render_interaction(out: &mut String, interaction: &Interaction) {
        let request = &interaction.request;
        let response = &interaction.response;

        out.push_str(&format!(
            "## Interaction {}: {} {}\n\n",
            interaction.index(),
            request.method,
            util::origin_form(&request.url)
        ));

        out.push_str(&format!("{}\n\n", REQUEST_HEADERS_HEADING));
        Self::render_header_block(out, &request.headers);

        out.push_str(&format!("{} ({})\n\n", REQUEST_BODY_HEADING, request.content_type));
        Self::render_body_block(out, Self::body_text(&request.body));

        out.push_str(&format!("{}\n\n", RESPONSE_HEADERS_HEADING));
        Self::render_header_block(out, &response.headers);

        match &response.body {
            Body::Text(text) => {
                out.push_str(&format!(
                    "{} ({}: {})\n\n",
                    RESPONSE_BODY_HEADING, response.status_code, response.content_type
                ));
                Self::render_body_block(out, text.clone());
            }
            Body::Binary(bytes) => {
                out.push_str(&format!(
                    "{} ({}: {}{})\n\n",
                    RESPONSE_BODY_HEADING, response.status_code, response.content_type, BASE64_MARKER
                ));
                Self::render_body_block(out, BASE64.encode(bytes));
            }
        }
    }

    fn render_header_block(out: &mut String, headers: &[String]) {
        out.push_str("```\n");
        for header in headers {
            out.push_str(header);
            out.push('\n');
        }
        out.push_str("```\n\n");
    }

    fn render_body_block(out: &mut String, body: String) {
        out.push_str(&format!("```\n{}\n```\n\n", body));
    }

    fn body_text(body: &Body) -> String {
        match body {
            Body::Text(text) => text.clone(),
            Body::Binary(bytes) => BASE64.encode(bytes),
        }
    }
}

#[async_trait]
impl Interactor for MarkdownRecorder {
    fn new_interaction(
        &self,
        _method: &str,
        _path: &str,
        index: usize,
        _url: &str,
        context: &str,
    ) -> Result<Interaction, Error> {
        Ok(Interaction::new(index, context))
    }

    async fn get_service_response_for_request(
        &self,
        method: &str,
        url: &str,
        headers: &[String],
        interaction: &mut Interaction,
        lower_case_headers: bool,
    ) -> Result<ServiceResponse, Error> {
        let outbound_url = format!("{}{}", self.base_url, util::origin_form(url));
        self.interop
            .invoke_service_endpoint(
                method,
                &interaction.request.body,
                &interaction.request.content_type,
                &outbound_url,
                headers,
                self.manipulations.as_ref(),
                lower_case_headers,
            )
            .await
    }

    fn finished_script(&self, _last_played: Option<usize>, failed: bool) -> Result<(), Error> {
        if failed {
            debug!(path = %self.script_path.display(), "session failed, recording not written");
            return Ok(());
        }
        let interactions = self.interactions.lock()?;
        let script = Self::render_script(&interactions);
        fs::write(&self.script_path, script)?;
        debug!(
            path = %self.script_path.display(),
            interactions = interactions.len(),
            "recorded script written"
        );
        Ok(())
    }

    fn add_interaction(&self, mut interaction: Interaction) -> Result<(), Error> {
        interaction.close();
        self.interactions.lock()?.push(interaction);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::MarkdownReplayer;
    use crate::script::ScriptDocument;

    fn recorded_interaction() -> Interaction {
        let mut interaction = Interaction::new(0, "a recording");
        interaction.note_request(
            "GET",
            "http://localhost:61417/api/widgets?page=2",
            vec!["host: localhost:61417".into(), "accept: application/json".into()],
            Body::default(),
            "",
        );
        interaction.note_response(
            vec![
                "content-type: application/json".into(),
                "content-length: 17".into(),
            ],
            Body::from("{\"widgets\":[3,4]}"),
            200,
            "application/json",
        );
        interaction
    }

    #[test]
    fn a_text_interaction_renders_the_exact_wire_format() {
        let script = MarkdownRecorder::render_script(&[recorded_interaction()]);

        assert_eq!(
            script,
            "## Interaction 0: GET /api/widgets?page=2\n\
             \n\
             ### Request headers recorded for playback\n\
             \n\
             ```\n\
             host: localhost:61417\n\
             accept: application/json\n\
             ```\n\
             \n\
             ### Request body recorded for playback ()\n\
             \n\
             ```\n\
             \n\
             ```\n\
             \n\
             ### Response headers recorded for playback\n\
             \n\
             ```\n\
             content-type: application/json\n\
             content-length: 17\n\
             ```\n\
             \n\
             ### Response body recorded for playback (200: application/json)\n\
             \n\
             ```\n\
             {\"widgets\":[3,4]}\n\
             ```\n\
             \n"
        );
    }

    #[test]
    fn a_binary_response_renders_base64_with_the_marker() {
        let mut interaction = Interaction::new(0, "binary recording");
        interaction.note_request(
            "GET",
            "http://localhost:61417/blob",
            vec!["accept: */*".into()],
            Body::default(),
            "",
        );
        interaction.note_response(
            vec!["content-type: application/octet-stream".into()],
            Body::Binary(vec![0x00, 0xFF, 0x10]),
            200,
            "application/octet-stream",
        );

        let script = MarkdownRecorder::render_script(&[interaction]);

        assert!(script.contains(
            "### Response body recorded for playback (200: application/octet-stream - Base64 below)"
        ));
        assert!(script.contains("```\nAP8Q\n```"));
    }

    #[test]
    fn recording_then_replaying_the_same_request_round_trips() {
        let script = MarkdownRecorder::render_script(&[recorded_interaction()]);
        let replayer = MarkdownReplayer::new(ScriptDocument::parse(&script).unwrap());

        let mut interaction = replayer
            .new_interaction("GET", "/api/widgets?page=2", 0, "http://localhost:61417/api/widgets?page=2", "a recording")
            .unwrap();
        interaction.note_request(
            "GET",
            "http://localhost:61417/api/widgets?page=2",
            vec!["host: localhost:61417".into(), "accept: application/json".into()],
            Body::default(),
            "",
        );

        let request = interaction.request.clone();
        let response = block_on(replayer.get_service_response_for_request(
            &request.method,
            &request.url,
            &request.headers,
            &mut interaction,
            false,
        ))
        .unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(response.content_type, "application/json");
        assert_eq!(response.body, Body::from("{\"widgets\":[3,4]}"));
        assert!(replayer.finished_script(Some(0), false).is_ok());
    }

    #[test]
    fn a_binary_recording_round_trips_to_identical_bytes() {
        let payload = vec![0x00, 0xFF, 0x10];
        let mut interaction = Interaction::new(0, "binary round trip");
        interaction.note_request(
            "GET",
            "http://localhost:61417/blob",
            vec!["accept: */*".into()],
            Body::default(),
            "",
        );
        interaction.note_response(
            vec!["content-type: application/octet-stream".into()],
            Body::Binary(payload.clone()),
            200,
            "application/octet-stream",
        );

        let script = MarkdownRecorder::render_script(&[interaction]);
        let replayer = MarkdownReplayer::new(ScriptDocument::parse(&script).unwrap());

        let mut replaying = Interaction::new(0, "binary round trip");
        replaying.note_request(
            "GET",
            "http://localhost:61417/blob",
            vec!["accept: */*".into()],
            Body::default(),
            "",
        );
        let request = replaying.request.clone();
        let response = block_on(replayer.get_service_response_for_request(
            &request.method,
            &request.url,
            &request.headers,
            &mut replaying,
            false,
        ))
        .unwrap();

        assert_eq!(response.body, Body::Binary(payload));
        assert_eq!(response.content_type, "application/octet-stream");
    }

    #[test]
    fn added_interactions_are_closed_and_buffered() {
        let recorder = MarkdownRecorder::new("unused.md", "http://upstream");
        recorder.add_interaction(recorded_interaction()).unwrap();

        let interactions = recorder.interactions.lock().unwrap();
        assert_eq!(interactions.len(), 1);
        assert_eq!(interactions[0].state(), crate::data::InteractionState::Closed);
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }
}
