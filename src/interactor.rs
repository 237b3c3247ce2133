use crate::data::{Interaction, ServiceResponse};
use crate::error::Error;
use async_trait::async_trait;
use std::fmt::Debug;

/// The façade the HTTP bridge drives, one implementation per mode:
/// [`crate::MarkdownReplayer`] for playback, [`crate::MarkdownRecorder`]
/// for recording.
#[async_trait]
pub trait Interactor: Debug + Send + Sync {
    /// Open the interaction for an incoming request. In playback this fails
    /// when `index` is beyond the parsed script.
    fn new_interaction(
        &self,
        method: &str,
        path: &str,
        index: usize,
        url: &str,
        context: &str,
    ) -> Result<Interaction, Error>;

    /// Produce the response for the interaction's request: the recorded one
    /// (playback) or the real service's (recording). The request fields of
    /// `interaction` have been noted by the time this is called.
    async fn get_service_response_for_request(
        &self,
        method: &str,
        url: &str,
        headers: &[String],
        interaction: &mut Interaction,
        lower_case_headers: bool,
    ) -> Result<ServiceResponse, Error>;

    /// Reconcile interaction counts at session end. `last_played` is the
    /// ordinal of the final completed interaction, `None` when none ran.
    fn finished_script(&self, last_played: Option<usize>, failed: bool) -> Result<(), Error>;

    /// Hand over a completed interaction: buffered for persistence when
    /// recording, closed and discarded when replaying.
    fn add_interaction(&self, interaction: Interaction) -> Result<(), Error>;
}
