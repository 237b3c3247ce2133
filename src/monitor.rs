use std::error::Error as StdError;
use std::fmt::{self, Debug, Display};
use std::sync::Mutex;

/// The underlying comparison diagnostic handed to a monitor alongside every
/// report: what the script recorded against what the client actually sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    expected: String,
    actual: String,
}

impl Mismatch {
    pub fn new<S1: Into<String>, S2: Into<String>>(expected: S1, actual: S2) -> Self {
        Mismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn expected(&self) -> &str {
        &self.expected
    }

    pub fn actual(&self) -> &str {
        &self.actual
    }
}

impl Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected \"{}\" but was \"{}\"",
            self.expected.escape_debug(),
            self.actual.escape_debug()
        )
    }
}

impl StdError for Mismatch {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationErrorKind {
    InteractionNotFound,
    MethodMismatch,
    UrlMismatch,
    HeaderMismatch,
    BodyMismatch,
    ContentTypeMismatch,
    SectionMissing,
    LeftoverInteractions,
    InteractionIndexOutOfRange,
}

/// A verification failure as raised by a monitor: which kind of check
/// failed, a human-readable account of where, and the comparison diagnostic
/// as the error's source.
#[derive(Debug, Clone)]
pub struct VerificationError {
    kind: VerificationErrorKind,
    message: String,
    cause: Option<Mismatch>,
}

impl VerificationError {
    pub fn new<S: Into<String>>(
        kind: VerificationErrorKind,
        message: S,
        cause: Option<Mismatch>,
    ) -> Self {
        VerificationError {
            kind,
            message: message.into(),
            cause,
        }
    }

    pub fn kind(&self) -> VerificationErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn diagnostic(&self) -> Option<&Mismatch> {
        self.cause.as_ref()
    }
}

impl Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for VerificationError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause.as_ref().map(|c| c as &(dyn StdError + 'static))
    }
}

/// The pluggable sink for every kind of replay verification failure. The
/// matcher never raises a failure directly; it offers each one here, and the
/// strategy decides whether to hand back an error (fail fast), print first,
/// or swallow it (soft assertion runs).
pub trait ReplayMonitor: Debug + Send + Sync {
    fn finished_but_more_interactions_yet_to_do(
        &self,
        last_played: Option<usize>,
        filename: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError>;

    fn could_not_find_interaction(
        &self,
        interaction: usize,
        filename: &str,
        context: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError>;

    fn unexpected_client_request_method(
        &self,
        interaction: usize,
        filename: &str,
        expected_method: &str,
        method: &str,
        context: &str,
        url: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError>;

    fn unexpected_client_request_url(
        &self,
        interaction: usize,
        filename: &str,
        method: &str,
        recorded_url: &str,
        url: &str,
        context: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError>;

    fn section_heading_missing(
        &self,
        interaction: usize,
        heading: &str,
        filename: &str,
        context: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError>;

    fn unexpected_client_request_headers(
        &self,
        interaction: usize,
        method: &str,
        filename: &str,
        context: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError>;

    fn unexpected_client_request_body(
        &self,
        interaction: usize,
        method: &str,
        filename: &str,
        context: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError>;

    fn unexpected_client_request_content_type(
        &self,
        interaction: usize,
        method: &str,
        filename: &str,
        context: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError>;

    fn unexpected_interaction_request(
        &self,
        interaction: usize,
        filename: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError>;
}

/// Fail-fast strategy: every report becomes an immediate error carrying the
/// interaction index, script filename, context label and the comparison
/// diagnostic as its cause.
#[derive(Debug, Default)]
pub struct DefaultMonitor;

fn method_file_and_context_prefix(
    interaction: usize,
    method: &str,
    filename: &str,
    context: &str,
) -> String {
    format!(
        "Interaction {} (method: {}) in {} (context: {})",
        interaction, method, filename, context
    )
}

impl ReplayMonitor for DefaultMonitor {
    fn finished_but_more_interactions_yet_to_do(
        &self,
        last_played: Option<usize>,
        filename: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        let last = match last_played {
            Some(index) => format!("#{}", index),
            None => String::from("(none replayed)"),
        };
        Err(VerificationError::new(
            VerificationErrorKind::LeftoverInteractions,
            format!(
                "There are more recorded interactions after the last replayed interaction {} in {}, \
                 yet the session finished as if there should be no more",
                last, filename
            ),
            Some(diagnostic),
        ))
    }

    fn could_not_find_interaction(
        &self,
        interaction: usize,
        filename: &str,
        _context: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        Err(VerificationError::new(
            VerificationErrorKind::InteractionNotFound,
            format!(
                "Could not find interaction #{} in file '{}'",
                interaction, filename
            ),
            Some(diagnostic),
        ))
    }

    fn unexpected_client_request_method(
        &self,
        interaction: usize,
        filename: &str,
        expected_method: &str,
        method: &str,
        context: &str,
        url: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        Err(VerificationError::new(
            VerificationErrorKind::MethodMismatch,
            format!(
                "{}, method from the client is not the one previously recorded: {} (URL={})",
                method_file_and_context_prefix(interaction, expected_method, filename, context),
                method,
                url
            ),
            Some(diagnostic),
        ))
    }

    fn unexpected_client_request_url(
        &self,
        interaction: usize,
        filename: &str,
        method: &str,
        recorded_url: &str,
        url: &str,
        _context: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        Err(VerificationError::new(
            VerificationErrorKind::UrlMismatch,
            format!(
                "Interaction {} ({}) in {}: {} does not end in previously recorded {}",
                interaction, method, filename, url, recorded_url
            ),
            Some(diagnostic),
        ))
    }

    fn section_heading_missing(
        &self,
        interaction: usize,
        heading: &str,
        filename: &str,
        _context: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        Err(VerificationError::new(
            VerificationErrorKind::SectionMissing,
            format!(
                "Expected '{}' for interaction #{} in {}, but it was not there",
                heading, interaction, filename
            ),
            Some(diagnostic),
        ))
    }

    fn unexpected_client_request_headers(
        &self,
        interaction: usize,
        method: &str,
        filename: &str,
        context: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        Err(VerificationError::new(
            VerificationErrorKind::HeaderMismatch,
            format!(
                "{}, headers from the client are not the same as those previously recorded",
                method_file_and_context_prefix(interaction, method, filename, context)
            ),
            Some(diagnostic),
        ))
    }

    fn unexpected_client_request_body(
        &self,
        interaction: usize,
        method: &str,
        filename: &str,
        context: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        Err(VerificationError::new(
            VerificationErrorKind::BodyMismatch,
            format!(
                "{}, body from the client is not the same as the one previously recorded",
                method_file_and_context_prefix(interaction, method, filename, context)
            ),
            Some(diagnostic),
        ))
    }

    fn unexpected_client_request_content_type(
        &self,
        interaction: usize,
        method: &str,
        filename: &str,
        context: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        Err(VerificationError::new(
            VerificationErrorKind::ContentTypeMismatch,
            format!(
                "{}, content type of the body from the client is not the same as previously recorded",
                method_file_and_context_prefix(interaction, method, filename, context)
            ),
            Some(diagnostic),
        ))
    }

    fn unexpected_interaction_request(
        &self,
        interaction: usize,
        filename: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        Err(VerificationError::new(
            VerificationErrorKind::InteractionIndexOutOfRange,
            format!(
                "Replay of script '{}' hit a problem when interaction #{} was sought, but there were no more",
                filename, interaction
            ),
            Some(diagnostic),
        ))
    }
}

/// Decorator over an inner strategy that prints each failure (and its cause
/// chain) to the operator console before relaying the inner outcome.
#[derive(Debug)]
pub struct ConsoleMonitor {
    inner: Box<dyn ReplayMonitor>,
}

impl ConsoleMonitor {
    pub fn new() -> Self {
        Self::wrapping(Box::new(DefaultMonitor))
    }

    pub fn wrapping(inner: Box<dyn ReplayMonitor>) -> Self {
        ConsoleMonitor { inner }
    }

    fn relay(&self, outcome: Result<(), VerificationError>) -> Result<(), VerificationError> {
        if let Err(error) = &outcome {
            println!("ReplayMonitor: {}", error);
            let mut cause = error.source();
            while let Some(inner) = cause {
                println!("  caused by: {}", inner);
                cause = inner.source();
            }
        }
        outcome
    }
}

impl Default for ConsoleMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayMonitor for ConsoleMonitor {
    fn finished_but_more_interactions_yet_to_do(
        &self,
        last_played: Option<usize>,
        filename: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        self.relay(
            self.inner
                .finished_but_more_interactions_yet_to_do(last_played, filename, diagnostic),
        )
    }

    fn could_not_find_interaction(
        &self,
        interaction: usize,
        filename: &str,
        context: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        self.relay(
            self.inner
                .could_not_find_interaction(interaction, filename, context, diagnostic),
        )
    }

    fn unexpected_client_request_method(
        &self,
        interaction: usize,
        filename: &str,
        expected_method: &str,
        method: &str,
        context: &str,
        url: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        self.relay(self.inner.unexpected_client_request_method(
            interaction,
            filename,
            expected_method,
            method,
            context,
            url,
            diagnostic,
        ))
    }

    fn unexpected_client_request_url(
        &self,
        interaction: usize,
        filename: &str,
        method: &str,
        recorded_url: &str,
        url: &str,
        context: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        self.relay(self.inner.unexpected_client_request_url(
            interaction,
            filename,
            method,
            recorded_url,
            url,
            context,
            diagnostic,
        ))
    }

    fn section_heading_missing(
        &self,
        interaction: usize,
        heading: &str,
        filename: &str,
        context: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        self.relay(
            self.inner
                .section_heading_missing(interaction, heading, filename, context, diagnostic),
        )
    }

    fn unexpected_client_request_headers(
        &self,
        interaction: usize,
        method: &str,
        filename: &str,
        context: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        self.relay(
            self.inner
                .unexpected_client_request_headers(interaction, method, filename, context, diagnostic),
        )
    }

    fn unexpected_client_request_body(
        &self,
        interaction: usize,
        method: &str,
        filename: &str,
        context: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        self.relay(
            self.inner
                .unexpected_client_request_body(interaction, method, filename, context, diagnostic),
        )
    }

    fn unexpected_client_request_content_type(
        &self,
        interaction: usize,
        method: &str,
        filename: &str,
        context: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        self.relay(self.inner.unexpected_client_request_content_type(
            interaction,
            method,
            filename,
            context,
            diagnostic,
        ))
    }

    fn unexpected_interaction_request(
        &self,
        interaction: usize,
        filename: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        self.relay(
            self.inner
                .unexpected_interaction_request(interaction, filename, diagnostic),
        )
    }
}

/// Soft-assertion strategy: failures are built exactly as the default
/// strategy would, then stored instead of returned, so a whole replay run
/// can be inspected afterwards.
#[derive(Debug, Default)]
pub struct CollectingMonitor {
    inner: DefaultMonitor,
    collected: Mutex<Vec<VerificationError>>,
}

impl CollectingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> Vec<VerificationError> {
        self.collected
            .lock()
            .map(|failures| failures.clone())
            .unwrap_or_default()
    }

    pub fn take_failures(&self) -> Vec<VerificationError> {
        self.collected
            .lock()
            .map(|mut failures| std::mem::take(&mut *failures))
            .unwrap_or_default()
    }

    fn absorb(&self, outcome: Result<(), VerificationError>) -> Result<(), VerificationError> {
        if let Err(error) = outcome {
            if let Ok(mut failures) = self.collected.lock() {
                failures.push(error);
            }
        }
        Ok(())
    }
}

impl ReplayMonitor for CollectingMonitor {
    fn finished_but_more_interactions_yet_to_do(
        &self,
        last_played: Option<usize>,
        filename: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        self.absorb(
            self.inner
                .finished_but_more_interactions_yet_to_do(last_played, filename, diagnostic),
        )
    }

    fn could_not_find_interaction(
        &self,
        interaction: usize,
        filename: &str,
        context: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        self.absorb(
            self.inner
                .could_not_find_interaction(interaction, filename, context, diagnostic),
        )
    }

    fn unexpected_client_request_method(
        &self,
        interaction: usize,
        filename: &str,
        expected_method: &str,
        method: &str,
        context: &str,
        url: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        self.absorb(self.inner.unexpected_client_request_method(
            interaction,
            filename,
            expected_method,
            method,
            context,
            url,
            diagnostic,
        ))
    }

    fn unexpected_client_request_url(
        &self,
        interaction: usize,
        filename: &str,
        method: &str,
        recorded_url: &str,
        url: &str,
        context: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        self.absorb(self.inner.unexpected_client_request_url(
            interaction,
            filename,
            method,
            recorded_url,
            url,
            context,
            diagnostic,
        ))
    }

    fn section_heading_missing(
        &self,
        interaction: usize,
        heading: &str,
        filename: &str,
        context: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        self.absorb(
            self.inner
                .section_heading_missing(interaction, heading, filename, context, diagnostic),
        )
    }

    fn unexpected_client_request_headers(
        &self,
        interaction: usize,
        method: &str,
        filename: &str,
        context: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        self.absorb(
            self.inner
                .unexpected_client_request_headers(interaction, method, filename, context, diagnostic),
        )
    }

    fn unexpected_client_request_body(
        &self,
        interaction: usize,
        method: &str,
        filename: &str,
        context: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        self.absorb(
            self.inner
                .unexpected_client_request_body(interaction, method, filename, context, diagnostic),
        )
    }

    fn unexpected_client_request_content_type(
        &self,
        interaction: usize,
        method: &str,
        filename: &str,
        context: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        self.absorb(self.inner.unexpected_client_request_content_type(
            interaction,
            method,
            filename,
            context,
            diagnostic,
        ))
    }

    fn unexpected_interaction_request(
        &self,
        interaction: usize,
        filename: &str,
        diagnostic: Mismatch,
    ) -> Result<(), VerificationError> {
        self.absorb(
            self.inner
                .unexpected_interaction_request(interaction, filename, diagnostic),
        )
    }
}
