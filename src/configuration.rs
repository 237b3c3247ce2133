use crate::interop::{HyperServiceInteroperation, ServiceInteroperation};
use crate::manipulations::{InteractionManipulations, NullManipulations};
use crate::monitor::{DefaultMonitor, ReplayMonitor};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_PORT: u16 = 61417;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RepriseMode {
    Playback,
    Record,
}

/// Everything one session needs: the mode, the script, and the pluggable
/// pieces (monitor, manipulations, outbound client), all with working
/// defaults.
#[derive(Debug)]
pub struct RepriseConfiguration {
    mode: RepriseMode,
    script_path: PathBuf,
    record_base_url: Option<String>,
    port: u16,
    context: String,
    lower_case_headers: bool,
    alpha_sort_headers: bool,
    replacements: Vec<(Regex, String)>,
    monitor: Arc<dyn ReplayMonitor>,
    manipulations: Arc<dyn InteractionManipulations>,
    interop: Option<Arc<dyn ServiceInteroperation>>,
}

impl RepriseConfiguration {
    pub fn new<P: AsRef<Path>>(mode: RepriseMode, script_path: P) -> Self {
        RepriseConfiguration {
            mode,
            script_path: script_path.as_ref().to_path_buf(),
            record_base_url: None,
            port: DEFAULT_PORT,
            context: String::from("no context"),
            lower_case_headers: false,
            alpha_sort_headers: false,
            replacements: Vec::new(),
            monitor: Arc::new(DefaultMonitor),
            manipulations: Arc::new(NullManipulations),
            interop: None,
        }
    }

    pub fn mode(&self) -> RepriseMode {
        self.mode
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    /// The real service recording sessions forward to.
    pub fn set_record_base_url<S: Into<String>>(&mut self, base_url: S) {
        self.record_base_url = Some(base_url.into());
    }

    pub fn record_base_url(&self) -> Option<&str> {
        self.record_base_url.as_deref()
    }

    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Free-form label, usually the test name, used in diagnostics.
    pub fn set_context<S: Into<String>>(&mut self, context: S) {
        self.context = context.into();
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn set_lower_case_headers(&mut self, value: bool) {
        self.lower_case_headers = value;
    }

    pub fn lower_case_headers(&self) -> bool {
        self.lower_case_headers
    }

    /// Compare header sets ignoring recorded order during playback.
    pub fn set_alpha_sort_headers(&mut self, value: bool) {
        self.alpha_sort_headers = value;
    }

    pub fn alpha_sort_headers(&self) -> bool {
        self.alpha_sort_headers
    }

    /// Rewrite matches of `pattern` in live header lines before playback
    /// comparison, e.g. `token=\w+` -> `token=REDACTED`.
    pub fn add_replacement_in_playback<S: Into<String>>(&mut self, pattern: Regex, replacement: S) {
        self.replacements.push((pattern, replacement.into()));
    }

    pub fn replacements(&self) -> &[(Regex, String)] {
        &self.replacements
    }

    pub fn set_monitor(&mut self, monitor: Arc<dyn ReplayMonitor>) {
        self.monitor = monitor;
    }

    pub fn monitor(&self) -> Arc<dyn ReplayMonitor> {
        self.monitor.clone()
    }

    pub fn set_manipulations(&mut self, manipulations: Arc<dyn InteractionManipulations>) {
        self.manipulations = manipulations;
    }

    pub fn manipulations(&self) -> Arc<dyn InteractionManipulations> {
        self.manipulations.clone()
    }

    pub fn set_service_interoperation(&mut self, interop: Arc<dyn ServiceInteroperation>) {
        self.interop = Some(interop);
    }

    pub fn service_interoperation(&self) -> Arc<dyn ServiceInteroperation> {
        self.interop
            .clone()
            .unwrap_or_else(|| Arc::new(HyperServiceInteroperation::new()))
    }
}
