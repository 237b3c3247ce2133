//! Service virtualization for HTTP test suites. In recording mode live
//! traffic to a real service is persisted as a human-readable markdown
//! script; in playback mode the script is replayed, each incoming request
//! strictly verified against what was recorded.

mod configuration;
mod data;
mod error;
mod interactor;
mod interop;
mod manipulations;
mod monitor;
mod record;
mod replay;
mod runner;
mod script;
mod server;
mod session;
mod util;

pub use configuration::{RepriseConfiguration, RepriseMode, DEFAULT_PORT};
pub use data::{Body, Interaction, InteractionState, RequestDetails, ResponseDetails, ServiceResponse};
pub use error::Error;
pub use interactor::Interactor;
pub use interop::{HyperServiceInteroperation, ServiceInteroperation};
pub use manipulations::{
    BuiltManipulations, InteractionManipulations, ManipulationsBuilder, NullManipulations,
};
pub use monitor::{
    CollectingMonitor, ConsoleMonitor, DefaultMonitor, Mismatch, ReplayMonitor, VerificationError,
    VerificationErrorKind,
};
pub use record::MarkdownRecorder;
pub use replay::MarkdownReplayer;
pub use reprise_codegen::{reprise_playback_test, reprise_record_test};
pub use script::ScriptDocument;
pub use session::Session;
