use crate::configuration::{RepriseConfiguration, RepriseMode};
use crate::error::Error;
use crate::interactor::Interactor;
use crate::record::MarkdownRecorder;
use crate::replay::MarkdownReplayer;
use crate::runner;
use crate::script::ScriptDocument;
use crate::server::RepriseServer;
use lazy_static::lazy_static;
use std::sync::{Arc, Condvar, Mutex};
use tracing::info;

lazy_static! {
    static ref TEST_SESSION: Session = Session::new();
}

/// One test at a time talks to the shared server. `before_test` installs a
/// configuration and blocks until the previous session has finished;
/// `after_test` reconciles the script and surfaces any failure latched
/// while requests were in flight.
pub struct Session {
    lock: Arc<(Mutex<bool>, Condvar)>,
    error: Mutex<Option<Error>>,
}

impl Session {
    fn new() -> Self {
        Session {
            lock: Arc::new((Mutex::new(false), Condvar::new())),
            error: Mutex::new(None),
        }
    }

    /// Latch the first failure of the session; later ones keep the original
    /// diagnostic intact.
    pub(crate) fn set_error(error: Error) {
        if let Ok(mut slot) = TEST_SESSION.error.lock() {
            if slot.is_none() {
                *slot = Some(error);
            }
        }
    }

    pub fn before_test(configuration: RepriseConfiguration) -> Result<(), Error> {
        TEST_SESSION.enter_test();

        // a failure left behind by an aborted session belongs to nobody now
        if let Ok(mut slot) = TEST_SESSION.error.lock() {
            slot.take();
        }

        let interactor = match build_interactor(&configuration) {
            Ok(interactor) => interactor,
            Err(failure) => {
                TEST_SESSION.exit_test();
                return Err(failure);
            }
        };

        info!(
            mode = ?configuration.mode(),
            script = %configuration.script_path().display(),
            "session starting"
        );

        runner::start_once(configuration.port());

        let mut instance = RepriseServer::instance();
        instance.begin_session(configuration, interactor);
        instance.release_instance();

        Ok(())
    }

    pub fn after_test() -> Result<(), Error> {
        let mut instance = RepriseServer::instance();

        let latched = TEST_SESSION
            .error
            .lock()
            .map(|mut slot| slot.take())
            .unwrap_or(None);
        let failed = instance.failed || latched.is_some();

        let finish = match instance.interactor.as_ref() {
            Some(interactor) => interactor.finished_script(instance.last_played(), failed),
            None => Ok(()),
        };

        instance.reset();
        instance.release_instance();

        TEST_SESSION.exit_test();

        match latched {
            Some(failure) => Err(failure),
            None => finish,
        }
    }

    fn enter_test(&self) {
        let (lock, condvar) = &*self.lock.clone();
        let mut is_test_running = condvar
            .wait_while(lock.lock().unwrap(), |is_test_running| *is_test_running)
            .unwrap();
        *is_test_running = true;
    }

    fn exit_test(&self) {
        let (lock, condvar) = &*self.lock.clone();
        let mut is_test_running = lock.lock().unwrap();
        *is_test_running = false;

        condvar.notify_one();
    }
}

fn build_interactor(configuration: &RepriseConfiguration) -> Result<Arc<dyn Interactor>, Error> {
    match configuration.mode() {
        RepriseMode::Playback => {
            let document = ScriptDocument::load(configuration.script_path())?;
            let mut replayer = MarkdownReplayer::with_monitor(document, configuration.monitor());
            if configuration.alpha_sort_headers() {
                replayer = replayer.with_alpha_sorting_of_headers();
            }
            for (pattern, replacement) in configuration.replacements() {
                replayer = replayer.with_replacement_in_playback(pattern.clone(), replacement.clone());
            }
            Ok(Arc::new(replayer))
        }
        RepriseMode::Record => {
            let base_url = configuration
                .record_base_url()
                .ok_or(Error::NotConfigured)?
                .to_string();
            Ok(Arc::new(
                MarkdownRecorder::new(configuration.script_path(), base_url)
                    .with_service_interoperation(configuration.service_interoperation())
                    .with_manipulations(configuration.manipulations()),
            ))
        }
    }
}
