use crate::configuration::RepriseConfiguration;
use crate::data;
use crate::error::Error;
use crate::interactor::Interactor;
use crate::manipulations::InteractionManipulations;
use crate::util;
use hyper::header::{CONTENT_TYPE, HOST};
use hyper::{body, Body, Request, Response};
use lazy_static::lazy_static;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use tracing::debug;

lazy_static! {
    static ref SERVER_INSTANCE: Arc<(Mutex<Option<RepriseServer>>, Condvar)> =
        Arc::new((Mutex::new(Some(RepriseServer::new())), Condvar::new()));
}

/// The HTTP bridge between clients under test and the [`Interactor`].
/// There is one instance per process, handed exclusively to whoever is
/// working with it; requests therefore never overlap each other's use of
/// the interaction counter.
#[derive(Debug)]
pub struct RepriseServer {
    pub(crate) configuration: Option<RepriseConfiguration>,
    pub(crate) interactor: Option<Arc<dyn Interactor>>,
    pub(crate) join_handle: Option<JoinHandle<()>>,
    pub(crate) failed: bool,
    next_interaction: AtomicUsize,
}

impl RepriseServer {
    fn new() -> Self {
        RepriseServer {
            configuration: None,
            interactor: None,
            join_handle: None,
            failed: false,
            next_interaction: AtomicUsize::new(0),
        }
    }

    pub(crate) fn instance() -> Self {
        let (mutex, condvar) = &*SERVER_INSTANCE.clone();
        let mut guard = condvar
            .wait_while(mutex.lock().unwrap(), |option| option.is_none())
            .unwrap();

        let instance = guard.take().unwrap();
        condvar.notify_one();

        instance
    }

    pub(crate) fn release_instance(self) {
        let (mutex, condvar) = &*SERVER_INSTANCE.clone();
        *mutex.lock().unwrap() = Some(self);
        condvar.notify_one();
    }

    pub(crate) fn begin_session(
        &mut self,
        configuration: RepriseConfiguration,
        interactor: Arc<dyn Interactor>,
    ) {
        self.configuration = Some(configuration);
        self.interactor = Some(interactor);
        self.next_interaction.store(0, Ordering::SeqCst);
        self.failed = false;
    }

    /// Ordinal of the most recently started interaction, `None` before the
    /// first one.
    pub(crate) fn last_played(&self) -> Option<usize> {
        self.next_interaction.load(Ordering::SeqCst).checked_sub(1)
    }

    pub(crate) fn reset(&mut self) {
        self.configuration = None;
        self.interactor = None;
        self.next_interaction.store(0, Ordering::SeqCst);
        self.failed = false;
    }

    pub(crate) async fn process(
        &mut self,
        mut request: Request<Body>,
    ) -> Result<Response<Body>, Error> {
        let configuration = self.configuration.as_ref().ok_or(Error::NotConfigured)?;
        let interactor = self.interactor.clone().ok_or(Error::NotConfigured)?;
        let manipulations = configuration.manipulations();
        let lower_case_headers = configuration.lower_case_headers();
        let context = configuration.context().to_string();

        let index = self.next_interaction.fetch_add(1, Ordering::SeqCst);

        let method = request.method().to_string();
        let uri = request.uri().to_string();
        // proxy-form request targets carry the full URL already
        let path = if uri.starts_with("http://") || uri.starts_with("https://") {
            util::origin_form(&uri).to_string()
        } else {
            uri.clone()
        };
        let url = if uri.starts_with("http://") || uri.starts_with("https://") {
            uri
        } else {
            let host = request
                .headers()
                .get(HOST)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("localhost");
            format!("http://{}{}", host, uri)
        };

        debug!(interaction = index, method = %method, path = %path, "interaction started");

        let mut interaction = interactor.new_interaction(&method, &path, index, &url, &context)?;

        let content_type = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();

        let mut header_lines = Vec::new();
        for (name, value) in request.headers() {
            let value = match value.to_str() {
                Ok(value) => value,
                Err(_) => continue,
            };
            let line = format!(
                "{}: {}",
                name.as_str(),
                manipulations.header_replacement(name.as_str(), value)
            );
            header_lines.push(line.clone());
            manipulations.change_single_header_for_request_to_real_service(&line, &mut header_lines);
        }
        manipulations.change_all_headers_for_request_to_real_service(&mut header_lines);

        let body_bytes = body::to_bytes(request.body_mut())
            .await
            .map_err(|_| Error::InvalidBody)?;
        let body_text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body_text = manipulations.change_body_for_request_to_real_service(body_text);

        let target_url = manipulations.change_url_for_request_to_real_service(url);

        interaction.note_request(
            &method,
            &target_url,
            header_lines.clone(),
            data::Body::Text(body_text),
            &content_type,
        );

        let service_response = interactor
            .get_service_response_for_request(
                &method,
                &target_url,
                &header_lines,
                &mut interaction,
                lower_case_headers,
            )
            .await?;

        let service_response = apply_response_manipulations(manipulations.as_ref(), service_response);

        interaction.note_response(
            service_response.headers.clone(),
            service_response.body.clone(),
            service_response.status_code,
            &service_response.content_type,
        );
        interactor.add_interaction(interaction)?;

        // this last change reaches the client only, never the recording
        let client_body = match &service_response.body {
            data::Body::Text(text) => Body::from(
                manipulations.change_body_for_client_response_after_recording(text.clone()),
            ),
            data::Body::Binary(bytes) => Body::from(bytes.clone()),
        };

        let mut response_builder = Response::builder().status(service_response.status_code);
        if let Some(header_map) = response_builder.headers_mut() {
            util::put_header_lines(header_map, replayable_headers(&service_response.headers))?;
            if !service_response.content_type.is_empty() && !header_map.contains_key(CONTENT_TYPE) {
                header_map.insert(
                    CONTENT_TYPE,
                    hyper::header::HeaderValue::from_str(&service_response.content_type)?,
                );
            }
        }

        debug!(interaction = index, status = service_response.status_code, "interaction finished");

        Ok(response_builder.body(client_body)?)
    }
}

fn apply_response_manipulations(
    manipulations: &dyn InteractionManipulations,
    response: data::ServiceResponse,
) -> data::ServiceResponse {
    let mut headers = Vec::new();
    for (index, header) in response.headers.iter().enumerate() {
        if let Some(changed) =
            manipulations.change_single_header_returned_back_from_real_service(index, header.clone())
        {
            headers.push(changed);
        }
    }
    manipulations.change_all_headers_returned_back_from_real_service(&mut headers);
    let response = response.with_revised_headers(headers);

    match &response.body {
        data::Body::Text(text) => {
            let changed =
                manipulations.change_body_returned_back_from_real_service_for_recording(text.clone());
            if &changed != text {
                response.with_revised_body(data::Body::Text(changed))
            } else {
                response
            }
        }
        data::Body::Binary(_) => response,
    }
}

/// `Transfer-Encoding: chunked` was how the body arrived, not part of the
/// replayed payload; everything is written in one piece here.
fn replayable_headers(headers: &[String]) -> impl Iterator<Item = &String> {
    headers.iter().filter(|line| {
        let (name, value) = util::split_header_line(line);
        !(name.eq_ignore_ascii_case("transfer-encoding") && value.contains("chunked"))
    })
}
