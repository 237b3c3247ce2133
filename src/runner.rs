use crate::error::Error;
use crate::server::RepriseServer;
use crate::session::Session;
use hyper::header::CONTENT_TYPE;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use std::{convert::Infallible, net::SocketAddr, sync::Once, thread};
use tokio::runtime::Runtime;
use tracing::error;

static INITIALIZE_REPRISE: Once = Once::new();

/// Bind the bridge once per process. Later sessions reuse the listener on
/// the port the first one chose.
pub(crate) fn start_once(port: u16) {
    INITIALIZE_REPRISE.call_once(|| {
        let mut server_instance = RepriseServer::instance();

        server_instance.join_handle = Some(thread::spawn(move || {
            Runtime::new().unwrap().block_on(async move {
                let addr = SocketAddr::from(([127, 0, 0, 1], port));

                let server = Server::bind(&addr).serve(make_service_fn(|_| async {
                    Ok::<_, Infallible>(service_fn(|request| async move {
                        match handle_request(request).await {
                            Ok(response) => Ok::<_, Infallible>(response),
                            Err(failure) => {
                                let message = format!("Reprise server error: {}", failure);
                                Session::set_error(failure);
                                Ok(Response::builder()
                                    .status(500)
                                    .header(CONTENT_TYPE, "text/plain")
                                    .body(Body::from(message))
                                    .unwrap_or_else(|_| Response::new(Body::empty())))
                            }
                        }
                    }))
                }));

                if let Err(failure) = server.await {
                    error!(%failure, "reprise server terminated");
                }
            });
        }));

        server_instance.release_instance();
    });
}

async fn handle_request(request: Request<Body>) -> Result<Response<Body>, Error> {
    let mut instance = RepriseServer::instance();
    let outcome = instance.process(request).await;
    if outcome.is_err() {
        instance.failed = true;
    }
    instance.release_instance();
    outcome
}
