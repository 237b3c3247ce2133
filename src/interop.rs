use crate::data::{Body, ServiceResponse};
use crate::error::Error;
use crate::manipulations::InteractionManipulations;
use crate::util;
use async_trait::async_trait;
use hyper::{body, Request};
use hyper_tls::HttpsConnector;
use std::fmt::Debug;
use tracing::debug;

/// The outbound-HTTP collaborator used during recording. The core treats
/// this as an opaque synchronous call that either yields a
/// [`ServiceResponse`] or fails with a transport error.
#[async_trait]
pub trait ServiceInteroperation: Debug + Send + Sync {
    #[allow(clippy::too_many_arguments)]
    async fn invoke_service_endpoint(
        &self,
        method: &str,
        body: &Body,
        content_type: &str,
        url: &str,
        headers: &[String],
        manipulations: &dyn InteractionManipulations,
        lower_case_headers: bool,
    ) -> Result<ServiceResponse, Error>;
}

/// Reaches the real service with a hyper client over plain HTTP or TLS.
#[derive(Debug, Default)]
pub struct HyperServiceInteroperation;

impl HyperServiceInteroperation {
    pub fn new() -> Self {
        HyperServiceInteroperation
    }
}

#[async_trait]
impl ServiceInteroperation for HyperServiceInteroperation {
    async fn invoke_service_endpoint(
        &self,
        method: &str,
        request_body: &Body,
        _content_type: &str,
        url: &str,
        headers: &[String],
        manipulations: &dyn InteractionManipulations,
        _lower_case_headers: bool,
    ) -> Result<ServiceResponse, Error> {
        let mut request_builder = Request::builder().uri(url).method(method);

        if let Some(headers_mut) = request_builder.headers_mut() {
            // the client's host header names this proxy, not the real service
            let forwarded: Vec<String> = headers
                .iter()
                .filter(|line| !util::split_header_line(line).0.eq_ignore_ascii_case("host"))
                .cloned()
                .collect();
            util::put_header_lines(headers_mut, &forwarded)?;
        }

        let request: Request<hyper::Body> = match request_body {
            Body::Text(text) => request_builder.body(text.clone().into())?,
            Body::Binary(bytes) => request_builder.body(bytes.clone().into())?,
        };

        debug!(method, url, "forwarding request to the real service");

        let client = hyper::Client::builder().build(HttpsConnector::new());
        let response = client.request(request).await.map_err(|source| Error::Transport {
            method: method.to_string(),
            url: url.to_string(),
            source,
        })?;

        let status_code = response.status().as_u16();
        let content_type = response
            .headers()
            .get(hyper::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();

        let mut response_headers = Vec::new();
        for (name, value) in response.headers() {
            // opaque header values are skipped
            let value = match value.to_str() {
                Ok(value) => value,
                Err(_) => continue,
            };
            let replaced = manipulations.header_replacement(name.as_str(), value);
            response_headers.push(format!("{}: {}", name.as_str(), replaced));
        }

        let bytes = body::to_bytes(response.into_body()).await?;
        let response_body = if util::is_text(&content_type) {
            Body::Text(String::from_utf8_lossy(&bytes).into_owned())
        } else {
            Body::Binary(bytes.to_vec())
        };

        Ok(ServiceResponse::new(response_body, content_type, status_code, response_headers))
    }
}
