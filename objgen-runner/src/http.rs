//! The HTTP [`Client`] sending requests to an S3-like service.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use futures_util::StreamExt;
use objgen_engine::choice::{RoundRobin, WeightedChoice};
use objgen_engine::client::{Client, ClientError};
use objgen_engine::request::{OBJECT_NAME_METADATA, Operation, Request, Response};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Body, Method};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use crate::config::{ClientConfig, HostSelection, Target};
use crate::payload::Payload;

/// Response header carrying the name the server assigned to a written object.
pub const OBJECT_NAME_HEADER: &str = "x-object-name";

const USER_AGENT: &str = concat!("objgen/", env!("CARGO_PKG_VERSION"));

enum Hosts {
    RoundRobin(RoundRobin<String>),
    Random {
        choices: WeightedChoice<String>,
        rng: Mutex<SmallRng>,
    },
}

impl Hosts {
    fn new(target: &Target) -> Result<Self> {
        let port = target.port.map(|port| format!(":{port}")).unwrap_or_default();
        let base = |address: &str| format!("{}://{address}{port}", target.scheme.as_str());

        let hosts = match target.host_selection {
            HostSelection::RoundRobin => {
                let bases = target.hosts.iter().map(|host| base(&host.address)).collect();
                Hosts::RoundRobin(RoundRobin::new(bases)?)
            }
            HostSelection::Random => {
                let mut choices = WeightedChoice::new();
                for host in &target.hosts {
                    choices
                        .add_choice(base(&host.address), host.weight)
                        .with_context(|| format!("invalid weight for host {}", host.address))?;
                }
                anyhow::ensure!(!choices.is_empty(), "at least one host is required");
                Hosts::Random {
                    choices,
                    rng: Mutex::new(SmallRng::from_os_rng()),
                }
            }
        };

        Ok(hosts)
    }

    fn next(&self) -> &str {
        match self {
            Hosts::RoundRobin(hosts) => hosts.next(),
            Hosts::Random { choices, rng } => {
                let mut rng = rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                // Never fails, the constructor ensures at least one host.
                choices.choose(&mut *rng).map_or("", String::as_str)
            }
        }
    }
}

impl fmt::Debug for Hosts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hosts::RoundRobin(hosts) => f.debug_tuple("RoundRobin").field(hosts).finish(),
            Hosts::Random { choices, .. } => f.debug_tuple("Random").field(choices).finish(),
        }
    }
}

/// Sends requests to the hosts of a [`Target`] over HTTP.
///
/// Objects are written with `PUT`, read with `GET`, inspected with `HEAD` and removed with
/// `DELETE`. Listing sends a `GET` to the container. Bodies are generated while they are uploaded
/// and downloads are counted without buffering them.
#[derive(Debug)]
pub struct HttpClient {
    http: reqwest::Client,
    hosts: Hosts,
    container_path: String,
    object_prefix: String,
    closed: AtomicBool,
    abort: CancellationToken,
}

impl HttpClient {
    /// Creates a client for the given target.
    pub fn new(target: &Target, config: &ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &target.headers {
            let name = HeaderName::try_from(name.as_str())
                .with_context(|| format!("invalid header name {name:?}"))?;
            let value = HeaderValue::try_from(value.as_str())
                .with_context(|| format!("invalid value for header {name}"))?;
            headers.insert(name, value);
        }

        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            // bodies are counted as they are transferred
            .no_gzip()
            .no_brotli()
            .no_deflate();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        let mut container_path = String::new();
        if let Some(root) = target.uri_root.as_deref().map(|root| root.trim_matches('/'))
            && !root.is_empty()
        {
            container_path.push('/');
            container_path.push_str(root);
        }
        container_path.push('/');
        container_path.push_str(target.container.trim_matches('/'));

        Ok(Self {
            http: builder.build().context("failed to build HTTP client")?,
            hosts: Hosts::new(target)?,
            container_path,
            object_prefix: target.object_prefix.clone(),
            closed: AtomicBool::new(false),
            abort: CancellationToken::new(),
        })
    }

    /// The URL a request is sent to.
    pub fn url(&self, request: &Request) -> String {
        let host = self.hosts.next();
        match request.object() {
            Some(object) => format!(
                "{host}{}/{}{object}",
                self.container_path, self.object_prefix
            ),
            None => format!("{host}{}", self.container_path),
        }
    }

    async fn send(&self, request: &Request) -> Result<Response, ClientError> {
        let operation = request.operation();
        let method = match operation {
            Operation::Write | Operation::Overwrite => Method::PUT,
            Operation::Read | Operation::List => Method::GET,
            Operation::Metadata => Method::HEAD,
            Operation::Delete => Method::DELETE,
        };

        let mut builder = self.http.request(method, self.url(request));
        for (name, value) in request.headers() {
            builder = builder.header(name, value);
        }

        let mut bytes = 0;
        if operation.has_body() {
            let payload = Payload::new(request.body());
            bytes = payload.remaining();
            builder = builder
                .header(header::CONTENT_LENGTH, bytes)
                .body(Body::wrap_stream(ReaderStream::new(payload)));
        }

        let response = builder.send().await.map_err(|error| {
            classify(error, format!("sending {operation} request {}", request.id()))
        })?;

        let status = response.status().as_u16();
        let mut metadata = BTreeMap::new();
        if let Some(name) = response
            .headers()
            .get(OBJECT_NAME_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            metadata.insert(OBJECT_NAME_METADATA.to_owned(), name.to_owned());
        }

        let mut stream = response.bytes_stream();
        let mut received = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|error| {
                classify(error, format!("receiving response of request {}", request.id()))
            })?;
            received += chunk.len() as u64;
        }

        if matches!(operation, Operation::Read | Operation::List) {
            bytes = received;
        }

        tracing::trace!(request = request.id(), %operation, status, bytes, "request completed");
        Ok(Response::with_metadata(request.id(), status, bytes, metadata))
    }
}

fn classify(error: reqwest::Error, context: String) -> ClientError {
    if error.is_timeout() {
        ClientError::Timeout
    } else {
        ClientError::transport(context, error)
    }
}

#[async_trait::async_trait]
impl Client for HttpClient {
    async fn execute(&self, request: Arc<Request>) -> Result<Response, ClientError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::Shutdown);
        }

        tokio::select! {
            biased;
            _ = self.abort.cancelled() => Err(ClientError::Shutdown),
            result = self.send(&request) => result,
        }
    }

    async fn shutdown(&self, immediate: bool) -> bool {
        self.closed.store(true, Ordering::Release);
        if immediate {
            self.abort.cancel();
        }
        tracing::debug!(immediate, "HTTP client shut down");
        true
    }
}

#[cfg(test)]
mod tests {
    use objgen_engine::object::ObjectId;
    use objgen_engine::request::Body as RequestBody;

    use super::*;
    use crate::config::{Host, Scheme};

    fn target() -> Target {
        Target {
            scheme: Scheme::Https,
            hosts: vec![
                Host {
                    address: "a.example.com".into(),
                    weight: 1.0,
                },
                Host {
                    address: "b.example.com".into(),
                    weight: 1.0,
                },
            ],
            port: Some(9000),
            container: "bucket".into(),
            uri_root: Some("/v1/".into()),
            object_prefix: "og-".into(),
            ..Default::default()
        }
    }

    fn read(object: ObjectId) -> Request {
        Request::new(
            1,
            Operation::Read,
            Some(object),
            RequestBody::empty(),
            BTreeMap::new(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn builds_object_urls() {
        let client = HttpClient::new(&target(), &ClientConfig::default()).unwrap();
        let object = ObjectId::from_bytes([0xab; 18]);
        let hex = "ab".repeat(18);

        assert_eq!(
            client.url(&read(object)),
            format!("https://a.example.com:9000/v1/bucket/og-{hex}")
        );
        assert_eq!(
            client.url(&read(object)),
            format!("https://b.example.com:9000/v1/bucket/og-{hex}")
        );
    }

    #[tokio::test]
    async fn lists_the_container() {
        let target = Target {
            hosts: vec![Host {
                address: "localhost".into(),
                weight: 1.0,
            }],
            ..Default::default()
        };
        let client = HttpClient::new(&target, &ClientConfig::default()).unwrap();
        let list = Request::new(
            2,
            Operation::List,
            None,
            RequestBody::empty(),
            BTreeMap::new(),
        )
        .unwrap();

        assert_eq!(client.url(&list), "http://localhost/objgen");
    }

    #[tokio::test]
    async fn random_selection_uses_all_hosts() {
        let target = Target {
            host_selection: HostSelection::Random,
            ..target()
        };
        let client = HttpClient::new(&target, &ClientConfig::default()).unwrap();
        let object = ObjectId::random();

        let urls: Vec<_> = (0..200).map(|_| client.url(&read(object))).collect();
        assert!(urls.iter().any(|url| url.contains("a.example.com")));
        assert!(urls.iter().any(|url| url.contains("b.example.com")));
    }

    #[test]
    fn rejects_invalid_hosts() {
        let no_hosts = Target {
            hosts: Vec::new(),
            ..Default::default()
        };
        assert!(HttpClient::new(&no_hosts, &ClientConfig::default()).is_err());

        let bad_header = Target {
            headers: [("bad header".into(), "x".into())].into(),
            ..Default::default()
        };
        assert!(HttpClient::new(&bad_header, &ClientConfig::default()).is_err());
    }

    #[tokio::test]
    async fn refuses_requests_after_shutdown() {
        let client = HttpClient::new(&target(), &ClientConfig::default()).unwrap();
        assert!(client.shutdown(false).await);

        let result = client.execute(Arc::new(read(ObjectId::random()))).await;
        assert!(matches!(result, Err(ClientError::Shutdown)));
    }
}
