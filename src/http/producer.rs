use std::sync::mpsc::{self, Sender};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::debug;

use crate::codec::Codec;
use crate::config::Properties;
use crate::error::{NotificationError, Result};
use crate::producer::Producer;

const DEFAULT_URL: &str = "http://localhost:8080/callback";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Target of an HTTP callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: String,
}

impl Endpoint {
    /// Accepts `http://` and `https://` URLs.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(NotificationError::Config(format!(
                "endpoint url must be http(s): {}",
                url
            )));
        }
        Ok(Self { url })
    }

    /// Reads `endpoint.url`, defaulting to `http://localhost:8080/callback`.
    pub fn from_properties(props: &Properties) -> Result<Self> {
        Self::new(props.get("endpoint.url").unwrap_or_else(|| DEFAULT_URL.to_string()))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

struct Request {
    body: Vec<u8>,
    content_type: &'static str,
    reply: Sender<Result<StatusCode>>,
}

/// Delivers each notification as the body of a `POST` to an endpoint.
///
/// Requests go through a sender thread that owns the blocking HTTP client,
/// so the producer may be built, used and dropped inside an async runtime.
/// `issue` still blocks its caller until the endpoint answered.
pub struct HttpCallbackProducer {
    event: String,
    endpoint: Endpoint,
    requests: Mutex<Sender<Request>>,
    codec: Codec,
}

impl HttpCallbackProducer {
    pub fn new(event: &str, endpoint: Endpoint) -> Result<Self> {
        Self::with_timeout(event, endpoint, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(event: &str, endpoint: Endpoint, timeout: Duration) -> Result<Self> {
        let (requests, inbox) = mpsc::channel::<Request>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let url = endpoint.url().to_string();
        thread::Builder::new()
            .name(format!("http-callback-{}", event))
            .spawn(move || {
                let client = match Client::builder().timeout(timeout).build() {
                    Ok(client) => client,
                    Err(e) => {
                        let _ = ready_tx.send(Err(NotificationError::Transport(e.to_string())));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Ends once the producer and its sender are dropped.
                while let Ok(request) = inbox.recv() {
                    let outcome = client
                        .post(&url)
                        .header(CONTENT_TYPE, request.content_type)
                        .body(request.body)
                        .send()
                        .and_then(|response| response.error_for_status())
                        .map(|response| response.status())
                        .map_err(|e| NotificationError::Transport(e.to_string()));
                    let _ = request.reply.send(outcome);
                }
            })
            .map_err(|e| NotificationError::Transport(e.to_string()))?;
        ready_rx.recv().map_err(|_| sender_gone())??;

        Ok(Self {
            event: event.to_string(),
            endpoint,
            requests: Mutex::new(requests),
            codec: Codec::default(),
        })
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

fn sender_gone() -> NotificationError {
    NotificationError::Transport("http callback sender stopped".to_string())
}

pub(crate) fn content_type(codec: Codec) -> &'static str {
    match codec {
        Codec::Json => "application/json",
        Codec::Bitcode => "application/octet-stream",
    }
}

impl<T: Serialize> Producer<T> for HttpCallbackProducer {
    fn issue(&self, payload: &T) -> Result<()> {
        let body = self.codec.encode(payload)?;
        let (reply, outcome) = mpsc::channel();
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .send(Request {
                body,
                content_type: content_type(self.codec),
                reply,
            })
            .map_err(|_| sender_gone())?;
        let status = outcome.recv().map_err(|_| sender_gone())??;
        debug!(event = %self.event, url = %self.endpoint.url, %status, "posted notification");
        Ok(())
    }

    fn event_name(&self) -> &str {
        &self.event
    }
}
