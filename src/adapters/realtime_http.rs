use std::sync::mpsc::{self, Sender, SyncSender};
use std::thread::JoinHandle;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use serde_json::{Value, json};
use tokio::sync::oneshot;

use crate::adapters::realtime::{
    RealtimeChannel, RealtimeConnection, RealtimeConnector, RealtimeError,
};
use crate::adapters::sse::SseDecoder;
use crate::domain::realtime_event::{OutboundEvent, RealtimeMessage};

const SSE_PROTOCOL_VERSION: &str = "1.2";

/// Pub/sub over plain HTTP: REST publish plus a server-sent-events
/// subscription, the interface the hosted realtime provider exposes.
#[derive(Debug, Clone)]
pub struct HttpRealtimeConnector {
    publish_client: Client,
    connect_timeout: Duration,
    rest_base: Url,
    sse_base: Url,
}

/// Publishing half of a live subscription. The stream itself is read on a
/// dedicated thread that `close` signals and joins.
#[derive(Debug)]
pub struct HttpRealtimeChannel {
    client: Client,
    publish_url: Url,
    token: String,
    shutdown: Option<oneshot::Sender<()>>,
    reader: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct Subscription {
    url: Url,
    token: String,
    channel_id: String,
    connect_timeout: Duration,
}

impl HttpRealtimeConnector {
    pub fn new(rest_base: &str, sse_base: &str, timeout: Duration) -> Result<Self, RealtimeError> {
        let publish_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            publish_client,
            connect_timeout: timeout,
            rest_base: parse_base(rest_base)?,
            sse_base: parse_base(sse_base)?,
        })
    }
}

impl RealtimeConnector for HttpRealtimeConnector {
    type Channel = HttpRealtimeChannel;

    fn connect(
        &self,
        token: &str,
        channel_id: &str,
    ) -> Result<RealtimeConnection<HttpRealtimeChannel>, RealtimeError> {
        let subscription = Subscription {
            url: endpoint(&self.sse_base, &["sse"])?,
            token: token.to_string(),
            channel_id: channel_id.to_string(),
            connect_timeout: self.connect_timeout,
        };
        let publish_url = endpoint(&self.rest_base, &["channels", channel_id, "messages"])?;

        let (sender, receiver) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let reader = std::thread::Builder::new()
            .name("realtime-sse".to_string())
            .spawn(move || run_reader(subscription, sender, ready_tx, shutdown_rx))?;

        let opened = ready_rx.recv().unwrap_or(Err(RealtimeError::Closed));
        if let Err(error) = opened {
            if reader.join().is_err() {
                tracing::warn!(channel_id, "realtime stream reader panicked");
            }
            return Err(error);
        }

        tracing::info!(channel_id, "realtime channel connected");

        let channel = HttpRealtimeChannel {
            client: self.publish_client.clone(),
            publish_url,
            token: token.to_string(),
            shutdown: Some(shutdown_tx),
            reader: Some(reader),
        };
        Ok(RealtimeConnection::new(channel, receiver, channel_id))
    }
}

impl RealtimeChannel for HttpRealtimeChannel {
    fn publish(&self, event: &OutboundEvent) -> Result<(), RealtimeError> {
        let response = self
            .client
            .post(self.publish_url.clone())
            .bearer_auth(&self.token)
            .json(&json!({ "name": event.name(), "data": event.data() }))
            .send()?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(RealtimeError::Status {
            status: status.as_u16(),
            body: response.text().unwrap_or_default(),
        })
    }

    fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(reader) = self.reader.take()
            && reader.join().is_err()
        {
            tracing::warn!("realtime stream reader panicked");
        }
    }
}

impl Drop for HttpRealtimeChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Owns a single-threaded runtime for the lifetime of one subscription.
/// The outcome of opening the stream is reported on `ready` before any
/// message is forwarded.
fn run_reader(
    subscription: Subscription,
    sender: Sender<RealtimeMessage>,
    ready: SyncSender<Result<(), RealtimeError>>,
    shutdown: oneshot::Receiver<()>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            let _ = ready.send(Err(error.into()));
            return;
        }
    };

    let channel_id = subscription.channel_id.clone();
    runtime.block_on(subscription.run(sender, ready, shutdown));
    tracing::debug!(channel_id = %channel_id, "realtime stream reader stopped");
}

impl Subscription {
    async fn open(&self) -> Result<reqwest::Response, RealtimeError> {
        let client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .build()?;
        let response = client
            .get(self.url.clone())
            .query(&[
                ("v", SSE_PROTOCOL_VERSION),
                ("channels", self.channel_id.as_str()),
                ("accessToken", self.token.as_str()),
            ])
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(RealtimeError::Status {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        })
    }

    async fn run(
        self,
        sender: Sender<RealtimeMessage>,
        ready: SyncSender<Result<(), RealtimeError>>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let opened = tokio::select! {
            _ = &mut shutdown => return,
            opened = self.open() => opened,
        };
        let mut response = match opened {
            Ok(response) => response,
            Err(error) => {
                let _ = ready.send(Err(error));
                return;
            }
        };
        if ready.send(Ok(())).is_err() {
            return;
        }

        let mut decoder = SseDecoder::new();
        let mut pending = Vec::new();

        loop {
            let chunk = tokio::select! {
                _ = &mut shutdown => break,
                chunk = response.chunk() => chunk,
            };
            let chunk = match chunk {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(error) => {
                    tracing::warn!(
                        channel_id = %self.channel_id,
                        error = %error,
                        "realtime stream read failed"
                    );
                    break;
                }
            };

            pending.extend_from_slice(&chunk);
            while let Some(end) = pending.iter().position(|byte| *byte == b'\n') {
                let line: Vec<u8> = pending.drain(..=end).collect();
                let line = String::from_utf8_lossy(&line[..end]);
                if !self.forward_line(&mut decoder, &line, &sender) {
                    return;
                }
            }
        }
    }

    /// Returns `false` once nobody listens for messages anymore.
    fn forward_line(
        &self,
        decoder: &mut SseDecoder,
        line: &str,
        sender: &Sender<RealtimeMessage>,
    ) -> bool {
        let Some(event) = decoder.push_line(line) else {
            return true;
        };

        match parse_provider_messages(&event.data) {
            Ok(messages) => messages.into_iter().all(|message| sender.send(message).is_ok()),
            Err(error) => {
                tracing::warn!(
                    channel_id = %self.channel_id,
                    error = %error,
                    "skipping undecodable realtime event"
                );
                true
            }
        }
    }
}

/// Decodes one SSE `data` payload into channel messages.
///
/// The provider sends either one message object or an array of them; each
/// message's `data` may itself be a JSON document encoded as a string.
/// Entries without a `name` are skipped.
pub fn parse_provider_messages(raw: &str) -> Result<Vec<RealtimeMessage>, RealtimeError> {
    let payload: Value = serde_json::from_str(raw)?;

    let entries = match payload {
        Value::Array(entries) => entries,
        Value::Object(_) => vec![payload],
        _ => return Ok(Vec::new()),
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| {
            let name = entry.get("name")?.as_str()?.to_string();
            let data = match entry.get("data") {
                Some(Value::String(text)) => {
                    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone()))
                }
                Some(other) => other.clone(),
                None => Value::Null,
            };
            Some(RealtimeMessage::new(name, data))
        })
        .collect())
}

/// Appends percent-encoded path segments to `base`. `None` when the base
/// cannot carry a path.
pub(crate) fn endpoint_url(base: &Url, segments: &[&str]) -> Option<Url> {
    let mut url = base.clone();
    url.path_segments_mut().ok()?.pop_if_empty().extend(segments);
    Some(url)
}

fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, RealtimeError> {
    endpoint_url(base, segments).ok_or_else(|| RealtimeError::InvalidUrl(base.to_string()))
}

fn parse_base(raw: &str) -> Result<Url, RealtimeError> {
    Url::parse(raw.trim()).map_err(|error| RealtimeError::InvalidUrl(format!("{raw}: {error}")))
}
