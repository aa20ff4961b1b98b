use std::collections::VecDeque;

use async_trait::async_trait;
use futures::{
    stream::{self, BoxStream},
    StreamExt,
};
use reqwest::{header, Client, RequestBuilder};
use serde_json::{json, Value};
use shared::{
    error::SwapError,
    protocol::{
        FileData, InferencePayload, ProgressEvent, QueueJoinRequest, QueueJoinResponse,
        QueueMessage, RawResponse,
    },
};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::sse::SseDecoder;

const UNEXPECTED_REMOTE_ERROR: &str = "the remote service reported an unexpected error";

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Progress(ProgressEvent),
    /// Final payload of the call. Always the last event of a stream.
    Completed(Option<RawResponse>),
}

pub type InferenceStream = BoxStream<'static, Result<TransportEvent, SwapError>>;

#[async_trait]
pub trait InferenceTransport: Send + Sync {
    /// Starts one call. Dropping the returned stream abandons it.
    async fn run_inference(&self, payload: &InferencePayload)
        -> Result<InferenceStream, SwapError>;
}

pub fn resolve_space_url(space: &str) -> Result<Url, SwapError> {
    let space = space.trim();
    let mut url = if space.starts_with("http://") || space.starts_with("https://") {
        Url::parse(space)
            .map_err(|err| SwapError::Transport(format!("invalid space url '{space}': {err}")))?
    } else {
        let (owner, name) = space
            .split_once('/')
            .filter(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'))
            .ok_or_else(|| SwapError::Transport(format!("invalid space id '{space}'")))?;
        let host = format!("{owner}-{name}")
            .to_ascii_lowercase()
            .replace(['.', '_'], "-");
        Url::parse(&format!("https://{host}.hf.space/"))
            .map_err(|err| SwapError::Transport(format!("invalid space id '{space}': {err}")))?
    };

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn transport_error(err: reqwest::Error) -> SwapError {
    match err.status() {
        Some(status) => SwapError::Transport(format!("HTTP {status}: {err}")),
        None => SwapError::Transport(err.to_string()),
    }
}

#[derive(Clone)]
pub struct GradioTransport {
    http: Client,
    base_url: Url,
    api_name: String,
    hf_token: Option<String>,
}

impl GradioTransport {
    pub fn new(space: &str, api_name: impl Into<String>) -> Result<Self, SwapError> {
        Ok(Self {
            http: Client::new(),
            base_url: resolve_space_url(space)?,
            api_name: api_name.into(),
            hf_token: None,
        })
    }

    pub fn with_hf_token(mut self, token: Option<String>) -> Self {
        self.hf_token = token;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, SwapError> {
        self.base_url
            .join(path)
            .map_err(|err| SwapError::Transport(format!("invalid endpoint '{path}': {err}")))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.hf_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn resolve_output(&self, output: Value) -> Result<Option<RawResponse>, SwapError> {
        if output.is_null() {
            return Ok(None);
        }
        if let Some(error) = output.get("error").filter(|error| !error.is_null()) {
            return Ok(Some(RawResponse::Json(json!({ "error": error }))));
        }
        let Some(data) = output.get("data") else {
            return Ok(Some(RawResponse::Json(output)));
        };

        let first = match data {
            Value::Array(items) if items.len() == 1 => &items[0],
            other => other,
        };
        if first.is_object() {
            if let Ok(file) = serde_json::from_value::<FileData>(first.clone()) {
                if file.url.is_some() || file.path.is_some() {
                    return self.download(file).await.map(Some);
                }
            }
        }

        Ok(Some(RawResponse::Json(json!({ "data": data }))))
    }

    async fn download(&self, file: FileData) -> Result<RawResponse, SwapError> {
        let location = match (&file.url, &file.path) {
            (Some(url), _) => url.clone(),
            (None, Some(path)) => format!("gradio_api/file={path}"),
            (None, None) => {
                return Err(SwapError::Protocol("file output without location".to_string()))
            }
        };
        let url = self.endpoint(&location)?;
        debug!(url = %url, "downloading file output");

        let response = self
            .authorized(self.http.get(url))
            .send()
            .await
            .map_err(transport_error)?
            .error_for_status()
            .map_err(transport_error)?;
        let mime_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .or(file.mime_type);
        let bytes = response.bytes().await.map_err(transport_error)?.to_vec();

        Ok(RawResponse::Binary { bytes, mime_type })
    }
}

#[async_trait]
impl InferenceTransport for GradioTransport {
    async fn run_inference(
        &self,
        payload: &InferencePayload,
    ) -> Result<InferenceStream, SwapError> {
        let session_hash = Uuid::new_v4().simple().to_string();
        let join = QueueJoinRequest {
            data: payload.data(),
            api_name: self.api_name.clone(),
            fn_index: None,
            session_hash: session_hash.clone(),
            event_data: None,
            trigger_id: None,
        };

        let joined: QueueJoinResponse = self
            .authorized(self.http.post(self.endpoint("gradio_api/queue/join")?))
            .json(&join)
            .send()
            .await
            .map_err(transport_error)?
            .error_for_status()
            .map_err(transport_error)?
            .json()
            .await
            .map_err(transport_error)?;
        info!(event_id = %joined.event_id, api_name = %self.api_name, "joined inference queue");

        let mut data_url = self.endpoint("gradio_api/queue/data")?;
        data_url
            .query_pairs_mut()
            .append_pair("session_hash", &session_hash);
        let response = self
            .authorized(self.http.get(data_url))
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(transport_error)?
            .error_for_status()
            .map_err(transport_error)?;

        let state = QueueStream {
            body: response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                .boxed(),
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
            finished: false,
            transport: self.clone(),
        };
        Ok(stream::unfold(state, QueueStream::next_item).boxed())
    }
}

struct QueueStream {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<TransportEvent, SwapError>>,
    finished: bool,
    transport: GradioTransport,
}

impl QueueStream {
    async fn next_item(mut self) -> Option<(Result<TransportEvent, SwapError>, Self)> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some((item, self));
            }
            if self.finished {
                return None;
            }

            match self.body.next().await {
                Some(Ok(chunk)) => {
                    for data in self.decoder.feed(&chunk) {
                        self.handle_record(&data).await;
                        if self.finished {
                            break;
                        }
                    }
                }
                Some(Err(err)) => self.fail(transport_error(err)),
                None => {
                    if let Some(data) = self.decoder.finish() {
                        self.handle_record(&data).await;
                    }
                    self.finished = true;
                }
            }
        }
    }

    async fn handle_record(&mut self, data: &str) {
        let message = match serde_json::from_str::<QueueMessage>(data) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "malformed queue message");
                self.fail(SwapError::Protocol(format!("malformed queue message: {err}")));
                return;
            }
        };

        match message {
            QueueMessage::Estimation {
                queue_size,
                rank,
                rank_eta,
            } => {
                debug!(?rank, ?queue_size, ?rank_eta, "queue estimation");
                self.emit(ProgressEvent::Estimation {
                    queue_size,
                    rank,
                    rank_eta,
                })
            }
            QueueMessage::ProcessStarts { eta } => self.emit(ProgressEvent::ProcessStarts { eta }),
            QueueMessage::ProcessCompleted { success, output } => {
                self.emit(ProgressEvent::ProcessCompleted {
                    success,
                    output: output.clone(),
                });
                let completed = self
                    .transport
                    .resolve_output(output)
                    .await
                    .map(TransportEvent::Completed);
                self.pending.push_back(completed);
                self.finished = true;
            }
            QueueMessage::UnexpectedError { message } => self.fail(SwapError::Remote(
                message.unwrap_or_else(|| UNEXPECTED_REMOTE_ERROR.to_string()),
            )),
            QueueMessage::CloseStream => self.finished = true,
            QueueMessage::Ignored => {}
        }
    }

    fn emit(&mut self, event: ProgressEvent) {
        self.pending.push_back(Ok(TransportEvent::Progress(event)));
    }

    fn fail(&mut self, err: SwapError) {
        self.pending.push_back(Err(err));
        self.finished = true;
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
