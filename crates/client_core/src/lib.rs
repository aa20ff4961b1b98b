use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use futures::StreamExt;
use shared::{
    domain::{default_mode_tags, ImageFile, ModeTags, SwapRequest},
    error::SwapError,
    protocol::{InferencePayload, RawResponse},
};
use tracing::{debug, info, info_span, warn, Instrument};

pub mod config;
pub mod normalizer;
pub mod object_url;
pub mod progress;
pub mod request_slot;
mod sse;
pub mod transport;
pub mod view;

pub use config::{load_settings, ClientSettings};
pub use normalizer::{normalize, ImageRef};
pub use object_url::{ObjectUrlGuard, ObjectUrlRegistry};
pub use request_slot::{RequestSlot, RequestTicket};
pub use transport::{GradioTransport, InferenceStream, InferenceTransport, TransportEvent};
pub use view::{Phase, SwapView, UiState, Visibility};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayedImage {
    pub src: String,
}

#[derive(Default)]
struct ClientState {
    ui: UiState,
    slot: RequestSlot,
}

/// At most one request is in flight: a new submission, [`SwapClient::cancel`]
/// or a hidden host cancels the current one, and nothing a cancelled request
/// produces afterwards reaches the view.
pub struct SwapClient {
    transport: Arc<dyn InferenceTransport>,
    view: Arc<dyn SwapView>,
    object_urls: ObjectUrlRegistry,
    mode_tags: ModeTags,
    request_timeout: Duration,
    state: Mutex<ClientState>,
}

impl SwapClient {
    pub fn new(transport: Arc<dyn InferenceTransport>, view: Arc<dyn SwapView>) -> Self {
        Self {
            transport,
            view,
            object_urls: ObjectUrlRegistry::new(),
            mode_tags: default_mode_tags(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            state: Mutex::new(ClientState::default()),
        }
    }

    pub fn from_settings(
        settings: &ClientSettings,
        view: Arc<dyn SwapView>,
    ) -> Result<Self, SwapError> {
        let transport = GradioTransport::new(&settings.space, settings.api_name.clone())?
            .with_hf_token(settings.hf_token.clone());
        info!(space = %transport.base_url(), api_name = %settings.api_name, "using gradio transport");
        Ok(Self::new(Arc::new(transport), view)
            .with_mode_tags(settings.mode_tags.clone())
            .with_request_timeout(settings.request_timeout()))
    }

    pub fn with_mode_tags(mut self, mode_tags: ModeTags) -> Self {
        self.mode_tags = mode_tags;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn object_urls(&self) -> &ObjectUrlRegistry {
        &self.object_urls
    }

    pub fn ui_state(&self) -> UiState {
        self.lock_state().ui.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.lock_state().slot.is_busy()
    }

    pub async fn submit(
        &self,
        target_image: Option<ImageFile>,
        source_image: Option<ImageFile>,
        anonymization_ratio: &str,
        adversarial_ratio: &str,
    ) -> Result<DisplayedImage, SwapError> {
        let request = match SwapRequest::from_form(
            target_image,
            source_image,
            anonymization_ratio,
            adversarial_ratio,
            self.mode_tags.clone(),
        ) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "rejected submission");
                let mut state = self.lock_state();
                state.ui.reject(err.to_string());
                self.view.render(&state.ui);
                return Err(err.into());
            }
        };

        let in_flight = {
            let mut state = self.lock_state();
            let ticket = state.slot.begin();
            state.ui.begin();
            self.view.render(&state.ui);
            InFlight {
                client: self,
                ticket,
                armed: true,
            }
        };

        let span = info_span!("swap_request", request_id = in_flight.ticket.id);
        async move {
            info!(
                target_image = %request.target_image.name,
                source_image = %request.source_image.name,
                anonymization_ratio = %request.anonymization_ratio,
                adversarial_ratio = %request.adversarial_ratio,
                "submitting face swap"
            );
            let outcome = self.run(&in_flight.ticket, &request).await;
            self.complete(&in_flight.disarm(), outcome)
        }
        .instrument(span)
        .await
    }

    pub fn cancel(&self) -> bool {
        let mut state = self.lock_state();
        let Some(request_id) = state.slot.cancel_current() else {
            return false;
        };
        info!(request_id, "request cancelled");
        state.ui.cancel();
        self.view.render(&state.ui);
        true
    }

    pub fn on_visibility_change(&self, visibility: Visibility) {
        if visibility == Visibility::Hidden && self.cancel() {
            debug!("host hidden while a request was in flight");
        }
    }

    async fn run(&self, ticket: &RequestTicket, request: &SwapRequest) -> Result<ImageRef, SwapError> {
        let payload = InferencePayload::from(request);
        let raw = tokio::select! {
            biased;
            _ = ticket.token.cancelled() => return Err(SwapError::Cancelled),
            outcome = tokio::time::timeout(self.request_timeout, self.stream_result(ticket, &payload)) => {
                outcome.map_err(|_| {
                    SwapError::Transport(format!(
                        "no result after {}s",
                        self.request_timeout.as_secs()
                    ))
                })??
            }
        };
        normalize(raw, &self.object_urls)
    }

    async fn stream_result(
        &self,
        ticket: &RequestTicket,
        payload: &InferencePayload,
    ) -> Result<Option<RawResponse>, SwapError> {
        let mut events = self.transport.run_inference(payload).await?;
        while let Some(event) = events.next().await {
            match event? {
                TransportEvent::Progress(event) => {
                    if let Some(status) = progress::relay(&event)? {
                        self.report_progress(ticket, status);
                    }
                }
                TransportEvent::Completed(raw) => return Ok(raw),
            }
        }
        Err(SwapError::Protocol(
            "stream ended before a result arrived".to_string(),
        ))
    }

    fn report_progress(&self, ticket: &RequestTicket, status: String) {
        let mut state = self.lock_state();
        if !state.slot.is_current(ticket) {
            debug!(request_id = ticket.id, "discarding progress of stale request");
            return;
        }
        debug!(request_id = ticket.id, status = %status, "progress");
        state.ui.report_progress(status);
        self.view.render(&state.ui);
    }

    fn complete(
        &self,
        ticket: &RequestTicket,
        outcome: Result<ImageRef, SwapError>,
    ) -> Result<DisplayedImage, SwapError> {
        let mut state = self.lock_state();
        if !state.slot.is_current(ticket) {
            debug!(request_id = ticket.id, "discarding outcome of cancelled request");
            return Err(SwapError::Cancelled);
        }
        state.slot.finish(ticket);

        let result = outcome.and_then(|image| self.display(&image));
        match &result {
            Ok(displayed) => {
                info!("face swap completed");
                state.ui.succeed(displayed.src.clone());
            }
            Err(err) => {
                warn!(kind = ?err.kind(), error = %err, "face swap failed");
                state.ui.fail(err.user_message());
            }
        }
        self.view.render(&state.ui);
        result
    }

    /// Hands `image` to the view. Object URLs are released when `image` is dropped by the caller.
    fn display(&self, image: &ImageRef) -> Result<DisplayedImage, SwapError> {
        self.view.load_image(image).map_err(SwapError::Render)?;
        Ok(DisplayedImage {
            src: image.src().to_string(),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Settles the UI and frees the slot when a `submit` future is dropped before it completes.
struct InFlight<'a> {
    client: &'a SwapClient,
    ticket: RequestTicket,
    armed: bool,
}

impl InFlight<'_> {
    fn disarm(mut self) -> RequestTicket {
        self.armed = false;
        self.ticket.clone()
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.client.lock_state();
        if !state.slot.is_current(&self.ticket) {
            return;
        }
        state.slot.cancel_current();
        state.ui.cancel();
        self.client.view.render(&state.ui);
        info!(request_id = self.ticket.id, "submission dropped before completion");
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
