use shared::error::CANCELED_NOTICE;

use crate::normalizer::ImageRef;

pub const SUBMITTING_STATUS: &str = "Submitting images...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Busy,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiState {
    phase: Phase,
    submit_enabled: bool,
    busy: bool,
    status: Option<String>,
    error: Option<String>,
    image: Option<String>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            submit_enabled: true,
            busy: false,
            status: None,
            error: None,
            image: None,
        }
    }
}

impl UiState {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn submit_enabled(&self) -> bool {
        self.submit_enabled
    }

    pub fn busy(&self) -> bool {
        self.busy
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    pub(crate) fn begin(&mut self) {
        self.phase = Phase::Busy;
        self.submit_enabled = false;
        self.busy = true;
        self.status = Some(SUBMITTING_STATUS.to_string());
        self.error = None;
        self.image = None;
    }

    pub(crate) fn report_progress(&mut self, status: String) {
        if self.phase == Phase::Busy {
            self.status = Some(status);
        }
    }

    pub(crate) fn succeed(&mut self, image: String) {
        self.settle(Phase::Succeeded);
        self.error = None;
        self.image = Some(image);
    }

    pub(crate) fn fail(&mut self, message: String) {
        self.settle(Phase::Failed);
        self.error = Some(message);
        self.image = None;
    }

    pub(crate) fn cancel(&mut self) {
        self.settle(Phase::Idle);
        self.error = Some(CANCELED_NOTICE.to_string());
    }

    /// Shows a pre-flight error without touching an in-flight request.
    pub(crate) fn reject(&mut self, message: String) {
        if self.phase != Phase::Busy {
            self.phase = Phase::Failed;
            self.image = None;
        }
        self.error = Some(message);
    }

    fn settle(&mut self, phase: Phase) {
        self.phase = phase;
        self.submit_enabled = true;
        self.busy = false;
        self.status = None;
    }
}

pub trait SwapView: Send + Sync {
    fn render(&self, state: &UiState);

    /// Loads `image` into the image slot. Returns once it is displayed.
    fn load_image(&self, image: &ImageRef) -> Result<(), String>;
}
