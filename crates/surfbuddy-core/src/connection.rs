//! The settings-screen workflow: URL entry, debounced probing, model
//! listing, selection reconciliation, and change detection gating save.
//!
//! The controller never performs I/O for the remote calls itself. It hands
//! out a [`Ticket`] for each probe or listing the host should run, and takes
//! the outcome back through [`ConnectionController::apply_probe`] and
//! [`ConnectionController::apply_models`]. A ticket that has been superseded
//! by a later edit or refresh is ignored, so a slow response can never
//! overwrite newer state.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigStore, OllamaConfig, DEFAULT_OLLAMA_URL};
use crate::debounce::{Debouncer, DEFAULT_DEBOUNCE};
use crate::error::{ClientError, SaveError};
use crate::ollama::ModelDescriptor;

pub const CONNECT_FAILED: &str = "Could not connect to Ollama server";

#[derive(Debug, Clone, PartialEq)]
pub enum ModelStatus {
    Loading,
    Ready(Vec<ModelDescriptor>),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected(ModelStatus),
    Failed(String),
}

impl ConnectionState {
    /// Models of the latest successful listing, empty in every other state.
    pub fn models(&self) -> &[ModelDescriptor] {
        match self {
            ConnectionState::Connected(ModelStatus::Ready(models)) => models,
            _ => &[],
        }
    }
}

/// Outcome of the last save, independent of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveStatus {
    #[default]
    Neutral,
    Success,
    Error,
}

/// A remote call the host should run on the controller's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    server_url: String,
}

impl Ticket {
    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub debounce: Duration,
    /// Only allow saving when the (url, model) pair differs from the one
    /// last loaded or saved.
    pub change_detection: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            change_detection: true,
        }
    }
}

pub struct ConnectionController {
    server_url: String,
    state: ConnectionState,
    selected_model: String,
    // The selection text survives a URL edit but is only trusted once a
    // listing from the current URL contained it.
    selection_valid: bool,
    save_status: SaveStatus,
    baseline: Option<OllamaConfig>,
    debouncer: Debouncer,
    generation: u64,
    change_detection: bool,
}

impl Default for ConnectionController {
    fn default() -> Self {
        Self::new(ControllerOptions::default())
    }
}

impl ConnectionController {
    pub fn new(options: ControllerOptions) -> Self {
        Self {
            server_url: DEFAULT_OLLAMA_URL.to_string(),
            state: ConnectionState::Idle,
            selected_model: String::new(),
            selection_valid: false,
            save_status: SaveStatus::Neutral,
            baseline: None,
            debouncer: Debouncer::new(options.debounce),
            generation: 0,
            change_detection: options.change_detection,
        }
    }

    // Accessors
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        self.state.models()
    }

    pub fn selected_model(&self) -> &str {
        &self.selected_model
    }

    pub fn is_selection_valid(&self) -> bool {
        self.selection_valid
    }

    pub fn save_status(&self) -> SaveStatus {
        self.save_status
    }

    pub fn baseline(&self) -> Option<&OllamaConfig> {
        self.baseline.as_ref()
    }

    /// When the pending debounce window closes, if one is armed.
    pub fn debounce_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    fn ticket(&self) -> Ticket {
        Ticket {
            generation: self.generation,
            server_url: self.server_url.clone(),
        }
    }

    fn is_current(&self, ticket: &Ticket) -> bool {
        ticket.generation == self.generation && ticket.server_url == self.server_url
    }

    fn clear_selection(&mut self) {
        self.selected_model.clear();
        self.selection_valid = false;
    }

    /// Seeds URL, selection and the change-detection baseline from a saved
    /// config, then arms the debounce so the current URL gets probed.
    pub fn apply_saved(&mut self, saved: Option<OllamaConfig>, now: Instant) {
        if let Some(config) = &saved {
            info!(server_url = %config.server_url, model = %config.selected_model, "found saved config");
            self.server_url = config.server_url.clone();
            self.selected_model = config.selected_model.clone();
        }
        self.baseline = saved;
        self.selection_valid = false;
        self.state = ConnectionState::Idle;
        self.generation += 1;
        self.debouncer.record_edit(now);
    }

    /// Loads the saved config. A storage failure is logged and treated as
    /// "nothing saved".
    pub async fn load_saved(&mut self, store: &ConfigStore, now: Instant) {
        let saved = match store.load().await {
            Ok(saved) => saved,
            Err(e) => {
                warn!(error = %e, "error loading config");
                None
            }
        };
        self.apply_saved(saved, now);
    }

    /// Any URL edit drops the connection and model list immediately and
    /// restarts the debounce window.
    pub fn edit_url(&mut self, url: &str, now: Instant) {
        let url = url.trim();
        debug!(url, "URL changed");
        self.server_url = url.to_string();
        self.state = ConnectionState::Idle;
        self.selection_valid = false;
        self.generation += 1;
        self.debouncer.record_edit(now);
    }

    /// Returns the probe to run if the debounce window has closed at `now`.
    pub fn poll_debounce(&mut self, now: Instant) -> Option<Ticket> {
        if !self.debouncer.take_due(now) {
            return None;
        }
        if self.server_url.is_empty() {
            return None;
        }

        debug!(server_url = %self.server_url, "checking connection");
        self.state = ConnectionState::Connecting;
        Some(self.ticket())
    }

    /// Applies a probe outcome. On success returns the listing to run next.
    pub fn apply_probe(&mut self, ticket: &Ticket, reachable: bool) -> Option<Ticket> {
        if !self.is_current(ticket) || self.state != ConnectionState::Connecting {
            debug!(server_url = %ticket.server_url, "discarding stale probe result");
            return None;
        }

        if reachable {
            info!(server_url = %self.server_url, "connected to Ollama server");
            self.state = ConnectionState::Connected(ModelStatus::Loading);
            Some(self.ticket())
        } else {
            warn!(server_url = %self.server_url, "could not connect to Ollama server");
            self.state = ConnectionState::Failed(CONNECT_FAILED.to_string());
            self.selection_valid = false;
            None
        }
    }

    /// Re-lists models without probing. Only allowed while connected and not
    /// already loading.
    pub fn refresh_models(&mut self) -> Option<Ticket> {
        match self.state {
            ConnectionState::Connected(ModelStatus::Loading) => None,
            ConnectionState::Connected(_) => {
                self.generation += 1;
                self.selection_valid = false;
                self.state = ConnectionState::Connected(ModelStatus::Loading);
                Some(self.ticket())
            }
            _ => None,
        }
    }

    /// Applies a model listing and reconciles the selection: keep the
    /// previous name if still listed, otherwise take the first model.
    pub fn apply_models(
        &mut self,
        ticket: &Ticket,
        result: Result<Vec<ModelDescriptor>, ClientError>,
    ) {
        if !self.is_current(ticket)
            || self.state != ConnectionState::Connected(ModelStatus::Loading)
        {
            debug!(server_url = %ticket.server_url, "discarding stale model list");
            return;
        }

        match result {
            Ok(models) if models.is_empty() => {
                info!(server_url = %self.server_url, "server has no models");
                self.clear_selection();
                self.state = ConnectionState::Connected(ModelStatus::Empty);
            }
            Ok(models) => {
                let keep = !self.selected_model.is_empty()
                    && models.iter().any(|m| m.name == self.selected_model);
                if !keep {
                    self.selected_model = models[0].name.clone();
                }
                self.selection_valid = true;
                debug!(count = models.len(), selected = %self.selected_model, "models ready");
                self.state = ConnectionState::Connected(ModelStatus::Ready(models));
            }
            Err(e) => {
                error!(server_url = %self.server_url, error = %e, "error fetching models");
                self.clear_selection();
                self.state = ConnectionState::Failed(format!("Could not load models: {e}"));
            }
        }
    }

    /// User picked a model from the current list.
    pub fn select_model(&mut self, name: &str) -> bool {
        if !self.models().iter().any(|m| m.name == name) {
            return false;
        }
        self.selected_model = name.to_string();
        self.selection_valid = true;
        self.save_status = SaveStatus::Neutral;
        true
    }

    pub fn select_next_model(&mut self) -> bool {
        self.step_selection(1)
    }

    pub fn select_previous_model(&mut self) -> bool {
        self.step_selection(-1)
    }

    fn step_selection(&mut self, delta: isize) -> bool {
        let models = self.models();
        if models.is_empty() {
            return false;
        }
        let current = models
            .iter()
            .position(|m| m.name == self.selected_model)
            .unwrap_or(0);
        let next = current
            .saturating_add_signed(delta)
            .min(models.len() - 1);
        if models[next].name == self.selected_model {
            // Already at the end of the list.
            return false;
        }
        let name = models[next].name.clone();
        self.select_model(&name)
    }

    /// The pair a save would write, if a trusted model is selected.
    pub fn pending_config(&self) -> Option<OllamaConfig> {
        if self.server_url.is_empty() || !self.selection_valid || self.selected_model.is_empty() {
            return None;
        }
        Some(OllamaConfig::new(&self.server_url, &self.selected_model))
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.pending_config().as_ref() != self.baseline.as_ref()
    }

    pub fn can_save(&self) -> bool {
        matches!(self.state, ConnectionState::Connected(ModelStatus::Ready(_)))
            && self.pending_config().is_some()
            && (!self.change_detection || self.has_unsaved_changes())
    }

    /// Persists the pending pair. The outcome is mirrored in
    /// [`SaveStatus`]; a refused save leaves it untouched.
    pub async fn save(&mut self, store: &ConfigStore) -> Result<OllamaConfig, SaveError> {
        if !self.can_save() {
            return Err(SaveError::NotPermitted);
        }
        let Some(config) = self.pending_config() else {
            return Err(SaveError::NotPermitted);
        };

        match store.save(&config).await {
            Ok(()) => {
                self.save_status = SaveStatus::Success;
                self.baseline = Some(config.clone());
                Ok(config)
            }
            Err(e) => {
                error!(error = %e, "failed to save configuration");
                self.save_status = SaveStatus::Error;
                Err(e.into())
            }
        }
    }

    /// Teardown: disarm the debounce and orphan anything in flight.
    pub fn cancel_pending(&mut self) {
        self.debouncer.cancel();
        self.generation += 1;
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected(ModelStatus::Loading)
        ) {
            self.state = ConnectionState::Idle;
        }
    }
}
