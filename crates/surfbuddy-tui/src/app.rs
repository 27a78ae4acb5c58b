use std::sync::Arc;

use surfbuddy_core::{
    ChatRole, ChatSession, ClientError, ConfigStore, ConnectionController, ConnectionState,
    ControllerOptions, DebounceTimer, InferenceBackend, ModelDescriptor, ModelStatus, SaveError,
    Ticket,
};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tracing::debug;

use crate::tui::AppEvent;

pub const SAVE_OK: &str = "Configuration saved successfully!";
pub const SAVE_FAILED: &str = "Failed to save configuration. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Home,
    Settings,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsFocus {
    Url,
    Model,
}

/// Single-line text input with a character cursor.
#[derive(Debug, Clone, Default)]
pub struct InputField {
    pub value: String,
    pub cursor: usize,
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

impl InputField {
    pub fn with_value(value: &str) -> Self {
        Self {
            value: value.to_string(),
            cursor: value.chars().count(),
        }
    }

    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.value, self.cursor);
        self.value.insert(byte_pos, c);
        self.cursor += 1;
    }

    /// Returns true if something was removed.
    pub fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        let byte_pos = char_to_byte_index(&self.value, self.cursor);
        self.value.remove(byte_pos);
        true
    }

    pub fn delete(&mut self) -> bool {
        if self.cursor >= self.value.chars().count() {
            return false;
        }
        let byte_pos = char_to_byte_index(&self.value, self.cursor);
        self.value.remove(byte_pos);
        true
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.value.chars().count());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.value.chars().count();
    }

    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.value)
    }
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,

    // Settings state
    pub controller: ConnectionController,
    pub url_input: InputField,
    pub settings_focus: SettingsFocus,
    pub notice: Option<&'static str>,
    debounce_timer: DebounceTimer,

    // Chat state
    pub chat: ChatSession,
    pub chat_input: InputField,
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Data
    store: ConfigStore,
    client: Arc<dyn InferenceBackend>,
    events: UnboundedSender<AppEvent>,
}

impl App {
    pub async fn new(
        store: ConfigStore,
        client: Arc<dyn InferenceBackend>,
        options: ControllerOptions,
        events: UnboundedSender<AppEvent>,
    ) -> Self {
        let chat = ChatSession::open(&store).await;

        Self {
            should_quit: false,
            screen: Screen::Home,

            controller: ConnectionController::new(options),
            url_input: InputField::default(),
            settings_focus: SettingsFocus::Url,
            notice: None,
            debounce_timer: DebounceTimer::new(),

            chat,
            chat_input: InputField::default(),
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            animation_frame: 0,

            store,
            client,
            events,
        }
    }

    // Screen switching
    pub async fn open_settings(&mut self) {
        self.screen = Screen::Settings;
        self.settings_focus = SettingsFocus::Url;
        self.notice = None;
        self.controller.load_saved(&self.store, Instant::now()).await;
        self.url_input = InputField::with_value(self.controller.server_url());
        self.schedule_debounce();
    }

    pub fn close_settings(&mut self) {
        self.debounce_timer.cancel();
        self.controller.cancel_pending();
        self.screen = Screen::Home;
    }

    pub async fn open_chat(&mut self) {
        if self.chat.config().is_none() {
            self.chat = ChatSession::open(&self.store).await;
        }
        self.screen = Screen::Chat;
    }

    // Settings actions
    pub fn url_edited(&mut self) {
        self.controller.edit_url(&self.url_input.value, Instant::now());
        self.notice = None;
        self.schedule_debounce();
    }

    fn schedule_debounce(&mut self) {
        if let Some(deadline) = self.controller.debounce_deadline() {
            let tx = self.events.clone();
            self.debounce_timer.schedule(deadline, move || {
                let _ = tx.send(AppEvent::DebounceElapsed);
            });
        }
    }

    pub fn on_debounce_elapsed(&mut self) {
        if let Some(ticket) = self.controller.poll_debounce(Instant::now()) {
            self.spawn_probe(ticket);
        }
    }

    fn spawn_probe(&self, ticket: Ticket) {
        let client = self.client.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let reachable = client.probe_connection(ticket.server_url()).await;
            let _ = tx.send(AppEvent::ProbeFinished { ticket, reachable });
        });
    }

    fn spawn_listing(&self, ticket: Ticket) {
        let client = self.client.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = client.list_models(ticket.server_url()).await;
            let _ = tx.send(AppEvent::ModelsFetched { ticket, result });
        });
    }

    pub fn on_probe_finished(&mut self, ticket: Ticket, reachable: bool) {
        if let Some(listing) = self.controller.apply_probe(&ticket, reachable) {
            self.spawn_listing(listing);
        }
    }

    pub fn on_models_fetched(
        &mut self,
        ticket: Ticket,
        result: Result<Vec<ModelDescriptor>, ClientError>,
    ) {
        self.controller.apply_models(&ticket, result);
    }

    pub fn refresh_models(&mut self) {
        if let Some(ticket) = self.controller.refresh_models() {
            self.spawn_listing(ticket);
        }
    }

    pub fn select_next_model(&mut self) {
        if self.controller.select_next_model() {
            self.notice = None;
        }
    }

    pub fn select_previous_model(&mut self) {
        if self.controller.select_previous_model() {
            self.notice = None;
        }
    }

    pub async fn save_settings(&mut self) {
        match self.controller.save(&self.store).await {
            Ok(config) => {
                self.notice = Some(SAVE_OK);
                // A chat that never got past its greeting restarts with the new config.
                if self.chat.messages().iter().all(|m| m.role == ChatRole::System) {
                    self.chat = ChatSession::new(Some(config));
                } else {
                    self.chat.set_config(config);
                }
            }
            Err(SaveError::NotPermitted) => {
                debug!("save ignored, nothing to save");
            }
            Err(SaveError::Storage(_)) => {
                self.notice = Some(SAVE_FAILED);
            }
        }
    }

    pub fn is_models_loading(&self) -> bool {
        matches!(
            self.controller.state(),
            ConnectionState::Connecting | ConnectionState::Connected(ModelStatus::Loading)
        )
    }

    // Chat actions
    pub fn submit_chat(&mut self) {
        let Some(pending) = self.chat.submit(&self.chat_input.value) else {
            return;
        };
        self.chat_input.take();
        self.scroll_chat_to_bottom();

        let client = self.client.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = pending.send(client.as_ref()).await;
            let _ = tx.send(AppEvent::ChatReply(result));
        });
    }

    pub fn on_chat_reply(&mut self, result: Result<String, ClientError>) {
        self.chat.complete(result);
        self.scroll_chat_to_bottom();
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.chat.is_loading() || self.is_models_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_chat_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_chat_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1);
    }

    /// Scroll chat to bottom so the latest message is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: usize = 0;

        for msg in self.chat.messages() {
            total_lines = total_lines.saturating_add(1); // Role line
            for line in msg.content.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                total_lines = total_lines.saturating_add(char_count / wrap_width + 1);
            }
            total_lines = total_lines.saturating_add(1); // Blank line after message
        }

        if self.chat.is_loading() {
            total_lines = total_lines.saturating_add(2); // "AI:" + "Thinking..."
        }

        let visible_height = if self.chat_height > 0 {
            self.chat_height as usize
        } else {
            20
        };

        let scroll = total_lines.saturating_sub(visible_height);
        self.chat_scroll = u16::try_from(scroll).unwrap_or(u16::MAX);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surfbuddy_core::{MemoryStorage, OllamaConfig};

    /// Never called; chat replies are fed in directly.
    struct IdleBackend;

    #[async_trait::async_trait]
    impl InferenceBackend for IdleBackend {
        async fn probe_connection(&self, _server_url: &str) -> bool {
            false
        }

        async fn list_models(&self, _server_url: &str) -> Result<Vec<ModelDescriptor>, ClientError> {
            Ok(Vec::new())
        }

        async fn send_chat_prompt(
            &self,
            _server_url: &str,
            _model: &str,
            _prompt: &str,
        ) -> Result<String, ClientError> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn test_huge_reply_pins_scroll_to_max() {
        let store = ConfigStore::new(Arc::new(MemoryStorage::new()));
        store
            .save(&OllamaConfig::new("http://localhost:11434", "llama3"))
            .await
            .unwrap();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut app = App::new(store, Arc::new(IdleBackend), ControllerOptions::default(), tx).await;

        assert!(app.chat.submit("hi").is_some());
        app.on_chat_reply(Ok("line\n".repeat(70_000)));

        assert_eq!(app.chat_scroll, u16::MAX);
        assert!(!app.chat.is_loading());
    }

    #[test]
    fn test_input_field_edits_multibyte_text() {
        let mut input = InputField::with_value("héllo");
        assert_eq!(input.cursor, 5);

        input.left();
        input.left();
        input.left();
        input.left();
        assert!(input.backspace());
        assert_eq!(input.value, "éllo");
        assert!(!input.backspace());

        input.insert('h');
        input.insert('e');
        assert_eq!(input.value, "heéllo");
        assert!(input.delete());
        assert_eq!(input.value, "hello");

        input.end();
        assert!(!input.delete());
        assert_eq!(input.take(), "hello");
        assert_eq!(input.cursor, 0);
        assert!(input.value.is_empty());
    }
}
