use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crate::app::{App, Screen, SettingsFocus};
use crate::tui::AppEvent;

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key).await?,
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick_animation();
        }
        AppEvent::DebounceElapsed => app.on_debounce_elapsed(),
        AppEvent::ProbeFinished { ticket, reachable } => app.on_probe_finished(ticket, reachable),
        AppEvent::ModelsFetched { ticket, result } => app.on_models_fetched(ticket, result),
        AppEvent::ChatReply(result) => app.on_chat_reply(result),
    }
    Ok(())
}

async fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    // Global keys that work on any screen
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return Ok(());
    }

    match app.screen {
        Screen::Home => handle_home(app, key).await,
        Screen::Settings => handle_settings(app, key).await,
        Screen::Chat => handle_chat(app, key),
    }
    Ok(())
}

async fn handle_home(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => app.should_quit = true,
        KeyCode::Char('c') => app.open_settings().await,
        KeyCode::Char('a') | KeyCode::Enter => app.open_chat().await,
        _ => {}
    }
}

async fn handle_settings(app: &mut App, key: KeyEvent) {
    if key.code == KeyCode::Char('s') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.save_settings().await;
        return;
    }

    match key.code {
        KeyCode::Esc => {
            app.close_settings();
            return;
        }
        KeyCode::Tab | KeyCode::BackTab => {
            app.settings_focus = match app.settings_focus {
                SettingsFocus::Url => SettingsFocus::Model,
                SettingsFocus::Model => SettingsFocus::Url,
            };
            return;
        }
        _ => {}
    }

    match app.settings_focus {
        SettingsFocus::Url => handle_url_input(app, key),
        SettingsFocus::Model => match key.code {
            KeyCode::Char('j') | KeyCode::Down => app.select_next_model(),
            KeyCode::Char('k') | KeyCode::Up => app.select_previous_model(),
            KeyCode::Char('r') => app.refresh_models(),
            KeyCode::Enter => app.save_settings().await,
            _ => {}
        },
    }
}

fn handle_url_input(app: &mut App, key: KeyEvent) {
    let edited = match key.code {
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.url_input.insert(c);
            true
        }
        KeyCode::Backspace => app.url_input.backspace(),
        KeyCode::Delete => app.url_input.delete(),
        KeyCode::Left => {
            app.url_input.left();
            false
        }
        KeyCode::Right => {
            app.url_input.right();
            false
        }
        KeyCode::Home => {
            app.url_input.home();
            false
        }
        KeyCode::End => {
            app.url_input.end();
            false
        }
        KeyCode::Enter | KeyCode::Down => {
            app.settings_focus = SettingsFocus::Model;
            false
        }
        _ => false,
    };

    if edited {
        app.url_edited();
    }
}

fn handle_chat(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.screen = Screen::Home,
        KeyCode::Enter => app.submit_chat(),
        KeyCode::Up | KeyCode::PageUp => app.scroll_chat_up(),
        KeyCode::Down | KeyCode::PageDown => app.scroll_chat_down(),
        KeyCode::Backspace => {
            app.chat_input.backspace();
        }
        KeyCode::Delete => {
            app.chat_input.delete();
        }
        KeyCode::Left => app.chat_input.left(),
        KeyCode::Right => app.chat_input.right(),
        KeyCode::Home => app.chat_input.home(),
        KeyCode::End => app.chat_input.end(),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.chat_input.insert(c)
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{SAVE_FAILED, SAVE_OK};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use surfbuddy_core::{
        ChatRole, ClientError, ConfigStore, ConnectionState, ControllerOptions, FileStorage,
        InferenceBackend, MemoryStorage, ModelDescriptor, ModelStatus, OllamaConfig,
    };
    use tokio::sync::mpsc;

    /// A backend that answers instantly and records which URLs were probed.
    #[derive(Default)]
    struct FakeBackend {
        probed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl InferenceBackend for FakeBackend {
        async fn probe_connection(&self, server_url: &str) -> bool {
            self.probed.lock().unwrap().push(server_url.to_string());
            true
        }

        async fn list_models(&self, _server_url: &str) -> Result<Vec<ModelDescriptor>, ClientError> {
            Ok(vec![
                ModelDescriptor::new("llama3"),
                ModelDescriptor::new("mistral"),
            ])
        }

        async fn send_chat_prompt(
            &self,
            _server_url: &str,
            _model: &str,
            prompt: &str,
        ) -> Result<String, ClientError> {
            if prompt == "hello" {
                Ok("hi there".to_string())
            } else {
                Err(ClientError::Status {
                    status: 500,
                    body: "model not found".to_string(),
                })
            }
        }
    }

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn ctrl(c: char) -> AppEvent {
        AppEvent::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL))
    }

    async fn app_with(
        store: ConfigStore,
        backend: Arc<FakeBackend>,
    ) -> (App, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = App::new(store, backend, ControllerOptions::default(), tx).await;
        (app, rx)
    }

    /// Feeds background results back into the app until things go quiet.
    async fn pump(app: &mut App, rx: &mut mpsc::UnboundedReceiver<AppEvent>) {
        while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
            handle_event(app, event).await.unwrap();
        }
    }

    async fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            handle_event(app, key(KeyCode::Char(c))).await.unwrap();
        }
    }

    async fn clear_url(app: &mut App) {
        handle_event(app, key(KeyCode::End)).await.unwrap();
        for _ in 0..app.url_input.value.chars().count() {
            handle_event(app, key(KeyCode::Backspace)).await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_url_probes_once_with_final_url() {
        let backend = Arc::new(FakeBackend::default());
        let store = ConfigStore::new(Arc::new(MemoryStorage::new()));
        let (mut app, mut rx) = app_with(store, backend.clone()).await;

        handle_event(&mut app, key(KeyCode::Char('c'))).await.unwrap();
        assert_eq!(app.screen, Screen::Settings);
        assert_eq!(app.url_input.value, "http://localhost:11434");

        clear_url(&mut app).await;
        type_text(&mut app, "http://gpu-box:11434").await;
        assert_eq!(app.controller.state(), &ConnectionState::Idle);

        pump(&mut app, &mut rx).await;

        assert_eq!(
            *backend.probed.lock().unwrap(),
            vec!["http://gpu-box:11434".to_string()]
        );
        assert!(matches!(
            app.controller.state(),
            ConnectionState::Connected(ModelStatus::Ready(_))
        ));
        assert_eq!(app.controller.selected_model(), "llama3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_from_settings_configures_chat() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(Arc::new(FileStorage::new(dir.path().join("storage.json"))));
        let (mut app, mut rx) = app_with(store.clone(), Arc::new(FakeBackend::default())).await;
        assert_eq!(app.chat.config(), None);

        app.open_settings().await;
        pump(&mut app, &mut rx).await;

        handle_event(&mut app, key(KeyCode::Tab)).await.unwrap();
        handle_event(&mut app, key(KeyCode::Down)).await.unwrap();
        assert_eq!(app.controller.selected_model(), "mistral");

        handle_event(&mut app, ctrl('s')).await.unwrap();
        assert_eq!(app.notice, Some(SAVE_OK));
        let expected = OllamaConfig::new("http://localhost:11434", "mistral");
        assert_eq!(store.load().await.unwrap(), Some(expected.clone()));
        assert_eq!(app.chat.config(), Some(&expected));

        // Nothing changed since the save: refused, banner stays.
        handle_event(&mut app, ctrl('s')).await.unwrap();
        assert_eq!(app.notice, Some(SAVE_OK));

        handle_event(&mut app, key(KeyCode::Esc)).await.unwrap();
        assert_eq!(app.screen, Screen::Home);
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_failure_shows_banner() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let store = ConfigStore::new(Arc::new(FileStorage::new(blocker.join("storage.json"))));
        let (mut app, mut rx) = app_with(store, Arc::new(FakeBackend::default())).await;

        app.open_settings().await;
        pump(&mut app, &mut rx).await;
        handle_event(&mut app, ctrl('s')).await.unwrap();

        assert_eq!(app.notice, Some(SAVE_FAILED));
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_round_trip_and_inline_error() {
        let store = ConfigStore::new(Arc::new(MemoryStorage::new()));
        store
            .save(&OllamaConfig::new("http://localhost:11434", "llama3"))
            .await
            .unwrap();
        let (mut app, mut rx) = app_with(store, Arc::new(FakeBackend::default())).await;

        handle_event(&mut app, key(KeyCode::Char('a'))).await.unwrap();
        assert_eq!(app.screen, Screen::Chat);

        type_text(&mut app, "hello").await;
        handle_event(&mut app, key(KeyCode::Enter)).await.unwrap();
        assert!(app.chat_input.value.is_empty());
        assert!(app.chat.is_loading());
        pump(&mut app, &mut rx).await;

        type_text(&mut app, "which model?").await;
        handle_event(&mut app, key(KeyCode::Enter)).await.unwrap();
        pump(&mut app, &mut rx).await;

        let roles: Vec<ChatRole> = app.chat.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                ChatRole::System,
                ChatRole::User,
                ChatRole::Assistant,
                ChatRole::User,
                ChatRole::System,
            ]
        );
        assert_eq!(app.chat.messages()[2].content, "hi there");
        assert!(app.chat.messages()[4].content.contains("model not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_control_chords_do_not_type() {
        let store = ConfigStore::new(Arc::new(MemoryStorage::new()));
        store
            .save(&OllamaConfig::new("http://localhost:11434", "llama3"))
            .await
            .unwrap();
        let (mut app, _rx) = app_with(store, Arc::new(FakeBackend::default())).await;

        app.open_settings().await;
        let deadline = app.controller.debounce_deadline();
        tokio::time::advance(Duration::from_millis(100)).await;
        handle_event(&mut app, ctrl('r')).await.unwrap();
        assert_eq!(app.url_input.value, "http://localhost:11434");
        assert_eq!(app.controller.debounce_deadline(), deadline);

        handle_event(&mut app, key(KeyCode::Esc)).await.unwrap();
        handle_event(&mut app, key(KeyCode::Char('a'))).await.unwrap();
        handle_event(&mut app, ctrl('x')).await.unwrap();
        assert!(app.chat_input.value.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_leaving_settings_cancels_debounce() {
        let backend = Arc::new(FakeBackend::default());
        let store = ConfigStore::new(Arc::new(MemoryStorage::new()));
        let (mut app, mut rx) = app_with(store, backend.clone()).await;

        app.open_settings().await;
        handle_event(&mut app, key(KeyCode::Esc)).await.unwrap();
        pump(&mut app, &mut rx).await;

        assert!(backend.probed.lock().unwrap().is_empty());
    }
}
