//! Keyboard input handling

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use sarvis_core::ButtonDirection;
use sarvis_core::control::Arrow;
use sarvis_core::protocol::YoutubeCommand;
use sarvis_core::state::Screen;

use crate::app::{App, AppResult};

/// Handle a key event
pub async fn handle_key(app: &mut App, key: KeyEvent) -> AppResult {
    // The wake-word overlay swallows input until dismissed
    if app.state.overlay.is_some() {
        if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
            app.dismiss_overlay();
        }
        return AppResult::Continue;
    }

    match app.state.screen {
        Screen::Login => handle_login(app, key).await,
        Screen::Signup => handle_signup(app, key).await,
        Screen::Presets => handle_presets(app, key).await,
        Screen::Control => handle_control(app, key).await,
    }
}

/// Login form: text entry, Tab switches fields
async fn handle_login(app: &mut App, key: KeyEvent) -> AppResult {
    if app.state.busy {
        return AppResult::Continue;
    }

    match key.code {
        KeyCode::Tab | KeyCode::BackTab => app.state.focus_next(),
        KeyCode::Enter => app.login().await,
        KeyCode::F(2) => app.open_signup(),
        KeyCode::F(3) => app.login_with_face().await,
        KeyCode::Backspace => app.state.pop_char(),
        KeyCode::Esc => app.state.clear_status(),
        KeyCode::Char(c) => app.state.push_char(c),
        _ => {}
    }
    AppResult::Continue
}

/// Signup form: Enter submits the step, Esc keeps the draft, Ctrl-X drops it
async fn handle_signup(app: &mut App, key: KeyEvent) -> AppResult {
    if app.state.busy {
        return AppResult::Continue;
    }
    if key.code == KeyCode::Char('x') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.cancel_signup().await;
        return AppResult::Continue;
    }

    match key.code {
        KeyCode::Tab | KeyCode::BackTab => app.state.signup.focus_next(),
        KeyCode::Enter => app.submit_signup().await,
        KeyCode::Backspace => app.state.signup.pop_char(),
        KeyCode::Esc => app.leave_signup(),
        KeyCode::Char(c) => app.state.signup.push_char(c),
        _ => {}
    }
    AppResult::Continue
}

async fn handle_presets(app: &mut App, key: KeyEvent) -> AppResult {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.state.cursor_down(),
        KeyCode::Char('k') | KeyCode::Up => app.state.cursor_up(),
        KeyCode::Enter => app.apply_preset().await,
        KeyCode::Char('r') => app.refresh_presets().await,
        KeyCode::Char('c') => app.open_control().await,
        KeyCode::Char('o') => app.sign_out().await,
        KeyCode::Esc => app.state.clear_status(),
        _ => {}
    }
    AppResult::Continue
}

async fn handle_control(app: &mut App, key: KeyEvent) -> AppResult {
    match key.code {
        // Arrow pad, meaning depends on the mode
        KeyCode::Up | KeyCode::Char('k') => app.press_arrow(Arrow::Up).await,
        KeyCode::Down | KeyCode::Char('j') => app.press_arrow(Arrow::Down).await,
        KeyCode::Left | KeyCode::Char('h') => app.press_arrow(Arrow::Left).await,
        KeyCode::Right | KeyCode::Char('l') => app.press_arrow(Arrow::Right).await,
        KeyCode::Char('m') => app.toggle_mode(),

        KeyCode::Char('f') => app.press(ButtonDirection::Far).await,
        KeyCode::Char('n') => app.press(ButtonDirection::Near).await,
        KeyCode::Char('H') => app.press(ButtonDirection::Home).await,
        KeyCode::Char('C') => app.press(ButtonDirection::ComeHere).await,
        KeyCode::Char('t') => app.press(ButtonDirection::TrackOn).await,
        KeyCode::Char('T') => app.press(ButtonDirection::TrackOff).await,

        // Local media player
        KeyCode::Char('y') => app.media(YoutubeCommand::Open),
        KeyCode::Char('p') => app.media(YoutubeCommand::Play),
        KeyCode::Char(' ') => app.media(YoutubeCommand::Pause),
        KeyCode::Char(']') => app.media(YoutubeCommand::SeekForward),
        KeyCode::Char('[') => app.media(YoutubeCommand::SeekBackward),

        KeyCode::Esc => app.close_control(),
        _ => {}
    }
    AppResult::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use sarvis_core::{Config, UserStorage};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn offline_app() -> App {
        let mut config = Config::default();
        config.backend.base_url = "http://127.0.0.1:1".to_string();
        App::with_storage(config, UserStorage::in_memory()).unwrap()
    }

    #[tokio::test]
    async fn test_login_typing_and_focus() {
        let mut app = offline_app();
        for c in "robo".chars() {
            handle_key(&mut app, key(KeyCode::Char(c))).await;
        }
        handle_key(&mut app, key(KeyCode::Tab)).await;
        handle_key(&mut app, key(KeyCode::Char('q'))).await;
        handle_key(&mut app, key(KeyCode::Char('x'))).await;
        handle_key(&mut app, key(KeyCode::Backspace)).await;

        assert_eq!(app.state.login_id, "robo");
        assert_eq!(app.state.password, "q");
    }

    #[tokio::test]
    async fn test_signup_screen_typing_and_exit() {
        let mut app = offline_app();
        handle_key(&mut app, key(KeyCode::F(2))).await;
        assert_eq!(app.state.screen, Screen::Signup);

        for c in "qwe".chars() {
            handle_key(&mut app, key(KeyCode::Char(c))).await;
        }
        handle_key(&mut app, key(KeyCode::Backspace)).await;
        assert_eq!(app.state.signup.input, "qw");
        assert!(app.state.login_id.is_empty());

        handle_key(&mut app, key(KeyCode::Esc)).await;
        assert_eq!(app.state.screen, Screen::Login);

        handle_key(&mut app, key(KeyCode::F(2))).await;
        handle_key(&mut app, KeyEvent::new(KeyCode::Char('x'), KeyModifiers::CONTROL)).await;
        assert_eq!(app.state.screen, Screen::Login);
    }

    #[tokio::test]
    async fn test_control_mode_toggle_and_escape() {
        let mut app = offline_app();
        app.open_control().await;

        handle_key(&mut app, key(KeyCode::Char('m'))).await;
        handle_key(&mut app, key(KeyCode::Left)).await;
        assert_eq!(app.state.control.rotation_y, -1);
        assert_eq!(app.state.control.position_x, 0);

        handle_key(&mut app, key(KeyCode::Esc)).await;
        assert_eq!(app.state.screen, Screen::Presets);
    }

    #[tokio::test]
    async fn test_overlay_swallows_keys() {
        let mut app = offline_app();
        app.state.overlay = Some("SARVIS".to_string());

        handle_key(&mut app, key(KeyCode::Char('a'))).await;
        assert!(app.state.login_id.is_empty());

        handle_key(&mut app, key(KeyCode::Esc)).await;
        assert!(app.state.overlay.is_none());
    }

    #[tokio::test]
    async fn test_media_keys_drive_player() {
        let mut app = offline_app();
        app.open_control().await;

        handle_key(&mut app, key(KeyCode::Char('y'))).await;
        handle_key(&mut app, key(KeyCode::Char('p'))).await;
        handle_key(&mut app, key(KeyCode::Char(']'))).await;

        assert_eq!(app.player.playback(), crate::app::Playback::Playing { position: 10 });
    }
}
