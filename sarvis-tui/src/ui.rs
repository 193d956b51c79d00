//! Terminal UI rendering with ratatui

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Flex, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph},
};

use sarvis_core::state::{LoginField, Screen, SignupForm, StatusLevel};
use sarvis_core::{ControlMode, SignupStep};

use crate::app::{App, Playback};

/// Main draw function
pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Title bar
            Constraint::Min(1),    // Screen body
            Constraint::Length(1), // Status bar
            Constraint::Length(1), // Foreground status
        ])
        .split(f.area());

    draw_title_bar(f, app, chunks[0]);
    match app.state.screen {
        Screen::Login => draw_login(f, app, chunks[1]),
        Screen::Signup => draw_signup(f, app, chunks[1]),
        Screen::Presets => draw_presets(f, app, chunks[1]),
        Screen::Control => draw_control(f, app, chunks[1]),
    }
    draw_status_bar(f, app, chunks[2]);
    draw_foreground_line(f, app, chunks[3]);

    if let Some(ref command) = app.state.overlay {
        draw_overlay(f, command);
    }
}

/// Title bar with the signed-in user and push channel state
fn draw_title_bar(f: &mut Frame, app: &App, area: Rect) {
    let title = match app.state.user {
        Some(ref user) => format!(" SARVIS │ {} ", user.nickname),
        None => " SARVIS ".to_string(),
    };
    let connection = app.state.connection;
    let indicator = format!(" [{}]", connection.label());

    let title_bar = Paragraph::new(Line::from(vec![
        Span::styled(title, Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        Span::styled(
            indicator,
            Style::default().fg(if connection.is_connected() { Color::Green } else { Color::Yellow }),
        ),
    ]))
    .style(Style::default().bg(Color::DarkGray));

    f.render_widget(title_bar, area);
}

fn draw_login(f: &mut Frame, app: &App, area: Rect) {
    let [form] = Layout::vertical([Constraint::Length(6)])
        .flex(Flex::Center)
        .areas(area);
    let [form] = Layout::horizontal([Constraint::Length(44)])
        .flex(Flex::Center)
        .areas(form);

    let masked = "•".repeat(app.state.password.chars().count());
    let field = |label: &str, value: &str, focused: bool| {
        let style = if focused {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        Line::from(vec![
            Span::styled(format!("{label:>10}: "), style),
            Span::raw(value.to_string()),
        ])
    };

    let lines = vec![
        Line::default(),
        field("Login ID", &app.state.login_id, app.state.focus == LoginField::LoginId),
        field("Password", &masked, app.state.focus == LoginField::Password),
        Line::default(),
    ];
    let title = if app.state.busy { " Signing in… " } else { " Sign in " };
    let block = Block::default().borders(Borders::ALL).title(title);
    f.render_widget(Paragraph::new(lines).block(block), form);

    if !app.state.busy {
        let (row, len) = match app.state.focus {
            LoginField::LoginId => (2, app.state.login_id.chars().count()),
            LoginField::Password => (3, masked.chars().count()),
        };
        let x = form.x + 1 + 12 + len as u16;
        f.set_cursor_position((x.min(form.right().saturating_sub(2)), form.y + row));
    }
}

/// Field label and hint for a signup step
fn signup_prompt(form: &SignupForm) -> (&'static str, &'static str) {
    match form.step {
        SignupStep::LoginId => ("Login ID", "5-20 letters or digits"),
        SignupStep::Nickname => ("Nickname", "2-20 letters, digits or Hangul"),
        SignupStep::Email if form.code_sent => ("Code", "6-digit code, or the address again to resend"),
        SignupStep::Email => ("Email", "A verification code will be sent"),
        SignupStep::Password => ("Password", "8-20 chars with a letter and a digit; Tab to confirm"),
        SignupStep::DeviceLink => ("Robot", "Join the robot's Wi-Fi, then press Enter"),
        SignupStep::Face => ("Image dir", "Folder with face_front.jpg, face_left.jpg, ..."),
        SignupStep::Voice => ("Clip dir", "Folder of .m4a wake-word clips, empty to skip"),
        SignupStep::Complete => ("", "Done"),
    }
}

fn draw_signup(f: &mut Frame, app: &App, area: Rect) {
    let [form_area] = Layout::vertical([Constraint::Length(9)])
        .flex(Flex::Center)
        .areas(area);
    let [form_area] = Layout::horizontal([Constraint::Length(60)])
        .flex(Flex::Center)
        .areas(form_area);

    let form = &app.state.signup;
    let (label, hint) = signup_prompt(form);
    let password = form.step == SignupStep::Password;
    let mask = |value: &str| {
        if password {
            "•".repeat(value.chars().count())
        } else {
            value.to_string()
        }
    };
    let focused = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);
    let field = |label: &str, value: String, is_focused: bool| {
        Line::from(vec![
            Span::styled(format!("{label:>10}: "), if is_focused { focused } else { Style::default() }),
            Span::raw(value),
        ])
    };

    let input = mask(&form.input);
    let confirm = mask(&form.confirm);
    let mut lines = vec![
        Line::default(),
        field(label, input.clone(), !form.confirm_focused),
    ];
    if password {
        lines.push(field("Confirm", confirm.clone(), form.confirm_focused));
    }
    lines.push(Line::default());
    lines.push(Line::from(Span::styled(hint, Style::default().fg(Color::DarkGray))));

    let title = if app.state.busy {
        format!(" Sign up │ {}… ", form.step)
    } else {
        format!(" Sign up │ {} ", form.step)
    };
    let block = Block::default().borders(Borders::ALL).title(title);
    f.render_widget(Paragraph::new(lines).block(block), form_area);

    if !app.state.busy {
        let (row, len) = if form.confirm_focused {
            (3, confirm.chars().count())
        } else {
            (2, input.chars().count())
        };
        let x = form_area.x + 1 + 12 + len as u16;
        f.set_cursor_position((x.min(form_area.right().saturating_sub(2)), form_area.y + row));
    }
}

fn draw_presets(f: &mut Frame, app: &App, area: Rect) {
    if app.state.presets.is_empty() {
        let empty = Paragraph::new("No presets saved. Press r to reload.")
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL).title(" Presets "));
        f.render_widget(empty, area);
        return;
    }

    let items: Vec<ListItem> = app
        .state
        .presets
        .iter()
        .enumerate()
        .map(|(i, preset)| {
            let marker = if app.state.is_selected(preset) { "● " } else { "  " };
            let s = &preset.servos;
            let line = format!(
                "{}{:<24} {:>6.1} {:>6.1} {:>6.1} {:>6.1} {:>6.1} {:>6.1}",
                marker, preset.name, s.servo1, s.servo2, s.servo3, s.servo4, s.servo5, s.servo6
            );

            let style = if i == app.state.preset_cursor {
                Style::default()
                    .bg(Color::Blue)
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(Line::from(Span::styled(line, style)))
        })
        .collect();

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(" Presets "));
    f.render_widget(list, area);
}

fn draw_control(f: &mut Frame, app: &App, area: Rect) {
    let [pose, player] = Layout::vertical([Constraint::Min(7), Constraint::Length(3)]).areas(area);

    let c = app.state.control;
    let mode = match app.state.control_mode {
        ControlMode::Position => "position",
        ControlMode::Rotation => "rotation",
    };
    let highlight = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);

    let lines = vec![
        Line::from(vec![Span::raw("Mode      "), Span::styled(mode, highlight)]),
        Line::default(),
        Line::from(format!("Position  x {:>4}  y {:>4}", c.position_x, c.position_y)),
        Line::from(format!("Rotation  x {:>4}  y {:>4}", c.rotation_x, c.rotation_y)),
        Line::from(format!("Distance  {:>+3}", c.distance)),
    ];
    let title = match app.state.selected_preset {
        Some(ref preset) => format!(" Control │ {} ", preset.name),
        None => " Control ".to_string(),
    };
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title)),
        pose,
    );

    let playback = match app.player.playback() {
        Playback::Closed => "closed".to_string(),
        Playback::Paused { position } => format!("paused at {}", format_position(position)),
        Playback::Playing { position } => format!("playing at {}", format_position(position)),
    };
    f.render_widget(
        Paragraph::new(playback).block(Block::default().borders(Borders::ALL).title(" Player ")),
        player,
    );
}

/// Popup shown when the wake word comes in
fn draw_overlay(f: &mut Frame, command: &str) {
    let [area] = Layout::vertical([Constraint::Length(5)])
        .flex(Flex::Center)
        .areas(f.area());
    let [area] = Layout::horizontal([Constraint::Length(36)])
        .flex(Flex::Center)
        .areas(area);

    let popup = Paragraph::new(vec![
        Line::default(),
        Line::from(Span::styled(
            format!("🎙  {command}"),
            Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
        ))
        .centered(),
    ])
    .block(Block::default().borders(Borders::ALL).title(" Voice command "));

    f.render_widget(Clear, area);
    f.render_widget(popup, area);
}

/// Draw the status bar
fn draw_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let (text, style) = if let Some((ref msg, level)) = app.state.status_message {
        let color = match level {
            StatusLevel::Info => Color::Blue,
            StatusLevel::Success => Color::Green,
            StatusLevel::Warning => Color::Yellow,
            StatusLevel::Error => Color::Red,
        };
        (msg.clone(), Style::default().fg(color))
    } else {
        let hints = match app.state.screen {
            Screen::Login => "Tab:switch field │ Enter:sign in F3:face │ F2:sign up │ Ctrl-C:quit",
            Screen::Signup => "Enter:next │ Esc:back (keeps progress) Ctrl-X:cancel │ Ctrl-C:quit",
            Screen::Presets => "j↓ k↑ │ Enter:apply r:reload c:control o:sign out │ q:quit",
            Screen::Control => "←↓↑→:move m:mode f/n:far/near H:home C:come t/T:track │ y p Space [ ]:player │ Esc:back",
        };
        (hints.to_string(), Style::default().fg(Color::DarkGray))
    };

    f.render_widget(Paragraph::new(text).style(style), area);
}

/// Voice channel status line
fn draw_foreground_line(f: &mut Frame, app: &App, area: Rect) {
    let text = app.state.foreground_status.as_deref().unwrap_or_default();
    f.render_widget(
        Paragraph::new(text.to_string()).style(Style::default().fg(Color::Gray)),
        area,
    );
}

fn format_position(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_prompt_follows_code_state() {
        let mut form = SignupForm::default();
        form.show(SignupStep::Email, false);
        assert_eq!(signup_prompt(&form).0, "Email");
        form.show(SignupStep::Email, true);
        assert_eq!(signup_prompt(&form).0, "Code");
    }

    #[test]
    fn test_format_position() {
        assert_eq!(format_position(0), "0:00");
        assert_eq!(format_position(75), "1:15");
        assert_eq!(format_position(600), "10:00");
    }
}
