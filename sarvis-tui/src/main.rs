//! sarvis-tui: Terminal client for the SARVIS robot assistant
//!
//! - Password login with session restore
//! - Preset list and selection
//! - Arrow-pad arm control
//! - Voice wake-word overlay and media commands from the push channel

mod app;
mod input;
mod ui;

use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use sarvis_core::state::Screen;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::{App, AppResult};
use crate::input::handle_key;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Log to a file; stdout belongs to the terminal UI
    let log_file = dirs::cache_dir()
        .map(|d| d.join("sarvis").join("tui.log"))
        .unwrap_or_else(|| std::path::PathBuf::from("/tmp/sarvis-tui.log"));

    if let Some(parent) = log_file.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file_appender = tracing_appender::rolling::never(
        log_file.parent().unwrap_or(std::path::Path::new("/tmp")),
        log_file.file_name().unwrap_or(std::ffi::OsStr::new("sarvis-tui.log")),
    );

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "sarvis_tui=debug,sarvis_core=debug".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(file_appender))
        .init();

    let config = sarvis_core::Config::load().unwrap_or_default();
    let mouse = config.client.tui.mouse;

    let mut app = App::new(config)?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    if mouse {
        execute!(stdout, EnableMouseCapture)?;
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    if mouse {
        execute!(terminal.backend_mut(), DisableMouseCapture)?;
    }
    terminal.show_cursor()?;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        return Err(e);
    }

    Ok(())
}

/// Main application loop
async fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> anyhow::Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        // Short poll keeps push channel events flowing into the UI
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                // 'q' is typed text on the login and signup forms
                if key.code == KeyCode::Char('q')
                    && key.modifiers.is_empty()
                    && !matches!(app.state.screen, Screen::Login | Screen::Signup)
                    && app.state.overlay.is_none()
                {
                    return Ok(());
                }
                if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                    return Ok(());
                }

                match handle_key(app, key).await {
                    AppResult::Continue => {}
                    AppResult::Quit => return Ok(()),
                }
            }
        }

        app.tick().await;
    }
}
