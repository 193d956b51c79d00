//! Voice call handling and the on-screen overlay
//!
//! The robot relays its wake word through the backend; the client buzzes,
//! posts a notification and shows an overlay for a few seconds. Media
//! commands arrive the same way and are handed to a `MediaController`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::{CommandStatus, YoutubeCommand};

/// Wake word as spoken to the robot
pub const WAKE_WORD_KO: &str = "싸비스";

/// Normalized command name for the wake word
pub const WAKE_WORD: &str = "SARVIS";

/// Platform hooks for user-facing alerts
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
    fn vibrate(&self, duration: Duration);
    /// Persistent status line (foreground service text on phones)
    fn set_status(&self, text: &str);
}

/// Notifier that only writes to the log
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        info!(title, body, "notification");
    }

    fn vibrate(&self, duration: Duration) {
        debug!(ms = duration.as_millis() as u64, "vibrate");
    }

    fn set_status(&self, text: &str) {
        debug!(text, "status");
    }
}

/// Map the spoken wake word to its canonical name, pass anything else through
pub fn normalize_command(command: &str) -> String {
    let trimmed = command.trim();
    if trimmed == WAKE_WORD_KO {
        WAKE_WORD.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Alert the user about a voice call unless `silent`; returns the normalized command
pub fn handle_voice_command(notifier: &dyn Notifier, command: &str, silent: bool, vibration: Duration) -> String {
    let command = normalize_command(command);
    info!(%command, silent, "voice command received");

    if !silent {
        notifier.vibrate(vibration);
        notifier.notify("SARVIS", &format!("Voice command: {command}"));
    }
    command
}

#[derive(Debug, Default)]
struct OverlayInner {
    command: Option<String>,
    generation: u64,
}

/// Transient "SARVIS is listening" overlay
///
/// `show` (re)arms an auto-dismiss timer; a newer `show` or an explicit
/// `dismiss` makes older timers no-ops. Must be used inside a tokio runtime.
pub struct VoiceOverlay {
    inner: Arc<Mutex<OverlayInner>>,
    timer: Mutex<Option<CancellationToken>>,
    dismiss_after: Duration,
}

impl VoiceOverlay {
    pub fn new(dismiss_after: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(OverlayInner::default())),
            timer: Mutex::new(None),
            dismiss_after,
        }
    }

    pub fn show(&self, command: impl Into<String>) {
        let generation = {
            let Ok(mut inner) = self.inner.lock() else {
                warn!("overlay lock poisoned");
                return;
            };
            inner.command = Some(command.into());
            inner.generation += 1;
            inner.generation
        };

        let token = CancellationToken::new();
        self.replace_timer(Some(token.clone()));

        let inner = Arc::clone(&self.inner);
        let delay = self.dismiss_after;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Ok(mut inner) = inner.lock() {
                        if inner.generation == generation {
                            inner.command = None;
                            debug!("overlay auto-dismissed");
                        }
                    }
                }
            }
        });
    }

    pub fn dismiss(&self) {
        self.replace_timer(None);
        if let Ok(mut inner) = self.inner.lock() {
            inner.command = None;
            inner.generation += 1;
        }
    }

    pub fn is_visible(&self) -> bool {
        self.command().is_some()
    }

    pub fn command(&self) -> Option<String> {
        self.inner.lock().ok().and_then(|inner| inner.command.clone())
    }

    fn replace_timer(&self, next: Option<CancellationToken>) {
        if let Ok(mut timer) = self.timer.lock() {
            if let Some(previous) = std::mem::replace(&mut *timer, next) {
                previous.cancel();
            }
        }
    }
}

impl Drop for VoiceOverlay {
    fn drop(&mut self) {
        self.replace_timer(None);
    }
}

/// Player that YouTube commands are forwarded to
pub trait MediaController: Send + Sync {
    fn open(&self) -> anyhow::Result<()>;
    fn play(&self) -> anyhow::Result<()>;
    fn pause(&self) -> anyhow::Result<()>;
    fn seek_forward(&self) -> anyhow::Result<()>;
    fn seek_backward(&self) -> anyhow::Result<()>;
}

/// Run a media command and report how it went
pub fn dispatch_youtube(media: &dyn MediaController, command: YoutubeCommand) -> CommandStatus {
    let result = match command {
        YoutubeCommand::Open => media.open(),
        YoutubeCommand::Play => media.play(),
        YoutubeCommand::Pause => media.pause(),
        YoutubeCommand::SeekForward => media.seek_forward(),
        YoutubeCommand::SeekBackward => media.seek_backward(),
        YoutubeCommand::Unknown => Err(anyhow::anyhow!("unsupported media command")),
    };

    match result {
        Ok(()) => {
            info!(command = command.as_str(), "media command executed");
            CommandStatus::Success
        }
        Err(e) => {
            warn!(command = command.as_str(), error = %e, "media command failed");
            CommandStatus::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingNotifier {
        notified: AtomicUsize,
        vibrated: AtomicUsize,
    }

    impl Notifier for CountingNotifier {
        fn notify(&self, _title: &str, _body: &str) {
            self.notified.fetch_add(1, Ordering::SeqCst);
        }
        fn vibrate(&self, _duration: Duration) {
            self.vibrated.fetch_add(1, Ordering::SeqCst);
        }
        fn set_status(&self, _text: &str) {}
    }

    struct BrokenPlayer;

    impl MediaController for BrokenPlayer {
        fn open(&self) -> anyhow::Result<()> {
            Ok(())
        }
        fn play(&self) -> anyhow::Result<()> {
            anyhow::bail!("no player")
        }
        fn pause(&self) -> anyhow::Result<()> {
            Ok(())
        }
        fn seek_forward(&self) -> anyhow::Result<()> {
            Ok(())
        }
        fn seek_backward(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_wake_word_mapping() {
        assert_eq!(normalize_command("싸비스"), "SARVIS");
        assert_eq!(normalize_command(" 싸비스 "), "SARVIS");
        assert_eq!(normalize_command("hello"), "hello");
    }

    #[test]
    fn test_silent_handling_skips_alerts() {
        let notifier = CountingNotifier::default();
        handle_voice_command(&notifier, "싸비스", true, Duration::from_millis(100));
        assert_eq!(notifier.notified.load(Ordering::SeqCst), 0);

        let cmd = handle_voice_command(&notifier, "싸비스", false, Duration::from_millis(100));
        assert_eq!(cmd, "SARVIS");
        assert_eq!(notifier.notified.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.vibrated.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_reports_failure() {
        assert_eq!(dispatch_youtube(&BrokenPlayer, YoutubeCommand::Play), CommandStatus::Failed);
        assert_eq!(dispatch_youtube(&BrokenPlayer, YoutubeCommand::Pause), CommandStatus::Success);
        assert_eq!(dispatch_youtube(&BrokenPlayer, YoutubeCommand::Unknown), CommandStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlay_auto_dismiss() {
        let overlay = VoiceOverlay::new(Duration::from_secs(3));
        overlay.show("SARVIS");
        assert_eq!(overlay.command().as_deref(), Some("SARVIS"));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(overlay.is_visible());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(!overlay.is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlay_reshow_rearms_timer() {
        let overlay = VoiceOverlay::new(Duration::from_secs(3));
        overlay.show("first");
        tokio::time::sleep(Duration::from_secs(2)).await;
        overlay.show("second");

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(overlay.command().as_deref(), Some("second"));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(!overlay.is_visible());
    }

    #[tokio::test]
    async fn test_overlay_manual_dismiss() {
        let overlay = VoiceOverlay::new(Duration::from_secs(3));
        overlay.show("SARVIS");
        overlay.dismiss();
        assert!(!overlay.is_visible());
    }
}
