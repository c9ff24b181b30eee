//! Core trigger state machine
//!
//! Each trigger walks Idle -> Normalizing -> (Replaying) -> Idle. A trigger
//! that arrives while another sequence is in flight is ignored rather than
//! interleaved with it.

use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::clipboard::{ClipboardNormalizer, NormalizeOutcome};
use crate::config::{Config, Settings};
use crate::events::{TriggerEvent, TriggerSource};
use crate::hotkey::{HotkeyBinding, HotkeyCapture, HotkeyEvent, RegistrationError};
use crate::replay::PasteReplay;

/// Phases of one trigger sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No sequence in flight, waiting for a trigger
    #[default]
    Idle,
    /// Reading and rewriting the clipboard
    Normalizing,
    /// Sending the paste keystrokes
    Replaying,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "Idle"),
            Phase::Normalizing => write!(f, "Normalizing"),
            Phase::Replaying => write!(f, "Replaying"),
        }
    }
}

/// Result of one trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceResult {
    /// Another sequence was in flight
    Ignored,
    Completed {
        outcome: NormalizeOutcome,
        paste_attempted: bool,
    },
}

/// Requests from the IPC server to the state machine
#[derive(Debug)]
pub enum Command {
    /// Convert only, as the tray icon double-click does
    Convert {
        reply: oneshot::Sender<SequenceResult>,
    },
    /// Re-read settings and re-register the hotkey
    Reload {
        reply: oneshot::Sender<Result<String, RegistrationError>>,
    },
}

/// The normalize-then-replay sequence, guarded against re-entry
pub struct TriggerSequence {
    normalizer: ClipboardNormalizer,
    paste: Box<dyn PasteReplay>,
    phase: Mutex<Phase>,
}

/// Returns the sequence to Idle when dropped, even on panic
struct PhaseGuard<'a> {
    phase: &'a Mutex<Phase>,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        set_phase(self.phase, Phase::Idle);
    }
}

fn set_phase(phase: &Mutex<Phase>, next: Phase) {
    let mut current = phase.lock().unwrap_or_else(|e| e.into_inner());
    debug!(from = %*current, to = %next, "phase transition");
    *current = next;
}

impl TriggerSequence {
    pub fn new(normalizer: ClipboardNormalizer, paste: Box<dyn PasteReplay>) -> Self {
        Self {
            normalizer,
            paste,
            phase: Mutex::new(Phase::Idle),
        }
    }

    /// Get the current phase
    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run one trigger to completion.
    ///
    /// A paste is replayed only for hotkey triggers, only when enabled, and
    /// only after the clipboard was actually normalized.
    pub fn run(&self, source: TriggerSource, paste_enabled: bool) -> SequenceResult {
        let Some(_guard) = self.begin() else {
            debug!(?source, "trigger ignored, sequence in flight");
            return SequenceResult::Ignored;
        };

        let outcome = self.normalizer.normalize_clipboard();

        let paste_attempted = outcome == NormalizeOutcome::Normalized
            && source == TriggerSource::Hotkey
            && paste_enabled;
        if paste_attempted {
            set_phase(&self.phase, Phase::Replaying);
            self.paste.replay_paste();
        }

        SequenceResult::Completed {
            outcome,
            paste_attempted,
        }
    }

    fn begin(&self) -> Option<PhaseGuard<'_>> {
        let mut current = self.phase.lock().unwrap_or_else(|e| e.into_inner());
        if *current != Phase::Idle {
            return None;
        }
        debug!(from = %*current, to = %Phase::Normalizing, "phase transition");
        *current = Phase::Normalizing;
        Some(PhaseGuard { phase: &self.phase })
    }
}

/// Map a finished sequence to the event announced to subscribers
pub fn completion_event(
    source: TriggerSource,
    result: SequenceResult,
    settings: &Settings,
) -> TriggerEvent {
    match result {
        SequenceResult::Ignored => TriggerEvent::TriggerIgnored { source },
        SequenceResult::Completed {
            outcome,
            paste_attempted,
        } => TriggerEvent::TriggerCompleted {
            source,
            outcome,
            paste_attempted,
            play_sound: settings.play_sound
                && source == TriggerSource::Hotkey
                && outcome == NormalizeOutcome::Normalized,
        },
    }
}

/// The state machine that owns the hotkey and dispatches triggers
pub struct TriggerMachine {
    sequence: Arc<TriggerSequence>,
    /// None when the OS hotkey facility could not be initialised
    capture: Option<HotkeyCapture>,
    config: Config,
    settings: Settings,
    /// Channel for emitting trigger events
    event_tx: broadcast::Sender<TriggerEvent>,
}

impl TriggerMachine {
    /// Create a new state machine
    pub fn new(
        sequence: Arc<TriggerSequence>,
        capture: Option<HotkeyCapture>,
        config: Config,
        event_tx: broadcast::Sender<TriggerEvent>,
    ) -> Self {
        Self {
            sequence,
            capture,
            config,
            settings: Settings::default(),
            event_tx,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn capture(&self) -> Option<&HotkeyCapture> {
        self.capture.as_ref()
    }

    /// Adopt new settings and re-register the hotkey.
    ///
    /// Failure leaves the hotkey inactive; it is logged and announced but
    /// never fatal.
    pub fn apply_settings(&mut self, settings: Settings) -> Result<HotkeyBinding, RegistrationError> {
        let binding = settings.binding();
        self.settings = settings;

        let result = match self.capture.as_mut() {
            Some(capture) => {
                let requested = binding.clone();
                capture.reconfigure(binding).and(requested)
            }
            None => Err(RegistrationError::Unavailable(
                "hotkey backend not initialised".into(),
            )),
        };

        let event = match &result {
            Ok(binding) => TriggerEvent::HotkeyRegistered {
                binding: binding.to_string(),
            },
            Err(e) => {
                warn!(%e, "hotkey inactive, manual convert still available");
                TriggerEvent::HotkeyInactive {
                    reason: e.to_string(),
                }
            }
        };
        let _ = self.event_tx.send(event);

        result
    }

    /// Re-read the settings file and apply it
    pub fn reload(&mut self) -> Result<HotkeyBinding, RegistrationError> {
        let settings = self.config.load_settings();
        info!(?settings, "settings reloaded");
        self.apply_settings(settings)
    }

    /// Run the state machine, processing hotkey events and commands
    pub async fn run(
        &mut self,
        mut hotkey_rx: mpsc::Receiver<HotkeyEvent>,
        mut command_rx: mpsc::Receiver<Command>,
    ) {
        info!("state machine started in Idle state");

        loop {
            tokio::select! {
                Some(event) = hotkey_rx.recv() => self.handle_hotkey(event),
                Some(command) = command_rx.recv() => self.handle_command(command),
                else => break,
            }
        }

        info!("state machine stopped");
    }

    fn handle_hotkey(&mut self, event: HotkeyEvent) {
        match event {
            HotkeyEvent::Fired { id } => {
                let active = self
                    .capture
                    .as_ref()
                    .and_then(|c| c.handle())
                    .map(|h| h.id());
                if active != Some(id) {
                    debug!(id, ?active, "stale hotkey event dropped");
                    return;
                }
                self.dispatch(TriggerSource::Hotkey, None);
            }
            HotkeyEvent::Disconnected => {
                warn!("hotkey events disconnected, presses will be missed");
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Convert { reply } => self.dispatch(TriggerSource::Manual, Some(reply)),
            Command::Reload { reply } => {
                let result = self.reload().map(|binding| binding.to_string());
                let _ = reply.send(result);
            }
        }
    }

    /// Run a sequence on the blocking pool without waiting for it, so a
    /// trigger arriving meanwhile reaches the re-entry guard.
    fn dispatch(&self, source: TriggerSource, reply: Option<oneshot::Sender<SequenceResult>>) {
        let sequence = Arc::clone(&self.sequence);
        let settings = self.settings.clone();
        let event_tx = self.event_tx.clone();

        info!(?source, "trigger received");

        tokio::task::spawn_blocking(move || {
            let result = sequence.run(source, settings.paste_into_active_window);
            let event = completion_event(source, result, &settings);
            debug!(%event, "emitting trigger event");
            let _ = event_tx.send(event);
            if let Some(reply) = reply {
                let _ = reply.send(result);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc as std_mpsc;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::clipboard::fakes::FakeClipboard;
    use crate::clipboard::{ClipboardAccess, ClipboardAccessError};
    use crate::hotkey::fakes::{binding, Call, FakeBackend};
    use crate::replay::fakes::CountingPaste;

    fn sequence(clipboard: &FakeClipboard, paste: &CountingPaste) -> Arc<TriggerSequence> {
        Arc::new(TriggerSequence::new(
            ClipboardNormalizer::new(Box::new(clipboard.clone())),
            Box::new(paste.clone()),
        ))
    }

    fn temp_config(name: &str) -> Config {
        let dir = std::env::temp_dir().join(format!(
            "puretext-machine-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        let config = Config::in_dir(dir);
        config.ensure_dirs().unwrap();
        config
    }

    fn settings_for(key: &str) -> Settings {
        Settings {
            hotkey: key.to_string(),
            ..Settings::default()
        }
    }

    async fn next_completion(rx: &mut broadcast::Receiver<TriggerEvent>) -> TriggerEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for trigger event")
            .expect("event channel closed")
    }

    #[test]
    fn test_initial_phase() {
        let seq = sequence(&FakeClipboard::default(), &CountingPaste::default());
        assert_eq!(seq.phase(), Phase::Idle);
    }

    #[test]
    fn test_hotkey_normalizes_and_pastes() {
        let clipboard = FakeClipboard::with_rich("Hello World", "Hello **World**");
        let paste = CountingPaste::default();
        let seq = sequence(&clipboard, &paste);

        let result = seq.run(TriggerSource::Hotkey, true);

        assert_eq!(
            result,
            SequenceResult::Completed {
                outcome: NormalizeOutcome::Normalized,
                paste_attempted: true,
            }
        );
        assert_eq!(clipboard.text().as_deref(), Some("Hello World"));
        assert_eq!(paste.count(), 1);
        assert_eq!(seq.phase(), Phase::Idle);
    }

    #[test]
    fn test_skipped_never_pastes() {
        let clipboard = FakeClipboard::default();
        let paste = CountingPaste::default();
        let seq = sequence(&clipboard, &paste);

        for _ in 0..3 {
            let result = seq.run(TriggerSource::Hotkey, true);
            assert_eq!(
                result,
                SequenceResult::Completed {
                    outcome: NormalizeOutcome::Skipped,
                    paste_attempted: false,
                }
            );
        }
        assert_eq!(paste.count(), 0);
        assert_eq!(clipboard.writes(), 0);
    }

    #[test]
    fn test_paste_disabled() {
        let clipboard = FakeClipboard::with_text("text");
        let paste = CountingPaste::default();
        let seq = sequence(&clipboard, &paste);

        seq.run(TriggerSource::Hotkey, false);
        assert_eq!(paste.count(), 0);
        assert_eq!(clipboard.writes(), 1);
    }

    #[test]
    fn test_manual_trigger_never_pastes() {
        let clipboard = FakeClipboard::with_text("text");
        let paste = CountingPaste::default();
        let seq = sequence(&clipboard, &paste);

        let result = seq.run(TriggerSource::Manual, true);
        assert_eq!(
            result,
            SequenceResult::Completed {
                outcome: NormalizeOutcome::Normalized,
                paste_attempted: false,
            }
        );
        assert_eq!(paste.count(), 0);
    }

    /// Clipboard whose read blocks until the test releases it
    struct GatedClipboard {
        entered: std_mpsc::Sender<()>,
        release: Mutex<std_mpsc::Receiver<()>>,
    }

    impl ClipboardAccess for GatedClipboard {
        fn read_text(&self) -> Result<String, ClipboardAccessError> {
            self.entered.send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
            Ok("gated".into())
        }

        fn write_text(&self, _text: &str) -> Result<(), ClipboardAccessError> {
            Ok(())
        }
    }

    #[test]
    fn test_reentrant_trigger_is_ignored() {
        let (entered_tx, entered_rx) = std_mpsc::channel();
        let (release_tx, release_rx) = std_mpsc::channel();
        let paste = CountingPaste::default();
        let seq = Arc::new(TriggerSequence::new(
            ClipboardNormalizer::new(Box::new(GatedClipboard {
                entered: entered_tx,
                release: Mutex::new(release_rx),
            })),
            Box::new(paste.clone()),
        ));

        let first = {
            let seq = Arc::clone(&seq);
            thread::spawn(move || seq.run(TriggerSource::Hotkey, true))
        };
        entered_rx.recv().unwrap();

        assert_eq!(seq.phase(), Phase::Normalizing);
        assert_eq!(seq.run(TriggerSource::Hotkey, true), SequenceResult::Ignored);
        assert_eq!(seq.run(TriggerSource::Manual, false), SequenceResult::Ignored);

        release_tx.send(()).unwrap();
        assert_eq!(
            first.join().unwrap(),
            SequenceResult::Completed {
                outcome: NormalizeOutcome::Normalized,
                paste_attempted: true,
            }
        );
        assert_eq!(paste.count(), 1);
        assert_eq!(seq.phase(), Phase::Idle);
    }

    #[test]
    fn test_completion_event_sound() {
        let settings = Settings {
            play_sound: true,
            ..Settings::default()
        };
        let normalized = SequenceResult::Completed {
            outcome: NormalizeOutcome::Normalized,
            paste_attempted: false,
        };
        let skipped = SequenceResult::Completed {
            outcome: NormalizeOutcome::Skipped,
            paste_attempted: false,
        };

        let sound = |event: TriggerEvent| match event {
            TriggerEvent::TriggerCompleted { play_sound, .. } => play_sound,
            other => panic!("unexpected {other:?}"),
        };
        assert!(sound(completion_event(TriggerSource::Hotkey, normalized, &settings)));
        assert!(!sound(completion_event(TriggerSource::Manual, normalized, &settings)));
        assert!(!sound(completion_event(TriggerSource::Hotkey, skipped, &settings)));
        assert!(!sound(completion_event(
            TriggerSource::Hotkey,
            normalized,
            &Settings::default()
        )));
        assert_eq!(
            completion_event(TriggerSource::Hotkey, SequenceResult::Ignored, &settings),
            TriggerEvent::TriggerIgnored {
                source: TriggerSource::Hotkey
            }
        );
    }

    #[test]
    fn test_apply_settings_registers_hotkey() {
        let backend = FakeBackend::default();
        let (tx, mut rx) = broadcast::channel(16);
        let mut machine = TriggerMachine::new(
            sequence(&FakeClipboard::default(), &CountingPaste::default()),
            Some(HotkeyCapture::new(Box::new(backend))),
            temp_config("apply"),
            tx,
        );

        let registered = machine.apply_settings(settings_for("V")).unwrap();
        assert_eq!(registered, binding("V"));
        assert_eq!(
            rx.try_recv().unwrap(),
            TriggerEvent::HotkeyRegistered {
                binding: "Ctrl+Alt+V".into()
            }
        );
    }

    #[test]
    fn test_malformed_key_leaves_hotkey_inactive() {
        let backend = FakeBackend::default();
        let (tx, mut rx) = broadcast::channel(16);
        let mut machine = TriggerMachine::new(
            sequence(&FakeClipboard::default(), &CountingPaste::default()),
            Some(HotkeyCapture::new(Box::new(backend.clone()))),
            temp_config("malformed"),
            tx,
        );

        machine.apply_settings(settings_for("V")).unwrap();
        let err = machine.apply_settings(settings_for("Bogus")).unwrap_err();

        assert!(matches!(err, RegistrationError::InvalidCombination(_)));
        assert!(!machine.capture().unwrap().is_active());
        let id = binding("V").to_hotkey().id();
        assert_eq!(backend.calls(), vec![Call::Register(id), Call::Unregister(id)]);
        assert!(matches!(rx.try_recv(), Ok(TriggerEvent::HotkeyRegistered { .. })));
        assert!(matches!(rx.try_recv(), Ok(TriggerEvent::HotkeyInactive { .. })));
    }

    #[test]
    fn test_missing_backend_is_not_fatal() {
        let (tx, _rx) = broadcast::channel(16);
        let mut machine = TriggerMachine::new(
            sequence(&FakeClipboard::default(), &CountingPaste::default()),
            None,
            temp_config("nobackend"),
            tx,
        );
        assert!(matches!(
            machine.apply_settings(Settings::default()),
            Err(RegistrationError::Unavailable(_))
        ));
    }

    #[test]
    fn test_reload_reads_settings_file() {
        let config = temp_config("reload");
        std::fs::write(
            &config.settings_path,
            r#"{"hotkey":"B","modifier_alt":true,"modifier_control":true}"#,
        )
        .unwrap();

        let (tx, _rx) = broadcast::channel(16);
        let mut machine = TriggerMachine::new(
            sequence(&FakeClipboard::default(), &CountingPaste::default()),
            Some(HotkeyCapture::new(Box::new(FakeBackend::default()))),
            config,
            tx,
        );

        assert_eq!(machine.reload().unwrap(), binding("B"));
        assert_eq!(machine.settings().hotkey, "B");
    }

    #[tokio::test]
    async fn test_reconfigured_old_binding_has_no_effect() {
        let backend = FakeBackend::default();
        let clipboard = FakeClipboard::with_text("plain");
        let paste = CountingPaste::default();
        let (tx, _) = broadcast::channel(16);
        let mut machine = TriggerMachine::new(
            sequence(&clipboard, &paste),
            Some(HotkeyCapture::new(Box::new(backend.clone()))),
            temp_config("reconfigure"),
            tx.clone(),
        );

        machine.apply_settings(settings_for("V")).unwrap();
        machine.apply_settings(settings_for("B")).unwrap();
        let old_id = binding("V").to_hotkey().id();
        let new_id = binding("B").to_hotkey().id();
        assert_eq!(
            backend.calls(),
            vec![
                Call::Register(old_id),
                Call::Unregister(old_id),
                Call::Register(new_id),
            ]
        );

        let mut events = tx.subscribe();
        let (hotkey_tx, hotkey_rx) = mpsc::channel(8);
        let (command_tx, command_rx) = mpsc::channel(8);

        let drive = async move {
            hotkey_tx.send(HotkeyEvent::Fired { id: old_id }).await.unwrap();
            hotkey_tx.send(HotkeyEvent::Fired { id: new_id }).await.unwrap();
            let event = next_completion(&mut events).await;
            drop(hotkey_tx);
            drop(command_tx);
            (event, events)
        };

        let ((event, mut events), ()) = tokio::join!(drive, machine.run(hotkey_rx, command_rx));

        assert_eq!(
            event,
            TriggerEvent::TriggerCompleted {
                source: TriggerSource::Hotkey,
                outcome: NormalizeOutcome::Normalized,
                paste_attempted: true,
                play_sound: false,
            }
        );
        assert!(events.try_recv().is_err());
        assert_eq!(clipboard.writes(), 1);
        assert_eq!(paste.count(), 1);
    }

    #[tokio::test]
    async fn test_manual_convert_works_when_hotkey_already_bound() {
        let backend = FakeBackend::default();
        backend.claim_elsewhere(&binding("V"));
        let clipboard = FakeClipboard::with_rich("Hello World", "Hello **World**");
        let paste = CountingPaste::default();
        let (tx, _) = broadcast::channel(16);
        let mut machine = TriggerMachine::new(
            sequence(&clipboard, &paste),
            Some(HotkeyCapture::new(Box::new(backend))),
            temp_config("bound"),
            tx,
        );

        let err = machine.apply_settings(settings_for("V")).unwrap_err();
        assert!(matches!(err, RegistrationError::AlreadyBound(_)));

        let (hotkey_tx, hotkey_rx) = mpsc::channel(8);
        let (command_tx, command_rx) = mpsc::channel(8);

        let drive = async move {
            let (reply_tx, reply_rx) = oneshot::channel();
            command_tx
                .send(Command::Convert { reply: reply_tx })
                .await
                .unwrap();
            let result = reply_rx.await.unwrap();
            drop(command_tx);
            drop(hotkey_tx);
            result
        };

        let (result, ()) = tokio::join!(drive, machine.run(hotkey_rx, command_rx));

        assert_eq!(
            result,
            SequenceResult::Completed {
                outcome: NormalizeOutcome::Normalized,
                paste_attempted: false,
            }
        );
        assert_eq!(clipboard.text().as_deref(), Some("Hello World"));
        assert_eq!(paste.count(), 0);
    }

    #[tokio::test]
    async fn test_reload_command_replies_with_binding() {
        let config = temp_config("reload-command");
        std::fs::write(&config.settings_path, r#"{"hotkey":"F9"}"#).unwrap();
        let (tx, _) = broadcast::channel(16);
        let mut machine = TriggerMachine::new(
            sequence(&FakeClipboard::default(), &CountingPaste::default()),
            Some(HotkeyCapture::new(Box::new(FakeBackend::default()))),
            config,
            tx,
        );

        let (hotkey_tx, hotkey_rx) = mpsc::channel(8);
        let (command_tx, command_rx) = mpsc::channel(8);

        let drive = async move {
            let (reply_tx, reply_rx) = oneshot::channel();
            command_tx.send(Command::Reload { reply: reply_tx }).await.unwrap();
            let result = reply_rx.await.unwrap();
            drop(command_tx);
            drop(hotkey_tx);
            result
        };

        let (result, ()) = tokio::join!(drive, machine.run(hotkey_rx, command_rx));
        assert_eq!(result, Ok("Ctrl+Alt+F9".to_string()));
    }
}
