use super::{Notice, SpeechToken, TokenSource};
use crate::retry::RetryPolicy;
use crate::scheduler::{Scheduler, Wakeup};
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;
use std::time::Duration;

/// Wait before the single restart attempt when the device says it is busy.
pub const BUSY_RESTART_DELAY: Duration = Duration::from_millis(500);

/// Parameters handed to the device on every start.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionSettings {
    pub lang: String,
    pub interim_results: bool,
    pub continuous: bool,
    pub max_alternatives: u32,
}

impl Default for RecognitionSettings {
    // Non-continuous mode: one utterance per start, which is more stable on
    // flaky connections than a long-lived stream.
    fn default() -> Self {
        Self {
            lang: "en-US".to_string(),
            interim_results: true,
            continuous: false,
            max_alternatives: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartError {
    #[error("recognition has already started")]
    AlreadyActive,
    #[error("{0}")]
    Failed(String),
}

/// A speech-to-text engine.
///
/// `start` only asks the engine to begin; whether it actually started, what
/// it heard and how it ended arrive later as [`RecognitionEvent`]s tagged
/// with the same token.
#[cfg_attr(test, automock)]
pub trait RecognitionDevice: Send {
    fn start(&mut self, token: SpeechToken, settings: &RecognitionSettings) -> Result<(), StartError>;
    fn stop(&mut self);
}

/// Error classes reported by recognition engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    Network,
    NoSpeech,
    AudioCapture,
    PermissionDenied,
    Aborted,
    ServiceUnavailable,
    Other(String),
}

impl RecognitionErrorKind {
    /// Maps the error codes used by web speech engines.
    pub fn from_code(code: &str) -> Self {
        match code {
            "network" => RecognitionErrorKind::Network,
            "no-speech" => RecognitionErrorKind::NoSpeech,
            "audio-capture" => RecognitionErrorKind::AudioCapture,
            "not-allowed" | "permission-denied" => RecognitionErrorKind::PermissionDenied,
            "aborted" => RecognitionErrorKind::Aborted,
            "service-not-allowed" | "service-unavailable" => {
                RecognitionErrorKind::ServiceUnavailable
            }
            other => RecognitionErrorKind::Other(other.to_string()),
        }
    }

    fn notice(&self) -> Notice {
        match self {
            // Network errors are counted and retried before any notice is chosen.
            RecognitionErrorKind::Network => Notice::NetworkFailed,
            RecognitionErrorKind::NoSpeech => Notice::NoSpeech,
            RecognitionErrorKind::AudioCapture => Notice::AudioCapture,
            RecognitionErrorKind::PermissionDenied => Notice::PermissionDenied,
            RecognitionErrorKind::Aborted => Notice::Aborted,
            RecognitionErrorKind::ServiceUnavailable => Notice::ServiceUnavailable,
            RecognitionErrorKind::Other(code) => Notice::RecognitionError(code.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptSegment {
    pub text: String,
    pub is_final: bool,
}

impl TranscriptSegment {
    pub fn final_text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            is_final: true,
        }
    }

    pub fn interim(text: &str) -> Self {
        Self {
            text: text.to_string(),
            is_final: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEventKind {
    Started,
    Result(Vec<TranscriptSegment>),
    Error(RecognitionErrorKind),
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionEvent {
    pub token: SpeechToken,
    pub kind: RecognitionEventKind,
}

impl RecognitionEvent {
    pub fn new(token: SpeechToken, kind: RecognitionEventKind) -> Self {
        Self { token, kind }
    }
}

/// Snapshot for rendering the record button and error counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecognitionState {
    pub listening: bool,
    pub network_error_count: u32,
    pub max_retries: u32,
}

/// Drives a [`RecognitionDevice`] for one answer at a time.
pub struct SpeechInputController {
    device: Option<Box<dyn RecognitionDevice>>,
    scheduler: Arc<dyn Scheduler>,
    settings: RecognitionSettings,
    retry: RetryPolicy,
    busy_restart_delay: Duration,
    tokens: TokenSource,
    current: Option<SpeechToken>,
    listening: bool,
    network_error_count: u32,
    transcript: String,
    interim: String,
}

impl SpeechInputController {
    pub fn new(device: Option<Box<dyn RecognitionDevice>>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            device,
            scheduler,
            settings: RecognitionSettings::default(),
            retry: RetryPolicy::default(),
            busy_restart_delay: BUSY_RESTART_DELAY,
            tokens: TokenSource::default(),
            current: None,
            listening: false,
            network_error_count: 0,
            transcript: String::new(),
            interim: String::new(),
        }
    }

    pub fn with_settings(mut self, settings: RecognitionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_busy_restart_delay(mut self, delay: Duration) -> Self {
        self.busy_restart_delay = delay;
        self
    }

    pub fn state(&self) -> RecognitionState {
        RecognitionState {
            listening: self.listening,
            network_error_count: self.network_error_count,
            max_retries: self.retry.max_attempts(),
        }
    }

    pub fn is_supported(&self) -> bool {
        self.device.is_some()
    }

    pub fn current_token(&self) -> Option<SpeechToken> {
        self.current
    }

    /// Finalized speech collected for the current question.
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// The provisional text of the phrase being spoken right now.
    pub fn interim(&self) -> &str {
        &self.interim
    }

    /// Opens a new recognition run. Does nothing while already listening.
    pub fn start(&mut self) -> Option<Notice> {
        if self.listening {
            tracing::debug!("Recognition already listening, ignoring start");
            return None;
        }
        let Some(device) = self.device.as_mut() else {
            return Some(Notice::RecognitionUnsupported);
        };

        let token = self.tokens.next();
        self.current = Some(token);

        match device.start(token, &self.settings) {
            Ok(()) => {
                tracing::info!("Speech recognition {} requested", token);
                self.listening = true;
                None
            }
            Err(StartError::AlreadyActive) => {
                // Stop the stray run, then try once more after a short pause.
                tracing::warn!("Recognizer reported already active, restarting {}", token);
                device.stop();
                self.scheduler
                    .schedule(self.busy_restart_delay, Wakeup::RestartRecognition(token));
                None
            }
            Err(StartError::Failed(reason)) => {
                tracing::error!("Error starting recognition: {}", reason);
                Some(Notice::RecognitionStartFailed(reason))
            }
        }
    }

    /// Asks the device to stop. Results still in flight for this run are
    /// applied when they arrive.
    pub fn stop(&mut self) {
        if !self.listening {
            return;
        }
        if let Some(device) = self.device.as_mut() {
            device.stop();
        }
    }

    /// The record button: stops while listening, starts otherwise.
    pub fn toggle(&mut self) -> Option<Notice> {
        if self.listening {
            self.stop();
            None
        } else {
            self.start()
        }
    }

    pub fn handle_event(&mut self, event: RecognitionEvent) -> Option<Notice> {
        if self.current != Some(event.token) {
            tracing::debug!("Discarding recognition event for stale run {}", event.token);
            return None;
        }

        match event.kind {
            RecognitionEventKind::Started => {
                self.listening = true;
                self.network_error_count = 0;
                tracing::info!("Speech recognition {} started", event.token);
                None
            }
            RecognitionEventKind::Result(segments) => {
                self.apply_segments(segments);
                None
            }
            RecognitionEventKind::Ended => {
                self.listening = false;
                self.interim.clear();
                tracing::info!("Speech recognition {} ended", event.token);
                None
            }
            RecognitionEventKind::Error(kind) => {
                self.listening = false;
                self.interim.clear();
                tracing::warn!("Speech recognition error on {}: {:?}", event.token, kind);
                Some(self.on_error(event.token, kind))
            }
        }
    }

    /// Handles a retry or restart wakeup. Other wakeups are not ours.
    pub fn handle_wakeup(&mut self, wakeup: Wakeup) -> Option<Notice> {
        match wakeup {
            Wakeup::RetryRecognition(token) => {
                if self.current != Some(token) || self.listening {
                    return None;
                }
                tracing::info!(
                    "Retrying speech recognition (attempt {})",
                    self.network_error_count
                );
                self.start()
            }
            Wakeup::RestartRecognition(token) => {
                if self.current != Some(token) || self.listening {
                    return None;
                }
                let device = self.device.as_mut()?;
                match device.start(token, &self.settings) {
                    Ok(()) => {
                        self.listening = true;
                        None
                    }
                    Err(StartError::AlreadyActive) => Some(Notice::RecognizerBusy),
                    Err(StartError::Failed(reason)) => Some(Notice::RecognitionStartFailed(reason)),
                }
            }
            Wakeup::SpeakQuestion(_) => None,
        }
    }

    /// Clears everything tied to the previous question and stops listening.
    /// Pending retries and late events from earlier runs are dropped.
    pub fn reset_for_question(&mut self) {
        self.stop();
        self.current = None;
        self.listening = false;
        self.network_error_count = 0;
        self.transcript.clear();
        self.interim.clear();
    }

    fn on_error(&mut self, token: SpeechToken, kind: RecognitionErrorKind) -> Notice {
        if kind != RecognitionErrorKind::Network {
            return kind.notice();
        }

        self.network_error_count += 1;
        match self.retry.next_delay(self.network_error_count) {
            Some(delay) => {
                self.scheduler
                    .schedule(delay, Wakeup::RetryRecognition(token));
                Notice::NetworkRetrying {
                    attempt: self.network_error_count,
                    max_attempts: self.retry.max_attempts(),
                }
            }
            None => Notice::NetworkFailed,
        }
    }

    fn apply_segments(&mut self, segments: Vec<TranscriptSegment>) {
        let mut interim = String::new();
        for segment in segments {
            if segment.is_final {
                let text = segment.text.trim();
                if text.is_empty() {
                    continue;
                }
                if !self.transcript.is_empty() {
                    self.transcript.push(' ');
                }
                self.transcript.push_str(text);
            } else {
                interim.push_str(&segment.text);
            }
        }
        self.interim = interim;
    }
}
