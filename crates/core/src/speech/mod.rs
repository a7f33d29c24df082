//! Speech input and output controllers.
//!
//! Devices (a browser speech API, a native engine, a console stub) report
//! their progress asynchronously. Every recognition or synthesis run gets a
//! fresh [`SpeechToken`] and the device echoes it back on each event, so the
//! controllers can tell events for the current run from late events of a
//! run that was already superseded.

pub mod input;
pub mod output;

use std::fmt;

pub use input::{
    RecognitionDevice, RecognitionErrorKind, RecognitionEvent, RecognitionEventKind,
    RecognitionSettings, RecognitionState, SpeechInputController, StartError, TranscriptSegment,
};
pub use output::{
    SpeechOutputController, SynthesisDevice, SynthesisEvent, SynthesisEventKind, SynthesisState,
    Utterance, Voice,
};

/// Identifies one recognition or synthesis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpeechToken(u64);

impl fmt::Display for SpeechToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out increasing tokens.
#[derive(Debug, Default)]
pub struct TokenSource {
    last: u64,
}

impl TokenSource {
    pub fn next(&mut self) -> SpeechToken {
        self.last += 1;
        SpeechToken(self.last)
    }
}

/// A message for the candidate about speech input or output.
///
/// Notices never stop the interview; the candidate can always type instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    NetworkRetrying { attempt: u32, max_attempts: u32 },
    NetworkFailed,
    NoSpeech,
    AudioCapture,
    PermissionDenied,
    Aborted,
    ServiceUnavailable,
    RecognitionError(String),
    RecognizerBusy,
    RecognitionStartFailed(String),
    RecognitionUnsupported,
    SpeechOutputFailed(String),
    SpeechOutputUnsupported,
}

impl Notice {
    /// Whether the controller is already trying again on its own.
    pub fn is_transient(&self) -> bool {
        matches!(self, Notice::NetworkRetrying { .. } | Notice::RecognizerBusy)
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::NetworkRetrying {
                attempt,
                max_attempts,
            } => write!(f, "Network issue. Retrying... ({attempt}/{max_attempts})"),
            Notice::NetworkFailed => write!(
                f,
                "Network connection issue. Please check your internet connection and try again. You can also type your answer instead."
            ),
            Notice::NoSpeech => write!(f, "No speech detected. Please try speaking again."),
            Notice::AudioCapture => write!(
                f,
                "No microphone found. Please check your microphone connection."
            ),
            Notice::PermissionDenied => write!(
                f,
                "Microphone permission denied. Please allow microphone access in your settings."
            ),
            Notice::Aborted => write!(f, "Recording aborted. Start recording again to retry."),
            Notice::ServiceUnavailable => write!(
                f,
                "Speech service not available. Please use text input instead."
            ),
            Notice::RecognitionError(code) => write!(
                f,
                "Speech recognition error: {code}. You can type your answer instead."
            ),
            Notice::RecognizerBusy => write!(f, "Please wait a moment and try again."),
            Notice::RecognitionStartFailed(reason) => write!(
                f,
                "Error starting microphone ({reason}). Please try again."
            ),
            Notice::RecognitionUnsupported => write!(
                f,
                "Speech recognition is not available. Please type your answer."
            ),
            Notice::SpeechOutputFailed(reason) => {
                write!(f, "Error speaking question: {reason}")
            }
            Notice::SpeechOutputUnsupported => write!(f, "Text-to-speech is not available."),
        }
    }
}
