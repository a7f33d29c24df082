use super::{Notice, SpeechToken, TokenSource};
#[cfg(test)]
use mockall::automock;

/// Questions are read a little slower than normal speech.
pub const DEFAULT_RATE: f32 = 0.9;
pub const DEFAULT_PITCH: f32 = 1.0;
pub const DEFAULT_VOLUME: f32 = 1.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub name: String,
    pub lang: String,
}

impl Voice {
    pub fn new(name: &str, lang: &str) -> Self {
        Self {
            name: name.to_string(),
            lang: lang.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub voice: Option<Voice>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct SynthesisError(pub String);

/// A text-to-speech engine.
#[cfg_attr(test, automock)]
pub trait SynthesisDevice: Send {
    /// Voices known right now. Some engines load them lazily and announce
    /// changes with [`SynthesisEvent::VoicesChanged`].
    fn voices(&self) -> Vec<Voice>;
    fn speak(&mut self, token: SpeechToken, utterance: &Utterance) -> Result<(), SynthesisError>;
    fn cancel(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEventKind {
    Started,
    Ended,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEvent {
    Utterance {
        token: SpeechToken,
        kind: SynthesisEventKind,
    },
    VoicesChanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisState {
    pub speaking: bool,
    pub selected_voice: Option<Voice>,
}

/// Picks a natural sounding English voice when there is one, then any
/// English voice, then whatever comes first.
pub fn select_voice(voices: &[Voice]) -> Option<Voice> {
    voices
        .iter()
        .find(|v| v.lang.starts_with("en") && v.name.contains("Natural"))
        .or_else(|| voices.iter().find(|v| v.lang.starts_with("en")))
        .or_else(|| voices.first())
        .cloned()
}

/// Reads questions aloud, one utterance at a time.
pub struct SpeechOutputController {
    device: Option<Box<dyn SynthesisDevice>>,
    tokens: TokenSource,
    current: Option<SpeechToken>,
    speaking: bool,
    selected_voice: Option<Voice>,
}

impl SpeechOutputController {
    pub fn new(device: Option<Box<dyn SynthesisDevice>>) -> Self {
        let mut controller = Self {
            device,
            tokens: TokenSource::default(),
            current: None,
            speaking: false,
            selected_voice: None,
        };
        controller.refresh_voices();
        controller
    }

    pub fn state(&self) -> SynthesisState {
        SynthesisState {
            speaking: self.speaking,
            selected_voice: self.selected_voice.clone(),
        }
    }

    pub fn is_supported(&self) -> bool {
        self.device.is_some()
    }

    pub fn current_token(&self) -> Option<SpeechToken> {
        self.current
    }

    /// Re-runs voice selection against the device's current voice list.
    pub fn refresh_voices(&mut self) {
        let Some(device) = self.device.as_ref() else {
            return;
        };
        let voices = device.voices();
        self.selected_voice = select_voice(&voices);
        tracing::debug!(
            "Loaded {} voices. Selected: {:?}",
            voices.len(),
            self.selected_voice.as_ref().map(|v| v.name.as_str())
        );
    }

    /// Speaks `text`, cancelling whatever is being spoken.
    pub fn speak(&mut self, text: &str) -> Option<Notice> {
        let Some(device) = self.device.as_mut() else {
            return Some(Notice::SpeechOutputUnsupported);
        };
        if self.speaking {
            device.cancel();
            self.speaking = false;
        }

        let token = self.tokens.next();
        self.current = Some(token);
        let utterance = Utterance {
            text: text.to_string(),
            voice: self.selected_voice.clone(),
            rate: DEFAULT_RATE,
            pitch: DEFAULT_PITCH,
            volume: DEFAULT_VOLUME,
        };

        match device.speak(token, &utterance) {
            Ok(()) => {
                self.speaking = true;
                None
            }
            Err(e) => {
                tracing::error!("Speech synthesis error: {}", e);
                self.current = None;
                Some(Notice::SpeechOutputFailed(e.0))
            }
        }
    }

    /// Cancels the current utterance, if any.
    pub fn stop(&mut self) {
        if !self.speaking {
            return;
        }
        if let Some(device) = self.device.as_mut() {
            device.cancel();
        }
        self.speaking = false;
        self.current = None;
    }

    pub fn handle_event(&mut self, event: SynthesisEvent) -> Option<Notice> {
        let (token, kind) = match event {
            SynthesisEvent::VoicesChanged => {
                self.refresh_voices();
                return None;
            }
            SynthesisEvent::Utterance { token, kind } => (token, kind),
        };
        if self.current != Some(token) {
            tracing::debug!("Discarding synthesis event for stale utterance {}", token);
            return None;
        }

        match kind {
            SynthesisEventKind::Started => {
                self.speaking = true;
                tracing::debug!("Started speaking question");
                None
            }
            SynthesisEventKind::Ended => {
                self.speaking = false;
                self.current = None;
                tracing::debug!("Finished speaking question");
                None
            }
            SynthesisEventKind::Error(reason) => {
                self.speaking = false;
                self.current = None;
                tracing::warn!("Speech synthesis error: {}", reason);
                Some(Notice::SpeechOutputFailed(reason))
            }
        }
    }
}
