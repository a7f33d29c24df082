//! Terminal front end: line parsing, rendering, and console speech devices.
//! Output "speaks" by printing; input takes dictation from typed lines while
//! recording.

use interview_core::question::Question;
use interview_core::scoring::{ScoreBand, as_percent};
use interview_core::session::{SessionProgress, Submission};
use interview_core::speech::output::SynthesisError;
use interview_core::speech::{
    RecognitionDevice, RecognitionEvent, RecognitionEventKind, RecognitionSettings, SpeechToken,
    StartError, SynthesisDevice, SynthesisEvent, SynthesisEventKind, TranscriptSegment, Utterance,
    Voice,
};
use interview_core::summary::SessionSummary;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::UnboundedSender;

/// One line typed by the candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Answer(String),
    Skip,
    Next,
    End,
    Speak,
    Stop,
    Record,
    Submit,
    Reset,
    Quit,
    Unknown(String),
    Empty,
}

impl ConsoleInput {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ConsoleInput::Empty;
        }
        if !line.starts_with('/') {
            return ConsoleInput::Answer(line.to_string());
        }
        match line.to_lowercase().as_str() {
            "/skip" => ConsoleInput::Skip,
            "/next" => ConsoleInput::Next,
            "/end" => ConsoleInput::End,
            "/speak" => ConsoleInput::Speak,
            "/stop" => ConsoleInput::Stop,
            "/record" => ConsoleInput::Record,
            "/submit" => ConsoleInput::Submit,
            "/reset" => ConsoleInput::Reset,
            "/quit" | "/exit" => ConsoleInput::Quit,
            _ => ConsoleInput::Unknown(line.to_string()),
        }
    }
}

pub const HELP: &str = "Type your answer and press Enter, or /record to dictate it and /submit to send the draft. Commands: /skip /next /end /speak /stop /record /submit /reset /quit";

pub fn render_question(question: &Question, progress: Option<SessionProgress>) -> String {
    let mut out = String::new();
    if let Some(p) = progress {
        out.push_str(&format!("\nQuestion {} of {} ({}%)\n", p.number, p.total, p.percent));
    }
    let mut tags = Vec::new();
    if !question.category.is_empty() {
        tags.push(question.category.as_str());
    }
    if !question.difficulty.is_empty() {
        tags.push(question.difficulty.as_str());
    }
    if !tags.is_empty() {
        out.push_str(&format!("[{}] ", tags.join(" / ")));
    }
    out.push_str(&question.text);
    if !question.topics.is_empty() {
        out.push_str(&format!("\nTopics: {}", question.topics.join(", ")));
    }
    out
}

pub fn render_feedback(submission: &Submission) -> String {
    let record = &submission.record;
    let mut out = if record.is_skipped() {
        "Question skipped.".to_string()
    } else {
        let band = match ScoreBand::of(record.total_score()) {
            ScoreBand::Strong => "Strong answer",
            ScoreBand::Fair => "Decent answer",
            ScoreBand::Weak => "Needs work",
        };
        format!(
            "{band}: knowledge {}, delivery {}, overall {}",
            as_percent(record.knowledge_score()),
            as_percent(record.speech_score()),
            as_percent(record.total_score())
        )
    };
    if let Some(warning) = &submission.warning {
        out.push_str(&format!("\n(note: {warning}; the answer is kept for this session)"));
    }
    out.push_str("\nType /next to continue.");
    out
}

pub fn render_summary(summary: &SessionSummary) -> String {
    format!(
        "\nInterview complete.\n  Questions attempted: {}\n  Answered: {}\n  Skipped: {}\n  Average score: {}",
        summary.total,
        summary.answered,
        summary.skipped,
        summary.average_percent()
    )
}

/// Prints utterances instead of playing them, and reports start and end
/// immediately.
pub struct ConsoleSynthesis {
    events: UnboundedSender<SynthesisEvent>,
}

impl ConsoleSynthesis {
    pub fn new(events: UnboundedSender<SynthesisEvent>) -> Self {
        Self { events }
    }

    fn emit(&self, token: SpeechToken, kind: SynthesisEventKind) {
        if self
            .events
            .send(SynthesisEvent::Utterance { token, kind })
            .is_err()
        {
            tracing::debug!("Synthesis event receiver dropped");
        }
    }
}

impl SynthesisDevice for ConsoleSynthesis {
    fn voices(&self) -> Vec<Voice> {
        vec![Voice::new("Console", "en-US")]
    }

    fn speak(&mut self, token: SpeechToken, utterance: &Utterance) -> Result<(), SynthesisError> {
        self.emit(token, SynthesisEventKind::Started);
        println!("(reading aloud) {}", utterance.text);
        self.emit(token, SynthesisEventKind::Ended);
        Ok(())
    }

    fn cancel(&mut self) {
        tracing::debug!("Console synthesis cancelled");
    }
}

#[derive(Debug, Clone, Copy)]
struct DictationRun {
    token: SpeechToken,
    continuous: bool,
}

#[derive(Default)]
struct DictationSlot(Mutex<Option<DictationRun>>);

impl DictationSlot {
    fn lock(&self) -> MutexGuard<'_, Option<DictationRun>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn emit_recognition(
    events: &UnboundedSender<RecognitionEvent>,
    token: SpeechToken,
    kind: RecognitionEventKind,
) {
    if events.send(RecognitionEvent::new(token, kind)).is_err() {
        tracing::debug!("Recognition event receiver dropped");
    }
}

/// A recognizer for terminals without a microphone: while a run is open,
/// typed lines are heard as speech.
pub struct ConsoleRecognition {
    events: UnboundedSender<RecognitionEvent>,
    run: Arc<DictationSlot>,
}

/// The line reader's side of [`ConsoleRecognition`].
#[derive(Clone)]
pub struct Dictation {
    events: UnboundedSender<RecognitionEvent>,
    run: Arc<DictationSlot>,
}

pub fn console_dictation(events: UnboundedSender<RecognitionEvent>) -> (ConsoleRecognition, Dictation) {
    let run = Arc::new(DictationSlot::default());
    (
        ConsoleRecognition {
            events: events.clone(),
            run: run.clone(),
        },
        Dictation { events, run },
    )
}

impl RecognitionDevice for ConsoleRecognition {
    fn start(&mut self, token: SpeechToken, settings: &RecognitionSettings) -> Result<(), StartError> {
        let mut run = self.run.lock();
        if run.is_some() {
            return Err(StartError::AlreadyActive);
        }
        *run = Some(DictationRun {
            token,
            continuous: settings.continuous,
        });
        drop(run);

        println!("(recording) Type what you would say. /record stops, /submit sends the draft.");
        emit_recognition(&self.events, token, RecognitionEventKind::Started);
        Ok(())
    }

    fn stop(&mut self) {
        let run = self.run.lock().take();
        if let Some(run) = run {
            emit_recognition(&self.events, run.token, RecognitionEventKind::Ended);
        }
    }
}

impl Dictation {
    pub fn is_listening(&self) -> bool {
        self.run.lock().is_some()
    }

    /// Hears `text` if a run is open. Returns `false` when nothing is
    /// recording, so the caller can treat the line as a typed answer.
    pub fn dictate(&self, text: &str) -> bool {
        let mut slot = self.run.lock();
        let Some(run) = *slot else {
            return false;
        };
        // A recognizer reports its hypothesis before settling on the phrase.
        emit_recognition(
            &self.events,
            run.token,
            RecognitionEventKind::Result(vec![TranscriptSegment::interim(text)]),
        );
        emit_recognition(
            &self.events,
            run.token,
            RecognitionEventKind::Result(vec![TranscriptSegment::final_text(text)]),
        );
        if !run.continuous {
            *slot = None;
            emit_recognition(&self.events, run.token, RecognitionEventKind::Ended);
        }
        true
    }
}
