pub mod error;
pub mod question;
pub mod retrieval;
pub mod retry;
pub mod scheduler;
pub mod scoring;
pub mod session;
pub mod speech;
pub mod summary;

pub use error::SessionError;
pub use question::{AnswerRecord, Question, RetrievalFilters};
pub use retrieval::QuestionService;
pub use session::{InterviewSession, SessionConfig, SessionPhase, SessionState, Submission};
pub use summary::SessionSummary;

use speech::Notice;

/// Represents commands that the core logic (`InterviewSession`) issues to the runtime.
///
/// This enum decouples the session's decisions from how the runtime presents
/// them (a terminal, a web page, a test harness).
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Show a speech-related message to the candidate.
    Notify(Notice),
    /// The session has ended, with its final statistics.
    SessionComplete(SessionSummary),
}
