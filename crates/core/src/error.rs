/// Errors returned by the session controller.
///
/// None of these are fatal: each leaves the session in a well-defined phase
/// so the caller can retry or fall back to typing the answer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("a candidate id is required to start an interview")]
    MissingCandidateId,
    #[error("failed to retrieve questions: {0}")]
    Retrieval(String),
    #[error("no matching questions found, try different settings")]
    NoQuestionsFound,
    #[error("please provide an answer")]
    EmptyAnswer,
    #[error("no interview is in progress")]
    NotActive,
    #[error("the current question has already been answered")]
    AlreadyAnswered,
    #[error("the current question has not been answered or skipped yet")]
    NotAnswered,
    #[error("failed to record answer: {0}")]
    Recording(String),
}

impl SessionError {
    /// Flattens a collaborator error chain into a single message.
    pub(crate) fn retrieval(err: &anyhow::Error) -> Self {
        SessionError::Retrieval(format!("{err:#}"))
    }

    pub(crate) fn recording(err: &anyhow::Error) -> Self {
        SessionError::Recording(format!("{err:#}"))
    }
}
