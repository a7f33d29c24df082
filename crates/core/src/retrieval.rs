use crate::question::{Question, RetrievalFilters};
use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

/// The backend the session talks to for questions and for storing answers.
///
/// Profile storage, the question bank and analytics live behind this trait.
/// The session only needs these two calls, so a test can swap in a mock and
/// the terminal runtime can plug in the HTTP client.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait QuestionService: Send + Sync {
    /// Fetches up to `filters.max_questions` questions picked for the candidate.
    async fn retrieve_questions(
        &self,
        candidate_id: &str,
        filters: &RetrievalFilters,
    ) -> Result<Vec<Question>>;

    /// Stores the scores of one answer against the candidate's profile.
    async fn record_answer(
        &self,
        candidate_id: &str,
        question_id: &str,
        answer_text: &str,
        knowledge_score: f64,
        speech_score: f64,
    ) -> Result<()>;
}
