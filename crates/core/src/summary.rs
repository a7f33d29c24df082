use crate::question::AnswerRecord;
use serde::Serialize;

/// End-of-session statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    /// Every record, skipped or not.
    pub total: usize,
    pub answered: usize,
    pub skipped: usize,
    pub average_score: f64,
}

impl SessionSummary {
    pub fn build(answers: &[AnswerRecord]) -> Self {
        let total = answers.len();
        let skipped = answers.iter().filter(|a| a.is_skipped()).count();
        let average_score = if total == 0 {
            0.0
        } else {
            answers.iter().map(AnswerRecord::total_score).sum::<f64>() / total as f64
        };

        Self {
            total,
            answered: total - skipped,
            skipped,
            average_score,
        }
    }

    pub fn average_percent(&self) -> String {
        crate::scoring::as_percent(self.average_score)
    }
}
