use serde::{Deserialize, Serialize};

/// Answer text stored for a question the candidate chose to skip.
pub const SKIPPED_ANSWER: &str = "[Skipped]";

/// A single interview question as handed out by the retrieval service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub category: String,
    pub difficulty: String,
    pub topics: Vec<String>,
    pub similarity_score: f64,
}

impl Question {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            category: String::new(),
            difficulty: String::new(),
            topics: Vec::new(),
            similarity_score: 0.0,
        }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    pub fn with_difficulty(mut self, difficulty: &str) -> Self {
        self.difficulty = difficulty.to_string();
        self
    }

    pub fn with_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_similarity_score(mut self, score: f64) -> Self {
        self.similarity_score = score.clamp(0.0, 1.0);
        self
    }
}

/// The scored answer to one question. Built once and never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    question_id: String,
    answer_text: String,
    knowledge_score: f64,
    speech_score: f64,
    total_score: f64,
}

impl AnswerRecord {
    pub fn scored(question_id: &str, answer_text: &str, knowledge: f64, speech: f64) -> Self {
        Self {
            question_id: question_id.to_string(),
            answer_text: answer_text.to_string(),
            knowledge_score: knowledge,
            speech_score: speech,
            total_score: crate::scoring::total_score(knowledge, speech),
        }
    }

    pub fn skipped(question_id: &str) -> Self {
        Self {
            question_id: question_id.to_string(),
            answer_text: SKIPPED_ANSWER.to_string(),
            knowledge_score: 0.0,
            speech_score: 0.0,
            total_score: 0.0,
        }
    }

    pub fn question_id(&self) -> &str {
        &self.question_id
    }

    pub fn answer_text(&self) -> &str {
        &self.answer_text
    }

    pub fn knowledge_score(&self) -> f64 {
        self.knowledge_score
    }

    pub fn speech_score(&self) -> f64 {
        self.speech_score
    }

    pub fn total_score(&self) -> f64 {
        self.total_score
    }

    pub fn is_skipped(&self) -> bool {
        self.answer_text == SKIPPED_ANSWER
    }
}

/// Filters passed to the retrieval service when a session starts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalFilters {
    pub max_questions: usize,
    pub difficulty: Option<String>,
    pub category: Option<String>,
}

impl Default for RetrievalFilters {
    fn default() -> Self {
        Self {
            max_questions: crate::session::DEFAULT_MAX_QUESTIONS,
            difficulty: None,
            category: None,
        }
    }
}

impl RetrievalFilters {
    pub fn new(max_questions: usize) -> Self {
        Self {
            max_questions,
            ..Default::default()
        }
    }

    // Blank values mean "no filter", same as an unselected drop-down.
    pub fn with_difficulty(mut self, difficulty: &str) -> Self {
        self.difficulty = non_blank(difficulty);
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = non_blank(category);
        self
    }
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
