//! Heuristic answer scoring.
//!
//! Both scores are plain functions of the answer text (and the question's
//! topics for the knowledge score). They never fail, so callers can score
//! anything, including an empty string.

use crate::question::Question;

pub const KNOWLEDGE_WEIGHT: f64 = 0.6;
pub const SPEECH_WEIGHT: f64 = 0.4;

const KNOWLEDGE_BASE: f64 = 0.5;
const LONG_ANSWER_WORDS: usize = 50;
const LONG_ANSWER_BONUS: f64 = 0.2;
const MEDIUM_ANSWER_WORDS: usize = 30;
const MEDIUM_ANSWER_BONUS: f64 = 0.1;
const TOPIC_BONUS: f64 = 0.1;
const TOPIC_BONUS_CAP: f64 = 0.3;

const SPEECH_BASE: f64 = 0.6;
const FILLER_WORDS: [&str; 5] = ["umm", "uh", "like", "you know", "basically"];
const NO_FILLER_BONUS: f64 = 0.2;
const FEW_FILLER_BONUS: f64 = 0.1;
const FEW_FILLER_LIMIT: usize = 2;
const MIN_SENTENCES: usize = 3;
const STRUCTURE_BONUS: f64 = 0.2;

/// Scores how much subject knowledge the answer shows for `question`.
pub fn knowledge_score(answer: &str, question: &Question) -> f64 {
    let mut score = KNOWLEDGE_BASE;

    let words = word_count(answer);
    if words >= LONG_ANSWER_WORDS {
        score += LONG_ANSWER_BONUS;
    } else if words >= MEDIUM_ANSWER_WORDS {
        score += MEDIUM_ANSWER_BONUS;
    }

    let matches = matched_topics(answer, &question.topics);
    score += (matches as f64 * TOPIC_BONUS).min(TOPIC_BONUS_CAP);

    score.clamp(0.0, 1.0)
}

/// Scores the delivery of the answer: few fillers and some sentence structure.
pub fn speech_score(answer: &str) -> f64 {
    let mut score = SPEECH_BASE;

    match filler_count(answer) {
        0 => score += NO_FILLER_BONUS,
        n if n <= FEW_FILLER_LIMIT => score += FEW_FILLER_BONUS,
        _ => {}
    }

    if sentence_count(answer) >= MIN_SENTENCES {
        score += STRUCTURE_BONUS;
    }

    score.clamp(0.0, 1.0)
}

/// Weighted combination of the two scores.
pub fn total_score(knowledge: f64, speech: f64) -> f64 {
    knowledge * KNOWLEDGE_WEIGHT + speech * SPEECH_WEIGHT
}

pub fn word_count(answer: &str) -> usize {
    answer.split_whitespace().count()
}

/// Number of distinct topics that occur anywhere in the answer, ignoring case.
///
/// Topics are matched as raw substrings: surrounding spaces are part of the
/// topic, and an empty topic matches every answer.
pub fn matched_topics(answer: &str, topics: &[String]) -> usize {
    let answer = answer.to_lowercase();
    let mut seen: Vec<String> = Vec::new();
    for topic in topics {
        let topic = topic.to_lowercase();
        if seen.contains(&topic) {
            continue;
        }
        if answer.contains(&topic) {
            seen.push(topic);
        }
    }
    seen.len()
}

// Plain substring counts per filler, so "umm" inside "summary" counts too,
// and one stretch of text may count for more than one filler.
pub fn filler_count(answer: &str) -> usize {
    let answer = answer.to_lowercase();
    FILLER_WORDS
        .iter()
        .map(|filler| answer.matches(filler).count())
        .sum()
}

pub fn sentence_count(answer: &str) -> usize {
    answer
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count()
}

/// Coarse rating used when showing feedback for a single answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBand {
    Strong,
    Fair,
    Weak,
}

impl ScoreBand {
    pub fn of(total: f64) -> Self {
        if total >= 0.8 {
            ScoreBand::Strong
        } else if total >= 0.6 {
            ScoreBand::Fair
        } else {
            ScoreBand::Weak
        }
    }
}

/// Renders a score in [0,1] as a whole percentage, e.g. `0.82` -> `"82%"`.
pub fn as_percent(score: f64) -> String {
    // Halves round up, so 0.625 shows as 63%.
    format!("{:.0}%", (score * 100.0).round())
}
