use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use interview_core::question::{Question, RetrievalFilters};
use interview_core::retrieval::QuestionService;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
struct RetrieveResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    questions: Vec<WireQuestion>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireQuestion {
    question_id: String,
    question_text: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    difficulty: String,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    similarity_score: f64,
}

impl From<WireQuestion> for Question {
    fn from(q: WireQuestion) -> Self {
        Question::new(q.question_id, q.question_text)
            .with_category(&q.category)
            .with_difficulty(&q.difficulty)
            .with_topics(q.topics)
            .with_similarity_score(q.similarity_score)
    }
}

#[derive(Debug, Serialize)]
struct RecordRequest<'a> {
    candidate_id: &'a str,
    question_id: &'a str,
    answer_text: &'a str,
    knowledge_score: f64,
    speech_score: f64,
}

#[derive(Debug, Deserialize)]
struct RecordResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Talks to the question backend over its JSON API.
pub struct HttpQuestionService {
    client: Client,
    base_url: Url,
}

impl HttpQuestionService {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid question service URL: {base_url}"))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("Question service URL cannot be a base: {base_url}"));
        }
        Ok(Self {
            client: Client::new(),
            base_url,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Question service URL cannot be a base: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn retrieve_url(&self, candidate_id: &str, filters: &RetrievalFilters) -> Result<Url> {
        let mut url = self.endpoint(&["retrieve-questions", candidate_id])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("max_questions", &filters.max_questions.to_string());
            if let Some(difficulty) = &filters.difficulty {
                query.append_pair("difficulty", difficulty);
            }
            if let Some(category) = &filters.category {
                query.append_pair("category", category);
            }
        }
        Ok(url)
    }
}

fn parse_questions(ok: bool, body: &str) -> Result<Vec<Question>> {
    let resp: RetrieveResponse =
        serde_json::from_str(body).context("Malformed retrieve-questions response")?;
    if let Some(error) = resp.error {
        return Err(anyhow!(error));
    }
    if !ok || !resp.success {
        return Err(anyhow!("Question service reported failure"));
    }
    Ok(resp.questions.into_iter().map(Question::from).collect())
}

fn parse_record(ok: bool, body: &str) -> Result<()> {
    let resp: RecordResponse =
        serde_json::from_str(body).context("Malformed record-response response")?;
    if let Some(error) = resp.error {
        return Err(anyhow!(error));
    }
    if !ok || !resp.success {
        return Err(anyhow!("Question service did not store the answer"));
    }
    Ok(())
}

#[async_trait]
impl QuestionService for HttpQuestionService {
    async fn retrieve_questions(
        &self,
        candidate_id: &str,
        filters: &RetrievalFilters,
    ) -> Result<Vec<Question>> {
        let url = self.retrieve_url(candidate_id, filters)?;
        tracing::debug!("GET {}", url);

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to reach question service")?;
        let status = resp.status();
        let body = resp.text().await?;
        parse_questions(status.is_success(), &body)
            .with_context(|| format!("Retrieving questions failed with status {status}"))
    }

    async fn record_answer(
        &self,
        candidate_id: &str,
        question_id: &str,
        answer_text: &str,
        knowledge_score: f64,
        speech_score: f64,
    ) -> Result<()> {
        let url = self.endpoint(&["record-response"])?;
        let body = RecordRequest {
            candidate_id,
            question_id,
            answer_text,
            knowledge_score,
            speech_score,
        };
        tracing::debug!("POST {} for question {}", url, question_id);

        let resp = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .context("Failed to reach question service")?;
        let status = resp.status();
        let text = resp.text().await?;
        parse_record(status.is_success(), &text)
            .with_context(|| format!("Recording answer failed with status {status}"))
    }
}
