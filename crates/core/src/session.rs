use crate::{
    Command,
    error::SessionError,
    question::{AnswerRecord, Question, RetrievalFilters},
    retrieval::QuestionService,
    retry::RetryPolicy,
    scheduler::{Scheduler, Wakeup},
    scoring,
    speech::{
        Notice, RecognitionDevice, RecognitionEvent, RecognitionSettings, RecognitionState,
        SpeechInputController, SpeechOutputController, SpeechToken, SynthesisDevice,
        SynthesisEvent, SynthesisState, TokenSource, input::BUSY_RESTART_DELAY,
    },
    summary::SessionSummary,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Upper bound on questions per session.
pub const DEFAULT_MAX_QUESTIONS: usize = 10;
/// Pause between showing a question and reading it aloud.
pub const AUTO_SPEAK_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub max_questions: usize,
    pub auto_speak: bool,
    pub auto_speak_delay: Duration,
    pub busy_restart_delay: Duration,
    pub retry: RetryPolicy,
    pub recognition: RecognitionSettings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_questions: DEFAULT_MAX_QUESTIONS,
            auto_speak: false,
            auto_speak_delay: AUTO_SPEAK_DELAY,
            busy_restart_delay: BUSY_RESTART_DELAY,
            retry: RetryPolicy::default(),
            recognition: RecognitionSettings::default(),
        }
    }
}

impl SessionConfig {
    pub fn with_max_questions(mut self, max_questions: usize) -> Self {
        self.max_questions = max_questions.max(1);
        self
    }

    pub fn with_auto_speak(mut self, auto_speak: bool) -> Self {
        self.auto_speak = auto_speak;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Active,
    Complete,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub candidate_id: String,
    pub questions: Vec<Question>,
    pub current_index: usize,
    pub answers: Vec<AnswerRecord>,
    pub active: bool,
}

/// Position of the current question, for the progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionProgress {
    /// 1-based number of the current question.
    pub number: usize,
    pub total: usize,
    pub percent: u32,
}

/// Result of submitting or skipping a question.
///
/// A failed remote recording does not fail the submission: the record is
/// kept and the failure comes back as `warning`.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub record: AnswerRecord,
    pub warning: Option<SessionError>,
}

pub struct SessionBuilder {
    config: SessionConfig,
    service: Arc<dyn QuestionService>,
    scheduler: Arc<dyn Scheduler>,
    command_tx: UnboundedSender<Command>,
    recognition: Option<Box<dyn RecognitionDevice>>,
    synthesis: Option<Box<dyn SynthesisDevice>>,
}

impl SessionBuilder {
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_recognition(mut self, device: Box<dyn RecognitionDevice>) -> Self {
        self.recognition = Some(device);
        self
    }

    pub fn with_synthesis(mut self, device: Box<dyn SynthesisDevice>) -> Self {
        self.synthesis = Some(device);
        self
    }

    pub fn build(self) -> InterviewSession {
        let speech_in = SpeechInputController::new(self.recognition, self.scheduler.clone())
            .with_settings(self.config.recognition.clone())
            .with_retry_policy(self.config.retry)
            .with_busy_restart_delay(self.config.busy_restart_delay);
        let speech_out = SpeechOutputController::new(self.synthesis);

        InterviewSession {
            config: self.config,
            service: self.service,
            scheduler: self.scheduler,
            command_tx: self.command_tx,
            phase: SessionPhase::Idle,
            state: SessionState::default(),
            summary: None,
            question_tokens: TokenSource::default(),
            question_token: None,
            speech_in,
            speech_out,
        }
    }
}

/// One candidate's run through an ordered set of questions.
///
/// The session is driven from a single task: the UI calls the operations
/// below, and the runtime feeds device events and scheduled wakeups back in
/// through the `handle_*` methods. Notices for the candidate and the final
/// summary go out on the command channel.
pub struct InterviewSession {
    config: SessionConfig,
    service: Arc<dyn QuestionService>,
    scheduler: Arc<dyn Scheduler>,
    command_tx: UnboundedSender<Command>,
    phase: SessionPhase,
    state: SessionState,
    summary: Option<SessionSummary>,
    question_tokens: TokenSource,
    // Identifies the question on screen; auto-read wakeups carry it.
    question_token: Option<SpeechToken>,
    speech_in: SpeechInputController,
    speech_out: SpeechOutputController,
}

impl InterviewSession {
    pub fn builder(
        service: Arc<dyn QuestionService>,
        scheduler: Arc<dyn Scheduler>,
        command_tx: UnboundedSender<Command>,
    ) -> SessionBuilder {
        SessionBuilder {
            config: SessionConfig::default(),
            service,
            scheduler,
            command_tx,
            recognition: None,
            synthesis: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn summary(&self) -> Option<&SessionSummary> {
        self.summary.as_ref()
    }

    pub fn recognition(&self) -> RecognitionState {
        self.speech_in.state()
    }

    pub fn synthesis(&self) -> SynthesisState {
        self.speech_out.state()
    }

    /// Spoken answer text collected so far for the current question.
    pub fn answer_draft(&self) -> &str {
        self.speech_in.transcript()
    }

    pub fn interim_transcript(&self) -> &str {
        self.speech_in.interim()
    }

    pub fn current_question(&self) -> Option<&Question> {
        if self.phase == SessionPhase::Idle {
            return None;
        }
        self.state.questions.get(self.state.current_index)
    }

    pub fn progress(&self) -> Option<SessionProgress> {
        if self.phase != SessionPhase::Active {
            return None;
        }
        let total = self.state.questions.len();
        let number = self.state.current_index + 1;
        if total == 0 || number > total {
            return None;
        }
        let percent = ((number * 100) as f64 / total as f64).round() as u32;
        Some(SessionProgress {
            number,
            total,
            percent,
        })
    }

    /// Fetches questions for `candidate_id` and opens the first one.
    ///
    /// On failure nothing changes, so the caller can simply try again.
    pub async fn start(
        &mut self,
        candidate_id: &str,
        filters: RetrievalFilters,
    ) -> Result<&Question, SessionError> {
        let candidate_id = candidate_id.trim();
        if candidate_id.is_empty() {
            return Err(SessionError::MissingCandidateId);
        }

        let mut filters = filters;
        filters.max_questions = filters.max_questions.clamp(1, self.config.max_questions.max(1));

        tracing::info!(
            "Retrieving up to {} questions for candidate {}",
            filters.max_questions,
            candidate_id
        );
        let service = Arc::clone(&self.service);
        let mut questions = match service.retrieve_questions(candidate_id, &filters).await {
            Ok(questions) => questions,
            Err(e) => {
                tracing::error!("Question retrieval failed: {:?}", e);
                return Err(SessionError::retrieval(&e));
            }
        };
        if questions.is_empty() {
            tracing::warn!("No matching questions for candidate {}", candidate_id);
            return Err(SessionError::NoQuestionsFound);
        }
        questions.truncate(filters.max_questions);

        // Anything left over from a previous session must not leak into this one.
        self.halt_speech();
        self.state = SessionState {
            candidate_id: candidate_id.to_string(),
            questions,
            current_index: 0,
            answers: Vec::new(),
            active: true,
        };
        self.summary = None;
        self.phase = SessionPhase::Active;
        tracing::info!(
            "Interview started with {} questions",
            self.state.questions.len()
        );
        self.begin_question();

        self.current_question().ok_or(SessionError::NoQuestionsFound)
    }

    /// Scores `text` against the current question and records it.
    pub async fn submit_answer(&mut self, text: &str) -> Result<Submission, SessionError> {
        self.ensure_active()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyAnswer);
        }
        self.ensure_unanswered()?;

        self.speech_in.stop();
        self.speech_out.stop();

        let question = self.current_question().ok_or(SessionError::NotActive)?;
        let knowledge = scoring::knowledge_score(text, question);
        let speech = scoring::speech_score(text);
        let record = AnswerRecord::scored(&question.id, text, knowledge, speech);
        tracing::info!(
            "Answer to {} scored knowledge={:.2} speech={:.2} total={:.2}",
            record.question_id(),
            knowledge,
            speech,
            record.total_score()
        );

        Ok(self.store(record).await)
    }

    /// Records the current question as skipped, with zero scores.
    pub async fn skip(&mut self) -> Result<Submission, SessionError> {
        self.ensure_active()?;
        self.ensure_unanswered()?;

        self.speech_in.stop();
        self.speech_out.stop();

        let question = self.current_question().ok_or(SessionError::NotActive)?;
        let record = AnswerRecord::skipped(&question.id);
        tracing::info!("Question {} skipped", record.question_id());

        Ok(self.store(record).await)
    }

    /// Moves past an answered question. Returns the phase afterwards.
    pub fn advance(&mut self) -> Result<SessionPhase, SessionError> {
        self.ensure_active()?;
        if self.state.answers.len() <= self.state.current_index {
            return Err(SessionError::NotAnswered);
        }

        self.halt_speech();
        self.state.current_index += 1;

        if self.state.current_index >= self.state.questions.len() {
            self.complete();
        } else {
            self.begin_question();
        }
        Ok(self.phase)
    }

    /// Ends the session early, keeping the answers collected so far.
    pub fn terminate(&mut self) -> Result<SessionSummary, SessionError> {
        self.ensure_active()?;
        tracing::info!(
            "Interview ended early after {} of {} questions",
            self.state.answers.len(),
            self.state.questions.len()
        );
        self.halt_speech();
        Ok(self.complete())
    }

    /// Drops the session entirely and returns to `Idle`.
    pub fn reset(&mut self) {
        self.halt_speech();
        self.state = SessionState::default();
        self.summary = None;
        self.phase = SessionPhase::Idle;
        tracing::debug!("Interview session reset");
    }

    pub fn start_listening(&mut self) -> Result<(), SessionError> {
        self.ensure_active()?;
        let notice = self.speech_in.start();
        self.notify(notice);
        Ok(())
    }

    pub fn stop_listening(&mut self) {
        self.speech_in.stop();
    }

    pub fn toggle_listening(&mut self) -> Result<(), SessionError> {
        self.ensure_active()?;
        let notice = self.speech_in.toggle();
        self.notify(notice);
        Ok(())
    }

    pub fn speak_current_question(&mut self) -> Result<(), SessionError> {
        self.ensure_active()?;
        let text = match self.current_question() {
            Some(question) => question.text.clone(),
            None => return Err(SessionError::NotActive),
        };
        let notice = self.speech_out.speak(&text);
        self.notify(notice);
        Ok(())
    }

    pub fn stop_speaking(&mut self) {
        self.speech_out.stop();
    }

    pub fn handle_recognition_event(&mut self, event: RecognitionEvent) {
        let notice = self.speech_in.handle_event(event);
        self.notify(notice);
    }

    pub fn handle_synthesis_event(&mut self, event: SynthesisEvent) {
        let notice = self.speech_out.handle_event(event);
        self.notify(notice);
    }

    pub fn handle_wakeup(&mut self, wakeup: Wakeup) {
        match wakeup {
            Wakeup::SpeakQuestion(token) => {
                if self.phase != SessionPhase::Active || self.question_token != Some(token) {
                    tracing::debug!("Discarding read-aloud for a question no longer shown");
                    return;
                }
                if let Err(e) = self.speak_current_question() {
                    tracing::warn!("Could not read question aloud: {}", e);
                }
            }
            other => {
                let notice = self.speech_in.handle_wakeup(other);
                self.notify(notice);
            }
        }
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        if self.phase == SessionPhase::Active && self.state.active {
            Ok(())
        } else {
            Err(SessionError::NotActive)
        }
    }

    fn ensure_unanswered(&self) -> Result<(), SessionError> {
        if self.state.answers.len() > self.state.current_index {
            Err(SessionError::AlreadyAnswered)
        } else {
            Ok(())
        }
    }

    // Persists remotely first, then keeps the record locally whatever the outcome.
    async fn store(&mut self, record: AnswerRecord) -> Submission {
        let service = Arc::clone(&self.service);
        let warning = match service
            .record_answer(
                &self.state.candidate_id,
                record.question_id(),
                record.answer_text(),
                record.knowledge_score(),
                record.speech_score(),
            )
            .await
        {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(
                    "Failed to record answer for {}, keeping it locally: {:?}",
                    record.question_id(),
                    e
                );
                Some(SessionError::recording(&e))
            }
        };

        self.state.answers.push(record.clone());
        Submission { record, warning }
    }

    fn begin_question(&mut self) {
        let token = self.question_tokens.next();
        self.question_token = Some(token);
        if let Some(progress) = self.progress() {
            tracing::info!("Showing question {}/{}", progress.number, progress.total);
        }
        if self.config.auto_speak && self.speech_out.is_supported() {
            self.scheduler
                .schedule(self.config.auto_speak_delay, Wakeup::SpeakQuestion(token));
        }
    }

    // Stops both devices and invalidates every token tied to the current
    // question, so late callbacks cannot touch the next one.
    fn halt_speech(&mut self) {
        self.speech_in.reset_for_question();
        self.speech_out.stop();
        self.question_token = None;
    }

    fn complete(&mut self) -> SessionSummary {
        self.state.active = false;
        self.phase = SessionPhase::Complete;

        let summary = SessionSummary::build(&self.state.answers);
        tracing::info!(
            "Interview complete: {} attempted, {} skipped, average {}",
            summary.total,
            summary.skipped,
            summary.average_percent()
        );
        self.summary = Some(summary.clone());
        if self
            .command_tx
            .send(Command::SessionComplete(summary.clone()))
            .is_err()
        {
            tracing::warn!("Command receiver dropped, session summary not delivered");
        }
        summary
    }

    fn notify(&self, notice: Option<Notice>) {
        let Some(notice) = notice else {
            return;
        };
        tracing::info!("Notice: {}", notice);
        if self.command_tx.send(Command::Notify(notice)).is_err() {
            tracing::warn!("Command receiver dropped, notice not delivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::MockQuestionService;
    use crate::scheduler::ManualScheduler;
    use crate::speech::input::MockRecognitionDevice;
    use crate::speech::output::MockSynthesisDevice;
    use crate::speech::{RecognitionErrorKind, RecognitionEventKind, TranscriptSegment};
    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

    struct Harness {
        session: InterviewSession,
        commands: UnboundedReceiver<Command>,
        scheduler: Arc<ManualScheduler>,
    }

    fn question_set(n: usize) -> Vec<Question> {
        (1..=n)
            .map(|i| {
                Question::new(format!("q{i}"), format!("Question number {i}?"))
                    .with_category("Technical")
                    .with_difficulty("medium")
                    .with_topics(["react", "node"])
                    .with_similarity_score(0.8)
            })
            .collect()
    }

    fn serving(n: usize) -> MockQuestionService {
        let mut service = MockQuestionService::new();
        let questions = question_set(n);
        service
            .expect_retrieve_questions()
            .returning(move |_, _| Ok(questions.clone()));
        service
    }

    fn harness(service: MockQuestionService) -> Harness {
        harness_with(service, SessionConfig::default(), None, None)
    }

    fn harness_with(
        service: MockQuestionService,
        config: SessionConfig,
        recognition: Option<MockRecognitionDevice>,
        synthesis: Option<MockSynthesisDevice>,
    ) -> Harness {
        let scheduler = Arc::new(ManualScheduler::new());
        let (command_tx, commands) = unbounded_channel();
        let mut builder = InterviewSession::builder(Arc::new(service), scheduler.clone(), command_tx)
            .with_config(config);
        if let Some(device) = recognition {
            builder = builder.with_recognition(Box::new(device));
        }
        if let Some(device) = synthesis {
            builder = builder.with_synthesis(Box::new(device));
        }
        Harness {
            session: builder.build(),
            commands,
            scheduler,
        }
    }

    fn drain(commands: &mut UnboundedReceiver<Command>) -> Vec<Command> {
        let mut out = Vec::new();
        while let Ok(command) = commands.try_recv() {
            out.push(command);
        }
        out
    }

    #[tokio::test]
    async fn start_fetches_questions_and_activates() {
        // --- Arrange ---
        let mut service = MockQuestionService::new();
        service
            .expect_retrieve_questions()
            .withf(|candidate, filters| candidate == "C1" && filters.max_questions == 2)
            .times(1)
            .returning(|_, _| Ok(question_set(2)));
        let mut h = harness(service);

        // --- Act ---
        let first = h
            .session
            .start(" C1 ", RetrievalFilters::new(2))
            .await
            .expect("session should start");

        // --- Assert ---
        assert_eq!(first.id, "q1");
        assert_eq!(h.session.phase(), SessionPhase::Active);
        let state = h.session.state();
        assert_eq!(state.candidate_id, "C1");
        assert_eq!(state.questions.len(), 2);
        assert_eq!(state.current_index, 0);
        assert!(state.answers.is_empty());
        assert!(state.active);
        assert_eq!(
            h.session.progress(),
            Some(SessionProgress {
                number: 1,
                total: 2,
                percent: 50
            })
        );
    }

    #[tokio::test]
    async fn start_bounds_the_question_count() {
        let mut service = MockQuestionService::new();
        service
            .expect_retrieve_questions()
            .withf(|_, filters| filters.max_questions == DEFAULT_MAX_QUESTIONS)
            .returning(|_, _| Ok(question_set(12)));
        let mut h = harness(service);

        h.session
            .start("C1", RetrievalFilters::new(50))
            .await
            .unwrap();
        assert_eq!(h.session.state().questions.len(), DEFAULT_MAX_QUESTIONS);
    }

    #[tokio::test]
    async fn start_requires_a_candidate_id() {
        let mut service = MockQuestionService::new();
        service.expect_retrieve_questions().times(0);
        let mut h = harness(service);

        let err = h
            .session
            .start("   ", RetrievalFilters::default())
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::MissingCandidateId);
        assert_eq!(h.session.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn empty_retrieval_leaves_session_idle() {
        let mut service = MockQuestionService::new();
        service
            .expect_retrieve_questions()
            .returning(|_, _| Ok(Vec::new()));
        let mut h = harness(service);

        let err = h
            .session
            .start("C1", RetrievalFilters::default())
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::NoQuestionsFound);
        assert_eq!(h.session.phase(), SessionPhase::Idle);
        assert!(h.session.current_question().is_none());
    }

    #[tokio::test]
    async fn retrieval_failure_is_propagated() {
        let mut service = MockQuestionService::new();
        service
            .expect_retrieve_questions()
            .returning(|_, _| Err(anyhow::anyhow!("connection refused")));
        let mut h = harness(service);

        let err = h
            .session
            .start("C1", RetrievalFilters::default())
            .await
            .unwrap_err();
        match err {
            SessionError::Retrieval(message) => assert!(message.contains("connection refused")),
            other => panic!("expected a retrieval error, got {other:?}"),
        }
        assert_eq!(h.session.phase(), SessionPhase::Idle);
        assert!(!h.session.state().active);
    }

    #[tokio::test]
    async fn submitted_answer_is_scored_and_recorded() {
        let mut service = serving(2);
        service
            .expect_record_answer()
            .withf(|candidate, question, text, knowledge, _speech| {
                candidate == "C1"
                    && question == "q1"
                    && text == "I used React and Node for 6 months with tests."
                    && (knowledge - 0.7).abs() < 1e-9
            })
            .times(1)
            .returning(|_, _, _, _, _| Ok(()));
        let mut h = harness(service);
        h.session
            .start("C1", RetrievalFilters::new(2))
            .await
            .unwrap();

        let submission = h
            .session
            .submit_answer("I used React and Node for 6 months with tests.")
            .await
            .unwrap();

        let record = &submission.record;
        assert!(submission.warning.is_none());
        assert!((record.knowledge_score() - 0.7).abs() < 1e-9);
        let expected_total = 0.6 * record.knowledge_score() + 0.4 * record.speech_score();
        assert!((record.total_score() - expected_total).abs() < 1e-9);
        assert_eq!(h.session.state().answers.len(), 1);
        // Submitting does not move on by itself.
        assert_eq!(h.session.state().current_index, 0);
    }

    #[tokio::test]
    async fn blank_answers_are_rejected_without_side_effects() {
        let mut service = serving(1);
        service.expect_record_answer().times(0);
        let mut h = harness(service);
        h.session
            .start("C1", RetrievalFilters::default())
            .await
            .unwrap();

        let err = h.session.submit_answer("  \n ").await.unwrap_err();
        assert_eq!(err, SessionError::EmptyAnswer);
        assert!(h.session.state().answers.is_empty());
    }

    #[tokio::test]
    async fn recording_failure_keeps_the_answer() {
        let mut service = serving(1);
        service
            .expect_record_answer()
            .returning(|_, _, _, _, _| Err(anyhow::anyhow!("HTTP 500")));
        let mut h = harness(service);
        h.session
            .start("C1", RetrievalFilters::default())
            .await
            .unwrap();

        let submission = h.session.submit_answer("A short answer.").await.unwrap();
        assert!(matches!(submission.warning, Some(SessionError::Recording(_))));
        assert_eq!(h.session.state().answers.len(), 1);
        assert_eq!(h.session.advance(), Ok(SessionPhase::Complete));
    }

    #[tokio::test]
    async fn skip_appends_a_zero_record_even_if_recording_fails() {
        let mut service = serving(2);
        service
            .expect_record_answer()
            .withf(|_, _, text, knowledge, speech| {
                text == crate::question::SKIPPED_ANSWER && *knowledge == 0.0 && *speech == 0.0
            })
            .returning(|_, _, _, _, _| Err(anyhow::anyhow!("offline")));
        let mut h = harness(service);
        h.session
            .start("C1", RetrievalFilters::default())
            .await
            .unwrap();

        let submission = h.session.skip().await.unwrap();
        assert!(submission.warning.is_some());
        assert_eq!(h.session.state().answers.len(), 1);
        let record = &h.session.state().answers[0];
        assert!(record.is_skipped());
        assert_eq!(record.total_score(), 0.0);
    }

    #[tokio::test]
    async fn one_record_per_question() {
        let mut service = serving(2);
        service
            .expect_record_answer()
            .times(1)
            .returning(|_, _, _, _, _| Ok(()));
        let mut h = harness(service);
        h.session
            .start("C1", RetrievalFilters::default())
            .await
            .unwrap();

        assert_eq!(h.session.advance(), Err(SessionError::NotAnswered));
        h.session.submit_answer("First answer.").await.unwrap();
        assert_eq!(
            h.session.submit_answer("Second try.").await.unwrap_err(),
            SessionError::AlreadyAnswered
        );
        assert_eq!(h.session.skip().await.unwrap_err(), SessionError::AlreadyAnswered);
        assert_eq!(h.session.state().answers.len(), 1);
    }

    #[tokio::test]
    async fn answering_every_question_completes_the_session() {
        let mut service = serving(3);
        service
            .expect_record_answer()
            .times(3)
            .returning(|_, _, _, _, _| Ok(()));
        let mut h = harness(service);
        h.session
            .start("C1", RetrievalFilters::new(3))
            .await
            .unwrap();

        for i in 0..3 {
            assert_eq!(h.session.state().current_index, i);
            h.session
                .submit_answer("An answer. With structure. And three sentences.")
                .await
                .unwrap();
            let phase = h.session.advance().unwrap();
            let expected = if i < 2 {
                SessionPhase::Active
            } else {
                SessionPhase::Complete
            };
            assert_eq!(phase, expected);
        }

        let state = h.session.state();
        assert_eq!(state.answers.len(), state.questions.len());
        assert_eq!(state.current_index, 3);
        assert!(!state.active);
        assert!(h.session.current_question().is_none());
        let summary = h.session.summary().cloned().expect("summary is built");
        assert_eq!(summary.total, 3);
        assert_eq!(summary.skipped, 0);

        let commands = drain(&mut h.commands);
        let completions: Vec<_> = commands
            .iter()
            .filter_map(|c| match c {
                Command::SessionComplete(s) => Some(s.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(completions, vec![summary]);
        assert_eq!(h.session.advance(), Err(SessionError::NotActive));
    }

    #[tokio::test]
    async fn terminate_keeps_answers_so_far() {
        let mut service = serving(4);
        service
            .expect_record_answer()
            .returning(|_, _, _, _, _| Ok(()));
        let mut h = harness(service);
        h.session
            .start("C1", RetrievalFilters::new(4))
            .await
            .unwrap();
        h.session.submit_answer("Only one answer.").await.unwrap();
        h.session.advance().unwrap();
        h.session.skip().await.unwrap();

        let summary = h.session.terminate().unwrap();
        assert_eq!(h.session.phase(), SessionPhase::Complete);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(h.session.state().answers.len(), 2);
        assert!(!h.session.state().active);
        assert_eq!(
            h.session.submit_answer("late").await.unwrap_err(),
            SessionError::NotActive
        );
        assert_eq!(h.session.terminate().unwrap_err(), SessionError::NotActive);
    }

    #[tokio::test]
    async fn reset_after_completion_returns_to_idle() {
        let mut service = serving(1);
        service
            .expect_record_answer()
            .returning(|_, _, _, _, _| Ok(()));
        let mut h = harness(service);
        h.session
            .start("C1", RetrievalFilters::default())
            .await
            .unwrap();
        h.session.skip().await.unwrap();
        h.session.advance().unwrap();
        assert_eq!(h.session.phase(), SessionPhase::Complete);

        h.session.reset();

        assert_eq!(h.session.phase(), SessionPhase::Idle);
        let state = h.session.state();
        assert_eq!(state.current_index, 0);
        assert!(state.answers.is_empty());
        assert!(!state.active);
        assert!(h.session.summary().is_none());
    }

    #[tokio::test]
    async fn auto_speak_reads_only_the_question_on_screen() {
        let mut synthesis = MockSynthesisDevice::new();
        synthesis.expect_voices().returning(Vec::new);
        synthesis
            .expect_speak()
            .withf(|_, u| u.text == "Question number 2?")
            .times(1)
            .returning(|_, _| Ok(()));
        synthesis.expect_cancel().return_const(());
        let mut service = serving(2);
        service
            .expect_record_answer()
            .returning(|_, _, _, _, _| Ok(()));
        let config = SessionConfig::default().with_auto_speak(true);
        let mut h = harness_with(service, config, None, Some(synthesis));

        h.session
            .start("C1", RetrievalFilters::new(2))
            .await
            .unwrap();
        let stale = h.scheduler.drain();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].0, AUTO_SPEAK_DELAY);

        // The candidate moves on before the first read-aloud fires.
        h.session.skip().await.unwrap();
        h.session.advance().unwrap();
        let fresh = h.scheduler.drain();

        h.session.handle_wakeup(stale[0].1);
        assert!(!h.session.synthesis().speaking);
        h.session.handle_wakeup(fresh[0].1);
        assert!(h.session.synthesis().speaking);
    }

    #[tokio::test]
    async fn network_errors_surface_as_notices() {
        let mut recognition = MockRecognitionDevice::new();
        recognition.expect_start().times(3).returning(|_, _| Ok(()));
        recognition.expect_stop().return_const(());
        let mut h = harness_with(serving(1), SessionConfig::default(), Some(recognition), None);
        h.session
            .start("C1", RetrievalFilters::default())
            .await
            .unwrap();

        h.session.start_listening().unwrap();
        for _ in 0..3 {
            let token = h.session.speech_in.current_token().unwrap();
            h.session.handle_recognition_event(RecognitionEvent::new(
                token,
                RecognitionEventKind::Error(RecognitionErrorKind::Network),
            ));
            for (_, wakeup) in h.scheduler.drain() {
                h.session.handle_wakeup(wakeup);
            }
        }

        assert_eq!(h.session.recognition().network_error_count, 3);
        let notices: Vec<Notice> = drain(&mut h.commands)
            .into_iter()
            .filter_map(|c| match c {
                Command::Notify(n) => Some(n),
                _ => None,
            })
            .collect();
        assert_eq!(notices.len(), 3);
        assert!(notices[0].is_transient());
        assert!(notices[1].is_transient());
        assert_eq!(notices[2], Notice::NetworkFailed);
    }

    #[tokio::test]
    async fn late_transcripts_do_not_leak_into_the_next_question() {
        let mut recognition = MockRecognitionDevice::new();
        recognition.expect_start().returning(|_, _| Ok(()));
        recognition.expect_stop().return_const(());
        let mut service = serving(2);
        service
            .expect_record_answer()
            .returning(|_, _, _, _, _| Ok(()));
        let mut h = harness_with(service, SessionConfig::default(), Some(recognition), None);
        h.session
            .start("C1", RetrievalFilters::default())
            .await
            .unwrap();

        h.session.start_listening().unwrap();
        let token = h.session.speech_in.current_token().unwrap();
        h.session.handle_recognition_event(RecognitionEvent::new(
            token,
            RecognitionEventKind::Result(vec![TranscriptSegment::final_text("I would shard it")]),
        ));
        assert_eq!(h.session.answer_draft(), "I would shard it");

        let draft = h.session.answer_draft().to_string();
        h.session.submit_answer(&draft).await.unwrap();
        h.session.advance().unwrap();

        h.session.handle_recognition_event(RecognitionEvent::new(
            token,
            RecognitionEventKind::Result(vec![TranscriptSegment::final_text("by user id")]),
        ));
        assert_eq!(h.session.answer_draft(), "");
        assert!(!h.session.recognition().listening);
    }

    fn busy_devices() -> (MockRecognitionDevice, MockSynthesisDevice) {
        let mut recognition = MockRecognitionDevice::new();
        recognition.expect_start().times(1).returning(|_, _| Ok(()));
        recognition.expect_stop().times(1).return_const(());
        let mut synthesis = MockSynthesisDevice::new();
        synthesis.expect_voices().returning(Vec::new);
        synthesis.expect_speak().times(1).returning(|_, _| Ok(()));
        synthesis.expect_cancel().times(1).return_const(());
        (recognition, synthesis)
    }

    #[tokio::test]
    async fn terminate_stops_speech_and_drops_late_events() {
        let (recognition, synthesis) = busy_devices();
        let mut h = harness_with(
            serving(2),
            SessionConfig::default(),
            Some(recognition),
            Some(synthesis),
        );
        h.session
            .start("C1", RetrievalFilters::default())
            .await
            .unwrap();
        h.session.start_listening().unwrap();
        h.session.speak_current_question().unwrap();
        let listen = h.session.speech_in.current_token().unwrap();
        let utterance = h.session.speech_out.current_token().unwrap();
        h.session.handle_recognition_event(RecognitionEvent::new(
            listen,
            RecognitionEventKind::Result(vec![TranscriptSegment::final_text("half an answer")]),
        ));

        h.session.terminate().unwrap();
        assert!(!h.session.recognition().listening);
        assert!(!h.session.synthesis().speaking);
        assert_eq!(h.session.answer_draft(), "");

        h.session.handle_recognition_event(RecognitionEvent::new(
            listen,
            RecognitionEventKind::Result(vec![TranscriptSegment::final_text("the rest")]),
        ));
        h.session.handle_synthesis_event(SynthesisEvent::Utterance {
            token: utterance,
            kind: crate::speech::SynthesisEventKind::Started,
        });
        assert_eq!(h.session.answer_draft(), "");
        assert!(!h.session.synthesis().speaking);
    }

    #[tokio::test]
    async fn reset_stops_speech_and_drops_late_events() {
        let (recognition, synthesis) = busy_devices();
        let mut h = harness_with(
            serving(2),
            SessionConfig::default(),
            Some(recognition),
            Some(synthesis),
        );
        h.session
            .start("C1", RetrievalFilters::default())
            .await
            .unwrap();
        h.session.start_listening().unwrap();
        h.session.speak_current_question().unwrap();
        let listen = h.session.speech_in.current_token().unwrap();
        let utterance = h.session.speech_out.current_token().unwrap();

        h.session.reset();
        assert_eq!(h.session.phase(), SessionPhase::Idle);

        // None of these may reopen the microphone or mark output as speaking.
        h.session
            .handle_recognition_event(RecognitionEvent::new(listen, RecognitionEventKind::Started));
        h.session.handle_wakeup(Wakeup::RetryRecognition(listen));
        h.session.handle_synthesis_event(SynthesisEvent::Utterance {
            token: utterance,
            kind: crate::speech::SynthesisEventKind::Started,
        });
        assert!(!h.session.recognition().listening);
        assert!(!h.session.synthesis().speaking);
        assert!(drain(&mut h.commands).is_empty());
    }

    #[tokio::test]
    async fn speech_controls_need_an_active_session() {
        let mut h = harness(MockQuestionService::new());
        assert_eq!(h.session.start_listening(), Err(SessionError::NotActive));
        assert_eq!(h.session.speak_current_question(), Err(SessionError::NotActive));
    }
}
