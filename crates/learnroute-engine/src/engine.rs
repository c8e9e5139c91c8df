//! The routing cycle: dispatch by intent, fold signals, escalate, merge, record.

use std::sync::Arc;

use chrono::Utc;
use futures::future::OptionFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use learnroute_agents::AgentGateway;
use learnroute_core::agent::{AgentCallError, AgentCallResult};
use learnroute_core::recorder::{CycleOutcome, InteractionRecord, InteractionRecorder};
use learnroute_core::schemas::{
    AgentRequest, AgentResponse, DoubtResolution, DoubtResolverRequest, FlashcardRecommendations,
    FlashcardRequest, HesitationReport, HesitationRequest, HintStrategyRequest, HintSuggestion,
    MistakePatternReport, MistakePatternRequest, ProgressReport, ProgressTrackerRequest,
    StuckScoreReport, StuckScoreRequest, VideoAssistance, VideoIntelligenceRequest,
};
use learnroute_core::types::{Difficulty, InteractionEvent, InteractionIntent, ResponseEnvelope};

use crate::cycle::{Cycle, millis};
use crate::escalation::{self, Escalation};
use crate::merge::{MergeMeta, PrimaryOutput, merge};
use crate::progress;
use crate::signals::SignalSet;
use crate::{EngineSettings, RouteError};

/// Per-call routing options.
#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    /// Cancelling stops in-flight agent calls; the partial cycle is still recorded.
    pub cancel: CancellationToken,
    /// Attach recorder-derived history to progress responses.
    pub include_history: bool,
}

pub struct DecisionEngine {
    gateway: Arc<dyn AgentGateway>,
    recorder: Arc<dyn InteractionRecorder>,
    settings: EngineSettings,
}

impl DecisionEngine {
    pub fn new(
        gateway: Arc<dyn AgentGateway>,
        recorder: Arc<dyn InteractionRecorder>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            gateway,
            recorder,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn recorder(&self) -> &Arc<dyn InteractionRecorder> {
        &self.recorder
    }

    pub async fn route(&self, event: InteractionEvent) -> Result<ResponseEnvelope, RouteError> {
        self.route_with(event, RouteOptions::default()).await
    }

    /// Run one full cycle for `event`. Exactly one envelope or one error comes
    /// back, and exactly one record is handed to the recorder for any event
    /// that passed validation.
    pub async fn route_with(
        &self,
        event: InteractionEvent,
        options: RouteOptions,
    ) -> Result<ResponseEnvelope, RouteError> {
        event.validate().map_err(RouteError::MalformedEvent)?;

        let cycle = Cycle::new(self.settings.cycle_deadline);
        info!(
            cycle_id = %cycle.id,
            intent = %event.intent,
            user_id = %event.user_id,
            "Routing cycle started"
        );

        let result = tokio::select! {
            biased;
            _ = options.cancel.cancelled() => Err(RouteError::Cancelled),
            result = self.dispatch(&event, &cycle, options.include_history) => result,
        };

        let outcome = match &result {
            Ok(envelope) => {
                info!(
                    cycle_id = %cycle.id,
                    mode = ?envelope.mode,
                    agent = %envelope.analytics.agent,
                    response_time_ms = envelope.analytics.response_time,
                    "Routing cycle merged"
                );
                CycleOutcome::Completed {
                    envelope: envelope.clone(),
                }
            }
            Err(RouteError::Cancelled) => {
                warn!(cycle_id = %cycle.id, "Routing cycle cancelled");
                CycleOutcome::Cancelled
            }
            Err(e) => {
                warn!(cycle_id = %cycle.id, reason = e.reason_code(), error = %e, "Routing cycle failed");
                CycleOutcome::Failed {
                    code: e.reason_code(),
                    message: e.to_string(),
                }
            }
        };
        metrics::counter!(
            "routing_cycles_total",
            "intent" => event.intent.as_str(),
            "outcome" => outcome.label()
        )
        .increment(1);

        let record = InteractionRecord {
            cycle_id: cycle.id.clone(),
            recorded_at: Utc::now(),
            event,
            calls: cycle.calls.finish(),
            outcome,
        };
        if let Err(e) = self.recorder.record(&record).await {
            warn!(cycle_id = %record.cycle_id, error = %e, "Failed to record interaction");
            metrics::counter!("recorder_failures_total").increment(1);
        }

        result
    }

    async fn dispatch(
        &self,
        event: &InteractionEvent,
        cycle: &Cycle,
        include_history: bool,
    ) -> Result<ResponseEnvelope, RouteError> {
        match event.intent {
            InteractionIntent::DirectSolution => self.direct_solution(event, cycle).await,
            InteractionIntent::Guided => self.guided(event, cycle).await,
            InteractionIntent::Video => self.video(event, cycle).await,
            InteractionIntent::ProgressQuery => {
                self.progress_query(event, cycle, include_history).await
            }
        }
    }

    async fn direct_solution(
        &self,
        event: &InteractionEvent,
        cycle: &Cycle,
    ) -> Result<ResponseEnvelope, RouteError> {
        let request = DoubtResolverRequest {
            user_id: event.user_id.clone(),
            question_id: event.question_id.clone(),
            student_answer: event.student_answer.clone(),
            topic: event.topic.clone(),
            difficulty: difficulty(event)?,
        };
        let solution: DoubtResolution = self.required(cycle, &request).await?;

        Ok(merge(
            PrimaryOutput::Solution(solution),
            &SignalSet::default(),
            None,
            self.meta(cycle),
        ))
    }

    async fn guided(
        &self,
        event: &InteractionEvent,
        cycle: &Cycle,
    ) -> Result<ResponseEnvelope, RouteError> {
        let inbound = event
            .clamped_hint_level()
            .map(|level| level.min(self.settings.max_hint_level));

        let hint_request = HintStrategyRequest {
            user_id: event.user_id.clone(),
            question_id: event.question_id.clone(),
            current_hint_level: inbound.unwrap_or(1),
            student_answer: event.student_answer.clone(),
            topic: event.topic.clone(),
            difficulty: difficulty(event)?,
        };
        let hint: HintSuggestion = self.required(cycle, &hint_request).await?;

        let mut signals = SignalSet::default();
        signals.apply_hint(&hint, inbound);

        let hesitation_request = HesitationRequest {
            user_id: event.user_id.clone(),
            question_id: event.question_id.clone(),
            step_number: event.step_number,
            student_answer: event.student_answer.clone(),
            time_taken: event.time_taken,
        };
        let stuck_request = StuckScoreRequest {
            user_id: event.user_id.clone(),
            question_id: event.question_id.clone(),
            step_number: event.step_number,
            student_answer: event.student_answer.clone(),
            hint_level: signals.hint_level.unwrap_or(hint.hint_level),
            hesitation_score: None,
        };
        let mistake_request = event.answer_differs().then(|| MistakePatternRequest {
            user_id: event.user_id.clone(),
            question_id: event.question_id.clone(),
            student_answer: event.student_answer.clone(),
            correct_answer: event.correct_answer.clone().unwrap_or_default(),
            topic: event.topic.clone(),
            mistake_history: event.mistake_history.clone(),
        });

        // Join barrier: every signal is in before the escalation decision.
        let deadline = cycle.optional_deadline();
        let (hesitation, stuck, mistake) = tokio::join!(
            self.optional::<_, HesitationReport>(cycle, deadline, &hesitation_request),
            self.optional::<_, StuckScoreReport>(cycle, deadline, &stuck_request),
            OptionFuture::from(mistake_request.as_ref().map(|request| {
                self.optional::<_, MistakePatternReport>(cycle, deadline, request)
            })),
        );

        if let Some(report) = &hesitation {
            signals.apply_hesitation(report);
        }
        if let Some(report) = &stuck {
            signals.apply_stuck(report);
        }
        if let Some(report) = mistake.flatten() {
            signals.apply_mistake(&report);
        }
        debug!(cycle_id = %cycle.id, ?signals, "Signals folded");

        let escalation = match escalation::check(&signals, &self.settings.thresholds()) {
            Some(reason) => {
                info!(cycle_id = %cycle.id, reason = %reason, "Escalating to video agent");
                metrics::counter!("escalations_total", "reason" => reason.as_str()).increment(1);
                let request = VideoIntelligenceRequest {
                    user_id: event.user_id.clone(),
                    question_id: event.question_id.clone(),
                    topic: event.topic.clone(),
                    trigger_reason: reason.as_str().to_string(),
                    context: escalation::context(&signals, event),
                };
                // The escalation call gets a fresh budget of its own.
                let video = self
                    .optional::<_, VideoAssistance>(cycle, cycle.optional_deadline(), &request)
                    .await;
                Some(Escalation { reason, video })
            }
            None => None,
        };

        Ok(merge(
            PrimaryOutput::Hint(hint),
            &signals,
            escalation.as_ref(),
            self.meta(cycle),
        ))
    }

    async fn video(
        &self,
        event: &InteractionEvent,
        cycle: &Cycle,
    ) -> Result<ResponseEnvelope, RouteError> {
        let request = VideoIntelligenceRequest {
            user_id: event.user_id.clone(),
            question_id: event.question_id.clone(),
            topic: event.topic.clone(),
            trigger_reason: "user_requested".to_string(),
            context: escalation::user_request_context(event, Utc::now()),
        };
        let video: VideoAssistance = self.required(cycle, &request).await?;

        Ok(merge(
            PrimaryOutput::Video(video),
            &SignalSet::default(),
            None,
            self.meta(cycle),
        ))
    }

    async fn progress_query(
        &self,
        event: &InteractionEvent,
        cycle: &Cycle,
        include_history: bool,
    ) -> Result<ResponseEnvelope, RouteError> {
        let days = event
            .time_range_days
            .unwrap_or(self.settings.default_time_range_days);
        let topic = event.topic_filter().map(str::to_string);

        let request = ProgressTrackerRequest {
            user_id: event.user_id.clone(),
            topic: topic.clone(),
            time_range: Some(days),
        };
        let report: ProgressReport = self.required(cycle, &request).await?;

        let flashcards = if event.include_flashcards {
            let request = FlashcardRequest {
                user_id: event.user_id.clone(),
                topic: topic.clone(),
                difficulty: event.difficulty,
                mistake_patterns: None,
            };
            let deadline = cycle.optional_deadline();
            self.optional::<_, FlashcardRecommendations>(cycle, deadline, &request)
                .await
        } else {
            None
        };

        let history = if include_history {
            match self.recorder.activity_summary(&event.user_id, days).await {
                Ok(summary) => Some(summary),
                Err(e) => {
                    warn!(cycle_id = %cycle.id, error = %e, "Activity history unavailable");
                    None
                }
            }
        } else {
            None
        };

        let summary = progress::summarize(&report, flashcards.as_ref(), topic.as_deref());
        Ok(merge(
            PrimaryOutput::Progress { summary, history },
            &SignalSet::default(),
            None,
            self.meta(cycle),
        ))
    }

    /// Call an agent the cycle cannot do without.
    async fn required<Req, Resp>(&self, cycle: &Cycle, request: &Req) -> Result<Resp, RouteError>
    where
        Req: AgentRequest + Sync,
        Resp: AgentResponse,
    {
        let slot = cycle.calls.issue(Req::AGENT);
        let mut result = learnroute_agents::call(self.gateway.as_ref(), request).await;
        let decoded = result.decode::<Resp>();
        cycle.calls.complete(slot, result);

        decoded.map_err(|cause| RouteError::RequiredAgentFailure {
            agent: Req::AGENT,
            cause,
        })
    }

    /// Call a signal agent. Any failure, including `deadline`, leaves the
    /// signal absent.
    async fn optional<Req, Resp>(
        &self,
        cycle: &Cycle,
        deadline: tokio::time::Instant,
        request: &Req,
    ) -> Option<Resp>
    where
        Req: AgentRequest + Sync,
        Resp: AgentResponse,
    {
        let slot = cycle.calls.issue(Req::AGENT);
        let issued = std::time::Instant::now();
        let call = learnroute_agents::call(self.gateway.as_ref(), request);

        let mut result = match tokio::time::timeout_at(deadline, call).await {
            Ok(result) => result,
            Err(_) => AgentCallResult::failed(
                Req::AGENT,
                AgentCallError::DeadlineExceeded {
                    deadline_ms: cycle.optional_budget_ms(),
                },
                millis(issued.elapsed()),
                0,
            ),
        };

        let decoded = result.decode::<Resp>();
        cycle.calls.complete(slot, result);
        match decoded {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(
                    cycle_id = %cycle.id,
                    agent = %Req::AGENT,
                    error = %e,
                    "Optional agent failed, signal absent"
                );
                None
            }
        }
    }

    fn meta(&self, cycle: &Cycle) -> MergeMeta {
        MergeMeta {
            cycle_id: cycle.id.clone(),
            agents_invoked: cycle.calls.agents(),
            response_time_ms: cycle.elapsed_ms(),
            timestamp: Utc::now(),
        }
    }
}

fn difficulty(event: &InteractionEvent) -> Result<Difficulty, RouteError> {
    event
        .difficulty
        .ok_or_else(|| RouteError::MalformedEvent(format!("difficulty is required for {}", event.intent)))
}
