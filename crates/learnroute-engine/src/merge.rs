//! Response merger: agent outputs + routing metadata → one envelope. No I/O.

use chrono::{DateTime, Utc};

use learnroute_core::agent::AgentId;
use learnroute_core::schemas::{DoubtResolution, HintSuggestion, VideoAssistance};
use learnroute_core::types::{
    ActivitySummary, Analytics, MAX_HINT_LEVEL, ProgressSummary, ResponseEnvelope, ResponseMode,
};

use crate::escalation::Escalation;
use crate::progress;
use crate::signals::SignalSet;

/// The decisive output of the intent handler.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryOutput {
    Solution(DoubtResolution),
    Hint(HintSuggestion),
    Video(VideoAssistance),
    Progress {
        summary: ProgressSummary,
        history: Option<ActivitySummary>,
    },
}

/// Cycle metadata, captured by the engine so merging stays pure.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeMeta {
    pub cycle_id: String,
    pub agents_invoked: Vec<AgentId>,
    pub response_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

fn empty(mode: ResponseMode, content: String, agent: AgentId, meta: MergeMeta) -> ResponseEnvelope {
    ResponseEnvelope {
        mode,
        content,
        hint_level: None,
        stuck_score: None,
        video_ref: None,
        confidence_score: None,
        next_hint_available: None,
        youtube_metadata: None,
        action: None,
        progress: None,
        history: None,
        analytics: Analytics {
            agent,
            response_time: meta.response_time_ms,
            cycle_id: meta.cycle_id,
            agents_invoked: meta.agents_invoked,
            trigger_reason: None,
            confidence: None,
        },
        timestamp: meta.timestamp,
    }
}

fn with_video(mut envelope: ResponseEnvelope, video: &VideoAssistance) -> ResponseEnvelope {
    envelope.mode = ResponseMode::Video;
    envelope.content = video.explanation.clone();
    envelope.video_ref = video.video_ref.clone();
    envelope.youtube_metadata = video.youtube_metadata.clone();
    envelope.action = Some(video.action.clone());
    envelope.analytics.agent = AgentId::VideoIntelligence;
    envelope
}

pub fn merge(
    primary: PrimaryOutput,
    signals: &SignalSet,
    escalation: Option<&Escalation>,
    meta: MergeMeta,
) -> ResponseEnvelope {
    let mut envelope = match primary {
        PrimaryOutput::Solution(solution) => {
            let mut env = empty(ResponseMode::Solution, solution.solution, AgentId::DoubtResolver, meta);
            env.confidence_score = Some(solution.confidence);
            env.analytics.confidence = Some(solution.confidence);
            env
        }
        PrimaryOutput::Hint(hint) => {
            let mut env = empty(ResponseMode::Hint, hint.hint, AgentId::HintStrategy, meta);
            let level = signals.hint_level.unwrap_or(hint.hint_level);
            let ceiling = signals.max_hints.unwrap_or(MAX_HINT_LEVEL).min(MAX_HINT_LEVEL);
            env.next_hint_available = Some(hint.next_available.unwrap_or(level < ceiling));
            env
        }
        PrimaryOutput::Video(video) => {
            let env = empty(ResponseMode::Video, String::new(), AgentId::VideoIntelligence, meta);
            with_video(env, &video)
        }
        PrimaryOutput::Progress { summary, history } => {
            let (mode, agent) = if summary.flashcards.is_empty() {
                (ResponseMode::Progress, AgentId::ProgressTracker)
            } else {
                (ResponseMode::Flashcard, AgentId::FlashcardRecommender)
            };
            let mut env = empty(mode, progress::content(&summary), agent, meta);
            env.progress = Some(summary);
            env.history = history;
            env
        }
    };

    envelope.hint_level = signals.hint_level;
    envelope.stuck_score = signals.stuck_score;

    if let Some(escalation) = escalation {
        envelope.analytics.trigger_reason = Some(escalation.reason);
        if let Some(video) = &escalation.video {
            envelope = with_video(envelope, video);
        }
    }

    envelope
}
