//! Progress analytics derived from the progress and flashcard agents.

use learnroute_core::schemas::{FlashcardRecommendations, ProgressReport};
use learnroute_core::types::{ProgressOverview, ProgressSummary};

const STRENGTH_MASTERY: f64 = 0.8;
const WEAKNESS_MASTERY: f64 = 0.5;
const FOCUS_TOPICS: usize = 3;

/// Build the learner's progress digest.
///
/// `topic` narrows strengths and weaknesses by case-insensitive substring;
/// the overview always covers every topic.
pub fn summarize(
    report: &ProgressReport,
    flashcards: Option<&FlashcardRecommendations>,
    topic: Option<&str>,
) -> ProgressSummary {
    let needle = topic.map(str::to_lowercase);
    let matches = |name: &str| {
        needle
            .as_deref()
            .is_none_or(|n| name.to_lowercase().contains(n))
    };

    // mastery_levels is a BTreeMap, so both lists come out sorted by topic.
    let strengths: Vec<String> = report
        .mastery_levels
        .iter()
        .filter(|(name, level)| **level >= STRENGTH_MASTERY && matches(name))
        .map(|(name, _)| name.clone())
        .collect();
    let weaknesses: Vec<String> = report
        .mastery_levels
        .iter()
        .filter(|(name, level)| **level < WEAKNESS_MASTERY && matches(name))
        .map(|(name, _)| name.clone())
        .collect();

    let cards = flashcards.map(|f| f.flashcards.clone()).unwrap_or_default();

    let mut recommendations = Vec::new();
    if !weaknesses.is_empty() {
        let focus: Vec<&str> = weaknesses.iter().take(FOCUS_TOPICS).map(String::as_str).collect();
        recommendations.push(format!("Focus on weak topics: {}", focus.join(", ")));
    }
    if !cards.is_empty() {
        recommendations.push(format!("Review {} recommended flashcards", cards.len()));
    }

    let mastery_average = if report.mastery_levels.is_empty() {
        0.0
    } else {
        report.mastery_levels.values().sum::<f64>() / report.mastery_levels.len() as f64
    };

    ProgressSummary {
        overview: ProgressOverview {
            total_time_spent: report.time_spent,
            learning_velocity: report.learning_velocity,
            mastery_average,
            questions_attempted: report.questions_attempted.unwrap_or(0),
        },
        strengths,
        weaknesses,
        recommendations,
        mastery_levels: report.mastery_levels.clone(),
        flashcards: cards,
        recent_topics: report.recent_topics.clone(),
        improvement_rate: report.improvement_rate,
    }
}

/// Envelope content for FLASHCARD and PROGRESS responses.
pub fn content(summary: &ProgressSummary) -> String {
    if summary.recommendations.is_empty() {
        "No recommendations yet".to_string()
    } else {
        summary.recommendations.join("; ")
    }
}
