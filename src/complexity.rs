//! Complexity scoring on a 1-5 scale: a manual override when one is
//! recorded, otherwise a keyword and word-count heuristic.

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use sprint_common::claim::is_unset;

use crate::context::SprintContext;

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-zA-Z][a-zA-Z0-9-]*").unwrap());

const TRIVIAL: &[&str] = &["rename", "format", "typo", "bump", "reformat", "formatting"];
const RESEARCH: &[&str] = &[
    "explore",
    "investigate",
    "research",
    "brainstorm",
    "evaluate",
    "survey",
    "analyze",
];
const AMBIGUITY: &[&str] = &[
    "or",
    "vs",
    "versus",
    "alternative",
    "tradeoff",
    "trade-off",
    "either",
    "approach",
    "option",
];
const SIMPLICITY: &[&str] = &["like", "similar", "existing", "just", "simple", "straightforward"];

const DEFAULT_SCORE: u8 = 3;

fn count_matches(words: &[String], keywords: &[&str]) -> usize {
    words.iter().filter(|w| keywords.contains(&w.as_str())).count()
}

/// Score a free-text description.
pub fn classify(description: &str) -> u8 {
    let word_count = description.split_whitespace().count();
    if word_count < 5 {
        return DEFAULT_SCORE;
    }

    let words: Vec<String> = WORD_RE
        .find_iter(description)
        .map(|m| m.as_str().to_lowercase())
        .collect();

    if count_matches(&words, TRIVIAL) > 0 && word_count < 20 {
        return 1;
    }
    if count_matches(&words, RESEARCH) > 1 {
        return 5;
    }

    let mut score: i32 = match word_count {
        0..30 => 2,
        30..100 => 3,
        _ => 4,
    };
    if count_matches(&words, AMBIGUITY) > 2 {
        score += 1;
    }
    if count_matches(&words, SIMPLICITY) > 2 {
        score -= 1;
    }
    score.clamp(1, 5) as u8
}

pub fn label(score: i64) -> &'static str {
    match score {
        1 => "trivial",
        2 => "simple",
        3 => "moderate",
        4 => "complex",
        5 => "research",
        _ => "moderate",
    }
}

/// Label for a numeric score or a legacy name (`medium` is `moderate`).
pub fn label_from_str(value: &str) -> &'static str {
    if let Ok(score) = value.trim().parse::<i64>() {
        return label(score);
    }
    match value.trim().to_lowercase().as_str() {
        "trivial" => "trivial",
        "simple" => "simple",
        "complex" => "complex",
        "research" => "research",
        _ => "moderate",
    }
}

/// A recorded complexity for `sprint`: the run's, then the tracker's
/// `complexity` state. Returned verbatim, so legacy names survive.
pub async fn override_for(ctx: &SprintContext, sprint: &str) -> Option<String> {
    if sprint.is_empty() {
        return None;
    }
    if ctx.store.available().await {
        match ctx.store.run_status_for_scope(sprint).await {
            Ok(run) if run.complexity > 0 => return Some(run.complexity.to_string()),
            Ok(_) => {}
            Err(e) => debug!(sprint, error = %e, "no run complexity"),
        }
    }
    if ctx.tracker.available().await {
        if let Ok(Some(value)) = ctx.tracker.state_get(sprint, "complexity").await {
            let value = value.trim();
            if !is_unset(value) {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// The override when present, otherwise the heuristic score.
pub async fn classify_for(ctx: &SprintContext, sprint: &str, description: &str) -> String {
    match override_for(ctx, sprint).await {
        Some(value) => value,
        None => classify(description).to_string(),
    }
}
