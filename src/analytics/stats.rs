//! Performance statistics over an athlete's full tag history.
//!
//! Offensive and defensive success rates, the most frequent technical error
//! with its per-session trend, and the dominant technical strengths.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::db::{SessionWithTags, TagCategory, TagKind, TagOutcome};

/// Number of technical strengths reported
pub const DOMINANT_STRENGTHS_LIMIT: usize = 8;

/// Success/failure counts for one category
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeTally {
    pub successes: usize,
    pub failures: usize,
}

impl OutcomeTally {
    /// successes / (successes + failures); NaN when nothing was recorded
    pub fn rate(&self) -> f64 {
        let attempts = self.successes + self.failures;
        if attempts == 0 {
            f64::NAN
        } else {
            self.successes as f64 / attempts as f64
        }
    }

    fn record(&mut self, outcome: TagOutcome) {
        match outcome {
            TagOutcome::Success => self.successes += 1,
            TagOutcome::Fail => self.failures += 1,
        }
    }
}

/// Rate block as sent to clients; a NaN rate serializes as `null`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRate {
    pub successes: usize,
    pub failures: usize,
    pub rate: Option<f64>,
}

impl From<OutcomeTally> for OutcomeRate {
    fn from(tally: OutcomeTally) -> Self {
        let rate = tally.rate();
        Self {
            successes: tally.successes,
            failures: tally.failures,
            rate: rate.is_finite().then_some(rate),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub session_id: i64,
    /// Session date (YYYY-MM-DD)
    pub date: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AthleteStats {
    pub session_count: usize,
    pub offensive: OutcomeRate,
    pub defensive: OutcomeRate,
    pub most_frequent_weakness: Option<String>,
    pub weakness_trend: Vec<TrendPoint>,
    pub dominant_strengths: Vec<NamedCount>,
}

/// Counts by name, remembering the order names were first seen in
#[derive(Default)]
struct NameCounter {
    index: HashMap<String, usize>,
    counts: Vec<NamedCount>,
}

impl NameCounter {
    fn add(&mut self, name: &str) {
        match self.index.get(name) {
            Some(&i) => self.counts[i].count += 1,
            None => {
                self.index.insert(name.to_string(), self.counts.len());
                self.counts.push(NamedCount {
                    name: name.to_string(),
                    count: 1,
                });
            }
        }
    }

    /// Highest count first; the sort is stable so ties keep first-seen order
    fn ranked(mut self) -> Vec<NamedCount> {
        self.counts.sort_by(|a, b| b.count.cmp(&a.count));
        self.counts
    }
}

/// Compute statistics from sessions given in chronological order.
pub fn compute_stats(sessions: &[SessionWithTags]) -> AthleteStats {
    let mut offensive = OutcomeTally::default();
    let mut defensive = OutcomeTally::default();
    let mut errors = NameCounter::default();
    let mut strengths = NameCounter::default();

    for applied in sessions.iter().flat_map(|s| &s.session_tags) {
        let tag = &applied.tag;
        match tag.kind {
            TagKind::Offensive(outcome) => offensive.record(outcome),
            TagKind::Defensive(outcome) => defensive.record(outcome),
            TagKind::TechnicalError => errors.add(tag.name.trim()),
            TagKind::TechnicalStrength => strengths.add(tag.name.trim()),
            _ => {}
        }
    }

    let most_frequent_weakness = errors.ranked().into_iter().next().map(|nc| nc.name);

    let weakness_trend = match &most_frequent_weakness {
        Some(weakness) => sessions
            .iter()
            .map(|s| TrendPoint {
                session_id: s.session.id,
                date: session_date(&s.session.created_at),
                count: s
                    .session_tags
                    .iter()
                    .filter(|st| {
                        st.tag.kind.category() == TagCategory::TechnicalError
                            && st.tag.name.trim() == weakness
                    })
                    .count(),
            })
            .collect(),
        None => Vec::new(),
    };

    let mut dominant_strengths = strengths.ranked();
    dominant_strengths.truncate(DOMINANT_STRENGTHS_LIMIT);

    AthleteStats {
        session_count: sessions.len(),
        offensive: offensive.into(),
        defensive: defensive.into(),
        most_frequent_weakness,
        weakness_trend,
        dominant_strengths,
    }
}

fn session_date(created_at: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(created_at)
        .map(|dt| dt.date_naive().to_string())
        .unwrap_or_else(|_| created_at.chars().take(10).collect())
}

/// Render a rate as a whole percentage, or "—" when it is undefined
pub fn format_rate(rate: f64) -> String {
    if !rate.is_finite() {
        return "—".to_string();
    }
    format!("{}%", (rate * 100.0).round() as i64)
}
