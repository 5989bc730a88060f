//! Confidence policy
//!
//! Turns a ranked result list into one of three response tiers. The policy is a
//! pure function of its input: it keeps no state and never touches transport
//! or presentation concerns, which belong to whoever renders the decision.


use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::engine::SearchResult;

pub const DEFAULT_HIGH_THRESHOLD: f32 = 0.75;
pub const DEFAULT_LOW_THRESHOLD: f32 = 0.70;
pub const DEFAULT_MAX_SUGGESTIONS: usize = 15;
pub const MAX_SUGGESTIONS_LIMIT: usize = 50;

/// Call site asking for a decision. Each one carries its own thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogMode {
    /// Explicit FAQ lookup: the user typed a question to look up.
    FaqSearch,
    /// Free-form conversation where an FAQ answer is opportunistic.
    FreeDialog,
}

impl fmt::Display for DialogMode {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FaqSearch => write!(f, "faq"),
            Self::FreeDialog => write!(f, "dialog"),
        }
    }
}

impl FromStr for DialogMode {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "faq" | "faq_search" | "faq-search" => Ok(Self::FaqSearch),
            "dialog" | "free_dialog" | "free-dialog" => Ok(Self::FreeDialog),
            other => Err(format!(
                "unknown mode '{}' (expected 'faq' or 'dialog')",
                other
            )),
        }
    }
}

/// Thresholds and suggestion bound for one call site
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierPolicy {
    /// Best score at or above this is answered directly.
    pub high: f32,
    /// Best score at or above this (but below `high`) yields suggestions.
    pub low: f32,
    /// Upper bound on the number of suggested candidates.
    pub max_suggestions: usize,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            high: DEFAULT_HIGH_THRESHOLD,
            low: DEFAULT_LOW_THRESHOLD,
            max_suggestions: DEFAULT_MAX_SUGGESTIONS,
        }
    }
}

impl TierPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_threshold("high", self.high)?;
        check_threshold("low", self.low)?;

        if self.low > self.high {
            return Err(ConfigError::ThresholdOrder {
                low: self.low,
                high: self.high,
            });
        }

        if !(1..=MAX_SUGGESTIONS_LIMIT).contains(&self.max_suggestions) {
            return Err(ConfigError::InvalidMaxSuggestions(self.max_suggestions));
        }

        Ok(())
    }

    pub fn set_thresholds(&mut self, high: f32, low: f32) -> Result<(), ConfigError> {
        let candidate = Self {
            high,
            low,
            ..*self
        };
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    pub fn set_max_suggestions(&mut self, max_suggestions: usize) -> Result<(), ConfigError> {
        let candidate = Self {
            max_suggestions,
            ..*self
        };
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }
}

fn check_threshold(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && (-1.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidThreshold { name, value })
    }
}

/// Response tier chosen for a ranked result list
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Present this entry's answer as authoritative.
    Direct(SearchResult),
    /// Offer these candidates, best first, for the user to pick from.
    Suggest(Vec<SearchResult>),
    /// Nothing relevant was found.
    NoMatch,
}

impl Decision {
    #[inline]
    pub const fn tier(&self) -> &'static str {
        match self {
            Self::Direct(_) => "direct",
            Self::Suggest(_) => "suggest",
            Self::NoMatch => "no-match",
        }
    }
}

/// Two-threshold classifier over ranked search results
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidencePolicy {
    tiers: TierPolicy,
}

impl ConfidencePolicy {
    #[inline]
    pub fn new(tiers: TierPolicy) -> Result<Self, ConfigError> {
        tiers.validate()?;
        Ok(Self { tiers })
    }

    #[inline]
    pub const fn tiers(&self) -> &TierPolicy {
        &self.tiers
    }

    /// Classify a list ranked best-first, as returned by the retrieval engine.
    ///
    /// Both boundaries are inclusive: a best score exactly equal to `high` is
    /// `Direct`, exactly equal to `low` is `Suggest`.
    #[inline]
    pub fn classify(&self, results: &[SearchResult]) -> Decision {
        debug_assert!(
            results.windows(2).all(|w| w[0].score >= w[1].score),
            "results must be ranked best-first"
        );

        let Some(best) = results.first() else {
            return Decision::NoMatch;
        };

        if best.score >= self.tiers.high {
            Decision::Direct(best.clone())
        } else if best.score >= self.tiers.low {
            Decision::Suggest(
                results
                    .iter()
                    .take(self.tiers.max_suggestions)
                    .cloned()
                    .collect(),
            )
        } else {
            Decision::NoMatch
        }
    }
}
