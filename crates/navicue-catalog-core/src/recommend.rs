//! Stateless next-cue scoring.
//!
//! Three rules add up per active item:
//! - regulation band: biases toward grounding, reinforcement, or challenge
//!   content depending on the user's current regulation score;
//! - variety: rewards response types that were not shown recently;
//! - progression: rewards the KBE stage that follows the one the user has
//!   been seeing most.
//!
//! The caller owns the history; nothing here remembers previous calls.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::CatalogSnapshot;
use crate::model::{ContentItem, ContentStatus, Facet, KbeStage};
use crate::CatalogError;

pub const NO_ELIGIBLE_CONTENT_REASON: &str = "no eligible content";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RegulationBand {
    Low,
    Mid,
    High,
}

impl RegulationBand {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Mid => "mid",
            Self::High => "high",
        }
    }
}

/// Every constant the scorer uses, in one place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringPolicy {
    pub ruleset_version: String,
    /// Scores strictly below this are the low band.
    pub low_band_upper: f64,
    /// Scores at or above this are the high band.
    pub high_band_lower: f64,
    pub grounding_bonus: i32,
    pub mid_band_bonus: i32,
    pub high_band_bonus: i32,
    pub grounding_response_types: Vec<String>,
    pub safety_pillars: Vec<String>,
    pub challenge_response_types: Vec<String>,
    pub variety_window: usize,
    pub variety_bonus: i32,
    pub repeat_penalty: i32,
    pub progression_bonus: i32,
    pub max_history_len: usize,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        fn strings(values: &[&str]) -> Vec<String> {
            values.iter().map(ToString::to_string).collect()
        }

        Self {
            ruleset_version: "recommend.v1".to_string(),
            low_band_upper: 4.0,
            high_band_lower: 7.0,
            grounding_bonus: 40,
            mid_band_bonus: 30,
            high_band_bonus: 35,
            grounding_response_types: strings(&["breath", "witness", "hold", "body_map"]),
            safety_pillars: strings(&[
                "safety",
                "ER",
                "pillar_ER",
                "emotional_regulation",
                "emotional-regulation",
                "SR",
                "stress_resilience",
                "stress-resilience",
            ]),
            challenge_response_types: strings(&["echo", "paradox", "constellation"]),
            variety_window: 5,
            variety_bonus: 20,
            repeat_penalty: 10,
            progression_bonus: 30,
            max_history_len: 50,
        }
    }
}

impl ScoringPolicy {
    #[must_use]
    pub fn band_for(&self, regulation_score: f64) -> RegulationBand {
        if regulation_score < self.low_band_upper {
            RegulationBand::Low
        } else if regulation_score < self.high_band_lower {
            RegulationBand::Mid
        } else {
            RegulationBand::High
        }
    }

    /// Highest score any item can reach under `band`; the confidence denominator.
    #[must_use]
    pub fn max_attainable(&self, band: Option<RegulationBand>) -> i32 {
        let band_bonus = match band {
            None => 0,
            Some(RegulationBand::Low) => self.grounding_bonus,
            Some(RegulationBand::Mid) => self.mid_band_bonus,
            Some(RegulationBand::High) => self.high_band_bonus,
        };
        band_bonus.saturating_add(self.variety_bonus).saturating_add(self.progression_bonus)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserContext {
    #[serde(default)]
    pub regulation_score: Option<f64>,
    /// Facet values recently shown, most recent first.
    #[serde(default)]
    pub recent_facet_history: Vec<String>,
}

impl UserContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_regulation_score(mut self, score: f64) -> Self {
        self.regulation_score = Some(score);
        self
    }

    #[must_use]
    pub fn with_history<I, S>(mut self, history: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recent_facet_history = history.into_iter().map(Into::into).collect();
        self
    }

    /// Check the context is well formed for `policy`.
    ///
    /// # Errors
    /// Returns [`CatalogError::InvalidArgument`] when the regulation score is not
    /// a finite number in `[0, 10]`, or the history exceeds the policy bound.
    pub fn validate(&self, policy: &ScoringPolicy) -> Result<(), CatalogError> {
        if let Some(score) = self.regulation_score {
            if !score.is_finite() || !(0.0..=10.0).contains(&score) {
                return Err(CatalogError::InvalidArgument(format!(
                    "regulation_score MUST be in [0, 10] (got {score})"
                )));
            }
        }

        if self.recent_facet_history.len() > policy.max_history_len {
            return Err(CatalogError::InvalidArgument(format!(
                "recent_facet_history MUST hold at most {} entries (got {})",
                policy.max_history_len,
                self.recent_facet_history.len()
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct RuleScores {
    pub band: i32,
    pub variety: i32,
    pub progression: i32,
}

impl RuleScores {
    #[must_use]
    pub fn total(self) -> i32 {
        self.band.saturating_add(self.variety).saturating_add(self.progression)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoredCandidate {
    pub rank: usize,
    pub item: ContentItem,
    pub score: i32,
    pub rule_scores: RuleScores,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub item: Option<ContentItem>,
    pub reason: String,
    pub confidence: f64,
    pub score: i32,
    pub band: Option<RegulationBand>,
    pub rule_scores: Option<RuleScores>,
    pub ruleset_version: String,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Rule {
    Band,
    Progression,
    Variety,
}

struct Inputs<'a> {
    policy: &'a ScoringPolicy,
    band: Option<RegulationBand>,
    recent: &'a [String],
    current_stage: Option<KbeStage>,
}

impl<'a> Inputs<'a> {
    fn new(context: &'a UserContext, policy: &'a ScoringPolicy) -> Self {
        let window = policy.variety_window.min(context.recent_facet_history.len());
        Self {
            policy,
            band: context.regulation_score.map(|score| policy.band_for(score)),
            recent: &context.recent_facet_history[..window],
            current_stage: dominant_stage(&context.recent_facet_history),
        }
    }

    fn score(&self, item: &ContentItem) -> RuleScores {
        RuleScores {
            band: self.band_score(item),
            variety: self.variety_score(item),
            progression: self.progression_score(item),
        }
    }

    fn band_score(&self, item: &ContentItem) -> i32 {
        let policy = self.policy;
        let response_type = item.facet(Facet::ResponseType);
        let in_set = |set: &[String], value: Option<&str>| {
            value.is_some_and(|value| set.iter().any(|entry| entry == value))
        };

        match self.band {
            None => 0,
            Some(RegulationBand::Low) => {
                let grounding = in_set(&policy.grounding_response_types, response_type);
                let safety = in_set(&policy.safety_pillars, item.facet(Facet::PillarId));
                if grounding && safety {
                    policy.grounding_bonus
                } else {
                    0
                }
            }
            Some(RegulationBand::Mid) => match item.kbe_stage() {
                Some(KbeStage::Knowing | KbeStage::Believing) => policy.mid_band_bonus,
                _ => 0,
            },
            Some(RegulationBand::High) => {
                let embodying = item.kbe_stage() == Some(KbeStage::Embodying);
                if embodying || in_set(&policy.challenge_response_types, response_type) {
                    policy.high_band_bonus
                } else {
                    0
                }
            }
        }
    }

    fn variety_score(&self, item: &ContentItem) -> i32 {
        let seen_recently = item
            .facet(Facet::ResponseType)
            .is_some_and(|response_type| self.recent.iter().any(|entry| entry == response_type));
        if seen_recently {
            self.policy.repeat_penalty.saturating_neg()
        } else {
            self.policy.variety_bonus
        }
    }

    fn progression_score(&self, item: &ContentItem) -> i32 {
        match (self.current_stage, item.kbe_stage()) {
            (Some(current), Some(stage)) if stage == current.next() => self.policy.progression_bonus,
            _ => 0,
        }
    }

    fn explain(&self, item: &ContentItem, rule_scores: RuleScores) -> String {
        let contributions = [
            (Rule::Band, rule_scores.band),
            (Rule::Progression, rule_scores.progression),
            (Rule::Variety, rule_scores.variety),
        ];
        let mut strongest: Option<(Rule, i32)> = None;
        for (rule, points) in contributions {
            let stronger = match strongest {
                None => points > 0,
                Some((_, best)) => points > best,
            };
            if stronger {
                strongest = Some((rule, points));
            }
        }

        match strongest.map(|(rule, _)| rule) {
            Some(Rule::Band) => match self.band {
                Some(RegulationBand::Low) => "state is low; prioritizing grounding content".to_string(),
                Some(RegulationBand::Mid) => {
                    "state is steadying; reinforcing knowing and believing content".to_string()
                }
                Some(RegulationBand::High) => {
                    "state is high; offering embodying and challenge content".to_string()
                }
                None => "highest-scoring eligible content".to_string(),
            },
            Some(Rule::Progression) => match (self.current_stage, item.kbe_stage()) {
                (Some(current), Some(next)) => {
                    format!("recent content centred on {current}; progressing to {next}")
                }
                _ => "progressing to the next KBE stage".to_string(),
            },
            Some(Rule::Variety) => match item.facet(Facet::ResponseType) {
                Some(response_type) => {
                    format!("{response_type} has not been shown recently; adding variety")
                }
                None => "adding variety to recent content".to_string(),
            },
            None => "highest-scoring eligible content".to_string(),
        }
    }
}

/// Most frequent KBE stage in `history`; ties go to the earlier stage in the cycle.
fn dominant_stage(history: &[String]) -> Option<KbeStage> {
    let mut counts = [0_usize; 3];
    for entry in history {
        if let Some(stage) = KbeStage::parse(entry) {
            let slot = KbeStage::CYCLE.iter().position(|candidate| *candidate == stage);
            if let Some(slot) = slot {
                counts[slot] += 1;
            }
        }
    }

    let mut best: Option<(KbeStage, usize)> = None;
    for (stage, count) in KbeStage::CYCLE.into_iter().zip(counts) {
        let more_frequent = match best {
            None => count > 0,
            Some((_, best_count)) => count > best_count,
        };
        if more_frequent {
            best = Some((stage, count));
        }
    }
    best.map(|(stage, _)| stage)
}

fn scored_eligible<'s>(
    snapshot: &'s CatalogSnapshot,
    inputs: &'s Inputs<'s>,
) -> impl Iterator<Item = (&'s ContentItem, RuleScores)> + 's {
    snapshot
        .all()
        .iter()
        .filter(|item| item.status == ContentStatus::Active)
        .map(move |item| (item, inputs.score(item)))
}

/// Pick the single best active item for `context` under the default policy.
///
/// # Errors
/// Returns [`CatalogError::InvalidArgument`] for a malformed context.
pub fn recommend(
    snapshot: &CatalogSnapshot,
    context: &UserContext,
) -> Result<Recommendation, CatalogError> {
    recommend_with_policy(snapshot, context, &ScoringPolicy::default())
}

/// Pick the single best active item for `context` under `policy`.
///
/// Equal scores resolve to the item loaded first. With no active items the
/// result carries no item and zero confidence instead of failing.
///
/// # Errors
/// Returns [`CatalogError::InvalidArgument`] for a malformed context.
pub fn recommend_with_policy(
    snapshot: &CatalogSnapshot,
    context: &UserContext,
    policy: &ScoringPolicy,
) -> Result<Recommendation, CatalogError> {
    context.validate(policy)?;
    let inputs = Inputs::new(context, policy);

    let mut winner: Option<(&ContentItem, RuleScores)> = None;
    let mut eligible = 0_usize;
    for (item, rule_scores) in scored_eligible(snapshot, &inputs) {
        eligible += 1;
        let better = match winner {
            None => true,
            Some((_, best)) => rule_scores.total() > best.total(),
        };
        if better {
            winner = Some((item, rule_scores));
        }
    }

    let Some((item, rule_scores)) = winner else {
        debug!(snapshot_id = %snapshot.snapshot_id(), "no eligible content to recommend");
        return Ok(Recommendation {
            item: None,
            reason: NO_ELIGIBLE_CONTENT_REASON.to_string(),
            confidence: 0.0,
            score: 0,
            band: inputs.band,
            rule_scores: None,
            ruleset_version: policy.ruleset_version.clone(),
        });
    };

    let score = rule_scores.total();
    let confidence = normalized_confidence(score, policy.max_attainable(inputs.band));
    let reason = inputs.explain(item, rule_scores);

    debug!(
        snapshot_id = %snapshot.snapshot_id(),
        eligible,
        band = inputs.band.map_or("none", RegulationBand::as_str),
        winner = %item.id,
        score,
        "recommendation scored"
    );

    Ok(Recommendation {
        item: Some(item.clone()),
        reason,
        confidence,
        score,
        band: inputs.band,
        rule_scores: Some(rule_scores),
        ruleset_version: policy.ruleset_version.clone(),
    })
}

/// Every active item scored for `context`, best first, truncated to `limit`.
///
/// Ordering matches [`recommend_with_policy`]: the first candidate is always
/// the item it would pick.
///
/// # Errors
/// Returns [`CatalogError::InvalidArgument`] for a malformed context or a zero
/// `limit`.
pub fn rank(
    snapshot: &CatalogSnapshot,
    context: &UserContext,
    policy: &ScoringPolicy,
    limit: usize,
) -> Result<Vec<ScoredCandidate>, CatalogError> {
    if limit == 0 {
        return Err(CatalogError::InvalidArgument("limit MUST be > 0".to_string()));
    }
    context.validate(policy)?;
    let inputs = Inputs::new(context, policy);

    let mut scored = scored_eligible(snapshot, &inputs).collect::<Vec<_>>();
    // Stable sort keeps load order among equal scores.
    scored.sort_by(|(_, lhs), (_, rhs)| rhs.total().cmp(&lhs.total()));

    Ok(scored
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(index, (item, rule_scores))| ScoredCandidate {
            rank: index + 1,
            item: item.clone(),
            score: rule_scores.total(),
            rule_scores,
        })
        .collect())
}

fn normalized_confidence(score: i32, max_attainable: i32) -> f64 {
    if max_attainable <= 0 {
        return 0.0;
    }
    (f64::from(score) / f64::from(max_attainable)).clamp(0.0, 1.0)
}
