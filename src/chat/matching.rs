//! Partner matching algorithms
//!
//! This module decides which waiting entry, if any, a searching connection is
//! paired with. Candidates are pre-filtered on preference compatibility, then
//! ranked by interest overlap or taken first-come depending on the mode.

use crate::chat::queue::{MatchQueue, MatchQueues, WaitingEntry};
use crate::types::{Preferences, QueueKind, ANY_PREFERENCE};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// How candidates on a queue are ranked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchingMode {
    /// Best interest score wins, subject to a minimum threshold
    #[default]
    ScoreBased,
    /// First preference-compatible entry wins
    FilterFirst,
}

impl std::str::FromStr for MatchingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "score_based" => Ok(MatchingMode::ScoreBased),
            "filter_first" => Ok(MatchingMode::FilterFirst),
            other => Err(format!("Unknown matching mode: {}", other)),
        }
    }
}

impl std::fmt::Display for MatchingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchingMode::ScoreBased => write!(f, "score_based"),
            MatchingMode::FilterFirst => write!(f, "filter_first"),
        }
    }
}

/// Configuration for partner matching behavior
#[derive(Debug, Clone)]
pub struct MatchingConfig {
    pub mode: MatchingMode,
    /// Minimum interest score accepted for free requesters
    pub min_score_standard: u32,
    /// Minimum interest score accepted for premium requesters
    pub min_score_premium: u32,
    /// Search the default queue when the constrained queue yields nothing
    pub fallback_to_default_queue: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            mode: MatchingMode::ScoreBased,
            min_score_standard: 10,
            min_score_premium: 20,
            fallback_to_default_queue: true,
        }
    }
}

impl MatchingConfig {
    pub fn threshold_for(&self, is_premium: bool) -> u32 {
        if is_premium {
            self.min_score_premium
        } else {
            self.min_score_standard
        }
    }
}

/// Outcome of a match attempt
#[derive(Debug, Clone, PartialEq)]
pub enum MatchingResult {
    /// A partner was taken off a queue
    Matched(MatchResult),
    /// No partner found; the requester now waits on this queue
    Enqueued(QueueKind),
}

/// A selected partner together with the compatibility metadata
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub partner: WaitingEntry,
    pub queue: QueueKind,
    pub score: u32,
    pub shared_interests: Vec<String>,
}

/// Index of the selected entry on the scanned queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchCandidate {
    pub index: usize,
    pub score: u32,
}

/// Interests present in both lists, in the order of `requester`
pub fn shared_interests(requester: &[String], candidate: &[String]) -> Vec<String> {
    let candidate_set: HashSet<&str> = candidate.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    requester
        .iter()
        .filter(|interest| candidate_set.contains(interest.as_str()))
        .filter(|interest| seen.insert(interest.as_str()))
        .cloned()
        .collect()
}

/// Overlap score in 0..=100: shared count over the larger interest count, rounded.
/// Zero when either side has no interests.
pub fn interest_score(a: &[String], b: &[String]) -> u32 {
    let a_len = a.iter().collect::<HashSet<_>>().len();
    let b_len = b.iter().collect::<HashSet<_>>().len();
    if a_len == 0 || b_len == 0 {
        return 0;
    }

    let shared = shared_interests(a, b).len();
    let denominator = a_len.max(b_len);
    ((shared as f64 / denominator as f64) * 100.0).round() as u32
}

/// Whether two preference sets accept each other. A dimension conflicts only
/// when both sides set it, neither is the wildcard and the values differ.
pub fn preferences_compatible(a: Option<&Preferences>, b: Option<&Preferences>) -> bool {
    let (Some(a), Some(b)) = (a, b) else {
        return true;
    };

    a.dimensions()
        .iter()
        .zip(b.dimensions().iter())
        .all(|((_, left), (_, right))| match (left, right) {
            (Some(left), Some(right)) => {
                *left == ANY_PREFERENCE || *right == ANY_PREFERENCE || left == right
            }
            _ => true,
        })
}

/// Trait for partner selection strategies
pub trait PartnerMatcher: Send + Sync {
    /// Pick an entry on `queue` for `requester`, or nothing
    fn select_partner(
        &self,
        requester: &WaitingEntry,
        queue: &MatchQueue,
        config: &MatchingConfig,
    ) -> Option<MatchCandidate>;

    /// Hard eligibility check applied before any ranking
    fn can_pair(&self, requester: &WaitingEntry, candidate: &WaitingEntry) -> bool {
        requester.connection_id != candidate.connection_id
            && preferences_compatible(
                requester.preferences.as_ref(),
                candidate.preferences.as_ref(),
            )
    }
}

/// Ranks candidates by interest overlap
///
/// Requesters without interests are paired first-come with any eligible entry.
/// Otherwise the highest score wins, earliest entry on ties, and the pairing
/// is only accepted when the score is positive and meets the threshold.
#[derive(Debug, Default)]
pub struct ScoreBasedMatcher;

impl PartnerMatcher for ScoreBasedMatcher {
    fn select_partner(
        &self,
        requester: &WaitingEntry,
        queue: &MatchQueue,
        config: &MatchingConfig,
    ) -> Option<MatchCandidate> {
        if requester.interests.is_empty() {
            return queue
                .iter()
                .enumerate()
                .find(|(_, candidate)| self.can_pair(requester, candidate))
                .map(|(index, _)| MatchCandidate { index, score: 0 });
        }

        let mut best: Option<MatchCandidate> = None;
        for (index, candidate) in queue.iter().enumerate() {
            if !self.can_pair(requester, candidate) {
                continue;
            }
            let score = interest_score(&requester.interests, &candidate.interests);
            match best {
                Some(current) if score <= current.score => {}
                _ => best = Some(MatchCandidate { index, score }),
            }
        }

        let threshold = config.threshold_for(requester.is_premium);
        match best {
            Some(candidate) if candidate.score > 0 && candidate.score >= threshold => {
                Some(candidate)
            }
            Some(candidate) => {
                debug!(
                    "Best candidate on {} queue scored {} (threshold {}), not pairing '{}'",
                    queue.kind(),
                    candidate.score,
                    threshold,
                    requester.connection_id
                );
                None
            }
            None => None,
        }
    }
}

/// Takes the first eligible entry; the score is still reported
#[derive(Debug, Default)]
pub struct FilterFirstMatcher;

impl PartnerMatcher for FilterFirstMatcher {
    fn select_partner(
        &self,
        requester: &WaitingEntry,
        queue: &MatchQueue,
        _config: &MatchingConfig,
    ) -> Option<MatchCandidate> {
        queue
            .iter()
            .enumerate()
            .find(|(_, candidate)| self.can_pair(requester, candidate))
            .map(|(index, candidate)| MatchCandidate {
                index,
                score: interest_score(&requester.interests, &candidate.interests),
            })
    }
}

/// Runs a matcher over the queues in search order and updates them
#[derive(Clone)]
pub struct MatchingEngine {
    matcher: Arc<dyn PartnerMatcher>,
    config: MatchingConfig,
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new(MatchingConfig::default())
    }
}

impl MatchingEngine {
    pub fn new(config: MatchingConfig) -> Self {
        let matcher: Arc<dyn PartnerMatcher> = match config.mode {
            MatchingMode::ScoreBased => Arc::new(ScoreBasedMatcher),
            MatchingMode::FilterFirst => Arc::new(FilterFirstMatcher),
        };
        Self { matcher, config }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Queues scanned for a requester, in order
    pub fn search_order(&self, requester: &WaitingEntry) -> Vec<QueueKind> {
        match requester.target_queue() {
            QueueKind::Default => vec![QueueKind::Default],
            QueueKind::Constrained if self.config.fallback_to_default_queue => {
                vec![QueueKind::Constrained, QueueKind::Default]
            }
            QueueKind::Constrained => vec![QueueKind::Constrained],
        }
    }

    /// Find a partner for `requester`. On success the partner is removed from
    /// its queue and the requester from every queue; otherwise the requester is
    /// enqueued on its target queue.
    pub fn find_match(&self, queues: &mut MatchQueues, requester: WaitingEntry) -> MatchingResult {
        for kind in self.search_order(&requester) {
            let Some(candidate) =
                self.matcher
                    .select_partner(&requester, queues.queue(kind), &self.config)
            else {
                continue;
            };

            let Some(partner) = queues.queue_mut(kind).take(candidate.index) else {
                continue;
            };
            queues.remove(&requester.connection_id);

            let shared = shared_interests(&requester.interests, &partner.interests);
            return MatchingResult::Matched(MatchResult {
                partner,
                queue: kind,
                score: candidate.score,
                shared_interests: shared,
            });
        }

        let target = requester.target_queue();
        queues.enqueue(target, requester);
        MatchingResult::Enqueued(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FindPartnerRequest;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn entry(id: &str, interests: &[&str]) -> WaitingEntry {
        WaitingEntry::from_request(id, &FindPartnerRequest::with_interests(interests.to_vec()))
    }

    fn premium_entry(id: &str, interests: &[&str], preferences: Option<Preferences>) -> WaitingEntry {
        WaitingEntry::from_request(
            id,
            &FindPartnerRequest {
                interests: strings(interests),
                preferences,
                is_premium: true,
            },
        )
    }

    fn gender(value: &str) -> Preferences {
        Preferences {
            gender: Some(value.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_interest_score() {
        assert_eq!(
            interest_score(&strings(&["music", "gaming"]), &strings(&["music"])),
            50
        );
        assert_eq!(
            interest_score(
                &strings(&["music", "gaming", "art"]),
                &strings(&["music", "gaming"])
            ),
            67
        );
        assert_eq!(interest_score(&strings(&["a"]), &strings(&["a"])), 100);
        assert_eq!(interest_score(&strings(&["a"]), &strings(&["b"])), 0);
        assert_eq!(interest_score(&[], &strings(&["a"])), 0);
        assert_eq!(interest_score(&strings(&["a"]), &[]), 0);
    }

    #[test]
    fn test_shared_interests_follow_requester_order() {
        let shared = shared_interests(
            &strings(&["art", "music", "gaming"]),
            &strings(&["gaming", "music"]),
        );
        assert_eq!(shared, vec!["music", "gaming"]);
    }

    #[test]
    fn test_preferences_compatibility() {
        assert!(preferences_compatible(None, Some(&gender("female"))));
        assert!(preferences_compatible(Some(&gender("female")), None));
        assert!(preferences_compatible(
            Some(&gender("female")),
            Some(&gender("female"))
        ));
        assert!(preferences_compatible(
            Some(&gender("Any")),
            Some(&gender("male"))
        ));
        assert!(preferences_compatible(
            Some(&gender("female")),
            Some(&Preferences::default())
        ));
        assert!(!preferences_compatible(
            Some(&gender("female")),
            Some(&gender("male"))
        ));
    }

    #[test]
    fn test_unconstrained_requester_takes_first_entry() {
        let engine = MatchingEngine::default();
        let mut queues = MatchQueues::new();
        queues.enqueue(QueueKind::Default, entry("a", &["music"]));
        queues.enqueue(QueueKind::Default, entry("b", &[]));

        match engine.find_match(&mut queues, entry("c", &[])) {
            MatchingResult::Matched(result) => {
                assert_eq!(result.partner.connection_id, "a");
                assert_eq!(result.score, 0);
                assert!(result.shared_interests.is_empty());
            }
            other => panic!("expected match, got {:?}", other),
        }
        assert_eq!(queues.queue(QueueKind::Default).connection_ids(), vec!["b"]);
    }

    #[test]
    fn test_requester_never_matches_itself() {
        let engine = MatchingEngine::default();
        let mut queues = MatchQueues::new();
        queues.enqueue(QueueKind::Default, entry("a", &[]));

        let result = engine.find_match(&mut queues, entry("a", &[]));
        assert_eq!(result, MatchingResult::Enqueued(QueueKind::Default));
        assert_eq!(queues.total_len(), 1);
    }

    #[test]
    fn test_score_based_picks_best_score_earliest_on_ties() {
        let engine = MatchingEngine::default();
        let mut queues = MatchQueues::new();
        queues.enqueue(QueueKind::Default, entry("low", &["art"]));
        queues.enqueue(QueueKind::Default, entry("first", &["music", "gaming"]));
        queues.enqueue(QueueKind::Default, entry("second", &["music", "gaming"]));

        match engine.find_match(&mut queues, entry("me", &["music", "gaming"])) {
            MatchingResult::Matched(result) => {
                assert_eq!(result.partner.connection_id, "first");
                assert_eq!(result.score, 100);
                assert_eq!(result.shared_interests, vec!["music", "gaming"]);
            }
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[test]
    fn test_score_below_threshold_enqueues() {
        let config = MatchingConfig {
            min_score_standard: 60,
            ..Default::default()
        };
        let engine = MatchingEngine::new(config);
        let mut queues = MatchQueues::new();
        queues.enqueue(QueueKind::Default, entry("a", &["music", "gaming"]));

        let result = engine.find_match(&mut queues, entry("b", &["music"]));
        assert_eq!(result, MatchingResult::Enqueued(QueueKind::Default));
        assert_eq!(queues.queue(QueueKind::Default).connection_ids(), vec!["a", "b"]);
    }

    #[test]
    fn test_zero_score_never_pairs_interest_requesters() {
        let engine = MatchingEngine::default();
        let mut queues = MatchQueues::new();
        queues.enqueue(QueueKind::Default, entry("a", &["art"]));
        queues.enqueue(QueueKind::Default, entry("b", &[]));

        let result = engine.find_match(&mut queues, entry("c", &["music"]));
        assert_eq!(result, MatchingResult::Enqueued(QueueKind::Default));
    }

    #[test]
    fn test_premium_threshold_is_stricter() {
        let engine = MatchingEngine::default();
        let mut queues = MatchQueues::new();
        queues.enqueue(
            QueueKind::Default,
            entry("a", &["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"]),
        );

        // 1 shared out of 10 scores 10: enough for free, not for premium
        let result = engine.find_match(&mut queues, premium_entry("p", &["a"], None));
        assert_eq!(result, MatchingResult::Enqueued(QueueKind::Constrained));

        let result = engine.find_match(&mut queues, entry("f", &["a"]));
        assert!(matches!(result, MatchingResult::Matched(_)));
    }

    #[test]
    fn test_preferences_filter_candidates() {
        let engine = MatchingEngine::default();
        let mut queues = MatchQueues::new();
        queues.enqueue(
            QueueKind::Constrained,
            premium_entry("male", &["music"], Some(gender("male"))),
        );
        queues.enqueue(
            QueueKind::Constrained,
            premium_entry("female", &["music"], Some(gender("female"))),
        );

        match engine.find_match(
            &mut queues,
            premium_entry("me", &["music"], Some(gender("female"))),
        ) {
            MatchingResult::Matched(result) => {
                assert_eq!(result.partner.connection_id, "female");
                assert_eq!(result.queue, QueueKind::Constrained);
            }
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[test]
    fn test_constrained_falls_back_to_default_queue() {
        let engine = MatchingEngine::default();
        let mut queues = MatchQueues::new();
        queues.enqueue(QueueKind::Default, entry("free", &["music"]));

        match engine.find_match(&mut queues, premium_entry("p", &["music"], None)) {
            MatchingResult::Matched(result) => {
                assert_eq!(result.partner.connection_id, "free");
                assert_eq!(result.queue, QueueKind::Default);
            }
            other => panic!("expected match, got {:?}", other),
        }

        let engine = MatchingEngine::new(MatchingConfig {
            fallback_to_default_queue: false,
            ..Default::default()
        });
        let mut queues = MatchQueues::new();
        queues.enqueue(QueueKind::Default, entry("free", &["music"]));
        let result = engine.find_match(&mut queues, premium_entry("p", &["music"], None));
        assert_eq!(result, MatchingResult::Enqueued(QueueKind::Constrained));
    }

    #[test]
    fn test_filter_first_ignores_score_ranking() {
        let engine = MatchingEngine::new(MatchingConfig {
            mode: MatchingMode::FilterFirst,
            ..Default::default()
        });
        let mut queues = MatchQueues::new();
        queues.enqueue(QueueKind::Default, entry("a", &["art"]));
        queues.enqueue(QueueKind::Default, entry("b", &["music"]));

        match engine.find_match(&mut queues, entry("c", &["music"])) {
            MatchingResult::Matched(result) => {
                assert_eq!(result.partner.connection_id, "a");
                assert_eq!(result.score, 0);
            }
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[test]
    fn test_matched_requester_removed_from_queues() {
        let engine = MatchingEngine::default();
        let mut queues = MatchQueues::new();
        queues.enqueue(QueueKind::Default, entry("me", &[]));
        queues.enqueue(QueueKind::Default, entry("other", &[]));

        let result = engine.find_match(&mut queues, entry("me", &[]));
        assert!(matches!(result, MatchingResult::Matched(_)));
        assert_eq!(queues.total_len(), 0);
    }

    #[test]
    fn test_matching_mode_parsing() {
        assert_eq!("score_based".parse::<MatchingMode>(), Ok(MatchingMode::ScoreBased));
        assert_eq!("filter-first".parse::<MatchingMode>(), Ok(MatchingMode::FilterFirst));
        assert!("random".parse::<MatchingMode>().is_err());
    }
}
