use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::chain::{ApproverId, ChainStep, ConsensusType};
use crate::domain::request::{Decision, DecisionOutcome};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResolution {
    pub reached: bool,
    pub outcome: Option<DecisionOutcome>,
}

impl StepResolution {
    pub fn unresolved() -> Self {
        Self { reached: false, outcome: None }
    }

    pub fn resolved(outcome: DecisionOutcome) -> Self {
        Self { reached: true, outcome: Some(outcome) }
    }
}

/// Outcome categories in resolution priority order. When several
/// categories cross their threshold at once, the earlier one wins.
const PRIORITY: [DecisionOutcome; 3] =
    [DecisionOutcome::Approve, DecisionOutcome::Reject, DecisionOutcome::RequestChanges];

fn priority_rank(outcome: DecisionOutcome) -> usize {
    PRIORITY.iter().position(|candidate| *candidate == outcome).unwrap_or(PRIORITY.len())
}

/// Aggregates the current decision-per-approver set for one step into a
/// step outcome, per the step's consensus type. Pure: monotonicity (late
/// votes not reopening a resolved step) is the state machine's job.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsensusResolver;

impl ConsensusResolver {
    /// `latest` holds the decision that currently counts per approver;
    /// `required` is the step's effective approver set. Decisions from
    /// identities outside `required` are ignored.
    pub fn resolve(
        &self,
        latest: &BTreeMap<ApproverId, Decision>,
        step: &ChainStep,
        required: &[ApproverId],
    ) -> StepResolution {
        let counted: Vec<&Decision> = required
            .iter()
            .filter_map(|approver| latest.get(approver))
            .collect();

        if counted.is_empty() {
            return StepResolution::unresolved();
        }

        match step.consensus {
            ConsensusType::Unanimous => resolve_unanimous(&counted, required.len()),
            ConsensusType::Majority => resolve_majority(&counted, required.len()),
            ConsensusType::Weighted => resolve_weighted(&counted, step, required),
            ConsensusType::Any => resolve_any(&counted),
        }
    }
}

/// Any reject or request-changes vetoes immediately; approval waits for
/// every required approver.
fn resolve_unanimous(counted: &[&Decision], required: usize) -> StepResolution {
    if counted.iter().any(|decision| decision.outcome == DecisionOutcome::Reject) {
        return StepResolution::resolved(DecisionOutcome::Reject);
    }
    if counted.iter().any(|decision| decision.outcome == DecisionOutcome::RequestChanges) {
        return StepResolution::resolved(DecisionOutcome::RequestChanges);
    }
    if counted.len() == required
        && counted.iter().all(|decision| decision.outcome == DecisionOutcome::Approve)
    {
        return StepResolution::resolved(DecisionOutcome::Approve);
    }
    StepResolution::unresolved()
}

fn resolve_majority(counted: &[&Decision], required: usize) -> StepResolution {
    let needed = required.div_ceil(2);
    for outcome in PRIORITY {
        let votes = counted.iter().filter(|decision| decision.outcome == outcome).count();
        if votes >= needed {
            return StepResolution::resolved(outcome);
        }
    }
    StepResolution::unresolved()
}

/// A category resolves when its accumulated weight strictly exceeds half
/// the total weight of the effective approver set. Integer
/// cross-multiplication avoids fractional thresholds.
fn resolve_weighted(
    counted: &[&Decision],
    step: &ChainStep,
    required: &[ApproverId],
) -> StepResolution {
    let total: u64 = required.iter().map(|approver| u64::from(step.weight_of(approver))).sum();
    if total == 0 {
        return StepResolution::unresolved();
    }

    for outcome in PRIORITY {
        let accumulated: u64 = counted
            .iter()
            .filter(|decision| decision.outcome == outcome)
            .map(|decision| u64::from(step.weight_of(&decision.approver_id)))
            .sum();
        if accumulated * 2 > total {
            return StepResolution::resolved(outcome);
        }
    }
    StepResolution::unresolved()
}

/// First decision wins. Decisions arrive serialized per request, so the
/// earliest timestamp is the first applied; the priority order only
/// breaks exact timestamp ties.
fn resolve_any(counted: &[&Decision]) -> StepResolution {
    counted
        .iter()
        .min_by_key(|decision| (decision.decided_at, priority_rank(decision.outcome)))
        .map(|decision| StepResolution::resolved(decision.outcome))
        .unwrap_or_else(StepResolution::unresolved)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{DateTime, Duration, Utc};

    use super::{ConsensusResolver, StepResolution};
    use crate::domain::chain::{ApproverId, ChainStep, ConsensusType};
    use crate::domain::request::{Decision, DecisionOutcome, RequestId};

    fn step(consensus: ConsensusType, approvers: &[&str]) -> ChainStep {
        ChainStep {
            number: 1,
            name: "review".to_string(),
            approver_ids: approvers.iter().map(|id| ApproverId(id.to_string())).collect(),
            parallel: true,
            consensus,
            weights: BTreeMap::new(),
            timeout_days: None,
            escalation_chain: Vec::new(),
            is_optional: false,
        }
    }

    fn decision(
        approver: &str,
        outcome: DecisionOutcome,
        at: DateTime<Utc>,
    ) -> (ApproverId, Decision) {
        let approver = ApproverId(approver.to_string());
        (
            approver.clone(),
            Decision {
                request_id: RequestId("req-1".to_string()),
                step_number: 1,
                approver_id: approver,
                outcome,
                comment: None,
                decided_at: at,
            },
        )
    }

    fn decisions(
        entries: &[(&str, DecisionOutcome, i64)],
    ) -> BTreeMap<ApproverId, Decision> {
        let base = Utc::now();
        entries
            .iter()
            .map(|(approver, outcome, offset)| {
                decision(approver, *outcome, base + Duration::seconds(*offset))
            })
            .collect()
    }

    fn required(step: &ChainStep) -> Vec<ApproverId> {
        step.approver_ids.clone()
    }

    #[test]
    fn unanimous_single_reject_vetoes_despite_other_approvals() {
        let step = step(ConsensusType::Unanimous, &["a", "b", "c"]);
        let latest = decisions(&[
            ("a", DecisionOutcome::Approve, 0),
            ("b", DecisionOutcome::Approve, 1),
            ("c", DecisionOutcome::Reject, 2),
        ]);

        let resolution = ConsensusResolver.resolve(&latest, &step, &required(&step));
        assert_eq!(resolution, StepResolution::resolved(DecisionOutcome::Reject));
    }

    #[test]
    fn unanimous_prefers_reject_over_request_changes() {
        let step = step(ConsensusType::Unanimous, &["a", "b"]);
        let latest = decisions(&[
            ("a", DecisionOutcome::RequestChanges, 0),
            ("b", DecisionOutcome::Reject, 1),
        ]);

        let resolution = ConsensusResolver.resolve(&latest, &step, &required(&step));
        assert_eq!(resolution, StepResolution::resolved(DecisionOutcome::Reject));
    }

    #[test]
    fn unanimous_does_not_approve_until_every_approver_has_decided() {
        let step = step(ConsensusType::Unanimous, &["a", "b", "c"]);
        let partial = decisions(&[
            ("a", DecisionOutcome::Approve, 0),
            ("b", DecisionOutcome::Approve, 1),
        ]);

        assert_eq!(
            ConsensusResolver.resolve(&partial, &step, &required(&step)),
            StepResolution::unresolved()
        );

        let complete = decisions(&[
            ("a", DecisionOutcome::Approve, 0),
            ("b", DecisionOutcome::Approve, 1),
            ("c", DecisionOutcome::Approve, 2),
        ]);
        assert_eq!(
            ConsensusResolver.resolve(&complete, &step, &required(&step)),
            StepResolution::resolved(DecisionOutcome::Approve)
        );
    }

    #[test]
    fn majority_of_five_resolves_on_the_third_approval() {
        let step = step(ConsensusType::Majority, &["a", "b", "c", "d", "e"]);
        let latest = decisions(&[
            ("a", DecisionOutcome::Approve, 0),
            ("b", DecisionOutcome::Approve, 1),
            ("c", DecisionOutcome::Approve, 2),
        ]);

        let resolution = ConsensusResolver.resolve(&latest, &step, &required(&step));
        assert_eq!(resolution, StepResolution::resolved(DecisionOutcome::Approve));
    }

    #[test]
    fn majority_split_stays_unresolved_until_a_category_reaches_threshold() {
        let step = step(ConsensusType::Majority, &["a", "b", "c"]);
        let split = decisions(&[
            ("a", DecisionOutcome::Reject, 0),
            ("b", DecisionOutcome::Approve, 1),
        ]);

        assert_eq!(
            ConsensusResolver.resolve(&split, &step, &required(&step)),
            StepResolution::unresolved()
        );

        let second_reject = decisions(&[
            ("a", DecisionOutcome::Reject, 0),
            ("b", DecisionOutcome::Approve, 1),
            ("c", DecisionOutcome::Reject, 2),
        ]);
        assert_eq!(
            ConsensusResolver.resolve(&second_reject, &step, &required(&step)),
            StepResolution::resolved(DecisionOutcome::Reject)
        );
    }

    #[test]
    fn weighted_requires_strict_majority_of_total_weight() {
        let mut step = step(ConsensusType::Weighted, &["a", "b", "c"]);
        step.weights.insert("a".to_string(), 2);
        // total weight 4, threshold 2: a category needs weight > 2.

        let alone = decisions(&[("a", DecisionOutcome::Approve, 0)]);
        assert_eq!(
            ConsensusResolver.resolve(&alone, &step, &required(&step)),
            StepResolution::unresolved()
        );

        let with_second = decisions(&[
            ("a", DecisionOutcome::Approve, 0),
            ("b", DecisionOutcome::Approve, 1),
        ]);
        assert_eq!(
            ConsensusResolver.resolve(&with_second, &step, &required(&step)),
            StepResolution::resolved(DecisionOutcome::Approve)
        );
    }

    #[test]
    fn any_resolves_on_the_first_decision_received() {
        let step = step(ConsensusType::Any, &["a", "b", "c"]);
        let latest = decisions(&[
            ("b", DecisionOutcome::Reject, 0),
            ("a", DecisionOutcome::Approve, 5),
        ]);

        let resolution = ConsensusResolver.resolve(&latest, &step, &required(&step));
        assert_eq!(resolution, StepResolution::resolved(DecisionOutcome::Reject));
    }

    #[test]
    fn any_breaks_timestamp_ties_by_outcome_priority() {
        let step = step(ConsensusType::Any, &["a", "b"]);
        let latest = decisions(&[
            ("a", DecisionOutcome::Reject, 0),
            ("b", DecisionOutcome::Approve, 0),
        ]);

        let resolution = ConsensusResolver.resolve(&latest, &step, &required(&step));
        assert_eq!(resolution, StepResolution::resolved(DecisionOutcome::Approve));
    }

    #[test]
    fn decisions_from_outside_the_effective_set_are_ignored() {
        let step = step(ConsensusType::Any, &["a"]);
        let latest = decisions(&[("mallory", DecisionOutcome::Reject, 0)]);

        assert_eq!(
            ConsensusResolver.resolve(&latest, &step, &required(&step)),
            StepResolution::unresolved()
        );
    }
}
