use crate::classify::DelayDraft;
use std::collections::HashSet;

/// The writes one reconciliation pass will issue, computed in full before any
/// of them run. Applying the plan is a single transaction; a failure leaves
/// the table exactly as the previous cycle wrote it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReconcilePlan {
    /// Newly stalled trips, inserted with idle_minutes = 1.
    pub inserts: Vec<DelayDraft>,
    /// Trips stalled last cycle and still stalled: idle_minutes += 1.
    pub increments: Vec<String>,
    /// Tracked trips that did not come back stalled: flagged not-idle and
    /// removed in the same pass.
    pub deletes: Vec<String>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.increments.is_empty() && self.deletes.is_empty()
    }

    /// Trips stalled this cycle, tracked or new.
    pub fn stalled_count(&self) -> usize {
        self.inserts.len() + self.increments.len()
    }
}

/// Diff this cycle's stalled set against the persisted table keys.
///
/// Each tracked trip lands in exactly one bucket, so a plan applied once
/// increments a continuing trip's idle counter exactly once. Duplicate drafts
/// for the same trip collapse to the first occurrence.
pub fn plan_reconciliation(tracked: &[String], stalled: Vec<DelayDraft>) -> ReconcilePlan {
    let tracked_ids: HashSet<&str> = tracked.iter().map(String::as_str).collect();

    let mut plan = ReconcilePlan::default();
    let mut seen: HashSet<String> = HashSet::new();
    for draft in stalled {
        if !seen.insert(draft.trip_id.clone()) {
            continue;
        }
        if tracked_ids.contains(draft.trip_id.as_str()) {
            plan.increments.push(draft.trip_id);
        } else {
            plan.inserts.push(draft);
        }
    }

    plan.deletes = tracked
        .iter()
        .filter(|id| !seen.contains(*id))
        .cloned()
        .collect();

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn draft(trip_id: &str) -> DelayDraft {
        DelayDraft {
            trip_id: trip_id.to_string(),
            route_name: Some("North Shore Line".to_string()),
            trip_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            trip_end: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
            map_link: None,
        }
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn new_stalled_trip_becomes_an_insert() {
        let plan = plan_reconciliation(&[], vec![draft("T100")]);

        assert_eq!(plan.inserts.len(), 1);
        assert_eq!(plan.inserts[0].trip_id, "T100");
        assert!(plan.increments.is_empty());
        assert!(plan.deletes.is_empty());
    }

    #[test]
    fn tracked_and_still_stalled_becomes_an_increment() {
        let plan = plan_reconciliation(&ids(&["T100"]), vec![draft("T100")]);

        assert!(plan.inserts.is_empty());
        assert_eq!(plan.increments, ids(&["T100"]));
        assert!(plan.deletes.is_empty());
    }

    #[test]
    fn tracked_but_absent_is_deleted() {
        let plan = plan_reconciliation(&ids(&["T100", "T200"]), vec![draft("T200")]);

        assert!(plan.inserts.is_empty());
        assert_eq!(plan.increments, ids(&["T200"]));
        assert_eq!(plan.deletes, ids(&["T100"]));
    }

    #[test]
    fn identical_inputs_plan_one_increment_per_pass() {
        let first = plan_reconciliation(&ids(&["T100"]), vec![draft("T100")]);
        let second = plan_reconciliation(&ids(&["T100"]), vec![draft("T100")]);

        // each pass carries exactly one increment for the trip; running the
        // planner again does not compound the counter
        assert_eq!(first, second);
        assert_eq!(first.increments.len(), 1);
    }

    #[test]
    fn duplicate_drafts_collapse_to_first_occurrence() {
        let plan = plan_reconciliation(&[], vec![draft("T100"), draft("T100")]);

        assert_eq!(plan.inserts.len(), 1);
    }

    #[test]
    fn empty_inputs_plan_nothing() {
        let plan = plan_reconciliation(&[], Vec::new());
        assert!(plan.is_empty());
        assert_eq!(plan.stalled_count(), 0);
    }
}
