/// Position planning for a roadmap's steps.
///
/// Both functions are pure: they take the current slots of one roadmap and return
/// the position changes to write. Callers apply the changes inside one transaction.
///
/// Current order is always `position` ascending, ties broken by `seq` (insertion
/// order), so duplicate positions resolve deterministically.

use std::collections::{HashMap, HashSet};

/// Ordering-relevant view of one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSlot {
    pub step_id: String,
    /// Insertion sequence, the stable secondary key
    pub seq: i64,
    pub position: i64,
}

/// A single position write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionChange {
    pub step_id: String,
    pub from: i64,
    pub to: i64,
}

/// Why a requested order could not be applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReorderRejection {
    /// Ids that do not belong to the roadmap, in request order
    UnknownSteps(Vec<String>),
    /// Ids listed more than once, in request order of first repeat
    DuplicateSteps(Vec<String>),
}

/// Sort slots into their current order
pub fn current_order(slots: &[StepSlot]) -> Vec<&StepSlot> {
    let mut ordered: Vec<&StepSlot> = slots.iter().collect();
    ordered.sort_by_key(|slot| (slot.position, slot.seq));
    ordered
}

/// Plan the renumbering that makes positions exactly 1..N in current order.
///
/// Only slots whose position differs from their target appear in the result, so
/// an already-dense roadmap yields no changes.
pub fn plan_normalization(slots: &[StepSlot]) -> Vec<PositionChange> {
    assign_sequential(current_order(slots))
}

/// Plan a bulk reorder.
///
/// Ids in `order` take positions 1..k in the given order; the roadmap's remaining
/// steps follow at k+1..N in their prior relative order. Unknown or repeated ids
/// reject the whole request.
pub fn plan_reorder(slots: &[StepSlot], order: &[String]) -> Result<Vec<PositionChange>, ReorderRejection> {
    let by_id: HashMap<&str, &StepSlot> = slots.iter().map(|s| (s.step_id.as_str(), s)).collect();

    let unknown: Vec<String> = order
        .iter()
        .filter(|id| !by_id.contains_key(id.as_str()))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(ReorderRejection::UnknownSteps(unknown));
    }

    let mut seen = HashSet::with_capacity(order.len());
    let mut duplicates = Vec::new();
    for id in order {
        if !seen.insert(id.as_str()) && !duplicates.contains(id) {
            duplicates.push(id.clone());
        }
    }
    if !duplicates.is_empty() {
        return Err(ReorderRejection::DuplicateSteps(duplicates));
    }

    let mut sequence: Vec<&StepSlot> = order.iter().map(|id| by_id[id.as_str()]).collect();
    sequence.extend(
        current_order(slots)
            .into_iter()
            .filter(|slot| !seen.contains(slot.step_id.as_str())),
    );

    Ok(assign_sequential(sequence))
}

fn assign_sequential(sequence: Vec<&StepSlot>) -> Vec<PositionChange> {
    sequence
        .into_iter()
        .zip(1i64..)
        .filter(|(slot, target)| slot.position != *target)
        .map(|(slot, target)| PositionChange {
            step_id: slot.step_id.clone(),
            from: slot.position,
            to: target,
        })
        .collect()
}

/// Apply changes to a slot list in memory (used by callers that want the
/// resulting layout without another read)
pub fn apply_changes(slots: &mut [StepSlot], changes: &[PositionChange]) {
    let targets: HashMap<&str, i64> = changes.iter().map(|c| (c.step_id.as_str(), c.to)).collect();
    for slot in slots.iter_mut() {
        if let Some(to) = targets.get(slot.step_id.as_str()) {
            slot.position = *to;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn slots(positions: &[(&str, i64)]) -> Vec<StepSlot> {
        positions
            .iter()
            .enumerate()
            .map(|(i, (id, position))| StepSlot {
                step_id: id.to_string(),
                seq: i as i64 + 1,
                position: *position,
            })
            .collect()
    }

    fn layout(slots: &[StepSlot]) -> Vec<(String, i64)> {
        current_order(slots)
            .into_iter()
            .map(|s| (s.step_id.clone(), s.position))
            .collect()
    }

    #[test]
    fn empty_roadmap_needs_no_writes() {
        assert!(plan_normalization(&[]).is_empty());
    }

    #[test]
    fn single_step_moves_to_one() {
        let mut s = slots(&[("a", 7)]);
        let changes = plan_normalization(&s);
        assert_eq!(
            changes,
            vec![PositionChange { step_id: "a".into(), from: 7, to: 1 }]
        );
        apply_changes(&mut s, &changes);
        assert_eq!(s[0].position, 1);
    }

    #[test]
    fn gap_after_delete_is_closed_in_order() {
        // positions 1..5 with the step at 3 deleted
        let mut s = slots(&[("a", 1), ("b", 2), ("d", 4), ("e", 5)]);
        let changes = plan_normalization(&s);
        assert_eq!(changes.len(), 2);
        apply_changes(&mut s, &changes);
        assert_eq!(
            layout(&s),
            vec![("a".into(), 1), ("b".into(), 2), ("d".into(), 3), ("e".into(), 4)]
        );
    }

    #[test]
    fn duplicates_resolve_by_insertion_order() {
        let mut s = slots(&[("first", 2), ("second", 2), ("zero", 1)]);
        let changes = plan_normalization(&s);
        apply_changes(&mut s, &changes);
        assert_eq!(
            layout(&s),
            vec![("zero".into(), 1), ("first".into(), 2), ("second".into(), 3)]
        );
    }

    #[test]
    fn only_moved_steps_are_written() {
        let s = slots(&[("a", 1), ("b", 2), ("c", 9)]);
        let changes = plan_normalization(&s);
        assert_eq!(
            changes,
            vec![PositionChange { step_id: "c".into(), from: 9, to: 3 }]
        );
    }

    #[test]
    fn reorder_partial_list_appends_the_rest() {
        let mut s = slots(&[("A", 1), ("B", 2), ("C", 3), ("D", 4)]);
        let changes = plan_reorder(&s, &["C".to_string(), "A".to_string()]).unwrap();
        apply_changes(&mut s, &changes);
        assert_eq!(
            layout(&s),
            vec![("C".into(), 1), ("A".into(), 2), ("B".into(), 3), ("D".into(), 4)]
        );
    }

    #[test]
    fn reorder_rejects_foreign_ids_without_changes() {
        let s = slots(&[("A", 1), ("B", 2)]);
        let result = plan_reorder(&s, &["B".to_string(), "X".to_string(), "Y".to_string()]);
        assert_eq!(
            result,
            Err(ReorderRejection::UnknownSteps(vec!["X".into(), "Y".into()]))
        );
    }

    #[test]
    fn reorder_rejects_repeated_ids() {
        let s = slots(&[("A", 1), ("B", 2)]);
        let result = plan_reorder(&s, &["A".to_string(), "B".to_string(), "A".to_string()]);
        assert_eq!(result, Err(ReorderRejection::DuplicateSteps(vec!["A".into()])));
    }

    #[test]
    fn empty_reorder_normalizes_in_prior_order() {
        let mut s = slots(&[("A", 3), ("B", 3), ("C", 10)]);
        let changes = plan_reorder(&s, &[]).unwrap();
        apply_changes(&mut s, &changes);
        assert_eq!(
            layout(&s),
            vec![("A".into(), 1), ("B".into(), 2), ("C".into(), 3)]
        );
    }

    fn arb_slots() -> impl Strategy<Value = Vec<StepSlot>> {
        prop::collection::vec(-5i64..40, 0..30).prop_map(|positions| {
            positions
                .into_iter()
                .enumerate()
                .map(|(i, position)| StepSlot {
                    step_id: format!("step-{i}"),
                    seq: i as i64,
                    position,
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn normalization_yields_dense_positions(mut s in arb_slots()) {
            let changes = plan_normalization(&s);
            apply_changes(&mut s, &changes);
            let mut positions: Vec<i64> = s.iter().map(|slot| slot.position).collect();
            positions.sort_unstable();
            let expected: Vec<i64> = (1..=s.len() as i64).collect();
            prop_assert_eq!(positions, expected);
        }

        #[test]
        fn normalization_preserves_relative_order(s in arb_slots()) {
            let before: Vec<String> = current_order(&s).iter().map(|x| x.step_id.clone()).collect();
            let mut after_slots = s.clone();
            apply_changes(&mut after_slots, &plan_normalization(&s));
            let after: Vec<String> = current_order(&after_slots).iter().map(|x| x.step_id.clone()).collect();
            prop_assert_eq!(before, after);
        }

        #[test]
        fn normalization_is_idempotent(mut s in arb_slots()) {
            let first = plan_normalization(&s);
            apply_changes(&mut s, &first);
            prop_assert!(plan_normalization(&s).is_empty());
        }
    }
}
