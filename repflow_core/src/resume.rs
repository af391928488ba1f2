//! Resume locator.
//!
//! Finds where an interrupted session should pick up, given the records
//! already saved for it.

use crate::{Error, Result, SetRecord, Step, StepKey};
use std::collections::HashMap;

/// Saved set records for one session, keyed by step
pub type RecordIndex = HashMap<StepKey, SetRecord>;

/// Build an index from a flat list of records
///
/// A later record for the same step replaces an earlier one.
pub fn index_records(records: impl IntoIterator<Item = SetRecord>) -> RecordIndex {
    records.into_iter().map(|r| (r.key(), r)).collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResumePoint {
    /// Index of the first step that still needs doing
    At(usize),
    /// Every step has a completed record
    Complete,
}

/// Locate the first step with no record, or with an incomplete record
///
/// Fails with `EmptyWorkout` when there are no steps at all.
pub fn locate_resume(workout_id: &str, steps: &[Step], records: &RecordIndex) -> Result<ResumePoint> {
    if steps.is_empty() {
        return Err(Error::EmptyWorkout(workout_id.to_string()));
    }

    let point = steps
        .iter()
        .position(|step| {
            records
                .get(&step.key())
                .map_or(true, |record| !record.completed)
        })
        .map_or(ResumePoint::Complete, ResumePoint::At);

    tracing::debug!("Resume point for workout {}: {:?}", workout_id, point);
    Ok(point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::plan_block;
    use crate::planner::tests::{block, exercise};
    use crate::Measurements;
    use chrono::Utc;
    use uuid::Uuid;

    fn record(step: &Step, completed: bool) -> SetRecord {
        SetRecord {
            session_id: Uuid::nil(),
            block_id: step.block.id.clone(),
            exercise_id: step.exercise.exercise_id.clone(),
            set_index: step.set_index,
            measurements: Measurements::default(),
            completed,
            note: String::new(),
            recorded_at: Utc::now(),
        }
    }

    fn five_steps() -> Vec<Step> {
        plan_block(&block("b", 0, false, vec![exercise("A", 0, 3), exercise("B", 1, 2)]))
    }

    #[test]
    fn test_resumes_at_first_missing_record() {
        let steps = five_steps();
        let records = index_records(steps[..3].iter().map(|s| record(s, true)));

        assert_eq!(
            locate_resume("w", &steps, &records).unwrap(),
            ResumePoint::At(3)
        );
    }

    #[test]
    fn test_all_complete_is_terminal() {
        let steps = five_steps();
        let records = index_records(steps.iter().map(|s| record(s, true)));

        assert_eq!(
            locate_resume("w", &steps, &records).unwrap(),
            ResumePoint::Complete
        );
    }

    #[test]
    fn test_incomplete_record_counts_as_not_done() {
        let steps = five_steps();
        let mut records = index_records(steps.iter().map(|s| record(s, true)));
        records.insert(steps[1].key(), record(&steps[1], false));

        assert_eq!(
            locate_resume("w", &steps, &records).unwrap(),
            ResumePoint::At(1)
        );
    }

    #[test]
    fn test_no_records_starts_at_zero() {
        assert_eq!(
            locate_resume("w", &five_steps(), &RecordIndex::new()).unwrap(),
            ResumePoint::At(0)
        );
    }

    #[test]
    fn test_empty_plan_is_an_error() {
        let result = locate_resume("w", &[], &RecordIndex::new());
        assert!(matches!(result, Err(Error::EmptyWorkout(id)) if id == "w"));
    }
}
