//! Input defaults for the step about to be performed.
//!
//! Precedence, lowest first:
//! 1. the prescribed target for the step
//! 2. the saved record of the previous step, when it is the same exercise in
//!    the same block (carry-forward of load/reps from the set just done)
//! 3. the step's own saved record, when revisiting it

use crate::resume::RecordIndex;
use crate::{Measurements, Step};

/// Where the pre-filled values came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DefaultsSource {
    Target,
    CarriedForward,
    Saved,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InputDefaults {
    pub measurements: Measurements,
    pub note: String,
    pub source: DefaultsSource,
}

/// Resolve defaults for `steps[index]`
///
/// Returns `None` when `index` is out of range.
pub fn resolve_defaults(steps: &[Step], index: usize, records: &RecordIndex) -> Option<InputDefaults> {
    let step = steps.get(index)?;

    let mut defaults = InputDefaults {
        measurements: step.exercise.target.clone(),
        note: String::new(),
        source: DefaultsSource::Target,
    };

    let previous = index
        .checked_sub(1)
        .and_then(|i| steps.get(i))
        .filter(|prev| {
            prev.block.id == step.block.id && prev.exercise.exercise_id == step.exercise.exercise_id
        });

    if let Some(record) = previous.and_then(|prev| records.get(&prev.key())) {
        defaults.measurements.overlay(&record.measurements);
        defaults.source = DefaultsSource::CarriedForward;
    }

    if let Some(own) = records.get(&step.key()) {
        defaults.measurements = own.measurements.clone();
        defaults.note = own.note.clone();
        defaults.source = DefaultsSource::Saved;
    }

    Some(defaults)
}
