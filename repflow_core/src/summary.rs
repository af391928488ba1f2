//! Summary metrics written when a session is finalized.

use crate::{SessionSummary, SetRecord};

/// Standard gravity, m/s²
const GRAVITY: f64 = 9.806_65;

/// Joules per dietary kilocalorie
const JOULES_PER_KCAL: f64 = 4184.0;

/// Summarize the completed records of a session
///
/// - volume: reps × load (kg); a load logged without reps counts as one rep
/// - work: reps × load × g × height for sets with a height, plus calories
/// - average power: work over the session duration
pub fn summarize<'a>(records: impl IntoIterator<Item = &'a SetRecord>, duration_seconds: i64) -> SessionSummary {
    let mut volume_kg = 0.0;
    let mut work_joules = 0.0;

    for record in records.into_iter().filter(|r| r.completed) {
        let m = &record.measurements;
        let reps = f64::from(m.reps.unwrap_or(1));

        if let Some(load) = m.load {
            let kg = load.unit.to_kilograms(load.value);
            volume_kg += reps * kg;

            if let Some(height) = m.height {
                work_joules += reps * kg * GRAVITY * height.unit.to_meters(height.value);
            }
        }

        if let Some(calories) = m.calories {
            work_joules += calories * JOULES_PER_KCAL;
        }
    }

    let average_power_watts = if duration_seconds > 0 {
        work_joules / duration_seconds as f64
    } else {
        0.0
    };

    SessionSummary {
        duration_seconds,
        volume_kg,
        work_joules,
        average_power_watts,
    }
}
