//! CSV export of finished sessions.

use crate::{Result, Session};
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct HistoryRow {
    pub id: String,
    pub workout_id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub completed: bool,
    pub duration: i64,
    pub volume_kg: f64,
    pub work_joules: f64,
    pub average_power_watts: f64,
}

impl From<&Session> for HistoryRow {
    fn from(session: &Session) -> Self {
        let summary = session.summary.clone().unwrap_or_default();
        HistoryRow {
            id: session.id.to_string(),
            workout_id: session.workout_id.clone().unwrap_or_default(),
            started_at: session.started_at.to_rfc3339(),
            finished_at: session.finished_at.map(|t| t.to_rfc3339()),
            completed: session.completed,
            duration: summary.duration_seconds,
            volume_kg: summary.volume_kg,
            work_joules: summary.work_joules,
            average_power_watts: summary.average_power_watts,
        }
    }
}

/// Write sessions to `csv_path`, replacing any previous export
///
/// Returns the number of rows written.
pub fn export_csv<'a>(sessions: impl IntoIterator<Item = &'a Session>, csv_path: &Path) -> Result<usize> {
    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(csv_path)?;
    let mut count = 0;
    for session in sessions {
        writer.serialize(HistoryRow::from(session))?;
        count += 1;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    file.sync_all()?;

    tracing::info!("Exported {} sessions to {:?}", count, csv_path);
    Ok(count)
}
