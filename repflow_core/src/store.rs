//! Gateway implementations: a JSON database file and an in-memory store.
//!
//! The file store loads the whole database, applies one change and writes it
//! back atomically, holding an exclusive lock on a sidecar `.lock` file for
//! the duration so concurrent processes never interleave updates.

use crate::{
    Error, Exercise, Gateway, PrescribedExercise, Result, Session, SessionSummary, SetRecord,
    StepKey, Workout,
};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Workouts and exercises to import, as read from a JSON file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Library {
    #[serde(default)]
    pub exercises: Vec<Exercise>,
    #[serde(default)]
    pub workouts: Vec<Workout>,
}

impl Library {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// Everything the store persists
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Database {
    #[serde(default)]
    pub exercises: BTreeMap<String, Exercise>,
    #[serde(default)]
    pub workouts: BTreeMap<String, Workout>,
    #[serde(default)]
    pub sessions: BTreeMap<Uuid, Session>,
    /// `{session}/{block}` pairs that have a block instance
    #[serde(default)]
    pub block_instances: BTreeSet<String>,
    /// Keyed by `{session}/{StepKey::encode}`
    #[serde(default)]
    pub records: BTreeMap<String, SetRecord>,
}

fn record_key(session_id: Uuid, key: &StepKey) -> String {
    format!("{}/{}", session_id, key.encode())
}

impl Database {
    pub fn add_exercise(&mut self, exercise: Exercise) {
        tracing::debug!("Storing exercise {}", exercise.id);
        self.exercises.insert(exercise.id.clone(), exercise);
    }

    /// Store a workout after validating it
    pub fn add_workout(&mut self, workout: Workout) -> Result<()> {
        let errors = workout.validate();
        if !errors.is_empty() {
            return Err(Error::WorkoutValidation(errors.join("; ")));
        }
        tracing::debug!("Storing workout {}", workout.id);
        self.workouts.insert(workout.id.clone(), workout);
        Ok(())
    }

    /// Import a library, returning the number of workouts stored
    pub fn import(&mut self, library: Library) -> Result<usize> {
        for exercise in library.exercises {
            self.add_exercise(exercise);
        }
        let count = library.workouts.len();
        for workout in library.workouts {
            self.add_workout(workout)?;
        }
        Ok(count)
    }

    pub fn exercise_name<'a>(&'a self, exercise_id: &'a str) -> &'a str {
        self.exercises
            .get(exercise_id)
            .map_or(exercise_id, |e| e.name.as_str())
    }

    /// Finished sessions, newest first
    pub fn finished_sessions(&self) -> Vec<&Session> {
        let mut sessions: Vec<_> = self
            .sessions
            .values()
            .filter(|s| s.is_finished())
            .collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        sessions
    }

    pub fn session_records(&self, session_id: Uuid) -> Vec<&SetRecord> {
        self.records
            .values()
            .filter(|r| r.session_id == session_id)
            .collect()
    }

    fn session_mut(&mut self, session_id: Uuid) -> Result<&mut Session> {
        self.sessions
            .get_mut(&session_id)
            .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))
    }

    fn read_workout(&self, workout_id: &str) -> Result<Workout> {
        self.workouts
            .get(workout_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("workout '{}'", workout_id)))
    }

    fn open_session(&mut self, workout_id: &str, started_at: DateTime<Utc>) -> Result<Session> {
        if !self.workouts.contains_key(workout_id) {
            return Err(Error::NotFound(format!("workout '{}'", workout_id)));
        }

        let existing = self
            .sessions
            .values()
            .filter(|s| !s.is_finished() && s.workout_id.as_deref() == Some(workout_id))
            .max_by_key(|s| s.started_at);

        if let Some(session) = existing {
            tracing::info!("Resuming session {} for workout {}", session.id, workout_id);
            return Ok(session.clone());
        }

        let session = Session::new(workout_id, started_at);
        tracing::info!("Created session {} for workout {}", session.id, workout_id);
        self.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    fn read_records(&self, session_id: Uuid, block_id: &str) -> Vec<SetRecord> {
        self.records
            .values()
            .filter(|r| r.session_id == session_id && r.block_id == block_id)
            .cloned()
            .collect()
    }

    fn ensure_block_instance(&mut self, session_id: Uuid, workout_id: &str, block_id: &str) -> Result<()> {
        let workout = self.read_workout(workout_id)?;
        if workout.block(block_id).is_none() {
            return Err(Error::NotFound(format!(
                "block '{}' in workout '{}'",
                block_id, workout_id
            )));
        }
        self.session_mut(session_id)?;
        self.block_instances
            .insert(format!("{}/{}", session_id, block_id));
        Ok(())
    }

    fn upsert_record(&mut self, record: &SetRecord) -> Result<()> {
        if !self.sessions.contains_key(&record.session_id) {
            return Err(Error::NotFound(format!("session {}", record.session_id)));
        }
        let instance = format!("{}/{}", record.session_id, record.block_id);
        if !self.block_instances.contains(&instance) {
            return Err(Error::Persistence(format!(
                "no block instance for {}",
                instance
            )));
        }
        self.records
            .insert(record_key(record.session_id, &record.key()), record.clone());
        Ok(())
    }

    fn save_progress(&mut self, session_id: Uuid, elapsed_seconds: i64) -> Result<()> {
        let session = self.session_mut(session_id)?;
        session.elapsed_seconds = session.elapsed_seconds.max(elapsed_seconds);
        Ok(())
    }

    fn finalize_session(
        &mut self,
        session_id: Uuid,
        completed: bool,
        summary: &SessionSummary,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        let session = self.session_mut(session_id)?;
        session.completed = completed;
        session.elapsed_seconds = summary.duration_seconds;
        session.summary = Some(summary.clone());
        session.finished_at = Some(finished_at);
        Ok(())
    }

    fn swap_exercise(
        &mut self,
        workout_id: &str,
        block_id: &str,
        slot: u32,
        exercise_id: &str,
    ) -> Result<Vec<PrescribedExercise>> {
        let replacement = self
            .exercises
            .get(exercise_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("exercise '{}'", exercise_id)))?;

        let workout = self
            .workouts
            .get_mut(workout_id)
            .ok_or_else(|| Error::NotFound(format!("workout '{}'", workout_id)))?;
        let block = workout
            .blocks
            .iter_mut()
            .find(|b| b.id == block_id)
            .ok_or_else(|| Error::NotFound(format!("block '{}'", block_id)))?;

        if block
            .exercises
            .iter()
            .any(|e| e.exercise_id == exercise_id && e.position != slot)
        {
            return Err(Error::Swap(format!(
                "exercise '{}' is already in block '{}'",
                exercise_id, block_id
            )));
        }

        let prescribed = block
            .exercises
            .iter_mut()
            .find(|e| e.position == slot)
            .ok_or_else(|| Error::NotFound(format!("slot {} in block '{}'", slot, block_id)))?;

        prescribed.exercise_id = replacement.id.clone();
        if let Some(sets) = replacement.default_sets.filter(|s| *s > 0) {
            prescribed.sets = sets;
        }
        if let Some(target) = replacement.default_target {
            prescribed.target = target;
        }

        Ok(block.exercises.clone())
    }
}

// ============================================================================
// File-backed store
// ============================================================================

/// JSON database file with advisory locking
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    /// Load the database with a shared lock
    ///
    /// A missing file is an empty database. A corrupted file is an error,
    /// since saving over it would lose every stored session.
    pub fn load(&self) -> Result<Database> {
        if !self.path.exists() {
            tracing::debug!("No database at {:?}, starting empty", self.path);
            return Ok(Database::default());
        }

        let file = File::open(&self.path)?;
        file.lock_shared()?;

        let mut contents = String::new();
        let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
        file.unlock()?;
        read?;

        let db = serde_json::from_str(&contents)?;
        tracing::debug!("Loaded database from {:?}", self.path);
        Ok(db)
    }

    /// Atomically replace the database file
    fn save(&self, db: &Database) -> Result<()> {
        let parent = self.path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "database path missing parent")
        })?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            serde_json::to_writer(&mut writer, db)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved database to {:?}", self.path);
        Ok(())
    }

    /// Load, modify and save under an exclusive lock
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Database) -> Result<T>,
    {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())?;
        lock.lock_exclusive()?;

        let result = self.load().and_then(|mut db| {
            let value = f(&mut db)?;
            self.save(&db)?;
            Ok(value)
        });

        lock.unlock()?;
        result
    }
}

impl Gateway for FileStore {
    fn read_workout(&self, workout_id: &str) -> Result<Workout> {
        self.load()?.read_workout(workout_id)
    }

    fn open_session(&mut self, workout_id: &str, started_at: DateTime<Utc>) -> Result<Session> {
        self.update(|db| db.open_session(workout_id, started_at))
    }

    fn read_records(&self, session_id: Uuid, block_id: &str) -> Result<Vec<SetRecord>> {
        Ok(self.load()?.read_records(session_id, block_id))
    }

    fn ensure_block_instance(&mut self, session_id: Uuid, workout_id: &str, block_id: &str) -> Result<()> {
        self.update(|db| db.ensure_block_instance(session_id, workout_id, block_id))
    }

    fn upsert_record(&mut self, record: &SetRecord) -> Result<()> {
        self.update(|db| db.upsert_record(record))
    }

    fn save_progress(&mut self, session_id: Uuid, elapsed_seconds: i64) -> Result<()> {
        self.update(|db| db.save_progress(session_id, elapsed_seconds))
    }

    fn finalize_session(
        &mut self,
        session_id: Uuid,
        completed: bool,
        summary: &SessionSummary,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        self.update(|db| db.finalize_session(session_id, completed, summary, finished_at))
    }

    fn swap_exercise(
        &mut self,
        workout_id: &str,
        block_id: &str,
        slot: u32,
        exercise_id: &str,
    ) -> Result<Vec<PrescribedExercise>> {
        self.update(|db| db.swap_exercise(workout_id, block_id, slot, exercise_id))
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// In-process store with switchable write and swap failures
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    pub db: Database,
    pub fail_writes: bool,
    pub fail_swaps: bool,
    /// Number of successful `upsert_record` calls
    pub upserts: usize,
}

impl MemoryStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            ..Default::default()
        }
    }

    fn check_writes(&self) -> Result<()> {
        if self.fail_writes {
            return Err(Error::Persistence("store is unavailable".into()));
        }
        Ok(())
    }
}

impl Gateway for MemoryStore {
    fn read_workout(&self, workout_id: &str) -> Result<Workout> {
        self.db.read_workout(workout_id)
    }

    fn open_session(&mut self, workout_id: &str, started_at: DateTime<Utc>) -> Result<Session> {
        self.db.open_session(workout_id, started_at)
    }

    fn read_records(&self, session_id: Uuid, block_id: &str) -> Result<Vec<SetRecord>> {
        Ok(self.db.read_records(session_id, block_id))
    }

    fn ensure_block_instance(&mut self, session_id: Uuid, workout_id: &str, block_id: &str) -> Result<()> {
        self.check_writes()?;
        self.db.ensure_block_instance(session_id, workout_id, block_id)
    }

    fn upsert_record(&mut self, record: &SetRecord) -> Result<()> {
        self.check_writes()?;
        self.db.upsert_record(record)?;
        self.upserts += 1;
        Ok(())
    }

    fn save_progress(&mut self, session_id: Uuid, elapsed_seconds: i64) -> Result<()> {
        self.check_writes()?;
        self.db.save_progress(session_id, elapsed_seconds)
    }

    fn finalize_session(
        &mut self,
        session_id: Uuid,
        completed: bool,
        summary: &SessionSummary,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        self.check_writes()?;
        self.db
            .finalize_session(session_id, completed, summary, finished_at)
    }

    fn swap_exercise(
        &mut self,
        workout_id: &str,
        block_id: &str,
        slot: u32,
        exercise_id: &str,
    ) -> Result<Vec<PrescribedExercise>> {
        if self.fail_swaps {
            return Err(Error::Persistence("swap rejected by store".into()));
        }
        self.db.swap_exercise(workout_id, block_id, slot, exercise_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Block, Measurements};

    fn workout() -> Workout {
        Workout {
            id: "legs".into(),
            name: "Leg Day".into(),
            blocks: vec![Block {
                id: "main".into(),
                position: 0,
                circuit: false,
                exercises: vec![
                    PrescribedExercise {
                        id: "p1".into(),
                        exercise_id: "squat".into(),
                        position: 0,
                        sets: 3,
                        target: Measurements::default(),
                        rest_seconds: Some(120),
                    },
                    PrescribedExercise {
                        id: "p2".into(),
                        exercise_id: "lunge".into(),
                        position: 1,
                        sets: 3,
                        target: Measurements::default(),
                        rest_seconds: None,
                    },
                ],
            }],
        }
    }

    fn database() -> Database {
        let mut db = Database::default();
        db.add_workout(workout()).unwrap();
        db.add_exercise(Exercise {
            id: "split_squat".into(),
            name: "Bulgarian Split Squat".into(),
            default_sets: Some(2),
            default_target: None,
        });
        db
    }

    fn record(session_id: Uuid, set_index: u32, reps: u32) -> SetRecord {
        SetRecord {
            session_id,
            block_id: "main".into(),
            exercise_id: "squat".into(),
            set_index,
            measurements: Measurements {
                reps: Some(reps),
                ..Default::default()
            },
            completed: true,
            note: String::new(),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_open_session_resumes_unfinished() {
        let mut db = database();
        let first = db.open_session("legs", Utc::now()).unwrap();
        let again = db.open_session("legs", Utc::now()).unwrap();
        assert_eq!(first.id, again.id);

        db.finalize_session(first.id, true, &SessionSummary::default(), Utc::now())
            .unwrap();
        let fresh = db.open_session("legs", Utc::now()).unwrap();
        assert_ne!(fresh.id, first.id);
    }

    #[test]
    fn test_upsert_never_duplicates() {
        let mut store = MemoryStore::new(database());
        let session = store.open_session("legs", Utc::now()).unwrap();
        store
            .ensure_block_instance(session.id, "legs", "main")
            .unwrap();

        store.upsert_record(&record(session.id, 0, 5)).unwrap();
        store.upsert_record(&record(session.id, 0, 6)).unwrap();
        store.upsert_record(&record(session.id, 1, 5)).unwrap();

        let records = store.read_records(session.id, "main").unwrap();
        assert_eq!(records.len(), 2);
        let first = records.iter().find(|r| r.set_index == 0).unwrap();
        assert_eq!(first.measurements.reps, Some(6));
    }

    #[test]
    fn test_upsert_requires_block_instance() {
        let mut store = MemoryStore::new(database());
        let session = store.open_session("legs", Utc::now()).unwrap();
        let result = store.upsert_record(&record(session.id, 0, 5));
        assert!(matches!(result, Err(Error::Persistence(_))));
    }

    #[test]
    fn test_swap_applies_library_defaults() {
        let mut db = database();
        let exercises = db
            .swap_exercise("legs", "main", 0, "split_squat")
            .unwrap();

        assert_eq!(exercises[0].exercise_id, "split_squat");
        assert_eq!(exercises[0].sets, 2);
        assert_eq!(exercises[0].rest_seconds, Some(120));
        assert_eq!(db.workouts["legs"].blocks[0].exercises[0].exercise_id, "split_squat");
    }

    #[test]
    fn test_swap_rejects_duplicate_and_unknown() {
        let mut db = database();
        db.add_exercise(Exercise {
            id: "lunge".into(),
            name: "Lunge".into(),
            default_sets: None,
            default_target: None,
        });

        assert!(matches!(
            db.swap_exercise("legs", "main", 0, "lunge"),
            Err(Error::Swap(_))
        ));
        assert!(matches!(
            db.swap_exercise("legs", "main", 0, "nope"),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            db.swap_exercise("legs", "main", 7, "split_squat"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_add_workout_validates() {
        let mut db = Database::default();
        let mut bad = workout();
        bad.blocks[0].exercises[1].exercise_id = "squat".into();
        assert!(matches!(
            db.add_workout(bad),
            Err(Error::WorkoutValidation(_))
        ));
        assert!(db.workouts.is_empty());
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("repflow.json");

        let mut store = FileStore::new(&path);
        store.update(|db| db.add_workout(workout())).unwrap();
        let session = store.open_session("legs", Utc::now()).unwrap();
        store
            .ensure_block_instance(session.id, "legs", "main")
            .unwrap();
        store.upsert_record(&record(session.id, 2, 8)).unwrap();
        store.save_progress(session.id, 95).unwrap();

        let reopened = FileStore::new(&path);
        let records = reopened.read_records(session.id, "main").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].set_index, 2);

        let db = reopened.load().unwrap();
        assert_eq!(db.sessions[&session.id].elapsed_seconds, 95);
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(temp_dir.path().join("none.json"));
        assert!(store.load().unwrap().workouts.is_empty());
        assert!(matches!(
            store.read_workout("legs"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_file_store_corruption_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("repflow.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = FileStore::new(&path);
        assert!(matches!(store.load(), Err(Error::Json(_))));
        // A failed update must not overwrite the file
        assert!(store.update(|db| db.add_workout(workout())).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_library_import() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("library.json");
        let library = Library {
            exercises: vec![Exercise {
                id: "squat".into(),
                name: "Back Squat".into(),
                default_sets: None,
                default_target: None,
            }],
            workouts: vec![workout()],
        };
        std::fs::write(&path, serde_json::to_string(&library).unwrap()).unwrap();

        let mut db = Database::default();
        let count = db.import(Library::load(&path).unwrap()).unwrap();
        assert_eq!(count, 1);
        assert_eq!(db.exercise_name("squat"), "Back Squat");
        assert_eq!(db.exercise_name("lunge"), "lunge");
    }
}
