//! Core domain types for Repflow.
//!
//! This module defines the fundamental types used throughout the system:
//! - Measurement units and the measurement bundle logged per set
//! - Exercise library entries and workout prescriptions (blocks, slots)
//! - Sessions, set completion records and their addressing key

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Units
// ============================================================================

/// A unit of measure with a short display symbol
pub trait Unit: Copy {
    fn symbol(&self) -> &'static str;
}

/// External load unit
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadUnit {
    Kg,
    Lb,
}

impl LoadUnit {
    pub fn to_kilograms(self, value: f64) -> f64 {
        match self {
            LoadUnit::Kg => value,
            LoadUnit::Lb => value * 0.453_592_37,
        }
    }
}

impl Unit for LoadUnit {
    fn symbol(&self) -> &'static str {
        match self {
            LoadUnit::Kg => "kg",
            LoadUnit::Lb => "lb",
        }
    }
}

impl FromStr for LoadUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "kg" | "kgs" => Ok(LoadUnit::Kg),
            "lb" | "lbs" => Ok(LoadUnit::Lb),
            other => Err(format!("unknown load unit '{}'", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DistanceUnit {
    Meters,
    Kilometers,
    Miles,
    Yards,
}

impl Unit for DistanceUnit {
    fn symbol(&self) -> &'static str {
        match self {
            DistanceUnit::Meters => "m",
            DistanceUnit::Kilometers => "km",
            DistanceUnit::Miles => "mi",
            DistanceUnit::Yards => "yd",
        }
    }
}

impl FromStr for DistanceUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "m" => Ok(DistanceUnit::Meters),
            "km" => Ok(DistanceUnit::Kilometers),
            "mi" => Ok(DistanceUnit::Miles),
            "yd" => Ok(DistanceUnit::Yards),
            other => Err(format!("unknown distance unit '{}'", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
}

impl Unit for TimeUnit {
    fn symbol(&self) -> &'static str {
        match self {
            TimeUnit::Seconds => "s",
            TimeUnit::Minutes => "min",
            TimeUnit::Hours => "h",
        }
    }
}

impl FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "s" | "sec" => Ok(TimeUnit::Seconds),
            "min" => Ok(TimeUnit::Minutes),
            "h" | "hr" => Ok(TimeUnit::Hours),
            other => Err(format!("unknown time unit '{}'", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HeightUnit {
    Centimeters,
    Inches,
}

impl HeightUnit {
    pub fn to_meters(self, value: f64) -> f64 {
        match self {
            HeightUnit::Centimeters => value / 100.0,
            HeightUnit::Inches => value * 0.0254,
        }
    }
}

impl Unit for HeightUnit {
    fn symbol(&self) -> &'static str {
        match self {
            HeightUnit::Centimeters => "cm",
            HeightUnit::Inches => "in",
        }
    }
}

impl FromStr for HeightUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cm" => Ok(HeightUnit::Centimeters),
            "in" => Ok(HeightUnit::Inches),
            other => Err(format!("unknown height unit '{}'", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaceUnit {
    MinPerKm,
    MinPerMile,
    SecPer500m,
}

impl Unit for PaceUnit {
    fn symbol(&self) -> &'static str {
        match self {
            PaceUnit::MinPerKm => "min/km",
            PaceUnit::MinPerMile => "min/mi",
            PaceUnit::SecPer500m => "s/500m",
        }
    }
}

impl FromStr for PaceUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "min/km" => Ok(PaceUnit::MinPerKm),
            "min/mi" => Ok(PaceUnit::MinPerMile),
            "s/500m" => Ok(PaceUnit::SecPer500m),
            other => Err(format!("unknown pace unit '{}'", other)),
        }
    }
}

/// A value paired with its unit
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Quantity<U> {
    pub value: f64,
    pub unit: U,
}

impl<U> Quantity<U> {
    pub fn new(value: f64, unit: U) -> Self {
        Self { value, unit }
    }
}

impl<U: Unit> fmt::Display for Quantity<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.symbol())
    }
}

// ============================================================================
// Measurements
// ============================================================================

/// The measurement bundle prescribed for, or performed in, a single set
///
/// Every field is optional; a prescription uses whichever combination makes
/// sense for the exercise (reps + load, distance + duration, calories...).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Measurements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load: Option<Quantity<LoadUnit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<Quantity<DistanceUnit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Quantity<TimeUnit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pace: Option<Quantity<PaceUnit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<Quantity<HeightUnit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories: Option<f64>,
}

impl Measurements {
    /// Override each field that is present in `other`, keeping the rest
    pub fn overlay(&mut self, other: &Measurements) {
        if other.reps.is_some() {
            self.reps = other.reps;
        }
        if other.load.is_some() {
            self.load = other.load;
        }
        if other.distance.is_some() {
            self.distance = other.distance;
        }
        if other.duration.is_some() {
            self.duration = other.duration;
        }
        if other.pace.is_some() {
            self.pace = other.pace;
        }
        if other.height.is_some() {
            self.height = other.height;
        }
        if other.calories.is_some() {
            self.calories = other.calories;
        }
    }
}

impl fmt::Display for Measurements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(reps) = self.reps {
            parts.push(format!("{} reps", reps));
        }
        if let Some(load) = self.load {
            parts.push(format!("@ {}", load));
        }
        if let Some(distance) = self.distance {
            parts.push(distance.to_string());
        }
        if let Some(duration) = self.duration {
            parts.push(duration.to_string());
        }
        if let Some(pace) = self.pace {
            parts.push(pace.to_string());
        }
        if let Some(height) = self.height {
            parts.push(format!("height {}", height));
        }
        if let Some(calories) = self.calories {
            parts.push(format!("{} cal", calories));
        }
        if parts.is_empty() {
            write!(f, "-")
        } else {
            write!(f, "{}", parts.join(" "))
        }
    }
}

// ============================================================================
// Workout Definition Types
// ============================================================================

/// An exercise library entry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Exercise {
    pub id: String,
    pub name: String,
    /// Set count applied when this exercise is swapped into a slot
    #[serde(default)]
    pub default_sets: Option<u32>,
    /// Target applied when this exercise is swapped into a slot
    #[serde(default)]
    pub default_target: Option<Measurements>,
}

/// An exercise occupying one slot of a block, with its prescription
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PrescribedExercise {
    pub id: String,
    pub exercise_id: String,
    /// Slot index within the block
    pub position: u32,
    pub sets: u32,
    #[serde(default)]
    pub target: Measurements,
    #[serde(default)]
    pub rest_seconds: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Block {
    pub id: String,
    pub position: u32,
    #[serde(default)]
    pub circuit: bool,
    pub exercises: Vec<PrescribedExercise>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Workout {
    pub id: String,
    pub name: String,
    pub blocks: Vec<Block>,
}

impl Workout {
    /// Validate the workout definition
    ///
    /// Returns a list of validation errors (empty if valid).
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.id.is_empty() {
            errors.push("Workout has empty ID".to_string());
        }
        if self.name.is_empty() {
            errors.push(format!("Workout '{}' has empty name", self.id));
        }

        let mut block_ids = HashSet::new();
        for block in &self.blocks {
            if !block_ids.insert(block.id.as_str()) {
                errors.push(format!("Duplicate block ID '{}'", block.id));
            }

            let mut exercises = HashSet::new();
            let mut slots = HashSet::new();
            for prescribed in &block.exercises {
                if !exercises.insert(prescribed.exercise_id.as_str()) {
                    errors.push(format!(
                        "Block '{}' lists exercise '{}' more than once",
                        block.id, prescribed.exercise_id
                    ));
                }
                if !slots.insert(prescribed.position) {
                    errors.push(format!(
                        "Block '{}' has two exercises in slot {}",
                        block.id, prescribed.position
                    ));
                }
                if prescribed.sets == 0 {
                    errors.push(format!(
                        "Exercise '{}' in block '{}' has zero sets",
                        prescribed.exercise_id, block.id
                    ));
                }
            }
        }

        errors
    }

    pub fn block(&self, block_id: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == block_id)
    }
}

// ============================================================================
// Session and Record Types
// ============================================================================

/// Summary metrics written when a session is finalized
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub duration_seconds: i64,
    /// Total load moved, in kilograms
    pub volume_kg: f64,
    /// Mechanical plus metabolic work, in joules
    pub work_joules: f64,
    pub average_power_watts: f64,
}

/// One attempt at a workout
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub workout_id: Option<String>,
    pub started_at: DateTime<Utc>,
    /// Last checkpointed elapsed time, used to re-sync the clock on resume
    #[serde(default)]
    pub elapsed_seconds: i64,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub summary: Option<SessionSummary>,
}

impl Session {
    pub fn new(workout_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            workout_id: Some(workout_id.into()),
            started_at,
            elapsed_seconds: 0,
            completed: false,
            finished_at: None,
            summary: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// The workout this session belongs to
    ///
    /// Block and exercise persistence requires this association.
    pub fn require_workout(&self) -> crate::Result<&str> {
        self.workout_id
            .as_deref()
            .ok_or(crate::Error::MissingWorkout(self.id))
    }
}

/// Addresses one step: (block, exercise, zero-based set index)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepKey {
    pub block_id: String,
    pub exercise_id: String,
    pub set_index: u32,
}

impl StepKey {
    pub fn new(block_id: impl Into<String>, exercise_id: impl Into<String>, set_index: u32) -> Self {
        Self {
            block_id: block_id.into(),
            exercise_id: exercise_id.into(),
            set_index,
        }
    }

    /// Encode as a single string, e.g. `5:upper8:bench-01#2`
    ///
    /// Both identifiers are length-prefixed, so any characters are allowed
    /// in them and `decode` always recovers the original triple.
    pub fn encode(&self) -> String {
        format!(
            "{}:{}{}:{}#{}",
            self.block_id.len(),
            self.block_id,
            self.exercise_id.len(),
            self.exercise_id,
            self.set_index
        )
    }

    pub fn decode(encoded: &str) -> Option<Self> {
        let (block_id, rest) = take_prefixed(encoded)?;
        let (exercise_id, rest) = take_prefixed(rest)?;
        let set_index = rest.strip_prefix('#')?.parse().ok()?;
        Some(Self::new(block_id, exercise_id, set_index))
    }
}

fn take_prefixed(s: &str) -> Option<(&str, &str)> {
    let (len, rest) = s.split_once(':')?;
    let len: usize = len.parse().ok()?;
    if !rest.is_char_boundary(len) {
        return None;
    }
    Some(rest.split_at(len))
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} set {}",
            self.block_id,
            self.exercise_id,
            self.set_index + 1
        )
    }
}

/// A performed (or partially performed) set
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SetRecord {
    pub session_id: Uuid,
    pub block_id: String,
    pub exercise_id: String,
    pub set_index: u32,
    #[serde(default)]
    pub measurements: Measurements,
    pub completed: bool,
    #[serde(default)]
    pub note: String,
    pub recorded_at: DateTime<Utc>,
}

impl SetRecord {
    pub fn key(&self) -> StepKey {
        StepKey::new(self.block_id.clone(), self.exercise_id.clone(), self.set_index)
    }
}
