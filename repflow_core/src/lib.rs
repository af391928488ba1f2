#![forbid(unsafe_code)]

//! Core domain model and session engine for Repflow.
//!
//! This crate provides:
//! - Domain types (workouts, blocks, prescriptions, measurements, records)
//! - Step planning and resume location
//! - Session clock and rest timer
//! - Input defaults and mid-session exercise swaps
//! - Persistence gateway with file and in-memory stores
//! - Summary metrics and CSV history export

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod planner;
pub mod resume;
pub mod clock;
pub mod rest;
pub mod defaults;
pub mod swap;
pub mod summary;
pub mod gateway;
pub mod store;
pub mod history;
pub mod session;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use planner::{plan_block, plan_workout, BlockRef, Step};
pub use resume::{locate_resume, RecordIndex, ResumePoint};
pub use clock::SessionClock;
pub use rest::{RestTick, RestTimer};
pub use defaults::{resolve_defaults, DefaultsSource, InputDefaults};
pub use gateway::{Gateway, Notifier};
pub use store::{Database, FileStore, Library, MemoryStore};
pub use session::{Advance, Notice, Phase, SessionOptions, SetEntry, Tick, WorkoutSession};
