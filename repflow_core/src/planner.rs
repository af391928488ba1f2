//! Step planner: flattens a workout prescription into executable steps.
//!
//! Straight-sets blocks emit every set of one exercise before moving to the
//! next. Circuit blocks emit one set of each exercise per round; exercises
//! with fewer sets drop out of later rounds.

use crate::{Block, PrescribedExercise, StepKey, Workout};

/// The block a step belongs to (denormalized, without its exercise list)
#[derive(Clone, Debug, PartialEq)]
pub struct BlockRef {
    pub id: String,
    pub position: u32,
    pub circuit: bool,
}

impl From<&Block> for BlockRef {
    fn from(block: &Block) -> Self {
        Self {
            id: block.id.clone(),
            position: block.position,
            circuit: block.circuit,
        }
    }
}

/// One set of one exercise, in execution order
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub block: BlockRef,
    pub exercise: PrescribedExercise,
    pub set_index: u32,
    pub total_sets: u32,
}

impl Step {
    pub fn key(&self) -> StepKey {
        StepKey::new(
            self.block.id.clone(),
            self.exercise.exercise_id.clone(),
            self.set_index,
        )
    }

    /// The slot this step's exercise occupies within its block
    pub fn slot(&self) -> u32 {
        self.exercise.position
    }
}

/// Plan every block of a workout, in block order
pub fn plan_workout(workout: &Workout) -> Vec<Step> {
    let mut blocks: Vec<&Block> = workout.blocks.iter().collect();
    blocks.sort_by_key(|b| b.position);

    let steps: Vec<Step> = blocks.into_iter().flat_map(plan_block).collect();
    tracing::debug!(
        "Planned {} steps for workout {}",
        steps.len(),
        workout.id
    );
    steps
}

/// Plan a single block
pub fn plan_block(block: &Block) -> Vec<Step> {
    let block_ref = BlockRef::from(block);
    let mut exercises: Vec<&PrescribedExercise> = block.exercises.iter().collect();
    exercises.sort_by_key(|e| e.position);

    let step = |exercise: &PrescribedExercise, set_index: u32| Step {
        block: block_ref.clone(),
        exercise: exercise.clone(),
        set_index,
        total_sets: exercise.sets,
    };

    if block.circuit {
        let max_sets = exercises.iter().map(|e| e.sets).max().unwrap_or(0);
        (0..max_sets)
            .flat_map(|round| {
                exercises
                    .iter()
                    .filter(move |e| e.sets > round)
                    .map(move |e| step(*e, round))
            })
            .collect()
    } else {
        exercises
            .iter()
            .flat_map(|e| (0..e.sets).map(move |set_index| step(*e, set_index)))
            .collect()
    }
}
