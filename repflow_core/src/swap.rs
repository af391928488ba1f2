//! Swap remapper.
//!
//! After an exercise in one block is replaced, only that block is re-planned;
//! every other block keeps its steps. The current position is then mapped
//! onto the new list.

use crate::planner::plan_block;
use crate::resume::{locate_resume, RecordIndex, ResumePoint};
use crate::{Block, Result, Step};

/// Where the session stood when the swap was requested
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwapOrigin {
    pub block_id: String,
    pub slot: u32,
    pub set_index: u32,
}

impl From<&Step> for SwapOrigin {
    fn from(step: &Step) -> Self {
        Self {
            block_id: step.block.id.clone(),
            slot: step.slot(),
            set_index: step.set_index,
        }
    }
}

/// Replace `block`'s steps in `steps`, keeping the list in block order
pub fn replan_block(steps: &[Step], block: &Block) -> Vec<Step> {
    let replanned = plan_block(block);
    let mut out = Vec::with_capacity(steps.len() + replanned.len());
    let mut replanned = Some(replanned);

    for step in steps {
        if step.block.id == block.id {
            if let Some(block_steps) = replanned.take() {
                out.extend(block_steps);
            }
        } else {
            out.push(step.clone());
        }
    }

    // The block had no steps before; place it by position
    if let Some(block_steps) = replanned {
        let at = out
            .iter()
            .position(|s| s.block.position > block.position)
            .unwrap_or(out.len());
        let tail = out.split_off(at);
        out.extend(block_steps);
        out.extend(tail);
    }

    out
}

/// Map the pre-swap position onto the re-planned list
///
/// Tries, in order: the same slot and set index; the first step of whatever
/// now occupies the slot; the resume point of the whole list. Returns `None`
/// only when every step is already complete.
pub fn relocate(
    workout_id: &str,
    steps: &[Step],
    origin: &SwapOrigin,
    records: &RecordIndex,
) -> Result<Option<usize>> {
    let in_slot = |s: &&Step| s.block.id == origin.block_id && s.slot() == origin.slot;

    if let Some(index) = steps
        .iter()
        .position(|s| in_slot(&s) && s.set_index == origin.set_index)
    {
        return Ok(Some(index));
    }

    if let Some(index) = steps.iter().position(|s| in_slot(&s)) {
        tracing::debug!(
            "Set {} no longer exists in slot {}, moving to its first set",
            origin.set_index + 1,
            origin.slot
        );
        return Ok(Some(index));
    }

    tracing::debug!("Slot {} vanished, falling back to resume point", origin.slot);
    match locate_resume(workout_id, steps, records)? {
        ResumePoint::At(index) => Ok(Some(index)),
        ResumePoint::Complete => Ok(None),
    }
}
