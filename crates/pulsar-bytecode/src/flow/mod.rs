// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Structured control-flow lowering.
//!
//! The builders in this module compile nested control constructs into flat
//! instruction sequences addressed by relative jumps, so callers never
//! calculate an offset by hand:
//!
//! - [`ChainBuilder`]: if/else-if/else chains with short-circuit
//!   evaluation of lazily computed conditions
//! - [`LoopBuilder`]: while loops with break/continue and the
//!   then (normal exit) / else (break exit) arms
//!
//! Both lower in two passes over a length-preserving layout: an emission
//! pass writes placeholder jumps and records where each must land, and a
//! resolution pass replays the layout rule to turn every placeholder into a
//! concrete offset. One offset convention applies to every jump kind: the
//! offset is measured from the jump instruction's own index, so
//! `target = jump_index + offset`.

mod chain;
mod condition;
mod loops;

#[cfg(test)]
mod tests;

pub use chain::ChainBuilder;
pub use condition::Condition;
pub use loops::LoopBuilder;

use crate::error::{Error, Result};
use crate::instruction::Instruction;

/// Offset written into jumps by the emission pass, rewritten during
/// resolution.
const PLACEHOLDER: i32 = 0;

/// Offset of a jump at `from` landing on `to`, checked against the wire
/// format's signed 32-bit range.
fn relative_offset(from: usize, to: usize) -> Result<i32> {
    let delta = to as i64 - from as i64;
    i32::try_from(delta)
        .map_err(|_| Error::Encoding(format!("jump offset {delta} exceeds the signed 32-bit range")))
}

/// Replaces the jump at `index` with a copy carrying the resolved offset.
/// Only the offset operand changes; the sequence length never does.
fn patch(instructions: &mut [Instruction], index: usize, offset: i32) {
    let resolved = match &instructions[index] {
        Instruction::Jump(_) => Instruction::Jump(offset),
        Instruction::JumpIfTrue(reg, _) => Instruction::JumpIfTrue(*reg, offset),
        Instruction::JumpIfFalse(reg, _) => Instruction::JumpIfFalse(*reg, offset),
        other => unreachable!("patch site {index} holds a non-jump instruction: {other:?}"),
    };
    instructions[index] = resolved;
}
