//! If/else-if/else chain lowering.

use tracing::debug;

use super::{Condition, PLACEHOLDER, patch, relative_offset};
use crate::error::{Error, Result};
use crate::instruction::Instruction;

/// Construction phase of a [`ChainBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    /// No branch opened yet
    #[default]
    Empty,
    /// A branch body is receiving appends
    Branch,
    /// The trailing else body is receiving appends
    Else,
}

/// Where a placeholder jump recorded during emission must land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    /// Start of branch `n`'s condition block
    Condition(usize),
    /// Start of the else arm
    ElseStart,
    /// One past the last emitted instruction
    End,
}

/// Lowers an if/else-if/else chain into flat jump code.
///
/// Branches are added in source order, each as a condition followed by
/// appended body instructions; an optional else body comes last. The
/// generated layout per branch is: condition instructions (if any), a
/// jump-if-false over the body, the body, and a jump to the overall end.
/// The last branch of an else-less chain carries no end jump: falling off
/// its body already is the end.
///
/// ```rust
/// use pulsar_bytecode::{ChainBuilder, Condition, Instruction, Value};
///
/// let mut chain = ChainBuilder::new();
/// chain.start(Condition::from_register(0))?;
/// chain.append(Instruction::LoadConst(1, Value::Number(1.0)))?;
/// chain.add_branch(Condition::from_register(2))?;
/// chain.append(Instruction::LoadConst(1, Value::Number(2.0)))?;
/// chain.finish_with_else()?;
/// chain.append(Instruction::LoadConst(1, Value::Number(3.0)))?;
/// let code = chain.build()?;
/// # Ok::<(), pulsar_bytecode::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct ChainBuilder {
    branches: Vec<(Condition, Vec<Instruction>)>,
    else_body: Option<Vec<Instruction>>,
    phase: Phase,
}

impl ChainBuilder {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the chain with its first condition.
    pub fn start(&mut self, condition: Condition) -> Result<()> {
        if self.phase != Phase::Empty {
            return Err(Error::Usage(
                "start() called on a chain that is already started".into(),
            ));
        }
        self.branches.push((condition, Vec::new()));
        self.phase = Phase::Branch;
        Ok(())
    }

    /// Appends another condition, closing the previous branch's body.
    pub fn add_branch(&mut self, condition: Condition) -> Result<()> {
        match self.phase {
            Phase::Branch => {
                self.branches.push((condition, Vec::new()));
                Ok(())
            }
            Phase::Empty => Err(Error::Usage("add_branch() called before start()".into())),
            Phase::Else => Err(Error::Usage(
                "add_branch() called after finish_with_else()".into(),
            )),
        }
    }

    /// Appends an instruction to the currently open body.
    pub fn append(&mut self, instruction: Instruction) -> Result<()> {
        match self.phase {
            Phase::Branch => {
                if let Some((_, body)) = self.branches.last_mut() {
                    body.push(instruction);
                }
                Ok(())
            }
            Phase::Else => {
                if let Some(body) = self.else_body.as_mut() {
                    body.push(instruction);
                }
                Ok(())
            }
            Phase::Empty => Err(Error::Usage("append() called before start()".into())),
        }
    }

    /// Opens the trailing else body.
    pub fn finish_with_else(&mut self) -> Result<()> {
        match self.phase {
            Phase::Branch => {
                self.else_body = Some(Vec::new());
                self.phase = Phase::Else;
                Ok(())
            }
            Phase::Empty => Err(Error::Usage(
                "finish_with_else() called before start()".into(),
            )),
            Phase::Else => Err(Error::Usage("finish_with_else() called twice".into())),
        }
    }

    /// Lowers the chain, consuming the builder.
    ///
    /// Exactly one branch body (or the else body) is reachable for any
    /// assignment of condition values, every taken path converges on the
    /// overall end, and a later branch's condition instructions are
    /// unreachable once an earlier condition tested true.
    pub fn build(self) -> Result<Vec<Instruction>> {
        if self.branches.is_empty() {
            return Err(Error::Usage(
                "build() called on a chain with no branches".into(),
            ));
        }
        let has_else = self.else_body.is_some();
        let last = self.branches.len() - 1;

        // Emission pass: per branch, condition code, a false-test
        // placeholder, the body, and an exit jump unless this is the last
        // branch of an else-less chain. Each placeholder records where it
        // must land.
        let mut instructions = Vec::new();
        let mut sites: Vec<(usize, Target)> = Vec::new();
        for (i, (condition, body)) in self.branches.iter().enumerate() {
            instructions.extend_from_slice(condition.instructions_to_emit());
            let test = instructions.len();
            instructions.push(Instruction::JumpIfFalse(
                condition.result_register(),
                PLACEHOLDER,
            ));
            instructions.extend_from_slice(body);
            if i < last || has_else {
                sites.push((instructions.len(), Target::End));
                instructions.push(Instruction::Jump(PLACEHOLDER));
            }
            let miss = if i < last {
                Target::Condition(i + 1)
            } else if has_else {
                Target::ElseStart
            } else {
                Target::End
            };
            sites.push((test, miss));
        }
        if let Some(body) = &self.else_body {
            instructions.extend_from_slice(body);
        }

        // Resolution pass: replay the same layout rule to recover every
        // branch's condition start, the else start and the overall end.
        let mut condition_starts = Vec::with_capacity(self.branches.len());
        let mut cursor = 0usize;
        for (i, (condition, body)) in self.branches.iter().enumerate() {
            condition_starts.push(cursor);
            cursor += condition.emitted_len() + 1 + body.len();
            if i < last || has_else {
                cursor += 1;
            }
        }
        let else_start = cursor;
        let end = instructions.len();
        debug_assert_eq!(
            else_start + self.else_body.as_ref().map_or(0, Vec::len),
            end,
            "layout replay must land on the emitted length",
        );

        // Patch pass: rewrite offsets only, never the instruction count.
        for (index, target) in sites {
            let address = match target {
                Target::Condition(n) => condition_starts[n],
                Target::ElseStart => else_start,
                Target::End => end,
            };
            let offset = relative_offset(index, address)?;
            debug!(index, ?target, offset, "resolved chain jump");
            patch(&mut instructions, index, offset);
        }

        Ok(instructions)
    }
}
