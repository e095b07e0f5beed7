//! While/then/else loop lowering with break and continue.

use tracing::debug;

use super::{Condition, PLACEHOLDER, patch, relative_offset};
use crate::error::{Error, Result};
use crate::instruction::Instruction;

/// Construction phase of a [`LoopBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    /// No condition set yet
    #[default]
    Empty,
    /// The loop body is receiving appends
    Body,
    /// The then arm is receiving appends
    Then,
    /// The else arm is receiving appends
    Else,
}

/// A loop-body entry. Break and continue are markers private to the
/// builder, not part of the instruction vocabulary, so none can survive
/// into the built sequence: the emission pass replaces each with a patched
/// jump.
#[derive(Debug, Clone, PartialEq)]
enum BodyEntry {
    Instruction(Instruction),
    Break,
    Continue,
}

/// Where a placeholder jump recorded during emission must land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    /// First instruction of the condition evaluation
    LoopHead,
    /// Start of the then arm
    ThenStart,
    /// Start of the else arm
    ElseStart,
    /// One past the last emitted instruction
    End,
}

/// Lowers a while loop with optional then and else arms.
///
/// The generated layout:
///
/// ```text
/// head:  <condition instructions>
///        jump_if_false -> then
///        <body, breaks -> else, continues -> head>
///        jump -> head
/// then:  <then instructions>
///        jump -> end        (only when the else arm is non-empty)
/// else:  <else instructions>
/// end:
/// ```
///
/// The then arm runs when the condition test naturally becomes false; a
/// break skips it and lands on the else arm. A continue re-evaluates the
/// condition (its instructions run again) rather than jumping to the top
/// of the body.
#[derive(Debug, Default)]
pub struct LoopBuilder {
    condition: Option<Condition>,
    body: Vec<BodyEntry>,
    then_body: Vec<Instruction>,
    else_body: Vec<Instruction>,
    phase: Phase,
}

impl LoopBuilder {
    /// Creates an empty loop.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the loop with its condition and starts the body.
    pub fn start_loop(&mut self, condition: Condition) -> Result<()> {
        if self.phase != Phase::Empty {
            return Err(Error::Usage(
                "start_loop() called on a loop that is already started".into(),
            ));
        }
        self.condition = Some(condition);
        self.phase = Phase::Body;
        Ok(())
    }

    /// Appends an instruction to whichever of body/then/else is open.
    pub fn append(&mut self, instruction: Instruction) -> Result<()> {
        match self.phase {
            Phase::Body => {
                self.body.push(BodyEntry::Instruction(instruction));
                Ok(())
            }
            Phase::Then => {
                self.then_body.push(instruction);
                Ok(())
            }
            Phase::Else => {
                self.else_body.push(instruction);
                Ok(())
            }
            Phase::Empty => Err(Error::Usage("append() called before start_loop()".into())),
        }
    }

    /// Records a break at the current body position. The built jump lands
    /// on the else arm.
    pub fn add_break(&mut self) -> Result<()> {
        match self.phase {
            Phase::Body => {
                self.body.push(BodyEntry::Break);
                Ok(())
            }
            Phase::Empty => Err(Error::Usage("add_break() called before start_loop()".into())),
            Phase::Then | Phase::Else => {
                Err(Error::Usage("add_break() outside the loop body".into()))
            }
        }
    }

    /// Records a continue at the current body position. The built jump
    /// lands on the loop head, so the condition is re-evaluated.
    pub fn add_continue(&mut self) -> Result<()> {
        match self.phase {
            Phase::Body => {
                self.body.push(BodyEntry::Continue);
                Ok(())
            }
            Phase::Empty => Err(Error::Usage(
                "add_continue() called before start_loop()".into(),
            )),
            Phase::Then | Phase::Else => {
                Err(Error::Usage("add_continue() outside the loop body".into()))
            }
        }
    }

    /// Closes the body and opens the then arm (normal-exit path).
    pub fn start_then(&mut self) -> Result<()> {
        match self.phase {
            Phase::Body => {
                self.phase = Phase::Then;
                Ok(())
            }
            Phase::Empty => Err(Error::Usage(
                "start_then() called before start_loop()".into(),
            )),
            Phase::Then => Err(Error::Usage("start_then() called twice".into())),
            Phase::Else => Err(Error::Usage("start_then() called after start_else()".into())),
        }
    }

    /// Opens the else arm (break-exit path). A then arm is not required.
    pub fn start_else(&mut self) -> Result<()> {
        match self.phase {
            Phase::Body | Phase::Then => {
                self.phase = Phase::Else;
                Ok(())
            }
            Phase::Empty => Err(Error::Usage(
                "start_else() called before start_loop()".into(),
            )),
            Phase::Else => Err(Error::Usage("start_else() called twice".into())),
        }
    }

    /// Lowers the loop, consuming the builder.
    pub fn build(self) -> Result<Vec<Instruction>> {
        let Some(condition) = self.condition else {
            return Err(Error::Usage(
                "build() called on a loop with no condition".into(),
            ));
        };

        // Emission pass. The loop head is the start of the condition
        // evaluation: continues re-run it, not just the test.
        let loop_head = 0usize;
        let mut instructions = Vec::new();
        let mut sites: Vec<(usize, Target)> = Vec::new();

        instructions.extend_from_slice(condition.instructions_to_emit());
        sites.push((instructions.len(), Target::ThenStart));
        instructions.push(Instruction::JumpIfFalse(
            condition.result_register(),
            PLACEHOLDER,
        ));

        for entry in self.body {
            match entry {
                BodyEntry::Instruction(instruction) => instructions.push(instruction),
                BodyEntry::Break => {
                    sites.push((instructions.len(), Target::ElseStart));
                    instructions.push(Instruction::Jump(PLACEHOLDER));
                }
                BodyEntry::Continue => {
                    sites.push((instructions.len(), Target::LoopHead));
                    instructions.push(Instruction::Jump(PLACEHOLDER));
                }
            }
        }

        // Back-edge: the bottom of the body repeats the condition test.
        sites.push((instructions.len(), Target::LoopHead));
        instructions.push(Instruction::Jump(PLACEHOLDER));

        let then_start = instructions.len();
        instructions.extend_from_slice(&self.then_body);

        // A non-empty else arm must be skipped on the normal exit path.
        if !self.else_body.is_empty() {
            sites.push((instructions.len(), Target::End));
            instructions.push(Instruction::Jump(PLACEHOLDER));
        }

        let else_start = instructions.len();
        instructions.extend_from_slice(&self.else_body);
        let end = instructions.len();

        // Patch pass: rewrite offsets only.
        for (index, target) in sites {
            let address = match target {
                Target::LoopHead => loop_head,
                Target::ThenStart => then_start,
                Target::ElseStart => else_start,
                Target::End => end,
            };
            let offset = relative_offset(index, address)?;
            debug!(index, ?target, offset, "resolved loop jump");
            patch(&mut instructions, index, offset);
        }

        Ok(instructions)
    }
}
