// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # pulsar-bytecode
//!
//! Bytecode construction toolkit for the Pulsar register VM.
//!
//! ## Overview
//!
//! This crate is the producer side of the Pulsar toolchain:
//! - An instruction and value model for the register machine
//! - Control-flow builders that lower if/else-if/else chains and
//!   while/then/else loops into flat, jump-resolved instruction sequences
//! - The binary instruction/value encoding
//! - The function container and the `.ppack` package archive
//!
//! Execution is out of scope; the VM consuming this output lives in its own
//! crate.
//!
//! ## Quick Start
//!
//! ```rust
//! use pulsar_bytecode::{ChainBuilder, Condition, Instruction, Value};
//!
//! let mut chain = ChainBuilder::new();
//! chain.start(Condition::from_register(0))?;
//! chain.append(Instruction::LoadConst(1, Value::Number(1.0)))?;
//! chain.append(Instruction::Return(1))?;
//! let code = chain.build()?;
//! assert_eq!(code.len(), 3);
//! # Ok::<(), pulsar_bytecode::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod encode;
pub mod error;
pub mod flow;
pub mod function;
pub mod instruction;
pub mod package;
pub mod value;

// Re-exports for convenience
pub use error::{Error, Result};
pub use flow::{ChainBuilder, Condition, LoopBuilder};
pub use function::Function;
pub use instruction::Instruction;
pub use package::{Manifest, Package, PackageBuilder};
pub use value::Value;
