// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Pulsar - command-line tools for Pulsar VM packages
//!
//! `pulsar demo` assembles a demonstration package whose functions are
//! lowered with the control-flow builders; `pulsar inspect` prints a
//! package's manifest and contents.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use pulsar_bytecode::function::max_register;
use pulsar_bytecode::package::PackageError;
use pulsar_bytecode::{
    ChainBuilder, Condition, Function, Instruction, LoopBuilder, Package, PackageBuilder, Value,
};

#[derive(Parser)]
#[command(name = "pulsar", version, about = "Build and inspect Pulsar VM packages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble the demonstration package
    Demo {
        /// Where to write the package
        #[arg(default_value = "demo.ppack")]
        output: PathBuf,
    },
    /// Print a package's manifest and contents
    Inspect {
        /// The package to open
        package: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Demo { output } => demo(&output),
        Commands::Inspect { package } => inspect(&package),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{}: {error}", "error".red().bold());
            ExitCode::FAILURE
        }
    }
}

/// Scratch registers needed beyond the arguments for `code`.
fn extra_regs(arity: u32, code: &[Instruction]) -> u32 {
    max_register(code).map_or(0, |highest| (highest + 1).saturating_sub(arity))
}

/// `classify(n)`: an if/else-if/else chain over the sign of `n`, with
/// lazily computed conditions.
fn classify_function() -> Result<Function, PackageError> {
    let mut chain = ChainBuilder::new();
    // if n < 0
    chain.start(Condition::from_instructions(
        vec![
            Instruction::LoadConst(1, Value::Number(0.0)),
            Instruction::LessThan(2, 0, 1),
        ],
        2,
    ))?;
    chain.append(Instruction::LoadConst(3, Value::atom("negative")))?;
    chain.append(Instruction::Return(3))?;
    // else if n == 0; r1 still holds 0.0 on this path
    chain.add_branch(Condition::from_instructions(
        vec![Instruction::Equal(2, 0, 1)],
        2,
    ))?;
    chain.append(Instruction::LoadConst(3, Value::atom("zero")))?;
    chain.append(Instruction::Return(3))?;
    chain.finish_with_else()?;
    chain.append(Instruction::LoadConst(3, Value::atom("positive")))?;
    chain.append(Instruction::Return(3))?;

    let code = chain.build()?;
    let extra = extra_regs(1, &code);
    Ok(Function::new_bytecode(
        Some("classify".to_string()),
        1,
        extra,
        code,
    ))
}

/// `count_to(limit)`: a while/then/else loop that counts up but breaks at
/// seven, so the else arm reports the interruption.
fn count_to_function() -> Result<Function, PackageError> {
    let mut looper = LoopBuilder::new();
    // while counter < limit; the counter lives in r1
    looper.start_loop(Condition::from_instructions(
        vec![Instruction::LessThan(2, 1, 0)],
        2,
    ))?;
    looper.append(Instruction::LoadConst(4, Value::Number(1.0)))?;
    looper.append(Instruction::Add(1, 1, 4))?;
    looper.append(Instruction::LoadConst(5, Value::Number(7.0)))?;
    looper.append(Instruction::Equal(6, 1, 5))?;
    looper.append(Instruction::JumpIfFalse(6, 2))?;
    looper.add_break()?;
    looper.start_then()?;
    looper.append(Instruction::LoadConst(3, Value::atom("finished")))?;
    looper.start_else()?;
    looper.append(Instruction::LoadConst(3, Value::atom("interrupted")))?;

    // Builder output composes: offsets are relative, so prefixing the
    // counter initialization leaves every jump valid.
    let mut code = vec![Instruction::LoadConst(1, Value::Number(0.0))];
    code.extend(looper.build()?);
    code.push(Instruction::Return(3));

    let extra = extra_regs(1, &code);
    Ok(Function::new_bytecode(
        Some("count_to".to_string()),
        1,
        extra,
        code,
    ))
}

const DEMO_SOURCE: &str = "\
fn classify(n) {
    if n < 0 { :negative } else if n == 0 { :zero } else { :positive }
}

fn count_to(limit) {
    while counter < limit {
        counter = counter + 1
        if counter == 7 { break }
    } then { :finished } else { :interrupted }
}
";

fn demo(output: &Path) -> Result<(), PackageError> {
    let classify = classify_function()?;
    let count_to = count_to_function()?;
    debug!(output = %output.display(), "lowered demo functions");

    let mut builder = PackageBuilder::new("pulsar-demo", "0.1.0")
        .main_class("Demo")
        .entry_point("classify")
        .description("Control-flow lowering demonstration")
        .export("Demo");
    builder.add_classes("Demo", &[classify.clone(), count_to.clone()])?;
    builder.add_source("demo.pul", DEMO_SOURCE);
    builder.build(File::create(output)?)?;

    println!(
        "{} {}",
        "Wrote".green().bold(),
        output.display().to_string().cyan()
    );
    for function in [&classify, &count_to] {
        let name = function.name.as_deref().unwrap_or("<anonymous>");
        let body_len = function.instructions().map_or(0, |body| body.len());
        println!(
            "  {} arity {}, {} registers, {} instructions",
            name.yellow(),
            function.arity,
            function.register_budget(),
            body_len
        );
    }
    Ok(())
}

fn inspect(path: &Path) -> Result<(), PackageError> {
    let mut package = Package::open(File::open(path)?)?;

    let manifest = package.manifest().clone();
    println!("{}", "Manifest".green().bold());
    println!("  {} {}", "Name:".bold(), manifest.name);
    println!("  {} {}", "Version:".bold(), manifest.version);
    if let Some(main_class) = &manifest.main_class {
        println!("  {} {}", "Main-Class:".bold(), main_class);
    }
    if let Some(entry_point) = &manifest.entry_point {
        println!("  {} {}", "Entry-Point:".bold(), entry_point);
    }
    if let Some(description) = &manifest.description {
        println!("  {} {}", "Description:".bold(), description);
    }
    if !manifest.exports.is_empty() {
        println!("  {} {}", "Exports:".bold(), manifest.exports.join(", "));
    }

    println!("{}", "Classes".green().bold());
    for name in package.class_names() {
        let size = package.read_class(&name)?.len();
        println!("  {} ({size} bytes)", name.cyan());
    }

    println!("{}", "Entries".green().bold());
    for entry in package.entries() {
        println!("  {entry}");
    }
    Ok(())
}
