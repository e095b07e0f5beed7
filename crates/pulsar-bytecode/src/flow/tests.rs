//! Tests for the control-flow builders.

use super::*;
use crate::value::Value;

/// Executes the register/jump subset the builders emit, starting from
/// instruction 0, and returns the trace of executed instruction indices.
/// Jumps land on `index + offset`, matching the VM's program-counter
/// update.
fn run(instructions: &[Instruction], registers: &mut Vec<Value>) -> Vec<usize> {
    let mut trace = Vec::new();
    let mut ip = 0usize;
    let mut steps = 0u32;
    while ip < instructions.len() {
        steps += 1;
        assert!(steps < 10_000, "runaway program");
        trace.push(ip);
        match &instructions[ip] {
            Instruction::LoadConst(dst, value) => {
                set(registers, *dst, value.clone());
                ip += 1;
            }
            Instruction::Move(dst, src) => {
                let value = get(registers, *src);
                set(registers, *dst, value);
                ip += 1;
            }
            Instruction::Add(dst, a, b) => {
                let sum = number(registers, *a) + number(registers, *b);
                set(registers, *dst, Value::Number(sum));
                ip += 1;
            }
            Instruction::Equal(dst, a, b) => {
                let eq = get(registers, *a) == get(registers, *b);
                set(registers, *dst, Value::Boolean(eq));
                ip += 1;
            }
            Instruction::LessThan(dst, a, b) => {
                let lt = number(registers, *a) < number(registers, *b);
                set(registers, *dst, Value::Boolean(lt));
                ip += 1;
            }
            Instruction::Not(dst, src) => {
                let negated = !truthy(registers, *src);
                set(registers, *dst, Value::Boolean(negated));
                ip += 1;
            }
            Instruction::Jump(offset) => {
                ip = jump_to(ip, *offset);
            }
            Instruction::JumpIfTrue(reg, offset) => {
                ip = if truthy(registers, *reg) {
                    jump_to(ip, *offset)
                } else {
                    ip + 1
                };
            }
            Instruction::JumpIfFalse(reg, offset) => {
                ip = if truthy(registers, *reg) {
                    ip + 1
                } else {
                    jump_to(ip, *offset)
                };
            }
            Instruction::Return(_) => break,
            other => panic!("evaluator does not support {other:?}"),
        }
    }
    trace
}

fn jump_to(ip: usize, offset: i32) -> usize {
    usize::try_from(ip as i64 + i64::from(offset)).expect("jump before instruction 0")
}

fn set(registers: &mut Vec<Value>, reg: u32, value: Value) {
    let index = reg as usize;
    if index >= registers.len() {
        registers.resize(index + 1, Value::Undefined);
    }
    registers[index] = value;
}

fn get(registers: &[Value], reg: u32) -> Value {
    registers.get(reg as usize).cloned().unwrap_or(Value::Undefined)
}

fn number(registers: &[Value], reg: u32) -> f64 {
    match get(registers, reg) {
        Value::Number(n) => n,
        other => panic!("register {reg} holds {other:?}, expected a number"),
    }
}

fn truthy(registers: &[Value], reg: u32) -> bool {
    match get(registers, reg) {
        Value::Boolean(b) => b,
        other => panic!("register {reg} holds {other:?}, expected a boolean"),
    }
}

/// Every resolved jump must land inside `[0, len]`; `len` itself is the
/// overall end (falling off the sequence).
fn assert_jumps_in_bounds(instructions: &[Instruction]) {
    for (index, instruction) in instructions.iter().enumerate() {
        if let Some(offset) = instruction.jump_offset() {
            let target = index as i64 + i64::from(offset);
            assert!(
                (0..=instructions.len() as i64).contains(&target),
                "jump at {index} targets {target}, outside the sequence",
            );
        }
    }
}

fn assert_usage<T: std::fmt::Debug>(result: Result<T>) {
    match result {
        Err(Error::Usage(_)) => {}
        other => panic!("expected a usage error, got {other:?}"),
    }
}

// ========================================================================
// Chain builder
// ========================================================================

#[test]
fn test_single_branch_no_else() {
    let mut chain = ChainBuilder::new();
    chain.start(Condition::from_register(0)).unwrap();
    chain
        .append(Instruction::LoadConst(1, Value::Number(1.0)))
        .unwrap();
    chain.append(Instruction::Return(1)).unwrap();
    let code = chain.build().unwrap();

    // One test, two body instructions, nothing after: the false edge skips
    // the whole body and lands on the end.
    assert_eq!(
        code,
        vec![
            Instruction::JumpIfFalse(0, 3),
            Instruction::LoadConst(1, Value::Number(1.0)),
            Instruction::Return(1),
        ]
    );
    assert_jumps_in_bounds(&code);

    let mut registers = vec![Value::Boolean(false)];
    let trace = run(&code, &mut registers);
    assert_eq!(trace, vec![0], "false condition must execute only the test");

    let mut registers = vec![Value::Boolean(true)];
    let trace = run(&code, &mut registers);
    assert_eq!(trace, vec![0, 1, 2]);
    assert_eq!(get(&registers, 1), Value::Number(1.0));
}

#[test]
fn test_two_branch_chain_with_else_layout() {
    // if (r0 == 1) r5 = 10 else if (r0 == 2) r5 = 20 else r5 = 30,
    // both conditions computed lazily.
    let code = two_branch_chain().unwrap();

    assert_eq!(
        code,
        vec![
            // branch 1 condition
            Instruction::LoadConst(1, Value::Number(1.0)),
            Instruction::Equal(2, 0, 1),
            Instruction::JumpIfFalse(2, 3), // -> branch 2 condition at 5
            Instruction::LoadConst(5, Value::Number(10.0)),
            Instruction::Jump(7), // -> end at 11
            // branch 2 condition
            Instruction::LoadConst(3, Value::Number(2.0)),
            Instruction::Equal(4, 0, 3),
            Instruction::JumpIfFalse(4, 3), // -> else at 10
            Instruction::LoadConst(5, Value::Number(20.0)),
            Instruction::Jump(2), // -> end at 11
            // else
            Instruction::LoadConst(5, Value::Number(30.0)),
        ]
    );
    assert_jumps_in_bounds(&code);
}

fn two_branch_chain() -> Result<Vec<Instruction>> {
    let mut chain = ChainBuilder::new();
    chain.start(Condition::from_instructions(
        vec![
            Instruction::LoadConst(1, Value::Number(1.0)),
            Instruction::Equal(2, 0, 1),
        ],
        2,
    ))?;
    chain.append(Instruction::LoadConst(5, Value::Number(10.0)))?;
    chain.add_branch(Condition::from_instructions(
        vec![
            Instruction::LoadConst(3, Value::Number(2.0)),
            Instruction::Equal(4, 0, 3),
        ],
        4,
    ))?;
    chain.append(Instruction::LoadConst(5, Value::Number(20.0)))?;
    chain.finish_with_else()?;
    chain.append(Instruction::LoadConst(5, Value::Number(30.0)))?;
    chain.build()
}

#[test]
fn test_short_circuit_skips_later_conditions() {
    let code = two_branch_chain().unwrap();

    // With r0 == 1 the first condition is true: branch 2's evaluation
    // instructions (indices 5 and 6) and the else body (10) must never run.
    let mut registers = vec![Value::Number(1.0)];
    let trace = run(&code, &mut registers);
    assert_eq!(trace, vec![0, 1, 2, 3, 4]);
    assert_eq!(get(&registers, 5), Value::Number(10.0));
    for skipped in [5usize, 6, 10] {
        assert!(!trace.contains(&skipped), "index {skipped} must be skipped");
    }

    // Statically: the only jump landing on branch 2's condition start is
    // branch 1's false edge.
    let targets: Vec<(usize, i64)> = code
        .iter()
        .enumerate()
        .filter_map(|(i, instr)| instr.jump_offset().map(|o| (i, i as i64 + i64::from(o))))
        .collect();
    let into_branch2: Vec<usize> = targets
        .iter()
        .filter(|(_, target)| *target == 5)
        .map(|(index, _)| *index)
        .collect();
    assert_eq!(into_branch2, vec![2]);
}

#[test]
fn test_exactly_one_arm_runs_per_assignment() {
    // Register conditions so each truth assignment is a register preset.
    for (a, b, expected) in [
        (true, true, 1.0),
        (true, false, 1.0),
        (false, true, 2.0),
        (false, false, 3.0),
    ] {
        let mut chain = ChainBuilder::new();
        chain.start(Condition::from_register(0)).unwrap();
        chain
            .append(Instruction::LoadConst(5, Value::Number(1.0)))
            .unwrap();
        chain.add_branch(Condition::from_register(1)).unwrap();
        chain
            .append(Instruction::LoadConst(5, Value::Number(2.0)))
            .unwrap();
        chain.finish_with_else().unwrap();
        chain
            .append(Instruction::LoadConst(5, Value::Number(3.0)))
            .unwrap();
        let code = chain.build().unwrap();

        let mut registers = vec![Value::Boolean(a), Value::Boolean(b)];
        let trace = run(&code, &mut registers);
        assert_eq!(get(&registers, 5), Value::Number(expected), "({a}, {b})");

        // Exactly one body ran.
        let bodies_run = trace
            .iter()
            .filter(|i| matches!(code[**i], Instruction::LoadConst(5, _)))
            .count();
        assert_eq!(bodies_run, 1, "({a}, {b})");
    }
}

#[test]
fn test_empty_else_arm() {
    let mut chain = ChainBuilder::new();
    chain.start(Condition::from_register(0)).unwrap();
    chain
        .append(Instruction::LoadConst(1, Value::Number(1.0)))
        .unwrap();
    chain.finish_with_else().unwrap();
    let code = chain.build().unwrap();

    // The else arm contributes nothing, but the branch still carries its
    // exit jump and the false edge lands on the shared end.
    assert_eq!(
        code,
        vec![
            Instruction::JumpIfFalse(0, 3),
            Instruction::LoadConst(1, Value::Number(1.0)),
            Instruction::Jump(1),
        ]
    );
}

#[test]
fn test_round_trip_addressing() {
    let code = two_branch_chain().unwrap();
    // For every jump, target == index + offset by definition of the offset
    // convention; targets must be branch starts, the else start or the end.
    let expected_targets = [(2usize, 5i64), (4, 11), (7, 10), (9, 11)];
    for (index, target) in expected_targets {
        let offset = code[index].jump_offset().expect("site must be a jump");
        assert_eq!(index as i64 + i64::from(offset), target);
    }
}

#[test]
fn test_chain_usage_errors() {
    let mut chain = ChainBuilder::new();
    assert_usage(chain.add_branch(Condition::from_register(0)));
    assert_usage(chain.append(Instruction::Nop));
    assert_usage(chain.finish_with_else());

    chain.start(Condition::from_register(0)).unwrap();
    assert_usage(chain.start(Condition::from_register(1)));

    chain.finish_with_else().unwrap();
    assert_usage(chain.finish_with_else());
    assert_usage(chain.add_branch(Condition::from_register(1)));

    assert_usage(ChainBuilder::new().build());
}

// ========================================================================
// Loop builder
// ========================================================================

#[test]
fn test_counter_loop_runs_to_natural_exit() {
    // while (r0 < 10) { r0 = r0 + 1 }
    let mut looper = LoopBuilder::new();
    looper
        .start_loop(Condition::from_instructions(
            vec![
                Instruction::LoadConst(1, Value::Number(10.0)),
                Instruction::LessThan(2, 0, 1),
            ],
            2,
        ))
        .unwrap();
    looper
        .append(Instruction::LoadConst(3, Value::Number(1.0)))
        .unwrap();
    looper.append(Instruction::Add(0, 0, 3)).unwrap();
    let code = looper.build().unwrap();

    assert_eq!(code.len(), 6);
    assert_eq!(code[5], Instruction::Jump(-5), "back-edge to the loop head");
    assert_jumps_in_bounds(&code);

    let mut registers = vec![Value::Number(0.0)];
    run(&code, &mut registers);
    assert_eq!(get(&registers, 0), Value::Number(10.0));
}

/// Condition register pre-set to true; the body increments r0 and breaks
/// at r0 == 5; the then arm emits `completed`, the else arm `broken`.
fn break_loop() -> Result<Vec<Instruction>> {
    let mut looper = LoopBuilder::new();
    looper.start_loop(Condition::from_register(3))?;
    looper.append(Instruction::LoadConst(1, Value::Number(1.0)))?;
    looper.append(Instruction::Add(0, 0, 1))?;
    looper.append(Instruction::LoadConst(4, Value::Number(5.0)))?;
    looper.append(Instruction::Equal(5, 0, 4))?;
    // Skip the break unless r0 == 5. Body-internal jumps are relative, so
    // they stay valid wherever the body lands.
    looper.append(Instruction::JumpIfFalse(5, 2))?;
    looper.add_break()?;
    looper.start_then()?;
    looper.append(Instruction::LoadConst(6, Value::atom("completed")))?;
    looper.start_else()?;
    looper.append(Instruction::LoadConst(6, Value::atom("broken")))?;
    looper.build()
}

#[test]
fn test_break_exits_to_else_arm() {
    let code = break_loop().unwrap();

    assert_eq!(code[0], Instruction::JumpIfFalse(3, 8), "exit test -> then");
    assert_eq!(code[6], Instruction::Jump(4), "break -> else arm at 10");
    assert_eq!(code[7], Instruction::Jump(-7), "back-edge -> loop head");
    assert_eq!(code[9], Instruction::Jump(2), "then skips the else arm");
    assert_jumps_in_bounds(&code);

    let mut registers = vec![Value::Number(0.0)];
    set(&mut registers, 3, Value::Boolean(true));
    let trace = run(&code, &mut registers);

    assert_eq!(get(&registers, 6), Value::atom("broken"));
    assert!(!trace.contains(&8), "then arm must not run on a break exit");
    let else_runs = trace.iter().filter(|i| **i == 10).count();
    assert_eq!(else_runs, 1, "else arm runs exactly once");
}

/// Same shape as [`break_loop`] plus a continue at r0 == 3 ahead of the
/// break check, under a computed condition so re-evaluation is visible in
/// the trace.
fn continue_loop() -> Result<Vec<Instruction>> {
    let mut looper = LoopBuilder::new();
    looper.start_loop(Condition::from_instructions(
        vec![
            Instruction::LoadConst(8, Value::Number(10.0)),
            Instruction::LessThan(9, 0, 8),
        ],
        9,
    ))?;
    looper.append(Instruction::LoadConst(1, Value::Number(1.0)))?;
    looper.append(Instruction::Add(0, 0, 1))?;
    looper.append(Instruction::LoadConst(4, Value::Number(3.0)))?;
    looper.append(Instruction::Equal(5, 0, 4))?;
    looper.append(Instruction::JumpIfFalse(5, 2))?;
    looper.add_continue()?;
    looper.append(Instruction::LoadConst(4, Value::Number(5.0)))?;
    looper.append(Instruction::Equal(5, 0, 4))?;
    looper.append(Instruction::JumpIfFalse(5, 2))?;
    looper.add_break()?;
    looper.start_then()?;
    looper.append(Instruction::LoadConst(6, Value::atom("completed")))?;
    looper.start_else()?;
    looper.append(Instruction::LoadConst(6, Value::atom("broken")))?;
    looper.build()
}

#[test]
fn test_continue_reevaluates_condition() {
    let code = continue_loop().unwrap();

    // continue at 8, break at 12, back-edge at 13, then at 14, else at 16.
    assert_eq!(code[8], Instruction::Jump(-8), "continue -> loop head");
    assert_eq!(code[12], Instruction::Jump(4), "break -> else arm");
    assert_eq!(code[13], Instruction::Jump(-13), "back-edge -> loop head");
    assert_jumps_in_bounds(&code);

    let mut registers = vec![Value::Number(0.0)];
    let trace = run(&code, &mut registers);

    let continue_hits: Vec<usize> = trace
        .iter()
        .enumerate()
        .filter(|(_, ip)| **ip == 8)
        .map(|(position, _)| position)
        .collect();
    assert_eq!(continue_hits.len(), 1, "continue fires exactly once");

    // The instruction executed right after the continue is the first of the
    // condition's evaluation sequence, not the top of the body.
    assert_eq!(trace[continue_hits[0] + 1], 0);

    assert_eq!(get(&registers, 6), Value::atom("broken"));
    assert!(!trace.contains(&14), "then arm must not run on a break exit");
}

#[test]
fn test_loop_exit_routing() {
    let code = continue_loop().unwrap();
    let jump_target = |index: usize| {
        let offset = code[index].jump_offset().expect("site must be a jump");
        index as i64 + i64::from(offset)
    };
    assert_eq!(jump_target(2), 14, "exit test lands on the then-arm start");
    assert_eq!(jump_target(12), 16, "break lands on the else-arm start");
    assert_eq!(jump_target(8), 0, "continue lands on the loop head");
    assert_eq!(jump_target(15), 17, "then-arm exit skips the else arm");
}

#[test]
fn test_else_without_then_arm() {
    let mut looper = LoopBuilder::new();
    looper.start_loop(Condition::from_register(1)).unwrap();
    looper.add_break().unwrap();
    looper.start_else().unwrap();
    looper
        .append(Instruction::LoadConst(6, Value::atom("stopped")))
        .unwrap();
    let code = looper.build().unwrap();

    // Empty then arm: the natural exit still skips the else arm.
    assert_eq!(
        code,
        vec![
            Instruction::JumpIfFalse(1, 3),
            Instruction::Jump(3), // break -> else at 4
            Instruction::Jump(-2),
            Instruction::Jump(2), // skip-else -> end at 5
            Instruction::LoadConst(6, Value::atom("stopped")),
        ]
    );

    let mut registers = vec![Value::Undefined, Value::Boolean(true)];
    let trace = run(&code, &mut registers);
    assert_eq!(get(&registers, 6), Value::atom("stopped"));
    assert_eq!(trace, vec![0, 1, 4]);

    // Natural exit: condition false on entry skips the else arm entirely.
    let mut registers = vec![Value::Undefined, Value::Boolean(false)];
    let trace = run(&code, &mut registers);
    assert_eq!(trace, vec![0, 3]);
    assert_eq!(get(&registers, 6), Value::Undefined);
}

#[test]
fn test_loop_without_arms_has_no_exit_jumps() {
    let mut looper = LoopBuilder::new();
    looper.start_loop(Condition::from_register(0)).unwrap();
    looper.append(Instruction::Nop).unwrap();
    let code = looper.build().unwrap();

    assert_eq!(
        code,
        vec![
            Instruction::JumpIfFalse(0, 3),
            Instruction::Nop,
            Instruction::Jump(-2),
        ]
    );
}

#[test]
fn test_loop_usage_errors() {
    let mut looper = LoopBuilder::new();
    assert_usage(looper.append(Instruction::Nop));
    assert_usage(looper.add_break());
    assert_usage(looper.add_continue());
    assert_usage(looper.start_then());
    assert_usage(looper.start_else());

    looper.start_loop(Condition::from_register(0)).unwrap();
    assert_usage(looper.start_loop(Condition::from_register(1)));

    looper.start_then().unwrap();
    assert_usage(looper.start_then());
    assert_usage(looper.add_break());
    assert_usage(looper.add_continue());

    looper.start_else().unwrap();
    assert_usage(looper.start_else());
    assert_usage(looper.start_then());

    assert_usage(LoopBuilder::new().build());
}

#[test]
fn test_condition_forms() {
    let register = Condition::from_register(4);
    assert_eq!(register.result_register(), 4);
    assert!(register.instructions_to_emit().is_empty());

    let computed = Condition::from_instructions(
        vec![
            Instruction::LoadConst(1, Value::Number(0.0)),
            Instruction::GreaterThan(2, 0, 1),
        ],
        2,
    );
    assert_eq!(computed.result_register(), 2);
    assert_eq!(computed.instructions_to_emit().len(), 2);
}
