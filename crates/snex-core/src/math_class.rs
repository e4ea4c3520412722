//! The `Math` function class.
//!
//! Every function is registered for `float` and `double` and has a native
//! implementation. Most of them can also be inlined: the high-level inliner
//! folds constant arguments or substitutes an equivalent expression, the asm
//! inliner emits register instructions.

use crate::compiler::CompileError;
use crate::function::{FunctionData, FunctionPointer, Inliner};
use crate::function_class::FunctionClass;
use crate::inline::{AsmInlineData, BinaryOp, Expr, InlineData, Instruction, UnaryOp};
use crate::symbol::Symbol;
use crate::value::{NativeType, Value};

type Substitute = fn(&[Expr]) -> Option<Expr>;
type Emit = fn(&AsmInlineData) -> Vec<Instruction>;

struct MathFunction {
    id: &'static str,
    args: &'static [&'static str],
    native: fn(&[Value]) -> Value,
    substitute: Substitute,
    emit: Option<Emit>,
    description: &'static str,
}

const FUNCTIONS: &[MathFunction] = &[
    MathFunction {
        id: "abs",
        args: &["value"],
        native: |a: &[Value]| retype(a, arg(a, 0).abs()),
        substitute: |a: &[Expr]| {
            Some(Expr::ternary(
                Expr::binary(BinaryOp::Less, a[0].clone(), zero()),
                Expr::unary(UnaryOp::Negate, a[0].clone()),
                a[0].clone(),
            ))
        },
        emit: Some(|d: &AsmInlineData| {
            vec![
                Instruction::Mov { dst: d.target, src: d.args[0] },
                Instruction::Abs { dst: d.target },
            ]
        }),
        description: "Returns the absolute value.",
    },
    MathFunction {
        id: "min",
        args: &["value1", "value2"],
        native: |a: &[Value]| retype(a, arg(a, 0).min(arg(a, 1))),
        substitute: |a: &[Expr]| {
            Some(Expr::ternary(
                Expr::binary(BinaryOp::Less, a[0].clone(), a[1].clone()),
                a[0].clone(),
                a[1].clone(),
            ))
        },
        emit: Some(|d: &AsmInlineData| {
            vec![
                Instruction::Mov { dst: d.target, src: d.args[0] },
                Instruction::Min { dst: d.target, src: d.args[1] },
            ]
        }),
        description: "Returns the smaller value.",
    },
    MathFunction {
        id: "max",
        args: &["value1", "value2"],
        native: |a: &[Value]| retype(a, arg(a, 0).max(arg(a, 1))),
        substitute: |a: &[Expr]| {
            Some(Expr::ternary(
                Expr::binary(BinaryOp::Greater, a[0].clone(), a[1].clone()),
                a[0].clone(),
                a[1].clone(),
            ))
        },
        emit: Some(|d: &AsmInlineData| {
            vec![
                Instruction::Mov { dst: d.target, src: d.args[0] },
                Instruction::Max { dst: d.target, src: d.args[1] },
            ]
        }),
        description: "Returns the bigger value.",
    },
    MathFunction {
        id: "range",
        args: &["value", "lower", "upper"],
        native: |a: &[Value]| retype(a, arg(a, 0).max(arg(a, 1)).min(arg(a, 2))),
        substitute: |a: &[Expr]| {
            let lower_bound = Expr::ternary(
                Expr::binary(BinaryOp::Less, a[0].clone(), a[1].clone()),
                a[1].clone(),
                a[0].clone(),
            );
            Some(Expr::ternary(
                Expr::binary(BinaryOp::Greater, lower_bound.clone(), a[2].clone()),
                a[2].clone(),
                lower_bound,
            ))
        },
        emit: Some(|d: &AsmInlineData| {
            vec![
                Instruction::Mov { dst: d.target, src: d.args[0] },
                Instruction::Max { dst: d.target, src: d.args[1] },
                Instruction::Min { dst: d.target, src: d.args[2] },
            ]
        }),
        description: "Clamps the value between lower and upper.",
    },
    MathFunction {
        id: "map",
        args: &["normalised", "start", "end"],
        native: |a: &[Value]| retype(a, arg(a, 1) + arg(a, 0) * (arg(a, 2) - arg(a, 1))),
        substitute: |a: &[Expr]| {
            Some(Expr::binary(
                BinaryOp::Add,
                a[1].clone(),
                Expr::binary(
                    BinaryOp::Mul,
                    a[0].clone(),
                    Expr::binary(BinaryOp::Sub, a[2].clone(), a[1].clone()),
                ),
            ))
        },
        emit: Some(|d: &AsmInlineData| {
            vec![
                Instruction::Mov { dst: d.target, src: d.args[1] },
                Instruction::Neg { dst: d.target },
                Instruction::Add { dst: d.target, src: d.args[2] },
                Instruction::Mul { dst: d.target, src: d.args[0] },
                Instruction::Add { dst: d.target, src: d.args[1] },
            ]
        }),
        description: "Maps a normalised value to the range start..end.",
    },
    MathFunction {
        id: "sqrt",
        args: &["value"],
        native: |a: &[Value]| retype(a, arg(a, 0).sqrt()),
        substitute: |_: &[Expr]| None,
        emit: Some(|d: &AsmInlineData| {
            vec![
                Instruction::Mov { dst: d.target, src: d.args[0] },
                Instruction::Sqrt { dst: d.target },
            ]
        }),
        description: "Returns the square root.",
    },
    MathFunction {
        id: "sin",
        args: &["value"],
        native: |a: &[Value]| retype(a, arg(a, 0).sin()),
        substitute: |_: &[Expr]| None,
        emit: None,
        description: "Calculates the sine value (radian based).",
    },
    MathFunction {
        id: "cos",
        args: &["value"],
        native: |a: &[Value]| retype(a, arg(a, 0).cos()),
        substitute: |_: &[Expr]| None,
        emit: None,
        description: "Calculates the cosine value (radian based).",
    },
];

fn arg(args: &[Value], index: usize) -> f64 {
    args.get(index).map_or(0.0, Value::to_f64)
}

fn retype(args: &[Value], v: f64) -> Value {
    let t = args.first().map_or(NativeType::Double, |a| a.native_type());
    Value::Double(v).cast(t).unwrap_or(Value::Double(v))
}

fn zero() -> Expr {
    Expr::Immediate(Value::Integer(0))
}

fn high_level_inliner(
    id: Symbol,
    native: fn(&[Value]) -> Value,
    substitute: Substitute,
) -> impl Fn(&mut InlineData) -> Result<(), CompileError> + Send + Sync + 'static {
    move |data| {
        let InlineData::HighLevel(d) = data else {
            return Err(CompileError::new(format!("{id}: expected syntax tree data")));
        };

        let constants: Option<Vec<Value>> = d.args.iter().map(Expr::constant_value).collect();
        d.replacement = Some(match constants {
            Some(values) => Expr::Immediate(native(&values)),
            None => substitute(&d.args).unwrap_or_else(|| Expr::Call {
                function: id.clone(),
                args: d.args.clone(),
            }),
        });
        Ok(())
    }
}

fn asm_inliner(
    id: Symbol,
    num_args: usize,
    emit: Emit,
) -> impl Fn(&mut InlineData) -> Result<(), CompileError> + Send + Sync + 'static {
    move |data| {
        let InlineData::Asm(d) = data else {
            return Err(CompileError::new(format!("{id}: expected asm data")));
        };
        if d.args.len() != num_args {
            return Err(CompileError::new(format!(
                "{id}: expected {num_args} arguments, got {}",
                d.args.len()
            )));
        }

        let code = emit(d);
        d.code.extend(code);
        Ok(())
    }
}

/// Builds the `Math` class with all functions and constants.
pub fn math_function_class() -> FunctionClass {
    let mut class = FunctionClass::new("Math").with_description("Math functions and constants");

    for t in [NativeType::Float, NativeType::Double] {
        for f in FUNCTIONS {
            let id = class.qualify(f.id);

            let mut inliner = Inliner::new(id.clone())
                .with_high_level(high_level_inliner(id.clone(), f.native, f.substitute));
            if let Some(emit) = f.emit {
                inliner = inliner.with_asm(asm_inliner(id.clone(), f.args.len(), emit));
            }

            let data = f
                .args
                .iter()
                .fold(FunctionData::new(id, t), |data, a| data.with_arg(a, t))
                .with_function(FunctionPointer::Free(f.native))
                .with_inliner(inliner)
                .with_description(f.description);

            class.add_function(data);
        }
    }

    class.add_function_constant("PI", Value::Double(std::f64::consts::PI));
    class.add_function_constant("E", Value::Double(std::f64::consts::E));
    class.add_function_constant("SQRT2", Value::Double(std::f64::consts::SQRT_2));
    class
}
