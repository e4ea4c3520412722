//! Intermediate forms consumed by inliners.
//!
//! A high-level inliner rewrites a call on the syntax tree ([`Expr`]) before
//! lowering. An assembly inliner appends [`Instruction`]s to the lowered code
//! of the caller instead of emitting a call.

use crate::symbol::Symbol;
use crate::value::{NativeType, Value};

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-x`
    Negate,
    /// `!x`
    Not,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `a + b`
    Add,
    /// `a - b`
    Sub,
    /// `a * b`
    Mul,
    /// `a / b`
    Div,
    /// `a < b`
    Less,
    /// `a > b`
    Greater,
}

/// Expression tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal.
    Immediate(Value),
    /// The n-th argument of the inlined call.
    Argument(usize),
    /// A named variable.
    Variable(Symbol),
    /// `op operand`
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },
    /// `lhs op rhs`
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// `condition ? if_true : if_false`
    Ternary {
        /// Condition.
        condition: Box<Expr>,
        /// Value if the condition is non-zero.
        if_true: Box<Expr>,
        /// Value otherwise.
        if_false: Box<Expr>,
    },
    /// A function call that was not inlined.
    Call {
        /// Callee.
        function: Symbol,
        /// Arguments.
        args: Vec<Expr>,
    },
}

impl Expr {
    /// `op operand`
    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    /// `lhs op rhs`
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// `condition ? if_true : if_false`
    pub fn ternary(condition: Expr, if_true: Expr, if_false: Expr) -> Self {
        Expr::Ternary {
            condition: Box::new(condition),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        }
    }

    /// Folds the expression if it only depends on literals.
    pub fn constant_value(&self) -> Option<Value> {
        self.evaluate(&[])
    }

    /// Evaluates the expression with the given call arguments.
    ///
    /// Variables and calls are not evaluated and yield `None`.
    pub fn evaluate(&self, args: &[Value]) -> Option<Value> {
        match self {
            Expr::Immediate(v) => Some(*v),
            Expr::Argument(i) => args.get(*i).copied(),
            Expr::Variable(_) | Expr::Call { .. } => None,
            Expr::Unary { op, operand } => {
                let v = operand.evaluate(args)?;
                Some(match op {
                    UnaryOp::Negate => scalar(v.native_type(), -v.to_f64()),
                    UnaryOp::Not => Value::Integer(i32::from(v.to_f64() == 0.0)),
                })
            }
            Expr::Binary { op, lhs, rhs } => {
                let l = lhs.evaluate(args)?;
                let r = rhs.evaluate(args)?;
                let t = l.native_type();
                let (a, b) = (l.to_f64(), r.to_f64());
                Some(match op {
                    BinaryOp::Add => scalar(t, a + b),
                    BinaryOp::Sub => scalar(t, a - b),
                    BinaryOp::Mul => scalar(t, a * b),
                    BinaryOp::Div => scalar(t, a / b),
                    BinaryOp::Less => Value::Integer(i32::from(a < b)),
                    BinaryOp::Greater => Value::Integer(i32::from(a > b)),
                })
            }
            Expr::Ternary {
                condition,
                if_true,
                if_false,
            } => {
                if condition.evaluate(args)?.to_f64() != 0.0 {
                    if_true.evaluate(args)
                } else {
                    if_false.evaluate(args)
                }
            }
        }
    }
}

fn scalar(t: NativeType, v: f64) -> Value {
    Value::Double(v).cast(t).unwrap_or(Value::Double(v))
}

/// Operand of a lowered instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    /// A virtual register.
    Register(u8),
    /// A literal.
    Immediate(Value),
}

/// Lowered instruction. `dst` is both input and output for arithmetic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    /// `dst = src`
    Mov {
        /// Destination register.
        dst: u8,
        /// Source.
        src: Operand,
    },
    /// `dst += src`
    Add {
        /// Destination register.
        dst: u8,
        /// Source.
        src: Operand,
    },
    /// `dst *= src`
    Mul {
        /// Destination register.
        dst: u8,
        /// Source.
        src: Operand,
    },
    /// `dst = min(dst, src)`
    Min {
        /// Destination register.
        dst: u8,
        /// Source.
        src: Operand,
    },
    /// `dst = max(dst, src)`
    Max {
        /// Destination register.
        dst: u8,
        /// Source.
        src: Operand,
    },
    /// `dst = -dst`
    Neg {
        /// Register.
        dst: u8,
    },
    /// `dst = |dst|`
    Abs {
        /// Register.
        dst: u8,
    },
    /// `dst = sqrt(dst)`
    Sqrt {
        /// Register.
        dst: u8,
    },
}

impl Instruction {
    /// Runs the instruction on a register file. Out-of-range registers are
    /// ignored.
    pub fn execute(&self, registers: &mut [f64]) {
        let read = |registers: &[f64], op: Operand| match op {
            Operand::Register(r) => registers.get(r as usize).copied().unwrap_or(0.0),
            Operand::Immediate(v) => v.to_f64(),
        };

        let (dst, value) = match *self {
            Instruction::Mov { dst, src } => (dst, read(registers, src)),
            Instruction::Add { dst, src } => (dst, read(registers, Operand::Register(dst)) + read(registers, src)),
            Instruction::Mul { dst, src } => (dst, read(registers, Operand::Register(dst)) * read(registers, src)),
            Instruction::Min { dst, src } => (dst, read(registers, Operand::Register(dst)).min(read(registers, src))),
            Instruction::Max { dst, src } => (dst, read(registers, Operand::Register(dst)).max(read(registers, src))),
            Instruction::Neg { dst } => (dst, -read(registers, Operand::Register(dst))),
            Instruction::Abs { dst } => (dst, read(registers, Operand::Register(dst)).abs()),
            Instruction::Sqrt { dst } => (dst, read(registers, Operand::Register(dst)).sqrt()),
        };

        if let Some(slot) = registers.get_mut(dst as usize) {
            *slot = value;
        }
    }
}

/// Input/output of a high-level inliner.
#[derive(Debug, Clone, Default)]
pub struct SyntaxTreeInlineData {
    /// Argument expressions of the call.
    pub args: Vec<Expr>,
    /// Object expression for member calls.
    pub object: Option<Expr>,
    /// Expression that replaces the call, set by the inliner.
    pub replacement: Option<Expr>,
}

/// Input/output of an assembly inliner.
#[derive(Debug, Clone)]
pub struct AsmInlineData {
    /// Register receiving the result.
    pub target: u8,
    /// Argument operands.
    pub args: Vec<Operand>,
    /// Scalar kind of the operation.
    pub native_type: NativeType,
    /// Code emitted by the inliner.
    pub code: Vec<Instruction>,
}

impl AsmInlineData {
    /// Empty emission buffer for a call with the given arguments.
    pub fn new(target: u8, args: Vec<Operand>, native_type: NativeType) -> Self {
        Self {
            target,
            args,
            native_type,
            code: Vec::new(),
        }
    }

    /// Runs the emitted code and returns the target register.
    pub fn run(&self, registers: &mut [f64]) -> f64 {
        for instruction in &self.code {
            instruction.execute(registers);
        }
        registers.get(self.target as usize).copied().unwrap_or(0.0)
    }
}

/// Data handed to an inliner; the variant selects the strategy.
#[derive(Debug, Clone)]
pub enum InlineData {
    /// Syntax tree substitution.
    HighLevel(SyntaxTreeInlineData),
    /// Instruction emission.
    Asm(AsmInlineData),
}

impl InlineData {
    /// Whether this requests the high-level strategy.
    pub fn is_high_level(&self) -> bool {
        matches!(self, InlineData::HighLevel(_))
    }
}
