//! Instruction kinds.
//!
//! Operand layout per kind:
//!
//! | kind      | operands                 |
//! |-----------|--------------------------|
//! | `Binary`  | `[lhs, rhs]`             |
//! | `Branch`  | `[cond]`                 |
//! | `Jump`    | `[]`                     |
//! | `Return`  | `[]` or `[value]`        |
//! | `Gep`     | `[base, index]`          |
//! | `Load`    | `[base, index]`          |
//! | `Store`   | `[base, index, data]`    |
//! | `Call`    | arguments                |
//! | `Alloca`  | `[]`                     |
//! | `Phi`     | one slot per predecessor |
//! | `Print`   | one per `Arg` piece      |

use super::{BlockId, FuncId, StringId, ValueId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_compare(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne
        )
    }

    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Mul | BinaryOp::Eq | BinaryOp::Ne | BinaryOp::And | BinaryOp::Or
        )
    }

    /// The operator that gives the same result with operands exchanged.
    pub fn swapped(self) -> Option<BinaryOp> {
        match self {
            BinaryOp::Lt => Some(BinaryOp::Gt),
            BinaryOp::Gt => Some(BinaryOp::Lt),
            BinaryOp::Le => Some(BinaryOp::Ge),
            BinaryOp::Ge => Some(BinaryOp::Le),
            op if op.is_commutative() => Some(op),
            _ => None,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Mod => "mod",
            BinaryOp::Lt => "lt",
            BinaryOp::Le => "le",
            BinaryOp::Gt => "gt",
            BinaryOp::Ge => "ge",
            BinaryOp::Eq => "eq",
            BinaryOp::Ne => "ne",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<BinaryOp> {
        Some(match s {
            "add" => BinaryOp::Add,
            "sub" => BinaryOp::Sub,
            "mul" => BinaryOp::Mul,
            "div" => BinaryOp::Div,
            "mod" => BinaryOp::Mod,
            "lt" => BinaryOp::Lt,
            "le" => BinaryOp::Le,
            "gt" => BinaryOp::Gt,
            "ge" => BinaryOp::Ge,
            "eq" => BinaryOp::Eq,
            "ne" => BinaryOp::Ne,
            "and" => BinaryOp::And,
            "or" => BinaryOp::Or,
            _ => return None,
        })
    }

    /// Evaluate with 32-bit wrapping semantics. Division by zero yields `None`.
    pub fn eval(self, lhs: i32, rhs: i32) -> Option<i32> {
        Some(match self {
            BinaryOp::Add => lhs.wrapping_add(rhs),
            BinaryOp::Sub => lhs.wrapping_sub(rhs),
            BinaryOp::Mul => lhs.wrapping_mul(rhs),
            BinaryOp::Div => {
                if rhs == 0 {
                    return None;
                }
                lhs.wrapping_div(rhs)
            }
            BinaryOp::Mod => {
                if rhs == 0 {
                    return None;
                }
                lhs.wrapping_rem(rhs)
            }
            BinaryOp::Lt => (lhs < rhs) as i32,
            BinaryOp::Le => (lhs <= rhs) as i32,
            BinaryOp::Gt => (lhs > rhs) as i32,
            BinaryOp::Ge => (lhs >= rhs) as i32,
            BinaryOp::Eq => (lhs == rhs) as i32,
            BinaryOp::Ne => (lhs != rhs) as i32,
            BinaryOp::And => lhs & rhs,
            BinaryOp::Or => lhs | rhs,
        })
    }
}

/// Runtime functions every module can call but never defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    GetInt,
    PutInt,
    PutCh,
    PutStr,
}

impl Builtin {
    pub const ALL: [Builtin; 4] = [Builtin::GetInt, Builtin::PutInt, Builtin::PutCh, Builtin::PutStr];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::GetInt => "getint",
            Builtin::PutInt => "putint",
            Builtin::PutCh => "putch",
            Builtin::PutStr => "putstr",
        }
    }

    pub fn from_name(name: &str) -> Option<Builtin> {
        Self::ALL.iter().copied().find(|b| b.name() == name)
    }

    pub fn returns_value(self) -> bool {
        matches!(self, Builtin::GetInt)
    }

    pub fn param_count(self) -> usize {
        match self {
            Builtin::GetInt => 0,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callee {
    Func(FuncId),
    Builtin(Builtin),
}

/// One piece of a lowered `printf` format string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintPiece {
    Str(StringId),
    /// Consumes the next operand and prints it as an integer.
    Arg,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstKind {
    Binary(BinaryOp),
    Branch { then_block: BlockId, else_block: BlockId },
    Jump { target: BlockId },
    Return,
    Gep { multiplier: i32 },
    Load,
    Store,
    Call { callee: Callee },
    Alloca { words: u32 },
    Phi,
    Print { pieces: Vec<PrintPiece> },
}

impl InstKind {
    pub fn is_terminator(&self) -> bool {
        matches!(self, InstKind::Branch { .. } | InstKind::Jump { .. } | InstKind::Return)
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, InstKind::Phi)
    }

    /// Successor targets, in (true, false) order.
    pub fn targets(&self) -> Vec<BlockId> {
        match self {
            InstKind::Branch { then_block, else_block } => vec![*then_block, *else_block],
            InstKind::Jump { target } => vec![*target],
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstData {
    pub kind: InstKind,
    pub(crate) operands: Vec<ValueId>,
    pub(crate) result: Option<ValueId>,
    /// Owning block, `None` while detached or after removal.
    pub(crate) block: Option<BlockId>,
}

impl InstData {
    pub fn operands(&self) -> &[ValueId] {
        &self.operands
    }

    pub fn result(&self) -> Option<ValueId> {
        self.result
    }

    pub fn block(&self) -> Option<BlockId> {
        self.block
    }
}
