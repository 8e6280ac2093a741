//! Values and use edges.

use super::{GlobalId, InstId, StringId};

/// What a value stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Result of an instruction.
    Inst(InstId),
    /// Function parameter by position.
    Param(u32),
    /// Interned integer constant.
    Const(i32),
    /// Address of a global variable.
    Global(GlobalId),
    /// Address of a string constant.
    Str(StringId),
}

/// One operand slot of one instruction reading a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Use {
    pub user: InstId,
    pub slot: usize,
}

#[derive(Debug, Clone)]
pub struct ValueData {
    pub kind: ValueKind,
    /// Optional source-level name, kept for dumps.
    pub name: Option<String>,
    /// Every live use of this value, exactly once each.
    pub(crate) uses: Vec<Use>,
    /// Cleared when the defining instruction is removed.
    pub(crate) live: bool,
}

impl ValueData {
    pub(crate) fn new(kind: ValueKind) -> Self {
        Self {
            kind,
            name: None,
            uses: Vec::new(),
            live: true,
        }
    }

    pub fn uses(&self) -> &[Use] {
        &self.uses
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn as_const(&self) -> Option<i32> {
        match self.kind {
            ValueKind::Const(c) => Some(c),
            _ => None,
        }
    }
}
