//! Runtime stubs for the builtin registry.
//!
//! Each builtin is a three-instruction MARS syscall wrapper. Stubs only touch
//! `v0` (and read `a0`), so calling one never disturbs allocated registers.

use crate::ir::Builtin;

/// MARS syscall service number of a builtin.
pub fn syscall_code(builtin: Builtin) -> i32 {
    match builtin {
        Builtin::GetInt => 5,
        Builtin::PutInt => 1,
        Builtin::PutCh => 11,
        Builtin::PutStr => 4,
    }
}

pub fn builtin_label(builtin: Builtin) -> String {
    format!("rt_{}", builtin.name())
}

/// Builtin behind a stub label, if any.
pub fn builtin_for_label(label: &str) -> Option<Builtin> {
    label.strip_prefix("rt_").and_then(Builtin::from_name)
}

/// Assembly text of every stub, appended after the module's functions.
pub fn runtime_stubs() -> String {
    let mut out = String::new();
    for builtin in Builtin::ALL {
        out.push_str(&format!("{}:\n", builtin_label(builtin)));
        out.push_str(&format!("  li $v0, {}\n", syscall_code(builtin)));
        out.push_str("  syscall\n");
        out.push_str("  jr $ra\n");
    }
    out
}
