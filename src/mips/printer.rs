//! MARS-style assembly text.

use super::function::{DataItem, MachineFunction, MachineModule};
use super::instruction::MInst;
use super::operand::MachineOperand;
use super::runtime::runtime_stubs;
use std::fmt::Write;

fn escape_ascii(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'\n' => out.push_str("\\n"),
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            _ => out.push(b as char),
        }
    }
    out
}

pub fn print_data(data: &[DataItem]) -> String {
    let mut out = String::from(".data\n");
    for item in data {
        match item {
            DataItem::Words { label, values } => {
                let words: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                let _ = writeln!(out, "{}: .word {}", label, words.join(", "));
            }
            DataItem::Ascii { label, bytes } => {
                let _ = writeln!(out, "{}: .asciiz \"{}\"", label, escape_ascii(bytes));
            }
        }
    }
    out
}

/// One instruction as assembly lines, without indentation.
pub fn format_inst(mf: &MachineFunction, inst: &MInst) -> Vec<String> {
    let line = match inst {
        MInst::Binary { op, dst, lhs, rhs } => {
            let mnemonic = match rhs {
                MachineOperand::Immediate(_) => op.imm_mnemonic(),
                _ => op.mnemonic(),
            };
            format!("{} {}, {}, {}", mnemonic, dst, lhs, rhs)
        }
        MInst::Compare { cond, dst, lhs, rhs } => {
            let immediate = matches!(rhs, MachineOperand::Immediate(_));
            format!("{} {}, {}, {}", cond.set_mnemonic(immediate), dst, lhs, rhs)
        }
        MInst::Move { dst, src: src @ MachineOperand::Immediate(_) } => format!("li {}, {}", dst, src),
        MInst::Move { dst, src } => format!("move {}, {}", dst, src),
        MInst::LoadAddr { dst, symbol } => format!("la {}, {}", dst, symbol),
        MInst::Load { dst, base, offset } => format!("lw {}, {}({})", dst, offset, base),
        MInst::Store { src, base, offset } => format!("sw {}, {}({})", src, offset, base),
        MInst::Branch { cond, lhs, rhs, target } => format!(
            "{} {}, {}, {}",
            cond.branch_mnemonic(),
            lhs,
            rhs,
            mf.block(*target).label
        ),
        MInst::Jump { target } => format!("j {}", mf.block(*target).label),
        MInst::Call { callee, stack_args, .. } if *stack_args > 0 => {
            let bytes = 4 * *stack_args as i32;
            return vec![
                format!("addiu $sp, $sp, {}", -bytes),
                format!("jal {}", callee),
                format!("addiu $sp, $sp, {}", bytes),
            ];
        }
        MInst::Call { callee, .. } => format!("jal {}", callee),
        MInst::Return { .. } => "jr $ra".to_string(),
        MInst::Syscall => "syscall".to_string(),
    };
    vec![line]
}

pub fn print_function(mf: &MachineFunction) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}:", mf.label());
    for b in mf.block_ids() {
        let _ = writeln!(out, "{}:", mf.block(b).label);
        for &id in mf.insts_of(b) {
            for line in format_inst(mf, mf.inst(id)) {
                let _ = writeln!(out, "  {}", line);
            }
        }
    }
    out
}

/// The whole program: data, `main`, the other functions, runtime stubs.
pub fn print_module(module: &MachineModule) -> String {
    let mut out = print_data(&module.data);
    out.push_str("\n.text\n");
    let main = module.functions.iter().filter(|f| f.is_main);
    let rest = module.functions.iter().filter(|f| !f.is_main);
    for f in main.chain(rest) {
        out.push_str(&print_function(f));
        out.push('\n');
    }
    out.push_str(&runtime_stubs());
    out
}
