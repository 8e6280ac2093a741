//! LLVM-style textual dump of a module.
//!
//! Values are untyped 32-bit words inside the graph; the dump spells them
//! as `i32` and spells addresses of globals, strings and array slots as
//! `i32*`/`i8*` so the output reads like ordinary LLVM IR. Compares print as
//! `icmp` plus `zext`, and memory accesses print their address computation
//! as a separate `getelementptr`.

use super::function::Function;
use super::instruction::{BinaryOp, Builtin, Callee, InstKind, PrintPiece};
use super::module::Module;
use super::value::ValueKind;
use super::{InstId, ValueId};
use std::fmt::Write;

pub fn print_module(module: &Module) -> String {
    let mut out = String::new();
    for builtin in Builtin::ALL {
        let _ = writeln!(out, "{}", builtin_decl(builtin));
    }
    if !module.globals().is_empty() || !module.strings().is_empty() {
        out.push('\n');
    }
    for global in module.globals() {
        let storage = if global.constant { "constant" } else { "global" };
        let words = global.initial_words();
        if global.is_array() {
            let init = if words.iter().all(|&w| w == 0) {
                "zeroinitializer".to_string()
            } else {
                let items: Vec<String> = words.iter().map(|w| format!("i32 {}", w)).collect();
                format!("[{}]", items.join(", "))
            };
            let _ = writeln!(
                out,
                "@{} = dso_local {} [{} x i32] {}",
                global.name, storage, global.words, init
            );
        } else {
            let _ = writeln!(out, "@{} = dso_local {} i32 {}", global.name, storage, words[0]);
        }
    }
    for string in module.strings() {
        let _ = writeln!(
            out,
            "@{} = constant [{} x i8] c\"{}\\00\"",
            string.name, string.len, string.text
        );
    }
    for func in &module.functions {
        out.push('\n');
        out.push_str(&print_function(module, func));
    }
    out
}

fn builtin_decl(builtin: Builtin) -> &'static str {
    match builtin {
        Builtin::GetInt => "declare i32 @getint()",
        Builtin::PutInt => "declare void @putint(i32)",
        Builtin::PutCh => "declare void @putch(i32)",
        Builtin::PutStr => "declare void @putstr(i8*)",
    }
}

struct FunctionPrinter<'a> {
    module: &'a Module,
    func: &'a Function,
    next_temp: usize,
    out: String,
}

pub fn print_function(module: &Module, func: &Function) -> String {
    let mut printer = FunctionPrinter {
        module,
        func,
        next_temp: 0,
        out: String::new(),
    };
    printer.print();
    printer.out
}

impl<'a> FunctionPrinter<'a> {
    fn temp(&mut self) -> String {
        let t = format!("%t{}", self.next_temp);
        self.next_temp += 1;
        t
    }

    fn operand(&self, v: ValueId) -> String {
        let data = self.func.value(v);
        match data.kind {
            ValueKind::Const(c) => c.to_string(),
            ValueKind::Global(g) => {
                let global = self.module.global(g);
                if global.is_array() {
                    format!(
                        "getelementptr inbounds ([{n} x i32], [{n} x i32]* @{name}, i32 0, i32 0)",
                        n = global.words,
                        name = global.name
                    )
                } else {
                    format!("@{}", global.name)
                }
            }
            ValueKind::Str(s) => {
                let string = self.module.string(s);
                format!(
                    "getelementptr inbounds ([{n} x i8], [{n} x i8]* @{name}, i32 0, i32 0)",
                    n = string.len,
                    name = string.name
                )
            }
            ValueKind::Param(_) | ValueKind::Inst(_) => self.func.value_label(v),
        }
    }

    fn typed(&self, v: ValueId) -> String {
        format!("{} {}", self.type_of(v), self.operand(v))
    }

    fn type_of(&self, v: ValueId) -> &'static str {
        match self.func.value(v).kind {
            ValueKind::Global(_) => "i32*",
            ValueKind::Str(_) => "i8*",
            ValueKind::Inst(inst) => match self.func.kind(inst) {
                InstKind::Alloca { .. } | InstKind::Gep { .. } => "i32*",
                _ => "i32",
            },
            _ => "i32",
        }
    }

    fn print(&mut self) {
        let ret_ty = if self.func.returns_value { "i32" } else { "void" };
        let params: Vec<String> = self
            .func
            .params()
            .iter()
            .map(|&p| format!("i32 {}", self.func.value_label(p)))
            .collect();
        let _ = writeln!(
            self.out,
            "define dso_local {} @{}({}) {{",
            ret_ty,
            self.func.name,
            params.join(", ")
        );
        for (i, &block) in self.func.layout().iter().enumerate() {
            if i > 0 {
                self.out.push('\n');
            }
            let preds: Vec<String> = self
                .func
                .preds(block)
                .iter()
                .map(|&p| format!("%{}", self.func.block_name(p)))
                .collect();
            if preds.is_empty() {
                let _ = writeln!(self.out, "{}:", self.func.block_name(block));
            } else {
                let _ = writeln!(
                    self.out,
                    "{}:                                    ; preds = {}",
                    self.func.block_name(block),
                    preds.join(", ")
                );
            }
            for &inst in self.func.insts_of(block) {
                self.print_inst(inst);
            }
        }
        self.out.push_str("}\n");
    }

    fn line(&mut self, text: String) {
        self.out.push_str("  ");
        self.out.push_str(&text);
        self.out.push('\n');
    }

    fn address(&mut self, base: ValueId, index: ValueId) -> String {
        let t = self.temp();
        let text = format!(
            "{} = getelementptr inbounds i32, i32* {}, {}",
            t,
            self.operand(base),
            self.typed(index)
        );
        self.line(text);
        t
    }

    fn print_inst(&mut self, inst: InstId) {
        let func = self.func;
        let ops = func.operands(inst);
        let result = func.result(inst).map(|r| func.value_label(r));
        let res = result.clone().unwrap_or_default();
        match func.kind(inst) {
            InstKind::Binary(op) if op.is_compare() => {
                let cond = match op {
                    BinaryOp::Lt => "slt",
                    BinaryOp::Le => "sle",
                    BinaryOp::Gt => "sgt",
                    BinaryOp::Ge => "sge",
                    BinaryOp::Eq => "eq",
                    _ => "ne",
                };
                let t = self.temp();
                let text = format!("{} = icmp {} {}, {}", t, cond, self.typed(ops[0]), self.operand(ops[1]));
                self.line(text);
                self.line(format!("{} = zext i1 {} to i32", res, t));
            }
            InstKind::Binary(op) => {
                let mnemonic = match op {
                    BinaryOp::Div => "sdiv",
                    BinaryOp::Mod => "srem",
                    other => other.mnemonic(),
                };
                let text = format!("{} = {} {}, {}", res, mnemonic, self.typed(ops[0]), self.operand(ops[1]));
                self.line(text);
            }
            InstKind::Branch { then_block, else_block } => {
                let t = self.temp();
                let text = format!("{} = icmp ne {}, 0", t, self.typed(ops[0]));
                self.line(text);
                self.line(format!(
                    "br i1 {}, label %{}, label %{}",
                    t,
                    func.block_name(*then_block),
                    func.block_name(*else_block)
                ));
            }
            InstKind::Jump { target } => {
                self.line(format!("br label %{}", func.block_name(*target)));
            }
            InstKind::Return => match ops.first() {
                Some(&v) => {
                    let text = format!("ret {}", self.typed(v));
                    self.line(text);
                }
                None => self.line("ret void".to_string()),
            },
            InstKind::Gep { multiplier } => {
                let index = if *multiplier == 1 {
                    self.typed(ops[1])
                } else {
                    let t = self.temp();
                    let text = format!("{} = mul {}, {}", t, self.typed(ops[1]), multiplier);
                    self.line(text);
                    format!("i32 {}", t)
                };
                let text = format!(
                    "{} = getelementptr inbounds i32, i32* {}, {}",
                    res,
                    self.operand(ops[0]),
                    index
                );
                self.line(text);
            }
            InstKind::Load => {
                let addr = self.address(ops[0], ops[1]);
                self.line(format!("{} = load i32, i32* {}", res, addr));
            }
            InstKind::Store => {
                let addr = self.address(ops[0], ops[1]);
                let text = format!("store {}, i32* {}", self.typed(ops[2]), addr);
                self.line(text);
            }
            InstKind::Call { callee } => {
                let (name, returns) = match callee {
                    Callee::Func(f) => {
                        let target = self.module.function(*f);
                        (target.name.clone(), target.returns_value)
                    }
                    Callee::Builtin(b) => (b.name().to_string(), b.returns_value()),
                };
                let args: Vec<String> = ops.iter().map(|&a| self.typed(a)).collect();
                let text = if returns {
                    format!("{} = call i32 @{}({})", res, name, args.join(", "))
                } else {
                    format!("call void @{}({})", name, args.join(", "))
                };
                self.line(text);
            }
            InstKind::Alloca { words } => {
                if *words == 1 {
                    self.line(format!("{} = alloca i32", res));
                } else {
                    let t = self.temp();
                    self.line(format!("{} = alloca [{} x i32]", t, words));
                    self.line(format!(
                        "{} = getelementptr inbounds [{n} x i32], [{n} x i32]* {}, i32 0, i32 0",
                        res,
                        t,
                        n = words
                    ));
                }
            }
            InstKind::Phi => {
                let incoming: Vec<String> = ops
                    .iter()
                    .zip(func.preds(func.inst_block(inst).unwrap_or_else(|| func.entry())))
                    .map(|(&v, &p)| format!("[ {}, %{} ]", self.operand(v), func.block_name(p)))
                    .collect();
                self.line(format!("{} = phi i32 {}", res, incoming.join(", ")));
            }
            InstKind::Print { pieces } => {
                let mut args = ops.iter();
                for piece in pieces {
                    let text = match piece {
                        PrintPiece::Str(s) => {
                            let string = self.module.string(*s);
                            format!(
                                "call void @putstr(i8* getelementptr inbounds ([{n} x i8], [{n} x i8]* @{name}, i32 0, i32 0))",
                                n = string.len,
                                name = string.name
                            )
                        }
                        PrintPiece::Arg => match args.next() {
                            Some(&v) => format!("call void @putint({})", self.typed(v)),
                            None => "call void @putint(i32 undef)".to_string(),
                        },
                    };
                    self.line(text);
                }
            }
        }
    }
}
