//! Reader for the textual IR.
//!
//! Parsing runs in two steps. The first step tokenizes every line, registers
//! globals, strings and function signatures, and collects each function body
//! as a list of statements. The second step emits every body through the
//! [`FunctionBuilder`]. Because signatures are known up front, calls may name
//! functions defined further down. Inside a function, blocks are emitted once
//! every value they read is defined, and phi operands are filled in last,
//! in predecessor order.

use crate::core::{CompileError, CompileResult};
use crate::ir::{BinaryOp, BlockId, Builtin, FuncId, Function, FunctionBuilder, InstId, Module, ValueId};
use hashbrown::{HashMap, HashSet};

/// Parse a whole module.
pub fn parse_module(text: &str) -> CompileResult<Module> {
    Parser::new(text)?.parse()
}

fn error(line: usize, message: impl Into<String>) -> CompileError {
    CompileError::Parse {
        line,
        message: message.into(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token<'a> {
    Ident(&'a str),
    /// `%name`
    Local(&'a str),
    /// `@name`
    Symbol(&'a str),
    /// `^name`
    Block(&'a str),
    Int(i64),
    /// String literal, quotes included.
    Str(&'a str),
    Arrow,
    Punct(char),
}

fn is_name_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'.'
}

fn tokenize(line: usize, text: &str) -> CompileResult<Vec<Token<'_>>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b';' => break,
            b' ' | b'\t' | b'\r' => i += 1,
            b'%' | b'@' | b'^' => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && is_name_byte(bytes[end]) {
                    end += 1;
                }
                if end == start {
                    return Err(error(line, format!("expected a name after '{}'", c as char)));
                }
                let name = &text[start..end];
                tokens.push(match c {
                    b'%' => Token::Local(name),
                    b'@' => Token::Symbol(name),
                    _ => Token::Block(name),
                });
                i = end;
            }
            b'"' => {
                let start = i;
                i += 1;
                loop {
                    match bytes.get(i) {
                        None => return Err(error(line, "unterminated string literal")),
                        Some(b'\\') => i += 2,
                        Some(b'"') => {
                            i += 1;
                            break;
                        }
                        Some(_) => i += 1,
                    }
                }
                tokens.push(Token::Str(&text[start..i]));
            }
            b'-' if bytes.get(i + 1) == Some(&b'>') => {
                tokens.push(Token::Arrow);
                i += 2;
            }
            b'-' | b'0'..=b'9' => {
                let start = i;
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let literal = &text[start..i];
                let value = literal
                    .parse::<i64>()
                    .map_err(|_| error(line, format!("invalid integer '{}'", literal)))?;
                tokens.push(Token::Int(value));
            }
            b'=' | b',' | b'(' | b')' | b'[' | b']' | b'{' | b'}' | b':' => {
                tokens.push(Token::Punct(c as char));
                i += 1;
            }
            _ if c.is_ascii_alphabetic() || c == b'_' => {
                let start = i;
                while i < bytes.len() && is_name_byte(bytes[i]) {
                    i += 1;
                }
                tokens.push(Token::Ident(&text[start..i]));
            }
            _ => {
                let ch = text[i..].chars().next().unwrap_or('?');
                return Err(error(line, format!("unexpected character '{}'", ch)));
            }
        }
    }
    Ok(tokens)
}

/// Walks the tokens of one line.
struct Cursor<'t, 'a> {
    line: usize,
    tokens: &'t [Token<'a>],
    pos: usize,
}

impl<'t, 'a> Cursor<'t, 'a> {
    fn new(line: usize, tokens: &'t [Token<'a>]) -> Self {
        Self { line, tokens, pos: 0 }
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        error(self.line, message)
    }

    fn peek(&self) -> Option<Token<'a>> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token<'a>> {
        let tok = self.peek();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn is_done(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(Token::Punct(c)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> CompileResult<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", c)))
        }
    }

    fn ident(&mut self) -> CompileResult<&'a str> {
        match self.next() {
            Some(Token::Ident(s)) => Ok(s),
            _ => Err(self.error("expected an identifier")),
        }
    }

    fn local(&mut self) -> CompileResult<&'a str> {
        match self.next() {
            Some(Token::Local(s)) => Ok(s),
            _ => Err(self.error("expected a %value")),
        }
    }

    fn symbol(&mut self) -> CompileResult<&'a str> {
        match self.next() {
            Some(Token::Symbol(s)) => Ok(s),
            _ => Err(self.error("expected an @symbol")),
        }
    }

    fn block(&mut self) -> CompileResult<&'a str> {
        match self.next() {
            Some(Token::Block(s)) => Ok(s),
            _ => Err(self.error("expected a ^block")),
        }
    }

    fn string(&mut self) -> CompileResult<&'a str> {
        match self.next() {
            Some(Token::Str(s)) => Ok(s),
            _ => Err(self.error("expected a string literal")),
        }
    }

    fn int(&mut self) -> CompileResult<i32> {
        match self.next() {
            Some(Token::Int(v)) => {
                i32::try_from(v).map_err(|_| self.error(format!("integer {} does not fit in 32 bits", v)))
            }
            _ => Err(self.error("expected an integer")),
        }
    }

    fn operand(&mut self) -> CompileResult<Operand<'a>> {
        match self.peek() {
            Some(Token::Local(s)) => {
                self.pos += 1;
                Ok(Operand::Local(s))
            }
            Some(Token::Symbol(s)) => {
                self.pos += 1;
                Ok(Operand::Symbol(s))
            }
            Some(Token::Int(_)) => Ok(Operand::Int(self.int()?)),
            _ => Err(self.error("expected an operand")),
        }
    }

    fn finish(&self) -> CompileResult<()> {
        if self.is_done() {
            Ok(())
        } else {
            Err(self.error(format!("unexpected trailing input {:?}", self.tokens[self.pos])))
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Operand<'a> {
    Local(&'a str),
    Symbol(&'a str),
    Int(i32),
}

#[derive(Debug)]
enum Op<'a> {
    Binary(BinaryOp, Operand<'a>, Operand<'a>),
    Alloca(u32),
    Load(Operand<'a>, Operand<'a>),
    Store(Operand<'a>, Operand<'a>, Operand<'a>),
    Gep(Operand<'a>, Operand<'a>, i32),
    Call(&'a str, Vec<Operand<'a>>),
    Print(&'a str, Vec<Operand<'a>>),
    Phi(Vec<(&'a str, Operand<'a>)>),
    Jump(&'a str),
    Branch(Operand<'a>, &'a str, &'a str),
    Ret(Option<Operand<'a>>),
}

impl<'a> Op<'a> {
    fn operands(&self) -> Vec<Operand<'a>> {
        match self {
            Op::Binary(_, a, b) | Op::Load(a, b) | Op::Gep(a, b, _) => vec![*a, *b],
            Op::Store(a, b, c) => vec![*a, *b, *c],
            Op::Call(_, args) | Op::Print(_, args) => args.clone(),
            Op::Phi(pairs) => pairs.iter().map(|&(_, v)| v).collect(),
            Op::Branch(c, _, _) => vec![*c],
            Op::Ret(v) => v.iter().copied().collect(),
            Op::Alloca(_) | Op::Jump(_) => vec![],
        }
    }

    fn is_terminator(&self) -> bool {
        matches!(self, Op::Jump(_) | Op::Branch(..) | Op::Ret(_))
    }

    fn is_phi(&self) -> bool {
        matches!(self, Op::Phi(_))
    }
}

#[derive(Debug)]
struct Stmt<'a> {
    line: usize,
    result: Option<&'a str>,
    op: Op<'a>,
}

#[derive(Debug)]
struct BlockSrc<'a> {
    name: &'a str,
    line: usize,
    stmts: Vec<Stmt<'a>>,
}

#[derive(Debug)]
struct FunctionSrc<'a> {
    id: FuncId,
    line: usize,
    params: Vec<&'a str>,
    blocks: Vec<BlockSrc<'a>>,
}

struct Parser<'a> {
    lines: Vec<(usize, Vec<Token<'a>>)>,
    pos: usize,
    module: Module,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> CompileResult<Self> {
        let mut lines = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let tokens = tokenize(idx + 1, line)?;
            if !tokens.is_empty() {
                lines.push((idx + 1, tokens));
            }
        }
        Ok(Self {
            lines,
            pos: 0,
            module: Module::new(),
        })
    }

    fn next_line(&mut self) -> Option<(usize, Vec<Token<'a>>)> {
        let line = self.lines.get(self.pos).cloned();
        self.pos += 1;
        line
    }

    fn parse(mut self) -> CompileResult<Module> {
        let mut bodies = Vec::new();
        while let Some((line, tokens)) = self.next_line() {
            let mut c = Cursor::new(line, &tokens);
            match c.ident()? {
                "global" => self.parse_global(&mut c, false)?,
                "const" => self.parse_global(&mut c, true)?,
                "string" => self.parse_string(&mut c)?,
                "func" => bodies.push(self.parse_function(&mut c)?),
                other => return Err(error(line, format!("expected a declaration, found '{}'", other))),
            }
        }

        for body in &bodies {
            emit_function(&mut self.module, body)?;
        }
        log::debug!(
            "parsed {} functions, {} globals, {} strings",
            self.module.functions.len(),
            self.module.globals().len(),
            self.module.strings().len()
        );
        Ok(self.module)
    }

    fn check_symbol_free(&self, c: &Cursor<'_, 'a>, name: &str) -> CompileResult<()> {
        if self.module.global_by_name(name).is_some() || self.module.string_by_name(name).is_some() {
            return Err(c.error(format!("redefinition of @{}", name)));
        }
        Ok(())
    }

    /// `global @g = 3`, `global @arr[4] = 1, 2` or `const @k = 7`.
    fn parse_global(&mut self, c: &mut Cursor<'_, 'a>, constant: bool) -> CompileResult<()> {
        let name = c.symbol()?;
        self.check_symbol_free(c, name)?;
        let mut words = 1;
        let mut is_array = false;
        if c.eat('[') {
            let n = c.int()?;
            if n < 1 {
                return Err(c.error(format!("array @{} needs at least one element", name)));
            }
            words = n as u32;
            is_array = true;
            c.expect(']')?;
        }
        let mut init = Vec::new();
        if c.eat('=') {
            init.push(c.int()?);
            while c.eat(',') {
                init.push(c.int()?);
            }
        }
        c.finish()?;
        if init.len() > words as usize {
            return Err(c.error(format!(
                "@{} has {} initializers for {} words",
                name,
                init.len(),
                words
            )));
        }
        if !is_array && constant && init.is_empty() {
            return Err(c.error(format!("constant @{} needs a value", name)));
        }
        self.module.add_global(name, words, init, constant);
        Ok(())
    }

    /// `string @s = "text"`
    fn parse_string(&mut self, c: &mut Cursor<'_, 'a>) -> CompileResult<()> {
        let name = c.symbol()?;
        self.check_symbol_free(c, name)?;
        c.expect('=')?;
        let literal = c.string()?;
        c.finish()?;
        self.module.add_named_string(name, literal);
        Ok(())
    }

    /// `func @f(%a, %b) -> int {` up to the closing `}`.
    fn parse_function(&mut self, c: &mut Cursor<'_, 'a>) -> CompileResult<FunctionSrc<'a>> {
        let line = c.line;
        let name = c.symbol()?;
        if self.module.function_by_name(name).is_some() || Builtin::from_name(name).is_some() {
            return Err(c.error(format!("redefinition of function @{}", name)));
        }
        c.expect('(')?;
        let mut params = Vec::new();
        if !c.eat(')') {
            loop {
                let p = c.local()?;
                if params.contains(&p) {
                    return Err(c.error(format!("duplicate parameter %{}", p)));
                }
                params.push(p);
                if c.eat(')') {
                    break;
                }
                c.expect(',')?;
            }
        }
        if c.next() != Some(Token::Arrow) {
            return Err(c.error("expected '->' and a return type"));
        }
        let returns_value = match c.ident()? {
            "int" => true,
            "void" => false,
            other => return Err(c.error(format!("unknown return type '{}'", other))),
        };
        c.expect('{')?;
        c.finish()?;

        let id = self
            .module
            .add_function(Function::new(name, params.len(), returns_value));

        let mut blocks: Vec<BlockSrc<'a>> = Vec::new();
        loop {
            let Some((line_no, tokens)) = self.next_line() else {
                return Err(error(line, format!("function @{} is not closed", name)));
            };
            if tokens == [Token::Punct('}')] {
                break;
            }
            if let [Token::Ident(label), Token::Punct(':')] = tokens[..] {
                blocks.push(BlockSrc {
                    name: label,
                    line: line_no,
                    stmts: Vec::new(),
                });
                continue;
            }
            let stmt = parse_stmt(&mut Cursor::new(line_no, &tokens))?;
            let Some(block) = blocks.last_mut() else {
                return Err(error(line_no, "instruction outside of a block"));
            };
            if block.stmts.last().is_some_and(|s| s.op.is_terminator()) {
                return Err(error(line_no, format!("instruction after the terminator of ^{}", block.name)));
            }
            if stmt.op.is_phi() && block.stmts.iter().any(|s| !s.op.is_phi()) {
                return Err(error(line_no, "phi after a non-phi instruction"));
            }
            block.stmts.push(stmt);
        }

        if blocks.is_empty() {
            return Err(error(line, format!("function @{} has no blocks", name)));
        }
        for block in &blocks {
            if !block.stmts.last().is_some_and(|s| s.op.is_terminator()) {
                return Err(error(block.line, format!("block ^{} has no terminator", block.name)));
            }
        }
        Ok(FunctionSrc {
            id,
            line,
            params,
            blocks,
        })
    }
}

fn parse_stmt<'a>(c: &mut Cursor<'_, 'a>) -> CompileResult<Stmt<'a>> {
    let line = c.line;
    let result = match (c.peek(), c.tokens.get(1)) {
        (Some(Token::Local(name)), Some(Token::Punct('='))) => {
            c.pos = 2;
            Some(name)
        }
        _ => None,
    };

    let opcode = c.ident()?;
    let op = match opcode {
        "alloca" => {
            c.expect('[')?;
            let n = c.int()?;
            c.expect(']')?;
            if n < 1 {
                return Err(c.error("alloca needs at least one word"));
            }
            Op::Alloca(n as u32)
        }
        "load" => {
            let base = c.operand()?;
            c.expect(',')?;
            Op::Load(base, c.operand()?)
        }
        "store" => {
            let base = c.operand()?;
            c.expect(',')?;
            let index = c.operand()?;
            c.expect(',')?;
            Op::Store(base, index, c.operand()?)
        }
        "gep" => {
            let base = c.operand()?;
            c.expect(',')?;
            let index = c.operand()?;
            c.expect(',')?;
            Op::Gep(base, index, c.int()?)
        }
        "call" => {
            let callee = c.symbol()?;
            c.expect('(')?;
            let mut args = Vec::new();
            if !c.eat(')') {
                loop {
                    args.push(c.operand()?);
                    if c.eat(')') {
                        break;
                    }
                    c.expect(',')?;
                }
            }
            Op::Call(callee, args)
        }
        "print" => {
            let format = c.string()?;
            let mut args = Vec::new();
            while c.eat(',') {
                args.push(c.operand()?);
            }
            if format.matches("%d").count() != args.len() {
                return Err(c.error(format!(
                    "format {} expects {} arguments, got {}",
                    format,
                    format.matches("%d").count(),
                    args.len()
                )));
            }
            Op::Print(format, args)
        }
        "phi" => {
            let mut pairs = Vec::new();
            loop {
                c.expect('[')?;
                let block = c.block()?;
                c.expect(',')?;
                let value = c.operand()?;
                c.expect(']')?;
                pairs.push((block, value));
                if !c.eat(',') {
                    break;
                }
            }
            Op::Phi(pairs)
        }
        "jump" => Op::Jump(c.block()?),
        "br" => {
            let cond = c.operand()?;
            c.expect(',')?;
            let then_block = c.block()?;
            c.expect(',')?;
            Op::Branch(cond, then_block, c.block()?)
        }
        "ret" => {
            if c.is_done() {
                Op::Ret(None)
            } else {
                Op::Ret(Some(c.operand()?))
            }
        }
        other => match BinaryOp::from_mnemonic(other) {
            Some(bin) => {
                let lhs = c.operand()?;
                c.expect(',')?;
                Op::Binary(bin, lhs, c.operand()?)
            }
            None => return Err(c.error(format!("unknown instruction '{}'", other))),
        },
    };
    c.finish()?;

    let produces = matches!(
        op,
        Op::Binary(..) | Op::Alloca(_) | Op::Load(..) | Op::Gep(..) | Op::Phi(_)
    );
    match (&op, result) {
        (Op::Call(..), _) => {}
        (_, None) if produces => return Err(error(line, format!("'{}' needs a result name", opcode))),
        (_, Some(name)) if !produces => {
            return Err(error(line, format!("'{}' does not produce a value for %{}", opcode, name)))
        }
        _ => {}
    }
    Ok(Stmt { line, result, op })
}

/// Name tables of the function being emitted.
#[derive(Default)]
struct Scope<'a> {
    values: HashMap<&'a str, ValueId>,
    blocks: HashMap<&'a str, BlockId>,
}

impl<'a> Scope<'a> {
    fn define(&mut self, line: usize, name: &'a str, v: ValueId) -> CompileResult<()> {
        if self.values.insert(name, v).is_some() {
            return Err(error(line, format!("redefinition of %{}", name)));
        }
        Ok(())
    }

    fn block(&self, line: usize, name: &str) -> CompileResult<BlockId> {
        self.blocks
            .get(name)
            .copied()
            .ok_or_else(|| error(line, format!("unknown block ^{}", name)))
    }

    fn value(&self, b: &mut FunctionBuilder<'_>, line: usize, op: Operand<'_>) -> CompileResult<ValueId> {
        match op {
            Operand::Int(c) => Ok(b.const_int(c)),
            Operand::Local(name) => self
                .values
                .get(name)
                .copied()
                .ok_or_else(|| error(line, format!("undefined value %{}", name))),
            Operand::Symbol(name) => {
                if let Some(v) = b.global(name) {
                    return Ok(v);
                }
                match b.module().string_by_name(name) {
                    Some(s) => Ok(b.func_mut().string_value(s)),
                    None => Err(error(line, format!("unknown symbol @{}", name))),
                }
            }
        }
    }

    /// Whether every local the block's ordinary instructions read is
    /// defined already or earlier in the block itself.
    fn block_ready(&self, block: &BlockSrc<'a>) -> bool {
        let mut local: HashSet<&str> = HashSet::new();
        for stmt in block.stmts.iter().filter(|s| !s.op.is_phi()) {
            for operand in stmt.op.operands() {
                if let Operand::Local(name) = operand {
                    if !self.values.contains_key(name) && !local.contains(name) {
                        return false;
                    }
                }
            }
            if let Some(name) = stmt.result {
                local.insert(name);
            }
        }
        true
    }
}

fn emit_function(module: &mut Module, src: &FunctionSrc<'_>) -> CompileResult<()> {
    let mut b = FunctionBuilder::resume(module, src.id);
    let mut scope = Scope::default();
    for (i, &name) in src.params.iter().enumerate() {
        let p = b.param(i);
        b.func_mut().set_value_name(p, name);
        scope.define(src.line, name, p)?;
    }

    let mut ids = Vec::with_capacity(src.blocks.len());
    for block in &src.blocks {
        if scope.blocks.contains_key(block.name) {
            return Err(error(block.line, format!("redefinition of block ^{}", block.name)));
        }
        let id = b.create_block(block.name);
        scope.blocks.insert(block.name, id);
        ids.push(id);
    }

    let mut phis: Vec<(BlockId, InstId, &Stmt<'_>)> = Vec::new();
    for (block, &id) in src.blocks.iter().zip(&ids) {
        for stmt in block.stmts.iter().filter(|s| s.op.is_phi()) {
            let (inst, v) = b.empty_phi(id);
            if let Some(name) = stmt.result {
                b.func_mut().set_value_name(v, name);
                scope.define(stmt.line, name, v)?;
            }
            phis.push((id, inst, stmt));
        }
    }

    let mut emitted = vec![false; src.blocks.len()];
    while let Some(i) = (0..src.blocks.len()).find(|&i| !emitted[i] && scope.block_ready(&src.blocks[i])) {
        b.switch_to(ids[i]);
        for stmt in src.blocks[i].stmts.iter().filter(|s| !s.op.is_phi()) {
            emit_stmt(&mut b, &mut scope, stmt)?;
        }
        emitted[i] = true;
    }
    if let Some(i) = emitted.iter().position(|done| !done) {
        return Err(first_undefined(&scope, &src.blocks[i]));
    }

    for (block, inst, stmt) in phis {
        let Op::Phi(pairs) = &stmt.op else {
            continue;
        };
        let preds = b.func().preds(block).to_vec();
        let mut incoming = Vec::with_capacity(pairs.len());
        for &(name, operand) in pairs {
            let from = scope.block(stmt.line, name)?;
            if !preds.contains(&from) {
                return Err(error(
                    stmt.line,
                    format!("^{} is not a predecessor of ^{}", name, b.func().block_name(block)),
                ));
            }
            incoming.push((from, scope.value(&mut b, stmt.line, operand)?));
        }
        for pred in preds {
            let Some(&(_, v)) = incoming.iter().find(|(from, _)| *from == pred) else {
                return Err(error(
                    stmt.line,
                    format!("phi has no incoming value for ^{}", b.func().block_name(pred)),
                ));
            };
            b.func_mut().push_operand(inst, v);
        }
    }
    Ok(())
}

/// Error for a block that could never be emitted.
fn first_undefined(scope: &Scope<'_>, block: &BlockSrc<'_>) -> CompileError {
    let mut local: HashSet<&str> = HashSet::new();
    for stmt in block.stmts.iter().filter(|s| !s.op.is_phi()) {
        for operand in stmt.op.operands() {
            if let Operand::Local(name) = operand {
                if !scope.values.contains_key(name) && !local.contains(name) {
                    return error(stmt.line, format!("undefined value %{}", name));
                }
            }
        }
        if let Some(name) = stmt.result {
            local.insert(name);
        }
    }
    error(block.line, format!("block ^{} reads an undefined value", block.name))
}

fn emit_stmt<'a>(b: &mut FunctionBuilder<'_>, scope: &mut Scope<'a>, stmt: &Stmt<'a>) -> CompileResult<()> {
    let line = stmt.line;
    let result = match &stmt.op {
        Op::Binary(op, lhs, rhs) => {
            let lhs = scope.value(b, line, *lhs)?;
            let rhs = scope.value(b, line, *rhs)?;
            Some(b.binary(*op, lhs, rhs))
        }
        Op::Alloca(words) => Some(b.alloca(*words)),
        Op::Load(base, index) => {
            let base = scope.value(b, line, *base)?;
            let index = scope.value(b, line, *index)?;
            Some(b.load(base, index))
        }
        Op::Store(base, index, data) => {
            let base = scope.value(b, line, *base)?;
            let index = scope.value(b, line, *index)?;
            let data = scope.value(b, line, *data)?;
            b.store(base, index, data);
            None
        }
        Op::Gep(base, index, multiplier) => {
            let base = scope.value(b, line, *base)?;
            let index = scope.value(b, line, *index)?;
            Some(b.gep(base, index, *multiplier))
        }
        Op::Call(callee, args) => {
            let mut values = Vec::with_capacity(args.len());
            for &arg in args {
                values.push(scope.value(b, line, arg)?);
            }
            let (arity, returns) = if let Some(builtin) = Builtin::from_name(callee) {
                (builtin.param_count(), builtin.returns_value())
            } else if let Some(id) = b.module().function_by_name(callee) {
                let f = b.module().function(id);
                (f.params().len(), f.returns_value)
            } else {
                return Err(error(line, format!("call to unknown function @{}", callee)));
            };
            if arity != values.len() {
                return Err(error(
                    line,
                    format!("@{} takes {} arguments, got {}", callee, arity, values.len()),
                ));
            }
            if stmt.result.is_some() && !returns {
                return Err(error(line, format!("@{} does not return a value", callee)));
            }
            match Builtin::from_name(callee) {
                Some(builtin) => b.call_builtin(builtin, values),
                None => match b.module().function_by_name(callee) {
                    Some(id) => b.call(id, values),
                    None => None,
                },
            }
        }
        Op::Print(format, args) => {
            let mut values = Vec::with_capacity(args.len());
            for &arg in args {
                values.push(scope.value(b, line, arg)?);
            }
            b.print(format, values);
            None
        }
        Op::Jump(target) => {
            let target = scope.block(line, target)?;
            b.jump(target);
            None
        }
        Op::Branch(cond, then_block, else_block) => {
            let cond = scope.value(b, line, *cond)?;
            let then_block = scope.block(line, then_block)?;
            let else_block = scope.block(line, else_block)?;
            b.branch(cond, then_block, else_block);
            None
        }
        Op::Ret(value) => {
            let returns = b.func().returns_value;
            let value = match value {
                Some(v) if returns => Some(scope.value(b, line, *v)?),
                None if !returns => None,
                Some(_) => return Err(error(line, "void function returns a value")),
                None => return Err(error(line, "missing return value")),
            };
            b.ret(value);
            None
        }
        Op::Phi(_) => None,
    };

    if let (Some(name), Some(v)) = (stmt.result, result) {
        b.func_mut().set_value_name(v, name);
        scope.define(line, name, v)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{verify_function, InstKind, ValueKind};

    fn parse_err_line(text: &str) -> usize {
        match parse_module(text) {
            Err(CompileError::Parse { line, .. }) => line,
            other => panic!("expected a parse error, got {:?}", other.map(|m| m.functions.len())),
        }
    }

    #[test]
    fn test_full_example() {
        let text = r#"
global @g = 3
global @arr[4] = 1, 2
const @k = 7
string @s = "hi\n"

func @main() -> int {
entry:
  %x = alloca [1]
  store %x, 0, 5
  %v = load %x, 0
  %c = lt %v, 10
  br %c, ^then, ^else
then:
  jump ^join
else:
  jump ^join
join:
  %p = phi [^else, %v], [^then, 1]
  %r = call @twice(%p)
  call @putint(%r)
  call @putstr(@s)
  print "v=%d\n", %p
  ret %p
}

func @twice(%a) -> int {
entry:
  %d = add %a, %a
  ret %d
}
"#;
        let m = parse_module(text).unwrap();
        assert_eq!(m.globals().len(), 3);
        assert!(m.global(m.global_by_name("k").unwrap()).constant);
        assert_eq!(m.global(m.global_by_name("arr").unwrap()).initial_words(), vec![1, 2, 0, 0]);
        assert!(m.string_by_name("s").is_some());

        let main = m.function(m.function_by_name("main").unwrap());
        verify_function(main).unwrap();
        let join = main.layout()[3];
        let phi = main.phis(join)[0];
        // preds are [then, else]; the listed order is swapped back
        let ops = main.operands(phi);
        assert_eq!(main.as_const(ops[0]), Some(1));
        assert_eq!(main.value_label(ops[1]), "%v");
        assert!(main.callees().contains(&m.function_by_name("twice").unwrap()));

        let twice = m.function(m.function_by_name("twice").unwrap());
        verify_function(twice).unwrap();
        assert_eq!(twice.value_label(twice.params()[0]), "%a");
    }

    #[test]
    fn test_forward_references() {
        // `body` reads %n which is defined in a block listed after it
        let text = r#"
func @f(%a) -> int {
entry:
  jump ^head
body:
  %m = add %n, 1
  jump ^head
head:
  %i = phi [^entry, %a], [^body, %m]
  %n = add %i, 1
  %c = lt %n, 10
  br %c, ^body, ^exit
exit:
  ret %n
}
"#;
        let m = parse_module(text).unwrap();
        let f = m.function(FuncId(0));
        verify_function(f).unwrap();
        let head = f.layout()[2];
        let phi = f.phis(head)[0];
        assert_eq!(f.operands(phi).len(), 2);
        assert!(matches!(f.value(f.operands(phi)[0]).kind, ValueKind::Param(0)));
        let body = f.layout()[1];
        let first = f.insts_of(body)[0];
        assert!(matches!(f.kind(first), InstKind::Binary(BinaryOp::Add)));
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        assert_eq!(parse_err_line("func @f() -> int {\nentry:\n  ret %x\n}\n"), 3);
        assert_eq!(parse_err_line("func @f() -> void {\nentry:\n  %a = add 1, 2\n}\n"), 2);
        assert_eq!(parse_err_line("\nfunc @f() -> void {\nentry:\n  frob 1\n  ret\n}\n"), 4);
        assert_eq!(parse_err_line("func @f() -> void {\nentry:\n  call @nope()\n  ret\n}\n"), 3);
        assert_eq!(parse_err_line("global @g[2] = 1, 2, 3\n"), 1);
        assert_eq!(parse_err_line("func @f() -> void {\nentry:\n  ret\n"), 1);
        assert_eq!(
            parse_err_line("func @f() -> void {\na:\n  jump ^b\nb:\n  %p = phi [^b, 1]\n  ret\n}\n"),
            5
        );
    }

    #[test]
    fn test_void_call_cannot_be_named() {
        let text = "func @f() -> void {\nentry:\n  %r = call @putint(1)\n  ret\n}\n";
        assert_eq!(parse_err_line(text), 3);
    }
}
