//! Modules: functions, globals, string constants and the builtin registry.

use super::function::Function;
use super::instruction::Builtin;
use super::{FuncId, GlobalId, StringId};

#[derive(Debug, Clone)]
pub struct GlobalVar {
    pub name: String,
    /// Size in 32-bit words.
    pub words: u32,
    /// Initial words; the tail past `init.len()` is zero.
    pub init: Vec<i32>,
    pub constant: bool,
}

impl GlobalVar {
    pub fn is_array(&self) -> bool {
        self.words > 1
    }

    pub fn initial_words(&self) -> Vec<i32> {
        let mut words = self.init.clone();
        words.resize(self.words as usize, 0);
        words
    }
}

/// How a line feed is spelled in processed string text.
const NEWLINE_ESCAPE: &str = "\\0A";

/// A string constant in processed form.
#[derive(Debug, Clone)]
pub struct StringConst {
    pub name: String,
    /// Quotes stripped, every `\n` rewritten to `\0A`.
    pub text: String,
    /// Processed character count plus the NUL terminator.
    pub len: usize,
}

impl StringConst {
    /// Process a source literal such as `"a\nb"`.
    pub fn from_literal(name: &str, literal: &str) -> Self {
        let inner = literal
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(literal);
        let text = inner.replace("\\n", NEWLINE_ESCAPE);
        let mut s = Self {
            name: name.to_string(),
            text,
            len: 0,
        };
        s.len = s.bytes().len() + 1;
        s
    }

    /// The bytes the string stands for, without the terminator. `\0A` is
    /// the only escape; any other backslash is an ordinary character.
    pub fn bytes(&self) -> Vec<u8> {
        let raw = self.text.as_bytes();
        let mut out = Vec::with_capacity(raw.len());
        let mut i = 0;
        while i < raw.len() {
            if raw[i..].starts_with(NEWLINE_ESCAPE.as_bytes()) {
                out.push(b'\n');
                i += NEWLINE_ESCAPE.len();
            } else {
                out.push(raw[i]);
                i += 1;
            }
        }
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct Module {
    pub functions: Vec<Function>,
    globals: Vec<GlobalVar>,
    strings: Vec<StringConst>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&mut self, func: Function) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        self.functions.push(func);
        id
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.index()]
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|i| FuncId(i as u32))
    }

    pub fn function_ids(&self) -> impl Iterator<Item = FuncId> {
        (0..self.functions.len() as u32).map(FuncId)
    }

    /// Functions that call `callee`.
    pub fn callers_of(&self, callee: FuncId) -> Vec<FuncId> {
        self.function_ids()
            .filter(|&f| self.function(f).callees().contains(&callee))
            .collect()
    }

    pub fn add_global(&mut self, name: &str, words: u32, init: Vec<i32>, constant: bool) -> GlobalId {
        let id = GlobalId(self.globals.len() as u32);
        self.globals.push(GlobalVar {
            name: name.to_string(),
            words: words.max(1),
            init,
            constant,
        });
        id
    }

    pub fn global(&self, id: GlobalId) -> &GlobalVar {
        &self.globals[id.index()]
    }

    pub fn globals(&self) -> &[GlobalVar] {
        &self.globals
    }

    pub fn global_by_name(&self, name: &str) -> Option<GlobalId> {
        self.globals
            .iter()
            .position(|g| g.name == name)
            .map(|i| GlobalId(i as u32))
    }

    /// Register a string literal; identical literals share one constant.
    pub fn add_string(&mut self, literal: &str) -> StringId {
        let processed = StringConst::from_literal("", literal);
        if let Some(pos) = self.strings.iter().position(|s| s.text == processed.text) {
            return StringId(pos as u32);
        }
        let id = StringId(self.strings.len() as u32);
        self.strings.push(StringConst {
            name: format!("_str{}", id.0),
            ..processed
        });
        id
    }

    /// Register a string under an explicit name.
    pub fn add_named_string(&mut self, name: &str, literal: &str) -> StringId {
        let id = StringId(self.strings.len() as u32);
        self.strings.push(StringConst::from_literal(name, literal));
        id
    }

    pub fn string(&self, id: StringId) -> &StringConst {
        &self.strings[id.index()]
    }

    pub fn strings(&self) -> &[StringConst] {
        &self.strings
    }

    pub fn string_by_name(&self, name: &str) -> Option<StringId> {
        self.strings
            .iter()
            .position(|s| s.name == name)
            .map(|i| StringId(i as u32))
    }

    /// The fixed runtime registry.
    pub fn builtins(&self) -> &'static [Builtin] {
        &Builtin::ALL
    }
}
