//! Emitter state and name mangling
//!
//! All emission state lives in one [`Compilation`] value: the module under
//! construction, the token cursor, the stack of open function frames, the
//! flat list of every defined symbol (for mangled call resolution), and
//! the builder's insertion point. Statement handlers borrow the
//! `Compilation` mutably and leave the insertion point in a defined place.

use std::collections::HashMap;

use crate::lexer::TokenStream;

use super::error::CompileError;
use super::ir::{BlockId, FuncId, IrModule, IrType};

/// A named stack slot in the current function.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub ty: IrType,
    /// Operand form of the slot address (`%x`, `%argc.addr`).
    pub slot: String,
}

/// One active `if`/`elif` region. `elif` pushes a new frame sharing the
/// merge block; `fi` removes every frame with that merge.
#[derive(Debug, Clone, Copy)]
pub struct IfFrame {
    pub on_true: BlockId,
    pub on_false: BlockId,
    pub merge: BlockId,
    /// Whether this frame was opened by `elif` rather than `if`.
    #[allow(dead_code)] // chain membership is keyed on the shared merge
    pub from_elif: bool,
}

/// A function currently being emitted.
#[derive(Debug)]
pub struct FunctionFrame {
    pub func: FuncId,
    pub source_name: String,
    pub ret: IrType,
    pub variables: Vec<Variable>,
    pub if_frames: Vec<IfFrame>,
}

/// The whole emission context for one compile.
pub struct Compilation {
    pub(super) module: IrModule,
    pub(super) tokens: TokenStream,
    pub(super) frames: Vec<FunctionFrame>,
    /// Symbols of every function defined so far, in definition order.
    pub(super) all_functions: Vec<String>,
    /// Module identity already stripped for mangling.
    pub(super) module_id: String,
    pub(super) label_counter: usize,
    /// The builder cursor: where the next instruction lands.
    pub(super) insert: Option<(FuncId, BlockId)>,
    pub(super) string_constants: HashMap<String, String>,
    pub(super) string_counter: usize,
}

impl Compilation {
    pub fn new(module_name: &str, tokens: TokenStream) -> Compilation {
        Compilation {
            module: IrModule::new(module_name),
            tokens,
            frames: Vec::new(),
            all_functions: Vec::new(),
            module_id: strip_identifier(module_name),
            label_counter: 0,
            insert: None,
            string_constants: HashMap::new(),
            string_counter: 0,
        }
    }

    /// The insertion point, or an error when no block is open (before any
    /// `context` header, or right after a `context;` pop).
    pub(super) fn cursor(&self, line: i32) -> Result<(FuncId, BlockId), CompileError> {
        self.insert
            .ok_or_else(|| CompileError::new("statement outside of a context", line))
    }

    pub(super) fn set_cursor(&mut self, func: FuncId, block: BlockId) {
        self.insert = Some((func, block));
    }

    /// Append an instruction at the insertion point.
    pub(super) fn emit(&mut self, line: i32, inst: String) -> Result<(), CompileError> {
        let (func, block) = self.cursor(line)?;
        self.module.push_inst(func, block, inst);
        Ok(())
    }

    /// Fresh temporary in the current function, returned as an operand
    /// (`%t3`).
    pub(super) fn temp(&mut self, line: i32) -> Result<String, CompileError> {
        let (func, _) = self.cursor(line)?;
        Ok(format!("%{}", self.module.fresh_temp(func)))
    }

    pub(super) fn frame(&self, line: i32) -> Result<&FunctionFrame, CompileError> {
        self.frames
            .last()
            .ok_or_else(|| CompileError::new("statement outside of a context", line))
    }

    pub(super) fn frame_mut(&mut self, line: i32) -> Result<&mut FunctionFrame, CompileError> {
        self.frames
            .last_mut()
            .ok_or_else(|| CompileError::new("statement outside of a context", line))
    }

    /// Linear lookup in the current function's variable table. The first
    /// match wins; duplicates are not detected.
    pub(super) fn lookup_variable(&self, name: &str, line: i32) -> Result<Variable, CompileError> {
        let frame = self.frame(line)?;
        frame
            .variables
            .iter()
            .find(|v| v.name == name)
            .cloned()
            .ok_or_else(|| CompileError::new(format!("Unknown variable: {}", name), line))
    }

    pub(super) fn next_label_index(&mut self) -> usize {
        let n = self.label_counter;
        self.label_counter += 1;
        n
    }

    /// Resolve a call-site name to a module symbol: `main` stays `main`;
    /// otherwise the first defined function whose demangled symbol equals
    /// the stripped raw name; otherwise the raw name itself (externs).
    pub(super) fn resolve_callee(&self, raw: &str) -> String {
        if raw == "main" {
            return "main".to_string();
        }
        let stripped = strip_identifier(raw);
        self.all_functions
            .iter()
            .find(|symbol| demangle(symbol).is_some_and(|name| name == stripped))
            .cloned()
            .unwrap_or_else(|| raw.to_string())
    }
}

/// Remove underscores and digits; both the function and module identifiers
/// are stripped this way before mangling, and call-site names before the
/// demangled comparison. The encoding is deliberately lossy: names that
/// differ only in digits or underscores collide.
pub(crate) fn strip_identifier(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && !c.is_ascii_digit())
        .collect()
}

/// Mangle a function symbol:
/// `_Z<L1><fn-stripped><L2><module-stripped>_<ret-tag>_<arg-tag>...`.
/// `main` and `#nomangle` definitions bypass this entirely.
pub(crate) fn mangle(module_id: &str, name: &str, ret: &IrType, args: &[IrType]) -> String {
    let stripped = strip_identifier(name);
    let mut symbol = format!(
        "_Z{}{}{}{}",
        stripped.len(),
        stripped,
        module_id.len(),
        module_id
    );
    symbol.push('_');
    symbol.push_str(&ret.mangle_tag());
    for arg in args {
        symbol.push('_');
        symbol.push_str(&arg.mangle_tag());
    }
    symbol
}

/// Recover the stripped function name from a mangled symbol. Returns
/// `None` for symbols that were never mangled.
pub(crate) fn demangle(symbol: &str) -> Option<String> {
    let rest = symbol.strip_prefix("_Z")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    let len: usize = digits.parse().ok()?;
    let name = &rest[digits.len()..];
    if name.len() < len {
        return None;
    }
    Some(name[..len].to_string())
}
