//! Textual LLVM IR construction
//!
//! The emitter builds a module as structured text: functions hold basic
//! blocks, each block holds already-formatted instruction lines plus a
//! separate terminator slot. Keeping the terminator apart from the body is
//! what makes the if/elif/fi discipline workable — a block can be asked
//! whether it is terminated, terminated at most once, and late
//! instructions land ahead of an existing terminator. Block layout order
//! is tracked separately from creation order so a merge block can be moved
//! to the end of its function.
//!
//! Pointers are emitted opaque (`ptr`); the pointee recorded in
//! [`IrType::PtrTo`] only informs element sizing and name mangling.

use std::collections::HashSet;
use std::fmt;

/// The data layout the emitted module declares.
const DATA_LAYOUT: &str = "e-m:e-i64:64-n8:16:32:64-S128";

/// IR type descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrType {
    Void,
    I8,
    I16,
    I32,
    I64,
    /// Opaque pointer with no tracked pointee (the `ptr` type name).
    Ptr,
    /// Pointer with a known pointee (`i8*`, `i32**`). Prints as `ptr`.
    PtrTo(Box<IrType>),
}

impl IrType {
    pub fn is_pointer(&self) -> bool {
        matches!(self, IrType::Ptr | IrType::PtrTo(_))
    }

    pub fn is_integer(&self) -> bool {
        self.int_width().is_some()
    }

    /// Bit width for integer types.
    pub fn int_width(&self) -> Option<u32> {
        match self {
            IrType::I8 => Some(8),
            IrType::I16 => Some(16),
            IrType::I32 => Some(32),
            IrType::I64 => Some(64),
            _ => None,
        }
    }

    /// The pointee, when one is tracked.
    pub fn pointee(&self) -> Option<&IrType> {
        match self {
            IrType::PtrTo(inner) => Some(inner),
            _ => None,
        }
    }

    /// Wrap in one pointer level.
    pub fn pointer_to(self) -> IrType {
        IrType::PtrTo(Box::new(self))
    }

    /// Type tag used inside mangled symbols: the base name with one `p`
    /// appended per pointer level (`i8*` -> `i8p`, bare `ptr` -> `ptr`).
    pub fn mangle_tag(&self) -> String {
        match self {
            IrType::Void => "void".to_string(),
            IrType::I8 => "i8".to_string(),
            IrType::I16 => "i16".to_string(),
            IrType::I32 => "i32".to_string(),
            IrType::I64 => "i64".to_string(),
            IrType::Ptr => "ptr".to_string(),
            IrType::PtrTo(inner) => format!("{}p", inner.mangle_tag()),
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IrType::Void => "void",
            IrType::I8 => "i8",
            IrType::I16 => "i16",
            IrType::I32 => "i32",
            IrType::I64 => "i64",
            IrType::Ptr | IrType::PtrTo(_) => "ptr",
        };
        f.write_str(s)
    }
}

/// An IR value: a type plus its textual operand form (`%t3`, `7`, `null`,
/// `@.str.0`).
#[derive(Debug, Clone)]
pub struct IrValue {
    pub ty: IrType,
    pub repr: String,
}

impl IrValue {
    pub fn new(ty: IrType, repr: impl Into<String>) -> IrValue {
        IrValue {
            ty,
            repr: repr.into(),
        }
    }

    /// `<type> <operand>`, the form call and store sites want.
    pub fn typed(&self) -> String {
        format!("{} {}", self.ty, self.repr)
    }
}

/// A function signature, shared by declarations and definitions.
#[derive(Debug, Clone)]
pub struct FnSig {
    pub name: String,
    pub ret: IrType,
    pub params: Vec<IrType>,
    pub vararg: bool,
}

impl FnSig {
    /// Parameter list for a `declare` line (`ptr, i32, ...`).
    fn decl_params(&self) -> String {
        let mut parts: Vec<String> = self.params.iter().map(|t| t.to_string()).collect();
        if self.vararg {
            parts.push("...".to_string());
        }
        parts.join(", ")
    }

    /// The callee type annotation a call site needs. Vararg callees must
    /// spell the whole function type; others just the return type.
    pub fn callee_type(&self) -> String {
        if self.vararg {
            format!("{} ({})", self.ret, self.decl_params())
        } else {
            self.ret.to_string()
        }
    }
}

/// Handle to a defined function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuncId(usize);

/// Handle to a basic block within its function. Stable across layout
/// reordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockId(usize);

struct IrBlock {
    label: String,
    insts: Vec<String>,
    term: Option<String>,
}

struct IrFunction {
    sig: FnSig,
    param_names: Vec<String>,
    blocks: Vec<IrBlock>,
    /// Print order of `blocks` indices.
    layout: Vec<usize>,
    next_temp: usize,
    /// Local names already in use (parameters, slots, labels, temps).
    taken: HashSet<String>,
}

/// A module under construction.
pub struct IrModule {
    name: String,
    globals: Vec<String>,
    decls: Vec<FnSig>,
    funcs: Vec<IrFunction>,
}

impl IrModule {
    pub fn new(name: impl Into<String>) -> IrModule {
        IrModule {
            name: name.into(),
            globals: Vec::new(),
            decls: Vec::new(),
            funcs: Vec::new(),
        }
    }

    /// Add a global definition line (string constants).
    pub fn push_global(&mut self, line: String) {
        self.globals.push(line);
    }

    /// Declare an external function. Redeclaring an existing name is a
    /// no-op, matching get-or-insert semantics.
    pub fn declare_function(&mut self, sig: FnSig) {
        if self.callee_sig(&sig.name).is_none() {
            self.decls.push(sig);
        }
    }

    /// Define a function. A prior `extern` declaration of the same name is
    /// replaced; a prior definition is an error.
    pub fn define_function(
        &mut self,
        sig: FnSig,
        param_names: Vec<String>,
    ) -> Result<FuncId, String> {
        if self.funcs.iter().any(|f| f.sig.name == sig.name) {
            return Err(format!("duplicate definition of function: {}", sig.name));
        }
        self.decls.retain(|d| d.name != sig.name);
        let mut taken = HashSet::new();
        for name in &param_names {
            taken.insert(name.clone());
        }
        self.funcs.push(IrFunction {
            sig,
            param_names,
            blocks: Vec::new(),
            layout: Vec::new(),
            next_temp: 0,
            taken,
        });
        Ok(FuncId(self.funcs.len() - 1))
    }

    /// Signature of a declared or defined function, if any.
    pub fn callee_sig(&self, name: &str) -> Option<&FnSig> {
        self.funcs
            .iter()
            .map(|f| &f.sig)
            .chain(self.decls.iter())
            .find(|s| s.name == name)
    }

    /// Append a new block. The label hint is uniquified against the
    /// function's local namespace.
    pub fn add_block(&mut self, func: FuncId, label_hint: &str) -> BlockId {
        let label = self.unique_name(func, label_hint);
        let f = &mut self.funcs[func.0];
        f.blocks.push(IrBlock {
            label,
            insts: Vec::new(),
            term: None,
        });
        let idx = f.blocks.len() - 1;
        f.layout.push(idx);
        BlockId(idx)
    }

    pub fn block_label(&self, func: FuncId, block: BlockId) -> &str {
        &self.funcs[func.0].blocks[block.0].label
    }

    /// Append an instruction line to a block. Instructions added after the
    /// block was terminated print ahead of the terminator.
    pub fn push_inst(&mut self, func: FuncId, block: BlockId, inst: String) {
        self.funcs[func.0].blocks[block.0].insts.push(inst);
    }

    /// Install a terminator unless the block already has one.
    pub fn terminate_if_open(&mut self, func: FuncId, block: BlockId, term: String) {
        let slot = &mut self.funcs[func.0].blocks[block.0].term;
        if slot.is_none() {
            *slot = Some(term);
        }
    }

    pub fn has_terminator(&self, func: FuncId, block: BlockId) -> bool {
        self.funcs[func.0].blocks[block.0].term.is_some()
    }

    /// Move a block to the end of its function's print order.
    pub fn move_block_to_end(&mut self, func: FuncId, block: BlockId) {
        let layout = &mut self.funcs[func.0].layout;
        layout.retain(|&idx| idx != block.0);
        layout.push(block.0);
    }

    /// Fresh `%t<N>` temporary name (returned without the sigil).
    pub fn fresh_temp(&mut self, func: FuncId) -> String {
        loop {
            let f = &mut self.funcs[func.0];
            let name = format!("t{}", f.next_temp);
            f.next_temp += 1;
            if f.taken.insert(name.clone()) {
                return name;
            }
        }
    }

    /// Unique local name from a hint (stack slots, labels).
    pub fn unique_name(&mut self, func: FuncId, hint: &str) -> String {
        let f = &mut self.funcs[func.0];
        if f.taken.insert(hint.to_string()) {
            return hint.to_string();
        }
        let mut n = 1;
        loop {
            let name = format!("{}.{}", hint, n);
            if f.taken.insert(name.clone()) {
                return name;
            }
            n += 1;
        }
    }

    /// Check the shape of a finished function: every block must carry
    /// exactly one terminator (the slot enforces "at most one"; this
    /// enforces "at least one").
    pub fn verify_function(&self, func: FuncId) -> Result<(), String> {
        let f = &self.funcs[func.0];
        if f.blocks.is_empty() {
            return Err(format!("function '{}' has no entry block", f.sig.name));
        }
        for block in &f.blocks {
            if block.term.is_none() {
                return Err(format!(
                    "block '{}' in function '{}' has no terminator",
                    block.label, f.sig.name
                ));
            }
        }
        Ok(())
    }

    /// Render the whole module as textual LLVM IR.
    pub fn print(&self) -> String {
        let mut ir = String::new();
        ir.push_str(&format!("; ModuleID = '{}'\n", self.name));
        ir.push_str(&format!("source_filename = \"{}\"\n", self.name));
        ir.push_str(&format!("target datalayout = \"{}\"\n\n", DATA_LAYOUT));

        if !self.globals.is_empty() {
            for g in &self.globals {
                ir.push_str(g);
                ir.push('\n');
            }
            ir.push('\n');
        }

        for decl in &self.decls {
            ir.push_str(&format!(
                "declare {} @{}({})\n",
                decl.ret,
                decl.name,
                decl.decl_params()
            ));
        }
        if !self.decls.is_empty() {
            ir.push('\n');
        }

        for f in &self.funcs {
            let params: Vec<String> = f
                .sig
                .params
                .iter()
                .zip(&f.param_names)
                .map(|(ty, name)| format!("{} %{}", ty, name))
                .collect();
            ir.push_str(&format!(
                "define {} @{}({}) {{\n",
                f.sig.ret,
                f.sig.name,
                params.join(", ")
            ));
            for &idx in &f.layout {
                let block = &f.blocks[idx];
                ir.push_str(&format!("{}:\n", block.label));
                for inst in &block.insts {
                    ir.push_str(&format!("  {}\n", inst));
                }
                if let Some(term) = &block.term {
                    ir.push_str(&format!("  {}\n", term));
                }
            }
            ir.push_str("}\n\n");
        }

        ir
    }
}
