//! IR emission for DC programs
//!
//! This is the core of the compiler: a single-pass statement emitter that
//! consumes the token stream and issues textual LLVM IR directly, with no
//! AST in between. One [`Compilation`] value owns everything mutable —
//! the module under construction, the token cursor, the stack of open
//! function frames, and the builder insertion point.
//!
//! # Statement model
//!
//! Each keyword is one statement form, handled by one method on
//! `Compilation`. Handlers pull exactly the tokens their form needs and
//! leave the trailing semicolon for the driver loop to skip. `context`
//! opens and closes function frames; `if`/`elif`/`else`/`fi` manage a
//! per-function stack of block triples; everything else emits into the
//! current block and leaves the insertion point where it found it.
//!
//! # Names
//!
//! Function definitions are mangled with their signature and the module
//! identity (`main` and `#nomangle` excepted); call sites resolve through
//! a demangled comparison against every defined symbol, falling back to
//! the raw name for externs. String literals dedupe into private globals.
//!
//! # Module structure
//!
//! - `state.rs`: `Compilation`, frames, variables, mangling
//! - `statements.rs`: the driver loop and keyword handlers
//! - `control_flow.rs`: if/elif/else/fi
//! - `expr.rs`: expression-window capture and shunting-yard evaluation
//! - `types.rs`: type-name resolution and implicit coercions
//! - `globals.rs`: deduplicated string constants
//! - `ir.rs`: textual IR containers, verification, printing
//! - `error.rs`: the fatal `CompileError`

mod control_flow;
mod error;
mod expr;
mod globals;
mod ir;
mod state;
mod statements;
mod types;

pub use error::CompileError;
pub use ir::IrModule;
pub use state::Compilation;
