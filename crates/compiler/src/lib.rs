//! DC Compiler Library
//!
//! Provides compilation from DC source to textual LLVM IR and, through
//! the host toolchain (`llc`, `as`, `cc`), to assembly, object files, and
//! executables.
//!
//! The pipeline is single-pass: the combined source (embedded prelude +
//! user files) is tokenized once, then a statement emitter issues IR
//! builder calls directly off the token stream — there is no AST. See the
//! [`emit`] module for the core.
//!
//! # Library use
//!
//! ```rust,ignore
//! use dcc::{compile_to_ir_with_config, CompilerConfig};
//!
//! let config = CompilerConfig::new().without_stdlib();
//! let ir = compile_to_ir_with_config(source, &config)?;
//! ```

pub mod config;
pub mod emit;
pub mod lexer;
pub mod prelude;

pub use config::{CompilationLevel, CompilerConfig};
pub use emit::{Compilation, CompileError, IrModule};

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

/// Errors surfaced by the compile pipeline.
#[derive(Debug)]
pub enum DriverError {
    /// A fatal compilation error from the front end.
    Compile(CompileError),
    /// Reading an input or writing an artifact failed.
    Io(String),
    /// An external tool was missing or exited non-zero.
    Tool(String),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Compile(e) => write!(f, "{}", e),
            DriverError::Io(msg) | DriverError::Tool(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for DriverError {}

impl From<CompileError> for DriverError {
    fn from(e: CompileError) -> Self {
        DriverError::Compile(e)
    }
}

/// Compile a source string to LLVM IR with the default configuration
/// (prelude included, module identity `dc`).
pub fn compile_to_ir(source: &str) -> Result<String, CompileError> {
    compile_to_ir_with_config(source, &CompilerConfig::default())
}

/// Compile a source string to LLVM IR.
pub fn compile_to_ir_with_config(
    source: &str,
    config: &CompilerConfig,
) -> Result<String, CompileError> {
    let (text, start_line) = with_prelude(source, config);
    let tokens = lexer::tokenize(&text, start_line);
    debug!(tokens = tokens.tokens().len(), "lexed");
    let module = Compilation::new(&config.module_name, tokens).compile()?;
    debug!("emitted module");
    Ok(module.print())
}

/// Prepend the embedded prelude unless suppressed. The starting line is
/// chosen so user source begins at line 1.
fn with_prelude(source: &str, config: &CompilerConfig) -> (String, i32) {
    if config.nostdlib {
        return (source.to_string(), 1);
    }
    let mut text = String::with_capacity(prelude::PRELUDE.len() + source.len());
    text.push_str(prelude::PRELUDE);
    text.push_str(source);
    (text, 1 - prelude::line_count())
}

/// Compile input files down to the artifact `config.level` requests,
/// rooted at the `output` base path. Intermediate files are removed on
/// the success path only.
pub fn compile_files(
    inputs: &[PathBuf],
    output: &Path,
    config: &CompilerConfig,
) -> Result<(), DriverError> {
    let mut source = String::new();
    for path in inputs {
        let text = fs::read_to_string(path)
            .map_err(|e| DriverError::Io(format!("failed to read {}: {}", path.display(), e)))?;
        source.push_str(&text);
        if !source.ends_with('\n') {
            source.push('\n');
        }
    }

    let ir = compile_to_ir_with_config(&source, config)?;

    let base = output.display().to_string();
    let ll_file = format!("{}.ll", base);
    let s_file = format!("{}.s", base);
    let o_file = format!("{}.o", base);

    fs::write(&ll_file, ir)
        .map_err(|e| DriverError::Io(format!("failed to write {}: {}", ll_file, e)))?;
    debug!(path = %ll_file, "wrote IR");
    if config.level == CompilationLevel::Ir {
        return Ok(());
    }

    let mut llc = Command::new("llc");
    llc.arg(&ll_file).arg("-o").arg(&s_file);
    if config.pic {
        llc.arg("-relocation-model=pic");
    }
    run_tool(llc, "compile IR")?;
    if config.level == CompilationLevel::Asm {
        remove(&ll_file);
        return Ok(());
    }

    let mut assembler = Command::new("as");
    assembler.arg(&s_file).arg("-o").arg(&o_file);
    run_tool(assembler, "assemble")?;
    if config.level == CompilationLevel::Obj {
        remove(&s_file);
        remove(&ll_file);
        return Ok(());
    }

    let mut cc = Command::new("cc");
    cc.arg(&o_file).arg("-o").arg(&base);
    for lib in &config.libraries {
        cc.arg(format!("-l{}", lib));
    }
    run_tool(cc, "compile object")?;

    remove(&o_file);
    remove(&s_file);
    remove(&ll_file);
    Ok(())
}

/// Run one external tool, mapping a missing binary or a non-zero exit to
/// a driver error naming the failing step.
fn run_tool(mut command: Command, step: &str) -> Result<(), DriverError> {
    debug!(?command, step, "running tool");
    let status = command
        .status()
        .map_err(|e| DriverError::Tool(format!("failed to {}: {}", step, e)))?;
    if !status.success() {
        return Err(DriverError::Tool(format!(
            "failed to {} (exit code: {})",
            step,
            status.code().unwrap_or(-1)
        )));
    }
    Ok(())
}

fn remove(path: &str) {
    let _ = fs::remove_file(path);
}
