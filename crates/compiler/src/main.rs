//! DC Compiler CLI
//!
//! Command-line interface for compiling .dc programs to LLVM IR,
//! assembly, object files, or executables.

use clap::Parser as ClapParser;
use std::path::PathBuf;
use std::process;

use dcc::{CompilationLevel, CompilerConfig, DriverError, compile_files};

#[derive(ClapParser)]
#[command(name = "dcc")]
#[command(about = "DC compiler - compile .dc sources to executables", long_about = None)]
#[command(disable_version_flag = true)]
struct Cli {
    /// Input .dc source files
    #[arg(value_name = "FILE")]
    inputs: Vec<PathBuf>,

    /// Print version information and exit
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// Stop after emitting LLVM IR (.ll)
    #[arg(short = 'i', long = "ir")]
    ir: bool,

    /// Stop after emitting assembly (.s)
    #[arg(short = 'S', long = "asm")]
    asm: bool,

    /// Stop after emitting an object file (.o)
    #[arg(short = 'c', long = "obj")]
    obj: bool,

    /// Do not prepend the embedded standard-library prelude
    #[arg(long)]
    nostdlib: bool,

    /// Use the position-independent relocation model
    #[arg(long)]
    pic: bool,

    /// Link against an additional library
    #[arg(short = 'l', value_name = "NAME")]
    libs: Vec<String>,

    /// Output base name
    #[arg(short = 'o', value_name = "PATH", default_value = "a.out")]
    output: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.version {
        println!("dcc {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    if cli.inputs.is_empty() {
        eprintln!("\x1b[1mdcc:\x1b[0m \x1b[1;31mfatal error:\x1b[0m no input files");
        eprintln!("compilation terminated.");
        process::exit(1);
    }

    let level = if cli.ir {
        CompilationLevel::Ir
    } else if cli.asm {
        CompilationLevel::Asm
    } else if cli.obj {
        CompilationLevel::Obj
    } else {
        CompilationLevel::Exe
    };

    // Module identity for mangling comes from the first translation unit.
    let module_name = cli.inputs[0]
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("dc")
        .to_string();

    let mut config = CompilerConfig::new().with_module_name(module_name);
    config.level = level;
    config.nostdlib = cli.nostdlib;
    config.pic = cli.pic;
    config.libraries = cli.libs;

    if let Err(error) = compile_files(&cli.inputs, &cli.output, &config) {
        report(&error);
        process::exit(1);
    }
}

fn report(error: &DriverError) {
    match error {
        DriverError::Compile(e) => eprintln!(
            "\x1b[1mdcc:\x1b[0m \x1b[1;31mcompilation error:\x1b[0m {}",
            e
        ),
        DriverError::Io(msg) | DriverError::Tool(msg) => {
            eprintln!("\x1b[1mdcc:\x1b[0m \x1b[1;31mfatal error:\x1b[0m {}", msg)
        }
    }
}
