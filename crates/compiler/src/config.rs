//! Compiler configuration
//!
//! Everything the driver can vary about a compile: how far the pipeline
//! runs, whether the prelude is prepended, the relocation model, extra
//! link libraries, and the module identity used for name mangling.

/// How far the pipeline runs before stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompilationLevel {
    /// Stop after writing the `.ll` file.
    Ir,
    /// Stop after `llc` produces the `.s` file.
    Asm,
    /// Stop after `as` produces the `.o` file.
    Obj,
    /// Link an executable.
    #[default]
    Exe,
}

/// Configuration for one compile.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Requested artifact.
    pub level: CompilationLevel,

    /// Skip the embedded prelude prepend.
    pub nostdlib: bool,

    /// Pass `-relocation-model=pic` to `llc`.
    pub pic: bool,

    /// Libraries appended to the link command as `-l<name>`.
    pub libraries: Vec<String>,

    /// Module identity; feeds the mangling scheme. The driver derives it
    /// from the first input file's stem.
    pub module_name: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            level: CompilationLevel::default(),
            nostdlib: false,
            pic: false,
            libraries: Vec::new(),
            module_name: "dc".to_string(),
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    /// Set the requested artifact (builder pattern).
    pub fn with_level(mut self, level: CompilationLevel) -> Self {
        self.level = level;
        self
    }

    /// Compile without the embedded prelude.
    pub fn without_stdlib(mut self) -> Self {
        self.nostdlib = true;
        self
    }

    /// Add a library to link.
    pub fn with_library(mut self, lib: impl Into<String>) -> Self {
        self.libraries.push(lib.into());
        self
    }

    /// Set the module identity used for mangling.
    pub fn with_module_name(mut self, name: impl Into<String>) -> Self {
        self.module_name = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_targets_an_executable_with_the_prelude() {
        let config = CompilerConfig::default();
        assert_eq!(config.level, CompilationLevel::Exe);
        assert!(!config.nostdlib);
        assert!(!config.pic);
        assert!(config.libraries.is_empty());
        assert_eq!(config.module_name, "dc");
    }

    #[test]
    fn builder_chains() {
        let config = CompilerConfig::new()
            .with_level(CompilationLevel::Ir)
            .without_stdlib()
            .with_library("m")
            .with_module_name("prog");
        assert_eq!(config.level, CompilationLevel::Ir);
        assert!(config.nostdlib);
        assert_eq!(config.libraries, vec!["m"]);
        assert_eq!(config.module_name, "prog");
    }
}
