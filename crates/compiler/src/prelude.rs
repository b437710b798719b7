//! Embedded standard-library prelude
//!
//! The prelude is DC source embedded at compile time, which keeps dcc
//! fully self-contained — no stdlib files to locate at run time. Unless
//! `--nostdlib` is given it is prepended to the user's input; its line
//! count feeds the lexer a negative starting line so user source stays
//! 1-based.
//!
//! It declares the libc surface programs lean on (`printf`, `scanf`,
//! `malloc`, `free`, `exit`, `strtol`) and defines the helpers `alloc`,
//! `delete`, `collapse`, `collapse_handler`, and `parse_int`.

pub const PRELUDE: &str = include_str!("../stdlib/prelude.dc");

/// Number of source lines the prelude occupies.
pub fn line_count() -> i32 {
    PRELUDE.matches('\n').count() as i32
}
