//! Type resolution and implicit coercions
//!
//! Textual type names map to IR types: strip every `*`, look up the base,
//! re-wrap one pointer level per star. Coercions cover the conversions the
//! language performs implicitly (returns, comparison right operands,
//! store-through assignments); anything outside the table is a fatal
//! "unsupported cast".

use super::error::CompileError;
use super::ir::{IrType, IrValue};
use super::state::Compilation;

/// Resolve a textual type name (`i32`, `i8**`, `str`, `void`) to an IR
/// type. Unknown bases are a compilation error.
pub(super) fn type_from_name(text: &str, line: i32) -> Result<IrType, CompileError> {
    let base: String = text.chars().filter(|&c| c != '*').collect();
    let mut ty = match base.as_str() {
        "void" => IrType::Void,
        "i8" => IrType::I8,
        "i16" => IrType::I16,
        "i32" => IrType::I32,
        "i64" => IrType::I64,
        "ptr" => IrType::Ptr,
        "str" => IrType::I8.pointer_to(),
        _ => {
            return Err(CompileError::new(format!("Unknown type: {}", base), line));
        }
    };
    for _ in 0..text.chars().filter(|&c| c == '*').count() {
        ty = ty.pointer_to();
    }
    Ok(ty)
}

impl Compilation {
    /// Coerce `value` to `target`, emitting a conversion instruction when
    /// one is needed. Pointer-to-pointer differences are pure
    /// reinterpretation (both spell `ptr`).
    pub(super) fn coerce(
        &mut self,
        value: IrValue,
        target: &IrType,
        line: i32,
    ) -> Result<IrValue, CompileError> {
        if value.ty == *target {
            return Ok(value);
        }

        if value.ty.is_pointer() && target.is_pointer() {
            return Ok(IrValue::new(target.clone(), value.repr));
        }

        if value.ty.is_pointer() && target.is_integer() {
            let t = self.temp(line)?;
            self.emit(
                line,
                format!("{} = ptrtoint ptr {} to {}", t, value.repr, target),
            )?;
            return Ok(IrValue::new(target.clone(), t));
        }

        if value.ty.is_integer() && target.is_pointer() {
            let t = self.temp(line)?;
            self.emit(
                line,
                format!("{} = inttoptr {} {} to ptr", t, value.ty, value.repr),
            )?;
            return Ok(IrValue::new(target.clone(), t));
        }

        if let (Some(from), Some(to)) = (value.ty.int_width(), target.int_width()) {
            if from == to {
                return Ok(IrValue::new(target.clone(), value.repr));
            }
            let op = if from < to { "zext" } else { "trunc" };
            let t = self.temp(line)?;
            self.emit(
                line,
                format!("{} = {} {} {} to {}", t, op, value.ty, value.repr, target),
            )?;
            return Ok(IrValue::new(target.clone(), t));
        }

        Err(CompileError::new(
            format!("unsupported cast from {} to {}", value.ty, target),
            line,
        ))
    }
}
