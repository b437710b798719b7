//! Expression evaluation
//!
//! Captures a token window from the cursor up to (not including) a stop
//! token, then evaluates it. A one-token window is handled directly; a
//! longer window goes through shunting-yard with explicit value and
//! operator stacks over `+ - * /` and parentheses.
//!
//! Literal sizing follows the caller's preferred type. In the one-token
//! path a char literal is its byte value at `i8`; inside a compound
//! expression it contributes `byte - '0'` instead — the historical
//! digit-offset encoding, kept as-is and pinned down in tests.

use crate::lexer::{Token, TokenKind};

use super::error::CompileError;
use super::ir::{IrType, IrValue};
use super::state::Compilation;

/// Comparison spellings double as expression stop tokens.
fn is_comparison(text: &str) -> bool {
    matches!(text, "==" | "!=" | "<" | "<=" | ">" | ">=")
}

fn is_stop(token: &Token, extra_stop: Option<&str>) -> bool {
    match token.kind {
        TokenKind::End | TokenKind::Semicolon | TokenKind::Arrow => true,
        TokenKind::Operator if is_comparison(&token.text) => true,
        _ => extra_stop.is_some_and(|s| token.text == s),
    }
}

/// Materialize an integer constant at the preferred type. Pointer-typed
/// literals become `null` (or an `inttoptr` constant expression for
/// non-zero values).
fn integer_constant(
    preferred: &IrType,
    value: i64,
    line: i32,
) -> Result<IrValue, CompileError> {
    if preferred.is_integer() {
        return Ok(IrValue::new(preferred.clone(), value.to_string()));
    }
    if preferred.is_pointer() {
        let repr = if value == 0 {
            "null".to_string()
        } else {
            format!("inttoptr (i64 {} to ptr)", value)
        };
        return Ok(IrValue::new(preferred.clone(), repr));
    }
    Err(CompileError::new(
        format!("cannot materialize a {} constant", preferred),
        line,
    ))
}

fn numeric_value(token: &Token) -> Result<i64, CompileError> {
    token.text.parse::<i64>().map_err(|_| {
        CompileError::new(
            format!("invalid numeric literal: {}", token.text),
            token.line,
        )
    })
}

/// Second byte of a char-literal token (`'c'` including quotes).
pub(super) fn char_byte(token: &Token) -> Result<u8, CompileError> {
    token
        .text
        .as_bytes()
        .get(1)
        .copied()
        .filter(|&b| b != b'\'')
        .ok_or_else(|| CompileError::new("empty character literal", token.line))
}

impl Compilation {
    /// Evaluate the expression starting at the token cursor. Consumes up
    /// to, but not including, the stop token; the cursor is left on it.
    pub(super) fn parse_expression(
        &mut self,
        preferred: &IrType,
        extra_stop: Option<&str>,
    ) -> Result<IrValue, CompileError> {
        let mut window: Vec<Token> = Vec::new();
        while !is_stop(self.tokens.peek(), extra_stop) {
            window.push(self.tokens.next());
        }

        let line = match window.first() {
            Some(t) => t.line,
            None => {
                let line = self.tokens.peek().line;
                return Err(CompileError::new("expected expression", line));
            }
        };

        if window.len() == 1 {
            self.single_token(&window[0], preferred)
        } else {
            self.shunting_yard(&window, preferred, line)
        }
    }

    /// One-token window: constant or variable load at its declared type.
    fn single_token(
        &mut self,
        token: &Token,
        preferred: &IrType,
    ) -> Result<IrValue, CompileError> {
        match token.kind {
            TokenKind::Identifier => {
                let var = self.lookup_variable(&token.text, token.line)?;
                let t = self.temp(token.line)?;
                self.emit(
                    token.line,
                    format!("{} = load {}, ptr {}", t, var.ty, var.slot),
                )?;
                Ok(IrValue::new(var.ty, t))
            }
            TokenKind::Literal => {
                if token.text.starts_with('\'') {
                    let byte = char_byte(token)?;
                    Ok(IrValue::new(IrType::I8, byte.to_string()))
                } else {
                    integer_constant(preferred, numeric_value(token)?, token.line)
                }
            }
            _ => Err(CompileError::new(
                format!("unexpected token in expression: {}", token.text),
                token.line,
            )),
        }
    }

    /// Two-stack evaluation of a compound expression.
    fn shunting_yard(
        &mut self,
        window: &[Token],
        preferred: &IrType,
        line: i32,
    ) -> Result<IrValue, CompileError> {
        let mut values: Vec<IrValue> = Vec::new();
        let mut operators: Vec<Token> = Vec::new();

        for token in window {
            match token.kind {
                TokenKind::Literal => {
                    let value = if token.text.starts_with('\'') {
                        // Digit-offset quirk: 'c' contributes c - '0'.
                        i64::from(char_byte(token)?) - i64::from(b'0')
                    } else {
                        numeric_value(token)?
                    };
                    values.push(integer_constant(preferred, value, token.line)?);
                }
                TokenKind::Identifier => {
                    let var = self.lookup_variable(&token.text, token.line)?;
                    let t = self.temp(token.line)?;
                    self.emit(
                        token.line,
                        format!("{} = load {}, ptr {}", t, preferred, var.slot),
                    )?;
                    values.push(IrValue::new(preferred.clone(), t));
                }
                TokenKind::Operator => {
                    // Reduce while a tighter-binding operator sits on top.
                    while let Some(top) = operators.last() {
                        let reducible = top.kind == TokenKind::Operator
                            && matches!(top.text.as_str(), "*" | "/")
                            && matches!(token.text.as_str(), "+" | "-" | "*" | "/");
                        if !reducible {
                            break;
                        }
                        let op = top.clone();
                        operators.pop();
                        self.reduce(&mut values, &op)?;
                    }
                    operators.push(token.clone());
                }
                TokenKind::LParen => operators.push(token.clone()),
                TokenKind::RParen => loop {
                    match operators.pop() {
                        Some(op) if op.kind == TokenKind::LParen => break,
                        Some(op) => self.reduce(&mut values, &op)?,
                        None => {
                            return Err(CompileError::new(
                                "mismatched parentheses in expression",
                                token.line,
                            ));
                        }
                    }
                },
                _ => {
                    return Err(CompileError::new(
                        format!("unexpected token in expression: {}", token.text),
                        token.line,
                    ));
                }
            }
        }

        while let Some(op) = operators.pop() {
            if op.kind == TokenKind::LParen {
                return Err(CompileError::new(
                    "mismatched parentheses in expression",
                    op.line,
                ));
            }
            self.reduce(&mut values, &op)?;
        }

        values
            .pop()
            .ok_or_else(|| CompileError::new("malformed expression", line))
    }

    /// Pop two operands, emit the signed arithmetic instruction for `op`,
    /// push the result.
    fn reduce(&mut self, values: &mut Vec<IrValue>, op: &Token) -> Result<(), CompileError> {
        let rhs = values
            .pop()
            .ok_or_else(|| CompileError::new("malformed expression", op.line))?;
        let lhs = values
            .pop()
            .ok_or_else(|| CompileError::new("malformed expression", op.line))?;
        let inst = match op.text.as_str() {
            "+" => "add",
            "-" => "sub",
            "*" => "mul",
            "/" => "sdiv",
            _ => {
                return Err(CompileError::new(
                    format!("Unknown operator: {}", op.text),
                    op.line,
                ));
            }
        };
        let t = self.temp(op.line)?;
        self.emit(
            op.line,
            format!("{} = {} {} {}, {}", t, inst, lhs.ty, lhs.repr, rhs.repr),
        )?;
        values.push(IrValue::new(lhs.ty, t));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::ir::FnSig;
    use crate::emit::state::{FunctionFrame, Variable};
    use crate::lexer::tokenize;

    /// Compilation with one open function, `x: i32` and `big: i64`
    /// variables, and the given tokens queued.
    fn with_source(source: &str) -> Compilation {
        let mut c = Compilation::new("dc", tokenize(source, 1));
        let func = c
            .module
            .define_function(
                FnSig {
                    name: "f".to_string(),
                    ret: IrType::I32,
                    params: vec![],
                    vararg: false,
                },
                vec![],
            )
            .unwrap();
        let entry = c.module.add_block(func, "f_blk");
        c.set_cursor(func, entry);
        c.frames.push(FunctionFrame {
            func,
            source_name: "f".to_string(),
            ret: IrType::I32,
            variables: vec![
                Variable {
                    name: "x".to_string(),
                    ty: IrType::I32,
                    slot: "%x".to_string(),
                },
                Variable {
                    name: "big".to_string(),
                    ty: IrType::I64,
                    slot: "%big".to_string(),
                },
            ],
            if_frames: vec![],
        });
        c
    }

    #[test]
    fn single_numeric_literal_takes_the_preferred_type() {
        let mut c = with_source("42 ;");
        let v = c.parse_expression(&IrType::I64, None).unwrap();
        assert_eq!(v.ty, IrType::I64);
        assert_eq!(v.repr, "42");
    }

    #[test]
    fn single_char_literal_is_its_byte_value() {
        let mut c = with_source("'A' ;");
        let v = c.parse_expression(&IrType::I32, None).unwrap();
        assert_eq!(v.ty, IrType::I8);
        assert_eq!(v.repr, "65");
    }

    #[test]
    fn single_identifier_loads_its_declared_type() {
        let mut c = with_source("big ;");
        let v = c.parse_expression(&IrType::I32, None).unwrap();
        assert_eq!(v.ty, IrType::I64);
        assert!(c.module.print().contains("load i64, ptr %big"));
    }

    #[test]
    fn compound_identifier_loads_at_the_preferred_type() {
        // Inside a compound window the preferred type wins over the
        // declared one.
        let mut c = with_source("big + 1 ;");
        let v = c.parse_expression(&IrType::I32, None).unwrap();
        assert_eq!(v.ty, IrType::I32);
        assert!(c.module.print().contains("load i32, ptr %big"));
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let mut c = with_source("2 + 3 * 4 ;");
        let v = c.parse_expression(&IrType::I32, None).unwrap();
        let ir = c.module.print();
        assert!(ir.contains("%t0 = mul i32 3, 4"));
        assert!(ir.contains("%t1 = add i32 2, %t0"));
        assert_eq!(v.repr, "%t1");
    }

    #[test]
    fn parentheses_group_explicitly() {
        let mut c = with_source("( 2 + 3 ) * 4 ;");
        let v = c.parse_expression(&IrType::I32, None).unwrap();
        let ir = c.module.print();
        assert!(ir.contains("%t0 = add i32 2, 3"));
        assert!(ir.contains("%t1 = mul i32 %t0, 4"));
        assert_eq!(v.repr, "%t1");
    }

    #[test]
    fn division_is_signed() {
        let mut c = with_source("x / 2 ;");
        c.parse_expression(&IrType::I32, None).unwrap();
        assert!(c.module.print().contains("sdiv i32"));
    }

    #[test]
    fn compound_char_literal_uses_the_digit_offset() {
        // '7' in a compound window contributes 7, not 55: the byte value
        // minus '0'. The one-token path above keeps the raw byte. The two
        // paths disagree on purpose.
        let mut c = with_source("'7' + 1 ;");
        c.parse_expression(&IrType::I32, None).unwrap();
        assert!(c.module.print().contains("add i32 7, 1"));
    }

    #[test]
    fn pointer_preferred_literals_become_null() {
        let mut c = with_source("0 ;");
        let v = c.parse_expression(&IrType::Ptr, None).unwrap();
        assert_eq!(v.repr, "null");
    }

    #[test]
    fn cursor_stops_on_the_stop_token() {
        let mut c = with_source("1 + 2 -> rest");
        c.parse_expression(&IrType::I32, None).unwrap();
        assert_eq!(c.tokens.peek().kind, TokenKind::Arrow);
    }

    #[test]
    fn caller_supplied_stop_text() {
        let mut c = with_source("x = 5 ;");
        c.parse_expression(&IrType::I64, Some("=")).unwrap();
        assert_eq!(c.tokens.peek().text, "=");
    }

    #[test]
    fn modulo_is_not_a_supported_operator() {
        let mut c = with_source("4 % 2 ;");
        let err = c.parse_expression(&IrType::I32, None).unwrap_err();
        assert!(err.message.contains("Unknown operator: %"));
    }

    #[test]
    fn dangling_operator_is_malformed() {
        let mut c = with_source("+ 3 ;");
        let err = c.parse_expression(&IrType::I32, None).unwrap_err();
        assert!(err.message.contains("malformed expression"));
    }

    #[test]
    fn empty_window_is_an_error() {
        let mut c = with_source("; trailing");
        let err = c.parse_expression(&IrType::I32, None).unwrap_err();
        assert!(err.message.contains("expected expression"));
    }

    #[test]
    fn unknown_variable_reports_its_name() {
        let mut c = with_source("missing ;");
        let err = c.parse_expression(&IrType::I32, None).unwrap_err();
        assert_eq!(err.message, "Unknown variable: missing");
    }
}
