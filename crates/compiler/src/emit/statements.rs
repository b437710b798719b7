//! Statement emission
//!
//! The driver loop of the emitter: read one token, dispatch on its keyword
//! (or treat an identifier as a call), emit IR directly into the current
//! block. There is no AST — each handler consumes exactly the tokens its
//! statement form needs and leaves the trailing semicolon for the loop to
//! skip.
//!
//! Function definitions push a frame on the context stack; a bare
//! `context ;` verifies the finished function and pops it, clearing the
//! insertion point, so the next emitting statement must be a new `context`
//! header.

use crate::lexer::{Keyword, Token, TokenKind};

use super::error::CompileError;
use super::expr::char_byte;
use super::globals::{expand_escapes, strip_quotes};
use super::ir::{FnSig, IrModule, IrType, IrValue};
use super::state::{mangle, Compilation, FunctionFrame, Variable};
use super::types::type_from_name;

impl Compilation {
    /// Run the statement loop over the whole token stream and return the
    /// finished module.
    pub fn compile(mut self) -> Result<IrModule, CompileError> {
        loop {
            let token = self.tokens.next();
            match token.kind {
                TokenKind::End => break,
                TokenKind::Keyword(kw) => self.statement(kw, &token)?,
                TokenKind::Identifier => self.call_statement(&token)?,
                // Stray semicolons and other tokens at statement position
                // are skipped.
                _ => {}
            }
        }
        Ok(self.module)
    }

    fn statement(&mut self, kw: Keyword, token: &Token) -> Result<(), CompileError> {
        let line = token.line;
        match kw {
            Keyword::Extern => self.stmt_extern(line),
            Keyword::Context => self.stmt_context(line),
            Keyword::Declare => self.stmt_declare(line),
            Keyword::Return => self.stmt_return(line),
            Keyword::Assign => self.stmt_assign(line),
            Keyword::Deref => self.stmt_deref(line),
            Keyword::Array => self.stmt_array(line),
            Keyword::If => self.stmt_if(line),
            Keyword::Elif => self.stmt_elif(line),
            Keyword::Else => self.stmt_else(line),
            Keyword::Fi => self.stmt_fi(line),
        }
    }

    /// Next token, with end-of-stream promoted to a compile error.
    pub(super) fn next_checked(&mut self) -> Result<Token, CompileError> {
        let token = self.tokens.next();
        if token.is_end() {
            Err(CompileError::new("unexpected end of stream", token.line))
        } else {
            Ok(token)
        }
    }

    fn expect_identifier(&mut self, what: &str) -> Result<Token, CompileError> {
        let token = self.next_checked()?;
        if token.kind != TokenKind::Identifier {
            return Err(CompileError::new(
                format!("expected identifier after {}", what),
                token.line,
            ));
        }
        Ok(token)
    }

    /// `extern <ret> <name> <arg-type>* [vararg] ;`
    fn stmt_extern(&mut self, _line: i32) -> Result<(), CompileError> {
        let ret_tok = self.next_checked()?;
        let ret = type_from_name(&ret_tok.text, ret_tok.line)?;
        let name_tok = self.expect_identifier("extern")?;

        let mut params = Vec::new();
        let mut vararg = false;
        loop {
            let tok = self.next_checked()?;
            if tok.kind == TokenKind::Semicolon {
                break;
            }
            if tok.text == "vararg" {
                vararg = true;
            } else {
                params.push(type_from_name(&tok.text, tok.line)?);
            }
        }

        self.module.declare_function(FnSig {
            name: name_tok.text,
            ret,
            params,
            vararg,
        });
        Ok(())
    }

    /// `context <name> [<type> <param>]* -> <ret> ;` opens a definition;
    /// a bare `context ;` closes the current one.
    fn stmt_context(&mut self, line: i32) -> Result<(), CompileError> {
        let token = self.next_checked()?;
        if token.kind == TokenKind::Semicolon {
            return self.finish_context(token.line);
        }

        let mut nomangle = false;
        let mut name_tok = token;
        if name_tok.kind == TokenKind::Identifier && name_tok.text == "#nomangle" {
            nomangle = true;
            name_tok = self.next_checked()?;
        }
        if name_tok.kind == TokenKind::Type {
            return Err(CompileError::new(
                format!("invalid type for function name: {}", name_tok.text),
                name_tok.line,
            ));
        }
        if name_tok.kind != TokenKind::Identifier {
            return Err(CompileError::new(
                "expected identifier after context",
                name_tok.line,
            ));
        }
        let source_name = name_tok.text;

        let mut param_types = Vec::new();
        let mut param_names = Vec::new();
        let ret = loop {
            let tok = self.next_checked()?;
            if tok.kind == TokenKind::Arrow {
                let ret_tok = self.next_checked()?;
                break type_from_name(&ret_tok.text, ret_tok.line)?;
            }
            if tok.kind == TokenKind::Type {
                param_types.push(type_from_name(&tok.text, tok.line)?);
                let pn = self.expect_identifier("parameter type")?;
                param_names.push(pn.text);
            }
        };

        let symbol = if nomangle || source_name == "main" {
            source_name.clone()
        } else {
            mangle(&self.module_id, &source_name, &ret, &param_types)
        };

        let func = self
            .module
            .define_function(
                FnSig {
                    name: symbol.clone(),
                    ret: ret.clone(),
                    params: param_types.clone(),
                    vararg: false,
                },
                param_names.clone(),
            )
            .map_err(|message| CompileError::new(message, line))?;
        let entry = self.module.add_block(func, &format!("{}_blk", source_name));
        self.set_cursor(func, entry);

        // Spill every parameter into a stack slot so it is addressable
        // like any declared variable.
        let mut frame = FunctionFrame {
            func,
            source_name,
            ret,
            variables: Vec::new(),
            if_frames: Vec::new(),
        };
        for (ty, name) in param_types.iter().zip(&param_names) {
            let slot = format!(
                "%{}",
                self.module.unique_name(func, &format!("{}.addr", name))
            );
            self.emit(line, format!("{} = alloca {}", slot, ty))?;
            self.emit(line, format!("store {} %{}, ptr {}", ty, name, slot))?;
            frame.variables.push(Variable {
                name: name.clone(),
                ty: ty.clone(),
                slot,
            });
        }
        self.frames.push(frame);
        self.all_functions.push(symbol);
        Ok(())
    }

    /// `context ;` — verify the finished function, pop its frame, clear
    /// the insertion point.
    fn finish_context(&mut self, line: i32) -> Result<(), CompileError> {
        let frame = self.frames.pop().ok_or_else(|| {
            CompileError::new("context terminator without an open context", line)
        })?;
        self.module
            .verify_function(frame.func)
            .map_err(|message| CompileError::new(message, line))?;
        self.insert = None;
        Ok(())
    }

    /// `declare <type> <name> ;`
    fn stmt_declare(&mut self, line: i32) -> Result<(), CompileError> {
        let ty_tok = self.next_checked()?;
        let ty = type_from_name(&ty_tok.text, ty_tok.line)?;
        let name_tok = self.expect_identifier("declare")?;

        let (func, _) = self.cursor(line)?;
        let slot = format!("%{}", self.module.unique_name(func, &name_tok.text));
        self.emit(line, format!("{} = alloca {}", slot, ty))?;
        self.frame_mut(line)?.variables.push(Variable {
            name: name_tok.text,
            ty,
            slot,
        });
        Ok(())
    }

    /// `return ;` or `return <expr> ;`
    fn stmt_return(&mut self, line: i32) -> Result<(), CompileError> {
        if self.tokens.peek().kind == TokenKind::Semicolon {
            let (func, block) = self.cursor(line)?;
            self.module
                .terminate_if_open(func, block, "ret void".to_string());
            return Ok(());
        }

        let ret_ty = self.frame(line)?.ret.clone();
        let value = self.parse_expression(&ret_ty, None)?;
        let value = self.coerce(value, &ret_ty, line)?;
        let (func, block) = self.cursor(line)?;
        self.module
            .terminate_if_open(func, block, format!("ret {}", value.typed()));
        Ok(())
    }

    /// `assign [<strong-type>] [ptr <pointee>] <name> = <expr> ;` or
    /// `assign <name> -> <other> ;`
    fn stmt_assign(&mut self, line: i32) -> Result<(), CompileError> {
        let first = self.next_checked()?;
        let mut strong: Option<IrType> = None;
        let mut store_through: Option<IrType> = None;

        let name_tok = if first.kind == TokenKind::Type {
            if first.text == "ptr" && self.tokens.peek().kind == TokenKind::Type {
                let pointee_tok = self.tokens.next();
                store_through = Some(type_from_name(&pointee_tok.text, pointee_tok.line)?);
            } else {
                strong = Some(type_from_name(&first.text, first.line)?);
            }
            self.next_checked()?
        } else {
            first
        };
        if name_tok.kind != TokenKind::Identifier {
            return Err(CompileError::new(
                "expected identifier after assign",
                name_tok.line,
            ));
        }
        let var = self.lookup_variable(&name_tok.text, name_tok.line)?;

        let op = self.next_checked()?;
        match op.text.as_str() {
            "=" => {
                if let Some(pointee) = store_through {
                    // Store through the pointer held by the variable.
                    let target = self.temp(line)?;
                    self.emit(line, format!("{} = load ptr, ptr {}", target, var.slot))?;
                    let value = self.parse_expression(&pointee, None)?;
                    let value = self.coerce(value, &pointee, line)?;
                    self.emit(line, format!("store {}, ptr {}", value.typed(), target))?;
                } else {
                    let preferred = strong.unwrap_or_else(|| var.ty.clone());
                    let value = self.parse_expression(&preferred, None)?;
                    self.emit(line, format!("store {}, ptr {}", value.typed(), var.slot))?;
                }
            }
            "->" => {
                // Address-of: the slot address of the target variable.
                let target_tok = self.expect_identifier("-> in assign")?;
                let target = self.lookup_variable(&target_tok.text, target_tok.line)?;
                self.emit(
                    line,
                    format!("store ptr {}, ptr {}", target.slot, var.slot),
                )?;
            }
            _ => {
                return Err(CompileError::new(
                    format!("Unknown operator: {}", op.text),
                    op.line,
                ));
            }
        }
        Ok(())
    }

    /// `deref <ptr-name> -> <dest-name> ;` — doubly-indirect load.
    fn stmt_deref(&mut self, line: i32) -> Result<(), CompileError> {
        let ptr_tok = self.expect_identifier("deref")?;
        let arrow = self.next_checked()?;
        if arrow.kind != TokenKind::Arrow {
            return Err(CompileError::new(
                "expected -> after identifier in deref",
                arrow.line,
            ));
        }
        let dest_tok = self.expect_identifier("-> in deref")?;

        let ptr_var = self.lookup_variable(&ptr_tok.text, ptr_tok.line)?;
        let dest_var = self.lookup_variable(&dest_tok.text, dest_tok.line)?;

        let pointer = self.temp(line)?;
        self.emit(
            line,
            format!("{} = load ptr, ptr {}", pointer, ptr_var.slot),
        )?;
        let value = self.temp(line)?;
        self.emit(
            line,
            format!("{} = load {}, ptr {}", value, dest_var.ty, pointer),
        )?;
        self.emit(
            line,
            format!("store {} {}, ptr {}", dest_var.ty, value, dest_var.slot),
        )?;
        Ok(())
    }

    /// `array <name> <index> = <value> ;` or
    /// `array <name> <index> -> <dest> ;`
    fn stmt_array(&mut self, line: i32) -> Result<(), CompileError> {
        let name_tok = self.expect_identifier("array")?;
        let var = self.lookup_variable(&name_tok.text, name_tok.line)?;

        let index = self.parse_expression(&IrType::I64, Some("="))?;
        let index = self.coerce(index, &IrType::I64, line)?;

        let op = self.next_checked()?;
        match op.text.as_str() {
            "=" => {
                let elem = var.ty.pointee().cloned().unwrap_or(IrType::I32);
                let value = self.parse_expression(&elem, None)?;
                let value = self.coerce(value, &elem, line)?;
                let base = self.temp(line)?;
                self.emit(line, format!("{} = load ptr, ptr {}", base, var.slot))?;
                let slot = self.temp(line)?;
                self.emit(
                    line,
                    format!(
                        "{} = getelementptr {}, ptr {}, i64 {}",
                        slot, elem, base, index.repr
                    ),
                )?;
                self.emit(line, format!("store {}, ptr {}", value.typed(), slot))?;
            }
            "->" => {
                let dest_tok = self.expect_identifier("-> in array")?;
                let dest = self.lookup_variable(&dest_tok.text, dest_tok.line)?;
                let elem = dest.ty.clone();
                let base = self.temp(line)?;
                self.emit(line, format!("{} = load ptr, ptr {}", base, var.slot))?;
                let slot = self.temp(line)?;
                self.emit(
                    line,
                    format!(
                        "{} = getelementptr {}, ptr {}, i64 {}",
                        slot, elem, base, index.repr
                    ),
                )?;
                let value = self.temp(line)?;
                self.emit(line, format!("{} = load {}, ptr {}", value, elem, slot))?;
                self.emit(
                    line,
                    format!("store {} {}, ptr {}", elem, value, dest.slot),
                )?;
            }
            _ => {
                return Err(CompileError::new(
                    format!("Unknown operator: {}", op.text),
                    op.line,
                ));
            }
        }
        Ok(())
    }

    /// Identifier at statement position: a call, `name(arg, ...) [-> dest] ;`.
    /// An identifier not followed by `(` is consumed and ignored.
    fn call_statement(&mut self, ident: &Token) -> Result<(), CompileError> {
        let line = ident.line;
        if self.tokens.next().kind != TokenKind::LParen {
            return Ok(());
        }

        let mut args: Vec<IrValue> = Vec::new();
        let closed = loop {
            let tok = self.next_checked()?;
            match tok.kind {
                TokenKind::Semicolon => break false,
                TokenKind::RParen => break true,
                TokenKind::Comma => continue,
                TokenKind::StringLiteral => {
                    let text = expand_escapes(strip_quotes(&tok.text));
                    let global = self.string_global(&text);
                    args.push(global);
                }
                TokenKind::Literal => {
                    if tok.text.starts_with('\'') {
                        let byte = char_byte(&tok)?;
                        args.push(IrValue::new(IrType::I8, byte.to_string()));
                    } else {
                        let value: i64 = tok.text.parse().map_err(|_| {
                            CompileError::new(
                                format!("invalid numeric literal: {}", tok.text),
                                tok.line,
                            )
                        })?;
                        args.push(IrValue::new(IrType::I32, value.to_string()));
                    }
                }
                TokenKind::Identifier => {
                    let var = self.lookup_variable(&tok.text, tok.line)?;
                    let t = self.temp(tok.line)?;
                    self.emit(
                        tok.line,
                        format!("{} = load {}, ptr {}", t, var.ty, var.slot),
                    )?;
                    args.push(IrValue::new(var.ty, t));
                }
                _ => {}
            }
        };

        let symbol = self.resolve_callee(&ident.text);
        let sig = self
            .module
            .callee_sig(&symbol)
            .cloned()
            .ok_or_else(|| {
                CompileError::new(format!("Undefined reference to {}", ident.text), line)
            })?;

        let arg_list = args
            .iter()
            .map(|a| a.typed())
            .collect::<Vec<_>>()
            .join(", ");
        let result = if sig.ret == IrType::Void {
            self.emit(
                line,
                format!("call {} @{}({})", sig.callee_type(), symbol, arg_list),
            )?;
            None
        } else {
            let t = self.temp(line)?;
            self.emit(
                line,
                format!("{} = call {} @{}({})", t, sig.callee_type(), symbol, arg_list),
            )?;
            Some(IrValue::new(sig.ret.clone(), t))
        };

        // `-> dest` after the closing paren captures the result.
        if closed && self.tokens.peek().kind == TokenKind::Arrow {
            self.tokens.next();
            let dest_tok = self.expect_identifier("-> in call")?;
            let dest = self.lookup_variable(&dest_tok.text, dest_tok.line)?;
            let value = result.ok_or_else(|| {
                CompileError::new(
                    format!("cannot capture the result of void function {}", ident.text),
                    dest_tok.line,
                )
            })?;
            self.emit(line, format!("store {}, ptr {}", value.typed(), dest.slot))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn compile(source: &str) -> Result<String, CompileError> {
        Compilation::new("dc", tokenize(source, 1))
            .compile()
            .map(|module| module.print())
    }

    #[test]
    fn extern_declares_with_vararg() {
        let ir = compile("extern i32 printf str vararg;").unwrap();
        assert!(ir.contains("declare i32 @printf(ptr, ...)"));
    }

    #[test]
    fn extern_redeclaration_is_a_no_op() {
        let ir = compile("extern i32 puts str; extern i32 puts str;").unwrap();
        assert_eq!(ir.matches("declare i32 @puts").count(), 1);
    }

    #[test]
    fn context_spills_parameters_into_slots() {
        let ir = compile("context #nomangle main i32 argc ptr argv -> i32 ; return argc ; context ;")
            .unwrap();
        assert!(ir.contains("define i32 @main(i32 %argc, ptr %argv)"));
        assert!(ir.contains("main_blk:"));
        assert!(ir.contains("%argc.addr = alloca i32"));
        assert!(ir.contains("store i32 %argc, ptr %argc.addr"));
        assert!(ir.contains("store ptr %argv, ptr %argv.addr"));
        assert!(ir.contains("load i32, ptr %argc.addr"));
    }

    #[test]
    fn main_is_never_mangled_and_helpers_are() {
        let ir = compile(
            "context f i32 n -> i32 ; return n ; context ; \
             context #nomangle main -> i32 ; return 0 ; context ;",
        )
        .unwrap();
        assert!(ir.contains("define i32 @_Z1f2dc_i32_i32(i32 %n)"));
        assert!(ir.contains("define i32 @main()"));
    }

    #[test]
    fn calls_resolve_through_the_mangle_table() {
        let ir = compile(
            "context f i32 n -> i32 ; return n ; context ; \
             context #nomangle main -> i32 ; declare i32 r ; f(9) -> r ; return r ; context ;",
        )
        .unwrap();
        assert!(ir.contains("call i32 @_Z1f2dc_i32_i32(i32 9)"));
        assert!(ir.contains("store i32 %t0, ptr %r"));
    }

    #[test]
    fn undefined_reference_is_fatal() {
        let err = compile("context #nomangle main -> i32 ; nope(1); return 0; context ;")
            .unwrap_err();
        assert_eq!(err.message, "Undefined reference to nope");
    }

    #[test]
    fn string_arguments_become_global_constants() {
        let ir = compile(
            "extern i32 printf str vararg; \
             context #nomangle main -> i32 ; printf(\"hi\\n\"); return 0; context ;",
        )
        .unwrap();
        assert!(ir.contains("@.str.0 = private unnamed_addr constant [4 x i8] c\"hi\\0A\\00\""));
        assert!(ir.contains("call i32 (ptr, ...) @printf(ptr @.str.0)"));
    }

    #[test]
    fn call_arguments_convert_per_kind() {
        let ir = compile(
            "extern i32 printf str vararg; \
             context #nomangle main -> i32 ; declare i32 x ; assign x = 3 ; \
             printf(\"%d %d %d\\n\", x, 7, 'A'); return 0; context ;",
        )
        .unwrap();
        assert!(ir.contains("i32 %t0, i32 7, i8 65"));
    }

    #[test]
    fn assign_stores_into_the_slot() {
        let ir = compile(
            "context #nomangle main -> i32 ; declare i32 x ; assign x = 2 + 3 * 4 ; return x ; context ;",
        )
        .unwrap();
        assert!(ir.contains("%x = alloca i32"));
        assert!(ir.contains("%t0 = mul i32 3, 4"));
        assert!(ir.contains("%t1 = add i32 2, %t0"));
        assert!(ir.contains("store i32 %t1, ptr %x"));
    }

    #[test]
    fn assign_strong_type_overrides_literal_sizing() {
        let ir = compile(
            "context #nomangle main -> i32 ; declare i64 x ; assign i64 x = 5 ; return 0 ; context ;",
        )
        .unwrap();
        assert!(ir.contains("store i64 5, ptr %x"));
    }

    #[test]
    fn assign_address_of_links_two_slots() {
        let ir = compile(
            "context #nomangle main -> i32 ; declare i32 a ; declare ptr p ; \
             assign p -> a ; return 0 ; context ;",
        )
        .unwrap();
        assert!(ir.contains("store ptr %a, ptr %p"));
    }

    #[test]
    fn assign_store_through_pointer() {
        let ir = compile(
            "context #nomangle main -> i32 ; declare ptr p ; \
             assign ptr i32 p = 7 ; return 0 ; context ;",
        )
        .unwrap();
        assert!(ir.contains("%t0 = load ptr, ptr %p"));
        assert!(ir.contains("store i32 7, ptr %t0"));
    }

    #[test]
    fn deref_round_trips_through_a_pointer() {
        let ir = compile(
            "context #nomangle main -> i32 ; declare i32 a ; assign a = 7 ; \
             declare ptr p ; assign p -> a ; declare i32 b ; deref p -> b ; \
             return b ; context ;",
        )
        .unwrap();
        assert!(ir.contains("load ptr, ptr %p"));
        assert!(ir.contains("load i32, ptr %t0"));
        assert!(ir.contains("store i32 %t1, ptr %b"));
    }

    #[test]
    fn array_store_and_load_use_element_pointers() {
        let ir = compile(
            "extern ptr malloc i64; \
             context #nomangle main -> i32 ; declare i8* buf ; declare i32 v ; \
             array buf 2 = 65 ; array buf 2 -> v ; return v ; context ;",
        )
        .unwrap();
        // Store form: element type comes from the pointee.
        assert!(ir.contains("getelementptr i8, ptr %t0, i64 2"));
        assert!(ir.contains("store i8 65, ptr %t1"));
        // Load form: element type comes from the destination.
        assert!(ir.contains("getelementptr i32, ptr %t2, i64 2"));
        assert!(ir.contains("store i32 %t4, ptr %v"));
    }

    #[test]
    fn return_without_value_is_ret_void() {
        let ir = compile("context noret -> void ; return ; context ;").unwrap();
        assert!(ir.contains("ret void"));
    }

    #[test]
    fn return_coerces_to_the_declared_type() {
        let ir = compile(
            "context wide -> i64 ; declare i32 x ; assign x = 1 ; return x ; context ;",
        )
        .unwrap();
        assert!(ir.contains("zext i32 %t0 to i64"));
        assert!(ir.contains("ret i64 %t1"));
    }

    #[test]
    fn statements_after_a_context_pop_are_rejected() {
        let err = compile(
            "context f -> void ; return ; context ; declare i32 x ;",
        )
        .unwrap_err();
        assert!(err.message.contains("outside of a context"));
    }

    #[test]
    fn duplicate_definitions_are_rejected() {
        let err = compile(
            "context f -> void ; return ; context ; context f -> void ; return ; context ;",
        )
        .unwrap_err();
        assert!(err.message.contains("duplicate definition"));
    }

    #[test]
    fn unterminated_function_fails_verification() {
        let err = compile("context f -> i32 ; declare i32 x ; context ;").unwrap_err();
        assert!(err.message.contains("no terminator"));
    }

    #[test]
    fn unknown_type_reports_the_base_name() {
        let err = compile("context f -> i32 ; declare float x ; return 0 ; context ;")
            .unwrap_err();
        assert_eq!(err.message, "Unknown type: float");
    }

    #[test]
    fn header_with_type_as_name_is_rejected() {
        let err = compile("context i32 -> i32 ;").unwrap_err();
        assert!(err.message.contains("invalid type for function name"));
    }

    #[test]
    fn truncated_header_hits_end_of_stream() {
        let err = compile("context f i32").unwrap_err();
        assert_eq!(err.message, "unexpected end of stream");
    }

    #[test]
    fn defined_symbols_match_the_mangle_of_each_header() {
        let ir = compile(
            "context helper_1 i32 n -> i32 ; return n ; context ; \
             context #nomangle raw -> void ; return ; context ; \
             context #nomangle main -> i32 ; return 0 ; context ;",
        )
        .unwrap();
        assert!(ir.contains("define i32 @_Z6helper2dc_i32_i32"));
        assert!(ir.contains("define void @raw()"));
        assert!(ir.contains("define i32 @main()"));
    }
}
