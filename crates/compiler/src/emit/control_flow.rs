//! Conditional statements
//!
//! `if`/`elif`/`else`/`fi` drive a stack of if-frames per function. Each
//! `if` creates a true/false/merge triple and branches on an integer
//! comparison; `elif` chains a new true/false pair onto the shared merge;
//! `else` moves emission into the false arm; `fi` closes every frame that
//! shares the merge block in one step.
//!
//! Terminator discipline: a block is branched to the merge only when it is
//! still open, so `return`-terminated arms keep their `ret`. After a
//! nested `fi`, the inner merge is pre-terminated with a branch to the
//! enclosing merge; statements that follow insert ahead of that branch.

use crate::lexer::TokenKind;

use super::error::CompileError;
use super::ir::IrType;
use super::state::{Compilation, IfFrame};

impl Compilation {
    /// Parse `<LHS> <cmp> <RHS>` and emit the comparison in the current
    /// block. Returns the `i1` operand.
    fn parse_condition(&mut self, line: i32) -> Result<String, CompileError> {
        let lhs = self.parse_expression(&IrType::I32, None)?;

        let op = self.tokens.next();
        let predicate = if op.kind == TokenKind::Operator {
            match op.text.as_str() {
                "==" => Some("eq"),
                "!=" => Some("ne"),
                ">" => Some("sgt"),
                "<" => Some("slt"),
                ">=" => Some("sge"),
                "<=" => Some("sle"),
                _ => None,
            }
        } else {
            None
        };
        let predicate = predicate.ok_or_else(|| {
            CompileError::new(format!("non-operator in if: {}", op.text), op.line)
        })?;

        let rhs = self.parse_expression(&lhs.ty, None)?;
        let rhs = self.coerce(rhs, &lhs.ty, line)?;

        let cond = self.temp(line)?;
        self.emit(
            line,
            format!(
                "{} = icmp {} {} {}, {}",
                cond, predicate, lhs.ty, lhs.repr, rhs.repr
            ),
        )?;
        Ok(cond)
    }

    /// `if <LHS> <cmp> <RHS> ;`
    pub(super) fn stmt_if(&mut self, line: i32) -> Result<(), CompileError> {
        let cond = self.parse_condition(line)?;
        let name = self.frame(line)?.source_name.clone();
        let n = self.next_label_index();

        let (func, block) = self.cursor(line)?;
        let on_true = self.module.add_block(func, &format!("{}Label{}true", name, n));
        let on_false = self
            .module
            .add_block(func, &format!("{}Label{}false", name, n));
        let merge = self
            .module
            .add_block(func, &format!("{}Label{}merge", name, n));

        let term = format!(
            "br i1 {}, label %{}, label %{}",
            cond,
            self.module.block_label(func, on_true),
            self.module.block_label(func, on_false)
        );
        self.module.terminate_if_open(func, block, term);

        self.set_cursor(func, on_true);
        self.frame_mut(line)?.if_frames.push(IfFrame {
            on_true,
            on_false,
            merge,
            from_elif: false,
        });
        Ok(())
    }

    /// `elif <LHS> <cmp> <RHS> ;` — close the open arm being left, then
    /// emit the next comparison in the previous frame's false block.
    pub(super) fn stmt_elif(&mut self, line: i32) -> Result<(), CompileError> {
        let prev = *self
            .frame(line)?
            .if_frames
            .last()
            .ok_or_else(|| CompileError::new("elif without an if", line))?;

        // The arm being left falls through to the shared merge unless it
        // already returned or branched.
        let (func, block) = self.cursor(line)?;
        let merge_label = format!("%{}", self.module.block_label(func, prev.merge));
        if !self.module.has_terminator(func, block) {
            self.module
                .terminate_if_open(func, block, format!("br label {}", merge_label));
        }

        // The next test cascades into the previous false block; only the
        // final false/else arm falls through to the merge.
        self.set_cursor(func, prev.on_false);
        let cond = self.parse_condition(line)?;
        let name = self.frame(line)?.source_name.clone();
        let n = self.next_label_index();

        let on_true = self.module.add_block(func, &format!("{}Label{}true", name, n));
        let on_false = self
            .module
            .add_block(func, &format!("{}Label{}false", name, n));

        let term = format!(
            "br i1 {}, label %{}, label %{}",
            cond,
            self.module.block_label(func, on_true),
            self.module.block_label(func, on_false)
        );
        self.module.terminate_if_open(func, prev.on_false, term);

        self.set_cursor(func, on_true);
        self.frame_mut(line)?.if_frames.push(IfFrame {
            on_true,
            on_false,
            merge: prev.merge,
            from_elif: true,
        });
        Ok(())
    }

    /// `else ;`
    pub(super) fn stmt_else(&mut self, line: i32) -> Result<(), CompileError> {
        let top = *self
            .frame(line)?
            .if_frames
            .last()
            .ok_or_else(|| CompileError::new("else without an if", line))?;

        let (func, block) = self.cursor(line)?;
        if !self.module.has_terminator(func, block) {
            let merge_label = self.module.block_label(func, top.merge).to_string();
            self.module
                .terminate_if_open(func, block, format!("br label %{}", merge_label));
        }
        self.set_cursor(func, top.on_false);
        Ok(())
    }

    /// `fi ;` — close the whole `if`/`elif` chain sharing one merge block.
    pub(super) fn stmt_fi(&mut self, line: i32) -> Result<(), CompileError> {
        let top = *self
            .frame(line)?
            .if_frames
            .last()
            .ok_or_else(|| CompileError::new("fi without an if", line))?;

        let (func, block) = self.cursor(line)?;
        let merge_label = format!("%{}", self.module.block_label(func, top.merge));

        if !self.module.has_terminator(func, block) {
            self.module
                .terminate_if_open(func, block, format!("br label {}", merge_label));
        }
        if !self.module.has_terminator(func, top.on_false) {
            self.module
                .terminate_if_open(func, top.on_false, format!("br label {}", merge_label));
        }

        self.module.move_block_to_end(func, top.merge);

        let frame = self.frame_mut(line)?;
        frame.if_frames.retain(|f| f.merge != top.merge);
        let enclosing = frame.if_frames.last().copied();

        self.set_cursor(func, top.merge);
        if let Some(outer) = enclosing {
            let outer_label = self.module.block_label(func, outer.merge).to_string();
            self.module
                .terminate_if_open(func, top.merge, format!("br label %{}", outer_label));
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
    fn if_creates_a_block_triple_and_branches() {
        let ir = compile(
            "context #nomangle main -> i32 ; declare i32 x ; assign x = 1 ; \
             if x == 1 ; assign x = 2 ; fi ; return x ; context ;",
        )
        .unwrap();
        assert!(ir.contains("icmp eq i32"));
        assert!(ir.contains("br i1 %t1, label %mainLabel0true, label %mainLabel0false"));
        assert!(ir.contains("mainLabel0true:"));
        assert!(ir.contains("mainLabel0false:"));
        assert!(ir.contains("mainLabel0merge:"));
        // Both arms reach the merge.
        assert_eq!(ir.matches("br label %mainLabel0merge").count(), 2);
    }

    #[test]
    fn comparison_predicates_map_to_signed_icmp() {
        for (op, pred) in [
            ("==", "eq"),
            ("!=", "ne"),
            (">", "sgt"),
            ("<", "slt"),
            (">=", "sge"),
            ("<=", "sle"),
        ] {
            let source = format!(
                "context #nomangle main -> i32 ; declare i32 x ; assign x = 1 ; \
                 if x {} 1 ; fi ; return 0 ; context ;",
                op
            );
            let ir = compile(&source).unwrap();
            assert!(ir.contains(&format!("icmp {} i32", pred)), "{}", op);
        }
    }

    #[test]
    fn comparison_coerces_the_right_operand_to_the_left() {
        let ir = compile(
            "context #nomangle main -> i32 ; declare i64 w ; assign w = 1 ; \
             if w == 2 ; fi ; return 0 ; context ;",
        )
        .unwrap();
        // LHS loads at its declared i64; the i32-preferred RHS literal is
        // a single token sized by the LHS type directly.
        assert!(ir.contains("icmp eq i64"));
    }

    #[test]
    fn returns_inside_arms_keep_their_terminators() {
        let ir = compile(
            "context #nomangle main -> i32 ; declare i32 x ; assign x = 5 ; \
             if x == 1 ; return 1 ; elif x == 5 ; return 2 ; else ; return 3 ; fi ; \
             return 0 ; context ;",
        )
        .unwrap();
        assert!(ir.contains("ret i32 1"));
        assert!(ir.contains("ret i32 2"));
        assert!(ir.contains("ret i32 3"));
        // The elif test still runs when the true arm returned: its
        // comparison terminates the first false block.
        assert!(ir.contains("br i1 %t3, label %mainLabel1true, label %mainLabel1false"));
        // All arms returned, so nothing branches into the merge; the final
        // return still lands there.
        assert!(ir.contains("ret i32 0"));
        assert!(!ir.contains("br label %mainLabel0merge"));
    }

    #[test]
    fn elif_chain_shares_one_merge_block() {
        let ir = compile(
            "context #nomangle main -> i32 ; declare i32 x ; assign x = 5 ; \
             if x == 1 ; assign x = 10 ; elif x == 5 ; assign x = 20 ; fi ; \
             return x ; context ;",
        )
        .unwrap();
        // Two triples are labeled, but only the first merge exists.
        assert!(ir.contains("mainLabel0merge:"));
        assert!(!ir.contains("mainLabel1merge"));
        // The elif comparison is emitted in the first false block, which
        // the conditional branch to the new pair then terminates.
        let false0 = ir.find("mainLabel0false:").unwrap();
        let elif_cmp = ir.rfind("icmp eq i32").unwrap();
        assert!(elif_cmp > false0);
        assert!(ir.contains("br i1 %t3, label %mainLabel1true, label %mainLabel1false"));
        // The left true arm and both final arms fall through to the merge.
        assert_eq!(ir.matches("br label %mainLabel0merge").count(), 3);
    }

    #[test]
    fn fi_flattens_the_whole_chain() {
        // After fi, further statements land in the merge block; a second
        // if right after must open a fresh frame, which only works if the
        // chain was fully popped.
        let ir = compile(
            "context #nomangle main -> i32 ; declare i32 x ; assign x = 1 ; \
             if x == 1 ; elif x == 2 ; elif x == 3 ; fi ; \
             if x == 4 ; fi ; return x ; context ;",
        )
        .unwrap();
        assert!(ir.contains("mainLabel0merge:"));
        assert!(ir.contains("mainLabel3merge:"));
    }

    #[test]
    fn merge_block_moves_to_the_end_of_the_function() {
        let ir = compile(
            "context #nomangle main -> i32 ; declare i32 x ; assign x = 1 ; \
             if x == 1 ; assign x = 2 ; fi ; return x ; context ;",
        )
        .unwrap();
        let false_at = ir.find("mainLabel0false:").unwrap();
        let merge_at = ir.find("mainLabel0merge:").unwrap();
        assert!(merge_at > false_at);
    }

    #[test]
    fn nested_if_branches_inner_merge_to_outer_merge() {
        let ir = compile(
            "context #nomangle main -> i32 ; declare i32 x ; assign x = 1 ; \
             if x == 1 ; if x == 2 ; assign x = 3 ; fi ; fi ; return x ; context ;",
        )
        .unwrap();
        // Inner triple is Label1, outer is Label0.
        let inner_merge = ir.find("mainLabel1merge:").unwrap();
        let tail = &ir[inner_merge..];
        assert!(tail.contains("br label %mainLabel0merge"));
    }

    #[test]
    fn else_moves_emission_into_the_false_arm() {
        let ir = compile(
            "context #nomangle main -> i32 ; declare i32 x ; assign x = 1 ; \
             if x == 1 ; assign x = 2 ; else ; assign x = 3 ; fi ; return x ; context ;",
        )
        .unwrap();
        let false_at = ir.find("mainLabel0false:").unwrap();
        let store3 = ir.find("store i32 3, ptr %x").unwrap();
        let merge_at = ir.find("mainLabel0merge:").unwrap();
        assert!(false_at < store3 && store3 < merge_at);
    }

    #[test]
    fn conditional_keywords_need_an_open_if() {
        for source in [
            "context #nomangle main -> i32 ; else ; return 0 ; context ;",
            "context #nomangle main -> i32 ; fi ; return 0 ; context ;",
            "context #nomangle main -> i32 ; elif 1 == 1 ; return 0 ; context ;",
        ] {
            let err = compile(source).unwrap_err();
            assert!(err.message.contains("without an if"), "{}", source);
        }
    }

    #[test]
    fn non_operator_in_if_is_rejected() {
        // The LHS window only stops on comparisons, so `if x ;` leaves the
        // semicolon as the would-be operator.
        let err = compile(
            "context #nomangle main -> i32 ; declare i32 x ; if x ; fi ; return 0 ; context ;",
        )
        .unwrap_err();
        assert!(err.message.contains("non-operator in if"));
    }

    #[test]
    fn assignment_operator_inside_a_condition_is_unknown() {
        // `=` is not an expression stop token; it is swallowed into the
        // LHS window and rejected by the evaluator.
        let err = compile(
            "context #nomangle main -> i32 ; declare i32 x ; if x = 1 ; fi ; return 0 ; context ;",
        )
        .unwrap_err();
        assert!(err.message.contains("Unknown operator: ="));
    }
}
