//! A reusable walk over one code block, simulating the value stack.
//!
//! The [`Interpreter`] owns the stack discipline; what a value *is* and what each instruction
//! produces is left to a [`Processor`].  The rules every processor can rely on:
//!
//! - a value whose type carries no data (unit types, the universe) is never pushed or popped,
//!   the processor's [`Processor::unit_value`] stands in for it;
//! - a value of a void type pushes a "no value" marker.  Once it is on the stack the rest of the
//!   block is dead and no further instruction is dispatched;
//! - at the natural end of a block the stack is empty.  After a void marker, whatever is left
//!   below it is handed to [`Processor::drop`].

use dfa_error::error::AnalysisError;
use dfa_ir::{Code, Entity, ExprKind, Ir, Site};

/// The per instruction behaviour plugged into an [`Interpreter`].
pub trait Processor {
    type Value: Clone;
    type Output;

    fn sequence(&mut self, outputs: Vec<Self::Output>) -> Self::Output;

    fn unit_value(&mut self) -> Self::Value;

    /// Called before each dispatched instruction.
    fn expr_header(&mut self, site: Site) -> Self::Output;

    fn comment(&mut self, text: &str) -> Self::Output;

    fn nop(&mut self) -> Self::Output;

    /// A value with side effects whose result is not used.
    fn drop(&mut self, value: Self::Value) -> Self::Output;

    fn adr_of(&mut self, value: Self::Value) -> (Self::Value, Self::Output);

    fn assign(&mut self, site: Site, target: Self::Value, value: Self::Value) -> Self::Output;

    fn box_value(
        &mut self,
        value: Self::Value,
        value_ty: Entity,
        ref_ty: Entity,
    ) -> (Self::Value, Self::Output);

    fn unbox(&mut self, value: Self::Value, outer_ty: Entity) -> (Self::Value, Self::Output);

    /// `None` if the call never returns.
    fn call(
        &mut self,
        site: Site,
        target: Self::Value,
        args: Vec<Self::Value>,
    ) -> (Option<Self::Value>, Self::Output);

    fn current(&mut self, site: Site) -> (Self::Value, Self::Output);

    fn constant(&mut self, site: Site, ty: Entity, data: &[u8]) -> (Self::Value, Self::Output);

    /// Handle every case of a match, usually by running [`Interpreter::process`] on the case
    /// blocks.  Returns whether any case completes.
    fn match_value(
        &mut self,
        interpreter: &Interpreter<'_>,
        site: Site,
        subject: Self::Value,
    ) -> Result<(bool, Self::Output), AnalysisError>;

    fn tag(
        &mut self,
        site: Site,
        value: Self::Value,
        new_ty: Entity,
        tag: u32,
    ) -> (Self::Value, Self::Output);

    fn env(&mut self, site: Site, effect: Entity) -> (Self::Value, Self::Output);
}

/// `None` marks a value of a void type.
type Stack<V> = Vec<Option<V>>;

pub struct Interpreter<'a> {
    ir: &'a dyn Ir,
}

impl<'a> Interpreter<'a> {
    pub fn new(ir: &'a dyn Ir) -> Self {
        Interpreter { ir }
    }

    pub fn ir(&self) -> &'a dyn Ir {
        self.ir
    }

    /// Run `processor` over `code`, a block of `entity`.  The value is the unit value if the
    /// block completes and `None` if it ends in a void value.
    pub fn process<P: Processor + ?Sized>(
        &self,
        processor: &mut P,
        entity: Entity,
        code: Code,
    ) -> Result<(Option<P::Value>, P::Output), AnalysisError> {
        let mut stack: Stack<P::Value> = Vec::new();
        let mut outputs = Vec::new();
        for site in self.ir.code_sites(code) {
            if contains_void(&stack) {
                break;
            }
            outputs.push(processor.expr_header(site));
            let output = self.process_site(processor, entity, site, &mut stack)?;
            outputs.push(output);
        }

        let value = if contains_void(&stack) {
            stack.pop();
            while let Some(slot) = stack.pop() {
                if let Some(value) = slot {
                    outputs.push(processor.drop(value));
                }
            }
            None
        } else if !stack.is_empty() {
            return Err(AnalysisError::StackNotEmpty {
                entity,
                count: stack.len(),
            });
        } else {
            Some(processor.unit_value())
        };
        Ok((value, processor.sequence(outputs)))
    }

    fn process_site<P: Processor + ?Sized>(
        &self,
        p: &mut P,
        entity: Entity,
        site: Site,
        stack: &mut Stack<P::Value>,
    ) -> Result<P::Output, AnalysisError> {
        let ir = self.ir;
        let underflow = || AnalysisError::StackUnderflow { entity, site };

        let output = match ir.code_at(site) {
            ExprKind::AdrOf => {
                let value = stack.pop().flatten().ok_or_else(underflow)?;
                let (value, output) = p.adr_of(value);
                stack.push(Some(value));
                output
            }
            ExprKind::Assign => {
                let field = ir.accessed_entity(site);
                let target = self.pop(p, stack, ir.access_target_entity(site), entity, site)?;
                let value = self.pop(p, stack, ir.result_entity(field), entity, site)?;
                p.assign(site, target, value)
            }
            ExprKind::Box => {
                let value_ty = ir.box_value_entity(site);
                let ref_ty = ir.box_result_entity(site);
                if !ir.is_ref(value_ty) && ir.is_ref(ref_ty) {
                    let value = self.pop(p, stack, value_ty, entity, site)?;
                    let (value, output) = p.box_value(value, value_ty, ref_ty);
                    self.push(stack, ref_ty, Some(value));
                    output
                } else {
                    p.nop()
                }
            }
            ExprKind::Unbox => {
                let outer_ty = ir.unbox_outer_entity(site);
                let value_ty = ir.unbox_result_entity(site);
                if ir.is_ref(outer_ty) && !ir.is_ref(value_ty) {
                    let value = self.pop(p, stack, outer_ty, entity, site)?;
                    let (value, output) = p.unbox(value, outer_ty);
                    self.push(stack, value_ty, Some(value));
                    output
                } else {
                    p.nop()
                }
            }
            ExprKind::Call => {
                let callee = ir.accessed_entity(site);
                let args = self.args(p, stack, callee, ir.arg_count(callee), entity, site)?;
                let target = self.pop(p, stack, ir.access_target_entity(site), entity, site)?;
                let (result, output) = p.call(site, target, args);
                match result {
                    None => stack.push(None),
                    Some(_) if ir.call_precondition_only(site) => (),
                    Some(value) => self.push(stack, ir.result_entity(callee), Some(value)),
                }
                output
            }
            ExprKind::Current => {
                let (value, output) = p.current(site);
                self.push(stack, entity, Some(value));
                output
            }
            ExprKind::Comment => p.comment(ir.comment(site)),
            ExprKind::Const => {
                let ty = ir.constant_entity(site);
                let (value, output) = p.constant(site, ty, ir.constant_data(site));
                self.push(stack, ty, Some(value));
                output
            }
            ExprKind::Dup => {
                let top = stack.last().cloned().flatten().ok_or_else(underflow)?;
                stack.push(Some(top));
                p.nop()
            }
            ExprKind::Match => {
                let subject = self.pop(p, stack, ir.match_subject_entity(site), entity, site)?;
                let (completes, output) = p.match_value(self, site, subject)?;
                if !completes {
                    stack.push(None);
                }
                output
            }
            ExprKind::Tag => {
                let value_ty = ir.tag_value_entity(site);
                let new_ty = ir.tag_new_entity(site);
                let value = self.pop(p, stack, value_ty, entity, site)?;
                let (value, output) = p.tag(site, value, new_ty, ir.tag_number(site));
                self.push(stack, new_ty, Some(value));
                output
            }
            ExprKind::Env => {
                let effect = ir.effect_entity(site);
                let (value, output) = p.env(site, effect);
                self.push(stack, effect, Some(value));
                output
            }
            ExprKind::Pop => {
                let ty = ir.pop_entity(site);
                let value = self.pop(p, stack, ty, entity, site)?;
                if ir.has_data(ty) {
                    p.drop(value)
                } else {
                    p.nop()
                }
            }
            kind => return Err(AnalysisError::UnsupportedExpr { kind, site }),
        };
        Ok(output)
    }

    /// Pop the arguments of a call to `callee`, returned in declaration order.
    fn args<P: Processor + ?Sized>(
        &self,
        p: &mut P,
        stack: &mut Stack<P::Value>,
        callee: Entity,
        count: usize,
        entity: Entity,
        site: Site,
    ) -> Result<Vec<P::Value>, AnalysisError> {
        let mut args = Vec::with_capacity(count);
        for idx in (0..count).rev() {
            let ty = self.ir.result_entity(self.ir.arg_entity(callee, idx));
            args.push(self.pop(p, stack, ty, entity, site)?);
        }
        args.reverse();
        Ok(args)
    }

    fn push<V>(&self, stack: &mut Stack<V>, ty: Entity, value: Option<V>) {
        if self.ir.has_void_type(ty) {
            stack.push(None);
        } else if self.ir.has_data(ty) {
            stack.push(value);
        }
    }

    fn pop<P: Processor + ?Sized>(
        &self,
        p: &mut P,
        stack: &mut Stack<P::Value>,
        ty: Entity,
        entity: Entity,
        site: Site,
    ) -> Result<P::Value, AnalysisError> {
        if self.ir.has_data(ty) {
            stack
                .pop()
                .flatten()
                .ok_or(AnalysisError::StackUnderflow { entity, site })
        } else {
            Ok(p.unit_value())
        }
    }
}

fn contains_void<V>(stack: &Stack<V>) -> bool {
    matches!(stack.last(), Some(None))
}

/// The number of values `site` pops and pushes, counting only values that carry data.
///
/// `None` for instruction kinds without a known stack effect.
pub fn stack_effect(ir: &dyn Ir, site: Site) -> Option<(usize, usize)> {
    let data = |ty: Entity| usize::from(ir.has_data(ty));
    Some(match ir.code_at(site) {
        ExprKind::AdrOf => (1, 1),
        ExprKind::Assign => (
            data(ir.access_target_entity(site)) + data(ir.result_entity(ir.accessed_entity(site))),
            0,
        ),
        ExprKind::Box => {
            let (value_ty, ref_ty) = (ir.box_value_entity(site), ir.box_result_entity(site));
            if !ir.is_ref(value_ty) && ir.is_ref(ref_ty) {
                (data(value_ty), data(ref_ty))
            } else {
                (0, 0)
            }
        }
        ExprKind::Unbox => {
            let (outer_ty, value_ty) = (ir.unbox_outer_entity(site), ir.unbox_result_entity(site));
            if ir.is_ref(outer_ty) && !ir.is_ref(value_ty) {
                (data(outer_ty), data(value_ty))
            } else {
                (0, 0)
            }
        }
        ExprKind::Call => {
            let callee = ir.accessed_entity(site);
            let args: usize = (0..ir.arg_count(callee))
                .map(|idx| data(ir.result_entity(ir.arg_entity(callee, idx))))
                .sum();
            let result = if ir.call_precondition_only(site) {
                0
            } else {
                data(ir.result_entity(callee))
            };
            (args + data(ir.access_target_entity(site)), result)
        }
        ExprKind::Current => (0, data(ir.site_entity(site))),
        ExprKind::Comment => (0, 0),
        ExprKind::Const => (0, data(ir.constant_entity(site))),
        ExprKind::Dup => (1, 2),
        ExprKind::Match => (data(ir.match_subject_entity(site)), 0),
        ExprKind::Tag => (
            data(ir.tag_value_entity(site)),
            data(ir.tag_new_entity(site)),
        ),
        ExprKind::Env => (0, data(ir.effect_entity(site))),
        ExprKind::Pop => (data(ir.pop_entity(site)), 0),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfa_ir::{Expr, ProgramBuilder, SpecialEntity};

    /// Records which instructions were dispatched, using `String` values naming their origin.
    #[derive(Default)]
    struct Trace {
        events: Vec<String>,
    }

    impl Processor for Trace {
        type Value = String;
        type Output = ();

        fn sequence(&mut self, _outputs: Vec<()>) {}

        fn unit_value(&mut self) -> String {
            "unit".to_owned()
        }

        fn expr_header(&mut self, _site: Site) {}

        fn comment(&mut self, text: &str) {
            self.events.push(format!("comment {text}"));
        }

        fn nop(&mut self) {}

        fn drop(&mut self, value: String) {
            self.events.push(format!("drop {value}"));
        }

        fn adr_of(&mut self, value: String) -> (String, ()) {
            (format!("&{value}"), ())
        }

        fn assign(&mut self, _site: Site, target: String, value: String) {
            self.events.push(format!("assign {target}.f := {value}"));
        }

        fn box_value(&mut self, value: String, _: Entity, _: Entity) -> (String, ()) {
            (format!("box {value}"), ())
        }

        fn unbox(&mut self, value: String, _: Entity) -> (String, ()) {
            (format!("unbox {value}"), ())
        }

        fn call(&mut self, site: Site, target: String, args: Vec<String>) -> (Option<String>, ()) {
            self.events
                .push(format!("call {site} on {target} with [{}]", args.join(", ")));
            if site == Site(VOID_CALL_SITE) {
                (None, ())
            } else {
                (Some(format!("result {site}")), ())
            }
        }

        fn current(&mut self, _site: Site) -> (String, ()) {
            ("current".to_owned(), ())
        }

        fn constant(&mut self, _site: Site, _ty: Entity, data: &[u8]) -> (String, ()) {
            (format!("const {}", data.first().copied().unwrap_or_default()), ())
        }

        fn match_value(
            &mut self,
            interpreter: &Interpreter<'_>,
            site: Site,
            subject: String,
        ) -> Result<(bool, ()), AnalysisError> {
            self.events.push(format!("match {subject}"));
            let ir = interpreter.ir();
            let mut completes = false;
            for case in 0..ir.match_case_count(site) {
                let code = ir.match_case_code(site, case);
                let (value, _) = interpreter.process(self, ir.site_entity(site), code)?;
                completes |= value.is_some();
            }
            Ok((completes, ()))
        }

        fn tag(&mut self, _site: Site, value: String, _: Entity, tag: u32) -> (String, ()) {
            (format!("{value}#{tag}"), ())
        }

        fn env(&mut self, _site: Site, _effect: Entity) -> (String, ()) {
            ("env".to_owned(), ())
        }
    }

    /// A call at this site never returns.
    const VOID_CALL_SITE: u32 = 100;

    struct Fixture {
        builder: ProgramBuilder,
        i32_ty: Entity,
        unit_ty: Entity,
        main: Entity,
        field: Entity,
        unit_field: Entity,
        g: Entity,
    }

    fn fixture() -> Fixture {
        let mut builder = ProgramBuilder::new();
        let i32_ty = builder.ty("i32").unwrap();
        builder.entity(i32_ty).special(SpecialEntity::I32);
        let unit_ty = builder.ty("unit").unwrap();
        builder.entity(unit_ty).unit();
        let main = builder.declare("main", dfa_ir::EntityKind::Routine).unwrap();
        let field = builder.field("main.f", main, i32_ty).unwrap();
        let unit_field = builder.field("main.u", main, unit_ty).unwrap();
        let g = builder.declare("g", dfa_ir::EntityKind::Routine).unwrap();
        let g_arg = builder.field("g.a", g, i32_ty).unwrap();
        let g_result = builder.field("g.result", g, i32_ty).unwrap();
        builder.entity(g).args(vec![g_arg]).result_field(g_result);
        Fixture {
            builder,
            i32_ty,
            unit_ty,
            main,
            field,
            unit_field,
            g,
        }
    }

    fn run(
        mut fixture: Fixture,
        body: Vec<Expr>,
    ) -> (Result<Option<String>, AnalysisError>, Vec<String>) {
        let main = fixture.main;
        let code = fixture.builder.code(main, body);
        fixture.builder.entity(main).code(code);
        fixture.builder.set_main(main);
        let program = fixture.builder.finish().unwrap();
        let mut trace = Trace::default();
        let result = Interpreter::new(&program)
            .process(&mut trace, main, code)
            .map(|(value, _)| value);
        (result, trace.events)
    }

    #[test]
    fn assign_pops_target_then_value() {
        let f = fixture();
        let (i32_ty, field) = (f.i32_ty, f.field);
        let (result, events) = run(
            f,
            vec![
                Expr::constant(i32_ty, [7, 0, 0, 0]),
                Expr::Current,
                Expr::assign(field),
            ],
        );
        assert_eq!(result, Ok(Some("unit".to_owned())));
        assert_eq!(events, vec!["assign current.f := const 7"]);
    }

    #[test]
    fn unit_values_are_elided() {
        let f = fixture();
        let (unit_ty, unit_field) = (f.unit_ty, f.unit_field);
        let (result, events) = run(
            f,
            vec![
                Expr::constant(unit_ty, []),
                Expr::Current,
                Expr::assign(unit_field),
                Expr::Pop(unit_ty),
            ],
        );
        assert_eq!(result, Ok(Some("unit".to_owned())));
        assert_eq!(events, vec!["assign current.f := unit"]);
    }

    #[test]
    fn call_arguments_keep_declaration_order() {
        let f = fixture();
        let (i32_ty, g) = (f.i32_ty, f.g);
        let (result, events) = run(
            f,
            vec![
                Expr::constant(i32_ty, [1, 0, 0, 0]),
                Expr::call(g),
                Expr::Pop(i32_ty),
            ],
        );
        assert_eq!(result, Ok(Some("unit".to_owned())));
        assert_eq!(
            events,
            vec!["call s1 on unit with [const 1]", "drop result s1"]
        );
    }

    #[test]
    fn leftover_values_are_an_error() {
        let f = fixture();
        let i32_ty = f.i32_ty;
        let (result, _) = run(f, vec![Expr::constant(i32_ty, [1, 0, 0, 0])]);
        assert!(matches!(
            result,
            Err(AnalysisError::StackNotEmpty { count: 1, .. })
        ));
    }

    #[test]
    fn popping_an_empty_stack_is_an_error() {
        let f = fixture();
        let i32_ty = f.i32_ty;
        let (result, _) = run(f, vec![Expr::Pop(i32_ty)]);
        assert!(matches!(result, Err(AnalysisError::StackUnderflow { .. })));
    }

    #[test]
    fn void_stops_the_block_and_drops_leftovers() {
        let mut f = fixture();
        let (i32_ty, g, main) = (f.i32_ty, f.g, f.main);
        // Pad the site numbering so the call lands on `VOID_CALL_SITE`.
        let padding = (0..VOID_CALL_SITE - 2)
            .map(|_| Expr::Comment(String::new()))
            .collect();
        f.builder.code(main, padding);
        let (result, events) = run(
            f,
            vec![
                Expr::constant(i32_ty, [9, 0, 0, 0]),
                Expr::constant(i32_ty, [1, 0, 0, 0]),
                Expr::call(g),
                Expr::Comment("dead".to_owned()),
            ],
        );
        assert_eq!(result, Ok(None));
        assert_eq!(
            events,
            vec![
                format!("call s{VOID_CALL_SITE} on unit with [const 1]"),
                "drop const 9".to_owned(),
            ]
        );
    }

    #[test]
    fn stack_effects() {
        let f = fixture();
        let (i32_ty, g, main) = (f.i32_ty, f.g, f.main);
        let mut builder = f.builder;
        let code = builder.code(
            main,
            vec![
                Expr::Current,
                Expr::constant(i32_ty, [1, 0, 0, 0]),
                Expr::call(g),
                Expr::Pop(i32_ty),
                Expr::Pop(main),
            ],
        );
        builder.entity(main).code(code);
        builder.set_main(main);
        let program = builder.finish().unwrap();
        let effects = program
            .code_sites(code)
            .into_iter()
            .map(|site| stack_effect(&program, site))
            .collect::<Vec<_>>();
        assert_eq!(
            effects,
            vec![
                Some((0, 1)),
                Some((0, 1)),
                Some((1, 1)),
                Some((1, 0)),
                Some((1, 0)),
            ]
        );
    }
}
