//! Recognise calls whose result becomes the result of the calling routine unchanged.
//!
//! The code of the routine is matched backwards from its last instruction.  A tail call is
//! either the last instruction itself or the value stored into the result field right at the
//! end, possibly through a chain of local fields (`r := g(); result := r`) and through the
//! cases of a `match`.

use dfa_ir::{Code, Entity, EntityKind, ExprKind, Ir, Site};

use crate::interpreter::stack_effect;

pub struct TailCall<'a> {
    ir: &'a dyn Ir,
}

impl<'a> TailCall<'a> {
    pub fn new(ir: &'a dyn Ir) -> Self {
        TailCall { ir }
    }

    /// Whether the call at `site` is the final action of `entity` producing its result.
    pub fn is_tail_call(&self, entity: Entity, site: Site) -> bool {
        let ir = self.ir;
        match ir.entity_code(entity) {
            Some(code) => self.matches(
                code,
                ir.last_site(code),
                site,
                self.normalize(ir.result_field(entity)),
            ),
            None => false,
        }
    }

    /// Whether the target of the call at `site` is the outer reference of the calling routine.
    /// A tail call of this kind may be turned into a jump without changing the outer instance.
    pub fn first_arg_is_outer(&self, site: Site) -> bool {
        let ir = self.ir;
        let owner = ir.site_entity(site);
        let Some(outer_ref) = ir.outer_ref(owner) else {
            return true;
        };
        let target_ty = ir.access_target_entity(site);
        if target_ty == ir.universe() || !ir.has_data(target_ty) {
            return true;
        }

        let code = ir.site_code(site);
        let callee = ir.accessed_entity(site);
        let args = (0..ir.arg_count(callee))
            .filter(|idx| ir.has_data(ir.result_entity(ir.arg_entity(callee, *idx))))
            .count();
        self.skip_back(code, ir.previous_site(code, site), args)
            .filter(|target| {
                ir.code_at(*target) == ExprKind::Call && ir.accessed_entity(*target) == outer_ref
            })
            .and_then(|target| ir.previous_site(code, target))
            .is_some_and(|current| ir.code_at(current) == ExprKind::Current)
    }

    /// Unit typed fields hold no value; they are treated like no field at all.
    fn normalize(&self, field: Option<Entity>) -> Option<Entity> {
        field.filter(|field| self.ir.has_data(self.ir.result_entity(*field)))
    }

    fn matches(
        &self,
        code: Code,
        at: Option<Site>,
        target: Site,
        pending: Option<Entity>,
    ) -> bool {
        let ir = self.ir;
        let Some(at) = at else {
            return false;
        };
        match ir.code_at(at) {
            ExprKind::Call => {
                if pending.is_some() {
                    return false;
                }
                if at == target {
                    return true;
                }
                // `current.f` where `f` was assigned the tail call's result.
                let field = ir.accessed_entity(at);
                ir.entity_kind(field) == EntityKind::Field
                    && !ir.access_is_dynamic(at)
                    && self.before_current(code, at).is_some_and(|before| {
                        self.matches(code, before, target, self.normalize(Some(field)))
                    })
            }
            ExprKind::Assign => {
                self.normalize(Some(ir.accessed_entity(at))) == pending
                    && self
                        .before_current(code, at)
                        .is_some_and(|before| self.matches(code, before, target, None))
            }
            ExprKind::Match => (0..ir.match_case_count(at)).any(|case| {
                let case_code = ir.match_case_code(at, case);
                self.matches(case_code, ir.last_site(case_code), target, pending)
            }),
            ExprKind::Box => self.matches(code, ir.previous_site(code, at), target, pending),
            _ => false,
        }
    }

    /// If the access at `site` is on `Current`, the site right before the `current` pushing it.
    /// An elided target is `Current` when the accessed entity is declared in the owner.
    fn before_current(&self, code: Code, site: Site) -> Option<Option<Site>> {
        let ir = self.ir;
        let owner = ir.site_entity(site);
        if !ir.has_data(ir.access_target_entity(site)) {
            return (ir.outer(ir.accessed_entity(site)) == Some(owner))
                .then(|| ir.previous_site(code, site));
        }
        let prev = ir.previous_site(code, site)?;
        (ir.code_at(prev) == ExprKind::Current).then(|| ir.previous_site(code, prev))
    }

    /// Starting at `site` and walking backwards, the instruction that pushed the value `depth`
    /// slots below the top of the stack.
    fn skip_back(&self, code: Code, site: Option<Site>, depth: usize) -> Option<Site> {
        let mut site = site?;
        let mut depth = depth;
        loop {
            let (pops, pushes) = stack_effect(self.ir, site)?;
            if pushes > depth {
                return Some(site);
            }
            depth = depth - pushes + pops;
            site = self.ir.previous_site(code, site)?;
        }
    }
}

/// The sites of every call in `code`, in order, including those nested in match cases.
pub fn call_sites(ir: &dyn Ir, code: Code) -> Vec<Site> {
    let mut sites = Vec::new();
    for site in ir.code_sites(code) {
        match ir.code_at(site) {
            ExprKind::Call => sites.push(site),
            ExprKind::Match => {
                for case in 0..ir.match_case_count(site) {
                    sites.extend(call_sites(ir, ir.match_case_code(site, case)));
                }
            }
            _ => (),
        }
    }
    sites
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfa_ir::{parser::parse, Program};

    const PROGRAM: &str = r#"
        main m
        type i32 i32;
        type bool bool;
        routine m {
        }

        field g.result outer=g type=i32;
        routine g result=g.result {
            const i32 1
            current
            assign g.result
        }
        field h.result outer=h type=i32;
        routine h result=h.result {
            const i32 2
            current
            assign h.result
        }

        field direct.result outer=direct type=i32;
        routine direct result=direct.result {
            call g
            current
            assign direct.result
        }

        field local.r outer=local type=i32;
        field local.result outer=local type=i32;
        routine local result=local.result {
            call g
            current
            assign local.r
            current
            call local.r
            current
            assign local.result
        }

        field branch.result outer=branch type=i32;
        routine branch result=branch.result {
            const bool true
            match bool {
                case tags=(0) {
                    call g
                    current
                    assign branch.result
                }
                case tags=(1) {
                    call h
                    current
                    assign branch.result
                    call h
                    pop i32
                }
            }
        }

        field discard.result outer=discard type=i32;
        routine discard result=discard.result {
            call g
            pop i32
            call h
            current
            assign discard.result
        }

        type counter;
        field counter.loop.outer outer=counter.loop type=counter;
        field counter.loop.result outer=counter.loop type=i32;
        routine counter.loop outer=counter outer_ref=counter.loop.outer result=counter.loop.result {
            current
            call counter.loop.outer
            call counter.loop
            current
            assign counter.loop.result
        }
        field counter.fresh.outer outer=counter.fresh type=counter;
        routine counter.fresh outer=counter outer_ref=counter.fresh.outer {
            call counter
            call counter.loop
            pop i32
        }
    "#;

    /// Whether each call in `routine` is a tail call, as `(callee, tail)` in code order.
    fn tail_calls(program: &Program, routine: &str) -> Vec<(String, bool)> {
        let entity = program.entity_by_name(routine).unwrap();
        let code = program.entity_code(entity).unwrap();
        let analysis = TailCall::new(program);
        call_sites(program, code)
            .into_iter()
            .map(|site| {
                (
                    program.entity_name(program.accessed_entity(site)).to_owned(),
                    analysis.is_tail_call(entity, site),
                )
            })
            .collect()
    }

    fn owned(calls: &[(&str, bool)]) -> Vec<(String, bool)> {
        calls
            .iter()
            .map(|(name, tail)| ((*name).to_owned(), *tail))
            .collect()
    }

    #[test]
    fn last_call_is_a_tail_call() {
        let program = parse(PROGRAM).unwrap();
        assert_eq!(tail_calls(&program, "direct"), owned(&[("g", true)]));
    }

    #[test]
    fn result_returned_through_a_local_field() {
        let program = parse(PROGRAM).unwrap();
        assert_eq!(
            tail_calls(&program, "local"),
            owned(&[("g", true), ("local.r", true)])
        );
    }

    #[test]
    fn only_the_last_call_of_a_case_is_a_tail_call() {
        let program = parse(PROGRAM).unwrap();
        assert_eq!(
            tail_calls(&program, "branch"),
            owned(&[("g", true), ("h", false), ("h", false)])
        );
    }

    #[test]
    fn discarded_results_are_not_tail_calls() {
        let program = parse(PROGRAM).unwrap();
        assert_eq!(
            tail_calls(&program, "discard"),
            owned(&[("g", false), ("h", true)])
        );
    }

    #[test]
    fn first_arg_is_outer() {
        let program = parse(PROGRAM).unwrap();
        let analysis = TailCall::new(&program);
        let last_call = |routine: &str| {
            let entity = program.entity_by_name(routine).unwrap();
            let code = program.entity_code(entity).unwrap();
            let loop_entity = program.entity_by_name("counter.loop").unwrap();
            call_sites(&program, code)
                .into_iter()
                .rfind(|site| program.accessed_entity(*site) == loop_entity)
                .unwrap()
        };
        assert!(analysis.first_arg_is_outer(last_call("counter.loop")));
        assert!(!analysis.first_arg_is_outer(last_call("counter.fresh")));

        // Routines without an outer reference trivially pass.
        let direct = program.entity_by_name("direct").unwrap();
        let site = call_sites(&program, program.entity_code(direct).unwrap())[0];
        assert!(analysis.first_arg_is_outer(site));
    }
}
