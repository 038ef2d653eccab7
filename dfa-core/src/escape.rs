//! An analysis to find routines whose instance may outlive the call that created it.
//!
//! A routine's code is walked with a stack of taints: a slot is tainted if it may hold `Current`.
//! Storing a tainted value anywhere, passing it to a call, or calling anything but a field read on
//! it lets `Current` escape.  Routines whose instance does not escape may be allocated on the
//! stack.

use dfa_error::error::AnalysisError;
use dfa_ir::{Code, Entity, EntityKind, ExprKind, Ir};
use rustc_hash::FxHashMap;

pub struct Escape<'a> {
    ir: &'a dyn Ir,
    cache: FxHashMap<Entity, bool>,
}

impl<'a> Escape<'a> {
    pub fn new(ir: &'a dyn Ir) -> Self {
        Escape {
            ir,
            cache: FxHashMap::default(),
        }
    }

    /// Whether the instance of `entity` may escape a call of `entity`.
    ///
    /// Constructors return their instance, and entities other than routines are not allocated
    /// per call, so both always escape.
    pub fn escapes(&mut self, entity: Entity) -> Result<bool, AnalysisError> {
        if let Some(escapes) = self.cache.get(&entity) {
            return Ok(*escapes);
        }
        let ir = self.ir;
        let escapes = if ir.entity_kind(entity) != EntityKind::Routine || ir.is_constructor(entity)
        {
            true
        } else {
            match ir.entity_code(entity) {
                Some(code) => self.code_escapes(entity, code, Vec::new())?,
                None => false,
            }
        };
        self.cache.insert(entity, escapes);
        Ok(escapes)
    }

    fn code_escapes(
        &self,
        entity: Entity,
        code: Code,
        mut stack: Vec<bool>,
    ) -> Result<bool, AnalysisError> {
        let ir = self.ir;
        let has_data = |ty: Entity| ir.has_data(ty);

        for site in ir.code_sites(code) {
            let pop = |stack: &mut Vec<bool>| {
                stack
                    .pop()
                    .ok_or(AnalysisError::StackUnderflow { entity, site })
            };
            match ir.code_at(site) {
                ExprKind::Current => {
                    if has_data(entity) {
                        stack.push(true);
                    }
                }
                ExprKind::AdrOf => (),
                ExprKind::Dup => {
                    let top = pop(&mut stack)?;
                    stack.extend([top, top]);
                }
                ExprKind::Unbox => {
                    let (outer_ty, value_ty) =
                        (ir.unbox_outer_entity(site), ir.unbox_result_entity(site));
                    if ir.is_ref(outer_ty) && !ir.is_ref(value_ty) {
                        let taint = has_data(outer_ty) && pop(&mut stack)?;
                        if has_data(value_ty) {
                            stack.push(taint);
                        }
                    }
                }
                ExprKind::Tag => {
                    let mut taint = false;
                    if has_data(ir.tag_value_entity(site)) {
                        taint = pop(&mut stack)?;
                    }
                    if has_data(ir.tag_new_entity(site)) {
                        stack.push(taint);
                    }
                }
                ExprKind::Box => {
                    let (value_ty, ref_ty) =
                        (ir.box_value_entity(site), ir.box_result_entity(site));
                    if !ir.is_ref(value_ty) && ir.is_ref(ref_ty) {
                        if has_data(value_ty) {
                            pop(&mut stack)?;
                        }
                        if has_data(ref_ty) {
                            stack.push(false);
                        }
                    }
                }
                ExprKind::Env => {
                    if has_data(ir.effect_entity(site)) {
                        stack.push(false);
                    }
                }
                ExprKind::Const => {
                    if has_data(ir.constant_entity(site)) {
                        stack.push(false);
                    }
                }
                ExprKind::Assign => {
                    let field = ir.accessed_entity(site);
                    if has_data(ir.access_target_entity(site)) {
                        pop(&mut stack)?;
                    }
                    if has_data(ir.result_entity(field)) && pop(&mut stack)? {
                        return Ok(true);
                    }
                }
                ExprKind::Call => {
                    let callee = ir.accessed_entity(site);
                    for idx in (0..ir.arg_count(callee)).rev() {
                        let arg_ty = ir.result_entity(ir.arg_entity(callee, idx));
                        if has_data(arg_ty) && pop(&mut stack)? {
                            return Ok(true);
                        }
                    }
                    if has_data(ir.access_target_entity(site))
                        && pop(&mut stack)?
                        && ir.entity_kind(callee) != EntityKind::Field
                    {
                        return Ok(true);
                    }
                    let result_ty = ir.result_entity(callee);
                    if ir.has_void_type(result_ty) {
                        return Ok(false);
                    }
                    if has_data(result_ty) && !ir.call_precondition_only(site) {
                        stack.push(false);
                    }
                }
                ExprKind::Match => {
                    let subject = if has_data(ir.match_subject_entity(site)) {
                        pop(&mut stack)?
                    } else {
                        false
                    };
                    for case in 0..ir.match_case_count(site) {
                        if subject && ir.match_case_field(site, case).is_some() {
                            return Ok(true);
                        }
                        let case_code = ir.match_case_code(site, case);
                        if self.code_escapes(entity, case_code, stack.clone())? {
                            return Ok(true);
                        }
                    }
                }
                ExprKind::Pop => {
                    if has_data(ir.pop_entity(site)) {
                        pop(&mut stack)?;
                    }
                }
                ExprKind::Comment => (),
                kind => return Err(AnalysisError::UnsupportedExpr { kind, site }),
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfa_ir::parser::parse;

    fn escapes(source: &str, routine: &str) -> bool {
        let program = parse(source).unwrap();
        let entity = program.entity_by_name(routine).unwrap();
        Escape::new(&program).escapes(entity).unwrap()
    }

    const PREFIX: &str = r#"
        main m
        type i32 i32;
        routine m {
        }
    "#;

    #[test]
    fn constructors_escape() {
        let source = format!(
            "{PREFIX}
            field point.x outer=point type=i32;
            routine point args=(point.x) {{
            }}"
        );
        assert!(escapes(&source, "point"));
    }

    #[test]
    fn reading_fields_does_not_escape() {
        let source = format!(
            "{PREFIX}
            field sum.a outer=sum type=i32;
            field sum.result outer=sum type=i32;
            routine sum args=(sum.a) result=sum.result {{
                current
                call sum.a
                current
                assign sum.result
            }}"
        );
        assert!(!escapes(&source, "sum"));
    }

    #[test]
    fn storing_current_escapes() {
        let source = format!(
            "{PREFIX}
            type cell;
            field cell.v outer=cell type=leak;
            field leak.c outer=leak type=cell;
            field leak.result outer=leak type=i32;
            routine cell {{
            }}
            routine leak args=(leak.c) result=leak.result {{
                current
                current
                call leak.c
                assign cell.v
                const i32 0
                current
                assign leak.result
            }}"
        );
        assert!(escapes(&source, "leak"));
    }

    #[test]
    fn passing_current_to_a_call_escapes() {
        let source = format!(
            "{PREFIX}
            type sink;
            field sink.arg outer=sink type=pass;
            field pass.result outer=pass type=i32;
            routine sink args=(sink.arg) {{
            }}
            routine pass result=pass.result {{
                current
                call sink
                pop sink
                const i32 0
                current
                assign pass.result
            }}"
        );
        assert!(escapes(&source, "pass"));
    }

    #[test]
    fn escapes_in_any_match_case() {
        let source = format!(
            "{PREFIX}
            type bool bool;
            type sink;
            field sink.arg outer=sink type=pick;
            field pick.result outer=pick type=i32;
            routine sink args=(sink.arg) {{
            }}
            routine pick result=pick.result {{
                const bool true
                match bool {{
                    case tags=(0) {{
                    }}
                    case tags=(1) {{
                        current
                        call sink
                        pop sink
                    }}
                }}
                const i32 0
                current
                assign pick.result
            }}"
        );
        assert!(escapes(&source, "pick"));
    }

    #[test]
    fn fields_do_not_have_instances() {
        let source = format!("{PREFIX}\nfield m.x outer=m type=i32;");
        assert!(escapes(&source, "m.x"));
    }
}
