//! Print the results of the analyses as line oriented text.
//!
//! Every line starts with a keyword so tests can `check:` for individual facts:
//!
//! ```text
//! reachable m
//! edge m -> pre g
//! effect m needs eff
//! field point point.x = i32:5
//! warning Call to abstract "draw" has no implementation.
//! escape sum = false
//! tail direct s4 -> g
//! loop counter.loop s9
//! ```

use dfa_error::error::AnalysisError;
use dfa_ir::EntityKind;

use crate::{
    dfa::Dfa,
    escape::Escape,
    tail_call::{call_sites, TailCall},
};

/// Reachable entities, the call and effect graphs, field values and warnings of a finished run.
pub fn to_string(dfa: &Dfa) -> String {
    let ir = dfa.ir();
    let mut lines = Vec::new();

    lines.extend(
        dfa.reachable_entities()
            .map(|entity| format!("reachable {}", ir.entity_name(entity))),
    );
    lines.extend(dfa.call_graph_edges().map(|edge| {
        format!(
            "edge {} -> {}{}",
            ir.entity_name(edge.caller),
            if edge.precondition { "pre " } else { "" },
            ir.entity_name(edge.callee)
        )
    }));
    lines.extend(dfa.effect_requirements().map(|req| {
        format!(
            "effect {} needs {}",
            ir.entity_name(req.entity),
            ir.entity_name(req.effect)
        )
    }));
    for instance in dfa.instances() {
        lines.extend(instance.fields().map(|(field, value)| {
            format!(
                "field {} {} = {}",
                ir.entity_name(instance.entity),
                ir.entity_name(field),
                dfa.display_value(value)
            )
        }));
    }
    lines.extend(dfa.warnings().map(|warning| format!("warning {warning}")));

    finish(lines)
}

/// Whether the instance of each reachable routine may escape.
pub fn escapes_to_string(dfa: &Dfa) -> Result<String, AnalysisError> {
    let ir = dfa.ir();
    let mut escape = Escape::new(ir);
    let mut lines = Vec::new();
    for entity in dfa.reachable_entities() {
        if ir.entity_kind(entity) == EntityKind::Routine {
            lines.push(format!(
                "escape {} = {}",
                ir.entity_name(entity),
                escape.escapes(entity)?
            ));
        }
    }
    Ok(finish(lines))
}

/// The tail calls of each reachable routine.  Self tail calls on the outer instance, which may
/// become loops, are listed separately.
pub fn tail_calls_to_string(dfa: &Dfa) -> String {
    let ir = dfa.ir();
    let tail_call = TailCall::new(ir);
    let mut lines = Vec::new();
    for entity in dfa.reachable_entities() {
        let Some(code) = ir.entity_code(entity) else {
            continue;
        };
        for site in call_sites(ir, code) {
            if !tail_call.is_tail_call(entity, site) {
                continue;
            }
            let callee = ir.accessed_entity(site);
            lines.push(format!(
                "tail {} {site} -> {}",
                ir.entity_name(entity),
                ir.entity_name(callee)
            ));
            if callee == entity && tail_call.first_arg_is_outer(site) {
                lines.push(format!("loop {} {site}", ir.entity_name(entity)));
            }
        }
    }
    finish(lines)
}

fn finish(lines: Vec<String>) -> String {
    let mut text = lines.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DfaConfig;
    use dfa_ir::parser::parse;
    use pretty_assertions::assert_eq;

    #[test]
    fn report_lists_every_fact() {
        let program = parse(
            r#"
            main m
            type i32 i32;
            type eff;
            abstract draw;
            field point.x outer=point type=i32;
            routine point args=(point.x) {
            }
            routine m {
                const i32 5
                call point
                pop point
                env eff
                pop eff
                call draw
            }
            "#,
        )
        .unwrap();
        let mut dfa = Dfa::new(&program, DfaConfig::default());
        dfa.run().unwrap();

        assert_eq!(
            to_string(&dfa),
            "reachable point\n\
             reachable m\n\
             edge m -> point\n\
             effect m needs eff\n\
             field point point.x = i32:5\n\
             warning Call to abstract \"draw\" has no implementation.\n"
        );
    }
}
