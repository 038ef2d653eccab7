//! Handlers for the intrinsics the DFA understands, looked up by intrinsic name.
//!
//! Most intrinsics are primitive and total: they have no effect on the call graph and their
//! result is simply "any value" of the result type.  The interesting ones are the effect
//! intrinsics, which install values read by `env`, the higher-order `effect.abortable` and
//! `fuzion.sys.thread.spawn0`, which call a routine given as an argument, and the array and
//! atomic intrinsics, which move values through memory the IR does not describe as fields.

use std::collections::BTreeMap;

use dfa_error::warning::Warning;
use dfa_ir::{Entity, Ir};
use once_cell::sync::Lazy;

use crate::{
    dfa::Dfa,
    store::CallId,
    value::{Value, ValueTable},
};

/// Analyse one call of an intrinsic.  Returns the result, `None` if the intrinsic never returns.
pub type IntrinsicHandler = fn(&mut Dfa<'_>, CallId) -> Option<Value>;

const SIGNED: [&str; 4] = ["i8", "i16", "i32", "i64"];
const UNSIGNED: [&str; 4] = ["u8", "u16", "u32", "u64"];
const FLOATS: [&str; 2] = ["f32", "f64"];

const PREFIX_OPS: [&str; 1] = ["-"];
const INFIX_OPS: [&str; 16] = [
    "+", "-", "*", "/", "%", "&", "|", "^", "<<", ">>", "==", "!=", "<", "<=", ">", ">=",
];
const FLOAT_INFIX_OPS: [&str; 12] = [
    "+", "-", "*", "/", "%", "**", "==", "!=", "<", "<=", ">", ">=",
];
const CONVERSIONS: [&str; 4] = ["as_i64", "as_u64", "as_f64", "cast"];
const FLOAT_CONVERSIONS: [&str; 4] = ["as_i64", "as_f64", "as_f32", "cast"];
const FLOAT_FUNCTIONS: [&str; 20] = [
    "min_exp", "max_exp", "min_positive", "max", "epsilon", "squareroot", "exp", "log", "sin",
    "cos", "tan", "asin", "acos", "atan", "atan2", "sinh", "cosh", "tanh", "is_nan", "fract",
];

const OPAQUE: [&str; 20] = [
    "std.out.write",
    "std.err.write",
    "std.out.flush",
    "std.err.flush",
    "std.args.count",
    "std.args.get",
    "std.nano_time",
    "std.nano_sleep",
    "std.env_var",
    "std.hash_code",
    "std.as_string",
    "safety",
    "debug",
    "debug_level",
    "fuzion.sys.thread.join0",
    "fuzion.sys.internal_array_init.alloc",
    "fuzion.sys.internal_array.freeze",
    "fuzion.sys.internal_array.ensure_not_frozen",
    "concur.util.loadFence",
    "concur.util.storeFence",
];

static INTRINSICS: Lazy<BTreeMap<String, IntrinsicHandler>> = Lazy::new(|| {
    let mut map: BTreeMap<String, IntrinsicHandler> = BTreeMap::new();

    for ty in SIGNED.iter().chain(UNSIGNED.iter()) {
        for op in PREFIX_OPS {
            map.insert(format!("{ty}.prefix {op}"), any_result);
        }
        for op in INFIX_OPS {
            map.insert(format!("{ty}.infix {op}"), any_result);
        }
        for conversion in CONVERSIONS {
            map.insert(format!("{ty}.{conversion}"), any_result);
        }
    }
    for ty in FLOATS {
        for op in PREFIX_OPS {
            map.insert(format!("{ty}.prefix {op}"), any_result);
        }
        for op in FLOAT_INFIX_OPS {
            map.insert(format!("{ty}.infix {op}"), any_result);
        }
        for conversion in FLOAT_CONVERSIONS {
            map.insert(format!("{ty}.{conversion}"), any_result);
        }
        for function in FLOAT_FUNCTIONS {
            map.insert(format!("{ty}s.{function}"), any_result);
        }
    }
    for name in OPAQUE {
        map.insert(name.to_owned(), any_result);
    }

    map.insert("std.exit".to_owned(), never_returns);
    map.insert("std.panic".to_owned(), never_returns);

    map.insert("effect.replace".to_owned(), install);
    map.insert("effect.default".to_owned(), install);
    map.insert("effect.abort".to_owned(), abort);
    map.insert("effect.is_installed".to_owned(), any_bool);
    map.insert("effect.abortable".to_owned(), abortable);

    map.insert("fuzion.sys.thread.spawn0".to_owned(), spawn);
    map.insert("fuzion.sys.internal_array.setel".to_owned(), array_set);
    map.insert("fuzion.sys.internal_array.get".to_owned(), array_get);

    map.insert("concur.atomic.read0".to_owned(), atomic_read);
    map.insert("concur.atomic.write0".to_owned(), atomic_write);
    map.insert("concur.atomic.compare_and_swap0".to_owned(), compare_and_swap);
    map.insert("concur.atomic.compare_and_set0".to_owned(), compare_and_set);
    map.insert("concur.atomic.racy_accesses_supported".to_owned(), any_bool);

    map
});

pub fn handler(name: &str) -> Option<IntrinsicHandler> {
    INTRINSICS.get(name).copied()
}

/// The names of every intrinsic with a handler, sorted.
pub fn supported_intrinsics() -> impl Iterator<Item = &'static str> {
    INTRINSICS.keys().map(String::as_str)
}

fn any_result(dfa: &mut Dfa<'_>, id: CallId) -> Option<Value> {
    dfa.any_result(id)
}

fn never_returns(_: &mut Dfa<'_>, _: CallId) -> Option<Value> {
    None
}

/// Install the target as the value of the intrinsic's effect.
fn install(dfa: &mut Dfa<'_>, id: CallId) -> Option<Value> {
    let call = dfa.call(id);
    let (entity, target) = (call.key.entity, call.key.target);
    if let Some(effect) = dfa.ir().effect_type(entity) {
        dfa.install_effect(effect, target);
    }
    dfa.any_result(id)
}

fn any_bool(_: &mut Dfa<'_>, _: CallId) -> Option<Value> {
    Some(ValueTable::BOOL)
}

fn abort(dfa: &mut Dfa<'_>, id: CallId) -> Option<Value> {
    install(dfa, id);
    None
}

/// Install the target, then run the code given as argument 0.
fn abortable(dfa: &mut Dfa<'_>, id: CallId) -> Option<Value> {
    install(dfa, id);
    call_code_argument(dfa, id);
    dfa.any_result(id)
}

/// Run the code given as argument 0.  The new thread shares all instances with its parent.
fn spawn(dfa: &mut Dfa<'_>, id: CallId) -> Option<Value> {
    call_code_argument(dfa, id);
    dfa.any_result(id)
}

/// Call the `call` routine of generic argument 0 on argument 0.
fn call_code_argument(dfa: &mut Dfa<'_>, id: CallId) {
    let ir = dfa.ir();
    let call = dfa.call(id);
    let entity = call.key.entity;
    let code = call.key.args.first().copied().unwrap_or(ValueTable::UNDEFINED);
    match ir
        .actual_generic(entity, 0)
        .and_then(|fun| ir.lookup_call(fun))
    {
        Some(routine) => {
            dfa.call_routine(Some(entity), routine, code, Vec::new());
        }
        None => dfa.warn(
            Some(entity),
            None,
            Warning::UnresolvedHigherOrderCall {
                intrinsic: ir.entity_name(entity).to_owned(),
            },
        ),
    }
}

/// `setel(data, index, value)`: join `value` into the elements of arrays of its type.
fn array_set(dfa: &mut Dfa<'_>, id: CallId) -> Option<Value> {
    let ir = dfa.ir();
    let call = dfa.call(id);
    let (entity, value) = (call.key.entity, call.key.args.get(2).copied());
    if let Some(value) = value {
        let element_ty = ir.result_entity(ir.arg_entity(entity, 2));
        dfa.store_element(element_ty, value);
    }
    dfa.any_result(id)
}

/// `get(data, index)`: every element stored into an array of the result type so far.
fn array_get(dfa: &mut Dfa<'_>, id: CallId) -> Option<Value> {
    let ir = dfa.ir();
    let entity = dfa.call(id).key.entity;
    dfa.read_element(ir.result_entity(entity))
}

// -------------------------------------------------------------------------------------------------
// Atomics.  The value of an atomic is the first argument field of the entity declaring the
// intrinsic, the atomic instance is the target.

fn atomic_value(ir: &dyn Ir, entity: Entity) -> Option<Entity> {
    ir.outer(entity)
        .filter(|atomic| ir.arg_count(*atomic) > 0)
        .map(|atomic| ir.arg_entity(atomic, 0))
}

/// The value field of the atomic accessed by `id`, its target and arguments.  Warns if the
/// intrinsic is not declared in an atomic.
fn atomic_access(dfa: &mut Dfa<'_>, id: CallId) -> Option<(Entity, Value, Vec<Value>)> {
    let ir = dfa.ir();
    let call = dfa.call(id);
    let entity = call.key.entity;
    let (target, args) = (call.key.target, call.key.args.clone());
    match atomic_value(ir, entity) {
        Some(field) => Some((field, target, args)),
        None => {
            dfa.warn(
                Some(entity),
                None,
                Warning::AtomicWithoutValue {
                    intrinsic: ir.entity_name(entity).to_owned(),
                },
            );
            None
        }
    }
}

fn atomic_read(dfa: &mut Dfa<'_>, id: CallId) -> Option<Value> {
    match atomic_access(dfa, id) {
        Some((field, target, _)) => Some(dfa.read_field(target, field)),
        None => dfa.any_result(id),
    }
}

fn atomic_write(dfa: &mut Dfa<'_>, id: CallId) -> Option<Value> {
    if let Some((field, target, args)) = atomic_access(dfa, id) {
        if let Some(new_value) = args.first() {
            dfa.set_field(target, field, *new_value);
        }
    }
    dfa.any_result(id)
}

/// `compare_and_swap0(expected, new)`: the old value.  Values are not compared, so `new` is
/// always stored.
fn compare_and_swap(dfa: &mut Dfa<'_>, id: CallId) -> Option<Value> {
    match atomic_access(dfa, id) {
        Some((field, target, args)) => {
            let old = dfa.read_field(target, field);
            if let Some(new_value) = args.get(1) {
                dfa.set_field(target, field, *new_value);
            }
            Some(old)
        }
        None => dfa.any_result(id),
    }
}

/// `compare_and_set0(expected, new)`: whether `new` was stored, which it always may be.
fn compare_and_set(dfa: &mut Dfa<'_>, id: CallId) -> Option<Value> {
    if let Some((field, target, args)) = atomic_access(dfa, id) {
        if let Some(new_value) = args.get(1) {
            dfa.set_field(target, field, *new_value);
        }
    }
    Some(ValueTable::BOOL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_families_are_registered() {
        for name in [
            "i32.infix +",
            "u8.infix >>",
            "i64.prefix -",
            "u64.as_i64",
            "f64.infix **",
            "f32s.squareroot",
            "std.out.write",
        ] {
            assert!(handler(name).is_some(), "{name}");
        }
        assert!(handler("i32.infix **").is_none());
        assert!(handler("no.such.intrinsic").is_none());
    }

    #[test]
    fn supported_intrinsics_are_sorted() {
        let names = supported_intrinsics().collect::<Vec<_>>();
        assert!(names.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(names.contains(&"effect.abortable"));
        assert!(names.contains(&"fuzion.sys.thread.spawn0"));
        assert!(names.contains(&"fuzion.sys.internal_array.setel"));
        assert!(names.contains(&"concur.atomic.compare_and_set0"));
    }
}
