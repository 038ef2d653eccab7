//! The abstract values computed by the DFA.
//!
//! [`Value`]s are hash-consed handles into a [`ValueTable`]: two structurally equal values are
//! always the same handle.  Boxing or tagging the same operands twice therefore yields the
//! identical value, and equal raw buffers collapse into one.
//!
//! ## Join
//!
//! [`ValueTable::join`] is the least upper bound.  `Undefined` is bottom.  Booleans form a three
//! point lattice, and a boolean joined with a tagged choice value collapses to `bool`.  Anything
//! else that is not mergeable becomes a `Set`, whose members are kept sorted and merged per
//! *shape*: at most one member per numeric type, per tagged variant and per reference type.
//! Joining two unequal numerics of the same type widens to [`NumericValue::Any`].  Since the
//! shapes of a finite program are finite, sets cannot grow without bound.

use std::hash::BuildHasherDefault;

use dfa_ir::{Entity, Ir, SpecialEntity};
use indexmap::IndexSet;
use itertools::Itertools;
use rustc_hash::FxHasher;

type FxIndexSet<T> = IndexSet<T, BuildHasherDefault<FxHasher>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Value(u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BoolValue {
    False,
    True,
    Top,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NumericValue {
    /// The little endian bits of a literal, zero extended to 64 bits.
    Exact(u64),
    /// Any value of the numeric type.
    Any,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueContent {
    Undefined,
    Unit,
    Bool(BoolValue),
    Numeric {
        entity: Entity,
        value: NumericValue,
    },
    /// The summary of every instance of `entity`.
    Instance(Entity),
    Boxed {
        original: Value,
        entity: Entity,
    },
    Tagged {
        value: Value,
        tag: u32,
        entity: Entity,
    },
    RawBuffer(Vec<u8>),
    /// Two or more alternatives, sorted and of pairwise distinct shape.
    Set(Vec<Value>),
}

/// Members of a set with the same shape are merged instead of listed side by side.
#[derive(PartialEq, Eq)]
enum Shape {
    Unit,
    Bool,
    Numeric(Entity),
    Instance(Entity),
    Boxed(Entity),
    Tagged(Entity, u32),
    Distinct(Value),
}

pub struct ValueTable {
    values: FxIndexSet<ValueContent>,
}

impl Default for ValueTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueTable {
    pub const UNDEFINED: Value = Value(0);
    pub const UNIT: Value = Value(1);
    pub const FALSE: Value = Value(2);
    pub const TRUE: Value = Value(3);
    pub const BOOL: Value = Value(4);

    pub fn new() -> Self {
        let mut table = ValueTable {
            values: FxIndexSet::default(),
        };
        for content in [
            ValueContent::Undefined,
            ValueContent::Unit,
            ValueContent::Bool(BoolValue::False),
            ValueContent::Bool(BoolValue::True),
            ValueContent::Bool(BoolValue::Top),
        ] {
            table.intern(content);
        }
        table
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, value: Value) -> &ValueContent {
        &self.values[value.0 as usize]
    }

    fn intern(&mut self, content: ValueContent) -> Value {
        let (idx, _) = self.values.insert_full(content);
        Value(idx as u32)
    }

    pub fn bool(&self, b: bool) -> Value {
        if b {
            Self::TRUE
        } else {
            Self::FALSE
        }
    }

    pub fn numeric(&mut self, entity: Entity, value: NumericValue) -> Value {
        self.intern(ValueContent::Numeric { entity, value })
    }

    pub fn instance(&mut self, entity: Entity) -> Value {
        self.intern(ValueContent::Instance(entity))
    }

    pub fn raw_buffer(&mut self, bytes: &[u8]) -> Value {
        self.intern(ValueContent::RawBuffer(bytes.to_vec()))
    }

    /// `value` as variant `tag` of the choice type `entity`.
    pub fn tag(&mut self, value: Value, entity: Entity, tag: u32) -> Value {
        self.intern(ValueContent::Tagged { value, tag, entity })
    }

    /// `value` as a reference of type `entity`.
    ///
    /// Instances are already shared summaries and are returned unchanged.
    pub fn boxed(&mut self, value: Value, entity: Entity) -> Value {
        if matches!(
            self.get(value),
            ValueContent::Undefined | ValueContent::Instance(_) | ValueContent::Boxed { .. }
        ) {
            return value;
        }
        self.intern(ValueContent::Boxed {
            original: value,
            entity,
        })
    }

    pub fn unbox(&mut self, value: Value) -> Value {
        match self.get(value).clone() {
            ValueContent::Boxed { original, .. } => original,
            ValueContent::Set(members) => members
                .into_iter()
                .fold(Self::UNDEFINED, |acc, member| {
                    let unboxed = self.unbox(member);
                    self.join(acc, unboxed)
                }),
            _ => value,
        }
    }

    /// The alternatives of `value`: the members of a set, or the value itself.
    pub fn components(&self, value: Value) -> Vec<Value> {
        match self.get(value) {
            ValueContent::Set(members) => members.clone(),
            ValueContent::Undefined => Vec::new(),
            _ => vec![value],
        }
    }

    pub fn join(&mut self, a: Value, b: Value) -> Value {
        if a == b || b == Self::UNDEFINED {
            return a;
        }
        if a == Self::UNDEFINED {
            return b;
        }
        let collapses_to_bool = matches!(
            (self.get(a), self.get(b)),
            (ValueContent::Bool(_), ValueContent::Bool(_) | ValueContent::Tagged { .. })
                | (ValueContent::Tagged { .. }, ValueContent::Bool(_))
        );
        if collapses_to_bool {
            Self::BOOL
        } else {
            self.join_instances(a, b)
        }
    }

    /// `a` carries no information beyond `b`.
    pub fn is_subsumed(&mut self, a: Value, b: Value) -> bool {
        self.join(a, b) == b
    }

    fn join_instances(&mut self, a: Value, b: Value) -> Value {
        let mut members = self.components(a);
        for member in self.components(b) {
            let shape = self.shape(member);
            match members.iter().position(|m| self.shape(*m) == shape) {
                Some(pos) => members[pos] = self.merge_same_shape(members[pos], member),
                None => members.push(member),
            }
        }
        if members.len() == 1 {
            return members[0];
        }
        members.sort();
        self.intern(ValueContent::Set(members))
    }

    fn shape(&self, value: Value) -> Shape {
        match self.get(value) {
            ValueContent::Unit => Shape::Unit,
            ValueContent::Bool(_) => Shape::Bool,
            ValueContent::Numeric { entity, .. } => Shape::Numeric(*entity),
            ValueContent::Instance(entity) => Shape::Instance(*entity),
            ValueContent::Boxed { entity, .. } => Shape::Boxed(*entity),
            ValueContent::Tagged { tag, entity, .. } => Shape::Tagged(*entity, *tag),
            ValueContent::Undefined | ValueContent::RawBuffer(_) | ValueContent::Set(_) => {
                Shape::Distinct(value)
            }
        }
    }

    fn merge_same_shape(&mut self, a: Value, b: Value) -> Value {
        if a == b {
            return a;
        }
        match (self.get(a).clone(), self.get(b).clone()) {
            (ValueContent::Bool(_), ValueContent::Bool(_)) => Self::BOOL,
            (ValueContent::Numeric { entity, .. }, ValueContent::Numeric { .. }) => {
                self.numeric(entity, NumericValue::Any)
            }
            (
                ValueContent::Boxed { original, entity },
                ValueContent::Boxed {
                    original: other, ..
                },
            ) => {
                let original = self.join(original, other);
                self.intern(ValueContent::Boxed { original, entity })
            }
            (
                ValueContent::Tagged { value, tag, entity },
                ValueContent::Tagged { value: other, .. },
            ) => {
                let value = self.join(value, other);
                self.tag(value, entity, tag)
            }
            _ => a,
        }
    }

    /// A human readable rendering, using the entity names of `ir`.
    pub fn display(&self, value: Value, ir: &dyn Ir) -> String {
        match self.get(value) {
            ValueContent::Undefined => "undefined".to_owned(),
            ValueContent::Unit => "unit".to_owned(),
            ValueContent::Bool(BoolValue::False) => "false".to_owned(),
            ValueContent::Bool(BoolValue::True) => "true".to_owned(),
            ValueContent::Bool(BoolValue::Top) => "bool".to_owned(),
            ValueContent::Numeric { entity, value } => {
                let name = ir.entity_name(*entity);
                match value {
                    NumericValue::Exact(bits) => {
                        format!("{name}:{}", display_bits(ir.special(*entity), *bits))
                    }
                    NumericValue::Any => format!("{name}:*"),
                }
            }
            ValueContent::Instance(entity) => format!("instance({})", ir.entity_name(*entity)),
            ValueContent::Boxed { original, entity } => format!(
                "boxed({}){}",
                ir.entity_name(*entity),
                self.display(*original, ir)
            ),
            ValueContent::Tagged { value, tag, entity } => format!(
                "tagged({}#{tag} {})",
                ir.entity_name(*entity),
                self.display(*value, ir)
            ),
            ValueContent::RawBuffer(bytes) => format!("raw[{}]", bytes.len()),
            ValueContent::Set(members) => format!(
                "{{{}}}",
                members.iter().map(|m| self.display(*m, ir)).join(", ")
            ),
        }
    }
}

fn display_bits(special: Option<SpecialEntity>, bits: u64) -> String {
    match special {
        Some(SpecialEntity::I8) => (bits as i8).to_string(),
        Some(SpecialEntity::I16) => (bits as i16).to_string(),
        Some(SpecialEntity::I32) => (bits as i32).to_string(),
        Some(SpecialEntity::I64) => (bits as i64).to_string(),
        Some(SpecialEntity::F32) => f32::from_bits(bits as u32).to_string(),
        Some(SpecialEntity::F64) => f64::from_bits(bits).to_string(),
        _ => bits.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(n: u32) -> Entity {
        Entity(n)
    }

    fn sample(table: &mut ValueTable) -> Vec<Value> {
        let five = table.numeric(e(1), NumericValue::Exact(5));
        let six = table.numeric(e(1), NumericValue::Exact(6));
        let instance = table.instance(e(2));
        let boxed = table.boxed(five, e(3));
        let tagged = table.tag(instance, e(4), 1);
        let raw = table.raw_buffer(b"abc");
        let set = table.join(instance, raw);
        vec![
            ValueTable::UNDEFINED,
            ValueTable::UNIT,
            ValueTable::TRUE,
            ValueTable::FALSE,
            ValueTable::BOOL,
            five,
            six,
            instance,
            boxed,
            tagged,
            raw,
            set,
        ]
    }

    #[test]
    fn join_is_idempotent_and_undefined_is_bottom() {
        let mut table = ValueTable::new();
        for v in sample(&mut table) {
            assert_eq!(table.join(v, v), v);
            assert_eq!(table.join(ValueTable::UNDEFINED, v), v);
            assert_eq!(table.join(v, ValueTable::UNDEFINED), v);
        }
    }

    #[test]
    fn join_is_commutative() {
        let mut table = ValueTable::new();
        let values = sample(&mut table);
        for a in &values {
            for b in &values {
                let ab = table.join(*a, *b);
                let ba = table.join(*b, *a);
                assert_eq!(ab, ba, "{:?} vs {:?}", table.get(*a), table.get(*b));
            }
        }
    }

    #[test]
    fn join_is_an_upper_bound() {
        let mut table = ValueTable::new();
        let values = sample(&mut table);
        for a in &values {
            for b in &values {
                let ab = table.join(*a, *b);
                assert!(table.is_subsumed(*a, ab));
                assert!(table.is_subsumed(*b, ab));
            }
        }
    }

    #[test]
    fn booleans() {
        let mut table = ValueTable::new();
        assert_eq!(table.join(ValueTable::TRUE, ValueTable::FALSE), ValueTable::BOOL);
        let tagged = table.tag(ValueTable::UNIT, e(4), 0);
        assert_eq!(table.join(ValueTable::TRUE, tagged), ValueTable::BOOL);
        assert_eq!(table.join(tagged, ValueTable::FALSE), ValueTable::BOOL);
    }

    #[test]
    fn unequal_numerics_widen() {
        let mut table = ValueTable::new();
        let five = table.numeric(e(1), NumericValue::Exact(5));
        let six = table.numeric(e(1), NumericValue::Exact(6));
        let any = table.numeric(e(1), NumericValue::Any);
        assert_eq!(table.join(five, six), any);
        assert_eq!(table.join(any, five), any);

        // Different numeric types are kept apart.
        let other = table.numeric(e(7), NumericValue::Exact(5));
        let set = table.join(five, other);
        assert_eq!(table.components(set).len(), 2);
    }

    #[test]
    fn boxing_is_memoized() {
        let mut table = ValueTable::new();
        let five = table.numeric(e(1), NumericValue::Exact(5));
        let first = table.boxed(five, e(3));
        let second = table.boxed(five, e(3));
        assert_eq!(first, second);
        assert_eq!(table.unbox(first), five);

        let instance = table.instance(e(2));
        assert_eq!(table.boxed(instance, e(3)), instance);
    }

    #[test]
    fn raw_buffers_collapse() {
        let mut table = ValueTable::new();
        let a = table.raw_buffer(&[1, 2, 3]);
        let b = table.raw_buffer(&[1, 2, 3]);
        let c = table.raw_buffer(&[1, 2]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn sets_merge_members_of_the_same_shape() {
        let mut table = ValueTable::new();
        let instance = table.instance(e(2));
        let five = table.numeric(e(1), NumericValue::Exact(5));
        let six = table.numeric(e(1), NumericValue::Exact(6));
        let any = table.numeric(e(1), NumericValue::Any);

        let set = table.join(instance, five);
        let set = table.join(set, six);
        let mut expected = vec![instance, any];
        expected.sort();
        assert_eq!(table.components(set), expected);

        let t0 = table.tag(five, e(4), 0);
        let t1 = table.tag(six, e(4), 0);
        assert_eq!(table.join(t0, t1), table.tag(any, e(4), 0));
    }

    #[test]
    fn unbox_distributes_over_sets() {
        let mut table = ValueTable::new();
        let five = table.numeric(e(1), NumericValue::Exact(5));
        let boxed = table.boxed(five, e(3));
        let instance = table.instance(e(2));
        let set = table.join(boxed, instance);
        let unboxed = table.unbox(set);
        assert_eq!(unboxed, table.join(five, instance));
    }
}
