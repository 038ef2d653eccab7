//! The append-only registries of a DFA run: one [`Instance`] per reachable entity, and the
//! memoized [`Call`]s keyed by argument values.

use std::collections::BTreeMap;

use dfa_ir::Entity;

use crate::value::{Value, ValueTable};

/// The context insensitive summary of every instance of an entity.
#[derive(Debug)]
pub struct Instance {
    pub entity: Entity,
    fields: BTreeMap<Entity, Value>,
}

impl Instance {
    pub fn new(entity: Entity) -> Self {
        Instance {
            entity,
            fields: BTreeMap::new(),
        }
    }

    pub fn field(&self, field: Entity) -> Option<Value> {
        self.fields.get(&field).copied()
    }

    /// Every field written so far, in entity id order.
    pub fn fields(&self) -> impl Iterator<Item = (Entity, Value)> + '_ {
        self.fields.iter().map(|(field, value)| (*field, *value))
    }

    /// Join `value` into `field`.  Returns whether the field grew.
    pub(crate) fn set_field(
        &mut self,
        values: &mut ValueTable,
        field: Entity,
        value: Value,
    ) -> bool {
        let old = self.field(field).unwrap_or(ValueTable::UNDEFINED);
        let new = values.join(old, value);
        if new == old {
            false
        } else {
            self.fields.insert(field, new);
            true
        }
    }
}

/// The context sensitive memoization key of a call.  The target is an implicit first argument.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallKey {
    pub entity: Entity,
    pub precondition: bool,
    pub target: Value,
    pub args: Vec<Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallId(u32);

#[derive(Debug)]
pub struct Call {
    pub key: CallKey,
    /// The code of a routine was found to complete.
    pub(crate) returns: bool,
    /// The result of an intrinsic; `None` while it is not known to return.
    pub(crate) intrinsic_result: Option<Value>,
}

#[derive(Default, Debug)]
pub struct CallStore {
    calls: Vec<Call>,
    index: BTreeMap<CallKey, CallId>,
}

impl CallStore {
    /// The call for `key`, and whether it was created now.
    pub(crate) fn get_or_insert(&mut self, key: CallKey) -> (CallId, bool) {
        if let Some(id) = self.index.get(&key) {
            return (*id, false);
        }
        let id = CallId(self.calls.len() as u32);
        self.index.insert(key.clone(), id);
        self.calls.push(Call {
            key,
            returns: false,
            intrinsic_result: None,
        });
        (id, true)
    }

    pub fn get(&self, id: CallId) -> &Call {
        &self.calls[id.0 as usize]
    }

    pub(crate) fn get_mut(&mut self, id: CallId) -> &mut Call {
        &mut self.calls[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// The calls known now, ordered by key, i.e. by entity id first.
    pub fn snapshot(&self) -> Vec<CallId> {
        self.index.values().copied().collect()
    }
}
