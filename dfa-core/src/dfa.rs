//! The whole-program, fixed-point data-flow analysis.
//!
//! Starting from the main routine, every known [`Call`] is analysed once per iteration by
//! interpreting its code with an abstract [`Value`] stack.  Interpreting a call site creates (or
//! finds) the call of the callee, stores values into the callee's [`Instance`], and records an
//! edge in the call graph.  Anything that adds information sets the `changed` flag; once a full
//! iteration leaves it unset, the accumulated values are a fixed point.
//!
//! Instances are context insensitive, one summary per entity.  Calls are context sensitive,
//! memoized by the values of their target and arguments.

use std::{collections::BTreeMap, hash::BuildHasherDefault};

use dfa_error::{
    error::AnalysisError,
    handler::Handler,
    warning::{CompileWarning, Warning},
};
use dfa_ir::{Code, Entity, EntityKind, Ir, Site, SpecialEntity};
use indexmap::IndexSet;
use rustc_hash::FxHasher;

use crate::{
    config::DfaConfig,
    interpreter::{Interpreter, Processor},
    intrinsics,
    store::{Call, CallId, CallKey, CallStore, Instance},
    value::{NumericValue, Value, ValueContent, ValueTable},
};

type FxIndexSet<T> = IndexSet<T, BuildHasherDefault<FxHasher>>;

/// `caller` calls `callee`, or only its precondition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallEdge {
    pub caller: Entity,
    pub callee: Entity,
    pub precondition: bool,
}

/// `entity` reads the installed value of `effect`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EffectRequirement {
    pub entity: Entity,
    pub effect: Entity,
}

pub struct Dfa<'a> {
    ir: &'a dyn Ir,
    config: DfaConfig,
    values: ValueTable,
    instances: BTreeMap<Entity, Instance>,
    /// Fields of the universe, i.e. global state.
    universe: Instance,
    calls: CallStore,
    call_graph: FxIndexSet<CallEdge>,
    effect_requirements: FxIndexSet<EffectRequirement>,
    /// The join of every value installed per effect type.
    effects: BTreeMap<Entity, Value>,
    /// The join of every value stored into an array, per element type.
    array_elements: BTreeMap<Entity, Value>,
    handler: Handler,
    changed: bool,
    iterations: usize,
}

impl<'a> Dfa<'a> {
    pub fn new(ir: &'a dyn Ir, config: DfaConfig) -> Self {
        Dfa {
            ir,
            config,
            values: ValueTable::new(),
            instances: BTreeMap::new(),
            universe: Instance::new(ir.universe()),
            calls: CallStore::default(),
            call_graph: FxIndexSet::default(),
            effect_requirements: FxIndexSet::default(),
            effects: BTreeMap::new(),
            array_elements: BTreeMap::new(),
            handler: Handler::default(),
            changed: false,
            iterations: 0,
        }
    }

    /// Iterate until a fixed point, or until the configured iteration limit.
    pub fn run(&mut self) -> Result<(), AnalysisError> {
        while self.step()? {
            if let Some(limit) = self.config.max_iterations {
                if self.iterations >= limit {
                    tracing::warn!("DFA stopped after {limit} iterations");
                    self.warn(None, None, Warning::IterationLimitReached { limit });
                    return Ok(());
                }
            }
        }
        tracing::info!(
            "DFA reached a fixed point after {} iterations: {} instances, {} calls",
            self.iterations,
            self.instances.len(),
            self.calls.len()
        );
        Ok(())
    }

    /// Run a single iteration.  Returns whether anything changed, i.e. whether another iteration
    /// is needed.
    pub fn step(&mut self) -> Result<bool, AnalysisError> {
        self.changed = false;
        let main = self.ir.main_entity();
        self.call_routine(None, main, ValueTable::UNIT, Vec::new());

        self.iterations += 1;
        for id in self.calls.snapshot() {
            self.analyze(id)?;
        }
        tracing::debug!(
            "DFA iteration {}: {} instances, {} calls, changed: {}",
            self.iterations,
            self.instances.len(),
            self.calls.len(),
            self.changed
        );
        Ok(self.changed)
    }

    // ---------------------------------------------------------------------------------------------
    // Results.

    pub fn ir(&self) -> &'a dyn Ir {
        self.ir
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Every entity found reachable from main, in id order.
    pub fn reachable_entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.instances.keys().copied()
    }

    pub fn is_reachable(&self, entity: Entity) -> bool {
        self.instances.contains_key(&entity)
    }

    /// The call graph in discovery order, with dynamic dispatch expanded to one edge per target.
    pub fn call_graph_edges(&self) -> impl Iterator<Item = CallEdge> + '_ {
        self.call_graph.iter().copied()
    }

    pub fn effect_requirements(&self) -> impl Iterator<Item = EffectRequirement> + '_ {
        self.effect_requirements.iter().copied()
    }

    pub fn instance(&self, entity: Entity) -> Option<&Instance> {
        if entity == self.ir.universe() {
            Some(&self.universe)
        } else {
            self.instances.get(&entity)
        }
    }

    /// The universe followed by every reachable instance.
    pub fn instances(&self) -> impl Iterator<Item = &Instance> + '_ {
        std::iter::once(&self.universe).chain(self.instances.values())
    }

    /// The join of every value stored into `field` of `entity`.
    pub fn field_value(&self, entity: Entity, field: Entity) -> Value {
        if !self.ir.has_data(self.ir.result_entity(field)) {
            return ValueTable::UNIT;
        }
        self.instance(entity)
            .and_then(|instance| instance.field(field))
            .unwrap_or(ValueTable::UNDEFINED)
    }

    pub fn values(&self) -> &ValueTable {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut ValueTable {
        &mut self.values
    }

    pub fn display_value(&self, value: Value) -> String {
        self.values.display(value, self.ir)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &CompileWarning> {
        self.handler.warnings()
    }

    pub fn call(&self, id: CallId) -> &Call {
        self.calls.get(id)
    }

    // ---------------------------------------------------------------------------------------------
    // Analysis of one call.

    fn analyze(&mut self, id: CallId) -> Result<(), AnalysisError> {
        let ir = self.ir;
        let key = self.calls.get(id).key.clone();
        let entity = key.entity;

        if key.precondition {
            if let Some(code) = ir.precondition(entity) {
                self.prepare_instance(&key);
                if self.interpret(entity, code)? {
                    self.mark_returns(id);
                }
            }
            return Ok(());
        }

        match ir.entity_kind(entity) {
            EntityKind::Intrinsic => self.run_intrinsic(id),
            EntityKind::Routine => {
                self.prepare_instance(&key);
                let completes = match ir.entity_code(entity) {
                    Some(code) => self.interpret(entity, code)?,
                    None => true,
                };
                if completes {
                    self.mark_returns(id);
                }
            }
            EntityKind::Field | EntityKind::Abstract | EntityKind::TypeParameter => (),
        }
        Ok(())
    }

    /// Store the arguments of a call in the argument fields, and its target in the outer
    /// reference.
    fn prepare_instance(&mut self, key: &CallKey) {
        let ir = self.ir;
        for (idx, arg) in key.args.iter().enumerate() {
            let field = ir.arg_entity(key.entity, idx);
            self.store_field(key.entity, field, *arg);
        }
        if let Some(outer_ref) = ir.outer_ref(key.entity) {
            self.store_field(key.entity, outer_ref, key.target);
        }
    }

    /// Whether the code completes.
    fn interpret(&mut self, entity: Entity, code: Code) -> Result<bool, AnalysisError> {
        let interpreter = Interpreter::new(self.ir);
        let (value, ()) = interpreter.process(&mut Analyze { dfa: self, entity }, entity, code)?;
        Ok(value.is_some())
    }

    fn mark_returns(&mut self, id: CallId) {
        let call = self.calls.get_mut(id);
        if !call.returns {
            call.returns = true;
            let entity = call.key.entity;
            let ir = self.ir;
            self.mark_changed(|| format!("{} returns", ir.entity_name(entity)));
        }
    }

    fn run_intrinsic(&mut self, id: CallId) {
        let ir = self.ir;
        let entity = self.calls.get(id).key.entity;
        let name = ir.intrinsic_name(entity).unwrap_or_else(|| ir.entity_name(entity));
        let result = match intrinsics::handler(name) {
            Some(handler) => handler(self, id),
            None => {
                if self.config.report_missing_intrinsics && !ir.is_type_parameter(entity) {
                    self.warn(
                        Some(entity),
                        None,
                        Warning::MissingIntrinsic {
                            name: name.to_owned(),
                        },
                    );
                }
                self.any_result(id)
            }
        };
        if let Some(value) = result {
            let old = self.calls.get(id).intrinsic_result;
            let new = self
                .values
                .join(old.unwrap_or(ValueTable::UNDEFINED), value);
            if old != Some(new) {
                self.calls.get_mut(id).intrinsic_result = Some(new);
                self.mark_changed(|| format!("result of intrinsic {name} grew"));
            }
        }
    }

    // ---------------------------------------------------------------------------------------------
    // Calls.

    /// Find or create the call of `callee` with the given target and arguments.
    fn new_call(
        &mut self,
        caller: Option<Entity>,
        callee: Entity,
        precondition: bool,
        target: Value,
        args: Vec<Value>,
    ) -> CallId {
        let ir = self.ir;
        let (id, created) = self.calls.get_or_insert(CallKey {
            entity: callee,
            precondition,
            target,
            args,
        });
        if created {
            tracing::trace!(
                "new call {} to {}{}",
                self.calls.len(),
                if precondition { "precondition of " } else { "" },
                ir.entity_name(callee)
            );
            self.mark_changed(|| format!("new call to {}", ir.entity_name(callee)));
            if !self.instances.contains_key(&callee) {
                self.instances.insert(callee, Instance::new(callee));
            }
            if !precondition && ir.entity_kind(callee) == EntityKind::Intrinsic {
                self.run_intrinsic(id);
            }
        }
        if let Some(caller) = caller {
            self.call_graph.insert(CallEdge {
                caller,
                callee,
                precondition,
            });
        }
        id
    }

    /// The result of a call, `None` while it is not known to return.
    fn call_result(&mut self, id: CallId) -> Option<Value> {
        let ir = self.ir;
        let call = self.calls.get(id);
        let entity = call.key.entity;
        if ir.entity_kind(entity) == EntityKind::Intrinsic && !call.key.precondition {
            return call.intrinsic_result;
        }
        if !call.returns {
            return None;
        }
        if call.key.precondition {
            return Some(ValueTable::UNIT);
        }
        Some(match ir.result_field(entity) {
            Some(field) => self.field_value(entity, field),
            None => self.values.instance(entity),
        })
    }

    /// Call `callee` directly, including its precondition.
    ///
    /// The callee is called even if its precondition is not (yet) known to return, but its
    /// result is only passed on to the caller once the precondition returns.
    pub(crate) fn call_routine(
        &mut self,
        caller: Option<Entity>,
        callee: Entity,
        target: Value,
        args: Vec<Value>,
    ) -> Option<Value> {
        let ir = self.ir;
        let precondition_returns = !ir.declares_precondition(callee) || {
            let pre = self.new_call(caller, callee, true, target, args.clone());
            self.call_result(pre).is_some()
        };
        let result = match ir.entity_kind(callee) {
            EntityKind::Field => Some(self.read_field(target, callee)),
            EntityKind::Abstract => {
                self.warn(
                    caller,
                    None,
                    Warning::CallToAbstract {
                        name: ir.entity_name(callee).to_owned(),
                    },
                );
                None
            }
            EntityKind::TypeParameter => self.any_value(ir.result_entity(callee)),
            EntityKind::Routine | EntityKind::Intrinsic => {
                let id = self.new_call(caller, callee, false, target, args);
                self.call_result(id)
            }
        };
        result.filter(|_| precondition_returns)
    }

    /// Process the call at `site`.  A dynamic call joins the results of every target.
    fn call_site(
        &mut self,
        caller: Entity,
        site: Site,
        target: Value,
        args: Vec<Value>,
    ) -> Option<Value> {
        let ir = self.ir;
        let callee = ir.accessed_entity(site);
        if ir.call_precondition_only(site) {
            if !ir.declares_precondition(callee) {
                return Some(ValueTable::UNIT);
            }
            let id = self.new_call(Some(caller), callee, true, target, args);
            return self.call_result(id);
        }

        let targets = if ir.access_is_dynamic(site) {
            let targets = ir.accessed_entities(site);
            if targets.is_empty() {
                self.warn(
                    Some(caller),
                    Some(site),
                    Warning::NoDynamicTargets {
                        name: ir.entity_name(callee).to_owned(),
                    },
                );
            }
            targets.to_vec()
        } else {
            vec![callee]
        };

        let mut result: Option<Value> = None;
        for t in targets {
            if let Some(value) = self.call_routine(Some(caller), t, target, args.clone()) {
                result = Some(match result {
                    Some(acc) => self.values.join(acc, value),
                    None => value,
                });
            }
        }
        result
    }

    // ---------------------------------------------------------------------------------------------
    // Values.

    /// Some value of type `ty` about which nothing is known.  `None` for void.
    pub(crate) fn any_value(&mut self, ty: Entity) -> Option<Value> {
        let ir = self.ir;
        if ir.has_void_type(ty) {
            None
        } else if !ir.has_data(ty) {
            Some(ValueTable::UNIT)
        } else {
            Some(match ir.special(ty) {
                Some(SpecialEntity::Bool) => ValueTable::BOOL,
                Some(_) => self.values.numeric(ty, NumericValue::Any),
                None => self.values.instance(ty),
            })
        }
    }

    /// Some value of the result type of the intrinsic called by `id`.
    pub(crate) fn any_result(&mut self, id: CallId) -> Option<Value> {
        let entity = self.calls.get(id).key.entity;
        let ty = self.ir.result_entity(entity);
        self.any_value(ty)
    }

    fn constant_value(&mut self, ty: Entity, data: &[u8]) -> Value {
        match self.ir.special(ty) {
            Some(SpecialEntity::Bool) => self.values.bool(data.first().is_some_and(|b| *b != 0)),
            Some(_) => {
                let mut bits = [0u8; 8];
                let len = data.len().min(bits.len());
                bits[..len].copy_from_slice(&data[..len]);
                self.values
                    .numeric(ty, NumericValue::Exact(u64::from_le_bytes(bits)))
            }
            None => self.values.raw_buffer(data),
        }
    }

    /// The part of `subject` a case with `tags` binds.  An empty tag list matches everything.
    fn case_value(&mut self, subject: Value, tags: &[u32]) -> Value {
        let mut result = ValueTable::UNDEFINED;
        for component in self.values.components(subject) {
            let value = match self.values.get(component) {
                ValueContent::Tagged { value, tag, .. } => {
                    if tags.is_empty() || tags.contains(tag) {
                        *value
                    } else {
                        continue;
                    }
                }
                _ => component,
            };
            result = self.values.join(result, value);
        }
        result
    }

    // ---------------------------------------------------------------------------------------------
    // Fields.

    /// Read `field` of every instance `target` may refer to.
    pub(crate) fn read_field(&mut self, target: Value, field: Entity) -> Value {
        let ir = self.ir;
        if !ir.has_data(ir.result_entity(field)) {
            return ValueTable::UNIT;
        }
        let mut result = ValueTable::UNDEFINED;
        for component in self.values.components(target) {
            let value = match self.values.get(component) {
                ValueContent::Instance(entity) => self.field_value(*entity, field),
                ValueContent::Unit => self.field_value(self.unit_owner(field), field),
                ValueContent::Boxed { original, .. } => {
                    let original = *original;
                    self.read_field(original, field)
                }
                _ => ValueTable::UNDEFINED,
            };
            result = self.values.join(result, value);
        }
        result
    }

    /// Join `value` into `field` of every instance `target` may refer to.
    pub(crate) fn set_field(&mut self, target: Value, field: Entity, value: Value) {
        for component in self.values.components(target) {
            match self.values.get(component) {
                ValueContent::Instance(entity) => {
                    let entity = *entity;
                    self.store_field(entity, field, value);
                }
                ValueContent::Unit => self.store_field(self.unit_owner(field), field, value),
                ValueContent::Boxed { original, .. } => {
                    let original = *original;
                    self.set_field(original, field, value);
                }
                _ => (),
            }
        }
    }

    /// The instance holding `field` when the target is elided: its outer entity if that is
    /// reachable, the universe otherwise.
    fn unit_owner(&self, field: Entity) -> Entity {
        self.ir
            .outer(field)
            .filter(|outer| self.instances.contains_key(outer))
            .unwrap_or_else(|| self.ir.universe())
    }

    fn store_field(&mut self, entity: Entity, field: Entity, value: Value) {
        let ir = self.ir;
        if !ir.has_data(ir.result_entity(field)) {
            return;
        }
        let instance = if entity == ir.universe() {
            Some(&mut self.universe)
        } else {
            self.instances.get_mut(&entity)
        };
        let grew =
            instance.is_some_and(|instance| instance.set_field(&mut self.values, field, value));
        if grew {
            self.mark_changed(|| {
                format!(
                    "{}.{} grew",
                    ir.entity_name(entity),
                    ir.entity_name(field)
                )
            });
        }
    }

    // ---------------------------------------------------------------------------------------------
    // Effects.

    /// Join `value` into the installed values of `effect`.
    pub(crate) fn install_effect(&mut self, effect: Entity, value: Value) {
        let old = self.effects.get(&effect).copied();
        let new = self
            .values
            .join(old.unwrap_or(ValueTable::UNDEFINED), value);
        if old != Some(new) {
            self.effects.insert(effect, new);
            let ir = self.ir;
            self.mark_changed(|| format!("installed {}", ir.entity_name(effect)));
        }
    }

    fn read_effect(&mut self, entity: Entity, effect: Entity) -> Value {
        self.effect_requirements
            .insert(EffectRequirement { entity, effect });
        self.effects
            .get(&effect)
            .copied()
            .unwrap_or(ValueTable::UNDEFINED)
    }

    // ---------------------------------------------------------------------------------------------
    // Arrays.

    /// Join `value` into the elements of every array of `element_ty`.  Indices are not tracked.
    pub(crate) fn store_element(&mut self, element_ty: Entity, value: Value) {
        let old = self.array_elements.get(&element_ty).copied();
        let new = self
            .values
            .join(old.unwrap_or(ValueTable::UNDEFINED), value);
        if old != Some(new) {
            self.array_elements.insert(element_ty, new);
            let ir = self.ir;
            self.mark_changed(|| {
                format!("elements of {} arrays grew", ir.entity_name(element_ty))
            });
        }
    }

    /// The elements of arrays of `element_ty`, `None` while nothing was stored.
    pub(crate) fn read_element(&self, element_ty: Entity) -> Option<Value> {
        self.array_elements.get(&element_ty).copied()
    }

    // ---------------------------------------------------------------------------------------------

    pub(crate) fn warn(&mut self, entity: Option<Entity>, site: Option<Site>, warning: Warning) {
        self.handler.emit_warn(CompileWarning {
            entity,
            site,
            warning_content: warning,
        });
    }

    fn mark_changed(&mut self, reason: impl FnOnce() -> String) {
        if self.config.trace_changes {
            tracing::debug!("iteration {}: {}", self.iterations, reason());
        }
        self.changed = true;
    }
}

/// Interprets the code of one entity on behalf of the [`Dfa`].
struct Analyze<'d, 'a> {
    dfa: &'d mut Dfa<'a>,
    entity: Entity,
}

impl Processor for Analyze<'_, '_> {
    type Value = Value;
    type Output = ();

    fn sequence(&mut self, _outputs: Vec<()>) {}

    fn unit_value(&mut self) -> Value {
        ValueTable::UNIT
    }

    fn expr_header(&mut self, _site: Site) {}

    fn comment(&mut self, _text: &str) {}

    fn nop(&mut self) {}

    fn drop(&mut self, _value: Value) {}

    fn adr_of(&mut self, value: Value) -> (Value, ()) {
        (value, ())
    }

    fn assign(&mut self, site: Site, target: Value, value: Value) {
        let ir = self.dfa.ir;
        if ir.access_is_dynamic(site) {
            let fields = ir.accessed_entities(site);
            if fields.is_empty() {
                self.dfa.warn(
                    Some(self.entity),
                    Some(site),
                    Warning::NoDynamicTargets {
                        name: ir.entity_name(ir.accessed_entity(site)).to_owned(),
                    },
                );
            }
            for field in fields {
                self.dfa.set_field(target, *field, value);
            }
        } else {
            self.dfa.set_field(target, ir.accessed_entity(site), value);
        }
    }

    fn box_value(&mut self, value: Value, _value_ty: Entity, ref_ty: Entity) -> (Value, ()) {
        (self.dfa.values.boxed(value, ref_ty), ())
    }

    fn unbox(&mut self, value: Value, _outer_ty: Entity) -> (Value, ()) {
        (self.dfa.values.unbox(value), ())
    }

    fn call(&mut self, site: Site, target: Value, args: Vec<Value>) -> (Option<Value>, ()) {
        (self.dfa.call_site(self.entity, site, target, args), ())
    }

    fn current(&mut self, _site: Site) -> (Value, ()) {
        (self.dfa.values.instance(self.entity), ())
    }

    fn constant(&mut self, _site: Site, ty: Entity, data: &[u8]) -> (Value, ()) {
        (self.dfa.constant_value(ty, data), ())
    }

    fn match_value(
        &mut self,
        interpreter: &Interpreter<'_>,
        site: Site,
        subject: Value,
    ) -> Result<(bool, ()), AnalysisError> {
        let ir = self.dfa.ir;
        let entity = self.entity;
        let mut completes = false;
        for case in 0..ir.match_case_count(site) {
            if let Some(field) = ir.match_case_field(site, case) {
                let value = self.dfa.case_value(subject, ir.match_case_tags(site, case));
                let current = self.dfa.values.instance(entity);
                self.dfa.set_field(current, field, value);
            }
            let code = ir.match_case_code(site, case);
            let (value, ()) = interpreter.process(self, entity, code)?;
            completes |= value.is_some();
        }
        Ok((completes, ()))
    }

    fn tag(&mut self, _site: Site, value: Value, new_ty: Entity, tag: u32) -> (Value, ()) {
        (self.dfa.values.tag(value, new_ty, tag), ())
    }

    fn env(&mut self, _site: Site, effect: Entity) -> (Value, ()) {
        (self.dfa.read_effect(self.entity, effect), ())
    }
}
