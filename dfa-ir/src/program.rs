//! The in-memory [`Ir`] implementation.
//!
//! A [`Program`] owns three arenas, indexed directly by the [`Entity`], [`Code`] and [`Site`]
//! ids.  It is immutable once built; see [`crate::ProgramBuilder`].

use rustc_hash::FxHashMap;

use crate::{
    code::{Code, Expr, ExprKind, Site},
    entity::{Entity, EntityKind, SpecialEntity},
    ir::Ir,
};

#[doc(hidden)]
#[derive(Clone, Debug)]
pub struct EntityContent {
    pub name: String,
    pub kind: EntityKind,
    pub special: Option<SpecialEntity>,
    pub unit: bool,
    pub void: bool,
    pub is_ref: bool,
    pub type_parameter: bool,
    pub outer: Option<Entity>,
    pub outer_ref: Option<Entity>,
    /// The field type for fields, the declared result type for intrinsics and abstracts.
    pub result_type: Option<Entity>,
    pub result_field: Option<Entity>,
    pub args: Vec<Entity>,
    pub code: Option<Code>,
    pub precondition: Option<Code>,
    pub intrinsic_name: Option<String>,
    pub generics: Vec<Entity>,
    pub call_routine: Option<Entity>,
    pub effect: Option<Entity>,
}

impl EntityContent {
    pub fn new(name: &str, kind: EntityKind) -> Self {
        EntityContent {
            name: name.to_owned(),
            kind,
            special: None,
            unit: false,
            void: false,
            is_ref: false,
            type_parameter: false,
            outer: None,
            outer_ref: None,
            result_type: None,
            result_field: None,
            args: Vec::new(),
            code: None,
            precondition: None,
            intrinsic_name: None,
            generics: Vec::new(),
            call_routine: None,
            effect: None,
        }
    }
}

#[doc(hidden)]
#[derive(Clone, Debug)]
pub struct CodeContent {
    pub owner: Entity,
    pub start: Site,
    pub len: usize,
}

#[doc(hidden)]
#[derive(Clone, Debug)]
pub struct SiteContent {
    pub code: Code,
    pub expr: Expr,
}

/// A closed program.
#[derive(Clone, Debug)]
pub struct Program {
    pub(crate) entities: Vec<EntityContent>,
    pub(crate) codes: Vec<CodeContent>,
    pub(crate) sites: Vec<SiteContent>,
    pub(crate) names: FxHashMap<String, Entity>,
    pub(crate) main: Entity,
    pub(crate) universe: Entity,
}

impl Program {
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        (0..self.entities.len()).map(|idx| Entity(idx as u32))
    }

    pub fn entity_by_name(&self, name: &str) -> Option<Entity> {
        self.names.get(name).copied()
    }

    pub fn content(&self, entity: Entity) -> &EntityContent {
        &self.entities[entity.index()]
    }

    pub fn expr(&self, site: Site) -> &Expr {
        &self.sites[site.index()].expr
    }

    /// Every call site of the program, in site order.
    pub fn call_sites(&self) -> impl Iterator<Item = Site> + '_ {
        self.sites
            .iter()
            .enumerate()
            .filter(|(_, content)| matches!(content.expr, Expr::Call { .. }))
            .map(|(idx, _)| Site(idx as u32))
    }

    fn case(&self, site: Site, case: usize) -> &crate::code::Case {
        match self.expr(site) {
            Expr::Match { cases, .. } => &cases[case],
            _ => panic!("{site} is not a match"),
        }
    }
}

impl Ir for Program {
    fn main_entity(&self) -> Entity {
        self.main
    }

    fn universe(&self) -> Entity {
        self.universe
    }

    fn entity_name(&self, entity: Entity) -> &str {
        &self.content(entity).name
    }

    fn entity_kind(&self, entity: Entity) -> EntityKind {
        self.content(entity).kind
    }

    fn special(&self, entity: Entity) -> Option<SpecialEntity> {
        self.content(entity).special
    }

    fn has_unit_type(&self, entity: Entity) -> bool {
        self.content(entity).unit
    }

    fn has_void_type(&self, entity: Entity) -> bool {
        self.content(entity).void
    }

    fn is_ref(&self, entity: Entity) -> bool {
        self.content(entity).is_ref
    }

    fn is_type_parameter(&self, entity: Entity) -> bool {
        let content = self.content(entity);
        content.type_parameter || content.kind == EntityKind::TypeParameter
    }

    fn outer(&self, entity: Entity) -> Option<Entity> {
        self.content(entity).outer
    }

    fn outer_ref(&self, entity: Entity) -> Option<Entity> {
        self.content(entity).outer_ref
    }

    fn result_entity(&self, entity: Entity) -> Entity {
        let content = self.content(entity);
        match content.kind {
            EntityKind::Routine => content
                .result_field
                .map(|field| self.result_entity(field))
                .unwrap_or(entity),
            _ => content.result_type.unwrap_or(self.universe),
        }
    }

    fn result_field(&self, entity: Entity) -> Option<Entity> {
        self.content(entity).result_field
    }

    fn arg_count(&self, entity: Entity) -> usize {
        self.content(entity).args.len()
    }

    fn arg_entity(&self, entity: Entity, index: usize) -> Entity {
        self.content(entity).args[index]
    }

    fn entity_code(&self, entity: Entity) -> Option<Code> {
        self.content(entity).code
    }

    fn precondition(&self, entity: Entity) -> Option<Code> {
        self.content(entity).precondition
    }

    fn intrinsic_name(&self, entity: Entity) -> Option<&str> {
        let content = self.content(entity);
        match content.kind {
            EntityKind::Intrinsic => {
                Some(content.intrinsic_name.as_deref().unwrap_or(&content.name))
            }
            _ => None,
        }
    }

    fn actual_generic(&self, entity: Entity, index: usize) -> Option<Entity> {
        self.content(entity).generics.get(index).copied()
    }

    fn lookup_call(&self, fun_type: Entity) -> Option<Entity> {
        self.content(fun_type).call_routine
    }

    fn effect_type(&self, entity: Entity) -> Option<Entity> {
        self.content(entity).effect
    }

    fn code_start(&self, code: Code) -> Site {
        self.codes[code.index()].start
    }

    fn within_code(&self, code: Code, site: Site) -> bool {
        let content = &self.codes[code.index()];
        site >= content.start && site.index() < content.start.index() + content.len
    }

    fn code_size_at(&self, _site: Site) -> usize {
        1
    }

    fn code_at(&self, site: Site) -> ExprKind {
        self.expr(site).kind()
    }

    fn site_entity(&self, site: Site) -> Entity {
        self.codes[self.site_code(site).index()].owner
    }

    fn site_code(&self, site: Site) -> Code {
        self.sites[site.index()].code
    }

    fn accessed_entity(&self, site: Site) -> Entity {
        match self.expr(site) {
            Expr::Call { callee, .. } => *callee,
            Expr::Assign { field, .. } => *field,
            _ => panic!("{site} is not an access"),
        }
    }

    fn accessed_entities(&self, site: Site) -> &[Entity] {
        match self.expr(site) {
            Expr::Call { dynamic, .. } | Expr::Assign { dynamic, .. } => {
                dynamic.as_deref().unwrap_or_default()
            }
            _ => panic!("{site} is not an access"),
        }
    }

    fn access_is_dynamic(&self, site: Site) -> bool {
        match self.expr(site) {
            Expr::Call { dynamic, .. } | Expr::Assign { dynamic, .. } => dynamic.is_some(),
            _ => panic!("{site} is not an access"),
        }
    }

    fn access_target_entity(&self, site: Site) -> Entity {
        let explicit = match self.expr(site) {
            Expr::Call { target, .. } | Expr::Assign { target, .. } => *target,
            _ => panic!("{site} is not an access"),
        };
        explicit
            .or_else(|| self.outer(self.accessed_entity(site)))
            .unwrap_or(self.universe)
    }

    fn call_precondition_only(&self, site: Site) -> bool {
        matches!(
            self.expr(site),
            Expr::Call {
                precondition_only: true,
                ..
            }
        )
    }

    fn box_value_entity(&self, site: Site) -> Entity {
        match self.expr(site) {
            Expr::Box { value, .. } => *value,
            _ => panic!("{site} is not a box"),
        }
    }

    fn box_result_entity(&self, site: Site) -> Entity {
        match self.expr(site) {
            Expr::Box { result, .. } => *result,
            _ => panic!("{site} is not a box"),
        }
    }

    fn unbox_outer_entity(&self, site: Site) -> Entity {
        match self.expr(site) {
            Expr::Unbox { outer, .. } => *outer,
            _ => panic!("{site} is not an unbox"),
        }
    }

    fn unbox_result_entity(&self, site: Site) -> Entity {
        match self.expr(site) {
            Expr::Unbox { result, .. } => *result,
            _ => panic!("{site} is not an unbox"),
        }
    }

    fn tag_value_entity(&self, site: Site) -> Entity {
        match self.expr(site) {
            Expr::Tag { value, .. } => *value,
            _ => panic!("{site} is not a tag"),
        }
    }

    fn tag_new_entity(&self, site: Site) -> Entity {
        match self.expr(site) {
            Expr::Tag { new, .. } => *new,
            _ => panic!("{site} is not a tag"),
        }
    }

    fn tag_number(&self, site: Site) -> u32 {
        match self.expr(site) {
            Expr::Tag { tag, .. } => *tag,
            _ => panic!("{site} is not a tag"),
        }
    }

    fn constant_entity(&self, site: Site) -> Entity {
        match self.expr(site) {
            Expr::Const { ty, .. } => *ty,
            _ => panic!("{site} is not a constant"),
        }
    }

    fn constant_data(&self, site: Site) -> &[u8] {
        match self.expr(site) {
            Expr::Const { data, .. } => data,
            _ => panic!("{site} is not a constant"),
        }
    }

    fn match_subject_entity(&self, site: Site) -> Entity {
        match self.expr(site) {
            Expr::Match { subject, .. } => *subject,
            _ => panic!("{site} is not a match"),
        }
    }

    fn match_case_count(&self, site: Site) -> usize {
        match self.expr(site) {
            Expr::Match { cases, .. } => cases.len(),
            _ => panic!("{site} is not a match"),
        }
    }

    fn match_case_code(&self, site: Site, case: usize) -> Code {
        self.case(site, case).code
    }

    fn match_case_tags(&self, site: Site, case: usize) -> &[u32] {
        &self.case(site, case).tags
    }

    fn match_case_field(&self, site: Site, case: usize) -> Option<Entity> {
        self.case(site, case).field
    }

    fn effect_entity(&self, site: Site) -> Entity {
        match self.expr(site) {
            Expr::Env(effect) => *effect,
            _ => panic!("{site} is not an env"),
        }
    }

    fn pop_entity(&self, site: Site) -> Entity {
        match self.expr(site) {
            Expr::Pop(ty) => *ty,
            _ => panic!("{site} is not a pop"),
        }
    }

    fn comment(&self, site: Site) -> &str {
        match self.expr(site) {
            Expr::Comment(text) => text,
            _ => panic!("{site} is not a comment"),
        }
    }
}
