//! Construction of a [`Program`].
//!
//! Entities are declared first and described afterwards, so mutually referring entities (a
//! routine and its result field, a type and its `call` routine) need no particular order.  Code
//! blocks are appended whole; a `match` refers to case blocks built before it.

use rustc_hash::FxHashMap;

use crate::{
    code::{Code, Expr, Site},
    entity::{Entity, EntityKind, SpecialEntity},
    error::IrError,
    program::{CodeContent, EntityContent, Program, SiteContent},
};

pub const UNIVERSE_NAME: &str = "universe";

pub struct ProgramBuilder {
    entities: Vec<EntityContent>,
    codes: Vec<CodeContent>,
    sites: Vec<SiteContent>,
    names: FxHashMap<String, Entity>,
    main: Option<Entity>,
    universe: Entity,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBuilder {
    /// A builder already holding the universe entity.
    pub fn new() -> Self {
        let mut universe = EntityContent::new(UNIVERSE_NAME, EntityKind::Routine);
        universe.unit = true;
        let mut names = FxHashMap::default();
        names.insert(UNIVERSE_NAME.to_owned(), Entity(0));
        ProgramBuilder {
            entities: vec![universe],
            codes: Vec::new(),
            sites: Vec::new(),
            names,
            main: None,
            universe: Entity(0),
        }
    }

    pub fn universe(&self) -> Entity {
        self.universe
    }

    pub fn special_of(&self, entity: Entity) -> Option<SpecialEntity> {
        self.entities[entity.index()].special
    }

    pub fn lookup(&self, name: &str) -> Option<Entity> {
        self.names.get(name).copied()
    }

    /// Declare a new entity.  Names must be unique.
    pub fn declare(&mut self, name: &str, kind: EntityKind) -> Result<Entity, IrError> {
        if self.names.contains_key(name) {
            return Err(IrError::DuplicateEntity(name.to_owned()));
        }
        let entity = Entity(self.entities.len() as u32);
        self.entities.push(EntityContent::new(name, kind));
        self.names.insert(name.to_owned(), entity);
        Ok(entity)
    }

    /// Describe a declared entity.
    pub fn entity(&mut self, entity: Entity) -> EntityBuilder<'_> {
        EntityBuilder {
            content: &mut self.entities[entity.index()],
        }
    }

    pub fn set_main(&mut self, main: Entity) {
        self.main = Some(main);
    }

    /// Append a code block owned by `owner`.
    pub fn code(&mut self, owner: Entity, exprs: Vec<Expr>) -> Code {
        let code = Code(self.codes.len() as u32);
        self.codes.push(CodeContent {
            owner,
            start: Site(self.sites.len() as u32),
            len: exprs.len(),
        });
        self.sites
            .extend(exprs.into_iter().map(|expr| SiteContent { code, expr }));
        code
    }

    /// Shorthand declaring a routine with `body` as its code.
    pub fn routine(&mut self, name: &str, body: Vec<Expr>) -> Result<Entity, IrError> {
        let routine = self.declare(name, EntityKind::Routine)?;
        let code = self.code(routine, body);
        self.entity(routine).code(code);
        Ok(routine)
    }

    /// Shorthand declaring a field of `outer` holding values of `ty`.
    pub fn field(&mut self, name: &str, outer: Entity, ty: Entity) -> Result<Entity, IrError> {
        let field = self.declare(name, EntityKind::Field)?;
        self.entity(field).outer(outer).result_type(ty);
        Ok(field)
    }

    /// Shorthand declaring a type without code.
    pub fn ty(&mut self, name: &str) -> Result<Entity, IrError> {
        self.declare(name, EntityKind::Routine)
    }

    pub fn finish(self) -> Result<Program, IrError> {
        let main = self.main.ok_or(IrError::MissingMain)?;
        Ok(Program {
            entities: self.entities,
            codes: self.codes,
            sites: self.sites,
            names: self.names,
            main,
            universe: self.universe,
        })
    }
}

/// Setters for one entity, see [`ProgramBuilder::entity`].
pub struct EntityBuilder<'a> {
    content: &'a mut EntityContent,
}

impl<'a> EntityBuilder<'a> {
    pub fn special(self, special: SpecialEntity) -> Self {
        self.content.special = Some(special);
        self
    }

    pub fn unit(self) -> Self {
        self.content.unit = true;
        self
    }

    pub fn void(self) -> Self {
        self.content.void = true;
        self
    }

    pub fn is_ref(self) -> Self {
        self.content.is_ref = true;
        self
    }

    pub fn type_parameter(self) -> Self {
        self.content.type_parameter = true;
        self
    }

    pub fn outer(self, outer: Entity) -> Self {
        self.content.outer = Some(outer);
        self
    }

    pub fn outer_ref(self, field: Entity) -> Self {
        self.content.outer_ref = Some(field);
        self
    }

    pub fn result_type(self, ty: Entity) -> Self {
        self.content.result_type = Some(ty);
        self
    }

    pub fn result_field(self, field: Entity) -> Self {
        self.content.result_field = Some(field);
        self
    }

    pub fn args(self, args: Vec<Entity>) -> Self {
        self.content.args = args;
        self
    }

    pub fn code(self, code: Code) -> Self {
        self.content.code = Some(code);
        self
    }

    pub fn precondition(self, code: Code) -> Self {
        self.content.precondition = Some(code);
        self
    }

    pub fn intrinsic_name(self, name: &str) -> Self {
        self.content.intrinsic_name = Some(name.to_owned());
        self
    }

    pub fn generics(self, generics: Vec<Entity>) -> Self {
        self.content.generics = generics;
        self
    }

    pub fn call_routine(self, routine: Entity) -> Self {
        self.content.call_routine = Some(routine);
        self
    }

    pub fn effect(self, effect: Entity) -> Self {
        self.content.effect = Some(effect);
        self
    }
}
