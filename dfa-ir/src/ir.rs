//! The read-only query surface the analyses are written against.

use crate::{
    code::{Code, ExprKind, Site},
    entity::{Entity, EntityKind, SpecialEntity},
};

/// Queries over a whole, closed program.
///
/// Site queries are only meaningful for sites of the matching [`ExprKind`]; asking e.g. for
/// the [`Ir::accessed_entity`] of a `Const` site is a contract violation and implementations may
/// panic.
pub trait Ir {
    // ---------------------------------------------------------------------------------------------
    // Program roots.

    fn main_entity(&self) -> Entity;

    /// The outermost entity.  Its instance is a unit value.
    fn universe(&self) -> Entity;

    // ---------------------------------------------------------------------------------------------
    // Entities.

    fn entity_name(&self, entity: Entity) -> &str;

    fn entity_kind(&self, entity: Entity) -> EntityKind;

    fn special(&self, entity: Entity) -> Option<SpecialEntity>;

    /// Values of this type carry no data.
    fn has_unit_type(&self, entity: Entity) -> bool;

    /// This type has no values at all.
    fn has_void_type(&self, entity: Entity) -> bool;

    fn is_ref(&self, entity: Entity) -> bool;

    fn is_type_parameter(&self, entity: Entity) -> bool;

    /// The entity this one is declared in, i.e. the type of the target of an access.
    fn outer(&self, entity: Entity) -> Option<Entity>;

    /// The field holding the reference to the outer instance.
    fn outer_ref(&self, entity: Entity) -> Option<Entity>;

    /// The type of the value produced by calling `entity` (or reading it, for a field).
    fn result_entity(&self, entity: Entity) -> Entity;

    /// `None` for constructors, whose result is their own instance.
    fn result_field(&self, entity: Entity) -> Option<Entity>;

    fn arg_count(&self, entity: Entity) -> usize;

    /// The field receiving argument `index`.
    fn arg_entity(&self, entity: Entity, index: usize) -> Entity;

    fn entity_code(&self, entity: Entity) -> Option<Code>;

    fn precondition(&self, entity: Entity) -> Option<Code>;

    fn intrinsic_name(&self, entity: Entity) -> Option<&str>;

    fn actual_generic(&self, entity: Entity, index: usize) -> Option<Entity>;

    /// The routine called when a value of the function type `fun_type` is called.
    fn lookup_call(&self, fun_type: Entity) -> Option<Entity>;

    /// The effect an effect intrinsic installs, replaces or aborts.
    fn effect_type(&self, entity: Entity) -> Option<Entity>;

    // ---------------------------------------------------------------------------------------------
    // Code traversal.

    fn code_start(&self, code: Code) -> Site;

    fn within_code(&self, code: Code, site: Site) -> bool;

    fn code_size_at(&self, site: Site) -> usize;

    fn code_at(&self, site: Site) -> ExprKind;

    /// The routine whose code contains `site`.
    fn site_entity(&self, site: Site) -> Entity;

    /// The code block containing `site`.
    fn site_code(&self, site: Site) -> Code;

    // ---------------------------------------------------------------------------------------------
    // Per site queries.

    /// The statically accessed entity of a `Call` or `Assign`.
    fn accessed_entity(&self, site: Site) -> Entity;

    /// The concrete targets of a dynamically bound `Call` or `Assign`.
    fn accessed_entities(&self, site: Site) -> &[Entity];

    /// Whether the access is dynamically bound, even if it has no concrete targets.
    fn access_is_dynamic(&self, site: Site) -> bool;

    /// The type of the target popped by a `Call` or `Assign`.
    fn access_target_entity(&self, site: Site) -> Entity;

    /// The call only checks the callee's precondition.
    fn call_precondition_only(&self, site: Site) -> bool;

    fn box_value_entity(&self, site: Site) -> Entity;

    fn box_result_entity(&self, site: Site) -> Entity;

    fn unbox_outer_entity(&self, site: Site) -> Entity;

    fn unbox_result_entity(&self, site: Site) -> Entity;

    fn tag_value_entity(&self, site: Site) -> Entity;

    fn tag_new_entity(&self, site: Site) -> Entity;

    fn tag_number(&self, site: Site) -> u32;

    fn constant_entity(&self, site: Site) -> Entity;

    fn constant_data(&self, site: Site) -> &[u8];

    fn match_subject_entity(&self, site: Site) -> Entity;

    fn match_case_count(&self, site: Site) -> usize;

    fn match_case_code(&self, site: Site, case: usize) -> Code;

    fn match_case_tags(&self, site: Site, case: usize) -> &[u32];

    fn match_case_field(&self, site: Site, case: usize) -> Option<Entity>;

    /// The effect read by an `Env`.
    fn effect_entity(&self, site: Site) -> Entity;

    fn pop_entity(&self, site: Site) -> Entity;

    fn comment(&self, site: Site) -> &str;

    // ---------------------------------------------------------------------------------------------
    // Provided.

    /// Whether a value of this type physically occupies a stack slot.
    fn has_data(&self, entity: Entity) -> bool {
        !self.has_unit_type(entity) && !self.has_void_type(entity) && entity != self.universe()
    }

    fn is_constructor(&self, entity: Entity) -> bool {
        self.entity_kind(entity) == EntityKind::Routine && self.result_field(entity).is_none()
    }

    fn declares_precondition(&self, entity: Entity) -> bool {
        self.precondition(entity).is_some()
    }

    fn code_sites(&self, code: Code) -> Vec<Site> {
        let mut sites = Vec::new();
        let mut site = self.code_start(code);
        while self.within_code(code, site) {
            sites.push(site);
            site = site.offset(self.code_size_at(site));
        }
        sites
    }

    fn last_site(&self, code: Code) -> Option<Site> {
        self.code_sites(code).last().copied()
    }

    /// The site executed right before `site` in `code`.
    fn previous_site(&self, code: Code, site: Site) -> Option<Site> {
        let mut prev = None;
        let mut cursor = self.code_start(code);
        while self.within_code(code, cursor) && cursor < site {
            prev = Some(cursor);
            cursor = cursor.offset(self.code_size_at(cursor));
        }
        prev
    }
}
