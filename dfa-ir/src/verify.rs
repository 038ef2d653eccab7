//! Code to validate a [`Program`] before analysing it.
//!
//! The analyses trust the IR contract; these checks catch the mistakes a front end or a
//! hand-written test program is likely to make.

use crate::{
    code::{Code, Expr},
    entity::{Entity, EntityKind},
    error::IrError,
    ir::Ir,
    program::Program,
};

impl Program {
    /// Verify the contents of this [`Program`] is valid.
    pub fn verify(self) -> Result<Self, IrError> {
        if self.entity_kind(self.main) != EntityKind::Routine
            || self.entity_code(self.main).is_none()
        {
            return Err(IrError::VerifyMainNotARoutine(
                self.entity_name(self.main).to_owned(),
            ));
        }
        for entity in self.entities() {
            self.verify_entity(entity)?;
        }
        for (idx, code) in self.codes.iter().enumerate() {
            self.verify_code(Code(idx as u32), code.owner)?;
        }
        Ok(self)
    }

    fn verify_entity(&self, entity: Entity) -> Result<(), IrError> {
        let content = self.content(entity);
        for arg in &content.args {
            if self.entity_kind(*arg) != EntityKind::Field {
                return Err(IrError::VerifyArgIsNotAField(
                    content.name.clone(),
                    self.entity_name(*arg).to_owned(),
                ));
            }
        }
        match content.result_field {
            Some(field) if self.entity_kind(field) != EntityKind::Field => {
                Err(IrError::VerifyResultIsNotAField(
                    content.name.clone(),
                    self.entity_name(field).to_owned(),
                ))
            }
            _ => Ok(()),
        }
    }

    fn verify_code(&self, code: Code, owner: Entity) -> Result<(), IrError> {
        for site in self.code_sites(code) {
            match self.expr(site) {
                Expr::Call { dynamic, .. } => {
                    // Overrides are concrete.
                    for target in dynamic.iter().flatten() {
                        self.verify_access("call", *target, |kind| kind != EntityKind::Abstract)?;
                    }
                }
                Expr::Assign { field, dynamic, .. } => {
                    for target in std::iter::once(field).chain(dynamic.iter().flatten()) {
                        self.verify_access("assign", *target, |kind| kind == EntityKind::Field)?;
                    }
                }
                Expr::Match { subject, cases } => {
                    if cases
                        .iter()
                        .any(|case| self.codes[case.code.index()].owner != owner)
                    {
                        return Err(IrError::VerifyCaseCodeOwner(
                            self.entity_name(*subject).to_owned(),
                        ));
                    }
                }
                Expr::Const { ty, data } => {
                    if let Some(special) = self.special(*ty) {
                        if data.len() != special.size_in_bytes() {
                            return Err(IrError::VerifyConstantSize(
                                self.entity_name(*ty).to_owned(),
                                special.size_in_bytes(),
                                data.len(),
                            ));
                        }
                    }
                }
                _ => (),
            }
        }
        Ok(())
    }

    fn verify_access(
        &self,
        instr: &str,
        entity: Entity,
        allowed: impl Fn(EntityKind) -> bool,
    ) -> Result<(), IrError> {
        let kind = self.entity_kind(entity);
        if allowed(kind) {
            Ok(())
        } else {
            Err(IrError::VerifyAccessOfWrongKind(
                instr.to_owned(),
                self.entity_name(entity).to_owned(),
                kind.to_string(),
            ))
        }
    }
}
