use indexmap::IndexSet;

use crate::warning::CompileWarning;

/// Accumulates the warnings of one analysis run.
///
/// Warnings are deduplicated and kept in the order they were first emitted, which is
/// deterministic because the analyses visit entities in id order.
#[derive(Default, Debug)]
pub struct Handler {
    warnings: IndexSet<CompileWarning>,
}

impl Handler {
    pub fn emit_warn(&mut self, warning: CompileWarning) {
        self.warnings.insert(warning);
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &CompileWarning> {
        self.warnings.iter()
    }

    pub fn consume(self) -> Vec<CompileWarning> {
        self.warnings.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warning::Warning;

    #[test]
    fn warnings_are_deduplicated_in_emission_order() {
        let missing = |name: &str| CompileWarning {
            entity: None,
            site: None,
            warning_content: Warning::MissingIntrinsic {
                name: name.to_owned(),
            },
        };

        let mut handler = Handler::default();
        handler.emit_warn(missing("b"));
        handler.emit_warn(missing("a"));
        handler.emit_warn(missing("b"));

        assert_eq!(handler.consume(), vec![missing("b"), missing("a")]);
    }
}
