//! Code blocks, sites and the closed set of stack instructions.

use std::fmt;

use crate::entity::Entity;

/// A code block: the body of a routine or precondition, or one case of a `match`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Code(pub u32);

impl Code {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// One instruction inside a code block.  The sites of a block are contiguous, in execution
/// order, starting at [`crate::Ir::code_start`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Site(pub u32);

impl Site {
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    pub fn offset(&self, by: usize) -> Site {
        Site(self.0 + by as u32)
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// The instruction kinds.  Consumers outside this crate must treat an unknown kind as a broken
/// IR contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ExprKind {
    /// Pop a value and push its address.
    AdrOf,
    /// Pop the target, then the value, and store the value into the accessed field.
    Assign,
    /// Pop a value type value and push it as a reference.
    Box,
    /// Pop a reference and push the value it refers to.
    Unbox,
    /// Pop the arguments, then the target, call the accessed entity and push its result.
    Call,
    /// Push the instance of the routine being executed.
    Current,
    Comment,
    /// Push constant data.
    Const,
    /// Duplicate the value on top of the stack.
    Dup,
    /// Pop the subject and run every case block.
    Match,
    /// Pop a value and push it tagged as one variant of a choice type.
    Tag,
    /// Push the currently installed instance of an effect.
    Env,
    /// Pop and discard a value.
    Pop,
}

impl fmt::Display for ExprKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExprKind::AdrOf => "adr_of",
            ExprKind::Assign => "assign",
            ExprKind::Box => "box",
            ExprKind::Unbox => "unbox",
            ExprKind::Call => "call",
            ExprKind::Current => "current",
            ExprKind::Comment => "comment",
            ExprKind::Const => "const",
            ExprKind::Dup => "dup",
            ExprKind::Match => "match",
            ExprKind::Tag => "tag",
            ExprKind::Env => "env",
            ExprKind::Pop => "pop",
        })
    }
}

/// One case of a [`Expr::Match`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Case {
    /// The tag numbers selecting this case.
    pub tags: Vec<u32>,
    /// The field of `Current` receiving the matched value, if the case binds it.
    pub field: Option<Entity>,
    pub code: Code,
}

/// The content of a site, as handed to [`crate::ProgramBuilder::code`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    AdrOf,
    Assign {
        field: Entity,
        /// Type of the target; defaults to the field's outer entity.
        target: Option<Entity>,
        /// Set for a dynamically bound access: every concrete field that may be written.
        dynamic: Option<Vec<Entity>>,
    },
    Box {
        value: Entity,
        result: Entity,
    },
    Unbox {
        outer: Entity,
        result: Entity,
    },
    Call {
        callee: Entity,
        target: Option<Entity>,
        /// Set for a dynamically bound call: every concrete routine that may be called, possibly
        /// none at all.
        dynamic: Option<Vec<Entity>>,
        precondition_only: bool,
    },
    Current,
    Comment(String),
    Const {
        ty: Entity,
        data: Vec<u8>,
    },
    Dup,
    Match {
        subject: Entity,
        cases: Vec<Case>,
    },
    Tag {
        value: Entity,
        new: Entity,
        tag: u32,
    },
    Env(Entity),
    Pop(Entity),
}

impl Expr {
    pub fn call(callee: Entity) -> Expr {
        Expr::Call {
            callee,
            target: None,
            dynamic: None,
            precondition_only: false,
        }
    }

    pub fn dynamic_call(callee: Entity, overrides: Vec<Entity>) -> Expr {
        Expr::Call {
            callee,
            target: None,
            dynamic: Some(overrides),
            precondition_only: false,
        }
    }

    pub fn assign(field: Entity) -> Expr {
        Expr::Assign {
            field,
            target: None,
            dynamic: None,
        }
    }

    pub fn constant(ty: Entity, data: impl Into<Vec<u8>>) -> Expr {
        Expr::Const {
            ty,
            data: data.into(),
        }
    }

    pub fn kind(&self) -> ExprKind {
        match self {
            Expr::AdrOf => ExprKind::AdrOf,
            Expr::Assign { .. } => ExprKind::Assign,
            Expr::Box { .. } => ExprKind::Box,
            Expr::Unbox { .. } => ExprKind::Unbox,
            Expr::Call { .. } => ExprKind::Call,
            Expr::Current => ExprKind::Current,
            Expr::Comment(_) => ExprKind::Comment,
            Expr::Const { .. } => ExprKind::Const,
            Expr::Dup => ExprKind::Dup,
            Expr::Match { .. } => ExprKind::Match,
            Expr::Tag { .. } => ExprKind::Tag,
            Expr::Env(_) => ExprKind::Env,
            Expr::Pop(_) => ExprKind::Pop,
        }
    }
}
