//! The intermediate representation consumed by the whole-program analyses in `dfa-core`.
//!
//! The analyses never look at concrete data structures.  They only ask questions through the
//! [`Ir`] trait, all keyed by the opaque [`Entity`], [`Code`] and [`Site`] ids.  [`Program`] is
//! the in-memory implementation used by the command line tool and the tests, built either with
//! a [`ProgramBuilder`] or from text via [`parser::parse`].

pub mod builder;
pub use builder::*;
pub mod code;
pub use code::*;
pub mod entity;
pub use entity::*;
pub mod error;
pub use error::*;
pub mod ir;
pub use ir::*;
pub mod parser;
pub mod program;
pub use program::*;
pub mod verify;
