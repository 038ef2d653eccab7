//! Whole-program analyses over the stack-based IR of `dfa-ir`.
//!
//! [`Dfa`] abstractly interprets every reachable routine until field values, the call graph and
//! the effect requirements stop changing.  [`Escape`] and [`TailCall`] are local analyses that
//! only look at the code of one routine.

pub mod config;
pub use config::*;
pub mod dfa;
pub use dfa::*;
pub mod escape;
pub use escape::*;
pub mod interpreter;
pub use interpreter::*;
pub mod intrinsics;
pub mod report;
pub mod store;
pub use store::*;
pub mod tail_call;
pub use tail_call::*;
pub mod value;
pub use value::*;
