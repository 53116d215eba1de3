//! External adapters: the minimal interfaces the core
//! consumes from its collaborators, each reachable only through an
//! opaque-process boundary.

pub mod scm;
pub mod tool;

pub use scm::{GitScmAdapter, ScmAdapter};
pub use tool::ToolAdapter;
