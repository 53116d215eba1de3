//! Test-Script Editor: a streaming processor over the
//! newline-delimited `.tst` test-script format.

pub mod editor;
pub mod line;

pub use editor::{merge_attributes, remove_by_pattern, strip_unchanged};
pub use line::TstLine;
