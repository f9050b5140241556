//! Small helpers shared across the workspace.

pub mod lit_str;
