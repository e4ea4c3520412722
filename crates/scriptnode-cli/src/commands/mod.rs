//! CLI command implementations.

pub mod common;
pub mod inspect;
pub mod nodes;
pub mod render;
pub mod validate;
