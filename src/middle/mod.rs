//! The middle-end proper. Function bodies are lowered into a block-based IR
//! (`lower`), pipeline declarations are normalized into merge plans and edge
//! metadata (`pipeline`), and both are assembled into a `Module` per
//! compilation unit.

pub mod diag;
pub mod ir;
pub mod lower;
pub mod pipeline;
pub mod tables;
