//! Allocation-free data structures backing the engine.
pub mod timeout_list;
