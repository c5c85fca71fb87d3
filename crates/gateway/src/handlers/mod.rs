//! API handlers module

pub mod actions;
pub mod health;
pub mod papers;
pub mod stats;
