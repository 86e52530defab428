//! API handlers module

pub mod health;
pub mod qa;
pub mod vocabulary;
