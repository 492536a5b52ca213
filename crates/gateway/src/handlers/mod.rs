//! API handlers module

pub mod health;
pub mod rag;
pub mod upload;
