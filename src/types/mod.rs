//! Data types for the extraction engine.

pub mod chunk;
pub mod config;
pub mod consensus;
pub mod item;
pub mod result;
pub mod transcript;
