// src/lib.rs — Library root for ActionLens

pub mod chat;
pub mod cli;
pub mod core;
pub mod infra;
pub mod provider;
pub mod report;
pub mod source;
