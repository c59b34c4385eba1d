//! imgtask-cli library: exposes the command modules for unit tests.

pub mod app;
pub mod commands;
pub mod error;
