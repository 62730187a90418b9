//! Smart Team command-line application.
//!
//! This crate wires the default team (a coordinator plus weather, search and
//! code workers) into an orchestrator and drives it from a clap CLI or an
//! interactive rustyline REPL.

pub mod cli;
pub mod repl;
pub mod team;
