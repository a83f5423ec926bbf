//! Integration tests
//!
//! Handoff scenarios run the engine in-process against mock services; the
//! CLI tests drive the `stager` binary.

mod cli;
mod common;
mod handoff;
mod submission;
