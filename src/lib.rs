// ABOUTME: Library root for the magicdump backup orchestrator
// ABOUTME: Resolves targets, plans mysqldump invocations, runs them and post-processes the output

pub mod config;
pub mod error;
pub mod logging;
pub mod mysql;
pub mod plan;
pub mod postprocess;
pub mod progress;
pub mod resolve;
pub mod runner;
pub mod summary;
pub mod supervisor;

pub use error::DumpError;
pub use runner::{RunReport, Runner};
