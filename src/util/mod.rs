//! Shared utilities

pub mod archive;
pub mod config;
pub mod diagnostic;
pub mod fs;
pub mod hash;
pub mod process;
pub mod shell;

pub use config::Config;
pub use diagnostic::Diagnostic;
pub use process::ProcessBuilder;
