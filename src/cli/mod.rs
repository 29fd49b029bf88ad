//! Command Line Interface (CLI) layer for emitwater.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the orchestration logic (`runner`) for the water content job and the
//! granule, AOI, extraction and download helpers. It wires user-provided
//! options to the underlying library functionality exposed via `emitwater::api`.
//!
//! If you are embedding emitwater into another application, prefer using
//! the high-level `emitwater::api` module instead of calling the CLI code.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::run;
