//! Core processing building blocks: absorption window, bounded solver, per-pixel
//! inversion, row partitioning and workers, orthorectification, the job
//! orchestrator and zonal extraction. These are internal primitives consumed by
//! the high-level `api` module.
pub mod absorption;
pub mod inversion;
pub mod job;
pub mod ortho;
pub mod params;
pub mod partition;
pub mod solver;
pub mod worker;
pub mod zonal;
