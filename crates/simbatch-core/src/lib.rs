//! Job preparation and dispatch for a detector-simulation production:
//! generator input lookup, per-job workspaces, macro invocations, stage
//! dispatch with exit-status checks, and SLURM array submission.

pub mod common;
pub mod domain;
pub mod modules;
