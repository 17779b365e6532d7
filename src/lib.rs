//! Run a single FMRIPrep job on a remote SLURM cluster
//!
//! Input data is staged over SSH, a batch script is rendered and submitted, the scheduler is
//! polled until the job leaves the queue, results are copied back and the remote workspace is
//! removed. Every step is retried until it succeeds, except the scratch quota check.

/// Cluster, metadata service, local layout and timing settings
pub mod config;

/// Remote shell sessions and file tree transfers
pub mod remote;

/// Submit, poll and classify SLURM jobs, and render submission scripts
pub mod slurm;

/// Locate auxiliary freesurfer resources on an XNAT server
pub mod discovery;

/// Re-run fallible operations until they succeed
pub mod retry;

/// The ordered pipeline of remote steps and the state threaded through it
pub mod workflow;
