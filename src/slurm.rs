//! Talk to SLURM through a remote session and render job scripts

/// sbatch, squeue and sacct wrappers
pub mod client;

/// Render the FMRIPrep submission script and write it to disk
pub mod job;
