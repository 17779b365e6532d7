//! The FMRIPrep pipeline: an ordered list of remote steps driven to completion
//!
//! Steps run strictly in [`PIPELINE`] order. Each one is retried on its own until it succeeds, so a
//! failed transfer repeats the transfer and not the whole run. The scratch quota check is the only
//! step that can stop the run early.

use std::fmt;

/// Mutable state shared by the steps
pub mod context;

/// Remote paths derived from the workflow identity
pub mod paths;

/// Parse scratch usage reported by the cluster
pub mod quota;

mod driver;

pub use driver::{Workflow, WorkflowError};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Step {
    Discover,
    Connect,
    CheckQuota,
    CreateWorkspace,
    StageInput,
    StageLicense,
    WriteSubmitScript,
    UploadScript,
    Submit,
    PollUntilDone,
    FetchResults,
    Cleanup,
}

/// Execution order, no step is ever skipped
pub const PIPELINE: [Step; 12] = [
    Step::Discover,
    Step::Connect,
    Step::CheckQuota,
    Step::CreateWorkspace,
    Step::StageInput,
    Step::StageLicense,
    Step::WriteSubmitScript,
    Step::UploadScript,
    Step::Submit,
    Step::PollUntilDone,
    Step::FetchResults,
    Step::Cleanup,
];

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Step::Discover => write!(f, "Prepare input data, this may take a few minutes"),
            Step::Connect => write!(f, "Connect to cluster"),
            Step::CheckQuota => write!(f, "Check scratch space"),
            Step::CreateWorkspace => write!(f, "Create operation directory"),
            Step::StageInput => write!(f, "Move input directory into operation directory"),
            Step::StageLicense => write!(f, "Move fs license into operation directory"),
            Step::WriteSubmitScript => write!(f, "Create job script"),
            Step::UploadScript => write!(f, "Move submit script into cluster"),
            Step::Submit => write!(f, "Submit job"),
            Step::PollUntilDone => write!(f, "Waiting for job to finish"),
            Step::FetchResults => write!(f, "Get output data from cluster"),
            Step::Cleanup => write!(f, "Clean up operation files"),
        }
    }
}
