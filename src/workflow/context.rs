use anyhow::{anyhow, Result};

use crate::remote::RemoteSession;
use crate::slurm::client::{Completion, JobId};
use crate::slurm::job::JobPath;
use crate::workflow::paths::RemotePaths;

/// Fixed for the lifetime of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowIdentity {
    pub workflow_id: String,
    pub username: String,
    pub hostname: String,
    pub port: u16,
}

/// State threaded through the pipeline
///
/// Steps only ever move fields forward: the session is opened by the connect step and closed by
/// cleanup, the job id is set by submission, and completion is set when results are fetched.
pub struct WorkflowContext {
    pub identity: WorkflowIdentity,
    session: Option<Box<dyn RemoteSession>>,
    /// local copy of the rendered submission script
    pub script: Option<JobPath>,
    pub job_id: Option<JobId>,
    pub completion: Completion,
    /// set by discovery, decides whether the auxiliary tree is staged
    pub resource_found: bool,
}

impl WorkflowContext {
    pub fn new(identity: WorkflowIdentity) -> Self {
        WorkflowContext {
            identity,
            session: None,
            script: None,
            job_id: None,
            completion: Completion::Unknown,
            resource_found: false,
        }
    }

    pub fn paths(&self) -> RemotePaths {
        RemotePaths::new(&self.identity.username, &self.identity.workflow_id)
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Store a freshly opened session, closing any previous one so only one is ever live
    pub fn attach_session(&mut self, session: Box<dyn RemoteSession>) -> Result<()> {
        let previous = self.session.replace(session);
        if let Some(mut old) = previous {
            old.close()?;
        }
        Ok(())
    }

    pub fn session(&mut self) -> Result<&mut (dyn RemoteSession + 'static)> {
        let hostname = &self.identity.hostname;
        self.session.as_deref_mut().ok_or_else(|| anyhow!("Not connected to {hostname}"))
    }

    /// Take the session out of the context and close it, `None` if nothing was open
    pub fn close_session(&mut self) -> Option<Result<()>> {
        self.session.take().map(|mut session| session.close())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::CommandOutput;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Counting {
        closes: Rc<Cell<usize>>,
    }

    impl RemoteSession for Counting {
        fn exec(&mut self, _command: &str) -> Result<CommandOutput> {
            Ok(CommandOutput::default())
        }

        fn close(&mut self) -> Result<()> {
            self.closes.set(self.closes.get() + 1);
            Ok(())
        }
    }

    fn context() -> WorkflowContext {
        WorkflowContext::new(WorkflowIdentity {
            workflow_id: "wf-1".to_string(),
            username: "mri".to_string(),
            hostname: "cluster.example.org".to_string(),
            port: 22,
        })
    }

    #[test]
    fn starts_unknown_and_disconnected() {
        let mut ctx = context();
        assert_eq!(ctx.completion, Completion::Unknown);
        assert_eq!(ctx.job_id, None);
        assert!(ctx.script.is_none());
        assert!(!ctx.resource_found);
        assert!(ctx.session().is_err());
        assert!(ctx.close_session().is_none());
    }

    #[test]
    fn only_one_session_is_live() {
        let closes = Rc::new(Cell::new(0));
        let mut ctx = context();
        ctx.attach_session(Box::new(Counting { closes: Rc::clone(&closes) })).unwrap();
        ctx.attach_session(Box::new(Counting { closes: Rc::clone(&closes) })).unwrap();
        assert_eq!(closes.get(), 1);

        assert!(matches!(ctx.close_session(), Some(Ok(()))));
        assert_eq!(closes.get(), 2);
        assert!(!ctx.is_connected());
    }

    #[test]
    fn paths_follow_identity() {
        assert_eq!(context().paths().workspace(), "/scratch/mri/wf-1");
    }
}
