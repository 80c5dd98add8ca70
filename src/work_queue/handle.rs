//! Job handle: the id of a dispatched job plus a way to await it.

use tokio::task::JoinHandle;

use super::error::DispatchError;
use super::JobOutput;

/// A dispatched job. Dropping the handle does not cancel the job.
pub struct JobHandle {
    pub id: String,
    pub queue: String,
    join: JoinHandle<Result<JobOutput, DispatchError>>,
}

impl JobHandle {
    pub(crate) fn new(
        id: String,
        queue: String,
        join: JoinHandle<Result<JobOutput, DispatchError>>,
    ) -> Self {
        Self { id, queue, join }
    }

    /// Wait for the job to finish.
    pub async fn wait(self) -> Result<JobOutput, DispatchError> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => Err(DispatchError::Aborted {
                id: self.id,
                message: e.to_string(),
            }),
        }
    }
}
