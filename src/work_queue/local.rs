//! In-process dispatcher: jobs run as tokio tasks, bounded by a semaphore.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::debug;

use super::{job_id, ArchiveJob, DispatchError, JobDispatcher, JobHandle, JobOutput};
use crate::services::ArchiveService;

pub struct LocalDispatcher {
    service: Arc<ArchiveService>,
    permits: Arc<Semaphore>,
}

impl LocalDispatcher {
    /// `workers` is the number of jobs allowed to run at once (at least one).
    pub fn new(service: Arc<ArchiveService>, workers: usize) -> Self {
        Self {
            service,
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    async fn dataset_name(&self, dataset_id: &str) -> String {
        match self.service.catalog().get_dataset(dataset_id).await {
            Ok(dataset) => dataset.display_name().to_string(),
            Err(_) => dataset_id.to_string(),
        }
    }
}

#[async_trait]
impl JobDispatcher for LocalDispatcher {
    async fn dispatch(&self, job: ArchiveJob, queue: &str) -> Result<JobHandle, DispatchError> {
        let id = match &job {
            ArchiveJob::UpdateResource { resource_id } => {
                let resource = self.service.catalog().get_resource(resource_id).await?;
                let name = self.dataset_name(&resource.dataset_id).await;
                job_id(&name, Some(resource_id))
            }
            ArchiveJob::UpdateDataset { dataset_id } => {
                let dataset = self.service.catalog().get_dataset(dataset_id).await?;
                job_id(dataset.display_name(), None)
            }
        };
        debug!("Dispatching {} {:?} on queue {} as {}", job.operation(), job.args(), queue, id);

        let service = self.service.clone();
        let permits = self.permits.clone();
        let queue_name = queue.to_string();
        let task_id = id.clone();

        let join = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| DispatchError::Closed)?;

            let result = match job {
                ArchiveJob::UpdateResource { resource_id } => service
                    .archive_resource(&resource_id, &queue_name)
                    .await
                    .map(JobOutput::Resource),
                ArchiveJob::UpdateDataset { dataset_id } => service
                    .archive_dataset(&dataset_id, &queue_name)
                    .await
                    .map(JobOutput::Dataset),
            };
            result.map_err(|source| DispatchError::Failed {
                id: task_id,
                source,
            })
        });

        Ok(JobHandle::new(id, queue.to_string(), join))
    }
}
