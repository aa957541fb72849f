//! Download transport collaborator.

use crate::model::ResourceName;
use crate::reply::Reply;

/// One network download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    /// Destination, relative to the read-write tier.
    pub path: String,
    pub uri: String,
    /// User data passed through to the completion.
    pub resource: ResourceName,
}

/// Progress and completion notifications for a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    Progress { downloaded: u64 },
    Success { length: u64 },
    Failure { message: String },
}

/// Completion handle given to the download manager with each job.
#[derive(Debug, Clone)]
pub struct DownloadReply(Reply<DownloadEvent>);

impl DownloadReply {
    pub(crate) fn new(inner: Reply<DownloadEvent>) -> Self {
        Self(inner)
    }

    pub fn progress(&self, downloaded: u64) {
        self.0.send(DownloadEvent::Progress { downloaded });
    }

    /// The file at the job's path is complete.
    pub fn succeed(&self, length: u64) {
        self.0.send(DownloadEvent::Success { length });
    }

    pub fn fail(&self, message: impl Into<String>) {
        self.0.send(DownloadEvent::Failure {
            message: message.into(),
        });
    }
}

/// Queue-based transport. Implementations write the downloaded bytes to the
/// job's path in the read-write tier and may use a `<path>.download` sidecar
/// while the transfer is in progress. Backoff between attempts, if any, is
/// the transport's business.
pub trait DownloadManager {
    fn free_agent_count(&self) -> usize;

    fn waiting_task_count(&self) -> usize;

    fn add_download(&mut self, job: DownloadJob, reply: DownloadReply);
}
