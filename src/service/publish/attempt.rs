use std::sync::Arc;
use tokio::runtime::Handle;

use shipyard_core::{NewPublishHistory, PublishError, PublishHistory, ReleaseStatus};

use crate::services::PublishHistoryService;

const INTERRUPTED: &str = "publish interrupted before an outcome was recorded";

/// One publish attempt against one cluster. Exactly one history row is appended for it:
/// by [`PublishAttempt::finish`], or on drop when the attempt is abandoned part way.
///
/// An attempt dropped before any outcome was recorded is logged as a failure.
#[derive(Debug)]
pub struct PublishAttempt {
    history: Arc<PublishHistoryService>,
    entry: Option<NewPublishHistory>,
}

impl PublishAttempt {
    pub fn begin(history: Arc<PublishHistoryService>, mut entry: NewPublishHistory) -> Self {
        entry.status = ReleaseStatus::Failure;
        entry.message = INTERRUPTED.to_owned();

        Self {
            history,
            entry: Some(entry),
        }
    }

    pub fn succeeded(&mut self, message: impl Into<String>) {
        if let Some(entry) = self.entry.as_mut() {
            entry.status = ReleaseStatus::Success;
            entry.message = message.into();
        }
    }

    pub fn failed(&mut self, err: &PublishError) {
        if let Some(entry) = self.entry.as_mut() {
            entry.status = ReleaseStatus::Failure;
            entry.message = err.to_string();
        }
    }

    /// Appends the history row. A write failure is logged and never surfaces to the caller.
    pub async fn finish(mut self) -> Option<PublishHistory> {
        let entry = self.entry.take()?;

        record(&self.history, &entry).await
    }
}

async fn record(
    history: &PublishHistoryService,
    entry: &NewPublishHistory,
) -> Option<PublishHistory> {
    match history.record(entry).await {
        Ok(recorded) => Some(recorded),
        Err(err) => {
            tracing::error!(
                "failed to record {:?} publish of template {} to cluster {}: {err:#}",
                entry.status,
                entry.template_id,
                entry.cluster
            );
            None
        }
    }
}

impl Drop for PublishAttempt {
    fn drop(&mut self) {
        let entry = match self.entry.take() {
            Some(entry) => entry,
            None => return,
        };

        match Handle::try_current() {
            Ok(handle) => {
                let history = Arc::clone(&self.history);
                handle.spawn(async move {
                    record(&history, &entry).await;
                });
            }
            Err(_) => tracing::error!(
                "no runtime to record abandoned publish to cluster {}: {}",
                entry.cluster,
                entry.message
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use shipyard_core::PublishKind;

    use super::*;
    use crate::persistence::memory::PublishHistoryMemoryPersistence;

    fn history_service() -> (Arc<PublishHistoryService>, PublishHistoryMemoryPersistence) {
        let persistence = PublishHistoryMemoryPersistence::default();

        (
            Arc::new(PublishHistoryService {
                persistence: Box::new(persistence.clone()),
            }),
            persistence,
        )
    }

    fn entry() -> NewPublishHistory {
        NewPublishHistory {
            kind: PublishKind::Deployment,
            resource_id: 5,
            resource_name: "web".to_owned(),
            template_id: 10,
            cluster: "a".to_owned(),
            user: "[APIKey] ci".to_owned(),
            message: String::new(),
            status: ReleaseStatus::Success,
        }
    }

    #[tokio::test]
    async fn test_finish_records_outcome_once() {
        let (history, _) = history_service();

        let mut attempt = PublishAttempt::begin(Arc::clone(&history), entry());
        attempt.succeeded("upgrade");
        let recorded = attempt.finish().await.unwrap();

        assert_eq!(recorded.status, ReleaseStatus::Success);
        assert_eq!(recorded.message, "upgrade");

        tokio::task::yield_now().await;

        let rows = history
            .get_by_resource(PublishKind::Deployment, 5)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_attempt_still_recorded() {
        let (history, _) = history_service();

        {
            let _attempt = PublishAttempt::begin(Arc::clone(&history), entry());
        }

        let mut rows = Vec::new();
        for _ in 0..20 {
            tokio::task::yield_now().await;
            rows = history
                .get_by_resource(PublishKind::Deployment, 5)
                .await
                .unwrap();
            if !rows.is_empty() {
                break;
            }
        }

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, ReleaseStatus::Failure);
        assert_eq!(rows[0].message, INTERRUPTED);
    }

    #[tokio::test]
    async fn test_history_write_failure_is_swallowed() {
        let (history, persistence) = history_service();
        persistence.set_unavailable(true);

        let mut attempt = PublishAttempt::begin(history, entry());
        attempt.failed(&PublishError::Cancelled("a".to_owned()));

        assert!(attempt.finish().await.is_none());
    }
}
