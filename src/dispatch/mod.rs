//! Background dispatch for fire-and-forget writes
//!
//! Ledger appends and click accounting must never hold up the request that
//! triggered them. Handlers hand a [`BackgroundTask`] to the dispatcher and
//! return immediately; a single worker drains a bounded channel and runs each
//! task against the store. Failures end up in the log, not in the caller.
//!
//! Delivery is best-effort: a full queue drops the task, and a failed write is
//! not retried.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::models::{LinkClickEvent, PointsLedgerEvent};
use crate::storage::Storage;

/// Work that runs after the response has gone out
#[derive(Debug, Clone)]
pub enum BackgroundTask {
    /// Persist one points award
    AppendLedgerEvent(PointsLedgerEvent),
    /// Bump a shortlink's counter (when `shortlink_id` is set) and log the click
    RecordClick(LinkClickEvent),
}

impl BackgroundTask {
    fn kind(&self) -> &'static str {
        match self {
            Self::AppendLedgerEvent(_) => "append_ledger_event",
            Self::RecordClick(_) => "record_click",
        }
    }
}

enum DispatchMessage {
    Run(BackgroundTask),
    /// Acknowledged once every earlier task has run
    Flush(oneshot::Sender<()>),
    Shutdown,
}

struct DispatchWorker {
    receiver: mpsc::Receiver<DispatchMessage>,
    storage: Arc<dyn Storage>,
}

impl DispatchWorker {
    async fn run(mut self) {
        while let Some(msg) = self.receiver.recv().await {
            match msg {
                DispatchMessage::Run(task) => self.execute(task).await,
                DispatchMessage::Flush(ack) => {
                    let _ = ack.send(());
                }
                DispatchMessage::Shutdown => {
                    info!("Dispatch worker received shutdown signal, draining queue...");
                    self.receiver.close();
                    while let Some(msg) = self.receiver.recv().await {
                        match msg {
                            DispatchMessage::Run(task) => self.execute(task).await,
                            DispatchMessage::Flush(ack) => {
                                let _ = ack.send(());
                            }
                            DispatchMessage::Shutdown => {}
                        }
                    }
                    break;
                }
            }
        }
        debug!("Dispatch worker stopped");
    }

    async fn execute(&self, task: BackgroundTask) {
        let kind = task.kind();
        let result = match task {
            BackgroundTask::AppendLedgerEvent(event) => {
                self.storage.append_ledger_event(&event).await.map_err(|e| {
                    error!(
                        event_id = %event.event_id,
                        user_id = %event.user_id,
                        points = event.points,
                        error = %e,
                        "failed to persist points ledger event"
                    );
                })
            }
            BackgroundTask::RecordClick(click) => {
                let mut outcome = Ok(());
                if let Some(ref shortlink_id) = click.shortlink_id {
                    if let Err(e) = self.storage.increment_clicks(shortlink_id).await {
                        error!(short_code = %shortlink_id, error = %e, "failed to increment click count");
                        outcome = Err(());
                    }
                }
                if let Err(e) = self.storage.record_click_event(&click).await {
                    error!(click_id = %click.id, error = %e, "failed to record link click event");
                    outcome = Err(());
                }
                outcome
            }
        };

        if result.is_ok() {
            debug!(task = kind, "background task completed");
        }
    }
}

/// Handle for submitting background work
pub struct BackgroundDispatcher {
    sender: mpsc::Sender<DispatchMessage>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundDispatcher {
    /// Spawn the worker. Must be called inside a tokio runtime.
    pub fn new(storage: Arc<dyn Storage>, buffer_size: usize) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));

        let worker = DispatchWorker { receiver, storage };
        let handle = tokio::spawn(async move {
            worker.run().await;
        });

        Self {
            sender,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Queue a task without waiting. Returns false if the task was dropped.
    pub fn dispatch(&self, task: BackgroundTask) -> bool {
        let kind = task.kind();
        match self.sender.try_send(DispatchMessage::Run(task)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(task = kind, "Dispatch queue full, dropping background task");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(task = kind, "Dispatch worker stopped, dropping background task");
                false
            }
        }
    }

    /// Wait until every task queued before this call has run
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.sender.send(DispatchMessage::Flush(ack_tx)).await.is_err() {
            return;
        }
        let _ = ack_rx.await;
    }

    /// Drain outstanding tasks and stop the worker
    pub async fn shutdown(&self) {
        let _ = self.sender.send(DispatchMessage::Shutdown).await;

        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Dispatch worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Shortlink;
    use crate::storage::{SqliteStorage, UnavailableStorage};

    async fn setup_storage() -> Arc<dyn Storage> {
        let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
        storage.init().await.unwrap();
        Arc::new(storage)
    }

    fn click(id: &str, shortlink_id: Option<&str>) -> LinkClickEvent {
        LinkClickEvent {
            id: id.to_string(),
            partner_id: Some("partner-1".to_string()),
            target_url: "https://example.com".to_string(),
            shortlink_id: shortlink_id.map(str::to_string),
            campaign: None,
            timestamp: 1_700_000_000,
            user_agent: Some("test-agent".to_string()),
        }
    }

    #[tokio::test]
    async fn test_flush_waits_for_queued_tasks() {
        let storage = setup_storage().await;
        storage
            .create_shortlink(&Shortlink {
                id: "promo".to_string(),
                destination_url: Some("https://example.com".to_string()),
                partner_id: Some("partner-1".to_string()),
                campaign: None,
                click_count: 0,
                created_at: 0,
            })
            .await
            .unwrap();

        let dispatcher = BackgroundDispatcher::new(Arc::clone(&storage), 16);
        assert!(dispatcher.dispatch(BackgroundTask::RecordClick(click("c1", Some("promo")))));
        assert!(dispatcher.dispatch(BackgroundTask::RecordClick(click("c2", Some("promo")))));
        dispatcher.flush().await;

        let link = storage.get_shortlink("promo").await.unwrap().unwrap();
        assert_eq!(link.click_count, 2);
        let events = storage.list_click_events(Some("promo"), 10).await.unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let storage: Arc<dyn Storage> = Arc::new(UnavailableStorage);
        let dispatcher = BackgroundDispatcher::new(storage, 4);

        assert!(dispatcher.dispatch(BackgroundTask::RecordClick(click("c1", Some("missing")))));
        dispatcher.flush().await;

        // Worker is still alive after the failure
        assert!(dispatcher.dispatch(BackgroundTask::RecordClick(click("c2", None))));
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let storage = setup_storage().await;
        let dispatcher = BackgroundDispatcher::new(Arc::clone(&storage), 16);

        for i in 0..5 {
            dispatcher.dispatch(BackgroundTask::RecordClick(click(&format!("legacy-{i}"), None)));
        }
        dispatcher.shutdown().await;

        let events = storage.list_click_events(None, 10).await.unwrap();
        assert_eq!(events.len(), 5);
        assert!(!dispatcher.dispatch(BackgroundTask::RecordClick(click("late", None))));
    }
}
