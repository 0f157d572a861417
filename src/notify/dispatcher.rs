//! Best-effort delivery of investor confirmations
//!
//! The engine hands tasks to a `NotificationDispatcher`, which only enqueues.
//! A `DeliveryWorker` drains the queue on its own task, so a slow or failing
//! mail relay never holds up a lifecycle transition.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use super::message::{Attachment, DeliveryTask, MessageComposer};
use super::sender::MessageSender;
use crate::documents::DocumentStore;
use crate::error::{LoanrError, Result};

/// Producer side of the delivery queue
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    tx: Option<mpsc::Sender<DeliveryTask>>,
}

impl NotificationDispatcher {
    /// A dispatcher that drops every task (no mail credentials)
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Create a dispatcher and the worker that serves it
    pub fn channel<M, D>(capacity: usize, sender: Arc<M>, documents: Arc<D>) -> (Self, DeliveryWorker<M, D>)
    where
        M: MessageSender,
        D: DocumentStore,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = DeliveryWorker {
            rx,
            sender,
            documents,
            composer: MessageComposer::new(),
        };
        (Self { tx: Some(tx) }, worker)
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Enqueue a confirmation without waiting
    ///
    /// Returns false if the task was dropped.
    pub fn dispatch(&self, task: DeliveryTask) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };

        match tx.try_send(task) {
            Ok(()) => true,
            Err(TrySendError::Full(task)) => {
                log::warn!(
                    "Notification queue full, dropping confirmation to {} for loan {}",
                    task.recipient_email,
                    task.loan_number
                );
                false
            }
            Err(TrySendError::Closed(task)) => {
                log::warn!(
                    "Notification worker stopped, dropping confirmation to {} for loan {}",
                    task.recipient_email,
                    task.loan_number
                );
                false
            }
        }
    }
}

/// Outcome counts of a worker run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Consumer side of the delivery queue
pub struct DeliveryWorker<M: MessageSender, D: DocumentStore> {
    rx: mpsc::Receiver<DeliveryTask>,
    sender: Arc<M>,
    documents: Arc<D>,
    composer: MessageComposer,
}

impl<M: MessageSender + 'static, D: DocumentStore + 'static> DeliveryWorker<M, D> {
    /// Run on a tokio task until every dispatcher is dropped
    pub fn spawn(self) -> JoinHandle<DeliveryReport> {
        tokio::spawn(self.run())
    }
}

impl<M: MessageSender, D: DocumentStore> DeliveryWorker<M, D> {
    /// Deliver tasks until the queue closes
    pub async fn run(mut self) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        while let Some(task) = self.rx.recv().await {
            match self.deliver(&task).await {
                Ok(()) => {
                    log::info!(
                        "Sent investment confirmation to {} for loan {}",
                        task.recipient_email,
                        task.loan_number
                    );
                    report.delivered += 1;
                }
                Err(e) => {
                    log::warn!(
                        "Failed to send email to investor {}: {}",
                        task.recipient_email,
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        log::debug!(
            "Delivery worker finished: {} delivered, {} failed",
            report.delivered,
            report.failed
        );
        report
    }

    async fn deliver(&self, task: &DeliveryTask) -> Result<()> {
        let mut attachments = Vec::new();
        if let Some(reference) = &task.agreement {
            let content = self.documents.retrieve(reference).map_err(|e| {
                LoanrError::DeliveryFailure(format!("agreement letter unavailable: {}", e))
            })?;
            attachments.push(Attachment {
                file_name: reference.file_name().to_string(),
                content_type: reference.content_type().to_string(),
                content,
            });
        }

        let message = self.composer.compose(task, attachments)?;
        self.sender.send(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::{DocumentKind, FsDocumentStore};
    use crate::notify::message::OutgoingMessage;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records messages; fails for addresses listed in `failing`
    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<OutgoingMessage>>,
        failing: Vec<String>,
    }

    #[async_trait]
    impl MessageSender for RecordingSender {
        async fn send(&self, message: OutgoingMessage) -> Result<()> {
            if self.failing.contains(&message.to) {
                return Err(LoanrError::DeliveryFailure("relay refused".into()));
            }
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    fn task(email: &str, agreement: Option<crate::documents::DocumentRef>) -> DeliveryTask {
        DeliveryTask {
            recipient_email: email.into(),
            recipient_name: "Investor".into(),
            loan_number: "2024/3/7".into(),
            investment_amount: dec!(4000),
            invested_at: Utc::now(),
            agreement,
        }
    }

    fn documents() -> (Arc<FsDocumentStore>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        (Arc::new(FsDocumentStore::new(temp_dir.path()).unwrap()), temp_dir)
    }

    #[test]
    fn test_disabled_dispatcher_is_noop() {
        let dispatcher = NotificationDispatcher::disabled();
        assert!(!dispatcher.is_enabled());
        assert!(!dispatcher.dispatch(task("a@example.com", None)));
    }

    #[tokio::test]
    async fn test_worker_delivers_with_attachment() {
        let (docs, _temp) = documents();
        let reference = docs
            .store(DocumentKind::AgreementLetter, "agreement_x.pdf", b"%PDF-1.3 letter")
            .unwrap();
        let sender = Arc::new(RecordingSender::default());

        let (dispatcher, worker) = NotificationDispatcher::channel(8, sender.clone(), docs);
        let handle = worker.spawn();
        assert!(dispatcher.dispatch(task("a@example.com", Some(reference))));
        drop(dispatcher);

        let report = handle.await.unwrap();
        assert_eq!(report, DeliveryReport { delivered: 1, failed: 0 });

        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent[0].to, "a@example.com");
        assert_eq!(sent[0].attachments[0].file_name, "agreement_x.pdf");
        assert_eq!(sent[0].attachments[0].content_type, "application/pdf");
        assert_eq!(sent[0].attachments[0].content, b"%PDF-1.3 letter");
    }

    #[tokio::test]
    async fn test_worker_continues_after_failure() {
        let (docs, _temp) = documents();
        let sender = Arc::new(RecordingSender {
            sent: Mutex::new(Vec::new()),
            failing: vec!["bad@example.com".into()],
        });

        let (dispatcher, worker) = NotificationDispatcher::channel(8, sender.clone(), docs);
        dispatcher.dispatch(task("bad@example.com", None));
        dispatcher.dispatch(task("good@example.com", None));
        drop(dispatcher);

        let report = worker.run().await;
        assert_eq!(report, DeliveryReport { delivered: 1, failed: 1 });
        assert_eq!(sender.sent.lock().unwrap()[0].to, "good@example.com");
    }

    #[tokio::test]
    async fn test_missing_attachment_counts_as_failure() {
        let (docs, _temp) = documents();
        let sender = Arc::new(RecordingSender::default());

        let (dispatcher, worker) = NotificationDispatcher::channel(8, sender.clone(), docs);
        let missing = crate::documents::DocumentRef::new("agreement-letters/gone.txt");
        dispatcher.dispatch(task("a@example.com", Some(missing)));
        drop(dispatcher);

        let report = worker.run().await;
        assert_eq!(report.failed, 1);
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_drops_task() {
        let (docs, _temp) = documents();
        let sender = Arc::new(RecordingSender::default());

        let (dispatcher, _worker) = NotificationDispatcher::channel(1, sender, docs);
        assert!(dispatcher.dispatch(task("a@example.com", None)));
        assert!(!dispatcher.dispatch(task("b@example.com", None)));
    }

    #[tokio::test]
    async fn test_closed_queue_drops_task() {
        let (docs, _temp) = documents();
        let sender = Arc::new(RecordingSender::default());

        let (dispatcher, worker) = NotificationDispatcher::channel(4, sender, docs);
        drop(worker);
        assert!(!dispatcher.dispatch(task("a@example.com", None)));
    }
}
