//! Investor notifications
//!
//! Confirmations are composed per committed allocation, queued by the
//! `NotificationDispatcher` and delivered by a `DeliveryWorker` through a
//! `MessageSender`.

pub mod dispatcher;
pub mod message;
pub mod sender;

pub use dispatcher::{DeliveryReport, DeliveryWorker, NotificationDispatcher};
pub use message::{Attachment, DeliveryTask, MessageComposer, OutgoingMessage};
pub use sender::{MessageSender, SmtpSender, SmtpSettings};
