//! Loanr - A peer-funded loan lifecycle engine
//!
//! A loan is proposed by a borrower, approved after a field visit, funded by
//! one or more investors and finally disbursed. The engine enforces that
//! order, reconciles investor allocations against the principal, issues the
//! agreement letter and queues investor confirmations.

pub mod documents;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod notify;
pub mod numbering;
pub mod storage;

pub use error::{LoanrError, Result};
