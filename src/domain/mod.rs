//! Domain types for Loanr
//!
//! This module contains all core domain types:
//! - Loan: the lifecycle aggregate with its status and documents
//! - LoanInvestor: one investor's allocation against a loan
//! - Borrower, Employee, Investor: registered parties

pub mod allocation;
pub mod loan;
pub mod party;

pub use allocation::{LoanInvestor, total_invested};
pub use loan::{Loan, LoanStatus, Operation};
pub use party::{Borrower, Employee, Investor, NewParty};
