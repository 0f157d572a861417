//! Loan lifecycle: request shapes, allocation checks and the engine

pub mod allocation;
pub mod engine;
pub mod locks;
pub mod requests;

pub use engine::{LifecycleEngine, LoanDetails};
pub use locks::LoanLocks;
pub use requests::{
    ApproveLoanRequest, DisburseLoanRequest, InvestLoanRequest, InvestmentRequest,
    ProposeLoanRequest, Upload, parse_date,
};
