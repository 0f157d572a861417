//! Storage layer for Loanr - JSONL-backed record persistence.
//!
//! `Storage` is the generic record store. `LoanStore` and `PartyStore` layer
//! the repositories the lifecycle engine depends on over any `Storage`.

mod jsonl;
mod loans;
mod parties;
mod traits;

pub use jsonl::JsonlStorage;
pub use loans::{ALLOCATIONS_COLLECTION, LOANS_COLLECTION, LoanPatch, LoanRepository, LoanStore};
pub use parties::{
    BORROWERS_COLLECTION, EMPLOYEES_COLLECTION, INVESTORS_COLLECTION, PartyDirectory, PartyStore,
};
pub use traits::{Filter, FilterOp, HasId, Storage};
