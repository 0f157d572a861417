//! Party storage: borrower, employee and investor registration and lookup.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Serialize, de::DeserializeOwned};

use super::traits::{Filter, HasId, Storage};
use crate::domain::{Borrower, Employee, Investor, NewParty};
use crate::error::{LoanrError, Result};
use crate::numbering;

pub const BORROWERS_COLLECTION: &str = "borrowers";
pub const EMPLOYEES_COLLECTION: &str = "employees";
pub const INVESTORS_COLLECTION: &str = "investors";

/// Attempts at a compare-and-swap of an investor's running total.
const TOTAL_RETRIES: u32 = 3;

/// Lookup seam the lifecycle engine uses for parties.
pub trait PartyDirectory: Send + Sync {
    fn borrower(&self, id: u64) -> Result<Borrower>;

    fn employee(&self, id: u64) -> Result<Employee>;

    fn investor(&self, id: u64) -> Result<Investor>;

    /// Add `amount` to the investor's informational running total.
    fn record_investment(&self, investor_id: u64, amount: Decimal) -> Result<()>;
}

/// Storage-backed party registry.
pub struct PartyStore<S: Storage> {
    storage: Arc<S>,
    max_number_attempts: u32,
}

impl<S: Storage> PartyStore<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            max_number_attempts: 5,
        }
    }

    pub fn with_max_number_attempts(mut self, attempts: u32) -> Self {
        self.max_number_attempts = attempts;
        self
    }

    pub fn register_borrower(&self, party: &NewParty) -> Result<Borrower> {
        self.register(BORROWERS_COLLECTION, "borrower_number", party, Borrower::new)
    }

    pub fn register_employee(&self, party: &NewParty) -> Result<Employee> {
        self.register(EMPLOYEES_COLLECTION, "employee_number", party, Employee::new)
    }

    pub fn register_investor(&self, party: &NewParty) -> Result<Investor> {
        self.register(INVESTORS_COLLECTION, "investor_number", party, Investor::new)
    }

    fn register<T, F>(&self, collection: &str, number_field: &str, party: &NewParty, build: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + HasId,
        F: FnOnce(String, NewParty, DateTime<Utc>) -> T,
    {
        let party = party.validated()?;
        let duplicate = LoanrError::ValidationFailed(format!("email {} is already registered", party.email));
        let same_email = [Filter::eq("email", &party.email), Filter::live()];

        let existing: Vec<serde_json::Value> = self.storage.query(collection, &same_email)?;
        if !existing.is_empty() {
            return Err(duplicate);
        }

        let now = Utc::now();
        let number = numbering::generate_unique(now, self.max_number_attempts, |candidate| {
            let taken: Vec<serde_json::Value> = self
                .storage
                .query(collection, &[Filter::eq(number_field, candidate)])?;
            Ok(!taken.is_empty())
        })?;

        // Re-checked under the insert's write lock
        let mut record = build(number, party, now);
        let id = self
            .storage
            .insert_unless(collection, &mut record, &same_email)?
            .ok_or(duplicate)?;
        log::info!("Registered {} record {}", collection, id);
        Ok(record)
    }

    fn live<T: DeserializeOwned>(&self, collection: &str, entity: &str, id: u64) -> Result<T> {
        let value: Option<serde_json::Value> = self.storage.get(collection, id)?;
        match value {
            Some(v) if Filter::live().matches(&v) => Ok(serde_json::from_value(v)?),
            _ => Err(LoanrError::not_found(entity, id)),
        }
    }
}

impl<S: Storage> PartyDirectory for PartyStore<S> {
    fn borrower(&self, id: u64) -> Result<Borrower> {
        self.live(BORROWERS_COLLECTION, "borrower", id)
    }

    fn employee(&self, id: u64) -> Result<Employee> {
        self.live(EMPLOYEES_COLLECTION, "employee", id)
    }

    fn investor(&self, id: u64) -> Result<Investor> {
        self.live(INVESTORS_COLLECTION, "investor", id)
    }

    fn record_investment(&self, investor_id: u64, amount: Decimal) -> Result<()> {
        for _ in 0..TOTAL_RETRIES {
            let investor = self.investor(investor_id)?;
            let total = investor.total_invested.checked_add(amount).ok_or_else(|| {
                LoanrError::StorageFailure(format!(
                    "investor {} total is out of range",
                    investor_id
                ))
            })?;

            let mut changes = serde_json::Map::new();
            changes.insert("total_invested".to_string(), serde_json::to_value(total)?);

            let expected = [Filter::eq("total_invested", investor.total_invested)];
            if self
                .storage
                .patch(INVESTORS_COLLECTION, investor_id, &expected, changes)?
            {
                return Ok(());
            }
        }

        Err(LoanrError::StorageFailure(format!(
            "investor {} total changed concurrently",
            investor_id
        )))
    }
}
