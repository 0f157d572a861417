//! Loan repository: loans and their investor allocations.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::traits::{Filter, Storage};
use crate::documents::DocumentRef;
use crate::domain::{Loan, LoanInvestor, LoanStatus};
use crate::error::{LoanrError, Result};

/// Collection name for loans.
pub const LOANS_COLLECTION: &str = "loans";

/// Collection name for loan-investor allocations.
pub const ALLOCATIONS_COLLECTION: &str = "loan_investors";

/// Persistence seam the lifecycle engine works against.
pub trait LoanRepository: Send + Sync {
    /// Persist a new loan, assigning its ID.
    fn create(&self, loan: &mut Loan) -> Result<u64>;

    /// Fetch a live loan or fail with `NotFound`.
    fn get_by_id(&self, id: u64) -> Result<Loan>;

    /// Apply `patch` only if the loan is still in `expected` status.
    ///
    /// Returns false when another writer moved the loan first.
    fn update_by_id(&self, id: u64, expected: LoanStatus, patch: LoanPatch) -> Result<bool>;

    /// Persist allocation rows as one write.
    fn create_allocations(&self, rows: &mut [LoanInvestor]) -> Result<()>;

    /// All allocation rows for a loan, in insertion order.
    fn list_allocations(&self, loan_id: u64) -> Result<Vec<LoanInvestor>>;

    /// Look a loan up by its human-readable number.
    fn find_by_number(&self, loan_number: &str) -> Result<Option<Loan>>;
}

/// Partial update of a loan; only the fields set here are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoanPatch {
    changes: serde_json::Map<String, serde_json::Value>,
}

impl LoanPatch {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(mut self, field: &str, value: impl Serialize) -> Self {
        self.changes.insert(
            field.to_string(),
            serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
        );
        self
    }

    pub fn status(self, status: LoanStatus) -> Self {
        self.set("status", status)
    }

    pub fn approval_employee_id(self, employee_id: u64) -> Self {
        self.set("approval_employee_id", employee_id)
    }

    pub fn proof_of_visit(self, document: &DocumentRef) -> Self {
        self.set("proof_of_visit", document)
    }

    pub fn approved_at(self, date: NaiveDate) -> Self {
        self.set("approved_at", date)
    }

    pub fn invested_at(self, at: Option<DateTime<Utc>>) -> Self {
        self.set("invested_at", at)
    }

    pub fn agreement_letter(self, document: Option<&DocumentRef>) -> Self {
        self.set("agreement_letter", document)
    }

    pub fn disbursed_employee_id(self, employee_id: u64) -> Self {
        self.set("disbursed_employee_id", employee_id)
    }

    pub fn signed_agreement_letter(self, document: &DocumentRef) -> Self {
        self.set("signed_agreement_letter", document)
    }

    pub fn disbursed_at(self, date: NaiveDate) -> Self {
        self.set("disbursed_at", date)
    }

    pub fn into_changes(self) -> serde_json::Map<String, serde_json::Value> {
        self.changes
    }
}

/// Storage-backed loan repository.
pub struct LoanStore<S: Storage> {
    storage: Arc<S>,
}

impl<S: Storage> LoanStore<S> {
    /// Create a new LoanStore over the given storage.
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }
}

impl<S: Storage> LoanRepository for LoanStore<S> {
    fn create(&self, loan: &mut Loan) -> Result<u64> {
        self.storage.insert(LOANS_COLLECTION, loan)
    }

    fn get_by_id(&self, id: u64) -> Result<Loan> {
        match self.storage.get::<Loan>(LOANS_COLLECTION, id)? {
            Some(loan) if !loan.is_deleted() => Ok(loan),
            _ => Err(LoanrError::not_found("loan", id)),
        }
    }

    fn update_by_id(&self, id: u64, expected: LoanStatus, patch: LoanPatch) -> Result<bool> {
        let expected = [Filter::eq("status", expected), Filter::live()];
        match self
            .storage
            .patch(LOANS_COLLECTION, id, &expected, patch.into_changes())
        {
            Err(LoanrError::NotFound { .. }) => Err(LoanrError::not_found("loan", id)),
            other => other,
        }
    }

    fn create_allocations(&self, rows: &mut [LoanInvestor]) -> Result<()> {
        self.storage.insert_many(ALLOCATIONS_COLLECTION, rows)
    }

    fn list_allocations(&self, loan_id: u64) -> Result<Vec<LoanInvestor>> {
        self.storage.query(
            ALLOCATIONS_COLLECTION,
            &[Filter::eq("loan_id", loan_id), Filter::live()],
        )
    }

    fn find_by_number(&self, loan_number: &str) -> Result<Option<Loan>> {
        let mut found: Vec<Loan> = self.storage.query(
            LOANS_COLLECTION,
            &[Filter::eq("loan_number", loan_number), Filter::live()],
        )?;
        Ok(found.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::JsonlStorage;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn create_test_store() -> (LoanStore<JsonlStorage>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(JsonlStorage::new(temp_dir.path()).unwrap());
        (LoanStore::new(storage), temp_dir)
    }

    fn proposal(number: &str) -> Loan {
        Loan::new_proposal(number.to_string(), 1, dec!(10000), dec!(5.5), Utc::now())
    }

    #[test]
    fn test_create_and_get_loan() {
        let (store, _temp) = create_test_store();
        let mut loan = proposal("2024/3/1");
        let id = store.create(&mut loan).unwrap();

        let retrieved = store.get_by_id(id).unwrap();
        assert_eq!(retrieved.loan_number, "2024/3/1");
        assert_eq!(retrieved.amount, dec!(10000));
        assert_eq!(retrieved.status, LoanStatus::Proposed);
    }

    #[test]
    fn test_get_missing_loan() {
        let (store, _temp) = create_test_store();
        let err = store.get_by_id(7).unwrap_err();
        assert_eq!(err.to_string(), "loan not found: 7");
    }

    #[test]
    fn test_soft_deleted_loan_is_not_found() {
        let (store, _temp) = create_test_store();
        let mut loan = proposal("2024/3/1");
        loan.deleted_at = Some(Utc::now());
        let id = store.create(&mut loan).unwrap();

        assert!(matches!(store.get_by_id(id), Err(LoanrError::NotFound { .. })));
        assert!(store.find_by_number("2024/3/1").unwrap().is_none());
    }

    #[test]
    fn test_update_by_id_is_conditional() {
        let (store, _temp) = create_test_store();
        let mut loan = proposal("2024/3/1");
        let id = store.create(&mut loan).unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let patch = LoanPatch::new()
            .status(LoanStatus::Approved)
            .approval_employee_id(7)
            .approved_at(date);

        assert!(store.update_by_id(id, LoanStatus::Proposed, patch.clone()).unwrap());
        // Second attempt sees `approved`, not `proposed`
        assert!(!store.update_by_id(id, LoanStatus::Proposed, patch).unwrap());

        let retrieved = store.get_by_id(id).unwrap();
        assert_eq!(retrieved.status, LoanStatus::Approved);
        assert_eq!(retrieved.approval_employee_id, Some(7));
        assert_eq!(retrieved.approved_at, Some(date));
        // Fields outside the patch are preserved
        assert_eq!(retrieved.amount, dec!(10000));
        assert_eq!(retrieved.loan_number, "2024/3/1");
    }

    #[test]
    fn test_update_missing_loan() {
        let (store, _temp) = create_test_store();
        let err = store
            .update_by_id(9, LoanStatus::Proposed, LoanPatch::new().status(LoanStatus::Approved))
            .unwrap_err();
        assert_eq!(err.to_string(), "loan not found: 9");
    }

    #[test]
    fn test_patch_can_clear_fields() {
        let (store, _temp) = create_test_store();
        let mut loan = proposal("2024/3/1");
        loan.status = LoanStatus::Invested;
        loan.invested_at = Some(Utc::now());
        loan.agreement_letter = Some(DocumentRef::new("agreement-letters/a.txt"));
        let id = store.create(&mut loan).unwrap();

        let undo = LoanPatch::new()
            .status(LoanStatus::Approved)
            .invested_at(None)
            .agreement_letter(None);
        assert!(store.update_by_id(id, LoanStatus::Invested, undo).unwrap());

        let retrieved = store.get_by_id(id).unwrap();
        assert_eq!(retrieved.status, LoanStatus::Approved);
        assert!(retrieved.invested_at.is_none());
        assert!(retrieved.agreement_letter.is_none());
    }

    #[test]
    fn test_allocations_by_loan() {
        let (store, _temp) = create_test_store();
        let now = Utc::now();
        let mut rows = vec![
            LoanInvestor::new(1, 10, dec!(6000), now),
            LoanInvestor::new(1, 11, dec!(4000), now),
            LoanInvestor::new(2, 10, dec!(500), now),
        ];
        store.create_allocations(&mut rows).unwrap();

        let first = store.list_allocations(1).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].investor_id, 10);
        assert_eq!(first[1].investment_amount, dec!(4000));
        assert_eq!(store.list_allocations(2).unwrap().len(), 1);
        assert!(store.list_allocations(3).unwrap().is_empty());
    }

    #[test]
    fn test_find_by_number() {
        let (store, _temp) = create_test_store();
        store.create(&mut proposal("2024/3/1")).unwrap();
        store.create(&mut proposal("2024/3/2")).unwrap();

        let found = store.find_by_number("2024/3/2").unwrap().unwrap();
        assert_eq!(found.id, 2);
        assert!(store.find_by_number("2024/3/3").unwrap().is_none());
    }
}
