//! Borrowers, employees and investors
//!
//! These are plain registration records. The lifecycle engine only reads
//! them, apart from the informational investor running total.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LoanrError, Result};
use crate::storage::HasId;

/// Registration input shared by every party kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewParty {
    pub name: String,
    pub phone_number: String,
    pub email: String,
}

impl NewParty {
    pub fn new(
        name: impl Into<String>,
        phone_number: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            phone_number: phone_number.into(),
            email: email.into(),
        }
    }

    /// Check required fields, returning a trimmed copy
    pub fn validated(&self) -> Result<NewParty> {
        let name = self.name.trim();
        let phone_number = self.phone_number.trim();
        let email = self.email.trim();

        if name.is_empty() {
            return Err(LoanrError::ValidationFailed("name is required".into()));
        }
        if phone_number.is_empty() {
            return Err(LoanrError::ValidationFailed("phone number is required".into()));
        }
        if email.is_empty() || !email.contains('@') {
            return Err(LoanrError::ValidationFailed(format!(
                "invalid email address: {:?}",
                self.email
            )));
        }

        Ok(NewParty::new(name, phone_number, email))
    }
}

/// Someone who asks for a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Borrower {
    pub id: u64,
    pub borrower_number: String,
    pub name: String,
    pub phone_number: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Staff member who approves or disburses loans
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: u64,
    pub employee_number: String,
    pub name: String,
    pub phone_number: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Someone who funds loans
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investor {
    pub id: u64,
    pub investor_number: String,
    pub name: String,
    pub phone_number: String,
    pub email: String,
    /// Informational only, never consulted by allocation checks
    pub total_invested: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

macro_rules! impl_has_id {
    ($($ty:ty),*) => {
        $(
            impl HasId for $ty {
                fn id(&self) -> u64 {
                    self.id
                }

                fn set_id(&mut self, id: u64) {
                    self.id = id;
                }
            }
        )*
    };
}

impl_has_id!(Borrower, Employee, Investor);

impl Borrower {
    pub fn new(number: String, party: NewParty, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            borrower_number: number,
            name: party.name,
            phone_number: party.phone_number,
            email: party.email,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

impl Employee {
    pub fn new(number: String, party: NewParty, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            employee_number: number,
            name: party.name,
            phone_number: party.phone_number,
            email: party.email,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

impl Investor {
    pub fn new(number: String, party: NewParty, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            investor_number: number,
            name: party.name,
            phone_number: party.phone_number,
            email: party.email,
            total_invested: Decimal::ZERO,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}
