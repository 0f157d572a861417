//! Investor allocations against a loan

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::storage::HasId;

/// One investor's committed amount against one loan
///
/// Written once by the invest transition and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanInvestor {
    pub id: u64,
    pub loan_id: u64,
    pub investor_id: u64,
    pub investment_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl HasId for LoanInvestor {
    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
}

impl LoanInvestor {
    pub fn new(loan_id: u64, investor_id: u64, investment_amount: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            loan_id,
            investor_id,
            investment_amount,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// Sum of committed amounts, clamped at `Decimal::MAX`
pub fn total_invested(allocations: &[LoanInvestor]) -> Decimal {
    allocations
        .iter()
        .fold(Decimal::ZERO, |total, a| total.saturating_add(a.investment_amount))
}
