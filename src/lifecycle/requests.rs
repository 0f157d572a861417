//! Request shapes accepted by the lifecycle engine

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LoanrError, Result};

/// Date format accepted for approval and disbursement dates
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposeLoanRequest {
    pub borrower_id: u64,
    pub amount: Decimal,
    pub interest_rate: Decimal,
}

/// An uploaded file: original name plus content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub file_name: String,
    pub content: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            content: content.into(),
        }
    }

    /// Fails unless the upload carries content
    pub fn require(&self, what: &str) -> Result<()> {
        if self.content.is_empty() {
            return Err(LoanrError::ValidationFailed(format!("{} is required", what)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApproveLoanRequest {
    pub loan_id: u64,
    pub employee_id: u64,
    pub visit_proof: Upload,
    /// `YYYY-MM-DD`
    pub approval_date: String,
}

/// One investor's commitment within an invest request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InvestmentRequest {
    pub investor_id: u64,
    pub amount: Decimal,
}

impl InvestmentRequest {
    pub fn new(investor_id: u64, amount: Decimal) -> Self {
        Self { investor_id, amount }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestLoanRequest {
    pub loan_id: u64,
    pub investors: Vec<InvestmentRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisburseLoanRequest {
    pub loan_id: u64,
    pub employee_id: u64,
    pub signed_agreement: Upload,
    /// `YYYY-MM-DD`
    pub disbursement_date: String,
}

/// Parse a `YYYY-MM-DD` date, naming the field on failure
pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        LoanrError::ValidationFailed(format!("invalid {} {:?}, expected YYYY-MM-DD", field, value))
    })
}
