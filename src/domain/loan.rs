//! Loan record and its lifecycle status
//!
//! A Loan is the aggregate root of the lifecycle. It advances strictly
//! `proposed -> approved -> invested -> disbursed`.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::documents::DocumentRef;
use crate::storage::HasId;

/// The core Loan record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    //=== Identity ===
    /// Store-assigned identifier (0 until persisted)
    pub id: u64,

    /// Human-readable number, e.g. "2024/3/8674665223082153551"
    pub loan_number: String,

    pub borrower_id: u64,

    //=== Terms ===
    /// Principal to be fully funded by investors
    pub amount: Decimal,

    pub interest_rate: Decimal,

    //=== Lifecycle ===
    pub status: LoanStatus,

    /// Employee who made the field visit (set from `approved` on)
    pub approval_employee_id: Option<u64>,

    /// Employee who handed over the money (set at `disbursed`)
    pub disbursed_employee_id: Option<u64>,

    //=== Documents ===
    pub proof_of_visit: Option<DocumentRef>,
    pub agreement_letter: Option<DocumentRef>,
    pub signed_agreement_letter: Option<DocumentRef>,

    //=== Milestones ===
    pub approved_at: Option<NaiveDate>,
    pub invested_at: Option<DateTime<Utc>>,
    pub disbursed_at: Option<NaiveDate>,

    //=== Timestamps ===
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl HasId for Loan {
    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
}

impl Loan {
    /// Create a new proposed loan (not yet persisted)
    pub fn new_proposal(
        loan_number: String,
        borrower_id: u64,
        amount: Decimal,
        interest_rate: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            loan_number,
            borrower_id,
            amount,
            interest_rate,
            status: LoanStatus::Proposed,
            approval_employee_id: None,
            disbursed_employee_id: None,
            proof_of_visit: None,
            agreement_letter: None,
            signed_agreement_letter: None,
            approved_at: None,
            invested_at: None,
            disbursed_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Status of a loan in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    /// Submitted by the borrower, awaiting field visit
    Proposed,
    /// Field visit done, open for investment
    Approved,
    /// Fully funded, agreement letter issued
    Invested,
    /// Money handed to the borrower
    Disbursed,
}

impl LoanStatus {
    /// Returns true if no further transition exists
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoanStatus::Disbursed)
    }

    /// The single status this one may advance to
    pub fn next(&self) -> Option<LoanStatus> {
        match self {
            LoanStatus::Proposed => Some(LoanStatus::Approved),
            LoanStatus::Approved => Some(LoanStatus::Invested),
            LoanStatus::Invested => Some(LoanStatus::Disbursed),
            LoanStatus::Disbursed => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Proposed => "proposed",
            LoanStatus::Approved => "approved",
            LoanStatus::Invested => "invested",
            LoanStatus::Disbursed => "disbursed",
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle operations that move a loan between statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Propose,
    Approve,
    Invest,
    Disburse,
}

impl Operation {
    /// Status the loan must be in for this operation (None for Propose)
    pub fn required_status(&self) -> Option<LoanStatus> {
        match self {
            Operation::Propose => None,
            Operation::Approve => Some(LoanStatus::Proposed),
            Operation::Invest => Some(LoanStatus::Approved),
            Operation::Disburse => Some(LoanStatus::Invested),
        }
    }

    /// Status the loan ends up in after this operation
    pub fn target_status(&self) -> LoanStatus {
        match self {
            Operation::Propose => LoanStatus::Proposed,
            Operation::Approve => LoanStatus::Approved,
            Operation::Invest => LoanStatus::Invested,
            Operation::Disburse => LoanStatus::Disbursed,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Propose => "propose",
            Operation::Approve => "approve",
            Operation::Invest => "invest",
            Operation::Disburse => "disburse",
        };
        f.write_str(name)
    }
}
