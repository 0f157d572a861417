//! Investment allocation checks
//!
//! `validate_shape` needs no I/O and runs before anything is read or written.
//! `check_total` runs once every investor is known to exist.

use std::collections::HashSet;

use rust_decimal::Decimal;

use super::requests::InvestmentRequest;
use crate::error::{LoanrError, Result};

/// Reject an empty set, non-positive amounts and repeated investors
pub fn validate_shape(investors: &[InvestmentRequest]) -> Result<()> {
    if investors.is_empty() {
        return Err(LoanrError::ValidationFailed(
            "at least one investor is required".into(),
        ));
    }

    let mut seen = HashSet::new();
    for request in investors {
        if request.amount <= Decimal::ZERO {
            return Err(LoanrError::ValidationFailed(format!(
                "investment amount must be positive for investor {}",
                request.investor_id
            )));
        }
        if !seen.insert(request.investor_id) {
            return Err(LoanrError::ValidationFailed(format!(
                "investor {} appears more than once",
                request.investor_id
            )));
        }
    }

    Ok(())
}

/// Sum of the requested amounts, failing if it leaves the `Decimal` range
pub fn requested_total(investors: &[InvestmentRequest]) -> Result<Decimal> {
    investors
        .iter()
        .try_fold(Decimal::ZERO, |total, r| total.checked_add(r.amount))
        .ok_or_else(|| LoanrError::ValidationFailed("investment total is out of range".into()))
}

/// The requested amounts must add up to the principal exactly
pub fn check_total(principal: Decimal, investors: &[InvestmentRequest]) -> Result<Decimal> {
    let total = requested_total(investors)?;
    if total != principal {
        return Err(LoanrError::AllocationMismatch { total, principal });
    }
    Ok(total)
}
