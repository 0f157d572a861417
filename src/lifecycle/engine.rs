//! Loan lifecycle engine
//!
//! Drives a loan through `proposed -> approved -> invested -> disbursed`.
//! Each transition first validates its input, then checks the current
//! status, and finally commits under the per-loan lock with a conditional
//! status write. Allocation rows are written only after the invest status
//! write succeeds, and are compensated if they cannot be written.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use super::allocation;
use super::locks::LoanLocks;
use super::requests::{
    ApproveLoanRequest, DisburseLoanRequest, InvestLoanRequest, ProposeLoanRequest, Upload,
    parse_date,
};
use crate::documents::{AgreementGenerator, DocumentKind, DocumentRef, DocumentStore};
use crate::domain::{Investor, Loan, LoanInvestor, LoanStatus, Operation};
use crate::error::{LoanrError, Result};
use crate::notify::{DeliveryTask, NotificationDispatcher};
use crate::numbering;
use crate::storage::{LoanPatch, LoanRepository, PartyDirectory};

/// Default attempts at finding an unused loan number
const DEFAULT_NUMBER_ATTEMPTS: u32 = 5;

/// A loan together with its allocation rows
#[derive(Debug, Clone, PartialEq)]
pub struct LoanDetails {
    pub loan: Loan,
    pub allocations: Vec<LoanInvestor>,
}

impl LoanDetails {
    pub fn total_invested(&self) -> Decimal {
        crate::domain::total_invested(&self.allocations)
    }
}

/// Runs lifecycle operations against the repositories it was built with
pub struct LifecycleEngine<R: LoanRepository, P: PartyDirectory, D: DocumentStore> {
    loans: Arc<R>,
    parties: Arc<P>,
    documents: Arc<D>,
    agreements: AgreementGenerator,
    dispatcher: NotificationDispatcher,
    locks: LoanLocks,
    max_number_attempts: u32,
}

impl<R: LoanRepository, P: PartyDirectory, D: DocumentStore> LifecycleEngine<R, P, D> {
    pub fn new(loans: Arc<R>, parties: Arc<P>, documents: Arc<D>, dispatcher: NotificationDispatcher) -> Self {
        Self {
            loans,
            parties,
            documents,
            agreements: AgreementGenerator::new(),
            dispatcher,
            locks: LoanLocks::new(),
            max_number_attempts: DEFAULT_NUMBER_ATTEMPTS,
        }
    }

    pub fn with_max_number_attempts(mut self, attempts: u32) -> Self {
        self.max_number_attempts = attempts;
        self
    }

    /// Create a loan in `proposed` status for an existing borrower
    pub async fn propose(&self, request: ProposeLoanRequest) -> Result<Loan> {
        if request.amount <= Decimal::ZERO {
            return Err(LoanrError::ValidationFailed("loan amount must be positive".into()));
        }
        if request.interest_rate < Decimal::ZERO {
            return Err(LoanrError::ValidationFailed("interest rate must not be negative".into()));
        }

        self.parties.borrower(request.borrower_id)?;

        let now = Utc::now();
        let loan_number = numbering::generate_unique(now, self.max_number_attempts, |candidate| {
            Ok(self.loans.find_by_number(candidate)?.is_some())
        })?;

        let mut loan = Loan::new_proposal(
            loan_number,
            request.borrower_id,
            request.amount,
            request.interest_rate,
            now,
        );
        self.loans.create(&mut loan)?;

        log::info!(
            "Proposed loan {} ({}) for borrower {}: amount {}, rate {}%",
            loan.id,
            loan.loan_number,
            loan.borrower_id,
            loan.amount,
            loan.interest_rate
        );
        Ok(loan)
    }

    /// Record the field visit and move a proposed loan to `approved`
    pub async fn approve(&self, request: ApproveLoanRequest) -> Result<Loan> {
        let approved_at = parse_date("approval date", &request.approval_date)?;
        request.visit_proof.require("proof of visit")?;

        let loan = self.loans.get_by_id(request.loan_id)?;
        expect_status(&loan, Operation::Approve)?;
        self.parties.employee(request.employee_id)?;

        let proof = self.store_upload(&loan, DocumentKind::VisitProof, &request.visit_proof)?;

        let patch = LoanPatch::new()
            .approval_employee_id(request.employee_id)
            .proof_of_visit(&proof)
            .approved_at(approved_at);
        let loan = self.commit(loan.id, Operation::Approve, patch).await?;

        log::info!(
            "Approved loan {} by employee {} on {}",
            loan.loan_number,
            request.employee_id,
            approved_at
        );
        Ok(loan)
    }

    /// Allocate the principal across investors and move the loan to `invested`
    ///
    /// Confirmations are queued after the commit and never affect the result.
    pub async fn invest(&self, request: InvestLoanRequest) -> Result<LoanDetails> {
        allocation::validate_shape(&request.investors)?;

        let loan = self.loans.get_by_id(request.loan_id)?;
        expect_status(&loan, Operation::Invest)?;

        let investors = request
            .investors
            .iter()
            .map(|r| self.parties.investor(r.investor_id))
            .collect::<Result<Vec<Investor>>>()?;
        allocation::check_total(loan.amount, &request.investors)?;

        let now = Utc::now();
        let mut rows: Vec<LoanInvestor> = request
            .investors
            .iter()
            .map(|r| LoanInvestor::new(loan.id, r.investor_id, r.amount, now))
            .collect();

        let agreement = self
            .agreements
            .generate(&*self.documents, &loan, &rows, now)?;

        let loan = {
            let _guard = self.locks.acquire(loan.id).await;
            let current = self.loans.get_by_id(loan.id)?;
            expect_status(&current, Operation::Invest)?;

            let patch = LoanPatch::new()
                .status(LoanStatus::Invested)
                .invested_at(Some(now))
                .agreement_letter(Some(&agreement));
            if !self.loans.update_by_id(loan.id, LoanStatus::Approved, patch)? {
                return Err(self.lost_race(loan.id, Operation::Invest));
            }

            if let Err(e) = self.loans.create_allocations(&mut rows) {
                self.undo_invest(loan.id);
                return Err(match e {
                    LoanrError::StorageFailure(_) => e,
                    other => LoanrError::StorageFailure(format!(
                        "failed to record allocations for loan {}: {}",
                        loan.id, other
                    )),
                });
            }

            self.loans.get_by_id(loan.id)?
        };

        log::info!(
            "Loan {} invested by {} investor(s), agreement {}",
            loan.loan_number,
            rows.len(),
            agreement
        );

        for (row, investor) in rows.iter().zip(&investors) {
            if let Err(e) = self.parties.record_investment(row.investor_id, row.investment_amount) {
                log::warn!("Failed to update total for investor {}: {}", row.investor_id, e);
            }
            self.dispatcher.dispatch(DeliveryTask {
                recipient_email: investor.email.clone(),
                recipient_name: investor.name.clone(),
                loan_number: loan.loan_number.clone(),
                investment_amount: row.investment_amount,
                invested_at: now,
                agreement: Some(agreement.clone()),
            });
        }

        Ok(LoanDetails {
            loan,
            allocations: rows,
        })
    }

    /// Record the hand-over and move an invested loan to `disbursed`
    pub async fn disburse(&self, request: DisburseLoanRequest) -> Result<Loan> {
        let disbursed_at = parse_date("disbursement date", &request.disbursement_date)?;
        request.signed_agreement.require("signed agreement letter")?;

        let loan = self.loans.get_by_id(request.loan_id)?;
        expect_status(&loan, Operation::Disburse)?;
        self.parties.employee(request.employee_id)?;

        let signed = self.store_upload(&loan, DocumentKind::SignedAgreement, &request.signed_agreement)?;

        let patch = LoanPatch::new()
            .disbursed_employee_id(request.employee_id)
            .signed_agreement_letter(&signed)
            .disbursed_at(disbursed_at);
        let loan = self.commit(loan.id, Operation::Disburse, patch).await?;

        log::info!(
            "Disbursed loan {} by employee {} on {}",
            loan.loan_number,
            request.employee_id,
            disbursed_at
        );
        Ok(loan)
    }

    /// The loan and its allocation rows
    pub async fn details(&self, loan_id: u64) -> Result<LoanDetails> {
        let loan = self.loans.get_by_id(loan_id)?;
        let allocations = self.loans.list_allocations(loan_id)?;
        Ok(LoanDetails { loan, allocations })
    }

    fn store_upload(&self, loan: &Loan, kind: DocumentKind, upload: &Upload) -> Result<DocumentRef> {
        let name = format!(
            "{}_{}_{}",
            loan.id,
            Utc::now().timestamp_millis(),
            upload.file_name
        );
        self.documents.store(kind, &name, &upload.content)
    }

    /// Re-check the status under the loan's lock and apply `patch` conditionally
    async fn commit(&self, loan_id: u64, operation: Operation, patch: LoanPatch) -> Result<Loan> {
        let _guard = self.locks.acquire(loan_id).await;

        let current = self.loans.get_by_id(loan_id)?;
        let expected = expect_status(&current, operation)?;

        let patch = patch.status(operation.target_status());
        if !self.loans.update_by_id(loan_id, expected, patch)? {
            return Err(self.lost_race(loan_id, operation));
        }

        self.loans.get_by_id(loan_id)
    }

    /// Error for a conditional write that matched nothing
    fn lost_race(&self, loan_id: u64, operation: Operation) -> LoanrError {
        match self.loans.get_by_id(loan_id) {
            Ok(current) => {
                log::debug!(
                    "Conditional {} write on loan {} lost to a concurrent change",
                    operation,
                    loan_id
                );
                LoanrError::InvalidStateTransition {
                    loan_id,
                    operation,
                    status: current.status,
                }
            }
            Err(e) => e,
        }
    }

    fn undo_invest(&self, loan_id: u64) {
        let undo = LoanPatch::new()
            .status(LoanStatus::Approved)
            .invested_at(None)
            .agreement_letter(None);
        match self.loans.update_by_id(loan_id, LoanStatus::Invested, undo) {
            Ok(true) => log::warn!("Rolled loan {} back to approved after allocation failure", loan_id),
            Ok(false) => log::error!("Loan {} changed before invest rollback", loan_id),
            Err(e) => log::error!("Failed to roll back invest on loan {}: {}", loan_id, e),
        }
    }
}

/// Status `loan` must be in for `operation`, or the transition error
fn expect_status(loan: &Loan, operation: Operation) -> Result<LoanStatus> {
    match operation.required_status() {
        Some(required) if loan.status == required => Ok(required),
        _ => Err(LoanrError::InvalidStateTransition {
            loan_id: loan.id,
            operation,
            status: loan.status,
        }),
    }
}
