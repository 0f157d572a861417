//! Loan lifecycle integration tests
//!
//! Drives loans end to end over JSONL storage and the filesystem document
//! store, with a recording message sender standing in for SMTP.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use loanr::documents::{DocumentStore, FsDocumentStore};
use loanr::domain::{LoanStatus, NewParty};
use loanr::error::{LoanrError, Result};
use loanr::lifecycle::{
    ApproveLoanRequest, DisburseLoanRequest, InvestLoanRequest, InvestmentRequest, LifecycleEngine,
    ProposeLoanRequest, Upload,
};
use loanr::notify::{MessageSender, NotificationDispatcher, OutgoingMessage};
use loanr::storage::{JsonlStorage, LoanRepository, LoanStore, PartyDirectory, PartyStore};
use rust_decimal_macros::dec;
use tempfile::TempDir;

type Engine = LifecycleEngine<LoanStore<JsonlStorage>, PartyStore<JsonlStorage>, FsDocumentStore>;

/// Sender that keeps every message it is handed
#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<OutgoingMessage>>,
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

struct Parties {
    borrower: u64,
    employee: u64,
    investor_a: u64,
    investor_b: u64,
}

fn open(root: &Path) -> Result<(Arc<LoanStore<JsonlStorage>>, Arc<PartyStore<JsonlStorage>>, Arc<FsDocumentStore>)> {
    let storage = Arc::new(JsonlStorage::new(root.join("data"))?);
    Ok((
        Arc::new(LoanStore::new(storage.clone())),
        Arc::new(PartyStore::new(storage)),
        Arc::new(FsDocumentStore::new(root.join("uploads"))?),
    ))
}

fn register(parties: &PartyStore<JsonlStorage>) -> Result<Parties> {
    Ok(Parties {
        borrower: parties
            .register_borrower(&NewParty::new("Siti Rahma", "+62 811 000", "siti@example.com"))?
            .id,
        employee: parties
            .register_employee(&NewParty::new("Rudi Hartono", "+62 812 000", "rudi@example.com"))?
            .id,
        investor_a: parties
            .register_investor(&NewParty::new("Budi Santoso", "+62 813 000", "budi@example.com"))?
            .id,
        investor_b: parties
            .register_investor(&NewParty::new("Ani Wijaya", "+62 814 000", "ani@example.com"))?
            .id,
    })
}

fn propose(p: &Parties) -> ProposeLoanRequest {
    ProposeLoanRequest {
        borrower_id: p.borrower,
        amount: dec!(10000),
        interest_rate: dec!(5.5),
    }
}

fn approve(p: &Parties, loan_id: u64) -> ApproveLoanRequest {
    ApproveLoanRequest {
        loan_id,
        employee_id: p.employee,
        visit_proof: Upload::new("visit.jpg", b"\xff\xd8 jpeg".to_vec()),
        approval_date: "2024-03-01".into(),
    }
}

fn invest(loan_id: u64, investors: &[(u64, rust_decimal::Decimal)]) -> InvestLoanRequest {
    InvestLoanRequest {
        loan_id,
        investors: investors
            .iter()
            .map(|(id, amount)| InvestmentRequest::new(*id, *amount))
            .collect(),
    }
}

fn disburse(p: &Parties, loan_id: u64) -> DisburseLoanRequest {
    DisburseLoanRequest {
        loan_id,
        employee_id: p.employee,
        signed_agreement: Upload::new("signed agreement.pdf", b"%PDF signed".to_vec()),
        disbursement_date: "2024-03-10".into(),
    }
}

/// Integration test: a loan travels from proposal to disbursement
#[tokio::test]
async fn test_full_lifecycle_with_notifications() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (loans, parties, documents) = open(temp_dir.path())?;
    let p = register(&parties)?;

    let sender = Arc::new(RecordingSender::default());
    let (dispatcher, worker) = NotificationDispatcher::channel(8, sender.clone(), documents.clone());
    let worker = worker.spawn();
    let engine: Engine = LifecycleEngine::new(loans.clone(), parties.clone(), documents.clone(), dispatcher);

    // Propose
    let loan = engine.propose(propose(&p)).await?;
    assert_eq!(loan.status, LoanStatus::Proposed);
    assert_eq!(loan.amount, dec!(10000));

    // Approve
    let loan = engine.approve(approve(&p, loan.id)).await?;
    assert_eq!(loan.status, LoanStatus::Approved);
    assert_eq!(loan.approved_at, NaiveDate::from_ymd_opt(2024, 3, 1));

    // Invest
    let details = engine
        .invest(invest(loan.id, &[(p.investor_a, dec!(6000)), (p.investor_b, dec!(4000))]))
        .await?;
    assert_eq!(details.loan.status, LoanStatus::Invested);
    assert_eq!(details.allocations.len(), 2);
    let letter = details.loan.agreement_letter.clone().unwrap();
    assert!(letter.file_name().ends_with(".pdf"));

    // Disburse
    let loan = engine.disburse(disburse(&p, loan.id)).await?;
    assert_eq!(loan.status, LoanStatus::Disbursed);
    let signed = loan.signed_agreement_letter.clone().unwrap();
    assert_eq!(documents.retrieve(&signed)?, b"%PDF signed");

    drop(engine);
    let report = worker.await.unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 0);

    let sent = sender.sent.lock().unwrap();
    let recipients: Vec<&str> = sent.iter().map(|m| m.to.as_str()).collect();
    assert_eq!(recipients, vec!["budi@example.com", "ani@example.com"]);
    for message in sent.iter() {
        assert_eq!(
            message.subject,
            format!("Investment Confirmation - Loan {}", loan.loan_number)
        );
        assert_eq!(message.attachments.len(), 1);
        assert_eq!(message.attachments[0].file_name, letter.file_name());
        assert_eq!(message.attachments[0].content_type, "application/pdf");
        assert!(message.attachments[0].content.starts_with(b"%PDF-"));
    }
    assert!(sent[0].html_body.contains("Dear Budi Santoso,"));
    assert!(sent[0].html_body.contains("$6000.00"));
    assert!(sent[1].html_body.contains("$4000.00"));

    Ok(())
}

/// Integration test: state survives reopening the stores
#[tokio::test]
async fn test_state_persists_across_reopen() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let (loan_id, p) = {
        let (loans, parties, documents) = open(temp_dir.path())?;
        let p = register(&parties)?;
        let engine: Engine = LifecycleEngine::new(loans, parties, documents, NotificationDispatcher::disabled());
        let loan = engine.propose(propose(&p)).await?;
        engine.approve(approve(&p, loan.id)).await?;
        engine
            .invest(invest(loan.id, &[(p.investor_a, dec!(2500)), (p.investor_b, dec!(7500))]))
            .await?;
        (loan.id, p)
    };

    let (loans, parties, documents) = open(temp_dir.path())?;
    let engine: Engine = LifecycleEngine::new(loans.clone(), parties.clone(), documents, NotificationDispatcher::disabled());

    let details = engine.details(loan_id).await?;
    assert_eq!(details.loan.status, LoanStatus::Invested);
    assert_eq!(details.total_invested(), dec!(10000));
    assert_eq!(loans.list_allocations(loan_id)?.len(), 2);
    assert_eq!(parties.investor(p.investor_b)?.total_invested, dec!(7500));

    let loan = engine.disburse(disburse(&p, loan_id)).await?;
    assert_eq!(loan.status, LoanStatus::Disbursed);

    Ok(())
}

/// Integration test: rejected operations leave the stored loan untouched
#[tokio::test]
async fn test_rejections_do_not_mutate() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (loans, parties, documents) = open(temp_dir.path())?;
    let p = register(&parties)?;
    let engine: Engine = LifecycleEngine::new(loans.clone(), parties, documents, NotificationDispatcher::disabled());

    let loan = engine.propose(propose(&p)).await?;

    // Disburse while proposed
    let err = engine.disburse(disburse(&p, loan.id)).await.unwrap_err();
    assert!(matches!(
        err,
        LoanrError::InvalidStateTransition {
            status: LoanStatus::Proposed,
            ..
        }
    ));
    assert_eq!(loans.get_by_id(loan.id)?, loan);

    // Under-funded invest on an approved loan
    let approved = engine.approve(approve(&p, loan.id)).await?;
    let err = engine
        .invest(invest(loan.id, &[(p.investor_a, dec!(5000))]))
        .await
        .unwrap_err();
    assert!(matches!(err, LoanrError::AllocationMismatch { .. }));
    assert_eq!(loans.get_by_id(loan.id)?, approved);
    assert!(loans.list_allocations(loan.id)?.is_empty());

    // Unknown loan
    let err = engine.details(404).await.unwrap_err();
    assert_eq!(err.to_string(), "loan not found: 404");

    Ok(())
}

/// Integration test: loans on different ids progress independently
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_loans_do_not_interfere() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (loans, parties, documents) = open(temp_dir.path())?;
    let p = Arc::new(register(&parties)?);
    let engine: Arc<Engine> = Arc::new(LifecycleEngine::new(
        loans,
        parties,
        documents,
        NotificationDispatcher::disabled(),
    ));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = engine.clone();
        let p = p.clone();
        handles.push(tokio::spawn(async move {
            let loan = engine.propose(propose(&p)).await?;
            engine.approve(approve(&p, loan.id)).await?;
            engine
                .invest(invest(loan.id, &[(p.investor_a, dec!(4000)), (p.investor_b, dec!(6000))]))
                .await?;
            engine.disburse(disburse(&p, loan.id)).await
        }));
    }

    for handle in handles {
        let loan = handle.await.unwrap()?;
        assert_eq!(loan.status, LoanStatus::Disbursed);
        assert_eq!(engine.details(loan.id).await?.allocations.len(), 2);
    }

    Ok(())
}
