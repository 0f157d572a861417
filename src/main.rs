use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod cli;
mod config;

use cli::Cli;
use cli::commands::{Commands, LoanCommands, PartyArgs, PartyCommands};
use config::Config;
use loanr::documents::FsDocumentStore;
use loanr::domain::{Loan, NewParty};
use loanr::lifecycle::{
    ApproveLoanRequest, DisburseLoanRequest, InvestLoanRequest, InvestmentRequest, LifecycleEngine,
    LoanDetails, ProposeLoanRequest, Upload,
};
use loanr::notify::{DeliveryReport, NotificationDispatcher, SmtpSender};
use loanr::storage::{JsonlStorage, LoanStore, PartyDirectory, PartyStore};

type Parties = PartyStore<JsonlStorage>;
type Engine = LifecycleEngine<LoanStore<JsonlStorage>, Parties, FsDocumentStore>;

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("loanr")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("loanr.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    let storage = Arc::new(JsonlStorage::new(&config.storage.data_dir).context(format!(
        "Failed to open data directory {}",
        config.storage.data_dir.display()
    ))?);
    let parties = Arc::new(
        PartyStore::new(storage.clone()).with_max_number_attempts(config.numbering.max_attempts),
    );

    match &cli.command {
        Commands::Borrower { command } => handle_borrower_command(command, &parties),
        Commands::Employee { command } => handle_employee_command(command, &parties),
        Commands::Investor { command } => handle_investor_command(command, &parties),
        Commands::Loan { command } => handle_loan_command(command, storage, parties, config).await,
    }
}

fn new_party(args: &PartyArgs) -> NewParty {
    NewParty::new(&args.name, &args.phone, &args.email)
}

fn print_party(kind: &str, id: u64, number: &str, name: &str, phone: &str, email: &str) {
    println!("{} {} ({})", kind.cyan().bold(), id, number);
    println!("  Name:   {}", name);
    println!("  Phone:  {}", phone);
    println!("  Email:  {}", email);
}

fn handle_borrower_command(command: &PartyCommands, parties: &Parties) -> Result<()> {
    match command {
        PartyCommands::Register(args) => {
            let borrower = parties
                .register_borrower(&new_party(args))
                .context("Failed to register borrower")?;
            println!(
                "{} borrower {} ({})",
                "Registered".green(),
                borrower.id,
                borrower.borrower_number
            );
        }
        PartyCommands::Show { id } => {
            let b = parties.borrower(*id).context("Failed to load borrower")?;
            print_party("Borrower", b.id, &b.borrower_number, &b.name, &b.phone_number, &b.email);
        }
    }
    Ok(())
}

fn handle_employee_command(command: &PartyCommands, parties: &Parties) -> Result<()> {
    match command {
        PartyCommands::Register(args) => {
            let employee = parties
                .register_employee(&new_party(args))
                .context("Failed to register employee")?;
            println!(
                "{} employee {} ({})",
                "Registered".green(),
                employee.id,
                employee.employee_number
            );
        }
        PartyCommands::Show { id } => {
            let e = parties.employee(*id).context("Failed to load employee")?;
            print_party("Employee", e.id, &e.employee_number, &e.name, &e.phone_number, &e.email);
        }
    }
    Ok(())
}

fn handle_investor_command(command: &PartyCommands, parties: &Parties) -> Result<()> {
    match command {
        PartyCommands::Register(args) => {
            let investor = parties
                .register_investor(&new_party(args))
                .context("Failed to register investor")?;
            println!(
                "{} investor {} ({})",
                "Registered".green(),
                investor.id,
                investor.investor_number
            );
        }
        PartyCommands::Show { id } => {
            let i = parties.investor(*id).context("Failed to load investor")?;
            print_party("Investor", i.id, &i.investor_number, &i.name, &i.phone_number, &i.email);
            println!("  Total invested: ${:.2}", i.total_invested);
        }
    }
    Ok(())
}

async fn handle_loan_command(
    command: &LoanCommands,
    storage: Arc<JsonlStorage>,
    parties: Arc<Parties>,
    config: &Config,
) -> Result<()> {
    let loans = Arc::new(LoanStore::new(storage));
    let documents = Arc::new(FsDocumentStore::new(&config.documents.root).context(format!(
        "Failed to open documents directory {}",
        config.documents.root.display()
    ))?);

    let (dispatcher, worker) = if config.smtp.is_configured() {
        let sender = Arc::new(SmtpSender::new(&config.smtp).context("Failed to configure SMTP")?);
        let (dispatcher, worker) =
            NotificationDispatcher::channel(config.notifications.queue_capacity, sender, documents.clone());
        (dispatcher, Some(worker.spawn()))
    } else {
        info!("SMTP credentials not configured, investor notifications disabled");
        (NotificationDispatcher::disabled(), None)
    };

    let engine = LifecycleEngine::new(loans, parties, documents, dispatcher)
        .with_max_number_attempts(config.numbering.max_attempts);
    let result = run_loan_command(&engine, command).await;

    // Closing the queue lets the worker drain and finish
    drop(engine);
    if let Some(handle) = worker {
        let report = handle.await.context("Notification worker failed")?;
        print_delivery_report(&report);
    }

    result
}

async fn run_loan_command(engine: &Engine, command: &LoanCommands) -> Result<()> {
    match command {
        LoanCommands::Propose { borrower, amount, rate } => {
            info!("Proposing loan for borrower {}", borrower);
            let loan = engine
                .propose(ProposeLoanRequest {
                    borrower_id: *borrower,
                    amount: *amount,
                    interest_rate: *rate,
                })
                .await
                .context("Failed to propose loan")?;
            println!("{} loan {}", "Proposed:".green(), loan.id);
            print_loan(&loan);
        }
        LoanCommands::Approve { id, employee, proof, date } => {
            info!("Approving loan {}", id);
            let loan = engine
                .approve(ApproveLoanRequest {
                    loan_id: *id,
                    employee_id: *employee,
                    visit_proof: read_upload(proof)?,
                    approval_date: date.clone(),
                })
                .await
                .context("Failed to approve loan")?;
            println!("{} loan {}", "Approved:".green(), loan.id);
            print_loan(&loan);
        }
        LoanCommands::Invest { id, allocations } => {
            info!("Investing in loan {} with {} allocation(s)", id, allocations.len());
            let details = engine
                .invest(InvestLoanRequest {
                    loan_id: *id,
                    investors: allocations
                        .iter()
                        .map(|(investor, amount)| InvestmentRequest::new(*investor, *amount))
                        .collect(),
                })
                .await
                .context("Failed to invest in loan")?;
            println!("{} loan {}", "Invested:".green(), details.loan.id);
            print_details(&details);
        }
        LoanCommands::Disburse { id, employee, signed, date } => {
            info!("Disbursing loan {}", id);
            let loan = engine
                .disburse(DisburseLoanRequest {
                    loan_id: *id,
                    employee_id: *employee,
                    signed_agreement: read_upload(signed)?,
                    disbursement_date: date.clone(),
                })
                .await
                .context("Failed to disburse loan")?;
            println!("{} loan {}", "Disbursed:".green(), loan.id);
            print_loan(&loan);
        }
        LoanCommands::Show { id } => {
            let details = engine.details(*id).await.context("Failed to load loan")?;
            print_details(&details);
        }
    }
    Ok(())
}

fn read_upload(path: &Path) -> Result<Upload> {
    let content = fs::read(path).context(format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document")
        .to_string();
    Ok(Upload { file_name, content })
}

fn print_loan(loan: &Loan) {
    println!("  Number:        {}", loan.loan_number);
    println!("  Status:        {}", loan.status.as_str().cyan());
    println!("  Borrower:      {}", loan.borrower_id);
    println!("  Amount:        ${:.2}", loan.amount);
    println!("  Interest rate: {:.2}%", loan.interest_rate);
    if let (Some(employee), Some(date)) = (loan.approval_employee_id, loan.approved_at) {
        println!("  Approved:      {} by employee {}", date, employee);
    }
    if let Some(at) = loan.invested_at {
        println!("  Invested:      {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let (Some(employee), Some(date)) = (loan.disbursed_employee_id, loan.disbursed_at) {
        println!("  Disbursed:     {} by employee {}", date, employee);
    }
    for (label, document) in [
        ("Proof of visit", &loan.proof_of_visit),
        ("Agreement", &loan.agreement_letter),
        ("Signed letter", &loan.signed_agreement_letter),
    ] {
        if let Some(document) = document {
            println!("  {:<15}{}", format!("{}:", label), document);
        }
    }
}

fn print_details(details: &LoanDetails) {
    print_loan(&details.loan);
    if details.allocations.is_empty() {
        return;
    }
    println!("  {}", "Investors:".bold());
    for allocation in &details.allocations {
        println!("    {:>6}  ${:.2}", allocation.investor_id, allocation.investment_amount);
    }
    println!("    {:>6}  ${:.2}", "total", details.total_invested());
}

fn print_delivery_report(report: &DeliveryReport) {
    if report.delivered == 0 && report.failed == 0 {
        return;
    }
    println!(
        "{} {} confirmation(s) sent, {} failed",
        "Notifications:".cyan(),
        report.delivered,
        report.failed
    );
    if report.failed > 0 {
        println!("{}", "See the log for delivery errors".yellow());
    }
}

fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;

    // Run the main application logic
    runtime
        .block_on(run_application(&cli, &config))
        .context("Application failed")?;

    Ok(())
}
