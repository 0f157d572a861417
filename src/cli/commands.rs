//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - borrower / employee / investor: register and look up parties
//! - loan: propose, approve, invest, disburse and show loans

use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Loanr - Peer-funded loan lifecycle from proposal to disbursement
#[derive(Parser, Debug)]
#[command(name = "loanr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage borrowers
    Borrower {
        #[command(subcommand)]
        command: PartyCommands,
    },

    /// Manage employees
    Employee {
        #[command(subcommand)]
        command: PartyCommands,
    },

    /// Manage investors
    Investor {
        #[command(subcommand)]
        command: PartyCommands,
    },

    /// Loan lifecycle operations
    Loan {
        #[command(subcommand)]
        command: LoanCommands,
    },
}

/// Registration and lookup shared by every party kind
#[derive(Subcommand, Debug, Clone)]
pub enum PartyCommands {
    /// Register a new party
    Register(PartyArgs),

    /// Show a registered party
    Show {
        /// Party ID
        id: u64,
    },
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct PartyArgs {
    /// Full name
    #[arg(short, long)]
    pub name: String,

    /// Phone number
    #[arg(short, long)]
    pub phone: String,

    /// Email address
    #[arg(short, long)]
    pub email: String,
}

/// Loan subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum LoanCommands {
    /// Propose a new loan for a borrower
    Propose {
        /// Borrower ID
        #[arg(short, long)]
        borrower: u64,

        /// Principal amount
        #[arg(short, long)]
        amount: Decimal,

        /// Interest rate in percent
        #[arg(short, long)]
        rate: Decimal,
    },

    /// Approve a proposed loan after the field visit
    Approve {
        /// Loan ID
        id: u64,

        /// Employee who made the visit
        #[arg(short, long)]
        employee: u64,

        /// Photo or scan proving the visit
        #[arg(short, long)]
        proof: PathBuf,

        /// Approval date (YYYY-MM-DD)
        #[arg(short, long)]
        date: String,
    },

    /// Fund an approved loan
    Invest {
        /// Loan ID
        id: u64,

        /// Investor allocation as INVESTOR_ID:AMOUNT (repeatable)
        #[arg(short, long = "allocation", value_parser = parse_allocation, required = true)]
        allocations: Vec<(u64, Decimal)>,
    },

    /// Disburse an invested loan
    Disburse {
        /// Loan ID
        id: u64,

        /// Employee handing over the money
        #[arg(short, long)]
        employee: u64,

        /// Agreement letter signed by the borrower
        #[arg(short, long)]
        signed: PathBuf,

        /// Disbursement date (YYYY-MM-DD)
        #[arg(short, long)]
        date: String,
    },

    /// Show a loan and its allocations
    Show {
        /// Loan ID
        id: u64,
    },
}

/// Parse `INVESTOR_ID:AMOUNT`
pub fn parse_allocation(value: &str) -> Result<(u64, Decimal), String> {
    let (investor, amount) = value
        .split_once(':')
        .ok_or_else(|| format!("expected INVESTOR_ID:AMOUNT, got {:?}", value))?;
    let investor = investor
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid investor id {:?}: {}", investor, e))?;
    let amount = amount
        .trim()
        .parse::<Decimal>()
        .map_err(|e| format!("invalid amount {:?}: {}", amount, e))?;
    Ok((investor, amount))
}
