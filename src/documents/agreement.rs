//! Agreement letter generation
//!
//! Renders the investment agreement for a funded loan as an A4 PDF and files
//! it in the document store. Any failure here aborts the invest transition.

use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use serde::Serialize;

use super::pdf;
use super::{DocumentKind, DocumentRef, DocumentStore};
use crate::domain::{Loan, LoanInvestor, total_invested};
use crate::error::{LoanrError, Result};

const AGREEMENT_TEMPLATE: &str = r#"LOAN INVESTMENT AGREEMENT LETTER

Date: {{date}}

Loan Details
  Loan Number:      {{loan_number}}
  Loan Amount:      ${{amount}}
  Interest Rate:    {{interest_rate}}%
  Borrower ID:      {{borrower_id}}

Investment Details
{{#each investors}}
Investor {{position}}:
    Investor ID:        {{investor_id}}
    Investment Amount:  ${{amount}}
{{/each}}

Total Investment: ${{total}}

Terms and Conditions
{{#each terms}}
{{this}}
{{/each}}

Signatures

________________________        ________________________
Authorized Officer              Date
"#;

const LETTER_TITLE: &str = "Loan Investment Agreement Letter";

/// Section headings set in bold in the PDF
const HEADINGS: [&str; 4] = [
    "Loan Details",
    "Investment Details",
    "Terms and Conditions",
    "Signatures",
];

/// Fixed terms printed on every agreement.
pub const TERMS: [&str; 5] = [
    "1. The investors agree to invest the specified amounts in the loan.",
    "2. The loan will be disbursed to the borrower after all investment funds are received.",
    "3. The borrower agrees to repay the loan with the specified interest rate.",
    "4. Returns will be distributed to investors proportionally to their investment amounts.",
    "5. This agreement is binding and governed by applicable laws.",
];

/// Long-form date as printed on letters and emails, e.g. "March 1, 2024"
pub fn letter_date(at: DateTime<Utc>) -> String {
    at.format("%B %-d, %Y").to_string()
}

#[derive(Serialize)]
struct InvestorLine {
    position: usize,
    investor_id: u64,
    amount: String,
}

#[derive(Serialize)]
struct AgreementContext<'a> {
    date: String,
    loan_number: &'a str,
    amount: String,
    interest_rate: String,
    borrower_id: u64,
    investors: Vec<InvestorLine>,
    total: String,
    terms: &'static [&'static str],
}

/// Renders and files agreement letters using Handlebars
pub struct AgreementGenerator {
    handlebars: Handlebars<'static>,
}

impl Default for AgreementGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl AgreementGenerator {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        // Plain text output
        handlebars.register_escape_fn(handlebars::no_escape);
        Self { handlebars }
    }

    /// Render the letter text for `loan` and its allocations
    pub fn render(&self, loan: &Loan, allocations: &[LoanInvestor], generated_at: DateTime<Utc>) -> Result<String> {
        let context = AgreementContext {
            date: letter_date(generated_at),
            loan_number: &loan.loan_number,
            amount: format!("{:.2}", loan.amount),
            interest_rate: format!("{:.2}", loan.interest_rate),
            borrower_id: loan.borrower_id,
            investors: allocations
                .iter()
                .enumerate()
                .map(|(i, a)| InvestorLine {
                    position: i + 1,
                    investor_id: a.investor_id,
                    amount: format!("{:.2}", a.investment_amount),
                })
                .collect(),
            total: format!("{:.2}", total_invested(allocations)),
            terms: &TERMS,
        };

        self.handlebars
            .render_template(AGREEMENT_TEMPLATE, &context)
            .map_err(|e| LoanrError::StorageFailure(format!("failed to render agreement letter: {}", e)))
    }

    /// Render the letter and lay it out as PDF bytes
    pub fn render_pdf(&self, loan: &Loan, allocations: &[LoanInvestor], generated_at: DateTime<Utc>) -> Result<Vec<u8>> {
        let text = self.render(loan, allocations, generated_at)?;
        pdf::text_to_pdf(LETTER_TITLE, &text, &HEADINGS)
    }

    /// File name for a letter generated at `generated_at`
    pub fn file_name(loan: &Loan, generated_at: DateTime<Utc>) -> String {
        format!(
            "agreement_{}_{}.pdf",
            loan.loan_number.replace('/', "-"),
            generated_at.timestamp_millis()
        )
    }

    /// Render the letter and write it to `store`
    pub fn generate<D: DocumentStore + ?Sized>(
        &self,
        store: &D,
        loan: &Loan,
        allocations: &[LoanInvestor],
        generated_at: DateTime<Utc>,
    ) -> Result<DocumentRef> {
        let bytes = self.render_pdf(loan, allocations, generated_at)?;
        let name = Self::file_name(loan, generated_at);
        let reference = store.store(DocumentKind::AgreementLetter, &name, &bytes)?;
        log::info!("Generated agreement letter {} for loan {}", reference, loan.loan_number);
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::FsDocumentStore;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn funded_loan() -> (Loan, Vec<LoanInvestor>, DateTime<Utc>) {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();
        let mut loan = Loan::new_proposal("2024/3/4242".into(), 3, dec!(10000), dec!(5.5), at);
        loan.id = 1;
        let allocations = vec![
            LoanInvestor::new(1, 21, dec!(6000), at),
            LoanInvestor::new(1, 22, dec!(4000), at),
        ];
        (loan, allocations, at)
    }

    #[test]
    fn test_letter_date_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(letter_date(at), "March 1, 2024");
    }

    #[test]
    fn test_render_contains_all_blocks() {
        let (loan, allocations, at) = funded_loan();
        let text = AgreementGenerator::new().render(&loan, &allocations, at).unwrap();

        assert!(text.starts_with("LOAN INVESTMENT AGREEMENT LETTER"));
        assert!(text.contains("Date: March 5, 2024"));
        assert!(text.contains("Loan Number:      2024/3/4242"));
        assert!(text.contains("Loan Amount:      $10000.00"));
        assert!(text.contains("Interest Rate:    5.50%"));
        assert!(text.contains("Borrower ID:      3"));
        assert!(text.contains("Investor 1:"));
        assert!(text.contains("Investor ID:        21"));
        assert!(text.contains("Investment Amount:  $6000.00"));
        assert!(text.contains("Investor 2:"));
        assert!(text.contains("Investment Amount:  $4000.00"));
        assert!(text.contains("Total Investment: $10000.00"));
        for term in TERMS {
            assert!(text.contains(term));
        }
        for heading in HEADINGS {
            assert!(text.lines().any(|line| line == heading));
        }
        assert!(text.contains("Authorized Officer"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let (loan, allocations, at) = funded_loan();
        let generator = AgreementGenerator::new();
        assert_eq!(
            generator.render(&loan, &allocations, at).unwrap(),
            generator.render(&loan, &allocations, at).unwrap()
        );
    }

    #[test]
    fn test_generate_writes_to_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsDocumentStore::new(temp_dir.path()).unwrap();
        let (loan, allocations, at) = funded_loan();

        let reference = AgreementGenerator::new()
            .generate(&store, &loan, &allocations, at)
            .unwrap();

        assert_eq!(
            reference.as_str(),
            format!("agreement-letters/agreement_2024-3-4242_{}.pdf", at.timestamp_millis())
        );
        assert_eq!(reference.content_type(), "application/pdf");
        let stored = store.retrieve(&reference).unwrap();
        assert!(stored.starts_with(b"%PDF-"));
    }

    #[test]
    fn test_terms_fit_on_the_page_once_wrapped() {
        let (loan, allocations, at) = funded_loan();
        let text = AgreementGenerator::new().render(&loan, &allocations, at).unwrap();
        for line in text.lines() {
            for piece in pdf::wrap(line, pdf::LINE_WIDTH) {
                assert!(piece.chars().count() <= pdf::LINE_WIDTH, "{}", piece);
            }
        }
    }
}
