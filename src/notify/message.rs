//! Investor confirmation messages

use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::documents::DocumentRef;
use crate::documents::agreement::letter_date;
use crate::error::{LoanrError, Result};

const CONFIRMATION_TEMPLATE: &str = r#"<html>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
  <h2 style="color: #2c3e50;">Investment Confirmation</h2>
  <p>Dear {{name}},</p>
  <p>Thank you for your investment in our loan program. This email confirms your investment details:</p>
  <table style="border-collapse: collapse; margin: 20px 0;">
    <tr>
      <td style="padding: 8px; border: 1px solid #ddd; background-color: #f9f9f9;"><strong>Loan Number:</strong></td>
      <td style="padding: 8px; border: 1px solid #ddd;">{{loan_number}}</td>
    </tr>
    <tr>
      <td style="padding: 8px; border: 1px solid #ddd; background-color: #f9f9f9;"><strong>Investment Amount:</strong></td>
      <td style="padding: 8px; border: 1px solid #ddd;">${{amount}}</td>
    </tr>
    <tr>
      <td style="padding: 8px; border: 1px solid #ddd; background-color: #f9f9f9;"><strong>Date:</strong></td>
      <td style="padding: 8px; border: 1px solid #ddd;">{{date}}</td>
    </tr>
  </table>
  <p>Please find the loan investment agreement letter attached to this email for your records.</p>
  <p>The loan will be processed and disbursed according to the terms outlined in the agreement. You will receive further updates on the disbursement of the loan.</p>
  <p style="margin-top: 30px;">Best regards,<br><strong>Loan Management Team</strong></p>
  <hr style="border: none; border-top: 1px solid #ddd; margin: 30px 0;">
  <p style="font-size: 12px; color: #777;">This is an automated message. Please do not reply to this email.</p>
</body>
</html>
"#;

/// One confirmation to deliver after a committed investment
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryTask {
    pub recipient_email: String,
    pub recipient_name: String,
    pub loan_number: String,
    pub investment_amount: Decimal,
    pub invested_at: DateTime<Utc>,
    pub agreement: Option<DocumentRef>,
}

/// File attached to an outgoing message
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// A fully composed message ready for a sender
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Serialize)]
struct ConfirmationContext<'a> {
    name: &'a str,
    loan_number: &'a str,
    amount: String,
    date: String,
}

/// Builds confirmation messages from delivery tasks
pub struct MessageComposer {
    handlebars: Handlebars<'static>,
}

impl Default for MessageComposer {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageComposer {
    pub fn new() -> Self {
        // Default escape fn: names and numbers land in HTML
        Self {
            handlebars: Handlebars::new(),
        }
    }

    pub fn subject(loan_number: &str) -> String {
        format!("Investment Confirmation - Loan {}", loan_number)
    }

    pub fn compose(&self, task: &DeliveryTask, attachments: Vec<Attachment>) -> Result<OutgoingMessage> {
        let context = ConfirmationContext {
            name: &task.recipient_name,
            loan_number: &task.loan_number,
            amount: format!("{:.2}", task.investment_amount),
            date: letter_date(task.invested_at),
        };

        let html_body = self
            .handlebars
            .render_template(CONFIRMATION_TEMPLATE, &context)
            .map_err(|e| LoanrError::DeliveryFailure(format!("failed to render confirmation: {}", e)))?;

        Ok(OutgoingMessage {
            to: task.recipient_email.clone(),
            subject: Self::subject(&task.loan_number),
            html_body,
            attachments,
        })
    }
}
