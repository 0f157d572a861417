//! Text-to-PDF layout for generated letters
//!
//! Lays rendered text out on A4 pages in the built-in Courier faces.

use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};

use crate::error::{LoanrError, Result};

const PAGE_WIDTH: Mm = Mm(210.0);
const PAGE_HEIGHT: Mm = Mm(297.0);
const MARGIN_MM: f32 = 20.0;
const LINE_HEIGHT_MM: f32 = 5.0;
const LAYER: &str = "Layer 1";

const TITLE_SIZE: f32 = 14.0;
const HEADING_SIZE: f32 = 11.0;
const BODY_SIZE: f32 = 10.0;

/// Characters of 10pt Courier that fit between the margins
pub const LINE_WIDTH: usize = 78;

/// Split `line` on word boundaries so no piece exceeds `width` characters.
///
/// Continuations keep the original indentation plus two spaces. A single
/// word longer than `width` is left whole.
pub fn wrap(line: &str, width: usize) -> Vec<String> {
    if line.chars().count() <= width {
        return vec![line.to_string()];
    }

    let indent_len = line.len() - line.trim_start().len();
    let continuation = format!("{}  ", &line[..indent_len]);

    let mut lines = Vec::new();
    let mut current = line[..indent_len].to_string();
    let mut has_word = false;
    for word in line.split_whitespace() {
        let needed = current.chars().count() + usize::from(has_word) + word.chars().count();
        if has_word && needed > width {
            lines.push(std::mem::replace(&mut current, continuation.clone()));
            has_word = false;
        }
        if has_word {
            current.push(' ');
        }
        current.push_str(word);
        has_word = true;
    }
    lines.push(current);
    lines
}

fn pdf_error(e: printpdf::Error) -> LoanrError {
    LoanrError::StorageFailure(format!("failed to build PDF: {}", e))
}

/// Lay `text` out as an A4 PDF.
///
/// The first line is set as the title and lines equal to one of `headings`
/// are set in bold. Pages are added as the text runs past the bottom margin.
pub fn text_to_pdf(title: &str, text: &str, headings: &[&str]) -> Result<Vec<u8>> {
    let (doc, page, layer) = PdfDocument::new(title, PAGE_WIDTH, PAGE_HEIGHT, LAYER);
    let regular = doc.add_builtin_font(BuiltinFont::Courier).map_err(pdf_error)?;
    let bold = doc.add_builtin_font(BuiltinFont::CourierBold).map_err(pdf_error)?;

    let mut current: PdfLayerReference = doc.get_page(page).get_layer(layer);
    let top = PAGE_HEIGHT.0 - MARGIN_MM;
    let mut y = top;
    let mut pages = 1;

    for (index, source) in text.lines().enumerate() {
        let (font, size): (&IndirectFontRef, f32) = if index == 0 {
            (&bold, TITLE_SIZE)
        } else if headings.contains(&source.trim()) {
            (&bold, HEADING_SIZE)
        } else {
            (&regular, BODY_SIZE)
        };

        for line in wrap(source.trim_end(), LINE_WIDTH) {
            if y < MARGIN_MM {
                let (next_page, next_layer) = doc.add_page(PAGE_WIDTH, PAGE_HEIGHT, LAYER);
                current = doc.get_page(next_page).get_layer(next_layer);
                y = top;
                pages += 1;
            }
            if !line.is_empty() {
                current.use_text(line, size, Mm(MARGIN_MM), Mm(y), font);
            }
            y -= LINE_HEIGHT_MM;
        }
        if index == 0 {
            y -= LINE_HEIGHT_MM;
        }
    }

    drop(current);
    log::debug!("Laid out \"{}\" on {} page(s)", title, pages);
    doc.save_to_bytes().map_err(pdf_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_line_is_untouched() {
        assert_eq!(wrap("  Loan Number: 2024/3/1", LINE_WIDTH), vec!["  Loan Number: 2024/3/1"]);
        assert_eq!(wrap("", LINE_WIDTH), vec![""]);
    }

    #[test]
    fn test_long_line_wraps_on_words() {
        let lines = wrap("1. The loan will be disbursed to the borrower after funds arrive.", 30);
        assert_eq!(
            lines,
            vec![
                "1. The loan will be disbursed",
                "  to the borrower after funds",
                "  arrive.",
            ]
        );
        assert!(lines.iter().all(|l| l.chars().count() <= 30));
    }

    #[test]
    fn test_wrap_keeps_indentation() {
        let lines = wrap("    alpha beta gamma delta", 16);
        assert_eq!(lines, vec!["    alpha beta", "      gamma", "      delta"]);
    }

    #[test]
    fn test_overlong_word_stays_whole() {
        let lines = wrap("see averyveryverylongword here", 10);
        assert_eq!(lines, vec!["see", "  averyveryverylongword", "  here"]);
    }

    #[test]
    fn test_text_to_pdf_produces_pdf() {
        let bytes = text_to_pdf("Letter", "TITLE\n\nHeading\nbody line\n", &["Heading"]).unwrap();
        assert!(bytes.starts_with(b"%PDF-"));
    }

    #[test]
    fn test_long_text_spans_pages() {
        let text: String = (0..200).map(|i| format!("line {}\n", i)).collect();
        let one_page = text_to_pdf("Short", "only line", &[]).unwrap();
        let many_pages = text_to_pdf("Long", &text, &[]).unwrap();
        assert!(many_pages.len() > one_page.len());
    }
}
