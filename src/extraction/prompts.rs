//! Prompts for invoice extraction and batch category classification.
//!
//! Every prompt lives here so behavior changes touch exactly one place and
//! unit tests can inspect the text without a live model call.

use crate::extraction::types::ExtractedItem;

/// System prompt for extracting one photographed invoice into JSON.
pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"You are an expert at reading photographed paper invoices from wholesale suppliers.

Extract the invoice into a single JSON object with exactly these keys:
  supplier, document_type, invoice_number, invoice_date (ISO 8601),
  client_name, total_excl_tax, total_tax, total_incl_tax,
  delivery_location, items.

"items" is an array of objects with keys:
  reference, designation, quantity, unit_price, line_total, depot.

Rules:
- Use null for any field you cannot read with confidence. Never invent values.
- Amounts are plain decimal numbers without currency symbols or thousand separators.
- "reference" is the product code printed on the line; keep it verbatim.
- Output ONLY the JSON object. No commentary, no markdown fences."#;

/// Instruction added when the document spans several photographed pages.
/// The client owns this framing, not the caller: all pages are one logical
/// invoice and their line items must be merged into a single "items" array.
pub const MULTI_PAGE_SUFFIX: &str = r#"

The images are consecutive pages of ONE single invoice, in order.
Treat them as one document: merge all line items from every page into a
single "items" array and read the header fields from whichever page shows
them. Return exactly one JSON object."#;

/// User prompt for the extraction call.
pub fn extraction_prompt(page_count: usize) -> String {
    let mut prompt = EXTRACTION_SYSTEM_PROMPT.to_string();
    if page_count > 1 {
        prompt.push_str(MULTI_PAGE_SUFFIX);
    }
    prompt
}

/// Batch classification prompt: distinct items plus the current category
/// tree. The model answers with a JSON array, one entry per listed item.
pub fn classification_prompt(
    items: &[&ExtractedItem],
    categories: &[(uuid::Uuid, String, String)],
) -> String {
    let mut prompt = String::from(
        "You classify wholesale products into a category tree.\n\nKnown categories (id | code | name):\n",
    );
    for (id, code, name) in categories {
        prompt.push_str(&format!("- {} | {} | {}\n", id, code, name));
    }
    prompt.push_str("\nProducts to classify (reference | designation):\n");
    for item in items {
        prompt.push_str(&format!("- {} | {}\n", item.reference, item.designation));
    }
    prompt.push_str(
        r#"
Answer with ONLY a JSON array, one object per product, in the same order:
  {"reference": ..., "designation": ..., "category_id": <id of a known category or null>,
   "new_category_code": <UPPER_SNAKE code or null>, "new_category_name": <name or null>}

Use an existing category whenever one fits. Suggest a new category only when
nothing fits, and reuse the same code for products that belong together."#,
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_page_prompt_has_no_merge_framing() {
        let p = extraction_prompt(1);
        assert!(!p.contains("consecutive pages"));
    }

    #[test]
    fn multi_page_prompt_instructs_merging() {
        let p = extraction_prompt(3);
        assert!(p.contains("ONE single invoice"));
        assert!(p.contains("merge all line items"));
    }

    #[test]
    fn classification_prompt_lists_items_and_categories() {
        let item = ExtractedItem {
            reference: "REF-9".into(),
            designation: "Olive oil 5L".into(),
            ..Default::default()
        };
        let id = uuid::Uuid::new_v4();
        let p = classification_prompt(
            &[&item],
            &[(id, "GROCERY".into(), "Grocery".into())],
        );
        assert!(p.contains("REF-9 | Olive oil 5L"));
        assert!(p.contains(&id.to_string()));
        assert!(p.contains("GROCERY"));
    }
}
