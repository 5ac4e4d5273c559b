//! Prompts for VLM-based bill line-item extraction.
//!
//! Every instruction sent to the model lives here so the schema the prompt
//! describes and the schema [`crate::pipeline::parse`] validates can be
//! reviewed side by side.
//!
//! Callers can override the default via [`crate::config::ExtractionConfig::system_prompt`];
//! the constant here is used only when no override is provided.

/// Version of the output schema described by [`EXTRACTION_PROMPT`].
pub const SCHEMA_VERSION: &str = "1";

/// Default prompt for extracting line items from a bill image.
pub const EXTRACTION_PROMPT: &str = r#"You are an expert OCR and financial data extraction system. Analyse the provided medical invoice image and extract its line items.

Follow these rules precisely:

1. FIELDS
   - For every purchased product or service extract:
     "item_name"     (string, the product or service name as printed)
     "item_amount"   (number, the line total)
     "item_rate"     (number, the unit price)
     "item_quantity" (number)
   - If the quantity is missing, use 1
   - If the rate is missing, infer it as item_amount / item_quantity
   - Numbers must be JSON numbers without currency symbols or thousands separators

2. WHAT TO EXCLUDE
   - Do NOT include summary or aggregate rows: Subtotal, Sub Total, Tax, GST,
     CGST, SGST, VAT, Discount, Round Off, Net Amount, Grand Total, Total,
     Amount Payable, Balance Due, or any similar row
   - Ignore page numbers, headers, footers, and signatures

3. PAGES
   - Group items by the page they appear on; "page_no" is a string starting at "1"

4. OUTPUT FORMAT
   - Output ONLY valid JSON matching exactly this structure:
     {
       "pagewise_line_items": [
         {
           "page_no": "1",
           "bill_items": [
             { "item_name": "string", "item_amount": 0.0, "item_rate": 0.0, "item_quantity": 0.0 }
           ]
         }
       ]
     }
   - Do NOT wrap the JSON in ```json fences
   - Do NOT add commentary or explanations

5. UNREADABLE DOCUMENTS
   - If the image is not a bill or cannot be read, output ONLY:
     { "error": "<short reason>" }"#;

/// Return the prompt to send: the configured override, or the default.
pub fn extraction_prompt(override_prompt: Option<&str>) -> &str {
    override_prompt.unwrap_or(EXTRACTION_PROMPT)
}
