//! Fixed instruction sent with every extraction request.
//!
//! The same prompt is used for the text path and the vision path so that both
//! return the same JSON shape to the response parser.

pub const PATIENT_EXTRACTION_PROMPT: &str = "\
Please extract the following patient information from this medical document:

1. Patient's First Name
2. Patient's Last Name
3. Patient's Date of Birth (DOB)

Please respond in the following JSON format:
{
    \"patient_first_name\": \"extracted first name\",
    \"patient_last_name\": \"extracted last name\",
    \"patient_dob\": \"extracted date of birth\",
    \"confidence\": \"high/medium/low\",
    \"notes\": \"any additional observations\"
}

If any information cannot be found, use \"Not Found\" as the value.
Be very careful to extract only the requested information and maintain accuracy.";

/// Text-path user message: prompt followed by the document's text layer.
pub fn text_extraction_message(prompt: &str, document_text: &str) -> String {
    format!("{prompt}\n\nDocument content: {document_text}")
}
