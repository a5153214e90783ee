//! Prompt for the job-posting extraction call.

/// Default instruction sent alongside the uploaded screenshot. The reply
/// contract (MAIL_ID / SUBJECT_LINE / EMAIL_CONTENT) is what
/// `RawExtraction` deserializes; callers may override the wording but the
/// key names must survive any edit.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"Analyze the uploaded image containing job vacancy details.

Extract and generate the following as a valid JSON response:
{
  "MAIL_ID": "<official email ID found in the image or inferred>",
  "SUBJECT_LINE": "<short professional subject line for applying>",
  "EMAIL_CONTENT": "<well-written job application email>"
}
"#;
