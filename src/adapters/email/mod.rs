//! Email adapters.
//!
//! - `ResendEmailSender` - Sends through the Resend HTTP API
//! - `LoggingEmailSender` - Logs instead of sending (development)

mod logging;
mod resend;

pub use logging::LoggingEmailSender;
pub use resend::ResendEmailSender;

use crate::ports::EmailTemplate;

/// Plain-text body for a template.
///
/// Context keys are rendered one per line under the subject, sorted so the
/// output is stable.
pub(crate) fn render_text(template: EmailTemplate, context: &serde_json::Value) -> String {
    let mut body = format!("{}\n", template.subject());
    if let Some(fields) = context.as_object() {
        let mut keys: Vec<&String> = fields.keys().collect();
        keys.sort();
        for key in keys {
            let value = match &fields[key] {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            body.push_str(&format!("\n{}: {}", key.replace('_', " "), value));
        }
    }
    body
}
