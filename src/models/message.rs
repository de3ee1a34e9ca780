use mailparse::{MailHeaderMap, ParsedMail};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

pub const NO_SUBJECT: &str = "(no subject)";

/// A fetched e-mail reduced to what the queue stores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MailMessage {
    pub subject: String,
    pub sender: String,
    pub body: String,
}

impl MailMessage {
    pub fn new(
        subject: impl Into<String>,
        sender: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            sender: sender.into(),
            body: body.into(),
        }
    }

    /// Parses a raw RFC 822 message. A missing `Subject` becomes
    /// `(no subject)`; an empty one is kept as is.
    pub fn from_rfc822(raw: &[u8]) -> AppResult<Self> {
        let parsed = mailparse::parse_mail(raw)
            .map_err(|e| AppError::Mail(format!("Failed to parse message: {e}")))?;

        let subject = parsed
            .headers
            .get_first_value("Subject")
            .unwrap_or_else(|| NO_SUBJECT.to_string());
        let sender = parsed.headers.get_first_value("From").unwrap_or_default();
        let body = extract_plain_text(&parsed)?;

        Ok(Self { subject, sender, body })
    }
}

/// The first `text/plain` part, which for a single-part message is the
/// message itself. Empty when there is none.
pub fn extract_plain_text(mail: &ParsedMail<'_>) -> AppResult<String> {
    match find_plain_part(mail) {
        Some(part) => part
            .get_body()
            .map_err(|e| AppError::Mail(format!("Failed to decode text/plain part: {e}"))),
        None => Ok(String::new()),
    }
}

fn find_plain_part<'a>(mail: &'a ParsedMail<'a>) -> Option<&'a ParsedMail<'a>> {
    if mail.subparts.is_empty() {
        return (mail.ctype.mimetype.eq_ignore_ascii_case("text/plain")).then_some(mail);
    }
    mail.subparts.iter().find_map(find_plain_part)
}
