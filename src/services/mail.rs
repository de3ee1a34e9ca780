use crate::config::EmailConfig;
use crate::error::{AppError, AppResult};
use crate::models::message::MailMessage;
use async_trait::async_trait;
use std::io::{Read, Write};
use std::net::TcpStream;
use tracing::{debug, info, warn};

/// Supplies the messages to enqueue. Implementations own connection
/// handling and marking messages as seen.
#[async_trait]
pub trait MailSource: Send + Sync {
    async fn fetch_unseen(&self) -> AppResult<Vec<MailMessage>>;
}

pub struct ImapMailSource {
    config: EmailConfig,
}

impl ImapMailSource {
    pub fn new(config: EmailConfig) -> AppResult<Self> {
        if config.imap_host.trim().is_empty() {
            return Err(AppError::Config("email.imap_host is not configured".to_string()));
        }
        Ok(Self { config })
    }
}

#[async_trait]
impl MailSource for ImapMailSource {
    async fn fetch_unseen(&self) -> AppResult<Vec<MailMessage>> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || fetch_blocking(&config))
            .await
            .map_err(|e| AppError::Mail(format!("IMAP worker failed: {e}")))?
    }
}

fn fetch_blocking(config: &EmailConfig) -> AppResult<Vec<MailMessage>> {
    let host = config.imap_host.as_str();
    debug!("Connecting to IMAP server {}:{}", host, config.imap_port);

    if config.use_tls {
        let tls = native_tls::TlsConnector::builder()
            .build()
            .map_err(|e| AppError::MissingDependency(format!("Failed to initialise TLS: {e}")))?;
        let client = imap::connect((host, config.imap_port), host, &tls)
            .map_err(|e| AppError::Mail(format!("Failed to connect to {host}: {e}")))?;
        let session = client
            .login(&config.username, &config.password)
            .map_err(|(e, _)| AppError::Mail(format!("IMAP login failed: {e}")))?;
        fetch_from_session(session, &config.mailbox)
    } else {
        let stream = TcpStream::connect((host, config.imap_port))
            .map_err(|e| AppError::Mail(format!("Failed to connect to {host}: {e}")))?;
        let mut client = imap::Client::new(stream);
        client
            .read_greeting()
            .map_err(|e| AppError::Mail(format!("IMAP greeting failed: {e}")))?;
        let session = client
            .login(&config.username, &config.password)
            .map_err(|(e, _)| AppError::Mail(format!("IMAP login failed: {e}")))?;
        fetch_from_session(session, &config.mailbox)
    }
}

fn fetch_from_session<T: Read + Write>(
    mut session: imap::Session<T>,
    mailbox: &str,
) -> AppResult<Vec<MailMessage>> {
    let collected = collect_unseen(&mut session, mailbox);

    if let Err(e) = session.logout() {
        warn!("IMAP logout failed: {}", e);
    }

    let messages = collected?;
    info!("Fetched {} unseen e-mails", messages.len());
    Ok(messages)
}

/// Reads every unseen message and flags it `\Seen`. Per-message failures are
/// logged and skipped; only mailbox-level failures abort the run.
fn collect_unseen<T: Read + Write>(
    session: &mut imap::Session<T>,
    mailbox: &str,
) -> AppResult<Vec<MailMessage>> {
    session
        .select(mailbox)
        .map_err(|e| AppError::Mail(format!("Failed to select mailbox {mailbox}: {e}")))?;

    let mut sequence_numbers: Vec<u32> = session
        .search("UNSEEN")
        .map_err(|e| AppError::Mail(format!("Unable to search for unseen messages: {e}")))?
        .into_iter()
        .collect();
    sequence_numbers.sort_unstable();

    let mut messages = Vec::with_capacity(sequence_numbers.len());
    for seq in sequence_numbers {
        let set = seq.to_string();
        let fetches = match session.fetch(&set, "RFC822") {
            Ok(fetches) => fetches,
            Err(e) => {
                warn!("Failed to fetch message {}: {}", seq, e);
                continue;
            }
        };
        let Some(raw) = fetches.iter().next().and_then(|fetch| fetch.body()) else {
            warn!("Message {} came back without a body", seq);
            continue;
        };

        match MailMessage::from_rfc822(raw) {
            Ok(message) => messages.push(message),
            Err(e) => {
                warn!("Skipping message {}: {}", seq, e);
                continue;
            }
        }

        // The message is already collected; an unflagged one is offered again next run.
        if let Err(e) = session.store(&set, "+FLAGS (\\Seen)") {
            warn!("Failed to mark message {} as seen: {}", seq, e);
        }
    }

    Ok(messages)
}
