use anyhow::Context;
use clap::{Parser, Subcommand};
use intake::config::{load_config, Config};
use intake::models::job::JobStatus;
use intake::services::{
    enqueue_messages, AiParsingClient, CreditService, ImapMailSource, JobRepository, MailSource,
    PdfCoClient, QueueProcessor,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    name = "intake",
    about = "Queue incoming invoice e-mails and send them to the AI parser"
)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, env = "INTAKE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Display the remaining PDF.co credits
    PdfcoBalance,
    /// Fetch unseen e-mails and add them to the processing queue
    CheckEmails,
    /// Process pending queue items using the AI parser
    ProcessQueue,
    /// Show job counts per status
    QueueStatus,
    /// List the most recent jobs
    ListJobs {
        /// Only jobs with this status
        #[arg(long, value_enum)]
        status: Option<JobStatus>,

        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Return failed jobs to the pending state
    RequeueErrors,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Command::PdfcoBalance => {
            let client = PdfCoClient::new(&config.pdfco)?;
            let balance = client
                .credit_balance()
                .await
                .context("Failed to read PDF.co balance")?;
            println!("PDF.co credits remaining: {balance}");
        }
        Command::CheckEmails => {
            let source = ImapMailSource::new(config.email.clone())?;
            let count = check_emails(&config, &source).await?;
            println!("Queued {count} new messages");
        }
        Command::ProcessQueue => {
            let queue = build_queue_processor(&config).await?;
            let report = queue
                .process_pending_report()
                .await
                .context("Queue processing aborted")?;
            println!(
                "{}",
                json!({
                    "processed": report.processed,
                    "failed": report.failed,
                    "handled": report.handled(),
                })
            );
        }
        Command::QueueStatus => {
            let repository = open_repository(&config).await?;
            let stats = repository.get_job_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::ListJobs { status, limit } => {
            let repository = open_repository(&config).await?;
            let jobs = repository.list_jobs(status, limit).await?;
            println!("{}", serde_json::to_string_pretty(&jobs)?);
        }
        Command::RequeueErrors => {
            let repository = open_repository(&config).await?;
            let count = repository.requeue_errors().await?;
            info!("Requeued {} failed jobs", count);
            println!("Requeued {count} failed jobs");
        }
    }

    Ok(())
}

/// The store is opened before any mail is fetched: fetching flags messages
/// as seen, so a store that cannot be opened must fail the run first.
async fn check_emails(config: &Config, source: &dyn MailSource) -> anyhow::Result<usize> {
    let repository = open_repository(config).await?;
    let messages = source
        .fetch_unseen()
        .await
        .context("Failed to fetch e-mails")?;
    let count = enqueue_messages(&repository, &messages)
        .await
        .context("Failed to queue messages")?;
    Ok(count)
}

async fn open_repository(config: &Config) -> anyhow::Result<JobRepository> {
    let path = &config.queue.database_path;
    JobRepository::initialize(path)
        .await
        .with_context(|| format!("Failed to open queue at {}", path.display()))
}

async fn build_queue_processor(config: &Config) -> anyhow::Result<QueueProcessor> {
    let credits = Arc::new(PdfCoClient::new(&config.pdfco)?);
    let parser = Arc::new(AiParsingClient::new(&config.ai_parser)?);
    let repository = open_repository(config).await?;
    Ok(QueueProcessor::new(repository, credits, parser))
}

fn init_logging() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "intake=info".to_string());
    let log_format = std::env::var("INTAKE_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

    // stdout carries command output; logs go to stderr.
    if log_format == "json" {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use intake::error::{AppError, AppResult};
    use intake::models::message::MailMessage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedMailbox {
        fetches: AtomicUsize,
        messages: Vec<MailMessage>,
    }

    #[async_trait]
    impl MailSource for FixedMailbox {
        async fn fetch_unseen(&self) -> AppResult<Vec<MailMessage>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.messages.clone())
        }
    }

    fn mailbox(subjects: &[&str]) -> FixedMailbox {
        FixedMailbox {
            fetches: AtomicUsize::new(0),
            messages: subjects
                .iter()
                .map(|s| MailMessage::new(*s, "billing@example.com", "body"))
                .collect(),
        }
    }

    #[tokio::test]
    async fn check_emails_queues_without_parser_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.ai_parser.endpoint = String::new();
        config.pdfco.api_key = String::new();
        config.queue.database_path = dir.path().join("queue.db");
        let source = mailbox(&["Invoice 1", "Invoice 2"]);

        let count = check_emails(&config, &source).await.unwrap();

        assert_eq!(count, 2);
        let repository = JobRepository::initialize(&config.queue.database_path)
            .await
            .unwrap();
        let pending = repository.list_pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].subject, "Invoice 1");
    }

    #[tokio::test]
    async fn check_emails_opens_the_store_before_fetching() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the store's parent directory should be.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let mut config = Config::default();
        config.queue.database_path = blocker.join("queue.db");
        let source = mailbox(&["Invoice"]);

        let err = check_emails(&config, &source).await.unwrap_err();

        assert!(err.downcast_ref::<AppError>().is_some());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cli_parses_subcommands_with_global_config() {
        let cli = Cli::try_parse_from(["intake", "process-queue", "--config", "/etc/intake.toml"])
            .unwrap();
        assert!(matches!(cli.command, Command::ProcessQueue));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/intake.toml")));

        let cli = Cli::try_parse_from(["intake", "list-jobs", "--status", "error", "--limit", "5"])
            .unwrap();
        match cli.command {
            Command::ListJobs { status, limit } => {
                assert_eq!(status, Some(JobStatus::Error));
                assert_eq!(limit, 5);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn unknown_status_is_rejected_by_the_parser() {
        let err = Cli::try_parse_from(["intake", "list-jobs", "--status", "bogus"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }
}
