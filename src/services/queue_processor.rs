use crate::error::{AppError, AppResult};
use crate::models::message::MailMessage;
use crate::services::ai_parser::ParsingService;
use crate::services::job_repository::JobRepository;
use crate::services::pdfco::CreditService;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Outcome of one `process_pending` run. Every attempted job is either
/// processed or failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessReport {
    pub processed: usize,
    pub failed: usize,
}

impl ProcessReport {
    pub fn handled(&self) -> usize {
        self.processed + self.failed
    }
}

/// Sits between the job store and the two external services.
pub struct QueueProcessor {
    repository: JobRepository,
    credits: Arc<dyn CreditService>,
    parser: Arc<dyn ParsingService>,
}

impl QueueProcessor {
    pub fn new(
        repository: JobRepository,
        credits: Arc<dyn CreditService>,
        parser: Arc<dyn ParsingService>,
    ) -> Self {
        Self {
            repository,
            credits,
            parser,
        }
    }

    pub fn repository(&self) -> &JobRepository {
        &self.repository
    }

    pub async fn enqueue_messages(&self, messages: &[MailMessage]) -> AppResult<usize> {
        enqueue_messages(&self.repository, messages).await
    }

    /// Processes every pending job and returns how many ended `processed`.
    pub async fn process_pending(&self) -> AppResult<usize> {
        Ok(self.process_pending_report().await?.processed)
    }

    /// Pre-flight checks gate the whole batch; after that, a failed parse is
    /// recorded on its job and the loop moves on. Storage failures abort.
    pub async fn process_pending_report(&self) -> AppResult<ProcessReport> {
        let jobs = self.repository.list_pending().await?;
        if jobs.is_empty() {
            info!("No pending jobs detected");
            return Ok(ProcessReport::default());
        }

        let balance = self
            .credits
            .credit_balance()
            .await
            .map_err(into_unavailable)?;
        info!("PDF.co credits available: {}", balance);
        self.parser.ping().await.map_err(into_unavailable)?;

        let mut report = ProcessReport::default();
        for job in jobs {
            match self.parser.parse(&job.body, &job.parse_metadata()).await {
                Ok(result) => {
                    self.repository.mark_processed(job.id, &result).await?;
                    report.processed += 1;
                    info!("Processed job {}", job.id);
                }
                Err(e) => {
                    error!("Failed to process job {}: {}", job.id, e);
                    self.repository.mark_error(job.id, &e.to_string()).await?;
                    report.failed += 1;
                }
            }
        }

        if report.failed > 0 {
            warn!("{} jobs failed and were marked as errors", report.failed);
        }
        info!("Processed {} of {} jobs", report.processed, report.handled());
        Ok(report)
    }
}

/// Queues one pending job per message. The batch is atomic: on a storage
/// failure no job from it is created. Needs only the store, so intake keeps
/// working while the parsing services are unconfigured.
pub async fn enqueue_messages(
    repository: &JobRepository,
    messages: &[MailMessage],
) -> AppResult<usize> {
    let ids = repository.insert_batch(messages).await?;
    info!("Queued {} messages for processing", ids.len());
    Ok(ids.len())
}

fn into_unavailable(e: AppError) -> AppError {
    match e {
        AppError::ServiceUnavailable(_) => e,
        other => AppError::ServiceUnavailable(other.to_string()),
    }
}
