pub mod ai_parser;
pub mod http;
pub mod job_repository;
pub mod mail;
pub mod pdfco;
pub mod queue_processor;

pub use ai_parser::{AiParsingClient, ParsingService};
pub use job_repository::JobRepository;
pub use mail::{ImapMailSource, MailSource};
pub use pdfco::{CreditService, PdfCoClient};
pub use queue_processor::{enqueue_messages, ProcessReport, QueueProcessor};
