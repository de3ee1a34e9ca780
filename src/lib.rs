//! Mail-to-parser intake queue: unseen e-mails are stored as pending jobs in
//! SQLite and later sent, oldest first, to an AI parsing service.

pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod services;
