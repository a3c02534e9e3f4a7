//! Deckbox server: HTTP surface, job queue plumbing, and scheduling
//! around the commander scraping pipeline.

pub mod app;
pub mod config;
pub mod jobs;
pub mod routes;
pub mod scheduled_tasks;
pub mod worker;

pub use app::build_app;
pub use config::Config;
pub use jobs::PostgresJobQueue;
pub use worker::{DetailWorker, JobStore, PostgresJobStore};
