pub mod config;
pub mod config_validator;
pub mod digest;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod rate_limit_config;
pub mod rate_limiter;
pub mod records;
pub mod response;
pub mod server;
pub mod sqlite;
pub mod storage;
pub mod system;

pub use config::Config;
pub use error::{ApiError, FetchError, ServerError, StoreError, WriteStage};
pub use records::{Record, RecordStore};
pub use server::create_app;
