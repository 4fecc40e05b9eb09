// Service exports
pub mod artifacts;
pub mod intake;
pub mod memory;
pub mod postgres;
pub mod qrcode;
pub mod runtime_config;
pub mod store;

pub use intake::{IntakeError, Submission, SubmissionGateway, SubmissionReceipt};
pub use memory::InMemoryStore;
pub use postgres::PostgresClient;
pub use qrcode::{QrDecoder, RqrrDecoder};
pub use runtime_config::{ConfigProvider, InMemoryConfig};
pub use store::{ParticipantStore, StoreError, StoreTransaction};
