//! Core domain types

pub mod cluster;
pub mod embedding;
pub mod fingerprint;
pub mod listing;
pub mod report;

pub use cluster::{Cluster, ClusterParams};
pub use embedding::{Embedding, EmbeddingRecord};
pub use fingerprint::Fingerprint;
pub use listing::{ExpiredReason, Listing, ProcessedFields, Status, Transition};
pub use report::{ReportError, Stage, UpdateReport};
