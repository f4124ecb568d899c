//! # jobscout
//!
//! Job listing aggregator: collects postings through web search, enriches
//! them with a language model, clusters and searches them by embedding, and
//! keeps the store healthy with deduplication, expiry and bounded retention.

pub mod cli;
pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod pipeline;
pub mod search;
pub mod services;
pub mod storage;
pub mod ui;

pub use error::{Error, ErrorKind, Result};
