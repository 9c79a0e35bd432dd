//! # peakwatch
//!
//! Burst detection for a tag's post stream.
//!
//! peakwatch pulls every post carrying a tag within a time window from a
//! paginated search source, stores them in SQLite without duplicates, bins
//! them into fixed-width time buckets, finds the bursts with hysteresis peak
//! detection and labels each burst with its top TextRank keyphrase.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────┐
//! │   Search    │──▶│  Resolver + │──▶│  SQLite  │
//! │   source    │   │  Ingestion  │   │  tweets  │
//! └─────────────┘   └─────────────┘   └────┬─────┘
//!                                          │
//!                      ┌───────────────────┘
//!                      ▼
//!      ┌────────┐   ┌─────────┐   ┌─────────┐   ┌──────────┐
//!      │ Bucket │──▶│ Peakdet │──▶│ Segment │──▶│ Keywords │
//!      └────────┘   └─────────┘   └─────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! peakwatch init
//! peakwatch sync eclipse --start 2017-08-21-16-00 --duration 8
//! peakwatch analyze eclipse --start 2017-08-21-16-00 --duration 8
//! peakwatch stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Pipeline error kinds |
//! | [`source`] | Search source trait and HTTP client |
//! | [`resolve`] | Starting-id bisection |
//! | [`ingest`] | Paginated pull into the store |
//! | [`store`] | Record persistence and pull log |
//! | [`bucket`] | Time bucketing |
//! | [`peakdet`] | Hysteresis peak detection |
//! | [`segment`] | Peak membership |
//! | [`keywords`] | Text cleaning and TextRank labels |
//! | [`pipeline`] | End-to-end runs |
//! | [`report`] | Text and JSON output |
//! | [`stats`] | Database summary |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod bucket;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod keywords;
pub mod migrate;
pub mod models;
pub mod peakdet;
pub mod pipeline;
pub mod report;
pub mod resolve;
pub mod segment;
pub mod source;
pub mod stats;
pub mod store;
