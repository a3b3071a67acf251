//! # Marvel Metadata
//!
//! Turns scraped Marvel comic listing payloads into a single queryable
//! SQLite artifact and serves it read-only over a rate-limited HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Payloads   │──▶│    Parser    │──▶│ JSONL records│
//! │ (year pages) │   │ decode+norm. │   │ (one/issue)  │
//! └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                              │
//!                                              ▼
//!                                       ┌──────────────┐
//!                                       │ Bulk loader  │
//!                                       │ staged + tx  │
//!                                       └──────┬───────┘
//!                                              │ rename
//!                      ┌───────────────────────┤
//!                      ▼                       ▼
//!                 ┌──────────┐          ┌──────────────┐
//!                 │   CLI    │          │  HTTP (+rate │
//!                 │ (marvel) │          │    limiter)  │
//!                 └──────────┘          └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! marvel parse --input pages/2012.json --out data/issues.jsonl --year 2012
//! marvel build --input data/issues.jsonl
//! marvel search "avengers 2012"
//! marvel serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Library error type |
//! | [`models`] | Intermediate record and read models |
//! | [`decode`] | Packed payload decoding |
//! | [`parse`] | Raw issue → [`models::IssueRecord`] |
//! | [`records`] | JSONL record store |
//! | [`resolve`] | Series and creator identity resolution |
//! | [`migrate`] | Schema declaration |
//! | [`db`] | Database connection |
//! | [`ingest`] | Atomic bulk build |
//! | [`catalog`] | Read-only query layer |
//! | [`search`] | Title full-text search |
//! | [`ratelimit`] | Per-client token buckets |
//! | [`server`] | HTTP API |
//! | [`get`] | `marvel get` output |
//! | [`stats`] | `marvel info` output |

pub mod catalog;
pub mod config;
pub mod db;
pub mod decode;
pub mod error;
pub mod get;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod parse;
pub mod ratelimit;
pub mod records;
pub mod resolve;
pub mod search;
pub mod server;
pub mod stats;
