//! # stickies-notion
//!
//! Migrates notes from macOS Stickies into a Notion database, keeping
//! formatting, color and timestamps, and never importing the same note twice.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌──────────────┐   ┌─────────────┐   ┌─────────┐   ┌─────────┐
//! │ Locator │──▶│  Legacy DB   │──▶│  Normalize  │──▶│ Convert │──▶│  Dedup  │──▶ Notion
//! │         │   │ .rtfd bundle │   │ fingerprint │   │ pandoc  │   │ create/ │
//! └─────────┘   └──────────────┘   └─────────────┘   │ plain   │   │ skip    │
//!                                                    └─────────┘   └─────────┘
//! ```
//!
//! One note at a time flows through the pipeline. Notion is the only durable
//! store: a page's `Import Hash` property holds the note fingerprint, and a
//! note whose fingerprint is already present is skipped.
//!
//! ## Quick Start
//!
//! ```bash
//! stickies-notion check                 # verify token and database
//! stickies-notion import --print-source # which storage will be read
//! stickies-notion import --dry-run      # show what would be created
//! stickies-notion import
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML, environment and CLI configuration |
//! | [`error`] | Import error taxonomy |
//! | [`models`] | Raw and canonical note types |
//! | [`locator`] | Source detection and path resolution |
//! | [`legacy`] | Legacy property-list database parser |
//! | [`bundle`] | `.rtfd` bundle directory parser |
//! | [`saved_state`] | Bundle color descriptor parser |
//! | [`rtf`] | RTF decoding and markup stripping |
//! | [`normalize`] | Canonical notes and fingerprints |
//! | [`convert`] | Rich text → blocks (pandoc or plain text) |
//! | [`chunk`] | Whitespace-boundary text splitting |
//! | [`dedup`] | Create-or-skip decisions |
//! | [`notion`] | Notion REST client |
//! | [`ingest`] | Pipeline orchestration and summary |
//! | [`check`] | Connectivity and schema check |

pub mod bundle;
pub mod check;
pub mod chunk;
pub mod config;
pub mod convert;
pub mod dedup;
pub mod error;
pub mod ingest;
pub mod legacy;
pub mod locator;
pub mod models;
pub mod normalize;
pub mod notion;
pub mod rtf;
pub mod saved_state;
