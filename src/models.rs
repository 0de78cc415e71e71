//! Core data models used throughout the importer.
//!
//! Raw records come out of the two source parsers, are reduced to a
//! [`CanonicalNote`] by [`crate::normalize`], and leave the process as a
//! Notion page. Nothing here is persisted locally.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

/// Body payload as stored by the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawBody {
    /// RTF document bytes.
    Rtf(Vec<u8>),
    /// Already-plain text.
    Plain(String),
}

/// A timestamp as found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawTimestamp {
    /// An absolute instant (plist `<date>`, filesystem times).
    Instant(DateTime<Utc>),
    /// Wall-clock time with no zone; interpreted in the configured timezone.
    Local(NaiveDateTime),
}

/// Raw item produced by a source parser before normalization.
#[derive(Debug, Clone)]
pub enum RawNoteRecord {
    Legacy {
        /// Position in the legacy database (0-based).
        index: usize,
        body: RawBody,
        color_code: Option<i64>,
        created: Option<RawTimestamp>,
        modified: Option<RawTimestamp>,
    },
    Modern {
        /// Bundle identifier (directory stem, usually a UUID).
        identifier: String,
        bundle_path: PathBuf,
        rtf: Vec<u8>,
        color_code: Option<i64>,
        created: Option<RawTimestamp>,
        modified: Option<RawTimestamp>,
    },
}

impl RawNoteRecord {
    /// Human-readable identifier used in logs and the dry-run plan.
    pub fn label(&self) -> String {
        match self {
            RawNoteRecord::Legacy { index, .. } => format!("db#{}", index),
            RawNoteRecord::Modern { identifier, .. } => format!("rtfd:{}", identifier),
        }
    }
}

/// Sticky note color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteColor {
    Yellow,
    Blue,
    Green,
    Pink,
    Purple,
    Gray,
    Unknown,
}

impl NoteColor {
    /// Map the Stickies color index to a color. Unrecognized codes are `Unknown`.
    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(0) => NoteColor::Yellow,
            Some(1) => NoteColor::Blue,
            Some(2) => NoteColor::Green,
            Some(3) => NoteColor::Pink,
            Some(4) => NoteColor::Purple,
            Some(5) => NoteColor::Gray,
            _ => NoteColor::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NoteColor::Yellow => "Yellow",
            NoteColor::Blue => "Blue",
            NoteColor::Green => "Green",
            NoteColor::Pink => "Pink",
            NoteColor::Purple => "Purple",
            NoteColor::Gray => "Gray",
            NoteColor::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for NoteColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Note body after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteBody {
    /// RTF source text, handed to the rich-text converter.
    Rich(String),
    Plain(String),
}

/// The single in-memory shape every source format is reduced to.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalNote {
    /// Source identifier for diagnostics (`db#3`, `rtfd:<uuid>`).
    pub source_label: String,
    pub title: String,
    pub body: NoteBody,
    /// Body with markup stripped; the input to title and fingerprint.
    pub plain_text: String,
    pub color: NoteColor,
    pub created: DateTime<FixedOffset>,
    pub modified: DateTime<FixedOffset>,
    /// SHA-256 hex of normalized text and color.
    pub fingerprint: String,
}

/// An existing destination page carrying an import fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRecord {
    pub page_id: String,
    pub fingerprint: String,
}
