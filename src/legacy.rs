//! Legacy single-file database parser.
//!
//! The legacy store is one property list (binary or XML) holding every note.
//! Two root shapes are accepted: a bare array of note dictionaries, or a
//! dictionary with a `Notes` array. Each note dictionary carries:
//!
//! | Key | Type | |
//! |-----|------|---|
//! | `RTFData` | data | RTF bytes (preferred body) |
//! | `Text` / `String` | string | plain or RTF text |
//! | `Color` | integer | color index, see [`crate::models::NoteColor`] |
//! | `CreationDate`, `ModificationDate` | date, string, or seconds since 2001-01-01 | |
//!
//! Records that do not fit are reported in [`LegacyParse::malformed`] and
//! skipped; the rest still decode.

use std::io::Cursor;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use plist::{Dictionary, Value};

use crate::error::{ImportError, Result};
use crate::models::{RawBody, RawNoteRecord, RawTimestamp};
use crate::rtf;

/// Seconds between the Unix epoch and the Cocoa reference date (2001-01-01 UTC).
const COCOA_EPOCH_OFFSET: i64 = 978_307_200;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Outcome of decoding a legacy database.
#[derive(Debug, Default)]
pub struct LegacyParse {
    pub records: Vec<RawNoteRecord>,
    /// One [`ImportError::MalformedRecord`] per skipped record.
    pub malformed: Vec<ImportError>,
}

/// Read and decode the database at `path`.
pub fn parse_legacy_db(path: &Path) -> Result<LegacyParse> {
    let bytes = std::fs::read(path).map_err(|e| ImportError::from_io(path, e))?;
    parse_legacy_bytes(path, &bytes)
}

/// Decode an in-memory database; `path` is only used in error messages.
pub fn parse_legacy_bytes(path: &Path, bytes: &[u8]) -> Result<LegacyParse> {
    let root = Value::from_reader(Cursor::new(bytes)).map_err(|e| ImportError::MalformedSource {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let items = match &root {
        Value::Array(items) => items,
        Value::Dictionary(dict) => dict
            .get("Notes")
            .and_then(Value::as_array)
            .ok_or_else(|| ImportError::MalformedSource {
                path: path.to_path_buf(),
                reason: "root dictionary has no Notes array".into(),
            })?,
        _ => {
            return Err(ImportError::MalformedSource {
                path: path.to_path_buf(),
                reason: "root is neither an array nor a dictionary".into(),
            })
        }
    };

    let mut parse = LegacyParse::default();
    for (index, item) in items.iter().enumerate() {
        match decode_record(index, item) {
            Ok(record) => parse.records.push(record),
            Err(reason) => {
                let err = ImportError::MalformedRecord {
                    record: format!("db#{}", index),
                    reason,
                };
                tracing::warn!("skipping {}", err);
                parse.malformed.push(err);
            }
        }
    }

    tracing::debug!(
        records = parse.records.len(),
        malformed = parse.malformed.len(),
        "decoded legacy database"
    );
    Ok(parse)
}

fn decode_record(index: usize, item: &Value) -> std::result::Result<RawNoteRecord, String> {
    let dict = item
        .as_dictionary()
        .ok_or_else(|| "entry is not a dictionary".to_string())?;

    Ok(RawNoteRecord::Legacy {
        index,
        body: decode_body(dict)?,
        color_code: decode_color(dict)?,
        created: decode_timestamp(dict, "CreationDate")?,
        modified: decode_timestamp(dict, "ModificationDate")?,
    })
}

fn decode_body(dict: &Dictionary) -> std::result::Result<RawBody, String> {
    if let Some(value) = dict.get("RTFData") {
        return value
            .as_data()
            .map(|d| RawBody::Rtf(d.to_vec()))
            .ok_or_else(|| "RTFData is not data".to_string());
    }
    for key in ["Text", "String"] {
        if let Some(value) = dict.get(key) {
            let text = value
                .as_string()
                .ok_or_else(|| format!("{} is not a string", key))?;
            return Ok(if rtf::is_rtf(text) {
                RawBody::Rtf(text.as_bytes().to_vec())
            } else {
                RawBody::Plain(text.to_string())
            });
        }
    }
    Err("no note body (RTFData, Text, or String)".to_string())
}

fn decode_color(dict: &Dictionary) -> std::result::Result<Option<i64>, String> {
    match dict.get("Color") {
        None => Ok(None),
        Some(value) => value
            .as_signed_integer()
            .map(Some)
            .ok_or_else(|| "Color is not an integer".to_string()),
    }
}

fn decode_timestamp(
    dict: &Dictionary,
    key: &str,
) -> std::result::Result<Option<RawTimestamp>, String> {
    let Some(value) = dict.get(key) else {
        return Ok(None);
    };
    match value {
        Value::Date(date) => {
            let instant: DateTime<Utc> = std::time::SystemTime::from(*date).into();
            Ok(Some(RawTimestamp::Instant(instant)))
        }
        Value::String(s) => parse_naive(s)
            .map(|n| Some(RawTimestamp::Local(n)))
            .ok_or_else(|| format!("{} '{}' is not a recognized date", key, s)),
        Value::Real(secs) => cocoa_seconds(*secs)
            .map(|dt| Some(RawTimestamp::Instant(dt)))
            .ok_or_else(|| format!("{} is out of range", key)),
        Value::Integer(_) => value
            .as_signed_integer()
            .and_then(|secs| cocoa_seconds(secs as f64))
            .map(|dt| Some(RawTimestamp::Instant(dt)))
            .ok_or_else(|| format!("{} is out of range", key)),
        _ => Err(format!("{} has an unsupported type", key)),
    }
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s.trim(), fmt).ok())
}

fn cocoa_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let unix = COCOA_EPOCH_OFFSET.checked_add(secs.trunc() as i64)?;
    Utc.timestamp_opt(unix, 0).single()
}
