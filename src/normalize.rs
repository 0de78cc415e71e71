//! Reduce raw records from either source format to a [`CanonicalNote`].
//!
//! The fingerprint is computed over the color name and the normalized plain
//! text only, so the same note read from the legacy database or from a
//! bundle, at any time, hashes identically.

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use chrono_tz::Tz;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::models::{CanonicalNote, NoteBody, NoteColor, RawBody, RawNoteRecord, RawTimestamp};
use crate::rtf;

const UNTITLED: &str = "Untitled Sticky";

/// Stateless normalizer bound to one run's timezone and clock.
#[derive(Debug, Clone)]
pub struct Normalizer {
    tz: Tz,
    title_max_chars: usize,
    /// Stand-in for missing timestamps.
    now: DateTime<Utc>,
}

impl Normalizer {
    pub fn new(config: &Config, now: DateTime<Utc>) -> Self {
        Self {
            tz: config.timezone,
            title_max_chars: config.title_max_chars,
            now,
        }
    }

    /// Normalize one record. `position` is the note's 1-based place in the
    /// run and only feeds the placeholder title.
    pub fn normalize(&self, raw: &RawNoteRecord, position: usize) -> CanonicalNote {
        let (body, color_code, created, modified) = match raw {
            RawNoteRecord::Legacy {
                body,
                color_code,
                created,
                modified,
                ..
            } => {
                let body = match body {
                    RawBody::Rtf(bytes) => NoteBody::Rich(rtf::decode_bytes(bytes)),
                    RawBody::Plain(text) => NoteBody::Plain(text.clone()),
                };
                (body, *color_code, *created, *modified)
            }
            RawNoteRecord::Modern {
                rtf: payload,
                color_code,
                created,
                modified,
                ..
            } => {
                let text = rtf::decode_bytes(payload);
                let body = if rtf::is_rtf(&text) {
                    NoteBody::Rich(text)
                } else {
                    NoteBody::Plain(text)
                };
                (body, *color_code, *created, *modified)
            }
        };

        let plain_text = match &body {
            NoteBody::Rich(source) => normalize_text(&rtf::strip_rtf(source)),
            NoteBody::Plain(text) => normalize_text(text),
        };
        let color = NoteColor::from_code(color_code);
        let title = match first_nonempty_line(&plain_text) {
            Some(line) => truncate_title(&line, self.title_max_chars),
            None => format!("{} {}", UNTITLED, position),
        };

        CanonicalNote {
            source_label: raw.label(),
            title,
            fingerprint: fingerprint(&plain_text, color),
            body,
            plain_text,
            color,
            created: self.resolve(created),
            modified: self.resolve(modified),
        }
    }

    fn resolve(&self, ts: Option<RawTimestamp>) -> DateTime<FixedOffset> {
        let instant = match ts {
            Some(RawTimestamp::Instant(utc)) => Some(utc),
            Some(RawTimestamp::Local(naive)) => self
                .tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
            None => None,
        };
        instant
            .unwrap_or(self.now)
            .with_timezone(&self.tz)
            .fixed_offset()
    }
}

/// Stable content hash: SHA-256 hex of `color \n text`.
pub fn fingerprint(normalized_text: &str, color: NoteColor) -> String {
    let mut hasher = Sha256::new();
    hasher.update(color.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(normalized_text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Canonical text form: `\n` line endings, NBSP as space, no trailing
/// whitespace per line, no leading or trailing blank lines.
pub fn normalize_text(text: &str) -> String {
    let unified = text
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\u{a0}', " ");
    let lines: Vec<&str> = unified.lines().map(str::trim_end).collect();
    lines.join("\n").trim_matches('\n').to_string()
}

/// Collapse runs of whitespace to one space and trim.
pub fn normalize_ws(s: &str) -> String {
    s.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn first_nonempty_line(text: &str) -> Option<String> {
    text.lines().map(normalize_ws).find(|l| !l.is_empty())
}

/// Truncate to `max_chars` characters, marking the cut with `…`.
pub fn truncate_title(s: &str, max_chars: usize) -> String {
    let s = s.trim();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn normalizer() -> Normalizer {
        let mut cfg = Config::minimal();
        cfg.timezone = chrono_tz::America::New_York;
        Normalizer::new(&cfg, Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap())
    }

    fn legacy(body: RawBody, color: Option<i64>) -> RawNoteRecord {
        RawNoteRecord::Legacy {
            index: 0,
            body,
            color_code: color,
            created: None,
            modified: None,
        }
    }

    #[test]
    fn deterministic() {
        let n = normalizer();
        let raw = legacy(RawBody::Plain("Shopping\n- milk".into()), Some(0));
        assert_eq!(n.normalize(&raw, 1), n.normalize(&raw, 1));
    }

    #[test]
    fn fingerprint_ignores_format_and_timestamps() {
        let n = normalizer();
        let plain = legacy(RawBody::Plain("Hello\nworld".into()), Some(1));
        let modern = RawNoteRecord::Modern {
            identifier: "X".into(),
            bundle_path: PathBuf::from("X.rtfd"),
            rtf: br"{\rtf1\ansi{\fonttbl\f0 Helvetica;}\f0 Hello\par world\par}".to_vec(),
            color_code: Some(1),
            created: Some(RawTimestamp::Instant(
                Utc.with_ymd_and_hms(2010, 5, 5, 5, 5, 5).unwrap(),
            )),
            modified: None,
        };
        let a = n.normalize(&plain, 1);
        let b = n.normalize(&modern, 7);
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.title, "Hello");
        assert_ne!(a.created, b.created);
        assert!(matches!(b.body, NoteBody::Rich(_)));
    }

    #[test]
    fn fingerprint_tracks_body_and_color() {
        let n = normalizer();
        let base = n.normalize(&legacy(RawBody::Plain("note".into()), Some(0)), 1);
        let recolored = n.normalize(&legacy(RawBody::Plain("note".into()), Some(2)), 1);
        let edited = n.normalize(&legacy(RawBody::Plain("note!".into()), Some(0)), 1);
        let reflowed = n.normalize(&legacy(RawBody::Plain("note  \r\n\r\n".into()), Some(0)), 1);
        assert_ne!(base.fingerprint, recolored.fingerprint);
        assert_ne!(base.fingerprint, edited.fingerprint);
        assert_eq!(base.fingerprint, reflowed.fingerprint);
        assert_eq!(base.fingerprint.len(), 64);
    }

    #[test]
    fn empty_note_gets_numbered_placeholder() {
        let n = normalizer();
        let note = n.normalize(&legacy(RawBody::Plain(" \n\u{a0}\n".into()), None), 4);
        assert_eq!(note.title, "Untitled Sticky 4");
        assert_eq!(note.color, NoteColor::Unknown);
    }

    #[test]
    fn title_from_first_meaningful_line_and_truncated() {
        let n = normalizer();
        let long = "x".repeat(300);
        let note = n.normalize(
            &legacy(RawBody::Plain(format!("\n\n   {}\nsecond", long)), None),
            1,
        );
        assert_eq!(note.title.chars().count(), 200);
        assert!(note.title.ends_with('…'));

        let note = n.normalize(&legacy(RawBody::Plain("  To   do\u{a0}list \n".into()), None), 1);
        assert_eq!(note.title, "To do list");
    }

    #[test]
    fn naive_timestamps_use_configured_zone() {
        let n = normalizer();
        let naive = NaiveDate::from_ymd_opt(2023, 7, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let raw = RawNoteRecord::Legacy {
            index: 0,
            body: RawBody::Plain("x".into()),
            color_code: None,
            created: Some(RawTimestamp::Local(naive)),
            modified: None,
        };
        let note = n.normalize(&raw, 1);
        assert_eq!(note.created.to_rfc3339(), "2023-07-01T09:30:00-04:00");
        // missing → import time, rendered in the zone
        assert_eq!(note.modified.to_rfc3339(), "2024-01-15T07:00:00-05:00");
    }

    #[test]
    fn truncate_edges() {
        assert_eq!(truncate_title("abc", 3), "abc");
        assert_eq!(truncate_title("abcd", 3), "ab…");
        assert_eq!(truncate_title("  ab  ", 3), "ab");
    }

    #[test]
    fn normalize_text_rules() {
        assert_eq!(normalize_text("\n\na  \r\nb\rc\n\n"), "a\nb\nc");
        assert_eq!(normalize_text("a\u{a0}b"), "a b");
    }
}
