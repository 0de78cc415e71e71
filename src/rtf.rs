//! Plain-text extraction from RTF.
//!
//! A small tokenizer over the RTF control-word grammar, good enough for the
//! Cocoa RTF that Stickies writes: ignorable destinations (font/color tables,
//! `\*` groups, pictures, attachments) are dropped, paragraph and line
//! breaks become `\n`, and `\'hh` / `\uN` escapes are decoded. Formatting is
//! discarded; [`crate::convert`] uses pandoc when formatting matters.

/// Destinations whose content is never visible text.
const SKIP_DESTINATIONS: &[&str] = &[
    "fonttbl",
    "colortbl",
    "expandedcolortbl",
    "stylesheet",
    "info",
    "pict",
    "header",
    "headerl",
    "headerr",
    "headerf",
    "footer",
    "footerl",
    "footerr",
    "footerf",
    "listtable",
    "listoverridetable",
    "rsidtbl",
    "generator",
    "xmlnsdecl",
    "themedata",
    "colorschememapping",
    "datastore",
    "latentstyles",
    "fldinst",
    "NeXTGraphic",
    "object",
];

/// Windows-1252 code points for bytes 0x80..=0x9F; everything else maps to Latin-1.
const CP1252_HIGH: [char; 32] = [
    '€', '\u{81}', '‚', 'ƒ', '„', '…', '†', '‡', 'ˆ', '‰', 'Š', '‹', 'Œ', '\u{8d}', 'Ž',
    '\u{8f}', '\u{90}', '‘', '’', '“', '”', '•', '–', '—', '˜', '™', 'š', '›', 'œ', '\u{9d}',
    'ž', 'Ÿ',
];

/// Whether `text` starts like an RTF document.
pub fn is_rtf(text: &str) -> bool {
    text.trim_start().starts_with("{\\rtf")
}

/// Whether `bytes` start like an RTF document.
pub fn is_rtf_bytes(bytes: &[u8]) -> bool {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    bytes[start..].starts_with(b"{\\rtf")
}

/// Decode RTF bytes into a `String` without interpreting markup. RTF is
/// 7-bit by definition; stray high bytes are read as Windows-1252.
pub fn decode_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| cp1252(b)).collect(),
    }
}

fn cp1252(b: u8) -> char {
    match b {
        0x80..=0x9F => CP1252_HIGH[(b - 0x80) as usize],
        _ => b as char,
    }
}

#[derive(Clone, Copy)]
struct GroupState {
    skip: bool,
    /// Characters to drop after a `\uN` escape.
    uc: usize,
}

/// Strip RTF markup and return the visible text.
///
/// Input that is not RTF is returned unchanged.
pub fn strip_rtf(input: &str) -> String {
    if !is_rtf(input) {
        return input.to_string();
    }

    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() / 2);
    let mut stack: Vec<GroupState> = Vec::new();
    let mut state = GroupState { skip: false, uc: 1 };
    let mut pending_skip = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '{' => {
                stack.push(state);
                pending_skip = 0;
                i += 1;
            }
            '}' => {
                state = stack.pop().unwrap_or(GroupState { skip: false, uc: 1 });
                pending_skip = 0;
                i += 1;
            }
            '\\' => {
                i += 1;
                let Some(&next) = chars.get(i) else { break };
                if next.is_ascii_alphabetic() {
                    let start = i;
                    while i < chars.len() && chars[i].is_ascii_alphabetic() {
                        i += 1;
                    }
                    let word: String = chars[start..i].iter().collect();
                    let param_start = i;
                    if i < chars.len() && chars[i] == '-' {
                        i += 1;
                    }
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                    let param: Option<i64> = if i > param_start {
                        chars[param_start..i]
                            .iter()
                            .collect::<String>()
                            .parse()
                            .ok()
                    } else {
                        None
                    };
                    if i < chars.len() && chars[i] == ' ' {
                        i += 1;
                    }

                    if pending_skip > 0 {
                        pending_skip -= 1;
                        continue;
                    }
                    if SKIP_DESTINATIONS.contains(&word.as_str()) {
                        state.skip = true;
                        continue;
                    }
                    if state.skip {
                        continue;
                    }
                    match word.as_str() {
                        "par" | "line" | "sect" | "row" | "page" => out.push('\n'),
                        "tab" | "cell" => out.push('\t'),
                        "emdash" => out.push('—'),
                        "endash" => out.push('–'),
                        "bullet" => out.push('•'),
                        "lquote" => out.push('‘'),
                        "rquote" => out.push('’'),
                        "ldblquote" => out.push('“'),
                        "rdblquote" => out.push('”'),
                        "uc" => state.uc = param.unwrap_or(1).max(0) as usize,
                        "u" => {
                            if let Some(mut n) = param {
                                if n < 0 {
                                    n += 65536;
                                }
                                if let Some(ch) = char::from_u32(n as u32) {
                                    out.push(ch);
                                }
                                pending_skip = state.uc;
                            }
                        }
                        _ => {}
                    }
                } else {
                    i += 1;
                    match next {
                        '\'' => {
                            let hex: String = chars.iter().skip(i).take(2).collect();
                            i += hex.chars().count();
                            if pending_skip > 0 {
                                pending_skip -= 1;
                            } else if !state.skip {
                                if let Ok(b) = u8::from_str_radix(&hex, 16) {
                                    out.push(cp1252(b));
                                }
                            }
                        }
                        '*' => state.skip = true,
                        '\n' | '\r' => {
                            if !state.skip {
                                out.push('\n');
                            }
                        }
                        '\\' | '{' | '}' => {
                            if pending_skip > 0 {
                                pending_skip -= 1;
                            } else if !state.skip {
                                out.push(next);
                            }
                        }
                        '~' => {
                            if !state.skip {
                                out.push('\u{a0}');
                            }
                        }
                        '_' => {
                            if !state.skip {
                                out.push('-');
                            }
                        }
                        _ => {}
                    }
                }
            }
            '\r' | '\n' => i += 1,
            _ => {
                i += 1;
                if pending_skip > 0 {
                    pending_skip -= 1;
                } else if !state.skip {
                    out.push(c);
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const COCOA: &str = r"{\rtf1\ansi\ansicpg1252\cocoartf2639
\cocoatextscaling0\cocoaplatform0{\fonttbl\f0\fswiss\fcharset0 Helvetica;}
{\colortbl;\red255\green255\blue255;}
{\*\expandedcolortbl;;}
\pard\tx560\tx1120\pardirnatural\partightenfactor0

\f0\fs24 \cf0 Groceries\
Milk and \b eggs\b0 \
caf\'e9 \u8364 ?}";

    #[test]
    fn strips_cocoa_rtf() {
        let text = strip_rtf(COCOA);
        assert_eq!(text, "Groceries\nMilk and eggs\ncafé €");
    }

    #[test]
    fn non_rtf_passes_through() {
        assert_eq!(strip_rtf("plain {text}"), "plain {text}");
    }

    #[test]
    fn par_and_tab() {
        let text = strip_rtf(r"{\rtf1 one\par two\tab three}");
        assert_eq!(text, "one\ntwo\tthree");
    }

    #[test]
    fn escaped_braces_and_backslash() {
        let text = strip_rtf(r"{\rtf1 a\{b\}c\\d}");
        assert_eq!(text, r"a{b}c\d");
    }

    #[test]
    fn unicode_with_uc0_has_no_fallback() {
        let text = strip_rtf(r"{\rtf1\uc0 \u955 x}");
        assert_eq!(text, "λx");
    }

    #[test]
    fn negative_unicode_param() {
        // U+F8FF written as a signed 16-bit value
        let text = strip_rtf(r"{\rtf1 \u-1793?}");
        assert_eq!(text, "\u{f8ff}");
    }

    #[test]
    fn attachment_group_is_dropped() {
        let text = strip_rtf(r"{\rtf1 before {{\NeXTGraphic image.png \width640 \height480}}after}");
        assert_eq!(text, "before after");
    }

    #[test]
    fn detects_rtf() {
        assert!(is_rtf("  {\\rtf1 x}"));
        assert!(!is_rtf("hello"));
        assert!(is_rtf_bytes(b"\n{\\rtf1 x}"));
        assert!(!is_rtf_bytes(b""));
    }

    #[test]
    fn decodes_high_bytes_as_cp1252() {
        assert_eq!(decode_bytes(&[b'a', 0x93, b'b', 0x94]), "a“b”");
        assert_eq!(decode_bytes(b"plain"), "plain");
    }
}
