//! Rich-text conversion.
//!
//! Turns a note body into portable [`Block`]s (paragraphs, headings, list
//! items, quotes, code) with inline emphasis. Two [`RichTextConverter`]
//! implementations exist:
//!
//! - [`PandocConverter`] runs `pandoc -f rtf -t gfm` and parses the
//!   resulting markdown with pulldown-cmark.
//! - [`PlainTextConverter`] strips RTF markup and emits one unformatted
//!   paragraph.
//!
//! [`select_converter`] picks one at startup. [`convert_note`] never fails: a
//! failing engine degrades to plain text and the result says so.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use thiserror::Error;
use tokio::process::Command;

use crate::chunk::{chunk_text, MAX_TEXT_CHUNK};
use crate::config::{ConverterConfig, ConverterEngine};
use crate::models::{CanonicalNote, NoteBody};
use crate::normalize::normalize_text;
use crate::rtf;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("converter unavailable: {0}")]
    Unavailable(String),
    #[error("conversion failed: {0}")]
    Failed(String),
    #[error("converter timed out after {0}s")]
    Timeout(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph,
    /// Level 1–3.
    Heading(u8),
    BulletedItem,
    NumberedItem,
    Quote,
    Code,
}

/// A run of text with uniform styling.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Span {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub code: bool,
    pub link: Option<String>,
}

impl Span {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    fn same_style(&self, other: &Span) -> bool {
        self.bold == other.bold
            && self.italic == other.italic
            && self.strikethrough == other.strikethrough
            && self.code == other.code
            && self.link == other.link
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub spans: Vec<Span>,
}

impl Block {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Paragraph,
            spans: vec![Span::plain(text)],
        }
    }

    /// Concatenated text of all spans.
    pub fn text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }
}

/// Result of converting one note.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub blocks: Vec<Block>,
    /// True when formatting was lost because the engine could not be used.
    pub degraded: bool,
}

/// Converts RTF source into blocks.
#[async_trait]
pub trait RichTextConverter: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this converter keeps formatting. Plain text does not.
    fn preserves_formatting(&self) -> bool;

    async fn convert_rtf(&self, rtf: &str) -> Result<Vec<Block>, ConvertError>;
}

/// Strips markup; never fails.
pub struct PlainTextConverter;

#[async_trait]
impl RichTextConverter for PlainTextConverter {
    fn name(&self) -> &str {
        "plain"
    }

    fn preserves_formatting(&self) -> bool {
        false
    }

    async fn convert_rtf(&self, rtf_source: &str) -> Result<Vec<Block>, ConvertError> {
        Ok(plain_blocks(&rtf::strip_rtf(rtf_source)))
    }
}

/// Runs pandoc on a temporary `.rtf` file.
pub struct PandocConverter {
    program: PathBuf,
    timeout_secs: u64,
}

impl PandocConverter {
    pub fn new(program: PathBuf, timeout_secs: u64) -> Self {
        Self {
            program,
            timeout_secs,
        }
    }

    /// Whether the binary answers `--version`.
    pub async fn is_available(&self) -> bool {
        match Command::new(&self.program).arg("--version").output().await {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }

    async fn run(&self, cmd: &mut Command) -> Result<String, ConvertError> {
        let output = tokio::time::timeout(Duration::from_secs(self.timeout_secs), cmd.output())
            .await
            .map_err(|_| ConvertError::Timeout(self.timeout_secs))?
            .map_err(|e| ConvertError::Unavailable(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConvertError::Failed(format!(
                "pandoc exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl RichTextConverter for PandocConverter {
    fn name(&self) -> &str {
        "pandoc"
    }

    fn preserves_formatting(&self) -> bool {
        true
    }

    async fn convert_rtf(&self, rtf_source: &str) -> Result<Vec<Block>, ConvertError> {
        let mut tmpfile = tempfile::Builder::new()
            .suffix(".rtf")
            .tempfile()
            .map_err(|e| ConvertError::Failed(format!("temp file: {}", e)))?;
        tmpfile
            .write_all(rtf_source.as_bytes())
            .map_err(|e| ConvertError::Failed(format!("temp file: {}", e)))?;

        tracing::debug!(bytes = rtf_source.len(), "converting with pandoc");
        let markdown = self
            .run(
                Command::new(&self.program)
                    .arg("-f")
                    .arg("rtf")
                    .arg("-t")
                    .arg("gfm")
                    .arg("--wrap=none")
                    .arg(tmpfile.path()),
            )
            .await?;
        Ok(markdown_to_blocks(&markdown))
    }
}

/// Build the converter for this run, probing pandoc at most once.
pub async fn select_converter(
    config: &ConverterConfig,
) -> anyhow::Result<Box<dyn RichTextConverter>> {
    let pandoc = PandocConverter::new(config.pandoc_path.clone(), config.timeout_secs);
    match config.engine {
        ConverterEngine::Plain => Ok(Box::new(PlainTextConverter)),
        ConverterEngine::Pandoc => {
            if !pandoc.is_available().await {
                anyhow::bail!(
                    "converter.engine = \"pandoc\" but {} is not runnable",
                    config.pandoc_path.display()
                );
            }
            Ok(Box::new(pandoc))
        }
        ConverterEngine::Auto => {
            if pandoc.is_available().await {
                Ok(Box::new(pandoc))
            } else {
                tracing::warn!(
                    "pandoc not found; rich text will be imported as plain text"
                );
                Ok(Box::new(PlainTextConverter))
            }
        }
    }
}

/// Convert one note's body, falling back to plain text on any failure.
pub async fn convert_note(converter: &dyn RichTextConverter, note: &CanonicalNote) -> Conversion {
    let mut conversion = match &note.body {
        NoteBody::Plain(text) => Conversion {
            blocks: paragraphs(text),
            degraded: false,
        },
        NoteBody::Rich(source) => match converter.convert_rtf(source).await {
            Ok(blocks) => Conversion {
                blocks,
                degraded: !converter.preserves_formatting(),
            },
            Err(e) => {
                tracing::warn!(
                    note = %note.source_label,
                    "{} failed, importing as plain text: {}",
                    converter.name(),
                    e
                );
                Conversion {
                    blocks: plain_blocks(&note.plain_text),
                    degraded: true,
                }
            }
        },
    };
    if conversion.blocks.is_empty() {
        conversion.blocks.push(Block::paragraph(""));
    }
    conversion.blocks = split_long_spans(conversion.blocks);
    conversion
}

/// One unformatted paragraph holding the whole text.
pub fn plain_blocks(text: &str) -> Vec<Block> {
    vec![Block::paragraph(normalize_text(text))]
}

/// Paragraph blocks split on blank lines; single newlines are kept.
pub fn paragraphs(text: &str) -> Vec<Block> {
    normalize_text(text)
        .split("\n\n")
        .map(|p| p.trim_matches('\n'))
        .filter(|p| !p.trim().is_empty())
        .map(Block::paragraph)
        .collect()
}

/// Parse GitHub-flavored markdown into a flat list of blocks. Nested lists
/// are flattened; rules, HTML and images are dropped.
pub fn markdown_to_blocks(markdown: &str) -> Vec<Block> {
    let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    let mut builder = BlockBuilder::default();

    for event in Parser::new_ext(markdown, options) {
        match event {
            Event::Start(tag) => builder.start(tag),
            Event::End(tag) => builder.end(tag),
            Event::Text(text) => builder.text(&text, false),
            Event::Code(text) => builder.text(&text, true),
            Event::SoftBreak => builder.text(" ", false),
            Event::HardBreak => builder.text("\n", false),
            Event::TaskListMarker(checked) => {
                builder.text(if checked { "[x] " } else { "[ ] " }, false)
            }
            Event::Rule => builder.flush(),
            _ => {}
        }
    }
    builder.flush();
    builder.blocks
}

#[derive(Default)]
struct BlockBuilder {
    blocks: Vec<Block>,
    current: Option<Block>,
    lists: Vec<Option<u64>>,
    quote_depth: usize,
    bold: usize,
    italic: usize,
    strike: usize,
    link: Option<String>,
}

impl BlockBuilder {
    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => {
                if let Some(block) = self.current.as_mut() {
                    // second paragraph inside a list item
                    if !block.spans.is_empty() {
                        push_span(block, Span::plain("\n"));
                    }
                } else {
                    self.open(if self.quote_depth > 0 {
                        BlockKind::Quote
                    } else {
                        BlockKind::Paragraph
                    });
                }
            }
            Tag::Heading { level, .. } => {
                self.flush();
                self.open(BlockKind::Heading(heading_level(level)));
            }
            Tag::BlockQuote(_) => {
                self.flush();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(_) => {
                self.flush();
                self.open(BlockKind::Code);
            }
            Tag::List(start) => {
                self.flush();
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush();
                let kind = match self.lists.last() {
                    Some(Some(_)) => BlockKind::NumberedItem,
                    _ => BlockKind::BulletedItem,
                };
                self.open(kind);
            }
            Tag::Emphasis => self.italic += 1,
            Tag::Strong => self.bold += 1,
            Tag::Strikethrough => self.strike += 1,
            Tag::Link { dest_url, .. } => self.link = Some(dest_url.to_string()),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                if self.lists.is_empty() {
                    self.flush();
                }
            }
            TagEnd::Heading(_) | TagEnd::Item => self.flush(),
            TagEnd::CodeBlock => {
                if let Some(block) = self.current.as_mut() {
                    if let Some(last) = block.spans.last_mut() {
                        while last.text.ends_with('\n') {
                            last.text.pop();
                        }
                    }
                }
                self.flush();
            }
            TagEnd::BlockQuote(_) => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            TagEnd::List(_) => {
                self.flush();
                self.lists.pop();
            }
            TagEnd::Emphasis => self.italic = self.italic.saturating_sub(1),
            TagEnd::Strong => self.bold = self.bold.saturating_sub(1),
            TagEnd::Strikethrough => self.strike = self.strike.saturating_sub(1),
            TagEnd::Link => self.link = None,
            _ => {}
        }
    }

    fn text(&mut self, text: &str, code: bool) {
        if self.current.is_none() {
            self.open(if self.quote_depth > 0 {
                BlockKind::Quote
            } else {
                BlockKind::Paragraph
            });
        }
        let in_code_block = matches!(
            self.current.as_ref().map(|b| b.kind),
            Some(BlockKind::Code)
        );
        let span = Span {
            text: text.to_string(),
            bold: self.bold > 0,
            italic: self.italic > 0,
            strikethrough: self.strike > 0,
            code: code && !in_code_block,
            link: self.link.clone(),
        };
        if let Some(block) = self.current.as_mut() {
            push_span(block, span);
        }
    }

    fn open(&mut self, kind: BlockKind) {
        self.current = Some(Block {
            kind,
            spans: Vec::new(),
        });
    }

    fn flush(&mut self) {
        if let Some(block) = self.current.take() {
            if !block.text().trim().is_empty() {
                self.blocks.push(block);
            }
        }
    }
}

/// Notion has three heading levels; deeper ones become level 3.
fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        _ => 3,
    }
}

fn push_span(block: &mut Block, span: Span) {
    if let Some(last) = block.spans.last_mut() {
        if last.same_style(&span) {
            last.text.push_str(&span.text);
            return;
        }
    }
    block.spans.push(span);
}

/// Split spans longer than [`MAX_TEXT_CHUNK`] characters into several spans
/// with the same style.
pub fn split_long_spans(blocks: Vec<Block>) -> Vec<Block> {
    blocks
        .into_iter()
        .map(|block| {
            let spans = block
                .spans
                .into_iter()
                .flat_map(|span| {
                    if span.text.chars().count() <= MAX_TEXT_CHUNK {
                        return vec![span];
                    }
                    chunk_text(&span.text, MAX_TEXT_CHUNK)
                        .into_iter()
                        .map(|text| Span {
                            text,
                            ..span.clone()
                        })
                        .collect()
                })
                .collect();
            Block {
                kind: block.kind,
                spans,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NoteColor;
    use chrono::{TimeZone, Utc};

    struct FailingConverter;

    #[async_trait]
    impl RichTextConverter for FailingConverter {
        fn name(&self) -> &str {
            "failing"
        }
        fn preserves_formatting(&self) -> bool {
            true
        }
        async fn convert_rtf(&self, _rtf: &str) -> Result<Vec<Block>, ConvertError> {
            Err(ConvertError::Failed("boom".into()))
        }
    }

    fn note(body: NoteBody, plain: &str) -> CanonicalNote {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap().fixed_offset();
        CanonicalNote {
            source_label: "db#0".into(),
            title: "t".into(),
            body,
            plain_text: plain.into(),
            color: NoteColor::Yellow,
            created: ts,
            modified: ts,
            fingerprint: "f".into(),
        }
    }

    #[test]
    fn markdown_structure() {
        let md = "# Title\n\nSome **bold** and *italic* text.\n\n- one\n- two\n\n1. first\n2. second\n\n> quoted\n\n```\ncode line\n```\n";
        let blocks = markdown_to_blocks(md);
        let kinds: Vec<BlockKind> = blocks.iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::Heading(1),
                BlockKind::Paragraph,
                BlockKind::BulletedItem,
                BlockKind::BulletedItem,
                BlockKind::NumberedItem,
                BlockKind::NumberedItem,
                BlockKind::Quote,
                BlockKind::Code,
            ]
        );
        let para = &blocks[1];
        assert_eq!(para.text(), "Some bold and italic text.");
        assert!(para.spans.iter().any(|s| s.bold && s.text == "bold"));
        assert!(para.spans.iter().any(|s| s.italic && s.text == "italic"));
        assert_eq!(blocks[7].text(), "code line");
    }

    #[test]
    fn deep_headings_clamp_and_links_survive() {
        let blocks = markdown_to_blocks("##### Deep\n\nSee [site](https://example.com)\\\nnext\n");
        assert_eq!(blocks[0].kind, BlockKind::Heading(3));
        let link = blocks[1].spans.iter().find(|s| s.link.is_some()).unwrap();
        assert_eq!(link.text, "site");
        assert_eq!(link.link.as_deref(), Some("https://example.com"));
        assert!(blocks[1].text().contains("\nnext"));
    }

    #[test]
    fn task_items_and_strikethrough() {
        let blocks = markdown_to_blocks("- [x] done\n- [ ] ~~dropped~~\n");
        assert_eq!(blocks[0].text(), "[x] done");
        assert!(blocks[1].spans.iter().any(|s| s.strikethrough));
    }

    #[tokio::test]
    async fn failing_engine_degrades_to_plain_text() {
        let n = note(NoteBody::Rich(r"{\rtf1 Hello\par world}".into()), "Hello\nworld");
        let conv = convert_note(&FailingConverter, &n).await;
        assert!(conv.degraded);
        assert_eq!(conv.blocks, vec![Block::paragraph("Hello\nworld")]);
    }

    #[tokio::test]
    async fn plain_converter_marks_rich_bodies_degraded() {
        let n = note(NoteBody::Rich(r"{\rtf1 Hi}".into()), "Hi");
        let conv = convert_note(&PlainTextConverter, &n).await;
        assert!(conv.degraded);
        assert_eq!(conv.blocks[0].text(), "Hi");
    }

    #[tokio::test]
    async fn plain_bodies_are_paragraphs_and_not_degraded() {
        let n = note(NoteBody::Plain("a\nb\n\n\nc".into()), "a\nb\n\n\nc");
        let conv = convert_note(&PlainTextConverter, &n).await;
        assert!(!conv.degraded);
        let texts: Vec<String> = conv.blocks.iter().map(Block::text).collect();
        assert_eq!(texts, vec!["a\nb", "c"]);
    }

    #[tokio::test]
    async fn empty_note_gets_one_empty_paragraph() {
        let n = note(NoteBody::Plain(String::new()), "");
        let conv = convert_note(&PlainTextConverter, &n).await;
        assert_eq!(conv.blocks, vec![Block::paragraph("")]);
    }

    #[test]
    fn long_spans_are_split() {
        let long = "word ".repeat(1000);
        let blocks = split_long_spans(vec![Block::paragraph(long.clone())]);
        assert!(blocks[0].spans.len() > 1);
        assert!(blocks[0]
            .spans
            .iter()
            .all(|s| s.text.chars().count() <= MAX_TEXT_CHUNK));
        assert_eq!(blocks[0].text(), long);
    }

    #[tokio::test]
    async fn missing_pandoc_is_unavailable() {
        let pandoc = PandocConverter::new(PathBuf::from("/nonexistent/pandoc-binary"), 5);
        assert!(!pandoc.is_available().await);
        let err = pandoc.convert_rtf(r"{\rtf1 x}").await.unwrap_err();
        assert!(matches!(err, ConvertError::Unavailable(_)));
    }

    #[tokio::test]
    async fn auto_without_pandoc_selects_plain() {
        let cfg = ConverterConfig {
            engine: ConverterEngine::Auto,
            pandoc_path: PathBuf::from("/nonexistent/pandoc-binary"),
            timeout_secs: 5,
        };
        let converter = select_converter(&cfg).await.unwrap();
        assert_eq!(converter.name(), "plain");

        let strict = ConverterConfig {
            engine: ConverterEngine::Pandoc,
            ..cfg
        };
        assert!(select_converter(&strict).await.is_err());
    }
}
