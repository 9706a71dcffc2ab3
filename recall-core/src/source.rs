//! Where headings and their sections come from.
//!
//! A source hands out the raw markdown of a document. The reconciler only
//! needs its ordered headings ([`DocumentSource::headings`]); the review
//! side shows the section under a card's heading as its answer
//! ([`section`]). [`MarkdownVault`] reads files below a root directory;
//! [`MemorySource`] serves fixed content and backs the tests.

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use tracing::{debug, warn};

use crate::types::Heading;

/// Provider of document content.
pub trait DocumentSource: Send + Sync {
    /// Raw markdown of `path`, or `None` if the document does not exist.
    fn content(&self, path: &str) -> Option<String>;

    /// The headings of `path` in document order, or `None` if the document
    /// does not exist.
    fn headings(&self, path: &str) -> Option<Vec<Heading>> {
        self.content(path).map(|c| parse_headings(&c))
    }
}

/// A heading together with the byte range of its heading line(s).
#[derive(Debug, Clone, PartialEq, Eq)]
struct HeadingSpan {
    heading: Heading,
    span: Range<usize>,
}

fn heading_spans(content: &str) -> Vec<HeadingSpan> {
    let parser = Parser::new_ext(content, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH);
    let mut spans = Vec::new();
    let mut current: Option<(u8, String, Range<usize>)> = None;

    for (event, range) in parser.into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                current = Some((heading_level_to_int(level), String::new(), range));
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, text, span)) = current.take() {
                    let text = text.trim();
                    if !text.is_empty() {
                        spans.push(HeadingSpan {
                            heading: Heading::new(text, level),
                            span,
                        });
                    }
                }
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, buf, _)) = current.as_mut() {
                    buf.push_str(&text);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some((_, buf, _)) = current.as_mut() {
                    buf.push(' ');
                }
            }
            _ => {}
        }
    }

    spans
}

/// Extract the headings of markdown `content`, in order.
///
/// Both ATX (`## Title`) and setext headings are recognized. Inline markup
/// is reduced to its text; headings with no text are skipped.
#[must_use]
pub fn parse_headings(content: &str) -> Vec<Heading> {
    heading_spans(content).into_iter().map(|s| s.heading).collect()
}

/// The section under the first heading whose text is `heading`.
///
/// The section runs from the end of the heading to the next heading of the
/// same or a higher level (or the end of the document), trimmed. Deeper
/// subheadings belong to it. Returns `None` if no heading matches.
#[must_use]
pub fn section(content: &str, heading: &str) -> Option<String> {
    let spans = heading_spans(content);
    let index = spans.iter().position(|s| s.heading.text == heading)?;
    let own = &spans[index];
    let end = spans[index + 1..]
        .iter()
        .find(|s| s.heading.level <= own.heading.level)
        .map_or(content.len(), |s| s.span.start);
    let start = own.span.end.min(end);
    Some(content[start..end].trim().to_string())
}

fn heading_level_to_int(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

// ---------------------------------------------------------------------------
// MarkdownVault
// ---------------------------------------------------------------------------

/// A directory of markdown documents addressed by relative path.
#[derive(Debug, Clone)]
pub struct MarkdownVault {
    root: PathBuf,
}

impl MarkdownVault {
    /// A vault rooted at `root`.
    #[must_use]
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory of the vault.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem location of the document `path`.
    #[must_use]
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl DocumentSource for MarkdownVault {
    fn content(&self, path: &str) -> Option<String> {
        let file = self.resolve(path);
        match std::fs::read_to_string(&file) {
            Ok(content) => {
                debug!(path, bytes = content.len(), "Read document");
                Some(content)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %file.display(), error = %e, "Document unreadable; skipping");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MemorySource
// ---------------------------------------------------------------------------

/// In-memory documents keyed by path.
#[derive(Debug, Default)]
pub struct MemorySource {
    documents: RwLock<BTreeMap<String, String>>,
}

impl MemorySource {
    /// An empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the markdown content of `path`.
    pub fn insert(&self, path: &str, content: &str) {
        self.documents
            .write()
            .insert(path.to_string(), content.to_string());
    }

    /// Remove `path`; returns `true` if it existed.
    pub fn remove(&self, path: &str) -> bool {
        self.documents.write().remove(path).is_some()
    }

    /// Move the content of `old` to `new`; returns `false` if `old` is
    /// missing.
    pub fn rename(&self, old: &str, new: &str) -> bool {
        let mut documents = self.documents.write();
        let Some(content) = documents.remove(old) else {
            return false;
        };
        documents.insert(new.to_string(), content);
        true
    }
}

impl DocumentSource for MemorySource {
    fn content(&self, path: &str) -> Option<String> {
        self.documents.read().get(path).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atx_and_setext_headings_in_order() {
        let md = "# Ownership\n\ntext\n\nBorrowing\n---------\n\n### Lifetimes `'a`\n";
        let headings = parse_headings(md);
        assert_eq!(
            headings,
            vec![
                Heading::new("Ownership", 1),
                Heading::new("Borrowing", 2),
                Heading::new("Lifetimes 'a", 3),
            ]
        );
    }

    #[test]
    fn inline_markup_is_flattened() {
        let headings = parse_headings("## The **borrow** _checker_ [docs](http://x)\n");
        assert_eq!(headings, vec![Heading::new("The borrow checker docs", 2)]);
    }

    #[test]
    fn no_headings_is_empty() {
        assert!(parse_headings("just a paragraph\n\n- and a list\n").is_empty());
        assert!(parse_headings("").is_empty());
        assert!(parse_headings("#\n").is_empty());
    }

    #[test]
    fn code_fences_are_not_headings() {
        let headings = parse_headings("```\n# not a heading\n```\n# Real\n");
        assert_eq!(headings, vec![Heading::new("Real", 1)]);
    }

    #[test]
    fn section_runs_to_next_heading_of_same_level() {
        let md = "# Ownership\nEach value has one owner.\n\n## Moves\nAssignment moves.\n\n# Traits\nShared behaviour.\n";
        assert_eq!(
            section(md, "Ownership").expect("found"),
            "Each value has one owner.\n\n## Moves\nAssignment moves."
        );
        assert_eq!(section(md, "Moves").expect("found"), "Assignment moves.");
        assert_eq!(section(md, "Traits").expect("found"), "Shared behaviour.");
        assert!(section(md, "Lifetimes").is_none());
    }

    #[test]
    fn section_of_setext_and_empty_headings() {
        let md = "Borrowing\n=========\n\nOne mutable or many shared.\n\n# Next\n";
        assert_eq!(section(md, "Borrowing").expect("found"), "One mutable or many shared.");
        assert_eq!(section(md, "Next").expect("found"), "");
    }

    #[test]
    fn vault_reads_relative_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("notes")).expect("mkdir");
        std::fs::write(dir.path().join("notes/rust.md"), "# Traits\n## Generics\n").expect("write");

        let vault = MarkdownVault::new(dir.path());
        let headings = vault.headings("notes/rust.md").expect("exists");
        assert_eq!(headings.len(), 2);
        assert_eq!(headings[1], Heading::new("Generics", 2));
        assert!(vault.headings("notes/missing.md").is_none());
    }

    #[test]
    fn memory_source_rename_and_remove() {
        let source = MemorySource::new();
        source.insert("a.md", "# A\n");
        assert!(source.rename("a.md", "b.md"));
        assert!(source.headings("a.md").is_none());
        assert_eq!(source.headings("b.md").expect("b").len(), 1);
        assert!(source.remove("b.md"));
        assert!(!source.rename("b.md", "c.md"));
    }
}
