//! Markdown pages with optional YAML front matter.
//!
//! ```markdown
//! ---
//! title: About
//! date: 2024-03-01
//! ---
//! # About this site
//! ...
//! ```
//!
//! Title falls back to the first `# heading`, then to the filename default.
//! `about.md` is written to `about/index.html`; `index.md` takes over its
//! directory's `index.html`.

use super::{Handler, HandlerError, Issue, Resolved};
use crate::config::HandlerOptions;
use crate::content::ContentItem;
use crate::extractor::MetadataParseError;
use crate::metadata::{self, MetadataRecord, MetadataValue};
use crate::model::{NodeKind, SiteNode, index_path, join_output};
use pulldown_cmark::{Options, Parser, html};
use tracing::warn;

pub struct PageHandler {
    options: HandlerOptions,
}

impl PageHandler {
    pub fn new(options: HandlerOptions) -> Self {
        Self { options }
    }
}

impl Handler for PageHandler {
    fn name(&self) -> &str {
        "page"
    }

    fn matches(&self, item: &ContentItem) -> bool {
        self.options.claims(&item.extension)
    }

    fn resolve_metadata(&self, item: &ContentItem) -> Resolved {
        let text = match item.read_to_string() {
            Ok(text) => text,
            Err(e) => {
                return Resolved {
                    record: MetadataRecord::new(),
                    issues: vec![Issue::Metadata(MetadataParseError::Io(e))],
                };
            }
        };

        let mut issues = Vec::new();
        let (front, body) = split_front_matter(&text);
        let mut record = match front.map(parse_front_matter).transpose() {
            Ok(record) => record.unwrap_or_default(),
            Err(e) => {
                warn!(item = %item.relative, error = %e, "ignoring front matter");
                issues.push(Issue::Metadata(e));
                MetadataRecord::new()
            }
        };
        record.normalize_date();

        let has_title = record.title().is_some_and(|t| !t.trim().is_empty());
        if !has_title && let Some(heading) = first_heading(body) {
            record.insert(metadata::TITLE, heading);
        }

        Resolved { record, issues }
    }

    fn process(
        &self,
        item: &ContentItem,
        metadata: &MetadataRecord,
    ) -> Result<Vec<SiteNode>, HandlerError> {
        let text = item.read_to_string()?;
        let (_, body) = split_front_matter(&text);

        let output_path = if item.stem() == "index" {
            index_path(item.dir())
        } else {
            join_output(item.dir(), &format!("{}/index.html", item.stem()))
        };

        Ok(vec![SiteNode {
            output_path,
            source: Some(item.relative.clone()),
            kind: NodeKind::Page {
                html: render_markdown(body),
                listing: None,
            },
            metadata: metadata.clone(),
        }])
    }
}

/// Split `---`-delimited front matter from the body.
///
/// Without an opening `---` on the first line, or without a closing `---`
/// (or `...`), the whole text is body.
fn split_front_matter(text: &str) -> (Option<&str>, &str) {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let Some(first_end) = text.find('\n') else {
        return (None, text);
    };
    if text[..first_end].trim_end() != "---" {
        return (None, text);
    }

    let rest = &text[first_end + 1..];
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            let front = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(front), body);
        }
        offset += line.len();
    }
    (None, text)
}

fn parse_front_matter(yaml: &str) -> Result<MetadataRecord, MetadataParseError> {
    if yaml.trim().is_empty() {
        return Ok(MetadataRecord::new());
    }
    let mapping: serde_yaml::Mapping = serde_yaml::from_str(yaml)?;
    let mut record = MetadataRecord::new();
    for (key, value) in mapping {
        let Some(key) = key.as_str() else {
            continue;
        };
        if let Some(value) = yaml_value(value) {
            record.insert(key, value);
        }
    }
    Ok(record)
}

/// Scalars and string lists; anything nested is dropped.
fn yaml_value(value: serde_yaml::Value) -> Option<MetadataValue> {
    match value {
        serde_yaml::Value::Bool(b) => Some(MetadataValue::Bool(b)),
        serde_yaml::Value::Number(n) => n
            .as_i64()
            .map(MetadataValue::Integer)
            .or_else(|| n.as_f64().map(MetadataValue::Float)),
        serde_yaml::Value::String(s) if s.trim().is_empty() => None,
        serde_yaml::Value::String(s) => Some(MetadataValue::Text(s)),
        serde_yaml::Value::Sequence(items) => items
            .into_iter()
            .map(|v| match v {
                serde_yaml::Value::String(s) => Some(s),
                serde_yaml::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(MetadataValue::List),
        _ => None,
    }
}

fn first_heading(body: &str) -> Option<String> {
    body.lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
}

fn render_markdown(body: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(body, options);
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::test_helpers::TestSite;

    fn handler() -> PageHandler {
        PageHandler::new(config::stock_config().handlers.page)
    }

    fn item(site: &TestSite, rel: &str) -> ContentItem {
        let content = site.path("content");
        ContentItem::new(&content, &content.join(rel)).unwrap()
    }

    #[test]
    fn split_front_matter_variants() {
        assert_eq!(
            split_front_matter("---\ntitle: A\n---\nbody\n"),
            (Some("title: A\n"), "body\n")
        );
        assert_eq!(split_front_matter("no front\n"), (None, "no front\n"));
        assert_eq!(
            split_front_matter("---\nunterminated\n"),
            (None, "---\nunterminated\n")
        );
        assert_eq!(split_front_matter("---\n...\nx"), (Some(""), "x"));
    }

    #[test]
    fn front_matter_fields() {
        let site = TestSite::new();
        site.write(
            "content/about.md",
            "---\ntitle: About\ndate: 2024-03-01\ntags: [a, b]\ndraft: false\n---\n# Heading\n",
        );
        let record = handler().resolve_metadata(&item(&site, "about.md")).record;
        assert_eq!(record.title(), Some("About"));
        assert_eq!(
            record.date().map(|d| d.canonical()).as_deref(),
            Some("2024-03-01T00:00:00")
        );
        assert_eq!(
            record.get("tags"),
            Some(&MetadataValue::List(vec!["a".into(), "b".into()]))
        );
        assert_eq!(record.get("draft"), Some(&MetadataValue::Bool(false)));
    }

    #[test]
    fn heading_is_title_fallback() {
        let site = TestSite::new();
        site.write("content/notes.md", "Intro\n\n# Field Notes\n\ntext\n");
        let record = handler().resolve_metadata(&item(&site, "notes.md")).record;
        assert_eq!(record.title(), Some("Field Notes"));
    }

    #[test]
    fn broken_front_matter_is_an_issue_not_a_failure() {
        let site = TestSite::new();
        site.write("content/bad.md", "---\ntitle: [unclosed\n---\n# Still Here\n");
        let resolved = handler().resolve_metadata(&item(&site, "bad.md"));
        assert_eq!(resolved.issues.len(), 1);
        assert_eq!(resolved.record.title(), Some("Still Here"));
    }

    #[test]
    fn output_paths() {
        let site = TestSite::new();
        site.write("content/about.md", "# About\n");
        site.write("content/animals/index.md", "# Animals\n");
        let record = MetadataRecord::new();

        let about = handler().process(&item(&site, "about.md"), &record).unwrap();
        assert_eq!(about[0].output_path, "about/index.html");

        let index = handler()
            .process(&item(&site, "animals/index.md"), &record)
            .unwrap();
        assert_eq!(index[0].output_path, "animals/index.html");
    }

    #[test]
    fn body_is_rendered_without_front_matter() {
        let site = TestSite::new();
        site.write("content/about.md", "---\ntitle: About\n---\nHello *world*\n");
        let nodes = handler()
            .process(&item(&site, "about.md"), &MetadataRecord::new())
            .unwrap();
        match &nodes[0].kind {
            NodeKind::Page { html, .. } => {
                assert_eq!(html.trim(), "<p>Hello <em>world</em></p>");
            }
            other => panic!("unexpected node {other:?}"),
        }
    }
}
