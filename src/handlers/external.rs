//! Handlers implemented by external programs.
//!
//! The program is run once per item with the item path as its only argument
//! and the item's metadata as JSON on stdin. It answers on stdout with a JSON
//! array of nodes:
//!
//! ```json
//! [{ "output_path": "raw/IMG_1.html", "content": "<html>…</html>", "metadata": {"title": "…"} }]
//! ```
//!
//! Node metadata is merged over the item's record. A non-zero exit status
//! fails the item with the program's stderr.

use super::{Handler, HandlerError, Resolved};
use crate::content::ContentItem;
use crate::metadata::{self, MetadataRecord};
use crate::model::{NodeKind, SiteNode};
use crate::plugins;
use crate::sidecar;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, warn};

pub struct ExternalHandler {
    name: String,
    program: PathBuf,
    extensions: Vec<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ExternalNode {
    output_path: String,
    content: String,
    #[serde(default)]
    metadata: MetadataRecord,
}

impl ExternalHandler {
    pub fn new(name: &str, program: PathBuf, extensions: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            program,
            extensions,
        }
    }

    fn run(&self, item: &ContentItem, input: &[u8]) -> Result<Vec<u8>, HandlerError> {
        debug!(handler = %self.name, item = %item.relative, "running external handler");
        let output = plugins::run_with_input(Command::new(&self.program).arg(&item.path), input)?;
        if !output.status.success() {
            return Err(HandlerError::External {
                handler: self.name.clone(),
                message: format!(
                    "{} ({})",
                    String::from_utf8_lossy(&output.stderr).trim(),
                    output.status
                ),
            });
        }
        Ok(output.stdout)
    }
}

impl Handler for ExternalHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, item: &ContentItem) -> bool {
        self.extensions.iter().any(|e| *e == item.extension)
    }

    /// External handlers get sidecar metadata only.
    fn resolve_metadata(&self, item: &ContentItem) -> Resolved {
        match sidecar::resolve(&item.path) {
            Ok(record) => Resolved {
                record: record.unwrap_or_default(),
                issues: Vec::new(),
            },
            Err(e) => {
                warn!(item = %item.relative, error = %e, "ignoring sidecar");
                Resolved {
                    record: MetadataRecord::new(),
                    issues: vec![e.into()],
                }
            }
        }
    }

    fn process(
        &self,
        item: &ContentItem,
        metadata: &MetadataRecord,
    ) -> Result<Vec<SiteNode>, HandlerError> {
        let input = serde_json::to_vec(metadata).map_err(|source| HandlerError::ExternalOutput {
            handler: self.name.clone(),
            source,
        })?;
        let stdout = self.run(item, &input)?;
        let nodes: Vec<ExternalNode> =
            serde_json::from_slice(&stdout).map_err(|source| HandlerError::ExternalOutput {
                handler: self.name.clone(),
                source,
            })?;

        nodes
            .into_iter()
            .map(|node| {
                if !is_safe_output_path(&node.output_path) {
                    return Err(HandlerError::OutputPath {
                        handler: self.name.clone(),
                        path: node.output_path,
                    });
                }
                Ok(SiteNode {
                    output_path: node.output_path,
                    source: Some(item.relative.clone()),
                    kind: NodeKind::External {
                        content: node.content,
                    },
                    metadata: metadata::merge(metadata.clone(), Some(node.metadata)),
                })
            })
            .collect()
    }
}

/// Relative, `/`-separated, and staying inside the output root.
fn is_safe_output_path(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && path
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::TestSite;

    #[test]
    fn output_path_safety() {
        assert!(is_safe_output_path("raw/IMG_1.html"));
        assert!(!is_safe_output_path("/etc/passwd"));
        assert!(!is_safe_output_path("../escape.html"));
        assert!(!is_safe_output_path("a//b"));
        assert!(!is_safe_output_path(""));
    }

    #[test]
    fn matches_declared_extensions_only() {
        let handler = ExternalHandler::new("raw", PathBuf::from("/bin/true"), vec!["cr2".into()]);
        let site = TestSite::new();
        site.write("content/a.cr2", b"x");
        site.write("content/a.jpg", b"x");
        let content = site.path("content");
        let cr2 = ContentItem::new(&content, &content.join("a.cr2")).unwrap();
        let jpg = ContentItem::new(&content, &content.join("a.jpg")).unwrap();
        assert!(handler.matches(&cr2));
        assert!(!handler.matches(&jpg));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        fn script(site: &TestSite, body: &str) -> PathBuf {
            let path = site.write("plugins/handler.sh", format!("#!/bin/sh\n{body}\n"));
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn raw_item(site: &TestSite) -> ContentItem {
            site.write("content/shots/IMG_1.cr2", b"raw");
            let content = site.path("content");
            ContentItem::new(&content, &content.join("shots/IMG_1.cr2")).unwrap()
        }

        #[test]
        fn runs_program_and_merges_metadata() {
            let site = TestSite::new();
            let program = script(
                &site,
                r#"cat > /dev/null
echo '[{"output_path": "shots/IMG_1.html", "content": "<p>raw</p>", "metadata": {"camera_model": "EOS R5"}}]'"#,
            );
            let handler = ExternalHandler::new("raw", program, vec!["cr2".into()]);
            let record = MetadataRecord::new().with(metadata::TITLE, "Frame One");
            let nodes = handler.process(&raw_item(&site), &record).unwrap();

            assert_eq!(nodes.len(), 1);
            assert_eq!(nodes[0].output_path, "shots/IMG_1.html");
            assert_eq!(nodes[0].source.as_deref(), Some("shots/IMG_1.cr2"));
            assert_eq!(nodes[0].title(), Some("Frame One"));
            assert_eq!(
                nodes[0].metadata.get(metadata::CAMERA_MODEL),
                Some(&"EOS R5".into())
            );
        }

        #[test]
        fn failing_program_is_handler_error() {
            let site = TestSite::new();
            let program = script(&site, "echo 'no decoder' >&2\nexit 3");
            let handler = ExternalHandler::new("raw", program, vec!["cr2".into()]);
            let err = handler
                .process(&raw_item(&site), &MetadataRecord::new())
                .unwrap_err();
            match err {
                HandlerError::External { message, .. } => assert!(message.contains("no decoder")),
                other => panic!("unexpected error {other}"),
            }
        }

        #[test]
        fn garbage_output_is_handler_error() {
            let site = TestSite::new();
            let program = script(&site, "echo 'not json'");
            let handler = ExternalHandler::new("raw", program, vec!["cr2".into()]);
            assert!(matches!(
                handler.process(&raw_item(&site), &MetadataRecord::new()),
                Err(HandlerError::ExternalOutput { .. })
            ));
        }

        #[test]
        fn chatty_program_with_large_metadata_completes() {
            let site = TestSite::new();
            let program = script(
                &site,
                r#"cat >&2
echo '[{"output_path": "shots/IMG_1.html", "content": "ok"}]'"#,
            );
            let handler = ExternalHandler::new("raw", program, vec!["cr2".into()]);
            let record =
                MetadataRecord::new().with(metadata::DESCRIPTION, "wolf ".repeat(200_000));
            let nodes = handler.process(&raw_item(&site), &record).unwrap();
            assert_eq!(nodes.len(), 1);
        }

        #[test]
        fn escaping_output_path_is_rejected() {
            let site = TestSite::new();
            let program = script(
                &site,
                r#"echo '[{"output_path": "../outside.html", "content": ""}]'"#,
            );
            let handler = ExternalHandler::new("raw", program, vec!["cr2".into()]);
            assert!(matches!(
                handler.process(&raw_item(&site), &MetadataRecord::new()),
                Err(HandlerError::OutputPath { .. })
            ));
        }
    }
}
