//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Build report
//!
//! ```text
//! Built 7 nodes (3 processed, 2 retained)
//! Skipped
//!     notes.xyz
//! Errors (1)
//!     animals/wolf.jpg
//!         sidecar: invalid date in animals/wolf.toml: ...
//! ```
//!
//! ## Site model
//!
//! ```text
//! Test Site → index.html
//!     Animals → animals/index.html
//!         animals/wolf.jpg
//!         Wolf → animals/wolf/index.html
//! ```
//!
//! Each display has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::model::{NodeKind, SiteModel, SiteNode};
use crate::orchestrator::BuildReport;
use std::error::Error;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

// ============================================================================
// Build report
// ============================================================================

pub fn format_build_report(report: &BuildReport) -> Vec<String> {
    let mut lines = Vec::new();
    let mut summary = format!(
        "Built {} ({} processed",
        plural(report.nodes, "node", "nodes"),
        report.processed
    );
    if report.incremental {
        summary.push_str(&format!(", {} retained", report.retained));
    }
    summary.push(')');
    lines.push(summary);

    if !report.skipped.is_empty() {
        lines.push("Skipped".to_string());
        for path in &report.skipped {
            lines.push(format!("{}{}", indent(1), path));
        }
    }

    if !report.errors.is_empty() {
        lines.push(format!("Errors ({})", report.errors.len()));
        let mut current: Option<&str> = None;
        for error in &report.errors {
            if current != Some(error.path.as_str()) {
                lines.push(format!("{}{}", indent(1), error.path));
                current = Some(&error.path);
            }
            lines.push(format!("{}{}: {}", indent(2), error.kind, error.message));
        }
    }
    lines
}

pub fn print_build_report(report: &BuildReport) {
    for line in format_build_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Site model
// ============================================================================

/// Depth of a node in the output tree: directory indexes sit at their
/// directory's depth, everything else one level below its directory.
fn node_depth(node: &SiteNode) -> usize {
    let slashes = node.output_path.matches('/').count();
    let is_index = node.output_path == "index.html" || node.output_path.ends_with("/index.html");
    match &node.kind {
        NodeKind::Index { .. } => slashes,
        NodeKind::Page { listing: Some(_), .. } => slashes,
        _ if is_index => slashes.max(1),
        _ => slashes + 1,
    }
}

pub fn format_model(model: &SiteModel) -> Vec<String> {
    let mut lines = Vec::new();
    let mut nodes: Vec<&SiteNode> = model.nodes().collect();
    nodes.sort_by(|a, b| sort_key(&a.output_path).cmp(&sort_key(&b.output_path)));

    for node in nodes {
        let depth = node_depth(node);
        let line = match (&node.kind, node.title()) {
            (NodeKind::Asset, _) | (_, None) => node.output_path.clone(),
            (_, Some(title)) => format!("{} → {}", title, node.output_path),
        };
        lines.push(format!("{}{}", indent(depth), line));
    }
    lines
}

/// `a/b/index.html` sorts as `a/b/` so an index precedes its siblings.
fn sort_key(output_path: &str) -> &str {
    output_path.strip_suffix("index.html").unwrap_or(output_path)
}

pub fn print_model(model: &SiteModel) {
    for line in format_model(model) {
        println!("{}", line);
    }
}

// ============================================================================
// Errors
// ============================================================================

pub fn format_unknown_command(name: &str, available: &[String]) -> Vec<String> {
    let mut lines = vec![format!("error: unknown command `{}`", name), "Available commands".to_string()];
    for command in available {
        lines.push(format!("{}{}", indent(1), command));
    }
    lines
}

pub fn print_unknown_command(name: &str, available: &[String]) {
    for line in format_unknown_command(name, available) {
        eprintln!("{}", line);
    }
}

/// An error and its chain of causes, one per line.
pub fn format_error(err: &dyn Error) -> Vec<String> {
    let mut lines = vec![format!("error: {}", err)];
    let mut source = err.source();
    while let Some(cause) = source {
        lines.push(format!("{}caused by: {}", indent(1), cause));
        source = cause.source();
    }
    lines
}

pub fn print_error(err: &dyn Error) {
    for line in format_error(err) {
        eprintln!("{}", line);
    }
}
