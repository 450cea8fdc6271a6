//! Field-by-field comparison of two snapshots.
//!
//! Values are compared by their rendered text. Each differing field also gets
//! a small unified diff (longest-common-subsequence over lines) rendered as
//! escaped HTML for the history views.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffType {
    Added,
    Removed,
    Changed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDiff {
    pub field: String,
    pub diff_type: DiffType,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub diff_html: String,
}

/// Differences going from `old` to `new`, ordered by field name.
pub fn diff_snapshots(old: &Map<String, Value>, new: &Map<String, Value>) -> Vec<FieldDiff> {
    let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();

    keys.into_iter()
        .filter_map(|key| {
            let old_value = old.get(key).map(render_value);
            let new_value = new.get(key).map(render_value);
            if old_value.as_deref().unwrap_or("") == new_value.as_deref().unwrap_or("") {
                return None;
            }

            let diff_type = if !old.contains_key(key) {
                DiffType::Added
            } else if !new.contains_key(key) {
                DiffType::Removed
            } else {
                DiffType::Changed
            };

            let diff_html = unified_diff_html(
                old_value.as_deref().unwrap_or(""),
                new_value.as_deref().unwrap_or(""),
            );

            Some(FieldDiff {
                field: key.clone(),
                diff_type,
                old_value,
                new_value,
                diff_html,
            })
        })
        .collect()
}

/// Text form of a snapshot value. `null` renders as empty text, the same as a
/// missing key.
fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineOp<'a> {
    Keep(&'a str),
    Delete(&'a str),
    Insert(&'a str),
}

fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        Vec::new()
    } else {
        text.lines().collect()
    }
}

fn line_ops<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<LineOp<'a>> {
    let (n, m) = (old.len(), new.len());
    // lcs[i][j] = LCS length of old[i..] and new[j..]
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            ops.push(LineOp::Keep(old[i]));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            ops.push(LineOp::Delete(old[i]));
            i += 1;
        } else {
            ops.push(LineOp::Insert(new[j]));
            j += 1;
        }
    }
    ops.extend(old[i..].iter().copied().map(LineOp::Delete));
    ops.extend(new[j..].iter().copied().map(LineOp::Insert));
    ops
}

/// `start,len` the way unified diff headers spell it.
fn format_range(start: usize, len: usize) -> String {
    let beginning = if len == 0 { start } else { start + 1 };
    match len {
        1 => beginning.to_string(),
        _ => format!("{beginning},{len}"),
    }
}

/// Plain-text unified diff of two values, one hunk covering both.
pub fn unified_diff(old: &str, new: &str) -> Vec<String> {
    let old_lines = split_lines(old);
    let new_lines = split_lines(new);
    let ops = line_ops(&old_lines, &new_lines);
    if ops.iter().all(|op| matches!(op, LineOp::Keep(_))) {
        return Vec::new();
    }

    let mut out = vec![
        "--- old".to_string(),
        "+++ new".to_string(),
        format!(
            "@@ -{} +{} @@",
            format_range(0, old_lines.len()),
            format_range(0, new_lines.len())
        ),
    ];
    out.extend(ops.into_iter().map(|op| match op {
        LineOp::Keep(line) => format!(" {line}"),
        LineOp::Delete(line) => format!("-{line}"),
        LineOp::Insert(line) => format!("+{line}"),
    }));
    out
}

pub fn unified_diff_html(old: &str, new: &str) -> String {
    let lines = unified_diff(old, new);
    if lines.is_empty() {
        return String::new();
    }

    let body: Vec<String> = lines
        .iter()
        .map(|line| {
            let class = if line.starts_with("---") || line.starts_with("+++") {
                "diff-header"
            } else if line.starts_with("@@") {
                "diff-hunk"
            } else if line.starts_with('+') {
                "diff-add"
            } else if line.starts_with('-') {
                "diff-del"
            } else {
                "diff-context"
            };
            format!("<span class=\"{class}\">{}</span>", escape_html(line))
        })
        .collect();

    format!("<pre class=\"diff\">{}</pre>", body.join("\n"))
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
