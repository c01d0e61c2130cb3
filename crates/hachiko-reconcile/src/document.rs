//! Migration document parsing
//!
//! A migration document is markdown with optional YAML frontmatter. Only
//! top-level task-list items written at column 0 with a `-` bullet count
//! toward progress; nested or indented items are sub-tasks and are ignored.

use pulldown_cmark::{Event, Options, Parser as MdParser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Checklist progress counted from a migration document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistSummary {
    /// Top-level checkbox items
    pub total_tasks: u32,
    /// Top-level checked items
    pub completed_tasks: u32,
    /// At least one task and every task checked
    pub all_tasks_complete: bool,
}

impl ChecklistSummary {
    /// Build a summary from counts
    #[inline]
    #[must_use]
    pub fn new(total_tasks: u32, completed_tasks: u32) -> Self {
        Self {
            total_tasks,
            completed_tasks,
            all_tasks_complete: total_tasks > 0 && completed_tasks >= total_tasks,
        }
    }
}

/// Frontmatter metadata of a migration document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MigrationFrontmatter {
    /// Migration id
    #[serde(default)]
    pub id: Option<String>,
    /// Title
    #[serde(default)]
    pub title: Option<String>,
    /// Preferred agent
    #[serde(default)]
    pub agent: Option<String>,
    /// Free-form status written by humans
    #[serde(default)]
    pub status: Option<String>,
    /// Declared number of steps
    #[serde(default)]
    pub total_steps: Option<u32>,
    /// Declared current step
    #[serde(default)]
    pub current_step: Option<u32>,
    /// Anything else
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Parsed migration document
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MigrationDocument {
    /// Frontmatter, when present and well-formed
    pub frontmatter: Option<MigrationFrontmatter>,
    /// Checklist progress of the body
    pub checklist: ChecklistSummary,
}

impl MigrationDocument {
    /// Parse a document; malformed frontmatter is dropped, the body is still parsed
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let (raw_frontmatter, body) = split_frontmatter(text);
        let frontmatter = raw_frontmatter.and_then(|raw| {
            serde_yaml::from_str::<MigrationFrontmatter>(raw)
                .map_err(|e| tracing::debug!("Ignoring malformed frontmatter: {}", e))
                .ok()
        });
        Self {
            frontmatter,
            checklist: parse_checklist(body),
        }
    }
}

/// Split `---` fenced frontmatter from the body
fn split_frontmatter(text: &str) -> (Option<&str>, &str) {
    let Some(rest) = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
    else {
        return (None, text);
    };
    match rest.find("\n---") {
        Some(end) => {
            let after = &rest[end + 4..];
            let body = after
                .strip_prefix("\r\n")
                .or_else(|| after.strip_prefix('\n'))
                .unwrap_or(after);
            (Some(&rest[..end]), body)
        }
        None => (None, text),
    }
}

/// Count top-level checkbox items (`- [ ]`, `- [x]`, `- [X]`)
#[must_use]
pub fn parse_checklist(markdown: &str) -> ChecklistSummary {
    let parser = MdParser::new_ext(markdown, Options::ENABLE_TASKLISTS).into_offset_iter();
    let bytes = markdown.as_bytes();

    let mut list_depth = 0usize;
    // One entry per open list item: whether it is a counted top-level item
    let mut items: Vec<bool> = Vec::new();
    let mut total = 0u32;
    let mut completed = 0u32;

    for (event, range) in parser {
        match event {
            Event::Start(Tag::List(_)) => list_depth += 1,
            Event::End(TagEnd::List(_)) => list_depth = list_depth.saturating_sub(1),
            Event::Start(Tag::Item) => {
                let at_column_zero = range.start == 0 || bytes.get(range.start - 1) == Some(&b'\n');
                let dash = bytes.get(range.start) == Some(&b'-');
                items.push(list_depth == 1 && at_column_zero && dash);
            }
            Event::End(TagEnd::Item) => {
                items.pop();
            }
            Event::TaskListMarker(checked) => {
                if items.last() == Some(&true) {
                    total += 1;
                    if checked {
                        completed += 1;
                    }
                }
            }
            _ => {}
        }
    }

    ChecklistSummary::new(total, completed)
}
