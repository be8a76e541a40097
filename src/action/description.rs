//! Keep the GitHub repository description in line with the README tagline.

use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::debug;

use super::Action;
use super::process::{capture, spawn_failure};
use crate::bridge;
use crate::context::{ExecutionContext, Outcome, truncate_chars};

/// GitHub's description length limit.
pub const MAX_DESCRIPTION_LENGTH: usize = 350;

const GH_TIMEOUT: Duration = Duration::from_secs(30);

static CENTERED_DIV: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<div[^>]*align=["']?center["']?[^>]*>(.*?)</div>"#)
        .expect("static regex is valid")
});
static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("static regex is valid"));
static TITLE_PARAGRAPH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^#\s+[^\n]+\n\n([^\n#]+)").expect("static regex is valid")
});

/// Pull a one-line tagline out of README content.
///
/// Prefers bold text inside a centred `<div>` (ignoring short fragments and
/// badge links), then the first paragraph after the top-level title.
pub fn extract_tagline(content: &str) -> Option<String> {
    if let Some(div) = CENTERED_DIV.captures(content) {
        let tagline = BOLD
            .captures_iter(&div[1])
            .map(|c| c[1].to_string())
            .find(|t| t.chars().count() > 15 && !t.to_lowercase().contains("http"));
        if let Some(tagline) = tagline {
            return Some(tagline.trim().to_string());
        }
    }

    let paragraph = TITLE_PARAGRAPH.captures(content)?[1].trim().to_string();
    if paragraph.chars().count() > 20 && !paragraph.starts_with('[') && !paragraph.starts_with('<') {
        Some(paragraph)
    } else {
        None
    }
}

/// Fit a description into `max` characters, marking the cut with `...`.
pub fn truncate_description(description: &str, max: usize) -> String {
    if description.chars().count() <= max {
        return description.to_string();
    }
    let head = truncate_chars(description, max.saturating_sub(3));
    format!("{}...", head.trim_end())
}

/// Read the README tagline and push it as the repository description via
/// `gh repo edit`.
pub struct DescriptionSync;

impl DescriptionSync {
    fn tagline(path: &Path) -> Option<String> {
        let content = match std::fs::read_to_string(path.join("README.md")) {
            Ok(c) => c,
            Err(e) => {
                debug!(error = %e, "failed to read README");
                return None;
            }
        };
        extract_tagline(&content).map(|t| truncate_description(&t, MAX_DESCRIPTION_LENGTH))
    }
}

impl Action for DescriptionSync {
    fn name(&self) -> &str {
        "description-sync"
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Outcome {
        if ctx.preview_only() {
            return self.preview(ctx);
        }
        let Some(tagline) = Self::tagline(ctx.path()) else {
            return Outcome::skipped("No tagline found in README").with_action(self.name());
        };
        let current = ctx.target.description.clone().unwrap_or_default();
        if tagline == current {
            return Outcome::skipped("Description already matches tagline").with_action(self.name());
        }

        let args = vec![
            "repo".to_string(),
            "edit".to_string(),
            ctx.target.full_name.clone(),
            "-d".to_string(),
            tagline.clone(),
        ];
        let cwd = ctx.path().to_path_buf();
        let name = self.name();
        bridge::run_action(ctx, name, GH_TIMEOUT, async {
            match capture("gh", &args, &cwd).await {
                Ok(out) if out.succeeded() => {
                    Outcome::success("Description synced with README tagline")
                        .with_action(name)
                        .with_meta("previous_description", current.clone())
                        .with_meta("new_description", tagline.clone())
                }
                Ok(out) => {
                    let error = if out.stderr.trim().is_empty() {
                        out.stdout.trim()
                    } else {
                        out.stderr.trim()
                    };
                    Outcome::failed(format!("gh command failed: {}", error)).with_action(name)
                }
                Err(e) => spawn_failure(
                    name,
                    &e,
                    Some("gh CLI not found - please install GitHub CLI"),
                ),
            }
        })
    }

    fn preview_message(&self, ctx: &ExecutionContext) -> String {
        format!("Would update description for {}", ctx.target.name)
    }
}
