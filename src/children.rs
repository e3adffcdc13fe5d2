//! Parent/child bookkeeping over the issue tracker's `show` rendering.
//!
//! The rendering is human-oriented text. Sections start at a line holding
//! only the header and end at a blank line or the next header. Anything that
//! does not parse is treated as no match.

use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::context::SprintContext;

const SECTION_HEADERS: [&str; 8] = [
    "BLOCKS",
    "CHILDREN",
    "PARENT",
    "DESCRIPTION",
    "LABELS",
    "NOTES",
    "COMMENTS",
    "DEPENDS ON",
];

const OPEN_BLOCKED_MARKER: &str = "← ○";
const PARENT_MARKER: &str = "↑";
const CHILD_MARKER: &str = "↳";
const OPEN_CHILD_MARKERS: [&str; 2] = ["↳ ○", "↳ ◐"];

static BEAD_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]+-[A-Za-z0-9.]+$").unwrap());

/// Lines of the named section, without the header.
pub fn extract_section<'t>(rendering: &'t str, section: &str) -> Vec<&'t str> {
    rendering
        .lines()
        .skip_while(|line| line.trim() != section)
        .skip(1)
        .take_while(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !SECTION_HEADERS.contains(&trimmed)
        })
        .collect()
}

/// Identifier before the first `:` of `rest`, if it looks like one.
fn id_before_colon(rest: &str) -> Option<String> {
    let candidate = rest.split(':').next().unwrap_or_default().trim();
    BEAD_ID_RE
        .is_match(candidate)
        .then(|| candidate.to_string())
}

/// Open entries of the `BLOCKS` section (`← ○ id: title`).
pub fn parse_blocked_ids(rendering: &str) -> Vec<String> {
    let marker = format!("{OPEN_BLOCKED_MARKER} ");
    extract_section(rendering, "BLOCKS")
        .into_iter()
        .filter_map(|line| {
            let idx = line.find(&marker)?;
            id_before_colon(&line[idx + marker.len()..])
        })
        .collect()
}

/// Identifier from the `PARENT` section (`↑ <glyph> id: title`).
pub fn parse_parent_id(rendering: &str) -> Option<String> {
    extract_section(rendering, "PARENT")
        .into_iter()
        .find_map(|line| {
            let idx = line.find(PARENT_MARKER)?;
            let rest = line[idx + PARENT_MARKER.len()..].trim();
            let mut chars = rest.chars();
            let after_glyph = match (chars.next(), chars.as_str()) {
                (Some(_), tail) if !tail.is_empty() => tail.trim(),
                _ => rest,
            };
            id_before_colon(after_glyph)
        })
}

/// Children of the `CHILDREN` section that are open or in progress.
pub fn count_open_children(rendering: &str) -> usize {
    extract_section(rendering, "CHILDREN")
        .into_iter()
        .filter(|line| line.contains(CHILD_MARKER))
        .filter(|line| OPEN_CHILD_MARKERS.iter().any(|m| line.contains(m)))
        .count()
}

pub struct Hierarchy<'a> {
    ctx: &'a SprintContext,
}

impl<'a> Hierarchy<'a> {
    pub fn new(ctx: &'a SprintContext) -> Self {
        Self { ctx }
    }

    /// Close the open beads blocked by `epic`, then try to close the epic's
    /// parent. Returns how many children were closed.
    pub async fn close_children(&self, epic: &str, reason: Option<&str>) -> usize {
        let reason = reason
            .map(str::to_string)
            .unwrap_or_else(|| format!("Auto-closed: parent epic {epic} shipped"));
        if !self.ctx.tracker.available().await {
            return 0;
        }
        let rendering = match self.ctx.tracker.show(epic).await {
            Ok(rendering) => rendering,
            Err(e) => {
                debug!(epic, error = %e, "could not show epic");
                return 0;
            }
        };

        let mut closed = 0;
        for id in parse_blocked_ids(&rendering) {
            match self.ctx.tracker.close(&id, &reason).await {
                Ok(()) => closed += 1,
                Err(e) => warn!(id = %id, error = %e, "could not close child"),
            }
        }

        let parent_reason = format!("All children completed under epic {epic}");
        self.close_parent_if_done(epic, Some(&parent_reason)).await;
        closed
    }

    /// Close the parent of `bead` when it is still open and has no open
    /// children left. Returns the parent identifier when it was closed.
    pub async fn close_parent_if_done(&self, bead: &str, reason: Option<&str>) -> Option<String> {
        let reason = reason.unwrap_or("Auto-closed: all children completed");
        if !self.ctx.tracker.available().await {
            return None;
        }
        let rendering = self.ctx.tracker.show(bead).await.ok()?;
        let parent = parse_parent_id(&rendering)?;

        let parent_rendering = self.ctx.tracker.show(&parent).await.ok()?;
        let first_line = parent_rendering.lines().next().unwrap_or_default();
        if !first_line.contains("OPEN") && !first_line.contains("IN_PROGRESS") {
            return None;
        }
        if count_open_children(&parent_rendering) > 0 {
            return None;
        }

        match self.ctx.tracker.close(&parent, reason).await {
            Ok(()) => Some(parent),
            Err(e) => {
                warn!(parent = %parent, error = %e, "could not close parent");
                None
            }
        }
    }
}
