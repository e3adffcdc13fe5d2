//! Inferring what to do next, and for which bead, from run state and the
//! markdown artifacts under `docs/`.

use regex::Regex;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, warn};
use walkdir::WalkDir;

use sprint_common::phase::phase_to_action;

use crate::context::SprintContext;

const PLANS_DIR: &str = "docs/plans";
const PRDS_DIR: &str = "docs/prds";
const BRAINSTORMS_DIR: &str = "docs/brainstorms";

/// `**Bead:** iv-xxx`, `Bead: iv-xxx`, `**Bead**: iv-xxx`.
static BEAD_FRONTMATTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*{0,2}Bead\*{0,2}:\*{0,2}\s*([A-Za-z]+-[A-Za-z0-9]+)").unwrap()
});

/// `<action>|<artifact>`; the artifact may be empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inference {
    pub action: String,
    pub artifact: String,
}

impl Inference {
    fn new(action: &str, artifact: impl Into<String>) -> Self {
        Self {
            action: action.to_string(),
            artifact: artifact.into(),
        }
    }
}

impl fmt::Display for Inference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.action, self.artifact)
    }
}

/// Next action for `sprint`. The run's phase decides when it maps to an
/// action; otherwise the docs tree is searched for artifacts naming the bead.
pub async fn infer_action(ctx: &SprintContext, sprint: &str, status: Option<&str>) -> Inference {
    if let Some(inference) = from_phase(ctx, sprint).await {
        return inference;
    }

    let root = &ctx.config.project_dir;
    let plan = find_bead_artifact(sprint, &root.join(PLANS_DIR)).unwrap_or_default();
    if status == Some("in_progress") {
        return Inference::new("continue", plan);
    }
    if !plan.is_empty() {
        return Inference::new("execute", plan);
    }
    if let Some(prd) = find_bead_artifact(sprint, &root.join(PRDS_DIR)) {
        return Inference::new("plan", prd);
    }
    if let Some(brainstorm) = find_bead_artifact(sprint, &root.join(BRAINSTORMS_DIR)) {
        return Inference::new("strategize", brainstorm);
    }
    Inference::new("brainstorm", "")
}

async fn from_phase(ctx: &SprintContext, sprint: &str) -> Option<Inference> {
    let run_id = ctx.resolve_run_id(sprint).await.ok()?;
    let phase = ctx.store.run_phase(&run_id).await.ok()?;
    let action = phase_to_action(&phase);
    if action.is_empty() {
        return None;
    }
    let artifact = ctx
        .store
        .artifact_list(&run_id)
        .await
        .unwrap_or_default()
        .into_iter()
        .find(|a| a.phase == phase)
        .map(|a| a.path)
        .unwrap_or_default();
    debug!(sprint, phase = %phase, action, "inferred action from phase");
    Some(Inference::new(action, artifact))
}

/// First markdown file under `dir` with a line mentioning `Bead … <id>`.
pub fn find_bead_artifact(bead: &str, dir: &Path) -> Option<String> {
    if bead.is_empty() || !dir.is_dir() {
        return None;
    }
    let pattern = Regex::new(&format!(r"(?i)Bead.*{}\b", regex::escape(bead))).ok()?;

    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "md"))
        .find(|entry| {
            std::fs::read_to_string(entry.path())
                .map(|content| content.lines().any(|line| pattern.is_match(line)))
                .unwrap_or(false)
        })
        .map(|entry| entry.path().display().to_string())
}

/// Bead an artifact belongs to. The environment wins; then the file's
/// `Bead:` frontmatter, using the first when several are present.
pub fn infer_bead(env_bead: Option<&str>, file: Option<&Path>) -> Option<String> {
    if let Some(bead) = env_bead.filter(|b| !b.is_empty()) {
        return Some(bead.to_string());
    }
    let file = file?;
    let content = std::fs::read_to_string(file).ok()?;
    let matches: Vec<&str> = content
        .lines()
        .filter_map(|line| BEAD_FRONTMATTER_RE.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();

    let first = matches.first()?;
    if matches.len() > 1 {
        warn!(
            file = %file.display(),
            using = first,
            "multiple bead IDs found; set SPRINT_BEAD_ID for explicit control"
        );
    }
    Some(first.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::fixture;
    use crate::store::RunStore;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn phase_decides_when_it_has_an_action() {
        let fx = fixture();
        let run_id = fx.seed_run("iv-abc", 3, 250_000);
        fx.store.set_phase(&run_id, "strategized");
        fx.store
            .artifact_add(&run_id, "strategized", "docs/prds/p.md", "prd")
            .await
            .unwrap();

        let inference = infer_action(&fx.ctx, "iv-abc", None).await;
        assert_eq!(inference.to_string(), "plan|docs/prds/p.md");
    }

    #[tokio::test]
    async fn reflect_phase_falls_back_to_files() {
        let fx = fixture();
        let run_id = fx.seed_run("iv-abc", 3, 250_000);
        fx.store.set_phase(&run_id, "reflect");
        assert_eq!(infer_action(&fx.ctx, "iv-abc", None).await.to_string(), "brainstorm|");
    }

    #[tokio::test]
    async fn file_search_prefers_plan_then_prd_then_brainstorm() {
        let fx = fixture();
        let root = fx.dir.path();
        write(root, "docs/brainstorms/b.md", "**Bead:** iv-xyz\n");
        let found = infer_action(&fx.ctx, "iv-xyz", None).await;
        assert_eq!(found.action, "strategize");
        assert!(found.artifact.ends_with("docs/brainstorms/b.md"));

        write(root, "docs/prds/p.md", "bead: IV-XYZ\n");
        assert_eq!(infer_action(&fx.ctx, "iv-xyz", None).await.action, "plan");

        write(root, "docs/plans/nested/plan.md", "# Plan\nBead ref iv-xyz here\n");
        let plan = infer_action(&fx.ctx, "iv-xyz", None).await;
        assert_eq!(plan.action, "execute");
        assert!(plan.artifact.ends_with("docs/plans/nested/plan.md"));

        let cont = infer_action(&fx.ctx, "iv-xyz", Some("in_progress")).await;
        assert_eq!(cont.action, "continue");
        assert_eq!(cont.artifact, plan.artifact);
    }

    #[tokio::test]
    async fn in_progress_without_plan_continues_empty() {
        let fx = fixture();
        assert_eq!(
            infer_action(&fx.ctx, "iv-xyz", Some("in_progress")).await.to_string(),
            "continue|"
        );
    }

    #[test]
    fn bead_search_ignores_other_ids_and_non_markdown() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", "Bead: iv-xyz2\n");
        write(dir.path(), "b.txt", "Bead: iv-xyz\n");
        assert_eq!(find_bead_artifact("iv-xyz", dir.path()), None);
        assert_eq!(find_bead_artifact("iv-xyz", &dir.path().join("missing")), None);
    }

    #[test]
    fn infer_bead_env_wins() {
        assert_eq!(infer_bead(Some("iv-env"), None).as_deref(), Some("iv-env"));
        assert_eq!(infer_bead(Some(""), None), None);
    }

    #[test]
    fn infer_bead_reads_frontmatter_variants() {
        let dir = tempfile::tempdir().unwrap();
        for (name, line) in [
            ("a.md", "**Bead:** iv-aaa"),
            ("b.md", "Bead: iv-bbb"),
            ("c.md", "**Bead**: iv-ccc"),
        ] {
            write(dir.path(), name, &format!("# Title\n{line}\n"));
        }
        assert_eq!(infer_bead(None, Some(&dir.path().join("a.md"))).as_deref(), Some("iv-aaa"));
        assert_eq!(infer_bead(None, Some(&dir.path().join("b.md"))).as_deref(), Some("iv-bbb"));
        assert_eq!(infer_bead(None, Some(&dir.path().join("c.md"))).as_deref(), Some("iv-ccc"));
    }

    #[test]
    fn infer_bead_first_of_several() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "x.md", "Bead: iv-one\nBead: iv-two\n");
        assert_eq!(infer_bead(None, Some(&dir.path().join("x.md"))).as_deref(), Some("iv-one"));
        assert_eq!(infer_bead(None, Some(&dir.path().join("none.md"))), None);
    }
}
