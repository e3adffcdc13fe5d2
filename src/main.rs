use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use sprint::context::SprintContext;
use sprint::sprint_config::SprintConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "sprint")]
#[command(version, about = "Multi-session sprint orchestrator")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an epic and its run; prints the sprint identifier
    SprintCreate {
        title: Option<String>,
        /// 1-5, defaults to 3
        complexity: Option<String>,
        lane: Option<String>,
    },
    /// List active sprints as JSON
    SprintFindActive,
    /// Print a sprint's state snapshot as JSON
    SprintReadState { bead: Option<String> },
    /// Register a dispatched agent against a sprint
    SprintTrackAgent {
        bead: String,
        name: String,
        agent_type: Option<String>,
        dispatch_id: Option<String>,
    },
    /// Mark an agent finished
    SprintCompleteAgent {
        agent_id: String,
        status: Option<String>,
    },
    /// Delete cached discovery briefs
    SprintInvalidateCaches,

    /// Total token budget of a sprint
    BudgetTotal { bead: Option<String> },
    /// Run-level tokens left
    SprintBudgetRemaining { bead: Option<String> },
    /// Tokens allocated to a stage
    SprintBudgetStage { bead: Option<String>, stage: Option<String> },
    /// Stage tokens left
    SprintBudgetStageRemaining { bead: Option<String>, stage: Option<String> },
    /// Exit 1 with a budget_exceeded signal when the stage is depleted
    SprintBudgetStageCheck { bead: Option<String>, stage: Option<String> },
    /// Tokens recorded against a stage
    SprintStageTokensSpent { bead: Option<String>, stage: Option<String> },
    /// Add a phase's token usage to the ledger
    SprintRecordPhaseTokens {
        bead: Option<String>,
        phase: Option<String>,
        /// Actual billing tokens; the phase estimate is used otherwise
        #[arg(long)]
        tokens: Option<u64>,
    },

    /// Advance a sprint past its current phase
    SprintAdvance {
        bead: String,
        current_phase: String,
        artifact_path: Option<String>,
    },
    /// Next step for a phase
    SprintNextStep { phase: String },
    /// Exit 0 with a signal when the sprint should pause, 1 to continue
    SprintShouldPause { bead: String, target_phase: String },
    /// Fail when the gate for a phase is blocked
    EnforceGate {
        bead: String,
        target_phase: String,
        artifact_path: Option<String>,
    },
    /// Record phase completion
    RecordPhase { bead: String, phase: String },
    /// Enforce the gate, then record the phase
    AdvancePhase {
        bead: String,
        phase: String,
        reason: Option<String>,
        artifact_path: Option<String>,
    },
    /// Attach an artifact to the run's current phase
    SetArtifact {
        bead: String,
        #[arg(value_name = "TYPE")]
        kind: String,
        path: String,
    },
    /// Print the first artifact of a type
    GetArtifact {
        bead: String,
        #[arg(value_name = "TYPE")]
        kind: String,
    },
    /// Infer the next action as `<action>|<artifact>`
    InferAction { bead: String, status: Option<String> },
    /// Infer the bead an artifact belongs to
    InferBead { file: Option<PathBuf> },

    /// Merge a completed step into the checkpoint
    CheckpointWrite {
        bead: String,
        phase: String,
        step: String,
        plan_path: Option<String>,
        key_decision: Option<String>,
    },
    /// Print the checkpoint as JSON
    CheckpointRead { bead: Option<String> },
    /// Warn when the code moved since the checkpoint
    CheckpointValidate { bead: Option<String> },
    /// Remove the legacy checkpoint file
    CheckpointClear,
    /// Print completed steps as JSON
    CheckpointCompletedSteps { bead: Option<String> },
    /// Exit 0 when the step is done, 1 otherwise
    CheckpointStepDone { step: String, bead: Option<String> },

    /// Claim a sprint for a session
    SprintClaim { bead: String, session: String },
    /// Release a sprint claim
    SprintRelease { bead: Option<String> },
    /// Advisory claim on the issue record
    BeadClaim { bead: String, session: Option<String> },
    /// Release the advisory claim
    BeadRelease { bead: String },

    /// Close open beads blocked by an epic
    CloseChildren { epic: String, reason: Option<String> },
    /// Close the parent when all of its children are done
    CloseParentIfDone { bead: String, reason: Option<String> },

    /// Score a description on the 1-5 scale
    ClassifyComplexity {
        bead: String,
        #[arg(required = true, num_args = 1..)]
        description: Vec<String>,
    },
    /// Label for a complexity score
    ComplexityLabel { score: String },

    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    sprint::logging::init(cli.verbose);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config = SprintConfig::with_cli_args(project_dir, cli.verbose)?;
    let ctx = SprintContext::from_config(config);

    match cli.command {
        Commands::SprintCreate {
            title,
            complexity,
            lane,
        } => cmd::cmd_sprint_create(&ctx, title, complexity, lane).await,
        Commands::SprintFindActive => cmd::cmd_sprint_find_active(&ctx).await,
        Commands::SprintReadState { bead } => cmd::cmd_sprint_read_state(&ctx, bead).await,
        Commands::SprintTrackAgent {
            bead,
            name,
            agent_type,
            dispatch_id,
        } => cmd::cmd_sprint_track_agent(&ctx, &bead, &name, agent_type, dispatch_id).await,
        Commands::SprintCompleteAgent { agent_id, status } => {
            cmd::cmd_sprint_complete_agent(&ctx, &agent_id, status).await
        }
        Commands::SprintInvalidateCaches => cmd::cmd_sprint_invalidate_caches(&ctx).await,

        Commands::BudgetTotal { bead } => cmd::cmd_budget_total(&ctx, bead).await,
        Commands::SprintBudgetRemaining { bead } => cmd::cmd_budget_remaining(&ctx, bead).await,
        Commands::SprintBudgetStage { bead, stage } => {
            cmd::cmd_budget_stage(&ctx, bead, stage).await
        }
        Commands::SprintBudgetStageRemaining { bead, stage } => {
            cmd::cmd_budget_stage_remaining(&ctx, bead, stage).await
        }
        Commands::SprintBudgetStageCheck { bead, stage } => {
            cmd::cmd_budget_stage_check(&ctx, bead, stage).await
        }
        Commands::SprintStageTokensSpent { bead, stage } => {
            cmd::cmd_stage_tokens_spent(&ctx, bead, stage).await
        }
        Commands::SprintRecordPhaseTokens {
            bead,
            phase,
            tokens,
        } => cmd::cmd_record_phase_tokens(&ctx, bead, phase, tokens).await,

        Commands::SprintAdvance {
            bead,
            current_phase,
            artifact_path: _,
        } => cmd::cmd_sprint_advance(&ctx, &bead, &current_phase).await,
        Commands::SprintNextStep { phase } => cmd::cmd_sprint_next_step(&ctx, &phase).await,
        Commands::SprintShouldPause { bead, target_phase } => {
            cmd::cmd_sprint_should_pause(&ctx, &bead, &target_phase).await
        }
        Commands::EnforceGate {
            bead,
            target_phase,
            artifact_path: _,
        } => cmd::cmd_enforce_gate(&ctx, &bead, &target_phase).await,
        Commands::RecordPhase { bead: _, phase: _ } => cmd::cmd_record_phase(&ctx).await,
        Commands::AdvancePhase {
            bead,
            phase,
            reason: _,
            artifact_path: _,
        } => cmd::cmd_advance_phase(&ctx, &bead, &phase).await,
        Commands::SetArtifact { bead, kind, path } => {
            cmd::cmd_set_artifact(&ctx, &bead, &kind, &path).await
        }
        Commands::GetArtifact { bead, kind } => cmd::cmd_get_artifact(&ctx, &bead, &kind).await,
        Commands::InferAction { bead, status } => {
            cmd::cmd_infer_action(&ctx, &bead, status.as_deref()).await
        }
        Commands::InferBead { file } => cmd::cmd_infer_bead(&ctx, file.as_deref()),

        Commands::CheckpointWrite {
            bead,
            phase,
            step,
            plan_path,
            key_decision,
        } => {
            cmd::cmd_checkpoint_write(
                &ctx,
                &bead,
                &phase,
                &step,
                plan_path.as_deref(),
                key_decision.as_deref(),
            )
            .await
        }
        Commands::CheckpointRead { bead } => cmd::cmd_checkpoint_read(&ctx, bead.as_deref()).await,
        Commands::CheckpointValidate { bead } => {
            cmd::cmd_checkpoint_validate(&ctx, bead.as_deref()).await
        }
        Commands::CheckpointClear => cmd::cmd_checkpoint_clear(&ctx),
        Commands::CheckpointCompletedSteps { bead } => {
            cmd::cmd_checkpoint_completed_steps(&ctx, bead.as_deref()).await
        }
        Commands::CheckpointStepDone { step, bead } => {
            cmd::cmd_checkpoint_step_done(&ctx, &step, bead.as_deref()).await
        }

        Commands::SprintClaim { bead, session } => {
            cmd::cmd_sprint_claim(&ctx, &bead, &session).await
        }
        Commands::SprintRelease { bead } => cmd::cmd_sprint_release(&ctx, bead).await,
        Commands::BeadClaim { bead, session } => cmd::cmd_bead_claim(&ctx, &bead, session).await,
        Commands::BeadRelease { bead } => cmd::cmd_bead_release(&ctx, &bead).await,

        Commands::CloseChildren { epic, reason } => {
            cmd::cmd_close_children(&ctx, &epic, reason.as_deref()).await
        }
        Commands::CloseParentIfDone { bead, reason } => {
            cmd::cmd_close_parent_if_done(&ctx, &bead, reason.as_deref()).await
        }

        Commands::ClassifyComplexity { bead, description } => {
            cmd::cmd_classify_complexity(&ctx, &bead, &description.join(" ")).await
        }
        Commands::ComplexityLabel { score } => cmd::cmd_complexity_label(&score),

        Commands::Config { command } => cmd::cmd_config(&ctx, command),
    }
}
