use clap::Args;
use shipwright::pipeline::PipelineOptions;
use shipwright::project;

pub type CmdResult<T> = shipwright::Result<(T, i32)>;

pub(crate) struct GlobalArgs {}

/// Pipeline flags shared by every build-backed command.
#[derive(Args, Debug, Default, Clone)]
pub struct PipelineFlags {
    /// Package every project's compiled output into one artifact
    #[arg(long)]
    pub merged: bool,

    /// One artifact per project plus a combined archive (default)
    #[arg(long, conflicts_with = "merged")]
    pub separate: bool,

    /// Pass debug emission through to the transformer
    #[arg(long)]
    pub debug: bool,

    /// Pass trace instrumentation through to the transformer
    #[arg(long)]
    pub trace: bool,

    /// Keep the stored version instead of bumping the patch number
    #[arg(long, alias = "retainVersion")]
    pub retain_version: bool,

    /// Comma-separated project names to restrict the run to
    #[arg(long, value_name = "NAMES")]
    pub projects: Option<String>,

    /// Also upload bundled archives from extensions/*.zip
    #[arg(long)]
    pub extensions: bool,
}

impl PipelineFlags {
    pub fn to_options(&self) -> PipelineOptions {
        PipelineOptions {
            merged: self.merged,
            debug: self.debug,
            trace: self.trace,
            retain_version: self.retain_version,
            include_extensions: self.extensions,
            projects: project::parse_project_filter(self.projects.as_deref()),
        }
    }
}

/// Partial failures are carried in the outcome rather than raised, so the
/// exit code is derived from it after the run.
pub(crate) fn outcome_exit_code(outcome: &shipwright::pipeline::PipelineOutcome) -> i32 {
    if outcome.success() {
        0
    } else {
        20
    }
}

pub mod build;
pub mod declarations;
pub mod deploy;
pub mod remove;
pub mod upload;
pub mod watch;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (shipwright::Result<serde_json::Value>, i32) {
    match command {
        crate::Commands::Declarations(args) => dispatch!(args, global, declarations),
        crate::Commands::Watch(args) => dispatch!(args, global, watch),
        crate::Commands::Build(args) => dispatch!(args, global, build),
        crate::Commands::Upload(args) => dispatch!(args, global, upload),
        crate::Commands::Deploy(args) => dispatch!(args, global, deploy),
        crate::Commands::Remove(args) => dispatch!(args, global, remove),
    }
}
