use clap::Args;
use shipwright::context::CommandContext;
use shipwright::pipeline::{Pipeline, PipelineOptions, PipelineOutcome, Stage};
use shipwright::project;
use shipwright::transformer::CommandTransformer;

use crate::commands::upload::server_client;
use crate::commands::{outcome_exit_code, CmdResult, GlobalArgs};

#[derive(Args)]
pub struct RemoveArgs {
    /// Remove the combined workspace package instead of per-project packages
    #[arg(long)]
    pub merged: bool,

    /// Comma-separated project names to restrict the removal to
    #[arg(long, value_name = "NAMES")]
    pub projects: Option<String>,
}

pub fn run(args: RemoveArgs, _global: &GlobalArgs) -> CmdResult<PipelineOutcome> {
    let mut ctx = CommandContext::for_cwd()?;
    let transformer = CommandTransformer::from_context(&ctx)?;
    let client = server_client(&ctx)?;

    let options = PipelineOptions {
        merged: args.merged,
        projects: project::parse_project_filter(args.projects.as_deref()),
        ..PipelineOptions::default()
    };
    let pipeline = Pipeline::new(&transformer, Some(&client), options);
    let outcome = pipeline.run(&mut ctx, &[Stage::Remove])?;
    let exit_code = outcome_exit_code(&outcome);
    Ok((outcome, exit_code))
}
