use clap::Args;
use shipwright::context::CommandContext;
use shipwright::pipeline::{Pipeline, PipelineOptions, PipelineOutcome, Stage};
use shipwright::project;
use shipwright::transformer::CommandTransformer;

use crate::commands::{outcome_exit_code, CmdResult, GlobalArgs};

#[derive(Args)]
pub struct DeclarationsArgs {
    /// Comma-separated project names to restrict the refresh to
    #[arg(long, value_name = "NAMES")]
    pub projects: Option<String>,
}

pub fn run(args: DeclarationsArgs, _global: &GlobalArgs) -> CmdResult<PipelineOutcome> {
    let mut ctx = CommandContext::for_cwd()?;
    let transformer = CommandTransformer::from_context(&ctx)?;

    let options = PipelineOptions {
        projects: project::parse_project_filter(args.projects.as_deref()),
        ..PipelineOptions::default()
    };
    let pipeline = Pipeline::new(&transformer, None, options);
    let outcome = pipeline.run(&mut ctx, &[Stage::Declarations])?;
    let exit_code = outcome_exit_code(&outcome);
    Ok((outcome, exit_code))
}
