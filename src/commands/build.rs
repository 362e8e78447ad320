use clap::Args;
use shipwright::context::CommandContext;
use shipwright::pipeline::{self, Pipeline, PipelineOutcome};
use shipwright::transformer::CommandTransformer;

use crate::commands::{outcome_exit_code, CmdResult, GlobalArgs, PipelineFlags};

#[derive(Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub pipeline: PipelineFlags,
}

pub fn run(args: BuildArgs, _global: &GlobalArgs) -> CmdResult<PipelineOutcome> {
    let mut ctx = CommandContext::for_cwd()?;
    let transformer = CommandTransformer::from_context(&ctx)?;

    let pipeline = Pipeline::new(&transformer, None, args.pipeline.to_options());
    let outcome = pipeline.run(&mut ctx, &pipeline::stages_for_build())?;
    let exit_code = outcome_exit_code(&outcome);
    Ok((outcome, exit_code))
}
