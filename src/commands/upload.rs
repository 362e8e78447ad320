use clap::Args;
use shipwright::api::ServerClient;
use shipwright::config;
use shipwright::context::CommandContext;
use shipwright::pipeline::{self, Pipeline, PipelineOutcome};
use shipwright::transformer::CommandTransformer;

use crate::commands::{outcome_exit_code, CmdResult, GlobalArgs, PipelineFlags};

#[derive(Args)]
pub struct UploadArgs {
    #[command(flatten)]
    pub pipeline: PipelineFlags,

    /// Remove previously imported packages before uploading
    #[arg(long)]
    pub remove: bool,
}

pub(crate) fn server_client(ctx: &CommandContext) -> shipwright::Result<ServerClient> {
    let endpoint = config::resolve_server(&ctx.config.server)?;
    Ok(ServerClient::new(
        endpoint,
        ctx.config.entity_collections.clone(),
    ))
}

pub fn run(args: UploadArgs, _global: &GlobalArgs) -> CmdResult<PipelineOutcome> {
    let mut ctx = CommandContext::for_cwd()?;
    let transformer = CommandTransformer::from_context(&ctx)?;
    let client = server_client(&ctx)?;

    let pipeline = Pipeline::new(&transformer, Some(&client), args.pipeline.to_options());
    let outcome = pipeline.run(&mut ctx, &pipeline::stages_for_upload(args.remove))?;
    let exit_code = outcome_exit_code(&outcome);
    Ok((outcome, exit_code))
}
