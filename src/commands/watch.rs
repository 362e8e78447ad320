use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Args;
use serde::Serialize;
use shipwright::context::CommandContext;
use shipwright::pipeline::{Pipeline, PipelineOptions, Stage};
use shipwright::project;
use shipwright::transformer::CommandTransformer;
use shipwright::watch::watch_sources;

use crate::commands::{CmdResult, GlobalArgs};

#[derive(Args)]
pub struct WatchArgs {
    /// Comma-separated project names to restrict rebuilds to
    #[arg(long, value_name = "NAMES")]
    pub projects: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchSummary {
    pub runs: usize,
}

pub fn run(args: WatchArgs, _global: &GlobalArgs) -> CmdResult<WatchSummary> {
    let ctx = CommandContext::for_cwd()?;
    let filter = project::parse_project_filter(args.projects.as_deref());
    let sources_root = ctx.sources_root();

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(false, Ordering::SeqCst);
    })
    .map_err(|e| {
        shipwright::Error::internal_unexpected(format!("failed to set Ctrl+C handler: {}", e))
    })?;

    let runs = Cell::new(0usize);
    let rebuild = || -> shipwright::Result<()> {
        // Reload per run so project additions and config edits are seen.
        let mut run_ctx = CommandContext::load(&ctx.workspace_root)?;
        let transformer = CommandTransformer::from_context(&run_ctx)?;
        let options = PipelineOptions {
            projects: filter.clone(),
            ..PipelineOptions::default()
        };
        Pipeline::new(&transformer, None, options)
            .run(&mut run_ctx, &[Stage::Declarations])?;
        runs.set(runs.get() + 1);
        Ok(())
    };

    rebuild()?;
    watch_sources(&sources_root, running, rebuild)?;

    Ok((WatchSummary { runs: runs.get() }, 0))
}
