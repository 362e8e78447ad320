use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{build, declarations, deploy, remove, upload, watch, GlobalArgs};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "shipwright")]
#[command(version = VERSION)]
#[command(about = "CLI for building, packaging, and deploying entity extension projects")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Regenerate ambient declaration files for every project
    Declarations(declarations::DeclarationsArgs),
    /// Watch sources and refresh declarations on change
    Watch(watch::WatchArgs),
    /// Compile and package every project
    Build(build::BuildArgs),
    /// Build and upload artifacts to the configured server
    Upload(upload::UploadArgs),
    /// Build, upload, and invoke post-deployment services
    Deploy(deploy::DeployArgs),
    /// Remove previously imported packages from the server
    Remove(remove::RemoveArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let global = GlobalArgs {};

    let (json_result, exit_code) = commands::run_json(cli.command, &global);
    let _ = output::print_json_result(json_result);

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
