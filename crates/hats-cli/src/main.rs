//! hats - HATS pack builder CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hats_cli::cmd;
use hats_cli::cmd::build::BuildArgs;
use hats_cli::ops::Context;
use hats_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            ids,
            all,
            defaults,
            pins,
            comment,
            output,
        } => {
            let ctx = Context::load(cli.catalog).await?;
            let args = BuildArgs {
                ids,
                all,
                defaults,
                pins,
                comment,
                output,
            };
            cmd::build::build(&ctx, args).await
        }
        Commands::Fetch { ids } => {
            let ctx = Context::load(cli.catalog).await?;
            cmd::fetch::fetch(&ctx, &ids).await
        }
        Commands::List => {
            let ctx = Context::load(cli.catalog).await?;
            cmd::list::list(&ctx).await
        }
        Commands::Status { root } => cmd::status::status(&root).await,
        Commands::Trash { root, ids } => cmd::trash::trash(&root, &ids).await,
        Commands::Restore { root, ids } => cmd::restore::restore(&root, &ids).await,
        Commands::Install { root, pack } => {
            let ctx = Context::load(cli.catalog).await?;
            cmd::install::install(&ctx, &root, &pack).await
        }
        Commands::Latest { dest, force } => {
            let ctx = Context::load(cli.catalog).await?;
            cmd::latest::latest(&ctx, &dest, force).await
        }
    }
}
