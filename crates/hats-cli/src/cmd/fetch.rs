//! Fetch command
use anyhow::Result;
use crossterm::style::Stylize;
use hats_core::resolver::{FetchOutcome, fetch_versions};

use crate::ops::Context;
use crate::ui::Printer;

/// Refresh cached versions for `ids`, or the whole catalog when empty.
pub async fn fetch(ctx: &Context, ids: &[String]) -> Result<()> {
    let mut catalog = ctx.catalog().await?;
    let ids: Vec<String> = if ids.is_empty() {
        catalog.iter().map(|d| d.id().to_string()).collect()
    } else {
        ids.to_vec()
    };

    let (reporter, printer) = Printer::spawn();
    let summary = fetch_versions(&catalog, &ids, &ctx.github(), &ctx.config, &reporter).await;
    drop(reporter);
    printer.finish().await;

    for outcome in &summary.outcomes {
        match outcome {
            FetchOutcome::Updated { id, version } => {
                println!("  {} {id:<18} {version}", "✓".green());
            }
            FetchOutcome::Failed { id, reason, .. } => {
                println!("  {} {id:<18} {}", "✗".red(), reason.as_str().red());
            }
            FetchOutcome::Skipped { id, reason } => {
                println!("  {} {id:<18} {}", "-".dark_grey(), reason.as_str().dark_grey());
            }
        }
    }

    let changed = summary.apply(&mut catalog);
    if summary.updated() > 0 && changed > 0 {
        ctx.save_catalog(&catalog).await?;
    }

    println!(
        "\n{} updated, {} failed, {} skipped",
        summary.updated(),
        summary.failed(),
        summary.skipped()
    );
    if summary.rate_limited() {
        println!(
            "{}",
            "GitHub rate limit reached; set GITHUB_TOKEN to raise it.".yellow()
        );
    }
    Ok(())
}
