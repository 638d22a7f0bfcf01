//! Build command
use std::path::PathBuf;

use anyhow::{Result, bail};
use crossterm::style::Stylize;
use hats_core::{BuildRequest, PackBuilder};
use hats_schema::Catalog;

use crate::ops::Context;
use crate::ui::Printer;

/// Arguments of `hats build`.
#[derive(Debug, Clone, Default)]
pub struct BuildArgs {
    pub ids: Vec<String>,
    pub all: bool,
    pub defaults: bool,
    pub pins: Vec<(String, String)>,
    pub comment: Option<String>,
    pub output: PathBuf,
}

/// Build a pack, then cache any versions learned from upstream.
pub async fn build(ctx: &Context, args: BuildArgs) -> Result<()> {
    let mut catalog = ctx.catalog().await?;
    let ids = selection(&catalog, &args);
    if ids.is_empty() {
        bail!("Nothing selected: pass component ids, --all or --defaults");
    }

    let mut request = BuildRequest::new(ids);
    for (id, version) in args.pins {
        request = request.with_manual_version(id, version);
    }
    if let Some(comment) = args.comment {
        request = request.with_comment(comment);
    }

    let (reporter, printer) = Printer::spawn();
    let builder = PackBuilder::new(ctx.config.clone(), ctx.github(), reporter)
        .with_output_dir(&args.output);

    let token = builder.cancellation_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let result = builder.build(&catalog, &request).await;
    ctrl_c.abort();
    drop(builder);
    printer.finish().await;
    let outcome = result?;

    let mut cached = 0;
    for (id, version) in &outcome.fetched_versions {
        let current = catalog.get(id).and_then(|d| d.cached_version.as_deref());
        if current != Some(version.as_str()) && catalog.set_cached_version(id, version) {
            cached += 1;
        }
    }
    if cached > 0 {
        ctx.save_catalog(&catalog).await?;
        tracing::debug!("cached {cached} fetched versions");
    }

    let manifest = &outcome.manifest;
    println!();
    println!("{} {}", "Pack:".dark_grey(), outcome.pack_path.display());
    println!("{} {}", "Content hash:".dark_grey(), manifest.content_hash);
    println!(
        "{} {}",
        "Supported firmware:".dark_grey(),
        manifest.supported_firmware
    );
    println!(
        "{} {}",
        "Components:".dark_grey(),
        manifest.components.len()
    );
    if !outcome.changelog.is_empty() {
        println!("{}", "Changes since last build:".dark_grey());
        for change in &outcome.changelog {
            println!("  {change}");
        }
    }
    Ok(())
}

/// Resolve the selection flags into an ordered id list.
fn selection(catalog: &Catalog, args: &BuildArgs) -> Vec<String> {
    let mut ids: Vec<String> = if args.all {
        catalog.iter().map(|d| d.id().to_string()).collect()
    } else if args.defaults {
        catalog.default_selection()
    } else {
        Vec::new()
    };
    for id in &args.ids {
        if !ids.contains(id) {
            ids.push(id.clone());
        }
    }
    ids
}
