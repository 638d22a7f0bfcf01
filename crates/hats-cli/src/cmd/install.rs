//! Install command
use std::path::Path;

use anyhow::Result;
use crossterm::style::Stylize;
use hats_core::DeviceStore;

use crate::ops::Context;
use crate::ui::Printer;

/// Fresh-install `pack` onto `root`.
pub async fn install(ctx: &Context, root: &Path, pack: &Path) -> Result<()> {
    let store = DeviceStore::new(root);
    let (reporter, printer) = Printer::spawn();
    let files = store
        .fresh_install(pack, &ctx.config.pack_prefix, &reporter)
        .await;
    drop(reporter);
    printer.finish().await;
    let files = files?;

    println!(
        "{} {} ({files} files)",
        "Installed".green(),
        pack.display()
    );
    Ok(())
}
