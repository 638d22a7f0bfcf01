//! Latest command
use std::path::Path;

use anyhow::Result;
use crossterm::style::Stylize;
use hats_core::io::download::HttpTransport;
use hats_core::latest::latest_pack;

use crate::ops::Context;
use crate::ui::Printer;

/// Download the newest published pack into `dest`.
pub async fn latest(ctx: &Context, dest: &Path, force: bool) -> Result<()> {
    let transport = HttpTransport::new(ctx.client.clone());
    let (reporter, printer) = Printer::spawn();
    let pack = latest_pack(&ctx.github(), &transport, &ctx.config, dest, force, &reporter).await;
    drop(reporter);
    printer.finish().await;
    let pack = pack?;

    let verb = if pack.downloaded { "Downloaded" } else { "Already have" };
    println!("{} {} ({})", verb.green(), pack.path.display(), pack.tag);
    Ok(())
}
