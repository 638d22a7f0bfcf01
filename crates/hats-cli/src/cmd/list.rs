//! List command
use anyhow::Result;

use crate::ops::Context;
use crate::ui::tables::catalog_table;

/// Print every catalog component.
pub async fn list(ctx: &Context) -> Result<()> {
    let catalog = ctx.catalog().await?;
    if catalog.is_empty() {
        println!();
        println!("  No components in {}.", ctx.catalog_path.display());
        return Ok(());
    }
    println!("{}", catalog_table(&catalog));
    println!("  {} components", catalog.len());
    Ok(())
}
