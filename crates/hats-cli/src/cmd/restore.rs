//! Restore command
use std::path::Path;

use anyhow::Result;
use hats_core::DeviceStore;

use crate::ui::Printer;

/// Move `ids` back from the trash. Files return with the next install.
pub async fn restore(root: &Path, ids: &[String]) -> Result<()> {
    let store = DeviceStore::new(root);
    let (reporter, printer) = Printer::spawn();
    let report = store.restore(ids, &reporter).await;
    drop(reporter);
    printer.finish().await;
    let report = report?;

    println!("\n{} restored, {} skipped", report.moved.len(), report.skipped.len());
    if !report.moved.is_empty() {
        println!("  Install a pack containing them to bring their files back.");
    }
    Ok(())
}
