//! Trash command
use std::path::Path;

use anyhow::Result;
use crossterm::style::Stylize;
use hats_core::DeviceStore;

use crate::ui::Printer;

/// Delete the files of `ids` on `root` and move them to the trash.
pub async fn trash(root: &Path, ids: &[String]) -> Result<()> {
    let store = DeviceStore::new(root);
    let (reporter, printer) = Printer::spawn();
    let report = store.move_to_trash(ids, &reporter).await;
    drop(reporter);
    printer.finish().await;
    let report = report?;

    println!(
        "\n{} moved to trash, {} files deleted",
        report.moved.len(),
        report.removed_files
    );
    if !report.file_errors.is_empty() {
        println!(
            "{}",
            format!(
                "{} files could not be deleted; remove them by hand",
                report.file_errors.len()
            )
            .yellow()
        );
    }
    Ok(())
}
