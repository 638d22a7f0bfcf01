//! Status command
use std::path::Path;

use anyhow::Result;
use crossterm::style::Stylize;
use hats_core::DeviceStore;

use crate::ui::tables::device_table;

/// Show installed and trashed components on `root`.
pub async fn status(root: &Path) -> Result<()> {
    let store = DeviceStore::new(root);
    let state = store.load().await?;

    if let Some(pack) = state.installed.extra.get("pack_name").and_then(|v| v.as_str()) {
        println!("{} {pack}", format!("{:<18}", "Pack:").dark_grey());
    }
    if let Some(fw) = state
        .installed
        .extra
        .get("supported_firmware")
        .and_then(|v| v.as_str())
    {
        println!("{} {fw}", format!("{:<18}", "Firmware:").dark_grey());
    }

    if state.installed.is_empty() && state.trash.is_empty() {
        println!("  No HATS components recorded on {}.", root.display());
        return Ok(());
    }
    println!("{}", device_table(&state.installed, &state.trash));
    println!(
        "  {} installed, {} in trash",
        state.installed.components.len(),
        state.trash.components.len()
    );
    Ok(())
}
