//! Table rendering for catalog and device listings.

use comfy_table::{Cell, Color, Table};
use hats_schema::{Catalog, DeviceManifest};

const NONE: &str = "-";

/// One row per catalog component.
pub fn catalog_table(catalog: &Catalog) -> Table {
    let mut table = Table::new();
    let _ = table.set_header(vec![
        Cell::new("Id").fg(Color::Blue),
        Cell::new("Name").fg(Color::Blue),
        Cell::new("Category").fg(Color::Blue),
        Cell::new("Source").fg(Color::Blue),
        Cell::new("Cached").fg(Color::Blue),
        Cell::new("Pinned").fg(Color::Blue),
        Cell::new("Default").fg(Color::Blue),
    ]);

    for desc in catalog.iter() {
        let pinned = match desc.manual_version.as_deref() {
            Some(v) => Cell::new(v).fg(Color::Yellow),
            None => Cell::new(NONE),
        };
        let _ = table.add_row(vec![
            Cell::new(desc.id()),
            Cell::new(desc.display_name()),
            Cell::new(&desc.category),
            Cell::new(desc.source.kind()),
            Cell::new(desc.cached_version.as_deref().unwrap_or(NONE)),
            pinned,
            Cell::new(if desc.default_selected { "yes" } else { "" }),
        ]);
    }
    table
}

/// Installed and trashed components of one SD card.
pub fn device_table(installed: &DeviceManifest, trash: &DeviceManifest) -> Table {
    let mut table = Table::new();
    let _ = table.set_header(vec![
        Cell::new("Id").fg(Color::Blue),
        Cell::new("Name").fg(Color::Blue),
        Cell::new("Version").fg(Color::Blue),
        Cell::new("Files").fg(Color::Blue),
        Cell::new("State").fg(Color::Blue),
    ]);

    let rows = installed
        .components
        .iter()
        .map(|entry| (entry, Cell::new("installed").fg(Color::Green)))
        .chain(
            trash
                .components
                .iter()
                .map(|entry| (entry, Cell::new("trash").fg(Color::DarkGrey))),
        );
    for ((id, entry), state) in rows {
        let _ = table.add_row(vec![
            Cell::new(id),
            Cell::new(&entry.name),
            Cell::new(&entry.version),
            Cell::new(entry.files.len()),
            state,
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use hats_schema::ManifestEntry;

    #[test]
    fn catalog_rows_show_versions() {
        let catalog = Catalog::from_json(
            r#"{
                "ftpd": {"name": "ftpd", "category": "Homebrew", "source_type": "github_release",
                         "repo": "mtheall/ftpd", "asset_pattern": "ftpd.nro",
                         "asset_info": {"version": "v3.2.0"}, "manual_version": "v3.1.0"}
            }"#,
        )
        .unwrap();
        let rendered = catalog_table(&catalog).to_string();
        assert!(rendered.contains("github_release"));
        assert!(rendered.contains("v3.2.0"));
        assert!(rendered.contains("v3.1.0"));
    }

    #[test]
    fn device_rows_mark_state() {
        let mut installed = DeviceManifest::default();
        installed.components.insert(
            "a".into(),
            ManifestEntry {
                name: "A".into(),
                version: "1.0".into(),
                files: vec!["switch/a.nro".into()],
                ..ManifestEntry::default()
            },
        );
        let mut trash = DeviceManifest::default();
        trash.components.insert("b".into(), ManifestEntry::default());

        let rendered = device_table(&installed, &trash).to_string();
        assert!(rendered.contains("installed"));
        assert!(rendered.contains("trash"));
    }
}
