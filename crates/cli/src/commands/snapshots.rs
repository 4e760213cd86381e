use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use photolala_core::Library;

use super::status::{format_date, format_size, short_hash};

pub fn list(library: &Library) -> Result<()> {
    let snapshots = library.snapshots()?;
    if snapshots.is_empty() {
        println!("No snapshots published. Run `photolala scan` first.");
        return Ok(());
    }

    let current = library.current_snapshot().ok().map(|s| s.hash);

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Hash"),
        Cell::new("Created"),
        Cell::new("Rows"),
        Cell::new("Size"),
        Cell::new("Current"),
    ]);

    for info in &snapshots {
        let current_cell = if current.as_deref() == Some(info.hash.as_str()) {
            Cell::new("\u{2714}").fg(Color::Green)
        } else {
            Cell::new("")
        };
        // Listing does not read bodies; count rows per snapshot on demand.
        let rows = library
            .snapshot_rows(info)
            .map(|n| n.to_string())
            .unwrap_or_else(|_| "?".to_string());
        table.add_row(vec![
            Cell::new(short_hash(&info.hash)),
            Cell::new(format_date(info.created_at)),
            Cell::new(rows),
            Cell::new(format_size(info.byte_size)),
            current_cell,
        ]);
    }

    println!();
    println!("  Snapshots");
    println!("  ---------");
    println!("{table}");
    println!();

    Ok(())
}

pub fn prune(library: &Library, keep: usize) -> Result<()> {
    let deleted = library.prune_snapshots(Some(keep))?;
    println!("Pruned {deleted} snapshots (kept the newest {keep} plus the current one).");
    Ok(())
}
