use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use photolala_core::{CatalogEntry, Library};

use super::status::{format_date, format_size, short_hash};

pub fn run(library: &Library) -> Result<()> {
    let mut entries = library.cached_entries();
    if entries.is_empty() {
        println!("Catalog is empty. Run `photolala scan` first.");
        return Ok(());
    }

    // Newest first.
    entries.sort_by(|a, b| {
        b.capture_or_file_date
            .cmp(&a.capture_or_file_date)
            .then_with(|| a.fast_key.head_digest.cmp(&b.fast_key.head_digest))
    });

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Digest"),
        Cell::new("Date"),
        Cell::new("Fmt"),
        Cell::new("Size"),
        Cell::new("Thumb"),
    ]);

    let pending = entries.iter().filter(|e| e.full_digest.is_none()).count();
    for entry in &entries {
        add_entry_row(&mut table, entry, library);
    }

    println!();
    println!("  Photos");
    println!("  ------");
    println!("{table}");
    println!();
    println!("  {} photos ({} pending full digest)", entries.len(), pending);
    println!();

    Ok(())
}

fn add_entry_row(table: &mut Table, entry: &CatalogEntry, library: &Library) {
    let digest_cell = match &entry.full_digest {
        Some(digest) => Cell::new(short_hash(digest)),
        None => Cell::new("pending").fg(Color::Yellow),
    };

    let thumb_cell = match entry
        .full_digest
        .as_deref()
        .and_then(|d| library.thumbnail_path(d))
    {
        Some(_) => Cell::new("\u{2714}").fg(Color::Green),
        None => Cell::new(""),
    };

    table.add_row(vec![
        digest_cell,
        Cell::new(format_date(entry.capture_or_file_date)),
        Cell::new(entry.format.as_str()),
        Cell::new(format_size(entry.fast_key.file_size)),
        thumb_cell,
    ]);
}
