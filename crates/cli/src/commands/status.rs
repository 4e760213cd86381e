use anyhow::Result;
use photolala_core::Library;

pub fn run(library: &Library) -> Result<()> {
    let stats = library.stats()?;
    let current = library.current_snapshot().ok();

    let snapshot_display = match &current {
        Some(info) => format!(
            "{} ({}, {} rows)",
            short_hash(&info.hash),
            format_size(info.byte_size),
            info.row_count.unwrap_or(0)
        ),
        None => "none published".to_string(),
    };

    println!();
    println!("  Photolala Status");
    println!("  ================");
    println!();
    println!("   Library:    {}", library.root().display());
    println!("   Photos:     {:>8}", stats.total_entries);
    println!("   Pending:    {:>8}", stats.pending_entries);
    println!("   Snapshots:  {:>8}", stats.total_snapshots);
    println!("   Current:    {snapshot_display}");
    println!();
    println!("  Run 'photolala ls' to show the full photo table.");
    println!();

    Ok(())
}

pub(crate) fn short_hash(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}

pub(crate) fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    match bytes {
        b if b >= GB => format!("{:.1} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.1} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.1} KB", b as f64 / KB as f64),
        b => format!("{} B", b),
    }
}

pub(crate) fn format_date(unix_seconds: i64) -> String {
    chrono::DateTime::from_timestamp(unix_seconds, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size_bytes() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1023), "1023 B");
    }

    #[test]
    fn test_format_size_kilobytes() {
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
    }

    #[test]
    fn test_format_size_megabytes() {
        assert_eq!(format_size(1_048_576), "1.0 MB");
        assert_eq!(format_size(1_500_000), "1.4 MB");
    }

    #[test]
    fn test_format_size_gigabytes() {
        assert_eq!(format_size(1_073_741_824), "1.0 GB");
    }

    #[test]
    fn test_short_hash() {
        assert_eq!(short_hash("d41d8cd98f00b204e9800998ecf8427e"), "d41d8cd98f00");
        assert_eq!(short_hash("abc"), "abc");
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date(1718454600), "2024-06-15 12:30:00");
    }
}
