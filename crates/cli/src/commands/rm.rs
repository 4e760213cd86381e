use anyhow::Result;
use photolala_core::Library;

use super::status::short_hash;

pub fn run(library: &Library, digest: &str) -> Result<()> {
    match library.remove(digest)? {
        Some(entry) => {
            println!(
                "Removed {} ({}, {} bytes) and published a new snapshot.",
                short_hash(digest),
                entry.format,
                entry.fast_key.file_size
            );
        }
        None => {
            println!("No catalog entry for digest {}.", short_hash(digest));
        }
    }
    Ok(())
}
