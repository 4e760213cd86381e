use std::path::Path;

use anyhow::Result;
use photolala_core::{FsObjectStore, Library, SyncStatus};

use super::status::short_hash;

pub fn run(library: &Library, remote: &Path, user: &str) -> Result<()> {
    let store = FsObjectStore::open(remote)?;
    let report = library.sync(&store, user)?;

    println!();
    println!(
        "  Sync complete: {} uploaded, {} skipped, {} failed.",
        report.uploaded(),
        report.skipped(),
        report.failed()
    );
    if let Some(hash) = &report.snapshot_hash {
        println!("  Remote catalog snapshot: {}", short_hash(hash));
    }

    let failures: Vec<_> = report
        .items
        .iter()
        .filter_map(|item| match &item.status {
            SyncStatus::Failed(reason) => Some((item.digest.as_str(), reason.as_str())),
            _ => None,
        })
        .collect();
    if !failures.is_empty() {
        println!();
        println!("  Failures:");
        for (digest, reason) in failures {
            println!("    {}: {reason}", short_hash(digest));
        }
    }
    println!();

    Ok(())
}
