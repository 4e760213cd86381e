//! Fixed-schema CSV serialization for the catalog.
//!
//! Current schema (header required):
//! `fast_key_head_digest,file_size,full_digest,capture_or_file_date,format`
//!
//! Legacy files have no header and only the first four columns; they are
//! parsed positionally with `format = unknown`.

use crate::domain::{CatalogEntry, FastKey, PhotoFormat};
use crate::error::{Error, Result};

pub const CSV_HEADER: &str = "fast_key_head_digest,file_size,full_digest,capture_or_file_date,format";

/// Serialize entries to CSV. Rows are sorted by fast key, then full digest,
/// so equivalent tables always produce byte-identical bodies, which is what
/// makes snapshot content addressing deterministic. The digest tie-break
/// matters when several entries share a fast key.
pub fn export(entries: &[CatalogEntry]) -> String {
    let mut rows: Vec<&CatalogEntry> = entries.iter().collect();
    rows.sort_by(|a, b| {
        (&a.fast_key.head_digest, a.fast_key.file_size, &a.full_digest)
            .cmp(&(&b.fast_key.head_digest, b.fast_key.file_size, &b.full_digest))
    });

    let mut out = String::with_capacity(64 * (rows.len() + 1));
    out.push_str(CSV_HEADER);
    out.push('\n');
    for entry in rows {
        out.push_str(&entry.fast_key.head_digest);
        out.push(',');
        out.push_str(&entry.fast_key.file_size.to_string());
        out.push(',');
        if let Some(ref digest) = entry.full_digest {
            out.push_str(digest);
        }
        out.push(',');
        out.push_str(&entry.capture_or_file_date.to_string());
        out.push(',');
        out.push_str(entry.format.as_str());
        out.push('\n');
    }
    out
}

/// Parse a CSV body into entries. The header row is skipped when present;
/// header-less legacy bodies parse positionally.
pub fn parse(body: &str) -> Result<Vec<CatalogEntry>> {
    let mut entries = Vec::new();

    for (idx, line) in body.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        if idx == 0 && line == CSV_HEADER {
            continue;
        }
        entries.push(parse_row(line, idx + 1)?);
    }

    Ok(entries)
}

/// Number of data rows in a CSV body (excludes the header when present).
pub fn row_count(body: &str) -> usize {
    body.lines()
        .enumerate()
        .filter(|(idx, line)| !line.is_empty() && !(*idx == 0 && *line == CSV_HEADER))
        .count()
}

fn parse_row(line: &str, line_no: usize) -> Result<CatalogEntry> {
    let fields: Vec<&str> = line.split(',').collect();
    // 5 fields is the current schema, 4 the legacy layout without a format.
    if fields.len() != 5 && fields.len() != 4 {
        return Err(Error::CsvParse {
            line: line_no,
            message: format!("expected 4 or 5 columns, found {}", fields.len()),
        });
    }

    let head_digest = fields[0].to_string();
    if head_digest.is_empty() {
        return Err(Error::CsvParse {
            line: line_no,
            message: "empty fast key digest".to_string(),
        });
    }

    let file_size: u64 = fields[1].parse().map_err(|_| Error::CsvParse {
        line: line_no,
        message: format!("invalid file size {:?}", fields[1]),
    })?;

    // Empty full digest means the entry has not been fully processed yet.
    let full_digest = if fields[2].is_empty() {
        None
    } else {
        Some(fields[2].to_string())
    };

    let capture_or_file_date: i64 = fields[3].parse().map_err(|_| Error::CsvParse {
        line: line_no,
        message: format!("invalid date {:?}", fields[3]),
    })?;

    let format = if fields.len() == 5 {
        PhotoFormat::parse(fields[4])
    } else {
        PhotoFormat::Unknown
    };

    Ok(CatalogEntry {
        fast_key: FastKey {
            head_digest,
            file_size,
        },
        full_digest,
        capture_or_file_date,
        format,
    })
}
