use std::io::Cursor;

use chrono::NaiveDateTime;
use exif::{In, Tag, Value};

use crate::domain::PhotoMetadata;

/// Extract EXIF metadata from raw image bytes. Absence of EXIF data is
/// normal (screenshots, PNGs, stripped exports) and yields `None`; the
/// pipeline then keeps the filesystem date.
pub fn extract_metadata(bytes: &[u8]) -> Option<PhotoMetadata> {
    let mut cursor = Cursor::new(bytes);
    let exif = exif::Reader::new().read_from_container(&mut cursor).ok()?;

    let capture_date = ascii_field(&exif, Tag::DateTimeOriginal)
        .or_else(|| ascii_field(&exif, Tag::DateTime))
        .and_then(|s| parse_exif_datetime(&s));

    let metadata = PhotoMetadata {
        capture_date,
        width: uint_field(&exif, Tag::PixelXDimension),
        height: uint_field(&exif, Tag::PixelYDimension),
        camera_make: ascii_field(&exif, Tag::Make),
        camera_model: ascii_field(&exif, Tag::Model),
        gps_lat: gps_coord(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, "S"),
        gps_lon: gps_coord(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, "W"),
        exposure_time: exif
            .get_field(Tag::ExposureTime, In::PRIMARY)
            .map(|f| f.display_value().to_string()),
        f_number: rational_field(&exif, Tag::FNumber),
        iso: uint_field(&exif, Tag::PhotographicSensitivity),
    };

    Some(metadata)
}

/// Parse an EXIF datetime string to unix seconds (treated as UTC).
/// Handles both `2024:06:15 12:30:00` (raw EXIF) and the hyphenated form.
pub fn parse_exif_datetime(s: &str) -> Option<i64> {
    let s = s.trim();
    for format in ["%Y:%m:%d %H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.and_utc().timestamp());
        }
    }
    None
}

fn ascii_field(exif: &exif::Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    if let Value::Ascii(ref vecs) = field.value {
        let raw = vecs.first()?;
        let s = String::from_utf8_lossy(raw).trim().to_string();
        if s.is_empty() {
            return None;
        }
        return Some(s);
    }
    None
}

fn uint_field(exif: &exif::Exif, tag: Tag) -> Option<u32> {
    exif.get_field(tag, In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
}

fn rational_field(exif: &exif::Exif, tag: Tag) -> Option<f64> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    if let Value::Rational(ref v) = field.value {
        return v.first().map(|r| r.to_f64());
    }
    None
}

/// Convert a degrees/minutes/seconds rational triplet plus hemisphere ref
/// into a signed decimal coordinate.
fn gps_coord(exif: &exif::Exif, coord_tag: Tag, ref_tag: Tag, negative_ref: &str) -> Option<f64> {
    let field = exif.get_field(coord_tag, In::PRIMARY)?;
    let Value::Rational(ref dms) = field.value else {
        return None;
    };
    if dms.len() < 3 {
        return None;
    }
    let decimal = dms_to_decimal(dms[0].to_f64(), dms[1].to_f64(), dms[2].to_f64());

    let hemisphere = exif
        .get_field(ref_tag, In::PRIMARY)
        .and_then(|f| {
            if let Value::Ascii(ref vecs) = f.value {
                vecs.first().map(|v| String::from_utf8_lossy(v).to_string())
            } else {
                None
            }
        })
        .unwrap_or_default();

    if hemisphere.trim() == negative_ref {
        Some(-decimal)
    } else {
        Some(decimal)
    }
}

fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64) -> f64 {
    degrees + minutes / 60.0 + seconds / 3600.0
}
