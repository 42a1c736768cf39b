//! # Metadata Module
//!
//! Extracts EXIF metadata from photo files.
//!
//! ## Extracted Fields
//! - Capture time (DateTimeOriginal, else DateTime)
//! - Image dimensions (width x height)
//! - Camera make and model
//! - GPS position
//!
//! ## Supported Formats
//! EXIF metadata is typically found in JPEG, TIFF and TIFF-based RAW files.
//! HEIC files may use different metadata formats.
//!
//! Missing or malformed metadata is never an error: the fields simply stay
//! empty and the record is routed to review later.

use crate::core::record::{GpsCoordinates, Resolution};
use chrono::{Datelike, Duration, NaiveDateTime};
use exif::{Field, In, Reader, Tag, Value};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Cameras did not exist before this year
pub const EARLIEST_PLAUSIBLE_YEAR: i32 = 1826;

const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Extracted photo metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhotoMetadata {
    /// Capture date/time as written by the camera
    pub captured_at: Option<NaiveDateTime>,
    /// Image width in pixels
    pub width: Option<u32>,
    /// Image height in pixels
    pub height: Option<u32>,
    /// Camera make (e.g., "Apple", "Canon")
    pub camera_make: Option<String>,
    /// Camera model (e.g., "iPhone 15 Pro")
    pub camera_model: Option<String>,
    pub gps: Option<GpsCoordinates>,
}

impl PhotoMetadata {
    /// Check if any metadata was extracted
    pub fn has_data(&self) -> bool {
        self.captured_at.is_some()
            || self.width.is_some()
            || self.height.is_some()
            || self.camera_make.is_some()
            || self.camera_model.is_some()
            || self.gps.is_some()
    }

    /// Get a display string for the camera
    pub fn camera_display(&self) -> Option<String> {
        match (&self.camera_make, &self.camera_model) {
            (Some(make), Some(model)) => {
                // Avoid duplication like "Apple Apple iPhone"
                if model.starts_with(make.as_str()) {
                    Some(model.clone())
                } else {
                    Some(format!("{} {}", make, model))
                }
            }
            (None, Some(model)) => Some(model.clone()),
            (Some(make), None) => Some(make.clone()),
            (None, None) => None,
        }
    }

    /// Dimensions when both are known and non-zero
    pub fn resolution(&self) -> Option<Resolution> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some(Resolution::new(w, h)),
            _ => None,
        }
    }
}

/// Reads embedded metadata from an encoded file.
///
/// Implement this trait to substitute EXIF parsing (e.g., for testing).
pub trait MetadataReader: Send + Sync {
    fn read(&self, bytes: &[u8]) -> PhotoMetadata;
}

/// EXIF reader backed by kamadak-exif
#[derive(Debug, Default, Clone, Copy)]
pub struct ExifMetadataReader;

impl ExifMetadataReader {
    pub fn new() -> Self {
        Self
    }
}

impl MetadataReader for ExifMetadataReader {
    fn read(&self, bytes: &[u8]) -> PhotoMetadata {
        let mut metadata = PhotoMetadata::default();

        let exif_reader = match Reader::new().read_from_container(&mut Cursor::new(bytes)) {
            Ok(r) => r,
            Err(_) => return metadata,
        };
        let field = |tag: Tag| exif_reader.get_field(tag, In::PRIMARY);

        // Original capture time, then the last-modified time written by the camera
        metadata.captured_at = field(Tag::DateTimeOriginal)
            .and_then(|f| get_string_value(&f.value))
            .and_then(|s| parse_exif_datetime(&s))
            .or_else(|| {
                field(Tag::DateTime)
                    .and_then(|f| get_string_value(&f.value))
                    .and_then(|s| parse_exif_datetime(&s))
            });

        // Extract dimensions - prefer actual pixel dimensions
        metadata.width = field(Tag::PixelXDimension)
            .and_then(|f| get_u32_value(&f.value))
            .or_else(|| field(Tag::ImageWidth).and_then(|f| get_u32_value(&f.value)));
        metadata.height = field(Tag::PixelYDimension)
            .and_then(|f| get_u32_value(&f.value))
            .or_else(|| field(Tag::ImageLength).and_then(|f| get_u32_value(&f.value)));

        metadata.camera_make = field(Tag::Make).and_then(|f| get_string_value(&f.value));
        metadata.camera_model = field(Tag::Model).and_then(|f| get_string_value(&f.value));

        let latitude = gps_component(field(Tag::GPSLatitude), field(Tag::GPSLatitudeRef), "S");
        let longitude = gps_component(field(Tag::GPSLongitude), field(Tag::GPSLongitudeRef), "W");
        if let (Some(latitude), Some(longitude)) = (latitude, longitude) {
            metadata.gps = Some(GpsCoordinates {
                latitude,
                longitude,
            });
        }

        metadata
    }
}

/// Parse the EXIF `YYYY:MM:DD HH:MM:SS` form
pub fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    let trimmed = s.trim_matches(|c: char| c == '"' || c == '\0' || c.is_whitespace());
    NaiveDateTime::parse_from_str(trimmed, EXIF_DATETIME_FORMAT).ok()
}

/// A capture time is plausible between the first photograph and one day after `now`
pub fn is_plausible(timestamp: NaiveDateTime, now: NaiveDateTime) -> bool {
    timestamp.year() >= EARLIEST_PLAUSIBLE_YEAR && timestamp <= now + Duration::days(1)
}

/// Degrees/minutes/seconds rationals to signed decimal degrees
fn gps_component(
    value: Option<&Field>,
    reference: Option<&Field>,
    negative_ref: &str,
) -> Option<f64> {
    let parts = match &value?.value {
        Value::Rational(parts) if parts.len() >= 3 => parts,
        _ => return None,
    };
    if parts.iter().take(3).any(|r| r.denom == 0) {
        return None;
    }
    let degrees = parts[0].to_f64() + parts[1].to_f64() / 60.0 + parts[2].to_f64() / 3600.0;

    let negative = reference
        .and_then(|f| get_string_value(&f.value))
        .map(|r| r.eq_ignore_ascii_case(negative_ref))
        .unwrap_or(false);
    Some(if negative { -degrees } else { degrees })
}

/// Helper to extract u32 from various EXIF value types
fn get_u32_value(value: &Value) -> Option<u32> {
    match value {
        Value::Long(vec) => vec.first().copied(),
        Value::Short(vec) => vec.first().map(|v| *v as u32),
        _ => None,
    }
}

/// Helper to extract string from EXIF ASCII value
fn get_string_value(value: &Value) -> Option<String> {
    if let Value::Ascii(ref vec) = value {
        if let Some(bytes) = vec.first() {
            if let Ok(s) = std::str::from_utf8(bytes) {
                let trimmed = s.trim_end_matches('\0').trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use exif::experimental::Writer;
    use exif::Rational;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn metadata_default_has_no_data() {
        assert!(!PhotoMetadata::default().has_data());
    }

    #[test]
    fn camera_display_combines_make_model() {
        let meta = PhotoMetadata {
            camera_make: Some("Canon".to_string()),
            camera_model: Some("EOS R5".to_string()),
            ..Default::default()
        };
        assert_eq!(meta.camera_display(), Some("Canon EOS R5".to_string()));
    }

    #[test]
    fn camera_display_avoids_duplication() {
        let meta = PhotoMetadata {
            camera_make: Some("Apple".to_string()),
            camera_model: Some("Apple iPhone 15 Pro".to_string()),
            ..Default::default()
        };
        assert_eq!(meta.camera_display(), Some("Apple iPhone 15 Pro".to_string()));
    }

    #[test]
    fn parses_exif_datetime_format() {
        assert_eq!(
            parse_exif_datetime("2021:05:06 07:08:09"),
            NaiveDate::from_ymd_opt(2021, 5, 6).unwrap().and_hms_opt(7, 8, 9)
        );
        assert_eq!(parse_exif_datetime("0000:00:00 00:00:00"), None);
        assert_eq!(parse_exif_datetime("yesterday"), None);
    }

    #[test]
    fn plausibility_rejects_future_and_prehistoric_dates() {
        let now = at(2024, 6, 1);
        assert!(is_plausible(at(2010, 1, 1), now));
        assert!(is_plausible(at(1826, 1, 1), now));
        assert!(!is_plausible(at(1825, 12, 31), now));
        assert!(!is_plausible(at(2024, 6, 3), now));
    }

    #[test]
    fn non_exif_bytes_yield_empty_metadata() {
        let meta = ExifMetadataReader.read(b"definitely not a photo");
        assert!(!meta.has_data());
    }

    #[test]
    fn reads_fields_from_tiff_container() {
        let fields = [
            Field {
                tag: Tag::DateTimeOriginal,
                ifd_num: In::PRIMARY,
                value: Value::Ascii(vec![b"2021:05:06 07:08:09".to_vec()]),
            },
            Field {
                tag: Tag::Make,
                ifd_num: In::PRIMARY,
                value: Value::Ascii(vec![b"Nikon".to_vec()]),
            },
            Field {
                tag: Tag::Model,
                ifd_num: In::PRIMARY,
                value: Value::Ascii(vec![b"Z6".to_vec()]),
            },
            Field {
                tag: Tag::GPSLatitude,
                ifd_num: In::PRIMARY,
                value: Value::Rational(vec![
                    Rational { num: 48, denom: 1 },
                    Rational { num: 30, denom: 1 },
                    Rational { num: 0, denom: 1 },
                ]),
            },
            Field {
                tag: Tag::GPSLatitudeRef,
                ifd_num: In::PRIMARY,
                value: Value::Ascii(vec![b"S".to_vec()]),
            },
            Field {
                tag: Tag::GPSLongitude,
                ifd_num: In::PRIMARY,
                value: Value::Rational(vec![
                    Rational { num: 2, denom: 1 },
                    Rational { num: 15, denom: 1 },
                    Rational { num: 0, denom: 1 },
                ]),
            },
            Field {
                tag: Tag::GPSLongitudeRef,
                ifd_num: In::PRIMARY,
                value: Value::Ascii(vec![b"E".to_vec()]),
            },
        ];
        let mut writer = Writer::new();
        for field in &fields {
            writer.push_field(field);
        }
        let mut buffer = Cursor::new(Vec::new());
        writer.write(&mut buffer, false).unwrap();

        let meta = ExifMetadataReader.read(buffer.get_ref());

        assert_eq!(
            meta.captured_at,
            NaiveDate::from_ymd_opt(2021, 5, 6).unwrap().and_hms_opt(7, 8, 9)
        );
        assert_eq!(meta.camera_display(), Some("Nikon Z6".to_string()));
        let gps = meta.gps.unwrap();
        assert!((gps.latitude + 48.5).abs() < 1e-9);
        assert!((gps.longitude - 2.25).abs() < 1e-9);
    }
}
