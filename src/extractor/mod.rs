//! Embedded metadata extraction.
//!
//! Reads the metadata blocks image containers carry and turns them into a
//! partial [`MetadataRecord`]. The container is detected from magic bytes,
//! never from the file extension:
//!
//! | Container | EXIF (TIFF structure) | IPTC |
//! |-----------|-----------------------|------|
//! | JPEG | APP1 `Exif\0\0` segment | APP13 Photoshop 8BIM resource |
//! | TIFF | the file itself | IFD0 tags 33723 / 34377 |
//! | PNG | `eXIf` chunk | none |
//! | WebP | `EXIF` RIFF chunk | none |
//!
//! ## Field mapping
//!
//! | Record field | Source, in order of preference |
//! |--------------|-------------------------------|
//! | `title` | IPTC ObjectName (2:05), Windows XPTitle |
//! | `description` | IPTC Caption-Abstract (2:120), EXIF ImageDescription |
//! | `keywords` | IPTC Keywords (2:25) |
//! | `date` | DateTimeOriginal + SubSecTimeOriginal + OffsetTimeOriginal, then DateTime + SubSecTime + OffsetTime |
//! | `camera_make`, `camera_model`, `lens` | EXIF Make, Model, LensModel |
//! | `latitude`, `longitude` | GPS IFD, signed decimal degrees |
//!
//! A file without any metadata block yields an empty record. Structural
//! damage (a segment or IFD running past the end of the data) and malformed
//! timestamps are [`MetadataParseError`]s, which callers treat per item.

mod exif;
pub mod iptc;

use crate::metadata::{self, MetadataRecord, Timestamp, TimestampError};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("truncated {what} at offset {offset}")]
    Truncated { what: &'static str, offset: usize },
    #[error("invalid {field}: {source}")]
    Timestamp {
        field: &'static str,
        #[source]
        source: TimestampError,
    },
    #[error("invalid front matter: {0}")]
    FrontMatter(#[from] serde_yaml::Error),
}

/// Read a file and extract its embedded metadata.
pub fn extract(path: &Path) -> Result<MetadataRecord, MetadataParseError> {
    let data = fs::read(path)?;
    extract_from_bytes(&data)
}

/// Extract embedded metadata from an in-memory file.
pub fn extract_from_bytes(data: &[u8]) -> Result<MetadataRecord, MetadataParseError> {
    let blocks = match Container::detect(data) {
        Container::Jpeg => jpeg_blocks(data)?,
        Container::Tiff => Blocks {
            tiff: Some(data),
            iim: None,
        },
        Container::Png => png_blocks(data)?,
        Container::WebP => webp_blocks(data)?,
        Container::Unknown => Blocks::default(),
    };

    let mut fields = match blocks.tiff {
        Some(tiff) => exif::read_tiff(tiff)?.unwrap_or_default(),
        None => exif::ExifFields::default(),
    };
    if let Some(iim) = blocks.iim {
        let parsed = iptc::parse_iim(iim);
        if !parsed.is_empty() {
            fields.iptc = parsed;
        }
    }

    build_record(fields)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Jpeg,
    Tiff,
    Png,
    WebP,
    Unknown,
}

impl Container {
    fn detect(data: &[u8]) -> Self {
        if data.starts_with(&[0xFF, 0xD8]) {
            Container::Jpeg
        } else if data.starts_with(b"II*\0") || data.starts_with(b"MM\0*") {
            Container::Tiff
        } else if data.starts_with(b"\x89PNG\r\n\x1a\n") {
            Container::Png
        } else if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            Container::WebP
        } else {
            Container::Unknown
        }
    }
}

/// Raw metadata blocks located inside a container.
#[derive(Default)]
struct Blocks<'a> {
    tiff: Option<&'a [u8]>,
    iim: Option<&'a [u8]>,
}

const EXIF_HEADER: &[u8] = b"Exif\0\0";
const PHOTOSHOP_HEADER: &[u8] = b"Photoshop 3.0\0";

fn truncated(what: &'static str, offset: usize) -> MetadataParseError {
    MetadataParseError::Truncated { what, offset }
}

/// Walk JPEG marker segments up to the start of scan.
fn jpeg_blocks(data: &[u8]) -> Result<Blocks<'_>, MetadataParseError> {
    let mut blocks = Blocks::default();
    let mut pos = 2;

    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            break;
        }
        let marker = data[pos + 1];
        match marker {
            // Fill byte before a marker.
            0xFF => {
                pos += 1;
                continue;
            }
            // SOS, EOI: no metadata segments follow.
            0xDA | 0xD9 => break,
            // Standalone markers carry no length.
            0x01 | 0xD0..=0xD7 => {
                pos += 2;
                continue;
            }
            _ => {}
        }

        let len_bytes = data
            .get(pos + 2..pos + 4)
            .ok_or_else(|| truncated("JPEG segment length", pos))?;
        let len = usize::from(u16::from_be_bytes([len_bytes[0], len_bytes[1]]));
        if len < 2 {
            return Err(truncated("JPEG segment", pos));
        }
        let payload = data
            .get(pos + 4..pos + 2 + len)
            .ok_or_else(|| truncated("JPEG segment", pos))?;

        match marker {
            0xE1 if blocks.tiff.is_none() => {
                if let Some(tiff) = payload.strip_prefix(EXIF_HEADER) {
                    blocks.tiff = Some(tiff);
                }
            }
            0xED if blocks.iim.is_none() && payload.starts_with(PHOTOSHOP_HEADER) => {
                blocks.iim = iptc::find_in_resources(payload);
            }
            _ => {}
        }
        pos += 2 + len;
    }

    Ok(blocks)
}

/// Find the `eXIf` chunk, stopping at image data end.
fn png_blocks(data: &[u8]) -> Result<Blocks<'_>, MetadataParseError> {
    let mut blocks = Blocks::default();
    let mut pos = 8;

    while pos + 8 <= data.len() {
        let len = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
            as usize;
        let kind = &data[pos + 4..pos + 8];
        let body = pos
            .checked_add(8 + len)
            .and_then(|end| data.get(pos + 8..end))
            .ok_or_else(|| truncated("PNG chunk", pos))?;
        match kind {
            b"eXIf" => {
                blocks.tiff = Some(body);
                break;
            }
            b"IEND" => break,
            _ => {}
        }
        // Chunk data is followed by a 4-byte CRC.
        pos += 12 + len;
    }

    Ok(blocks)
}

/// Find the `EXIF` chunk in a RIFF/WEBP file.
fn webp_blocks(data: &[u8]) -> Result<Blocks<'_>, MetadataParseError> {
    let mut blocks = Blocks::default();
    let mut pos = 12;

    while pos + 8 <= data.len() {
        let kind = &data[pos..pos + 4];
        let len = u32::from_le_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]])
            as usize;
        let body = pos
            .checked_add(8 + len)
            .and_then(|end| data.get(pos + 8..end))
            .ok_or_else(|| truncated("WebP chunk", pos))?;
        if kind == b"EXIF" {
            // Some writers keep the JPEG-style header in front of the TIFF data.
            blocks.tiff = Some(body.strip_prefix(EXIF_HEADER).unwrap_or(body));
            break;
        }
        pos += 8 + len + len % 2;
    }

    Ok(blocks)
}

fn exif_timestamp(
    field: &'static str,
    datetime: Option<&str>,
    subsec: Option<&str>,
    offset: Option<&str>,
) -> Result<Option<Timestamp>, MetadataParseError> {
    let Some(datetime) = datetime else {
        return Ok(None);
    };
    Timestamp::from_exif(datetime, subsec, offset)
        .map_err(|source| MetadataParseError::Timestamp { field, source })
}

fn build_record(fields: exif::ExifFields) -> Result<MetadataRecord, MetadataParseError> {
    let mut record = MetadataRecord::new();

    let original = exif_timestamp(
        "DateTimeOriginal",
        fields.date_time_original.as_deref(),
        fields.subsec_time_original.as_deref(),
        fields.offset_time_original.as_deref(),
    )?;
    let date = match original {
        Some(ts) => Some(ts),
        None => exif_timestamp(
            "DateTime",
            fields.date_time.as_deref(),
            fields.subsec_time.as_deref(),
            fields.offset_time.as_deref(),
        )?,
    };
    if let Some(date) = date {
        record.insert(metadata::DATE, date);
    }

    let iptc = fields.iptc;
    if let Some(title) = iptc.object_name.or(fields.xp_title) {
        record.insert(metadata::TITLE, title);
    }
    if let Some(description) = iptc.caption.or(fields.image_description) {
        record.insert(metadata::DESCRIPTION, description);
    }
    if !iptc.keywords.is_empty() {
        record.insert(metadata::KEYWORDS, iptc.keywords);
    }

    let text_fields = [
        (metadata::CAMERA_MAKE, fields.make),
        (metadata::CAMERA_MODEL, fields.model),
        (metadata::LENS, fields.lens),
    ];
    for (key, value) in text_fields {
        if let Some(value) = value {
            record.insert(key, value);
        }
    }
    if let Some(lat) = fields.latitude {
        record.insert(metadata::LATITUDE, lat);
    }
    if let Some(lon) = fields.longitude {
        record.insert(metadata::LONGITUDE, lon);
    }

    Ok(record)
}
