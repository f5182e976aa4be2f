//! TIFF/EXIF structure reader.
//!
//! Walks IFD0 and the EXIF and GPS sub-IFDs it points to. Every read is
//! bounds-checked: an entry or value that points past the end of the block is
//! a [`MetadataParseError::Truncated`], never a panic.

use super::MetadataParseError;
use super::iptc;

const TAG_IMAGE_DESCRIPTION: u16 = 0x010E;
const TAG_MAKE: u16 = 0x010F;
const TAG_MODEL: u16 = 0x0110;
const TAG_DATE_TIME: u16 = 0x0132;
const TAG_IPTC_NAA: u16 = 0x83BB;
const TAG_PHOTOSHOP: u16 = 0x8649;
const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_GPS_IFD: u16 = 0x8825;
const TAG_XP_TITLE: u16 = 0x9C9B;

const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;
const TAG_OFFSET_TIME: u16 = 0x9010;
const TAG_OFFSET_TIME_ORIGINAL: u16 = 0x9011;
const TAG_SUBSEC_TIME: u16 = 0x9290;
const TAG_SUBSEC_TIME_ORIGINAL: u16 = 0x9291;
const TAG_LENS_MODEL: u16 = 0xA434;

const GPS_LATITUDE_REF: u16 = 1;
const GPS_LATITUDE: u16 = 2;
const GPS_LONGITUDE_REF: u16 = 3;
const GPS_LONGITUDE: u16 = 4;

const TYPE_ASCII: u16 = 2;
const TYPE_RATIONAL: u16 = 5;

/// Raw fields read from a TIFF structure, before timestamp parsing.
#[derive(Debug, Default, PartialEq)]
pub struct ExifFields {
    pub image_description: Option<String>,
    pub xp_title: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub lens: Option<String>,
    pub date_time: Option<String>,
    pub subsec_time: Option<String>,
    pub offset_time: Option<String>,
    pub date_time_original: Option<String>,
    pub subsec_time_original: Option<String>,
    pub offset_time_original: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub iptc: iptc::IptcData,
}

struct Entry {
    tag: u16,
    typ: u16,
    count: usize,
    /// Offset of the 4-byte value/offset field within the block.
    field: usize,
}

struct Tiff<'a> {
    data: &'a [u8],
    big_endian: bool,
}

impl<'a> Tiff<'a> {
    fn new(data: &'a [u8]) -> Option<Self> {
        let big_endian = match data.get(0..2)? {
            b"MM" => true,
            b"II" => false,
            _ => return None,
        };
        let tiff = Self { data, big_endian };
        (tiff.u16(2).ok()? == 42).then_some(tiff)
    }

    fn slice(&self, offset: usize, len: usize, what: &'static str) -> Result<&'a [u8], MetadataParseError> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or(MetadataParseError::Truncated { what, offset })
    }

    fn u16(&self, offset: usize) -> Result<u16, MetadataParseError> {
        let b = self.slice(offset, 2, "TIFF short")?;
        Ok(if self.big_endian {
            u16::from_be_bytes([b[0], b[1]])
        } else {
            u16::from_le_bytes([b[0], b[1]])
        })
    }

    fn u32(&self, offset: usize) -> Result<u32, MetadataParseError> {
        let b = self.slice(offset, 4, "TIFF long")?;
        Ok(if self.big_endian {
            u32::from_be_bytes([b[0], b[1], b[2], b[3]])
        } else {
            u32::from_le_bytes([b[0], b[1], b[2], b[3]])
        })
    }

    fn entries(&self, ifd_offset: usize) -> Result<Vec<Entry>, MetadataParseError> {
        let count = usize::from(self.u16(ifd_offset)?);
        (0..count)
            .map(|i| {
                let at = ifd_offset + 2 + i * 12;
                Ok(Entry {
                    tag: self.u16(at)?,
                    typ: self.u16(at + 2)?,
                    count: self.u32(at + 4)? as usize,
                    field: at + 8,
                })
            })
            .collect()
    }

    /// Where an entry's value lives: inline in the entry when it fits in
    /// four bytes, at the stored offset otherwise.
    fn locate(&self, entry: &Entry) -> Result<(usize, usize), MetadataParseError> {
        let len = entry
            .count
            .checked_mul(type_size(entry.typ))
            .ok_or(MetadataParseError::Truncated { what: "TIFF value", offset: entry.field })?;
        if len <= 4 {
            Ok((entry.field, len))
        } else {
            Ok((self.u32(entry.field)? as usize, len))
        }
    }

    fn value(&self, entry: &Entry) -> Result<&'a [u8], MetadataParseError> {
        let (offset, len) = self.locate(entry)?;
        self.slice(offset, len, "TIFF value")
    }

    fn ascii(&self, entry: &Entry) -> Result<Option<String>, MetadataParseError> {
        let bytes = self.value(entry)?;
        let text = String::from_utf8_lossy(bytes);
        let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
        Ok((!text.is_empty()).then(|| text.to_string()))
    }

    fn rationals(&self, entry: &Entry) -> Result<Vec<f64>, MetadataParseError> {
        if entry.typ != TYPE_RATIONAL {
            return Ok(Vec::new());
        }
        let (base, len) = self.locate(entry)?;
        self.slice(base, len, "GPS rational")?;
        (0..entry.count)
            .map(|i| {
                let num = self.u32(base + i * 8)?;
                let den = self.u32(base + i * 8 + 4)?;
                Ok(if den == 0 { 0.0 } else { f64::from(num) / f64::from(den) })
            })
            .collect()
    }
}

fn type_size(typ: u16) -> usize {
    match typ {
        1 | 2 | 6 | 7 => 1,
        3 | 8 => 2,
        4 | 9 | 11 => 4,
        5 | 10 | 12 => 8,
        _ => 1,
    }
}

/// Read EXIF, GPS and TIFF-embedded IPTC fields from a TIFF structure.
///
/// Returns `Ok(None)` when the bytes don't carry a TIFF header at all.
pub fn read_tiff(data: &[u8]) -> Result<Option<ExifFields>, MetadataParseError> {
    let Some(tiff) = Tiff::new(data) else {
        return Ok(None);
    };
    let mut fields = ExifFields::default();
    let ifd0 = tiff.u32(4)? as usize;

    for entry in tiff.entries(ifd0)? {
        match entry.tag {
            TAG_IMAGE_DESCRIPTION if entry.typ == TYPE_ASCII => {
                fields.image_description = tiff.ascii(&entry)?
            }
            TAG_MAKE if entry.typ == TYPE_ASCII => fields.make = tiff.ascii(&entry)?,
            TAG_MODEL if entry.typ == TYPE_ASCII => fields.model = tiff.ascii(&entry)?,
            TAG_DATE_TIME if entry.typ == TYPE_ASCII => fields.date_time = tiff.ascii(&entry)?,
            TAG_XP_TITLE => fields.xp_title = decode_utf16le(tiff.value(&entry)?),
            TAG_IPTC_NAA if fields.iptc.is_empty() => {
                fields.iptc = iptc::parse_iim(tiff.value(&entry)?)
            }
            TAG_PHOTOSHOP if fields.iptc.is_empty() => {
                if let Some(iim) = iptc::find_in_resources(tiff.value(&entry)?) {
                    fields.iptc = iptc::parse_iim(iim);
                }
            }
            TAG_EXIF_IFD => read_exif_ifd(&tiff, tiff.u32(entry.field)? as usize, &mut fields)?,
            TAG_GPS_IFD => read_gps_ifd(&tiff, tiff.u32(entry.field)? as usize, &mut fields)?,
            _ => {}
        }
    }

    Ok(Some(fields))
}

fn read_exif_ifd(tiff: &Tiff<'_>, offset: usize, fields: &mut ExifFields) -> Result<(), MetadataParseError> {
    for entry in tiff.entries(offset)? {
        if entry.typ != TYPE_ASCII {
            continue;
        }
        let slot = match entry.tag {
            TAG_DATE_TIME_ORIGINAL => &mut fields.date_time_original,
            TAG_SUBSEC_TIME_ORIGINAL => &mut fields.subsec_time_original,
            TAG_OFFSET_TIME_ORIGINAL => &mut fields.offset_time_original,
            TAG_SUBSEC_TIME => &mut fields.subsec_time,
            TAG_OFFSET_TIME => &mut fields.offset_time,
            TAG_LENS_MODEL => &mut fields.lens,
            _ => continue,
        };
        *slot = tiff.ascii(&entry)?;
    }
    Ok(())
}

fn read_gps_ifd(tiff: &Tiff<'_>, offset: usize, fields: &mut ExifFields) -> Result<(), MetadataParseError> {
    let mut lat_ref = None;
    let mut lon_ref = None;
    let mut lat = None;
    let mut lon = None;

    for entry in tiff.entries(offset)? {
        match entry.tag {
            GPS_LATITUDE_REF => lat_ref = tiff.ascii(&entry)?,
            GPS_LONGITUDE_REF => lon_ref = tiff.ascii(&entry)?,
            GPS_LATITUDE => lat = degrees(&tiff.rationals(&entry)?),
            GPS_LONGITUDE => lon = degrees(&tiff.rationals(&entry)?),
            _ => {}
        }
    }

    fields.latitude = lat.map(|v| signed(v, lat_ref.as_deref(), "S"));
    fields.longitude = lon.map(|v| signed(v, lon_ref.as_deref(), "W"));
    Ok(())
}

/// Degrees, minutes, seconds → decimal degrees.
fn degrees(dms: &[f64]) -> Option<f64> {
    match dms {
        [d, m, s, ..] => Some(d + m / 60.0 + s / 3600.0),
        _ => None,
    }
}

fn signed(value: f64, reference: Option<&str>, negative: &str) -> f64 {
    if reference == Some(negative) { -value } else { value }
}

fn decode_utf16le(bytes: &[u8]) -> Option<String> {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&u| u != 0)
        .collect();
    let text = String::from_utf16_lossy(&units);
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
