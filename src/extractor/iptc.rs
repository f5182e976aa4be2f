//! IPTC-IIM Application Record reader.
//!
//! Three datasets of Record 2 matter for a gallery:
//! - ObjectName (2:05): title
//! - Caption-Abstract (2:120): description
//! - Keywords (2:25): repeatable
//!
//! The IIM block reaches us either raw (TIFF tag 33723) or wrapped in a
//! Photoshop image-resource block (JPEG APP13, TIFF tag 34377), resource
//! id 0x0404.

/// IPTC fields relevant to gallery metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IptcData {
    pub object_name: Option<String>,
    pub caption: Option<String>,
    pub keywords: Vec<String>,
}

impl IptcData {
    pub fn is_empty(&self) -> bool {
        self.object_name.is_none() && self.caption.is_none() && self.keywords.is_empty()
    }
}

const TAG_MARKER: u8 = 0x1C;
const APPLICATION_RECORD: u8 = 2;
const DATASET_OBJECT_NAME: u8 = 5;
const DATASET_KEYWORDS: u8 = 25;
const DATASET_CAPTION: u8 = 120;

/// Parse raw IIM datasets.
///
/// Each dataset is `0x1C, record, dataset, u16 BE length, bytes`. Bytes that
/// don't start a dataset are skipped; a dataset running past the end of the
/// block ends parsing with whatever was read so far.
pub fn parse_iim(data: &[u8]) -> IptcData {
    let mut result = IptcData::default();
    let mut pos = 0;

    while pos + 5 <= data.len() {
        if data[pos] != TAG_MARKER {
            pos += 1;
            continue;
        }
        let record = data[pos + 1];
        let dataset = data[pos + 2];
        let length = usize::from(u16::from_be_bytes([data[pos + 3], data[pos + 4]]));
        let start = pos + 5;
        let Some(bytes) = data.get(start..start + length) else {
            break;
        };
        pos = start + length;

        if record != APPLICATION_RECORD {
            continue;
        }
        let value = String::from_utf8_lossy(bytes).trim().to_string();
        if value.is_empty() {
            continue;
        }
        match dataset {
            DATASET_OBJECT_NAME => result.object_name = Some(value),
            DATASET_KEYWORDS => result.keywords.push(value),
            DATASET_CAPTION => result.caption = Some(value),
            _ => {}
        }
    }

    result
}

const PHOTOSHOP_HEADER: &[u8] = b"Photoshop 3.0\0";
const RESOURCE_SIGNATURE: &[u8] = b"8BIM";
const IPTC_RESOURCE_ID: u16 = 0x0404;

/// Locate the IIM bytes inside a Photoshop image-resource block.
///
/// Resource layout: `8BIM`, u16 id, Pascal name padded to even length,
/// u32 size, data padded to even length.
pub fn find_in_resources(block: &[u8]) -> Option<&[u8]> {
    let data = block.strip_prefix(PHOTOSHOP_HEADER).unwrap_or(block);
    let mut pos = 0;

    while pos + 12 <= data.len() {
        if &data[pos..pos + 4] != RESOURCE_SIGNATURE {
            pos += 1;
            continue;
        }
        let resource_id = u16::from_be_bytes([data[pos + 4], data[pos + 5]]);
        let name_len = usize::from(data[pos + 6]);
        let name_total = 1 + name_len + (1 + name_len) % 2;
        let size_at = pos + 6 + name_total;

        let size_bytes = data.get(size_at..size_at + 4)?;
        let size = u32::from_be_bytes([size_bytes[0], size_bytes[1], size_bytes[2], size_bytes[3]])
            as usize;
        let body_at = size_at + 4;
        let body = data.get(body_at..body_at + size)?;

        if resource_id == IPTC_RESOURCE_ID {
            return Some(body);
        }
        pos = body_at + size + size % 2;
    }

    None
}
