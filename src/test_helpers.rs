//! Shared fixtures for the gallerist test suite.
//!
//! Image fixtures are synthesised in memory instead of checked in: the
//! builders below write real TIFF/EXIF structures and IPTC blocks wrapped in
//! JPEG, PNG and WebP containers, so tests can state exactly which metadata
//! an image carries.
//!
//! This file only depends on `std` and `tempfile`; integration tests pull it
//! in with `#[path = "../src/test_helpers.rs"]`.
//!
//! ```rust
//! let site = TestSite::new();
//! site.write("content/animals/IMG_4056.jpeg", &wolf_jpeg());
//! site.write("content/animals/IMG_4056.toml", "title = \"Sunrise\"\n");
//! ```

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// =========================================================================
// TIFF / EXIF
// =========================================================================

/// Which EXIF fields a synthesised TIFF block carries.
#[derive(Debug, Default, Clone)]
pub struct ExifTags<'a> {
    pub little_endian: bool,
    pub description: Option<&'a str>,
    pub make: Option<&'a str>,
    pub model: Option<&'a str>,
    pub lens: Option<&'a str>,
    pub date_time: Option<&'a str>,
    pub date_time_original: Option<&'a str>,
    pub subsec_time_original: Option<&'a str>,
    pub offset_time_original: Option<&'a str>,
    /// `((lat_ref, [deg, min, sec]), (lon_ref, [deg, min, sec]))`
    pub gps: Option<((&'a str, [u32; 3]), (&'a str, [u32; 3]))>,
}

struct Field {
    tag: u16,
    typ: u16,
    count: u32,
    bytes: Vec<u8>,
}

fn u16_bytes(v: u16, le: bool) -> [u8; 2] {
    if le { v.to_le_bytes() } else { v.to_be_bytes() }
}

fn u32_bytes(v: u32, le: bool) -> [u8; 4] {
    if le { v.to_le_bytes() } else { v.to_be_bytes() }
}

fn ascii(tag: u16, value: &str) -> Field {
    let mut bytes = value.as_bytes().to_vec();
    bytes.push(0);
    Field {
        tag,
        typ: 2,
        count: bytes.len() as u32,
        bytes,
    }
}

fn long(tag: u16, value: u32, le: bool) -> Field {
    Field {
        tag,
        typ: 4,
        count: 1,
        bytes: u32_bytes(value, le).to_vec(),
    }
}

fn rationals(tag: u16, values: [u32; 3], le: bool) -> Field {
    let mut bytes = Vec::new();
    for v in values {
        bytes.extend_from_slice(&u32_bytes(v, le));
        bytes.extend_from_slice(&u32_bytes(1, le));
    }
    Field {
        tag,
        typ: 5,
        count: 3,
        bytes,
    }
}

fn ifd_size(entries: usize) -> usize {
    2 + 12 * entries + 4
}

fn write_ifd(out: &mut Vec<u8>, data: &mut Vec<u8>, data_offset: usize, fields: &[Field], le: bool) {
    out.extend_from_slice(&u16_bytes(fields.len() as u16, le));
    for field in fields {
        out.extend_from_slice(&u16_bytes(field.tag, le));
        out.extend_from_slice(&u16_bytes(field.typ, le));
        out.extend_from_slice(&u32_bytes(field.count, le));
        if field.bytes.len() <= 4 {
            let mut inline = field.bytes.clone();
            inline.resize(4, 0);
            out.extend_from_slice(&inline);
        } else {
            let offset = (data_offset + data.len()) as u32;
            out.extend_from_slice(&u32_bytes(offset, le));
            data.extend_from_slice(&field.bytes);
            if data.len() % 2 == 1 {
                data.push(0);
            }
        }
    }
    out.extend_from_slice(&u32_bytes(0, le));
}

/// A complete TIFF structure: header, IFD0, optional EXIF and GPS sub-IFDs,
/// then the out-of-line value area.
pub fn tiff_block(tags: &ExifTags<'_>) -> Vec<u8> {
    let le = tags.little_endian;

    let mut ifd0 = Vec::new();
    if let Some(s) = tags.description {
        ifd0.push(ascii(0x010E, s));
    }
    if let Some(s) = tags.make {
        ifd0.push(ascii(0x010F, s));
    }
    if let Some(s) = tags.model {
        ifd0.push(ascii(0x0110, s));
    }
    if let Some(s) = tags.date_time {
        ifd0.push(ascii(0x0132, s));
    }

    let mut exif = Vec::new();
    if let Some(s) = tags.date_time_original {
        exif.push(ascii(0x9003, s));
    }
    if let Some(s) = tags.offset_time_original {
        exif.push(ascii(0x9011, s));
    }
    if let Some(s) = tags.subsec_time_original {
        exif.push(ascii(0x9291, s));
    }
    if let Some(s) = tags.lens {
        exif.push(ascii(0xA434, s));
    }

    let mut gps = Vec::new();
    if let Some(((lat_ref, lat), (lon_ref, lon))) = tags.gps {
        gps.push(ascii(1, lat_ref));
        gps.push(rationals(2, lat, le));
        gps.push(ascii(3, lon_ref));
        gps.push(rationals(4, lon, le));
    }

    let has_exif = !exif.is_empty();
    let has_gps = !gps.is_empty();
    let ifd0_entries = ifd0.len() + usize::from(has_exif) + usize::from(has_gps);
    let exif_offset = 8 + ifd_size(ifd0_entries);
    let gps_offset = exif_offset + if has_exif { ifd_size(exif.len()) } else { 0 };
    let data_offset = gps_offset + if has_gps { ifd_size(gps.len()) } else { 0 };

    if has_exif {
        ifd0.push(long(0x8769, exif_offset as u32, le));
    }
    if has_gps {
        ifd0.push(long(0x8825, gps_offset as u32, le));
    }

    let mut out = Vec::new();
    out.extend_from_slice(if le { b"II" } else { b"MM" });
    out.extend_from_slice(&u16_bytes(42, le));
    out.extend_from_slice(&u32_bytes(8, le));

    let mut data = Vec::new();
    write_ifd(&mut out, &mut data, data_offset, &ifd0, le);
    if has_exif {
        write_ifd(&mut out, &mut data, data_offset, &exif, le);
    }
    if has_gps {
        write_ifd(&mut out, &mut data, data_offset, &gps, le);
    }
    out.extend_from_slice(&data);
    out
}

// =========================================================================
// IPTC
// =========================================================================

/// Which IPTC datasets a synthesised APP13 block carries.
#[derive(Debug, Default, Clone)]
pub struct IptcTags<'a> {
    pub title: Option<&'a str>,
    pub caption: Option<&'a str>,
    pub keywords: &'a [&'a str],
}

fn iim_dataset(out: &mut Vec<u8>, number: u8, value: &str) {
    out.extend_from_slice(&[0x1C, 0x02, number]);
    out.extend_from_slice(&(value.len() as u16).to_be_bytes());
    out.extend_from_slice(value.as_bytes());
}

/// Photoshop image-resource block holding one IPTC (0x0404) resource.
pub fn photoshop_iptc_block(tags: &IptcTags<'_>) -> Vec<u8> {
    let mut iim = Vec::new();
    if let Some(title) = tags.title {
        iim_dataset(&mut iim, 5, title);
    }
    for keyword in tags.keywords {
        iim_dataset(&mut iim, 25, keyword);
    }
    if let Some(caption) = tags.caption {
        iim_dataset(&mut iim, 120, caption);
    }

    let mut block = b"Photoshop 3.0\0".to_vec();
    block.extend_from_slice(b"8BIM\x04\x04\x00\x00");
    block.extend_from_slice(&(iim.len() as u32).to_be_bytes());
    block.extend_from_slice(&iim);
    if iim.len() % 2 == 1 {
        block.push(0);
    }
    block
}

// =========================================================================
// Containers
// =========================================================================

fn jpeg_segment(out: &mut Vec<u8>, marker: u8, payload: &[u8]) {
    out.extend_from_slice(&[0xFF, marker]);
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(payload);
}

/// A structurally valid JPEG header with optional EXIF (APP1) and IPTC (APP13).
pub fn jpeg(exif: Option<&ExifTags<'_>>, iptc: Option<&IptcTags<'_>>) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];
    jpeg_segment(&mut out, 0xE0, b"JFIF\0\x01\x01\0\0\x01\0\x01\0\0");
    if let Some(exif) = exif {
        let mut payload = b"Exif\0\0".to_vec();
        payload.extend(tiff_block(exif));
        jpeg_segment(&mut out, 0xE1, &payload);
    }
    if let Some(iptc) = iptc {
        jpeg_segment(&mut out, 0xED, &photoshop_iptc_block(iptc));
    }
    jpeg_segment(&mut out, 0xDA, &[0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);
    out.extend_from_slice(&[0x12, 0x34, 0x56, 0xFF, 0xD9]);
    out
}

fn png_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    out.extend_from_slice(&[0, 0, 0, 0]);
}

/// A PNG with an `eXIf` chunk.
pub fn png(exif: &ExifTags<'_>) -> Vec<u8> {
    let mut out = b"\x89PNG\r\n\x1a\n".to_vec();
    png_chunk(&mut out, b"IHDR", &[0, 0, 0, 1, 0, 0, 0, 1, 8, 2, 0, 0, 0]);
    png_chunk(&mut out, b"eXIf", &tiff_block(exif));
    png_chunk(&mut out, b"IEND", &[]);
    out
}

/// A WebP (extended format) with an `EXIF` chunk.
pub fn webp(exif: &ExifTags<'_>) -> Vec<u8> {
    let mut chunks = Vec::new();
    chunks.extend_from_slice(b"VP8X");
    chunks.extend_from_slice(&10u32.to_le_bytes());
    chunks.extend_from_slice(&[0x08, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    let tiff = tiff_block(exif);
    chunks.extend_from_slice(b"EXIF");
    chunks.extend_from_slice(&(tiff.len() as u32).to_le_bytes());
    chunks.extend_from_slice(&tiff);
    if tiff.len() % 2 == 1 {
        chunks.push(0);
    }

    let mut out = b"RIFF".to_vec();
    out.extend_from_slice(&((chunks.len() + 4) as u32).to_le_bytes());
    out.extend_from_slice(b"WEBP");
    out.extend_from_slice(&chunks);
    out
}

/// The canonical fixture: IPTC title "Wolf", captured 2019-09-10 06:49:11.
pub fn wolf_jpeg() -> Vec<u8> {
    jpeg(
        Some(&ExifTags {
            make: Some("Canon"),
            model: Some("Canon EOS 5D Mark IV"),
            date_time_original: Some("2019:09:10 06:49:11"),
            ..Default::default()
        }),
        Some(&IptcTags {
            title: Some("Wolf"),
            keywords: &["wildlife", "yellowstone"],
            ..Default::default()
        }),
    )
}

/// A JPEG with no metadata blocks at all.
pub fn bare_jpeg() -> Vec<u8> {
    jpeg(None, None)
}

// =========================================================================
// Sites
// =========================================================================

/// A throwaway site: `site.toml`, `content/`, `templates/` in a temp dir.
pub struct TestSite {
    dir: TempDir,
}

impl TestSite {
    pub fn new() -> Self {
        Self::with_config("[site]\ntitle = \"Test Site\"\n")
    }

    pub fn with_config(config: &str) -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("site.toml"), config).unwrap();
        fs::create_dir_all(dir.path().join("content")).unwrap();
        fs::create_dir_all(dir.path().join("templates")).unwrap();
        fs::write(
            dir.path().join("templates/style.css"),
            "body { margin: 0; }\n",
        )
        .unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn write(&self, rel: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    pub fn remove(&self, rel: &str) -> PathBuf {
        let path = self.path(rel);
        if path.is_dir() {
            fs::remove_dir_all(&path).unwrap();
        } else {
            fs::remove_file(&path).unwrap();
        }
        path
    }
}

impl Default for TestSite {
    fn default() -> Self {
        Self::new()
    }
}
