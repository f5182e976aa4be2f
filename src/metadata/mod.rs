//! Per-item metadata records and the rules for combining them.
//!
//! An item's metadata comes from up to three layers, resolved field by field:
//!
//! ```text
//! sidecar (.toml, .txt)   ← author overrides, always win
//! embedded (EXIF / IPTC)  ← what the camera or DAM tool wrote
//! defaults                ← filename title, file modification date
//! ```
//!
//! [`merge`] combines the first two; [`with_defaults`] fills whatever is still
//! missing. Both are pure: the record for one item never depends on any other
//! item or on the order items are processed in.

mod timestamp;

pub use timestamp::{Timestamp, TimestampError};

use crate::naming;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::time::SystemTime;

pub const TITLE: &str = "title";
pub const DATE: &str = "date";
pub const DESCRIPTION: &str = "description";
pub const KEYWORDS: &str = "keywords";
pub const CAMERA_MAKE: &str = "camera_make";
pub const CAMERA_MODEL: &str = "camera_model";
pub const LENS: &str = "lens";
pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";

/// A single metadata value.
///
/// Serialized untagged so records read naturally as JSON. Reading a record
/// back turns text into a [`MetadataValue::Timestamp`] only under the `date`
/// key; every other string stays text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Timestamp(Timestamp),
    Text(String),
    List(Vec<String>),
}

impl MetadataValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<&Timestamp> {
        match self {
            MetadataValue::Timestamp(ts) => Some(ts),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            MetadataValue::Float(f) => Some(*f),
            MetadataValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            MetadataValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Text(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::Text(s)
    }
}

impl From<Timestamp> for MetadataValue {
    fn from(ts: Timestamp) -> Self {
        MetadataValue::Timestamp(ts)
    }
}

impl From<f64> for MetadataValue {
    fn from(f: f64) -> Self {
        MetadataValue::Float(f)
    }
}

impl From<Vec<String>> for MetadataValue {
    fn from(items: Vec<String>) -> Self {
        MetadataValue::List(items)
    }
}

/// Wire form of a value, before the `date` key is interpreted.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl From<RawValue> for MetadataValue {
    fn from(raw: RawValue) -> Self {
        match raw {
            RawValue::Bool(b) => MetadataValue::Bool(b),
            RawValue::Integer(i) => MetadataValue::Integer(i),
            RawValue::Float(f) => MetadataValue::Float(f),
            RawValue::Text(s) => MetadataValue::Text(s),
            RawValue::List(items) => MetadataValue::List(items),
        }
    }
}

/// Field name → value. Keys are case-insensitive and stored lowercase.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetadataRecord {
    fields: BTreeMap<String, MetadataValue>,
}

impl<'de> Deserialize<'de> for MetadataRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, RawValue>::deserialize(deserializer)?;
        let mut record: MetadataRecord = raw.into_iter().map(|(k, v)| (k, v.into())).collect();
        record.normalize_date();
        Ok(record)
    }
}

impl MetadataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<MetadataValue>) {
        self.fields.insert(normalize_key(key), value.into());
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.fields.get(&normalize_key(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(&normalize_key(key))
    }

    pub fn remove(&mut self, key: &str) -> Option<MetadataValue> {
        self.fields.remove(&normalize_key(key))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn title(&self) -> Option<&str> {
        self.get(TITLE).and_then(MetadataValue::as_text)
    }

    pub fn date(&self) -> Option<&Timestamp> {
        self.get(DATE).and_then(MetadataValue::as_timestamp)
    }

    pub fn description(&self) -> Option<&str> {
        self.get(DESCRIPTION).and_then(MetadataValue::as_text)
    }

    pub fn keywords(&self) -> &[String] {
        self.get(KEYWORDS)
            .and_then(MetadataValue::as_list)
            .unwrap_or(&[])
    }

    /// Coerce a textual `date` field (as produced by front matter or external
    /// handlers) into a timestamp. Unparseable dates are left as text.
    pub fn normalize_date(&mut self) {
        if let Some(MetadataValue::Text(s)) = self.get(DATE)
            && let Ok(ts) = Timestamp::parse(s)
        {
            self.insert(DATE, ts);
        }
    }
}

impl FromIterator<(String, MetadataValue)> for MetadataRecord {
    fn from_iter<I: IntoIterator<Item = (String, MetadataValue)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (k, v) in iter {
            record.insert(&k, v);
        }
        record
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}

/// Combine embedded metadata with sidecar overrides.
///
/// Every field the sidecar sets replaces the extracted value; fields only one
/// side sets pass through unchanged.
pub fn merge(extracted: MetadataRecord, sidecar: Option<MetadataRecord>) -> MetadataRecord {
    let mut merged = extracted;
    if let Some(sidecar) = sidecar {
        merged.fields.extend(sidecar.fields);
    }
    merged
}

/// Fill fields no source provided.
///
/// - `title` ← the file stem via the `NNN-name` convention
/// - `date` ← the file's modification time (UTC, whole seconds)
///
/// A blank title counts as missing.
pub fn with_defaults(
    mut record: MetadataRecord,
    stem: &str,
    modified: Option<SystemTime>,
) -> MetadataRecord {
    let has_title = record.title().is_some_and(|t| !t.trim().is_empty());
    if !has_title {
        record.insert(TITLE, naming::title_from_stem(stem));
    }
    if record.date().is_none()
        && let Some(modified) = modified
    {
        record.insert(DATE, Timestamp::from_system_time(modified));
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn wolf() -> MetadataRecord {
        MetadataRecord::new()
            .with(TITLE, "Wolf")
            .with(DATE, Timestamp::parse("2019-09-10T06:49:11").unwrap())
            .with(CAMERA_MODEL, "X100V")
    }

    #[test]
    fn merge_without_sidecar_keeps_extracted() {
        assert_eq!(merge(wolf(), None), wolf());
    }

    #[test]
    fn sidecar_overrides_title() {
        let sidecar = MetadataRecord::new().with(TITLE, "Sunrise");
        let merged = merge(wolf(), Some(sidecar));
        assert_eq!(merged.title(), Some("Sunrise"));
        assert_eq!(merged.get(CAMERA_MODEL), Some(&"X100V".into()));
    }

    #[test]
    fn sidecar_only_fields_are_added() {
        let sidecar = MetadataRecord::new().with("location", "Yellowstone");
        let merged = merge(wolf(), Some(sidecar));
        assert_eq!(merged.get("location"), Some(&"Yellowstone".into()));
        assert_eq!(merged.len(), 4);
    }

    #[test]
    fn sidecar_wins_regardless_of_construction_order() {
        let sidecar = MetadataRecord::new().with(TITLE, "Sunrise");
        let a = merge(wolf(), Some(sidecar.clone()));
        let b = merge(MetadataRecord::new(), Some(sidecar));
        assert_eq!(a.title(), b.title());
    }

    #[test]
    fn keys_are_case_insensitive() {
        let record = MetadataRecord::new().with("Title", "Wolf");
        assert_eq!(record.title(), Some("Wolf"));
        let merged = merge(record, Some(MetadataRecord::new().with("TITLE", "Sunrise")));
        assert_eq!(merged.title(), Some("Sunrise"));
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn defaults_fill_missing_title_and_date() {
        let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(86_400);
        let record = with_defaults(MetadataRecord::new(), "010-Grey-Wolf", Some(modified));
        assert_eq!(record.title(), Some("Grey Wolf"));
        assert_eq!(
            record.date().map(Timestamp::canonical).as_deref(),
            Some("1970-01-02T00:00:00+00:00")
        );
    }

    #[test]
    fn defaults_never_override_present_fields() {
        let modified = SystemTime::UNIX_EPOCH;
        let record = with_defaults(wolf(), "IMG_4056", Some(modified));
        assert_eq!(record, wolf());
    }

    #[test]
    fn blank_title_is_replaced_by_default() {
        let record = with_defaults(MetadataRecord::new().with(TITLE, "  "), "dawn", None);
        assert_eq!(record.title(), Some("dawn"));
        assert!(record.date().is_none());
    }

    #[test]
    fn normalize_date_parses_text() {
        let mut record = MetadataRecord::new().with(DATE, "2020-01-02");
        record.normalize_date();
        assert!(record.date().is_some());

        let mut bad = MetadataRecord::new().with(DATE, "soon");
        bad.normalize_date();
        assert_eq!(bad.get(DATE), Some(&"soon".into()));
    }

    #[test]
    fn only_the_date_key_becomes_a_timestamp() {
        let record: MetadataRecord =
            serde_json::from_str(r#"{"title": "2021-03-04", "Date": "2021-03-04"}"#).unwrap();
        assert_eq!(record.title(), Some("2021-03-04"));
        assert_eq!(
            record.date().map(|d| d.canonical()),
            Some("2021-03-04T00:00:00".to_string())
        );

        let record = with_defaults(record, "IMG_4056", None);
        assert_eq!(record.title(), Some("2021-03-04"));
    }

    #[test]
    fn json_round_trip_restores_timestamps() {
        let json = serde_json::to_string(&wolf()).unwrap();
        let back: MetadataRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, wolf());
    }
}
