//! Raw feed records as handed over by a fetch adapter.
//!
//! Feeds put the same information under different, often vendor-specific
//! keys, so entries are kept as a keyed mapping of [`RawValue`]s with named
//! accessors for the fields the normalizer cares about. Nested lookups go
//! through [`get_path`], which only understands the two container shapes a
//! feed record can have: keyed maps and ordered lists.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// A single value inside a raw feed record.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// A structured timestamp, already resolved to UTC by the adapter.
    Time(DateTime<Utc>),
    List(Vec<RawValue>),
    Map(BTreeMap<String, RawValue>),
}

impl RawValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RawValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[RawValue]> {
        match self {
            RawValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, RawValue>> {
        match self {
            RawValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Whether the value counts as "present and non-empty": non-empty text
    /// and containers, non-zero numbers, `true`, and any timestamp.
    pub fn is_truthy(&self) -> bool {
        match self {
            RawValue::Null => false,
            RawValue::Bool(b) => *b,
            RawValue::Int(n) => *n != 0,
            RawValue::Float(f) => *f != 0.0,
            RawValue::Text(s) => !s.is_empty(),
            RawValue::Time(_) => true,
            RawValue::List(items) => !items.is_empty(),
            RawValue::Map(map) => !map.is_empty(),
        }
    }

    /// Textual form of the value. `Null` is empty text.
    pub fn to_text(&self) -> String {
        match self {
            RawValue::Null => String::new(),
            RawValue::Text(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Interprets the value as a structured timestamp and returns Unix seconds.
    ///
    /// Accepts a [`RawValue::Time`], an RFC 3339 or RFC 2822 string, or a
    /// time tuple `[year, month, day, hour, minute, second, ...]` in UTC.
    /// Plain integers are not accepted: a bare number carries no calendar
    /// structure and is treated as malformed.
    pub fn to_timestamp(&self) -> Option<i64> {
        match self {
            RawValue::Time(dt) => Some(dt.timestamp()),
            RawValue::Text(s) => DateTime::parse_from_rfc3339(s.trim())
                .or_else(|_| DateTime::parse_from_rfc2822(s.trim()))
                .ok()
                .map(|dt| dt.timestamp()),
            RawValue::List(items) => time_tuple_to_timestamp(items),
            _ => None,
        }
    }
}

fn time_tuple_to_timestamp(items: &[RawValue]) -> Option<i64> {
    if items.len() < 6 {
        return None;
    }
    let mut parts = [0i64; 6];
    for (slot, item) in parts.iter_mut().zip(items) {
        let RawValue::Int(n) = item else {
            return None;
        };
        *slot = *n;
    }
    let [year, month, day, hour, minute, second] = parts;
    let datetime = NaiveDate::from_ymd_opt(
        i32::try_from(year).ok()?,
        u32::try_from(month).ok()?,
        u32::try_from(day).ok()?,
    )?
    .and_hms_opt(
        u32::try_from(hour).ok()?,
        u32::try_from(minute).ok()?,
        // Leap seconds (61 in time tuples) clamp to the last valid second.
        u32::try_from(second.min(59)).ok()?,
    )?;
    Some(datetime.and_utc().timestamp())
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => Ok(()),
            RawValue::Bool(b) => write!(f, "{}", b),
            RawValue::Int(n) => write!(f, "{}", n),
            RawValue::Float(x) => write!(f, "{}", x),
            RawValue::Text(s) => f.write_str(s),
            RawValue::Time(dt) => f.write_str(&dt.to_rfc3339()),
            RawValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            RawValue::Map(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl From<i64> for RawValue {
    fn from(n: i64) -> Self {
        RawValue::Int(n)
    }
}

impl From<DateTime<Utc>> for RawValue {
    fn from(dt: DateTime<Utc>) -> Self {
        RawValue::Time(dt)
    }
}

impl From<Vec<RawValue>> for RawValue {
    fn from(items: Vec<RawValue>) -> Self {
        RawValue::List(items)
    }
}

impl From<BTreeMap<String, RawValue>> for RawValue {
    fn from(map: BTreeMap<String, RawValue>) -> Self {
        RawValue::Map(map)
    }
}

impl From<serde_json::Value> for RawValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => RawValue::Null,
            Value::Bool(b) => RawValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => RawValue::Int(i),
                None => RawValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => RawValue::Text(s),
            Value::Array(items) => RawValue::List(items.into_iter().map(RawValue::from).collect()),
            Value::Object(map) => RawValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, RawValue::from(v)))
                    .collect(),
            ),
        }
    }
}

/// One step of a nested lookup: a map key or a list index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKey<'a> {
    Key(&'a str),
    Index(usize),
}

impl<'a> From<&'a str> for PathKey<'a> {
    fn from(key: &'a str) -> Self {
        PathKey::Key(key)
    }
}

impl From<usize> for PathKey<'_> {
    fn from(index: usize) -> Self {
        PathKey::Index(index)
    }
}

/// Builds a `&[PathKey]` from a mix of string keys and list indices.
///
/// ```
/// use feedsift::feed::{get_path, RawValue};
/// use feedsift::path;
///
/// let value = RawValue::from(serde_json::json!({"content": [{"value": "body"}]}));
/// let found = get_path(&value, path!["content", 0, "value"]);
/// assert_eq!(found.and_then(RawValue::as_str), Some("body"));
/// ```
#[macro_export]
macro_rules! path {
    ($($key:expr),* $(,)?) => {
        &[$($crate::feed::PathKey::from($key)),*][..]
    };
}

/// Follows `keys` into `value`, returning `None` as soon as a key is missing,
/// an index is out of range, or a step does not fit the container shape
/// (a key applied to a list, an index applied to a map, anything applied to
/// a scalar).
pub fn get_path<'v>(value: &'v RawValue, keys: &[PathKey<'_>]) -> Option<&'v RawValue> {
    let mut current = value;
    for key in keys {
        current = match (current, key) {
            (RawValue::Map(map), PathKey::Key(k)) => map.get(*k)?,
            (RawValue::List(items), PathKey::Index(i)) => items.get(*i)?,
            _ => return None,
        };
    }
    Some(current)
}

/// A keyed raw record: a feed entry or the feed-level metadata block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: BTreeMap<String, RawValue>,
}

/// One entry of a fetched feed.
pub type RawFeedEntry = RawRecord;

/// Feed-level metadata (`modified`, `modified_parsed`, `updated_parsed`, ...).
pub type RawFeedMeta = RawRecord;

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<RawValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Nested lookup starting at a top-level key.
    pub fn path(&self, keys: &[PathKey<'_>]) -> Option<&RawValue> {
        let (first, rest) = keys.split_first()?;
        let PathKey::Key(key) = first else {
            return None;
        };
        get_path(self.fields.get(*key)?, rest)
    }

    /// Builds a record from a JSON object. Returns `None` for any other JSON
    /// shape.
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Object(map) => Some(
                map.into_iter()
                    .map(|(k, v)| (k, RawValue::from(v)))
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn link(&self) -> Option<&str> {
        self.get("link").and_then(RawValue::as_str)
    }

    pub fn title(&self) -> Option<&RawValue> {
        self.get("title")
    }

    pub fn summary(&self) -> Option<&RawValue> {
        self.get("summary")
    }

    /// The entry's tag list. `Some` whenever the key is present, even if the
    /// list is empty.
    pub fn tags(&self) -> Option<&[RawValue]> {
        match self.get("tags")? {
            RawValue::Null => None,
            other => Some(other.as_list().unwrap_or_default()),
        }
    }

    pub fn published(&self) -> Option<&RawValue> {
        self.get("published_parsed")
    }
}

impl FromIterator<(String, RawValue)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (String, RawValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
