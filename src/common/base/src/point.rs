use std::fmt::{Debug, Formatter};
use std::ops::Deref;

/// KEY_FIELD_SEPARATOR separates the series key from the field name in the composite key
/// that identifies a specific field in series
pub const KEY_FIELD_SEPARATOR: &'static str = "#!~#";

pub fn series_field_key(series: &[u8], field: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(series.len() + KEY_FIELD_SEPARATOR.len() + field.len());
    key.extend_from_slice(series);
    key.extend_from_slice(KEY_FIELD_SEPARATOR.as_bytes());
    key.extend_from_slice(field);
    key
}

/// split_series_field_key splits a composite key back into its series key and field name.
pub fn split_series_field_key(key: &[u8]) -> Option<(&[u8], &[u8])> {
    let sep = KEY_FIELD_SEPARATOR.as_bytes();
    if key.len() < sep.len() {
        return None;
    }

    (0..=key.len() - sep.len())
        .rev()
        .find(|&i| &key[i..i + sep.len()] == sep)
        .map(|i| (&key[..i], &key[i + sep.len()..]))
}

#[derive(Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Tag {
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self { key, value }
    }

    pub fn size(&self) -> usize {
        self.key.len() + self.value.len()
    }
}

impl Debug for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tag")
            .field("key", &String::from_utf8_lossy(&self.key))
            .field("value", &String::from_utf8_lossy(&self.value))
            .finish()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tags(Vec<Tag>);

impl Tags {
    pub fn new(tags: Vec<Tag>) -> Self {
        Self(tags)
    }

    pub fn size(&self) -> usize {
        self.0.iter().map(|x| x.size()).sum()
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|t| t.key.as_slice() == key)
            .map(|t| t.value.as_slice())
    }
}

impl Deref for Tags {
    type Target = [Tag];

    fn deref(&self) -> &Self::Target {
        self.0.as_slice()
    }
}

/// parse_series_key splits a line-protocol style series key (`cpu,host=a,region=west`)
/// into its measurement name and tag set. Backslash escapes are removed.
pub fn parse_series_key(key: &[u8]) -> anyhow::Result<(Vec<u8>, Tags)> {
    let mut parts = split_unescaped(key, b',').into_iter();

    let name = match parts.next() {
        Some(name) if !name.is_empty() => unescape(name),
        _ => return Err(anyhow!("missing measurement in series key")),
    };

    let mut tags = Vec::new();
    for part in parts {
        let kv = split_unescaped(part, b'=');
        if kv.len() != 2 || kv[0].is_empty() {
            return Err(anyhow!(
                "invalid tag in series key: {}",
                String::from_utf8_lossy(part)
            ));
        }
        tags.push(Tag::new(unescape(kv[0]), unescape(kv[1])));
    }

    Ok((name, Tags::new(tags)))
}

fn split_unescaped(b: &[u8], sep: u8) -> Vec<&[u8]> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < b.len() {
        match b[i] {
            b'\\' => i += 1,
            c if c == sep => {
                parts.push(&b[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&b[start.min(b.len())..]);
    parts
}

fn unescape(b: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(b.len());
    let mut i = 0;
    while i < b.len() {
        if b[i] == b'\\' && i + 1 < b.len() {
            i += 1;
        }
        out.push(b[i]);
        i += 1;
    }
    out
}
