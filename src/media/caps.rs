//! Owned capability descriptor snapshots.
//!
//! Engines hand the bridge their negotiated caps as a [`Caps`]: a structure
//! name such as `video/x-raw` plus ordered typed fields. A snapshot owns all
//! of its data, so it can cross from an engine thread into the event queue
//! without borrowing anything from the engine.

use std::fmt;

/// A typed caps field value.
#[derive(Debug, Clone, PartialEq)]
pub enum CapsValue {
    Int(i32),
    Bool(bool),
    Str(String),
    Double(f64),
    Fraction(i32, i32),
    List(Vec<CapsValue>),
}

impl CapsValue {
    /// Type tag used in the textual form, e.g. `(int)`.
    pub fn type_name(&self) -> &'static str {
        match self {
            CapsValue::Int(_) => "int",
            CapsValue::Bool(_) => "boolean",
            CapsValue::Str(_) => "string",
            CapsValue::Double(_) => "double",
            CapsValue::Fraction(..) => "fraction",
            CapsValue::List(_) => "list",
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            CapsValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CapsValue::Str(s) => Some(s),
            _ => None,
        }
    }

    fn fmt_bare(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapsValue::Int(v) => write!(f, "{}", v),
            CapsValue::Bool(v) => write!(f, "{}", v),
            CapsValue::Str(s) => {
                if s.is_empty() || s.chars().any(|c| !is_bare_char(c)) {
                    write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
                } else {
                    write!(f, "{}", s)
                }
            }
            CapsValue::Double(v) => write!(f, "{}", v),
            CapsValue::Fraction(n, d) => write!(f, "{}/{}", n, d),
            CapsValue::List(items) => {
                write!(f, "{{ ")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    item.fmt_bare(f)?;
                }
                write!(f, " }}")
            }
        }
    }
}

fn is_bare_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+' | '.' | '/' | ':')
}

impl fmt::Display for CapsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapsValue::List(_) => self.fmt_bare(f),
            _ => {
                write!(f, "({})", self.type_name())?;
                self.fmt_bare(f)
            }
        }
    }
}

impl From<i32> for CapsValue {
    fn from(v: i32) -> Self {
        CapsValue::Int(v)
    }
}

impl From<bool> for CapsValue {
    fn from(v: bool) -> Self {
        CapsValue::Bool(v)
    }
}

impl From<f64> for CapsValue {
    fn from(v: f64) -> Self {
        CapsValue::Double(v)
    }
}

impl From<&str> for CapsValue {
    fn from(v: &str) -> Self {
        CapsValue::Str(v.to_string())
    }
}

impl From<String> for CapsValue {
    fn from(v: String) -> Self {
        CapsValue::Str(v)
    }
}

/// Snapshot of the first structure of a caps object.
#[derive(Debug, Clone, PartialEq)]
pub struct Caps {
    name: String,
    fields: Vec<(String, CapsValue)>,
}

impl Caps {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Builder form of [`Caps::set`].
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<CapsValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Set a field, replacing an existing value with the same key in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<CapsValue>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    /// Structure name, e.g. `audio/x-raw`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self, key: &str) -> Option<&CapsValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_int(&self, key: &str) -> Option<i32> {
        self.field(key).and_then(CapsValue::as_int)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(CapsValue::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &CapsValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.name.starts_with(prefix)
    }

    /// Split the name at the first `/` into `(type, subtype)`.
    ///
    /// A name without `/` yields an empty subtype.
    pub fn split_media_type(&self) -> (&str, &str) {
        match self.name.split_once('/') {
            Some((media, format)) => (media, format),
            None => (self.name.as_str(), ""),
        }
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for (key, value) in &self.fields {
            write!(f, ", {}={}", key, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_lookup() {
        let caps = Caps::new("video/x-raw")
            .with_field("format", "I420")
            .with_field("width", 640)
            .with_field("height", 480);

        assert_eq!(caps.name(), "video/x-raw");
        assert_eq!(caps.get_str("format"), Some("I420"));
        assert_eq!(caps.get_int("width"), Some(640));
        assert_eq!(caps.get_int("format"), None);
        assert!(caps.field("framerate").is_none());
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut caps = Caps::new("audio/x-raw")
            .with_field("rate", 44100)
            .with_field("channels", 2);
        caps.set("rate", 48000);

        let keys: Vec<_> = caps.fields().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["rate", "channels"]);
        assert_eq!(caps.get_int("rate"), Some(48000));
    }

    #[test]
    fn test_split_media_type() {
        assert_eq!(
            Caps::new("application/x-rtp").split_media_type(),
            ("application", "x-rtp")
        );
        assert_eq!(Caps::new("video/x-h264/extra").split_media_type(), ("video", "x-h264/extra"));
        assert_eq!(Caps::new("ANY").split_media_type(), ("ANY", ""));
    }

    #[test]
    fn test_display() {
        let caps = Caps::new("video/x-raw")
            .with_field("format", "NV12")
            .with_field("width", 320)
            .with_field("framerate", CapsValue::Fraction(30, 1))
            .with_field("interlaced", false);
        assert_eq!(
            caps.to_string(),
            "video/x-raw, format=(string)NV12, width=(int)320, framerate=(fraction)30/1, interlaced=(boolean)false"
        );
    }

    #[test]
    fn test_display_quotes_strings_with_spaces() {
        let caps = Caps::new("text/x-raw").with_field("title", "hello world");
        assert_eq!(caps.to_string(), "text/x-raw, title=(string)\"hello world\"");
    }

    #[test]
    fn test_display_list() {
        let caps = Caps::new("audio/x-raw").with_field(
            "rate",
            CapsValue::List(vec![CapsValue::Int(44100), CapsValue::Int(48000)]),
        );
        assert_eq!(caps.to_string(), "audio/x-raw, rate={ 44100, 48000 }");
    }
}
