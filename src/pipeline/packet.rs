//! Values handed to host callbacks.
//!
//! Everything here is owned: payload bytes are copied out of the engine
//! buffer before the callback runs, since the engine may recycle the buffer
//! as soon as the sample is released.

use crate::media::{MediaKind, MediaProperties};
use serde_json::{Map, Value};

/// Numeric codes of sink notifications, as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SinkEventKind {
    Setup = 0,
    NewPreroll = 1,
    NewSample = 2,
    Eos = 3,
}

impl SinkEventKind {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// A copied sample plus its descriptive fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplePayload {
    pub kind: MediaKind,
    /// Caps name up to the first `/`, e.g. `video`
    pub media_type: String,
    /// Caps name after the first `/`, e.g. `x-raw`
    pub format: String,
    pub properties: MediaProperties,
    pub data: Vec<u8>,
}

impl SamplePayload {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Named properties attached to the payload object on the host side.
    ///
    /// Always carries `type` and `format`; audio and video add their
    /// structured fields.
    pub fn named_properties(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("type".to_string(), Value::from(self.media_type.clone()));
        map.insert("format".to_string(), Value::from(self.format.clone()));
        if matches!(
            self.properties,
            MediaProperties::Audio(_) | MediaProperties::Video(_)
        ) {
            map.extend(self.properties.to_map());
        }
        map
    }
}

/// Notification delivered to a sink callback.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    /// Sent once, before the first sample of the endpoint.
    Setup {
        media_type: String,
        properties: MediaProperties,
    },
    Preroll(SamplePayload),
    NewSample(SamplePayload),
    Eos,
}

impl SinkEvent {
    pub fn kind(&self) -> SinkEventKind {
        match self {
            SinkEvent::Setup { .. } => SinkEventKind::Setup,
            SinkEvent::Preroll(_) => SinkEventKind::NewPreroll,
            SinkEvent::NewSample(_) => SinkEventKind::NewSample,
            SinkEvent::Eos => SinkEventKind::Eos,
        }
    }

    pub fn payload(&self) -> Option<&SamplePayload> {
        match self {
            SinkEvent::Preroll(p) | SinkEvent::NewSample(p) => Some(p),
            _ => None,
        }
    }
}

/// Notification delivered to a pad probe callback.
#[derive(Debug, Clone, PartialEq)]
pub struct CapsNotification {
    /// Textual form of the renegotiated caps
    pub caps: String,
    pub kind: MediaKind,
    pub properties: MediaProperties,
}

/// A host callback slot that may be empty.
///
/// Hosts can hand over a missing function; registrations reject such slots
/// up front instead of failing later at call time.
pub struct Callback<A> {
    func: Option<Box<dyn FnMut(A)>>,
}

impl<A> Callback<A> {
    pub fn new(func: impl FnMut(A) + 'static) -> Self {
        Self {
            func: Some(Box::new(func)),
        }
    }

    pub fn empty() -> Self {
        Self { func: None }
    }

    pub fn is_empty(&self) -> bool {
        self.func.is_none()
    }

    /// Invoke the callback; returns `false` for an empty slot.
    pub fn call(&mut self, arg: A) -> bool {
        match self.func.as_mut() {
            Some(func) => {
                func(arg);
                true
            }
            None => false,
        }
    }
}

impl<A> Default for Callback<A> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<A, F> From<F> for Callback<A>
where
    F: FnMut(A) + 'static,
{
    fn from(func: F) -> Self {
        Self::new(func)
    }
}

impl<A> std::fmt::Debug for Callback<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "Callback(empty)")
        } else {
            write!(f, "Callback(..)")
        }
    }
}

pub type SinkCallback = Callback<SinkEvent>;
pub type CapsCallback = Callback<CapsNotification>;
pub type CompletionCallback = Callback<()>;
