//! Recognised event names and `name.namespace` subscription specs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// Every event the bus recognises.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventName {
    Init,
    Start,
    StartFile,
    Finish,
    FinishFile,
    Error,
    ErrorFile,
    BeforeUpload,
    BeforeUploadFile,
    Progress,
    ProgressFile,
    Select,
    Md5Start,
    Md5Done,
    BeforeImageResize,
    ImageResize,
    DragEnter,
    DragLeave,
    DragOver,
    Drop,
    BeforeRenderFile,
    AfterRenderFile,
}

impl EventName {
    /// All recognised names, in declaration order.
    pub const ALL: [Self; 22] = [
        Self::Init,
        Self::Start,
        Self::StartFile,
        Self::Finish,
        Self::FinishFile,
        Self::Error,
        Self::ErrorFile,
        Self::BeforeUpload,
        Self::BeforeUploadFile,
        Self::Progress,
        Self::ProgressFile,
        Self::Select,
        Self::Md5Start,
        Self::Md5Done,
        Self::BeforeImageResize,
        Self::ImageResize,
        Self::DragEnter,
        Self::DragLeave,
        Self::DragOver,
        Self::Drop,
        Self::BeforeRenderFile,
        Self::AfterRenderFile,
    ];

    /// Canonical camelCase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Start => "start",
            Self::StartFile => "startFile",
            Self::Finish => "finish",
            Self::FinishFile => "finishFile",
            Self::Error => "error",
            Self::ErrorFile => "errorFile",
            Self::BeforeUpload => "beforeUpload",
            Self::BeforeUploadFile => "beforeUploadFile",
            Self::Progress => "progress",
            Self::ProgressFile => "progressFile",
            Self::Select => "select",
            Self::Md5Start => "md5Start",
            Self::Md5Done => "md5Done",
            Self::BeforeImageResize => "beforeImageResize",
            Self::ImageResize => "imageResize",
            Self::DragEnter => "dragEnter",
            Self::DragLeave => "dragLeave",
            Self::DragOver => "dragOver",
            Self::Drop => "drop",
            Self::BeforeRenderFile => "beforeRenderFile",
            Self::AfterRenderFile => "afterRenderFile",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = QueueError;

    /// Case-insensitive lookup; unknown names are an error.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| QueueError::UnknownEvent(s.to_string()))
    }
}

/// A parsed subscription target: event name plus namespace.
///
/// `"finish"` has the empty namespace, `"finish.ui"` has namespace `"ui"`.
/// Only the first `.` separates; the rest belongs to the namespace.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventSpec {
    /// Target event.
    pub name: EventName,
    /// Namespace discriminator (empty string by default).
    pub namespace: String,
}

impl EventSpec {
    /// Spec with the empty namespace.
    #[must_use]
    pub const fn new(name: EventName) -> Self {
        Self {
            name,
            namespace: String::new(),
        }
    }

    /// Spec with an explicit namespace.
    pub fn namespaced(name: EventName, namespace: impl Into<String>) -> Self {
        Self {
            name,
            namespace: namespace.into(),
        }
    }
}

impl From<EventName> for EventSpec {
    fn from(name: EventName) -> Self {
        Self::new(name)
    }
}

impl FromStr for EventSpec {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, namespace) = s.split_once('.').unwrap_or((s, ""));
        Ok(Self {
            name: name.trim().parse()?,
            namespace: namespace.to_string(),
        })
    }
}

/// Anything `on`/`off` accept as a subscription target.
///
/// Typed names and specs always convert; strings are parsed and may name
/// an unknown event.
pub trait IntoEventSpec {
    /// Convert into a spec.
    fn into_event_spec(self) -> Result<EventSpec, QueueError>;
}

impl IntoEventSpec for EventSpec {
    fn into_event_spec(self) -> Result<EventSpec, QueueError> {
        Ok(self)
    }
}

impl IntoEventSpec for EventName {
    fn into_event_spec(self) -> Result<EventSpec, QueueError> {
        Ok(EventSpec::new(self))
    }
}

impl IntoEventSpec for &str {
    fn into_event_spec(self) -> Result<EventSpec, QueueError> {
        self.parse()
    }
}

impl IntoEventSpec for String {
    fn into_event_spec(self) -> Result<EventSpec, QueueError> {
        self.parse()
    }
}

impl fmt::Display for EventSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.name, self.namespace)
        }
    }
}
