use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single frame of a stacktrace.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Frame {
    /// Name of the function being called.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// Name of the module the frame is contained in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// The source file name relative to the project root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Absolute path to the source file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abs_path: Option<String>,
    /// Line number within the source file, starting at 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineno: Option<u64>,
    /// Source code of the current line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_line: Option<String>,
    /// Source code leading up to the current line.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_context: Vec<String>,
    /// Source code of the lines after the current line.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_context: Vec<String>,
    /// Override whether this frame should be considered part of application code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_app: Option<bool>,
    /// Local variables in a convenient format.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, Value>,
}

/// A stack trace of a single thread, with the oldest frame first.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Stacktrace {
    /// Frames from outermost to innermost call.
    pub frames: Vec<Frame>,
}

/// A single exception.
///
/// Multiple exceptions of a chain are listed in the event's `exception.values` with the outermost
/// exception last.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Exception {
    /// Exception type, such as `ZeroDivisionError`.
    #[serde(rename = "type")]
    pub ty: String,
    /// Human readable display value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// The optional module, or package which the exception type lives in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// Stack trace at the point the exception was raised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<Stacktrace>,
    /// Identifier of the thread this exception occurred in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<u64>,
}

/// A thread that was running when the event occurred.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Thread {
    /// Identifier of the thread.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Display name of the thread.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Whether the crash happened in this thread.
    #[serde(default)]
    pub crashed: bool,
    /// Whether this thread captured the event.
    #[serde(default)]
    pub current: bool,
    /// Stack trace of the thread.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<Stacktrace>,
}
