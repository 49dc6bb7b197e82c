use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;

/// The default attachment type for files attached to events.
pub const DEFAULT_ATTACHMENT_TYPE: &str = "event.attachment";

/// Where the contents of an attachment come from.
#[derive(Clone, PartialEq)]
enum AttachmentSource {
    /// Contents held in memory.
    Bytes(Bytes),
    /// Contents read from a file when the envelope is built.
    Path(PathBuf),
}

/// A file sent along with an event.
#[derive(Clone, PartialEq)]
pub struct Attachment {
    /// File name reported to the collector.
    pub filename: String,
    /// MIME type of the contents.
    pub content_type: Option<String>,
    /// Attachment type, defaults to [`DEFAULT_ATTACHMENT_TYPE`].
    pub attachment_type: String,
    source: AttachmentSource,
}

impl Attachment {
    /// Creates an attachment from contents in memory.
    pub fn from_bytes(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            attachment_type: DEFAULT_ATTACHMENT_TYPE.to_owned(),
            source: AttachmentSource::Bytes(bytes.into()),
        }
    }

    /// Creates an attachment that is read from `path` when it is sent.
    ///
    /// The file name defaults to the last component of the path.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            filename,
            content_type: None,
            attachment_type: DEFAULT_ATTACHMENT_TYPE.to_owned(),
            source: AttachmentSource::Path(path.to_owned()),
        }
    }

    /// Sets the MIME type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Returns the path of a file-backed attachment.
    pub fn path(&self) -> Option<&Path> {
        match self.source {
            AttachmentSource::Path(ref path) => Some(path),
            AttachmentSource::Bytes(_) => None,
        }
    }

    /// Returns the contents, reading file-backed attachments from disk.
    pub fn payload(&self) -> io::Result<Bytes> {
        match self.source {
            AttachmentSource::Bytes(ref bytes) => Ok(bytes.clone()),
            AttachmentSource::Path(ref path) => fs::read(path).map(Bytes::from),
        }
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Attachment");
        debug
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("attachment_type", &self.attachment_type);

        match self.source {
            AttachmentSource::Bytes(ref bytes) => debug.field("length", &bytes.len()),
            AttachmentSource::Path(ref path) => debug.field("path", path),
        };

        debug.finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_from_bytes() {
        let attachment = Attachment::from_bytes("hello.txt", "hello").with_content_type("text/plain");
        assert_eq!(attachment.payload().unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(attachment.attachment_type, "event.attachment");
        assert!(attachment.path().is_none());
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"file contents").unwrap();

        let attachment = Attachment::from_path(file.path());
        assert_eq!(
            attachment.filename,
            file.path().file_name().unwrap().to_string_lossy()
        );
        assert_eq!(attachment.payload().unwrap(), Bytes::from_static(b"file contents"));
    }

    #[test]
    fn test_missing_file() {
        let attachment = Attachment::from_path("/nonexistent/beacon/attachment.log");
        assert_eq!(attachment.filename, "attachment.log");
        assert!(attachment.payload().is_err());
    }
}
