use crate::error::{Result, VfsError};
use crate::utils::{is_binary, type_hint};
use crate::vfs::backing::{ByteRangeProvider, ReadRequest};
use crate::vfs::entry::Locator;
use std::io::{self, Read};
use tracing::trace;

/// A decoded file, as far as the core cares about it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedResource {
    /// Content with a text projection that matchers can search
    Text { type_hint: String, text: String },
    /// Content that decoded fine but has no searchable text
    Opaque { type_hint: String, len: usize },
}

impl DecodedResource {
    pub fn text(&self) -> Option<&str> {
        match self {
            DecodedResource::Text { text, .. } => Some(text),
            DecodedResource::Opaque { .. } => None,
        }
    }

    pub fn type_hint(&self) -> &str {
        match self {
            DecodedResource::Text { type_hint, .. } | DecodedResource::Opaque { type_hint, .. } => {
                type_hint
            }
        }
    }
}

/// Turns raw file bytes into a resource
pub trait FileDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8], type_hint: &str) -> Result<DecodedResource>;
}

/// Decodes anything that looks like text, lossily, and rejects binary content
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDecoder;

impl FileDecoder for TextDecoder {
    fn decode(&self, bytes: &[u8], type_hint: &str) -> Result<DecodedResource> {
        if is_binary(bytes) {
            return Err(VfsError::Format {
                type_hint: type_hint.to_string(),
                reason: "binary content has no text projection".into(),
            });
        }
        let text = match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => String::from_utf8_lossy(bytes).into_owned(),
        };
        Ok(DecodedResource::Text {
            type_hint: type_hint.to_string(),
            text,
        })
    }
}

/// Scoped, exclusive access to one file's content.
///
/// The reader is acquired in [`FileLookup::open`] and released when the
/// lookup is dropped, whichever way the caller leaves.
pub struct FileLookup<'a> {
    path: String,
    type_hint: String,
    expected_len: u64,
    decoder: &'a dyn FileDecoder,
    reader: Option<Box<dyn Read + Send>>,
    bytes: Option<Vec<u8>>,
    /// Kind and message of a failed read, replayed on later calls
    read_failure: Option<(io::ErrorKind, String)>,
    decoded: Option<DecodedResource>,
}

impl<'a> FileLookup<'a> {
    pub fn open(
        provider: &dyn ByteRangeProvider,
        decoder: &'a dyn FileDecoder,
        path: &str,
        locator: Locator,
    ) -> Result<Self> {
        let reader = provider.open(&ReadRequest { path, locator })?;
        let name = path.rsplit('/').next().unwrap_or(path);
        trace!(path, "lookup opened");

        Ok(Self {
            path: path.to_string(),
            type_hint: type_hint(name),
            expected_len: locator.size,
            decoder,
            reader: Some(reader),
            bytes: None,
            read_failure: None,
            decoded: None,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn type_hint(&self) -> &str {
        &self.type_hint
    }

    /// Raw content, read on first call
    ///
    /// A failed read is not retried; every later call reports the same error.
    pub fn bytes(&mut self) -> Result<&[u8]> {
        if let Some((kind, message)) = &self.read_failure {
            return Err(VfsError::Io(io::Error::new(*kind, message.clone())));
        }
        if self.bytes.is_none() {
            let mut buf = Vec::with_capacity(self.expected_len.min(1 << 20) as usize);
            if let Some(mut reader) = self.reader.take() {
                if let Err(e) = reader.read_to_end(&mut buf) {
                    self.read_failure = Some((e.kind(), e.to_string()));
                    return Err(e.into());
                }
            }
            self.bytes = Some(buf);
        }
        Ok(self.bytes.as_deref().unwrap_or_default())
    }

    /// Decoded resource, decoded on first call and kept for the lookup's lifetime
    pub fn decode(&mut self) -> Result<&DecodedResource> {
        if self.decoded.is_none() {
            let decoder = self.decoder;
            let hint = self.type_hint.clone();
            let resource = decoder.decode(self.bytes()?, &hint)?;
            self.decoded = Some(resource);
        }
        self.decoded
            .as_ref()
            .ok_or_else(|| VfsError::not_found(self.path.clone()))
    }

    /// Text projection of the content, or a `Format` error if it has none
    pub fn text(&mut self) -> Result<&str> {
        let hint = self.type_hint.clone();
        self.decode()?.text().ok_or(VfsError::Format {
            type_hint: hint,
            reason: "resource has no text projection".into(),
        })
    }
}

impl Drop for FileLookup<'_> {
    fn drop(&mut self) {
        // Drop the reader before the buffered content
        self.reader.take();
        trace!(path = %self.path, "lookup released");
    }
}
