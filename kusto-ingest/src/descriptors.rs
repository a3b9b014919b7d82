//! Sources of ingestion data: local files, readers and blobs.

use crate::data_format::{CompressionType, DataFormat};
use futures::AsyncRead;
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use url::Url;
use uuid::Uuid;

/// How the ingestion service authenticates against the blob.
#[derive(Clone, Debug)]
pub enum BlobAuth {
    /// A SAS token appended to the blob path.
    SasToken(String),
    /// Adds `;managed_identity=<identity>` to the blob path.
    UserAssignedManagedIdentity(String),
    /// Adds `;managed_identity=system` to the blob path.
    SystemAssignedManagedIdentity,
}

/// A blob holding data to ingest.
#[derive(Clone, Debug)]
pub struct BlobDescriptor {
    uri: Url,
    pub(crate) size: Option<u64>,
    pub(crate) source_id: Uuid,
    blob_auth: Option<BlobAuth>,
}

impl BlobDescriptor {
    /// Describes a blob by its URI. A fresh source id is generated when not
    /// supplied.
    pub fn new(uri: Url, size: Option<u64>, source_id: Option<Uuid>) -> Self {
        Self {
            uri,
            size,
            source_id: source_id.unwrap_or_else(Uuid::new_v4),
            blob_auth: None,
        }
    }

    /// Attaches authentication information for the ingestion service.
    #[must_use]
    pub fn with_blob_auth(mut self, blob_auth: BlobAuth) -> Self {
        self.blob_auth = Some(blob_auth);
        self
    }

    /// The source id of this submission.
    pub fn source_id(&self) -> Uuid {
        self.source_id
    }

    /// The blob path as it goes into the queue message, including the
    /// authentication suffix.
    pub fn uri(&self) -> String {
        match &self.blob_auth {
            Some(BlobAuth::SasToken(token)) => {
                let mut uri = self.uri.clone();
                uri.set_query(Some(token.trim_start_matches('?')));
                uri.to_string()
            }
            Some(BlobAuth::UserAssignedManagedIdentity(object_id)) => {
                format!("{};managed_identity={}", self.uri, object_id)
            }
            Some(BlobAuth::SystemAssignedManagedIdentity) => {
                format!("{};managed_identity=system", self.uri)
            }
            None => self.uri.to_string(),
        }
    }
}

/// A local file holding data to ingest.
#[derive(Clone, Debug)]
pub struct FileDescriptor {
    /// Path of the file.
    pub path: PathBuf,
    /// Size of the uncompressed data, when known.
    pub size: Option<u64>,
    /// The source id of this submission.
    pub source_id: Uuid,
    /// Format detected from the file name.
    pub format: DataFormat,
    /// Compression detected from the file name.
    pub compression: CompressionType,
}

impl FileDescriptor {
    /// Describes a local file; format and compression are detected from the
    /// extension (CSV when unrecognised).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (format, compression) = DataFormat::detect(&path);
        Self {
            path,
            size: None,
            source_id: Uuid::new_v4(),
            format,
            compression,
        }
    }

    /// Overrides the known uncompressed size.
    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Overrides the generated source id.
    #[must_use]
    pub fn with_source_id(mut self, source_id: Uuid) -> Self {
        self.source_id = source_id;
        self
    }

    /// Forces the payload to be treated as raw, disabling compression
    /// detection.
    #[must_use]
    pub fn with_raw_payload(mut self) -> Self {
        self.compression = CompressionType::None;
        self.format = DataFormat::Raw;
        self
    }

    pub(crate) fn display_path(&self) -> String {
        self.path.display().to_string()
    }
}

impl From<&Path> for FileDescriptor {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

/// An arbitrary async reader holding data to ingest.
pub struct StreamDescriptor {
    pub(crate) stream: Box<dyn AsyncRead + Send + Unpin>,
    pub(crate) size: Option<u64>,
    pub(crate) source_id: Uuid,
    pub(crate) format: DataFormat,
    pub(crate) compression: CompressionType,
    pub(crate) name: String,
}

impl StreamDescriptor {
    /// Describes a reader. The name is used for tracing and for format
    /// detection, like a file name.
    pub fn new(stream: impl AsyncRead + Send + Unpin + 'static, name: impl Into<String>) -> Self {
        let name = name.into();
        let (format, compression) = DataFormat::detect(Path::new(&name));
        Self {
            stream: Box::new(stream),
            size: None,
            source_id: Uuid::new_v4(),
            format,
            compression,
            name,
        }
    }

    /// Overrides the known uncompressed size.
    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Overrides the generated source id.
    #[must_use]
    pub fn with_source_id(mut self, source_id: Uuid) -> Self {
        self.source_id = source_id;
        self
    }

    /// Overrides the detected format.
    #[must_use]
    pub fn with_format(mut self, format: DataFormat) -> Self {
        self.format = format;
        self
    }

    /// Marks the payload as already compressed.
    #[must_use]
    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }
}

impl Debug for StreamDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamDescriptor")
            .field("size", &self.size)
            .field("source_id", &self.source_id)
            .field("format", &self.format)
            .field("compression", &self.compression)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
