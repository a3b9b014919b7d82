//! Properties of an ingestion, and their per-ingestor validation.

use crate::data_format::{DataFormat, IngestionMappingKind};
use kusto_data::error::{Error as KustoError, ErrorKind, OpKind};
use serde::Serializer;
use time::OffsetDateTime;

/// Which ingestion states are reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportLevel {
    /// Only failures are reported.
    FailuresOnly,
    /// Nothing is reported.
    DoNotReport,
    /// Both failures and successes are reported.
    FailuresAndSuccesses,
}

impl serde::Serialize for ReportLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // The queue message carries these as integers.
        serializer.serialize_u8(match self {
            ReportLevel::FailuresOnly => 0,
            ReportLevel::DoNotReport => 1,
            ReportLevel::FailuresAndSuccesses => 2,
        })
    }
}

/// Which mechanism reports the ingestion status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportMethod {
    /// Completion messages on the secured notification queues.
    Queue,
    /// Rows in the ingestion status table.
    Table,
    /// Both mechanisms.
    QueueAndTable,
}

impl serde::Serialize for ReportMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(match self {
            ReportMethod::Queue => 0,
            ReportMethod::Table => 1,
            ReportMethod::QueueAndTable => 2,
        })
    }
}

/// The ingestor variant a submission goes through; options are validated
/// against it before any I/O happens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum IngestorKind {
    Queued,
    Streaming,
}

impl IngestorKind {
    pub(crate) fn op(self) -> OpKind {
        match self {
            IngestorKind::Queued => OpKind::FileIngest,
            IngestorKind::Streaming => OpKind::IngestStream,
        }
    }
}

/// The shape of the submitted source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SourceKind {
    File,
    Reader,
    Blob,
}

/// Properties of an ingestion, allowing customisation of the ingestion
/// process.
#[derive(Clone, Debug, Default)]
pub struct IngestionProperties {
    /// Name of the database to ingest into.
    pub database_name: String,
    /// Name of the table to ingest into.
    pub table_name: String,
    /// Whether the blob is retained after ingestion.
    /// Note that the default when not provided is `false`, meaning that the
    /// service will attempt to delete the blob upon ingestion. This will
    /// only succeed when it was granted sufficient permissions on the blob.
    pub retain_blob_on_success: Option<bool>,
    /// Format of the data being ingested. When absent it is taken from the
    /// mapping, the source's extension, or defaults to CSV.
    pub data_format: Option<DataFormat>,
    /// If set to `true`, any server-side aggregation will be skipped. Only
    /// the queued path supports it. Default is `false`.
    pub flush_immediately: Option<bool>,
    /// Deletes the source file once the submission was handed off. Only
    /// file sources support it.
    pub delete_source_on_success: Option<bool>,
    /// Client request id for tracing. Only the streaming path carries it.
    pub client_request_id: Option<String>,
    /// Name of a pre-created ingestion mapping on the table.
    pub ingestion_mapping_reference: Option<String>,
    /// An inline ingestion mapping, as its JSON text.
    pub ingestion_mapping: Option<String>,
    /// The kind of the referenced or inline mapping.
    pub ingestion_mapping_kind: Option<IngestionMappingKind>,
    /// Ignores the first record of the data, e.g. a CSV header line.
    pub ignore_first_record: Option<bool>,
    /// Overrides the creation time of the ingested extents.
    pub creation_time: Option<OffsetDateTime>,
    /// Which ingestion states are reported.
    pub report_level: Option<ReportLevel>,
    /// Which mechanism reports the ingestion status.
    pub report_method: Option<ReportMethod>,
}

impl IngestionProperties {
    fn client_args(op: OpKind, message: impl Into<String>) -> KustoError {
        KustoError::new(op, ErrorKind::ClientArgs, message)
    }

    /// Fails fast on option combinations that are illegal for the given
    /// ingestor and source, before any I/O.
    pub(crate) fn validate(
        &self,
        ingestor: IngestorKind,
        source: SourceKind,
    ) -> Result<(), KustoError> {
        let op = ingestor.op();
        if self.database_name.is_empty() {
            return Err(Self::client_args(op, "database name cannot be empty"));
        }
        if self.table_name.is_empty() {
            return Err(Self::client_args(op, "table name cannot be empty"));
        }
        if self.flush_immediately.is_some() && ingestor != IngestorKind::Queued {
            return Err(Self::client_args(
                op,
                "FlushImmediately is only legal for queued ingestion",
            ));
        }
        if self.delete_source_on_success.is_some() && source != SourceKind::File {
            return Err(Self::client_args(
                op,
                "DeleteSource is only legal for file sources",
            ));
        }
        if self.client_request_id.is_some() && ingestor != IngestorKind::Streaming {
            return Err(Self::client_args(
                op,
                "ClientRequestId is only legal for streaming ingestion",
            ));
        }
        if ingestor == IngestorKind::Streaming && source == SourceKind::Blob {
            return Err(Self::client_args(
                op,
                "blob sources cannot be ingested through the streaming endpoint",
            ));
        }
        if self.ingestion_mapping.is_some() && self.ingestion_mapping_reference.is_some() {
            return Err(Self::client_args(
                op,
                "an inline mapping and a mapping reference cannot both be supplied",
            ));
        }

        // Format and mapping must agree when both are present.
        if let (Some(format), Some(kind)) = (self.data_format, self.ingestion_mapping_kind) {
            if format.ingestion_mapping_kind() != kind {
                return Err(Self::client_args(
                    op,
                    format!(
                        "format {} does not take a {:?} mapping",
                        format.wire_name(),
                        kind
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Resolves the effective data format: explicit, implied by the
    /// mapping, detected from the source, or CSV.
    pub(crate) fn resolve_format(&self, detected: Option<DataFormat>) -> DataFormat {
        if let Some(format) = self.data_format {
            return format;
        }
        if let Some(implied) = self
            .ingestion_mapping_kind
            .and_then(DataFormat::from_mapping_kind)
        {
            return implied;
        }
        detected.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties() -> IngestionProperties {
        IngestionProperties {
            database_name: "db".to_string(),
            table_name: "table".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn flush_immediately_is_queued_only() {
        let props = IngestionProperties {
            flush_immediately: Some(true),
            ..properties()
        };
        assert!(props.validate(IngestorKind::Queued, SourceKind::File).is_ok());
        let err = props
            .validate(IngestorKind::Streaming, SourceKind::File)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClientArgs);
        assert_eq!(err.op(), OpKind::IngestStream);
    }

    #[test]
    fn delete_source_is_file_only() {
        let props = IngestionProperties {
            delete_source_on_success: Some(true),
            ..properties()
        };
        assert!(props.validate(IngestorKind::Queued, SourceKind::File).is_ok());
        assert!(props
            .validate(IngestorKind::Queued, SourceKind::Reader)
            .is_err());
        assert!(props
            .validate(IngestorKind::Queued, SourceKind::Blob)
            .is_err());
    }

    #[test]
    fn client_request_id_is_streaming_only() {
        let props = IngestionProperties {
            client_request_id: Some("id".to_string()),
            ..properties()
        };
        assert!(props
            .validate(IngestorKind::Streaming, SourceKind::File)
            .is_ok());
        assert!(props.validate(IngestorKind::Queued, SourceKind::File).is_err());
    }

    #[test]
    fn blob_is_illegal_for_streaming() {
        let err = properties()
            .validate(IngestorKind::Streaming, SourceKind::Blob)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClientArgs);
    }

    #[test]
    fn format_and_mapping_must_agree() {
        let props = IngestionProperties {
            data_format: Some(DataFormat::Csv),
            ingestion_mapping_kind: Some(IngestionMappingKind::Json),
            ingestion_mapping_reference: Some("mapping".to_string()),
            ..properties()
        };
        assert!(props.validate(IngestorKind::Queued, SourceKind::File).is_err());

        let agreeing = IngestionProperties {
            data_format: Some(DataFormat::Json),
            ingestion_mapping_kind: Some(IngestionMappingKind::Json),
            ingestion_mapping_reference: Some("mapping".to_string()),
            ..properties()
        };
        assert!(agreeing
            .validate(IngestorKind::Queued, SourceKind::File)
            .is_ok());
    }

    #[test]
    fn mapping_alone_implies_the_format() {
        let props = IngestionProperties {
            ingestion_mapping_kind: Some(IngestionMappingKind::Json),
            ingestion_mapping_reference: Some("mapping".to_string()),
            ..properties()
        };
        assert_eq!(props.resolve_format(None), DataFormat::Json);
        assert_eq!(
            props.resolve_format(Some(DataFormat::Csv)),
            DataFormat::Json
        );
    }

    #[test]
    fn resolve_format_falls_back_to_detection_then_csv() {
        assert_eq!(
            properties().resolve_format(Some(DataFormat::Parquet)),
            DataFormat::Parquet
        );
        assert_eq!(properties().resolve_format(None), DataFormat::Csv);
    }

    #[test]
    fn validation_is_idempotent() {
        let props = IngestionProperties {
            flush_immediately: Some(true),
            ..properties()
        };
        props
            .validate(IngestorKind::Queued, SourceKind::File)
            .unwrap();
        props
            .validate(IngestorKind::Queued, SourceKind::File)
            .unwrap();
    }
}
