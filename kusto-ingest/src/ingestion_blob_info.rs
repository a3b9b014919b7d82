//! The message posted to an ingestion queue, describing one uploaded blob.

use serde::Serialize;
use time::OffsetDateTime;

use crate::data_format::DataFormat;
use crate::descriptors::BlobDescriptor;
use crate::ingestion_properties::{IngestionProperties, ReportLevel, ReportMethod};
use crate::resource_manager::authorization_context::KustoIdentityToken;

// Basing the ingestion message on
// https://learn.microsoft.com/en-us/azure/data-explorer/kusto/api/netfx/kusto-ingest-client-rest#ingestion-message-internal-structure
#[derive(Serialize, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct QueuedIngestionMessage {
    /// Message identifier for this upload; doubles as the submission's
    /// source id.
    id: uuid::Uuid,
    /// Path (URI) to the blob, including the SAS key or other credentials
    /// granting permissions to read/write/delete it. Permissions are
    /// required so that the ingestion service can delete the blob once it
    /// has completed ingesting the data.
    blob_path: String,
    /// Name of the Kusto database the data will ingest into.
    database_name: String,
    /// Name of the Kusto table the data will ingest into.
    table_name: String,
    /// Size of the uncompressed data in bytes. Providing it allows the
    /// service to aggregate multiple blobs without reading them first.
    #[serde(skip_serializing_if = "Option::is_none")]
    raw_data_size: Option<u64>,
    /// If set to `true`, the blob won't be deleted once ingestion is
    /// successfully completed. Default is `false`.
    #[serde(skip_serializing_if = "Option::is_none")]
    retain_blob_on_success: Option<bool>,
    /// If set to `true`, any aggregation will be skipped. Default is `false`.
    #[serde(skip_serializing_if = "Option::is_none")]
    flush_immediately: Option<bool>,
    /// Ignores the size limit for data ingestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    ignore_size_limit: Option<bool>,
    /// Defines which, if any, ingestion states are reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    report_level: Option<ReportLevel>,
    /// Defines which mechanisms are used to report the ingestion status.
    #[serde(skip_serializing_if = "Option::is_none")]
    report_method: Option<ReportMethod>,
    #[serde(with = "time::serde::rfc3339")]
    source_message_creation_time: OffsetDateTime,
    additional_properties: AdditionalProperties,
}

impl QueuedIngestionMessage {
    pub(crate) fn new(
        blob_descriptor: &BlobDescriptor,
        ingestion_properties: &IngestionProperties,
        format: DataFormat,
        authorization_context: KustoIdentityToken,
    ) -> Self {
        let additional_properties = AdditionalProperties {
            authorization_context,
            data_format: format,
            ingestion_mapping: ingestion_properties.ingestion_mapping.clone(),
            ingestion_mapping_reference: ingestion_properties.ingestion_mapping_reference.clone(),
            creation_time: ingestion_properties.creation_time,
            ignore_first_record: ingestion_properties.ignore_first_record,
        };

        Self {
            id: blob_descriptor.source_id(),
            blob_path: blob_descriptor.uri(),
            raw_data_size: blob_descriptor.size,
            database_name: ingestion_properties.database_name.clone(),
            table_name: ingestion_properties.table_name.clone(),
            retain_blob_on_success: ingestion_properties.retain_blob_on_success,
            flush_immediately: ingestion_properties.flush_immediately,
            report_level: ingestion_properties.report_level,
            report_method: ingestion_properties.report_method,
            ignore_size_limit: Some(false),
            source_message_creation_time: OffsetDateTime::now_utc(),
            additional_properties,
        }
    }
}

// The additional properties block is modelled on
// https://learn.microsoft.com/en-us/azure/data-explorer/ingestion-properties
#[derive(Serialize, Clone, Debug)]
struct AdditionalProperties {
    #[serde(rename = "authorizationContext")]
    authorization_context: KustoIdentityToken,
    #[serde(rename = "format")]
    data_format: DataFormat,
    #[serde(rename = "ingestionMapping", skip_serializing_if = "Option::is_none")]
    ingestion_mapping: Option<String>,
    #[serde(
        rename = "ingestionMappingReference",
        skip_serializing_if = "Option::is_none"
    )]
    ingestion_mapping_reference: Option<String>,
    #[serde(
        rename = "creationTime",
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    creation_time: Option<OffsetDateTime>,
    #[serde(rename = "ignoreFirstRecord", skip_serializing_if = "Option::is_none")]
    ignore_first_record: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn message_wire_shape() {
        let blob = BlobDescriptor::new(
            Url::parse("https://account.blob.core.windows.net/c/payload.csv.gz").unwrap(),
            Some(123),
            None,
        );
        let properties = IngestionProperties {
            database_name: "db".to_string(),
            table_name: "events".to_string(),
            flush_immediately: Some(true),
            report_level: Some(ReportLevel::FailuresAndSuccesses),
            report_method: Some(ReportMethod::Table),
            ingestion_mapping_reference: Some("mapping".to_string()),
            ..Default::default()
        };
        let message = QueuedIngestionMessage::new(
            &blob,
            &properties,
            DataFormat::Csv,
            "identity-token".to_string(),
        );
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["DatabaseName"], "db");
        assert_eq!(json["TableName"], "events");
        assert_eq!(json["RawDataSize"], 123);
        assert_eq!(json["FlushImmediately"], true);
        assert_eq!(json["ReportLevel"], 2);
        assert_eq!(json["ReportMethod"], 1);
        assert_eq!(json["IgnoreSizeLimit"], false);
        assert_eq!(json["AdditionalProperties"]["format"], "csv");
        assert_eq!(
            json["AdditionalProperties"]["ingestionMappingReference"],
            "mapping"
        );
        assert_eq!(
            json["AdditionalProperties"]["authorizationContext"],
            "identity-token"
        );
        assert!(json["AdditionalProperties"]
            .get("ingestionMapping")
            .is_none());
    }
}
