//! Data formats, compression and mapping kinds recognised by the service.

use serde::Serialize;
use std::path::Path;

/// The kind of an ingestion mapping; each format maps to exactly one kind.
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IngestionMappingKind {
    #[serde(rename = "Csv")]
    #[default]
    Csv,
    #[serde(rename = "Json")]
    Json,
    Avro,
    ApacheAvro,
    Parquet,
    SStream,
    #[serde(rename = "Orc")]
    Orc,
    #[serde(rename = "W3CLogFile")]
    W3CLogFile,
    Unknown,
}

/// All data formats supported by Kusto.
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DataFormat {
    #[serde(rename = "apacheavro")]
    ApacheAvro,
    #[serde(rename = "avro")]
    Avro,
    #[serde(rename = "csv")]
    #[default]
    Csv,
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "multijson")]
    MultiJson,
    #[serde(rename = "orc")]
    Orc,
    #[serde(rename = "parquet")]
    Parquet,
    #[serde(rename = "psv")]
    Psv,
    #[serde(rename = "raw")]
    Raw,
    #[serde(rename = "scsv")]
    Scsv,
    #[serde(rename = "sohsv")]
    SOHsv,
    #[serde(rename = "singlejson")]
    SingleJson,
    #[serde(rename = "sstream")]
    SStream,
    #[serde(rename = "tsv")]
    Tsv,
    #[serde(rename = "tsve")]
    Tsve,
    #[serde(rename = "txt")]
    Txt,
    #[serde(rename = "w3clogfile")]
    W3CLogFile,
}

impl DataFormat {
    /// The mapping kind that goes with this format.
    pub fn ingestion_mapping_kind(self) -> IngestionMappingKind {
        match self {
            DataFormat::Csv
            | DataFormat::Tsv
            | DataFormat::Scsv
            | DataFormat::SOHsv
            | DataFormat::Psv
            | DataFormat::Txt
            | DataFormat::Tsve
            | DataFormat::Raw => IngestionMappingKind::Csv,
            DataFormat::Json | DataFormat::SingleJson | DataFormat::MultiJson => {
                IngestionMappingKind::Json
            }
            DataFormat::Avro => IngestionMappingKind::Avro,
            DataFormat::ApacheAvro => IngestionMappingKind::ApacheAvro,
            DataFormat::Parquet => IngestionMappingKind::Parquet,
            DataFormat::SStream => IngestionMappingKind::SStream,
            DataFormat::Orc => IngestionMappingKind::Orc,
            DataFormat::W3CLogFile => IngestionMappingKind::W3CLogFile,
        }
    }

    /// The format implied by a mapping kind, for submissions that only name
    /// a mapping.
    pub fn from_mapping_kind(kind: IngestionMappingKind) -> Option<Self> {
        match kind {
            IngestionMappingKind::Csv => Some(DataFormat::Csv),
            IngestionMappingKind::Json => Some(DataFormat::Json),
            IngestionMappingKind::Avro => Some(DataFormat::Avro),
            IngestionMappingKind::ApacheAvro => Some(DataFormat::ApacheAvro),
            IngestionMappingKind::Parquet => Some(DataFormat::Parquet),
            IngestionMappingKind::SStream => Some(DataFormat::SStream),
            IngestionMappingKind::Orc => Some(DataFormat::Orc),
            IngestionMappingKind::W3CLogFile => Some(DataFormat::W3CLogFile),
            IngestionMappingKind::Unknown => None,
        }
    }

    /// Binary formats should not be compressed.
    pub fn compressible(self) -> bool {
        !matches!(
            self,
            DataFormat::Parquet | DataFormat::SStream | DataFormat::Orc
        )
    }

    /// The wire name, as used in the `streamFormat` query parameter and the
    /// queue message.
    pub fn wire_name(self) -> &'static str {
        match self {
            DataFormat::ApacheAvro => "apacheavro",
            DataFormat::Avro => "avro",
            DataFormat::Csv => "csv",
            DataFormat::Json => "json",
            DataFormat::MultiJson => "multijson",
            DataFormat::Orc => "orc",
            DataFormat::Parquet => "parquet",
            DataFormat::Psv => "psv",
            DataFormat::Raw => "raw",
            DataFormat::Scsv => "scsv",
            DataFormat::SOHsv => "sohsv",
            DataFormat::SingleJson => "singlejson",
            DataFormat::SStream => "sstream",
            DataFormat::Tsv => "tsv",
            DataFormat::Tsve => "tsve",
            DataFormat::Txt => "txt",
            DataFormat::W3CLogFile => "w3clogfile",
        }
    }

    fn from_extension(extension: &str) -> Option<Self> {
        Some(match extension.to_ascii_lowercase().as_str() {
            "avro" => DataFormat::Avro,
            "csv" => DataFormat::Csv,
            "json" => DataFormat::Json,
            "multijson" => DataFormat::MultiJson,
            "orc" => DataFormat::Orc,
            "parquet" => DataFormat::Parquet,
            "psv" => DataFormat::Psv,
            "raw" => DataFormat::Raw,
            "scsv" => DataFormat::Scsv,
            "sohsv" => DataFormat::SOHsv,
            "singlejson" => DataFormat::SingleJson,
            "ss" => DataFormat::SStream,
            "tsv" => DataFormat::Tsv,
            "tsve" => DataFormat::Tsve,
            "txt" => DataFormat::Txt,
            "log" => DataFormat::W3CLogFile,
            _ => return None,
        })
    }

    /// Detects the format and compression of a source path.
    ///
    /// Compression suffixes (`.gz`, `.zip`) are stripped before looking at
    /// the format extension; an unrecognised or absent extension defaults
    /// to CSV.
    pub fn detect(path: &Path) -> (Self, CompressionType) {
        let (path, compression) = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("gz") => {
                (path.with_extension(""), CompressionType::GZip)
            }
            Some(ext) if ext.eq_ignore_ascii_case("zip") => {
                (path.with_extension(""), CompressionType::Zip)
            }
            _ => (path.to_path_buf(), CompressionType::None),
        };
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .unwrap_or_default();
        (format, compression)
    }
}

/// Gzip-wraps an uncompressed textual payload before upload; payloads that
/// are already compressed or in a binary format pass through unchanged.
pub(crate) fn prepare_payload(
    data: Vec<u8>,
    format: DataFormat,
    compression: CompressionType,
) -> std::io::Result<(Vec<u8>, CompressionType)> {
    if compression.is_compressed() || !format.compressible() {
        return Ok((data, compression));
    }
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(&data)?;
    Ok((encoder.finish()?, CompressionType::GZip))
}

/// Compression applied to an ingestion payload.
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompressionType {
    /// Uncompressed.
    #[default]
    None,
    /// Gzip compressed.
    GZip,
    /// Zip archive.
    Zip,
}

impl CompressionType {
    /// Whether the payload is already compressed.
    pub fn is_compressed(self) -> bool {
        !matches!(self, CompressionType::None)
    }
}
