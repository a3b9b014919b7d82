use clap::Parser;
use kusto_data::prelude::*;
use kusto_ingest::{
    DataFormat, FileDescriptor, IngestionProperties, QueuedIngestClient, ReportLevel, ReportMethod,
};
use std::error::Error;

/// Ingests a local file through the queued path and waits for the outcome.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Ingestion endpoint of the cluster (https://ingest-<cluster>...)
    #[clap(env, long)]
    ingestion_endpoint: String,

    /// Name of the database
    #[clap(env, long)]
    database: String,

    /// Name of the table
    #[clap(env, long)]
    table: String,

    /// Path of the file to ingest
    #[clap(env, long)]
    path: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let client = KustoClient::new(
        ConnectionString::with_default_auth(&args.ingestion_endpoint),
        KustoClientOptions::default(),
    )?;
    let ingest_client = QueuedIngestClient::new(client);

    let properties = IngestionProperties {
        database_name: args.database,
        table_name: args.table,
        data_format: Some(DataFormat::Csv),
        report_level: Some(ReportLevel::FailuresAndSuccesses),
        report_method: Some(ReportMethod::Table),
        ..Default::default()
    };

    let result = ingest_client
        .ingest_from_file(FileDescriptor::new(&args.path), properties)
        .await;

    println!("submitted as {}", result.source_id());
    let record = result.wait().await?;
    println!("ingestion finished: {:?}", record.status);

    Ok(())
}
