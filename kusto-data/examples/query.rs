use clap::Parser;
use kusto_data::prelude::*;
use std::error::Error;

/// Runs a query against a cluster and prints the rows as they arrive.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Kusto cluster endpoint
    #[clap(env, long)]
    endpoint: String,

    /// Name of the database
    #[clap(env, long)]
    database: String,

    /// Query to execute
    #[clap(env, long)]
    query: String,

    #[clap(env = "AZURE_CLIENT_ID", long)]
    application_id: String,

    #[clap(env = "AZURE_CLIENT_SECRET", long)]
    application_key: String,

    #[clap(env = "AZURE_TENANT_ID", long)]
    tenant_id: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let connection_string = ConnectionString::with_application_auth(
        &args.endpoint,
        &args.application_id,
        &args.application_key,
        &args.tenant_id,
    );
    let client = KustoClient::new(connection_string, KustoClientOptions::default())?;

    let mut rows = client.iter_query(args.database, args.query).await?;
    while let Some(row) = rows.next().await {
        let row = row?;
        println!(
            "{}",
            row.values
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    if let Some(completion) = rows.completion() {
        eprintln!(
            "query finished, has_errors={} cancelled={}",
            completion.has_errors, completion.cancelled
        );
    }

    Ok(())
}
