//! Parsing of resource URIs as returned by the management endpoint, and
//! construction of storage clients from them.

use azure_core::ClientOptions;
use azure_data_tables::{clients::TableServiceClientBuilder, prelude::TableClient};
use azure_storage::StorageCredentials;
use azure_storage_blobs::prelude::{ClientBuilder, ContainerClient};
use azure_storage_queues::{QueueClient, QueueServiceClientBuilder};
use url::Url;

use super::ResourceManagerError;

/// One storage resource (queue, container or table) with its SAS.
#[derive(Debug, Clone)]
pub struct ResourceUri {
    uri: String,
    service_uri: String,
    object_name: String,
    sas_token: StorageCredentials,
}

impl ResourceUri {
    pub fn uri(&self) -> &str {
        self.uri.as_str()
    }

    pub fn service_uri(&self) -> &str {
        self.service_uri.as_str()
    }

    pub fn object_name(&self) -> &str {
        self.object_name.as_str()
    }

    pub fn sas_token(&self) -> &StorageCredentials {
        &self.sas_token
    }

    /// The URI of an object inside this resource, keeping the SAS query.
    pub fn object_uri(&self, name: &str) -> String {
        match self.uri.split_once('?') {
            Some((base, query)) => {
                format!("{}/{}?{}", base.trim_end_matches('/'), name, query)
            }
            None => format!("{}/{}", self.uri.trim_end_matches('/'), name),
        }
    }
}

impl TryFrom<&str> for ResourceUri {
    type Error = ResourceManagerError;

    fn try_from(uri: &str) -> Result<Self, Self::Error> {
        let parsed_uri = Url::parse(uri)
            .map_err(|e| ResourceManagerError::InvalidUri(format!("{uri}: {e}")))?;

        let service_uri = match parsed_uri.host_str() {
            Some(host_str) => format!("{}://{}", parsed_uri.scheme(), host_str),
            None => {
                return Err(ResourceManagerError::InvalidUri(format!(
                    "{uri}: host is missing"
                )))
            }
        };
        let object_name = parsed_uri.path().trim_start_matches('/').to_string();
        let sas_token = match parsed_uri.query() {
            Some(query) => query.to_string(),
            None => {
                return Err(ResourceManagerError::InvalidUri(format!(
                    "{uri}: SAS token is missing as the query parameter"
                )))
            }
        };
        let sas_token = StorageCredentials::sas_token(sas_token)
            .map_err(|e| ResourceManagerError::InvalidUri(format!("{uri}: {e}")))?;

        Ok(Self {
            uri: uri.to_string(),
            service_uri,
            object_name,
            sas_token,
        })
    }
}

/// Construction of a typed storage client from a [ResourceUri].
pub trait ClientFromResourceUri {
    fn create_client(resource_uri: ResourceUri, client_options: ClientOptions) -> Self;
}

impl ClientFromResourceUri for QueueClient {
    fn create_client(resource_uri: ResourceUri, client_options: ClientOptions) -> Self {
        QueueServiceClientBuilder::with_location(azure_storage::CloudLocation::Custom {
            uri: resource_uri.service_uri().to_string(),
            credentials: resource_uri.sas_token().clone(),
        })
        .client_options(client_options)
        .build()
        .queue_client(resource_uri.object_name())
    }
}

impl ClientFromResourceUri for ContainerClient {
    fn create_client(resource_uri: ResourceUri, client_options: ClientOptions) -> Self {
        ClientBuilder::with_location(azure_storage::CloudLocation::Custom {
            uri: resource_uri.service_uri().to_string(),
            credentials: resource_uri.sas_token().clone(),
        })
        .client_options(client_options)
        .container_client(resource_uri.object_name())
    }
}

impl ClientFromResourceUri for TableClient {
    fn create_client(resource_uri: ResourceUri, client_options: ClientOptions) -> Self {
        TableServiceClientBuilder::with_location(azure_storage::CloudLocation::Custom {
            uri: resource_uri.service_uri().to_string(),
            credentials: resource_uri.sas_token().clone(),
        })
        .client_options(client_options)
        .build()
        .table_client(resource_uri.object_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_queue_uri() {
        let uri = "https://account.queue.core.windows.net/ready-queue?sv=2018-03-28&sig=abc";
        let parsed = ResourceUri::try_from(uri).unwrap();
        assert_eq!(
            parsed.service_uri(),
            "https://account.queue.core.windows.net"
        );
        assert_eq!(parsed.object_name(), "ready-queue");
    }

    #[test]
    fn rejects_uri_without_sas() {
        let uri = "https://account.queue.core.windows.net/ready-queue";
        assert!(matches!(
            ResourceUri::try_from(uri),
            Err(ResourceManagerError::InvalidUri(_))
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(ResourceUri::try_from("not a uri").is_err());
    }
}
