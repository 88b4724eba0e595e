use async_trait::async_trait;
use docload_store_core::{Result, Session, SessionProvider, StoreError, TopologyKind};
use mongodb::{
    Client,
    bson::doc,
    options::ClientOptions,
};
use tracing::debug;

use crate::{
    convert::{from_driver, topology_from_hello},
    session::MongoSession,
};

const APP_NAME: &str = "docload";

/// Opens one client per session, so workers never share a connection pool.
pub struct MongoProvider {
    options: ClientOptions,
}

impl MongoProvider {
    /// Parse a connection string. No connection is made until a session is opened.
    pub async fn new(uri: &str) -> Result<Self> {
        let mut options =
            ClientOptions::parse(uri)
                .await
                .map_err(|err| StoreError::InvalidConfiguration {
                    message: err.to_string(),
                })?;

        if options.app_name.is_none() {
            options.app_name = Some(APP_NAME.to_string());
        }

        Ok(Self { options })
    }

    fn client(&self) -> Result<Client> {
        Client::with_options(self.options.clone()).map_err(from_driver)
    }
}

#[async_trait]
impl SessionProvider for MongoProvider {
    async fn connect(&self) -> Result<Box<dyn Session>> {
        let client = self.client()?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(from_driver)?;

        debug!(hosts = ?self.options.hosts, "opened session");

        Ok(Box::new(MongoSession::new(client)))
    }

    async fn topology(&self) -> Result<TopologyKind> {
        let hello = self
            .client()?
            .database("admin")
            .run_command(doc! { "hello": 1 }, None)
            .await
            .map_err(from_driver)?;

        Ok(topology_from_hello(&hello))
    }
}
