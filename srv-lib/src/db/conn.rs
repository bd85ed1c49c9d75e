use async_trait::async_trait;
use diesel::ConnectionError;
use diesel::ConnectionResult;
use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::pooled_connection::ManagerConfig;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use log::{error, info};
use rustls::ClientConfig;
use rustls::RootCertStore;
use rustls::pki_types::CertificateDer;
use rustls::pki_types::pem::PemObject;
use std::env::var;
use std::fs::read;
use tokio::time::Duration;

use crate::backend::SecretBackend;
use crate::db::models::Secret;
use crate::errors::BackendError;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Postgres backend. Cheap to clone, all clones share one pool.
#[derive(Clone)]
pub struct Handler {
    conn: Pool<AsyncPgConnection>,
}

/// Builds the pool and starts the periodic removal of expired rows.
///
/// `timeout` bounds how long a request waits for a pooled connection.
pub async fn get_connection(url: &str, timeout: Duration) -> Result<Handler, BackendError> {
    // Fails only when a provider was already installed, which is fine.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let mut config = ManagerConfig::default();
    config.custom_setup = Box::new(establish_connection);
    let mgr = AsyncDieselConnectionManager::<AsyncPgConnection>::new_with_config(url, config);

    let conn = Pool::builder()
        .max_size(10)
        .min_idle(Some(5))
        .connection_timeout(timeout)
        .max_lifetime(Some(Duration::from_secs(60 * 60 * 24)))
        .idle_timeout(Some(Duration::from_secs(60 * 2)))
        .build(mgr)
        .await
        .map_err(|e| BackendError(e.to_string()))?;

    let handler = Handler { conn };

    let handler_clone = handler.clone();

    tokio::spawn(async move {
        handler_clone.initiate_expired_cleanup().await;
    });

    Ok(handler)
}

fn establish_connection(config: &str) -> BoxFuture<'_, ConnectionResult<AsyncPgConnection>> {
    let fut = async {
        let mut root_store = RootCertStore::empty();

        // Specifically for working with self signed certs.
        if let Ok(cert_location) = var("CERT_LOCATION") {
            let file_bytes =
                read(cert_location).map_err(|e| ConnectionError::BadConnection(e.to_string()))?;
            let cert = CertificateDer::from_pem_slice(&file_bytes)
                .map_err(|e| ConnectionError::BadConnection(e.to_string()))?;
            root_store
                .add(cert)
                .map_err(|e| ConnectionError::BadConnection(e.to_string()))?;
        }

        let rustls_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let tls = tokio_postgres_rustls::MakeRustlsConnect::new(rustls_config);
        let (client, conn) = tokio_postgres::connect(config, tls)
            .await
            .map_err(|e| ConnectionError::BadConnection(e.to_string()))?;

        AsyncPgConnection::try_from_client_and_connection(client, conn).await
    };
    fut.boxed()
}

impl Handler {
    async fn get(&self) -> Result<PooledConnection<'_, AsyncPgConnection>, BackendError> {
        self.conn
            .get()
            .await
            .map_err(|e| BackendError(e.to_string()))
    }

    pub async fn clear_expired(&self) -> Result<usize, BackendError> {
        let mut conn = self.get().await?;

        Secret::clear_expired(&mut conn)
            .await
            .map_err(|e| BackendError(e.to_string()))
    }

    async fn initiate_expired_cleanup(&self) {
        loop {
            tokio::time::sleep(CLEANUP_INTERVAL).await;
            match self.clear_expired().await {
                Ok(0) => {}
                Ok(removed) => info!("Removed {removed} expired secrets"),
                Err(e) => error!("Failed to clear expired secrets: {e}"),
            }
        }
    }
}

#[async_trait]
impl SecretBackend for Handler {
    async fn set_with_expiry(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, BackendError> {
        let mut conn = self.get().await?;

        Secret::new(key, value, ttl)
            .insert(&mut conn)
            .await
            .map_err(|e| BackendError(e.to_string()))
    }

    async fn get_and_delete(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let mut conn = self.get().await?;

        Secret::take(key, &mut conn)
            .await
            .map_err(|e| BackendError(e.to_string()))
            .map(|opt| opt.map(Secret::into_payload))
    }

    async fn ping(&self) -> Result<(), BackendError> {
        let mut conn = self.get().await?;

        Secret::ping(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| BackendError(e.to_string()))
    }
}
