use crate::db::postgres::connection::PostgresConnection;
use async_trait::async_trait;
use sqlx::Error as SqlxError;
use sqlx::postgres::PgListener;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[async_trait]
pub trait TraitInstrumentChangeListener {
    /// Opens a fresh LISTEN session, dropping any previous one
    async fn listen(&mut self) -> Result<(), SqlxError>;

    /// Next notification payload; `None` once the session is lost.
    ///
    /// Notifications sent while no session is open are never delivered, so
    /// callers have to `listen` again and resync after a `None`.
    async fn next_change(&mut self) -> Result<Option<String>, SqlxError>;
}

/// LISTEN subscription on the channel fired by the `instruments` trigger.
pub struct StructInstrumentChangeListener {
    connection: Arc<PostgresConnection>,
    channel: String,
    listener: Option<PgListener>,
}

impl StructInstrumentChangeListener {
    pub fn new(connection: Arc<PostgresConnection>, channel: String) -> Self {
        Self {
            connection,
            channel,
            listener: None,
        }
    }
}

#[async_trait]
impl TraitInstrumentChangeListener for StructInstrumentChangeListener {
    async fn listen(&mut self) -> Result<(), SqlxError> {
        self.listener = None;

        let mut listener = PgListener::connect_with(self.connection.get_pool()).await?;
        listener.listen(&self.channel).await?;
        self.listener = Some(listener);

        info!("Listening to '{}' notifications from PostgreSQL", self.channel);
        Ok(())
    }

    async fn next_change(&mut self) -> Result<Option<String>, SqlxError> {
        let Some(listener) = self.listener.as_mut() else {
            return Ok(None);
        };

        // Yields `None` when the connection drops.
        match listener.try_recv().await? {
            Some(notification) => {
                debug!(
                    "Notification on '{}': {}",
                    self.channel,
                    notification.payload()
                );
                Ok(Some(notification.payload().to_string()))
            }
            None => {
                warn!("Lost LISTEN connection on '{}'", self.channel);
                self.listener = None;
                Ok(None)
            }
        }
    }
}
