use super::backoff::Backoff;
use super::feed_message::{ControlMessage, parse_trades};
use super::subscriptions::{SubscribedSet, run_subscription_manager};
use super::trade_writer::TradeWriter;
use crate::db::redis::repository::quote_cache_repository::TraitQuoteCacheRepository;
use crate::env_config::models::app_config::StreamerConfig;
use crate::error::PipelineResult;
use futures::stream::{SplitSink, SplitStream};
use futures::{Sink, SinkExt, StreamExt};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

type FeedStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribing,
    Streaming,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Subscribing => "subscribing",
            ConnectionState::Streaming => "streaming",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct StreamerOptions {
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    /// Silence longer than this triggers a ping
    pub read_timeout: Duration,
    pub subscription_poll: Duration,
    pub max_concurrent_writes: usize,
}

impl From<&StreamerConfig> for StreamerOptions {
    fn from(config: &StreamerConfig) -> Self {
        Self {
            reconnect_base: Duration::from_secs(config.reconnect_base_seconds),
            reconnect_max: Duration::from_secs(config.reconnect_max_seconds),
            read_timeout: Duration::from_secs(config.read_timeout_seconds),
            subscription_poll: Duration::from_secs(config.subscription_poll_seconds),
            max_concurrent_writes: config.max_concurrent_writes,
        }
    }
}

enum Flow {
    Continue,
    Closed,
}

/// Long-lived feed session that writes every trade into the quote cache.
///
/// Each connection starts from an empty subscription set, subscribes to every
/// symbol in the cache, then hands subscription upkeep to a background task
/// while the session reads frames.
pub struct StreamingClient {
    url: String,
    quote_cache: Arc<dyn TraitQuoteCacheRepository + Send + Sync>,
    writer: TradeWriter,
    options: StreamerOptions,
    state: watch::Sender<ConnectionState>,
}

impl StreamingClient {
    pub fn new(
        url: String,
        quote_cache: Arc<dyn TraitQuoteCacheRepository + Send + Sync>,
        options: StreamerOptions,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            url,
            writer: TradeWriter::new(quote_cache.clone(), options.max_concurrent_writes),
            quote_cache,
            options,
            state,
        }
    }

    #[cfg(test)]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Connects, streams, and reconnects with backoff. Never returns.
    pub async fn run(&self) {
        let mut backoff = Backoff::new(self.options.reconnect_base, self.options.reconnect_max);
        let endpoint = redact_url(&self.url);

        loop {
            self.transition(ConnectionState::Connecting);

            match connect_async(self.url.as_str()).await {
                Ok((stream, _)) => {
                    info!("[WS] Connected to {}", endpoint);
                    backoff.reset();

                    match self.run_session(stream).await {
                        Ok(()) => warn!("[WS] Connection closed by server"),
                        Err(e) => error!("[WS] Connection error: {}", e),
                    }
                }
                Err(e) => error!("[WS] Failed to connect to {}: {}", endpoint, e),
            }

            self.transition(ConnectionState::Disconnected);
            let delay = backoff.next_delay();
            info!("[WS] Reconnecting in {}s", delay.as_secs_f64());
            time::sleep(delay).await;
        }
    }

    async fn run_session(&self, stream: FeedStream) -> PipelineResult<()> {
        let (mut write, mut read) = stream.split();

        self.transition(ConnectionState::Subscribing);
        let subscribed: SubscribedSet = Arc::new(Mutex::new(HashSet::new()));
        let initial = self.quote_cache.get_symbols().await?;
        {
            let mut tracked = subscribed.lock().await;
            let mut symbols: Vec<String> = initial.into_iter().collect();
            symbols.sort();
            for symbol in symbols {
                send_control(&mut write, &ControlMessage::Subscribe { symbol: symbol.clone() })
                    .await?;
                info!("[WS] Subscribed: {}", symbol);
                tracked.insert(symbol);
            }
        }

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        let manager = tokio::spawn(run_subscription_manager(
            self.quote_cache.clone(),
            subscribed,
            outbound_tx,
            self.options.subscription_poll,
        ));

        self.transition(ConnectionState::Streaming);
        let result = self.stream_frames(&mut write, &mut read, &mut outbound_rx).await;

        manager.abort();
        result
    }

    async fn stream_frames(
        &self,
        write: &mut SplitSink<FeedStream, Message>,
        read: &mut SplitStream<FeedStream>,
        outbound_rx: &mut mpsc::UnboundedReceiver<ControlMessage>,
    ) -> PipelineResult<()> {
        loop {
            tokio::select! {
                Some(control) = outbound_rx.recv() => {
                    send_control(write, &control).await?;
                }
                frame = time::timeout(self.options.read_timeout, read.next()) => match frame {
                    Err(_) => {
                        debug!("[WS] No data for {:?}, sending ping", self.options.read_timeout);
                        write.send(Message::Ping(Vec::new())).await?;
                    }
                    Ok(None) => return Ok(()),
                    Ok(Some(Err(e))) => return Err(e.into()),
                    Ok(Some(Ok(message))) => {
                        if let Flow::Closed = self.handle_message(message, write).await? {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    async fn handle_message<S>(&self, message: Message, write: &mut S) -> PipelineResult<Flow>
    where
        S: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        match message {
            Message::Text(text) => self.handle_payload(&text).await,
            Message::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => self.handle_payload(&text).await,
                Err(e) => warn!("[WS] Dropping non UTF-8 frame: {}", e),
            },
            Message::Ping(payload) => write.send(Message::Pong(payload)).await?,
            Message::Pong(_) => debug!("[WS] Pong received"),
            Message::Close(frame) => {
                info!("[WS] Close frame received: {:?}", frame);
                return Ok(Flow::Closed);
            }
            Message::Frame(_) => {}
        }
        Ok(Flow::Continue)
    }

    async fn handle_payload(&self, text: &str) {
        match parse_trades(text) {
            Ok(ticks) if ticks.is_empty() => {}
            Ok(ticks) => {
                self.writer.write_all(ticks).await;
            }
            Err(e) => warn!("[WS] Malformed message: {}", e),
        }
    }

    fn transition(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("[WS] State {} -> {}", previous, next);
        }
    }
}

async fn send_control<S>(sink: &mut S, message: &ControlMessage) -> PipelineResult<()>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(message)?;
    sink.send(Message::Text(text)).await?;
    Ok(())
}

/// Strips the query string, which carries the API token.
fn redact_url(url: &str) -> &str {
    url.split_once('?').map_or(url, |(endpoint, _)| endpoint)
}
