//! Home Assistant websocket and REST client

use async_trait::async_trait;
use futures_util::stream::{self, Stream};
use futures_util::{SinkExt, StreamExt};
use reqwest::{header, Client};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, trace};

use super::{EventStream, HomeAssistantApi};
use crate::error::{SourceError, SourceResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const SUBSCRIPTION_ID: u64 = 1;

/// Client for a live Home Assistant instance
pub struct HomeAssistantClient {
    http: Client,
    base_url: String,
    token: String,
}

impl HomeAssistantClient {
    pub fn new(base_url: &str, token: &str) -> SourceResult<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    pub fn websocket_url(&self) -> String {
        let base = self
            .base_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!("{}/api/websocket", base)
    }

    async fn get(&self, path: &str) -> SourceResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        Ok(self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .send()
            .await?)
    }
}

/// Next JSON text frame, skipping pings and binary frames
async fn recv_json<S>(read: &mut S) -> SourceResult<Value>
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let next = timeout(HANDSHAKE_TIMEOUT, read.next())
            .await
            .map_err(|_| SourceError::Connection("timed out waiting for message".to_string()))?;

        match next {
            Some(Ok(Message::Text(text))) => return Ok(serde_json::from_str(&text)?),
            Some(Ok(Message::Close(_))) | None => {
                return Err(SourceError::Connection("connection closed".to_string()))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

fn message_type(message: &Value) -> &str {
    message.get("type").and_then(Value::as_str).unwrap_or("")
}

/// `event.data` of a subscribed event message
pub(crate) fn state_change_data(mut message: Value) -> Option<Value> {
    if message_type(&message) != "event" {
        return None;
    }
    let data = message.get_mut("event")?.get_mut("data")?;
    Some(data.take())
}

#[async_trait]
impl HomeAssistantApi for HomeAssistantClient {
    async fn subscribe_state_changes(&self) -> SourceResult<EventStream> {
        let url = self.websocket_url();
        debug!("Connecting to {}", url);
        let (ws_stream, _) = timeout(HANDSHAKE_TIMEOUT, connect_async(url.as_str()))
            .await
            .map_err(|_| SourceError::Connection(format!("timed out connecting to {url}")))??;
        let (mut write, mut read) = ws_stream.split();

        let greeting = recv_json(&mut read).await?;
        if message_type(&greeting) != "auth_required" {
            return Err(SourceError::Protocol(format!(
                "expected auth_required, got {greeting}"
            )));
        }

        let auth = json!({"type": "auth", "access_token": self.token});
        write.send(Message::Text(auth.to_string())).await?;

        let reply = recv_json(&mut read).await?;
        match message_type(&reply) {
            "auth_ok" => {}
            "auth_invalid" => {
                let reason = reply
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("invalid access token");
                return Err(SourceError::Auth(reason.to_string()));
            }
            _ => {
                return Err(SourceError::Protocol(format!(
                    "expected auth_ok, got {reply}"
                )))
            }
        }

        let subscribe = json!({
            "id": SUBSCRIPTION_ID,
            "type": "subscribe_events",
            "event_type": "state_changed",
        });
        write.send(Message::Text(subscribe.to_string())).await?;

        let ack = recv_json(&mut read).await?;
        if message_type(&ack) != "result" || ack.get("success") != Some(&Value::Bool(true)) {
            return Err(SourceError::Protocol(format!(
                "state_changed subscription rejected: {ack}"
            )));
        }

        // The write half stays in the stream state so the socket is not closed
        let events = stream::unfold((write, read), |(write, mut read)| async move {
            loop {
                match read.next().await? {
                    Ok(Message::Text(text)) => {
                        let message: Value = match serde_json::from_str(&text) {
                            Ok(message) => message,
                            Err(e) => return Some((Err(SourceError::from(e)), (write, read))),
                        };
                        match state_change_data(message) {
                            Some(data) => return Some((Ok(data), (write, read))),
                            None => trace!("Ignoring non-event message"),
                        }
                    }
                    Ok(Message::Close(_)) => return None,
                    Ok(_) => continue,
                    Err(e) => return Some((Err(SourceError::from(e)), (write, read))),
                }
            }
        });

        Ok(Box::pin(events))
    }

    async fn test_connection(&self) -> bool {
        match self.get("/api/").await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Home Assistant ping failed");
                false
            }
        }
    }

    async fn entity_ids(&self) -> SourceResult<Vec<String>> {
        let states: Vec<Value> = self
            .get("/api/states")
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(states
            .iter()
            .filter_map(|state| state.get("entity_id").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }
}
