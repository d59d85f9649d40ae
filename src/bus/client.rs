//! NATS bus client wrapper, adapted from `nats::client::NatsClient`.

use async_nats::{Client, ConnectOptions, HeaderMap, HeaderValue};
use bytes::Bytes;
use std::time::Duration;
use tracing::info;

use crate::config::NatsArgs;
use crate::types::{GridkeepError, Result};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct BusClient {
    client: Client,
    request_timeout: Duration,
    name: String,
}

impl BusClient {
    pub async fn new(args: &NatsArgs, name: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", args.nats_url);

        let mut options = ConnectOptions::new()
            .name(name)
            .ping_interval(DEFAULT_PING_INTERVAL)
            .connection_timeout(Duration::from_secs(5));

        if let (Some(user), Some(pass)) = (&args.nats_user, &args.nats_password) {
            options = options.user_and_password(user.clone(), pass.clone());
        }

        let client = options
            .connect(&args.nats_url)
            .await
            .map_err(|e| GridkeepError::Bus(format!("failed to connect: {e}")))?;

        info!("Connected to NATS at {}", args.nats_url);

        Ok(Self {
            client,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            name: name.to_string(),
        })
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        self.client
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| GridkeepError::Bus(format!("publish failed: {e}")))
    }

    pub async fn publish_json<T: serde::Serialize>(&self, subject: &str, value: &T) -> Result<()> {
        let payload = Bytes::from(serde_json::to_vec(value)?);
        self.publish(subject, payload).await
    }

    pub async fn subscribe(&self, subject: &str) -> Result<async_nats::Subscriber> {
        self.client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| GridkeepError::Bus(format!("subscribe failed: {e}")))
    }

    pub async fn flush(&self) -> Result<()> {
        self.client
            .flush()
            .await
            .map_err(|e| GridkeepError::Bus(format!("flush failed: {e}")))
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

pub fn headers_with_reply(reply_subject: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(reply_subject) {
        headers.insert("Nats-Reply-To", value);
    }
    headers
}
