//! Service Bus REST transport with shared access signature auth.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use sha2::Sha256;
use tracing::info;

use super::ServiceBusMessage;
use crate::config::ServiceBusConfig;
use crate::messaging::service::BrokerTransport;
use crate::messaging::TransportError;

type HmacSha256 = Hmac<Sha256>;

const BATCH_CONTENT_TYPE: &str = "application/vnd.microsoft.servicebus.json";
const BROKER_PROPERTIES_HEADER: &str = "BrokerProperties";

/// Build a `SharedAccessSignature` authorization value for `resource_uri`
/// that expires at `expiry` (unix seconds).
pub fn sas_token(
    resource_uri: &str,
    key_name: &str,
    key: &str,
    expiry: i64,
) -> Result<String, TransportError> {
    let encoded_uri = urlencoding::encode(resource_uri);
    let string_to_sign = format!("{encoded_uri}\n{expiry}");

    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| TransportError::connection(format!("invalid shared access key: {e}")))?;
    mac.update(string_to_sign.as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    Ok(format!(
        "SharedAccessSignature sr={encoded_uri}&sig={}&se={expiry}&skn={key_name}",
        urlencoding::encode(&signature)
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct BrokerProperties<'a> {
    message_id: &'a str,
    label: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

impl<'a> From<&'a ServiceBusMessage> for BrokerProperties<'a> {
    fn from(message: &'a ServiceBusMessage) -> Self {
        Self {
            message_id: &message.message_id,
            label: &message.subject,
            session_id: message.session_id.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct BatchEntry<'a> {
    body: String,
    broker_properties: BrokerProperties<'a>,
    user_properties: &'a BTreeMap<String, String>,
}

pub struct ServiceBusRestTransport {
    client: reqwest::Client,
    resource_uri: String,
    key_name: String,
    key: String,
    token_ttl: Duration,
}

impl std::fmt::Debug for ServiceBusRestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceBusRestTransport")
            .field("resource_uri", &self.resource_uri)
            .field("key_name", &self.key_name)
            .finish_non_exhaustive()
    }
}

impl ServiceBusRestTransport {
    pub fn new(config: &ServiceBusConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TransportError::connection(format!("HTTP client creation failed: {e}")))?;

        info!(
            endpoint = %config.endpoint,
            topic = %config.topic,
            sessions = config.use_sessions,
            "Service Bus transport created"
        );

        Ok(Self {
            client,
            resource_uri: config.topic_url(),
            key_name: config.shared_access_key_name.clone(),
            key: config.shared_access_key.clone(),
            token_ttl: Duration::from_secs(u64::from(config.token_ttl_seconds)),
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/messages", self.resource_uri)
    }

    fn authorization(&self) -> Result<String, TransportError> {
        let ttl = i64::try_from(self.token_ttl.as_secs()).unwrap_or(i64::MAX);
        let expiry = Utc::now().timestamp().saturating_add(ttl);
        sas_token(&self.resource_uri, &self.key_name, &self.key, expiry)
    }

    async fn post(&self, request: reqwest::RequestBuilder) -> Result<(), TransportError> {
        let response = request
            .header(AUTHORIZATION, self.authorization()?)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::rejected(format!(
            "HTTP {}: {}",
            status.as_u16(),
            body.trim()
        )))
    }
}

fn classify(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::timeout(error.to_string())
    } else if error.is_connect() {
        TransportError::connection(error.to_string())
    } else {
        TransportError::rejected(error.to_string())
    }
}

/// Custom properties travel as headers holding JSON string values
fn quoted(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

#[async_trait]
impl BrokerTransport for ServiceBusRestTransport {
    type Message = ServiceBusMessage;

    async fn send(&self, message: ServiceBusMessage) -> Result<(), TransportError> {
        let broker_properties = serde_json::to_string(&BrokerProperties::from(&message))
            .map_err(|e| TransportError::rejected(e.to_string()))?;

        let mut request = self
            .client
            .post(self.messages_url())
            .header(CONTENT_TYPE, message.content_type.as_str())
            .header(BROKER_PROPERTIES_HEADER, broker_properties);
        for (name, value) in &message.application_properties {
            request = request.header(name.as_str(), quoted(value));
        }

        self.post(request.body(message.body)).await
    }

    async fn send_batch(&self, messages: Vec<ServiceBusMessage>) -> Result<(), TransportError> {
        let entries: Vec<BatchEntry<'_>> = messages
            .iter()
            .map(|message| BatchEntry {
                body: String::from_utf8_lossy(&message.body).into_owned(),
                broker_properties: BrokerProperties::from(message),
                user_properties: &message.application_properties,
            })
            .collect();
        let body = serde_json::to_vec(&entries).map_err(|e| TransportError::rejected(e.to_string()))?;

        let request = self
            .client
            .post(self.messages_url())
            .header(CONTENT_TYPE, BATCH_CONTENT_TYPE)
            .body(body);
        self.post(request).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
