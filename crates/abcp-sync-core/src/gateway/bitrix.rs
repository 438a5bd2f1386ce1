//! Bitrix24 incoming-webhook REST client

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{json, Map, Value};

use super::fields::{normalize_email, normalize_inn, normalize_phone, parse_entity_id};
use super::{ContactDraft, DealDraft, DestinationGateway};
use crate::config::{describe_webhook, HttpSettings};
use crate::error::{Error, Result};
use crate::retry::{with_retries, RetryPolicy};
use crate::util::{compact_text, is_http_url};

const CONTACT_ADD: &str = "crm.contact.add";
const DEAL_ADD: &str = "crm.deal.add";

/// Calls `POST {webhook}/{method}` with retries and pacing.
#[derive(Clone)]
pub struct BitrixClient {
    webhook_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
    pacing: Duration,
    contact_inn_field: Option<String>,
}

impl std::fmt::Debug for BitrixClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("BitrixClient")
            .field("webhook_url", &describe_webhook(&self.webhook_url))
            .field("retry", &self.retry)
            .field("pacing", &self.pacing)
            .field("contact_inn_field", &self.contact_inn_field)
            .finish_non_exhaustive()
    }
}

impl BitrixClient {
    pub fn new(webhook_url: impl Into<String>, http: &HttpSettings) -> Result<Self> {
        let webhook_url = webhook_url.into().trim().trim_end_matches('/').to_string();
        if !is_http_url(&webhook_url) {
            return Err(Error::InvalidInput(
                "webhook URL must include http:// or https://".to_string(),
            ));
        }

        Ok(Self {
            webhook_url,
            client: reqwest::Client::builder().timeout(http.timeout).build()?,
            retry: RetryPolicy::from_http(http),
            pacing: http.pacing,
            contact_inn_field: None,
        })
    }

    /// Send the normalized tax id in this contact field.
    #[must_use]
    pub fn with_contact_inn_field(mut self, field: Option<String>) -> Self {
        self.contact_inn_field = field;
        self
    }

    fn contact_fields(&self, contact: &ContactDraft) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("NAME".to_string(), json!(contact.name));
        fields.insert("LAST_NAME".to_string(), json!(""));
        fields.insert("SECOND_NAME".to_string(), json!(""));
        fields.insert("OPENED".to_string(), json!("Y"));
        fields.insert("COMMENTS".to_string(), json!(contact.comment));

        if let Some(phone) = contact.phone.as_deref().and_then(normalize_phone) {
            fields.insert(
                "PHONE".to_string(),
                json!([{ "VALUE": phone, "VALUE_TYPE": "WORK" }]),
            );
        }
        if let Some(email) = contact.email.as_deref().and_then(normalize_email) {
            fields.insert(
                "EMAIL".to_string(),
                json!([{ "VALUE": email, "VALUE_TYPE": "WORK" }]),
            );
        }
        if let (Some(field), Some(inn)) = (
            self.contact_inn_field.as_ref(),
            contact.inn.as_deref().and_then(normalize_inn),
        ) {
            fields.insert(field.clone(), json!(inn));
        }

        fields
    }

    async fn add_entity(&self, method: &str, fields: &Map<String, Value>) -> Result<i64> {
        let body = self.call(method, &json!({ "fields": fields })).await?;
        parse_entity_id(body.get("result")).map_err(|message| Error::InvalidResponse {
            endpoint: method.to_string(),
            message,
        })
    }

    /// One REST call with retries; sleeps for the pacing delay after success.
    async fn call(&self, method: &str, params: &Value) -> Result<Map<String, Value>> {
        let url = format!("{}/{method}", self.webhook_url);
        let url = url.as_str();
        let body = with_retries(self.retry, method, move || self.post_once(url, method, params))
            .await?;

        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
        Ok(body)
    }

    async fn post_once(&self, url: &str, method: &str, params: &Value) -> Result<Map<String, Value>> {
        tracing::debug!(method, "Bitrix24 request");
        let response = self.client.post(url).json(params).send().await?;
        let status = response.status();
        let text = response.text().await?;
        let payload = serde_json::from_str::<Value>(&text).ok();

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::HttpStatus {
                endpoint: method.to_string(),
                status: status.as_u16(),
                body: compact_text(&text),
            });
        }

        // Bitrix24 may report errors with a 200 status
        if let Some(message) = payload.as_ref().and_then(api_error_message) {
            return Err(Error::Api {
                endpoint: method.to_string(),
                message,
            });
        }

        if !status.is_success() {
            return Err(Error::HttpStatus {
                endpoint: method.to_string(),
                status: status.as_u16(),
                body: compact_text(&text),
            });
        }

        match payload {
            Some(Value::Object(body)) => Ok(body),
            _ => Err(Error::InvalidResponse {
                endpoint: method.to_string(),
                message: format!("expected a JSON object, got {:?}", compact_text(&text)),
            }),
        }
    }
}

impl DestinationGateway for BitrixClient {
    async fn create_contact(&self, contact: &ContactDraft) -> Result<i64> {
        let fields = self.contact_fields(contact);
        tracing::info!(
            name = %contact.name,
            has_phone = fields.contains_key("PHONE"),
            has_email = fields.contains_key("EMAIL"),
            "Creating Bitrix24 contact"
        );

        match self.add_entity(CONTACT_ADD, &fields).await {
            Err(error) if fields.contains_key("EMAIL") && is_bad_email_rejection(&error) => {
                tracing::warn!(%error, "Contact email rejected, retrying without EMAIL");
                let mut without_email = fields;
                without_email.remove("EMAIL");
                self.add_entity(CONTACT_ADD, &without_email).await
            }
            result => result,
        }
    }

    async fn create_deal(&self, deal: &DealDraft) -> Result<i64> {
        let mut fields = Map::new();
        fields.insert("TITLE".to_string(), json!(deal.title));
        fields.insert("CATEGORY_ID".to_string(), json!(deal.category_id));
        fields.insert("STAGE_ID".to_string(), json!(deal.stage_id));
        fields.insert("CONTACT_ID".to_string(), json!(deal.contact_id));
        fields.extend(deal.custom_fields.clone());

        tracing::info!(
            title = %deal.title,
            contact_id = deal.contact_id,
            category_id = deal.category_id,
            "Creating Bitrix24 deal"
        );
        self.add_entity(DEAL_ADD, &fields).await
    }
}

fn api_error_message(payload: &Value) -> Option<String> {
    let error = payload.as_object()?.get("error")?;
    let code = match error {
        Value::String(code) => code.trim().to_string(),
        other => other.to_string(),
    };
    let description = payload
        .get("error_description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|description| !description.is_empty());

    Some(match description {
        Some(description) => format!("{code} - {description}"),
        None => code,
    })
}

fn is_bad_email_rejection(error: &Error) -> bool {
    let message = match error {
        Error::Api { message, .. } => message,
        Error::HttpStatus { status, body, .. } if *status < 500 => body,
        _ => return false,
    }
    .to_lowercase();

    (message.contains("email") || message.contains("e-mail"))
        && (message.contains("invalid") || message.contains("некоррект"))
}
