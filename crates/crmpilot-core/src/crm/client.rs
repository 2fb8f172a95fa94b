//! Zoho CRM REST client.
//!
//! OAuth access tokens are obtained lazily from the refresh-token grant and
//! cached. A `401` on any call triggers exactly one refresh and one retry;
//! a second `401` becomes an `AUTH_ERROR` envelope.

use std::time::Duration;

use reqwest::{Client, Method, StatusCode, Url};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::BoxFuture;
use crate::secrets::{Credentials, SecretValue};

use super::tools::{
    CONVERT_LEAD, CREATE_RECORDS, CREATE_TASK, GET_FIELDS, GET_MODULE_API_NAME, GET_RECORD, QUERY_RECORDS,
    SEND_MAIL, UPDATE_RECORDS,
};
use super::{CrmBackend, Mail, backend_error, success};

const REJECTED: &str = "Zoho CRM rejected the request";

/// Transport-level failures. Rendered into envelopes at the trait boundary.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("HTTP client setup failed: {0}")]
    Build(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("token refresh failed: {0}")]
    Refresh(String),

    #[error("access token rejected after refresh")]
    Unauthorized,
}

impl ClientError {
    /// Envelope reported to the model for this failure.
    pub fn to_envelope(&self, tool: &str) -> Value {
        let (kind, status) = match self {
            ClientError::Network(_) => ("NETWORK_ERROR", None),
            ClientError::Refresh(_) => ("AUTH_ERROR", None),
            ClientError::Unauthorized => ("AUTH_ERROR", Some(401)),
            ClientError::InvalidUrl(_) | ClientError::Build(_) => ("CLIENT_ERROR", None),
        };
        backend_error(tool, kind, &self.to_string(), status, json!({}))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Network(e.to_string())
    }
}

/// Zoho CRM client over `reqwest`.
pub struct ZohoClient {
    http: Client,
    api_base: Url,
    accounts_url: String,
    mail_url: String,
    refresh_token: SecretValue,
    client_id: SecretValue,
    client_secret: SecretValue,
    mail_api_key: SecretValue,
    access_token: Mutex<Option<SecretValue>>,
}

impl ZohoClient {
    pub fn new(
        config: &crmpilot_config::CrmConfig,
        credentials: &Credentials,
    ) -> Result<Self, ClientError> {
        let api_base = Url::parse(&config.api_base_url)
            .map_err(|_| ClientError::InvalidUrl(config.api_base_url.clone()))?;
        if api_base.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(config.api_base_url.clone()));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        Ok(Self {
            http,
            api_base,
            accounts_url: config.accounts_url.clone(),
            mail_url: config.mail_function_url.clone(),
            refresh_token: credentials.refresh_token.clone(),
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            mail_api_key: credentials.mail_api_key.clone(),
            access_token: Mutex::new(None),
        })
    }

    /// `api_base` followed by `segments`, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Exchange the refresh token for a new access token and cache it.
    async fn refresh_access_token(&self) -> Result<SecretValue, ClientError> {
        let resp = self
            .http
            .post(&self.accounts_url)
            .query(&[
                ("refresh_token", self.refresh_token.expose()),
                ("client_id", self.client_id.expose()),
                ("client_secret", self.client_secret.expose()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        let token = body
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty());

        match token {
            Some(token) if status.is_success() => {
                info!("CRM access token refreshed");
                let token = SecretValue::new(token);
                *self.access_token.lock().await = Some(token.clone());
                Ok(token)
            }
            _ => {
                let reason = body
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("no access_token in response");
                Err(ClientError::Refresh(format!("{status}: {reason}")))
            }
        }
    }

    async fn current_token(&self) -> Result<SecretValue, ClientError> {
        let cached = self.access_token.lock().await.clone();
        match cached {
            Some(token) => Ok(token),
            None => self.refresh_access_token().await,
        }
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &Url,
        query: &[(&str, &str)],
        body: Option<&Value>,
        token: &SecretValue,
    ) -> Result<reqwest::Response, ClientError> {
        let mut req = self
            .http
            .request(method.clone(), url.clone())
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Zoho-oauthtoken {}", token.expose()),
            )
            .query(query);
        if let Some(body) = body {
            req = req.json(body);
        }
        Ok(req.send().await?)
    }

    /// Send an authenticated request, refreshing the token once on `401`.
    async fn execute(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<(StatusCode, Value), ClientError> {
        debug!(%method, path = url.path(), "CRM request");
        let token = self.current_token().await?;
        let mut resp = self.send_once(&method, &url, query, body, &token).await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            warn!(path = url.path(), "CRM access token rejected, refreshing");
            let token = self.refresh_access_token().await?;
            resp = self.send_once(&method, &url, query, body, &token).await?;
            if resp.status() == StatusCode::UNAUTHORIZED {
                return Err(ClientError::Unauthorized);
            }
        }

        Ok(read_body(resp).await)
    }

    /// Run a request and map it to `Ok(body)` on 2xx or the failure envelope.
    async fn call(
        &self,
        tool: &str,
        method: Method,
        url: Url,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value, Value> {
        match self.execute(method, url, query, body).await {
            Ok((status, _)) if status == StatusCode::NO_CONTENT => Ok(json!({ "data": [] })),
            Ok((status, body)) if status.is_success() => Ok(body),
            Ok((status, body)) => {
                warn!(tool, status = status.as_u16(), "CRM rejected request");
                Err(backend_error(tool, "API_ERROR", REJECTED, Some(status.as_u16()), body))
            }
            Err(e) => {
                warn!(tool, error = %e, "CRM request failed");
                Err(e.to_envelope(tool))
            }
        }
    }

    async fn get_fields_inner(&self, module: String, datatypes: Vec<String>) -> Value {
        let url = self.endpoint(&["settings", "fields"]);
        let body = match self
            .call(GET_FIELDS, Method::GET, url, &[("module", module.as_str())], None)
            .await
        {
            Ok(body) => body,
            Err(envelope) => return envelope,
        };
        success(Value::Array(project_fields(&body, &datatypes)))
    }

    async fn list_modules_inner(&self) -> Value {
        let url = self.endpoint(&["settings", "modules"]);
        match self.call(GET_MODULE_API_NAME, Method::GET, url, &[], None).await {
            Ok(body) => success(Value::Array(project_modules(&body))),
            Err(envelope) => envelope,
        }
    }

    async fn send_mail_inner(&self, mail: Mail) -> Value {
        let body = json!({
            "toMail": mail.to,
            "mailSubject": mail.subject,
            "mailContent": mail.html,
        });
        let resp = self
            .http
            .post(&self.mail_url)
            .query(&[("auth_type", "apikey"), ("zapikey", self.mail_api_key.expose())])
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(resp) => {
                let (status, body) = read_body(resp).await;
                if status.is_success() {
                    info!(to = %mail.to, "mail sent");
                    success(body)
                } else {
                    backend_error(SEND_MAIL, "API_ERROR", REJECTED, Some(status.as_u16()), body)
                }
            }
            Err(e) => ClientError::from(e).to_envelope(SEND_MAIL),
        }
    }

    async fn simple(
        &self,
        tool: &str,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Value {
        match self.call(tool, method, url, &[], body).await {
            Ok(body) => success(body),
            Err(envelope) => envelope,
        }
    }
}

impl CrmBackend for ZohoClient {
    fn get_fields(&self, module: String, datatypes: Vec<String>) -> BoxFuture<'_, Value> {
        Box::pin(self.get_fields_inner(module, datatypes))
    }

    fn query(&self, coql: String) -> BoxFuture<'_, Value> {
        Box::pin(async move {
            let url = self.endpoint(&["coql"]);
            let body = json!({ "select_query": coql });
            self.simple(QUERY_RECORDS, Method::POST, url, Some(&body)).await
        })
    }

    fn create_records(&self, module: String, payload: Value) -> BoxFuture<'_, Value> {
        Box::pin(async move {
            let url = self.endpoint(&[module.as_str()]);
            self.simple(CREATE_RECORDS, Method::POST, url, Some(&payload)).await
        })
    }

    fn update_records(&self, module: String, payload: Value) -> BoxFuture<'_, Value> {
        Box::pin(async move {
            let url = match single_record_id(&payload) {
                Some(id) => self.endpoint(&[module.as_str(), id]),
                None => self.endpoint(&[module.as_str()]),
            };
            self.simple(UPDATE_RECORDS, Method::PUT, url, Some(&payload)).await
        })
    }

    fn convert_lead(&self, record_id: String, payload: Value) -> BoxFuture<'_, Value> {
        Box::pin(async move {
            let url = self.endpoint(&["Leads", record_id.as_str(), "actions", "convert"]);
            self.simple(CONVERT_LEAD, Method::POST, url, Some(&payload)).await
        })
    }

    fn send_mail(&self, mail: Mail) -> BoxFuture<'_, Value> {
        Box::pin(self.send_mail_inner(mail))
    }

    fn list_modules(&self) -> BoxFuture<'_, Value> {
        Box::pin(self.list_modules_inner())
    }

    fn get_record(&self, module: String, record_id: String) -> BoxFuture<'_, Value> {
        Box::pin(async move {
            let url = self.endpoint(&[module.as_str(), record_id.as_str()]);
            self.simple(GET_RECORD, Method::GET, url, None).await
        })
    }

    fn create_task(&self, payload: Value) -> BoxFuture<'_, Value> {
        Box::pin(async move {
            let url = self.endpoint(&["Tasks"]);
            self.simple(CREATE_TASK, Method::POST, url, Some(&payload)).await
        })
    }
}

/// Status plus parsed body; an empty body becomes `{}`, a non-JSON body a string.
async fn read_body(resp: reqwest::Response) -> (StatusCode, Value) {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    let body = if text.trim().is_empty() {
        json!({})
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    };
    (status, body)
}

/// The id of the only record in `payload.data`, if there is exactly one.
fn single_record_id(payload: &Value) -> Option<&str> {
    match payload.get("data").and_then(Value::as_array) {
        Some(records) if records.len() == 1 => records[0].get("id").and_then(Value::as_str),
        _ => None,
    }
}

/// Project `/settings/fields` down to what the model needs.
fn project_fields(body: &Value, datatypes: &[String]) -> Vec<Value> {
    let fetch_all = datatypes.is_empty() || datatypes.iter().any(|d| d == "ALL" || d == "all");

    body.get("fields")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|field| {
            let data_type = field.get("data_type").and_then(Value::as_str).unwrap_or("");
            if !fetch_all && !datatypes.iter().any(|d| d == data_type) {
                return None;
            }
            let values: Vec<Value> = field
                .get("pick_list_values")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .map(|item| item.get("display_value").cloned().unwrap_or(Value::Null))
                .collect();
            Some(json!({
                "api_name": field.get("api_name").and_then(Value::as_str).unwrap_or(""),
                "data_type": data_type,
                "mandatory": field.get("system_mandatory").and_then(Value::as_bool).unwrap_or(false),
                "values": values,
            }))
        })
        .collect()
}

/// Project `/settings/modules` to `{label, api_name}` pairs.
fn project_modules(body: &Value) -> Vec<Value> {
    body.get("modules")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(|module| {
            json!({
                "label": module.get("actual_plural_label").and_then(Value::as_str).unwrap_or(""),
                "api_name": module.get("api_name").and_then(Value::as_str).unwrap_or(""),
            })
        })
        .collect()
}
