//! `ZohoClient` against an in-process fake of the CRM, OAuth and mail
//! endpoints.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{get, post};
use axum::{Json, Router};
use crmpilot_core::crm::{CrmBackend, Mail};
use crmpilot_core::{Credentials, SecretValue, ZohoClient};
use crmpilot_test_utils::TestConfigBuilder;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

type Reply = (StatusCode, Json<Value>);

#[derive(Default)]
struct FakeCrm {
    issued: usize,
    current: Option<String>,
    reject_all: bool,
    refresh_fails: bool,
    hits: Vec<String>,
    last_params: HashMap<String, String>,
    last_body: Value,
}

type Shared = Arc<Mutex<FakeCrm>>;

impl FakeCrm {
    /// Record the hit and return a 401 reply when the bearer token is stale.
    fn enter(&mut self, label: String, headers: &HeaderMap) -> Option<Reply> {
        self.hits.push(label);
        let expected = self.current.as_ref().map(|t| format!("Zoho-oauthtoken {t}"));
        let presented = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
        if self.reject_all || expected.as_deref() != presented {
            return Some((
                StatusCode::UNAUTHORIZED,
                Json(json!({"code": "INVALID_TOKEN", "message": "invalid oauth token"})),
            ));
        }
        None
    }

    fn count(&self, prefix: &str) -> usize {
        self.hits.iter().filter(|h| h.starts_with(prefix)).count()
    }
}

async fn token(State(crm): State<Shared>, Query(params): Query<HashMap<String, String>>) -> Reply {
    let mut crm = crm.lock().unwrap();
    crm.hits.push("POST token".to_string());
    let valid = params.get("grant_type").map(String::as_str) == Some("refresh_token")
        && params.get("refresh_token").map(String::as_str) == Some("refresh-1")
        && params.get("client_id").map(String::as_str) == Some("client-1")
        && params.get("client_secret").map(String::as_str) == Some("secret-1");
    if crm.refresh_fails || !valid {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_code"})));
    }
    crm.issued += 1;
    let token = format!("token-{}", crm.issued);
    crm.current = Some(token.clone());
    (
        StatusCode::OK,
        Json(json!({"access_token": token, "expires_in": 3600})),
    )
}

async fn coql(State(crm): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Reply {
    let mut crm = crm.lock().unwrap();
    if let Some(denied) = crm.enter("POST coql".to_string(), &headers) {
        return denied;
    }
    let query = body["select_query"].as_str().unwrap_or_default().to_string();
    crm.last_body = body;
    if query.contains("Nobody") {
        return (StatusCode::NO_CONTENT, Json(json!({})));
    }
    if query.contains("Broken") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"code": "SYNTAX_ERROR", "message": "error at column 8"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({"data": [{"id": "1"}], "info": {"count": 1, "more_records": false}})),
    )
}

async fn fields(
    State(crm): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Reply {
    let mut crm = crm.lock().unwrap();
    if let Some(denied) = crm.enter("GET fields".to_string(), &headers) {
        return denied;
    }
    crm.last_params = params;
    (
        StatusCode::OK,
        Json(json!({"fields": [
            {"api_name": "Last_Name", "data_type": "text", "system_mandatory": true},
            {
                "api_name": "Lead_Status",
                "data_type": "picklist",
                "system_mandatory": false,
                "pick_list_values": [
                    {"display_value": "Not Contacted", "actual_value": "Not Contacted"},
                    {"display_value": "Contacted", "actual_value": "Contacted"}
                ]
            }
        ]})),
    )
}

async fn modules(State(crm): State<Shared>, headers: HeaderMap) -> Reply {
    let mut crm = crm.lock().unwrap();
    if let Some(denied) = crm.enter("GET modules".to_string(), &headers) {
        return denied;
    }
    (
        StatusCode::OK,
        Json(json!({"modules": [
            {"api_name": "Leads", "actual_plural_label": "Leads", "generated_type": "default"},
            {"api_name": "Deals", "actual_plural_label": "Deals", "generated_type": "default"}
        ]})),
    )
}

async fn update_many(
    State(crm): State<Shared>,
    headers: HeaderMap,
    Path(module): Path<String>,
    Json(body): Json<Value>,
) -> Reply {
    let mut crm = crm.lock().unwrap();
    if let Some(denied) = crm.enter(format!("PUT {module}"), &headers) {
        return denied;
    }
    crm.last_body = body;
    (StatusCode::OK, Json(json!({"data": [{"code": "SUCCESS"}]})))
}

async fn update_one(
    State(crm): State<Shared>,
    headers: HeaderMap,
    Path((module, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Reply {
    let mut crm = crm.lock().unwrap();
    if let Some(denied) = crm.enter(format!("PUT {module}/{id}"), &headers) {
        return denied;
    }
    crm.last_body = body;
    (
        StatusCode::OK,
        Json(json!({"data": [{"code": "SUCCESS", "details": {"id": id}}]})),
    )
}

async fn get_one(
    State(crm): State<Shared>,
    headers: HeaderMap,
    Path((module, id)): Path<(String, String)>,
) -> Reply {
    let mut crm = crm.lock().unwrap();
    if let Some(denied) = crm.enter(format!("GET {module}/{id}"), &headers) {
        return denied;
    }
    (
        StatusCode::OK,
        Json(json!({"data": [{"id": id, "Last_Name": "Smith"}]})),
    )
}

async fn mail(
    State(crm): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Reply {
    let mut crm = crm.lock().unwrap();
    crm.hits.push("POST mail".to_string());
    let authorized = params.get("auth_type").map(String::as_str) == Some("apikey")
        && params.get("zapikey").map(String::as_str) == Some("mail-key");
    crm.last_params = params;
    crm.last_body = body;
    if !authorized {
        return (StatusCode::UNAUTHORIZED, Json(json!({"code": "INVALID_API_KEY"})));
    }
    (
        StatusCode::OK,
        Json(json!({"code": "success", "details": {"output": "sent"}})),
    )
}

fn credentials() -> Credentials {
    Credentials {
        llm_api_key: SecretValue::new("llm-key"),
        refresh_token: SecretValue::new("refresh-1"),
        client_id: SecretValue::new("client-1"),
        client_secret: SecretValue::new("secret-1"),
        mail_api_key: SecretValue::new("mail-key"),
    }
}

/// Serve the fake on an ephemeral port and build a client pointed at it.
async fn start() -> (Shared, ZohoClient) {
    let crm: Shared = Arc::default();
    let app = Router::new()
        .route("/oauth/v2/token", post(token))
        .route("/crm/v8/coql", post(coql))
        .route("/crm/v8/settings/fields", get(fields))
        .route("/crm/v8/settings/modules", get(modules))
        .route("/crm/v8/{module}", axum::routing::put(update_many))
        .route("/crm/v8/{module}/{id}", get(get_one).put(update_one))
        .route("/crm/v7/functions/agentmail/actions/execute", post(mail))
        .with_state(crm.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = TestConfigBuilder::new()
        .crm_server(&format!("http://{addr}"))
        .request_timeout_secs(5)
        .build();
    let client = ZohoClient::new(&config.crm, &credentials()).unwrap();
    (crm, client)
}

const QUERY: &str = "SELECT id FROM Leads WHERE id is not null";

#[tokio::test]
async fn test_first_call_fetches_token() {
    let (crm, client) = start().await;

    let envelope = client.query(QUERY.to_string()).await;

    assert_eq!(envelope["success"], true);
    assert_eq!(envelope["data"]["data"][0]["id"], "1");
    let crm = crm.lock().unwrap();
    assert_eq!(crm.issued, 1);
    assert_eq!(crm.hits, vec!["POST token", "POST coql"]);
    assert_eq!(crm.last_body, json!({"select_query": QUERY}));
}

#[test_log::test(tokio::test)]
async fn test_stale_token_is_refreshed_and_retried_once() {
    let (crm, client) = start().await;
    assert_eq!(client.query(QUERY.to_string()).await["success"], true);

    // Token revoked server-side between calls.
    crm.lock().unwrap().current = Some("revoked".to_string());

    let envelope = client.query(QUERY.to_string()).await;
    assert_eq!(envelope["success"], true);

    let crm = crm.lock().unwrap();
    assert_eq!(crm.issued, 2);
    assert_eq!(
        crm.hits,
        vec!["POST token", "POST coql", "POST coql", "POST token", "POST coql"]
    );
}

#[tokio::test]
async fn test_second_401_is_auth_error() {
    let (crm, client) = start().await;
    crm.lock().unwrap().reject_all = true;

    let envelope = client.query(QUERY.to_string()).await;

    assert_eq!(envelope["success"], false);
    assert_eq!(envelope["tool"], "query_records_tool");
    assert_eq!(envelope["error"]["type"], "AUTH_ERROR");
    assert_eq!(envelope["error"]["status_code"], 401);
    let crm = crm.lock().unwrap();
    assert_eq!(crm.count("POST coql"), 2);
    assert_eq!(crm.issued, 2);
}

#[tokio::test]
async fn test_refresh_failure_is_auth_error() {
    let (crm, client) = start().await;
    crm.lock().unwrap().refresh_fails = true;

    let envelope = client.list_modules().await;

    assert_eq!(envelope["error"]["type"], "AUTH_ERROR");
    assert_eq!(envelope["error"]["status_code"], Value::Null);
    assert!(
        envelope["error"]["message"]
            .as_str()
            .unwrap()
            .contains("invalid_code")
    );
    assert_eq!(crm.lock().unwrap().count("GET"), 0);
}

#[tokio::test]
async fn test_rejected_request_is_api_error() {
    let (_crm, client) = start().await;

    let envelope = client
        .query("SELECT Broken FROM Leads WHERE id is not null".to_string())
        .await;

    assert_eq!(envelope["success"], false);
    assert_eq!(envelope["error"]["type"], "API_ERROR");
    assert_eq!(envelope["error"]["status_code"], 400);
    assert_eq!(envelope["error"]["message"], "Zoho CRM rejected the request");
    assert_eq!(envelope["error"]["details"]["code"], "SYNTAX_ERROR");
}

#[tokio::test]
async fn test_no_content_is_empty_data() {
    let (_crm, client) = start().await;

    let envelope = client
        .query("SELECT id FROM Leads WHERE Last_Name = 'Nobody'".to_string())
        .await;

    assert_eq!(envelope, json!({"success": true, "data": {"data": []}}));
}

#[tokio::test]
async fn test_get_fields_filters_by_datatype() {
    let (crm, client) = start().await;

    let envelope = client
        .get_fields("Leads".to_string(), vec!["picklist".to_string()])
        .await;

    assert_eq!(
        envelope["data"],
        json!([{
            "api_name": "Lead_Status",
            "data_type": "picklist",
            "mandatory": false,
            "values": ["Not Contacted", "Contacted"],
        }])
    );
    assert_eq!(crm.lock().unwrap().last_params.get("module").map(String::as_str), Some("Leads"));

    let all = client.get_fields("Leads".to_string(), vec!["ALL".to_string()]).await;
    assert_eq!(all["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_list_modules_projection() {
    let (_crm, client) = start().await;

    let envelope = client.list_modules().await;

    assert_eq!(
        envelope["data"],
        json!([
            {"label": "Leads", "api_name": "Leads"},
            {"label": "Deals", "api_name": "Deals"},
        ])
    );
}

#[tokio::test]
async fn test_update_path_depends_on_record_count() {
    let (crm, client) = start().await;

    let one = json!({"data": [{"id": "42", "Last_Name": "Jones"}]});
    assert_eq!(client.update_records("Leads".to_string(), one.clone()).await["success"], true);
    assert_eq!(crm.lock().unwrap().last_body, one);

    let two = json!({"data": [{"id": "42"}, {"id": "43"}]});
    assert_eq!(client.update_records("Leads".to_string(), two).await["success"], true);

    let crm = crm.lock().unwrap();
    assert_eq!(crm.count("PUT Leads/42"), 1);
    assert_eq!(crm.hits.last().map(String::as_str), Some("PUT Leads"));
}

#[tokio::test]
async fn test_get_record() {
    let (_crm, client) = start().await;

    let envelope = client.get_record("Contacts".to_string(), "77".to_string()).await;

    assert_eq!(envelope["data"]["data"][0]["id"], "77");
}

#[tokio::test]
async fn test_send_mail_uses_api_key() {
    let (crm, client) = start().await;

    let envelope = client
        .send_mail(Mail {
            to: "bob@example.com".to_string(),
            subject: "Follow-up".to_string(),
            html: "<p>Hi Bob</p>".to_string(),
        })
        .await;

    assert_eq!(envelope["success"], true);
    let crm = crm.lock().unwrap();
    assert_eq!(crm.issued, 0);
    assert_eq!(
        crm.last_body,
        json!({"toMail": "bob@example.com", "mailSubject": "Follow-up", "mailContent": "<p>Hi Bob</p>"})
    );
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = TestConfigBuilder::new()
        .crm_server(&format!("http://{addr}"))
        .request_timeout_secs(2)
        .build();
    let client = ZohoClient::new(&config.crm, &credentials()).unwrap();

    let envelope = client.query(QUERY.to_string()).await;

    assert_eq!(envelope["error"]["type"], "NETWORK_ERROR");
    assert_eq!(envelope["error"]["status_code"], Value::Null);
}

#[test]
fn test_rejects_relative_base_url() {
    let mut config = TestConfigBuilder::new().build();
    config.crm.api_base_url = "not a url".to_string();
    assert!(ZohoClient::new(&config.crm, &credentials()).is_err());
}
