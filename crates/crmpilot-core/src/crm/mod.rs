//! CRM backend boundary.
//!
//! The tools talk to the CRM only through [`CrmBackend`]. Every operation
//! resolves to a JSON envelope, never an `Err`: remote failures are data the
//! model gets to see.
//!
//! ```text
//! success: { "success": true,  "data": ... }
//! failure: { "success": false, "tool": "...",
//!            "error": { "type": "API_ERROR", "message": "...",
//!                       "status_code": 400, "details": {...} } }
//! ```

pub mod client;
pub mod tools;

use serde_json::{Value, json};

use crate::BoxFuture;

pub use client::{ClientError, ZohoClient};
pub use tools::register_crm_tools;

/// An outgoing email sent through the CRM mail function.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    /// HTML body fragment.
    pub html: String,
}

/// Remote CRM operations used by the tool catalogue.
///
/// Object safe so tools can hold an `Arc<dyn CrmBackend>`.
pub trait CrmBackend: Send + Sync {
    /// Field metadata of `module`, filtered by data type. An empty filter or
    /// one containing `"ALL"` returns every field.
    fn get_fields(&self, module: String, datatypes: Vec<String>) -> BoxFuture<'_, Value>;

    /// Execute an already validated COQL query.
    fn query(&self, coql: String) -> BoxFuture<'_, Value>;

    fn create_records(&self, module: String, payload: Value) -> BoxFuture<'_, Value>;

    fn update_records(&self, module: String, payload: Value) -> BoxFuture<'_, Value>;

    fn convert_lead(&self, record_id: String, payload: Value) -> BoxFuture<'_, Value>;

    fn send_mail(&self, mail: Mail) -> BoxFuture<'_, Value>;

    /// `[{label, api_name}]` for every module.
    fn list_modules(&self) -> BoxFuture<'_, Value>;

    fn get_record(&self, module: String, record_id: String) -> BoxFuture<'_, Value>;

    fn create_task(&self, payload: Value) -> BoxFuture<'_, Value>;
}

/// `{ "success": true, "data": data }`
pub fn success(data: Value) -> Value {
    json!({ "success": true, "data": data })
}

/// The remote-failure envelope.
pub fn backend_error(
    tool: &str,
    error_type: &str,
    message: &str,
    status_code: Option<u16>,
    details: Value,
) -> Value {
    let details = if details.is_null() { json!({}) } else { details };
    json!({
        "success": false,
        "tool": tool,
        "error": {
            "type": error_type,
            "message": message,
            "status_code": status_code,
            "details": details,
        }
    })
}

/// Whether an envelope reports success.
pub fn is_success(envelope: &Value) -> bool {
    envelope.get("success").and_then(Value::as_bool) == Some(true)
}
