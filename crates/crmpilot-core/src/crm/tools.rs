//! The CRM tool catalogue exposed to the model.
//!
//! Each tool has a typed argument struct, a JSON Schema and a usage contract.
//! The contract text is what the model reads; its rules are not enforced here
//! beyond argument shape, except for `query_records_tool`, which runs every
//! query through the COQL validator before it reaches the CRM.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::BoxFuture;
use crate::context::{ToolError, ToolHandler, ToolRegistry, parse_args};
use crate::coql::validate_query;
use crate::llm::ToolDefinition;

use super::{CrmBackend, Mail};

pub const GET_FIELDS: &str = "get_fields_tool";
pub const QUERY_RECORDS: &str = "query_records_tool";
pub const CREATE_RECORDS: &str = "create_records_tool";
pub const UPDATE_RECORDS: &str = "update_records_tool";
pub const CONVERT_LEAD: &str = "convert_lead_tool";
pub const SEND_MAIL: &str = "send_mail_tool";
pub const GET_MODULE_API_NAME: &str = "get_module_api_name_tool";
pub const GET_RECORD: &str = "get_specific_record_tool";
pub const CREATE_TASK: &str = "create_task_tool";

/// Largest batch the CRM accepts in one create or update call.
pub const MAX_RECORDS_PER_CALL: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    GetFields,
    QueryRecords,
    CreateRecords,
    UpdateRecords,
    ConvertLead,
    SendMail,
    GetModuleApiName,
    GetRecord,
    CreateTask,
}

const ALL_OPS: [Op; 9] = [
    Op::GetFields,
    Op::QueryRecords,
    Op::CreateRecords,
    Op::UpdateRecords,
    Op::ConvertLead,
    Op::SendMail,
    Op::GetModuleApiName,
    Op::GetRecord,
    Op::CreateTask,
];

#[derive(Debug, Deserialize)]
struct GetFieldsArgs {
    module: String,
    #[serde(default)]
    datatypes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct QueryArgs {
    query: String,
}

#[derive(Debug, Deserialize)]
struct CreateRecordsArgs {
    module: String,
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct UpdateRecordsArgs {
    module_api_name: String,
    body: Value,
}

#[derive(Debug, Deserialize)]
struct ConvertLeadArgs {
    record_id: String,
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct SendMailArgs {
    to_mail: String,
    mail_subject: String,
    mail_content: String,
}

#[derive(Debug, Deserialize)]
struct GetRecordArgs {
    module: String,
    record_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateTaskArgs {
    payload: Value,
}

impl Op {
    fn name(self) -> &'static str {
        match self {
            Op::GetFields => GET_FIELDS,
            Op::QueryRecords => QUERY_RECORDS,
            Op::CreateRecords => CREATE_RECORDS,
            Op::UpdateRecords => UPDATE_RECORDS,
            Op::ConvertLead => CONVERT_LEAD,
            Op::SendMail => SEND_MAIL,
            Op::GetModuleApiName => GET_MODULE_API_NAME,
            Op::GetRecord => GET_RECORD,
            Op::CreateTask => CREATE_TASK,
        }
    }

    fn definition(self) -> ToolDefinition {
        let (description, parameters) = match self {
            Op::GetFields => (
                "Return the API names of a module's fields, filtered by data type. \
                 Pass only the data types you need; \"ALL\" returns every field and should be rare. \
                 Call this at most once per module and reuse the answer. Each field reports whether \
                 it is mandatory and, for pick lists, its allowed values.",
                json!({
                    "type": "object",
                    "properties": {
                        "module": {
                            "type": "string",
                            "description": "Module API name, e.g. \"Leads\" or \"Contacts\""
                        },
                        "datatypes": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Data types to keep: picklist, text, ownerlookup, email, datetime, \
                                            boolean, bigint, website, percent, date, integer, \
                                            multiselectpicklist, autonumber, currency, double, \
                                            userlookup, lookup, phone, textarea, formula, or ALL"
                        }
                    },
                    "required": ["module", "datatypes"]
                }),
            ),
            Op::QueryRecords => (
                "Run a COQL query and return the matching records. Field names must be API names \
                 from get_fields_tool. Never use SELECT *. String literals use single quotes. \
                 The FROM module must be the plural API name. Group WHERE conditions in parentheses. \
                 Datetimes are literals like '2024-12-20T00:00:00Z'; date functions are not available. \
                 The query is validated and normalized before it runs; a rejected query comes back \
                 with the reasons so it can be fixed.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "COQL query, e.g. SELECT id, Last_Name FROM Leads WHERE (Lead_Status = 'New')"
                        }
                    },
                    "required": ["query"]
                }),
            ),
            Op::CreateRecords => (
                "Create 1 to 100 records in a module. Never call this while a mandatory field is \
                 missing: ask the user instead (get_fields_tool reports mandatory fields). Show the \
                 data to the user and get approval first. Use API field names; lookups are \
                 {\"id\": \"...\"}. Add \"trigger\": [] to skip automations. Line items go in the \
                 module's subform: Quoted_Items, Ordered_Items, Invoiced_Items or Purchase_Items, \
                 with Product_Name as the product lookup.",
                json!({
                    "type": "object",
                    "properties": {
                        "module": {"type": "string", "description": "Module API name"},
                        "payload": {
                            "type": "object",
                            "description": "{\"data\": [record, ...], \"trigger\": [...]?}",
                            "properties": {
                                "data": {"type": "array", "items": {"type": "object"}},
                                "trigger": {"type": "array", "items": {"type": "string"}}
                            },
                            "required": ["data"]
                        }
                    },
                    "required": ["module", "payload"]
                }),
            ),
            Op::UpdateRecords => (
                "Update 1 to 100 existing records. Every record in body.data must carry its \"id\". \
                 Values must match the field's type and length or the whole request fails. To \
                 change a line item, include the line item's own id in the subform entry. \
                 Discounts given as a percentage are sent as a string such as \"10%\".",
                json!({
                    "type": "object",
                    "properties": {
                        "module_api_name": {"type": "string", "description": "Module API name"},
                        "body": {
                            "type": "object",
                            "properties": {
                                "data": {"type": "array", "items": {"type": "object"}}
                            },
                            "required": ["data"]
                        }
                    },
                    "required": ["module_api_name", "body"]
                }),
            ),
            Op::ConvertLead => (
                "Convert a lead into a contact and/or account, optionally creating a deal. This \
                 cannot be undone. When a deal is created it needs Deal_Name, Closing_Date, \
                 Pipeline and Stage.",
                json!({
                    "type": "object",
                    "properties": {
                        "record_id": {"type": "string", "description": "Id of the lead"},
                        "payload": {
                            "type": "object",
                            "description": "{\"data\": [{\"overwrite\"?, \"notify_lead_owner\"?, \"Accounts\"?, \"Contacts\"?, \"Deals\"?, \"assign_to\"?, \"carry_over_tags\"?}]}",
                            "properties": {
                                "data": {"type": "array", "items": {"type": "object"}}
                            },
                            "required": ["data"]
                        }
                    },
                    "required": ["record_id", "payload"]
                }),
            ),
            Op::SendMail => (
                "Send an HTML email to one recipient. Before calling this, show the full draft to \
                 the user and wait for explicit approval. mail_content is an HTML fragment without \
                 <html>, <head> or <body>; use <br> for line breaks. No attachments, CC or BCC.",
                json!({
                    "type": "object",
                    "properties": {
                        "to_mail": {"type": "string", "description": "Recipient address"},
                        "mail_subject": {"type": "string"},
                        "mail_content": {"type": "string", "description": "HTML body fragment"}
                    },
                    "required": ["to_mail", "mail_subject", "mail_content"]
                }),
            ),
            Op::GetModuleApiName => (
                "List every module with its display label and API name. Use it when a module name \
                 is unknown, in particular for custom modules, and always pass the API name to the \
                 other tools.",
                json!({"type": "object", "properties": {}}),
            ),
            Op::GetRecord => (
                "Fetch every field of one record, subforms included.",
                json!({
                    "type": "object",
                    "properties": {
                        "module": {"type": "string", "description": "Module API name"},
                        "record_id": {"type": "string"}
                    },
                    "required": ["module", "record_id"]
                }),
            ),
            Op::CreateTask => (
                "Create a task. Subject is mandatory. Who_Id references a lead or contact. What_Id \
                 may reference any record, and then $se_module must name that record's module. \
                 Due_Date uses YYYY-MM-DD.",
                json!({
                    "type": "object",
                    "properties": {
                        "payload": {
                            "type": "object",
                            "description": "{\"data\": [{\"Subject\", \"Due_Date\"?, \"Status\"?, \"Who_Id\"?: {\"id\"}, \"What_Id\"?: {\"id\"}, \"$se_module\"?}]}",
                            "properties": {
                                "data": {"type": "array", "items": {"type": "object"}}
                            },
                            "required": ["data"]
                        }
                    },
                    "required": ["payload"]
                }),
            ),
        };

        ToolDefinition {
            name: self.name().to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// Check that `payload.data` is a list of 1..=100 records, each carrying an
/// `id` when `need_id` is set.
fn require_records(tool: &str, payload: &Value, need_id: bool) -> Result<(), ToolError> {
    let invalid = |message: String| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message,
    };
    let records = payload
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("payload must contain a \"data\" list".to_string()))?;

    if records.is_empty() || records.len() > MAX_RECORDS_PER_CALL {
        return Err(invalid(format!(
            "\"data\" must hold between 1 and {MAX_RECORDS_PER_CALL} records, got {}",
            records.len()
        )));
    }
    if need_id && let Some(pos) = records.iter().position(|r| r.get("id").is_none()) {
        return Err(invalid(format!("record {pos} has no \"id\"")));
    }
    Ok(())
}

/// Handler for one catalogue entry.
struct CrmTool {
    op: Op,
    backend: Arc<dyn CrmBackend>,
}

impl CrmTool {
    async fn run(&self, args: Value) -> Result<Value, ToolError> {
        let tool = self.op.name();
        let backend = self.backend.as_ref();

        let envelope = match self.op {
            Op::GetFields => {
                let a: GetFieldsArgs = parse_args(tool, args)?;
                backend.get_fields(a.module, a.datatypes).await
            }
            Op::QueryRecords => {
                let a: QueryArgs = parse_args(tool, args)?;
                query_records(backend, a.query).await
            }
            Op::CreateRecords => {
                let a: CreateRecordsArgs = parse_args(tool, args)?;
                require_records(tool, &a.payload, false)?;
                backend.create_records(a.module, a.payload).await
            }
            Op::UpdateRecords => {
                let a: UpdateRecordsArgs = parse_args(tool, args)?;
                require_records(tool, &a.body, true)?;
                backend.update_records(a.module_api_name, a.body).await
            }
            Op::ConvertLead => {
                let a: ConvertLeadArgs = parse_args(tool, args)?;
                require_records(tool, &a.payload, false)?;
                backend.convert_lead(a.record_id, a.payload).await
            }
            Op::SendMail => {
                let a: SendMailArgs = parse_args(tool, args)?;
                backend
                    .send_mail(Mail {
                        to: a.to_mail,
                        subject: a.mail_subject,
                        html: a.mail_content,
                    })
                    .await
            }
            Op::GetModuleApiName => backend.list_modules().await,
            Op::GetRecord => {
                let a: GetRecordArgs = parse_args(tool, args)?;
                backend.get_record(a.module, a.record_id).await
            }
            Op::CreateTask => {
                let a: CreateTaskArgs = parse_args(tool, args)?;
                require_records(tool, &a.payload, false)?;
                backend.create_task(a.payload).await
            }
        };
        Ok(envelope)
    }
}

impl ToolHandler for CrmTool {
    fn call(&self, args: Value) -> BoxFuture<'_, Result<Value, ToolError>> {
        Box::pin(self.run(args))
    }
}

/// Validate `query`, then run the formatted version.
async fn query_records(backend: &dyn CrmBackend, query: String) -> Value {
    let validation = validate_query(&query);

    let formatted = match (&validation.formatted_query, validation.valid) {
        (Some(formatted), true) => formatted.clone(),
        _ => {
            info!(errors = validation.errors.len(), "COQL query rejected");
            return json!({
                "success": false,
                "error": "INVALID_QUERY",
                "message": "Query validation failed",
                "details": {
                    "original_query": query,
                    "errors": validation.errors,
                    "warnings": validation.warnings,
                }
            });
        }
    };

    let mut envelope = backend.query(formatted).await;
    if let Some(obj) = envelope.as_object_mut() {
        obj.insert(
            "validation".to_string(),
            serde_json::to_value(&validation).unwrap_or_default(),
        );
    }
    envelope
}

/// Definitions of the whole catalogue, in registration order.
pub fn definitions() -> Vec<ToolDefinition> {
    ALL_OPS.iter().map(|op| op.definition()).collect()
}

/// Register the nine CRM tools against `backend`.
pub fn register_crm_tools(registry: &mut ToolRegistry, backend: Arc<dyn CrmBackend>) {
    for op in ALL_OPS {
        registry.register(
            op.definition(),
            Arc::new(CrmTool {
                op,
                backend: backend.clone(),
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definitions_are_objects_with_required_keys() {
        for op in ALL_OPS {
            let def = op.definition();
            assert_eq!(def.name, op.name());
            assert_eq!(def.parameters["type"], "object", "{}", def.name);
            let props = def.parameters["properties"].as_object().unwrap();
            for key in def.parameters["required"].as_array().into_iter().flatten() {
                assert!(props.contains_key(key.as_str().unwrap()), "{}", def.name);
            }
        }
    }

    #[test]
    fn test_catalogue_definitions() {
        let defs = definitions();
        assert_eq!(defs.len(), ALL_OPS.len());
        assert_eq!(defs[0].name, GET_FIELDS);
    }

    #[test]
    fn test_names_unique() {
        let mut names: Vec<_> = ALL_OPS.iter().map(|op| op.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 9);
    }

    #[test]
    fn test_require_records() {
        assert!(require_records("t", &json!({"data": [{"a": 1}]}), false).is_ok());
        assert!(require_records("t", &json!({"data": []}), false).is_err());
        assert!(require_records("t", &json!({"rows": []}), false).is_err());
        assert!(require_records("t", &json!({"data": [{"id": "1"}, {"a": 2}]}), true).is_err());

        let many: Vec<Value> = (0..101).map(|i| json!({"id": i.to_string()})).collect();
        let err = require_records("t", &json!({"data": many}), true).unwrap_err();
        assert!(err.to_string().contains("101"));
    }
}
