//! COQL query validation and normalization.
//!
//! Every query the model wants to run goes through [`validate_query`] before it
//! reaches the CRM. The validator is a fixed, ordered pipeline of small passes
//! over a [`Draft`]; each pass either rewrites the query text, records an error
//! or warning, or rejects the query outright.
//!
//! ```text
//! raw ─▶ wildcard ─▶ keywords ─▶ default WHERE ─▶ wrap WHERE ─▶ id field
//!        (reject)                                              │
//!   ┌──────────────────────────────────────────────────────────┘
//!   └─▶ quotes ─▶ null ─▶ date functions ─▶ datetimes ─▶ structure ─▶ result
//! ```
//!
//! Order matters: later passes see the output of earlier ones. Running the
//! validator on its own `formatted_query` is stable: a valid query stays valid
//! and no new warnings appear.

mod passes;

use serde::{Deserialize, Serialize};
use tracing::trace;

pub use passes::PIPELINE;

/// Verdict for one candidate query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryValidationResult {
    /// `true` iff `errors` is empty.
    pub valid: bool,
    /// Best-effort rewritten query; `None` only for outright rejections.
    pub formatted_query: Option<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Intermediate state threaded through the passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub query: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Draft {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }
}

/// What the pipeline does after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop immediately; no formatted query is produced.
    Reject,
}

/// A named step of the pipeline.
#[derive(Clone, Copy)]
pub struct Pass {
    pub name: &'static str,
    pub run: fn(&mut Draft) -> Flow,
}

impl std::fmt::Debug for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pass").field("name", &self.name).finish()
    }
}

/// Validate and normalize a COQL query.
pub fn validate_query(query: &str) -> QueryValidationResult {
    let mut draft = Draft::new(query.trim());

    for pass in PIPELINE {
        let flow = (pass.run)(&mut draft);
        trace!(pass = pass.name, query = %draft.query, "coql pass");
        if flow == Flow::Reject {
            return QueryValidationResult {
                valid: false,
                formatted_query: None,
                errors: draft.errors,
                warnings: draft.warnings,
            };
        }
    }

    QueryValidationResult {
        valid: draft.errors.is_empty(),
        formatted_query: Some(draft.query),
        errors: draft.errors,
        warnings: draft.warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_wildcard_rejected_without_other_rules() {
        let result = validate_query("SELECT * FROM Leads");
        assert!(!result.valid);
        assert_eq!(result.formatted_query, None);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("SELECT *"));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_wildcard_rejected_case_insensitive() {
        let result = validate_query("  select   *  from Contacts where id is not null");
        assert!(!result.valid);
        assert_eq!(result.formatted_query, None);
    }

    #[test]
    fn test_id_and_combinator_normalized() {
        let result =
            validate_query("SELECT Id, Name FROM Leads WHERE Name = 'Bob' AND Status = 'Open'");
        assert!(result.valid, "{:?}", result.errors);
        assert_eq!(
            result.formatted_query.as_deref(),
            Some("SELECT id, Name FROM Leads WHERE (Name = 'Bob' and Status = 'Open')")
        );
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn test_literal_case_preserved() {
        let result = validate_query(
            "SELECT id FROM Leads WHERE Status = 'NOT Contacted' AND Owner IS NULL",
        );
        assert!(result.valid, "{:?}", result.errors);
        assert_eq!(
            result.formatted_query.as_deref(),
            Some("SELECT id FROM Leads WHERE (Status = 'NOT Contacted' and Owner is null)")
        );
    }

    #[test]
    fn test_default_where_inserted() {
        let result = validate_query("SELECT id FROM Leads");
        assert!(result.valid);
        assert_eq!(
            result.formatted_query.as_deref(),
            Some("SELECT id FROM Leads WHERE id is not null")
        );
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_default_where_before_limit() {
        let result = validate_query("SELECT Last_Name FROM Contacts LIMIT 5");
        assert_eq!(
            result.formatted_query.as_deref(),
            Some("SELECT Last_Name FROM Contacts WHERE id is not null LIMIT 5")
        );
    }

    #[test]
    fn test_iso_datetime_accepted() {
        let result =
            validate_query("SELECT id FROM Leads WHERE Created_Time >= '2024-12-20T00:00:00Z'");
        assert!(result.valid, "{:?}", result.errors);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_spaced_datetime_rejected() {
        let result =
            validate_query("SELECT id FROM Leads WHERE Created_Time >= '2024-12-20 00:00:00'");
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("'2024-12-20 00:00:00'"));
        assert!(result.formatted_query.is_some());
    }

    #[test]
    fn test_forbidden_date_function() {
        let result = validate_query("SELECT id FROM Leads WHERE CURRENT_DATE() > id");
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("CURRENT_DATE()")));
    }

    #[test]
    fn test_missing_from_is_structural_error() {
        let result = validate_query("SELECT id, Name");
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.formatted_query.as_deref(), Some("SELECT id, Name"));
    }

    #[test]
    fn test_double_quotes_and_nulls() {
        let result = validate_query(
            r#"SELECT Last_Name FROM Leads WHERE Lead_Source = "Web Form" AND Email != NULL"#,
        );
        assert!(result.valid, "{:?}", result.errors);
        assert_eq!(
            result.formatted_query.as_deref(),
            Some("SELECT Last_Name FROM Leads WHERE (Lead_Source = 'Web Form' and Email is not null)")
        );
    }

    #[test]
    fn test_quoted_literals_keep_their_case() {
        let result =
            validate_query("SELECT id FROM Leads WHERE Lead_Status = 'Not Contacted' OR Lead_Status = 'In Progress'");
        let formatted = result.formatted_query.unwrap();
        assert!(formatted.contains("'Not Contacted'"));
        assert!(formatted.contains("'In Progress'"));
        assert!(formatted.contains(" or "));
    }

    #[test]
    fn test_result_serializes_in_envelope_shape() {
        let value = serde_json::to_value(validate_query("SELECT * FROM Deals")).unwrap();
        assert_eq!(value["valid"], false);
        assert!(value["formatted_query"].is_null());
        assert!(value["errors"].is_array());
        assert!(value["warnings"].is_array());
    }

    #[test]
    fn test_second_pass_is_stable() {
        let queries = [
            "SELECT Id, Name FROM Leads WHERE Name = 'Bob' AND Status = 'Open'",
            "SELECT id FROM Leads",
            "select Full_Name from Contacts where Email = null or Phone <> null order by Full_Name limit 10",
            r#"SELECT Deal_Name FROM Deals WHERE Stage IN ("Closed Won", "Closed Lost")"#,
            "SELECT id FROM Leads WHERE (a = 1) AND (b = 2)",
            "SELECT id FROM Leads WHERE Created_Time between '2024-01-01T00:00:00Z' and '2024-02-01T00:00:00Z'",
        ];
        for query in queries {
            let first = validate_query(query);
            let formatted = first.formatted_query.clone().unwrap();
            let second = validate_query(&formatted);
            assert!(second.valid || !first.valid, "{query} became invalid");
            assert_eq!(second.formatted_query.as_deref(), Some(formatted.as_str()));
            assert!(
                second.warnings.iter().all(|w| first.warnings.contains(w)),
                "{query}: new warnings {:?}",
                second.warnings
            );
        }
    }
}
