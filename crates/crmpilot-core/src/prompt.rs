//! Base system prompt.
//!
//! The prompt text is static (built in, or read from `system_prompt_file`),
//! followed by a block rendered fresh on every model turn with the operator's
//! local time and today's boundaries as COQL-ready UTC literals.

use chrono::{DateTime, FixedOffset, NaiveTime, Offset, TimeDelta, Utc};

const BUILTIN: &str = "\
You are a CRM operations assistant with tools for reading and changing Zoho CRM data.

Query rules (COQL):
- Always list fields explicitly. SELECT * is rejected.
- Record identifiers are always the lowercase field `id`, never `Id` or `Lead_ID`.
- Use lowercase operators: and, or, in, like, between, is null.
- Datetime values are literals in the form 'YYYY-MM-DDTHH:MM:SSZ'. Date functions \
such as CURRENT_DATE(), TODAY() or NOW() do not exist; use the UTC boundaries given below.
- Lookup fields are selected with dot notation, for example Account_Name.id.

Working rules:
- Call get_fields_tool at most once per module and reuse what it returned.
- Fetch lookup ids with a query instead of asking the user for them.
- Before send_mail_tool, show the complete draft and wait for the user to approve it.
- Discount values are amounts, not percentages. To apply a percentage, send it as a string such as \"10%\".
- After three failed attempts at the same operation, stop and explain the problem.

Answer concisely. Use tables for query results and always show record ids.";

/// The base system prompt plus the operator's time zone.
#[derive(Debug, Clone)]
pub struct BasePrompt {
    template: String,
    offset: FixedOffset,
}

impl BasePrompt {
    /// The built-in prompt.
    pub fn builtin(utc_offset_minutes: i32) -> Self {
        Self::new(BUILTIN, utc_offset_minutes)
    }

    pub fn new(template: impl Into<String>, utc_offset_minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix());
        Self {
            template: template.into(),
            offset,
        }
    }

    /// Load the prompt named by `[agent]`, falling back to the built-in one.
    pub async fn from_config(config: &crmpilot_config::AgentConfig) -> std::io::Result<Self> {
        match &config.system_prompt_file {
            Some(path) => {
                let text = tokio::fs::read_to_string(path).await?;
                Ok(Self::new(text.trim_end(), config.utc_offset_minutes))
            }
            None => Ok(Self::builtin(config.utc_offset_minutes)),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Render the prompt for a turn happening at `now`.
    pub fn render(&self, now: DateTime<Utc>) -> String {
        let local = now.with_timezone(&self.offset);
        let today = local.date_naive();

        let start = today.and_time(NaiveTime::MIN)
            - TimeDelta::seconds(self.offset.local_minus_utc().into());
        let end = start + TimeDelta::seconds(86_399);
        let utc = |t: chrono::NaiveDateTime| t.and_utc().format("%Y-%m-%dT%H:%M:%SZ").to_string();

        format!(
            "{template}\n\n\
             Current local time: {now}\n\
             Today's date: {today}\n\
             Today in UTC: from {start} to {end}",
            template = self.template,
            now = local.format("%Y-%m-%d %H:%M:%S %:z"),
            today = today.format("%Y-%m-%d"),
            start = utc(start),
            end = utc(end),
        )
    }
}

/// Render the built-in prompt for `now` in the given time zone.
pub fn base_prompt(now: DateTime<Utc>, utc_offset_minutes: i32) -> String {
    BasePrompt::builtin(utc_offset_minutes).render(now)
}
