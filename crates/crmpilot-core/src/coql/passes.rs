//! The individual validator passes, in pipeline order.
//!
//! Rewrites that touch keywords or `null` comparisons only look at text
//! outside quoted literals, so values such as `'Not Contacted'` survive
//! untouched.

use std::sync::LazyLock;

use regex::Regex;

use super::{Draft, Flow, Pass};

/// All passes, in the order they run.
pub const PIPELINE: &[Pass] = &[
    Pass {
        name: "reject_wildcard",
        run: reject_wildcard,
    },
    Pass {
        name: "lowercase_keywords",
        run: lowercase_keywords,
    },
    Pass {
        name: "default_where",
        run: default_where,
    },
    Pass {
        name: "wrap_where",
        run: wrap_where,
    },
    Pass {
        name: "select_fields",
        run: select_fields,
    },
    Pass {
        name: "single_quotes",
        run: single_quotes,
    },
    Pass {
        name: "null_comparisons",
        run: null_comparisons,
    },
    Pass {
        name: "forbidden_functions",
        run: forbidden_functions,
    },
    Pass {
        name: "datetime_literals",
        run: datetime_literals,
    },
    Pass {
        name: "structure",
        run: structure,
    },
];

static WILDCARD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bSELECT\s+\*\s+FROM\b").unwrap());
static KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:AND|OR|IN|NOT|IS|NULL|LIKE|BETWEEN)\b").unwrap()
});
static WHERE_KEYWORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bWHERE\b").unwrap());
static FROM_MODULE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bFROM\s+\w+").unwrap());
static WHERE_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\bWHERE\s+(.+?)(?:\s+ORDER\s+BY\b|\s+LIMIT\b|\s*$)").unwrap()
});
static COMBINATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b(?:and|or)\b").unwrap());
static SELECT_FIELDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\bSELECT\s+(.+?)\s+FROM\b").unwrap());
static ID_FIELD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bid\b").unwrap());
static SPACED_WORDS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+\s+\w+").unwrap());
static DOUBLE_QUOTED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""([^"]+)""#).unwrap());
static NOT_NULL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(?:!=|<>)\s*null\b").unwrap());
static EQ_NULL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(^|[^<>!=])\s*=\s*null\b").unwrap());
static DATETIME_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"'([0-9]{4}-[0-9]{2}-[0-9]{2}[ T][0-9]{2}:[0-9]{2}:[0-9]{2}Z?)'").unwrap()
});
static ISO_UTC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}Z$").unwrap()
});
static SELECT_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^\s*SELECT\s+.+\s+FROM\s+\w+").unwrap());

const FORBIDDEN_FUNCTIONS: &[&str] = &["current_date", "today", "now", "current_timestamp", "sysdate"];

static FORBIDDEN_CALLS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    FORBIDDEN_FUNCTIONS
        .iter()
        .map(|func| (*func, Regex::new(&format!(r"(?i)\b{func}\s*\(")).unwrap()))
        .collect()
});

/// Split `input` into `(quoted, text)` segments. Quoted segments keep their
/// delimiters; an unterminated quote runs to the end of the input.
fn split_quoted(input: &str) -> Vec<(bool, &str)> {
    let mut segments = Vec::new();
    let mut rest = input;
    while let Some(start) = rest.find(['\'', '"']) {
        if start > 0 {
            segments.push((false, &rest[..start]));
        }
        let quote = &rest[start..start + 1];
        let end = rest[start + 1..]
            .find(quote)
            .map(|i| start + 1 + i + 1)
            .unwrap_or(rest.len());
        segments.push((true, &rest[start..end]));
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        segments.push((false, rest));
    }
    segments
}

/// Apply `f` to every unquoted segment, copying quoted ones verbatim.
fn map_unquoted(input: &str, f: impl Fn(&str) -> String) -> String {
    split_quoted(input)
        .into_iter()
        .map(|(quoted, text)| if quoted { text.to_string() } else { f(text) })
        .collect()
}

/// Whether the whole clause is enclosed by one pair of matching parentheses.
fn is_fully_parenthesized(clause: &str) -> bool {
    if !clause.starts_with('(') || !clause.ends_with(')') {
        return false;
    }
    let mut depth = 0i32;
    let mut quote = None;
    for (i, c) in clause.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return i == clause.len() - 1;
                    }
                }
                _ => {}
            },
        }
    }
    false
}

fn reject_wildcard(draft: &mut Draft) -> Flow {
    if WILDCARD.is_match(&draft.query) {
        draft.error("SELECT * is not allowed in COQL. List the field API names explicitly.");
        return Flow::Reject;
    }
    Flow::Continue
}

/// Lowercases COQL keywords outside quoted literals. A literal such as
/// `'NOT Contacted'` is a field value and keeps its case.
fn lowercase_keywords(draft: &mut Draft) -> Flow {
    draft.query = map_unquoted(&draft.query, |text| {
        KEYWORDS
            .replace_all(text, |caps: &regex::Captures| caps[0].to_lowercase())
            .into_owned()
    });
    Flow::Continue
}

fn default_where(draft: &mut Draft) -> Flow {
    if WHERE_KEYWORD.is_match(&draft.query) {
        return Flow::Continue;
    }
    if let Some(from) = FROM_MODULE.find(&draft.query) {
        draft.query.insert_str(from.end(), " WHERE id is not null");
        draft.warn("Added default WHERE clause: 'id is not null'");
    }
    Flow::Continue
}

fn wrap_where(draft: &mut Draft) -> Flow {
    let Some(span) = WHERE_CLAUSE
        .captures(&draft.query)
        .and_then(|caps| caps.get(1))
        .map(|m| m.range())
    else {
        return Flow::Continue;
    };
    let clause = &draft.query[span.clone()];

    let combinators: usize = split_quoted(clause)
        .into_iter()
        .filter(|(quoted, _)| !quoted)
        .map(|(_, text)| COMBINATOR.find_iter(text).count())
        .sum();

    if combinators >= 1 && !is_fully_parenthesized(clause) {
        let wrapped = format!("({clause})");
        draft.query.replace_range(span, &wrapped);
        draft.warn("Wrapped WHERE conditions in parentheses");
    }
    Flow::Continue
}

fn select_fields(draft: &mut Draft) -> Flow {
    let Some(span) = SELECT_FIELDS
        .captures(&draft.query)
        .and_then(|caps| caps.get(1))
        .map(|m| m.range())
    else {
        return Flow::Continue;
    };
    let fields = draft.query[span.clone()].to_string();

    let updated = ID_FIELD.replace_all(&fields, "id").into_owned();
    if updated != fields {
        draft.query.replace_range(span, &updated);
        draft.warn("Replaced SELECT field 'Id' with lowercase 'id'");
    }

    if updated
        .split(',')
        .any(|field| SPACED_WORDS.is_match(field.trim()))
    {
        draft.warn("Possible field name containing a space; use the field API name");
    }
    Flow::Continue
}

fn single_quotes(draft: &mut Draft) -> Flow {
    let mut apostrophes = Vec::new();
    draft.query = DOUBLE_QUOTED
        .replace_all(&draft.query, |caps: &regex::Captures| {
            if caps[1].contains('\'') {
                apostrophes.push(caps[1].to_string());
            }
            format!("'{}'", &caps[1])
        })
        .into_owned();
    for literal in apostrophes {
        draft.warn(format!(
            "String literal \"{literal}\" contains a single quote; it ends the literal early once single-quoted"
        ));
    }
    if draft.query.contains('"') {
        draft.warn("Unmatched double quote left in query; COQL string literals use single quotes");
    }
    Flow::Continue
}

fn null_comparisons(draft: &mut Draft) -> Flow {
    draft.query = map_unquoted(&draft.query, |text| {
        let text = NOT_NULL.replace_all(text, " is not null");
        EQ_NULL.replace_all(&text, "${1} is null").into_owned()
    });
    Flow::Continue
}

fn forbidden_functions(draft: &mut Draft) -> Flow {
    let found: Vec<&str> = FORBIDDEN_CALLS
        .iter()
        .filter(|(_, re)| re.is_match(&draft.query))
        .map(|(func, _)| *func)
        .collect();
    for func in found {
        draft.error(format!(
            "Date/time function '{}()' is not allowed. Use an explicit ISO-8601 \
             datetime literal instead (YYYY-MM-DDTHH:MM:SSZ).",
            func.to_uppercase()
        ));
    }
    Flow::Continue
}

fn datetime_literals(draft: &mut Draft) -> Flow {
    let invalid: Vec<String> = DATETIME_LITERAL
        .captures_iter(&draft.query)
        .filter_map(|caps| caps.get(1))
        .filter(|m| !ISO_UTC.is_match(m.as_str()))
        .map(|m| format!("'{}'", m.as_str()))
        .collect();
    if !invalid.is_empty() {
        draft.error(format!(
            "Invalid datetime format. COQL requires ISO-8601 UTC (YYYY-MM-DDTHH:MM:SSZ). \
             Invalid values: {}",
            invalid.join(", ")
        ));
    }
    Flow::Continue
}

fn structure(draft: &mut Draft) -> Flow {
    if !FROM_MODULE.is_match(&draft.query) {
        draft.error("Invalid query: missing or invalid FROM clause");
    }
    if !SELECT_SHAPE.is_match(&draft.query) {
        draft.error("Invalid query structure: expected SELECT <fields> FROM <module>");
    }
    Flow::Continue
}
