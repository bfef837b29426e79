//! Query template registry
//!
//! Maps a symbolic query type to a parameterized Cypher query. Templates are
//! parsed once from a sectioned text file and validated against the entity
//! slots the intent classifier can fill.

mod defaults;
mod parser;
mod registry;

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::graph::Params;

pub use defaults::DefaultQuery;
pub use parser::{ParsedSection, QUERY_KEYWORDS, normalize_identifier, parse_sections};
pub use registry::{TemplateRegistry, TemplateSource};

/// Entity slots the classifier is allowed to produce
pub const ENTITY_SLOTS: [&str; 7] = [
    "university_name",
    "level",
    "field",
    "exam_type",
    "max_score",
    "subclass",
    "keyword",
];

/// Whether `name` is one of [`ENTITY_SLOTS`]
pub fn is_entity_slot(name: &str) -> bool {
    ENTITY_SLOTS.contains(&name)
}

/// One named, parameterized graph query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryTemplate {
    pub name: String,
    pub body: String,
    /// `$name` references found in the body
    pub parameters: BTreeSet<String>,
}

impl QueryTemplate {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        let body = body.into();
        let parameters = extract_parameters(&body);
        Self {
            name: name.into(),
            body,
            parameters,
        }
    }

    /// Parameters the classifier can never supply
    pub fn unsupported_parameters(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .map(String::as_str)
            .filter(|p| !is_entity_slot(p))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        let unsupported = self.unsupported_parameters();
        if unsupported.is_empty() {
            Ok(())
        } else {
            Err(Error::TemplateError(format!(
                "template '{}' references unknown parameters: {}",
                self.name,
                unsupported.join(", ")
            )))
        }
    }

    /// Parameters referenced by the body but absent from `params`
    pub fn missing_parameters(&self, params: &Params) -> Vec<String> {
        self.parameters
            .iter()
            .filter(|p| !params.contains_key(p.as_str()))
            .cloned()
            .collect()
    }

    /// Subset of `params` this template references
    ///
    /// Fails with [`Error::MissingParameters`] if any reference is unbound.
    pub fn bind(&self, params: &Params) -> Result<Params> {
        let missing = self.missing_parameters(params);
        if !missing.is_empty() {
            return Err(Error::MissingParameters {
                query_type: self.name.clone(),
                missing,
            });
        }

        Ok(params
            .iter()
            .filter(|(k, _)| self.parameters.contains(k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

impl From<DefaultQuery> for QueryTemplate {
    fn from(query: DefaultQuery) -> Self {
        QueryTemplate::new(query.as_str(), query.body())
    }
}

/// Collect `$identifier` references from a Cypher body
fn extract_parameters(body: &str) -> BTreeSet<String> {
    let mut params = BTreeSet::new();
    let mut chars = body.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c != '$' {
            continue;
        }
        let start = i + 1;
        let mut end = start;
        while let Some(&(j, next)) = chars.peek() {
            if next.is_alphanumeric() || next == '_' {
                end = j + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        if end > start {
            params.insert(body[start..end].to_string());
        }
    }

    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, serde_json::Value)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_extract_parameters() {
        let template = QueryTemplate::new(
            "t",
            "MATCH (u {name: $university_name})-->(l {name:$level}) WHERE x = $level RETURN u",
        );
        let names: Vec<_> = template.parameters.iter().map(String::as_str).collect();
        assert_eq!(names, vec!["level", "university_name"]);
    }

    #[test]
    fn test_lone_dollar_is_not_a_parameter() {
        let template = QueryTemplate::new("t", "RETURN '$' AS sign, $ AS x");
        assert!(template.parameters.is_empty());
    }

    #[test]
    fn test_validate_rejects_unknown_slot() {
        let template = QueryTemplate::new("bad", "MATCH (n {id: $node_id}) RETURN n");
        assert_eq!(template.unsupported_parameters(), vec!["node_id"]);
        assert!(matches!(template.validate(), Err(Error::TemplateError(_))));
    }

    #[test]
    fn test_defaults_are_valid() {
        for query in DefaultQuery::ALL {
            let template = QueryTemplate::from(query);
            assert!(template.validate().is_ok(), "{} should be valid", query);
            assert!(!template.parameters.is_empty());
        }
    }

    #[test]
    fn test_bind_keeps_only_referenced_parameters() {
        let template = QueryTemplate::from(DefaultQuery::VisaInfo);
        let bound = template
            .bind(&params(&[
                ("subclass", json!("500")),
                ("keyword", json!("housing")),
            ]))
            .unwrap();
        assert_eq!(bound.len(), 1);
        assert_eq!(bound["subclass"], json!("500"));
    }

    #[test]
    fn test_bind_reports_missing() {
        let template = QueryTemplate::from(DefaultQuery::FindProgramsByUniversity);
        let err = template
            .bind(&params(&[("university_name", json!("Monash University"))]))
            .unwrap_err();
        match err {
            Error::MissingParameters {
                query_type,
                missing,
            } => {
                assert_eq!(query_type, "find_programs_by_university");
                assert_eq!(missing, vec!["level".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
