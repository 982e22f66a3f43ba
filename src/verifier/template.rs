//! Template-driven verification.
//!
//! A template maps each allowed top-level key to its rules:
//!
//! - `MUST: "a,b"`: fields that must be present and non-null.
//! - `REFUSE: "c"`: fields that must be absent; `"!"` refuses every plain
//!   field not listed in `MUST`.
//!
//! Access is checked against a table → method → roles map; tables without an
//! entry are open to every role.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{StructureLoadError, Verifier, VerifyError, ROLE_UNKNOWN};
use crate::executor::QueryDescriptor;
use crate::request::keys::{is_array_key, is_table_key, parse_entry, split_list, KEY_ID, KEY_ID_IN};
use crate::request::{JsonMap, RequestMethod};

const RULE_MUST: &str = "MUST";
const RULE_REFUSE: &str = "REFUSE";
const REFUSE_ALL: &str = "!";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateVerifier {
    #[serde(default)]
    pub access: HashMap<String, HashMap<RequestMethod, Vec<String>>>,
}

impl TemplateVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(mut self, table: &str, method: RequestMethod, roles: &[&str]) -> Self {
        self.access
            .entry(table.to_string())
            .or_default()
            .insert(method, roles.iter().map(|r| r.to_string()).collect());
        self
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, StructureLoadError> {
        serde_yaml::from_str(content).map_err(|e| StructureLoadError::Yaml(e.to_string()))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, StructureLoadError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            StructureLoadError::Io(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    fn check_rules(
        method: RequestMethod,
        key: &str,
        object: &JsonMap,
        rules: &JsonMap,
        max_update_count: usize,
    ) -> Result<(), VerifyError> {
        let must: Vec<&str> = rules
            .get(RULE_MUST)
            .and_then(Value::as_str)
            .map(split_list)
            .unwrap_or_default();
        for field in &must {
            if object.get(*field).is_none_or(Value::is_null) {
                return Err(VerifyError::Invalid(format!("{} must contain {}", key, field)));
            }
        }

        let refuse = rules
            .get(RULE_REFUSE)
            .and_then(Value::as_str)
            .map(split_list)
            .unwrap_or_default();
        let refuse_all = refuse.contains(&REFUSE_ALL);
        for field in object.keys() {
            let plain = !field.starts_with('@') && !field.ends_with('@');
            if refuse.contains(&field.as_str()) || (refuse_all && plain && !must.contains(&field.as_str())) {
                return Err(VerifyError::Forbidden(format!("{}/{} is refused", key, field)));
            }
        }

        if matches!(method, RequestMethod::Put | RequestMethod::Delete) {
            match (object.get(KEY_ID), object.get(KEY_ID_IN)) {
                (Some(id), _) if !id.is_null() => {}
                (_, Some(Value::Array(ids))) => {
                    if ids.len() > max_update_count {
                        return Err(VerifyError::Forbidden(format!(
                            "{}/{} holds {} ids, which exceeds the limit of {}",
                            key,
                            KEY_ID_IN,
                            ids.len(),
                            max_update_count
                        )));
                    }
                }
                _ => {
                    return Err(VerifyError::Invalid(format!(
                        "{} {} needs {} or {}",
                        method, key, KEY_ID, KEY_ID_IN
                    )))
                }
            }
        }
        Ok(())
    }
}

impl Verifier for TemplateVerifier {
    fn verify_request(
        &self,
        method: RequestMethod,
        name: &str,
        template: &JsonMap,
        request: &JsonMap,
        max_update_count: usize,
        database: Option<&str>,
        schema: Option<&str>,
    ) -> Result<JsonMap, VerifyError> {
        log::debug!(
            "verify {} {} against {} key(s) (database={:?}, schema={:?})",
            method,
            if name.is_empty() { "/" } else { name },
            template.len(),
            database,
            schema
        );
        let mut verified = JsonMap::new();
        for (key, value) in request {
            let is_node = is_array_key(key) || is_table_key(parse_entry(key).0);
            if !is_node || !value.is_object() {
                verified.insert(key.clone(), value.clone());
                continue;
            }
            let rules = template
                .get(key)
                .and_then(Value::as_object)
                .ok_or_else(|| VerifyError::Forbidden(format!("{} is not allowed in {}", key, method)))?;
            if let Some(object) = value.as_object().filter(|_| !is_array_key(key)) {
                Self::check_rules(method, key, object, rules, max_update_count)?;
            }
            verified.insert(key.clone(), value.clone());
        }
        Ok(verified)
    }

    fn verify_access(&self, query: &QueryDescriptor) -> Result<(), VerifyError> {
        let Some(methods) = self.access.get(&query.table) else {
            return Ok(());
        };
        let role = query.role.as_deref().unwrap_or(ROLE_UNKNOWN);
        let allowed = methods
            .get(&query.method)
            .is_some_and(|roles| roles.iter().any(|r| r == role));
        if allowed {
            return Ok(());
        }
        if role == ROLE_UNKNOWN {
            Err(VerifyError::Access(format!(
                "{} {} needs a login",
                query.method, query.table
            )))
        } else {
            Err(VerifyError::Forbidden(format!(
                "role {} may not {} {}",
                role, query.method, query.table
            )))
        }
    }
}
