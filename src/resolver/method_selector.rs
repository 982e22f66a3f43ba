//! Per-key method selection and content verification of non-public
//! requests.
//!
//! Under `CRUD`, selectors such as `"@post": "Moment"` or
//! `"@put": {"Comment": {"tag": "Comment", "version": 2}}` pick the method of
//! each top-level key. Every non-public key is then checked against the
//! template its tag names.

use std::collections::HashMap;

use serde_json::Value;

use super::errors::ResolveError;
use crate::config::ResolverConfig;
use crate::request::keys::{
    is_array_key, is_table_key, parse_entry, split_list, ARRAY_SUFFIX, KEY_COMBINE, KEY_DATABASE,
    KEY_DATASOURCE, KEY_METHOD, KEY_ROLE, KEY_SCHEMA, KEY_TAG, KEY_VERSION,
};
use crate::request::{get_int, get_string, JsonMap, RequestMethod};
use crate::verifier::{StructureSource, Verifier};

/// Attributes a selector assigns to one top-level key.
#[derive(Debug, Clone, PartialEq)]
struct KeyAttributes {
    method: RequestMethod,
    tag: String,
    version: Option<i64>,
    role: Option<String>,
    database: Option<String>,
    schema: Option<String>,
    datasource: Option<String>,
}

impl KeyAttributes {
    /// Copies the attributes into `object` where it has none of its own.
    fn apply(&self, object: &mut JsonMap) {
        let mut put = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                object.entry(key.to_string()).or_insert(value);
            }
        };
        put(KEY_METHOD, Some(Value::from(self.method.as_str())));
        put(KEY_ROLE, self.role.clone().map(Value::from));
        put(KEY_DATABASE, self.database.clone().map(Value::from));
        put(KEY_SCHEMA, self.schema.clone().map(Value::from));
        put(KEY_DATASOURCE, self.datasource.clone().map(Value::from));
    }
}

/// Verifies `request` sent with `method` and returns the corrected request:
/// selectors removed, every top-level object carrying its `@method`.
pub fn batch_verify(
    method: RequestMethod,
    tag: Option<&str>,
    version: i64,
    request: &JsonMap,
    config: &ResolverConfig,
    structures: &dyn StructureSource,
    verifier: &dyn Verifier,
) -> Result<JsonMap, ResolveError> {
    if request.is_empty() {
        return Err(ResolveError::structure("the request must not be empty"));
    }
    let is_crud = method == RequestMethod::Crud;
    let attributes = selector_attributes(method, request)?;

    let mut corrected = JsonMap::new();
    for (key, value) in request {
        if RequestMethod::from_meta_key(key).is_some() {
            continue;
        }
        if corrected.contains_key(key) || corrected.contains_key(&format!("{}{}", key, ARRAY_SUFFIX)) {
            return Err(ResolveError::Conflict(format!("{} appears more than once", key)));
        }

        let mut value = value.clone();
        let own = attributes.get(key);
        if let Value::Object(object) = &mut value {
            match own.or_else(|| attributes.get(&format!("{}{}", key, ARRAY_SUFFIX))) {
                Some(attrs) => attrs.apply(object),
                None => {
                    let default = if is_crud || key.ends_with('@') {
                        RequestMethod::Get
                    } else {
                        method
                    };
                    object
                        .entry(KEY_METHOD.to_string())
                        .or_insert_with(|| Value::from(default.as_str()));
                }
            }
        }

        if key.starts_with('@') || key.ends_with('@') {
            corrected.insert(key.clone(), value);
            continue;
        }

        let key_method = match &value {
            Value::Object(object) => {
                let key_method = match get_string(object, KEY_METHOD)? {
                    Some(m) => m.parse().map_err(|e| {
                        ResolveError::Structure(format!("{}/{}: {}", key, KEY_METHOD, e))
                    })?,
                    None => method,
                };
                if object.contains_key(KEY_COMBINE) && !key_method.is_public() {
                    return Err(ResolveError::Structure(format!(
                        "{}/{} is only allowed under GET and HEAD, not {}",
                        key, KEY_COMBINE, key_method
                    )));
                }
                key_method
            }
            Value::Array(_) => own.map_or(if is_crud { RequestMethod::Get } else { method }, |a| a.method),
            _ => {
                corrected.insert(key.clone(), value);
                continue;
            }
        };

        if !is_crud && key_method != method {
            return Err(ResolveError::Structure(format!(
                "{}: {} is not allowed in a {} request",
                key, key_method, method
            )));
        }
        if key_method.is_public() || !config.verify_content {
            corrected.insert(key.clone(), value);
            continue;
        }

        if let Some(tag) = tag.filter(|t| !is_crud && !t.is_empty()) {
            let template = template_for(structures, key_method, tag, version)?;
            let whole = whole_request(request, &corrected, key, &value);
            let verified = verifier.verify_request(
                key_method,
                "",
                &template,
                &whole,
                config.max_update_count,
                None,
                None,
            )?;
            for (k, v) in verified {
                corrected.insert(k, v);
            }
            return Ok(finish(corrected, request));
        }

        let (key_tag, key_version) = match own {
            Some(attrs) => (attrs.tag.clone(), attrs.version.unwrap_or(version)),
            None if is_crud => (key.clone(), version),
            None => {
                return Err(ResolveError::Structure(format!(
                    "tag is required for a {} request",
                    method
                )))
            }
        };
        let template = template_for(structures, key_method, &key_tag, key_version)?;
        let mut single = JsonMap::new();
        single.insert(key.clone(), value.clone());
        let mut verified = verifier.verify_request(
            key_method,
            key,
            &template,
            &single,
            config.max_update_count,
            own.and_then(|a| a.database.as_deref()),
            own.and_then(|a| a.schema.as_deref()),
        )?;
        corrected.insert(key.clone(), verified.remove(key).unwrap_or(value));
    }
    Ok(corrected)
}

/// Keys not yet visited keep their original values.
fn finish(mut corrected: JsonMap, request: &JsonMap) -> JsonMap {
    for (k, v) in request {
        if RequestMethod::from_meta_key(k).is_none() && !corrected.contains_key(k) {
            corrected.insert(k.clone(), v.clone());
        }
    }
    corrected
}

/// The whole request as verified under one tag: corrected keys so far, the
/// current key, and the rest as sent.
fn whole_request(request: &JsonMap, corrected: &JsonMap, key: &str, value: &Value) -> JsonMap {
    let mut whole = corrected.clone();
    whole.insert(key.to_string(), value.clone());
    finish(whole, request)
}

fn template_for(
    structures: &dyn StructureSource,
    method: RequestMethod,
    tag: &str,
    version: i64,
) -> Result<JsonMap, ResolveError> {
    let structure = structures.structure(method, tag, version).ok_or_else(|| {
        ResolveError::Forbidden(format!(
            "no request structure for {} tag:{} version:{}",
            method, tag, version
        ))
    })?;
    Ok(wrap_structure(tag, structure))
}

/// A structure stored for `Moment` may omit its own key; wrap it so it
/// matches the request shape.
fn wrap_structure(tag: &str, structure: JsonMap) -> JsonMap {
    if structure.contains_key(tag) {
        return structure;
    }
    let key = tag.strip_suffix(":[]").unwrap_or(tag);
    if is_array_key(key) || !is_table_key(parse_entry(key).0) {
        return structure;
    }
    let mut wrapped = JsonMap::new();
    wrapped.insert(key.to_string(), Value::Object(structure));
    wrapped
}

/// Reads every `@get`..`@delete` selector of the request.
fn selector_attributes(
    method: RequestMethod,
    request: &JsonMap,
) -> Result<HashMap<String, KeyAttributes>, ResolveError> {
    let mut attributes: HashMap<String, KeyAttributes> = HashMap::new();
    for (selector, value) in request {
        let Some(key_method) = RequestMethod::from_meta_key(selector) else {
            continue;
        };
        if method != RequestMethod::Crud {
            log::warn!("{} is ignored outside CRUD requests", selector);
            continue;
        }

        let entries: JsonMap = match value {
            Value::String(list) => {
                let mut entries = JsonMap::new();
                for key in split_list(list) {
                    if entries.contains_key(key) {
                        return Err(ResolveError::Conflict(format!(
                            "{} lists {} more than once",
                            selector, key
                        )));
                    }
                    let default_tag = match key.strip_suffix(ARRAY_SUFFIX) {
                        Some(table) if key_method == RequestMethod::Post => format!("{}:[]", table),
                        _ => String::new(),
                    };
                    entries.insert(key.to_string(), Value::from(default_tag));
                }
                entries
            }
            Value::Object(map) => map.clone(),
            _ => {
                return Err(ResolveError::Structure(format!(
                    "{} must be a comma-separated list or an object",
                    selector
                )))
            }
        };

        for (key, entry) in entries {
            if attributes.contains_key(&key) {
                return Err(ResolveError::Conflict(format!(
                    "{} is selected by more than one method",
                    key
                )));
            }
            let default_tag = match key.strip_suffix(ARRAY_SUFFIX) {
                Some(table) if key_method == RequestMethod::Post => format!("{}:[]", table),
                _ => key.clone(),
            };
            let attrs = match entry {
                Value::String(tag) => KeyAttributes {
                    method: key_method,
                    tag: if tag.is_empty() { default_tag } else { tag },
                    version: None,
                    role: None,
                    database: None,
                    schema: None,
                    datasource: None,
                },
                Value::Object(ref object) => KeyAttributes {
                    method: key_method,
                    tag: get_string(object, KEY_TAG)?.unwrap_or(default_tag),
                    version: get_int(object, KEY_VERSION)?,
                    role: get_string(object, KEY_ROLE)?,
                    database: get_string(object, KEY_DATABASE)?,
                    schema: get_string(object, KEY_SCHEMA)?,
                    datasource: get_string(object, KEY_DATASOURCE)?,
                },
                _ => {
                    return Err(ResolveError::Structure(format!(
                        "{}/{} must be a tag string or an attribute object",
                        selector, key
                    )))
                }
            };
            attributes.insert(key, attrs);
        }
    }
    Ok(attributes)
}
