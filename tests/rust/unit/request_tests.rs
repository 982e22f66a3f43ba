//! Unit tests for key conventions, methods and response shaping

#[cfg(test)]
mod request_tests {
    use apitree::request::keys::{is_array_key, is_reference_key, is_table_key, parse_entry};
    use apitree::request::{QueryMode, RequestMethod};
    use apitree::resolver::depth_guard::DepthGuard;
    use apitree::resolver::response::{error, format_keys, success};
    use apitree::resolver::ResolveError;
    use serde_json::json;
    use test_case::test_case;

    #[test_case("User", true, false, false; "table")]
    #[test_case("User:owner", false, false, false; "aliased table as written")]
    #[test_case("Moment[]", false, true, false; "array")]
    #[test_case("[]", false, true, false; "anonymous array")]
    #[test_case("userId@", false, false, true; "reference")]
    #[test_case("@column", false, false, false; "directive")]
    fn test_key_classification(key: &str, table: bool, array: bool, reference: bool) {
        assert_eq!(is_table_key(key), table);
        assert_eq!(is_array_key(key), array);
        assert_eq!(is_reference_key(key), reference);
    }

    #[test]
    fn test_aliased_table_resolves_to_its_table() {
        let (table, alias) = parse_entry("User:owner");
        assert!(is_table_key(table));
        assert_eq!(alias, Some("owner"));
    }

    #[test_case(RequestMethod::Get, true, true; "get")]
    #[test_case(RequestMethod::Head, true, true; "head")]
    #[test_case(RequestMethod::Gets, true, false; "gets")]
    #[test_case(RequestMethod::Heads, true, false; "heads")]
    #[test_case(RequestMethod::Post, false, false; "post")]
    #[test_case(RequestMethod::Crud, false, false; "crud")]
    fn test_method_properties(method: RequestMethod, query: bool, public: bool) {
        assert_eq!(method.is_query(), query);
        assert_eq!(method.is_public(), public);
        assert_eq!(method.is_mutation(), !query);
        assert_eq!(method.as_str().parse::<RequestMethod>(), Ok(method));
    }

    #[test]
    fn test_method_names_are_case_sensitive() {
        assert!("get".parse::<RequestMethod>().is_err());
        assert_eq!(RequestMethod::from_meta_key("@put"), Some(RequestMethod::Put));
        assert_eq!(RequestMethod::from_meta_key("@crud"), None);
    }

    #[test]
    fn test_query_mode_accepts_names_and_digits() {
        assert_eq!(QueryMode::parse("ALL"), Some(QueryMode::All));
        assert_eq!(QueryMode::parse("1"), Some(QueryMode::Total));
        assert_eq!(QueryMode::parse("all"), None);
    }

    #[test]
    fn test_depth_only_counts_first_rows() {
        let mut guard = DepthGuard::new(3);
        guard.enter("", "", 0).unwrap();
        guard.enter("[]", "0", 0).unwrap();
        guard.enter("[]/0", "User", 0).unwrap();
        // Deeper rows past position 0 are not measured again.
        guard.enter("[]/1/User/Comment", "x", 1).unwrap();
        assert_eq!(guard.deepest(), 3);
        let err = guard.enter("[]/0/User", "Comment", 0).unwrap_err();
        assert_eq!(err.code(), 400);
    }

    #[test]
    fn test_envelopes() {
        let body = json!({"User": {"id": 1}}).as_object().cloned().unwrap();
        let ok = success(body, Some("User: skipped".into()));
        assert_eq!(ok["ok"], json!(true));
        assert_eq!(ok["warn"], json!("User: skipped"));

        let err = error(&ResolveError::ResourceExhausted("too many statements".into()));
        assert_eq!(
            serde_json::Value::Object(err),
            json!({"ok": false, "code": 429, "msg": "too many statements"})
        );
    }

    #[test]
    fn test_format_keys_rewrites_nested_arrays() {
        let body = json!({
            "Moment:latest": {"id": 1},
            "User-name[]": ["alice"],
            "[]": [{"Comment": {"id": 2}}]
        });
        let formatted = format_keys(body.as_object().cloned().unwrap());
        assert_eq!(
            serde_json::Value::Object(formatted),
            json!({
                "latest": {"id": 1},
                "userNameList": ["alice"],
                "[]": [{"comment": {"id": 2}}]
            })
        );
    }
}
