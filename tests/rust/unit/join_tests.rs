//! Unit tests for join directive parsing against a recorded path index

#[cfg(test)]
mod join_tests {
    use apitree::request::JsonMap;
    use apitree::resolver::join_parser::{parse_joins, JoinType};
    use apitree::resolver::path_index::ReferenceLookup;
    use apitree::resolver::{Lookup, PathIndex};
    use serde_json::{json, Value};

    /// Values recorded earlier in the same request.
    struct Recorded {
        index: PathIndex,
        request: JsonMap,
    }

    impl ReferenceLookup for Recorded {
        fn lookup_reference(&self, path: &str) -> Lookup {
            self.index.lookup(path.trim_start_matches('/'), &self.request)
        }
    }

    fn refs() -> Recorded {
        let mut index = PathIndex::new();
        index.record("Owner", json!({"id": 1, "name": "alice"}));
        Recorded {
            index,
            request: JsonMap::new(),
        }
    }

    fn map(value: Value) -> JsonMap {
        value.as_object().cloned().unwrap()
    }

    fn item() -> JsonMap {
        map(json!({
            "Moment": {"@order": "id-"},
            "User": {"name": "alice", "id@": "/Moment/userId"},
            "Comment": {"content$": "%a%", "momentId@": "/Moment/id", "@column": "id,content"}
        }))
    }

    #[test]
    fn test_sql_joins_in_directive_order() {
        let plan = parse_joins(Some(&json!("&/User, </Comment")), &item(), &refs(), 10)
            .unwrap()
            .unwrap();
        let kinds: Vec<(JoinType, &str)> = plan
            .specs
            .iter()
            .map(|s| (s.join_type, s.table_key.as_str()))
            .collect();
        assert_eq!(kinds, vec![(JoinType::Inner, "User"), (JoinType::Left, "Comment")]);
        assert_eq!(plan.sql_joins().count(), 2);
        assert_eq!(plan.app_joins().count(), 0);

        let comment = &plan.specs[1];
        assert_eq!(comment.on.len(), 1);
        assert_eq!(comment.on[0].key, "momentId");
        assert_eq!(comment.on[0].target_table_key, "Moment");
        assert_eq!(comment.on[0].target_key, "id");
        assert_eq!(comment.sub_request.get("content$"), Some(&json!("%a%")));
        assert_eq!(comment.sub_request.get("@column"), Some(&json!("id,content")));
    }

    #[test]
    fn test_on_condition_leads_the_reordered_table() {
        let plan = parse_joins(Some(&json!("&/User")), &item(), &refs(), 10)
            .unwrap()
            .unwrap();
        let user = plan.reordered["User"].as_object().unwrap();
        assert_eq!(user.keys().next().map(String::as_str), Some("id@"));
        // Tables outside the directive stay as written.
        assert_eq!(plan.reordered["Comment"], item()["Comment"]);
    }

    #[test]
    fn test_recorded_reference_becomes_a_filter() {
        let request = map(json!({
            "Moment": {},
            "User": {"id@": "/Moment/userId", "name@": "/Owner/name"}
        }));
        let plan = parse_joins(Some(&json!("&/User")), &request, &refs(), 10)
            .unwrap()
            .unwrap();
        assert_eq!(plan.specs[0].sub_request.get("name"), Some(&json!("alice")));
        assert_eq!(plan.specs[0].on.len(), 1);
    }

    #[test]
    fn test_app_join_on_explicit_key() {
        let plan = parse_joins(Some(&json!({"@/User/id@": {}})), &item(), &refs(), 10)
            .unwrap()
            .unwrap();
        assert_eq!(plan.app_joins().count(), 1);
        assert!(!plan.specs[0].is_array_scoped());
        assert_eq!(plan.specs[0].count, None);
    }

    #[test]
    fn test_array_scoped_join_takes_the_array_count() {
        let request = map(json!({
            "Moment": {},
            "Comment[]": {"count": 3, "Comment": {"momentId@": "/Moment/id"}}
        }));
        let plan = parse_joins(Some(&json!("@/Comment[]/Comment/momentId@")), &request, &refs(), 10)
            .unwrap()
            .unwrap();
        let spec = &plan.specs[0];
        assert_eq!(spec.array_key.as_deref(), Some("Comment[]"));
        assert_eq!(spec.count, Some(3));
    }

    #[test]
    fn test_empty_and_missing_directives() {
        assert_eq!(parse_joins(None, &item(), &refs(), 10).unwrap(), None);
        assert_eq!(parse_joins(Some(&Value::Null), &item(), &refs(), 10).unwrap(), None);
        assert_eq!(parse_joins(Some(&json!("")), &item(), &refs(), 10).unwrap(), None);
    }

    #[test]
    fn test_invalid_directives_are_structure_errors() {
        for join in [
            json!("^/User"),
            json!("&/Missing"),
            json!("&/user"),
            json!("&/User:Owner"),
            json!(42),
        ] {
            let err = parse_joins(Some(&join), &item(), &refs(), 10).unwrap_err();
            assert_eq!(err.code(), 400, "join {} should be rejected", join);
        }
    }

    #[test]
    fn test_unresolvable_reference_rejects_the_join() {
        let request = map(json!({
            "Moment": {},
            "User": {"id@": "/Moment/userId", "name@": "/Nobody/name"}
        }));
        assert!(parse_joins(Some(&json!("&/User")), &request, &refs(), 10).is_err());
    }
}
