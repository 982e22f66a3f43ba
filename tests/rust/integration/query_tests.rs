//! Read requests: objects, arrays, references, joins, subqueries and the
//! per-request limits.

use apitree::config::ResolverConfig;
use apitree::executor::{MemoryExecutor, SqlExecutor};
use apitree::request::RequestMethod;
use apitree::resolver::{ReferencePolicy, RequestParser, ResolveError};
use apitree::verifier::{PermissiveVerifier, StaticStructures, TemplateVerifier};
use serde_json::{json, Value};

use super::common::{assert_error, assert_success, map, open_config, Harness};

fn items(response: &Value) -> &Vec<Value> {
    response.as_array().expect("array node")
}

#[test]
fn test_get_single_row_envelope() {
    let outcome = Harness::new().resolve(RequestMethod::Get, json!({"User": {"id": 1}}));
    assert_success(&outcome);
    assert_eq!(
        outcome.response["User"],
        json!({"id": 1, "name": "alice", "age": 30, "nickname": "al"})
    );
    assert_eq!(outcome.response.len(), 4);
}

#[test]
fn test_gets_array_honors_count() {
    let outcome = Harness::new().resolve(
        RequestMethod::Gets,
        json!({"User[]": {"page": 0, "count": 2, "User": {}}}),
    );
    assert_success(&outcome);
    let users = items(&outcome.response["User[]"]);
    assert_eq!(users.len(), 2);
    assert_eq!(users[0]["name"], "alice");
    assert_eq!(users[1]["name"], "bob");
}

#[test]
fn test_second_page() {
    let outcome = Harness::new().resolve(
        RequestMethod::Get,
        json!({"User[]": {"page": 1, "count": 2, "User": {}}}),
    );
    assert_success(&outcome);
    let users = items(&outcome.response["User[]"]);
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["name"], "carol");
}

#[test]
fn test_column_projection_and_order() {
    let outcome = Harness::new().resolve(
        RequestMethod::Get,
        json!({"User[]": {"User": {"@column": "id,name", "@order": "age-"}}}),
    );
    assert_success(&outcome);
    assert_eq!(
        outcome.response["User[]"],
        json!([
            {"id": 3, "name": "carol"},
            {"id": 1, "name": "alice"},
            {"id": 2, "name": "bob"}
        ])
    );
}

#[test]
fn test_same_slot_reference_in_anonymous_array() {
    let harness = Harness::new();
    let (outcome, executor) = harness.resolve_counted(
        RequestMethod::Get,
        json!({"[]": {"count": 3, "User": {}, "Moment": {"userId@": "/User/id"}}}),
    );
    assert_success(&outcome);

    let rows = items(&outcome.response["[]"]);
    assert_eq!(rows.len(), 3);
    for row in rows {
        if let Some(moment) = row.get("Moment") {
            assert_eq!(moment["userId"], row["User"]["id"]);
        }
    }
    assert_eq!(rows[0]["Moment"]["id"], 10);
    assert_eq!(rows[1]["Moment"]["id"], 11);
    assert!(rows[2].get("Moment").is_none());

    // One page read for User, served from the page cache after row 0.
    let stats = executor.stats();
    assert_eq!(stats.executed, 4);
    assert_eq!(stats.cached, 2);
}

#[test]
fn test_spliced_rows_match_per_row_resolution() {
    let harness = Harness::new();
    let spliced = harness.resolve(
        RequestMethod::Get,
        json!({"User[]": {"count": 3, "User": {}}, "name@": "/User[]/2/User/name"}),
    );
    let per_row = harness.resolve(
        RequestMethod::Get,
        json!({"[]": {"count": 3, "User": {}}, "name@": "/[]/2/User/name"}),
    );
    assert_success(&spliced);
    assert_success(&per_row);

    let users: Vec<Value> = items(&per_row.response["[]"])
        .iter()
        .map(|item| item["User"].clone())
        .collect();
    assert_eq!(items(&spliced.response["User[]"]), &users);
    assert_eq!(spliced.response["name"], "carol");
    assert_eq!(per_row.response["name"], "carol");
}

#[test]
fn test_scalar_extraction_resolves_per_row() {
    let outcome = Harness::new().resolve(
        RequestMethod::Get,
        json!({
            "User[]": {"count": 3, "User": {"@column": "id"}},
            "User-id[]": {"count": 3, "User": {}},
            "ids@": "/User-id[]"
        }),
    );
    assert_success(&outcome);
    assert_eq!(outcome.response["User-id[]"], json!([1, 2, 3]));
    assert_eq!(outcome.response["ids"], json!([1, 2, 3]));
    assert_eq!(
        outcome.response["User[]"],
        json!([{"id": 1}, {"id": 2}, {"id": 3}])
    );
}

#[test]
fn test_extreme_page_is_rejected() {
    let outcome = Harness::with_config(ResolverConfig {
        start_from_1: true,
        ..open_config()
    })
    .resolve(
        RequestMethod::Get,
        json!({"User[]": {"page": i64::MIN, "User": {}}}),
    );
    assert_error(&outcome, 400);
    assert!(matches!(outcome.error, Some(ResolveError::Structure(_))));
}

#[test]
fn test_extracted_field_array() {
    let outcome = Harness::new().resolve(
        RequestMethod::Get,
        json!({"User-name[]": {"User": {"age>": 26}}}),
    );
    assert_success(&outcome);
    assert_eq!(outcome.response["User-name[]"], json!(["alice", "carol"]));
}

#[test]
fn test_empty_array_is_omitted() {
    let outcome = Harness::new().resolve(
        RequestMethod::Get,
        json!({"User[]": {"User": {"age>": 100}}}),
    );
    assert_success(&outcome);
    assert!(outcome.response.get("User[]").is_none());
}

#[test]
fn test_all_mode_exposes_total_and_info() {
    let outcome = Harness::new().resolve(
        RequestMethod::Get,
        json!({
            "User[]": {"query": "ALL", "count": 2, "User": {}},
            "total@": "/User[]/total",
            "info@": "/User[]/info"
        }),
    );
    assert_success(&outcome);
    assert_eq!(items(&outcome.response["User[]"]).len(), 2);
    assert_eq!(outcome.response["total"], 3);
    assert_eq!(
        outcome.response["info"],
        json!({"total": 3, "count": 2, "page": 0, "max": 1,
               "more": true, "first": true, "last": false})
    );
}

#[test]
fn test_total_mode_fetches_no_rows() {
    let harness = Harness::new();
    let (outcome, executor) = harness.resolve_counted(
        RequestMethod::Get,
        json!({
            "User[]": {"query": "TOTAL", "User": {"age>": 26}},
            "total@": "/User[]/total"
        }),
    );
    assert_success(&outcome);
    assert!(outcome.response.get("User[]").is_none());
    assert_eq!(outcome.response["total"], 2);
    assert_eq!(executor.stats().executed, 1);
}

#[test]
fn test_page_past_the_end_stops_after_count() {
    let harness = Harness::new();
    let (outcome, executor) = harness.resolve_counted(
        RequestMethod::Get,
        json!({
            "User[]": {"query": "ALL", "count": 2, "page": 2, "User": {}},
            "info@": "/User[]/info"
        }),
    );
    assert_success(&outcome);
    assert!(outcome.response.get("User[]").is_none());
    assert_eq!(outcome.response["info"]["page"], 2);
    assert_eq!(executor.stats().executed, 1);
}

#[test]
fn test_head_counts() {
    let outcome = Harness::new().resolve(RequestMethod::Head, json!({"Moment": {"userId": 1}}));
    assert_success(&outcome);
    assert_eq!(outcome.response["Moment"], json!({"count": 2}));
}

#[test]
fn test_reference_to_later_sibling_reads_request_value() {
    let outcome = Harness::new().resolve(
        RequestMethod::Get,
        json!({"Moment": {"userId@": "/User/id"}, "User": {"id": 2}}),
    );
    assert_success(&outcome);
    assert_eq!(outcome.response["Moment"]["id"], 11);
    assert_eq!(outcome.response["User"]["name"], "bob");
}

#[test]
fn test_missing_reference_skips_node_with_warning() {
    let outcome = Harness::new().resolve(
        RequestMethod::Get,
        json!({"User": {"id": 1}, "Moment": {"userId@": "/Comment/userId"}}),
    );
    assert_success(&outcome);
    assert!(outcome.response.get("Moment").is_none());
    let warn = outcome.response["warn"].as_str().unwrap();
    assert!(warn.contains("userId@"), "{}", warn);
}

#[test]
fn test_null_reference_under_both_policies() {
    let request = json!({"User": {"id": 2}, "Moment": {"userId@": "/User/nickname"}});

    let permissive = Harness::new().resolve(RequestMethod::Get, request.clone());
    assert_success(&permissive);
    assert!(permissive.response.get("Moment").is_none());
    assert!(permissive.response.contains_key("warn"));

    let strict = Harness::with_config(ResolverConfig {
        reference_policy: ReferencePolicy::Strict,
        ..open_config()
    })
    .resolve(RequestMethod::Get, request);
    assert_error(&strict, 400);
    assert!(matches!(strict.error, Some(ResolveError::Reference { .. })));
}

#[test]
fn test_sql_inner_and_left_joins() {
    let harness = Harness::new();
    let inner = harness.resolve(
        RequestMethod::Get,
        json!({"[]": {"join": "&/User", "Moment": {}, "User": {"id@": "/Moment/userId"}}}),
    );
    assert_success(&inner);
    let rows = items(&inner.response["[]"]);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["User"]["name"], "alice");
    assert_eq!(rows[1]["User"]["name"], "bob");
    assert_eq!(rows[2]["User"]["name"], "alice");

    let left = harness.resolve(
        RequestMethod::Get,
        json!({"[]": {"join": "</User", "Moment": {}, "User": {"id@": "/Moment/userId"}}}),
    );
    assert_success(&left);
    let rows = items(&left.response["[]"]);
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[3]["Moment"]["content"], "orphan");
    assert!(rows[3].get("User").is_none());
}

#[test]
fn test_app_join_fetches_once_per_page() {
    let harness = Harness::new();
    let (outcome, executor) = harness.resolve_counted(
        RequestMethod::Get,
        json!({"[]": {"join": "@/User", "Moment": {}, "User": {"id@": "/Moment/userId"}}}),
    );
    assert_success(&outcome);
    let rows = items(&outcome.response["[]"]);
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[1]["User"]["name"], "bob");
    assert_eq!(rows[2]["User"]["name"], "alice");
    assert!(rows[3].get("User").is_none());
    assert_eq!(executor.stats().executed, 2);
}

#[test]
fn test_array_scoped_app_join() {
    let harness = Harness::new();
    let (outcome, executor) = harness.resolve_counted(
        RequestMethod::Get,
        json!({"[]": {
            "count": 2,
            "join": "@/Comment[]/Comment/momentId@",
            "Moment": {},
            "Comment[]": {"count": 5, "Comment": {"momentId@": "/Moment/id"}}
        }}),
    );
    assert_success(&outcome);
    let rows = items(&outcome.response["[]"]);
    assert_eq!(rows.len(), 2);
    let first: Vec<&Value> = items(&rows[0]["Comment[]"]).iter().map(|c| &c["id"]).collect();
    assert_eq!(first, vec![&json!(100), &json!(101)]);
    assert_eq!(items(&rows[1]["Comment[]"]).len(), 1);
    assert_eq!(executor.stats().executed, 2);
}

#[test]
fn test_subquery_condition() {
    let outcome = Harness::new().resolve(
        RequestMethod::Get,
        json!({"User[]": {"User": {
            "id{}@": {"from": "Moment", "Moment": {"@column": "userId", "content": "m2"}}
        }}}),
    );
    assert_success(&outcome);
    let users = items(&outcome.response["User[]"]);
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["name"], "bob");
}

#[test]
fn test_request_tree_is_not_modified() {
    let request = map(json!({
        "[]": {"count": 2, "query": "ALL", "join": "&/User",
               "Moment": {}, "User": {"id@": "/Moment/userId"}},
        "info@": "/[]/info"
    }));
    let before = request.clone();
    let config = open_config();
    let mut executor = MemoryExecutor::new(super::common::store());
    let outcome = RequestParser::new(&config, &PermissiveVerifier, &StaticStructures::new())
        .parse(RequestMethod::Get, &request, &mut executor);
    assert_success(&outcome);
    assert_eq!(request, before);
}

#[test]
fn test_format_rewrites_keys() {
    let outcome = Harness::new().resolve(
        RequestMethod::Get,
        json!({"format": true, "User": {"id": 1}, "Moment[]": {"Moment": {"userId": 1}}}),
    );
    assert_success(&outcome);
    assert_eq!(outcome.response["user"]["name"], "alice");
    assert_eq!(items(&outcome.response["momentList"]).len(), 2);
    assert!(outcome.response.get("User").is_none());
}

#[test]
fn test_explain_is_attached_to_row() {
    let outcome = Harness::new().resolve(
        RequestMethod::Get,
        json!({"@explain": true, "User": {"id": 1}}),
    );
    assert_success(&outcome);
    assert_eq!(outcome.response["User"]["explain"]["table"], "User");
}

#[test]
fn test_debug_counters() {
    let outcome = Harness::with_config(ResolverConfig {
        debug: true,
        ..open_config()
    })
    .resolve(RequestMethod::Get, json!({"User": {"id": 1}}));
    assert_success(&outcome);
    assert_eq!(outcome.response["sql:generate|cache|execute|maxExecute"], "1|0|1|200");
    assert_eq!(outcome.response["depth:count|max"], "1|5");
    assert!(outcome.response.contains_key("time:start|duration|end|parse|sql"));
}

#[test]
fn test_statement_ceiling() {
    let outcome = Harness::with_config(ResolverConfig {
        max_sql_count: 1,
        ..open_config()
    })
    .resolve(RequestMethod::Get, json!({"User": {"id": 1}, "Moment": {"id": 10}}));
    assert_error(&outcome, 429);
}

#[test]
fn test_depth_ceiling() {
    let outcome = Harness::with_config(ResolverConfig {
        max_query_depth: 2,
        ..open_config()
    })
    .resolve(RequestMethod::Get, json!({"[]": {"User": {}}}));
    assert_error(&outcome, 400);
}

#[test]
fn test_object_count_ceiling() {
    let outcome = Harness::with_config(ResolverConfig {
        max_object_count: 1,
        ..open_config()
    })
    .resolve(RequestMethod::Get, json!({"User": {"id": 1}, "Moment": {"id": 10}}));
    assert_error(&outcome, 400);
}

#[test]
fn test_invalid_join_fails_without_partial_output() {
    let outcome = Harness::new().resolve(
        RequestMethod::Get,
        json!({"User": {"id": 1}, "[]": {"join": "&/Missing", "Moment": {}}}),
    );
    assert_error(&outcome, 400);
}

#[test]
fn test_role_table() {
    let harness = Harness::with_config(ResolverConfig {
        verify_role: true,
        ..open_config()
    })
    .verifier(TemplateVerifier::new().allow("User", RequestMethod::Get, &["LOGIN"]));

    let anonymous = harness.resolve(RequestMethod::Get, json!({"User": {"id": 1}}));
    assert_error(&anonymous, 401);

    let login = harness.resolve(RequestMethod::Get, json!({"@role": "LOGIN", "User": {"id": 1}}));
    assert_success(&login);

    let owner = harness.resolve(RequestMethod::Get, json!({"@role": "OWNER", "User": {"id": 1}}));
    assert_error(&owner, 403);

    let open = harness.resolve(RequestMethod::Get, json!({"Moment": {"id": 10}}));
    assert_success(&open);
}
