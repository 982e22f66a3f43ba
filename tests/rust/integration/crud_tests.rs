//! CRUD requests: per-key method selectors in one transaction.

use apitree::config::ResolverConfig;
use apitree::request::RequestMethod;
use apitree::verifier::{StaticStructures, TemplateVerifier};
use serde_json::json;

use super::common::{assert_error, assert_success, map, Harness};

fn harness() -> Harness {
    let structures = StaticStructures::new()
        .with(RequestMethod::Post, "Moment", 1, map(json!({"Moment": {"MUST": "content"}})))
        .with(RequestMethod::Put, "User", 1, map(json!({"User": {"REFUSE": "age"}})))
        .with(RequestMethod::Delete, "Comment", 1, map(json!({"Comment": {}})));
    Harness::with_config(ResolverConfig {
        verify_role: false,
        ..Default::default()
    })
    .verifier(TemplateVerifier::new())
    .structures(structures)
}

#[test]
fn test_selectors_apply_each_method() {
    let harness = harness();
    let outcome = harness.resolve(
        RequestMethod::Crud,
        json!({
            "@post": "Moment",
            "@put": {"User": {"tag": "User"}},
            "Moment": {"content": "crud", "userId": 2},
            "User": {"id": 2, "nickname": "bobby"}
        }),
    );
    assert_success(&outcome);
    assert_eq!(outcome.response["Moment"]["id"], 14);
    assert_eq!(outcome.response["User"]["count"], 1);
    assert!(!outcome.response.contains_key("@post"));

    assert_eq!(harness.row("Moment", 14).unwrap()["content"], "crud");
    assert_eq!(harness.row("User", 2).unwrap()["nickname"], "bobby");
}

#[test]
fn test_unselected_key_reads_the_transaction_writes() {
    let harness = harness();
    let outcome = harness.resolve(
        RequestMethod::Crud,
        json!({
            "@post": "Moment",
            "Moment": {"content": "fresh", "userId": 3},
            "Moment:check": {"id@": "/Moment/id"}
        }),
    );
    assert_success(&outcome);
    assert_eq!(outcome.response["Moment:check"]["content"], "fresh");
    assert_eq!(outcome.response["Moment:check"]["userId"], 3);
}

#[test]
fn test_delete_selector() {
    let harness = harness();
    let outcome = harness.resolve(
        RequestMethod::Crud,
        json!({"@delete": "Comment", "Comment": {"id": 102}}),
    );
    assert_success(&outcome);
    assert!(harness.row("Comment", 102).is_none());
    assert_eq!(harness.rows("Comment").len(), 2);
}

#[test]
fn test_key_selected_twice_conflicts() {
    let harness = harness();
    let outcome = harness.resolve(
        RequestMethod::Crud,
        json!({"@post": "Moment", "@put": "Moment", "Moment": {"content": "x"}}),
    );
    assert_error(&outcome, 409);
    assert_eq!(harness.rows("Moment").len(), 4);
}

#[test]
fn test_template_violation_rejects_whole_request() {
    let harness = harness();
    let outcome = harness.resolve(
        RequestMethod::Crud,
        json!({
            "@post": "Moment",
            "@put": "User",
            "Moment": {"content": "x", "userId": 1},
            "User": {"id": 1, "age": 99}
        }),
    );
    assert_error(&outcome, 403);
    assert_eq!(harness.rows("Moment").len(), 4);
    assert_eq!(harness.row("User", 1).unwrap()["age"], 30);
}

#[test]
fn test_selector_without_structure_is_forbidden() {
    let outcome = harness().resolve(
        RequestMethod::Crud,
        json!({"@delete": "User", "User": {"id": 1}}),
    );
    assert_error(&outcome, 403);
}

#[test]
fn test_failure_after_a_write_rolls_back() {
    let harness = harness();
    let outcome = harness.resolve(
        RequestMethod::Crud,
        json!({
            "@post": "Moment",
            "@put": "User",
            "Moment": {"content": "x", "userId": 1},
            "User": {"id": 1, "bad key!": 1}
        }),
    );
    assert_error(&outcome, 500);
    assert!(outcome.rollback.is_some());
    assert_eq!(harness.rows("Moment").len(), 4);
}
