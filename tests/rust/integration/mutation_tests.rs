//! POST, PUT and DELETE: transactions, rollback and content verification.

use apitree::config::ResolverConfig;
use apitree::executor::QueryDescriptor;
use apitree::request::{JsonMap, RequestMethod};
use apitree::resolver::ResolveError;
use apitree::verifier::{StaticStructures, TemplateVerifier, Verifier, VerifyError};
use serde_json::{json, Value};

use super::common::{assert_error, assert_success, map, open_config, Harness};

fn verified() -> Harness {
    let structures = StaticStructures::new()
        .with(RequestMethod::Post, "Moment", 1, map(json!({"Moment": {"MUST": "content,userId", "REFUSE": "id"}})))
        .with(RequestMethod::Put, "Moment", 1, map(json!({"Moment": {"REFUSE": "userId"}})))
        .with(RequestMethod::Delete, "Moment", 1, map(json!({"Moment": {}})));
    Harness::with_config(ResolverConfig {
        verify_role: false,
        max_update_count: 2,
        ..Default::default()
    })
    .verifier(TemplateVerifier::new())
    .structures(structures)
}

#[test]
fn test_post_inserts_and_commits() {
    let harness = Harness::new();
    let outcome = harness.resolve(
        RequestMethod::Post,
        json!({"Moment": {"content": "new", "userId": 3}}),
    );
    assert_success(&outcome);
    assert_eq!(outcome.response["Moment"], json!({"count": 1, "id": 14}));
    assert!(outcome.rollback.is_none());
    assert_eq!(harness.rows("Moment").len(), 5);
    assert_eq!(harness.row("Moment", 14).unwrap()["content"], "new");
}

#[test]
fn test_put_updates_by_id() {
    let harness = Harness::new();
    let outcome = harness.resolve(
        RequestMethod::Put,
        json!({"Moment": {"id": 10, "content": "edited"}}),
    );
    assert_success(&outcome);
    assert_eq!(outcome.response["Moment"], json!({"count": 1, "id": 10}));
    assert_eq!(harness.row("Moment", 10).unwrap()["content"], "edited");
    assert_eq!(harness.row("Moment", 11).unwrap()["content"], "m2");
}

#[test]
fn test_delete_by_id_list() {
    let harness = Harness::new();
    let outcome = harness.resolve(
        RequestMethod::Delete,
        json!({"Moment": {"id{}": [11, 12]}}),
    );
    assert_success(&outcome);
    assert_eq!(outcome.response["Moment"]["count"], 2);
    assert!(harness.row("Moment", 11).is_none());
    assert!(harness.row("Moment", 12).is_none());
    assert_eq!(harness.rows("Moment").len(), 2);
}

#[test]
fn test_database_error_rolls_back_earlier_writes() {
    let harness = Harness::new();
    let outcome = harness.resolve(
        RequestMethod::Put,
        json!({"Moment": {"id": 10, "content": "lost"}, "Nope": {"id": 1, "x": 2}}),
    );
    assert_error(&outcome, 500);
    assert!(matches!(outcome.error, Some(ResolveError::Database { .. })));
    assert!(outcome.rollback.as_ref().is_some_and(|r| r.is_clean()));
    assert_eq!(harness.row("Moment", 10).unwrap()["content"], "m1");
}

#[test]
fn test_failed_post_leaves_store_untouched() {
    let harness = Harness::new();
    let outcome = harness.resolve(
        RequestMethod::Post,
        json!({"Moment": {"content": "a", "userId": 1}, "Comment": {"bad key!": 1}}),
    );
    assert_error(&outcome, 500);
    assert_eq!(harness.rows("Moment").len(), 4);
    assert_eq!(harness.rows("Comment").len(), 3);
}

#[test]
fn test_array_under_mutation_is_forbidden() {
    let harness = Harness::new();
    let outcome = harness.resolve(RequestMethod::Post, json!({"Moment[]": {"Moment": {}}}));
    assert_error(&outcome, 403);
}

#[test]
fn test_mutation_reads_reference_from_earlier_write() {
    let harness = Harness::new();
    let outcome = harness.resolve(
        RequestMethod::Post,
        json!({
            "Moment": {"content": "with comment", "userId": 2},
            "Comment": {"momentId@": "/Moment/id", "userId": 1, "content": "first"}
        }),
    );
    assert_success(&outcome);
    let comment = harness.row("Comment", 103).unwrap();
    assert_eq!(comment["momentId"], 14);
}

#[test]
fn test_tag_required_when_verifying_content() {
    let outcome = verified().resolve(RequestMethod::Post, json!({"Moment": {"content": "x", "userId": 1}}));
    assert_error(&outcome, 400);
}

#[test]
fn test_template_accepts_conforming_post() {
    let harness = verified();
    let outcome = harness.resolve(
        RequestMethod::Post,
        json!({"tag": "Moment", "Moment": {"content": "x", "userId": 1}}),
    );
    assert_success(&outcome);
    assert_eq!(harness.rows("Moment").len(), 5);
}

#[test]
fn test_template_rejections() {
    let harness = verified();
    let missing = harness.resolve(RequestMethod::Post, json!({"tag": "Moment", "Moment": {"content": "x"}}));
    assert_error(&missing, 400);

    let refused = harness.resolve(
        RequestMethod::Post,
        json!({"tag": "Moment", "Moment": {"id": 99, "content": "x", "userId": 1}}),
    );
    assert_error(&refused, 403);

    let unknown_tag = harness.resolve(
        RequestMethod::Post,
        json!({"tag": "Ghost", "Moment": {"content": "x", "userId": 1}}),
    );
    assert_error(&unknown_tag, 403);
    assert_eq!(harness.rows("Moment").len(), 4);
}

#[test]
fn test_update_bound() {
    let harness = verified();
    let within = harness.resolve(
        RequestMethod::Delete,
        json!({"tag": "Moment", "Moment": {"id{}": [10, 11]}}),
    );
    assert_success(&within);

    let beyond = harness.resolve(
        RequestMethod::Delete,
        json!({"tag": "Moment", "Moment": {"id{}": [12, 13, 14]}}),
    );
    assert_error(&beyond, 403);
    assert_eq!(harness.rows("Moment").len(), 2);
}

#[test]
fn test_method_mismatch_is_rejected() {
    let outcome = Harness::with_config(open_config()).resolve(
        RequestMethod::Post,
        json!({"Moment": {"@method": "PUT", "id": 10, "content": "x"}}),
    );
    assert_error(&outcome, 400);
}

/// Trims every comment's content during verification.
struct TrimmingVerifier;

impl Verifier for TrimmingVerifier {
    fn verify_request(
        &self,
        _method: RequestMethod,
        _name: &str,
        _template: &JsonMap,
        request: &JsonMap,
        _max_update_count: usize,
        _database: Option<&str>,
        _schema: Option<&str>,
    ) -> Result<JsonMap, VerifyError> {
        let mut verified = request.clone();
        if let Some(Value::Object(comment)) = verified.get_mut("Comment") {
            if let Some(Value::String(content)) = comment.get_mut("content") {
                *content = content.trim().to_string();
            }
        }
        Ok(verified)
    }

    fn verify_access(&self, _query: &QueryDescriptor) -> Result<(), VerifyError> {
        Ok(())
    }
}

#[test]
fn test_reference_to_later_key_reads_verified_value() {
    let structures = StaticStructures::new().with(
        RequestMethod::Post,
        "Moment",
        1,
        map(json!({"Moment": {}, "Comment": {}})),
    );
    let harness = Harness::with_config(ResolverConfig {
        verify_role: false,
        ..Default::default()
    })
    .verifier(TrimmingVerifier)
    .structures(structures);

    let outcome = harness.resolve(
        RequestMethod::Post,
        json!({
            "tag": "Moment",
            "Moment": {"content@": "/Comment/content", "userId": 1},
            "Comment": {"content": "  hello  ", "momentId": 10, "userId": 1}
        }),
    );
    assert_success(&outcome);
    assert_eq!(harness.row("Moment", 14).unwrap()["content"], "hello");
    assert_eq!(harness.row("Comment", 103).unwrap()["content"], "hello");
}
