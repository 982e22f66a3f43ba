use apitree::config::ResolverConfig;
use apitree::executor::{MemoryExecutor, MemoryStore, SharedStore};
use apitree::request::{JsonMap, RequestMethod};
use apitree::resolver::{ParseOutcome, RequestParser};
use apitree::verifier::{PermissiveVerifier, StaticStructures, StructureSource, Verifier};
use serde_json::{json, Value};

/// Users, moments and comments. Moment 13 points at a user that does not
/// exist; user 2 has a null nickname.
pub fn store() -> SharedStore {
    MemoryStore::default()
        .with_table(
            "User",
            vec![
                json!({"id": 1, "name": "alice", "age": 30, "nickname": "al"}),
                json!({"id": 2, "name": "bob", "age": 25, "nickname": null}),
                json!({"id": 3, "name": "carol", "age": 35, "nickname": "caz"}),
            ],
        )
        .with_table(
            "Moment",
            vec![
                json!({"id": 10, "userId": 1, "content": "m1"}),
                json!({"id": 11, "userId": 2, "content": "m2"}),
                json!({"id": 12, "userId": 1, "content": "m3"}),
                json!({"id": 13, "userId": 9, "content": "orphan"}),
            ],
        )
        .with_table(
            "Comment",
            vec![
                json!({"id": 100, "momentId": 10, "userId": 2, "content": "c1"}),
                json!({"id": 101, "momentId": 10, "userId": 3, "content": "c2"}),
                json!({"id": 102, "momentId": 11, "userId": 1, "content": "c3"}),
            ],
        )
        .into_shared()
}

/// No role table and no content templates.
pub fn open_config() -> ResolverConfig {
    ResolverConfig {
        verify_role: false,
        verify_content: false,
        ..Default::default()
    }
}

pub fn map(value: Value) -> JsonMap {
    value.as_object().cloned().unwrap()
}

pub struct Harness {
    pub config: ResolverConfig,
    pub store: SharedStore,
    pub verifier: Box<dyn Verifier>,
    pub structures: Box<dyn StructureSource>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(open_config())
    }

    pub fn with_config(config: ResolverConfig) -> Self {
        Self {
            config,
            store: store(),
            verifier: Box::new(PermissiveVerifier),
            structures: Box::new(StaticStructures::new()),
        }
    }

    pub fn verifier(mut self, verifier: impl Verifier + 'static) -> Self {
        self.verifier = Box::new(verifier);
        self
    }

    pub fn structures(mut self, structures: StaticStructures) -> Self {
        self.structures = Box::new(structures);
        self
    }

    pub fn resolve(&self, method: RequestMethod, request: Value) -> ParseOutcome {
        self.resolve_counted(method, request).0
    }

    /// Also returns the executor so tests can read its statement counters.
    pub fn resolve_counted(&self, method: RequestMethod, request: Value) -> (ParseOutcome, MemoryExecutor) {
        let mut executor = MemoryExecutor::new(self.store.clone());
        let parser = RequestParser::new(&self.config, self.verifier.as_ref(), self.structures.as_ref());
        let outcome = parser.parse(method, &map(request), &mut executor);
        (outcome, executor)
    }

    pub fn rows(&self, table: &str) -> Vec<JsonMap> {
        self.store
            .read()
            .unwrap()
            .table(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn row(&self, table: &str, id: i64) -> Option<JsonMap> {
        self.rows(table)
            .into_iter()
            .find(|r| r.get("id").and_then(Value::as_i64) == Some(id))
    }
}

pub fn assert_success(outcome: &ParseOutcome) {
    assert!(outcome.is_ok(), "unexpected error: {:?}", outcome.error);
    assert_eq!(outcome.response["ok"], json!(true));
    assert_eq!(outcome.response["code"], json!(200));
    assert_eq!(outcome.response["msg"], json!("success"));
}

/// Error envelope only: `ok`, `code`, `msg` and nothing else.
pub fn assert_error(outcome: &ParseOutcome, code: u16) {
    assert!(!outcome.is_ok(), "expected an error, got {:?}", outcome.response);
    assert_eq!(outcome.response["ok"], json!(false));
    assert_eq!(outcome.response["code"], json!(code));
    assert_eq!(outcome.response.len(), 3, "partial output in {:?}", outcome.response);
}
