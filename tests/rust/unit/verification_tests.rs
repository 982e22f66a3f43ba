//! Unit tests for the structure file: templates and the role table read
//! from one YAML document

#[cfg(test)]
mod verification_tests {
    use apitree::executor::QueryDescriptor;
    use apitree::request::{JsonMap, RequestMethod};
    use apitree::verifier::{
        StaticStructures, StructureSource, TemplateVerifier, Verifier, VerifyError,
    };
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const STRUCTURE_FILE: &str = r#"
entries:
  - method: POST
    tag: Moment
    version: 1
    structure:
      Moment:
        MUST: content
        REFUSE: id
  - method: POST
    tag: Moment
    version: 2
    structure:
      Moment:
        MUST: content,userId
        REFUSE: "!"
access:
  Moment:
    POST: [LOGIN, OWNER]
    DELETE: [OWNER]
"#;

    fn file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(STRUCTURE_FILE.as_bytes()).unwrap();
        file
    }

    fn map(value: serde_json::Value) -> JsonMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_one_file_feeds_both_readers() {
        let file = file();
        let structures = StaticStructures::from_file(file.path()).unwrap();
        let verifier = TemplateVerifier::from_file(file.path()).unwrap();
        assert_eq!(structures.entries.len(), 2);
        assert_eq!(verifier.access["Moment"][&RequestMethod::Delete], vec!["OWNER"]);
    }

    #[test]
    fn test_version_selects_the_template() {
        let file = file();
        let structures = StaticStructures::from_file(file.path()).unwrap();
        let verifier = TemplateVerifier::new();
        let request = map(json!({"Moment": {"content": "hi"}}));

        let v1 = structures.structure(RequestMethod::Post, "Moment", 1).unwrap();
        assert!(verifier
            .verify_request(RequestMethod::Post, "", &v1, &request, 10, None, None)
            .is_ok());

        let latest = structures.structure(RequestMethod::Post, "Moment", 0).unwrap();
        assert!(matches!(
            verifier.verify_request(RequestMethod::Post, "", &latest, &request, 10, None, None),
            Err(VerifyError::Invalid(_))
        ));
    }

    #[test]
    fn test_role_table_from_file() {
        let verifier = TemplateVerifier::from_file(file().path()).unwrap();
        let mut query = QueryDescriptor::new(RequestMethod::Delete, "Moment");
        query.role = Some("LOGIN".into());
        assert!(matches!(verifier.verify_access(&query), Err(VerifyError::Forbidden(_))));
        query.role = Some("OWNER".into());
        assert!(verifier.verify_access(&query).is_ok());
        query.method = RequestMethod::Put;
        assert!(verifier.verify_access(&query).is_err());
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");
        assert!(StaticStructures::from_file(&missing).is_err());
        assert!(TemplateVerifier::from_file(&missing).is_err());
    }
}
