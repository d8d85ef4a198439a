//! Integration tests for loading complete declaration files.

use pipetype_core::Scalar;
use pipetype_schema::{SchemaErrorKind, SchemaLoader, TypeRef, load};

const DEPLOY_SCHEMA: &str = r#"
/**
 * Deployment target for a release job.
 */
type Target = "staging" | "production";

export interface Job {
  /** Command to run */
  run: string | string[];
  name?: string
  target?: Target,
  env?: {
    [name: string]: string;
  };
  retry?:
    | { automatic: boolean | Retry }
    | { manual: boolean };
}

interface Retry {
  exit_status?: "*" | number;
  limit?: 1 | 2 | 3;
}

/** Pause until someone approves */
type Gate = "pause" | { pause: string; notify?: string[] };

declare const pause = "pause";

type AnyJob = Job | Gate;

declare var jobs: AnyJob[];
"#;

#[test]
fn test_full_schema_shape() {
    let schema = load(DEPLOY_SCHEMA).unwrap();

    let names: Vec<_> = schema.types().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["Target", "Job", "Retry", "Gate", "AnyJob"]);
    assert_eq!(
        schema.type_decl("Target").unwrap().doc.as_deref(),
        Some("Deployment target for a release job.")
    );

    let root = schema.root();
    assert_eq!(root.name, "jobs");
    assert_eq!(root.ty.to_string(), "AnyJob[]");

    let constants: Vec<_> = schema.constants().map(|c| c.name.as_str()).collect();
    assert_eq!(constants, vec!["pause"]);
    assert_eq!(schema.constant("pause").unwrap().value, Scalar::from("pause"));
}

#[test]
fn test_flatten_alternatives_expands_named_variants() {
    let schema = load(DEPLOY_SCHEMA).unwrap();
    let any_job = TypeRef::Named("AnyJob".into());
    let labels: Vec<_> = schema
        .flatten_alternatives(&any_job)
        .into_iter()
        .map(|(label, _)| label)
        .collect();
    assert_eq!(labels, vec!["Job", "\"pause\"", "{ pause, notify? }"]);
}

#[test]
fn test_member_separators_are_interchangeable() {
    let schema = load(DEPLOY_SCHEMA).unwrap();
    let TypeRef::Record(job) = &schema.type_decl("Job").unwrap().ty else {
        panic!("Job should be a record");
    };
    let fields: Vec<_> = job.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(fields, vec!["run", "name", "target", "env", "retry"]);
    assert!(matches!(job.field("env").unwrap().ty, TypeRef::Map(_)));
    assert_eq!(job.field("retry").unwrap().ty.to_string(), "{ automatic } | { manual }");
}

#[test]
fn test_imports_are_skipped() {
    let schema = load("import \"./shared\";\ndeclare var names: string[];").unwrap();
    assert_eq!(schema.root().name, "names");
}

#[test]
fn test_duplicate_type_across_sources() {
    let err = SchemaLoader::new()
        .add_source("a.d.ts", "type Name = string;")
        .add_source("b.d.ts", "type Name = number;\ndeclare var n: Name;")
        .load()
        .unwrap_err();
    assert_eq!(err.kind, SchemaErrorKind::DuplicateType("Name".into()));
    assert_eq!(err.source_name, "b.d.ts");
}

#[test]
fn test_error_renders_with_miette() {
    let err = load("interface Step {\n  command: Comand;\n}\ndeclare var steps: Step[];").unwrap_err();
    assert_eq!(err.construct, "Comand");
    let report = miette::Report::new(err);
    let rendered = format!("{report:?}");
    assert!(rendered.contains("unknown type `Comand`"));
}

#[test]
fn test_lex_error_is_reported_as_syntax() {
    let err = load("type A = \"unterminated;\ndeclare var a: A;").unwrap_err();
    assert!(matches!(err.kind, SchemaErrorKind::Syntax(_)));
    assert_eq!(err.location.line, 1);
}

#[test]
fn test_mixed_index_signature_is_unsupported() {
    let err = load("interface M { [k: string]: string; name: string }\ndeclare var m: M;").unwrap_err();
    assert!(matches!(err.kind, SchemaErrorKind::Unsupported(_)));
}

#[test]
fn test_schema_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<pipetype_schema::Schema>();
}
