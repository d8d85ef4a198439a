//! Property-based tests for the program parser and checker.

use pipetype_core::Limits;
use pipetype_engine::{check, evaluate, parse_program, parse_program_with_limits};
use pipetype_schema::load;
use proptest::prelude::*;

const SCHEMA: &str = r#"
interface Step { command: string; label?: string }
declare const wait = "wait";
declare var steps: (Step | "wait")[];
"#;

// =============================================================================
// Strategies
// =============================================================================

fn fragment_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("const".to_string()),
        Just("let".to_string()),
        Just("steps".to_string()),
        Just("wait".to_string()),
        Just("=".to_string()),
        Just("=>".to_string()),
        Just("...".to_string()),
        Just("{".to_string()),
        Just("}".to_string()),
        Just("[".to_string()),
        Just("]".to_string()),
        Just("(".to_string()),
        Just(")".to_string()),
        Just(",".to_string()),
        Just(":".to_string()),
        Just(".".to_string()),
        Just("?".to_string()),
        Just(";".to_string()),
        Just("`a${".to_string()),
        Just("map".to_string()),
        Just("\n".to_string()),
        "[a-z]{1,5}".prop_map(String::from),
        "\"[a-z ]{0,5}\"".prop_map(String::from),
        "[0-9]{1,3}".prop_map(String::from),
    ]
}

fn token_soup_strategy() -> impl Strategy<Value = String> {
    proptest::collection::vec(fragment_strategy(), 0..40).prop_map(|parts| parts.join(" "))
}

fn label_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 :_-]{0,20}"
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn parser_never_panics(source in ".{0,200}") {
        let _ = parse_program("p.ts", &source);
    }

    #[test]
    fn token_soup_never_panics_in_any_stage(source in token_soup_strategy()) {
        let schema = load(SCHEMA).unwrap();
        match parse_program("p.ts", &source) {
            Ok(program) => {
                if let Ok(checked) = check(&schema, program) {
                    let _ = evaluate(&checked);
                }
            }
            Err(err) => prop_assert!(err.span.offset() <= source.len()),
        }
    }

    #[test]
    fn checked_programs_evaluate(labels in proptest::collection::vec(label_strategy(), 0..10)) {
        let schema = load(SCHEMA).unwrap();
        let list = labels
            .iter()
            .map(|l| format!("{l:?}"))
            .collect::<Vec<_>>()
            .join(", ");
        let source = format!(
            "const labels = [{list}];\nsteps = labels.map((label, i) => ({{ command: `step ${{i}}`, label }}));"
        );
        let program = parse_program("p.ts", &source).unwrap();
        let checked = check(&schema, program).unwrap();
        let value = evaluate(&checked).unwrap();
        prop_assert_eq!(value, pipetype_core::Value::Sequence(
            labels
                .iter()
                .enumerate()
                .map(|(i, label)| pipetype_core::Value::record([
                    ("command", pipetype_core::Value::string(format!("step {i}"))),
                    ("label", pipetype_core::Value::string(label.clone())),
                ]))
                .collect()
        ));
    }

    #[test]
    fn nesting_depth_is_bounded(depth in 1usize..200) {
        let source = format!("steps = {}[]{}", "(".repeat(depth), ")".repeat(depth));
        let limits = Limits { max_depth: 64, ..Limits::default() };
        let result = parse_program_with_limits("p.ts", &source, &limits);
        prop_assert_eq!(result.is_ok(), depth < 64);
    }

    #[test]
    fn template_nesting_depth_is_bounded(depth in 1usize..5000) {
        let source = format!("steps = [{}wait{}]", "`${".repeat(depth), "}`".repeat(depth));
        let limits = Limits { max_depth: 64, ..Limits::default() };
        let result = parse_program_with_limits("p.ts", &source, &limits);
        if depth > 64 {
            let err = result.unwrap_err();
            prop_assert!(err.to_string().contains("nested deeper than 64"));
        } else if depth <= 8 {
            prop_assert!(result.is_ok());
        }
    }
}
