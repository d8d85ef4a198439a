//! Property-based tests for the schema loader.
//!
//! The loader must reject malformed input with an error, never a panic,
//! and error locations must always point inside the source.

use pipetype_core::Limits;
use pipetype_schema::{SchemaLoader, load};
use proptest::prelude::*;

// =============================================================================
// Strategies
// =============================================================================

/// Fragments of declaration syntax, combined in arbitrary order.
fn fragment_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("interface".to_string()),
        Just("type".to_string()),
        Just("declare".to_string()),
        Just("var".to_string()),
        Just("const".to_string()),
        Just("export".to_string()),
        Just("string".to_string()),
        Just("number".to_string()),
        Just("OneOrMany".to_string()),
        Just("Array".to_string()),
        Just("{".to_string()),
        Just("}".to_string()),
        Just("[".to_string()),
        Just("]".to_string()),
        Just("<".to_string()),
        Just(">".to_string()),
        Just("(".to_string()),
        Just(")".to_string()),
        Just("|".to_string()),
        Just(":".to_string()),
        Just("?".to_string()),
        Just(";".to_string()),
        Just("=".to_string()),
        Just("\"wait\"".to_string()),
        Just("/** doc */".to_string()),
        Just("\n".to_string()),
        "[a-zA-Z_][a-zA-Z0-9_]{0,6}".prop_map(String::from),
        "-?[0-9]{1,3}".prop_map(String::from),
    ]
}

fn token_soup_strategy() -> impl Strategy<Value = String> {
    proptest::collection::vec(fragment_strategy(), 0..40).prop_map(|parts| parts.join(" "))
}

/// Deeply nested parenthesized types.
fn nested_type_strategy() -> impl Strategy<Value = (usize, String)> {
    (1usize..300).prop_map(|depth| {
        let source = format!(
            "declare var x: {}string{};",
            "(".repeat(depth),
            ")".repeat(depth)
        );
        (depth, source)
    })
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_arbitrary_text_never_panics(source in "\\PC{0,200}") {
        let _ = load(&source);
    }

    #[test]
    fn prop_token_soup_never_panics(source in token_soup_strategy()) {
        if let Err(err) = load(&source) {
            let offset: usize = err.span.offset();
            prop_assert!(offset <= source.len());
            prop_assert!(err.location.line >= 1);
        }
    }

    #[test]
    fn prop_nesting_is_bounded_by_limits((depth, source) in nested_type_strategy()) {
        let limits = Limits { max_depth: 64, ..Limits::default() };
        let result = SchemaLoader::new()
            .with_limits(limits)
            .add_source("nested.d.ts", source)
            .load();
        // The root type expression itself takes one level.
        prop_assert_eq!(result.is_ok(), depth < 64);
    }
}
