// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use yare::parameterized;

fn attributes() -> Value {
    json!({
        "a": "Heloooo",
        "method": "post",
        "status": 200,
        "latency": 12.5,
        "count": "7",
        "ok": true,
        "tags": ["fast", "cached"],
        "headers": {"Content-Type": "text/plain", "x-id": 4},
        "nested": {"list": [1, {"deep": "value"}]}
    })
}

fn check(source: &str) -> bool {
    Predicate::parse(source, source).unwrap().matches(&attributes())
}

#[parameterized(
    equal = { "method=post" },
    double_equal = { "method==post" },
    quoted = { "method='post'" },
    number_equal = { "status=200" },
    float_equal = { "latency==12.5" },
    numeric_string = { "count=7" },
    bool_equal = { "ok=true" },
    not_equal = { "method!=get" },
    greater = { "status>199" },
    greater_equal = { "status>=200" },
    less = { "latency<13" },
    less_equal = { "latency<=12.5" },
    numeric_string_order = { "count>6" },
    string_order = { "method>get" },
    search = { "a~=u?lo+" },
    search_quoted = { "a~='l{2}|lo'" },
    full_match = { "a~==He.*o" },
    member_of_list = { "tags<~cached" },
    key_of_map = { "headers<~x-id" },
    substring = { "a<~loo" },
    bracketed_path = { "headers['Content-Type']=text/plain" },
    nested_path = { "nested.list[1].deep=value" },
    spaced = { " status >= 100 " },
)]
fn predicate_matches(source: &str) {
    assert!(check(source), "{} should match", source);
}

#[parameterized(
    wrong_value = { "method=get" },
    not_equal_same = { "method!=post" },
    missing_attribute = { "missing=1" },
    missing_with_not_equal = { "missing!=1" },
    greater_fails = { "status>200" },
    regex_no_match = { "a~=u?lo+x" },
    full_match_requires_whole_value = { "a~==loo" },
    not_a_member = { "tags<~slow" },
    membership_on_number = { "status<~2" },
    bool_vs_string = { "ok=yes" },
    ordering_collections = { "tags>1" },
)]
fn predicate_rejects(source: &str) {
    assert!(!check(source), "{} should not match", source);
}

#[test]
fn scenario_regex_search() {
    let predicate = Predicate::parse("a~=u?lo+", "FooEvent[a~=u?lo+]").unwrap();
    assert!(!predicate.matches(&json!({"a": "Helllll"})));
    assert!(predicate.matches(&json!({"a": "Heloooo"})));
}

#[parameterized(
    no_operator = { "method" },
    unknown_operator = { "method=~post" },
    no_value = { "method=" },
    bad_path = { "[0]=1" },
    bad_regex = { "a~=(unclosed" },
)]
fn malformed_predicates_fail_to_parse(source: &str) {
    assert!(Predicate::parse(source, source).is_err());
}

#[test]
fn literals_are_typed() {
    assert_eq!(parse_literal("42"), json!(42));
    assert_eq!(parse_literal("-1.5"), json!(-1.5));
    assert_eq!(parse_literal("true"), json!(true));
    assert_eq!(parse_literal("null"), Value::Null);
    assert_eq!(parse_literal("'42'"), json!("42"));
    assert_eq!(parse_literal("\"a b\""), json!("a b"));
    assert_eq!(parse_literal("plain"), json!("plain"));
    assert_eq!(parse_literal("inf"), json!("inf"));
}
