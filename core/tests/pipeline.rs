//! End-to-end runs: CSV in, recipe applied, records and errors out.

use serde_json::{json, Value};
use wrangler::ingest::{read_records, write_records};
use wrangler::{
    execute_text, migrate, DirectiveConfig, DirectiveRegistry, ExecutionError, ExecutorOptions, Pipeline, Record,
};

const PASSENGERS: &str = "\
PassengerId,Name,Fare,Cabin
1,\"Braund, Mr. Owen Harris\",7.25,
2,\"Cumings, Mrs. John Bradley\",71.2833,C85
3,\"Heikkinen, Miss. Laina\",7.925,
4,\"Futrelle, Mrs. Jacques Heath\",53.1,C123
5,\"Allen, Mr. William Henry\",8.05,
";

fn passengers() -> Vec<Record> {
    read_records(PASSENGERS, ',').unwrap().1
}

fn column(records: &[Record], name: &str) -> Vec<Value> {
    records.iter().map(|r| r.get(name).cloned().unwrap_or(Value::Null)).collect()
}

#[test]
fn test_send_to_error_splits_streams_in_order() {
    let result = execute_text("send-to-error Fare < 8.06", passengers(), &DirectiveConfig::default()).unwrap();

    assert!(result.is_ok());
    assert_eq!(column(&result.records, "PassengerId"), vec![json!("2"), json!("4")]);
    let diverted: Vec<_> = result.errors.iter().map(|e| e.record.get("PassengerId").cloned()).collect();
    assert_eq!(diverted, vec![Some(json!("1")), Some(json!("3")), Some(json!("5"))]);
    assert!(result.errors.iter().all(|e| e.reason == "Fare < 8.06" && e.directive == "send-to-error"));
}

#[test]
fn test_migrated_v1_recipe_runs() {
    let v1 = [
        "// clean up the manifest",
        "split Name , last_name rest",
        "trim rest",
        "set column fare_band Fare > 50 ? 'first' : 'other'",
        "drop Cabin,rest",
        "filter-row-if-true fare_band == 'other' && Fare > 8",
    ];
    let v2 = migrate(&v1).unwrap();
    assert_eq!(v2[0], v1[0]);
    assert_eq!(v2[4], "drop :Cabin,:rest;");

    let result = execute_text(&v2.join("\n"), passengers(), &DirectiveConfig::default()).unwrap();
    assert_eq!(result.steps.len(), 5);
    assert_eq!(
        column(&result.records, "last_name"),
        vec![json!("Braund"), json!("Cumings"), json!("Heikkinen"), json!("Futrelle")]
    );
    assert_eq!(
        result.records[1].columns().collect::<Vec<_>>(),
        vec!["PassengerId", "Name", "Fare", "last_name", "fare_band"]
    );
}

#[test]
fn test_fail_reports_after_whole_step() {
    let recipe = "fail exp:{Fare > 50};\nuppercase :Name;";
    let result = execute_text(recipe, passengers(), &DirectiveConfig::default()).unwrap();

    let fatal = result.fatal.as_ref().unwrap();
    assert_eq!(fatal.directive, "fail");
    assert_eq!(fatal.matched, 2);
    assert_eq!(result.errors.len(), 2);
    assert_eq!(result.records.len(), 3);
    assert_eq!(result.steps.len(), 1);
    assert_eq!(result.records[0].get("Name"), Some(&json!("Braund, Mr. Owen Harris")));
}

#[test]
fn test_variables_accumulate_in_record_order() {
    let recipe = "increment-variable cheap 1 exp:{Fare < 10};\nset-variable last exp:{PassengerId};";
    let result = execute_text(recipe, passengers(), &DirectiveConfig::default()).unwrap();

    assert_eq!(result.variables.get("cheap"), Some(&json!(3)));
    assert_eq!(result.variables.get("last"), Some(&json!("5")));
    assert_eq!(result.records.len(), 5);
}

#[test]
fn test_encode_decode_round_trip() {
    let records = vec![Record::from_pairs([
        ("col1", json!("Base32 Encoding")),
        ("col2", json!("Testing Base 64 Encoding")),
        ("col3", json!("Hex Encoding")),
    ])];
    let recipe = "\
encode base32 :col1;
encode base64 :col2;
encode hex :col3;
decode base32 :col1_encode_base32;
decode base64 :col2_encode_base64;
decode hex :col3_encode_hex;";
    let result = execute_text(recipe, records, &DirectiveConfig::default()).unwrap();
    let out = &result.records[0];

    assert_eq!(out.get("col1_encode_base32"), Some(&json!("IJQXGZJTGIQEK3TDN5SGS3TH")));
    assert_eq!(out.get("col2_encode_base64"), Some(&json!("VGVzdGluZyBCYXNlIDY0IEVuY29kaW5n")));
    assert_eq!(out.get("col3_encode_hex"), Some(&json!("48657820456e636f64696e67")));
    assert_eq!(out.get("col1_encode_base32_decode_base32"), Some(&json!("Base32 Encoding")));
    assert_eq!(out.get("col2_encode_base64_decode_base64"), Some(&json!("Testing Base 64 Encoding")));
    assert_eq!(out.get("col3_encode_hex_decode_hex"), Some(&json!("Hex Encoding")));
}

#[test]
fn test_parallel_run_matches_sequential() {
    let records: Vec<Record> = (0..5000)
        .map(|i| Record::from_pairs([("id", json!(i)), ("name", json!(format!("  user{i}  ")))]))
        .collect();
    let recipe = "trim :name;\nuppercase :name;\nsend-to-error exp:{id % 7 == 0};\nincrement-variable n 1 exp:{true};";
    let registry = DirectiveRegistry::with_builtins();
    let config = DirectiveConfig::default();

    let sequential = Pipeline::from_text(recipe, &config, &registry).unwrap().execute(records.clone());
    let parallel = Pipeline::from_text(recipe, &config, &registry)
        .unwrap()
        .with_options(ExecutorOptions {
            parallel: true,
            partition_size: 256,
        })
        .execute(records);

    assert_eq!(parallel.records, sequential.records);
    assert_eq!(parallel.errors, sequential.errors);
    assert_eq!(parallel.variables.get("n"), Some(&json!(4285)));
    assert!(parallel.steps[0].parallel);
    assert!(!parallel.steps[3].parallel);
}

#[test]
fn test_alias_dispatch_and_unsupported_directives() {
    let config = DirectiveConfig::new().with_alias("upper", "uppercase");
    let result = execute_text("upper :Name;", passengers(), &config).unwrap();
    assert_eq!(result.records[0].get("Name"), Some(&json!("BRAUND, MR. OWEN HARRIS")));
    assert_eq!(result.steps[0].directive, "upper");

    let err = execute_text("parse-as-xml :Name;", passengers(), &config).unwrap_err();
    assert!(matches!(err, ExecutionError::Directive(_)));

    let err = execute_text("uppercase :Name;\nswap :a;", passengers(), &config).unwrap_err();
    match err {
        ExecutionError::Recipe(line) => assert_eq!(line.line, 2),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_output_csv_round_trip() {
    let result = execute_text(
        "keep :PassengerId,:Fare;\nset-column :Fare exp:{Fare * 2};",
        passengers(),
        &DirectiveConfig::default(),
    )
    .unwrap();

    let mut out = Vec::new();
    write_records(&mut out, &result.records, ',').unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("PassengerId,Fare\n1,14.5\n"));
    assert_eq!(read_records(&text, ',').unwrap().1.len(), 5);
}

#[test]
fn test_hash_sha1_runs_end_to_end() {
    let records = vec![Record::from_pairs([("col", json!("abc"))])];
    let result = execute_text("hash :col 'SHA1' true;", records, &DirectiveConfig::default()).unwrap();

    assert!(result.is_ok());
    assert_eq!(result.records[0].get("col"), Some(&json!("a9993e364706816aba3e25717850c26c9cd0d89d")));
}

#[test]
fn test_same_recipe_twice_gives_same_result() {
    let input: Vec<Record> = ["name,fare", "x,1", "y,20", "z,3"]
        .iter()
        .map(|line| Record::from_pairs([("body", json!(line))]))
        .collect();
    let recipe = "\
parse-as-csv :body ',' true;
drop :body;
send-to-error exp:{fare > 10};
increment-variable n 1 exp:{true};
set-variable last exp:{name};";
    let config = DirectiveConfig::default();

    let first = execute_text(recipe, input.clone(), &config).unwrap();
    let second = execute_text(recipe, input, &config).unwrap();

    assert_eq!(column(&first.records, "name"), vec![json!("x"), json!("z")]);
    assert_eq!(first.variables.get("n"), Some(&json!(2)));
    assert_eq!(first.variables.get("last"), Some(&json!("z")));

    assert_eq!(second.records, first.records);
    assert_eq!(second.errors, first.errors);
    assert_eq!(second.variables, first.variables);
    let counts = |r: &wrangler::ExecutionResult| -> Vec<(usize, usize, usize)> {
        r.steps.iter().map(|s| (s.input, s.output, s.diverted)).collect()
    };
    assert_eq!(counts(&second), counts(&first));
}
