//! V1 → V2 migration over a full recipe covering every directive family.

use proptest::prelude::*;
use wrangler::grammar::{MigrateToV2, MigrationOptions};
use wrangler::{migrate, DirectiveConfig, GrammarMigration, MigrationError, ParseError};

const GOLDEN: &[(&str, &str)] = &[
    ("set column salary salary > 100 ? 100 : salary", "set-column :salary exp:{salary > 100 ? 100 : salary};"),
    ("set columns fname,lname,address,city,state,country,zipcode", "set-columns :fname,:lname,:address,:city,:state,:country,:zipcode;"),
    ("rename body_fname fname", "rename :body_fname :fname;"),
    ("set-type value int", "set-type :value int;"),
    ("drop fname,lname,address,zipcode,city", "drop :fname,:lname,:address,:zipcode,:city;"),
    ("merge fname lname name ,", "merge :fname :lname :name ',';"),
    ("uppercase name", "uppercase :name;"),
    ("lowercase name", "lowercase :name;"),
    ("titlecase name", "titlecase :name;"),
    ("indexsplit department 1 10 zone", "indexsplit :department 1 10 :zone;"),
    ("split name , fname lname", "split :name ',' :fname :lname;"),
    ("filter-row-if-matched address .*?", "filter-row-if-matched :address '.*?';"),
    ("filter-row-if-not-matched address .*?", "filter-row-if-not-matched :address '.*?';"),
    ("filter-row-if-true age < 10.0", "filter-row-if-true exp:{age < 10.0};"),
    ("filter-row-if-false age < 10.0 && gender == 'm'", "filter-row-if-false exp:{age < 10.0 && gender == 'm'};"),
    ("set-variable test count > 10", "set-variable test exp:{count > 10};"),
    ("increment-variable test 1 count > 10", "increment-variable test 1 exp:{count > 10};"),
    ("mask-number ssn xxx-xx-####", "mask-number :ssn 'xxx-xx-####';"),
    ("mask-shuffle address", "mask-shuffle :address;"),
    ("format-date startdate yyyy-MM-dd", "format-date :startdate 'yyyy-MM-dd';"),
    ("format-unix-timestamp timestamp yyyy/MM/dd", "format-unix-timestamp :timestamp 'yyyy/MM/dd';"),
    ("quantize col1 col2 1:2=test,3:4=test1", "quantize :col1 :col2 1:2=test,3:4=test1;"),
    ("find-and-replace name s/test//g", "find-and-replace :name 's/test//g';"),
    ("parse-as-csv body , true", "parse-as-csv :body ',' true;"),
    ("parse-as-json body 1", "parse-as-json :body 1;"),
    ("parse-as-protobuf body test event 1.0", "parse-as-protobuf :body test 'event' '1.0';"),
    ("json-path source target a/b/c", "json-path :source :target 'a/b/c';"),
    ("set-charset body utf-8", "set-charset :body utf-8;"),
    ("invoke-http http://a.b/json fname,lname,address a=b,x=y", "invoke-http 'http://a.b/json' :fname,:lname,:address 'a=b,x=y';"),
    ("set-record-delim body , 10", "set-record-delim :body ',' 10;"),
    ("parse-as-fixed-length body 3,4,5,6,7,8 #", "parse-as-fixed-length :body 3,4,5,6,7,8 '#';"),
    ("split-to-rows body ,", "split-to-rows :body ',';"),
    ("split-to-columns body ,", "split-to-columns :body ',';"),
    ("parse-xml-to-json body 1", "parse-xml-to-json :body 1;"),
    ("parse-as-xml xml", "parse-as-xml :xml;"),
    ("parse-as-excel body 0", "parse-as-excel :body '0';"),
    ("xpath name fname /items/item/first_name", "xpath :name :fname '/items/item/first_name';"),
    ("xpath-array name fname /items/item/first_name", "xpath-array :name :fname '/items/item/first_name';"),
    ("flatten a,b,c,d", "flatten :a,:b,:c,:d;"),
    ("copy source target true", "copy :source :target true;"),
    ("fill-null-or-empty value ,", "fill-null-or-empty :value ',';"),
    ("cut-character phone areacode 1-3", "cut-character :phone :areacode '1-3';"),
    ("generate-uuid ssn", "generate-uuid :ssn;"),
    ("url-encode url", "url-encode :url;"),
    ("url-decode url", "url-decode :url;"),
    ("parse-as-log body %m-%y-%{HOSTNAME}", "parse-as-log :body '%m-%y-%{HOSTNAME}';"),
    ("parse-as-date date UTC", "parse-as-date :date 'UTC';"),
    ("parse-as-simple-date date yyyy-MM-dd", "parse-as-simple-date :date 'yyyy-MM-dd';"),
    ("diff-date date1 date2 diffdate", "diff-date :date1 :date2 :diffdate;"),
    ("keep fname,lname,address,city,zipcode", "keep :fname,:lname,:address,:city,:zipcode;"),
    ("parse-as-hl7 body 1", "parse-as-hl7 :body 1;"),
    ("split-email email", "split-email :email;"),
    ("swap col1 col2", "swap :col1 :col2;"),
    ("hash col SHA1 true", "hash :col 'SHA1' true;"),
    ("write-as-json-map output", "write-as-json-map :output;"),
    ("write-as-json-object output fname,lname,address", "write-as-json-object :output :fname,:lname,:address;"),
    ("write-as-csv output", "write-as-csv :output;"),
    ("filter-rows-on condition-false output < 10", "filter-rows-on condition-false exp:{output < 10};"),
    ("filter-rows-on condition-true output < 10", "filter-rows-on condition-true exp:{output < 10};"),
    ("filter-rows-on empty-or-null-columns fname,lname", "filter-rows-on empty-or-null-columns :fname,:lname;"),
    ("filter-rows-on regex-match col test*", "filter-rows-on regex-match :col 'test*';"),
    ("filter-rows-on regex-not-match col test*", "filter-rows-on regex-not-match :col 'test*';"),
    ("parse-as-avro-file body", "parse-as-avro-file :body;"),
    ("send-to-error Fare < 8.06", "send-to-error exp:{Fare < 8.06};"),
    ("fail Fare < 8.06", "fail exp:{Fare < 8.06};"),
    ("text-distance abc col1 col2 output", "text-distance abc :col1 :col2 :output;"),
    ("text-metric abc col1 col2 output", "text-metric abc :col1 :col2 :output;"),
    ("catalog-lookup ICD-9 value", "catalog-lookup 'ICD-9' :value;"),
    ("table-lookup value mylookup-table", "table-lookup :value 'mylookup-table';"),
    ("stemming text", "stemming :text;"),
    ("columns-replace s/body_//g", "columns-replace 's/body_//g';"),
    ("extract-regex-groups body s/body_//g", "extract-regex-groups :body 's/body_//g';"),
    ("split-url url", "split-url :url;"),
    ("cleanse-column-names", "cleanse-column-names;"),
    ("change-column-case upper", "change-column-case upper;"),
    ("set-column value output > 10 ? 'test' : 'non-test'", "set-column :value exp:{output > 10 ? 'test' : 'non-test'};"),
    ("encode base64 binary", "encode base64 :binary;"),
    ("decode base64 binary", "decode base64 :binary;"),
    ("trim name", "trim :name;"),
    ("ltrim name", "ltrim :name;"),
    ("rtrim name", "rtrim :name;"),
    ("find-and-replace name s/'//g", r"find-and-replace :name 's/\'//g';"),
    ("set-column out name == '{}' ? 1 : 0", "set-column :out exp:{name == '{}' ? 1 : 0};"),
];

fn inputs() -> Vec<String> {
    GOLDEN.iter().map(|(v1, _)| v1.to_string()).collect()
}

fn expected() -> Vec<String> {
    GOLDEN.iter().map(|(_, v2)| v2.to_string()).collect()
}

#[test]
fn test_golden_recipe_migrates_line_for_line() {
    let migrator = MigrateToV2::default();
    let actual = migrator.migrate(&inputs()).unwrap();

    assert_eq!(actual.len(), GOLDEN.len());
    for ((v1, v2), got) in GOLDEN.iter().zip(&actual) {
        assert_eq!(got, v2, "migrating '{v1}'");
    }
}

#[test]
fn test_migration_is_idempotent_on_golden_output() {
    assert_eq!(migrate(&expected()).unwrap(), expected());
}

#[test]
fn test_failures_keep_line_positions() {
    let mut lines = inputs();
    lines.insert(3, "frobnicate :x;".to_string());
    lines.insert(10, "rename :only_one;".to_string());

    let err = migrate(&lines).unwrap_err();
    let MigrationError::Incomplete { failures, partial } = err else {
        panic!("expected an incomplete migration");
    };
    assert_eq!(partial.len(), lines.len());
    assert_eq!(failures.iter().map(|f| f.line).collect::<Vec<_>>(), vec![4, 11]);
    assert!(matches!(failures[0].source, ParseError::UnknownDirective { .. }));
    assert!(matches!(failures[1].source, ParseError::Arity { .. }));
    assert_eq!(partial[3], "frobnicate :x;");
    assert_eq!(partial[4], GOLDEN[3].1);
}

#[test]
fn test_fail_fast_stops_at_first_bad_line() {
    let mut lines = inputs();
    lines.insert(5, "uppercase".to_string());

    let migrator = MigrateToV2::default().with_options(MigrationOptions { fail_fast: true });
    match migrator.migrate(&lines) {
        Err(MigrationError::Aborted(error)) => assert_eq!(error.line, 6),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_unbalanced_expression_fails_instead_of_emitting_unreadable_text() {
    let lines = ["uppercase name", "set-column out name == '}' ? 1 : 0"];
    let err = migrate(&lines).unwrap_err();
    let MigrationError::Incomplete { failures, partial } = err else {
        panic!("expected an incomplete migration");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].line, 2);
    assert!(matches!(failures[0].source, ParseError::UnbalancedExpression { .. }));
    assert_eq!(partial, vec!["uppercase :name;", lines[1]]);
}

#[test]
fn test_configured_aliases_and_exclusions() {
    let config = DirectiveConfig::new()
        .with_alias("json-parser", "parse-as-json")
        .with_exclusion("invoke-http");
    let migrator = MigrateToV2::new(config);

    let lines = vec!["json-parser body 1".to_string()];
    assert_eq!(migrator.migrate(&lines).unwrap(), vec!["json-parser :body 1;"]);

    let lines = vec!["invoke-http http://a.b/json fname a=b".to_string()];
    let err = migrator.migrate(&lines).unwrap_err();
    assert!(matches!(err.failures()[0].source, ParseError::ExcludedDirective { .. }));
}

proptest! {
    #[test]
    fn prop_migration_preserves_count_and_is_idempotent(
        picks in prop::collection::vec(0..GOLDEN.len(), 1..40),
        blanks in prop::collection::vec(any::<bool>(), 40),
    ) {
        let lines: Vec<String> = picks
            .iter()
            .zip(&blanks)
            .map(|(&i, &blank)| if blank { "// note".to_string() } else { GOLDEN[i].0.to_string() })
            .collect();

        let once = migrate(&lines).unwrap();
        prop_assert_eq!(once.len(), lines.len());
        let twice = migrate(&once).unwrap();
        prop_assert_eq!(twice, once);
    }
}
