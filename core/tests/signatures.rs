//! Every registered signature rejects short, long and mistyped argument lists.

use wrangler::grammar::{ElementKind, Param, Shape};
use wrangler::{all_signatures, parse_line, ArgumentKind, DirectiveConfig, ParseError};

/// A token each kind accepts.
fn valid_token(kind: ArgumentKind) -> &'static str {
    match kind {
        ArgumentKind::Column => ":a",
        ArgumentKind::Text => "'t'",
        ArgumentKind::Number => "1",
        ArgumentKind::List(ElementKind::Column) => ":a,:b",
        ArgumentKind::List(ElementKind::Number) => "1,2",
        ArgumentKind::List(ElementKind::Raw) => "x,y",
        ArgumentKind::Expression => "exp:{a}",
        ArgumentKind::Raw => "x",
    }
}

/// No positional kind other than an expression takes an expression block.
const WRONG_KIND: &str = "exp:{a}";

/// `(directive head, parameters, position offset)` for every shape.
fn forms() -> Vec<(String, &'static [Param], usize)> {
    let mut forms = Vec::new();
    for signature in all_signatures() {
        match signature.shape {
            Shape::Fixed(params) => forms.push((signature.name.to_string(), params, 0)),
            Shape::Dispatch(cases) => {
                for case in cases {
                    forms.push((format!("{} {}", signature.name, case.keyword), case.params, 1));
                }
            }
        }
    }
    forms
}

fn line(head: &str, tokens: &[&str]) -> String {
    let mut parts = vec![head];
    parts.extend_from_slice(tokens);
    format!("{};", parts.join(" "))
}

#[test]
fn test_every_signature_accepts_its_full_form() {
    let config = DirectiveConfig::default();
    for (head, params, _) in forms() {
        let tokens: Vec<&str> = params.iter().map(|p| valid_token(p.kind)).collect();
        let text = line(&head, &tokens);
        assert!(parse_line(&text, &config).is_ok(), "'{text}' should parse");
    }
}

#[test]
fn test_every_signature_rejects_too_few_arguments() {
    let config = DirectiveConfig::default();
    for (head, params, offset) in forms() {
        let required = params.iter().take_while(|p| !p.optional).count();
        if required == 0 {
            continue;
        }
        let tokens: Vec<&str> = params[..required - 1].iter().map(|p| valid_token(p.kind)).collect();
        let text = line(&head, &tokens);
        match parse_line(&text, &config) {
            Err(ParseError::Arity { found, .. }) => assert_eq!(found, offset + required - 1, "'{text}'"),
            other => panic!("'{text}' gave {other:?}"),
        }
    }
}

#[test]
fn test_every_signature_rejects_too_many_arguments() {
    let config = DirectiveConfig::default();
    for (head, params, offset) in forms() {
        let mut tokens: Vec<&str> = params.iter().map(|p| valid_token(p.kind)).collect();
        tokens.push("extra");
        let text = line(&head, &tokens);
        match parse_line(&text, &config) {
            Err(ParseError::Arity { found, .. }) => assert_eq!(found, offset + params.len() + 1, "'{text}'"),
            other => panic!("'{text}' gave {other:?}"),
        }
    }
}

#[test]
fn test_every_signature_rejects_wrong_kind_tokens() {
    let config = DirectiveConfig::default();
    for (head, params, offset) in forms() {
        for (index, param) in params.iter().enumerate() {
            if param.kind == ArgumentKind::Expression {
                continue;
            }
            let mut tokens: Vec<&str> = params.iter().map(|p| valid_token(p.kind)).collect();
            tokens[index] = WRONG_KIND;
            let text = line(&head, &tokens);
            match parse_line(&text, &config) {
                Err(ParseError::Type { position, expected, .. }) => {
                    assert_eq!(position, offset + index + 1, "'{text}'");
                    assert_eq!(expected, param.kind.to_string(), "'{text}'");
                }
                other => panic!("'{text}' gave {other:?}"),
            }
        }
    }
}

#[test]
fn test_dispatch_keyword_must_be_known() {
    let config = DirectiveConfig::default();
    for signature in all_signatures() {
        if let Shape::Dispatch(_) = signature.shape {
            let text = format!("{} {WRONG_KIND};", signature.name);
            assert!(
                matches!(parse_line(&text, &config), Err(ParseError::Type { position: 1, .. })),
                "'{text}'"
            );
        }
    }
}
