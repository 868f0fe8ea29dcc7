//! Directive parser.
//!
//! One generic engine driven by the signature table: tokens are bound to the
//! parameters of the directive's [`Signature`] position by position. Both V1
//! (bare words, trailing raw expressions) and V2 (`:col`, quoted literals,
//! `exp:{}`) forms are accepted and normalize to the same [`Argument`]s.

use super::directive::{Argument, Numeric, ParsedDirective};
use super::signature::{self, ArgumentKind, ElementKind, Param, Shape, Signature};
use super::token::{Token, TokenKind};
use super::tokenizer::{is_number, tokenize};
use crate::config::DirectiveConfig;
use crate::error::{LineError, ParseError, ParseResult};

/// Column reference marker in V2 text.
pub const COLUMN_MARKER: char = ':';

/// Blank lines and `//` or `#` comments carry no directive.
pub fn is_blank_or_comment(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with("//") || trimmed.starts_with('#')
}

/// Parse one directive line.
///
/// A trailing `;` is optional. A line holding more than one statement is a
/// syntax error here; use [`RecipeParser`] for multi-statement text.
pub fn parse_line(line: &str, config: &DirectiveConfig) -> ParseResult<ParsedDirective> {
    let tokens = tokenize(line)?;
    let mut statements = split_statements(&tokens);
    match statements.len() {
        0 => Err(ParseError::Empty),
        1 => parse_statement(statements.remove(0), config),
        _ => Err(ParseError::syntax(
            statements[1][0].span.column(),
            "more than one statement on the line",
        )),
    }
}

/// Split tokens on `;`, dropping empty statements.
fn split_statements(tokens: &[Token]) -> Vec<&[Token]> {
    tokens
        .split(Token::is_delimiter)
        .filter(|statement| !statement.is_empty())
        .collect()
}

/// Parse one statement (no delimiter tokens): resolve its name through the
/// configuration, look up the signature and bind the arguments.
pub fn parse_statement(tokens: &[Token], config: &DirectiveConfig) -> ParseResult<ParsedDirective> {
    let Some(head) = tokens.first() else {
        return Err(ParseError::Empty);
    };
    if head.kind != TokenKind::Word {
        return Err(ParseError::syntax(head.span.column(), "expected a directive name"));
    }

    let written = head.value.as_str();
    let mut name = written.to_string();
    let mut consumed = 1;
    if let Some(next) = tokens.get(1).filter(|t| t.kind == TokenKind::Word) {
        if let Some(canonical) = signature::legacy_compound(written, &next.value) {
            name = canonical.to_string();
            consumed = 2;
        }
    }

    if config.is_excluded(written) || config.is_excluded(&name) {
        return Err(ParseError::ExcludedDirective { name });
    }
    let canonical = config.resolve(&name).to_string();
    if config.is_excluded(&canonical) {
        return Err(ParseError::ExcludedDirective { name });
    }

    let signature = signature::signature_of(&canonical)
        .ok_or_else(|| ParseError::UnknownDirective { name: name.clone() })?;
    let arguments = bind_arguments(signature, &tokens[consumed..])?;

    Ok(ParsedDirective::new(name, arguments).with_canonical(canonical))
}

/// Parse `tokens` (directive name first) against an explicit signature.
pub fn parse(tokens: &[Token], signature: &Signature) -> ParseResult<ParsedDirective> {
    let Some(head) = tokens.first() else {
        return Err(ParseError::Empty);
    };
    let arguments = bind_arguments(signature, &tokens[1..])?;
    Ok(ParsedDirective::new(head.value.clone(), arguments).with_canonical(signature.name))
}

/// Bind argument tokens to the signature's parameters.
pub fn bind_arguments(signature: &Signature, tokens: &[Token]) -> ParseResult<Vec<Argument>> {
    match signature.shape {
        Shape::Fixed(params) => bind(signature.name, params, tokens, 0),
        Shape::Dispatch(cases) => {
            let keywords: Vec<&str> = cases.iter().map(|c| c.keyword).collect();
            let Some(head) = tokens.first() else {
                return Err(ParseError::Arity {
                    directive: signature.name.to_string(),
                    expected: "at least 1".to_string(),
                    found: 0,
                });
            };
            let case = (head.kind == TokenKind::Word)
                .then(|| signature.case(&head.value))
                .flatten()
                .ok_or_else(|| ParseError::Type {
                    directive: signature.name.to_string(),
                    position: 1,
                    expected: format!("one of {}", keywords.join(", ")),
                    found: head.text.clone(),
                })?;

            let mut arguments = vec![Argument::RawToken(case.keyword.to_string())];
            arguments.extend(bind(signature.name, case.params, &tokens[1..], 1)?);
            Ok(arguments)
        }
    }
}

fn bind(directive: &str, params: &[Param], tokens: &[Token], offset: usize) -> ParseResult<Vec<Argument>> {
    let arity_error = || ParseError::Arity {
        directive: directive.to_string(),
        expected: expected_arity(params, offset),
        found: offset + tokens.len(),
    };

    let mut arguments = Vec::with_capacity(params.len());
    let mut cursor = 0;

    for (index, param) in params.iter().enumerate() {
        let Some(token) = tokens.get(cursor) else {
            if param.optional {
                break;
            }
            return Err(arity_error());
        };
        if param.kind == ArgumentKind::Expression {
            if token.kind == TokenKind::ExpressionBlock {
                arguments.push(Argument::ExpressionBlock(token.value.clone()));
                cursor += 1;
            } else {
                // V1: the rest of the line is the expression.
                let body: Vec<&str> = tokens[cursor..].iter().map(|t| t.text.as_str()).collect();
                arguments.push(Argument::ExpressionBlock(body.join(" ")));
                cursor = tokens.len();
            }
            continue;
        }

        arguments.push(convert(directive, offset + index + 1, param.kind, token)?);
        cursor += 1;
    }

    if cursor < tokens.len() {
        return Err(arity_error());
    }
    Ok(arguments)
}

fn expected_arity(params: &[Param], offset: usize) -> String {
    if offset == 0 {
        return signature::arity(params);
    }
    let required = params.iter().filter(|p| !p.optional).count() + offset;
    let total = params.len() + offset;
    if required == total {
        total.to_string()
    } else {
        format!("{required} to {total}")
    }
}

fn type_error(directive: &str, position: usize, expected: ArgumentKind, token: &Token) -> ParseError {
    ParseError::Type {
        directive: directive.to_string(),
        position,
        expected: expected.to_string(),
        found: token.text.clone(),
    }
}

fn strip_marker(name: &str) -> &str {
    name.strip_prefix(COLUMN_MARKER).unwrap_or(name)
}

fn convert(directive: &str, position: usize, kind: ArgumentKind, token: &Token) -> ParseResult<Argument> {
    let mismatch = || type_error(directive, position, kind, token);

    match kind {
        ArgumentKind::Column => match token.kind {
            TokenKind::Word | TokenKind::Number => {
                let name = strip_marker(&token.value);
                if name.is_empty() {
                    return Err(mismatch());
                }
                Ok(Argument::ColumnRef(name.to_string()))
            }
            _ => Err(mismatch()),
        },
        ArgumentKind::Text => match token.kind {
            TokenKind::QuotedString | TokenKind::Word | TokenKind::Number | TokenKind::List => {
                Ok(Argument::StringLiteral(token.value.clone()))
            }
            _ => Err(mismatch()),
        },
        ArgumentKind::Number => match token.kind {
            TokenKind::Number => Numeric::parse(&token.value)
                .map(Argument::NumericLiteral)
                .ok_or_else(mismatch),
            _ => Err(mismatch()),
        },
        ArgumentKind::List(element) => {
            if !matches!(token.kind, TokenKind::List | TokenKind::Word | TokenKind::Number) {
                return Err(mismatch());
            }
            let mut items = Vec::new();
            for item in token.elements() {
                let item = match element {
                    ElementKind::Column => strip_marker(item),
                    ElementKind::Number | ElementKind::Raw => item,
                };
                let valid = match element {
                    ElementKind::Column => !item.is_empty(),
                    ElementKind::Number => is_number(item),
                    ElementKind::Raw => true,
                };
                if !valid {
                    return Err(mismatch());
                }
                items.push(item.to_string());
            }
            Ok(Argument::List { element, items })
        }
        ArgumentKind::Raw => match token.kind {
            TokenKind::Word | TokenKind::Number | TokenKind::List => Ok(Argument::RawToken(token.value.clone())),
            _ => Err(mismatch()),
        },
        // Expressions are bound in `bind`, which may consume several tokens.
        ArgumentKind::Expression => match token.kind {
            TokenKind::ExpressionBlock => Ok(Argument::ExpressionBlock(token.value.clone())),
            _ => Err(mismatch()),
        },
    }
}

// =============================================================================
// Recipes
// =============================================================================

/// A directive with the 1-based recipe line it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub line: usize,
    pub directive: ParsedDirective,
}

/// Ordered directives in authoring order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recipe {
    pub steps: Vec<Step>,
}

impl Recipe {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn directives(&self) -> impl Iterator<Item = &ParsedDirective> {
        self.steps.iter().map(|s| &s.directive)
    }

    pub fn into_directives(self) -> Vec<ParsedDirective> {
        self.steps.into_iter().map(|s| s.directive).collect()
    }

    /// Canonical text, one directive per line.
    pub fn to_v2(&self) -> String {
        self.directives().map(ParsedDirective::to_v2).collect::<Vec<_>>().join("\n")
    }
}

/// Parses whole recipe texts: skips blank and comment lines and allows
/// several `;`-terminated statements on one line.
pub struct RecipeParser<'a> {
    config: &'a DirectiveConfig,
}

impl<'a> RecipeParser<'a> {
    pub fn new(config: &'a DirectiveConfig) -> Self {
        Self { config }
    }

    /// Parse recipe text, stopping at the first bad line.
    pub fn parse(&self, text: &str) -> Result<Recipe, LineError> {
        let lines: Vec<&str> = text.lines().collect();
        self.parse_lines(&lines)
    }

    pub fn parse_lines<S: AsRef<str>>(&self, lines: &[S]) -> Result<Recipe, LineError> {
        let mut recipe = Recipe::default();

        for (index, line) in lines.iter().enumerate() {
            let line = line.as_ref();
            let number = index + 1;
            if is_blank_or_comment(line) {
                continue;
            }

            let tokens = tokenize(line).map_err(|e| LineError::new(number, e))?;
            for statement in split_statements(&tokens) {
                let directive =
                    parse_statement(statement, self.config).map_err(|e| LineError::new(number, e))?;
                recipe.steps.push(Step { line: number, directive });
            }
        }

        tracing::debug!(directives = recipe.len(), "parsed recipe");
        Ok(recipe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_default(line: &str) -> ParseResult<ParsedDirective> {
        parse_line(line, &DirectiveConfig::default())
    }

    #[test]
    fn test_v1_and_v2_columns_are_equivalent() {
        let v1 = parse_default("rename body_fname fname").unwrap();
        let v2 = parse_default("rename :body_fname :fname;").unwrap();
        assert_eq!(v1, v2);
        assert_eq!(v1.arguments[0], Argument::ColumnRef("body_fname".into()));
    }

    #[test]
    fn test_v1_expression_consumes_rest_of_line() {
        let d = parse_default("set-column salary salary > 100 ? 100 : salary").unwrap();
        assert_eq!(d.expression(1), Some("salary > 100 ? 100 : salary"));

        let v2 = parse_default("set-column :salary exp:{salary > 100 ? 100 : salary};").unwrap();
        assert_eq!(d, v2);
    }

    #[test]
    fn test_legacy_compound_name() {
        let d = parse_default("set columns a,b,c").unwrap();
        assert_eq!(d.name, "set-columns");
        assert_eq!(d.list(0).unwrap(), ["a", "b", "c"]);
    }

    #[test]
    fn test_dispatch_on_sub_keyword() {
        let d = parse_default("filter-rows-on regex-match col test*").unwrap();
        assert_eq!(d.raw(0), Some("regex-match"));
        assert_eq!(d.column(1), Some("col"));
        assert_eq!(d.text(2), Some("test*"));

        let err = parse_default("filter-rows-on sometimes col").unwrap_err();
        assert!(matches!(err, ParseError::Type { position: 1, .. }));

        let err = parse_default("filter-rows-on").unwrap_err();
        assert!(matches!(err, ParseError::Arity { found: 0, .. }));
    }

    #[test]
    fn test_arity_errors() {
        let err = parse_default("rename a").unwrap_err();
        assert_eq!(
            err,
            ParseError::Arity {
                directive: "rename".into(),
                expected: "2".into(),
                found: 1
            }
        );

        let err = parse_default("swap a b c").unwrap_err();
        assert!(matches!(err, ParseError::Arity { found: 3, .. }));

        let err = parse_default("filter-rows-on regex-match col").unwrap_err();
        assert!(matches!(err, ParseError::Arity { ref expected, found: 2, .. } if expected == "3"));
    }

    #[test]
    fn test_optional_trailing_arguments() {
        let d = parse_default("copy a b").unwrap();
        assert_eq!(d.arguments.len(), 2);
        let d = parse_default("copy a b true").unwrap();
        assert_eq!(d.raw(2), Some("true"));
        let err = parse_default("copy a b true extra").unwrap_err();
        assert!(matches!(err, ParseError::Arity { ref expected, .. } if expected == "2 to 3"));
    }

    #[test]
    fn test_type_errors() {
        let err = parse_default("indexsplit department one 10 zone").unwrap_err();
        assert_eq!(
            err,
            ParseError::Type {
                directive: "indexsplit".into(),
                position: 2,
                expected: "number".into(),
                found: "one".into()
            }
        );

        let err = parse_default("uppercase 'name'").unwrap_err();
        assert!(matches!(err, ParseError::Type { position: 1, .. }));

        let err = parse_default("parse-as-fixed-length body 3,x,5").unwrap_err();
        assert!(matches!(err, ParseError::Type { position: 2, .. }));
    }

    #[test]
    fn test_unknown_and_excluded() {
        assert_eq!(
            parse_default("frobnicate a").unwrap_err(),
            ParseError::UnknownDirective { name: "frobnicate".into() }
        );

        let config = DirectiveConfig::new()
            .with_exclusion("parse-as-json")
            .with_alias("json-parser", "parse-as-json")
            .with_alias("upper", "uppercase");

        let err = parse_line("json-parser body", &config).unwrap_err();
        assert_eq!(err, ParseError::ExcludedDirective { name: "json-parser".into() });

        let d = parse_line("upper name", &config).unwrap();
        assert_eq!(d.name, "upper");
        assert_eq!(d.canonical, "uppercase");
        assert_eq!(d.to_v2(), "upper :name;");

        let config = DirectiveConfig::new().with_exclusion("set");
        assert!(matches!(
            parse_line("set column a b", &config).unwrap_err(),
            ParseError::ExcludedDirective { .. }
        ));
    }

    #[test]
    fn test_multiple_statements_rejected_per_line() {
        let err = parse_default("drop :a; drop :b;").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { column: 10, .. }));
        assert_eq!(parse_default(";").unwrap_err(), ParseError::Empty);
    }

    #[test]
    fn test_parse_with_explicit_signature() {
        let tokens = tokenize("swap :a :b").unwrap();
        let sig = signature::signature_of("swap").unwrap();
        let d = parse(&tokens, sig).unwrap();
        assert_eq!(d.to_v2(), "swap :a :b;");
    }

    #[test]
    fn test_recipe_parser() {
        let text = "// cleanup\n\
                    rename a b\n\
                    \n\
                    drop :c; uppercase :b;\n\
                    # done";
        let config = DirectiveConfig::default();
        let recipe = RecipeParser::new(&config).parse(text).unwrap();
        assert_eq!(recipe.len(), 3);
        let lines: Vec<usize> = recipe.steps.iter().map(|s| s.line).collect();
        assert_eq!(lines, vec![2, 4, 4]);
        assert_eq!(recipe.to_v2(), "rename :a :b;\ndrop :c;\nuppercase :b;");

        let err = RecipeParser::new(&config).parse("rename a b\nrename a").unwrap_err();
        assert_eq!(err.line, 2);
    }
}
