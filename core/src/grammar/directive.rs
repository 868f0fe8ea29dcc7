//! Parsed directives and their canonical (V2) text form.

use std::fmt;

use super::signature::ElementKind;

/// A numeric literal, keeping the text it was written with.
#[derive(Debug, Clone, PartialEq)]
pub struct Numeric {
    pub text: String,
    pub value: f64,
}

impl Numeric {
    pub fn parse(text: &str) -> Option<Self> {
        text.parse::<f64>().ok().map(|value| Self {
            text: text.to_string(),
            value,
        })
    }

    /// Integral value, when the literal has no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        (self.value.fract() == 0.0 && self.value.is_finite()).then_some(self.value as i64)
    }
}

/// One typed directive argument.
///
/// Column references never carry the `:` marker; it only exists in V2 text.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    ColumnRef(String),
    StringLiteral(String),
    NumericLiteral(Numeric),
    List { element: ElementKind, items: Vec<String> },
    ExpressionBlock(String),
    RawToken(String),
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::ColumnRef(name) => write!(f, ":{name}"),
            Argument::StringLiteral(value) => f.write_str(&quote(value)),
            Argument::NumericLiteral(n) => f.write_str(&n.text),
            Argument::List { element: ElementKind::Column, items } => {
                let refs: Vec<String> = items.iter().map(|i| format!(":{i}")).collect();
                f.write_str(&refs.join(","))
            }
            Argument::List { items, .. } => f.write_str(&items.join(",")),
            Argument::ExpressionBlock(body) => write!(f, "exp:{{{body}}}"),
            Argument::RawToken(token) => f.write_str(token),
        }
    }
}

/// Single-quote a string literal.
///
/// Embedded quotes are escaped; a backslash is doubled only where the
/// tokenizer would otherwise read it as an escape, so regex bodies like
/// `s/\d+//g` render unchanged.
pub fn quote(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' if matches!(chars.get(i + 1), None | Some('\'') | Some('\\')) => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Whether `body` can sit inside `exp:{...}` and be read back whole: the
/// tokenizer counts braces without regard to quoting.
pub fn braces_balanced(body: &str) -> bool {
    let mut depth = 0usize;
    for c in body.chars() {
        match c {
            '{' => depth += 1,
            '}' => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            _ => {}
        }
    }
    depth == 0
}

/// A directive name plus its ordered, signature-checked arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDirective {
    /// Name as written (legacy two-word names are already joined).
    pub name: String,
    /// Name after alias resolution; used for signature lookup and dispatch.
    pub canonical: String,
    pub arguments: Vec<Argument>,
}

impl ParsedDirective {
    pub fn new(name: impl Into<String>, arguments: Vec<Argument>) -> Self {
        let name = name.into();
        Self {
            canonical: name.clone(),
            name,
            arguments,
        }
    }

    pub fn with_canonical(mut self, canonical: impl Into<String>) -> Self {
        self.canonical = canonical.into();
        self
    }

    pub fn argument(&self, index: usize) -> Option<&Argument> {
        self.arguments.get(index)
    }

    pub fn column(&self, index: usize) -> Option<&str> {
        match self.arguments.get(index) {
            Some(Argument::ColumnRef(name)) => Some(name),
            _ => None,
        }
    }

    pub fn text(&self, index: usize) -> Option<&str> {
        match self.arguments.get(index) {
            Some(Argument::StringLiteral(value)) => Some(value),
            _ => None,
        }
    }

    pub fn number(&self, index: usize) -> Option<&Numeric> {
        match self.arguments.get(index) {
            Some(Argument::NumericLiteral(n)) => Some(n),
            _ => None,
        }
    }

    pub fn list(&self, index: usize) -> Option<&[String]> {
        match self.arguments.get(index) {
            Some(Argument::List { items, .. }) => Some(items),
            _ => None,
        }
    }

    pub fn expression(&self, index: usize) -> Option<&str> {
        match self.arguments.get(index) {
            Some(Argument::ExpressionBlock(body)) => Some(body),
            _ => None,
        }
    }

    pub fn raw(&self, index: usize) -> Option<&str> {
        match self.arguments.get(index) {
            Some(Argument::RawToken(token)) => Some(token),
            _ => None,
        }
    }

    /// Canonical V2 text, terminated with `;`.
    pub fn to_v2(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ParsedDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for arg in &self.arguments {
            write!(f, " {arg}")?;
        }
        f.write_str(";")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_escaping() {
        assert_eq!(quote("abc"), "'abc'");
        assert_eq!(quote("it's"), r"'it\'s'");
        assert_eq!(quote(r"s/\d+//g"), r"'s/\d+//g'");
        assert_eq!(quote(r"ends\"), r"'ends\\'");
    }

    #[test]
    fn test_render_arguments() {
        let directive = ParsedDirective::new(
            "write-as-json-object",
            vec![
                Argument::ColumnRef("output".into()),
                Argument::List {
                    element: ElementKind::Column,
                    items: vec!["fname".into(), "lname".into()],
                },
            ],
        );
        assert_eq!(directive.to_v2(), "write-as-json-object :output :fname,:lname;");
    }

    #[test]
    fn test_braces_balanced() {
        assert!(braces_balanced("a > 1 ? {'k': 1} : b"));
        assert!(braces_balanced("salary * 2"));
        assert!(!braces_balanced("name == '}' ? 1 : 0"));
        assert!(!braces_balanced("name == '{'"));
        assert!(!braces_balanced("} {"));
    }

    #[test]
    fn test_render_zero_arguments() {
        let directive = ParsedDirective::new("cleanse-column-names", vec![]);
        assert_eq!(directive.to_string(), "cleanse-column-names;");
    }

    #[test]
    fn test_numeric_keeps_text() {
        let n = Numeric::parse("1.0").unwrap();
        assert_eq!(Argument::NumericLiteral(n.clone()).to_string(), "1.0");
        assert_eq!(n.as_i64(), Some(1));
        assert_eq!(Numeric::parse("2.5").unwrap().as_i64(), None);
    }

    #[test]
    fn test_accessors() {
        let directive = ParsedDirective::new(
            "set-column",
            vec![
                Argument::ColumnRef("salary".into()),
                Argument::ExpressionBlock("salary * 2".into()),
            ],
        );
        assert_eq!(directive.column(0), Some("salary"));
        assert_eq!(directive.expression(1), Some("salary * 2"));
        assert_eq!(directive.text(1), None);
    }
}
