//! Restricted evaluator for script-embedded expressions.
//!
//! Scripts embed small boolean/arithmetic expressions in `if:` guards,
//! `set` steps, and computed messages, e.g. `VAR('story', 0) + 1` or
//! `VAR('howfar') == 'halfway' && VAR('saltines') >= 3`.
//!
//! The accepted grammar is a closed subset — literals, `( )`, unary
//! `!`/`-`, arithmetic, string concatenation, comparisons, `&&`/`||`,
//! and the `VAR(name [, default])` accessor — implemented as a real
//! tokenizer and Pratt parser. There is deliberately no general-purpose
//! interpreter behind it: no host objects, no filesystem, no network.

mod lexer;
mod parser;

use serde_json::Value;

use caravan_core::error::EngineError;

pub use parser::MAX_EXPRESSION_LEN;

/// A value produced by expression evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprValue {
    /// An unset variable, or an explicit `null` literal.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number. All script arithmetic is f64.
    Number(f64),
    /// A string.
    Str(String),
}

impl ExprValue {
    /// Truthiness: `null`, `false`, `0`, `NaN`, and `""` are falsy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Str(s) => !s.is_empty(),
        }
    }

    /// Render for display or string concatenation. Whole numbers print
    /// without a trailing `.0` so `'day ' + 3` reads naturally.
    #[must_use]
    pub fn display(&self) -> String {
        match self {
            Self::Null => "null".to_owned(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    format!("{n:.0}")
                } else {
                    n.to_string()
                }
            }
            Self::Str(s) => s.clone(),
        }
    }

    /// Convert a stored JSON variable value. Arrays and objects are not
    /// expression-addressable and read as null.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            Value::String(s) => Self::Str(s.clone()),
            Value::Null | Value::Array(_) | Value::Object(_) => Self::Null,
        }
    }

    /// Convert to a JSON value for storage.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number),
            Self::Str(s) => Value::String(s.clone()),
        }
    }
}

/// Resolves `VAR(name)` lookups during evaluation. Returns None for a
/// variable that has never been set — never an error.
pub trait VarResolver {
    /// Look up a variable by name.
    fn resolve(&self, name: &str) -> Option<ExprValue>;
}

impl<F> VarResolver for F
where
    F: Fn(&str) -> Option<ExprValue>,
{
    fn resolve(&self, name: &str) -> Option<ExprValue> {
        self(name)
    }
}

/// Evaluate an expression against the given variable resolver.
///
/// # Errors
///
/// Returns `EngineError::Script` for malformed input, an oversized or
/// over-nested expression, or a type error (e.g. arithmetic on a bool).
/// Unknown variable names are not an error; they evaluate to null.
pub fn evaluate(input: &str, vars: &dyn VarResolver) -> Result<ExprValue, EngineError> {
    parser::parse(input)?.eval(vars)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_vars(_: &str) -> Option<ExprValue> {
        None
    }

    fn eval(input: &str) -> ExprValue {
        evaluate(input, &no_vars).unwrap()
    }

    #[test]
    fn test_arithmetic_with_precedence() {
        assert_eq!(eval("1 + 2 * 3"), ExprValue::Number(7.0));
        assert_eq!(eval("(1 + 2) * 3"), ExprValue::Number(9.0));
        assert_eq!(eval("10 % 4 - -1"), ExprValue::Number(3.0));
        assert_eq!(eval("9 / 2"), ExprValue::Number(4.5));
    }

    #[test]
    fn test_comparisons_and_boolean_combinators() {
        assert_eq!(eval("1 < 2 && 2 <= 2"), ExprValue::Bool(true));
        assert_eq!(eval("3 > 4 || 'a' == 'a'"), ExprValue::Bool(true));
        assert_eq!(eval("!(1 == 1)"), ExprValue::Bool(false));
        assert_eq!(eval("'b' != 'a'"), ExprValue::Bool(true));
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(
            eval("'day ' + (2 + 1)"),
            ExprValue::Str("day 3".to_owned())
        );
        assert_eq!(eval("1 + ' of 3'"), ExprValue::Str("1 of 3".to_owned()));
    }

    #[test]
    fn test_var_lookup_resolves_through_resolver() {
        let vars = |name: &str| match name {
            "story" => Some(ExprValue::Number(2.0)),
            "leader" => Some(ExprValue::Str("kim".to_owned())),
            _ => None,
        };
        assert_eq!(
            evaluate("VAR('story') + 1", &vars).unwrap(),
            ExprValue::Number(3.0)
        );
        assert_eq!(
            evaluate("VAR('leader') == 'kim'", &vars).unwrap(),
            ExprValue::Bool(true)
        );
    }

    #[test]
    fn test_unknown_var_is_null_and_default_applies() {
        assert_eq!(eval("VAR('missing')"), ExprValue::Null);
        assert_eq!(eval("VAR('missing', 0) + 1"), ExprValue::Number(1.0));
        assert_eq!(eval("VAR('missing') == null"), ExprValue::Bool(true));
    }

    #[test]
    fn test_malformed_input_is_a_parse_error() {
        assert!(evaluate("1 +", &no_vars).is_err());
        assert!(evaluate("VAR(", &no_vars).is_err());
        assert!(evaluate("1 @ 2", &no_vars).is_err());
        assert!(evaluate("", &no_vars).is_err());
    }

    #[test]
    fn test_type_errors_are_reported() {
        assert!(evaluate("true * 2", &no_vars).is_err());
        assert!(evaluate("'a' - 1", &no_vars).is_err());
    }

    #[test]
    fn test_oversized_expression_is_rejected() {
        let big = format!("1 {}", "+ 1 ".repeat(MAX_EXPRESSION_LEN));
        assert!(evaluate(&big, &no_vars).is_err());
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert!(evaluate(&deep, &no_vars).is_err());
    }

    #[test]
    fn test_truthiness() {
        assert!(ExprValue::Str("x".to_owned()).is_truthy());
        assert!(!ExprValue::Str(String::new()).is_truthy());
        assert!(!ExprValue::Number(0.0).is_truthy());
        assert!(!ExprValue::Null.is_truthy());
    }
}
