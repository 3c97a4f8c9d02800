//! Tokenizer for the expression subset.

use caravan_core::error::EngineError;

/// One lexical token, with the byte offset it started at (for error
/// messages).
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Numeric literal.
    Number(f64),
    /// String literal (single- or double-quoted).
    Str(String),
    /// Identifier or keyword (`true`, `false`, `null`, `VAR`, ...).
    Ident(String),
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `,`
    Comma,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `!`
    Bang,
    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&`
    AndAnd,
    /// `||`
    OrOr,
}

fn err_at(pos: usize, what: &str) -> EngineError {
    EngineError::script(format!("invalid expression at offset {pos}: {what}"))
}

/// Tokenize the input.
///
/// # Errors
///
/// Returns `EngineError::Script` on any character outside the accepted
/// subset, an unterminated string, or a malformed number.
pub fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, EngineError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        let c = bytes[i];
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => i += 1,
            b'(' => {
                tokens.push((start, Token::LParen));
                i += 1;
            }
            b')' => {
                tokens.push((start, Token::RParen));
                i += 1;
            }
            b',' => {
                tokens.push((start, Token::Comma));
                i += 1;
            }
            b'+' => {
                tokens.push((start, Token::Plus));
                i += 1;
            }
            b'-' => {
                tokens.push((start, Token::Minus));
                i += 1;
            }
            b'*' => {
                tokens.push((start, Token::Star));
                i += 1;
            }
            b'/' => {
                tokens.push((start, Token::Slash));
                i += 1;
            }
            b'%' => {
                tokens.push((start, Token::Percent));
                i += 1;
            }
            b'=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push((start, Token::EqEq));
                    i += 2;
                } else {
                    return Err(err_at(start, "assignment is not supported; use '=='"));
                }
            }
            b'!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push((start, Token::NotEq));
                    i += 2;
                } else {
                    tokens.push((start, Token::Bang));
                    i += 1;
                }
            }
            b'<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push((start, Token::Le));
                    i += 2;
                } else {
                    tokens.push((start, Token::Lt));
                    i += 1;
                }
            }
            b'>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push((start, Token::Ge));
                    i += 2;
                } else {
                    tokens.push((start, Token::Gt));
                    i += 1;
                }
            }
            b'&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    tokens.push((start, Token::AndAnd));
                    i += 2;
                } else {
                    return Err(err_at(start, "bitwise '&' is not supported; use '&&'"));
                }
            }
            b'|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    tokens.push((start, Token::OrOr));
                    i += 2;
                } else {
                    return Err(err_at(start, "bitwise '|' is not supported; use '||'"));
                }
            }
            b'\'' | b'"' => {
                let quote = c;
                i += 1;
                let content_start = i;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                if i >= bytes.len() {
                    return Err(err_at(start, "unterminated string literal"));
                }
                let text = &input[content_start..i];
                tokens.push((start, Token::Str(text.to_owned())));
                i += 1;
            }
            b'0'..=b'9' => {
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                let text = &input[start..i];
                let value: f64 = text
                    .parse()
                    .map_err(|_| err_at(start, "malformed number"))?;
                tokens.push((start, Token::Number(value)));
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_')
                {
                    i += 1;
                }
                tokens.push((start, Token::Ident(input[start..i].to_owned())));
            }
            _ => {
                return Err(err_at(
                    start,
                    &format!("unexpected character '{}'", char::from(c)),
                ));
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input).unwrap().into_iter().map(|(_, t)| t).collect()
    }

    #[test]
    fn test_tokenizes_operators_and_literals() {
        assert_eq!(
            kinds("VAR('x') >= 1.5 && !done"),
            vec![
                Token::Ident("VAR".to_owned()),
                Token::LParen,
                Token::Str("x".to_owned()),
                Token::RParen,
                Token::Ge,
                Token::Number(1.5),
                Token::AndAnd,
                Token::Bang,
                Token::Ident("done".to_owned()),
            ]
        );
    }

    #[test]
    fn test_double_quoted_strings() {
        assert_eq!(kinds("\"it's\""), vec![Token::Str("it's".to_owned())]);
    }

    #[test]
    fn test_rejects_single_equals_and_stray_characters() {
        assert!(tokenize("x = 1").is_err());
        assert!(tokenize("1 & 2").is_err());
        assert!(tokenize("`cmd`").is_err());
        assert!(tokenize("'open").is_err());
    }
}
