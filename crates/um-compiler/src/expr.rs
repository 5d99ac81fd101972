//! Expression tokenizer
//!
//! Guard keys (`if $(.close-btn) defined(app.wall)`) and action arguments
//! share one single-pass scanner. It tracks parenthesis depth and a quote
//! flag:
//!
//! - a `'...'` span outside any call becomes a [`Token::Literal`] with the
//!   quotes stripped;
//! - inside a call, quotes only shield parentheses from the depth count;
//! - when a `)` brings the depth back to zero, the span since the previous
//!   token is parsed as `name(argument)`, the name is resolved against the
//!   predicate registry and the argument is validated right away;
//! - text that never closes a call is flushed as a trailing literal.

use std::mem;

use um_core::registry::Registry;
use um_core::types::Condition;

use crate::error::TokenizeError;

const GUARD_PREFIX: &str = "if ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Call(Condition),
    Literal(String),
}

impl Token {
    /// Argument form of the token: the literal text, or `name(argument)`.
    pub fn into_argument(self) -> String {
        match self {
            Token::Call(condition) => condition.to_string(),
            Token::Literal(text) => text,
        }
    }
}

/// Tokenize an expression, with or without its leading `if `.
pub fn tokenize(expression: &str, registry: &Registry) -> Result<Vec<Token>, TokenizeError> {
    let source = expression.strip_prefix(GUARD_PREFIX).unwrap_or(expression);

    let mut tokens = Vec::new();
    let mut span = String::new();
    let mut depth = 0usize;
    let mut quoted = false;

    for c in source.chars() {
        if quoted {
            if c == '\'' {
                quoted = false;
                if depth == 0 {
                    tokens.push(Token::Literal(mem::take(&mut span)));
                    continue;
                }
            }
            span.push(c);
            continue;
        }

        match c {
            '\'' => {
                quoted = true;
                if depth == 0 {
                    flush_literal(&mut span, &mut tokens);
                } else {
                    span.push(c);
                }
            }
            '(' => {
                depth += 1;
                span.push(c);
            }
            ')' => {
                if depth == 0 {
                    return Err(TokenizeError::Unbalanced(expression.to_string()));
                }
                depth -= 1;
                span.push(c);
                if depth == 0 {
                    tokens.push(Token::Call(parse_call(&span, registry)?));
                    span.clear();
                }
            }
            _ => span.push(c),
        }
    }

    if quoted {
        return Err(TokenizeError::UnterminatedQuote(expression.to_string()));
    }
    flush_literal(&mut span, &mut tokens);

    Ok(tokens)
}

fn flush_literal(span: &mut String, tokens: &mut Vec<Token>) {
    let text = span.trim();
    if !text.is_empty() {
        tokens.push(Token::Literal(text.to_string()));
    }
    span.clear();
}

fn parse_call(span: &str, registry: &Registry) -> Result<Condition, TokenizeError> {
    let text = span.trim();
    let malformed = || TokenizeError::MalformedCall(text.to_string());

    let (name, rest) = text.split_once('(').ok_or_else(malformed)?;
    let argument = rest.strip_suffix(')').ok_or_else(malformed)?;
    let name = name.trim();
    if name.is_empty() || argument.trim().is_empty() {
        return Err(malformed());
    }

    let kind = registry
        .predicate(name)
        .ok_or_else(|| TokenizeError::UnknownFunction(name.to_string()))?;
    kind.validate(argument).map_err(|reason| TokenizeError::InvalidArgument {
        function: name.to_string(),
        argument: argument.to_string(),
        reason,
    })?;

    Ok(Condition {
        function: name.to_string(),
        argument: argument.to_string(),
        kind,
    })
}
