//! Rule body parser
//!
//! A rule body is a JSON object. Every key produces one rule:
//!
//! ```json
//! {
//!   "if $(.close-btn)": { ".modal": "remove", "body": "removeClass no-scroll" },
//!   "#cookie-banner": "remove"
//! }
//! ```
//!
//! A key starting with `if ` is a guard gating an object of
//! `selector → action`; any other key is itself the selector of a single
//! unconditional action.

use serde_json::Value;

use um_core::dom::{validate_selector, CALL_SELECTOR};
use um_core::registry::{ActionKind, Registry};
use um_core::types::{ActionSpec, Condition, Rule};

use crate::error::DefinitionError;
use crate::expr::{tokenize, Token};

const GUARD_PREFIX: &str = "if ";

/// Parse one rule body into rules of `category`, in key order.
pub fn parse_body(category: &str, body: &Value, registry: &Registry) -> Result<Vec<Rule>, DefinitionError> {
    let body = body
        .as_object()
        .ok_or_else(|| DefinitionError::InvalidBody(body.to_string()))?;

    body.iter()
        .map(|(key, value)| parse_rule(category, key, value, registry))
        .collect()
}

fn parse_rule(category: &str, key: &str, value: &Value, registry: &Registry) -> Result<Rule, DefinitionError> {
    if !key.starts_with(GUARD_PREFIX) {
        let action = parse_action(key, value, registry)?;
        return Ok(Rule::new(category, Vec::new(), vec![action]));
    }

    let conditions = parse_guard(key, registry)?;
    let targets = value
        .as_object()
        .ok_or_else(|| DefinitionError::InvalidActions(value.to_string()))?;
    let actions = targets
        .iter()
        .map(|(selector, action)| parse_action(selector, action, registry))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Rule::new(category, conditions, actions))
}

fn parse_guard(key: &str, registry: &Registry) -> Result<Vec<Condition>, DefinitionError> {
    let tokens = tokenize(key, registry)?;
    if tokens.is_empty() {
        return Err(DefinitionError::InvalidCondition(key.to_string()));
    }

    tokens
        .into_iter()
        .map(|token| match token {
            Token::Call(condition) => Ok(condition),
            // A bare literal can never evaluate to true or false.
            Token::Literal(_) => Err(DefinitionError::InvalidCondition(key.to_string())),
        })
        .collect()
}

fn parse_action(selector: &str, value: &Value, registry: &Registry) -> Result<ActionSpec, DefinitionError> {
    let text = value
        .as_str()
        .ok_or_else(|| DefinitionError::InvalidActionValue(value.to_string()))?
        .trim();

    let (function, rest) = text
        .split_once(char::is_whitespace)
        .map(|(f, r)| (f, r.trim_start()))
        .unwrap_or((text, ""));

    let args: Vec<String> = tokenize(rest, registry)?
        .into_iter()
        .map(Token::into_argument)
        .collect();

    validate_selector(selector).map_err(|_| DefinitionError::InvalidSelector(selector.to_string()))?;
    let kind = registry
        .action(function)
        .ok_or_else(|| DefinitionError::UnknownAction(function.to_string()))?;

    if selector == CALL_SELECTOR && kind.needs_target() {
        return Err(DefinitionError::MissingTarget {
            function: function.to_string(),
            selector: selector.to_string(),
        });
    }
    if kind == ActionKind::Call && args.is_empty() {
        return Err(DefinitionError::MissingArgument(function.to_string()));
    }

    Ok(ActionSpec {
        selector: selector.to_string(),
        function: function.to_string(),
        args,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use um_core::registry::PredicateKind;

    use crate::error::TokenizeError;

    #[test]
    fn test_guarded_body() {
        let body = json!({ "if $(.close-btn)": { ".modal": "remove", "body": "removeClass no-scroll locked" } });
        let rules = parse_body("ads", &body, &Registry::default()).unwrap();
        assert_eq!(rules.len(), 1);

        let rule = &rules[0];
        assert_eq!(rule.category(), "ads");
        assert_eq!(rule.conditions().len(), 1);
        assert_eq!(rule.conditions()[0].kind, PredicateKind::Exists);
        assert_eq!(rule.actions().len(), 2);
        assert_eq!(rule.actions()[0].kind, ActionKind::Remove);
        assert!(rule.actions()[0].args.is_empty());
        assert_eq!(rule.actions()[1].selector, "body");
        assert_eq!(rule.actions()[1].args, vec!["no-scroll locked"]);
    }

    #[test]
    fn test_each_key_is_a_rule() {
        let body = json!({
            "#cookie-banner": "remove",
            "if defined(app.wall)": { "call": "call 'app.wall.close'" },
            "html": "addStyle 'overflow: auto !important'"
        });
        let rules = parse_body("consent", &body, &Registry::default()).unwrap();
        assert_eq!(rules.len(), 3);
        assert!(rules[0].conditions().is_empty());
        assert_eq!(rules[0].actions()[0].selector, "#cookie-banner");
        assert_eq!(rules[1].actions()[0].kind, ActionKind::Call);
        assert_eq!(rules[1].actions()[0].args, vec!["app.wall.close"]);
        assert_eq!(rules[2].actions()[0].args, vec!["overflow: auto !important"]);
    }

    #[test]
    fn test_empty_guard_is_rejected() {
        let body = json!({ "if ": { ".modal": "remove" } });
        let err = parse_body("ads", &body, &Registry::default()).unwrap_err();
        assert_eq!(err, DefinitionError::InvalidCondition("if ".to_string()));
    }

    #[test]
    fn test_literal_in_guard_is_rejected() {
        let body = json!({ "if 'always'": { ".modal": "remove" } });
        let err = parse_body("ads", &body, &Registry::default()).unwrap_err();
        assert_eq!(err, DefinitionError::InvalidCondition("if 'always'".to_string()));
    }

    #[test]
    fn test_guard_value_must_be_object() {
        let body = json!({ "if $(.a)": "remove" });
        let err = parse_body("ads", &body, &Registry::default()).unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidActions(_)));
    }

    #[test]
    fn test_body_must_be_object() {
        let err = parse_body("ads", &json!("remove"), &Registry::default()).unwrap_err();
        assert_eq!(err.to_string(), "Unexpected definition type, expected object: \"remove\"");
    }

    #[test]
    fn test_action_validation() {
        let registry = Registry::default();

        let err = parse_body("ads", &json!({ "div[": "remove" }), &registry).unwrap_err();
        assert_eq!(err, DefinitionError::InvalidSelector("div[".to_string()));

        let err = parse_body("ads", &json!({ ".modal": "hide" }), &registry).unwrap_err();
        assert_eq!(err.to_string(), "Invalid action function: hide");

        let err = parse_body("ads", &json!({ ".modal": 3 }), &registry).unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidActionValue(_)));

        let err = parse_body("ads", &json!({ "call": "remove" }), &registry).unwrap_err();
        assert!(matches!(err, DefinitionError::MissingTarget { .. }));

        let err = parse_body("ads", &json!({ "call": "call" }), &registry).unwrap_err();
        assert_eq!(err, DefinitionError::MissingArgument("call".to_string()));
    }

    #[test]
    fn test_argument_tokenize_errors_propagate() {
        let err = parse_body("ads", &json!({ ".modal": "addStyle 'unterminated" }), &Registry::default()).unwrap_err();
        assert!(matches!(err, DefinitionError::Tokenize(TokenizeError::UnterminatedQuote(_))));
    }

    #[test]
    fn test_narrowed_registry_rejects_removed_action() {
        let registry = Registry::default().without_action("call");
        let body = json!({ "if defined(app)": { "call": "call app.open" } });
        let err = parse_body("ads", &body, &registry).unwrap_err();
        assert_eq!(err, DefinitionError::UnknownAction("call".to_string()));
    }
}
