use um_core::pattern::InvalidPatternError;

/// Error raised while tokenizing a guard or argument expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenizeError {
    #[error("Function does not exist: {0}")]
    UnknownFunction(String),
    #[error("Invalid argument: {argument}")]
    InvalidArgument {
        function: String,
        argument: String,
        reason: String,
    },
    #[error("Malformed call: {0}")]
    MalformedCall(String),
    #[error("Unbalanced parenthesis in: {0}")]
    Unbalanced(String),
    #[error("Unterminated quote in: {0}")]
    UnterminatedQuote(String),
}

/// Error raised while compiling site definitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    #[error("Unexpected definitions type, expected object: {0}")]
    InvalidDefinitions(String),
    #[error("Unexpected definition type, expected object: {0}")]
    InvalidBody(String),
    #[error("Invalid condition: {0}")]
    InvalidCondition(String),
    #[error("Invalid actions type, expected object: {0}")]
    InvalidActions(String),
    #[error("Unexpected action type, expected string: {0}")]
    InvalidActionValue(String),
    #[error("Invalid action selector: {0}")]
    InvalidSelector(String),
    #[error("Invalid action function: {0}")]
    UnknownAction(String),
    #[error("Action {function} needs an element target, not {selector}")]
    MissingTarget { function: String, selector: String },
    #[error("Action {0} needs a function path")]
    MissingArgument(String),
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),
    #[error(transparent)]
    Pattern(#[from] InvalidPatternError),
    #[error("{source} in {pattern}")]
    InPattern {
        pattern: String,
        source: Box<DefinitionError>,
    },
}

impl DefinitionError {
    /// Annotate with the owning site pattern.
    pub fn in_pattern(self, pattern: &str) -> Self {
        Self::InPattern {
            pattern: pattern.to_string(),
            source: Box::new(self),
        }
    }

    /// The error without its pattern annotation.
    pub fn root(&self) -> &DefinitionError {
        match self {
            Self::InPattern { source, .. } => source.root(),
            other => other,
        }
    }
}
