//! Layer classification.
//!
//! Maps the runtime type name of a layer to a [`BlockKind`] and, when the name
//! encodes it, a spatial [`Dimensionality`]. Rules are evaluated in order and
//! the first match wins; matching is a case-insensitive substring test against
//! the full type name, so both `torch.nn.modules.conv.Conv2d` and `Conv2d`
//! classify as [`BlockKind::Conv`].

use log::trace;

use layertrace_core::block::{BlockKind, Dimensionality};

use crate::{config::ClassifierConfig, error::ClassificationError};

/// Result of classifying one layer type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: BlockKind,
    /// Fixed by an `<n>d` suffix; `None` means "infer from the output shape".
    pub dim: Option<Dimensionality>,
}

/// One entry of the rule table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    patterns: Vec<String>,
    kind: BlockKind,
}

impl Rule {
    /// Creates a rule that yields `kind` when any of `patterns` occurs in a type name.
    pub fn new(kind: BlockKind, patterns: &[&str]) -> Self {
        Self {
            patterns: patterns.iter().map(|p| p.to_lowercase()).collect(),
            kind,
        }
    }

    /// Returns the block kind the rule assigns.
    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    /// `lowered` must already be lowercase.
    fn matches(&self, lowered: &str) -> bool {
        self.patterns.iter().any(|p| lowered.contains(p.as_str()))
    }
}

/// Ordered, first-match-wins rule table.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(Self::builtin_rules())
    }
}

impl Classifier {
    /// Creates a classifier that tries `rules` before the built-in table.
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Builds the built-in table with the configured rules in front of it.
    pub fn from_config(config: &ClassifierConfig) -> Self {
        let rules = config
            .rules()
            .iter()
            .map(|rule| Rule::new(rule.kind, &[rule.pattern.as_str()]))
            .chain(Self::builtin_rules())
            .collect();
        Self::new(rules)
    }

    /// The built-in rule table.
    ///
    /// Embedding comes first so that names like `PositionalEmbeddingConv` do
    /// not classify as convolutions; activation comes last because its
    /// patterns are the loosest.
    pub fn builtin_rules() -> Vec<Rule> {
        vec![
            Rule::new(BlockKind::Embedding, &["embedding"]),
            Rule::new(BlockKind::Conv, &["conv"]),
            Rule::new(BlockKind::Norm, &["norm"]),
            Rule::new(BlockKind::Pool, &["pool"]),
            Rule::new(BlockKind::Linear, &["linear"]),
            Rule::new(BlockKind::Recurrent, &["rnn", "lstm", "gru"]),
            Rule::new(BlockKind::Dropout, &["dropout"]),
            Rule::new(
                BlockKind::Activation,
                &[
                    "activation",
                    "relu",
                    "gelu",
                    "selu",
                    "silu",
                    "sigmoid",
                    "tanh",
                    "softmax",
                    "softplus",
                    "mish",
                    "hardswish",
                ],
            ),
        ]
    }

    /// Returns the kind of the first matching rule, if any.
    pub fn kind_of(&self, type_name: &str) -> Option<BlockKind> {
        let lowered = type_name.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .map(Rule::kind)
    }

    /// Classifies a layer type.
    ///
    /// # Errors
    ///
    /// Returns [`ClassificationError`] when no rule matches.
    ///
    /// # Examples
    ///
    /// ```
    /// # use layertrace::classify::Classifier;
    /// # use layertrace_core::block::{BlockKind, Dimensionality};
    /// let classifier = Classifier::default();
    ///
    /// let conv = classifier.classify("torch.nn.modules.conv.Conv2d").unwrap();
    /// assert_eq!(conv.kind, BlockKind::Conv);
    /// assert_eq!(conv.dim, Some(Dimensionality::THREE));
    ///
    /// assert!(classifier.classify("torch.nn.modules.flatten.Flatten").is_err());
    /// ```
    pub fn classify(&self, type_name: &str) -> Result<Classification, ClassificationError> {
        let kind = self
            .kind_of(type_name)
            .ok_or_else(|| ClassificationError {
                type_name: type_name.to_string(),
            })?;
        let dim = suffix_dimensionality(type_name);

        trace!(type_name, kind:%, dim:?; "Classified layer");
        Ok(Classification { kind, dim })
    }
}

/// Reads the spatial rank encoded by an `<n>d` class-name suffix.
///
/// `Conv2d` operates on two spatial axes plus channels, so it yields 3. The
/// result is clamped into `1..=3`.
fn suffix_dimensionality(type_name: &str) -> Option<Dimensionality> {
    let class_name = type_name.rsplit(['.', ':']).next().unwrap_or(type_name);
    let mut chars = class_name.chars().rev();

    match (chars.next(), chars.next()) {
        (Some('d' | 'D'), Some(digit)) => digit
            .to_digit(10)
            .map(|n| Dimensionality::clamped(n as usize + 1)),
        _ => None,
    }
}
