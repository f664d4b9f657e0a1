/// A structural grammar fragment describing what a parser accepts.
///
/// Usage terms are consumed by an external formatter/normalizer; the only
/// guarantee made here is that each term accurately reflects acceptance
/// behaviour (e.g. a boolean option with no value converter is wrapped
/// [`UsageTerm::Optional`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageTerm {
    /// A positional argument with its placeholder.
    Argument { metavar: String },
    /// An option with all of its spellings and, when valued, a placeholder.
    Option {
        names: Vec<String>,
        metavar: Option<String>,
    },
    /// A subcommand keyword.
    Command { name: String },
    /// A literal token, e.g. the `--` end-of-options marker.
    Literal { text: String },
    /// The wrapped terms may be omitted entirely.
    Optional(Usage),
    /// The wrapped terms may repeat; `min` occurrences are required.
    Multiple { terms: Usage, min: usize },
    /// Exactly one of the alternatives applies.
    Exclusive(Vec<Usage>),
    /// Verbatim capture of the remaining tokens.
    Passthrough,
}

/// The usage grammar of a parser: an ordered sequence of terms.
pub type Usage = Vec<UsageTerm>;

/// Collect every literal spelling a user could type at a choice point:
/// option names, command keywords, and literals. These are the raw
/// "did you mean" candidates; ranking them is the formatter's concern.
pub fn collect_candidates(usage: &Usage) -> Vec<String> {
    let mut candidates = Vec::default();
    collect_into(usage, &mut candidates);
    candidates
}

fn collect_into(usage: &Usage, candidates: &mut Vec<String>) {
    for term in usage {
        match term {
            UsageTerm::Option { names, .. } => {
                for name in names {
                    if !candidates.contains(name) {
                        candidates.push(name.clone());
                    }
                }
            }
            UsageTerm::Command { name } => {
                if !candidates.contains(name) {
                    candidates.push(name.clone());
                }
            }
            UsageTerm::Literal { text } => {
                if !candidates.contains(text) {
                    candidates.push(text.clone());
                }
            }
            UsageTerm::Optional(inner) => collect_into(inner, candidates),
            UsageTerm::Multiple { terms, .. } => collect_into(terms, candidates),
            UsageTerm::Exclusive(alternatives) => {
                for alternative in alternatives {
                    collect_into(alternative, candidates);
                }
            }
            UsageTerm::Argument { .. } | UsageTerm::Passthrough => {}
        }
    }
}

/// A short label for a usage fragment, used in structural-conflict messages
/// ("X and Y cannot be used together").
pub(crate) fn usage_label(usage: &Usage) -> String {
    match usage.first() {
        Some(UsageTerm::Argument { metavar }) => metavar.clone(),
        Some(UsageTerm::Option { names, .. }) => names.join("/"),
        Some(UsageTerm::Command { name }) => name.clone(),
        Some(UsageTerm::Literal { text }) => text.clone(),
        Some(UsageTerm::Optional(inner)) | Some(UsageTerm::Multiple { terms: inner, .. }) => {
            usage_label(inner)
        }
        Some(UsageTerm::Exclusive(alternatives)) => alternatives
            .first()
            .map(usage_label)
            .unwrap_or_else(|| "<empty>".to_string()),
        Some(UsageTerm::Passthrough) => "...".to_string(),
        None => "<empty>".to_string(),
    }
}
