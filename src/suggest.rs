use crate::message::Message;

/// A completion candidate: either a literal token or a file-pattern hint for
/// the shell to expand. Rendering is external; de-duplication is ours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suggestion {
    Literal {
        text: String,
        description: Option<Message>,
    },
    File {
        /// An optional glob restricting the files offered, e.g. `*.toml`.
        pattern: Option<String>,
    },
}

impl Suggestion {
    pub fn literal(text: impl Into<String>) -> Self {
        Suggestion::Literal {
            text: text.into(),
            description: None,
        }
    }

    pub fn literal_described(text: impl Into<String>, description: Message) -> Self {
        Suggestion::Literal {
            text: text.into(),
            description: Some(description),
        }
    }

    pub fn file(pattern: Option<String>) -> Self {
        Suggestion::File { pattern }
    }

    fn key(&self) -> (u8, &str) {
        match self {
            Suggestion::Literal { text, .. } => (0, text.as_str()),
            Suggestion::File { pattern } => (1, pattern.as_deref().unwrap_or("")),
        }
    }
}

/// Drop duplicate suggestions, comparing literals by text and file hints by
/// pattern. First occurrence wins; order is otherwise preserved.
pub fn dedup(suggestions: Vec<Suggestion>) -> Vec<Suggestion> {
    let mut seen: Vec<(u8, String)> = Vec::default();
    let mut out = Vec::with_capacity(suggestions.len());

    for suggestion in suggestions {
        let (tag, text) = suggestion.key();
        let key = (tag, text.to_string());

        if !seen.contains(&key) {
            seen.push(key);
            out.push(suggestion);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_by_text() {
        let suggestions = vec![
            Suggestion::literal("-v"),
            Suggestion::literal_described("-v", Message::new().text("verbose")),
            Suggestion::literal("--verbose"),
        ];
        assert_eq!(
            dedup(suggestions),
            vec![Suggestion::literal("-v"), Suggestion::literal("--verbose")]
        );
    }

    #[test]
    fn dedup_by_pattern() {
        let suggestions = vec![
            Suggestion::file(Some("*.toml".to_string())),
            Suggestion::file(Some("*.toml".to_string())),
            Suggestion::file(None),
            Suggestion::file(None),
        ];
        assert_eq!(
            dedup(suggestions),
            vec![
                Suggestion::file(Some("*.toml".to_string())),
                Suggestion::file(None)
            ]
        );
    }

    #[test]
    fn literal_and_file_do_not_collide() {
        let suggestions = vec![
            Suggestion::literal("*.toml"),
            Suggestion::file(Some("*.toml".to_string())),
        ];
        assert_eq!(dedup(suggestions).len(), 2);
    }
}
