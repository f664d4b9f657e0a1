use std::rc::Rc;

/// One segment of a structured diagnostic message.
///
/// The parser never formats human-readable text itself; it assembles segments
/// and forwards them. The `Display` implementations here are a plain fallback
/// used by the boundary error wrappers and by tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageSegment {
    /// Literal prose.
    Text(String),
    /// A value taken from the input, e.g. an offending token.
    Value(String),
    /// The name of an option or command, e.g. `--verbose`.
    OptionName(String),
    /// A value placeholder, e.g. `FILE`.
    Metavar(String),
}

/// A structured diagnostic message: an ordered sequence of segments.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    segments: Vec<MessageSegment>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.segments.push(MessageSegment::Text(text.into()));
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.segments.push(MessageSegment::Value(value.into()));
        self
    }

    pub fn option_name(mut self, name: impl Into<String>) -> Self {
        self.segments.push(MessageSegment::OptionName(name.into()));
        self
    }

    pub fn metavar(mut self, metavar: impl Into<String>) -> Self {
        self.segments.push(MessageSegment::Metavar(metavar.into()));
        self
    }

    pub fn segments(&self) -> &[MessageSegment] {
        &self.segments
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for segment in &self.segments {
            match segment {
                MessageSegment::Text(text) => write!(f, "{text}")?,
                MessageSegment::Value(value) => write!(f, "'{value}'")?,
                MessageSegment::OptionName(name) => write!(f, "{name}")?,
                MessageSegment::Metavar(metavar) => write!(f, "{metavar}")?,
            }
        }
        Ok(())
    }
}

/// The error taxonomy. Every diagnostic belongs to exactly one kind; none of
/// them is fatal below the driver boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Wrong option/command/argument shape at the current position.
    Unexpected,
    /// Mutually exclusive branches both committed.
    Conflict,
    /// A field matched a second time.
    Duplicate,
    /// End of input with a required field unfilled and no default.
    MissingRequired,
    /// The token was recognized syntactically but its value was rejected.
    InvalidValue,
    /// The same dependency source was consumed in two unrelated positions.
    DuplicateDependency,
    /// A derived parser's source was never provided and has no usable default.
    UnresolvedDependency,
    /// A dependency source transitively depends on itself.
    CircularDependency,
}

/// A failure produced anywhere in the combinator tree.
///
/// Failures are recoverable below the driver boundary: a failing branch
/// discards its speculative state and never corrupts a sibling's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: Message,
    /// Raw "did you mean" candidates collected from the ambient usage
    /// grammar. Filtering by edit distance is the formatter's concern.
    pub candidates: Vec<String>,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, message: Message) -> Self {
        Self {
            kind,
            message,
            candidates: Vec::default(),
        }
    }

    pub fn with_candidates(mut self, candidates: Vec<String>) -> Self {
        self.candidates = candidates;
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// A caller-supplied replacement for a default message: either a fixed
/// message, or a function of the offending token.
#[derive(Clone)]
pub enum MessageSource {
    Fixed(Message),
    Build(Rc<dyn Fn(&str) -> Message>),
}

impl MessageSource {
    pub(crate) fn produce(&self, token: &str) -> Message {
        match self {
            MessageSource::Fixed(message) => message.clone(),
            MessageSource::Build(build) => build(token),
        }
    }
}

impl std::fmt::Debug for MessageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageSource::Fixed(message) => f.debug_tuple("Fixed").field(message).finish(),
            MessageSource::Build(_) => f.debug_tuple("Build").finish(),
        }
    }
}

impl From<Message> for MessageSource {
    fn from(message: Message) -> Self {
        MessageSource::Fixed(message)
    }
}

/// Per-call-site message overrides. Any left unset falls back to the default
/// message for that condition; the parser never surfaces an unlabeled failure.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Required parameter absent at end of input.
    pub missing: Option<MessageSource>,
    /// Value conversion rejected the raw text.
    pub invalid: Option<MessageSource>,
    /// Parameter matched a second time.
    pub duplicate: Option<MessageSource>,
    /// No alternative of an exclusive choice matched.
    pub no_match: Option<MessageSource>,
    /// Two alternatives of an exclusive choice both committed.
    pub conflict: Option<MessageSource>,
}

impl Overrides {
    pub(crate) fn message(
        slot: &Option<MessageSource>,
        token: &str,
        default: impl FnOnce() -> Message,
    ) -> Message {
        match slot {
            Some(source) => source.produce(token),
            None => default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_display() {
        let message = Message::new()
            .text("cannot parse ")
            .value("abc")
            .text(" as ")
            .metavar("INT")
            .text(" for ")
            .option_name("--port");
        assert_eq!(message.to_string(), "cannot parse 'abc' as INT for --port");
    }

    #[test]
    fn override_fixed() {
        let fallback = || Message::new().text("default");
        let produced = Overrides::message(
            &Some(MessageSource::Fixed(Message::new().text("custom"))),
            "token",
            fallback,
        );
        assert_eq!(produced.to_string(), "custom");
    }

    #[test]
    fn override_build() {
        let produced = Overrides::message(
            &Some(MessageSource::Build(Rc::new(|token| {
                Message::new().text("saw ").value(token)
            }))),
            "blah",
            || Message::new().text("default"),
        );
        assert_eq!(produced.to_string(), "saw 'blah'");
    }

    #[test]
    fn override_absent_uses_default() {
        let produced = Overrides::message(&None, "token", || Message::new().text("default"));
        assert_eq!(produced.to_string(), "default");
    }
}
