/// Tie-break weight used when several children of a combinator could start
/// matching at the same buffer position. Larger wins.
pub type Priority = i16;

/// The execution mode of a value converter or parser.
///
/// `Async` spreads upward: any composite containing an asynchronous member is
/// itself asynchronous. The combination rule is [`Mode::join`], a pure
/// function over the tags; nothing is inferred from control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Every value conversion completes immediately.
    Sync,
    /// At least one value conversion yields deferred work.
    Async,
}

impl Mode {
    /// Combine two mode tags: `Async` wins.
    pub fn join(self, other: Mode) -> Mode {
        match (self, other) {
            (Mode::Sync, Mode::Sync) => Mode::Sync,
            _ => Mode::Async,
        }
    }

    /// Combine any number of mode tags.
    pub fn join_all(modes: impl IntoIterator<Item = Mode>) -> Mode {
        modes.into_iter().fold(Mode::Sync, Mode::join)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Sync => write!(f, "sync"),
            Mode::Async => write!(f, "async"),
        }
    }
}
