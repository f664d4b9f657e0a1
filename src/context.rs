use std::rc::Rc;

use crate::dependency::DependencyRegistry;
use crate::message::Diagnostic;
use crate::state::State;
use crate::usage::Usage;

/// The input to one `parse` step.
///
/// Contexts are never mutated in place; each step produces a new context with
/// the buffer advanced and the owning parser's state updated. The registry
/// travels with the context so that speculative branches work on independent
/// copies.
pub struct ParserContext<'a> {
    /// The remaining, not-yet-consumed tokens.
    pub buffer: &'a [String],
    /// Whether an explicit `--` end-of-options marker has been consumed.
    pub options_terminated: bool,
    /// The opaque state carried over from the prior call.
    pub state: State,
    /// Dependency captures accumulated so far in this cycle.
    pub registry: DependencyRegistry,
    /// The ambient usage grammar, for "did you mean" candidate collection.
    pub grammar: Rc<Usage>,
}

impl<'a> Clone for ParserContext<'a> {
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer,
            options_terminated: self.options_terminated,
            state: self.state.clone(),
            registry: self.registry.clone(),
            grammar: self.grammar.clone(),
        }
    }
}

impl<'a> ParserContext<'a> {
    /// A sibling context holding a child's state. The registry is cloned so a
    /// failing child cannot pollute the parent's view.
    pub(crate) fn for_child(&self, state: State) -> ParserContext<'a> {
        ParserContext {
            buffer: self.buffer,
            options_terminated: self.options_terminated,
            state,
            registry: self.registry.clone(),
            grammar: self.grammar.clone(),
        }
    }
}

/// A successful `parse` step: the advanced context plus the exact tokens
/// consumed by this step.
pub struct Matched<'a> {
    pub next: ParserContext<'a>,
    pub consumed: &'a [String],
}

/// A failed `parse` step.
///
/// `consumed` counts the leading tokens that were recognized well enough to
/// commit to this branch before the failure; it is used only to rank
/// competing failures, never to advance the buffer.
#[derive(Debug)]
pub struct Failure {
    pub consumed: usize,
    pub error: Diagnostic,
}

/// The outcome of one `parse` step.
pub enum ParseOutcome<'a> {
    Matched(Matched<'a>),
    Failed(Failure),
}

impl<'a> ParseOutcome<'a> {
    pub(crate) fn fail(consumed: usize, error: Diagnostic) -> Self {
        ParseOutcome::Failed(Failure { consumed, error })
    }

    /// Succeed consuming the first `consumed` tokens of `context`'s buffer,
    /// leaving `state` behind for the next call.
    pub(crate) fn advance(
        context: ParserContext<'a>,
        consumed: usize,
        options_terminated: bool,
        state: State,
        registry: DependencyRegistry,
    ) -> Self {
        let (eaten, rest) = context.buffer.split_at(consumed);
        ParseOutcome::Matched(Matched {
            next: ParserContext {
                buffer: rest,
                options_terminated,
                state,
                registry,
                grammar: context.grammar,
            },
            consumed: eaten,
        })
    }
}
