use std::marker::PhantomData;
use std::rc::Rc;

use thiserror::Error;

use crate::context::{ParseOutcome, ParserContext};
use crate::dependency::RegistryHandle;
use crate::doc::{DocFragments, DocState};
use crate::eval::Eval;
use crate::message::{Diagnostic, Message};
use crate::model::{Mode, Priority};
use crate::state::State;
use crate::suggest::Suggestion;
use crate::usage::Usage;
use crate::value::ErasedValue;

/// A parser tree that cannot be assembled, reported at definition time.
#[derive(Debug, Error)]
#[error("Config error: {0}")]
pub struct ConfigError(pub(crate) String);

/// The contract every parser satisfies, with value and state types erased.
///
/// Implementations are immutable templates: all transient data is carried
/// through explicit [`State`] values threaded by the caller, so one template
/// serves any number of independent parse/suggest/complete cycles.
///
/// `parse` must be idempotent over an unchanged (context, state) pair, and a
/// failing `parse` must not consume tokens - its reported `consumed` count
/// exists only to rank competing failures.
pub(crate) trait ParserCore {
    fn priority(&self) -> Priority;
    fn mode(&self) -> Mode;
    fn usage(&self) -> Usage;
    fn initial_state(&self) -> State;

    /// Consume a non-negative-length prefix of the context's buffer, or fail.
    fn parse<'a>(&self, context: ParserContext<'a>) -> ParseOutcome<'a>;

    /// Turn accumulated state into the final value, independent of any
    /// remaining buffer. Deferred work appears only in asynchronous trees.
    fn complete(&self, state: &State, registry: &RegistryHandle)
        -> Eval<Result<ErasedValue, Diagnostic>>;

    /// Completion candidates for `prefix` at the context's position. Must not
    /// mutate the context; candidates are de-duplicated by text/pattern.
    fn suggest(&self, context: &ParserContext<'_>, prefix: &str) -> Vec<Suggestion>;

    /// Help-text fragments. `default` is a display string supplied by a
    /// wrapping default-providing combinator, shown only when `state` is
    /// available.
    fn doc_fragments(&self, state: DocState<'_>, default: Option<&str>) -> DocFragments;

    /// The field names of an object-shaped parser, or `None`. `merge` uses
    /// this to decide between direct field merging and synthetic-key storage.
    fn record_fields(&self) -> Option<Vec<String>> {
        None
    }
}

/// A typed handle to a parser template. Cheap to clone; building one never
/// parses anything.
pub struct Parser<T> {
    core: Rc<dyn ParserCore>,
    marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Parser<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Parser<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser")
            .field("priority", &self.core.priority())
            .field("mode", &self.core.mode())
            .finish()
    }
}

impl<T: 'static> Parser<T> {
    pub(crate) fn from_core(core: Rc<dyn ParserCore>) -> Self {
        Self {
            core,
            marker: PhantomData,
        }
    }

    pub(crate) fn core(&self) -> Rc<dyn ParserCore> {
        self.core.clone()
    }

    /// The tie-break weight among sibling fields.
    pub fn priority(&self) -> Priority {
        self.core.priority()
    }

    /// The execution-mode tag: `Async` if any converter below is `Async`.
    pub fn mode(&self) -> Mode {
        self.core.mode()
    }

    /// The usage grammar fragment describing what this parser accepts.
    pub fn usage(&self) -> Usage {
        self.core.usage()
    }

    /// A fresh state for a new parse cycle.
    pub fn initial_state(&self) -> State {
        self.core.initial_state()
    }

    /// Run one parse step. See [the crate docs](crate) for the driver loop.
    pub fn parse<'a>(&self, context: ParserContext<'a>) -> ParseOutcome<'a> {
        self.core.parse(context)
    }

    /// Turn accumulated state into the final typed value.
    pub fn complete(
        &self,
        state: &State,
        registry: &RegistryHandle,
    ) -> Eval<Result<T, Diagnostic>> {
        self.core
            .complete(state, registry)
            .map(|result| result.map(ErasedValue::expect_downcast))
    }

    /// Completion candidates for `prefix` at the context's position.
    pub fn suggest(&self, context: &ParserContext<'_>, prefix: &str) -> Vec<Suggestion> {
        self.core.suggest(context, prefix)
    }

    /// Help-text fragments for this subtree.
    pub fn doc_fragments(&self, state: DocState<'_>, default: Option<&str>) -> DocFragments {
        self.core.doc_fragments(state, default)
    }

    /// Transform the produced value.
    pub fn map<U: 'static>(&self, transform: impl Fn(T) -> U + 'static) -> Parser<U> {
        crate::combinator::map(self, transform)
    }

    /// Attach help prose to this parser's doc entries.
    pub fn describe(&self, description: Message) -> Parser<T> {
        crate::combinator::describe(self, description)
    }

    /// Erase the value type, for heterogeneous aggregation (`tuple`).
    pub fn untyped(&self) -> Untyped {
        Untyped {
            core: self.core.clone(),
        }
    }
}

/// A parser handle with its value type erased.
pub struct Untyped {
    pub(crate) core: Rc<dyn ParserCore>,
}

impl Clone for Untyped {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

/// Compute a composite's priority: the strongest child wins.
pub(crate) fn max_priority<'a>(
    children: impl Iterator<Item = &'a Rc<dyn ParserCore>>,
) -> Priority {
    children
        .map(|child| child.priority())
        .max()
        .unwrap_or(crate::constant::PRIORITY_INERT)
}

/// Compute a composite's mode: any asynchronous child forces `Async`.
pub(crate) fn join_modes<'a>(children: impl Iterator<Item = &'a Rc<dyn ParserCore>>) -> Mode {
    Mode::join_all(children.map(|child| child.mode()))
}

/// Scan order for greedy field combination: descending priority, declaration
/// order breaking ties.
pub(crate) fn scan_order(children: &[Rc<dyn ParserCore>]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..children.len()).collect();
    order.sort_by_key(|&index| (-children[index].priority(), index));
    order
}
