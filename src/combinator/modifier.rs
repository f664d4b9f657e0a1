use std::rc::Rc;

use crate::context::{Matched, ParseOutcome, ParserContext};
use crate::dependency::RegistryHandle;
use crate::doc::{DocFragments, DocState};
use crate::eval::Eval;
use crate::message::{Diagnostic, ErrorKind, Message};
use crate::model::{Mode, Priority};
use crate::parser::{Parser, ParserCore};
use crate::state::State;
use crate::suggest::Suggestion;
use crate::usage::{usage_label, Usage, UsageTerm};
use crate::value::ErasedValue;

/// The state of a wrapping combinator: the child's state plus whether the
/// child ever consumed a token.
#[derive(Debug, Clone)]
struct WrapState {
    touched: bool,
    inner: State,
}

fn rewrap<'a>(matched: Matched<'a>, touched: bool) -> ParseOutcome<'a> {
    let inner = matched.next.state;
    ParseOutcome::Matched(Matched {
        next: ParserContext {
            buffer: matched.next.buffer,
            options_terminated: matched.next.options_terminated,
            state: State::new(WrapState { touched, inner }),
            registry: matched.next.registry,
            grammar: matched.next.grammar,
        },
        consumed: matched.consumed,
    })
}

/// Shared plumbing for `optional` and `with_default`: delegate parsing,
/// track touchedness, and substitute a fallback value at completion when the
/// child never matched.
struct FallbackParser {
    child: Rc<dyn ParserCore>,
    /// Build the completed value when the child never matched.
    absent: Rc<dyn Fn() -> ErasedValue>,
    /// Wrap the child's completed value (e.g. into `Some`).
    present: Rc<dyn Fn(ErasedValue) -> ErasedValue>,
    /// Display string for the substituted default, shown in docs.
    shown: Option<String>,
}

impl ParserCore for FallbackParser {
    fn priority(&self) -> Priority {
        self.child.priority()
    }

    fn mode(&self) -> Mode {
        self.child.mode()
    }

    fn usage(&self) -> Usage {
        vec![UsageTerm::Optional(self.child.usage())]
    }

    fn initial_state(&self) -> State {
        State::new(WrapState {
            touched: false,
            inner: self.child.initial_state(),
        })
    }

    fn parse<'a>(&self, context: ParserContext<'a>) -> ParseOutcome<'a> {
        let state = context.state.expect_ref::<WrapState>().clone();

        match self.child.parse(context.for_child(state.inner)) {
            ParseOutcome::Matched(matched) => {
                let touched = state.touched || !matched.consumed.is_empty();
                rewrap(matched, touched)
            }
            failed => failed,
        }
    }

    fn complete(
        &self,
        state: &State,
        registry: &RegistryHandle,
    ) -> Eval<Result<ErasedValue, Diagnostic>> {
        let state = state.expect_ref::<WrapState>();

        if state.touched {
            let present = self.present.clone();
            self.child
                .complete(&state.inner, registry)
                .map(move |result| result.map(|value| present(value)))
        } else {
            Eval::ready(Ok((self.absent)()))
        }
    }

    fn suggest(&self, context: &ParserContext<'_>, prefix: &str) -> Vec<Suggestion> {
        let state = context.state.expect_ref::<WrapState>();
        let child_context = context.for_child(state.inner.clone());
        self.child.suggest(&child_context, prefix)
    }

    fn doc_fragments(&self, state: DocState<'_>, default: Option<&str>) -> DocFragments {
        let shown = self.shown.as_deref().or(default);
        match state {
            DocState::Available(state) => {
                let state = state.expect_ref::<WrapState>();
                self.child
                    .doc_fragments(DocState::Available(&state.inner), shown)
            }
            DocState::Unavailable => self.child.doc_fragments(DocState::Unavailable, shown),
        }
    }
}

/// Allow the wrapped parser to be omitted, completing to `None`.
pub fn optional<T: 'static>(parser: Parser<T>) -> Parser<Option<T>> {
    Parser::from_core(Rc::new(FallbackParser {
        child: parser.core(),
        absent: Rc::new(|| ErasedValue::new(None::<T>)),
        present: Rc::new(|value| ErasedValue::new(Some(value.expect_downcast::<T>()))),
        shown: None,
    }))
}

/// Substitute `default`'s value when the wrapped parser is omitted.
pub fn with_default<T: 'static>(
    parser: Parser<T>,
    default: impl Fn() -> T + 'static,
) -> Parser<T> {
    with_default_inner(parser, default, None)
}

/// [`with_default`], also naming the default in help output.
pub fn with_default_shown<T: 'static>(
    parser: Parser<T>,
    default: impl Fn() -> T + 'static,
    shown: impl Into<String>,
) -> Parser<T> {
    with_default_inner(parser, default, Some(shown.into()))
}

fn with_default_inner<T: 'static>(
    parser: Parser<T>,
    default: impl Fn() -> T + 'static,
    shown: Option<String>,
) -> Parser<T> {
    Parser::from_core(Rc::new(FallbackParser {
        child: parser.core(),
        absent: Rc::new(move || ErasedValue::new(default())),
        present: Rc::new(|value| value),
        shown,
    }))
}

/// The state of `multiple`: one child state per started element; the last is
/// the in-progress one.
#[derive(Debug, Clone)]
struct MultiState {
    items: Vec<State>,
}

/// Accumulates repeated matches of one parser into a `Vec`.
struct MultipleParser {
    child: Rc<dyn ParserCore>,
    min: usize,
    max: Option<usize>,
    assemble: Rc<dyn Fn(Vec<ErasedValue>) -> ErasedValue>,
}

impl ParserCore for MultipleParser {
    fn priority(&self) -> Priority {
        self.child.priority()
    }

    fn mode(&self) -> Mode {
        self.child.mode()
    }

    fn usage(&self) -> Usage {
        vec![UsageTerm::Multiple {
            terms: self.child.usage(),
            min: self.min,
        }]
    }

    fn initial_state(&self) -> State {
        State::new(MultiState {
            items: Vec::default(),
        })
    }

    fn parse<'a>(&self, context: ParserContext<'a>) -> ParseOutcome<'a> {
        let state = context.state.expect_ref::<MultiState>().clone();

        // Continue the in-progress element first.
        if let Some(last) = state.items.last() {
            match self.child.parse(context.for_child(last.clone())) {
                ParseOutcome::Matched(matched) if !matched.consumed.is_empty() => {
                    let mut items = state.items.clone();
                    let last_index = items.len() - 1;
                    items[last_index] = matched.next.state.clone();
                    return remultiplex(matched, items);
                }
                ParseOutcome::Matched(matched) => {
                    // Zero-consumption: nothing to do on this element.
                    let items = state.items.clone();
                    return remultiplex(matched, items);
                }
                ParseOutcome::Failed(failure) => {
                    // The element may simply be finished (a filled scalar, a
                    // duplicate flag); try starting the next one.
                    let fresh_state = self.child.initial_state();
                    match self.child.parse(context.for_child(fresh_state)) {
                        ParseOutcome::Matched(matched) if !matched.consumed.is_empty() => {
                            let mut items = state.items.clone();
                            if !terminator_only(&context, &matched) {
                                items.push(matched.next.state.clone());
                            }
                            return remultiplex(matched, items);
                        }
                        ParseOutcome::Matched(_) => {
                            return ParseOutcome::Failed(failure);
                        }
                        ParseOutcome::Failed(fresh) => {
                            // Report whichever attempt got further.
                            return ParseOutcome::Failed(if fresh.consumed > failure.consumed {
                                fresh
                            } else {
                                failure
                            });
                        }
                    }
                }
            }
        }

        // No element started yet.
        match self.child.parse(context.for_child(self.child.initial_state())) {
            ParseOutcome::Matched(matched) if !matched.consumed.is_empty() => {
                let mut items = state.items;
                // A step that only consumed the `--` marker did not start an
                // element.
                if !terminator_only(&context, &matched) {
                    items.push(matched.next.state.clone());
                }
                remultiplex(matched, items)
            }
            ParseOutcome::Matched(matched) => remultiplex(matched, state.items),
            failed => failed,
        }
    }

    fn complete(
        &self,
        state: &State,
        registry: &RegistryHandle,
    ) -> Eval<Result<ErasedValue, Diagnostic>> {
        let state = state.expect_ref::<MultiState>();
        let count = state.items.len();
        let label = usage_label(&self.child.usage());

        if count < self.min {
            return Eval::ready(Err(Diagnostic::new(
                ErrorKind::MissingRequired,
                Message::new()
                    .text(format!("expected at least {} of ", self.min))
                    .option_name(&label)
                    .text(format!(", found {count}")),
            )));
        }

        if let Some(max) = self.max {
            if count > max {
                return Eval::ready(Err(Diagnostic::new(
                    ErrorKind::Unexpected,
                    Message::new()
                        .text(format!("expected at most {max} of "))
                        .option_name(&label)
                        .text(format!(", found {count}")),
                )));
            }
        }

        let evals: Vec<_> = state
            .items
            .iter()
            .map(|item| self.child.complete(item, registry))
            .collect();

        let assemble = self.assemble.clone();
        Eval::join_all(evals).map(move |results| {
            let mut values = Vec::with_capacity(results.len());
            for result in results {
                values.push(result?);
            }
            Ok(assemble(values))
        })
    }

    fn suggest(&self, context: &ParserContext<'_>, prefix: &str) -> Vec<Suggestion> {
        let state = context.state.expect_ref::<MultiState>();
        let slot = state
            .items
            .last()
            .cloned()
            .unwrap_or_else(|| self.child.initial_state());
        let continuing = self.child.suggest(&context.for_child(slot), prefix);

        if state.items.is_empty() {
            continuing
        } else {
            // A fresh element may also start here.
            let fresh = self
                .child
                .suggest(&context.for_child(self.child.initial_state()), prefix);
            crate::suggest::dedup(continuing.into_iter().chain(fresh).collect())
        }
    }

    fn doc_fragments(&self, state: DocState<'_>, default: Option<&str>) -> DocFragments {
        match state {
            DocState::Available(state) => {
                let multi = state.expect_ref::<MultiState>();
                match multi.items.last() {
                    Some(last) => self.child.doc_fragments(DocState::Available(last), default),
                    None => self.child.doc_fragments(DocState::Unavailable, default),
                }
            }
            DocState::Unavailable => self.child.doc_fragments(DocState::Unavailable, default),
        }
    }
}

/// Whether a child step consumed nothing but the `--` end-of-options marker.
fn terminator_only(context: &ParserContext<'_>, matched: &Matched<'_>) -> bool {
    !context.options_terminated && matched.next.options_terminated && matched.consumed.len() == 1
}

fn remultiplex<'a>(matched: Matched<'a>, items: Vec<State>) -> ParseOutcome<'a> {
    ParseOutcome::Matched(Matched {
        next: ParserContext {
            buffer: matched.next.buffer,
            options_terminated: matched.next.options_terminated,
            state: State::new(MultiState { items }),
            registry: matched.next.registry,
            grammar: matched.next.grammar,
        },
        consumed: matched.consumed,
    })
}

/// Accumulate any number of matches of `parser`, including zero.
pub fn multiple<T: 'static>(parser: Parser<T>) -> Parser<Vec<T>> {
    multiple_bounded(parser, 0, None)
}

/// Accumulate between `min` and `max` matches of `parser`, enforced at
/// completion.
pub fn multiple_bounded<T: 'static>(
    parser: Parser<T>,
    min: usize,
    max: Option<usize>,
) -> Parser<Vec<T>> {
    Parser::from_core(Rc::new(MultipleParser {
        child: parser.core(),
        min,
        max,
        assemble: Rc::new(|values| {
            ErasedValue::new(
                values
                    .into_iter()
                    .map(ErasedValue::expect_downcast::<T>)
                    .collect::<Vec<T>>(),
            )
        }),
    }))
}

/// Applies a pure transformation to the child's completed value.
struct MapParser {
    child: Rc<dyn ParserCore>,
    transform: Rc<dyn Fn(ErasedValue) -> ErasedValue>,
}

impl ParserCore for MapParser {
    fn priority(&self) -> Priority {
        self.child.priority()
    }

    fn mode(&self) -> Mode {
        self.child.mode()
    }

    fn usage(&self) -> Usage {
        self.child.usage()
    }

    fn initial_state(&self) -> State {
        self.child.initial_state()
    }

    fn parse<'a>(&self, context: ParserContext<'a>) -> ParseOutcome<'a> {
        self.child.parse(context)
    }

    fn complete(
        &self,
        state: &State,
        registry: &RegistryHandle,
    ) -> Eval<Result<ErasedValue, Diagnostic>> {
        let transform = self.transform.clone();
        self.child
            .complete(state, registry)
            .map(move |result| result.map(|value| transform(value)))
    }

    fn suggest(&self, context: &ParserContext<'_>, prefix: &str) -> Vec<Suggestion> {
        self.child.suggest(context, prefix)
    }

    fn doc_fragments(&self, state: DocState<'_>, default: Option<&str>) -> DocFragments {
        self.child.doc_fragments(state, default)
    }
}

/// Transform the value produced by `parser`. Prefer [`Parser::map`].
pub fn map<T: 'static, U: 'static>(
    parser: &Parser<T>,
    transform: impl Fn(T) -> U + 'static,
) -> Parser<U> {
    Parser::from_core(Rc::new(MapParser {
        child: parser.core(),
        transform: Rc::new(move |value| ErasedValue::new(transform(value.expect_downcast::<T>()))),
    }))
}

/// Attaches help prose to a parser's otherwise-undescribed doc entries.
struct DescribeParser {
    child: Rc<dyn ParserCore>,
    description: Message,
}

impl ParserCore for DescribeParser {
    fn priority(&self) -> Priority {
        self.child.priority()
    }

    fn mode(&self) -> Mode {
        self.child.mode()
    }

    fn usage(&self) -> Usage {
        self.child.usage()
    }

    fn initial_state(&self) -> State {
        self.child.initial_state()
    }

    fn parse<'a>(&self, context: ParserContext<'a>) -> ParseOutcome<'a> {
        self.child.parse(context)
    }

    fn complete(
        &self,
        state: &State,
        registry: &RegistryHandle,
    ) -> Eval<Result<ErasedValue, Diagnostic>> {
        self.child.complete(state, registry)
    }

    fn suggest(&self, context: &ParserContext<'_>, prefix: &str) -> Vec<Suggestion> {
        self.child.suggest(context, prefix)
    }

    fn doc_fragments(&self, state: DocState<'_>, default: Option<&str>) -> DocFragments {
        let mut fragments = self.child.doc_fragments(state, default);
        for section in &mut fragments.sections {
            for entry in &mut section.entries {
                if entry.description.is_none() {
                    entry.description = Some(self.description.clone());
                }
            }
        }
        fragments
    }

    fn record_fields(&self) -> Option<Vec<String>> {
        self.child.record_fields()
    }
}

/// Attach help prose to `parser`. Prefer [`Parser::describe`].
pub fn describe<T: 'static>(parser: &Parser<T>, description: Message) -> Parser<T> {
    Parser::from_core(Rc::new(DescribeParser {
        child: parser.core(),
        description,
    }))
}
