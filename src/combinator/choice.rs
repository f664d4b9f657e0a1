use std::rc::Rc;

use crate::combinator::complete_first;
use crate::context::{Failure, Matched, ParseOutcome, ParserContext};
use crate::dependency::RegistryHandle;
use crate::doc::{DocFragments, DocState};
use crate::eval::Eval;
use crate::message::{Diagnostic, ErrorKind, Message, Overrides};
use crate::model::{Mode, Priority};
use crate::parser::{join_modes, max_priority, Parser, ParserCore};
use crate::state::State;
use crate::suggest::{dedup, Suggestion};
use crate::usage::{collect_candidates, usage_label, Usage, UsageTerm};
use crate::value::ErasedValue;

#[cfg(feature = "tracing_debug")]
use tracing::debug;

/// The shared state shape of both exclusive-choice combinators: one slot per
/// alternative, plus the index this choice is locked onto (for `or`, the
/// committed branch; for `longest_match`, the latest winner).
#[derive(Debug, Clone)]
struct ChoiceState {
    committed: Option<usize>,
    children: Vec<State>,
}

fn choice_initial_state(children: &[Rc<dyn ParserCore>]) -> State {
    State::new(ChoiceState {
        committed: None,
        children: children.iter().map(|child| child.initial_state()).collect(),
    })
}

/// Rank competing failures: the branch that got furthest wins. A tie (or an
/// all-zero field) collapses to the overridable no-match message.
fn ranked_failure(
    failures: Vec<Failure>,
    overrides: &Overrides,
    token: &str,
    candidates: Vec<String>,
) -> Failure {
    let max = failures
        .iter()
        .map(|failure| failure.consumed)
        .max()
        .unwrap_or(0);
    let mut top = failures
        .into_iter()
        .filter(|failure| failure.consumed == max);
    let first = top.next();
    let runner_up = top.next();

    match (first, runner_up) {
        (Some(failure), None) if max > 0 => failure,
        _ => {
            let message = Overrides::message(&overrides.no_match, token, || {
                if token.is_empty() {
                    Message::new().text("no matching alternative")
                } else {
                    Message::new()
                        .text("no matching alternative for ")
                        .value(token)
                }
            });
            Failure {
                consumed: max,
                error: Diagnostic::new(ErrorKind::Unexpected, message).with_candidates(candidates),
            }
        }
    }
}

fn rewrap<'a>(
    matched: Matched<'a>,
    committed: Option<usize>,
    index: usize,
    mut children: Vec<State>,
) -> ParseOutcome<'a> {
    children[index] = matched.next.state;
    ParseOutcome::Matched(Matched {
        next: ParserContext {
            buffer: matched.next.buffer,
            options_terminated: matched.next.options_terminated,
            state: State::new(ChoiceState {
                committed,
                children,
            }),
            registry: matched.next.registry,
            grammar: matched.next.grammar,
        },
        consumed: matched.consumed,
    })
}

/// First-match exclusive choice.
///
/// Alternatives are tried in declaration order, except that a committed
/// branch (one with a prior consuming success) is always tried first, locking
/// later calls onto it. A consuming success on a *different* branch while one
/// is committed is a mutual-exclusivity conflict, reported rather than
/// silently resolved.
struct OrParser {
    children: Vec<Rc<dyn ParserCore>>,
    overrides: Overrides,
    priority: Priority,
    mode: Mode,
}

impl ParserCore for OrParser {
    fn priority(&self) -> Priority {
        self.priority
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn usage(&self) -> Usage {
        vec![UsageTerm::Exclusive(
            self.children.iter().map(|child| child.usage()).collect(),
        )]
    }

    fn initial_state(&self) -> State {
        choice_initial_state(&self.children)
    }

    fn parse<'a>(&self, context: ParserContext<'a>) -> ParseOutcome<'a> {
        let state = context.state.expect_ref::<ChoiceState>().clone();
        let order: Vec<usize> = match state.committed {
            Some(first) => std::iter::once(first)
                .chain((0..self.children.len()).filter(|&index| index != first))
                .collect(),
            None => (0..self.children.len()).collect(),
        };

        let mut zero_success: Option<(usize, Matched<'a>)> = None;
        let mut failures: Vec<Failure> = Vec::default();

        for index in order {
            let child_context = context.for_child(state.children[index].clone());

            match self.children[index].parse(child_context) {
                ParseOutcome::Matched(matched) if !matched.consumed.is_empty() => {
                    if let Some(committed) = state.committed {
                        if committed != index {
                            let token = matched.consumed[0].clone();
                            let left = usage_label(&self.children[committed].usage());
                            let right = usage_label(&self.children[index].usage());
                            let message =
                                Overrides::message(&self.overrides.conflict, &token, || {
                                    Message::new()
                                        .option_name(&left)
                                        .text(" and ")
                                        .option_name(&right)
                                        .text(" cannot be used together")
                                });
                            return ParseOutcome::fail(
                                matched.consumed.len(),
                                Diagnostic::new(ErrorKind::Conflict, message),
                            );
                        }
                    }

                    #[cfg(feature = "tracing_debug")]
                    {
                        debug!("Exclusive choice committed to alternative {index}.");
                    }

                    return rewrap(matched, Some(index), index, state.children.clone());
                }
                ParseOutcome::Matched(matched) => {
                    // A zero-consumption success is not a commitment, and by
                    // the same token never a conflict.
                    if zero_success.is_none() {
                        zero_success = Some((index, matched));
                    }
                }
                ParseOutcome::Failed(failure) => failures.push(failure),
            }
        }

        if let Some((index, matched)) = zero_success {
            return rewrap(matched, state.committed, index, state.children.clone());
        }

        let token = context
            .buffer
            .first()
            .map(String::as_str)
            .unwrap_or("")
            .to_string();
        ParseOutcome::Failed(ranked_failure(
            failures,
            &self.overrides,
            &token,
            collect_candidates(&self.usage()),
        ))
    }

    fn complete(
        &self,
        state: &State,
        registry: &RegistryHandle,
    ) -> Eval<Result<ErasedValue, Diagnostic>> {
        let state = state.expect_ref::<ChoiceState>();

        if let Some(committed) = state.committed {
            return self.children[committed].complete(&state.children[committed], registry);
        }

        let remaining: Vec<_> = self
            .children
            .iter()
            .cloned()
            .zip(state.children.iter().cloned())
            .collect();
        complete_first(remaining, registry.clone(), None)
    }

    fn suggest(&self, context: &ParserContext<'_>, prefix: &str) -> Vec<Suggestion> {
        let state = context.state.expect_ref::<ChoiceState>();

        let suggestions = match state.committed {
            Some(committed) => {
                let child = context.for_child(state.children[committed].clone());
                self.children[committed].suggest(&child, prefix)
            }
            None => self
                .children
                .iter()
                .enumerate()
                .flat_map(|(index, child)| {
                    let child_context = context.for_child(state.children[index].clone());
                    child.suggest(&child_context, prefix)
                })
                .collect(),
        };

        dedup(suggestions)
    }

    fn doc_fragments(&self, state: DocState<'_>, default: Option<&str>) -> DocFragments {
        let fragments = match state {
            DocState::Available(state) => {
                let state = state.expect_ref::<ChoiceState>();
                self.children
                    .iter()
                    .enumerate()
                    .map(|(index, child)| {
                        if state.committed == Some(index) {
                            child.doc_fragments(DocState::Available(&state.children[index]), default)
                        } else {
                            child.doc_fragments(DocState::Unavailable, default)
                        }
                    })
                    .collect()
            }
            DocState::Unavailable => self
                .children
                .iter()
                .map(|child| child.doc_fragments(DocState::Unavailable, default))
                .collect(),
        };
        DocFragments::combine(fragments)
    }
}

/// Exclusive choice by consumption length.
///
/// Every alternative is evaluated on every call - no short-circuit - and the
/// one that succeeded while consuming the most tokens wins; ties go to the
/// first listed. Used where the longer match is the more specific, hence
/// correct, interpretation.
struct LongestMatchParser {
    children: Vec<Rc<dyn ParserCore>>,
    overrides: Overrides,
    priority: Priority,
    mode: Mode,
}

impl ParserCore for LongestMatchParser {
    fn priority(&self) -> Priority {
        self.priority
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn usage(&self) -> Usage {
        vec![UsageTerm::Exclusive(
            self.children.iter().map(|child| child.usage()).collect(),
        )]
    }

    fn initial_state(&self) -> State {
        choice_initial_state(&self.children)
    }

    fn parse<'a>(&self, context: ParserContext<'a>) -> ParseOutcome<'a> {
        let state = context.state.expect_ref::<ChoiceState>().clone();

        let mut best: Option<(usize, Matched<'a>)> = None;
        let mut failures: Vec<Failure> = Vec::default();

        for (index, child) in self.children.iter().enumerate() {
            let child_context = context.for_child(state.children[index].clone());

            match child.parse(child_context) {
                ParseOutcome::Matched(matched) => {
                    let better = match &best {
                        // Strictly greater: the first listed wins ties.
                        Some((_, current)) => matched.consumed.len() > current.consumed.len(),
                        None => true,
                    };
                    if better {
                        best = Some((index, matched));
                    }
                }
                ParseOutcome::Failed(failure) => failures.push(failure),
            }
        }

        match best {
            Some((index, matched)) if !matched.consumed.is_empty() => {
                #[cfg(feature = "tracing_debug")]
                {
                    debug!(
                        "Longest match selected alternative {index} ({} tokens).",
                        matched.consumed.len()
                    );
                }
                rewrap(matched, Some(index), index, state.children.clone())
            }
            Some((index, matched)) => rewrap(matched, state.committed, index, state.children.clone()),
            None => {
                let token = context
                    .buffer
                    .first()
                    .map(String::as_str)
                    .unwrap_or("")
                    .to_string();
                ParseOutcome::Failed(ranked_failure(
                    failures,
                    &self.overrides,
                    &token,
                    collect_candidates(&self.usage()),
                ))
            }
        }
    }

    fn complete(
        &self,
        state: &State,
        registry: &RegistryHandle,
    ) -> Eval<Result<ErasedValue, Diagnostic>> {
        let state = state.expect_ref::<ChoiceState>();

        if let Some(selected) = state.committed {
            return self.children[selected].complete(&state.children[selected], registry);
        }

        let remaining: Vec<_> = self
            .children
            .iter()
            .cloned()
            .zip(state.children.iter().cloned())
            .collect();
        complete_first(remaining, registry.clone(), None)
    }

    fn suggest(&self, context: &ParserContext<'_>, prefix: &str) -> Vec<Suggestion> {
        let state = context.state.expect_ref::<ChoiceState>();

        let suggestions = match state.committed {
            Some(selected) => {
                let child = context.for_child(state.children[selected].clone());
                self.children[selected].suggest(&child, prefix)
            }
            None => self
                .children
                .iter()
                .enumerate()
                .flat_map(|(index, child)| {
                    let child_context = context.for_child(state.children[index].clone());
                    child.suggest(&child_context, prefix)
                })
                .collect(),
        };

        dedup(suggestions)
    }

    fn doc_fragments(&self, state: DocState<'_>, default: Option<&str>) -> DocFragments {
        let fragments = match state {
            DocState::Available(state) => {
                let state = state.expect_ref::<ChoiceState>();
                self.children
                    .iter()
                    .enumerate()
                    .map(|(index, child)| {
                        if state.committed == Some(index) {
                            child.doc_fragments(DocState::Available(&state.children[index]), default)
                        } else {
                            child.doc_fragments(DocState::Unavailable, default)
                        }
                    })
                    .collect()
            }
            DocState::Unavailable => self
                .children
                .iter()
                .map(|child| child.doc_fragments(DocState::Unavailable, default))
                .collect(),
        };
        DocFragments::combine(fragments)
    }
}

/// First-match exclusive choice over alternatives of one value type.
pub fn or<T: 'static>(alternatives: Vec<Parser<T>>) -> Parser<T> {
    or_with(alternatives, Overrides::default())
}

/// [`or`] with per-call-site message overrides (`no_match`, `conflict`).
pub fn or_with<T: 'static>(alternatives: Vec<Parser<T>>, overrides: Overrides) -> Parser<T> {
    let children: Vec<Rc<dyn ParserCore>> = alternatives
        .iter()
        .map(|alternative| alternative.core())
        .collect();
    let priority = max_priority(children.iter());
    let mode = join_modes(children.iter());
    Parser::from_core(Rc::new(OrParser {
        children,
        overrides,
        priority,
        mode,
    }))
}

/// Exclusive choice keeping whichever alternative consumes the most tokens.
pub fn longest_match<T: 'static>(alternatives: Vec<Parser<T>>) -> Parser<T> {
    longest_match_with(alternatives, Overrides::default())
}

/// [`longest_match`] with per-call-site message overrides.
pub fn longest_match_with<T: 'static>(
    alternatives: Vec<Parser<T>>,
    overrides: Overrides,
) -> Parser<T> {
    let children: Vec<Rc<dyn ParserCore>> = alternatives
        .iter()
        .map(|alternative| alternative.core())
        .collect();
    let priority = max_priority(children.iter());
    let mode = join_modes(children.iter());
    Parser::from_core(Rc::new(LongestMatchParser {
        children,
        overrides,
        priority,
        mode,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert;
    use crate::leaf::{option, switch};
    use crate::test::util::{parse_all, root_context};

    fn labeled(value: &str) -> Parser<String> {
        let name = format!("--{value}");
        let value = value.to_string();
        switch(&[name.as_str()]).map(move |_| value.clone())
    }

    #[test]
    fn second_alternative_wins_when_first_cannot() {
        let parser = or(vec![labeled("a"), labeled("b")]);
        let tokens = vec!["--b".to_string()];
        let (state, registry) = parse_all(&parser, &tokens);
        let value = parser
            .complete(&state, &registry.into_handle())
            .force_now()
            .unwrap()
            .unwrap();
        assert_eq!(value, "b");
    }

    #[test]
    fn commitment_sticks_across_calls() {
        let a = option(&["-a"], convert::string());
        let b = option(&["-b"], convert::string());
        let parser = or(vec![a, b]);

        let tokens = vec!["-a".to_string(), "x".to_string()];
        let (state, registry) = parse_all(&parser, &tokens);
        let value = parser
            .complete(&state, &registry.into_handle())
            .force_now()
            .unwrap()
            .unwrap();
        assert_eq!(value, "x");
    }

    #[test]
    fn conflicting_commitments_are_reported() {
        let parser = or(vec![labeled("a"), labeled("b")]);
        let tokens = vec!["--a".to_string(), "--b".to_string()];

        let (state, _) = parse_all(&parser, &tokens[..1]);
        let rest = vec!["--b".to_string()];
        let context = root_context(&parser, &rest, state);
        match parser.parse(context) {
            ParseOutcome::Failed(failure) => {
                assert_eq!(failure.error.kind, ErrorKind::Conflict);
                crate::test::assert_contains!(
                    failure.error.to_string(),
                    "cannot be used together"
                );
            }
            ParseOutcome::Matched(_) => panic!("conflict must not be silently resolved"),
        }
    }

    #[test]
    fn failure_ranking_prefers_the_furthest_branch() {
        let a = option(&["--port"], convert::integer());
        let b = option(&["--host"], convert::integer());
        let parser = or(vec![a, b]);

        // "--port nope" is recognized 2 tokens deep by the first branch.
        let tokens = vec!["--port".to_string(), "nope".to_string()];
        let context = root_context(&parser, &tokens, parser.initial_state());
        match parser.parse(context) {
            ParseOutcome::Failed(failure) => {
                assert_eq!(failure.consumed, 2);
                assert_eq!(failure.error.kind, ErrorKind::InvalidValue);
            }
            ParseOutcome::Matched(_) => panic!("conversion failure must propagate"),
        }
    }

    #[test]
    fn tie_collapses_to_no_match() {
        let parser = or(vec![labeled("a"), labeled("b")]);
        let tokens = vec!["--c".to_string()];
        let context = root_context(&parser, &tokens, parser.initial_state());
        match parser.parse(context) {
            ParseOutcome::Failed(failure) => {
                assert_eq!(failure.consumed, 0);
                crate::test::assert_contains!(failure.error.to_string(), "no matching alternative");
                assert_eq!(
                    failure.error.candidates,
                    vec!["--a".to_string(), "--b".to_string()]
                );
            }
            ParseOutcome::Matched(_) => panic!("unknown token must not match"),
        }
    }

    #[test]
    fn longest_match_takes_the_longer_parse() {
        // "-k v" consumes 2 tokens for the option branch, 1 for the switch.
        let short = switch(&["-k"]).map(|_| "short".to_string());
        let long = option(&["-k"], convert::string()).map(|_| "long".to_string());
        let parser = longest_match(vec![short, long]);

        let tokens = vec!["-k".to_string(), "v".to_string()];
        let (state, registry) = parse_all(&parser, &tokens);
        let value = parser
            .complete(&state, &registry.into_handle())
            .force_now()
            .unwrap()
            .unwrap();
        assert_eq!(value, "long");
    }

    #[test]
    fn longest_match_ties_prefer_declaration_order() {
        let parser = longest_match(vec![
            switch(&["-k"]).map(|_| "first".to_string()),
            switch(&["-k"]).map(|_| "second".to_string()),
        ]);

        let tokens = vec!["-k".to_string()];
        let (state, registry) = parse_all(&parser, &tokens);
        let value = parser
            .complete(&state, &registry.into_handle())
            .force_now()
            .unwrap()
            .unwrap();
        assert_eq!(value, "first");
    }

    #[test]
    fn uncommitted_completion_falls_back_in_order() {
        let parser = or(vec![
            switch(&["-a"]).map(|set| set),
            flag_like_required(),
        ]);
        let value = parser
            .complete(&parser.initial_state(), &Default::default())
            .force_now()
            .unwrap()
            .unwrap();
        assert!(!value);
    }

    fn flag_like_required() -> Parser<bool> {
        crate::leaf::flag(&["-b"])
    }
}
