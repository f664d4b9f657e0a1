use std::rc::Rc;

use crate::constant::{OPTIONS_TERMINATOR, PRIORITY_ARGUMENT};
use crate::context::{ParseOutcome, ParserContext};
use crate::convert::ValueParser;
use crate::dependency::RegistryHandle;
use crate::doc::{DocEntry, DocFragments, DocState};
use crate::eval::Eval;
use crate::leaf::{
    absorb_value, complete_slot, end_of_input, unexpected, ValueState,
};
use crate::message::{Diagnostic, Message, Overrides};
use crate::model::{Mode, Priority};
use crate::parser::{Parser, ParserCore};
use crate::state::State;
use crate::suggest::Suggestion;
use crate::usage::{Usage, UsageTerm};
use crate::value::ErasedValue;

/// A positional argument. Option-looking tokens are refused until the
/// explicit `--` marker has been consumed; the marker itself is consumed by
/// the first unfilled argument that sees it.
struct ArgumentParser<T> {
    value: ValueParser<T>,
    overrides: Overrides,
}

impl<T: Clone + 'static> ArgumentParser<T> {
    fn term(&self) -> UsageTerm {
        UsageTerm::Argument {
            metavar: self.value.metavar().to_string(),
        }
    }
}

fn option_like(token: &str) -> bool {
    token.len() > 1 && token.starts_with('-')
}

impl<T: Clone + 'static> ParserCore for ArgumentParser<T> {
    fn priority(&self) -> Priority {
        PRIORITY_ARGUMENT
    }

    fn mode(&self) -> Mode {
        self.value.mode()
    }

    fn usage(&self) -> Usage {
        vec![self.term()]
    }

    fn initial_state(&self) -> State {
        State::new(ValueState::unset())
    }

    fn parse<'a>(&self, context: ParserContext<'a>) -> ParseOutcome<'a> {
        let token = match context.buffer.first() {
            Some(token) => token.clone(),
            None => return ParseOutcome::fail(0, end_of_input()),
        };

        let state = context.state.expect_ref::<ValueState>().clone();

        if !context.options_terminated {
            if token == OPTIONS_TERMINATOR {
                let registry = context.registry.clone();
                let state = context.state.clone();
                return ParseOutcome::advance(context, 1, true, state, registry);
            }

            if option_like(&token) {
                return ParseOutcome::fail(0, unexpected(&token, &context));
            }
        }

        if state.is_set() {
            // Already filled; the token belongs to a later positional.
            return ParseOutcome::fail(0, unexpected(&token, &context));
        }

        let mut registry = context.registry.clone();
        match absorb_value(&self.value, &mut registry, &token, self.value.metavar()) {
            Ok(slot) => {
                let options_terminated = context.options_terminated;
                ParseOutcome::advance(
                    context,
                    1,
                    options_terminated,
                    State::new(ValueState { slot }),
                    registry,
                )
            }
            Err(error) => {
                let error =
                    crate::leaf::apply_invalid_override(error, &self.overrides.invalid, &token);
                ParseOutcome::fail(1, error)
            }
        }
    }

    fn complete(
        &self,
        state: &State,
        registry: &RegistryHandle,
    ) -> Eval<Result<ErasedValue, Diagnostic>> {
        let state = state.expect_ref::<ValueState>();
        let metavar = self.value.metavar().to_string();

        complete_slot(
            &self.value,
            &state.slot,
            registry,
            &metavar,
            &self.overrides.missing,
            &self.overrides.invalid,
            || {
                Message::new()
                    .text("missing required argument ")
                    .metavar(&metavar)
            },
        )
    }

    fn suggest(&self, context: &ParserContext<'_>, prefix: &str) -> Vec<Suggestion> {
        if !context.buffer.is_empty() {
            return Vec::default();
        }

        let state = context.state.expect_ref::<ValueState>();
        if state.is_set() {
            return Vec::default();
        }

        self.value.suggestions(&context.registry, prefix)
    }

    fn doc_fragments(&self, state: DocState<'_>, default: Option<&str>) -> DocFragments {
        DocFragments::entry(DocEntry {
            term: self.term(),
            description: None,
            default: if state.is_available() {
                default.map(str::to_string)
            } else {
                None
            },
        })
    }
}

/// A positional argument.
pub fn argument<T: Clone + 'static>(value: ValueParser<T>) -> Parser<T> {
    argument_with(value, Overrides::default())
}

/// [`argument`] with per-call-site message overrides.
pub fn argument_with<T: Clone + 'static>(
    value: ValueParser<T>,
    overrides: Overrides,
) -> Parser<T> {
    Parser::from_core(Rc::new(ArgumentParser { value, overrides }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert;
    use crate::message::ErrorKind;
    use crate::test::util::{parse_once, root_context};

    #[test]
    fn captures_a_plain_token() {
        let parser = argument(convert::string());
        let tokens = vec!["Alice".to_string()];
        let (state, consumed) = parse_once(&parser, &tokens);
        assert_eq!(consumed, 1);
        let value = parser
            .complete(&state, &Default::default())
            .force_now()
            .unwrap()
            .unwrap();
        assert_eq!(value, "Alice");
    }

    #[test]
    fn refuses_option_like_tokens() {
        let parser = argument(convert::string());
        let tokens = vec!["--verbose".to_string()];
        let context = root_context(&parser, &tokens, parser.initial_state());
        match parser.parse(context) {
            crate::ParseOutcome::Failed(failure) => assert_eq!(failure.consumed, 0),
            crate::ParseOutcome::Matched(_) => panic!("option-like token must be refused"),
        }
    }

    #[test]
    fn terminator_lifts_option_refusal() {
        let parser = argument(convert::string());
        let tokens = vec!["--".to_string(), "--verbose".to_string()];

        // First step consumes the marker without filling the argument.
        let context = root_context(&parser, &tokens, parser.initial_state());
        let next = match parser.parse(context) {
            crate::ParseOutcome::Matched(matched) => matched.next,
            crate::ParseOutcome::Failed(failure) => panic!("marker step failed: {}", failure.error),
        };
        assert!(next.options_terminated);

        // Second step accepts the option-like token as a value.
        match parser.parse(next) {
            crate::ParseOutcome::Matched(matched) => {
                let value = parser
                    .complete(&matched.next.state, &Default::default())
                    .force_now()
                    .unwrap()
                    .unwrap();
                assert_eq!(value, "--verbose");
            }
            crate::ParseOutcome::Failed(failure) => panic!("value step failed: {}", failure.error),
        }
    }

    #[test]
    fn filled_argument_passes_tokens_along() {
        let parser = argument(convert::string());
        let tokens = vec!["one".to_string(), "two".to_string()];
        let (state, _) = parse_once(&parser, &tokens);

        let rest = vec!["two".to_string()];
        let context = root_context(&parser, &rest, state);
        match parser.parse(context) {
            crate::ParseOutcome::Failed(failure) => assert_eq!(failure.consumed, 0),
            crate::ParseOutcome::Matched(_) => panic!("a filled scalar argument must not rematch"),
        }
    }

    #[test]
    fn missing_at_completion() {
        let parser = argument(convert::string().with_metavar("NAME"));
        let error = parser
            .complete(&parser.initial_state(), &Default::default())
            .force_now()
            .unwrap()
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::MissingRequired);
        crate::test::assert_contains!(error.to_string(), "NAME");
    }
}
