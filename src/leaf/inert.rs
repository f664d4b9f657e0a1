use std::rc::Rc;

use crate::constant::{OPTIONS_TERMINATOR, PRIORITY_INERT};
use crate::context::{ParseOutcome, ParserContext};
use crate::dependency::RegistryHandle;
use crate::doc::{DocFragments, DocState};
use crate::eval::Eval;
use crate::message::Diagnostic;
use crate::model::{Mode, Priority};
use crate::parser::{Parser, ParserCore};
use crate::state::State;
use crate::suggest::Suggestion;
use crate::usage::{Usage, UsageTerm};
use crate::value::ErasedValue;

/// A parser that consumes nothing and completes to a fixed value. Useful for
/// tagging the branches of an exclusive choice.
struct ConstantParser {
    produce: Rc<dyn Fn() -> ErasedValue>,
}

impl ParserCore for ConstantParser {
    fn priority(&self) -> Priority {
        PRIORITY_INERT
    }

    fn mode(&self) -> Mode {
        Mode::Sync
    }

    fn usage(&self) -> Usage {
        Vec::default()
    }

    fn initial_state(&self) -> State {
        State::new(())
    }

    fn parse<'a>(&self, context: ParserContext<'a>) -> ParseOutcome<'a> {
        let options_terminated = context.options_terminated;
        let registry = context.registry.clone();
        let state = context.state.clone();
        // A zero-consumption success: never a commitment.
        ParseOutcome::advance(context, 0, options_terminated, state, registry)
    }

    fn complete(
        &self,
        _state: &State,
        _registry: &RegistryHandle,
    ) -> Eval<Result<ErasedValue, Diagnostic>> {
        Eval::ready(Ok((self.produce)()))
    }

    fn suggest(&self, _context: &ParserContext<'_>, _prefix: &str) -> Vec<Suggestion> {
        Vec::default()
    }

    fn doc_fragments(&self, _state: DocState<'_>, _default: Option<&str>) -> DocFragments {
        DocFragments::default()
    }
}

/// A parser that accepts no tokens and always completes to `value`.
pub fn constant<T: Clone + 'static>(value: T) -> Parser<T> {
    Parser::from_core(Rc::new(ConstantParser {
        produce: Rc::new(move || ErasedValue::new(value.clone())),
    }))
}

#[derive(Debug, Clone, Default)]
struct CapturedTokens {
    tokens: Vec<String>,
}

/// A parser that captures the remaining tokens verbatim, consuming a leading
/// `--` marker if options are not yet terminated.
struct PassthroughParser {}

impl ParserCore for PassthroughParser {
    fn priority(&self) -> Priority {
        PRIORITY_INERT
    }

    fn mode(&self) -> Mode {
        Mode::Sync
    }

    fn usage(&self) -> Usage {
        vec![UsageTerm::Passthrough]
    }

    fn initial_state(&self) -> State {
        State::new(CapturedTokens::default())
    }

    fn parse<'a>(&self, context: ParserContext<'a>) -> ParseOutcome<'a> {
        if context.buffer.is_empty() {
            let options_terminated = context.options_terminated;
            let registry = context.registry.clone();
            let state = context.state.clone();
            return ParseOutcome::advance(context, 0, options_terminated, state, registry);
        }

        let mut captured = context.state.expect_ref::<CapturedTokens>().clone();
        let mut options_terminated = context.options_terminated;
        let mut skip = 0;

        if !options_terminated && context.buffer[0] == OPTIONS_TERMINATOR {
            options_terminated = true;
            skip = 1;
        }

        captured
            .tokens
            .extend(context.buffer[skip..].iter().cloned());

        let consumed = context.buffer.len();
        let registry = context.registry.clone();
        ParseOutcome::advance(
            context,
            consumed,
            options_terminated,
            State::new(captured),
            registry,
        )
    }

    fn complete(
        &self,
        state: &State,
        _registry: &RegistryHandle,
    ) -> Eval<Result<ErasedValue, Diagnostic>> {
        let captured = state.expect_ref::<CapturedTokens>();
        Eval::ready(Ok(ErasedValue::new(captured.tokens.clone())))
    }

    fn suggest(&self, _context: &ParserContext<'_>, _prefix: &str) -> Vec<Suggestion> {
        Vec::default()
    }

    fn doc_fragments(&self, _state: DocState<'_>, _default: Option<&str>) -> DocFragments {
        DocFragments::default()
    }
}

/// Capture every remaining token verbatim, e.g. for forwarding to another
/// program.
pub fn passthrough() -> Parser<Vec<String>> {
    Parser::from_core(Rc::new(PassthroughParser {}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::util::{parse_once, root_context};

    #[test]
    fn constant_consumes_nothing() {
        let parser = constant(42u32);
        let tokens = vec!["anything".to_string()];
        let (state, consumed) = parse_once(&parser, &tokens);
        assert_eq!(consumed, 0);
        let value = parser
            .complete(&state, &Default::default())
            .force_now()
            .unwrap()
            .unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn passthrough_takes_everything() {
        let parser = passthrough();
        let tokens = vec!["a".to_string(), "-b".to_string(), "c".to_string()];
        let (state, consumed) = parse_once(&parser, &tokens);
        assert_eq!(consumed, 3);
        let value = parser
            .complete(&state, &Default::default())
            .force_now()
            .unwrap()
            .unwrap();
        assert_eq!(value, vec!["a", "-b", "c"]);
    }

    #[test]
    fn passthrough_strips_leading_terminator() {
        let parser = passthrough();
        let tokens = vec!["--".to_string(), "--not-an-option".to_string()];
        let context = root_context(&parser, &tokens, parser.initial_state());
        match parser.parse(context) {
            crate::ParseOutcome::Matched(matched) => {
                assert_eq!(matched.consumed.len(), 2);
                assert!(matched.next.options_terminated);
                let value = parser
                    .complete(&matched.next.state, &Default::default())
                    .force_now()
                    .unwrap()
                    .unwrap();
                assert_eq!(value, vec!["--not-an-option"]);
            }
            crate::ParseOutcome::Failed(failure) => panic!("passthrough failed: {}", failure.error),
        }
    }
}
