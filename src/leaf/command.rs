use std::rc::Rc;

use crate::constant::PRIORITY_COMMAND;
use crate::context::{ParseOutcome, ParserContext};
use crate::dependency::RegistryHandle;
use crate::doc::{DocFragments, DocState};
use crate::eval::Eval;
use crate::leaf::{end_of_input, unexpected};
use crate::message::{Diagnostic, ErrorKind, Message};
use crate::model::{Mode, Priority};
use crate::parser::{Parser, ParserCore};
use crate::state::State;
use crate::suggest::Suggestion;
use crate::usage::{Usage, UsageTerm};
use crate::value::ErasedValue;

#[derive(Debug, Clone)]
struct CommandState {
    entered: bool,
    sub: State,
}

/// A subcommand: a literal keyword that, once matched, hands every later
/// call to its sub-parser.
struct CommandParser {
    name: String,
    sub: Rc<dyn ParserCore>,
}

impl ParserCore for CommandParser {
    fn priority(&self) -> Priority {
        PRIORITY_COMMAND
    }

    fn mode(&self) -> Mode {
        self.sub.mode()
    }

    fn usage(&self) -> Usage {
        let mut usage = vec![UsageTerm::Command {
            name: self.name.clone(),
        }];
        usage.extend(self.sub.usage());
        usage
    }

    fn initial_state(&self) -> State {
        State::new(CommandState {
            entered: false,
            sub: self.sub.initial_state(),
        })
    }

    fn parse<'a>(&self, context: ParserContext<'a>) -> ParseOutcome<'a> {
        let state = context.state.expect_ref::<CommandState>().clone();

        if !state.entered {
            let token = match context.buffer.first() {
                Some(token) => token.clone(),
                None => return ParseOutcome::fail(0, end_of_input()),
            };

            if token != self.name {
                return ParseOutcome::fail(0, unexpected(&token, &context));
            }

            let options_terminated = context.options_terminated;
            let registry = context.registry.clone();
            return ParseOutcome::advance(
                context,
                1,
                options_terminated,
                State::new(CommandState {
                    entered: true,
                    sub: state.sub,
                }),
                registry,
            );
        }

        match self.sub.parse(context.for_child(state.sub)) {
            ParseOutcome::Matched(matched) => {
                let sub = matched.next.state;
                ParseOutcome::Matched(crate::context::Matched {
                    next: ParserContext {
                        buffer: matched.next.buffer,
                        options_terminated: matched.next.options_terminated,
                        state: State::new(CommandState { entered: true, sub }),
                        registry: matched.next.registry,
                        grammar: matched.next.grammar,
                    },
                    consumed: matched.consumed,
                })
            }
            failed => failed,
        }
    }

    fn complete(
        &self,
        state: &State,
        registry: &RegistryHandle,
    ) -> Eval<Result<ErasedValue, Diagnostic>> {
        let state = state.expect_ref::<CommandState>();

        if state.entered {
            self.sub.complete(&state.sub, registry)
        } else {
            Eval::ready(Err(Diagnostic::new(
                ErrorKind::MissingRequired,
                Message::new()
                    .text("missing required command ")
                    .value(&self.name),
            )))
        }
    }

    fn suggest(&self, context: &ParserContext<'_>, prefix: &str) -> Vec<Suggestion> {
        let state = context.state.expect_ref::<CommandState>();

        if state.entered {
            let child = context.for_child(state.sub.clone());
            self.sub.suggest(&child, prefix)
        } else if context.buffer.is_empty() && self.name.starts_with(prefix) {
            vec![Suggestion::literal(&self.name)]
        } else {
            Vec::default()
        }
    }

    fn doc_fragments(&self, state: DocState<'_>, default: Option<&str>) -> DocFragments {
        match state {
            DocState::Available(state) => {
                let state = state.expect_ref::<CommandState>();
                if state.entered {
                    self.sub
                        .doc_fragments(DocState::Available(&state.sub), default)
                } else {
                    self.sub.doc_fragments(DocState::Unavailable, default)
                }
            }
            DocState::Unavailable => self.sub.doc_fragments(DocState::Unavailable, default),
        }
    }
}

/// A subcommand keyword with its own parser for everything that follows it.
pub fn command<T: 'static>(name: impl Into<String>, sub: Parser<T>) -> Parser<T> {
    Parser::from_core(Rc::new(CommandParser {
        name: name.into(),
        sub: sub.core(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert;
    use crate::leaf::argument;
    use crate::test::util::{parse_once, root_context};

    #[test]
    fn keyword_then_delegation() {
        let parser = command("add", argument(convert::string()));
        let tokens = vec!["add".to_string(), "item".to_string()];

        let (state, consumed) = parse_once(&parser, &tokens);
        assert_eq!(consumed, 1);

        let rest = vec!["item".to_string()];
        let context = root_context(&parser, &rest, state);
        match parser.parse(context) {
            crate::ParseOutcome::Matched(matched) => {
                let value = parser
                    .complete(&matched.next.state, &Default::default())
                    .force_now()
                    .unwrap()
                    .unwrap();
                assert_eq!(value, "item");
            }
            crate::ParseOutcome::Failed(failure) => panic!("delegation failed: {}", failure.error),
        }
    }

    #[test]
    fn wrong_keyword_does_not_consume() {
        let parser = command("add", argument(convert::string()));
        let tokens = vec!["remove".to_string()];
        let context = root_context(&parser, &tokens, parser.initial_state());
        match parser.parse(context) {
            crate::ParseOutcome::Failed(failure) => {
                assert_eq!(failure.consumed, 0);
                assert_eq!(failure.error.kind, ErrorKind::Unexpected);
            }
            crate::ParseOutcome::Matched(_) => panic!("wrong keyword must not match"),
        }
    }

    #[test]
    fn missing_command_at_completion() {
        let parser = command("add", argument(convert::string()));
        let error = parser
            .complete(&parser.initial_state(), &Default::default())
            .force_now()
            .unwrap()
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::MissingRequired);
        crate::test::assert_contains!(error.to_string(), "add");
    }

    #[test]
    fn suggests_its_keyword() {
        let parser = command("add", argument(convert::string()));
        let tokens: Vec<String> = Vec::default();
        let context = root_context(&parser, &tokens, parser.initial_state());
        assert_eq!(
            parser.suggest(&context, "a"),
            vec![Suggestion::literal("add")]
        );
        assert_eq!(parser.suggest(&context, "b"), vec![]);
    }
}
