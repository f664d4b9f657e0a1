use std::rc::Rc;

use crate::constant::PRIORITY_OPTION;
use crate::context::{ParseOutcome, ParserContext};
use crate::convert::ValueParser;
use crate::dependency::RegistryHandle;
use crate::doc::{DocEntry, DocFragments, DocState};
use crate::eval::Eval;
use crate::leaf::{absorb_value, complete_slot, end_of_input, unexpected, ValueState};
use crate::message::{Diagnostic, ErrorKind, Message, Overrides};
use crate::model::{Mode, Priority};
use crate::parser::{Parser, ParserCore};
use crate::state::State;
use crate::suggest::Suggestion;
use crate::usage::{Usage, UsageTerm};
use crate::value::ErasedValue;

/// A valued option: `--name value`, `--name=value`, `-n value` or `-n=value`.
struct OptionParser<T> {
    names: Vec<String>,
    value: ValueParser<T>,
    overrides: Overrides,
}

impl<T: Clone + 'static> OptionParser<T> {
    fn term(&self) -> UsageTerm {
        UsageTerm::Option {
            names: self.names.clone(),
            metavar: Some(self.value.metavar().to_string()),
        }
    }

    fn label(&self) -> &str {
        self.names
            .first()
            .map(String::as_str)
            .unwrap_or("<unnamed>")
    }

    /// Split the head token into the matched spelling and an inline
    /// `=`-delimited value, if either applies.
    fn match_name(&self, token: &str) -> Option<(String, Option<String>)> {
        if let Some((head, rest)) = token.split_once('=') {
            if self.names.iter().any(|name| name == head) {
                return Some((head.to_string(), Some(rest.to_string())));
            }
        }

        if self.names.iter().any(|name| name == token) {
            return Some((token.to_string(), None));
        }

        None
    }
}

impl<T: Clone + 'static> ParserCore for OptionParser<T> {
    fn priority(&self) -> Priority {
        PRIORITY_OPTION
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

        if context.options_terminated {
            return ParseOutcome::fail(0, unexpected(&token, &context));
        }

        let (name, inline) = match self.match_name(&token) {
            Some(matched) => matched,
            None => return ParseOutcome::fail(0, unexpected(&token, &context)),
        };

        let state = context.state.expect_ref::<ValueState>().clone();
        if state.is_set() {
            let message = Overrides::message(&self.overrides.duplicate, &name, || {
                Message::new()
                    .option_name(&name)
                    .text(" cannot be used multiple times")
            });
            return ParseOutcome::fail(1, Diagnostic::new(ErrorKind::Duplicate, message));
        }

        let (raw, consumed) = match inline {
            Some(value) => (value, 1),
            None => match context.buffer.get(1) {
                Some(value) => (value.clone(), 2),
                None => {
                    let message = Overrides::message(&self.overrides.missing, &name, || {
                        Message::new()
                            .option_name(&name)
                            .text(" requires a ")
                            .metavar(self.value.metavar())
                            .text(" value")
                    });
                    return ParseOutcome::fail(
                        1,
                        Diagnostic::new(ErrorKind::MissingRequired, message),
                    );
                }
            },
        };

        let mut registry = context.registry.clone();
        match absorb_value(&self.value, &mut registry, &raw, &name) {
            Ok(slot) => {
                let options_terminated = context.options_terminated;
                ParseOutcome::advance(
                    context,
                    consumed,
                    options_terminated,
                    State::new(ValueState { slot }),
                    registry,
                )
            }
            Err(error) => {
                let error = crate::leaf::apply_invalid_override(error, &self.overrides.invalid, &raw);
                ParseOutcome::fail(consumed, error)
            }
        }
    }

    fn complete(
        &self,
        state: &State,
        registry: &RegistryHandle,
    ) -> Eval<Result<ErasedValue, Diagnostic>> {
        let state = state.expect_ref::<ValueState>();
        let label = self.label().to_string();

        complete_slot(
            &self.value,
            &state.slot,
            registry,
            &label,
            &self.overrides.missing,
            &self.overrides.invalid,
            || {
                Message::new()
                    .text("required ")
                    .option_name(&label)
                    .text(" is missing")
            },
        )
    }

    fn suggest(&self, context: &ParserContext<'_>, prefix: &str) -> Vec<Suggestion> {
        match context.buffer {
            [] => {
                let state = context.state.expect_ref::<ValueState>();
                if state.is_set() {
                    return Vec::default();
                }
                self.names
                    .iter()
                    .filter(|name| name.starts_with(prefix))
                    .map(Suggestion::literal)
                    .collect()
            }
            // The option name is pending its value: offer value candidates.
            [pending] if self.names.iter().any(|name| name == pending) => {
                self.value.suggestions(&context.registry, prefix)
            }
            _ => Vec::default(),
        }
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

/// A valued option accepting `--name value`, `--name=value`, and the same
/// forms for every other spelling in `names`.
pub fn option<T: Clone + 'static>(names: &[&str], value: ValueParser<T>) -> Parser<T> {
    option_with(names, value, Overrides::default())
}

/// [`option`] with per-call-site message overrides.
pub fn option_with<T: Clone + 'static>(
    names: &[&str],
    value: ValueParser<T>,
    overrides: Overrides,
) -> Parser<T> {
    Parser::from_core(Rc::new(OptionParser {
        names: names.iter().map(|name| name.to_string()).collect(),
        value,
        overrides,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert;
    use crate::test::util::{parse_once, root_context};
    use rstest::rstest;

    #[rstest]
    #[case(vec!["--port", "80"], 2)]
    #[case(vec!["--port=80"], 1)]
    #[case(vec!["-p", "80"], 2)]
    #[case(vec!["-p=80"], 1)]
    fn option_forms(#[case] tokens: Vec<&str>, #[case] expected_consumed: usize) {
        let parser = option(&["-p", "--port"], convert::integer());
        let tokens: Vec<String> = tokens.into_iter().map(String::from).collect();
        let (state, consumed) = parse_once(&parser, &tokens);
        assert_eq!(consumed, expected_consumed);

        let value = parser
            .complete(&state, &Default::default())
            .force_now()
            .unwrap()
            .unwrap();
        assert_eq!(value, 80);
    }

    #[test]
    fn invalid_value_fails_at_parse() {
        let parser = option(&["--port"], convert::integer());
        let tokens = vec!["--port".to_string(), "nope".to_string()];
        let context = root_context(&parser, &tokens, parser.initial_state());
        match parser.parse(context) {
            crate::ParseOutcome::Failed(failure) => {
                assert_eq!(failure.consumed, 2);
                assert_eq!(failure.error.kind, ErrorKind::InvalidValue);
            }
            crate::ParseOutcome::Matched(_) => panic!("conversion failure must fail the parse"),
        }
    }

    #[test]
    fn missing_value_at_end_of_input() {
        let parser = option(&["--port"], convert::integer());
        let tokens = vec!["--port".to_string()];
        let context = root_context(&parser, &tokens, parser.initial_state());
        match parser.parse(context) {
            crate::ParseOutcome::Failed(failure) => {
                assert_eq!(failure.consumed, 1);
                assert_eq!(failure.error.kind, ErrorKind::MissingRequired);
            }
            crate::ParseOutcome::Matched(_) => panic!("an option requires its value"),
        }
    }

    #[test]
    fn missing_option_at_completion() {
        let parser = option(&["--port"], convert::integer());
        let error = parser
            .complete(&parser.initial_state(), &Default::default())
            .force_now()
            .unwrap()
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::MissingRequired);
        crate::test::assert_contains!(error.to_string(), "--port");
    }

    #[test]
    fn pending_value_suggestions() {
        let parser = option(&["--format"], convert::choice(["json", "yaml"]));
        let tokens = vec!["--format".to_string()];
        let context = root_context(&parser, &tokens, parser.initial_state());
        assert_eq!(
            parser.suggest(&context, "j"),
            vec![Suggestion::literal("json")]
        );
    }

    #[test]
    fn name_suggestions_when_unset() {
        let parser = option(&["-f", "--format"], convert::string());
        let tokens: Vec<String> = Vec::default();
        let context = root_context(&parser, &tokens, parser.initial_state());
        assert_eq!(
            parser.suggest(&context, "--f"),
            vec![Suggestion::literal("--format")]
        );
    }

    #[test]
    fn unknown_token_fails_without_consuming() {
        let parser = option(&["--port"], convert::integer());
        let tokens = vec!["--else".to_string()];
        let context = root_context(&parser, &tokens, parser.initial_state());
        match parser.parse(context) {
            crate::ParseOutcome::Failed(failure) => {
                assert_eq!(failure.consumed, 0);
                assert_eq!(failure.error.kind, ErrorKind::Unexpected);
                assert_eq!(failure.error.candidates, vec!["--port".to_string()]);
            }
            crate::ParseOutcome::Matched(_) => panic!("unknown token must not match"),
        }
    }
}
