use std::rc::Rc;

use crate::constant::PRIORITY_OPTION;
use crate::context::{ParseOutcome, ParserContext};
use crate::dependency::RegistryHandle;
use crate::doc::{DocEntry, DocFragments, DocState};
use crate::eval::Eval;
use crate::leaf::{end_of_input, unexpected};
use crate::message::{Diagnostic, ErrorKind, Message, Overrides};
use crate::model::{Mode, Priority};
use crate::parser::{Parser, ParserCore};
use crate::state::State;
use crate::suggest::Suggestion;
use crate::usage::{Usage, UsageTerm};
use crate::value::ErasedValue;

#[derive(Debug, Clone)]
struct ToggleState {
    set: bool,
}

/// A boolean option taking no value. `required` distinguishes `flag` (must
/// appear, completes `true`) from `switch` (may be omitted, completes
/// `false`).
struct FlagParser {
    names: Vec<String>,
    required: bool,
    overrides: Overrides,
}

impl FlagParser {
    fn term(&self) -> UsageTerm {
        UsageTerm::Option {
            names: self.names.clone(),
            metavar: None,
        }
    }

    fn label(&self) -> &str {
        self.names
            .first()
            .map(String::as_str)
            .unwrap_or("<unnamed>")
    }
}

impl ParserCore for FlagParser {
    fn priority(&self) -> Priority {
        PRIORITY_OPTION
    }

    fn mode(&self) -> Mode {
        Mode::Sync
    }

    fn usage(&self) -> Usage {
        if self.required {
            vec![self.term()]
        } else {
            // A boolean option with no value converter may always be omitted.
            vec![UsageTerm::Optional(vec![self.term()])]
        }
    }

    fn initial_state(&self) -> State {
        State::new(ToggleState { set: false })
    }

    fn parse<'a>(&self, context: ParserContext<'a>) -> ParseOutcome<'a> {
        let token = match context.buffer.first() {
            Some(token) => token.clone(),
            None => return ParseOutcome::fail(0, end_of_input()),
        };

        if context.options_terminated {
            return ParseOutcome::fail(0, unexpected(&token, &context));
        }

        let state = context.state.expect_ref::<ToggleState>().clone();

        if self.names.iter().any(|name| name == &token) {
            if state.set {
                let message = Overrides::message(&self.overrides.duplicate, &token, || {
                    Message::new()
                        .option_name(&token)
                        .text(" cannot be used multiple times")
                });
                return ParseOutcome::fail(1, Diagnostic::new(ErrorKind::Duplicate, message));
            }

            let options_terminated = context.options_terminated;
            let registry = context.registry.clone();
            return ParseOutcome::advance(
                context,
                1,
                options_terminated,
                State::new(ToggleState { set: true }),
                registry,
            );
        }

        if let Some((name, _)) = token.split_once('=') {
            if self.names.iter().any(|n| n == name) {
                return ParseOutcome::fail(
                    1,
                    Diagnostic::new(
                        ErrorKind::InvalidValue,
                        Message::new()
                            .option_name(name)
                            .text(" does not take a value"),
                    ),
                );
            }
        }

        ParseOutcome::fail(0, unexpected(&token, &context))
    }

    fn complete(
        &self,
        state: &State,
        _registry: &RegistryHandle,
    ) -> Eval<Result<ErasedValue, Diagnostic>> {
        let state = state.expect_ref::<ToggleState>();

        if state.set {
            Eval::ready(Ok(ErasedValue::new(true)))
        } else if self.required {
            let message = Overrides::message(&self.overrides.missing, self.label(), || {
                Message::new()
                    .text("required ")
                    .option_name(self.label())
                    .text(" is missing")
            });
            Eval::ready(Err(Diagnostic::new(ErrorKind::MissingRequired, message)))
        } else {
            Eval::ready(Ok(ErasedValue::new(false)))
        }
    }

    fn suggest(&self, context: &ParserContext<'_>, prefix: &str) -> Vec<Suggestion> {
        if !context.buffer.is_empty() {
            return Vec::default();
        }

        let state = context.state.expect_ref::<ToggleState>();
        if state.set {
            // Re-suggesting a flag that is already present would only lead to
            // a duplicate-use error.
            return Vec::default();
        }

        self.names
            .iter()
            .filter(|name| name.starts_with(prefix))
            .map(Suggestion::literal)
            .collect()
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

fn toggle(names: &[&str], required: bool, overrides: Overrides) -> Parser<bool> {
    Parser::from_core(Rc::new(FlagParser {
        names: names.iter().map(|name| name.to_string()).collect(),
        required,
        overrides,
    }))
}

/// A boolean option that must appear on the command line; completes `true`.
pub fn flag(names: &[&str]) -> Parser<bool> {
    toggle(names, true, Overrides::default())
}

/// [`flag`] with per-call-site message overrides.
pub fn flag_with(names: &[&str], overrides: Overrides) -> Parser<bool> {
    toggle(names, true, overrides)
}

/// A boolean option that may be omitted; completes `false` when absent.
pub fn switch(names: &[&str]) -> Parser<bool> {
    toggle(names, false, Overrides::default())
}

/// [`switch`] with per-call-site message overrides.
pub fn switch_with(names: &[&str], overrides: Overrides) -> Parser<bool> {
    toggle(names, false, overrides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::util::{parse_once, root_context};

    #[test]
    fn switch_matches_any_spelling() {
        let parser = switch(&["-v", "--verbose"]);

        for spelling in ["-v", "--verbose"] {
            let tokens = vec![spelling.to_string()];
            let (state, consumed) = parse_once(&parser, &tokens);
            assert_eq!(consumed, 1);
            let value = parser
                .complete(&state, &Default::default())
                .force_now()
                .unwrap()
                .unwrap();
            assert!(value);
        }
    }

    #[test]
    fn switch_completes_false_when_absent() {
        let parser = switch(&["-v"]);
        let value = parser
            .complete(&parser.initial_state(), &Default::default())
            .force_now()
            .unwrap()
            .unwrap();
        assert!(!value);
    }

    #[test]
    fn flag_missing_is_required() {
        let parser = flag(&["-v"]);
        let error = parser
            .complete(&parser.initial_state(), &Default::default())
            .force_now()
            .unwrap()
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::MissingRequired);
    }

    #[test]
    fn duplicate_is_reported() {
        let parser = switch(&["-v"]);
        let tokens = vec!["-v".to_string()];
        let (state, _) = parse_once(&parser, &tokens);

        let context = root_context(&parser, &tokens, state);
        match parser.parse(context) {
            crate::ParseOutcome::Failed(failure) => {
                assert_eq!(failure.consumed, 1);
                assert_eq!(failure.error.kind, ErrorKind::Duplicate);
            }
            crate::ParseOutcome::Matched(_) => panic!("duplicate must not match"),
        }
    }

    #[test]
    fn equals_value_is_rejected() {
        let parser = switch(&["--verbose"]);
        let tokens = vec!["--verbose=yes".to_string()];
        let context = root_context(&parser, &tokens, parser.initial_state());
        match parser.parse(context) {
            crate::ParseOutcome::Failed(failure) => {
                assert_eq!(failure.error.kind, ErrorKind::InvalidValue);
            }
            crate::ParseOutcome::Matched(_) => panic!("a switch takes no value"),
        }
    }

    #[test]
    fn suggests_unset_names() {
        let parser = switch(&["-v", "--verbose"]);
        let tokens: Vec<String> = Vec::default();
        let context = root_context(&parser, &tokens, parser.initial_state());
        assert_eq!(
            parser.suggest(&context, "--"),
            vec![Suggestion::literal("--verbose")]
        );
    }

    #[test]
    fn switch_usage_is_optional() {
        let parser = switch(&["-v"]);
        assert_matches!(parser.usage()[..], [UsageTerm::Optional(_)]);

        let parser = flag(&["-v"]);
        assert_matches!(parser.usage()[..], [UsageTerm::Option { .. }]);
    }
}
