use std::rc::Rc;

use thiserror::Error;

use crate::context::{ParseOutcome, ParserContext};
use crate::dependency::DependencyRegistry;
use crate::message::{Diagnostic, ErrorKind, Message};
use crate::model::Mode;
use crate::parser::Parser;
use crate::state::State;
use crate::suggest::{dedup, Suggestion};
use crate::usage::{collect_candidates, Usage};

#[cfg(feature = "tracing_debug")]
use tracing::debug;

/// A parse cycle that could not produce a value. Only the driver boundary
/// decides whether this is fatal; everything below it is recoverable.
#[derive(Debug, Error)]
pub enum RunError {
    /// The argument vector was rejected; the structured diagnostic carries
    /// the failure taxonomy, message segments, and candidates.
    #[error("Parse error: {0}")]
    Parse(Diagnostic),

    /// The parser tree contains an asynchronous value converter; drive it
    /// with [`run`] instead of [`run_sync`].
    #[error("Config error: asynchronous parser driven synchronously.")]
    AsyncMode,
}

struct Drive {
    state: State,
    registry: DependencyRegistry,
}

/// The driver loop: parse while tokens remain and progress is made.
fn drive<T: 'static>(
    parser: &Parser<T>,
    tokens: &[String],
    grammar: &Rc<Usage>,
) -> Result<Drive, RunError> {
    let mut state = parser.initial_state();
    let mut registry = DependencyRegistry::default();
    let mut options_terminated = false;
    let mut index = 0;

    while index < tokens.len() {
        let context = ParserContext {
            buffer: &tokens[index..],
            options_terminated,
            state: state.clone(),
            registry: registry.clone(),
            grammar: grammar.clone(),
        };

        match parser.parse(context) {
            ParseOutcome::Matched(matched) => {
                let consumed = matched.consumed.len();
                state = matched.next.state;
                options_terminated = matched.next.options_terminated;
                registry = matched.next.registry;

                if consumed == 0 {
                    // No parser can justify this token; without progress the
                    // loop would never terminate.
                    return Err(RunError::Parse(unexpected_token(&tokens[index], grammar)));
                }

                #[cfg(feature = "tracing_debug")]
                {
                    debug!("Driver consumed {consumed} token(s) at offset {index}.");
                }

                index += consumed;
            }
            ParseOutcome::Failed(failure) => return Err(RunError::Parse(failure.error)),
        }
    }

    Ok(Drive { state, registry })
}

fn unexpected_token(token: &str, grammar: &Rc<Usage>) -> Diagnostic {
    Diagnostic::new(
        ErrorKind::Unexpected,
        Message::new().text("unexpected token ").value(token),
    )
    .with_candidates(collect_candidates(grammar))
}

fn collect_tokens(args: impl IntoIterator<Item = impl Into<String>>) -> Vec<String> {
    args.into_iter().map(Into::into).collect()
}

/// Parse `args` to completion with a synchronous parser tree.
pub fn run_sync<T: 'static>(
    parser: &Parser<T>,
    args: impl IntoIterator<Item = impl Into<String>>,
) -> Result<T, RunError> {
    if parser.mode() == Mode::Async {
        return Err(RunError::AsyncMode);
    }

    let tokens = collect_tokens(args);
    let grammar = Rc::new(parser.usage());
    let outcome = drive(parser, &tokens, &grammar)?;

    parser
        .complete(&outcome.state, &outcome.registry.into_handle())
        .force_now()
        .expect("internal error - a synchronous parser must not defer completion")
        .map_err(RunError::Parse)
}

/// Parse `args` to completion, awaiting any deferred value conversions.
pub async fn run<T: 'static>(
    parser: &Parser<T>,
    args: impl IntoIterator<Item = impl Into<String>>,
) -> Result<T, RunError> {
    let tokens = collect_tokens(args);
    let grammar = Rc::new(parser.usage());
    let outcome = drive(parser, &tokens, &grammar)?;

    parser
        .complete(&outcome.state, &outcome.registry.into_handle())
        .resolve()
        .await
        .map_err(RunError::Parse)
}

/// Completion candidates for the word being typed after `args`.
///
/// The tokens before the cursor are re-parsed through the same tree; if they
/// stop parsing early, suggestions are generated from the last good position
/// so that e.g. a pending option name still offers its values. The real
/// registry is never touched: this cycle owns a fresh one.
pub fn suggestions<T: 'static>(
    parser: &Parser<T>,
    args: impl IntoIterator<Item = impl Into<String>>,
    prefix: &str,
) -> Vec<Suggestion> {
    let tokens = collect_tokens(args);
    let grammar = Rc::new(parser.usage());

    let mut state = parser.initial_state();
    let mut registry = DependencyRegistry::default();
    let mut options_terminated = false;
    let mut index = 0;

    while index < tokens.len() {
        let context = ParserContext {
            buffer: &tokens[index..],
            options_terminated,
            state: state.clone(),
            registry: registry.clone(),
            grammar: grammar.clone(),
        };

        match parser.parse(context) {
            ParseOutcome::Matched(matched) if !matched.consumed.is_empty() => {
                let consumed = matched.consumed.len();
                state = matched.next.state;
                options_terminated = matched.next.options_terminated;
                registry = matched.next.registry;
                index += consumed;
            }
            // Suggest from wherever parsing stopped.
            _ => break,
        }
    }

    let context = ParserContext {
        buffer: &tokens[index..],
        options_terminated,
        state,
        registry,
        grammar,
    };
    dedup(parser.suggest(&context, prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinator::{field, object, with_default};
    use crate::convert;
    use crate::leaf::{argument, switch};

    fn schema() -> Parser<crate::value::Record> {
        object(vec![
            field("verbose", switch(&["-v"])),
            field("name", argument(convert::string())),
        ])
        .unwrap()
    }

    #[test]
    fn runs_to_completion() {
        let mut record = run_sync(&schema(), ["-v", "Alice"]).unwrap();
        assert_eq!(record.take::<bool>("verbose"), Some(true));
        assert_eq!(record.take::<String>("name"), Some("Alice".to_string()));
    }

    #[test]
    fn unexpected_token_carries_candidates() {
        let error = run_sync(&schema(), ["--bogus"]).unwrap_err();
        match error {
            RunError::Parse(diagnostic) => {
                assert_eq!(diagnostic.kind, ErrorKind::Unexpected);
                assert!(diagnostic.candidates.contains(&"-v".to_string()));
            }
            RunError::AsyncMode => panic!("not an async tree"),
        }
    }

    #[test]
    fn async_tree_is_refused_synchronously() {
        let parser = argument(convert::custom_async("SLOW", |raw: String| async move {
            Ok::<_, Message>(raw)
        }));
        let error = run_sync(&parser, ["x"]).unwrap_err();
        assert_matches!(error, RunError::AsyncMode);
    }

    #[tokio::test]
    async fn async_tree_runs_with_an_executor() {
        let parser = argument(convert::custom_async("SLOW", |raw: String| async move {
            Ok::<_, Message>(raw.to_uppercase())
        }));
        let value = run(&parser, ["abc"]).await.unwrap();
        assert_eq!(value, "ABC");
    }

    #[test]
    fn suggestions_for_fresh_position() {
        let suggestions = suggestions(&schema(), Vec::<String>::default(), "-");
        assert_eq!(suggestions, vec![Suggestion::literal("-v")]);
    }

    #[test]
    fn suggestions_for_pending_option_value() {
        let parser = object(vec![field(
            "format",
            crate::leaf::option(&["--format"], convert::choice(["json", "yaml"])),
        )])
        .unwrap();

        let candidates = super::suggestions(&parser, ["--format"], "y");
        assert_eq!(candidates, vec![Suggestion::literal("yaml")]);
    }

    #[test]
    fn defaulted_parser_accepts_empty_argv() {
        let parser = with_default(
            object(vec![field("verbose", switch(&["-v"]))]).unwrap(),
            crate::value::Record::default,
        );
        let record = run_sync(&parser, Vec::<String>::default()).unwrap();
        assert!(record.is_empty());
    }
}
