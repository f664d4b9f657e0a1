//! `argot` is a combinator-style command line parser for Rust.
//!
//! Instead of describing a grammar in one place and the parse in another,
//! `argot` programs assemble small parser values - flags, valued options,
//! positional arguments, subcommands - into a tree with combinators, and that
//! one tree yields everything: the strongly-typed parse result, precise
//! structured diagnostics, a derivable usage grammar, and live shell
//! completion suggestions. Specifically, `argot` prioritizes the following
//! design concerns:
//! * *Type safe argument parsing*:
//! The user composes typed value converters; no `&str -> T` calls appear at
//! use sites, and conversion failures are first-class diagnostics.
//! * *Order independence*:
//! `object` and `merge` match their fields greedily in any input order, with
//! deterministic priority-based tie-breaks - `--a --b` and `--b --a` always
//! agree.
//! * *One tree, four products*:
//! Parsing, error reporting, usage rendering, and completion all read the
//! same immutable parser templates; there is no second grammar to keep in
//! sync.
//! * *Cross-option dependencies*:
//! A value converter can be declared a dependency source; other converters
//! derive from its resolved value even when the options arrive in either
//! order, are omitted, or convert asynchronously.
//! * *Structured output only*:
//! Every failure is assembled from text/value/option-name/metavar segments
//! and handed to the embedding program; `argot` never formats or prints.
//!
//! # Usage
//! ```
//! use argot::prelude::*;
//!
//! let schema = object(vec![
//!     field("verbose", switch(&["-v", "--verbose"])),
//!     field("name", argument(convert::string())),
//! ])
//! .unwrap();
//!
//! let mut record = run_sync(&schema, ["-v", "Alice"]).unwrap();
//! assert_eq!(record.take::<bool>("verbose"), Some(true));
//! assert_eq!(record.take::<String>("name"), Some("Alice".to_string()));
//! ```
//!
//! # Parsers and state
//! A [`Parser`] is an immutable template. Each run threads explicit state
//! values through a [`ParserContext`]; nothing is ever mutated in place, so
//! one definition serves any number of parse, completion, and suggestion
//! cycles - including the incremental re-invocation that shell completion
//! needs.
//!
//! Drive a parser manually with [`Parser::parse`]/[`Parser::complete`], or
//! use the bundled drivers [`run_sync`], [`run`], and [`suggestions`].
//!
//! # Choice, commitment, and conflicts
//! [`or`] tries alternatives in declaration order and locks onto whichever
//! first consumes a token; if a *different* alternative later also consumes,
//! that is reported as a mutual-exclusivity conflict rather than silently
//! resolved. [`longest_match`] instead evaluates every alternative on every
//! call and keeps the longest consumer.
//!
//! # Dependencies between options
//! ```
//! use argot::prelude::*;
//!
//! let dir = dependency(convert::string().with_metavar("DIR"));
//! let file = dir.derive(
//!     || "/tmp".to_string(),
//!     |dir| {
//!         let dir = dir.clone();
//!         convert::custom("FILE", move |raw| Ok(format!("{dir}/{raw}")))
//!     },
//! );
//!
//! let schema = object(vec![
//!     field("dir", option(&["--dir"], dir.value_parser())),
//!     field("file", option(&["--file"], file)),
//! ])
//! .unwrap();
//!
//! // The dependent option may come first: resolution happens at completion.
//! let mut record = run_sync(&schema, ["--file", "x.txt", "--dir", "/data"]).unwrap();
//! assert_eq!(record.take::<String>("file"), Some("/data/x.txt".to_string()));
//! ```
//!
//! # Features
//! * `tracing_debug`: `tracing` debug events at combinator decision points.

mod combinator;
mod constant;
mod context;
pub mod convert;
mod dependency;
mod doc;
mod eval;
mod leaf;
mod message;
mod model;
mod parser;
pub mod prelude;
mod runner;
mod state;
mod suggest;
mod usage;
mod value;

pub use combinator::*;
pub use context::{Failure, Matched, ParseOutcome, ParserContext};
pub use dependency::{
    dependency, derive_from, derive_from_async, derive_from_sync, DependencyRegistry,
    DependencySource, RegistryHandle, SourceId, SourceSet,
};
pub use doc::{DocEntry, DocFragments, DocSection, DocState};
pub use eval::Eval;
pub use leaf::*;
pub use message::{Diagnostic, ErrorKind, Message, MessageSegment, MessageSource, Overrides};
pub use model::{Mode, Priority};
pub use parser::{ConfigError, Parser, Untyped};
pub use runner::{run, run_sync, suggestions, RunError};
pub use state::{OpaqueState, State};
pub use suggest::Suggestion;
pub use usage::{collect_candidates, Usage, UsageTerm};
pub use value::{ErasedValue, Record, Seq, SharedValue};

#[cfg(test)]
#[macro_use]
extern crate assert_matches;

#[cfg(test)]
pub(crate) mod test {
    macro_rules! assert_contains {
        ($base:expr, $sub:expr) => {
            assert!(
                $base.contains($sub),
                "'{b}' does not contain '{s}'",
                b = $base,
                s = $sub,
            );
        };
    }

    pub(crate) use assert_contains;

    pub(crate) mod util {
        use std::rc::Rc;

        use crate::context::{ParseOutcome, ParserContext};
        use crate::dependency::DependencyRegistry;
        use crate::parser::Parser;
        use crate::state::State;

        pub(crate) fn root_context<'a, T: 'static>(
            parser: &Parser<T>,
            tokens: &'a [String],
            state: State,
        ) -> ParserContext<'a> {
            ParserContext {
                buffer: tokens,
                options_terminated: false,
                state,
                registry: DependencyRegistry::default(),
                grammar: Rc::new(parser.usage()),
            }
        }

        /// One parse step from the initial state; panics on failure.
        pub(crate) fn parse_once<T: 'static>(
            parser: &Parser<T>,
            tokens: &[String],
        ) -> (State, usize) {
            let context = root_context(parser, tokens, parser.initial_state());
            match parser.parse(context) {
                ParseOutcome::Matched(matched) => (matched.next.state, matched.consumed.len()),
                ParseOutcome::Failed(failure) => {
                    panic!("unexpected parse failure: {}", failure.error)
                }
            }
        }

        /// Drive the parser over all of `tokens`; panics on failure or on a
        /// stuck (zero-progress) position.
        pub(crate) fn parse_all<T: 'static>(
            parser: &Parser<T>,
            tokens: &[String],
        ) -> (State, DependencyRegistry) {
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
                    ParseOutcome::Matched(matched) => {
                        let consumed = matched.consumed.len();
                        assert!(consumed > 0, "parser made no progress at {index}");
                        state = matched.next.state;
                        options_terminated = matched.next.options_terminated;
                        registry = matched.next.registry;
                        index += consumed;
                    }
                    ParseOutcome::Failed(failure) => {
                        panic!("unexpected parse failure: {}", failure.error)
                    }
                }
            }

            (state, registry)
        }
    }
}
