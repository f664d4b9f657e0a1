use std::collections::HashMap;
use std::rc::Rc;

use crate::constant::SYNTHETIC_KEY_PREFIX;
use crate::context::{Failure, Matched, ParseOutcome, ParserContext};
use crate::dependency::RegistryHandle;
use crate::doc::{DocFragments, DocState};
use crate::eval::Eval;
use crate::message::Diagnostic;
use crate::model::{Mode, Priority};
use crate::parser::{
    join_modes, max_priority, scan_order, ConfigError, Parser, ParserCore, Untyped,
};
use crate::state::State;
use crate::suggest::{dedup, Suggestion};
use crate::usage::Usage;
use crate::value::{ErasedValue, Record, Seq};

#[cfg(feature = "tracing_debug")]
use tracing::debug;

/// The state of an `object` (and, by extension, `merge`): one slot per field,
/// keyed by field name. `merge` threads a single shared record through every
/// object-shaped child, which reads and writes only its own slots.
#[derive(Debug, Clone)]
pub(crate) struct RecordState {
    pub(crate) slots: HashMap<String, State>,
}

/// One named field of an `object`.
pub struct Field {
    pub(crate) name: String,
    pub(crate) core: Rc<dyn ParserCore>,
}

/// Name a field of an `object`.
pub fn field<T: 'static>(name: impl Into<String>, parser: Parser<T>) -> Field {
    Field {
        name: name.into(),
        core: parser.core(),
    }
}

/// The outcome of one greedy scan over not-yet-done children.
pub(super) enum ScanStep<'a> {
    Progress {
        index: usize,
        matched: Matched<'a>,
    },
    ZeroSuccess {
        index: usize,
        matched: Matched<'a>,
    },
    Stuck(Option<Failure>),
    Aborted(Failure),
}

/// One scan of `children` in priority order against the current buffer:
/// commit to the first child that consumes at least one token; a child that
/// fails after consuming aborts the whole scan (duplicate use, bad value); a
/// zero-consumption failure just moves on to the next child.
pub(super) fn greedy_scan<'a>(
    context: &ParserContext<'a>,
    children: &[Rc<dyn ParserCore>],
    order: &[usize],
    child_state: impl Fn(usize) -> State,
) -> ScanStep<'a> {
    let mut zero_success: Option<(usize, Matched<'a>)> = None;
    let mut first_failure: Option<Failure> = None;

    for &index in order {
        let child_context = context.for_child(child_state(index));

        match children[index].parse(child_context) {
            ParseOutcome::Matched(matched) if !matched.consumed.is_empty() => {
                #[cfg(feature = "tracing_debug")]
                {
                    debug!(
                        "Greedy scan matched child {index} ({} tokens).",
                        matched.consumed.len()
                    );
                }
                return ScanStep::Progress { index, matched };
            }
            ParseOutcome::Matched(matched) => {
                if zero_success.is_none() {
                    zero_success = Some((index, matched));
                }
            }
            ParseOutcome::Failed(failure) if failure.consumed > 0 => {
                return ScanStep::Aborted(failure);
            }
            ParseOutcome::Failed(failure) => {
                if first_failure.is_none() {
                    first_failure = Some(failure);
                }
            }
        }
    }

    match zero_success {
        Some((index, matched)) => ScanStep::ZeroSuccess { index, matched },
        None => ScanStep::Stuck(first_failure),
    }
}

/// Order-independent greedy combination into a named-field aggregate.
///
/// `--b --a` and `--a --b` both succeed against the same schema; priority
/// breaks ties among children that could all start matching at the same
/// position.
struct ObjectParser {
    label: Option<String>,
    fields: Vec<(String, Rc<dyn ParserCore>)>,
    order: Vec<usize>,
    priority: Priority,
    mode: Mode,
}

impl ObjectParser {
    fn children(&self) -> Vec<Rc<dyn ParserCore>> {
        self.fields.iter().map(|(_, child)| child.clone()).collect()
    }
}

impl ParserCore for ObjectParser {
    fn priority(&self) -> Priority {
        self.priority
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn usage(&self) -> Usage {
        self.fields
            .iter()
            .flat_map(|(_, child)| child.usage())
            .collect()
    }

    fn initial_state(&self) -> State {
        State::new(RecordState {
            slots: self
                .fields
                .iter()
                .map(|(name, child)| (name.clone(), child.initial_state()))
                .collect(),
        })
    }

    fn parse<'a>(&self, context: ParserContext<'a>) -> ParseOutcome<'a> {
        let record = context.state.expect_ref::<RecordState>().clone();
        let children = self.children();

        let step = greedy_scan(&context, &children, &self.order, |index| {
            let name = &self.fields[index].0;
            record
                .slots
                .get(name)
                .expect("internal error - object state missing a field slot")
                .clone()
        });

        match step {
            ScanStep::Progress { index, matched } | ScanStep::ZeroSuccess { index, matched } => {
                let mut slots = record.slots.clone();
                slots.insert(self.fields[index].0.clone(), matched.next.state);
                ParseOutcome::Matched(Matched {
                    next: ParserContext {
                        buffer: matched.next.buffer,
                        options_terminated: matched.next.options_terminated,
                        state: State::new(RecordState { slots }),
                        registry: matched.next.registry,
                        grammar: matched.next.grammar,
                    },
                    consumed: matched.consumed,
                })
            }
            ScanStep::Aborted(failure) => ParseOutcome::Failed(failure),
            ScanStep::Stuck(Some(failure)) => ParseOutcome::Failed(failure),
            ScanStep::Stuck(None) => {
                // No fields at all; nothing to do with this buffer.
                let options_terminated = context.options_terminated;
                let registry = context.registry.clone();
                let state = context.state.clone();
                ParseOutcome::advance(context, 0, options_terminated, state, registry)
            }
        }
    }

    fn complete(
        &self,
        state: &State,
        registry: &RegistryHandle,
    ) -> Eval<Result<ErasedValue, Diagnostic>> {
        let record = state.expect_ref::<RecordState>();
        let mut evals = Vec::with_capacity(self.fields.len());

        for (name, child) in &self.fields {
            let slot = record
                .slots
                .get(name)
                .expect("internal error - object state missing a field slot");
            let name = name.clone();
            evals.push(
                child
                    .complete(slot, registry)
                    .map(move |result| result.map(|value| (name, value))),
            );
        }

        Eval::join_all(evals).map(|results| {
            let mut record = Record::default();
            for result in results {
                let (name, value) = result?;
                record.insert(name, value);
            }
            Ok(ErasedValue::new(record))
        })
    }

    fn suggest(&self, context: &ParserContext<'_>, prefix: &str) -> Vec<Suggestion> {
        let record = context.state.expect_ref::<RecordState>();

        let suggestions = self
            .order
            .iter()
            .flat_map(|&index| {
                let (name, child) = &self.fields[index];
                let slot = record
                    .slots
                    .get(name)
                    .expect("internal error - object state missing a field slot");
                let child_context = context.for_child(slot.clone());
                child.suggest(&child_context, prefix)
            })
            .collect();

        dedup(suggestions)
    }

    fn doc_fragments(&self, state: DocState<'_>, default: Option<&str>) -> DocFragments {
        let fragments = match state {
            DocState::Available(state) => {
                let record = state.expect_ref::<RecordState>();
                self.fields
                    .iter()
                    .map(|(name, child)| {
                        let slot = record
                            .slots
                            .get(name)
                            .expect("internal error - object state missing a field slot");
                        child.doc_fragments(DocState::Available(slot), default)
                    })
                    .collect()
            }
            DocState::Unavailable => self
                .fields
                .iter()
                .map(|(_, child)| child.doc_fragments(DocState::Unavailable, default))
                .collect(),
        };

        let combined = DocFragments::combine(fragments);
        match &self.label {
            Some(label) => combined.labeled(label),
            None => combined,
        }
    }

    fn record_fields(&self) -> Option<Vec<String>> {
        Some(self.fields.iter().map(|(name, _)| name.clone()).collect())
    }
}

fn build_object(label: Option<String>, fields: Vec<Field>) -> Result<Parser<Record>, ConfigError> {
    let mut seen: Vec<&str> = Vec::default();
    for field in &fields {
        if field.name.starts_with(SYNTHETIC_KEY_PREFIX) {
            return Err(ConfigError(format!(
                "Field name '{}' uses the reserved '{SYNTHETIC_KEY_PREFIX}' prefix.",
                field.name
            )));
        }
        if seen.contains(&field.name.as_str()) {
            return Err(ConfigError(format!(
                "Cannot duplicate the field '{}'.",
                field.name
            )));
        }
        seen.push(&field.name);
    }

    let fields: Vec<(String, Rc<dyn ParserCore>)> = fields
        .into_iter()
        .map(|field| (field.name, field.core))
        .collect();
    let children: Vec<Rc<dyn ParserCore>> = fields.iter().map(|(_, child)| child.clone()).collect();
    let order = scan_order(&children);
    let priority = max_priority(children.iter());
    let mode = join_modes(children.iter());

    Ok(Parser::from_core(Rc::new(ObjectParser {
        label,
        fields,
        order,
        priority,
        mode,
    })))
}

/// Combine named fields into a [`Record`], matching them in any input order.
pub fn object(fields: Vec<Field>) -> Result<Parser<Record>, ConfigError> {
    build_object(None, fields)
}

/// [`object`] with a documentation label for its help section.
pub fn object_labeled(
    label: impl Into<String>,
    fields: Vec<Field>,
) -> Result<Parser<Record>, ConfigError> {
    build_object(Some(label.into()), fields)
}

/// The state of `tuple` and `concat`: one slot per child, in declaration
/// order.
#[derive(Debug, Clone)]
pub(crate) struct SeqState {
    pub(crate) slots: Vec<State>,
}

/// Like `object`, but the aggregate is positional.
struct TupleParser {
    items: Vec<Rc<dyn ParserCore>>,
    order: Vec<usize>,
    priority: Priority,
    mode: Mode,
    /// `concat` completes children to [`Seq`]s and flattens them; `tuple`
    /// keeps each child value as one element.
    flatten: bool,
}

impl ParserCore for TupleParser {
    fn priority(&self) -> Priority {
        self.priority
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn usage(&self) -> Usage {
        self.items.iter().flat_map(|item| item.usage()).collect()
    }

    fn initial_state(&self) -> State {
        State::new(SeqState {
            slots: self.items.iter().map(|item| item.initial_state()).collect(),
        })
    }

    fn parse<'a>(&self, context: ParserContext<'a>) -> ParseOutcome<'a> {
        let seq = context.state.expect_ref::<SeqState>().clone();

        let step = greedy_scan(&context, &self.items, &self.order, |index| {
            seq.slots[index].clone()
        });

        match step {
            ScanStep::Progress { index, matched } | ScanStep::ZeroSuccess { index, matched } => {
                let mut slots = seq.slots.clone();
                slots[index] = matched.next.state;
                ParseOutcome::Matched(Matched {
                    next: ParserContext {
                        buffer: matched.next.buffer,
                        options_terminated: matched.next.options_terminated,
                        state: State::new(SeqState { slots }),
                        registry: matched.next.registry,
                        grammar: matched.next.grammar,
                    },
                    consumed: matched.consumed,
                })
            }
            ScanStep::Aborted(failure) => ParseOutcome::Failed(failure),
            ScanStep::Stuck(Some(failure)) => ParseOutcome::Failed(failure),
            ScanStep::Stuck(None) => {
                let options_terminated = context.options_terminated;
                let registry = context.registry.clone();
                let state = context.state.clone();
                ParseOutcome::advance(context, 0, options_terminated, state, registry)
            }
        }
    }

    fn complete(
        &self,
        state: &State,
        registry: &RegistryHandle,
    ) -> Eval<Result<ErasedValue, Diagnostic>> {
        let seq = state.expect_ref::<SeqState>();
        let mut evals = Vec::with_capacity(self.items.len());

        for (index, item) in self.items.iter().enumerate() {
            evals.push(item.complete(&seq.slots[index], registry));
        }

        let flatten = self.flatten;
        Eval::join_all(evals).map(move |results| {
            let mut seq = Seq::default();
            for result in results {
                let value = result?;
                if flatten {
                    seq.absorb(value.expect_downcast::<Seq>());
                } else {
                    seq.push(value);
                }
            }
            Ok(ErasedValue::new(seq))
        })
    }

    fn suggest(&self, context: &ParserContext<'_>, prefix: &str) -> Vec<Suggestion> {
        let seq = context.state.expect_ref::<SeqState>();

        let suggestions = self
            .order
            .iter()
            .flat_map(|&index| {
                let child_context = context.for_child(seq.slots[index].clone());
                self.items[index].suggest(&child_context, prefix)
            })
            .collect();

        dedup(suggestions)
    }

    fn doc_fragments(&self, state: DocState<'_>, default: Option<&str>) -> DocFragments {
        let fragments = match state {
            DocState::Available(state) => {
                let seq = state.expect_ref::<SeqState>();
                self.items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        item.doc_fragments(DocState::Available(&seq.slots[index]), default)
                    })
                    .collect()
            }
            DocState::Unavailable => self
                .items
                .iter()
                .map(|item| item.doc_fragments(DocState::Unavailable, default))
                .collect(),
        };
        DocFragments::combine(fragments)
    }
}

fn build_tuple(items: Vec<Rc<dyn ParserCore>>, flatten: bool) -> Parser<Seq> {
    let order = scan_order(&items);
    let priority = max_priority(items.iter());
    let mode = join_modes(items.iter());
    Parser::from_core(Rc::new(TupleParser {
        items,
        order,
        priority,
        mode,
        flatten,
    }))
}

/// Combine parsers into a positional [`Seq`], matching them in any input
/// order.
pub fn tuple(items: Vec<Untyped>) -> Parser<Seq> {
    build_tuple(items.into_iter().map(|item| item.core).collect(), false)
}

/// Combine several tuple-shaped parsers into one, flattening their elements.
pub fn concat(parts: Vec<Parser<Seq>>) -> Parser<Seq> {
    build_tuple(parts.iter().map(|part| part.core()).collect(), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert;
    use crate::leaf::{argument, switch};
    use crate::message::ErrorKind;
    use crate::test::util::{parse_all, root_context};
    use rstest::rstest;

    fn schema() -> Parser<Record> {
        object(vec![
            field("verbose", switch(&["-v"])),
            field("name", argument(convert::string())),
        ])
        .unwrap()
    }

    #[rstest]
    #[case(vec!["-v", "Alice"])]
    #[case(vec!["Alice", "-v"])]
    fn order_independent(#[case] tokens: Vec<&str>) {
        let parser = schema();
        let tokens: Vec<String> = tokens.into_iter().map(String::from).collect();
        let (state, registry) = parse_all(&parser, &tokens);

        let mut record = parser
            .complete(&state, &registry.into_handle())
            .force_now()
            .unwrap()
            .unwrap();
        assert_eq!(record.take::<bool>("verbose"), Some(true));
        assert_eq!(record.take::<String>("name"), Some("Alice".to_string()));
    }

    #[test]
    fn duplicate_field_match_is_reported() {
        let parser = schema();
        let tokens = vec!["-v".to_string(), "-v".to_string(), "Alice".to_string()];

        let (state, _) = parse_all(&parser, &tokens[..1]);
        let rest = vec!["-v".to_string(), "Alice".to_string()];
        let context = root_context(&parser, &rest, state);
        match parser.parse(context) {
            ParseOutcome::Failed(failure) => {
                assert_eq!(failure.error.kind, ErrorKind::Duplicate);
            }
            ParseOutcome::Matched(_) => panic!("a duplicate must not overwrite"),
        }
    }

    #[test]
    fn missing_required_field_fails_completion() {
        let parser = schema();
        let tokens = vec!["-v".to_string()];
        let (state, registry) = parse_all(&parser, &tokens);
        let error = parser
            .complete(&state, &registry.into_handle())
            .force_now()
            .unwrap()
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::MissingRequired);
    }

    #[test]
    fn duplicate_field_name_is_config_error() {
        let result = object(vec![
            field("name", argument(convert::string())),
            field("name", argument(convert::string())),
        ]);
        assert_matches!(result, Err(ConfigError(_)));
    }

    #[test]
    fn reserved_prefix_is_config_error() {
        let result = object(vec![field("__parser_0", argument(convert::string()))]);
        assert_matches!(result, Err(ConfigError(_)));
    }

    #[test]
    fn options_outrank_arguments() {
        // A token that both a greedy argument and an option could take goes
        // to the higher-priority child only when it actually matches it;
        // otherwise the argument absorbs it.
        let parser = object(vec![
            field("level", switch(&["-v"])),
            field("rest", argument(convert::string())),
        ])
        .unwrap();

        let tokens = vec!["plain".to_string(), "-v".to_string()];
        let (state, registry) = parse_all(&parser, &tokens);
        let mut record = parser
            .complete(&state, &registry.into_handle())
            .force_now()
            .unwrap()
            .unwrap();
        assert_eq!(record.take::<String>("rest"), Some("plain".to_string()));
        assert_eq!(record.take::<bool>("level"), Some(true));
    }

    #[test]
    fn tuple_keeps_positional_order() {
        let parser = tuple(vec![
            argument(convert::string()).untyped(),
            argument(convert::integer()).untyped(),
        ]);

        let tokens = vec!["alpha".to_string(), "7".to_string()];
        let (state, registry) = parse_all(&parser, &tokens);
        let mut seq = parser
            .complete(&state, &registry.into_handle())
            .force_now()
            .unwrap()
            .unwrap();
        assert_eq!(seq.take::<String>(0), Some("alpha".to_string()));
        assert_eq!(seq.take::<i64>(1), Some(7));
    }

    #[test]
    fn concat_flattens() {
        let first = tuple(vec![argument(convert::string()).untyped()]);
        let second = tuple(vec![argument(convert::string()).untyped()]);
        let parser = concat(vec![first, second]);

        let tokens = vec!["a".to_string(), "b".to_string()];
        let (state, registry) = parse_all(&parser, &tokens);
        let mut seq = parser
            .complete(&state, &registry.into_handle())
            .force_now()
            .unwrap()
            .unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.take::<String>(0), Some("a".to_string()));
        assert_eq!(seq.take::<String>(1), Some("b".to_string()));
    }
}
