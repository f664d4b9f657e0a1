use std::collections::HashMap;
use std::rc::Rc;

use crate::combinator::object::{greedy_scan, RecordState, ScanStep};
use crate::constant::SYNTHETIC_KEY_PREFIX;
use crate::context::{Matched, ParseOutcome, ParserContext};
use crate::dependency::RegistryHandle;
use crate::doc::{DocFragments, DocState};
use crate::eval::Eval;
use crate::message::Diagnostic;
use crate::model::{Mode, Priority};
use crate::parser::{
    join_modes, max_priority, scan_order, ConfigError, Parser, ParserCore,
};
use crate::state::State;
use crate::suggest::{dedup, Suggestion};
use crate::usage::Usage;
use crate::value::{ErasedValue, Record};

#[cfg(feature = "tracing_debug")]
use tracing::debug;

/// How one merge child stores its state in the shared record.
#[derive(Debug, Clone)]
enum ChildShape {
    /// Object-shaped: its field slots live directly in the shared record and
    /// the whole record is threaded through it.
    Fields(Vec<String>),
    /// No field-shaped state of its own; stored whole under a synthetic key
    /// and unwrapped at completion.
    Synthetic(String),
}

/// Combines several record-producing parsers into one apparent object
/// parser.
///
/// Children that are themselves object-shaped merge their fields by name into
/// one shared record; wrapped or derived children (`with_default`, `or`,
/// nested `merge`, ...) keep their own opaque state under a synthetic
/// per-child key, and their record value is unwrapped during completion.
struct MergeParser {
    children: Vec<(ChildShape, Rc<dyn ParserCore>)>,
    order: Vec<usize>,
    priority: Priority,
    mode: Mode,
}

impl MergeParser {
    fn child_state(&self, index: usize, slots: &HashMap<String, State>) -> State {
        match &self.children[index].0 {
            ChildShape::Fields(_) => State::new(RecordState {
                slots: slots.clone(),
            }),
            ChildShape::Synthetic(key) => slots
                .get(key)
                .expect("internal error - merge state missing a synthetic slot")
                .clone(),
        }
    }

    /// Fold a child's post-parse state back into the shared record.
    fn absorb(
        &self,
        index: usize,
        slots: &mut HashMap<String, State>,
        state: State,
    ) {
        match &self.children[index].0 {
            ChildShape::Fields(_) => {
                let record = state.expect_ref::<RecordState>();
                slots.clone_from(&record.slots);
            }
            ChildShape::Synthetic(key) => {
                slots.insert(key.clone(), state);
            }
        }
    }
}

impl ParserCore for MergeParser {
    fn priority(&self) -> Priority {
        self.priority
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn usage(&self) -> Usage {
        self.children
            .iter()
            .flat_map(|(_, child)| child.usage())
            .collect()
    }

    fn initial_state(&self) -> State {
        let mut slots = HashMap::default();

        for (shape, child) in &self.children {
            match shape {
                ChildShape::Fields(_) => {
                    let child_initial = child.initial_state();
                    let record = child_initial.expect_ref::<RecordState>();
                    for (name, slot) in &record.slots {
                        slots.insert(name.clone(), slot.clone());
                    }
                }
                ChildShape::Synthetic(key) => {
                    slots.insert(key.clone(), child.initial_state());
                }
            }
        }

        State::new(RecordState { slots })
    }

    fn parse<'a>(&self, context: ParserContext<'a>) -> ParseOutcome<'a> {
        let record = context.state.expect_ref::<RecordState>().clone();

        let children: Vec<_> = self.children.iter().map(|(_, child)| child.clone()).collect();
        let step = greedy_scan(&context, &children, &self.order, |index| {
            self.child_state(index, &record.slots)
        });

        match step {
            ScanStep::Progress { index, matched } | ScanStep::ZeroSuccess { index, matched } => {
                #[cfg(feature = "tracing_debug")]
                {
                    debug!(
                        "Merge matched child {index} ({} tokens).",
                        matched.consumed.len()
                    );
                }
                let mut slots = record.slots.clone();
                self.absorb(index, &mut slots, matched.next.state);
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
            // A committed child failure aborts the merge outright; a
            // zero-consumption failure was already skipped by the scan so a
            // later, lower-priority child could try the same tokens.
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
        let record = state.expect_ref::<RecordState>();
        let mut evals = Vec::with_capacity(self.children.len());

        for (index, (_, child)) in self.children.iter().enumerate() {
            let child_state = self.child_state(index, &record.slots);
            evals.push(child.complete(&child_state, registry));
        }

        Eval::join_all(evals).map(|results| {
            let mut merged = Record::default();
            for result in results {
                let value = result?;
                merged.absorb(value.expect_downcast::<Record>());
            }
            Ok(ErasedValue::new(merged))
        })
    }

    fn suggest(&self, context: &ParserContext<'_>, prefix: &str) -> Vec<Suggestion> {
        let record = context.state.expect_ref::<RecordState>();

        let suggestions = self
            .order
            .iter()
            .flat_map(|&index| {
                let child_context = context.for_child(self.child_state(index, &record.slots));
                self.children[index].1.suggest(&child_context, prefix)
            })
            .collect();

        dedup(suggestions)
    }

    fn doc_fragments(&self, state: DocState<'_>, default: Option<&str>) -> DocFragments {
        let fragments = match state {
            DocState::Available(state) => {
                let record = state.expect_ref::<RecordState>();
                self.children
                    .iter()
                    .enumerate()
                    .map(|(index, (_, child))| {
                        let child_state = self.child_state(index, &record.slots);
                        // The child state is reconstructed locally, so the
                        // fragments are rendered from a clone of it.
                        child.doc_fragments(DocState::Available(&child_state), default)
                    })
                    .collect()
            }
            DocState::Unavailable => self
                .children
                .iter()
                .map(|(_, child)| child.doc_fragments(DocState::Unavailable, default))
                .collect(),
        };
        DocFragments::combine(fragments)
    }
}

/// Merge several record-producing parsers into one.
pub fn merge(parsers: Vec<Parser<Record>>) -> Result<Parser<Record>, ConfigError> {
    let mut children = Vec::with_capacity(parsers.len());
    let mut seen: Vec<String> = Vec::default();

    for (index, parser) in parsers.iter().enumerate() {
        let core = parser.core();
        let shape = match core.record_fields() {
            Some(fields) => {
                for name in &fields {
                    if seen.contains(name) {
                        return Err(ConfigError(format!(
                            "Cannot merge: the field '{name}' appears in more than one child."
                        )));
                    }
                    seen.push(name.clone());
                }
                ChildShape::Fields(fields)
            }
            None => ChildShape::Synthetic(format!("{SYNTHETIC_KEY_PREFIX}{index}")),
        };
        children.push((shape, core));
    }

    let cores: Vec<Rc<dyn ParserCore>> =
        children.iter().map(|(_, child)| child.clone()).collect();
    let order = scan_order(&cores);
    let priority = max_priority(cores.iter());
    let mode = join_modes(cores.iter());

    Ok(Parser::from_core(Rc::new(MergeParser {
        children,
        order,
        priority,
        mode,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinator::{field, object, with_default};
    use crate::convert;
    use crate::leaf::{option, switch};
    use crate::test::util::parse_all;
    use rstest::rstest;

    fn base() -> Parser<Record> {
        object(vec![field("verbose", switch(&["-v"]))]).unwrap()
    }

    fn extra() -> Parser<Record> {
        object(vec![field("output", option(&["-o"], convert::string()))]).unwrap()
    }

    #[rstest]
    #[case(vec!["-v", "-o", "out.txt"])]
    #[case(vec!["-o", "out.txt", "-v"])]
    fn fields_merge_by_name(#[case] tokens: Vec<&str>) {
        let parser = merge(vec![base(), extra()]).unwrap();
        let tokens: Vec<String> = tokens.into_iter().map(String::from).collect();
        let (state, registry) = parse_all(&parser, &tokens);

        let mut record = parser
            .complete(&state, &registry.into_handle())
            .force_now()
            .unwrap()
            .unwrap();
        assert_eq!(record.take::<bool>("verbose"), Some(true));
        assert_eq!(record.take::<String>("output"), Some("out.txt".to_string()));
    }

    #[test]
    fn wrapped_children_use_synthetic_slots() {
        // `with_default` has no field-shaped state of its own; its record is
        // unwrapped back out during completion.
        let defaulted = with_default(extra(), || {
            let mut record = Record::default();
            record.insert("output", crate::value::ErasedValue::new("-".to_string()));
            record
        });
        let parser = merge(vec![base(), defaulted]).unwrap();

        let tokens = vec!["-v".to_string()];
        let (state, registry) = parse_all(&parser, &tokens);
        let mut record = parser
            .complete(&state, &registry.into_handle())
            .force_now()
            .unwrap()
            .unwrap();
        assert_eq!(record.take::<bool>("verbose"), Some(true));
        assert_eq!(record.take::<String>("output"), Some("-".to_string()));
    }

    #[test]
    fn wrapped_child_still_parses() {
        let defaulted = with_default(extra(), Record::default);
        let parser = merge(vec![base(), defaulted]).unwrap();

        let tokens = vec!["-o".to_string(), "file".to_string(), "-v".to_string()];
        let (state, registry) = parse_all(&parser, &tokens);
        let mut record = parser
            .complete(&state, &registry.into_handle())
            .force_now()
            .unwrap()
            .unwrap();
        assert_eq!(record.take::<String>("output"), Some("file".to_string()));
        assert_eq!(record.take::<bool>("verbose"), Some(true));
    }

    #[test]
    fn colliding_fields_are_config_errors() {
        let result = merge(vec![base(), base()]);
        assert_matches!(result, Err(ConfigError(_)));
    }
}
