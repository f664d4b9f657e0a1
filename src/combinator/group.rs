use std::rc::Rc;

use crate::context::{ParseOutcome, ParserContext};
use crate::dependency::RegistryHandle;
use crate::doc::{DocFragments, DocState};
use crate::eval::Eval;
use crate::message::Diagnostic;
use crate::model::{Mode, Priority};
use crate::parser::{Parser, ParserCore};
use crate::state::State;
use crate::suggest::Suggestion;
use crate::usage::Usage;
use crate::value::ErasedValue;

/// A label-only wrapper: parsing, completion, and suggestions delegate to the
/// child untouched; only the help fragments gain a section title.
struct GroupParser {
    title: String,
    child: Rc<dyn ParserCore>,
}

impl ParserCore for GroupParser {
    fn priority(&self) -> Priority {
        self.child.priority()
    }

    fn mode(&self) -> Mode {
        self.child.mode()
    }

    fn usage(&self) -> Usage {
        self.child.usage()
    }

    fn initial_state(&self) -> State {
        self.child.initial_state()
    }

    fn parse<'a>(&self, context: ParserContext<'a>) -> ParseOutcome<'a> {
        self.child.parse(context)
    }

    fn complete(
        &self,
        state: &State,
        registry: &RegistryHandle,
    ) -> Eval<Result<ErasedValue, Diagnostic>> {
        self.child.complete(state, registry)
    }

    fn suggest(&self, context: &ParserContext<'_>, prefix: &str) -> Vec<Suggestion> {
        self.child.suggest(context, prefix)
    }

    fn doc_fragments(&self, state: DocState<'_>, default: Option<&str>) -> DocFragments {
        self.child.doc_fragments(state, default).labeled(&self.title)
    }

    fn record_fields(&self) -> Option<Vec<String>> {
        self.child.record_fields()
    }
}

/// Wrap `parser` for documentation purposes only, titling its help section.
pub fn group<T: 'static>(title: impl Into<String>, parser: Parser<T>) -> Parser<T> {
    Parser::from_core(Rc::new(GroupParser {
        title: title.into(),
        child: parser.core(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinator::{field, merge, object};
    use crate::leaf::switch;
    use crate::test::util::parse_all;
    use crate::value::Record;

    #[test]
    fn grouping_titles_the_section() {
        let parser = group("logging", switch(&["-v"]));
        let fragments = parser.doc_fragments(DocState::Unavailable, None);
        assert_eq!(fragments.sections[0].title, Some("logging".to_string()));
    }

    #[test]
    fn grouping_is_transparent_to_parsing() {
        let parser = group("main", object(vec![field("verbose", switch(&["-v"]))]).unwrap());
        let tokens = vec!["-v".to_string()];
        let (state, registry) = parse_all(&parser, &tokens);
        let mut record: Record = parser
            .complete(&state, &registry.into_handle())
            .force_now()
            .unwrap()
            .unwrap();
        assert_eq!(record.take::<bool>("verbose"), Some(true));
    }

    #[test]
    fn grouped_objects_still_merge_by_field() {
        let left = group("left", object(vec![field("a", switch(&["-a"]))]).unwrap());
        let right = object(vec![field("b", switch(&["-b"]))]).unwrap();
        let parser = merge(vec![left, right]).unwrap();

        let tokens = vec!["-b".to_string(), "-a".to_string()];
        let (state, registry) = parse_all(&parser, &tokens);
        let mut record = parser
            .complete(&state, &registry.into_handle())
            .force_now()
            .unwrap()
            .unwrap();
        assert_eq!(record.take::<bool>("a"), Some(true));
        assert_eq!(record.take::<bool>("b"), Some(true));
    }
}
