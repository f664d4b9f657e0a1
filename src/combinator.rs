//! Combinators: functions building composite parsers from child parsers.
//!
//! Every composite is an immutable template; per-cycle data lives in tagged
//! state values threaded through the context, never in the template itself.

mod choice;
mod group;
mod merge;
mod modifier;
mod object;

pub use choice::*;
pub use group::*;
pub use merge::*;
pub use modifier::*;
pub use object::*;

use std::rc::Rc;

use crate::dependency::RegistryHandle;
use crate::eval::Eval;
use crate::message::{Diagnostic, ErrorKind, Message};
use crate::parser::ParserCore;
use crate::state::State;
use crate::value::ErasedValue;

/// Complete the first child that can complete, trying in declaration order.
/// When every child fails, the first failure is reported.
pub(crate) fn complete_first(
    mut remaining: Vec<(Rc<dyn ParserCore>, State)>,
    registry: RegistryHandle,
    first_error: Option<Diagnostic>,
) -> Eval<Result<ErasedValue, Diagnostic>> {
    if remaining.is_empty() {
        return Eval::ready(Err(first_error.unwrap_or_else(|| {
            Diagnostic::new(
                ErrorKind::MissingRequired,
                Message::new().text("no alternative could complete"),
            )
        })));
    }

    let (child, state) = remaining.remove(0);
    let next_registry = registry.clone();
    child
        .complete(&state, &registry)
        .and_then(move |result| match result {
            Ok(value) => Eval::ready(Ok(value)),
            Err(error) => {
                complete_first(remaining, next_registry, Some(first_error.unwrap_or(error)))
            }
        })
}
