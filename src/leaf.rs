//! Leaf parsers: atomic recognizers for one token-level construct each.
//!
//! Every leaf owns a minimal private state shape and satisfies the full
//! parser contract; the combinators treat them exactly like any other
//! subtree.

mod argument;
mod command;
mod flag;
mod inert;
mod option;

pub use argument::*;
pub use command::*;
pub use flag::*;
pub use inert::*;
pub use option::*;

use crate::context::ParserContext;
use crate::convert::ValueParser;
use crate::dependency::{DependencyRegistry, RegistryHandle};
use crate::eval::Eval;
use crate::message::{Diagnostic, ErrorKind, Message, MessageSource, Overrides};
use crate::usage::collect_candidates;
use crate::value::{ErasedValue, SharedValue};

/// The capture state of a single valued parameter.
#[derive(Debug, Clone)]
pub(crate) enum ValueSlot {
    /// Never matched.
    Unset,
    /// Matched and converted at parse time.
    Converted(SharedValue),
    /// Matched; conversion deferred to completion (asynchronous, source, or
    /// derived converters).
    Raw(String),
}

#[derive(Debug, Clone)]
pub(crate) struct ValueState {
    pub(crate) slot: ValueSlot,
}

impl ValueState {
    pub(crate) fn unset() -> Self {
        Self {
            slot: ValueSlot::Unset,
        }
    }

    pub(crate) fn is_set(&self) -> bool {
        !matches!(self.slot, ValueSlot::Unset)
    }
}

/// Record a matched value in its slot: capture dependency sources into the
/// registry, convert eagerly when the converter allows it, and defer the
/// rest to completion.
pub(crate) fn absorb_value<T: Clone + 'static>(
    value: &ValueParser<T>,
    registry: &mut DependencyRegistry,
    raw: &str,
    label: &str,
) -> Result<ValueSlot, Diagnostic> {
    if let Some(id) = value.source_id() {
        registry.capture(id, raw, label, value.erased(label))?;
    }

    match value.convert_eagerly(raw) {
        Some(Ok(converted)) => Ok(ValueSlot::Converted(SharedValue::new(converted))),
        Some(Err(message)) => Err(Diagnostic::new(
            ErrorKind::InvalidValue,
            message.text(" for ").option_name(label),
        )),
        None => Ok(ValueSlot::Raw(raw.to_string())),
    }
}

/// Completion of a valued parameter from its slot.
pub(crate) fn complete_slot<T: Clone + 'static>(
    value: &ValueParser<T>,
    slot: &ValueSlot,
    registry: &RegistryHandle,
    label: &str,
    missing_override: &Option<MessageSource>,
    invalid_override: &Option<MessageSource>,
    missing_default: impl FnOnce() -> Message,
) -> Eval<Result<ErasedValue, Diagnostic>> {
    match slot {
        ValueSlot::Unset => Eval::ready(Err(Diagnostic::new(
            ErrorKind::MissingRequired,
            Overrides::message(missing_override, "", missing_default),
        ))),
        ValueSlot::Converted(shared) => Eval::ready(Ok(ErasedValue::new(
            shared
                .extract::<T>()
                .expect("internal error - slot value type mismatch"),
        ))),
        ValueSlot::Raw(raw) => {
            let invalid_override = invalid_override.clone();
            let token = raw.clone();
            value
                .convert_with(registry.clone(), raw.clone(), label.to_string())
                .map(move |result| {
                    result.map(ErasedValue::new).map_err(|error| {
                        apply_invalid_override(error, &invalid_override, &token)
                    })
                })
        }
    }
}

pub(crate) fn apply_invalid_override(
    error: Diagnostic,
    invalid_override: &Option<MessageSource>,
    token: &str,
) -> Diagnostic {
    match (error.kind, invalid_override) {
        (ErrorKind::InvalidValue, Some(source)) => {
            Diagnostic::new(ErrorKind::InvalidValue, source.produce(token))
        }
        _ => error,
    }
}

/// The default token-level mismatch, carrying "did you mean" candidates from
/// the ambient usage grammar.
pub(crate) fn unexpected(token: &str, context: &ParserContext<'_>) -> Diagnostic {
    Diagnostic::new(
        ErrorKind::Unexpected,
        Message::new().text("unexpected token ").value(token),
    )
    .with_candidates(collect_candidates(&context.grammar))
}

pub(crate) fn end_of_input() -> Diagnostic {
    Diagnostic::new(
        ErrorKind::Unexpected,
        Message::new().text("unexpected end of input"),
    )
}
