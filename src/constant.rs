use crate::model::Priority;

/// Default tie-break priorities for the greedy field scan.
/// Commands outrank options, options outrank positional arguments.
pub(crate) const PRIORITY_COMMAND: Priority = 15;
pub(crate) const PRIORITY_OPTION: Priority = 10;
pub(crate) const PRIORITY_ARGUMENT: Priority = 5;
pub(crate) const PRIORITY_INERT: Priority = 0;

/// The explicit end-of-options marker.
pub(crate) const OPTIONS_TERMINATOR: &str = "--";

/// Key prefix under which `merge` stores the state of children that do not
/// expose field-shaped state of their own.
pub(crate) const SYNTHETIC_KEY_PREFIX: &str = "__parser_";
