//! One-stop imports for assembling and driving parsers.

pub use crate::combinator::{
    concat, describe, field, group, longest_match, longest_match_with, map, merge, multiple,
    multiple_bounded, object, object_labeled, optional, or, or_with, tuple, with_default,
    with_default_shown, Field,
};
pub use crate::convert;
pub use crate::dependency::{
    dependency, derive_from, derive_from_async, derive_from_sync, DependencySource,
};
pub use crate::leaf::{
    argument, argument_with, command, constant, flag, flag_with, option, option_with, passthrough,
    switch, switch_with,
};
pub use crate::message::{Message, Overrides};
pub use crate::parser::Parser;
pub use crate::runner::{run, run_sync, suggestions, RunError};
pub use crate::value::{Record, Seq};
