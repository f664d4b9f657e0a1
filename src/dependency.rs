use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::convert::ValueParser;
use crate::eval::Eval;
use crate::message::{Diagnostic, ErrorKind, Message};
use crate::model::Mode;
use crate::value::SharedValue;

#[cfg(feature = "tracing_debug")]
use tracing::debug;

/// The process-unique identity of a dependency source.
///
/// Identity, not structural equality, is what links a derived converter back
/// to its source: two structurally identical converters remain distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl SourceId {
    pub(crate) fn fresh() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A type-erased conversion of captured raw text, re-entrant through the
/// registry so that chained sources resolve transitively.
pub(crate) type ErasedConvert =
    Rc<dyn Fn(&RegistryHandle, &str) -> Eval<Result<SharedValue, Diagnostic>>>;

#[derive(Clone)]
enum Entry {
    /// Raw text captured during parse; conversion has not run yet.
    Captured {
        raw: String,
        label: String,
        convert: ErasedConvert,
    },
    /// Conversion is underway; seeing this during a resolve means a cycle.
    Resolving { label: String },
    Resolved(SharedValue),
    /// Conversion failed; the error is replayed on every later resolve.
    Failed(Diagnostic),
}

/// The per-cycle mapping from source identity to captured/resolved value.
///
/// One registry lives for a single parse+complete cycle. It is cloned, never
/// shared, whenever a construct hands an independent view to a speculative
/// branch; only the surviving branch's registry propagates.
#[derive(Clone, Default)]
pub struct DependencyRegistry {
    entries: HashMap<SourceId, Entry>,
}

impl std::fmt::Debug for DependencyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyRegistry")
            .field("captured", &self.entries.len())
            .finish()
    }
}

impl DependencyRegistry {
    /// Record the raw text of a dependency source at parse time. Conversion
    /// is deferred until the first resolve during completion.
    pub(crate) fn capture(
        &mut self,
        id: SourceId,
        raw: &str,
        label: &str,
        convert: ErasedConvert,
    ) -> Result<(), Diagnostic> {
        if self.entries.contains_key(&id) {
            return Err(Diagnostic::new(
                ErrorKind::DuplicateDependency,
                Message::new()
                    .text("the dependency behind ")
                    .option_name(label)
                    .text(" was already provided elsewhere"),
            ));
        }

        #[cfg(feature = "tracing_debug")]
        {
            debug!("Captured dependency source {id:?} from {label}.");
        }

        self.entries.insert(
            id,
            Entry::Captured {
                raw: raw.to_string(),
                label: label.to_string(),
                convert,
            },
        );
        Ok(())
    }

    /// Wrap this registry for the completion phase, during which resolved
    /// values are cached and shared.
    pub fn into_handle(self) -> RegistryHandle {
        Rc::new(RefCell::new(self))
    }
}

/// The shared view of a registry used while completing one cycle.
pub type RegistryHandle = Rc<RefCell<DependencyRegistry>>;

/// Resolve one source to its value, converting the captured raw text on
/// first use. Resolution is lazy and memoized; re-entering a source that is
/// mid-conversion reports a circular dependency.
pub(crate) fn resolve(
    handle: &RegistryHandle,
    id: SourceId,
    wanted_by: &str,
    source_label: &str,
) -> Eval<Result<SharedValue, Diagnostic>> {
    let entry = handle.borrow().entries.get(&id).cloned();

    match entry {
        None => Eval::ready(Err(Diagnostic::new(
            ErrorKind::UnresolvedDependency,
            Message::new()
                .option_name(wanted_by)
                .text(" depends on ")
                .metavar(source_label)
                .text(", which was not provided"),
        ))),
        Some(Entry::Resolved(value)) => Eval::ready(Ok(value)),
        Some(Entry::Failed(error)) => Eval::ready(Err(error)),
        Some(Entry::Resolving { label }) => Eval::ready(Err(Diagnostic::new(
            ErrorKind::CircularDependency,
            Message::new()
                .text("circular dependency while resolving ")
                .option_name(&label),
        ))),
        Some(Entry::Captured {
            raw,
            label,
            convert,
        }) => {
            // Mark in-flight so a converter that re-enters this source
            // synchronously is caught as a cycle.
            handle.borrow_mut().entries.insert(
                id,
                Entry::Resolving {
                    label: label.clone(),
                },
            );

            #[cfg(feature = "tracing_debug")]
            {
                debug!("Resolving dependency source {id:?} captured from {label}.");
            }

            match convert(handle, &raw) {
                Eval::Ready(result) => Eval::ready(store(handle, id, result)),
                Eval::Deferred(future) => {
                    // The conversion defers. Put the capture back: siblings
                    // that resolve this source before the deferred work runs
                    // are waiting on it, not forming a cycle.
                    handle.borrow_mut().entries.insert(
                        id,
                        Entry::Captured {
                            raw,
                            label: label.clone(),
                            convert,
                        },
                    );

                    let handle = handle.clone();
                    Eval::deferred(async move {
                        let current = handle.borrow().entries.get(&id).cloned();
                        match current {
                            Some(Entry::Resolved(value)) => Ok(value),
                            Some(Entry::Failed(error)) => Err(error),
                            Some(Entry::Resolving { label }) => Err(Diagnostic::new(
                                ErrorKind::CircularDependency,
                                Message::new()
                                    .text("circular dependency while resolving ")
                                    .option_name(&label),
                            )),
                            Some(Entry::Captured { label, .. }) => {
                                handle
                                    .borrow_mut()
                                    .entries
                                    .insert(id, Entry::Resolving { label });
                                let result = future.await;
                                store(&handle, id, result)
                            }
                            None => {
                                unreachable!("internal error - a captured source cannot vanish")
                            }
                        }
                    })
                }
            }
        }
    }
}

fn store(
    handle: &RegistryHandle,
    id: SourceId,
    result: Result<SharedValue, Diagnostic>,
) -> Result<SharedValue, Diagnostic> {
    let entry = match &result {
        Ok(value) => Entry::Resolved(value.clone()),
        Err(error) => Entry::Failed(error.clone()),
    };
    handle.borrow_mut().entries.insert(id, entry);
    result
}

/// Resolve several sources in declaration order, stopping at the first
/// failure.
pub(crate) fn resolve_all(
    handle: &RegistryHandle,
    sources: &[(SourceId, String)],
    wanted_by: &str,
) -> Eval<Result<Vec<SharedValue>, Diagnostic>> {
    let evals: Vec<_> = sources
        .iter()
        .map(|(id, label)| resolve(handle, *id, wanted_by, label))
        .collect();
    Eval::join_all(evals).map(|results| results.into_iter().collect())
}

/// A value converter promoted to a dependency source: other converters may
/// condition their accepted values on this one's resolved value.
pub struct DependencySource<S> {
    id: SourceId,
    parser: ValueParser<S>,
}

/// Tag a value converter as a dependency source, granting it a fresh
/// process-unique identity.
pub fn dependency<S: Clone + 'static>(parser: ValueParser<S>) -> DependencySource<S> {
    DependencySource {
        id: SourceId::fresh(),
        parser,
    }
}

impl<S: Clone + 'static> DependencySource<S> {
    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn mode(&self) -> Mode {
        self.parser.mode()
    }

    pub(crate) fn label(&self) -> String {
        self.parser.metavar().to_string()
    }

    /// The converter to install on the option/argument that *provides* this
    /// source's value.
    pub fn value_parser(&self) -> ValueParser<S> {
        self.parser.clone().into_source(self.id)
    }

    /// Build a converter whose behaviour depends on this source's resolved
    /// value. Until resolution, the converter built from `default`'s value
    /// stands in; it also serves as the fallback when the source is never
    /// provided. The mode is fixed at construction: this source's mode joined
    /// with the stand-in converter's.
    pub fn derive<T, D, F>(&self, default: D, factory: F) -> ValueParser<T>
    where
        T: Clone + 'static,
        D: Fn() -> S + 'static,
        F: Fn(&S) -> ValueParser<T> + 'static,
    {
        derive_from((self,), move || (default(),), move |(value,)| factory(value))
    }

    /// Like [`DependencySource::derive`], but with no usable default: an
    /// unresolved source is an error at completion time. The factory must
    /// produce synchronous converters.
    pub fn derive_sync<T, F>(&self, metavar: impl Into<String>, factory: F) -> ValueParser<T>
    where
        T: Clone + 'static,
        F: Fn(&S) -> ValueParser<T> + 'static,
    {
        derive_from_sync((self,), metavar, move |(value,)| factory(value))
    }

    /// Like [`DependencySource::derive_sync`], but the factory may produce
    /// asynchronous converters; the derived converter is `async` regardless
    /// of this source's mode.
    pub fn derive_async<T, F>(&self, metavar: impl Into<String>, factory: F) -> ValueParser<T>
    where
        T: Clone + 'static,
        F: Fn(&S) -> ValueParser<T> + 'static,
    {
        derive_from_async((self,), metavar, move |(value,)| factory(value))
    }
}

/// A set of dependency sources a converter may be derived from. Implemented
/// for tuples of source references up to arity 3.
pub trait SourceSet {
    /// The resolved values, in declaration order.
    type Values: 'static;

    fn sources(&self) -> Vec<(SourceId, String)>;
    fn mode(&self) -> Mode;
    fn unpack(values: &[SharedValue]) -> Self::Values;
}

macro_rules! source_set {
    ($(($type_var:ident, $index:tt)),+) => {
        impl<'s, $($type_var: Clone + 'static),+> SourceSet for ($(&'s DependencySource<$type_var>,)+) {
            type Values = ($($type_var,)+);

            fn sources(&self) -> Vec<(SourceId, String)> {
                vec![$((self.$index.id, self.$index.label())),+]
            }

            fn mode(&self) -> Mode {
                Mode::join_all([$(self.$index.mode()),+])
            }

            fn unpack(values: &[SharedValue]) -> Self::Values {
                ($(values[$index]
                    .extract::<$type_var>()
                    .expect("internal error - dependency value type mismatch"),)+)
            }
        }
    };
}

source_set!((A, 0));
source_set!((A, 0), (B, 1));
source_set!((A, 0), (B, 1), (C, 2));

/// Build a converter derived from several sources at once. The stand-in
/// converter built from `default`'s values fixes the factory's contribution
/// to the mode tag; the overall mode is the join of every source's mode with
/// it.
pub fn derive_from<Set, T, D, F>(set: Set, default: D, factory: F) -> ValueParser<T>
where
    Set: SourceSet,
    T: Clone + 'static,
    D: Fn() -> Set::Values + 'static,
    F: Fn(&Set::Values) -> ValueParser<T> + 'static,
{
    let preliminary = factory(&default());
    let mode = set.mode().join(preliminary.mode());
    let metavar = preliminary.metavar().to_string();
    ValueParser::derived(
        metavar,
        mode,
        set.sources(),
        build_fn::<Set, T, F>(factory),
        Some(Rc::new(preliminary)),
    )
}

/// Build a converter derived from several sources, with no usable default.
/// The factory must produce synchronous converters; the overall mode is the
/// join of the sources' modes.
pub fn derive_from_sync<Set, T, F>(
    set: Set,
    metavar: impl Into<String>,
    factory: F,
) -> ValueParser<T>
where
    Set: SourceSet,
    T: Clone + 'static,
    F: Fn(&Set::Values) -> ValueParser<T> + 'static,
{
    ValueParser::derived(
        metavar.into(),
        set.mode(),
        set.sources(),
        build_fn::<Set, T, F>(factory),
        None,
    )
}

/// Build a converter derived from several sources, with no usable default
/// and an asynchronous factory. The overall mode is `async` unconditionally.
pub fn derive_from_async<Set, T, F>(
    set: Set,
    metavar: impl Into<String>,
    factory: F,
) -> ValueParser<T>
where
    Set: SourceSet,
    T: Clone + 'static,
    F: Fn(&Set::Values) -> ValueParser<T> + 'static,
{
    ValueParser::derived(
        metavar.into(),
        Mode::Async,
        set.sources(),
        build_fn::<Set, T, F>(factory),
        None,
    )
}

fn build_fn<Set, T, F>(factory: F) -> Rc<dyn Fn(&[SharedValue]) -> ValueParser<T>>
where
    Set: SourceSet,
    T: Clone + 'static,
    F: Fn(&Set::Values) -> ValueParser<T> + 'static,
{
    Rc::new(move |values| {
        let unpacked = Set::unpack(values);
        factory(&unpacked)
    })
}
