//! Value converters: pure string-to-value functions with an execution-mode
//! tag and an optional suggestion generator.
//!
//! Converters are orthogonal to the combinators, but their mode propagates
//! upward: an option built from an asynchronous converter makes every
//! composite above it asynchronous.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::FutureExt;

use crate::dependency::{resolve_all, RegistryHandle, SourceId};
use crate::eval::Eval;
use crate::message::{Diagnostic, ErrorKind, Message};
use crate::model::Mode;
use crate::suggest::Suggestion;
use crate::value::SharedValue;

/// The conversion function of a plain converter.
#[derive(Clone)]
enum ConvertFn<T> {
    Sync(Rc<dyn Fn(&str) -> Result<T, Message>>),
    Async(Rc<dyn Fn(String) -> LocalBoxFuture<'static, Result<T, Message>>>),
}

/// A converter with no dependency behaviour.
#[derive(Clone)]
struct Plain<T> {
    metavar: String,
    mode: Mode,
    convert: ConvertFn<T>,
    suggest: Option<Rc<dyn Fn(&str) -> Vec<Suggestion>>>,
}

/// A converter whose real behaviour requires resolved dependency values.
#[derive(Clone)]
struct Derived<T> {
    metavar: String,
    mode: Mode,
    sources: Vec<(SourceId, String)>,
    build: Rc<dyn Fn(&[SharedValue]) -> ValueParser<T>>,
    /// The default-construction path: a stand-in converter used before the
    /// dependency is known, and the fallback when it is never provided.
    /// `None` means an unresolved source is an error.
    preliminary: Option<Rc<ValueParser<T>>>,
}

/// The closed set of converter variants.
#[derive(Clone)]
enum Kind<T> {
    Plain(Plain<T>),
    /// A plain converter promoted to a dependency source; the identity links
    /// derived converters back to it.
    Source {
        id: SourceId,
        inner: Box<ValueParser<T>>,
    },
    Derived(Derived<T>),
}

/// A string-to-value converter for option and argument values.
#[derive(Clone)]
pub struct ValueParser<T> {
    kind: Kind<T>,
}

impl<T> ValueParser<T> {
    /// The placeholder shown in usage and diagnostics, e.g. `FILE`.
    pub fn metavar(&self) -> &str {
        match &self.kind {
            Kind::Plain(plain) => &plain.metavar,
            Kind::Source { inner, .. } => inner.metavar(),
            Kind::Derived(derived) => &derived.metavar,
        }
    }
}

impl<T> std::fmt::Debug for ValueParser<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = match &self.kind {
            Kind::Plain(_) => "Plain",
            Kind::Source { .. } => "Source",
            Kind::Derived(_) => "Derived",
        };
        f.debug_struct("ValueParser")
            .field("kind", &variant)
            .field("metavar", &self.metavar())
            .finish()
    }
}

impl<T: Clone + 'static> ValueParser<T> {
    fn plain(plain: Plain<T>) -> Self {
        ValueParser {
            kind: Kind::Plain(plain),
        }
    }

    pub(crate) fn derived(
        metavar: String,
        mode: Mode,
        sources: Vec<(SourceId, String)>,
        build: Rc<dyn Fn(&[SharedValue]) -> ValueParser<T>>,
        preliminary: Option<Rc<ValueParser<T>>>,
    ) -> Self {
        ValueParser {
            kind: Kind::Derived(Derived {
                metavar,
                mode,
                sources,
                build,
                preliminary,
            }),
        }
    }

    pub(crate) fn into_source(self, id: SourceId) -> Self {
        ValueParser {
            kind: Kind::Source {
                id,
                inner: Box::new(self),
            },
        }
    }

    /// The execution-mode tag, fixed at construction.
    pub fn mode(&self) -> Mode {
        match &self.kind {
            Kind::Plain(plain) => plain.mode,
            Kind::Source { inner, .. } => inner.mode(),
            Kind::Derived(derived) => derived.mode,
        }
    }

    /// Replace the placeholder.
    pub fn with_metavar(mut self, metavar: impl Into<String>) -> Self {
        let metavar = metavar.into();
        match &mut self.kind {
            Kind::Plain(plain) => plain.metavar = metavar,
            Kind::Source { inner, .. } => {
                let renamed = inner.as_ref().clone().with_metavar(metavar);
                *inner = Box::new(renamed);
            }
            Kind::Derived(derived) => derived.metavar = metavar,
        }
        self
    }

    /// Attach a suggestion generator. Applies to plain converters (including
    /// a source's underlying converter); derived converters keep the
    /// suggestions of whichever converter resolution selects.
    pub fn with_suggestions(
        mut self,
        suggest: impl Fn(&str) -> Vec<Suggestion> + 'static,
    ) -> Self {
        match &mut self.kind {
            Kind::Plain(plain) => plain.suggest = Some(Rc::new(suggest)),
            Kind::Source { inner, .. } => {
                let patched = inner.as_ref().clone().with_suggestions(suggest);
                *inner = Box::new(patched);
            }
            Kind::Derived(_) => {}
        }
        self
    }

    pub(crate) fn source_id(&self) -> Option<SourceId> {
        match &self.kind {
            Kind::Source { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// Convert now, if this converter is plain and synchronous. Leaves use
    /// this to surface conversion failures at parse time, where they take
    /// part in failure ranking.
    pub(crate) fn convert_eagerly(&self, raw: &str) -> Option<Result<T, Message>> {
        match &self.kind {
            Kind::Plain(Plain {
                convert: ConvertFn::Sync(convert),
                ..
            }) => Some(convert(raw)),
            _ => None,
        }
    }

    /// The erased conversion stored in the registry when this converter is
    /// used as a dependency source. The conversion runs on the converter
    /// *behind* the source identity; going through the `Source` wrapper would
    /// re-enter the very resolution that invoked it.
    pub(crate) fn erased(&self, label: &str) -> crate::dependency::ErasedConvert {
        let this = match &self.kind {
            Kind::Source { inner, .. } => inner.as_ref().clone(),
            _ => self.clone(),
        };
        let label = label.to_string();
        Rc::new(move |handle, raw| {
            this.convert_with(handle.clone(), raw.to_string(), label.clone())
                .map(|result| result.map(SharedValue::new))
        })
    }

    /// Convert captured raw text during completion. Dependency sources
    /// resolve through the registry; derived converters first resolve their
    /// sources, then convert with the factory-built converter.
    pub(crate) fn convert_with(
        &self,
        handle: RegistryHandle,
        raw: String,
        label: String,
    ) -> Eval<Result<T, Diagnostic>> {
        match &self.kind {
            Kind::Plain(plain) => match &plain.convert {
                ConvertFn::Sync(convert) => {
                    Eval::ready(convert(&raw).map_err(|message| invalid(message, &label)))
                }
                ConvertFn::Async(convert) => {
                    let future = convert(raw);
                    Eval::deferred(
                        future.map(move |result| {
                            result.map_err(|message| invalid(message, &label))
                        }),
                    )
                }
            },
            Kind::Source { id, .. } => {
                let metavar = self.metavar().to_string();
                crate::dependency::resolve(&handle, *id, &label, &metavar).map(|result| {
                    result.map(|shared| {
                        shared
                            .extract::<T>()
                            .expect("internal error - dependency value type mismatch")
                    })
                })
            }
            Kind::Derived(derived) => {
                let derived = derived.clone();
                let resolve_handle = handle.clone();
                let resolution = resolve_all(&resolve_handle, &derived.sources, &label);
                let declared = derived.mode;

                let eval = resolution.and_then(move |result| match result {
                    Ok(values) => {
                        let actual = (derived.build)(&values);
                        actual.convert_with(handle, raw, label)
                    }
                    Err(error)
                        if error.kind == ErrorKind::UnresolvedDependency
                            && derived.preliminary.is_some() =>
                    {
                        let fallback = derived
                            .preliminary
                            .as_ref()
                            .expect("internal error - fallback presence just checked")
                            .clone();
                        fallback.convert_with(handle, raw, label)
                    }
                    Err(error) => Eval::ready(Err(error)),
                });

                // A converter declared synchronous must not defer; a factory
                // that breaks the declaration is reported, not awaited.
                match declared {
                    Mode::Async => eval,
                    Mode::Sync => match eval {
                        Eval::Ready(result) => Eval::ready(result),
                        Eval::Deferred(future) => match future.now_or_never() {
                            Some(result) => Eval::ready(result),
                            None => Eval::ready(Err(Diagnostic::new(
                                ErrorKind::InvalidValue,
                                Message::new()
                                    .text("the converter behind ")
                                    .metavar(self.metavar())
                                    .text(" is declared synchronous but produced deferred work"),
                            ))),
                        },
                    },
                }
            }
        }
    }

    /// Completion candidates for a partially typed value. Derived converters
    /// use the factory-built converter when every source is already
    /// resolvable without deferred work, and the stand-in otherwise.
    pub(crate) fn suggestions(
        &self,
        registry: &crate::dependency::DependencyRegistry,
        prefix: &str,
    ) -> Vec<Suggestion> {
        match &self.kind {
            Kind::Plain(plain) => match &plain.suggest {
                Some(suggest) => suggest(prefix),
                None => Vec::default(),
            },
            Kind::Source { inner, .. } => inner.suggestions(registry, prefix),
            Kind::Derived(derived) => {
                let handle = Rc::new(RefCell::new(registry.clone()));
                let resolved = resolve_all(&handle, &derived.sources, derived.metavar.as_str())
                    .force_now();

                match resolved {
                    Some(Ok(values)) => {
                        let actual = (derived.build)(&values);
                        actual.suggestions(registry, prefix)
                    }
                    _ => match &derived.preliminary {
                        Some(preliminary) => preliminary.suggestions(registry, prefix),
                        None => Vec::default(),
                    },
                }
            }
        }
    }
}

fn invalid(message: Message, label: &str) -> Diagnostic {
    let full = if label.is_empty() {
        message
    } else {
        message.text(" for ").option_name(label)
    };
    Diagnostic::new(ErrorKind::InvalidValue, full)
}

/// Accept any string verbatim.
pub fn string() -> ValueParser<String> {
    ValueParser::plain(Plain {
        metavar: "TEXT".to_string(),
        mode: Mode::Sync,
        convert: ConvertFn::Sync(Rc::new(|raw| Ok(raw.to_string()))),
        suggest: None,
    })
}

/// Accept a 64-bit signed integer.
pub fn integer() -> ValueParser<i64> {
    ValueParser::plain(Plain {
        metavar: "INT".to_string(),
        mode: Mode::Sync,
        convert: ConvertFn::Sync(Rc::new(|raw| {
            raw.parse::<i64>().map_err(|_| {
                Message::new()
                    .value(raw)
                    .text(" is not a valid ")
                    .metavar("INT")
            })
        })),
        suggest: None,
    })
}

/// Accept a 64-bit signed integer within the inclusive `range`.
pub fn integer_in(range: std::ops::RangeInclusive<i64>) -> ValueParser<i64> {
    ValueParser::plain(Plain {
        metavar: "INT".to_string(),
        mode: Mode::Sync,
        convert: ConvertFn::Sync(Rc::new(move |raw| {
            let value = raw.parse::<i64>().map_err(|_| {
                Message::new()
                    .value(raw)
                    .text(" is not a valid ")
                    .metavar("INT")
            })?;
            if range.contains(&value) {
                Ok(value)
            } else {
                Err(Message::new()
                    .value(raw)
                    .text(format!(
                        " is out of range [{}, {}]",
                        range.start(),
                        range.end()
                    )))
            }
        })),
        suggest: None,
    })
}

/// Accept a 64-bit float.
pub fn float() -> ValueParser<f64> {
    ValueParser::plain(Plain {
        metavar: "NUM".to_string(),
        mode: Mode::Sync,
        convert: ConvertFn::Sync(Rc::new(|raw| {
            raw.parse::<f64>().map_err(|_| {
                Message::new()
                    .value(raw)
                    .text(" is not a valid ")
                    .metavar("NUM")
            })
        })),
        suggest: None,
    })
}

/// Accept exactly one of `values`, offering them as completion candidates.
pub fn choice(values: impl IntoIterator<Item = impl Into<String>>) -> ValueParser<String> {
    let values: Rc<Vec<String>> = Rc::new(values.into_iter().map(Into::into).collect());
    let accepted = values.clone();
    let suggested = values.clone();

    ValueParser::plain(Plain {
        metavar: "CHOICE".to_string(),
        mode: Mode::Sync,
        convert: ConvertFn::Sync(Rc::new(move |raw| {
            if accepted.iter().any(|value| value == raw) {
                Ok(raw.to_string())
            } else {
                Err(Message::new()
                    .value(raw)
                    .text(format!(" is not one of {{{}}}", accepted.join(", "))))
            }
        })),
        suggest: Some(Rc::new(move |prefix| {
            suggested
                .iter()
                .filter(|value| value.starts_with(prefix))
                .map(Suggestion::literal)
                .collect()
        })),
    })
}

/// Accept any path, hinting file completion to the shell.
pub fn path() -> ValueParser<PathBuf> {
    path_matching(None)
}

/// Accept any path, hinting file completion restricted to `pattern`.
pub fn path_matching(pattern: Option<&str>) -> ValueParser<PathBuf> {
    let pattern = pattern.map(|pattern| pattern.to_string());
    ValueParser::plain(Plain {
        metavar: "PATH".to_string(),
        mode: Mode::Sync,
        convert: ConvertFn::Sync(Rc::new(|raw| Ok(PathBuf::from(raw)))),
        suggest: Some(Rc::new(move |_| vec![Suggestion::file(pattern.clone())])),
    })
}

/// A synchronous converter from a caller-supplied function.
pub fn custom<T: Clone + 'static>(
    metavar: impl Into<String>,
    convert: impl Fn(&str) -> Result<T, Message> + 'static,
) -> ValueParser<T> {
    ValueParser::plain(Plain {
        metavar: metavar.into(),
        mode: Mode::Sync,
        convert: ConvertFn::Sync(Rc::new(convert)),
        suggest: None,
    })
}

/// An asynchronous converter from a caller-supplied future-returning
/// function. Any parser using it becomes asynchronous.
pub fn custom_async<T, F, Fut>(metavar: impl Into<String>, convert: F) -> ValueParser<T>
where
    T: Clone + 'static,
    F: Fn(String) -> Fut + 'static,
    Fut: std::future::Future<Output = Result<T, Message>> + 'static,
{
    ValueParser::plain(Plain {
        metavar: metavar.into(),
        mode: Mode::Async,
        convert: ConvertFn::Async(Rc::new(move |raw| convert(raw).boxed_local())),
        suggest: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::DependencyRegistry;
    use rstest::rstest;

    fn convert_now<T: Clone + 'static>(parser: &ValueParser<T>, raw: &str) -> Result<T, Diagnostic> {
        parser
            .convert_with(
                DependencyRegistry::default().into_handle(),
                raw.to_string(),
                "--test".to_string(),
            )
            .force_now()
            .expect("synchronous conversion must be ready")
    }

    #[rstest]
    #[case("0", Some(0))]
    #[case("123", Some(123))]
    #[case("-17", Some(-17))]
    #[case("1.5", None)]
    #[case("blah", None)]
    fn integer_conversion(#[case] raw: &str, #[case] expected: Option<i64>) {
        let parser = integer();
        match expected {
            Some(value) => assert_eq!(convert_now(&parser, raw).unwrap(), value),
            None => {
                let error = convert_now(&parser, raw).unwrap_err();
                assert_eq!(error.kind, ErrorKind::InvalidValue);
            }
        }
    }

    #[rstest]
    #[case(0, true)]
    #[case(10, true)]
    #[case(11, false)]
    #[case(-1, false)]
    fn integer_range(#[case] value: i64, #[case] ok: bool) {
        let parser = integer_in(0..=10);
        let result = convert_now(&parser, &value.to_string());
        assert_eq!(result.is_ok(), ok);
    }

    #[test]
    fn choice_accepts_members_only() {
        let parser = choice(["json", "yaml"]);
        assert_eq!(convert_now(&parser, "json").unwrap(), "json");
        let error = convert_now(&parser, "toml").unwrap_err();
        assert_eq!(error.kind, ErrorKind::InvalidValue);
        crate::test::assert_contains!(error.to_string(), "json, yaml");
    }

    #[test]
    fn choice_suggests_by_prefix() {
        let parser = choice(["json", "yaml", "jsonl"]);
        let registry = DependencyRegistry::default();
        assert_eq!(
            parser.suggestions(&registry, "js"),
            vec![Suggestion::literal("json"), Suggestion::literal("jsonl")]
        );
        assert_eq!(parser.suggestions(&registry, "x"), vec![]);
    }

    #[test]
    fn path_suggests_files() {
        let parser = path_matching(Some("*.toml"));
        let registry = DependencyRegistry::default();
        assert_eq!(
            parser.suggestions(&registry, ""),
            vec![Suggestion::file(Some("*.toml".to_string()))]
        );
    }

    #[tokio::test]
    async fn async_conversion_defers() {
        let parser = custom_async("SLOW", |raw: String| async move {
            Ok::<_, Message>(raw.to_uppercase())
        });
        assert_eq!(parser.mode(), Mode::Async);

        let eval = parser.convert_with(
            DependencyRegistry::default().into_handle(),
            "abc".to_string(),
            "--test".to_string(),
        );
        assert!(!eval.is_ready());
        assert_eq!(eval.resolve().await.unwrap(), "ABC");
    }

    #[test]
    fn metavar_rename() {
        let parser = string().with_metavar("NAME");
        assert_eq!(parser.metavar(), "NAME");
    }
}
