use futures::future::LocalBoxFuture;
use futures::FutureExt;

/// A value that is either ready now or requires deferred (asynchronous) work.
///
/// This is the only suspension mechanism in the crate. A fully synchronous
/// parser tree produces `Ready` everywhere; an asynchronous value converter
/// introduces `Deferred`, and every composition point propagates it without
/// blocking. Sequential composition (`join_all`, `and_then`) awaits children
/// strictly in order, preserving deterministic error ranking.
pub enum Eval<T> {
    Ready(T),
    Deferred(LocalBoxFuture<'static, T>),
}

impl<T: 'static> Eval<T> {
    pub fn ready(value: T) -> Self {
        Eval::Ready(value)
    }

    pub fn deferred(future: impl std::future::Future<Output = T> + 'static) -> Self {
        Eval::Deferred(future.boxed_local())
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Eval::Ready(_))
    }

    /// Run the deferred work, if any.
    pub async fn resolve(self) -> T {
        match self {
            Eval::Ready(value) => value,
            Eval::Deferred(future) => future.await,
        }
    }

    /// Extract the value without an executor. `Deferred` work that is not
    /// already finished yields `None`.
    pub fn force_now(self) -> Option<T> {
        match self {
            Eval::Ready(value) => Some(value),
            Eval::Deferred(future) => future.now_or_never(),
        }
    }

    pub fn map<U: 'static>(self, transform: impl FnOnce(T) -> U + 'static) -> Eval<U> {
        match self {
            Eval::Ready(value) => Eval::Ready(transform(value)),
            Eval::Deferred(future) => Eval::deferred(future.map(transform)),
        }
    }

    pub fn and_then<U: 'static>(self, next: impl FnOnce(T) -> Eval<U> + 'static) -> Eval<U> {
        match self {
            Eval::Ready(value) => next(value),
            Eval::Deferred(future) => {
                Eval::deferred(async move { next(future.await).resolve().await })
            }
        }
    }

    /// Combine many evaluations in order. All-ready inputs stay ready;
    /// otherwise the result defers and awaits each item sequentially.
    pub fn join_all(items: Vec<Eval<T>>) -> Eval<Vec<T>> {
        if items.iter().all(Eval::is_ready) {
            Eval::Ready(
                items
                    .into_iter()
                    .map(|item| match item {
                        Eval::Ready(value) => value,
                        Eval::Deferred(_) => {
                            unreachable!("internal error - deferred item in all-ready join")
                        }
                    })
                    .collect(),
            )
        } else {
            Eval::deferred(async move {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(item.resolve().await);
                }
                values
            })
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Eval<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Eval::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Eval::Deferred(_) => f.debug_tuple("Deferred").finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_chains_stay_ready() {
        let eval = Eval::ready(2).map(|v| v * 3).and_then(|v| Eval::ready(v + 1));
        assert_eq!(eval.force_now(), Some(7));
    }

    #[test]
    fn join_all_ready() {
        let joined = Eval::join_all(vec![Eval::ready(1), Eval::ready(2)]);
        assert!(joined.is_ready());
        assert_eq!(joined.force_now(), Some(vec![1, 2]));
    }

    #[tokio::test]
    async fn join_all_mixed_preserves_order() {
        let joined = Eval::join_all(vec![
            Eval::ready(1),
            Eval::deferred(async { 2 }),
            Eval::ready(3),
        ]);
        assert!(!joined.is_ready());
        assert_eq!(joined.resolve().await, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn deferred_and_then() {
        let eval = Eval::deferred(async { 10 }).and_then(|v| Eval::deferred(async move { v + 5 }));
        assert_eq!(eval.resolve().await, 15);
    }
}
