//! Scoped cleanup of externally held resources.

use std::sync::Mutex;

type Action = Box<dyn FnOnce() + Send>;

/// Wraps one zero-argument cleanup action so it runs exactly once.
///
/// The primary path is an explicit [`close`](Finalizer::close); dropping the
/// finalizer is the backstop for call stacks that unwind past the normal
/// close. The backstop's timing follows the owner's drop point and is
/// therefore non-deterministic from the resource's perspective; never rely
/// on it as the main cleanup path.
///
/// `close` is safe to call concurrently from multiple owners racing to clean
/// up; the action runs at most once and later calls are no-ops.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use omnifs::Finalizer;
///
/// let runs = Arc::new(AtomicUsize::new(0));
/// let counted = runs.clone();
/// let fin = Finalizer::new(move || {
///     counted.fetch_add(1, Ordering::SeqCst);
/// });
///
/// fin.close();
/// fin.close(); // no-op
/// drop(fin); // no-op
/// assert_eq!(runs.load(Ordering::SeqCst), 1);
/// ```
pub struct Finalizer {
    action: Mutex<Option<Action>>,
}

impl Finalizer {
    /// Wrap a cleanup action.
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Mutex::new(Some(Box::new(action))),
        }
    }

    /// Run the action if it has not run yet.
    pub fn close(&self) {
        let taken = self
            .action
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(action) = taken {
            action();
        }
    }
}

impl Drop for Finalizer {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Finalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pending = self
            .action
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false);
        f.debug_struct("Finalizer").field("pending", &pending).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counted() -> (Finalizer, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let handle = runs.clone();
        let fin = Finalizer::new(move || {
            handle.fetch_add(1, Ordering::SeqCst);
        });
        (fin, runs)
    }

    #[test]
    fn close_runs_exactly_once() {
        let (fin, runs) = counted();
        fin.close();
        fin.close();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_is_the_backstop() {
        let (fin, runs) = counted();
        drop(fin);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_after_close_does_not_rerun() {
        let (fin, runs) = counted();
        fin.close();
        drop(fin);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_close_runs_once() {
        let (fin, runs) = counted();
        let fin = Arc::new(fin);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let fin = fin.clone();
                std::thread::spawn(move || fin.close())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
