//! Thread-local annotation state.
//!
//! Recording is on by default. [`stop_annotating`] suspends it for the
//! lifetime of the returned guard; guards nest because the state is a
//! counter, and dropping a guard (also while unwinding) restores the prior
//! state.

use std::cell::RefCell;
use std::marker::PhantomData;

#[derive(Debug, Clone, Copy)]
struct AnnotationState {
    /// Base flag toggled by `pause_annotation` / `continue_annotation`.
    enabled: bool,
    /// Number of live `AnnotationGuard`s.
    stopped: usize,
}

thread_local! {
    static ANNOTATION: RefCell<AnnotationState> = const {
        RefCell::new(AnnotationState {
            enabled: true,
            stopped: 0,
        })
    };
}

/// Whether operations on overloaded values currently record blocks.
pub fn annotation_enabled() -> bool {
    ANNOTATION.with(|a| {
        let state = a.borrow();
        state.enabled && state.stopped == 0
    })
}

/// Resolve a per-call annotation override against the global state.
///
/// `Some(flag)` wins, `None` follows [`annotation_enabled`].
pub fn annotate_tape(annotate: Option<bool>) -> bool {
    annotate.unwrap_or_else(annotation_enabled)
}

/// Turn recording off until [`continue_annotation`] is called.
pub fn pause_annotation() {
    ANNOTATION.with(|a| a.borrow_mut().enabled = false);
}

/// Turn recording back on after [`pause_annotation`].
pub fn continue_annotation() {
    ANNOTATION.with(|a| a.borrow_mut().enabled = true);
}

/// Scope guard returned by [`stop_annotating`].
#[must_use = "annotation resumes as soon as the guard is dropped"]
#[derive(Debug)]
pub struct AnnotationGuard {
    // Thread-local state: the guard must be dropped on the thread that made it.
    _not_send: PhantomData<*const ()>,
}

/// Suspend recording until the returned guard is dropped.
///
/// # Example
///
/// ```
/// use adjtape::tape::{annotation_enabled, stop_annotating};
///
/// {
///     let _guard = stop_annotating();
///     assert!(!annotation_enabled());
/// }
/// assert!(annotation_enabled());
/// ```
pub fn stop_annotating() -> AnnotationGuard {
    ANNOTATION.with(|a| a.borrow_mut().stopped += 1);
    AnnotationGuard {
        _not_send: PhantomData,
    }
}

impl Drop for AnnotationGuard {
    fn drop(&mut self) {
        ANNOTATION.with(|a| {
            let mut state = a.borrow_mut();
            state.stopped = state.stopped.saturating_sub(1);
        });
    }
}

/// Run `f` with recording suspended.
pub fn no_annotations<R>(f: impl FnOnce() -> R) -> R {
    let _guard = stop_annotating();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_guards() {
        assert!(annotation_enabled());
        let outer = stop_annotating();
        {
            let _inner = stop_annotating();
            assert!(!annotation_enabled());
        }
        assert!(!annotation_enabled());
        drop(outer);
        assert!(annotation_enabled());
    }

    #[test]
    fn test_annotate_override() {
        let _guard = stop_annotating();
        assert!(!annotate_tape(None));
        assert!(annotate_tape(Some(true)));
        assert!(!annotate_tape(Some(false)));
    }

    #[test]
    fn test_pause_continue() {
        pause_annotation();
        assert!(!annotation_enabled());
        no_annotations(|| assert!(!annotation_enabled()));
        continue_annotation();
        assert!(annotation_enabled());
    }

    #[test]
    fn test_guard_restores_on_panic() {
        let result = std::panic::catch_unwind(|| {
            let _guard = stop_annotating();
            panic!("inside scope");
        });
        assert!(result.is_err());
        assert!(annotation_enabled());
    }
}
