//! Process-wide critical section.
//!
//! On the target this is the interrupt-mask lock: entering the section disables interrupts
//! and dropping the returned [Section] restores them. Hosted builds model it as a single
//! global mutual-exclusion lock, so main-loop code and "interrupt" threads serialize exactly
//! as they would on a single core.
//!
//! The section is not reentrant. Acquiring it while already holding a [Section] on the same
//! thread deadlocks, so callers must never invoke a [crate::Pool] operation while holding one.

use std::sync::{Mutex, MutexGuard, PoisonError};

static SECTION: Mutex<()> = Mutex::new(());

/// Token proving the critical section is held. The section is released on drop.
#[must_use = "the critical section is released as soon as the token is dropped"]
pub struct Section {
    _guard: MutexGuard<'static, ()>,
}

impl Section {
    /// Releases the section (equivalent to dropping the token).
    pub fn release(self) {}
}

/// Enters the critical section, waiting for any other holder to leave it.
pub fn acquire() -> Section {
    // The lock guards no data, so poisoning is ignored
    let guard = SECTION.lock().unwrap_or_else(PoisonError::into_inner);
    Section { _guard: guard }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        thread,
    };

    #[test]
    fn test_sections_are_exclusive() {
        let inside = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let inside = inside.clone();
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        let section = acquire();
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        inside.fetch_sub(1, Ordering::SeqCst);
                        section.release();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_section_survives_poison() {
        let result = thread::spawn(|| {
            let _section = acquire();
            panic!("interrupt handler failed");
        })
        .join();
        assert!(result.is_err());
        drop(acquire());
    }
}
