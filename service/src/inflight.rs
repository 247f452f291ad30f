//! Process-wide set of [`Declaration`]s being finished.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use crate::domain::declaration;
#[cfg(doc)]
use crate::domain::Declaration;

/// Process-wide set of [`Declaration`]s admitted into the finishing critical
/// section.
///
/// Exists only to prevent duplicate document transmissions within a process
/// lifetime, so is intentionally not persisted: a crash mid-finish leaves
/// `is_finished` unset and the operation retryable.
#[derive(Debug, Default)]
pub struct Inflight {
    /// IDs of [`Declaration`]s being finished at the moment.
    ids: Mutex<HashSet<declaration::Id>>,
}

impl Inflight {
    /// Admits the [`Declaration`] with the provided ID into the finishing
    /// critical section.
    ///
    /// [`None`] is returned if a previous admission of the same ID is still
    /// in flight. The returned [`Permit`] removes the ID once dropped, on
    /// every exit path.
    #[expect(clippy::missing_panics_doc, reason = "mutex cannot be poisoned")]
    #[must_use]
    pub fn acquire(self: &Arc<Self>, id: declaration::Id) -> Option<Permit> {
        self.ids
            .lock()
            .expect("`Inflight` mutex cannot be poisoned")
            .insert(id)
            .then(|| Permit {
                id,
                inflight: Arc::clone(self),
            })
    }

    /// Indicates whether the [`Declaration`] with the provided ID is being
    /// finished at the moment.
    #[expect(clippy::missing_panics_doc, reason = "mutex cannot be poisoned")]
    #[must_use]
    pub fn contains(&self, id: declaration::Id) -> bool {
        self.ids
            .lock()
            .expect("`Inflight` mutex cannot be poisoned")
            .contains(&id)
    }
}

/// Scoped admission into the finishing critical section of an [`Inflight`]
/// set.
#[derive(Debug)]
pub struct Permit {
    /// ID of the admitted [`Declaration`].
    id: declaration::Id,

    /// [`Inflight`] set the admission belongs to.
    inflight: Arc<Inflight>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        if let Ok(mut ids) = self.inflight.ids.lock() {
            _ = ids.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod spec {
    use std::sync::Arc;

    use crate::domain::declaration;

    use super::Inflight;

    #[test]
    fn rejects_reentry_until_released() {
        let inflight = Arc::new(Inflight::default());
        let id = declaration::Id::new();

        let permit = inflight.acquire(id).unwrap();
        assert!(inflight.acquire(id).is_none());
        assert!(inflight.contains(id));

        drop(permit);
        assert!(!inflight.contains(id));
        assert!(inflight.acquire(id).is_some());
    }

    #[test]
    fn tracks_ids_independently() {
        let inflight = Arc::new(Inflight::default());
        let (a, b) = (declaration::Id::new(), declaration::Id::new());

        let _permit = inflight.acquire(a).unwrap();
        assert!(inflight.acquire(b).is_some());
    }
}
