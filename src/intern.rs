//! String interning for model and provider identifiers.

use lasso::{Key, Spur, ThreadedRodeo};
use std::hash::Hash;
use std::sync::LazyLock;

use crate::utils::warn_once;

/// Identifier recorded in place of ids that can no longer be interned.
pub const UNKNOWN_ID: &str = "unknown";

/// Global thread-safe interner for model and provider identifiers.
/// Ids are never released, so the key space is bounded by the number of
/// distinct ids ever seen; [`UNKNOWN_ID`] is interned up front as the fallback.
static ID_INTERNER: LazyLock<ThreadedRodeo<Spur>> = LazyLock::new(new_interner);

fn new_interner<K: Key + Hash>() -> ThreadedRodeo<K> {
    let rodeo = ThreadedRodeo::new();
    let _ = rodeo.try_get_or_intern_static(UNKNOWN_ID);
    rodeo
}

/// Interned key for a model or provider identifier.
///
/// The same identifiers repeat on every update event of every session, so the
/// per-session id sets hold 4-byte keys instead of owned strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct IdKey(Spur);

impl IdKey {
    /// Resolve this key back to its identifier string.
    #[inline]
    pub fn resolve(self) -> &'static str {
        ID_INTERNER.resolve(&self.0)
    }
}

/// Intern an identifier, returning a cheap 4-byte key.
#[inline]
pub fn intern_id(id: &str) -> Option<IdKey> {
    intern_in(&ID_INTERNER, id).map(IdKey)
}

/// Intern `id` into `rodeo`. Once its key space is exhausted new ids map to
/// [`UNKNOWN_ID`] instead of failing.
fn intern_in<K: Key + Hash>(rodeo: &ThreadedRodeo<K>, id: &str) -> Option<K> {
    rodeo
        .try_get_or_intern(id)
        .or_else(|e| {
            warn_once(format!(
                "Warning: too many distinct model/provider ids ({e:?}); recording new ones as \"{UNKNOWN_ID}\""
            ));
            rodeo.try_get_or_intern(UNKNOWN_ID)
        })
        .ok()
}
