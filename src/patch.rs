//! Three-state wire fields for partial payloads.
//!
//! The backing store elides large unchanged columns from change
//! notifications, so a field can arrive in three distinct shapes: absent
//! (key not on the wire), explicitly `null`, or a value. `Option<T>` can
//! only express two of those, and the difference matters: absence means
//! "unchanged, not resent", while `null` means "set to empty".

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A field of a partial payload: absent, null, or a concrete value.
///
/// Used with `#[serde(default, skip_serializing_if = "Patch::is_missing")]`
/// so that a key absent from the JSON object deserializes to `Missing` and
/// a `Missing` field is never written back out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    /// Key was not present on the wire; the field is unchanged.
    Missing,
    /// Key was present with an explicit `null`.
    Null,
    /// Key was present with a value.
    Value(T),
}

impl<T> Patch<T> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Patch::Missing)
    }

    /// True when the key was present on the wire, whether null or a value.
    pub fn is_present(&self) -> bool {
        !self.is_missing()
    }

    pub fn as_ref(&self) -> Patch<&T> {
        match self {
            Patch::Missing => Patch::Missing,
            Patch::Null => Patch::Null,
            Patch::Value(value) => Patch::Value(value),
        }
    }

    /// The concrete value, if one was sent.
    pub fn value(&self) -> Option<&T> {
        match self {
            Patch::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Patch::Value(value) => Some(value),
            _ => None,
        }
    }
}

impl<T: Clone> Patch<T> {
    /// Overwrite `target` if this field was present on the wire.
    ///
    /// `Missing` leaves the target untouched; `Null` clears it.
    pub fn apply_to(&self, target: &mut Option<T>) {
        match self {
            Patch::Missing => {}
            Patch::Null => *target = None,
            Patch::Value(value) => *target = Some(value.clone()),
        }
    }
}

// Manual impl: the derive would bound `T: Default` for no reason.
impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Missing
    }
}

impl<T> From<Option<T>> for Patch<T> {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(value) => Patch::Value(value),
            None => Patch::Null,
        }
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            // Missing is normally skipped by the field attribute; if it is
            // serialized anyway, null is the only faithful rendering.
            Patch::Missing | Patch::Null => serializer.serialize_none(),
            Patch::Value(value) => serializer.serialize_some(value),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => Patch::Value(value),
            None => Patch::Null,
        })
    }
}
