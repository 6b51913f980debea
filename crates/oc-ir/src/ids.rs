//! Stable identifiers for timeline objects.
//!
//! These survive persistence, so they are random UUIDs rather than arena
//! indices. Runtime-only handles (graph nodes, voices) live in slot maps in
//! the engine crate.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! timeline_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID (used when reloading persisted data).
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

timeline_id!(
    /// Identifies a track in a project.
    TrackId
);
timeline_id!(
    /// Identifies a clip in the project clip pool.
    ClipId
);
timeline_id!(
    /// Identifies one placement of a clip on a track.
    InstanceId
);
timeline_id!(
    /// Identifies a note inside its owning clip.
    NoteId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_are_distinct() {
        assert_ne!(TrackId::new(), TrackId::new());
        assert_ne!(NoteId::new(), NoteId::new());
    }

    #[test]
    fn serializes_as_bare_uuid() {
        let id = ClipId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: ClipId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
