use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::id::{HasId, Id};

/// Marker type so `Id<Train>` can be used as the train identifier, following
/// the workspace-wide `Id<T: HasId>` newtype convention.
#[derive(Debug)]
pub struct Train;

impl HasId for Train {
    type IdType = i64;
}

/// Positive ids are scheduled trains, negative ids are shunting moves
/// (lokomotiven) that take part in the train graph but are excluded from
/// prognosis.
pub type TrainId = Id<Train>;

pub fn is_rangierfahrt(train_id: TrainId) -> bool {
    train_id.raw() < 0
}

/// Identifies one planned stop, pass-through, entry or exit of a train.
///
/// Composite key, so it is a plain hashable tuple struct rather than an
/// `Id<T>` newtype: `Id<T>` models a single opaque scalar id, not a
/// multi-field key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct TargetId {
    pub train_id: i64,
    /// planned arrival or departure, minutes since midnight, rounded
    pub time_key: i64,
    pub plan_track: String,
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.train_id, self.plan_track, self.time_key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum EventKind {
    Arr,
    Dep,
    Ersatz,
    Kupplung,
    Fluegelung,
    Betriebshalt,
}

impl EventKind {
    pub fn short(self) -> &'static str {
        match self {
            EventKind::Arr => "An",
            EventKind::Dep => "Ab",
            EventKind::Ersatz => "E",
            EventKind::Kupplung => "K",
            EventKind::Fluegelung => "F",
            EventKind::Betriebshalt => "B",
        }
    }
}

/// Identifies one event in the event graph. `seq` disambiguates events that
/// would otherwise share a `(train_id, kind)` key (e.g. two Betriebshalt
/// stops on the same train); it carries no time semantics of its own —
/// actual times live in `EventNode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct EventId {
    pub train_id: i64,
    pub kind: EventKind,
    pub seq: u32,
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{}", self.train_id, self.kind.short(), self.seq)
    }
}
