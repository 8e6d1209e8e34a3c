use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{EventId, TargetId};
use crate::target::Quelle;
use crate::time::Minutes;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EventNode {
    pub id: EventId,
    /// the target this event was built from; `None` for dispatcher-inserted
    /// Betriebshalt events that have no schedule counterpart
    pub target_id: Option<TargetId>,
    pub quelle: Quelle,
    pub plan_track: String,
    pub disposed_track: Option<String>,
    pub t_plan: Option<Minutes>,
    pub t_prog: Option<Minutes>,
    /// set exactly once, when the real-world event is observed; never
    /// overwritten afterwards
    pub t_mess: Option<Minutes>,
}

impl EventNode {
    pub fn new(id: EventId, plan_track: impl Into<String>) -> Self {
        Self {
            id,
            target_id: None,
            quelle: Quelle::Sim,
            plan_track: plan_track.into(),
            disposed_track: None,
            t_plan: None,
            t_prog: None,
            t_mess: None,
        }
    }

    /// The time this node actually stands for: measured, else predicted,
    /// else planned.
    pub fn t_eff(&self) -> Option<Minutes> {
        self.t_mess.or(self.t_prog).or(self.t_plan)
    }

    /// Sets `t_mess`, refusing to overwrite a value that is already set.
    /// Returns `false` if a measurement was already recorded.
    pub fn set_t_mess(&mut self, value: Minutes) -> bool {
        if self.t_mess.is_some() {
            return false;
        }
        self.t_mess = Some(value);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum EventEdgeKind {
    /// Planned travel between two trains' events.
    Planfahrt,
    /// Dwell edge within one train's Halt/Durchfahrt (Arr -> Dep).
    Aufenthalt,
    /// Ersatz hop (Arr -> E -> Dep of the successor train).
    Ersatz,
    Kupplung,
    Fluegelung,
    /// Helper ordering edge, no time semantics.
    Ordnung,
    /// Dispatcher-imposed dependency.
    Abhaengigkeit,
    /// Betriebshalt dwell edge.
    Betriebshalt,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EventEdge {
    pub from: EventId,
    pub to: EventId,
    pub kind: EventEdgeKind,
    /// minimum time gap in minutes; always present except for 'O' edges
    pub dt_min: Minutes,
    /// maximum time gap in minutes, if the operational rule caps it
    pub dt_max: Option<Minutes>,
    /// dispatcher correction: positive extends `dt_min`, negative pulls
    /// `dt_max` earlier. `None` unless an intent API call set it.
    pub dt_fdl: Option<Minutes>,
    pub quelle: Quelle,
}

impl EventEdge {
    pub fn new(from: EventId, to: EventId, kind: EventEdgeKind, dt_min: Minutes) -> Self {
        Self {
            from,
            to,
            kind,
            dt_min,
            dt_max: None,
            dt_fdl: None,
            quelle: Quelle::Sim,
        }
    }

    pub fn ordering(from: EventId, to: EventId) -> Self {
        Self::new(from, to, EventEdgeKind::Ordnung, 0.0)
    }
}
