use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::TargetId;
use crate::time::Minutes;

/// The role a target node plays in its train's fahrplan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum TargetKind {
    /// Planhalt: a scheduled stop.
    Halt,
    /// Durchfahrt: scheduled pass-through without stopping.
    Durchfahrt,
    /// Entry at an Anschluss (edge of the simulated world).
    Einfahrt,
    /// Exit at an Anschluss.
    Ausfahrt,
    /// Betriebshalt: an operational stop inserted by the dispatcher.
    Betriebshalt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum TargetStatus {
    Neu,
    Angekommen,
    Abgefahren,
}

/// The provenance of a node or edge: did it come from the simulator's
/// roster/live feed, or was it inserted/corrected by the dispatcher?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Quelle {
    Sim,
    Fdl,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TargetNode {
    pub id: TargetId,
    pub kind: TargetKind,
    pub status: TargetStatus,
    pub quelle: Quelle,
    pub plan_track: String,
    pub disposed_track: Option<String>,
    pub p_an: Option<Minutes>,
    pub p_ab: Option<Minutes>,
    /// minimum dwell time in minutes, as read from the fahrplan
    pub d_min: Minutes,
    /// raw flag string from the simulator, e.g. "E12 K13"
    pub flags: String,
    pub v_an: Option<f64>,
    pub v_ab: Option<f64>,
}

impl TargetNode {
    pub fn new(id: TargetId, kind: TargetKind, plan_track: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            status: TargetStatus::Neu,
            quelle: Quelle::Sim,
            plan_track: plan_track.into(),
            disposed_track: None,
            p_an: None,
            p_ab: None,
            d_min: 0.0,
            flags: String::new(),
            v_an: None,
            v_ab: None,
        }
    }
}

/// The operational meaning of a target-graph edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum TargetEdgeKind {
    /// Planned travel between two consecutive targets of the same train.
    Planfahrt,
    /// Ersatz: train-number replacement.
    Ersatz,
    /// Kupplung: coupling two trains into one.
    Kupplung,
    /// Flügelung: splitting one train into two.
    Fluegelung,
    /// Helper ordering edge with no time semantics (typ 'O' in the source).
    Ordnung,
    /// Dispatcher-imposed dependency, added through the intent API.
    Abhaengigkeit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TargetEdge {
    pub from: TargetId,
    pub to: TargetId,
    pub kind: TargetEdgeKind,
    pub quelle: Quelle,
}

impl TargetEdge {
    pub fn new(from: TargetId, to: TargetId, kind: TargetEdgeKind) -> Self {
        Self { from, to, kind, quelle: Quelle::Sim }
    }
}
