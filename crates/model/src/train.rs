use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::TrainId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum TrainLinkKind {
    Ersatz,
    Kupplung,
    Fluegelung,
}

/// A link from one train to a sibling train produced by an operational
/// event, carrying the number (`zielnr`) of the source target that
/// triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TrainLink {
    pub to: i64,
    pub kind: TrainLinkKind,
    pub zielnr: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Train {
    pub id: TrainId,
    pub name: String,
    pub number: String,
    pub einfahrt_anschluss: Option<String>,
    pub ausfahrt_anschluss: Option<String>,
    pub disposed_track: Option<String>,
    pub plan_track: Option<String>,
    pub sichtbar: bool,
    pub am_gleis: bool,
    pub verspaetung: f64,
    pub terminated: bool,
    pub links: Vec<TrainLink>,
}

impl Train {
    pub fn new(id: TrainId, name: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            number: number.into(),
            einfahrt_anschluss: None,
            ausfahrt_anschluss: None,
            disposed_track: None,
            plan_track: None,
            sichtbar: false,
            am_gleis: false,
            verspaetung: 0.0,
            terminated: false,
            links: Vec::new(),
        }
    }

    /// Marks the train as no longer present in the world, per the roster
    /// refresh rule: a previously visible train absent from the roster is
    /// terminated, not deleted.
    pub fn mark_terminated(&mut self) {
        self.sichtbar = false;
        self.am_gleis = false;
        self.disposed_track = None;
        self.terminated = true;
    }
}

/// Computes a train's `stamm`: the set of train ids reachable through
/// Ersatz/Kupplung/Fluegelung links in either direction, including itself.
pub fn stamm(trains: &std::collections::HashMap<i64, Train>, start: i64) -> HashSet<i64> {
    let mut seen = HashSet::new();
    let mut stack = vec![start];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        if let Some(train) = trains.get(&id) {
            for link in &train.links {
                stack.push(link.to);
            }
        }
        for other in trains.values() {
            if other.links.iter().any(|l| l.to == id) {
                stack.push(other.id.raw());
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamm_follows_links_both_ways() {
        let mut trains = std::collections::HashMap::new();
        let mut t11 = Train::new(TrainId::new(11), "RE1", "11");
        t11.links.push(TrainLink { to: 12, kind: TrainLinkKind::Ersatz, zielnr: 2 });
        let t12 = Train::new(TrainId::new(12), "RE1", "12");
        trains.insert(11, t11);
        trains.insert(12, t12);

        let from_11 = stamm(&trains, 11);
        let from_12 = stamm(&trains, 12);
        assert_eq!(from_11, from_12);
        assert!(from_11.contains(&11) && from_11.contains(&12));
    }

    #[test]
    fn mark_terminated_clears_presence() {
        let mut train = Train::new(TrainId::new(1), "IC", "1");
        train.sichtbar = true;
        train.am_gleis = true;
        train.disposed_track = Some("3".into());
        train.mark_terminated();
        assert!(!train.sichtbar);
        assert!(!train.am_gleis);
        assert!(train.disposed_track.is_none());
        assert!(train.terminated);
    }
}
