use std::collections::HashMap;

use model::ids::TrainId;
use model::train::{stamm, Train};

/// The set of known trains and their sibling links. Refreshed wholesale from
/// each roster pull; never removes a train, only terminates it.
#[derive(Debug, Default)]
pub struct TrainGraph {
    trains: HashMap<i64, Train>,
}

impl TrainGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: TrainId) -> Option<&Train> {
        self.trains.get(&id.raw())
    }

    pub fn get_mut(&mut self, id: TrainId) -> Option<&mut Train> {
        self.trains.get_mut(&id.raw())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Train> {
        self.trains.values()
    }

    /// Applies a fresh roster snapshot: new trains are inserted, known
    /// trains are updated in place, and trains that were visible before but
    /// are absent from this snapshot are terminated (never deleted). Returns
    /// the ids of trains newly terminated by this call, so the caller can
    /// mark their remaining target nodes `Abgefahren`.
    pub fn refresh_roster(&mut self, roster: Vec<Train>) -> Vec<i64> {
        let seen: std::collections::HashSet<i64> =
            roster.iter().map(|t| t.id.raw()).collect();

        for train in roster {
            self.trains.insert(train.id.raw(), train);
        }

        let mut newly_terminated = Vec::new();
        for (id, train) in self.trains.iter_mut() {
            if !seen.contains(id) && train.sichtbar {
                train.mark_terminated();
                newly_terminated.push(*id);
            }
        }
        newly_terminated
    }

    pub fn stamm_of(&self, id: TrainId) -> std::collections::HashSet<i64> {
        stamm(&self.trains, id.raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn train(id: i64) -> Train {
        let mut t = Train::new(TrainId::new(id), format!("Zug {id}"), id.to_string());
        t.sichtbar = true;
        t
    }

    #[test]
    fn absent_visible_train_is_terminated_not_removed() {
        let mut graph = TrainGraph::new();
        graph.refresh_roster(vec![train(11), train(12)]);
        graph.refresh_roster(vec![train(11)]);

        assert!(graph.get(TrainId::new(11)).unwrap().sichtbar);
        let gone = graph.get(TrainId::new(12)).unwrap();
        assert!(!gone.sichtbar);
        assert!(gone.terminated);
    }

    #[test]
    fn new_train_in_roster_is_added() {
        let mut graph = TrainGraph::new();
        graph.refresh_roster(vec![train(11)]);
        graph.refresh_roster(vec![train(11), train(13)]);
        assert!(graph.get(TrainId::new(13)).is_some());
    }
}
