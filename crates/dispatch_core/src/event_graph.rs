use std::collections::{HashMap, HashSet};

use model::event::{EventEdge, EventNode};
use model::ids::EventId;

/// Expansion of the target graph into atomic events. Owned entirely by
/// `dispatch_core`; rebuilt by `builder::rebuild` on every target-graph
/// change, with `t_mess` preserved across rebuilds (model::event's
/// write-once semantics).
#[derive(Debug, Default)]
pub struct EventGraph {
    nodes: HashMap<EventId, EventNode>,
    out_edges: HashMap<EventId, Vec<EventEdge>>,
    in_edges: HashMap<EventId, Vec<EventEdge>>,
    /// the Dep event at each train's Einfahrt, i.e. its start node (I2)
    train_starts: HashMap<i64, EventId>,
}

impl EventGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: &EventId) -> Option<&EventNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &EventId) -> Option<&mut EventNode> {
        self.nodes.get_mut(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &EventNode> {
        self.nodes.values()
    }

    pub fn contains(&self, id: &EventId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Inserts a node if absent. If present, mutable fields (disposed
    /// track, predicted time) are refreshed but `t_mess` survives (I8).
    pub fn upsert_node(&mut self, node: EventNode) {
        let id = node.id;
        if let Some(existing) = self.nodes.get_mut(&id) {
            let preserved_mess = existing.t_mess;
            *existing = node;
            existing.t_mess = existing.t_mess.or(preserved_mess);
        } else {
            self.out_edges.entry(id).or_default();
            self.in_edges.entry(id).or_default();
            self.nodes.insert(id, node);
        }
    }

    pub fn remove_node(&mut self, id: &EventId) -> Option<EventNode> {
        self.out_edges.remove(id);
        self.in_edges.remove(id);
        for edges in self.out_edges.values_mut() {
            edges.retain(|e| e.to != *id);
        }
        for edges in self.in_edges.values_mut() {
            edges.retain(|e| e.from != *id);
        }
        self.nodes.remove(id)
    }

    pub fn add_edge(&mut self, edge: EventEdge) {
        self.out_edges.entry(edge.from).or_default().push(edge.clone());
        self.in_edges.entry(edge.to).or_default().push(edge);
    }

    pub fn remove_edge(&mut self, from: &EventId, to: &EventId) {
        if let Some(v) = self.out_edges.get_mut(from) {
            v.retain(|e| e.to != *to);
        }
        if let Some(v) = self.in_edges.get_mut(to) {
            v.retain(|e| e.from != *from);
        }
    }

    pub fn out_edges(&self, id: &EventId) -> &[EventEdge] {
        self.out_edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sets the dispatcher-delay correction on one edge, keeping the
    /// out/in-edge copies in sync.
    pub fn set_edge_dt_fdl(&mut self, from: &EventId, to: &EventId, dt_fdl: Option<f64>) {
        if let Some(v) = self.out_edges.get_mut(from) {
            if let Some(e) = v.iter_mut().find(|e| e.to == *to) {
                e.dt_fdl = dt_fdl;
            }
        }
        if let Some(v) = self.in_edges.get_mut(to) {
            if let Some(e) = v.iter_mut().find(|e| e.from == *from) {
                e.dt_fdl = dt_fdl;
            }
        }
    }

    pub fn in_edges(&self, id: &EventId) -> &[EventEdge] {
        self.in_edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn all_edges(&self) -> impl Iterator<Item = &EventEdge> {
        self.out_edges.values().flatten()
    }

    pub fn set_train_start(&mut self, train_id: i64, start: EventId) {
        self.train_starts.insert(train_id, start);
    }

    pub fn train_start(&self, train_id: i64) -> Option<EventId> {
        self.train_starts.get(&train_id).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = &EventId> {
        self.nodes.keys()
    }

    /// Kahn's-algorithm topological sort, tie-broken deterministically by
    /// `EventId`'s `Display` so output is reproducible across runs.
    pub fn topo_sort(&self) -> Result<Vec<EventId>, Vec<(EventId, EventId)>> {
        let mut in_degree: HashMap<EventId, usize> =
            self.nodes.keys().map(|id| (*id, 0)).collect();
        for edge in self.all_edges() {
            *in_degree.entry(edge.to).or_insert(0) += 1;
        }

        let mut queue: Vec<EventId> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(id, _)| *id)
            .collect();
        queue.sort_by_key(|id| id.to_string());

        let mut order = Vec::with_capacity(self.nodes.len());
        let mut idx = 0;
        while idx < queue.len() {
            let current = queue[idx];
            idx += 1;
            order.push(current);
            let mut newly_free = Vec::new();
            for edge in self.out_edges(&current) {
                let deg = in_degree.get_mut(&edge.to).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    newly_free.push(edge.to);
                }
            }
            newly_free.sort_by_key(|id| id.to_string());
            queue.extend(newly_free);
        }

        if order.len() == self.nodes.len() {
            Ok(order)
        } else {
            let ordered: HashSet<EventId> = order.into_iter().collect();
            let stuck: Vec<EventId> =
                self.nodes.keys().filter(|id| !ordered.contains(id)).copied().collect();
            let stuck_set: HashSet<EventId> = stuck.iter().copied().collect();
            let cycle_edges = self
                .all_edges()
                .filter(|e| stuck_set.contains(&e.from) && stuck_set.contains(&e.to))
                .map(|e| (e.from, e.to))
                .collect();
            Err(cycle_edges)
        }
    }

    /// Breaks cycles deterministically, preferring to remove an edge whose
    /// endpoints belong to different trains (I1), and logs each break.
    pub fn break_cycles(&mut self) {
        loop {
            match self.topo_sort() {
                Ok(_) => break,
                Err(cycle_edges) => {
                    if cycle_edges.is_empty() {
                        break;
                    }
                    let victim = cycle_edges
                        .iter()
                        .find(|(from, to)| from.train_id != to.train_id)
                        .or_else(|| cycle_edges.last())
                        .copied()
                        .unwrap();
                    log::warn!(
                        "breaking cycle in event graph by removing {} -> {}",
                        victim.0,
                        victim.1
                    );
                    self.remove_edge(&victim.0, &victim.1);
                }
            }
        }
    }

    /// Checks whether adding an edge `from -> to` would introduce a cycle,
    /// without mutating the graph.
    pub fn would_create_cycle(&self, from: &EventId, to: &EventId) -> bool {
        if from == to {
            return true;
        }
        let mut stack = vec![*to];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if &current == from {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            for edge in self.out_edges(&current) {
                stack.push(edge.to);
            }
        }
        false
    }
}
