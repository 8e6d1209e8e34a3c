use std::collections::{HashMap, HashSet};

use model::ids::TargetId;
use model::target::{TargetEdge, TargetEdgeKind, TargetNode, TargetStatus};

/// One planned stop/through-point/entry/exit of every train, linked by
/// planned-travel and operational-event edges. Rebuilt wholesale on every
/// roster refresh. Dispatcher intent never touches this graph: the C8 API
/// operates entirely on the event graph, and `DispatchEngine::rebuild`
/// re-splices `Betriebshalt` nodes and re-applies `Abhaengigkeit` edges and
/// `dt_fdl` corrections there after this graph is replaced.
#[derive(Debug, Default)]
pub struct TargetGraph {
    nodes: HashMap<TargetId, TargetNode>,
    out_edges: HashMap<TargetId, Vec<TargetEdge>>,
    in_edges: HashMap<TargetId, Vec<TargetEdge>>,
}

impl TargetGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: &TargetId) -> Option<&TargetNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &TargetId) -> Option<&mut TargetNode> {
        self.nodes.get_mut(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TargetNode> {
        self.nodes.values()
    }

    pub fn insert_node(&mut self, node: TargetNode) {
        let id = node.id.clone();
        self.out_edges.entry(id.clone()).or_default();
        self.in_edges.entry(id.clone()).or_default();
        self.nodes.insert(id, node);
    }

    pub fn out_edges(&self, id: &TargetId) -> &[TargetEdge] {
        self.out_edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn in_edges(&self, id: &TargetId) -> &[TargetEdge] {
        self.in_edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn all_edges(&self) -> impl Iterator<Item = &TargetEdge> {
        self.out_edges.values().flatten()
    }

    pub fn add_edge(&mut self, edge: TargetEdge) {
        self.out_edges.entry(edge.from.clone()).or_default().push(edge.clone());
        self.in_edges.entry(edge.to.clone()).or_default().push(edge);
    }

    pub fn remove_edges_ending_at(&mut self, target: &TargetId) -> Vec<TargetEdge> {
        let removed = self.in_edges.remove(target).unwrap_or_default();
        self.in_edges.insert(target.clone(), Vec::new());
        for edge in &removed {
            if let Some(v) = self.out_edges.get_mut(&edge.from) {
                v.retain(|e| !(e.to == *target && e.kind == edge.kind));
            }
        }
        removed
    }

    pub fn remove_edge(&mut self, from: &TargetId, to: &TargetId, kind: TargetEdgeKind) {
        if let Some(v) = self.out_edges.get_mut(from) {
            v.retain(|e| !(e.to == *to && e.kind == kind));
        }
        if let Some(v) = self.in_edges.get_mut(to) {
            v.retain(|e| !(e.from == *from && e.kind == kind));
        }
    }

    /// Marks every target node of a terminated train `Abgefahren`, since no
    /// further arrival/departure events for it will ever be observed.
    pub fn mark_train_terminated(&mut self, train_id: i64) {
        for node in self.nodes.values_mut().filter(|n| n.id.train_id == train_id) {
            node.status = TargetStatus::Abgefahren;
        }
    }

    /// After all Kupplung edges of a rebuild have been added, insert helper
    /// 'O' edges: for a coupling z1 -> z2, every predecessor of z2 along an
    /// operational edge must be visited before z1, so the continuing
    /// train's stem is always scheduled first.
    pub fn insert_ordering_helpers(&mut self) {
        let kupplung_edges: Vec<TargetEdge> = self
            .all_edges()
            .filter(|e| e.kind == TargetEdgeKind::Kupplung)
            .cloned()
            .collect();

        for edge in kupplung_edges {
            let predecessors: Vec<TargetId> = self
                .in_edges(&edge.to)
                .iter()
                .filter(|e| {
                    matches!(
                        e.kind,
                        TargetEdgeKind::Planfahrt
                            | TargetEdgeKind::Ersatz
                            | TargetEdgeKind::Fluegelung
                            | TargetEdgeKind::Kupplung
                    )
                })
                .map(|e| e.from.clone())
                .collect();

            for p in predecessors {
                if p != edge.from {
                    self.add_edge(TargetEdge::new(p, edge.from.clone(), TargetEdgeKind::Ordnung));
                }
            }
        }
    }

    /// Topologically sorts the graph (Kahn's algorithm). Returns the
    /// offending cycle (as a list of edges) if the graph is not a DAG.
    pub fn topo_sort(&self) -> Result<Vec<TargetId>, Vec<TargetEdge>> {
        let mut in_degree: HashMap<TargetId, usize> =
            self.nodes.keys().map(|id| (id.clone(), 0)).collect();
        for edge in self.all_edges() {
            *in_degree.entry(edge.to.clone()).or_insert(0) += 1;
        }

        let mut queue: Vec<TargetId> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(id, _)| id.clone())
            .collect();
        queue.sort_by(|a, b| a.to_string().cmp(&b.to_string()));

        let mut order = Vec::with_capacity(self.nodes.len());
        let mut queue_idx = 0;
        while queue_idx < queue.len() {
            let current = queue[queue_idx].clone();
            queue_idx += 1;
            order.push(current.clone());
            let mut newly_free = Vec::new();
            for edge in self.out_edges(&current) {
                let deg = in_degree.get_mut(&edge.to).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    newly_free.push(edge.to.clone());
                }
            }
            newly_free.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
            queue.extend(newly_free);
        }

        if order.len() == self.nodes.len() {
            Ok(order)
        } else {
            let stuck: HashSet<TargetId> = self.nodes.keys().cloned().collect::<HashSet<_>>()
                .difference(&order.iter().cloned().collect())
                .cloned()
                .collect();
            let cycle_edges = self
                .all_edges()
                .filter(|e| stuck.contains(&e.from) && stuck.contains(&e.to))
                .cloned()
                .collect();
            Err(cycle_edges)
        }
    }

    /// Repeatedly removes the edge whose endpoints belong to different
    /// trains from the reported cycle set, until the graph is acyclic.
    /// Returns the edges that were removed, for logging.
    pub fn break_cycles(&mut self) -> Vec<TargetEdge> {
        let mut removed = Vec::new();
        loop {
            match self.topo_sort() {
                Ok(_) => break,
                Err(cycle_edges) => {
                    if cycle_edges.is_empty() {
                        break;
                    }
                    let victim = cycle_edges
                        .iter()
                        .find(|e| e.from.train_id != e.to.train_id)
                        .or_else(|| cycle_edges.last())
                        .cloned()
                        .unwrap();
                    log::warn!(
                        "breaking cycle in target graph by removing {} -> {}",
                        victim.from,
                        victim.to
                    );
                    self.remove_edge(&victim.from, &victim.to, victim.kind);
                    removed.push(victim);
                }
            }
        }
        removed
    }

    /// Checks whether adding the given edge would introduce a cycle,
    /// without mutating the graph.
    pub fn would_create_cycle(&self, from: &TargetId, to: &TargetId) -> bool {
        if from == to {
            return true;
        }
        let mut stack = vec![to.clone()];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if &current == from {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            for edge in self.out_edges(&current) {
                stack.push(edge.to.clone());
            }
        }
        false
    }
}
