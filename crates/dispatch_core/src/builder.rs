use std::collections::HashMap;

use model::config::DispatchParams;
use model::event::{EventEdge, EventEdgeKind, EventNode};
use model::ids::{EventId, EventKind, TargetId};
use model::target::{TargetEdgeKind, TargetKind};

use crate::event_graph::EventGraph;
use crate::target_graph::TargetGraph;

/// Which events a target's node builder produced, so edge builders can find
/// "the first event" / "the last event" of a target after E/K/F rewiring.
#[derive(Debug, Default, Clone, Copy)]
struct Skeleton {
    arr: Option<EventId>,
    dep: Option<EventId>,
}

impl Skeleton {
    fn first(&self) -> Option<EventId> {
        self.arr.or(self.dep)
    }

    fn last(&self) -> Option<EventId> {
        self.dep.or(self.arr)
    }
}

struct IdAllocator {
    next: HashMap<(i64, EventKind), u32>,
}

impl IdAllocator {
    fn new() -> Self {
        Self { next: HashMap::new() }
    }

    fn alloc(&mut self, train_id: i64, kind: EventKind) -> EventId {
        let seq = self.next.entry((train_id, kind)).or_insert(0);
        let id = EventId { train_id, kind, seq: *seq };
        *seq += 1;
        id
    }
}

/// Rebuilds the event graph from the target graph, per the two-phase
/// node-builder / edge-builder translation: first every target spawns its
/// event-node skeleton, then every target edge both emits event edges and
/// rewires the skeletons it touches (Ersatz/Kupplung/Fluegelung).
pub fn rebuild(target_graph: &TargetGraph, params: &DispatchParams) -> EventGraph {
    let mut graph = EventGraph::new();
    let mut alloc = IdAllocator::new();
    let mut skeletons: HashMap<TargetId, Skeleton> = HashMap::new();

    let mut targets: Vec<_> = target_graph.nodes().collect();
    targets.sort_by(|a, b| {
        (a.id.train_id, a.id.time_key, a.id.plan_track.as_str())
            .cmp(&(b.id.train_id, b.id.time_key, b.id.plan_track.as_str()))
    });

    // phase 1: node builders
    for target in &targets {
        let mut skeleton = Skeleton::default();
        let wants_arr = !matches!(target.kind, TargetKind::Einfahrt);
        let wants_dep = !matches!(target.kind, TargetKind::Ausfahrt);

        if wants_arr {
            let id = alloc.alloc(target.id.train_id, EventKind::Arr);
            let mut node = EventNode::new(id, target.plan_track.clone());
            node.target_id = Some(target.id.clone());
            node.disposed_track = target.disposed_track.clone();
            node.t_plan = target.p_an;
            graph.upsert_node(node);
            skeleton.arr = Some(id);
        }
        if wants_dep {
            let id = alloc.alloc(target.id.train_id, EventKind::Dep);
            let mut node = EventNode::new(id, target.plan_track.clone());
            node.target_id = Some(target.id.clone());
            node.disposed_track = target.disposed_track.clone();
            node.t_plan = target.p_ab;
            graph.upsert_node(node);
            skeleton.dep = Some(id);

            if matches!(target.kind, TargetKind::Einfahrt) {
                graph.set_train_start(target.id.train_id, id);
            }
        }

        if let (Some(arr), Some(dep)) = (skeleton.arr, skeleton.dep) {
            graph.add_edge(EventEdge::new(arr, dep, EventEdgeKind::Aufenthalt, target.d_min));
        }

        skeletons.insert(target.id.clone(), skeleton);
    }

    // phase 2: edge builders. Ersatz/Kupplung/Fluegelung rewire skeletons
    // before Planfahrt edges are resolved against them.
    for edge in target_graph.all_edges() {
        match edge.kind {
            TargetEdgeKind::Ersatz => {
                build_ersatz(&mut graph, &mut alloc, &mut skeletons, edge, target_graph, params)
            }
            TargetEdgeKind::Kupplung => {
                build_kupplung(&mut graph, &mut alloc, &mut skeletons, edge, target_graph, params)
            }
            TargetEdgeKind::Fluegelung => {
                build_fluegelung(&mut graph, &mut alloc, &mut skeletons, edge, target_graph, params)
            }
            _ => {}
        }
    }

    for edge in target_graph.all_edges() {
        let kind = match edge.kind {
            TargetEdgeKind::Planfahrt => EventEdgeKind::Planfahrt,
            TargetEdgeKind::Ordnung => EventEdgeKind::Ordnung,
            _ => continue,
        };
        let (Some(from_id), Some(to_id)) = (
            skeletons.get(&edge.from).and_then(Skeleton::last),
            skeletons.get(&edge.to).and_then(Skeleton::first),
        ) else {
            continue;
        };
        let dt_min = if kind == EventEdgeKind::Ordnung {
            0.0
        } else {
            let from_target = target_graph.node(&edge.from);
            let to_target = target_graph.node(&edge.to);
            match (from_target.and_then(|t| t.p_ab.or(t.p_an)), to_target.and_then(|t| t.p_an.or(t.p_ab))) {
                (Some(from_t), Some(to_t)) => (to_t - from_t).max(0.0),
                _ => 0.0,
            }
        };
        graph.add_edge(EventEdge::new(from_id, to_id, kind, dt_min));
    }

    graph
}

fn build_ersatz(
    graph: &mut EventGraph,
    alloc: &mut IdAllocator,
    skeletons: &mut HashMap<TargetId, Skeleton>,
    edge: &model::target::TargetEdge,
    target_graph: &TargetGraph,
    params: &DispatchParams,
) {
    let z1 = edge.from.clone();
    let z2 = edge.to.clone();
    let Some(sk1) = skeletons.get(&z1).copied() else { return };
    let Some(sk2) = skeletons.get(&z2).copied() else { return };
    let (Some(arr1), Some(dep1)) = (sk1.arr, sk1.dep) else { return };
    let Some(dep2) = sk2.dep else { return };

    graph.remove_edge(&arr1, &dep1);
    graph.remove_node(&dep1);
    if let Some(arr2) = sk2.arr {
        graph.remove_edge(&arr2, &dep2);
        graph.remove_node(&arr2);
    }

    let e_id = alloc.alloc(z1.train_id, EventKind::Ersatz);
    let mut e_node = EventNode::new(e_id, edge.to.plan_track.clone());
    e_node.target_id = Some(z1.clone());
    e_node.t_plan = target_graph.node(&z2).and_then(|t| t.p_ab);
    graph.upsert_node(e_node);

    graph.add_edge(EventEdge::new(arr1, e_id, EventEdgeKind::Ersatz, params.mindestaufenthalt_ersatz));
    graph.add_edge(EventEdge::new(e_id, dep2, EventEdgeKind::Ersatz, 0.0));

    skeletons.insert(z1, Skeleton { arr: Some(arr1), dep: Some(e_id) });
    skeletons.insert(z2, Skeleton { arr: None, dep: Some(dep2) });
}

fn build_kupplung(
    graph: &mut EventGraph,
    alloc: &mut IdAllocator,
    skeletons: &mut HashMap<TargetId, Skeleton>,
    edge: &model::target::TargetEdge,
    target_graph: &TargetGraph,
    params: &DispatchParams,
) {
    let z1 = edge.from.clone();
    let z2 = edge.to.clone();
    let Some(sk1) = skeletons.get(&z1).copied() else { return };
    let Some(sk2) = skeletons.get(&z2).copied() else { return };
    let (Some(arr1), Some(dep1)) = (sk1.arr, sk1.dep) else { return };
    let (Some(arr2), Some(dep2)) = (sk2.arr, sk2.dep) else { return };

    graph.remove_edge(&arr1, &dep1);
    graph.remove_node(&dep1);
    graph.remove_edge(&arr2, &dep2);

    let k_id = alloc.alloc(z2.train_id, EventKind::Kupplung);
    let mut k_node = EventNode::new(k_id, edge.to.plan_track.clone());
    k_node.target_id = Some(z2.clone());
    let bereitschaft1 = target_graph.node(&z1).and_then(|t| t.p_an).map(|p| p + params.mindestaufenthalt_kupplung);
    let bereitschaft2 = target_graph.node(&z2).and_then(|t| t.p_an).map(|p| p + params.mindestaufenthalt_kupplung);
    k_node.t_plan = match (bereitschaft1, bereitschaft2) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    };
    graph.upsert_node(k_node);

    graph.add_edge(EventEdge::new(arr1, k_id, EventEdgeKind::Kupplung, params.mindestaufenthalt_kupplung));
    graph.add_edge(EventEdge::new(arr2, k_id, EventEdgeKind::Kupplung, params.mindestaufenthalt_kupplung));
    graph.add_edge(EventEdge::new(k_id, dep2, EventEdgeKind::Kupplung, 0.0));

    skeletons.insert(z1, Skeleton { arr: Some(arr1), dep: Some(k_id) });
    skeletons.insert(z2, Skeleton { arr: Some(arr2), dep: Some(dep2) });
}

fn build_fluegelung(
    graph: &mut EventGraph,
    alloc: &mut IdAllocator,
    skeletons: &mut HashMap<TargetId, Skeleton>,
    edge: &model::target::TargetEdge,
    target_graph: &TargetGraph,
    params: &DispatchParams,
) {
    let z1 = edge.from.clone();
    let z2 = edge.to.clone();
    let Some(sk1) = skeletons.get(&z1).copied() else { return };
    let Some(sk2) = skeletons.get(&z2).copied() else { return };
    let (Some(arr1), Some(dep1)) = (sk1.arr, sk1.dep) else { return };
    let Some(dep2) = sk2.dep else { return };

    graph.remove_edge(&arr1, &dep1);
    if let Some(arr2) = sk2.arr {
        graph.remove_edge(&arr2, &dep2);
        graph.remove_node(&arr2);
    }

    let f_id = alloc.alloc(z1.train_id, EventKind::Fluegelung);
    let mut f_node = EventNode::new(f_id, edge.from.plan_track.clone());
    f_node.target_id = Some(z1.clone());
    f_node.t_plan = target_graph
        .node(&z1)
        .and_then(|t| t.p_an)
        .map(|p_an| p_an + params.mindestaufenthalt_fluegelung);
    graph.upsert_node(f_node);

    graph.add_edge(EventEdge::new(arr1, f_id, EventEdgeKind::Fluegelung, params.mindestaufenthalt_fluegelung));
    graph.add_edge(EventEdge::new(f_id, dep1, EventEdgeKind::Fluegelung, 0.0));
    graph.add_edge(EventEdge::new(f_id, dep2, EventEdgeKind::Fluegelung, 0.0));

    skeletons.insert(z1, Skeleton { arr: Some(arr1), dep: Some(dep1) });
    skeletons.insert(z2, Skeleton { arr: None, dep: Some(dep2) });
}
