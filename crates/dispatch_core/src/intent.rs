use model::event::{EventEdge, EventEdgeKind};
use model::ids::{EventId, EventKind};
use model::time::Minutes;

use crate::error::IntentError;
use crate::event_graph::EventGraph;

/// Sets (or offsets) a fixed departure delay on `dep`, by writing `dt_fdl`
/// on its dwell edge (the H-edge whose originating Arr feeds it).
pub fn fixed_delay(
    graph: &mut EventGraph,
    dep: EventId,
    minutes: Minutes,
    relative: bool,
) -> Result<(), IntentError> {
    if !graph.contains(&dep) {
        return Err(IntentError::UnknownEvent(dep));
    }
    let dwell_edge = graph
        .in_edges(&dep)
        .iter()
        .find(|e| {
            matches!(
                e.kind,
                EventEdgeKind::Aufenthalt
                    | EventEdgeKind::Ersatz
                    | EventEdgeKind::Kupplung
                    | EventEdgeKind::Fluegelung
                    | EventEdgeKind::Betriebshalt
            )
        })
        .map(|e| (e.from, e.dt_fdl));

    let Some((from, existing)) = dwell_edge else {
        return Err(IntentError::UnknownEvent(dep));
    };

    let value = if relative { existing.unwrap_or(0.0) + minutes } else { minutes };
    graph.set_edge_dt_fdl(&from, &dep, Some(value));
    Ok(())
}

/// Adds a dependency edge Arr(reference) -> Dep(target) with `dt_min = wait`.
/// Rejected if it would introduce a cycle.
pub fn wait_for_arrival(
    graph: &mut EventGraph,
    target: EventId,
    reference: EventId,
    wait: Minutes,
) -> Result<(), IntentError> {
    add_dependency(graph, reference, target, wait)
}

/// Adds a dependency edge Dep(reference) -> Dep(target) with `dt_min = wait`.
pub fn wait_for_departure(
    graph: &mut EventGraph,
    target: EventId,
    reference: EventId,
    wait: Minutes,
) -> Result<(), IntentError> {
    add_dependency(graph, reference, target, wait)
}

fn add_dependency(
    graph: &mut EventGraph,
    from: EventId,
    to: EventId,
    wait: Minutes,
) -> Result<(), IntentError> {
    if !graph.contains(&from) {
        return Err(IntentError::UnknownEvent(from));
    }
    if !graph.contains(&to) {
        return Err(IntentError::UnknownEvent(to));
    }
    if graph.would_create_cycle(&from, &to) {
        return Err(IntentError::CycleIntroduced);
    }
    graph.add_edge(EventEdge::new(from, to, EventEdgeKind::Abhaengigkeit, wait));
    Ok(())
}

/// Cancels an automatic E/K/F wait (or a prior dispatcher dependency) between
/// `reference` and `target` by pulling the edge's `dt_fdl` down to cancel its
/// `dt_min`.
pub fn abort_wait(
    graph: &mut EventGraph,
    target: EventId,
    reference: EventId,
) -> Result<(), IntentError> {
    let dt_min = graph
        .in_edges(&target)
        .iter()
        .find(|e| e.from == reference)
        .map(|e| e.dt_min);

    let Some(dt_min) = dt_min else {
        return Err(IntentError::UnknownEvent(target));
    };
    graph.set_edge_dt_fdl(&reference, &target, Some(-dt_min));
    Ok(())
}

/// Inserts a Betriebshalt event between two consecutive events of the same
/// train, splicing it into the edge that directly connects them.
pub fn insert_betriebshalt(
    graph: &mut EventGraph,
    train_id: i64,
    before: EventId,
    after: EventId,
    plan_track: impl Into<String>,
) -> Result<EventId, IntentError> {
    if !graph.contains(&before) {
        return Err(IntentError::UnknownEvent(before));
    }
    if !graph.contains(&after) {
        return Err(IntentError::UnknownEvent(after));
    }
    let direct = graph.out_edges(&before).iter().any(|e| e.to == after);
    if !direct {
        return Err(IntentError::UnknownEvent(after));
    }

    let seq = (0..).find(|seq| {
        !graph.contains(&EventId { train_id, kind: EventKind::Betriebshalt, seq: *seq })
    }).unwrap();
    let b_id = EventId { train_id, kind: EventKind::Betriebshalt, seq };

    splice_betriebshalt(graph, b_id, before, after, plan_track);
    Ok(b_id)
}

/// Splices a (possibly already-allocated) Betriebshalt node `b_id` between
/// `before` and `after`, replacing the direct edge with two Betriebshalt
/// edges. Used both by `insert_betriebshalt` and by `DispatchEngine::rebuild`
/// to re-splice a dispatcher-inserted stop after the target graph has been
/// regenerated.
pub(crate) fn splice_betriebshalt(
    graph: &mut EventGraph,
    b_id: EventId,
    before: EventId,
    after: EventId,
    plan_track: impl Into<String>,
) {
    let mut node = model::event::EventNode::new(b_id, plan_track);
    node.quelle = model::target::Quelle::Fdl;
    graph.upsert_node(node);

    graph.remove_edge(&before, &after);
    graph.add_edge(EventEdge::new(before, b_id, EventEdgeKind::Betriebshalt, 0.0));
    graph.add_edge(EventEdge::new(b_id, after, EventEdgeKind::Betriebshalt, 0.0));
}

/// Removes one dispatcher-added dependency edge.
pub fn delete_dispatch_edge(graph: &mut EventGraph, from: EventId, to: EventId) {
    graph.remove_edge(&from, &to);
}

/// Removes every dispatcher dependency edge ending at `target`.
pub fn clear_all_at(graph: &mut EventGraph, target: EventId) {
    let dispatcher_sources: Vec<EventId> = graph
        .in_edges(&target)
        .iter()
        .filter(|e| e.kind == EventEdgeKind::Abhaengigkeit)
        .map(|e| e.from)
        .collect();
    for from in dispatcher_sources {
        graph.remove_edge(&from, &target);
    }
}
