pub mod builder;
pub mod error;
pub mod event_graph;
pub mod ingestor;
pub mod intent;
pub mod prognosis;
pub mod roster_import;
pub mod target_graph;
pub mod train_graph;

use std::collections::HashMap;

use model::config::DispatchParams;
use model::event::{EventEdge, EventEdgeKind, EventNode};
use model::ids::{EventId, EventKind, TargetId, TrainId};
use model::target::{TargetEdge, TargetNode};
use model::time::Minutes;
use model::train::Train;

use error::IntentError;
use event_graph::EventGraph;
use ingestor::{EventIngestor, LiveEvent};
use target_graph::TargetGraph;
use train_graph::TrainGraph;

/// Owns the three coupled graphs and is the sole mutation point of the
/// operational model. Single-threaded, `&mut self` throughout — see the
/// design note on why this is not wrapped in `Arc<RwLock<..>>`.
pub struct DispatchEngine {
    pub train_graph: TrainGraph,
    pub target_graph: TargetGraph,
    pub event_graph: EventGraph,
    pub params: DispatchParams,
    ingestor: EventIngestor,
}

impl DispatchEngine {
    pub fn new(params: DispatchParams) -> Self {
        Self {
            train_graph: TrainGraph::new(),
            target_graph: TargetGraph::new(),
            event_graph: EventGraph::new(),
            params,
            ingestor: EventIngestor::new(),
        }
    }

    /// Applies a fresh train roster, marks any newly-terminated train's
    /// remaining target nodes `Abgefahren`, then rebuilds and re-predicts.
    pub fn refresh_roster(&mut self, roster: Vec<Train>) {
        self.refresh_trains(roster);
        self.rebuild();
    }

    /// Applies a fresh train roster without rebuilding the event graph:
    /// used by callers that still need to fetch each visible train's
    /// fahrplan before calling `replace_target_graph`. Marks any
    /// newly-terminated train's remaining target nodes `Abgefahren`.
    pub fn refresh_trains(&mut self, roster: Vec<Train>) {
        let terminated = self.train_graph.refresh_roster(roster);
        for train_id in terminated {
            self.target_graph.mark_train_terminated(train_id);
        }
    }

    /// Replaces the target graph wholesale (as produced by a roster walk
    /// upstream of this crate) and rebuilds the event graph from it.
    pub fn replace_target_graph(&mut self, target_graph: TargetGraph) {
        self.target_graph = target_graph;
        self.target_graph.insert_ordering_helpers();
        self.target_graph.break_cycles();
        self.rebuild();
    }

    /// Rebuilds the event graph from the current target graph, preserving
    /// every `t_mess` already recorded (I8) plus every dispatcher intent
    /// (`Betriebshalt` insertions, `Abhaengigkeit` dependencies, `dt_fdl`
    /// corrections) applied through the C8 API, then re-runs prognosis.
    pub fn rebuild(&mut self) {
        let mut fresh = builder::rebuild(&self.target_graph, &self.params);

        for id in fresh.ids().copied().collect::<Vec<_>>() {
            if let Some(t_mess) = self.event_graph.node(&id).and_then(|n| n.t_mess) {
                if let Some(node) = fresh.node_mut(&id) {
                    node.t_mess = Some(t_mess);
                }
            }
        }

        let betriebshalte: Vec<(EventId, EventId, EventId, String)> = self
            .event_graph
            .nodes()
            .filter(|n| n.id.kind == EventKind::Betriebshalt)
            .filter_map(|n| {
                let before = self.event_graph.in_edges(&n.id).first()?.from;
                let after = self.event_graph.out_edges(&n.id).first()?.to;
                Some((n.id, before, after, n.plan_track.clone()))
            })
            .collect();
        for (b_id, before, after, plan_track) in betriebshalte {
            let still_consecutive =
                fresh.contains(&before) && fresh.contains(&after) &&
                fresh.out_edges(&before).iter().any(|e| e.to == after);
            if still_consecutive {
                intent::splice_betriebshalt(&mut fresh, b_id, before, after, plan_track);
            } else {
                log::warn!(
                    "dropping dispatcher-inserted Betriebshalt {b_id}: {before} and {after} no longer consecutive after rebuild"
                );
            }
        }

        let dependencies: Vec<EventEdge> = self
            .event_graph
            .all_edges()
            .filter(|e| e.kind == EventEdgeKind::Abhaengigkeit)
            .cloned()
            .collect();
        for edge in dependencies {
            if fresh.contains(&edge.from) && fresh.contains(&edge.to) && !fresh.would_create_cycle(&edge.from, &edge.to) {
                fresh.add_edge(edge);
            } else {
                log::warn!(
                    "dropping dispatcher dependency {} -> {} after rebuild: endpoint missing or would cycle",
                    edge.from, edge.to
                );
            }
        }

        let corrections: Vec<(EventId, EventId, Minutes)> = self
            .event_graph
            .all_edges()
            .filter_map(|e| e.dt_fdl.map(|dt_fdl| (e.from, e.to, dt_fdl)))
            .collect();
        for (from, to, dt_fdl) in corrections {
            fresh.set_edge_dt_fdl(&from, &to, Some(dt_fdl));
        }

        self.event_graph = fresh;
        self.reprognose();
    }

    /// Re-runs the topological prognosis sweep and writes delays back into
    /// the target graph. Called after every mutation that can change timing.
    pub fn reprognose(&mut self) {
        prognosis::run(&mut self.event_graph, &mut self.target_graph);
    }

    /// Applies one live event from the simulator. Returns whether it matched
    /// a node in the event graph.
    pub fn ingest_event(&mut self, event: &LiveEvent) -> bool {
        let matched = self.ingestor.ingest(&mut self.event_graph, &self.train_graph, event);
        if matched {
            self.reprognose();
        }
        matched
    }

    pub fn fixed_delay(&mut self, dep: EventId, minutes: Minutes, relative: bool) -> Result<(), IntentError> {
        intent::fixed_delay(&mut self.event_graph, dep, minutes, relative)?;
        self.reprognose();
        Ok(())
    }

    pub fn wait_for_arrival(
        &mut self,
        target: EventId,
        reference: EventId,
        wait: Minutes,
    ) -> Result<(), IntentError> {
        intent::wait_for_arrival(&mut self.event_graph, target, reference, wait)?;
        self.reprognose();
        Ok(())
    }

    pub fn wait_for_departure(
        &mut self,
        target: EventId,
        reference: EventId,
        wait: Minutes,
    ) -> Result<(), IntentError> {
        intent::wait_for_departure(&mut self.event_graph, target, reference, wait)?;
        self.reprognose();
        Ok(())
    }

    pub fn abort_wait(&mut self, target: EventId, reference: EventId) -> Result<(), IntentError> {
        intent::abort_wait(&mut self.event_graph, target, reference)?;
        self.reprognose();
        Ok(())
    }

    pub fn insert_betriebshalt(
        &mut self,
        train_id: i64,
        before: EventId,
        after: EventId,
        plan_track: impl Into<String>,
    ) -> Result<EventId, IntentError> {
        let id = intent::insert_betriebshalt(&mut self.event_graph, train_id, before, after, plan_track)?;
        self.reprognose();
        Ok(id)
    }

    pub fn delete_dispatch_edge(&mut self, from: EventId, to: EventId) {
        intent::delete_dispatch_edge(&mut self.event_graph, from, to);
        self.reprognose();
    }

    pub fn clear_all_at(&mut self, target: EventId) {
        intent::clear_all_at(&mut self.event_graph, target);
        self.reprognose();
    }

    pub fn train(&self, id: TrainId) -> Option<&Train> {
        self.train_graph.get(id)
    }

    pub fn targets_of(&self, train_id: i64) -> Vec<&TargetNode> {
        let mut out: Vec<&TargetNode> =
            self.target_graph.nodes().filter(|n| n.id.train_id == train_id).collect();
        out.sort_by_key(|n| n.id.time_key);
        out
    }

    pub fn events_of(&self, train_id: i64) -> Vec<&EventNode> {
        let mut out: Vec<&EventNode> =
            self.event_graph.nodes().filter(|n| n.id.train_id == train_id).collect();
        out.sort_by(|a, b| a.id.to_string().cmp(&b.id.to_string()));
        out
    }

    pub fn predicted(&self, event: EventId) -> Option<Minutes> {
        self.event_graph.node(&event).and_then(|n| n.t_eff())
    }

    /// Dumps the target graph as node-link JSON, for debugging on shutdown.
    pub fn dump_target_graph_json(&self) -> serde_json::Result<String> {
        #[derive(serde::Serialize)]
        struct NodeLink<'a> {
            nodes: Vec<&'a TargetNode>,
            edges: Vec<&'a TargetEdge>,
        }
        let snapshot = NodeLink {
            nodes: self.target_graph.nodes().collect(),
            edges: self.target_graph.all_edges().collect(),
        };
        serde_json::to_string_pretty(&snapshot)
    }
}

/// Convenience used by callers that already have a plain `HashMap` roster
/// keyed by train id rather than a `Vec`.
pub fn roster_values(roster: &HashMap<i64, Train>) -> Vec<Train> {
    roster.values().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::ids::EventKind;
    use model::target::{TargetEdgeKind, TargetKind};

    fn tid(train: i64, t: i64, track: &str) -> TargetId {
        TargetId { train_id: train, time_key: t, plan_track: track.into() }
    }

    #[test]
    fn rebuild_preserves_t_mess_across_a_roster_refresh() {
        let mut engine = DispatchEngine::new(DispatchParams::default());
        let mut tg = TargetGraph::new();
        let mut node = TargetNode::new(tid(11, 300, "A1"), TargetKind::Halt, "A1");
        node.p_an = Some(300.0);
        node.p_ab = Some(302.0);
        tg.insert_node(node);
        engine.replace_target_graph(tg);

        let arr = engine.events_of(11).iter().find(|n| n.id.kind == EventKind::Arr).unwrap().id;
        engine.event_graph.node_mut(&arr).unwrap().t_mess = Some(301.0);

        let mut tg2 = TargetGraph::new();
        let mut node2 = TargetNode::new(tid(11, 300, "A1"), TargetKind::Halt, "A1");
        node2.p_an = Some(300.0);
        node2.p_ab = Some(303.0);
        tg2.insert_node(node2);
        engine.replace_target_graph(tg2);

        assert_eq!(engine.event_graph.node(&arr).unwrap().t_mess, Some(301.0));
    }

    #[test]
    fn terminated_train_has_its_remaining_targets_marked_abgefahren() {
        let mut engine = DispatchEngine::new(DispatchParams::default());
        let mut tg = TargetGraph::new();
        let mut node = TargetNode::new(tid(11, 300, "A1"), TargetKind::Halt, "A1");
        node.p_an = Some(300.0);
        node.p_ab = Some(302.0);
        tg.insert_node(node);
        engine.replace_target_graph(tg);

        let mut train11 = Train::new(TrainId::new(11), "RE1", "11");
        train11.sichtbar = true;
        engine.refresh_roster(vec![train11]);
        assert_eq!(
            engine.targets_of(11)[0].status,
            model::target::TargetStatus::Neu,
            "still-visible train's targets are untouched"
        );

        engine.refresh_roster(vec![]);
        assert_eq!(engine.targets_of(11)[0].status, model::target::TargetStatus::Abgefahren);
    }

    #[test]
    fn s6_cycle_rejection_leaves_no_edge_behind() {
        let mut engine = DispatchEngine::new(DispatchParams::default());
        let mut tg = TargetGraph::new();
        let mut a = TargetNode::new(tid(1, 0, "A"), TargetKind::Halt, "A");
        a.p_an = Some(0.0);
        a.p_ab = Some(1.0);
        tg.insert_node(a);
        let mut b = TargetNode::new(tid(2, 0, "B"), TargetKind::Halt, "B");
        b.p_an = Some(0.0);
        b.p_ab = Some(1.0);
        tg.insert_node(b);
        engine.replace_target_graph(tg);

        let dep_a = engine.events_of(1).iter().find(|n| n.id.kind == EventKind::Dep).unwrap().id;
        let arr_a = engine.events_of(1).iter().find(|n| n.id.kind == EventKind::Arr).unwrap().id;
        let dep_b = engine.events_of(2).iter().find(|n| n.id.kind == EventKind::Dep).unwrap().id;
        let arr_b = engine.events_of(2).iter().find(|n| n.id.kind == EventKind::Arr).unwrap().id;

        assert!(engine.wait_for_arrival(dep_a, arr_b, 0.0).is_ok());
        let result = engine.wait_for_arrival(dep_b, arr_a, 0.0);
        assert_eq!(result, Err(IntentError::CycleIntroduced));
        assert!(engine.event_graph.in_edges(&dep_b).iter().all(|e| e.from != arr_a));
    }

    fn s1_replacement_graph() -> TargetGraph {
        let mut tg = TargetGraph::new();
        let mut entry = TargetNode::new(tid(11, 300, "Agl1"), TargetKind::Einfahrt, "Agl1");
        entry.p_ab = Some(300.0);
        tg.insert_node(entry);

        let mut a1 = TargetNode::new(tid(11, 322, "A1"), TargetKind::Durchfahrt, "A1");
        a1.p_an = Some(322.0);
        a1.p_ab = Some(322.0);
        tg.insert_node(a1);

        let mut b1 = TargetNode::new(tid(11, 332, "B1"), TargetKind::Halt, "B1");
        b1.p_an = Some(332.0);
        b1.p_ab = Some(333.0);
        tg.insert_node(b1);

        let mut c1_in = TargetNode::new(tid(12, 336, "B1"), TargetKind::Halt, "B1");
        c1_in.p_an = Some(336.0);
        c1_in.p_ab = Some(336.0);
        tg.insert_node(c1_in);

        let mut c1 = TargetNode::new(tid(12, 345, "C1"), TargetKind::Ausfahrt, "C1");
        c1.p_an = Some(345.0);
        tg.insert_node(c1);

        tg.add_edge(TargetEdge::new(tid(11, 300, "Agl1"), tid(11, 322, "A1"), TargetEdgeKind::Planfahrt));
        tg.add_edge(TargetEdge::new(tid(11, 322, "A1"), tid(11, 332, "B1"), TargetEdgeKind::Planfahrt));
        tg.add_edge(TargetEdge::new(tid(11, 332, "B1"), tid(12, 336, "B1"), TargetEdgeKind::Ersatz));
        tg.add_edge(TargetEdge::new(tid(12, 336, "B1"), tid(12, 345, "C1"), TargetEdgeKind::Planfahrt));
        tg
    }

    #[test]
    fn s4_dispatcher_dependency_delays_replacement_then_lifts() {
        let mut engine = DispatchEngine::new(DispatchParams::default());
        engine.replace_target_graph(s1_replacement_graph());

        let arr_11_b1 = engine
            .events_of(11)
            .iter()
            .find(|n| n.id.kind == EventKind::Arr && n.plan_track == "B1")
            .unwrap()
            .id;
        let dep_12_b1 = engine
            .events_of(12)
            .iter()
            .find(|n| n.id.kind == EventKind::Dep && n.plan_track == "B1")
            .unwrap()
            .id;
        let arr_12_c1 = engine.events_of(12).iter().find(|n| n.id.kind == EventKind::Arr).unwrap().id;

        engine.wait_for_arrival(dep_12_b1, arr_11_b1, 5.0).unwrap();
        assert_eq!(engine.predicted(dep_12_b1), Some(337.0));
        assert_eq!(engine.predicted(arr_12_c1), Some(346.0));

        // a periodic Tick re-replaces the target graph with unchanged data;
        // the dependency must survive the ensuing rebuild
        engine.replace_target_graph(s1_replacement_graph());
        assert_eq!(engine.predicted(dep_12_b1), Some(337.0));
        assert_eq!(engine.predicted(arr_12_c1), Some(346.0));

        engine.delete_dispatch_edge(arr_11_b1, dep_12_b1);
        assert_eq!(engine.predicted(dep_12_b1), Some(336.0));
        assert_eq!(engine.predicted(arr_12_c1), Some(345.0));
    }

    #[test]
    fn s5_early_departure_pull_permitted_by_dwell() {
        let mut engine = DispatchEngine::new(DispatchParams::default());
        let mut tg = TargetGraph::new();
        let mut through = TargetNode::new(tid(1, 103, "X1"), TargetKind::Durchfahrt, "X1");
        through.p_an = Some(100.0);
        through.p_ab = Some(103.0);
        tg.insert_node(through);
        engine.replace_target_graph(tg);

        let dep = engine.events_of(1).iter().find(|n| n.id.kind == EventKind::Dep).unwrap().id;
        engine.fixed_delay(dep, -3.0, true).unwrap();
        assert_eq!(engine.predicted(dep), Some(100.0));
    }

    #[test]
    fn s5_early_departure_pull_clamped_to_minimum_dwell() {
        let mut engine = DispatchEngine::new(DispatchParams::default());
        let mut tg = TargetGraph::new();
        let mut halt = TargetNode::new(tid(1, 103, "X1"), TargetKind::Halt, "X1");
        halt.p_an = Some(100.0);
        halt.p_ab = Some(103.0);
        halt.d_min = 2.0;
        tg.insert_node(halt);
        engine.replace_target_graph(tg);

        let dep = engine.events_of(1).iter().find(|n| n.id.kind == EventKind::Dep).unwrap().id;
        engine.fixed_delay(dep, -5.0, true).unwrap();
        assert_eq!(engine.predicted(dep), Some(102.0));
    }

    #[test]
    fn p1_event_graph_stays_acyclic_after_every_mutation() {
        let mut engine = DispatchEngine::new(DispatchParams::default());
        engine.replace_target_graph(s1_replacement_graph());
        assert!(engine.event_graph.topo_sort().is_ok());

        let arr_11_b1 = engine
            .events_of(11)
            .iter()
            .find(|n| n.id.kind == EventKind::Arr && n.plan_track == "B1")
            .unwrap()
            .id;
        let dep_12_b1 = engine
            .events_of(12)
            .iter()
            .find(|n| n.id.kind == EventKind::Dep && n.plan_track == "B1")
            .unwrap()
            .id;
        engine.wait_for_arrival(dep_12_b1, arr_11_b1, 5.0).unwrap();
        assert!(engine.event_graph.topo_sort().is_ok());

        let mut train11 = Train::new(TrainId::new(11), "RE1", "11");
        train11.sichtbar = true;
        engine.refresh_roster(vec![train11]);
        engine.ingest_event(&crate::ingestor::LiveEvent {
            train_id: 11,
            kind: crate::ingestor::LiveEventKind::Einfahrt,
            time: 305.0,
            plan_track: Some("Agl1".into()),
            am_gleis: true,
            delay: None,
        });
        assert!(engine.event_graph.topo_sort().is_ok());
    }

    #[test]
    fn p3_prognosis_is_monotone_in_entry_delay() {
        let mut low = DispatchEngine::new(DispatchParams::default());
        low.replace_target_graph(s1_replacement_graph());
        let mut high = DispatchEngine::new(DispatchParams::default());
        high.replace_target_graph(s1_replacement_graph());

        let start_low = low.event_graph.train_start(11).unwrap();
        low.event_graph.node_mut(&start_low).unwrap().t_mess = Some(300.0);
        low.reprognose();

        let start_high = high.event_graph.train_start(11).unwrap();
        high.event_graph.node_mut(&start_high).unwrap().t_mess = Some(310.0);
        high.reprognose();

        let arr_12_c1_low = low.events_of(12).iter().find(|n| n.id.kind == EventKind::Arr).unwrap().id;
        let arr_12_c1_high = high.events_of(12).iter().find(|n| n.id.kind == EventKind::Arr).unwrap().id;
        assert!(high.predicted(arr_12_c1_high).unwrap() >= low.predicted(arr_12_c1_low).unwrap());
    }

    #[test]
    fn p7_rebuild_is_idempotent_without_new_roster_data() {
        let mut engine = DispatchEngine::new(DispatchParams::default());
        engine.replace_target_graph(s1_replacement_graph());

        let arr = engine.events_of(11).iter().find(|n| n.id.kind == EventKind::Arr && n.plan_track == "A1").unwrap().id;
        engine.event_graph.node_mut(&arr).unwrap().t_mess = Some(325.0);

        let before: std::collections::HashMap<EventId, Option<f64>> =
            engine.event_graph.ids().map(|id| (*id, engine.event_graph.node(id).unwrap().t_mess)).collect();
        engine.rebuild();
        let after: std::collections::HashMap<EventId, Option<f64>> =
            engine.event_graph.ids().map(|id| (*id, engine.event_graph.node(id).unwrap().t_mess)).collect();

        assert_eq!(before, after);
        assert_eq!(engine.event_graph.node(&arr).unwrap().t_mess, Some(325.0));
    }

    #[test]
    fn p7_rebuild_preserves_dependency_edge_dt_fdl_and_betriebshalt() {
        let mut engine = DispatchEngine::new(DispatchParams::default());
        engine.replace_target_graph(s1_replacement_graph());

        let arr_11_b1 = engine
            .events_of(11)
            .iter()
            .find(|n| n.id.kind == EventKind::Arr && n.plan_track == "B1")
            .unwrap()
            .id;
        let dep_12_b1 = engine
            .events_of(12)
            .iter()
            .find(|n| n.id.kind == EventKind::Dep && n.plan_track == "B1")
            .unwrap()
            .id;
        engine.wait_for_arrival(dep_12_b1, arr_11_b1, 5.0).unwrap();

        let dep_11_a1 = engine
            .events_of(11)
            .iter()
            .find(|n| n.id.kind == EventKind::Dep && n.plan_track == "A1")
            .unwrap()
            .id;
        engine.fixed_delay(dep_11_a1, 2.0, true).unwrap();

        let dep_11_agl1 = engine.event_graph.train_start(11).unwrap();
        let arr_11_a1 = engine
            .events_of(11)
            .iter()
            .find(|n| n.id.kind == EventKind::Arr && n.plan_track == "A1")
            .unwrap()
            .id;
        let b_id = engine.insert_betriebshalt(11, dep_11_agl1, arr_11_a1, "Z1").unwrap();

        engine.rebuild();

        assert!(
            engine.event_graph.in_edges(&dep_12_b1).iter().any(|e| e.from == arr_11_b1 && e.kind == EventEdgeKind::Abhaengigkeit),
            "dispatcher dependency must survive a rebuild"
        );
        let dwell_edge = engine.event_graph.in_edges(&dep_11_a1).iter().find(|e| e.kind == EventEdgeKind::Aufenthalt).unwrap();
        assert_eq!(dwell_edge.dt_fdl, Some(2.0), "fixed-delay correction must survive a rebuild");
        assert!(engine.event_graph.contains(&b_id), "Betriebshalt node must survive a rebuild");
        assert!(engine.event_graph.out_edges(&dep_11_agl1).iter().any(|e| e.to == b_id));
        assert!(engine.event_graph.out_edges(&b_id).iter().any(|e| e.to == arr_11_a1));
    }

    #[test]
    fn p8_round_trip_prognosis_is_stable() {
        let mut engine = DispatchEngine::new(DispatchParams::default());
        engine.replace_target_graph(s1_replacement_graph());

        let snapshot_before: Vec<(EventId, Option<f64>)> =
            engine.event_graph.nodes().map(|n| (n.id, n.t_eff())).collect();

        engine.reprognose();

        let mut snapshot_after: Vec<(EventId, Option<f64>)> =
            engine.event_graph.nodes().map(|n| (n.id, n.t_eff())).collect();
        let mut snapshot_before = snapshot_before;
        snapshot_before.sort_by_key(|(id, _)| id.to_string());
        snapshot_after.sort_by_key(|(id, _)| id.to_string());
        assert_eq!(snapshot_before, snapshot_after);
    }
}
