use model::event::EventEdgeKind;
use model::ids::EventKind;
use model::target::{TargetKind, TargetStatus};
use model::time::Minutes;

use crate::event_graph::EventGraph;
use crate::target_graph::TargetGraph;

fn clamp(target: Minutes, min: Minutes, max: Minutes) -> Minutes {
    let lower_bound = target.max(min);
    if lower_bound > max {
        max.max(min)
    } else {
        lower_bound
    }
}

/// Runs one topological sweep over the event graph, propagating measured
/// and planned times through min/max/dispatcher-delay constraints, then
/// writes the resulting delays back into the target graph.
pub fn run(events: &mut EventGraph, targets: &mut TargetGraph) {
    events.break_cycles();

    let order = match events.topo_sort() {
        Ok(order) => order,
        Err(_) => {
            log::error!("event graph still cyclic after break_cycles, aborting prognosis");
            return;
        }
    };

    for id in order {
        if events.node(&id).and_then(|n| n.t_mess).is_some() {
            continue;
        }

        let in_edges: Vec<_> = events.in_edges(&id).to_vec();

        let is_entry_start = id.kind == EventKind::Dep
            && events
                .node(&id)
                .and_then(|n| n.target_id.as_ref())
                .is_none()
            && in_edges.is_empty();

        let target_time = if is_entry_start || in_edges.is_empty() {
            events
                .node(&id)
                .map(|n| n.t_mess.or(n.t_prog).or(n.t_plan).unwrap_or(f64::NEG_INFINITY))
                .unwrap_or(f64::NEG_INFINITY)
        } else {
            events.node(&id).and_then(|n| n.t_plan).unwrap_or(f64::NEG_INFINITY)
        };

        let mut t_min = f64::NEG_INFINITY;
        let mut t_max = f64::INFINITY;

        for edge in &in_edges {
            let Some(source_eff) = events.node(&edge.from).and_then(|n| n.t_eff()) else {
                continue;
            };
            let fdl = edge.dt_fdl.unwrap_or(0.0);
            let min_candidate = source_eff + edge.dt_min + fdl.max(0.0);
            t_min = t_min.max(min_candidate);

            if let Some(dt_max) = edge.dt_max {
                t_max = t_max.min(source_eff + dt_max);
            }
            if fdl < 0.0 {
                t_max = t_max.min(target_time + fdl);
            }
        }

        let prog = clamp(target_time, t_min, t_max);

        if let Some(node) = events.node_mut(&id) {
            if prog.is_finite() {
                node.t_prog = Some(prog);
            } else {
                log::debug!("insufficient data to predict {id}, leaving t_prog unset");
            }
        }
    }

    write_back(events, targets);
}

fn write_back(events: &EventGraph, targets: &mut TargetGraph) {
    for node in events.nodes() {
        let Some(target_id) = &node.target_id else { continue };
        let Some(t_eff) = node.t_eff() else { continue };
        let Some(t_plan) = node.t_plan else { continue };
        let delay = t_eff - t_plan;
        let measured = node.t_mess.is_some();

        let Some(target) = targets.node_mut(target_id) else { continue };
        match node.id.kind {
            EventKind::Arr => {
                target.v_an = Some(delay);
                if matches!(target.kind, TargetKind::Durchfahrt | TargetKind::Ausfahrt) {
                    target.v_ab = Some(delay);
                }
                if measured {
                    target.status = TargetStatus::Angekommen;
                }
            }
            EventKind::Dep => {
                target.v_ab = Some(delay);
                if measured {
                    target.status = TargetStatus::Abgefahren;
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::config::DispatchParams;
    use model::event::{EventEdge, EventNode};
    use model::ids::EventId;
    use model::target::{TargetEdge, TargetEdgeKind, TargetNode};

    fn tid(train: i64, t: i64, track: &str) -> model::ids::TargetId {
        model::ids::TargetId { train_id: train, time_key: t, plan_track: track.into() }
    }

    fn build_plain_replacement() -> (TargetGraph, DispatchParams) {
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

        (tg, DispatchParams::default())
    }

    #[test]
    fn s1_plain_replacement_with_no_delay() {
        let (tg, params) = build_plain_replacement();
        let mut events = crate::builder::rebuild(&tg, &params);
        let mut targets = tg;
        run(&mut events, &mut targets);

        let ersatz = events.nodes().find(|n| n.id.kind == EventKind::Ersatz).unwrap();
        assert_eq!(ersatz.t_prog, Some(333.0));
    }

    #[test]
    fn s1_entry_delay_propagates_through_replacement() {
        let (tg, params) = build_plain_replacement();
        let mut events = crate::builder::rebuild(&tg, &params);
        let start = events.train_start(11).unwrap();
        events.node_mut(&start).unwrap().t_mess = Some(310.0);

        let mut targets = tg;
        run(&mut events, &mut targets);

        let ersatz = events.nodes().find(|n| n.id.kind == EventKind::Ersatz).unwrap();
        assert_eq!(ersatz.t_prog, Some(343.0));
    }

    #[test]
    fn s2_coupling_bereitschaft_and_delay_propagation() {
        let mut tg = TargetGraph::new();
        let mut z1 = TargetNode::new(tid(12, 345, "C1"), TargetKind::Halt, "C1");
        z1.p_an = Some(345.0);
        z1.p_ab = Some(345.0);
        tg.insert_node(z1);

        let mut z2 = TargetNode::new(tid(13, 340, "C1"), TargetKind::Halt, "C1");
        z2.p_an = Some(340.0);
        z2.p_ab = Some(350.0);
        tg.insert_node(z2);

        tg.add_edge(TargetEdge::new(tid(12, 345, "C1"), tid(13, 340, "C1"), TargetEdgeKind::Kupplung));

        let params = DispatchParams::default();
        let mut events = crate::builder::rebuild(&tg, &params);
        let mut targets = tg;
        run(&mut events, &mut targets);

        let k = events.nodes().find(|n| n.id.kind == EventKind::Kupplung).unwrap();
        assert_eq!(k.t_prog, Some(346.0));

        let arr13 = events
            .nodes()
            .find(|n| n.id.train_id == 13 && n.id.kind == EventKind::Arr)
            .unwrap()
            .id;
        events.node_mut(&arr13).unwrap().t_mess = Some(355.0);
        run(&mut events, &mut targets);

        let k = events.nodes().find(|n| n.id.kind == EventKind::Kupplung).unwrap();
        assert_eq!(k.t_prog, Some(356.0));
        let dep13 = events
            .nodes()
            .find(|n| n.id.train_id == 13 && n.id.kind == EventKind::Dep)
            .unwrap();
        assert_eq!(dep13.t_prog, Some(356.0));

        let target13 = targets.node(&tid(13, 340, "C1")).unwrap();
        assert_eq!(target13.v_ab, Some(6.0));
    }

    #[test]
    fn measured_arrival_and_departure_mark_target_status() {
        let (tg, params) = build_plain_replacement();
        let mut events = crate::builder::rebuild(&tg, &params);
        let mut targets = tg;

        let arr_b1 = events
            .nodes()
            .find(|n| n.id.train_id == 11 && n.id.kind == EventKind::Arr && n.plan_track == "B1")
            .unwrap()
            .id;
        events.node_mut(&arr_b1).unwrap().t_mess = Some(332.0);
        run(&mut events, &mut targets);

        let target_b1 = targets.node(&tid(11, 332, "B1")).unwrap();
        assert_eq!(target_b1.status, model::target::TargetStatus::Angekommen);

        let dep_b1 = events
            .nodes()
            .find(|n| n.id.train_id == 11 && n.id.kind == EventKind::Dep && n.plan_track == "B1")
            .unwrap()
            .id;
        events.node_mut(&dep_b1).unwrap().t_mess = Some(334.0);
        run(&mut events, &mut targets);

        let target_b1 = targets.node(&tid(11, 332, "B1")).unwrap();
        assert_eq!(target_b1.status, model::target::TargetStatus::Abgefahren);
    }

    #[test]
    fn predicted_only_time_does_not_advance_status_past_neu() {
        let (tg, params) = build_plain_replacement();
        let mut events = crate::builder::rebuild(&tg, &params);
        let mut targets = tg;
        run(&mut events, &mut targets);

        let target_b1 = targets.node(&tid(11, 332, "B1")).unwrap();
        assert_eq!(target_b1.status, model::target::TargetStatus::Neu);
    }

    #[test]
    fn min_dwell_is_respected_even_without_measurement() {
        let mut events = EventGraph::new();
        let arr = EventId { train_id: 1, kind: EventKind::Arr, seq: 0 };
        let dep = EventId { train_id: 1, kind: EventKind::Dep, seq: 0 };
        let mut arr_node = EventNode::new(arr, "A");
        arr_node.t_plan = Some(100.0);
        let mut dep_node = EventNode::new(dep, "A");
        dep_node.t_plan = Some(101.0);
        events.upsert_node(arr_node);
        events.upsert_node(dep_node);
        events.add_edge(EventEdge::new(arr, dep, model::event::EventEdgeKind::Aufenthalt, 5.0));

        events.node_mut(&arr).unwrap().t_mess = Some(120.0);
        let mut targets = TargetGraph::new();
        run(&mut events, &mut targets);

        let t_eff_dep = events.node(&dep).unwrap().t_eff().unwrap();
        assert!(t_eff_dep >= 120.0 + 5.0);
    }
}
