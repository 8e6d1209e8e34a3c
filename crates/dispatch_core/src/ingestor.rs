use std::collections::{HashMap, HashSet, VecDeque};

use model::ids::{EventId, EventKind};
use model::time::Minutes;

use crate::event_graph::EventGraph;
use crate::train_graph::TrainGraph;

/// The kinds of live telemetry the simulator emits for a running train.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveEventKind {
    Einfahrt,
    Ausfahrt,
    Ankunft,
    Abfahrt,
    Rothalt,
    Wurdegruen,
    Ersatz,
    Kuppeln,
    Fluegeln,
}

#[derive(Debug, Clone)]
pub struct LiveEvent {
    pub train_id: i64,
    pub kind: LiveEventKind,
    pub time: Minutes,
    pub plan_track: Option<String>,
    pub am_gleis: bool,
    pub delay: Option<Minutes>,
}

#[derive(Debug, Default, Clone)]
struct Cursor {
    position: Option<EventId>,
    plan_track: Option<String>,
}

/// Tracks, per train, where along its event chain the last live event placed
/// it, so the next one can be matched without rescanning from the start.
#[derive(Debug, Default)]
pub struct EventIngestor {
    cursors: HashMap<i64, Cursor>,
}

impl EventIngestor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one live event to the event graph. Returns `true` if the
    /// event was matched to a node (and `t_mess` possibly set), `false` if
    /// it was discarded (phantom train, or no matching node found).
    pub fn ingest(
        &mut self,
        graph: &mut EventGraph,
        trains: &TrainGraph,
        ev: &LiveEvent,
    ) -> bool {
        let visible = trains
            .get(model::ids::TrainId::new(ev.train_id))
            .map(|t| t.sichtbar)
            .unwrap_or(false);

        if !visible && !matches!(ev.kind, LiveEventKind::Ausfahrt | LiveEventKind::Ersatz) {
            return false;
        }

        match ev.kind {
            LiveEventKind::Einfahrt => self.handle_einfahrt(graph, ev),
            LiveEventKind::Ausfahrt => self.handle_ausfahrt(graph, ev),
            LiveEventKind::Ankunft if ev.am_gleis => self.handle_ankunft_halt(graph, ev),
            LiveEventKind::Ankunft => self.handle_durchfahrt(graph, ev),
            LiveEventKind::Abfahrt if ev.am_gleis => self.handle_abfahrt_ready(ev),
            LiveEventKind::Abfahrt => self.handle_abfahrt_actual(graph, ev),
            LiveEventKind::Rothalt => self.handle_rothalt(graph, ev),
            LiveEventKind::Wurdegruen => self.handle_wurdegruen(graph, ev),
            LiveEventKind::Ersatz => self.handle_hop(graph, ev, EventKind::Ersatz),
            LiveEventKind::Kuppeln => self.handle_hop(graph, ev, EventKind::Kupplung),
            LiveEventKind::Fluegeln => self.handle_hop(graph, ev, EventKind::Fluegelung),
        }
    }

    fn handle_einfahrt(&mut self, graph: &mut EventGraph, ev: &LiveEvent) -> bool {
        let Some(start) = graph.train_start(ev.train_id) else {
            log::warn!("einfahrt for {} but no train-start node registered", ev.train_id);
            return false;
        };
        set_t_mess(graph, start, ev.time);
        self.cursors.insert(
            ev.train_id,
            Cursor { position: Some(start), plan_track: ev.plan_track.clone() },
        );
        true
    }

    fn handle_ausfahrt(&mut self, graph: &mut EventGraph, ev: &LiveEvent) -> bool {
        let from = self.cursor_position(graph, ev.train_id);
        let Some(from) = from else {
            log::warn!("ausfahrt for {} but train has no known position", ev.train_id);
            return false;
        };
        let terminus = search_forward(graph, from, ev.train_id, |g, id| {
            g.out_edges(&id).is_empty() && matches!(id.kind, EventKind::Arr | EventKind::Dep)
        });
        let Some(terminus) = terminus else {
            log::warn!("ausfahrt for {} but no terminal event found", ev.train_id);
            return false;
        };
        set_t_mess(graph, terminus, ev.time);
        self.cursors.remove(&ev.train_id);
        true
    }

    fn handle_ankunft_halt(&mut self, graph: &mut EventGraph, ev: &LiveEvent) -> bool {
        let Some(from) = self.cursor_position(graph, ev.train_id) else {
            log::warn!("ankunft for {} but train has no known position", ev.train_id);
            return false;
        };
        let track = ev.plan_track.as_deref();
        let found = search_forward(graph, from, ev.train_id, |g, id| {
            id.kind == EventKind::Arr
                && track.map(|t| g.node(&id).map(|n| n.plan_track == t).unwrap_or(false)).unwrap_or(true)
        });
        let Some(found) = found else {
            log::warn!("ankunft for {} matched no Arr node", ev.train_id);
            return false;
        };
        set_t_mess(graph, found, ev.time);
        self.advance_cursor(found, ev.plan_track.clone());
        true
    }

    fn handle_durchfahrt(&mut self, graph: &mut EventGraph, ev: &LiveEvent) -> bool {
        let Some(from) = self.cursor_position(graph, ev.train_id) else {
            log::warn!("durchfahrt for {} but train has no known position", ev.train_id);
            return false;
        };
        let found = search_forward(graph, from, ev.train_id, |_, id| id.kind == EventKind::Arr);
        let Some(found) = found else {
            log::warn!("durchfahrt for {} matched no Arr node", ev.train_id);
            return false;
        };
        set_t_mess(graph, found, ev.time);
        self.advance_cursor(found, ev.plan_track.clone());
        true
    }

    fn handle_abfahrt_ready(&mut self, ev: &LiveEvent) -> bool {
        let cursor = self.cursors.entry(ev.train_id).or_default();
        cursor.plan_track = ev.plan_track.clone();
        true
    }

    fn handle_abfahrt_actual(&mut self, graph: &mut EventGraph, ev: &LiveEvent) -> bool {
        let Some(from) = self.cursor_position(graph, ev.train_id) else {
            log::warn!("abfahrt for {} but train has no known position", ev.train_id);
            return false;
        };
        let cursor_track = self.cursors.get(&ev.train_id).and_then(|c| c.plan_track.clone());
        let track = ev.plan_track.clone().or(cursor_track);
        let Some(track) = track else {
            log::debug!("abfahrt for {} with no plan track on record, skipping", ev.train_id);
            return false;
        };
        let found = search_forward(graph, from, ev.train_id, |g, id| {
            id.kind == EventKind::Dep && g.node(&id).map(|n| n.plan_track == track).unwrap_or(false)
        });
        let Some(found) = found else {
            log::warn!("abfahrt for {} matched no Dep node at {track}", ev.train_id);
            return false;
        };
        set_t_mess(graph, found, ev.time);
        self.advance_cursor(found, Some(track));
        true
    }

    fn handle_rothalt(&mut self, graph: &mut EventGraph, ev: &LiveEvent) -> bool {
        let Some(from) = self.cursor_position(graph, ev.train_id) else {
            return false;
        };
        let found = search_forward(graph, from, ev.train_id, |_, id| id.kind == EventKind::Dep);
        let Some(found) = found else {
            log::debug!("rothalt for {} had no upcoming Dep to annotate", ev.train_id);
            return false;
        };
        if !ev.am_gleis {
            log::debug!("rothalt for {} not at platform, no fixed-delay correction applied", ev.train_id);
            return true;
        }
        let delay = ev.delay.unwrap_or(0.0);
        for edge in graph.in_edges(&found).to_vec() {
            graph.set_edge_dt_fdl(&edge.from, &found, Some(delay));
        }
        log::debug!("rothalt: transient +{delay} hold applied before {found}");
        true
    }

    fn handle_wurdegruen(&mut self, graph: &mut EventGraph, ev: &LiveEvent) -> bool {
        let Some(from) = self.cursor_position(graph, ev.train_id) else {
            return false;
        };
        let found = search_forward(graph, from, ev.train_id, |_, id| id.kind == EventKind::Dep);
        let Some(found) = found else { return false };
        for edge in graph.in_edges(&found).to_vec() {
            graph.set_edge_dt_fdl(&edge.from, &found, None);
        }
        true
    }

    /// Ersatz/Kuppeln/Fluegeln: locate the E/K/F node for this train, set
    /// `t_mess`, and hand cursor ownership to whichever train continues
    /// through the shared node.
    fn handle_hop(&mut self, graph: &mut EventGraph, ev: &LiveEvent, kind: EventKind) -> bool {
        let Some(from) = self.cursor_position(graph, ev.train_id) else {
            log::warn!("{:?} for {} but train has no known position", ev.kind, ev.train_id);
            return false;
        };
        let found = search_forward(graph, from, ev.train_id, move |_, id| id.kind == kind);
        let Some(found) = found else {
            log::warn!("{:?} for {} matched no {:?} node", ev.kind, ev.train_id, kind);
            return false;
        };
        set_t_mess(graph, found, ev.time);

        for edge in graph.out_edges(&found).to_vec() {
            if edge.to.train_id != ev.train_id {
                self.cursors.insert(
                    edge.to.train_id,
                    Cursor { position: Some(found), plan_track: ev.plan_track.clone() },
                );
            }
        }
        self.cursors.remove(&ev.train_id);
        true
    }

    fn cursor_position(&self, graph: &EventGraph, train_id: i64) -> Option<EventId> {
        self.cursors
            .get(&train_id)
            .and_then(|c| c.position)
            .or_else(|| graph.train_start(train_id))
    }

    fn advance_cursor(&mut self, at: EventId, plan_track: Option<String>) {
        self.cursors.insert(at.train_id, Cursor { position: Some(at), plan_track });
    }
}

fn set_t_mess(graph: &mut EventGraph, id: EventId, time: Minutes) {
    match graph.node_mut(&id) {
        Some(node) => {
            if !node.set_t_mess(time) {
                log::debug!("ignoring repeated measurement for {id}, t_mess already set");
            }
        }
        None => log::error!("no event node for {id}, engine invariant violated"),
    }
}

/// Linear walk along the train's path from `from` (exclusive), following
/// successor-event edges and hopping into other trains via E/K/F nodes as
/// needed, returning the first node matching `pred`.
fn search_forward(
    graph: &EventGraph,
    from: EventId,
    _train_id: i64,
    pred: impl Fn(&EventGraph, EventId) -> bool,
) -> Option<EventId> {
    let mut queue: VecDeque<EventId> = graph.out_edges(&from).iter().map(|e| e.to).collect();
    let mut seen: HashSet<EventId> = HashSet::new();
    seen.insert(from);

    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        if pred(graph, id) {
            return Some(id);
        }
        for edge in graph.out_edges(&id) {
            queue.push_back(edge.to);
        }
    }
    None
}
