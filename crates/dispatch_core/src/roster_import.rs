use std::collections::HashMap;

use model::config::DispatchParams;
use model::ids::TargetId;
use model::target::{TargetEdge, TargetEdgeKind, TargetKind};
use model::time::Minutes;

use crate::target_graph::TargetGraph;

/// One row of a train's fahrplan, as read from the simulator's
/// `zugfahrplan` response.
#[derive(Debug, Clone)]
pub struct FahrplanZeile {
    pub plan_track: String,
    pub kind: TargetKind,
    pub p_an: Option<Minutes>,
    pub p_ab: Option<Minutes>,
    pub d_min: Minutes,
    /// raw flag string, e.g. "E12 K13"
    pub flags: String,
}

/// Builds the target graph from every train's fahrplan: one node per stop,
/// linked in order by Planfahrt edges, plus an E/K/F edge to the first halt
/// of any other train referenced in a stop's flag string. `L`/`R`/`W` flags
/// (lokumlauf, richtungswechsel, lokwechsel) carry no cross-train edge but
/// raise the stop's minimum dwell to the corresponding `params` tunable.
pub fn build_target_graph(
    schedules: &HashMap<i64, Vec<FahrplanZeile>>,
    params: &DispatchParams,
) -> TargetGraph {
    let mut graph = TargetGraph::new();
    let mut first_halt: HashMap<i64, TargetId> = HashMap::new();

    for (&train_id, rows) in schedules {
        for row in rows {
            let id = target_id(train_id, row);
            let mut node = model::target::TargetNode::new(id.clone(), row.kind, row.plan_track.clone());
            node.p_an = row.p_an;
            node.p_ab = row.p_ab;
            node.d_min = row.d_min;
            node.flags = row.flags.clone();
            let (_, dwell_flags) = parse_flags(&row.flags);
            for flag in dwell_flags {
                node.d_min = node.d_min.max(flag.minutes(params));
            }
            graph.insert_node(node);
            first_halt.entry(train_id).or_insert_with(|| id.clone());
        }
    }

    for (&train_id, rows) in schedules {
        for (i, row) in rows.iter().enumerate() {
            let id = target_id(train_id, row);

            if let Some(next) = rows.get(i + 1) {
                let next_id = target_id(train_id, next);
                graph.add_edge(TargetEdge::new(id.clone(), next_id, TargetEdgeKind::Planfahrt));
            }

            let (edge_flags, _) = parse_flags(&row.flags);
            for (kind, other_train) in edge_flags {
                match first_halt.get(&other_train) {
                    Some(target) => {
                        graph.add_edge(TargetEdge::new(id.clone(), target.clone(), kind));
                    }
                    None => log::warn!(
                        "train {train_id} flag references unknown train {other_train}, skipping edge"
                    ),
                }
            }
        }
    }

    graph
}

fn target_id(train_id: i64, row: &FahrplanZeile) -> TargetId {
    let time_key = row.p_an.or(row.p_ab).unwrap_or(0.0).round() as i64;
    TargetId { train_id, time_key, plan_track: row.plan_track.clone() }
}

/// A single-train dwell-extension flag: no cross-train edge, just a minimum
/// dwell bump applied to the row it's found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DwellFlag {
    Lokumlauf,
    Lokwechsel,
    Richtungswechsel,
}

impl DwellFlag {
    fn minutes(self, params: &DispatchParams) -> Minutes {
        match self {
            DwellFlag::Lokumlauf => params.mindestaufenthalt_lokumlauf,
            DwellFlag::Lokwechsel => params.mindestaufenthalt_lokwechsel,
            DwellFlag::Richtungswechsel => params.mindestaufenthalt_richtungswechsel,
        }
    }
}

fn parse_flags(flags: &str) -> (Vec<(TargetEdgeKind, i64)>, Vec<DwellFlag>) {
    let mut edges = Vec::new();
    let mut dwell = Vec::new();
    for token in flags.split_whitespace() {
        let (kind_char, rest) = token.split_at(1);
        match kind_char {
            "E" => {
                if let Ok(id) = rest.parse() {
                    edges.push((TargetEdgeKind::Ersatz, id));
                }
            }
            "K" => {
                if let Ok(id) = rest.parse() {
                    edges.push((TargetEdgeKind::Kupplung, id));
                }
            }
            "F" => {
                if let Ok(id) = rest.parse() {
                    edges.push((TargetEdgeKind::Fluegelung, id));
                }
            }
            "L" => dwell.push(DwellFlag::Lokumlauf),
            "R" => dwell.push(DwellFlag::Richtungswechsel),
            "W" => dwell.push(DwellFlag::Lokwechsel),
            _ => {}
        }
    }
    (edges, dwell)
}
