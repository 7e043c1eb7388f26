// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::{Agent, HandoffTarget};

/// The agent/handoff graph reachable from a starting agent: node names and
/// directed edges, each reported once. Cycles are tolerated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentGraph {
    pub nodes: Vec<String>,
    pub edges: Vec<(String, String)>,
}

/// Walk handoff edges breadth-first from `start`.
///
/// Named targets are resolved through `registry` when possible; unresolved
/// names still appear as nodes so validation can report them, but they are
/// not expanded. A visited set makes cyclic graphs terminate.
pub fn agent_graph(start: &Arc<Agent>, registry: &HashMap<String, Arc<Agent>>) -> AgentGraph {
    let mut graph = AgentGraph::default();
    let mut visited: HashSet<String> = HashSet::new();
    let mut seen_edges: HashSet<(String, String)> = HashSet::new();
    let mut queue: VecDeque<Arc<Agent>> = VecDeque::new();

    visited.insert(start.name.clone());
    graph.nodes.push(start.name.clone());
    queue.push_back(Arc::clone(start));

    while let Some(agent) = queue.pop_front() {
        for handoff in &agent.handoffs {
            let target_name = handoff.target.name().to_string();
            let edge = (agent.name.clone(), target_name.clone());
            if seen_edges.insert(edge.clone()) {
                graph.edges.push(edge);
            }
            if !visited.insert(target_name.clone()) {
                continue;
            }
            graph.nodes.push(target_name.clone());
            let next = match &handoff.target {
                HandoffTarget::Agent(a) => Some(Arc::clone(a)),
                HandoffTarget::Named(n) => registry.get(n).cloned(),
            };
            if let Some(next) = next {
                queue.push_back(next);
            }
        }
    }
    graph
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
