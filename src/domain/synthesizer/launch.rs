use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::domain::edge::{LinkPolicy, Transport};
use crate::domain::graph::WorkflowGraph;
use crate::domain::synthesizer::Artifact;
use crate::domain::topology::{LOCALHOST, TopologyKey};
use crate::error::{Error, Result};

pub const WORKFLOW_HOSTFILE: &str = "hostfile_workflow.txt";
pub const WORKFLOW_RANKFILE: &str = "rankfile_workflow.txt";

const SCRIPT_HEADER: &str = "#! /bin/bash\n\n";

/// Location and extra options of the process launcher.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LauncherConfig {
    /// Directory prefix of the launcher, including the trailing separator.
    #[serde(default)]
    pub path: String,

    /// Options passed to every launcher invocation.
    #[serde(default)]
    pub options: String,
}

impl LauncherConfig {
    fn command(&self, arguments: &[&str]) -> String {
        let launcher = format!("{}mpirun", self.path);
        std::iter::once(launcher.as_str())
            .chain(std::iter::once(self.options.trim()))
            .chain(arguments.iter().copied())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchStrategy {
    /// One launcher invocation running a single executable on every rank.
    Spmd,
    /// One launcher invocation with one segment per task or link.
    Mpmd,
    /// Like `Mpmd` with every rank pinned to a host core.
    Pinned,
    /// One detached launcher invocation per task or link.
    Independent,
}

impl fmt::Display for LaunchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchStrategy::Spmd => write!(f, "SPMD"),
            LaunchStrategy::Mpmd => write!(f, "MPMD"),
            LaunchStrategy::Pinned => write!(f, "rank-pinned MPMD"),
            LaunchStrategy::Independent => write!(f, "independent processes"),
        }
    }
}

/// A task or routed link that owns processes.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchEntity {
    pub name: String,
    pub ranks: Range<usize>,
    pub cmdline: String,
    /// One host per rank.
    pub hostlist: Vec<String>,
    pub topology: Option<TopologyKey>,
}

impl LaunchEntity {
    pub fn nprocs(&self) -> usize {
        self.ranks.len()
    }
}

/// Launch script and side files of a workflow.
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    pub strategy: LaunchStrategy,
    pub transport: Transport,
    pub artifacts: Vec<Artifact>,
}

/// The transport shared by every edge, `Generic` for graphs without edges.
pub fn infer_transport(graph: &WorkflowGraph) -> Result<Transport> {
    let mut transport: Option<Transport> = None;
    for (_, edge) in graph.edges() {
        match transport {
            None => transport = Some(edge.transport),
            Some(selected) if selected != edge.transport => {
                return Err(Error::MixedTransportError { first: selected.to_string(), second: edge.transport.to_string() });
            }
            Some(_) => {}
        }
    }
    Ok(transport.unwrap_or_default())
}

/// Tasks and routed links holding ranks, in ascending start rank.
pub fn collect_entities(graph: &WorkflowGraph) -> Result<Vec<LaunchEntity>> {
    let topologies = graph.topologies();
    let mut entities = Vec::new();

    for (_, node) in graph.nodes() {
        let ranks = node.resources.rank_range(topologies)?;
        if ranks.is_empty() {
            return Err(Error::ZeroRankTaskError(node.name.id.clone()));
        }
        entities.push(LaunchEntity {
            name: node.name.id.clone(),
            hostlist: hosts_or_localhost(node.resources.hostlist(topologies)?, ranks.len()),
            ranks,
            cmdline: node.cmdline.clone(),
            topology: node.resources.topology_key(),
        });
    }

    for (_, edge) in graph.edges() {
        let LinkPolicy::Routed(process) = &edge.link else {
            continue;
        };
        let ranks = edge.resources.rank_range(topologies)?;
        if ranks.is_empty() {
            continue;
        }
        entities.push(LaunchEntity {
            name: edge.name(),
            hostlist: hosts_or_localhost(edge.resources.hostlist(topologies)?, ranks.len()),
            ranks,
            cmdline: process.cmdline.clone(),
            topology: edge.resources.topology_key(),
        });
    }

    entities.sort_by_key(|entity| entity.ranks.start);
    Ok(entities)
}

fn hosts_or_localhost(hosts: Vec<String>, nprocs: usize) -> Vec<String> {
    if hosts.len() == nprocs { hosts } else { vec![LOCALHOST.to_string(); nprocs] }
}

/// The sorted entities must tile `0..total` without gap or overlap.
pub fn check_partition(entities: &[LaunchEntity]) -> Result<usize> {
    let mut covered = 0;
    let mut previous: Option<&LaunchEntity> = None;

    for entity in entities {
        if entity.ranks.start < covered {
            let left = previous.map(|previous| previous.name.clone()).unwrap_or_default();
            return Err(Error::TopologyOverlapError {
                left,
                right: entity.name.clone(),
                first: entity.ranks.start,
                end: covered.min(entity.ranks.end),
            });
        }
        if entity.ranks.start > covered {
            return Err(Error::UnassignedRanksError { first: covered, end: entity.ranks.start });
        }
        covered = entity.ranks.end;
        previous = Some(entity);
    }
    Ok(covered)
}

/// Builds the launch script of the graph and the host or rank files it reads.
pub fn to_launch_plan(graph: &WorkflowGraph, descriptor_file: &str, script_file: &str, launcher: &LauncherConfig) -> Result<LaunchPlan> {
    let transport = infer_transport(graph)?;
    let entities = collect_entities(graph)?;
    let total = check_partition(&entities)?;

    let shared_cmdline = entities.first().map(|entity| entity.cmdline.as_str());
    let strategy = match transport {
        Transport::Generic if entities.iter().all(|entity| Some(entity.cmdline.as_str()) == shared_cmdline) => LaunchStrategy::Spmd,
        Transport::Generic => LaunchStrategy::Mpmd,
        Transport::Pinned => LaunchStrategy::Pinned,
        Transport::File | Transport::Cci => LaunchStrategy::Independent,
    };
    log::info!("Selected transport '{}' launched as {} over {} ranks", transport, strategy, total);

    let artifacts = match strategy {
        LaunchStrategy::Spmd => spmd(&entities, total, descriptor_file, script_file, launcher),
        LaunchStrategy::Mpmd => mpmd(&entities, script_file, launcher),
        LaunchStrategy::Pinned => pinned(graph, &entities, script_file, launcher)?,
        LaunchStrategy::Independent => independent(&entities, total, script_file, launcher),
    };
    Ok(LaunchPlan { strategy, transport, artifacts })
}

fn hostfile(entities: &[LaunchEntity]) -> Artifact {
    let hosts: Vec<&str> = entities.iter().flat_map(|entity| entity.hostlist.iter().map(String::as_str)).collect();
    Artifact::text(WORKFLOW_HOSTFILE, hosts.join("\n"))
}

fn spmd(entities: &[LaunchEntity], total: usize, descriptor_file: &str, script_file: &str, launcher: &LauncherConfig) -> Vec<Artifact> {
    let cmdline = entities.first().map(|entity| entity.cmdline.as_str()).unwrap_or_default();
    let total = total.to_string();
    let command = launcher.command(&["--hostfile", WORKFLOW_HOSTFILE, "-np", &total, cmdline, descriptor_file]);
    vec![Artifact::script(script_file, format!("{}{}\n", SCRIPT_HEADER, command)), hostfile(entities)]
}

fn segments(entities: &[LaunchEntity]) -> String {
    entities.iter().map(|entity| format!("-np {} {}", entity.nprocs(), entity.cmdline)).collect::<Vec<_>>().join(" : ")
}

fn mpmd(entities: &[LaunchEntity], script_file: &str, launcher: &LauncherConfig) -> Vec<Artifact> {
    let segments = segments(entities);
    let command = launcher.command(&["--hostfile", WORKFLOW_HOSTFILE, &segments]);
    vec![Artifact::script(script_file, format!("{}{}\n", SCRIPT_HEADER, command)), hostfile(entities)]
}

fn pinned(graph: &WorkflowGraph, entities: &[LaunchEntity], script_file: &str, launcher: &LauncherConfig) -> Result<Vec<Artifact>> {
    let mut used_slots: HashMap<&str, usize> = HashMap::new();
    let mut lines = Vec::new();

    for entity in entities {
        let topology = entity
            .topology
            .and_then(|key| graph.topologies().get(key))
            .ok_or_else(|| Error::MissingTopologyError(entity.name.clone()))?;

        for (rank, host) in entity.ranks.clone().zip(&entity.hostlist) {
            let used = used_slots.entry(host.as_str()).or_insert(0);
            if topology.procs_per_node > 0 && *used >= topology.procs_per_node {
                return Err(Error::InsufficientResourcesError {
                    topology: topology.name.id.clone(),
                    reason: format!("host '{}' has no core left for rank {}", host, rank),
                });
            }
            lines.push(format!("rank {}={} slot={}", rank, host, topology.offset_proc_per_node + *used));
            *used += 1;
        }
    }

    let segments = segments(entities);
    let command = launcher.command(&["--hostfile", WORKFLOW_HOSTFILE, "--rankfile", WORKFLOW_RANKFILE, &segments]);
    Ok(vec![
        Artifact::script(script_file, format!("{}{}\n", SCRIPT_HEADER, command)),
        hostfile(entities),
        Artifact::text(WORKFLOW_RANKFILE, lines.join("\n")),
    ])
}

fn independent(entities: &[LaunchEntity], total: usize, script_file: &str, launcher: &LauncherConfig) -> Vec<Artifact> {
    let mut script = SCRIPT_HEADER.to_string();
    let mut artifacts = Vec::with_capacity(entities.len() + 1);

    for (index, entity) in entities.iter().enumerate() {
        let hostfile = format!("hostfile_task{}", index);
        let nprocs = entity.nprocs().to_string();
        let size = format!("DECAF_WORKFLOW_SIZE={}", total);
        let rank = format!("DECAF_WORKFLOW_RANK={}", entity.ranks.start);
        let command = launcher.command(&["-np", &nprocs, "--hostfile", &hostfile, "-x", &size, "-x", &rank, &entity.cmdline]);

        script.push_str(&command);
        script.push_str(" &\n");
        artifacts.push(Artifact::text(&hostfile, entity.hostlist.join("\n")));
    }

    artifacts.insert(0, Artifact::script(script_file, script));
    artifacts
}
