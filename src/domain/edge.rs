use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::api::workflow_dto::workflow_dto::StreamDto;
use crate::domain::contract::ContractLink;
use crate::domain::resources::ResourceAssignment;
use crate::domain::utils::id::NodeName;
use crate::error::{Error, Result};

new_key_type! {
    pub struct EdgeKey;
}

/// A port of a node, written `node.port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub node: NodeName,
    pub port: String,
}

impl PortRef {
    pub fn new(node: &str, port: &str) -> Self {
        Self { node: NodeName::new(node), port: port.to_string() }
    }
}

impl FromStr for PortRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('.') {
            Some((node, port)) if !node.is_empty() && !port.is_empty() => Ok(PortRef::new(node, port)),
            _ => Err(Error::ModelConstructionError(format!("'{}' is not a port reference, expected 'node.port'", s))),
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.port)
    }
}

/// Mechanism used to start every process of the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// One shared launcher invocation over contiguous ranks.
    #[default]
    Generic,
    /// Like `Generic`, every rank pinned to a host core through a rank file.
    Pinned,
    /// One detached launcher per entity, exchanging data through files.
    File,
    /// One detached launcher per entity, exchanging data through CCI.
    Cci,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Generic => "generic",
            Transport::Pinned => "pinned",
            Transport::File => "file",
            Transport::Cci => "cci",
        }
    }

    /// Transport seen by the runtime. Rank pinning only changes how processes are launched.
    pub fn runtime_name(&self) -> &'static str {
        match self {
            Transport::Pinned => Transport::Generic.as_str(),
            other => other.as_str(),
        }
    }

    /// Entities are started as separate launcher invocations.
    pub fn is_independent(&self) -> bool {
        matches!(self, Transport::File | Transport::Cci)
    }
}

impl FromStr for Transport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "generic" | "mpi" => Ok(Transport::Generic),
            "pinned" => Ok(Transport::Pinned),
            "file" => Ok(Transport::File),
            "cci" => Ok(Transport::Cci),
            other => Err(Error::ModelConstructionError(format!("Unknown transport '{}'", other))),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Buffering of the frames sent over an edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPolicy {
    pub stream: String,
    pub frame_policy: String,
    pub storage_collection_policy: String,
    pub storage_types: Vec<String>,
    pub max_storage_sizes: Vec<usize>,
    pub prod_output_freq: Option<u32>,
    pub low_output_freq: Option<u32>,
    pub high_output_freq: Option<u32>,
}

impl StreamPolicy {
    pub fn custom(stream: &str, frame_policy: &str, storage_collection_policy: &str, storage_types: Vec<String>, max_storage_sizes: Vec<usize>) -> Self {
        Self {
            stream: stream.to_string(),
            frame_policy: frame_policy.to_string(),
            storage_collection_policy: storage_collection_policy.to_string(),
            storage_types,
            max_storage_sizes,
            prod_output_freq: None,
            low_output_freq: None,
            high_output_freq: None,
        }
    }

    /// Every frame is delivered, in order.
    pub fn sequential(buffers: Vec<String>, max_buffer_sizes: Vec<usize>, prod_output_freq: u32) -> Self {
        Self { prod_output_freq: Some(prod_output_freq), ..Self::custom("double", "seq", "greedy", buffers, max_buffer_sizes) }
    }

    /// Only the most recent frame is delivered.
    pub fn most_recent(buffers: Vec<String>, max_buffer_sizes: Vec<usize>, prod_output_freq: u32) -> Self {
        Self { prod_output_freq: Some(prod_output_freq), ..Self::custom("single", "recent", "lru", buffers, max_buffer_sizes) }
    }

    pub fn low_high(low_freq: u32, high_freq: u32, buffers: Vec<String>, max_buffer_sizes: Vec<usize>) -> Self {
        Self {
            prod_output_freq: Some(1),
            low_output_freq: Some(low_freq),
            high_output_freq: Some(high_freq),
            ..Self::custom("single", "lowhigh", "greedy", buffers, max_buffer_sizes)
        }
    }

    /// Synchronous delivery without any buffer.
    pub fn direct_sync(prod_output_freq: u32) -> Self {
        Self { prod_output_freq: Some(prod_output_freq), ..Self::custom("single", "seq", "greedy", Vec::new(), Vec::new()) }
    }
}

impl From<&StreamDto> for StreamPolicy {
    fn from(dto: &StreamDto) -> Self {
        match dto {
            StreamDto::Sequential { buffers, max_buffer_sizes, prod_output_freq } => {
                StreamPolicy::sequential(buffers.clone(), max_buffer_sizes.clone(), *prod_output_freq)
            }
            StreamDto::MostRecent { buffers, max_buffer_sizes, prod_output_freq } => {
                StreamPolicy::most_recent(buffers.clone(), max_buffer_sizes.clone(), *prod_output_freq)
            }
            StreamDto::LowHigh { low_freq, high_freq, buffers, max_buffer_sizes } => {
                StreamPolicy::low_high(*low_freq, *high_freq, buffers.clone(), max_buffer_sizes.clone())
            }
            StreamDto::DirectSync { prod_output_freq } => StreamPolicy::direct_sync(*prod_output_freq),
            StreamDto::Custom {
                stream,
                frame_policy,
                storage_collection_policy,
                storage_types,
                max_storage_sizes,
                prod_output_freq,
                low_output_freq,
                high_output_freq,
            } => StreamPolicy {
                prod_output_freq: Some(*prod_output_freq),
                low_output_freq: *low_output_freq,
                high_output_freq: *high_output_freq,
                ..StreamPolicy::custom(stream, frame_policy, storage_collection_policy, storage_types.clone(), max_storage_sizes.clone())
            },
        }
    }
}

/// The intermediary process routing the data of an edge.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkProcess {
    /// Callback run by the link.
    pub func: String,

    /// Library holding `func`.
    pub path: String,

    /// Redistribution from the link to the consumer.
    pub con_redist: String,

    pub cmdline: String,

    pub contract: Option<ContractLink>,
}

impl LinkProcess {
    pub fn new(func: &str, path: &str, con_redist: &str, cmdline: &str) -> Self {
        Self { func: func.to_string(), path: path.to_string(), con_redist: con_redist.to_string(), cmdline: cmdline.to_string(), contract: None }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkPolicy {
    /// Producer ranks send straight to consumer ranks.
    Direct,
    Routed(LinkProcess),
}

/// A directed data channel from an output port to an input port.
#[derive(Debug, Clone)]
pub struct Edge {
    pub source: PortRef,
    pub target: PortRef,

    /// Ranks of the link process, none for direct edges.
    pub resources: ResourceAssignment,

    /// Redistribution from the producer to the link (or the consumer).
    pub prod_redist: String,

    pub link: LinkPolicy,
    pub transport: Transport,
    pub stream: Option<StreamPolicy>,
}

impl Edge {
    pub fn direct(source: PortRef, target: PortRef, prod_redist: &str) -> Self {
        Self {
            source,
            target,
            resources: ResourceAssignment::default(),
            prod_redist: prod_redist.to_string(),
            link: LinkPolicy::Direct,
            transport: Transport::default(),
            stream: None,
        }
    }

    pub fn routed(source: PortRef, target: PortRef, resources: ResourceAssignment, prod_redist: &str, link: LinkProcess) -> Self {
        Self { resources, link: LinkPolicy::Routed(link), ..Edge::direct(source, target, prod_redist) }
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_stream(mut self, stream: StreamPolicy) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Attaches a link contract. Direct edges have no link to carry it, the contract is dropped.
    pub fn set_contract_link(&mut self, contract: ContractLink) {
        match &mut self.link {
            LinkPolicy::Routed(process) => process.contract = Some(contract),
            LinkPolicy::Direct => {
                log::warn!("Edge '{}' has no link process, its link contract is ignored", self.name());
            }
        }
    }

    pub fn with_contract_link(mut self, contract: ContractLink) -> Self {
        self.set_contract_link(contract);
        self
    }

    pub fn contract_link(&self) -> Option<&ContractLink> {
        match &self.link {
            LinkPolicy::Routed(process) => process.contract.as_ref(),
            LinkPolicy::Direct => None,
        }
    }

    pub fn is_routed(&self) -> bool {
        matches!(self.link, LinkPolicy::Routed(_))
    }

    /// `producer_consumer`, the name the runtime knows the edge by.
    pub fn name(&self) -> String {
        format!("{}_{}", self.source.node, self.target.node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_ref_parsing() {
        let port: PortRef = "prod.out".parse().unwrap();
        assert_eq!(port, PortRef::new("prod", "out"));
        assert_eq!(port.to_string(), "prod.out");
        assert!("prod".parse::<PortRef>().is_err());
        assert!(".out".parse::<PortRef>().is_err());
    }

    #[test]
    fn test_transport_names() {
        assert_eq!("mpi".parse::<Transport>().unwrap(), Transport::Generic);
        assert_eq!("CCI".parse::<Transport>().unwrap(), Transport::Cci);
        assert_eq!(Transport::Pinned.runtime_name(), "generic");
        assert_eq!(Transport::File.runtime_name(), "file");
        assert!("pigeon".parse::<Transport>().is_err());
        assert!(Transport::File.is_independent());
        assert!(!Transport::Pinned.is_independent());
    }

    #[test]
    fn test_contract_link_on_direct_edge_is_dropped() {
        let edge = Edge::direct(PortRef::new("a", "out"), PortRef::new("b", "in"), "count").with_contract_link(ContractLink::new(false));
        assert!(edge.contract_link().is_none());
        assert_eq!(edge.name(), "a_b");
    }

    #[test]
    fn test_stream_presets() {
        let stream = StreamPolicy::sequential(vec!["mainmem".to_string()], vec![10], 1);
        assert_eq!((stream.stream.as_str(), stream.frame_policy.as_str(), stream.storage_collection_policy.as_str()), ("double", "seq", "greedy"));

        let stream = StreamPolicy::low_high(2, 5, vec![], vec![]);
        assert_eq!(stream.frame_policy, "lowhigh");
        assert_eq!((stream.low_output_freq, stream.high_output_freq), (Some(2), Some(5)));

        let stream = StreamPolicy::direct_sync(3);
        assert!(stream.storage_types.is_empty());
        assert_eq!(stream.prod_output_freq, Some(3));
    }
}
