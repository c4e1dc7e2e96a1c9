use serde::{Deserialize, Serialize};

use crate::api::workflow_dto::contract_dto::{ContractDto, ContractLinkDto};

/// Description of a whole workflow graph, the file given to the compiler.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDto {
    pub name: String,

    #[serde(default)]
    pub filter_level: Option<String>,

    /// Topology declarations, applied in order.
    #[serde(default)]
    pub topologies: Vec<TopologyDeclDto>,

    pub nodes: Vec<NodeDto>,

    #[serde(default)]
    pub edges: Vec<EdgeDto>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TopologyDeclDto {
    Root {
        name: String,
        #[serde(default)]
        nprocs: Option<usize>,
        #[serde(default)]
        hosts: Vec<String>,
        #[serde(default)]
        hostfile: Option<String>,
        #[serde(default)]
        procs_per_node: Option<usize>,
        #[serde(default)]
        offset_proc_per_node: Option<usize>,
    },
    Split {
        parent: String,
        parts: Vec<TopologyPartDto>,
    },
    Subset {
        parent: String,
        name: String,
        hosts: Vec<String>,
    },
    Complement {
        parent: String,
        name: String,
        hosts: Vec<String>,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TopologyPartDto {
    pub name: String,
    pub nprocs: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NodeDto {
    pub name: String,
    pub func: String,
    pub cmdline: String,

    #[serde(default)]
    pub topology: Option<String>,
    #[serde(default)]
    pub start_proc: Option<usize>,
    #[serde(default)]
    pub nprocs: Option<usize>,

    #[serde(default)]
    pub inports: Vec<PortDto>,
    #[serde(default)]
    pub outports: Vec<PortDto>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PortDto {
    pub name: String,

    #[serde(default)]
    pub contract: Option<ContractDto>,

    /// Contract document, `inputs` are read for input ports and `outputs` for output ports.
    #[serde(default)]
    pub contract_file: Option<String>,

    #[serde(default)]
    pub tokens: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDto {
    /// Output port, written `node.port`.
    pub source: String,
    /// Input port, written `node.port`.
    pub target: String,

    #[serde(default)]
    pub topology: Option<String>,
    #[serde(default)]
    pub start_proc: Option<usize>,
    #[serde(default)]
    pub nprocs: Option<usize>,

    pub prod_redist: String,
    #[serde(default)]
    pub con_redist: Option<String>,
    #[serde(default)]
    pub func: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub cmdline: Option<String>,

    #[serde(default)]
    pub contract_link: Option<ContractLinkDto>,

    #[serde(default)]
    pub transport: Option<String>,

    #[serde(default)]
    pub stream: Option<StreamDto>,
}

fn default_buffers() -> Vec<String> {
    vec!["mainmem".to_string()]
}

fn default_buffer_sizes() -> Vec<usize> {
    vec![10]
}

fn default_output_freq() -> u32 {
    1
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "preset", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StreamDto {
    Sequential {
        #[serde(default = "default_buffers")]
        buffers: Vec<String>,
        #[serde(default = "default_buffer_sizes")]
        max_buffer_sizes: Vec<usize>,
        #[serde(default = "default_output_freq")]
        prod_output_freq: u32,
    },
    MostRecent {
        #[serde(default = "default_buffers")]
        buffers: Vec<String>,
        #[serde(default = "default_buffer_sizes")]
        max_buffer_sizes: Vec<usize>,
        #[serde(default = "default_output_freq")]
        prod_output_freq: u32,
    },
    LowHigh {
        low_freq: u32,
        high_freq: u32,
        #[serde(default = "default_buffers")]
        buffers: Vec<String>,
        #[serde(default = "default_buffer_sizes")]
        max_buffer_sizes: Vec<usize>,
    },
    DirectSync {
        #[serde(default = "default_output_freq")]
        prod_output_freq: u32,
    },
    Custom {
        stream: String,
        frame_policy: String,
        storage_collection_policy: String,
        #[serde(default)]
        storage_types: Vec<String>,
        #[serde(default)]
        max_storage_sizes: Vec<usize>,
        #[serde(default = "default_output_freq")]
        prod_output_freq: u32,
        #[serde(default)]
        low_output_freq: Option<u32>,
        #[serde(default)]
        high_output_freq: Option<u32>,
    },
}
