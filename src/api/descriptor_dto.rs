use serde::{Deserialize, Serialize};

use crate::api::workflow_dto::contract_dto::ContractDto;

/// Document read by the redistribution runtime, `{"workflow": {...}}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DescriptorDto {
    pub workflow: WorkflowDescriptorDto,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDescriptorDto {
    pub filter_level: String,
    pub nodes: Vec<NodeDescriptorDto>,
    pub edges: Vec<EdgeDescriptorDto>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescriptorDto {
    pub start_proc: usize,
    pub nprocs: usize,
    pub func: String,
    pub cmdline: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inports: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outports: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDescriptorDto {
    pub start_proc: usize,
    pub nprocs: usize,

    /// Index of the producer in `nodes`.
    pub source: usize,
    /// Index of the consumer in `nodes`.
    pub target: usize,

    pub name: String,
    pub prod_redist: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub con_redist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub func: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    pub source_port: String,
    pub target_port: String,
    pub tokens: u32,
    pub transport: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<ContractDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys_link: Option<ContractDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept_any: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_unlisted: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_collection_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_storage_sizes: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prod_output_freq: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_output_freq: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_output_freq: Option<u32>,
}
