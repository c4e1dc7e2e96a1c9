use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

fn default_periodicity() -> u32 {
    1
}

fn default_accept_any() -> bool {
    true
}

/// One contract entry, written as `[typeName, periodicity]` or `[typeName]`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FieldSpecDto(pub String, #[serde(default = "default_periodicity")] pub u32);

pub type ContractDto = BTreeMap<String, FieldSpecDto>;

/// Document holding the `inputs` and `outputs` field maps of a contract.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ContractFileDto {
    #[serde(default)]
    pub inputs: ContractDto,

    #[serde(default)]
    pub outputs: ContractDto,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ContractLinkDto {
    #[serde(default = "default_accept_any")]
    pub accept_any: bool,

    #[serde(default)]
    pub inputs: ContractDto,

    #[serde(default)]
    pub outputs: ContractDto,

    /// Contract document merged under the inline entries.
    #[serde(default)]
    pub contract_file: Option<String>,
}
