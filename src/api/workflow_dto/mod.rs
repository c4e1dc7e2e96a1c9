pub mod contract_dto;
pub mod workflow_dto;
