pub mod descriptor_dto;
pub mod workflow_dto;
