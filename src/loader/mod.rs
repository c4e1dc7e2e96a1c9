pub mod parser;
pub mod workflow_loader;
