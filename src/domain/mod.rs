pub mod compiler;
pub mod contract;
pub mod edge;
pub mod graph;
pub mod node;
pub mod resolver;
pub mod resources;
pub mod synthesizer;
pub mod topology;
pub mod utils;
pub mod validator;
