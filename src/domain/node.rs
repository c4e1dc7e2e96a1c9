use std::fmt;

use slotmap::new_key_type;

use crate::domain::contract::Contract;
use crate::domain::edge::EdgeKey;
use crate::domain::resources::ResourceAssignment;
use crate::domain::utils::id::NodeName;
use crate::error::{Error, Result};

new_key_type! {
    pub struct NodeKey;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    In,
    Out,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::In => write!(f, "input"),
            PortDirection::Out => write!(f, "output"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Port {
    pub name: String,
    pub direction: PortDirection,

    /// Fields sent (output) or needed (input). `None` accepts or sends anything.
    pub contract: Option<Contract>,

    /// Pre-seeded empty messages, only used on input ports.
    pub tokens: u32,

    /// Edges attached to this port, at most one for input ports.
    pub edges: Vec<EdgeKey>,

    /// Created while connecting a node that declares no ports.
    pub implicit: bool,
}

impl Port {
    fn new(name: &str, direction: PortDirection, contract: Option<Contract>) -> Self {
        Self { name: name.to_string(), direction, contract, tokens: 0, edges: Vec::new(), implicit: false }
    }

    /// The declared contract, an empty one if there is none.
    pub fn contract_or_empty(&self) -> Contract {
        self.contract.clone().unwrap_or_default()
    }

    pub fn is_connected(&self) -> bool {
        !self.edges.is_empty()
    }
}

/// A task of the workflow: one executable over a range of ranks.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: NodeName,
    pub resources: ResourceAssignment,

    /// Callback the runtime runs in this task.
    pub func: String,

    /// Executable and arguments started for every rank.
    pub cmdline: String,

    inports: Vec<Port>,
    outports: Vec<Port>,

    /// Set once a port was declared. Nodes without declared ports take any port name.
    declared_ports: bool,
}

impl Node {
    pub fn new(name: &str, resources: ResourceAssignment, func: &str, cmdline: &str) -> Self {
        Self {
            name: NodeName::new(name),
            resources,
            func: func.to_string(),
            cmdline: cmdline.to_string(),
            inports: Vec::new(),
            outports: Vec::new(),
            declared_ports: false,
        }
    }

    pub fn add_inport(&mut self, name: &str) -> Result<()> {
        self.declare_port(name, PortDirection::In, None)
    }

    pub fn add_outport(&mut self, name: &str) -> Result<()> {
        self.declare_port(name, PortDirection::Out, None)
    }

    pub fn add_inport_with_contract(&mut self, name: &str, contract: Contract) -> Result<()> {
        self.declare_port(name, PortDirection::In, Some(contract))
    }

    pub fn add_outport_with_contract(&mut self, name: &str, contract: Contract) -> Result<()> {
        self.declare_port(name, PortDirection::Out, Some(contract))
    }

    fn declare_port(&mut self, name: &str, direction: PortDirection, contract: Option<Contract>) -> Result<()> {
        if self.port(name, PortDirection::In).is_some() || self.port(name, PortDirection::Out).is_some() {
            return Err(Error::DuplicateNameError(format!("{}.{}", self.name, name)));
        }
        self.declared_ports = true;
        let port = Port::new(name, direction, contract);
        match direction {
            PortDirection::In => self.inports.push(port),
            PortDirection::Out => self.outports.push(port),
        }
        Ok(())
    }

    /// Seeds `tokens` empty messages on an input port.
    pub fn set_tokens(&mut self, port: &str, tokens: u32) -> Result<()> {
        let port = self.resolve_port(port, PortDirection::In)?;
        port.tokens = tokens;
        Ok(())
    }

    pub fn has_declared_ports(&self) -> bool {
        self.declared_ports
    }

    pub fn input_ports(&self) -> &[Port] {
        &self.inports
    }

    pub fn output_ports(&self) -> &[Port] {
        &self.outports
    }

    pub fn port(&self, name: &str, direction: PortDirection) -> Option<&Port> {
        let ports = match direction {
            PortDirection::In => &self.inports,
            PortDirection::Out => &self.outports,
        };
        ports.iter().find(|port| port.name == name)
    }

    /// Checks that `name` can be used in `direction` without creating anything.
    pub fn check_port(&self, name: &str, direction: PortDirection) -> Result<Option<&Port>> {
        if let Some(port) = self.port(name, direction) {
            return Ok(Some(port));
        }
        let opposite = match direction {
            PortDirection::In => PortDirection::Out,
            PortDirection::Out => PortDirection::In,
        };
        if self.port(name, opposite).is_some() {
            return Err(Error::PortDirectionError { node: self.name.id.clone(), port: name.to_string(), expected: direction.to_string() });
        }
        if self.declared_ports {
            return Err(Error::UnknownPortError { node: self.name.id.clone(), port: name.to_string() });
        }
        Ok(None)
    }

    /// The port `name` in `direction`, created on the fly for nodes without declared ports.
    pub(crate) fn resolve_port(&mut self, name: &str, direction: PortDirection) -> Result<&mut Port> {
        if self.check_port(name, direction)?.is_none() {
            log::debug!("Created {} port '{}.{}' on the fly", direction, self.name, name);
            let mut port = Port::new(name, direction, None);
            port.implicit = true;
            match direction {
                PortDirection::In => self.inports.push(port),
                PortDirection::Out => self.outports.push(port),
            }
        }

        let ports = match direction {
            PortDirection::In => &mut self.inports,
            PortDirection::Out => &mut self.outports,
        };
        ports.iter_mut().find(|port| port.name == name).ok_or_else(|| Error::UnknownPortError { node: self.name.id.clone(), port: name.to_string() })
    }

    /// Whether any input port carries a token.
    pub fn has_tokens(&self) -> bool {
        self.inports.iter().any(|port| port.tokens > 0)
    }
}
