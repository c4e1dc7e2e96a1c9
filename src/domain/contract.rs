use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::api::workflow_dto::contract_dto::{ContractDto, ContractFileDto, ContractLinkDto, FieldSpecDto};
use crate::domain::node::PortDirection;
use crate::error::{Error, Result};
use crate::loader::parser::parse_json_file;

pub fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 { a } else { gcd(b, a % b) }
}

/// Least common multiple, the composition rule for periodicities.
pub fn lcm(a: u32, b: u32) -> Result<u32> {
    if a == 0 || b == 0 {
        return Ok(0);
    }
    (a / gcd(a, b)).checked_mul(b).ok_or(Error::PeriodicityOverflowError { left: a, right: b })
}

/// Declared type of a field and how often it is exchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub type_name: String,

    /// The field is exchanged every `periodicity` iterations, always >= 1.
    pub periodicity: u32,
}

impl FieldSpec {
    pub fn new(type_name: impl Into<String>, periodicity: u32) -> Self {
        Self { type_name: type_name.into(), periodicity }
    }

    /// Same type, periodicities composed with [`lcm`].
    pub fn compose(&self, other: &FieldSpec) -> Result<FieldSpec> {
        Ok(FieldSpec::new(self.type_name.clone(), lcm(self.periodicity, other.periodicity)?))
    }
}

/// Typed field registry, ordered by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contract {
    fields: BTreeMap<String, FieldSpec>,
}

impl Contract {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, field: &str, type_name: &str, periodicity: u32) -> Result<()> {
        if periodicity == 0 {
            return Err(Error::InvalidPeriodicityError { field: field.to_string(), periodicity });
        }
        if let Some(previous) = self.fields.get(field) {
            log::warn!("Field '{}' of type '{}' is overwritten with type '{}'", field, previous.type_name, type_name);
        }
        self.fields.insert(field.to_string(), FieldSpec::new(type_name, periodicity));
        Ok(())
    }

    /// Builder variant of [`Contract::add_entry`].
    pub fn with_entry(mut self, field: &str, type_name: &str, periodicity: u32) -> Result<Self> {
        self.add_entry(field, type_name, periodicity)?;
        Ok(self)
    }

    pub(crate) fn insert_spec(&mut self, field: &str, spec: FieldSpec) {
        self.fields.insert(field.to_string(), spec);
    }

    pub fn get(&self, field: &str) -> Option<&FieldSpec> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    /// Entries of `self` whose names appear in `other`.
    pub fn restricted_to(&self, other: &Contract) -> Contract {
        let fields = self.fields.iter().filter(|(name, _)| other.contains(name)).map(|(name, spec)| (name.clone(), spec.clone())).collect();
        Contract { fields }
    }

    /// Adds the entries of `other` that are not declared yet.
    pub fn merge_missing(&mut self, other: &Contract) {
        for (name, spec) in other.iter() {
            self.fields.entry(name.to_string()).or_insert_with(|| spec.clone());
        }
    }

    pub fn from_dto(dto: &ContractDto) -> Result<Self> {
        let mut contract = Contract::new();
        for (field, FieldSpecDto(type_name, periodicity)) in dto {
            contract.add_entry(field, type_name, *periodicity)?;
        }
        Ok(contract)
    }

    pub fn to_dto(&self) -> ContractDto {
        self.fields.iter().map(|(name, spec)| (name.clone(), FieldSpecDto(spec.type_name.clone(), spec.periodicity))).collect()
    }

    /// Reads the `inputs` map of a contract document for input ports, `outputs` for output ports.
    pub fn from_file(path: impl AsRef<Path>, direction: PortDirection) -> Result<Self> {
        let document: ContractFileDto = parse_json_file(path.as_ref())?;
        let contract = match direction {
            PortDirection::In => Contract::from_dto(&document.inputs)?,
            PortDirection::Out => Contract::from_dto(&document.outputs)?,
        };
        log::debug!("Loaded {} fields from contract '{}'", contract.len(), path.as_ref().display());
        Ok(contract)
    }
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self.fields.iter().map(|(name, spec)| format!("{}: [{}, {}]", name, spec.type_name, spec.periodicity)).collect();
        write!(f, "{{{}}}", entries.join(", "))
    }
}

/// Contract of the link process routing an edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractLink {
    /// Forward fields the link does not list.
    pub accept_any: bool,

    /// Fields the link receives from the producer.
    pub inputs: Contract,

    /// Fields the link sends to the consumer.
    pub outputs: Contract,
}

impl Default for ContractLink {
    fn default() -> Self {
        Self { accept_any: true, inputs: Contract::new(), outputs: Contract::new() }
    }
}

impl ContractLink {
    pub fn new(accept_any: bool) -> Self {
        Self { accept_any, ..Self::default() }
    }

    pub fn add_input(&mut self, field: &str, type_name: &str, periodicity: u32) -> Result<()> {
        self.inputs.add_entry(field, type_name, periodicity)
    }

    pub fn add_output(&mut self, field: &str, type_name: &str, periodicity: u32) -> Result<()> {
        self.outputs.add_entry(field, type_name, periodicity)
    }

    pub fn from_file(path: impl AsRef<Path>, accept_any: bool) -> Result<Self> {
        let document: ContractFileDto = parse_json_file(path.as_ref())?;
        Ok(Self { accept_any, inputs: Contract::from_dto(&document.inputs)?, outputs: Contract::from_dto(&document.outputs)? })
    }

    /// Inline entries win over the ones of the referenced document. `base_dir` resolves relative document paths.
    pub fn from_dto(dto: &ContractLinkDto, base_dir: &Path) -> Result<Self> {
        let mut link = match &dto.contract_file {
            Some(file) => ContractLink::from_file(base_dir.join(file), dto.accept_any)?,
            None => ContractLink::new(dto.accept_any),
        };
        for (field, FieldSpecDto(type_name, periodicity)) in &dto.inputs {
            link.add_input(field, type_name, *periodicity)?;
        }
        for (field, FieldSpecDto(type_name, periodicity)) in &dto.outputs {
            link.add_output(field, type_name, *periodicity)?;
        }
        Ok(link)
    }
}
