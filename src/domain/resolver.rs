use std::collections::HashMap;

use crate::domain::contract::{Contract, ContractLink};
use crate::domain::edge::EdgeKey;
use crate::domain::graph::WorkflowGraph;
use crate::error::{Error, Result};

/// Fields that cross an edge at runtime.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeResolution {
    /// Producer to link, or producer to consumer on edges without a link contract.
    /// `None` when nothing constrains the exchange.
    pub keys: Option<Contract>,

    /// Link to consumer, only for edges with a link contract.
    pub keys_link: Option<Contract>,

    /// The link forwards every field since neither end declares any.
    pub forward_unlisted: bool,

    /// `accept_any` of the link contract, if there is one.
    pub accept_any: Option<bool>,
}

/// Per-edge result of contract resolution. The graph itself is never modified.
#[derive(Debug, Clone, Default)]
pub struct ContractResolution {
    pub edges: HashMap<EdgeKey, EdgeResolution>,
    pub warnings: Vec<String>,
}

impl ContractResolution {
    pub fn get(&self, key: EdgeKey) -> Option<&EdgeResolution> {
        self.edges.get(&key)
    }
}

/// Resolves the exchanged fields of every edge, failing on the first edge that cannot deliver what its consumer needs.
pub fn resolve_contracts(graph: &WorkflowGraph) -> Result<ContractResolution> {
    let mut resolution = ContractResolution::default();

    for (key, edge) in graph.edges() {
        let producer = graph.source_port(edge)?.contract_or_empty();
        let consumer = graph.target_port(edge)?.contract_or_empty();

        let mut resolver = EdgeResolver { edge: edge.name(), warnings: &mut resolution.warnings };
        let edge_resolution = match edge.contract_link() {
            None => resolver.without_link(&producer, &consumer)?,
            Some(link) if !link.accept_any => resolver.strict_link(&producer, link, &consumer)?,
            Some(link) => resolver.open_link(&producer, link, &consumer)?,
        };

        log::debug!(
            "Edge '{}' resolved to keys {} and link keys {}",
            edge.name(),
            edge_resolution.keys.as_ref().map(|keys| keys.to_string()).unwrap_or_else(|| "(any)".to_string()),
            edge_resolution.keys_link.as_ref().map(|keys| keys.to_string()).unwrap_or_else(|| "(none)".to_string()),
        );
        resolution.edges.insert(key, edge_resolution);
    }

    log::info!("Resolved contracts of {} edges with {} warnings", resolution.edges.len(), resolution.warnings.len());
    Ok(resolution)
}

struct EdgeResolver<'w> {
    edge: String,
    warnings: &'w mut Vec<String>,
}

impl EdgeResolver<'_> {
    fn warn(&mut self, message: String) {
        log::warn!("{}", message);
        self.warnings.push(message);
    }

    /// Every field of `needed` must be sent by `provider` with the same type.
    fn match_fields(&mut self, needed: &Contract, provider: &Contract, provider_label: &str) -> Result<Contract> {
        let mut matched = Contract::new();
        let mut missing = Vec::new();

        for (field, spec) in needed.iter() {
            let Some(provided) = provider.get(field) else {
                missing.push(field);
                continue;
            };
            if provided.type_name != spec.type_name {
                return Err(Error::TypeMismatchError {
                    edge: self.edge.clone(),
                    field: field.to_string(),
                    expected: spec.type_name.clone(),
                    found: provided.type_name.clone(),
                    provider: provider_label.to_string(),
                });
            }

            let composed = spec.compose(provided)?;
            if provided.periodicity != spec.periodicity {
                self.warn(format!(
                    "Field '{}' on '{}' is sent every {} and expected every {} iterations, it is exchanged every {}",
                    field, self.edge, provided.periodicity, spec.periodicity, composed.periodicity
                ));
            }
            matched.insert_spec(field, composed);
        }

        if !missing.is_empty() {
            return Err(Error::MissingContractFieldError { edge: self.edge.clone(), fields: missing.join(", "), provider: provider_label.to_string() });
        }
        Ok(matched)
    }

    /// Fields of `needed` the provider sends, type-checked, without requiring all of them.
    fn compatible_fields(&mut self, needed: &Contract, provider: &Contract, provider_label: &str) -> Result<Contract> {
        let available = needed.restricted_to(provider);
        self.match_fields(&available, provider, provider_label)
    }

    /// Fields of `needed` the provider sends with the same type. Fields of another type are skipped.
    fn same_type_fields(needed: &Contract, provider: &Contract) -> Result<Contract> {
        let mut shared = Contract::new();
        for (field, spec) in needed.iter() {
            if let Some(provided) = provider.get(field).filter(|provided| provided.type_name == spec.type_name) {
                shared.insert_spec(field, spec.compose(provided)?);
            }
        }
        Ok(shared)
    }

    fn without_link(&mut self, producer: &Contract, consumer: &Contract) -> Result<EdgeResolution> {
        let keys = if consumer.is_empty() {
            if producer.is_empty() {
                self.warn(format!("Neither end of '{}' declares a contract, the exchanged data cannot be checked", self.edge));
                None
            } else {
                self.warn(format!("The consumer of '{}' declares no contract and receives every field of the producer", self.edge));
                Some(producer.clone())
            }
        } else if producer.is_empty() {
            self.warn(format!("The producer of '{}' declares no contract, the fields needed by the consumer are assumed to be sent", self.edge));
            Some(consumer.clone())
        } else {
            Some(self.match_fields(consumer, producer, "producer")?)
        };

        Ok(EdgeResolution { keys, ..EdgeResolution::default() })
    }

    /// The link only forwards what it declares.
    fn strict_link(&mut self, producer: &Contract, link: &ContractLink, consumer: &Contract) -> Result<EdgeResolution> {
        if link.inputs.is_empty() {
            return Err(Error::EmptyLinkContractError { edge: self.edge.clone(), side: "inputs".to_string() });
        }
        if link.outputs.is_empty() {
            return Err(Error::EmptyLinkContractError { edge: self.edge.clone(), side: "outputs".to_string() });
        }

        let keys = if producer.is_empty() {
            self.warn(format!("The producer of '{}' declares no contract, the link inputs are assumed to be sent", self.edge));
            link.inputs.clone()
        } else {
            self.match_fields(&link.inputs, producer, "producer")?
        };

        let keys_link = if consumer.is_empty() {
            link.outputs.clone()
        } else {
            let matched = self.match_fields(consumer, &link.outputs, "link")?;
            let unused: Vec<&str> = link.outputs.field_names().into_iter().filter(|field| !consumer.contains(field)).collect();
            if !unused.is_empty() {
                self.warn(format!("The link of '{}' sends '{}' which the consumer does not need, they are dropped", self.edge, unused.join(", ")));
            }
            matched
        };

        Ok(EdgeResolution { keys: Some(keys), keys_link: Some(keys_link), forward_unlisted: false, accept_any: Some(false) })
    }

    /// The link forwards unlisted fields, missing declarations are filled from both ends.
    fn open_link(&mut self, producer: &Contract, link: &ContractLink, consumer: &Contract) -> Result<EdgeResolution> {
        let keys = if producer.is_empty() {
            if !link.inputs.is_empty() {
                self.warn(format!("The producer of '{}' declares no contract, the link inputs are assumed to be sent", self.edge));
                Some(link.inputs.clone())
            } else {
                None
            }
        } else if link.inputs.is_empty() {
            if consumer.is_empty() {
                self.warn(format!(
                    "The link and the consumer of '{}' declare no contract, every producer field is forwarded and cannot be checked",
                    self.edge
                ));
                Some(producer.clone())
            } else {
                let shared = Self::same_type_fields(consumer, producer)?;
                if shared.is_empty() {
                    // the link would wait forever for its first message
                    return Err(Error::MissingContractFieldError {
                        edge: self.edge.clone(),
                        fields: consumer.field_names().join(", "),
                        provider: "producer".to_string(),
                    });
                }
                self.warn(format!("The link of '{}' declares no input, it only receives the fields the consumer needs", self.edge));
                Some(shared)
            }
        } else {
            let mut declared = self.match_fields(&link.inputs, producer, "producer")?;
            let completion = if consumer.is_empty() { producer.clone() } else { Self::same_type_fields(consumer, producer)? };
            declared.merge_missing(&completion);
            Some(declared)
        };

        // What the link sends: its declared outputs plus everything it forwards.
        let mut sent = link.outputs.clone();
        if let Some(received) = &keys {
            sent.merge_missing(received);
        }

        let keys_link = if consumer.is_empty() {
            if sent.is_empty() { None } else { Some(sent) }
        } else if producer.is_empty() && sent.is_empty() {
            self.warn(format!("Nothing upstream of the consumer of '{}' declares a contract, its fields are assumed to be forwarded", self.edge));
            Some(consumer.clone())
        } else if producer.is_empty() {
            // Undeclared fields may still come from the producer through the link.
            let declared = self.compatible_fields(consumer, &sent, "link")?;
            let unlisted: Vec<&str> = consumer.field_names().into_iter().filter(|field| !declared.contains(field)).collect();
            if !unlisted.is_empty() {
                self.warn(format!("The fields '{}' of '{}' are assumed to be forwarded by the link", unlisted.join(", "), self.edge));
            }
            let mut forwarded = consumer.clone();
            for (field, spec) in declared.iter() {
                forwarded.insert_spec(field, spec.clone());
            }
            Some(forwarded)
        } else {
            Some(self.match_fields(consumer, &sent, "link")?)
        };

        let forward_unlisted = producer.is_empty() && consumer.is_empty();
        if forward_unlisted {
            self.warn(format!("The link of '{}' forwards every field, neither end declares a contract", self.edge));
        }

        Ok(EdgeResolution { keys, keys_link, forward_unlisted, accept_any: Some(true) })
    }
}
