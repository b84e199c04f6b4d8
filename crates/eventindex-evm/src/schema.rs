//! Event schemas: the ABI of every event type an EVM backend can decode.

use std::collections::HashMap;

use alloy_dyn_abi::{DynSolType, DynSolValue, Specifier};
use alloy_json_abi::{Event as AbiEvent, JsonAbi};
use eventindex_core::{AttributeValue, IndexerError};

use crate::fingerprint;
use crate::normalizer;

/// A decoded-ready event definition.
#[derive(Debug, Clone)]
pub struct EventSchema {
    /// Event name; this is the `event_type` of emitted events.
    pub name: String,
    /// Canonical signature, e.g. `Transfer(address,address,uint256)`.
    pub signature: String,
    /// keccak256 of the signature (`topics[0]`).
    pub topic0: String,
    indexed: Vec<(String, DynSolType)>,
    body: Vec<(String, DynSolType)>,
}

impl EventSchema {
    /// Build from an alloy ABI event.
    pub fn from_abi(event: &AbiEvent) -> Result<Self, IndexerError> {
        if event.anonymous {
            return Err(IndexerError::Config(format!(
                "anonymous event '{}' has no topic0 and cannot be filtered",
                event.name
            )));
        }
        let mut indexed = Vec::new();
        let mut body = Vec::new();
        for (i, param) in event.inputs.iter().enumerate() {
            let ty = param.resolve().map_err(|e| {
                IndexerError::Config(format!("event '{}' param {i}: {e}", event.name))
            })?;
            let name = if param.name.is_empty() {
                format!("arg{i}")
            } else {
                param.name.clone()
            };
            if param.indexed {
                indexed.push((name, ty));
            } else {
                body.push((name, ty));
            }
        }
        let signature = event.signature();
        Ok(Self {
            name: event.name.clone(),
            topic0: fingerprint::keccak256_signature(&signature),
            signature,
            indexed,
            body,
        })
    }

    /// Parse a human-readable declaration such as
    /// `event NewTaskCreated(uint32 indexed taskIndex, string name)`.
    /// The leading `event` keyword is optional.
    pub fn parse(declaration: &str) -> Result<Self, IndexerError> {
        let declaration = declaration.trim();
        let full = if declaration.starts_with("event ") {
            declaration.to_string()
        } else {
            format!("event {declaration}")
        };
        let event = AbiEvent::parse(&full)
            .map_err(|e| IndexerError::Config(format!("invalid event declaration '{declaration}': {e}")))?;
        Self::from_abi(&event)
    }

    /// Decode a log's topics and data into named attributes.
    ///
    /// Indexed reference types (string, bytes, arrays, tuples) are stored on
    /// chain as their keccak256 hash, so they decode to the raw 32 bytes.
    pub fn decode(
        &self,
        topics: &[String],
        data: &[u8],
    ) -> Result<Vec<(String, AttributeValue)>, IndexerError> {
        let indexed_topics = topics.get(1..).unwrap_or_default();
        if indexed_topics.len() != self.indexed.len() {
            return Err(IndexerError::Decode(format!(
                "{}: expected {} indexed topics, got {}",
                self.signature,
                self.indexed.len(),
                indexed_topics.len()
            )));
        }

        let mut out = Vec::with_capacity(self.indexed.len() + self.body.len());
        for ((name, ty), topic) in self.indexed.iter().zip(indexed_topics) {
            out.push((name.clone(), decode_topic(topic, ty)?));
        }

        if !self.body.is_empty() {
            let tuple = DynSolType::Tuple(self.body.iter().map(|(_, ty)| ty.clone()).collect());
            let decoded = tuple
                .abi_decode_sequence(data)
                .map_err(|e| IndexerError::Decode(format!("{}: data: {e}", self.signature)))?;
            let values = match decoded {
                DynSolValue::Tuple(vals) => vals,
                other => vec![other],
            };
            for ((name, _), val) in self.body.iter().zip(values) {
                out.push((name.clone(), normalizer::normalize(val)));
            }
        }
        Ok(out)
    }
}

fn decode_topic(topic: &str, ty: &DynSolType) -> Result<AttributeValue, IndexerError> {
    let bytes = hex::decode(topic.strip_prefix("0x").unwrap_or(topic))
        .map_err(|e| IndexerError::Decode(format!("invalid topic hex: {e}")))?;
    if bytes.len() != 32 {
        return Err(IndexerError::Decode(format!(
            "topic must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    if matches!(
        ty,
        DynSolType::String
            | DynSolType::Bytes
            | DynSolType::Array(_)
            | DynSolType::FixedArray(..)
            | DynSolType::Tuple(_)
    ) {
        return Ok(AttributeValue::Bytes(bytes));
    }
    ty.abi_decode(&bytes)
        .map(normalizer::normalize)
        .map_err(|e| IndexerError::Decode(format!("topic decode: {e}")))
}

/// All event schemas known to a backend, keyed by topic0.
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    by_topic0: HashMap<String, EventSchema>,
}

impl SchemaSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every non-anonymous event from a JSON ABI document.
    pub fn from_json_abi(json: &str) -> Result<Self, IndexerError> {
        let abi: JsonAbi = serde_json::from_str(json)
            .map_err(|e| IndexerError::Config(format!("invalid JSON ABI: {e}")))?;
        let mut set = Self::new();
        for event in abi.events().filter(|e| !e.anonymous) {
            set.insert(EventSchema::from_abi(event)?);
        }
        Ok(set)
    }

    /// Load human-readable event declarations.
    pub fn from_declarations<I, S>(declarations: I) -> Result<Self, IndexerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for decl in declarations {
            set.insert(EventSchema::parse(decl.as_ref())?);
        }
        Ok(set)
    }

    pub fn insert(&mut self, schema: EventSchema) {
        self.by_topic0.insert(schema.topic0.clone(), schema);
    }

    pub fn into_schemas(self) -> impl Iterator<Item = EventSchema> {
        self.by_topic0.into_values()
    }

    pub fn get(&self, topic0: &str) -> Option<&EventSchema> {
        self.by_topic0.get(topic0)
    }

    /// Returns `true` if at least one schema is named `name`.
    pub fn has_name(&self, name: &str) -> bool {
        self.by_topic0.values().any(|s| s.name == name)
    }

    /// topic0 of every schema whose name is in `names`, sorted.
    pub fn topics_for<'a>(&self, names: impl IntoIterator<Item = &'a String>) -> Vec<String> {
        let names: Vec<&String> = names.into_iter().collect();
        let mut topics: Vec<String> = self
            .by_topic0
            .values()
            .filter(|s| names.contains(&&s.name))
            .map(|s| s.topic0.clone())
            .collect();
        topics.sort();
        topics
    }

    pub fn len(&self) -> usize {
        self.by_topic0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_topic0.is_empty()
    }
}
