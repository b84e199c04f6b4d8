//! ABCI attribute decoding.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use eventindex_core::{AttributeValue, IndexerError};

use crate::types::AbciAttribute;

/// How attribute keys and values are encoded in `block_results`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeEncoding {
    /// UTF-8 strings (CometBFT 0.37 and later).
    #[default]
    Plain,
    /// Base64 strings (Tendermint / CometBFT 0.34).
    Base64,
}

impl AttributeEncoding {
    fn decode(self, raw: &str) -> Result<String, IndexerError> {
        match self {
            Self::Plain => Ok(raw.to_string()),
            Self::Base64 => {
                let bytes = STANDARD
                    .decode(raw)
                    .map_err(|e| IndexerError::Decode(format!("attribute is not base64: {e}")))?;
                String::from_utf8(bytes)
                    .map_err(|e| IndexerError::Decode(format!("attribute is not UTF-8: {e}")))
            }
        }
    }
}

/// Decode an attribute list into a key → value map.
///
/// A missing value decodes to the empty string. Later duplicates of a key
/// overwrite earlier ones.
pub fn decode_attributes(
    attributes: &[AbciAttribute],
    encoding: AttributeEncoding,
) -> Result<BTreeMap<String, AttributeValue>, IndexerError> {
    let mut out = BTreeMap::new();
    for attr in attributes {
        let Some(key) = attr.key.as_deref() else {
            return Err(IndexerError::Decode("attribute without a key".into()));
        };
        let key = encoding.decode(key)?;
        let value = match attr.value.as_deref() {
            Some(v) => encoding.decode(v)?,
            None => String::new(),
        };
        out.insert(key, AttributeValue::Str(value));
    }
    Ok(out)
}

/// CometBFT transaction hash: uppercase hex SHA-256 of the raw tx bytes.
pub fn tx_hash(tx_base64: &str) -> Result<String, IndexerError> {
    let bytes = STANDARD
        .decode(tx_base64)
        .map_err(|e| IndexerError::Decode(format!("block tx is not base64: {e}")))?;
    Ok(hex::encode_upper(Sha256::digest(&bytes)))
}
