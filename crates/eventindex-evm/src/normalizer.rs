//! Converts alloy `DynSolValue` → EventIndex `AttributeValue`.

use alloy_dyn_abi::DynSolValue;
use eventindex_core::AttributeValue;

/// Convert a decoded `DynSolValue` into an `AttributeValue`.
pub fn normalize(val: DynSolValue) -> AttributeValue {
    match val {
        DynSolValue::Bool(b) => AttributeValue::Bool(b),

        DynSolValue::Int(i, bits) => {
            if bits <= 128 {
                match i128::try_from(i) {
                    Ok(v) => AttributeValue::Int(v),
                    Err(_) => AttributeValue::BigInt(i.to_string()),
                }
            } else {
                AttributeValue::BigInt(i.to_string())
            }
        }

        DynSolValue::Uint(u, bits) => {
            if bits <= 128 {
                match u128::try_from(u) {
                    Ok(v) => AttributeValue::Uint(v),
                    Err(_) => AttributeValue::BigUint(u.to_string()),
                }
            } else {
                AttributeValue::BigUint(u.to_string())
            }
        }

        DynSolValue::FixedBytes(word, size) => AttributeValue::Bytes(word[..size].to_vec()),

        DynSolValue::Bytes(b) => AttributeValue::Bytes(b),

        DynSolValue::String(s) => AttributeValue::Str(s),

        DynSolValue::Address(a) => AttributeValue::Address(format!("{a:#x}")),

        DynSolValue::Array(vals) | DynSolValue::FixedArray(vals) => {
            AttributeValue::Array(vals.into_iter().map(normalize).collect())
        }

        // Unnamed tuple fields get positional names "0", "1", ...
        DynSolValue::Tuple(fields) => AttributeValue::Tuple(
            fields
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), normalize(v)))
                .collect(),
        ),

        DynSolValue::Function(f) => AttributeValue::Bytes(f.to_vec()),
    }
}
