//! Scalar value codec contract.
//!
//! Records hold values in their storable form. A codec turns structured
//! scalars (timestamps for now) into that form and back. The tuple engine
//! treats stored values as opaque unless the registry flags the column as
//! temporal, in which case it decodes before comparing.

use crate::types::DataType;
use crate::value::Value;

/// Converts values between their in-memory and storable representation.
pub trait Codec: Send + Sync {
    /// Converts a value into its storable form.
    fn encode(&self, value: &Value) -> Value;

    /// Converts a stored value back, interpreting it as `data_type`.
    ///
    /// Values that cannot be interpreted are returned unchanged.
    fn decode(&self, value: &Value, data_type: DataType) -> Value;
}

/// A codec that stores every value as-is.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityCodec;

impl Codec for IdentityCodec {
    fn encode(&self, value: &Value) -> Value {
        value.clone()
    }

    fn decode(&self, value: &Value, _data_type: DataType) -> Value {
        value.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_codec() {
        let codec = IdentityCodec;
        let v = Value::DateTime(1_000);
        assert_eq!(codec.encode(&v), v);
        assert_eq!(codec.decode(&v, DataType::DateTime), v);
    }
}
