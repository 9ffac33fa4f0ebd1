use borsh::{BorshDeserialize, BorshSerialize};

use crate::error::{StmError, StmResult};

/// Capability required of values stored in memory cells.
///
/// Payloads travel through the runtime in their borsh byte form: two
/// payloads are treated as the same value for commit validation iff their
/// encodings are byte-equal, and every read hands out a freshly decoded
/// copy so callers cannot mutate cell contents through aliases handed out
/// earlier.
pub trait Payload: BorshSerialize + BorshDeserialize + Send + 'static {}

impl<T> Payload for T where T: BorshSerialize + BorshDeserialize + Send + 'static {}

/// Encode a payload into its byte form.
pub fn encode<T: Payload>(value: &T) -> StmResult<Vec<u8>> {
    borsh::to_vec(value).map_err(|e| StmError::Codec(e.to_string()))
}

/// Decode a payload from its byte form, yielding an independently owned copy.
pub fn decode<T: Payload>(bytes: &[u8]) -> StmResult<T> {
    T::try_from_slice(bytes).map_err(|e| StmError::Codec(e.to_string()))
}
