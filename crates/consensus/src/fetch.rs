//! Block fetching from a single backend.

use concord_traits::Backend;
use concord_types::{BlockHead, BlockTag, FetchError, decode_quantity};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// JSON-RPC method used to look up a block.
pub const GET_BLOCK_BY_NUMBER: &str = "eth_getBlockByNumber";

/// Fetch the block at `tag` from `backend` and return its height and hash.
///
/// Asks for headers only. The call is raced against `cancel`; if the token
/// fires first the in-flight request is dropped and [`FetchError::Cancelled`]
/// is returned.
///
/// # Errors
///
/// - [`FetchError::Transport`] if the backend call fails.
/// - [`FetchError::MalformedResponse`] if the result is not a block record.
/// - [`FetchError::Cancelled`] if `cancel` fires first.
pub async fn fetch_block(
    cancel: &CancellationToken,
    backend: &dyn Backend,
    tag: BlockTag,
) -> Result<BlockHead, FetchError> {
    let name = backend.name();
    let call = backend.forward_rpc(GET_BLOCK_BY_NUMBER, json!([tag, false]));

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(FetchError::Cancelled { backend: name.to_string() });
        }
        result = call => result,
    };

    let value = result
        .map_err(|source| FetchError::Transport { backend: name.to_string(), source })?;
    parse_block(name, &value)
}

/// Extract height and hash from an `eth_getBlockByNumber` result.
fn parse_block(backend: &str, value: &Value) -> Result<BlockHead, FetchError> {
    let block =
        value.as_object().ok_or_else(|| FetchError::malformed(backend, "result is not an object"))?;

    let number = block
        .get("number")
        .and_then(Value::as_str)
        .ok_or_else(|| FetchError::malformed(backend, "missing block number"))?;
    let number = decode_quantity(number)
        .ok_or_else(|| FetchError::malformed(backend, format!("invalid block number {number}")))?;

    let hash = block
        .get("hash")
        .and_then(Value::as_str)
        .ok_or_else(|| FetchError::malformed(backend, "missing block hash"))?;

    Ok(BlockHead::new(number, hash))
}
