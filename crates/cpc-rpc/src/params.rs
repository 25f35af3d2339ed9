//! Parameter extraction shared by the RPC methods.

use cpc_core::{ChannelType, CpcError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Extract an optional string parameter, supporting both snake_case and camelCase.
pub(crate) fn get_str_param<'a>(params: &'a Value, snake: &str, camel: &str) -> Option<&'a str> {
    params
        .get(snake)
        .or_else(|| params.get(camel))
        .and_then(|v| v.as_str())
}

/// Extract a required string parameter or return an error.
pub(crate) fn require_str_param<'a>(params: &'a Value, snake: &str, camel: &str) -> Result<&'a str> {
    get_str_param(params, snake, camel).ok_or_else(|| CpcError::InvalidParams {
        message: format!("Missing required parameter: {}", snake),
    })
}

/// Extract a required bool parameter or return an error.
pub(crate) fn require_bool_param(params: &Value, snake: &str, camel: &str) -> Result<bool> {
    params
        .get(snake)
        .or_else(|| params.get(camel))
        .and_then(|v| v.as_bool())
        .ok_or_else(|| CpcError::InvalidParams {
            message: format!("Missing required boolean parameter: {}", snake),
        })
}

/// Optional `channel_type` filter.
pub(crate) fn get_channel_param(params: &Value) -> Result<Option<ChannelType>> {
    get_str_param(params, "channel_type", "channelType")
        .map(str::parse)
        .transpose()
}

/// Deserialize the whole params object into a request struct.
pub(crate) fn parse_params<T: DeserializeOwned>(params: &Value) -> Result<T> {
    serde_json::from_value(params.clone()).map_err(|e| CpcError::InvalidParams {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snake_and_camel_case() {
        let params = json!({"interactionId": "abc", "direct": true});
        assert_eq!(
            get_str_param(&params, "interaction_id", "interactionId"),
            Some("abc")
        );
        assert!(require_bool_param(&params, "direct", "direct").unwrap());
        assert!(matches!(
            require_str_param(&params, "to", "to"),
            Err(CpcError::InvalidParams { .. })
        ));
    }

    #[test]
    fn test_channel_param() {
        assert_eq!(
            get_channel_param(&json!({"channelType": "phone"})).unwrap(),
            Some(ChannelType::Phone)
        );
        assert_eq!(get_channel_param(&json!({})).unwrap(), None);
        assert!(get_channel_param(&json!({"channel_type": "fax"})).is_err());
    }
}
