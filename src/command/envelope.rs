//! Command envelope type and structural validation (§4.E).

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::types::{ErrorCode, GridkeepError, Result};

pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024;
pub const MAX_PAYLOAD_DEPTH: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub command_id: Uuid,
    pub node_id: Option<Uuid>,
    pub command_type: String,
    pub payload: String,
    pub correlation_id: Uuid,
    pub tenant_id: Uuid,
    pub operator_id: Uuid,
}

/// The envelope after structural validation has parsed and depth-checked
/// its payload. Handlers operate on this, never the raw wire envelope.
pub struct ValidatedCommand {
    pub command_id: Uuid,
    pub node_id: Uuid,
    pub command_type: String,
    pub payload: JsonValue,
    pub correlation_id: Uuid,
    pub tenant_id: Uuid,
    pub operator_id: Uuid,
}

/// Structural validation (§4.E): every check here returns a `Rejected`
/// outcome, never panics, and never invokes a handler.
pub fn validate(envelope: &CommandEnvelope, bound_node_id: Option<Uuid>) -> Result<ValidatedCommand> {
    if envelope.command_type.trim().is_empty() {
        return Err(GridkeepError::typed(ErrorCode::UnknownCommandType, "command type is empty".to_string()));
    }

    let node_id = envelope
        .node_id
        .or(bound_node_id)
        .ok_or_else(|| GridkeepError::typed(ErrorCode::NotEnrolled, "no target node and no bound node identity".to_string()))?;

    if envelope.payload.len() > MAX_PAYLOAD_BYTES {
        return Err(GridkeepError::typed(
            ErrorCode::PayloadTooLarge,
            format!("payload is {} bytes, max is {MAX_PAYLOAD_BYTES}", envelope.payload.len()),
        ));
    }

    let payload: JsonValue = serde_json::from_str(&envelope.payload)
        .map_err(|e| GridkeepError::typed(ErrorCode::InvalidPayload, format!("payload is not valid JSON: {e}")))?;

    let depth = json_depth(&payload);
    if depth > MAX_PAYLOAD_DEPTH {
        return Err(GridkeepError::typed(
            ErrorCode::PayloadTooDeep,
            format!("payload nests {depth} levels deep, max is {MAX_PAYLOAD_DEPTH}"),
        ));
    }

    if payload.is_null() {
        return Err(GridkeepError::typed(ErrorCode::NullPayload, "payload parsed to JSON null".to_string()));
    }

    Ok(ValidatedCommand {
        command_id: envelope.command_id,
        node_id,
        command_type: envelope.command_type.to_ascii_lowercase(),
        payload,
        correlation_id: envelope.correlation_id,
        tenant_id: envelope.tenant_id,
        operator_id: envelope.operator_id,
    })
}

fn json_depth(value: &JsonValue) -> usize {
    match value {
        JsonValue::Object(map) => 1 + map.values().map(json_depth).max().unwrap_or(0),
        JsonValue::Array(items) => 1 + items.iter().map(json_depth).max().unwrap_or(0),
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_envelope(payload: &str) -> CommandEnvelope {
        CommandEnvelope {
            command_id: Uuid::new_v4(),
            node_id: Some(Uuid::new_v4()),
            command_type: "restart_server".to_string(),
            payload: payload.to_string(),
            correlation_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            operator_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn rejects_empty_command_type() {
        let mut env = base_envelope("{}");
        env.command_type = "".to_string();
        assert!(validate(&env, None).is_err());
    }

    #[test]
    fn falls_back_to_bound_node_id() {
        let mut env = base_envelope("{}");
        env.node_id = None;
        let bound = Uuid::new_v4();
        let validated = validate(&env, Some(bound)).unwrap();
        assert_eq!(validated.node_id, bound);
    }

    #[test]
    fn rejects_when_no_node_identity_at_all() {
        let mut env = base_envelope("{}");
        env.node_id = None;
        assert!(validate(&env, None).is_err());
    }

    #[test]
    fn rejects_oversized_payload() {
        let big = "x".repeat(MAX_PAYLOAD_BYTES + 1);
        let env = base_envelope(&format!("\"{big}\""));
        assert!(validate(&env, None).is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        let env = base_envelope("not json");
        assert!(validate(&env, None).is_err());
    }

    #[test]
    fn rejects_null_payload() {
        let env = base_envelope("null");
        assert!(validate(&env, None).is_err());
    }

    #[test]
    fn rejects_excessive_nesting() {
        let mut payload = "0".to_string();
        for _ in 0..(MAX_PAYLOAD_DEPTH + 5) {
            payload = format!("[{payload}]");
        }
        let env = base_envelope(&payload);
        assert!(validate(&env, None).is_err());
    }

    #[test]
    fn accepts_well_formed_shallow_payload() {
        let env = base_envelope(r#"{"action":"restart"}"#);
        let validated = validate(&env, None).unwrap();
        assert_eq!(validated.command_type, "restart_server");
    }
}
