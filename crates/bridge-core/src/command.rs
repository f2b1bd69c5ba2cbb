//! Inbound command surface
//!
//! Commands arrive from the application runtime over the dispatch channel as
//! a method name plus an argument map. Parsing validates required fields up
//! front: a malformed command is rejected with a structured error before any
//! state is mutated.

use serde_json::Value;

use crate::call::CallId;
use crate::config::{BridgeConfig, CallParams};
use crate::error::{BridgeError, BridgeResult};

/// A validated inbound command
#[derive(Debug, Clone)]
pub enum Command {
    Configure(BridgeConfig),
    ShowIncomingCall(CallParams),
    ShowOutgoingCall(CallParams),
    EndCall { call_id: CallId },
    EndAllCalls,
    SetCallConnected { call_id: CallId },
    GetActiveCalls,
    CheckPermissions,
    RequestPermissions,
    GetToken,
    MuteCall { call_id: CallId, muted: bool },
    HoldCall { call_id: CallId, held: bool },
    Dispose,
}

impl Command {
    /// Parse a wire command. Unknown methods and missing required fields are
    /// rejected here, so no handler ever sees a partially valid command.
    pub fn parse(method: &str, args: Value) -> BridgeResult<Command> {
        match method {
            "configure" => Ok(Command::Configure(parse_payload(method, args)?)),
            "showIncomingCall" => Ok(Command::ShowIncomingCall(parse_call_params(method, args)?)),
            "showOutgoingCall" => Ok(Command::ShowOutgoingCall(parse_call_params(method, args)?)),
            "endCall" => Ok(Command::EndCall { call_id: require_call_id(&args)? }),
            "endAllCalls" => Ok(Command::EndAllCalls),
            "setCallConnected" => Ok(Command::SetCallConnected { call_id: require_call_id(&args)? }),
            "getActiveCalls" => Ok(Command::GetActiveCalls),
            "checkPermissions" => Ok(Command::CheckPermissions),
            "requestPermissions" => Ok(Command::RequestPermissions),
            "getToken" => Ok(Command::GetToken),
            "muteCall" => Ok(Command::MuteCall {
                call_id: require_call_id(&args)?,
                muted: bool_arg(&args, "muted", true),
            }),
            "holdCall" => Ok(Command::HoldCall {
                call_id: require_call_id(&args)?,
                held: bool_arg(&args, "held", true),
            }),
            "dispose" => Ok(Command::Dispose),
            other => Err(BridgeError::invalid_command(format!("unknown method '{}'", other))),
        }
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(method: &str, args: Value) -> BridgeResult<T> {
    serde_json::from_value(args)
        .map_err(|e| BridgeError::invalid_command(format!("{}: {}", method, e)))
}

fn parse_call_params(method: &str, args: Value) -> BridgeResult<CallParams> {
    let params: CallParams = parse_payload(method, args)?;
    if params.call_id.is_empty() {
        return Err(BridgeError::missing_field("callId"));
    }
    Ok(params)
}

fn require_call_id(args: &Value) -> BridgeResult<CallId> {
    args.get("callId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| BridgeError::missing_field("callId"))
}

fn bool_arg(args: &Value, field: &str, default: bool) -> bool {
    args.get(field).and_then(Value::as_bool).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_end_call() {
        let command = Command::parse("endCall", json!({"callId": "c1"})).unwrap();
        assert!(matches!(command, Command::EndCall { call_id } if call_id == "c1"));
    }

    #[test]
    fn missing_call_id_is_rejected() {
        for args in [json!({}), json!({"callId": ""}), json!({"callId": 7})] {
            let err = Command::parse("endCall", args).unwrap_err();
            assert!(matches!(err, BridgeError::MissingField { ref field } if field == "callId"));
        }
    }

    #[test]
    fn show_incoming_requires_call_id() {
        let err = Command::parse("showIncomingCall", json!({"callerName": "Alice"})).unwrap_err();
        assert!(matches!(err, BridgeError::MissingField { .. }));

        let command =
            Command::parse("showIncomingCall", json!({"callId": "c1", "callerName": "Alice"})).unwrap();
        assert!(matches!(command, Command::ShowIncomingCall(p) if p.caller_name == "Alice"));
    }

    #[test]
    fn unknown_method_is_rejected() {
        let err = Command::parse("selfDestruct", json!({})).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidCommand { .. }));
    }

    #[test]
    fn mute_defaults_to_true() {
        let command = Command::parse("muteCall", json!({"callId": "c1"})).unwrap();
        assert!(matches!(command, Command::MuteCall { muted: true, .. }));

        let command = Command::parse("muteCall", json!({"callId": "c1", "muted": false})).unwrap();
        assert!(matches!(command, Command::MuteCall { muted: false, .. }));
    }

    #[test]
    fn configure_parses_full_payload() {
        let command = Command::parse(
            "configure",
            json!({
                "appName": "Example",
                "ringTimeoutMs": 45000,
                "backgroundAction": { "urlTemplate": "https://x/{callId}/decline" }
            }),
        )
        .unwrap();
        let Command::Configure(config) = command else { panic!("expected configure") };
        assert_eq!(config.app_name, "Example");
        assert!(config.background_action.is_some());
    }

    #[test]
    fn malformed_configure_is_rejected() {
        let err = Command::parse("configure", json!({"ringTimeoutMs": "soon"})).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidCommand { .. }));
    }
}
