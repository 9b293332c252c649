//! JSON command parsing and dispatch.
//!
//! One `RawCommand` in, at most one [`CommandResponse`] out:
//!
//! 1. Parse the payload as a JSON object. Not an object → respond
//!    `JSON_PARSE_ERROR` (with an empty id — there is nothing to
//!    correlate against). Missing `id` → drop silently. Missing
//!    `command` → `JSON_INVALID_COMMAND`.
//! 2. Gate on the link: everything except `getStatus` requires the
//!    clock to be configured.
//! 3. Validate parameters, drive the link, translate link faults via
//!    [`SystemErrorCode`].

use log::{debug, warn};
use serde_json::{Map, Value, json};

use crate::app::{ClockTime, CommandResponse, RawCommand, StatusRegistry};
use crate::error::SystemErrorCode;
use crate::link::bus::ClockBus;
use crate::link::frame::ClockMode;
use crate::link::{ClockLink, frame};

/// Context the command handlers need besides the link itself.
pub struct DispatchCtx<'a> {
    pub status: &'a StatusRegistry,
    pub ble_connected: bool,
    pub now_ms: u64,
}

/// Parse and execute one raw command. `None` means the command was
/// dropped without a response (unparseable id).
pub fn handle<B: ClockBus>(
    raw: &RawCommand,
    link: &mut ClockLink<B>,
    ctx: &DispatchCtx<'_>,
) -> Option<CommandResponse> {
    let value: Value = match serde_json::from_slice(&raw.payload) {
        Ok(v) => v,
        Err(e) => {
            warn!("dispatch: unparseable command payload ({})", e);
            return Some(CommandResponse::failure(
                "",
                ctx.now_ms,
                SystemErrorCode::JsonParseError,
                "Invalid JSON",
            ));
        }
    };

    let Some(obj) = value.as_object() else {
        return Some(CommandResponse::failure(
            "",
            ctx.now_ms,
            SystemErrorCode::JsonParseError,
            "Command must be a JSON object",
        ));
    };

    let Some(id) = obj.get("id").and_then(Value::as_str) else {
        debug!("dispatch: command without id, dropped");
        return None;
    };
    if id.len() > 32 {
        debug!("dispatch: oversized id, dropped");
        return None;
    }

    let Some(command) = obj.get("command").and_then(Value::as_str) else {
        return Some(CommandResponse::failure(
            id,
            ctx.now_ms,
            SystemErrorCode::JsonInvalidCommand,
            "Missing command field",
        ));
    };

    let empty = Map::new();
    let params = obj
        .get("params")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    // Everything except getStatus talks to the clock.
    if command != "getStatus" && !link.is_configured() {
        return Some(CommandResponse::failure(
            id,
            ctx.now_ms,
            SystemErrorCode::DgtNotConfigured,
            "Clock not configured",
        ));
    }

    debug!("dispatch: '{}' (id={})", command, id);
    let result = match command {
        "setTime" => set_time(params, link),
        "displayText" => display_text(params, link),
        "endDisplay" => link
            .end_display()
            .map(|()| status_result("Display cleared"))
            .map_err(link_failure),
        "stop" => link
            .stop()
            .map(|()| status_result("Clock stopped"))
            .map_err(link_failure),
        "run" => run(params, link),
        "getTime" => Ok(time_result(&link.get_time())),
        "getStatus" => Ok(get_status(link, ctx)),
        _ => Err((SystemErrorCode::JsonInvalidCommand, "Unknown command".into())),
    };

    Some(match result {
        Ok(map) => CommandResponse::success(id, ctx.now_ms, map),
        Err((code, message)) => CommandResponse::failure(id, ctx.now_ms, code, &message),
    })
}

type CmdResult = Result<Map<String, Value>, (SystemErrorCode, String)>;

// ── Command handlers ─────────────────────────────────────────

fn set_time<B: ClockBus>(params: &Map<String, Value>, link: &mut ClockLink<B>) -> CmdResult {
    let left_mode = mode_param(params, "leftMode")?;
    let right_mode = mode_param(params, "rightMode")?;
    let time = ClockTime::new(
        int_param(params, "leftHours", 9)?,
        int_param(params, "leftMinutes", 59)?,
        int_param(params, "leftSeconds", 59)?,
        int_param(params, "rightHours", 9)?,
        int_param(params, "rightMinutes", 59)?,
        int_param(params, "rightSeconds", 59)?,
    );
    link.set_and_run(&time, left_mode, right_mode)
        .map(|()| status_result("Time set successfully"))
        .map_err(link_failure)
}

fn display_text<B: ClockBus>(params: &Map<String, Value>, link: &mut ClockLink<B>) -> CmdResult {
    let Some(text) = params.get("text").and_then(Value::as_str) else {
        return Err(invalid_param("text"));
    };
    if text.len() > frame::DISPLAY_TEXT_LEN || !text.is_ascii() {
        return Err(invalid_param("text"));
    }
    let beep = opt_int_param(params, "beep", frame::MAX_BEEP)?.unwrap_or(0);
    let left_dots = opt_int_param(params, "leftDots", u8::MAX)?.unwrap_or(0);
    let right_dots = opt_int_param(params, "rightDots", u8::MAX)?.unwrap_or(0);
    if left_dots & !frame::LEFT_DOTS_MASK != 0 {
        return Err(invalid_param("leftDots"));
    }
    if right_dots & !frame::RIGHT_DOTS_MASK != 0 {
        return Err(invalid_param("rightDots"));
    }

    // A stale text display would swallow the new one.
    link.end_display().map_err(link_failure)?;
    link.display_text(text, beep, left_dots, right_dots)
        .map(|()| status_result("Text displayed"))
        .map_err(link_failure)
}

fn run<B: ClockBus>(params: &Map<String, Value>, link: &mut ClockLink<B>) -> CmdResult {
    let left = mode_param(params, "leftMode")?;
    let right = mode_param(params, "rightMode")?;
    link.run(left, right)
        .map(|()| status_result("Clock running"))
        .map_err(link_failure)
}

fn get_status<B: ClockBus>(link: &ClockLink<B>, ctx: &DispatchCtx<'_>) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert("clockConnected".into(), Value::from(link.is_connected()));
    m.insert("clockConfigured".into(), Value::from(link.is_configured()));
    m.insert("bleConnected".into(), Value::from(ctx.ble_connected));
    m.insert(
        "lastErrorCode".into(),
        Value::from(link.last_error().map_or(0u16, |e| SystemErrorCode::from(e).code())),
    );
    m.insert("lastError".into(), Value::from(link.error_string()));
    m.insert(
        "commandsProcessed".into(),
        Value::from(ctx.status.commands_processed()),
    );
    m.insert(
        "eventsGenerated".into(),
        Value::from(ctx.status.events_generated()),
    );
    m.insert("uptimeMs".into(), Value::from(ctx.now_ms));
    m
}

// ── Helpers ──────────────────────────────────────────────────

fn time_result(time: &ClockTime) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert(
        "left".into(),
        json!({"hours": time.left_h, "minutes": time.left_m, "seconds": time.left_s}),
    );
    m.insert(
        "right".into(),
        json!({"hours": time.right_h, "minutes": time.right_m, "seconds": time.right_s}),
    );
    m
}

fn status_result(msg: &str) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert("status".into(), Value::from(msg));
    m
}

fn invalid_param(name: &str) -> (SystemErrorCode, String) {
    (
        SystemErrorCode::JsonInvalidParameters,
        format!("Invalid parameter: {name}"),
    )
}

/// Translate a link fault into the response error pair.
fn link_failure(e: crate::error::LinkError) -> (SystemErrorCode, String) {
    (SystemErrorCode::from(e), e.to_string())
}

fn int_param(
    params: &Map<String, Value>,
    name: &str,
    max: u8,
) -> Result<u8, (SystemErrorCode, String)> {
    opt_int_param(params, name, max)?.ok_or_else(|| invalid_param(name))
}

fn opt_int_param(
    params: &Map<String, Value>,
    name: &str,
    max: u8,
) -> Result<Option<u8>, (SystemErrorCode, String)> {
    match params.get(name) {
        None => Ok(None),
        Some(v) => match v.as_u64() {
            Some(n) if n <= u64::from(max) => Ok(Some(n as u8)),
            _ => Err(invalid_param(name)),
        },
    }
}

fn mode_param(
    params: &Map<String, Value>,
    name: &str,
) -> Result<ClockMode, (SystemErrorCode, String)> {
    let raw = int_param(params, name, 2)?;
    ClockMode::from_u8(raw).ok_or_else(|| invalid_param(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::error::{LinkError, LinkResult};
    use crate::link::RxShared;
    use crate::link::rx;
    use std::sync::Arc;

    /// Minimal bus: acks everything, remembers writes.
    struct AckBus {
        rx: Arc<RxShared>,
        writes: Vec<(u8, Vec<u8>)>,
        listen: u8,
        fail_all: bool,
    }

    impl ClockBus for AckBus {
        fn master_write(&mut self, addr: u8, f: &[u8]) -> LinkResult<()> {
            if self.fail_all {
                return Err(LinkError::I2cComm);
            }
            self.writes.push((addr, f.to_vec()));
            if self.listen == frame::ADDR_LISTEN_ACK {
                rx::dispatch_frame(&self.rx, &rx::make_ack_frame(f[2]));
            }
            Ok(())
        }
        fn set_listen_addr(&mut self, addr: u8) -> LinkResult<()> {
            self.listen = addr;
            Ok(())
        }
        fn listen_addr(&self) -> u8 {
            self.listen
        }
        fn poll_inbound(&mut self, _rx: &RxShared) {}
    }

    fn configured_link() -> ClockLink<AckBus> {
        let rx = Arc::new(RxShared::new());
        let bus = AckBus {
            rx: Arc::clone(&rx),
            writes: Vec::new(),
            listen: 0xFF,
            fail_all: false,
        };
        let mut cfg = GatewayConfig::default();
        cfg.ack_timeout_ms = 10;
        cfg.ack_poll_ms = 1;
        let mut link = ClockLink::new(bus, rx, cfg);
        link.begin().unwrap();
        link.configure().unwrap();
        link
    }

    fn dispatch(link: &mut ClockLink<AckBus>, payload: &str) -> Option<CommandResponse> {
        let status = StatusRegistry::new();
        let ctx = DispatchCtx {
            status: &status,
            ble_connected: true,
            now_ms: 1000,
        };
        let raw = RawCommand::new(1000, payload.as_bytes()).unwrap();
        handle(&raw, link, &ctx)
    }

    #[test]
    fn set_time_builds_correct_frame() {
        let mut link = configured_link();
        let writes_before = 4; // configure traffic
        let resp = dispatch(
            &mut link,
            r#"{"id":"c1","command":"setTime","params":{
                "leftMode":1,"leftHours":0,"leftMinutes":5,"leftSeconds":0,
                "rightMode":1,"rightHours":0,"rightMinutes":5,"rightSeconds":0}}"#,
        )
        .unwrap();
        assert!(resp.is_success());
        let v = resp.to_json();
        assert_eq!(v["result"]["status"], "Time set successfully");

        let f = &link.bus().writes[writes_before].1;
        assert_eq!(f[2], frame::CMD_SET_AND_RUN);
        assert_eq!(f[4], 0x05, "left minutes BCD");
        assert_eq!(f[9], 0x05, "mode byte 1 | 1<<2");
        assert!(crate::link::crc::verify(f));
    }

    #[test]
    fn unknown_command_is_rejected() {
        let mut link = configured_link();
        let resp = dispatch(&mut link, r#"{"id":"x","command":"foo"}"#).unwrap();
        let v = resp.to_json();
        assert_eq!(v["status"], "error");
        assert_eq!(
            v["data"]["errorCode"],
            SystemErrorCode::JsonInvalidCommand.code()
        );
        assert_eq!(v["data"]["errorMessage"], "Unknown command");
        // Link state untouched.
        assert!(link.is_configured());
    }

    #[test]
    fn missing_id_is_dropped_silently() {
        let mut link = configured_link();
        assert!(dispatch(&mut link, r#"{"command":"getTime"}"#).is_none());
        let long_id = format!(r#"{{"id":"{}","command":"getTime"}}"#, "a".repeat(33));
        assert!(dispatch(&mut link, &long_id).is_none());
    }

    #[test]
    fn missing_command_field() {
        let mut link = configured_link();
        let resp = dispatch(&mut link, r#"{"id":"q"}"#).unwrap();
        let v = resp.to_json();
        assert_eq!(
            v["data"]["errorCode"],
            SystemErrorCode::JsonInvalidCommand.code()
        );
    }

    #[test]
    fn unparseable_json() {
        let mut link = configured_link();
        let resp = dispatch(&mut link, "{nope").unwrap();
        let v = resp.to_json();
        assert_eq!(v["id"], "");
        assert_eq!(v["data"]["errorCode"], SystemErrorCode::JsonParseError.code());
    }

    #[test]
    fn commands_require_configured_except_get_status() {
        let rx = Arc::new(RxShared::new());
        let bus = AckBus {
            rx: Arc::clone(&rx),
            writes: Vec::new(),
            listen: 0xFF,
            fail_all: false,
        };
        let mut link = ClockLink::new(bus, rx, GatewayConfig::default());
        link.begin().unwrap();

        let resp = dispatch(&mut link, r#"{"id":"t","command":"getTime"}"#).unwrap();
        assert_eq!(
            resp.to_json()["data"]["errorCode"],
            SystemErrorCode::DgtNotConfigured.code()
        );

        let resp = dispatch(&mut link, r#"{"id":"s","command":"getStatus"}"#).unwrap();
        assert!(resp.is_success());
        let v = resp.to_json();
        assert_eq!(v["result"]["clockConfigured"], false);
        assert_eq!(v["result"]["bleConnected"], true);
    }

    #[test]
    fn set_time_validates_ranges() {
        let mut link = configured_link();
        let resp = dispatch(
            &mut link,
            r#"{"id":"c","command":"setTime","params":{
                "leftMode":1,"leftHours":10,"leftMinutes":0,"leftSeconds":0,
                "rightMode":1,"rightHours":0,"rightMinutes":0,"rightSeconds":0}}"#,
        )
        .unwrap();
        assert_eq!(
            resp.to_json()["data"]["errorCode"],
            SystemErrorCode::JsonInvalidParameters.code()
        );

        let resp = dispatch(
            &mut link,
            r#"{"id":"c","command":"setTime","params":{
                "leftMode":3,"leftHours":0,"leftMinutes":0,"leftSeconds":0,
                "rightMode":1,"rightHours":0,"rightMinutes":0,"rightSeconds":0}}"#,
        )
        .unwrap();
        assert_eq!(
            resp.to_json()["data"]["errorCode"],
            SystemErrorCode::JsonInvalidParameters.code()
        );
    }

    #[test]
    fn display_text_calls_end_display_first() {
        let mut link = configured_link();
        let before = link.bus().writes.len();
        let resp = dispatch(
            &mut link,
            r#"{"id":"d","command":"displayText","params":{"text":"hello","beep":2}}"#,
        )
        .unwrap();
        assert!(resp.is_success());
        let codes: Vec<u8> = link.bus().writes[before..].iter().map(|(_, f)| f[2]).collect();
        assert_eq!(codes, vec![frame::CMD_END_DISPLAY, frame::CMD_DISPLAY]);
        let display = &link.bus().writes.last().unwrap().1;
        assert_eq!(&display[3..8], b"hello");
        assert_eq!(display[14], 2, "beep byte");
    }

    #[test]
    fn display_text_validates_params() {
        let mut link = configured_link();
        for payload in [
            r#"{"id":"d","command":"displayText","params":{}}"#,
            r#"{"id":"d","command":"displayText","params":{"text":"twelve chars!"}}"#,
            r#"{"id":"d","command":"displayText","params":{"text":"ok","beep":49}}"#,
            r#"{"id":"d","command":"displayText","params":{"text":"ok","rightDots":32}}"#,
        ] {
            let resp = dispatch(&mut link, payload).unwrap();
            assert_eq!(
                resp.to_json()["data"]["errorCode"],
                SystemErrorCode::JsonInvalidParameters.code(),
                "payload: {payload}"
            );
        }
    }

    #[test]
    fn get_time_returns_snapshot() {
        let mut link = configured_link();
        let t = ClockTime::new(0, 15, 30, 1, 0, 0);
        rx::dispatch_frame(&link.rx(), &rx::make_time_frame(&t, false));
        let resp = dispatch(&mut link, r#"{"id":"g","command":"getTime"}"#).unwrap();
        let v = resp.to_json();
        assert_eq!(v["result"]["left"]["minutes"], 15);
        assert_eq!(v["result"]["right"]["hours"], 1);
    }

    #[test]
    fn link_fault_maps_to_wire_code() {
        let mut link = configured_link();
        link.bus_mut().fail_all = true;
        let resp = dispatch(
            &mut link,
            r#"{"id":"c","command":"setTime","params":{
                "leftMode":0,"leftHours":0,"leftMinutes":1,"leftSeconds":0,
                "rightMode":0,"rightHours":0,"rightMinutes":1,"rightSeconds":0}}"#,
        )
        .unwrap();
        assert_eq!(
            resp.to_json()["data"]["errorCode"],
            SystemErrorCode::I2cCommunicationError.code()
        );
        assert!(!link.is_connected(), "exhausted retries drop the link");
    }
}
