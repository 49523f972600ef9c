//! Inbound control actions.
//!
//! Every adapter (OSC, HTTP, internal automation outputs) turns its input
//! into a [`ControlAction`] through the same segment parser, so
//! `/ontime/start/index/2` and `POST /api/start/index/2` mean the same thing.

use rosc::OscType;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::aux_timer::AuxDirection;
use crate::error::ControlError;

/// OSC address prefix for control messages.
pub const OSC_PREFIX: &str = "/ontime/";

/// How an action refers to an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTarget {
    Id(String),
    /// Position in the playable order.
    Index(usize),
    Cue(String),
}

impl fmt::Display for EventTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTarget::Id(id) => write!(f, "{id}"),
            EventTarget::Index(index) => write!(f, "index {index}"),
            EventTarget::Cue(cue) => write!(f, "cue {cue}"),
        }
    }
}

/// Aux timer operations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuxAction {
    Start,
    Pause,
    Stop,
    SetDuration(i64),
    SetDirection(AuxDirection),
}

/// An operator action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    /// Start the loaded event, or load and start a target.
    Start(Option<EventTarget>),
    Load(EventTarget),
    Pause,
    Stop,
    Roll,
    Reload,
    Next,
    Previous,
    AddTime(i64),
    Skip(String),
    Aux(AuxAction),
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlAction::Start(None) => write!(f, "start"),
            ControlAction::Start(Some(target)) => write!(f, "start {target}"),
            ControlAction::Load(target) => write!(f, "load {target}"),
            ControlAction::Pause => write!(f, "pause"),
            ControlAction::Stop => write!(f, "stop"),
            ControlAction::Roll => write!(f, "roll"),
            ControlAction::Reload => write!(f, "reload"),
            ControlAction::Next => write!(f, "next"),
            ControlAction::Previous => write!(f, "previous"),
            ControlAction::AddTime(ms) => write!(f, "addtime {ms}"),
            ControlAction::Skip(id) => write!(f, "skip {id}"),
            ControlAction::Aux(action) => write!(f, "auxtimer {action:?}"),
        }
    }
}

/// Parse an OSC address and its arguments.
///
/// The first argument stands in for a missing trailing path segment, so
/// `/ontime/addtime 5000` equals `/ontime/addtime/5000`. It is ignored when
/// the path already carries the value.
pub fn parse_osc(addr: &str, args: &[OscType]) -> Result<ControlAction, ControlError> {
    let rest = addr
        .strip_prefix(OSC_PREFIX)
        .ok_or_else(|| ControlError::BadPrefix(addr.to_string()))?;
    let arg = args.first().and_then(osc_arg_to_string);
    let mut segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
    if let Some(arg) = arg.as_deref().filter(|_| wants_value(&segments)) {
        segments.push(arg);
    }
    parse_segments(&segments)
}

/// Whether the path ends where a value is still expected.
fn wants_value(segments: &[&str]) -> bool {
    let Some((name, args)) = segments.split_first() else {
        return false;
    };
    match name.to_ascii_lowercase().as_str() {
        "start" | "load" => matches!(args, [] | ["index"] | ["cue"] | ["id"]),
        "addtime" | "skip" => args.is_empty(),
        "auxtimer" => matches!(args, ["1"] | ["1", "duration"] | ["1", "direction"]),
        _ => false,
    }
}

/// Parse an action name with an optional value, as used in automation
/// outputs and by the HTTP adapter.
pub fn parse_action(action: &str, value: Option<&str>) -> Result<ControlAction, ControlError> {
    let mut segments: Vec<&str> = action.split('/').filter(|s| !s.is_empty()).collect();
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        segments.push(value);
    }
    parse_segments(&segments)
}

/// Parse path segments such as `["start", "cue", "A1"]`.
pub fn parse_segments(segments: &[&str]) -> Result<ControlAction, ControlError> {
    let Some((&name, args)) = segments.split_first() else {
        return Err(ControlError::UnknownAction(String::new()));
    };
    let action = name.to_ascii_lowercase();
    match action.as_str() {
        "start" => Ok(ControlAction::Start(parse_target(&action, args)?)),
        "load" => parse_target(&action, args)?
            .map(ControlAction::Load)
            .ok_or_else(|| bad(&action, "missing target")),
        "pause" => Ok(ControlAction::Pause),
        "stop" => Ok(ControlAction::Stop),
        "roll" => Ok(ControlAction::Roll),
        "reload" => Ok(ControlAction::Reload),
        "next" => Ok(ControlAction::Next),
        "previous" => Ok(ControlAction::Previous),
        "addtime" => {
            let value = args.first().ok_or_else(|| bad(&action, "missing time"))?;
            Ok(ControlAction::AddTime(parse_millis(&action, value)?))
        }
        "skip" => args
            .first()
            .map(|id| ControlAction::Skip((*id).to_string()))
            .ok_or_else(|| bad(&action, "missing event id")),
        "auxtimer" => parse_aux(&action, args).map(ControlAction::Aux),
        _ => Err(ControlError::UnknownAction(name.to_string())),
    }
}

fn parse_target(action: &str, args: &[&str]) -> Result<Option<EventTarget>, ControlError> {
    match args {
        [] => Ok(None),
        ["index", n] => n
            .parse()
            .map(|i| Some(EventTarget::Index(i)))
            .map_err(|_| bad(action, &format!("invalid index {n}"))),
        ["cue", cue] => Ok(Some(EventTarget::Cue((*cue).to_string()))),
        ["id", id] | [id] => Ok(Some(EventTarget::Id((*id).to_string()))),
        _ => Err(bad(action, "too many arguments")),
    }
}

fn parse_aux(action: &str, args: &[&str]) -> Result<AuxAction, ControlError> {
    // only one aux timer exists
    let args = match args {
        ["1", rest @ ..] => rest,
        _ => return Err(bad(action, "unknown aux timer")),
    };
    match args {
        ["start"] => Ok(AuxAction::Start),
        ["pause"] => Ok(AuxAction::Pause),
        ["stop"] => Ok(AuxAction::Stop),
        ["duration", value] => parse_millis(action, value).map(AuxAction::SetDuration),
        ["direction", "count_up"] | ["direction", "up"] => {
            Ok(AuxAction::SetDirection(AuxDirection::CountUp))
        }
        ["direction", "count_down"] | ["direction", "down"] => {
            Ok(AuxAction::SetDirection(AuxDirection::CountDown))
        }
        _ => Err(bad(action, "unknown aux timer command")),
    }
}

/// Plain signed milliseconds or a human duration such as `5m` or `-1m30s`.
fn parse_millis(action: &str, value: &str) -> Result<i64, ControlError> {
    let value = value.trim();
    if let Ok(ms) = value.parse::<i64>() {
        return Ok(ms);
    }
    if let Ok(ms) = value.parse::<f64>() {
        if !ms.is_finite() || ms.abs() >= i64::MAX as f64 {
            return Err(bad(action, &format!("invalid time {value}")));
        }
        return Ok(ms.round() as i64);
    }
    let (sign, magnitude) = match value.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, value.strip_prefix('+').unwrap_or(value)),
    };
    humantime::parse_duration(magnitude)
        .map(|d| sign * d.as_millis() as i64)
        .map_err(|e| bad(action, &format!("invalid time {value}: {e}")))
}

fn osc_arg_to_string(arg: &OscType) -> Option<String> {
    match arg {
        OscType::Int(v) => Some(v.to_string()),
        OscType::Long(v) => Some(v.to_string()),
        OscType::Float(v) => Some(v.to_string()),
        OscType::Double(v) => Some(v.to_string()),
        OscType::String(v) => Some(v.clone()),
        _ => None,
    }
}

fn bad(action: &str, reason: &str) -> ControlError {
    ControlError::BadArgument {
        action: action.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_actions() {
        assert_eq!(parse_osc("/ontime/pause", &[]), Ok(ControlAction::Pause));
        assert_eq!(parse_osc("/ontime/roll/", &[]), Ok(ControlAction::Roll));
        assert_eq!(parse_osc("/ontime/start", &[]), Ok(ControlAction::Start(None)));
    }

    #[test]
    fn test_targets() {
        assert_eq!(
            parse_osc("/ontime/start/index/2", &[]),
            Ok(ControlAction::Start(Some(EventTarget::Index(2))))
        );
        assert_eq!(
            parse_osc("/ontime/load/cue/A1", &[]),
            Ok(ControlAction::Load(EventTarget::Cue("A1".to_string())))
        );
        assert_eq!(
            parse_osc("/ontime/load", &[OscType::String("abc".to_string())]),
            Ok(ControlAction::Load(EventTarget::Id("abc".to_string())))
        );
        assert!(matches!(
            parse_osc("/ontime/load", &[]),
            Err(ControlError::BadArgument { .. })
        ));
    }

    #[test]
    fn test_addtime_formats() {
        assert_eq!(parse_osc("/ontime/addtime/5000", &[]), Ok(ControlAction::AddTime(5000)));
        assert_eq!(
            parse_osc("/ontime/addtime", &[OscType::Int(-2000)]),
            Ok(ControlAction::AddTime(-2000))
        );
        assert_eq!(parse_osc("/ontime/addtime/1m", &[]), Ok(ControlAction::AddTime(60_000)));
        assert_eq!(
            parse_osc("/ontime/addtime/-30s", &[]),
            Ok(ControlAction::AddTime(-30_000))
        );
        assert!(parse_osc("/ontime/addtime/soon", &[]).is_err());
    }

    #[test]
    fn test_argument_ignored_when_path_is_complete() {
        let arg = [OscType::String("e2".to_string())];
        assert_eq!(
            parse_osc("/ontime/start/e1", &arg),
            Ok(ControlAction::Start(Some(EventTarget::Id("e1".to_string()))))
        );
        assert_eq!(
            parse_osc("/ontime/start/cue", &[OscType::String("A1".to_string())]),
            Ok(ControlAction::Start(Some(EventTarget::Cue("A1".to_string()))))
        );
        assert_eq!(
            parse_osc("/ontime/addtime/1000", &[OscType::Int(5000)]),
            Ok(ControlAction::AddTime(1000))
        );
        assert_eq!(
            parse_osc("/ontime/auxtimer/1/start", &[OscType::Int(1)]),
            Ok(ControlAction::Aux(AuxAction::Start))
        );
        assert_eq!(
            parse_osc("/ontime/auxtimer/1/duration", &[OscType::Int(3000)]),
            Ok(ControlAction::Aux(AuxAction::SetDuration(3000)))
        );
        assert_eq!(parse_osc("/ontime/pause", &arg), Ok(ControlAction::Pause));
    }

    #[test]
    fn test_non_finite_time_rejected() {
        assert!(matches!(
            parse_osc("/ontime/addtime", &[OscType::Float(f32::INFINITY)]),
            Err(ControlError::BadArgument { .. })
        ));
        assert!(matches!(
            parse_osc("/ontime/addtime", &[OscType::Double(f64::NAN)]),
            Err(ControlError::BadArgument { .. })
        ));
        assert!(parse_action("addtime", Some("inf")).is_err());
        assert!(parse_action("addtime", Some("1e300")).is_err());
        assert_eq!(
            parse_osc("/ontime/addtime", &[OscType::Float(1500.4)]),
            Ok(ControlAction::AddTime(1500))
        );
    }

    #[test]
    fn test_rejects_foreign_prefix_and_unknown_action() {
        assert_eq!(
            parse_osc("/other/start", &[]),
            Err(ControlError::BadPrefix("/other/start".to_string()))
        );
        assert_eq!(
            parse_osc("/ontime/explode", &[]),
            Err(ControlError::UnknownAction("explode".to_string()))
        );
    }

    #[test]
    fn test_aux_timer() {
        assert_eq!(
            parse_osc("/ontime/auxtimer/1/start", &[]),
            Ok(ControlAction::Aux(AuxAction::Start))
        );
        assert_eq!(
            parse_osc("/ontime/auxtimer/1/duration/10m", &[]),
            Ok(ControlAction::Aux(AuxAction::SetDuration(600_000)))
        );
        assert!(parse_osc("/ontime/auxtimer/2/start", &[]).is_err());
    }

    #[test]
    fn test_parse_action_with_value() {
        assert_eq!(
            parse_action("skip", Some("e1")),
            Ok(ControlAction::Skip("e1".to_string()))
        );
        assert_eq!(parse_action("next", None), Ok(ControlAction::Next));
        assert_eq!(
            parse_action("start/index", Some("0")),
            Ok(ControlAction::Start(Some(EventTarget::Index(0))))
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ControlAction::Start(Some(EventTarget::Index(3))).to_string(),
            "start index 3"
        );
        assert_eq!(ControlAction::AddTime(-5).to_string(), "addtime -5");
    }
}
