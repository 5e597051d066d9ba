//! Time helpers available to every script
//!
//! Scripts have no arithmetic on dates, so [`ScriptDateTime`] carries
//! `add`/`sub` and the comparison methods `lt`, `le`, `gt`, `ge`, `eq`.

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Timelike, Utc};
use minijinja::value::{Kwargs, Object, ObjectRepr, Value};
use minijinja::{Error, ErrorKind, State};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

fn bad(msg: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, msg.into())
}

fn wrap(at: DateTime<Utc>) -> Value {
    Value::from_object(ScriptDateTime(at))
}

fn first<'a>(args: &'a [Value], method: &str) -> Result<&'a Value, Error> {
    args.first()
        .ok_or_else(|| bad(format!("{method}() takes one argument")))
}

pub fn now() -> Value {
    wrap(Utc::now())
}

/// Alias of [`now`]; every datetime is UTC
pub fn utcnow() -> Value {
    wrap(Utc::now())
}

/// Accepts `weeks`, `days`, `hours`, `minutes`, `seconds`, `milliseconds`
pub fn timedelta(kwargs: Kwargs) -> Result<Value, Error> {
    const UNITS_MS: [(&str, f64); 6] = [
        ("weeks", 604_800_000.0),
        ("days", 86_400_000.0),
        ("hours", 3_600_000.0),
        ("minutes", 60_000.0),
        ("seconds", 1_000.0),
        ("milliseconds", 1.0),
    ];

    let mut total_ms = 0.0;
    for (unit, ms) in UNITS_MS {
        total_ms += kwargs.get::<Option<f64>>(unit)?.unwrap_or_default() * ms;
    }
    kwargs.assert_all_used()?;

    Ok(Value::from_object(ScriptDuration(Duration::milliseconds(
        total_ms.round() as i64,
    ))))
}

fn epoch(secs: f64) -> Result<DateTime<Utc>, Error> {
    let whole = secs.floor();
    let nanos = (((secs - whole) * 1e9).round() as u32).min(999_999_999);
    DateTime::from_timestamp(whole as i64, nanos)
        .ok_or_else(|| bad(format!("{secs} is outside the supported time range")))
}

fn parse_text(s: &str) -> Result<DateTime<Utc>, Error> {
    if let Ok(at) = DateTime::parse_from_rfc3339(s) {
        return Ok(at.with_timezone(&Utc));
    }
    if let Some(at) = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    {
        return Ok(at.and_utc());
    }
    match s.parse::<f64>() {
        Ok(secs) => epoch(secs),
        Err(_) => Err(bad(format!("'{s}' is not a recognizable date or time"))),
    }
}

/// Datetime object, ISO text or epoch seconds
fn instant(value: &Value) -> Result<DateTime<Utc>, Error> {
    if let Some(wrapped) = value.downcast_object_ref::<ScriptDateTime>() {
        return Ok(wrapped.0);
    }
    if let Some(text) = value.as_str() {
        return parse_text(text);
    }
    let secs = f64::try_from(value.clone())
        .ok()
        .or_else(|| value.as_i64().map(|i| i as f64));
    match secs {
        Some(secs) => epoch(secs),
        None => Err(bad(format!("{value} cannot be used as a date or time"))),
    }
}

fn seconds(d: Duration) -> f64 {
    d.num_milliseconds() as f64 / 1000.0
}

pub fn as_timestamp(value: Value) -> Result<f64, Error> {
    Ok(instant(&value)?.timestamp_millis() as f64 / 1000.0)
}

pub fn as_datetime(value: Value) -> Result<Value, Error> {
    instant(&value).map(wrap)
}

/// Elapsed seconds; negative for instants in the future
pub fn time_since(value: Value) -> Result<f64, Error> {
    Ok(seconds(Utc::now() - instant(&value)?))
}

/// A point in time as seen by scripts; renders as RFC 3339
#[derive(Debug, Clone)]
pub struct ScriptDateTime(pub DateTime<Utc>);

impl fmt::Display for ScriptDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339())
    }
}

impl Object for ScriptDateTime {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let at = &self.0;
        let field = match key.as_str()? {
            "year" => at.year() as i64,
            "month" => at.month() as i64,
            "day" => at.day() as i64,
            "hour" => at.hour() as i64,
            "minute" => at.minute() as i64,
            "second" => at.second() as i64,
            "weekday" => at.weekday().num_days_from_monday() as i64,
            "timestamp" => at.timestamp(),
            _ => return None,
        };
        Some(Value::from(field))
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State,
        name: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        let compared = |args: &[Value]| -> Result<Ordering, Error> {
            Ok(self.0.cmp(&instant(first(args, name)?)?))
        };

        let result = match name {
            "isoformat" => Value::from(self.0.to_rfc3339()),
            "timestamp" => Value::from(self.0.timestamp_millis() as f64 / 1000.0),
            "strftime" => {
                let pattern = first(args, name)?
                    .as_str()
                    .ok_or_else(|| bad("strftime() takes a format string"))?;
                Value::from(self.0.format(pattern).to_string())
            }
            "add" => match first(args, name)?.downcast_object_ref::<ScriptDuration>() {
                Some(delta) => wrap(self.0 + delta.0),
                None => return Err(bad("add() takes a timedelta")),
            },
            "sub" => {
                let other = first(args, name)?;
                match other.downcast_object_ref::<ScriptDuration>() {
                    Some(delta) => wrap(self.0 - delta.0),
                    None => Value::from_object(ScriptDuration(self.0 - instant(other)?)),
                }
            }
            "lt" => Value::from(compared(args)?.is_lt()),
            "le" => Value::from(compared(args)?.is_le()),
            "gt" => Value::from(compared(args)?.is_gt()),
            "ge" => Value::from(compared(args)?.is_ge()),
            "eq" => Value::from(compared(args)?.is_eq()),
            other => return Err(bad(format!("datetime has no method '{other}'"))),
        };
        Ok(result)
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }

    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }
}

/// Result of `timedelta(...)` or of subtracting two datetimes
#[derive(Debug, Clone)]
pub struct ScriptDuration(pub Duration);

impl fmt::Display for ScriptDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.num_seconds();
        let sign = if secs < 0 { "-" } else { "" };
        let secs = secs.abs();
        write!(f, "{sign}{}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
    }
}

impl Object for ScriptDuration {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        match key.as_str()? {
            "days" => Some(Value::from(self.0.num_days())),
            "seconds" => Some(Value::from(self.0.num_seconds() % 86_400)),
            _ => None,
        }
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State,
        name: &str,
        _args: &[Value],
    ) -> Result<Value, Error> {
        if name == "total_seconds" {
            Ok(Value::from(seconds(self.0)))
        } else {
            Err(bad(format!("timedelta has no method '{name}'")))
        }
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }

    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }
}
