//! Conversion between logical units and raw device units.
//!
//! Logical units are the human-facing ones: hue in degrees `[0, 360)`,
//! saturation and brightness in percent `[0, 100]`, duration and time in
//! seconds. Raw units are what the devices consume: 16-bit component values
//! and milliseconds. Kelvin is the same in both systems and is never
//! converted.

use strum::Display;

use crate::instruction::Register;
use crate::value::Value;

/// Whether registers currently hold logical or raw values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum UnitMode {
    Logical,
    Raw,
}

/// True for the registers whose contents differ between the two unit
/// systems.
pub fn requires_conversion(reg: Register) -> bool {
    matches!(
        reg,
        Register::Hue
            | Register::Saturation
            | Register::Brightness
            | Register::Duration
            | Register::Time
    )
}

/// Convert a logical value to raw device units. Non-numeric values and
/// non-convertible registers pass through unchanged.
pub fn as_raw(reg: Register, value: &Value) -> Value {
    let v = match value.as_f64() {
        Some(v) => v,
        None => return value.clone(),
    };
    match reg {
        Register::Hue => {
            Value::Integer(((v * 65536.0 / 360.0).round() as i64).rem_euclid(65536))
        }
        Register::Saturation | Register::Brightness => {
            Value::Integer((v * 65535.0 / 100.0).round() as i64)
        }
        Register::Duration | Register::Time => Value::Integer((v * 1000.0).round() as i64),
        _ => value.clone(),
    }
}

/// Convert a raw device value to logical units. Non-numeric values and
/// non-convertible registers pass through unchanged.
pub fn as_logical(reg: Register, value: &Value) -> Value {
    let v = match value.as_f64() {
        Some(v) => v,
        None => return value.clone(),
    };
    match reg {
        Register::Hue => Value::Float(v * 360.0 / 65536.0),
        Register::Saturation | Register::Brightness => Value::Float(v * 100.0 / 65535.0),
        Register::Duration | Register::Time => Value::Float(v / 1000.0),
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_hue_degrees() {
        assert_eq!(as_raw(Register::Hue, &Value::Integer(180)), Value::Integer(32768));
        assert_eq!(as_raw(Register::Hue, &Value::Float(360.0)), Value::Integer(0));
        assert_eq!(as_raw(Register::Hue, &Value::Integer(0)), Value::Integer(0));
    }

    #[test]
    fn test_percent_components() {
        assert_eq!(
            as_raw(Register::Saturation, &Value::Integer(20)),
            Value::Integer(13107)
        );
        assert_eq!(
            as_raw(Register::Brightness, &Value::Integer(40)),
            Value::Integer(26214)
        );
        assert_eq!(
            as_raw(Register::Brightness, &Value::Float(100.0)),
            Value::Integer(65535)
        );
    }

    #[test]
    fn test_seconds_to_milliseconds() {
        assert_eq!(as_raw(Register::Time, &Value::Float(1.5)), Value::Integer(1500));
        assert_eq!(as_logical(Register::Duration, &Value::Integer(500)), Value::Float(0.5));
    }

    #[test]
    fn test_kelvin_untouched() {
        assert_eq!(as_raw(Register::Kelvin, &Value::Integer(2500)), Value::Integer(2500));
        assert_eq!(as_logical(Register::Kelvin, &Value::Integer(2500)), Value::Integer(2500));
        assert!(!requires_conversion(Register::Kelvin));
    }

    #[test]
    fn test_non_numeric_passthrough() {
        let name = Value::Str("Top".into());
        assert_eq!(as_raw(Register::Hue, &name), name);
    }

    proptest! {
        #[test]
        fn round_trip_hue_within_one(v in 0.0f64..360.0) {
            let raw = as_raw(Register::Hue, &Value::Float(v));
            let back = as_logical(Register::Hue, &raw).as_f64().unwrap();
            let diff = (back - v).abs().min((back - v + 360.0).abs()).min((back - v - 360.0).abs());
            prop_assert!(diff <= 1.0);
        }

        #[test]
        fn round_trip_percent_within_one(v in 0.0f64..=100.0) {
            for reg in [Register::Saturation, Register::Brightness] {
                let raw = as_raw(reg, &Value::Float(v));
                let back = as_logical(reg, &raw).as_f64().unwrap();
                prop_assert!((back - v).abs() <= 1.0);
            }
        }

        #[test]
        fn round_trip_seconds_within_one(v in 0.0f64..3600.0) {
            let raw = as_raw(Register::Time, &Value::Float(v));
            let back = as_logical(Register::Time, &raw).as_f64().unwrap();
            prop_assert!((back - v).abs() <= 1.0);
        }
    }
}
