//! Human-readable formatting for energy and power magnitudes.
//!
//! All functions are pure; the unit mode is passed in by the caller's
//! display session rather than read from global state.
use std::fmt;

use serde::{Deserialize, Serialize};

/// Narrow no-break space between the number and its unit.
pub const UNIT_SEPARATOR: char = '\u{202f}';

const SMALL_PREFIXES: [&str; 4] = ["", "m", "\u{3bc}", "n"];
const BIG_PREFIXES: [&str; 6] = ["", "k", "M", "G", "T", "P"];
const SECONDS_PER_HOUR: f64 = 3600.0;

/// How energy totals are displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitMode {
    #[default]
    Joule,
    WattHour,
}

impl UnitMode {
    pub fn toggle(self) -> Self {
        match self {
            UnitMode::Joule => UnitMode::WattHour,
            UnitMode::WattHour => UnitMode::Joule,
        }
    }
}

impl fmt::Display for UnitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitMode::Joule => write!(f, "J"),
            UnitMode::WattHour => write!(f, "Wh"),
        }
    }
}

/// What a magnitude measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    /// Joules.
    Energy,
    /// Joules per second.
    Power,
}

/// Power-of-1000 exponent for `magnitude`, clamped to the prefix ladder.
fn exponent(magnitude: f64) -> i32 {
    if magnitude == 0.0 {
        return 0;
    }
    let raw = (magnitude.abs().log10() / 3.0).floor() as i32;
    raw.clamp(
        -(SMALL_PREFIXES.len() as i32 - 1),
        BIG_PREFIXES.len() as i32 - 1,
    )
}

fn prefix(exponent: i32) -> &'static str {
    if exponent >= 0 {
        BIG_PREFIXES[exponent as usize]
    } else {
        SMALL_PREFIXES[(-exponent) as usize]
    }
}

/// Scale `magnitude` onto the SI ladder and append `unit`.
///
/// Returns values like `"1.5 kJ"`, `"250.0 mW"`, `"0.0 J"`.
pub fn si_prefixed(magnitude: f64, unit: &str) -> String {
    if !magnitude.is_finite() {
        return format!("--{UNIT_SEPARATOR}{unit}");
    }
    let exp = exponent(magnitude);
    let scaled = magnitude / 1000f64.powi(exp);
    format!("{scaled:.1}{UNIT_SEPARATOR}{}{unit}", prefix(exp))
}

/// Format a magnitude of the given kind in the given unit mode.
pub fn format_quantity(magnitude: f64, kind: Quantity, mode: UnitMode) -> String {
    match (kind, mode) {
        (Quantity::Energy, UnitMode::Joule) => si_prefixed(magnitude, "J"),
        (Quantity::Energy, UnitMode::WattHour) => si_prefixed(magnitude / SECONDS_PER_HOUR, "Wh"),
        (Quantity::Power, _) => si_prefixed(magnitude, "W"),
    }
}

pub fn format_energy(joules: f64, mode: UnitMode) -> String {
    format_quantity(joules, Quantity::Energy, mode)
}

pub fn format_power(watts: f64) -> String {
    format_quantity(watts, Quantity::Power, UnitMode::Joule)
}

/// Format a ratio (0.0–1.0) as a percentage.
///
/// Returns `"--%"` for NaN, otherwise values like `"63.4%"`.
pub fn format_ratio(ratio: f64) -> String {
    if ratio.is_nan() {
        "--%".into()
    } else {
        format!("{:.1}%", ratio * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> String {
        text.replace(' ', &UNIT_SEPARATOR.to_string())
    }

    #[test]
    fn zero_energy_has_no_prefix() {
        assert_eq!(format_energy(0.0, UnitMode::Joule), s("0.0 J"));
    }

    #[test]
    fn zero_in_watt_hours() {
        assert_eq!(format_energy(0.0, UnitMode::WattHour), s("0.0 Wh"));
    }

    #[test]
    fn below_one_thousand_stays_unprefixed() {
        assert_eq!(format_energy(448.0, UnitMode::Joule), s("448.0 J"));
    }

    #[test]
    fn exact_thousand_moves_up_a_prefix() {
        assert_eq!(format_energy(1000.0, UnitMode::Joule), s("1.0 kJ"));
    }

    #[test]
    fn mega_range() {
        assert_eq!(format_energy(3_400_000.0, UnitMode::Joule), s("3.4 MJ"));
    }

    #[test]
    fn small_power_uses_milli_and_micro() {
        assert_eq!(format_power(0.25), s("250.0 mW"));
        assert_eq!(format_power(0.000_002_5), s("2.5 \u{3bc}W"));
    }

    #[test]
    fn watt_hour_mode_divides_by_3600() {
        assert_eq!(format_energy(3600.0, UnitMode::WattHour), s("1.0 Wh"));
        assert_eq!(format_energy(7_200_000.0, UnitMode::WattHour), s("2.0 kWh"));
    }

    #[test]
    fn power_ignores_unit_mode() {
        assert_eq!(
            format_quantity(1500.0, Quantity::Power, UnitMode::WattHour),
            s("1.5 kW")
        );
    }

    #[test]
    fn huge_values_clamp_to_peta() {
        // 1e20 J is 1e5 PJ: the exponent stops at the top of the ladder.
        assert_eq!(format_energy(1.0e20, UnitMode::Joule), s("100000.0 PJ"));
    }

    #[test]
    fn tiny_values_clamp_to_nano() {
        assert_eq!(format_energy(2.0e-12, UnitMode::Joule), s("0.0 nJ"));
    }

    #[test]
    fn negative_values_keep_their_sign() {
        assert_eq!(format_energy(-1500.0, UnitMode::Joule), s("-1.5 kJ"));
    }

    #[test]
    fn non_finite_input_is_placeholder() {
        assert_eq!(format_power(f64::NAN), s("-- W"));
        assert_eq!(format_energy(f64::INFINITY, UnitMode::Joule), s("-- J"));
    }

    #[test]
    fn unit_mode_toggles_back_and_forth() {
        assert_eq!(UnitMode::Joule.toggle(), UnitMode::WattHour);
        assert_eq!(UnitMode::Joule.toggle().toggle(), UnitMode::Joule);
    }

    #[test]
    fn format_ratio_values() {
        assert_eq!(format_ratio(0.634), "63.4%");
        assert_eq!(format_ratio(0.0), "0.0%");
        assert_eq!(format_ratio(f64::NAN), "--%");
    }
}
