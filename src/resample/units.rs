//! Post-aggregation unit conversion.

use std::collections::BTreeMap;
use tracing::warn;

use crate::config::UnitRule;
use crate::diagnostics::Diagnostics;

/// Conversion functions that can be referenced by name in the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedConversion {
    FahrenheitToCelsius,
}

impl NamedConversion {
    /// Case-insensitive lookup; `FtoC` is accepted as a short alias.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "fahrenheittocelsius" | "ftoc" => Some(NamedConversion::FahrenheitToCelsius),
            _ => None,
        }
    }

    pub fn apply(self, value: f64) -> f64 {
        match self {
            NamedConversion::FahrenheitToCelsius => fahrenheit_to_celsius(value),
        }
    }
}

pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

/// A column of aggregated cells, one per window.
pub type Column = Vec<Option<f64>>;

/// Applies `rules` in place to the matching columns. Columns without a rule,
/// rules without a column, and absent cells are left untouched. Unknown
/// function names and non-numeric factors are no-ops, counted in
/// `diagnostics`.
pub fn apply_unit_conversions(
    columns: &mut BTreeMap<String, Column>,
    rules: &BTreeMap<String, UnitRule>,
    diagnostics: &mut Diagnostics,
) {
    for (field, rule) in rules {
        let Some(column) = columns.get_mut(field) else {
            continue;
        };

        let convert: Box<dyn Fn(f64) -> f64> = match rule {
            UnitRule::Factor(factor) => {
                let factor = *factor;
                Box::new(move |v| v * factor)
            }
            UnitRule::Named(name) => match NamedConversion::from_name(name) {
                Some(conversion) => Box::new(move |v| conversion.apply(v)),
                None => {
                    warn!(field = %field, name = %name, "Unknown conversion function, leaving field unchanged");
                    diagnostics.unknown_conversions += 1;
                    continue;
                }
            },
            UnitRule::InvalidFactor(raw) => {
                warn!(field = %field, factor = %raw, "Conversion factor is not a number, leaving field unchanged");
                diagnostics.invalid_factors += 1;
                continue;
            }
        };

        for cell in column.iter_mut().flatten() {
            *cell = convert(*cell);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn columns(field: &str, cells: Column) -> BTreeMap<String, Column> {
        BTreeMap::from([(field.to_string(), cells)])
    }

    fn rules(field: &str, rule: UnitRule) -> BTreeMap<String, UnitRule> {
        BTreeMap::from([(field.to_string(), rule)])
    }

    #[test]
    fn test_fahrenheit_to_celsius() {
        assert!((fahrenheit_to_celsius(32.0) - 0.0).abs() < EPS);
        assert!((fahrenheit_to_celsius(212.0) - 100.0).abs() < EPS);
    }

    #[test]
    fn test_named_lookup() {
        assert_eq!(
            NamedConversion::from_name("FahrenheitToCelsius"),
            Some(NamedConversion::FahrenheitToCelsius)
        );
        assert_eq!(
            NamedConversion::from_name("ftoc"),
            Some(NamedConversion::FahrenheitToCelsius)
        );
        assert_eq!(NamedConversion::from_name("CtoK"), None);
    }

    #[test]
    fn test_named_conversion_skips_absent_cells() {
        let mut cols = columns("TempOut", vec![Some(212.0), None, Some(32.0)]);
        let mut d = Diagnostics::default();
        apply_unit_conversions(
            &mut cols,
            &rules("TempOut", UnitRule::Named("FahrenheitToCelsius".to_string())),
            &mut d,
        );

        let out = &cols["TempOut"];
        assert!((out[0].unwrap() - 100.0).abs() < EPS);
        assert_eq!(out[1], None);
        assert!(out[2].unwrap().abs() < EPS);
    }

    #[test]
    fn test_factor_conversion() {
        let mut cols = columns("RainDay", vec![Some(10.0), None]);
        let mut d = Diagnostics::default();
        apply_unit_conversions(&mut cols, &rules("RainDay", UnitRule::Factor(0.2)), &mut d);
        assert_eq!(cols["RainDay"], vec![Some(2.0), None]);
        assert_eq!(d.total(), 0);
    }

    #[test]
    fn test_unknown_name_is_noop_and_counted() {
        let mut cols = columns("TempOut", vec![Some(50.0)]);
        let mut d = Diagnostics::default();
        apply_unit_conversions(
            &mut cols,
            &rules("TempOut", UnitRule::Named("FahrenheitToKelvin".to_string())),
            &mut d,
        );
        assert_eq!(cols["TempOut"], vec![Some(50.0)]);
        assert_eq!(d.unknown_conversions, 1);
    }

    #[test]
    fn test_invalid_factor_is_noop_and_counted() {
        let mut cols = columns("Barometer", vec![Some(29.9)]);
        let mut d = Diagnostics::default();
        apply_unit_conversions(
            &mut cols,
            &rules("Barometer", UnitRule::InvalidFactor("lots".to_string())),
            &mut d,
        );
        assert_eq!(cols["Barometer"], vec![Some(29.9)]);
        assert_eq!(d.invalid_factors, 1);
    }

    #[test]
    fn test_rule_for_missing_column_is_ignored() {
        let mut cols = columns("HumOut", vec![Some(40.0)]);
        let mut d = Diagnostics::default();
        apply_unit_conversions(&mut cols, &rules("TempOut", UnitRule::Factor(2.0)), &mut d);
        assert_eq!(cols["HumOut"], vec![Some(40.0)]);
        assert_eq!(d.total(), 0);
    }
}
