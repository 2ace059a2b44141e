//! Optimisation directions and objective results.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether an objective value should be minimised or maximised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    #[serde(alias = "minimise")]
    Minimize,
    #[serde(alias = "maximise")]
    Maximize,
}

impl Direction {
    /// Whether `candidate` is better than `incumbent` in this direction.
    pub fn is_better(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Self::Minimize => candidate < incumbent,
            Self::Maximize => candidate > incumbent,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minimize => "minimize",
            Self::Maximize => "maximize",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minimize" | "minimise" => Ok(Self::Minimize),
            "maximize" | "maximise" => Ok(Self::Maximize),
            other => Err(format!("unknown direction '{other}'")),
        }
    }
}

/// Render a list of directions as `[minimize, maximize]`.
pub fn format_directions(directions: &[Direction]) -> String {
    let parts: Vec<_> = directions.iter().map(|d| d.as_str()).collect();
    format!("[{}]", parts.join(", "))
}

/// What an objective function returns for one trial.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectiveValue {
    Single(f64),
    Multi(Vec<f64>),
}

impl ObjectiveValue {
    pub fn into_values(self) -> Vec<f64> {
        match self {
            Self::Single(v) => vec![v],
            Self::Multi(values) => values,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Multi(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<f64> for ObjectiveValue {
    fn from(value: f64) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<f64>> for ObjectiveValue {
    fn from(values: Vec<f64>) -> Self {
        Self::Multi(values)
    }
}

impl From<(f64, f64)> for ObjectiveValue {
    fn from((a, b): (f64, f64)) -> Self {
        Self::Multi(vec![a, b])
    }
}

impl From<(f64, f64, f64)> for ObjectiveValue {
    fn from((a, b, c): (f64, f64, f64)) -> Self {
        Self::Multi(vec![a, b, c])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_direction_is_minimize() {
        assert_eq!(Direction::default(), Direction::Minimize);
        assert!(Direction::Minimize.is_better(1.0, 2.0));
        assert!(Direction::Maximize.is_better(2.0, 1.0));
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!("Maximise".parse::<Direction>(), Ok(Direction::Maximize));
        assert!("sideways".parse::<Direction>().is_err());
        assert_eq!(
            format_directions(&[Direction::Minimize, Direction::Maximize]),
            "[minimize, maximize]"
        );
    }

    #[test]
    fn test_objective_value_conversions() {
        assert_eq!(ObjectiveValue::from(1.5).into_values(), vec![1.5]);
        assert_eq!(ObjectiveValue::from((1.0, 2.0)).len(), 2);
        assert!(ObjectiveValue::Multi(vec![]).is_empty());
    }
}
