//! Search space definition for hyperparameters

use crate::error::{NcvError, Result};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Type of parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterType {
    /// Continuous float parameter
    Float {
        low: f64,
        high: f64,
        log_scale: bool,
    },
    /// Integer parameter, both bounds inclusive
    Int {
        low: i64,
        high: i64,
    },
    /// Finite list of values
    Choice {
        values: Vec<ParameterValue>,
    },
}

/// A single hyperparameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub param_type: ParameterType,
}

impl Parameter {
    /// Create a float parameter
    pub fn float(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Float {
                low,
                high,
                log_scale: false,
            },
        }
    }

    /// Create a log-scale float parameter
    pub fn log_float(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Float {
                low,
                high,
                log_scale: true,
            },
        }
    }

    /// Create an integer parameter
    pub fn int(name: impl Into<String>, low: i64, high: i64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Int { low, high },
        }
    }

    /// Create a parameter drawn from a list of values
    pub fn choice(name: impl Into<String>, values: Vec<ParameterValue>) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Choice { values },
        }
    }

    /// Sample a random value
    pub fn sample(&self, rng: &mut impl Rng) -> ParameterValue {
        match &self.param_type {
            ParameterType::Float { low, high, log_scale } => {
                let val = if *log_scale {
                    let log_low = low.ln();
                    let log_high = high.ln();
                    (rng.gen::<f64>() * (log_high - log_low) + log_low).exp()
                } else {
                    rng.gen::<f64>() * (high - low) + low
                };
                ParameterValue::Float(val)
            }
            ParameterType::Int { low, high } => ParameterValue::Int(rng.gen_range(*low..=*high)),
            ParameterType::Choice { values } => {
                let idx = rng.gen_range(0..values.len());
                values[idx].clone()
            }
        }
    }

    /// Number of distinct values, `None` for continuous ranges
    pub fn n_values(&self) -> Option<usize> {
        match &self.param_type {
            ParameterType::Choice { values } => Some(values.len()),
            _ => None,
        }
    }

    fn validate(&self) -> Result<()> {
        let ok = match &self.param_type {
            ParameterType::Float { low, high, log_scale } => {
                low.is_finite() && high.is_finite() && low <= high && (!*log_scale || *low > 0.0)
            }
            ParameterType::Int { low, high } => low <= high,
            ParameterType::Choice { values } => !values.is_empty(),
        };
        if ok {
            Ok(())
        } else {
            Err(NcvError::ConfigError(format!(
                "hyperparameter '{}' has an empty or inconsistent range",
                self.name
            )))
        }
    }

    /// Parse a value specification: a JSON array of choices, or an object
    /// `{"uniform": [lo, hi]}`, `{"loguniform": [lo, hi]}`,
    /// `{"randint": [lo, hi]}` (upper bound exclusive).
    pub fn from_json(name: &str, spec: &Value) -> Result<Self> {
        let param = match spec {
            Value::Array(items) => Parameter::choice(
                name,
                items
                    .iter()
                    .map(|v| ParameterValue::from_json(name, v))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Object(map) if map.len() == 1 => {
                let (kind, bounds) = map.iter().next().ok_or_else(|| bad_spec(name))?;
                let (lo, hi) = match bounds.as_array().map(|b| b.as_slice()) {
                    Some([lo, hi]) => (lo, hi),
                    _ => return Err(bad_spec(name)),
                };
                match kind.as_str() {
                    "uniform" => Parameter::float(name, json_f64(name, lo)?, json_f64(name, hi)?),
                    "loguniform" => Parameter::log_float(name, json_f64(name, lo)?, json_f64(name, hi)?),
                    "randint" => {
                        let lo = lo.as_i64().ok_or_else(|| bad_spec(name))?;
                        let hi = hi.as_i64().ok_or_else(|| bad_spec(name))?;
                        Parameter::int(name, lo, hi - 1)
                    }
                    _ => return Err(bad_spec(name)),
                }
            }
            _ => return Err(bad_spec(name)),
        };
        param.validate()?;
        Ok(param)
    }
}

fn bad_spec(name: &str) -> NcvError {
    NcvError::ConfigError(format!(
        "hyperparameter '{}' must be a list of values or one of uniform/loguniform/randint",
        name
    ))
}

fn json_f64(name: &str, v: &Value) -> Result<f64> {
    v.as_f64().ok_or_else(|| bad_spec(name))
}

/// Sampled parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Null,
}

impl ParameterValue {
    /// Get as float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(v) => Some(*v),
            ParameterValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as int
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(v) => Some(*v),
            ParameterValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_string(&self) -> Option<&str> {
        match self {
            ParameterValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ParameterValue::Null)
    }

    fn from_json(name: &str, v: &Value) -> Result<Self> {
        match v {
            Value::Null => Ok(ParameterValue::Null),
            Value::Bool(b) => Ok(ParameterValue::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(ParameterValue::Int(i)),
                None => n.as_f64().map(ParameterValue::Float).ok_or_else(|| bad_spec(name)),
            },
            Value::String(s) => Ok(ParameterValue::String(s.clone())),
            _ => Err(bad_spec(name)),
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Bool(v) => write!(f, "{}", v),
            ParameterValue::Int(v) => write!(f, "{}", v),
            ParameterValue::Float(v) => write!(f, "{}", v),
            ParameterValue::String(v) => write!(f, "{}", v),
            ParameterValue::Null => f.write_str("null"),
        }
    }
}

/// Search space for hyperparameter optimization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSpace {
    parameters: Vec<Parameter>,
}

impl SearchSpace {
    /// Create a new empty search space
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    /// Add a parameter to the search space
    pub fn add(mut self, param: Parameter) -> Self {
        self.parameters.push(param);
        self
    }

    /// Add a float parameter
    pub fn float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(Parameter::float(name, low, high))
    }

    /// Add a log-scale float parameter
    pub fn log_float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(Parameter::log_float(name, low, high))
    }

    /// Add an integer parameter
    pub fn int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.add(Parameter::int(name, low, high))
    }

    /// Add a parameter with a list of values
    pub fn choice(self, name: impl Into<String>, values: Vec<ParameterValue>) -> Self {
        self.add(Parameter::choice(name, values))
    }

    /// Parse a `{param: spec}` JSON mapping
    pub fn from_json(spec: &Value) -> Result<Self> {
        let map = spec.as_object().ok_or_else(|| {
            NcvError::ConfigError("hyperparameter space must be a JSON object".to_string())
        })?;
        let mut space = SearchSpace::new();
        for (name, values) in map {
            space = space.add(Parameter::from_json(name, values)?);
        }
        space.validate()?;
        Ok(space)
    }

    /// Fail on an empty space or on any empty/inconsistent parameter range
    pub fn validate(&self) -> Result<()> {
        if self.parameters.is_empty() {
            return Err(NcvError::ConfigError("hyperparameter space is empty".to_string()));
        }
        for (i, p) in self.parameters.iter().enumerate() {
            p.validate()?;
            if self.parameters[..i].iter().any(|q| q.name == p.name) {
                return Err(NcvError::ConfigError(format!(
                    "hyperparameter '{}' is defined twice",
                    p.name
                )));
            }
        }
        Ok(())
    }

    /// Address the base estimator of a bagging ensemble:
    /// `model__alpha` becomes `bagging__estimator__alpha`.
    pub fn remap_for_bagging(&self) -> Self {
        let parameters = self
            .parameters
            .iter()
            .map(|p| Parameter {
                name: p.name.replacen("model", "bagging__estimator", 1),
                param_type: p.param_type.clone(),
            })
            .collect();
        Self { parameters }
    }

    /// Get all parameters
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Sample a random configuration
    pub fn sample(&self, rng: &mut impl Rng) -> TrialParams {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.sample(rng)))
            .collect()
    }

    /// Number of grid points when every parameter is a finite list
    pub fn grid_size(&self) -> Option<usize> {
        self.parameters
            .iter()
            .try_fold(1usize, |acc, p| p.n_values().map(|n| acc.saturating_mul(n)))
    }

    /// Grid point by index, last parameter varying fastest
    pub fn grid_point(&self, mut index: usize) -> Option<TrialParams> {
        let mut params = TrialParams::new();
        for p in self.parameters.iter().rev() {
            let values = match &p.param_type {
                ParameterType::Choice { values } => values,
                _ => return None,
            };
            params.insert(p.name.clone(), values[index % values.len()].clone());
            index /= values.len();
        }
        Some(params)
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Get parameter names in order
    pub fn param_names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self::new()
    }
}

/// Alias for sampled configuration, ordered by name
pub type TrialParams = BTreeMap<String, ParameterValue>;

/// `name=value` pairs for logs and tables
pub fn format_params(params: &TrialParams) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_xoshiro::Xoshiro256PlusPlus;
    use serde_json::json;

    #[test]
    fn test_search_space_builder() {
        let space = SearchSpace::new()
            .float("model__l1_ratio", 0.0, 1.0)
            .int("model__n_estimators", 10, 1000)
            .choice("model__max_depth", vec![ParameterValue::Int(3), ParameterValue::Null]);

        assert_eq!(space.len(), 3);
        assert!(space.grid_size().is_none());
    }

    #[test]
    fn test_parameter_sampling() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);

        let param = Parameter::float("lr", 0.0, 1.0);
        let val = param.sample(&mut rng);

        if let ParameterValue::Float(v) = val {
            assert!((0.0..=1.0).contains(&v));
        } else {
            panic!("Expected float value");
        }
    }

    #[test]
    fn test_log_scale_sampling() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);

        let param = Parameter::log_float("alpha", 0.0001, 0.1);

        let samples: Vec<f64> = (0..100)
            .filter_map(|_| param.sample(&mut rng).as_float())
            .collect();

        assert_eq!(samples.len(), 100);
        assert!(samples.iter().all(|&v| (0.0001..=0.1).contains(&v)));
    }

    #[test]
    fn test_from_json() {
        let space = SearchSpace::from_json(&json!({
            "model__alpha": {"loguniform": [0.001, 10.0]},
            "model__l1_ratio": [0.1, 0.5, 0.9],
            "model__max_depth": [3, null],
            "model__n_estimators": {"randint": [50, 300]},
            "model__max_features": ["sqrt", 0.5]
        }))
        .unwrap();

        assert_eq!(space.len(), 5);
        let depth = &space.parameters()[2];
        assert_eq!(
            depth.param_type,
            ParameterType::Choice { values: vec![ParameterValue::Int(3), ParameterValue::Null] }
        );
        assert_eq!(
            space.parameters()[3].param_type,
            ParameterType::Int { low: 50, high: 299 }
        );
    }

    #[test]
    fn test_empty_or_inconsistent_space() {
        assert!(matches!(SearchSpace::from_json(&json!({})), Err(NcvError::ConfigError(_))));
        assert!(SearchSpace::from_json(&json!({"model__alpha": []})).is_err());
        assert!(SearchSpace::from_json(&json!({"model__alpha": {"uniform": [1.0, 0.1]}})).is_err());
        assert!(SearchSpace::from_json(&json!({"model__alpha": {"normal": [0.0, 1.0]}})).is_err());
        assert!(SearchSpace::from_json(&json!({"model__alpha": 0.5})).is_err());
        assert!(SearchSpace::new().validate().is_err());
    }

    #[test]
    fn test_grid() {
        let space = SearchSpace::new()
            .choice("a", vec![ParameterValue::Int(1), ParameterValue::Int(2)])
            .choice("b", vec![ParameterValue::Bool(true), ParameterValue::Bool(false), ParameterValue::Null]);

        assert_eq!(space.grid_size(), Some(6));
        let points: Vec<TrialParams> = (0..6).filter_map(|i| space.grid_point(i)).collect();
        assert_eq!(points.len(), 6);
        for (i, p) in points.iter().enumerate() {
            assert!(!points[..i].contains(p));
        }
        assert_eq!(points[0]["a"], ParameterValue::Int(1));
        assert_eq!(points[0]["b"], ParameterValue::Bool(true));
        assert_eq!(points[1]["b"], ParameterValue::Bool(false));
    }

    #[test]
    fn test_remap_for_bagging() {
        let space = SearchSpace::new()
            .float("model__alpha", 0.1, 1.0)
            .float("model__l1_ratio", 0.0, 1.0);
        let remapped = space.remap_for_bagging();
        assert_eq!(
            remapped.param_names(),
            vec!["bagging__estimator__alpha", "bagging__estimator__l1_ratio"]
        );
    }

    #[test]
    fn test_value_serde() {
        let params: TrialParams = serde_json::from_value(json!({
            "model__alpha": 0.5, "model__max_depth": null, "model__n_estimators": 100
        }))
        .unwrap();
        assert_eq!(params["model__alpha"], ParameterValue::Float(0.5));
        assert_eq!(params["model__max_depth"], ParameterValue::Null);
        assert_eq!(params["model__n_estimators"], ParameterValue::Int(100));
        assert_eq!(format_params(&params), "model__alpha=0.5, model__max_depth=null, model__n_estimators=100");
    }
}
