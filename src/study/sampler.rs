//! Samplers propose parameter values for new trials.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::distributions::{Distribution, ParamValue};
use super::error::{SamplerError, TrialError};
use super::trial::FrozenTrial;

/// Sampler names understood by [`construct_sampler`].
pub const AVAILABLE_SAMPLERS: &[&str] = &["random", "grid"];

/// Sampler names of other engines that are recognised but not provided.
const UNSUPPORTED_SAMPLERS: &[&str] = &["base", "tpe", "genetic", "nsga2", "cmaes"];

/// What a sampler may look at when proposing a value.
#[derive(Debug)]
pub struct SampleContext<'a> {
    pub study_name: &'a str,
    pub trial_number: u64,
    /// All trials of the study at the time the trial was created.
    pub history: &'a [FrozenTrial],
}

/// Common trait for all samplers.
pub trait Sampler: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn sample(
        &self,
        ctx: &SampleContext<'_>,
        param: &str,
        dist: &Distribution,
    ) -> Result<ParamValue, TrialError>;
}

/// Sampler section of an optimisation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamplerConfig {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// Build a sampler from its configuration; `None` gives the default random sampler.
pub fn construct_sampler(config: Option<&SamplerConfig>) -> Result<Arc<dyn Sampler>, SamplerError> {
    let Some(config) = config else {
        return Ok(Arc::new(RandomSampler::new(None)));
    };

    let name = config.name.to_lowercase();
    match name.as_str() {
        "random" => {
            let seed = match config.args.get("seed") {
                None | Some(Value::Null) => None,
                Some(v) => Some(v.as_u64().ok_or_else(|| SamplerError::InvalidArgs {
                    name: name.clone(),
                    reason: format!("seed must be a non-negative integer, got {v}"),
                })?),
            };
            if let Some(unknown) = config.args.keys().find(|k| k.as_str() != "seed") {
                return Err(SamplerError::InvalidArgs {
                    name,
                    reason: format!("unknown argument '{unknown}'"),
                });
            }
            Ok(Arc::new(RandomSampler::new(seed)))
        }
        "grid" => {
            let space = config
                .args
                .get("search_space")
                .and_then(Value::as_object)
                .ok_or_else(|| SamplerError::InvalidArgs {
                    name: name.clone(),
                    reason: "expected a 'search_space' mapping of parameter -> list of values"
                        .to_string(),
                })?;
            Ok(Arc::new(GridSampler::new(space)?))
        }
        other if UNSUPPORTED_SAMPLERS.contains(&other) => {
            Err(SamplerError::Unsupported(other.to_string()))
        }
        other => Err(SamplerError::Unknown(other.to_string())),
    }
}

/// Independent uniform sampling.
///
/// Values are a pure function of `(seed, trial number, parameter name)`, so a
/// seeded study is reproducible regardless of how trials are spread over
/// workers.
#[derive(Debug, Clone)]
pub struct RandomSampler {
    seed: u64,
}

impl RandomSampler {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            seed: seed.unwrap_or_else(rand::random),
        }
    }

    fn rng_for(&self, trial_number: u64, param: &str) -> StdRng {
        // FNV-1a over the parameter name, mixed with seed and trial number.
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in param.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        let mixed = self.seed ^ trial_number.wrapping_mul(0x9e37_79b9_7f4a_7c15) ^ hash;
        StdRng::seed_from_u64(mixed)
    }
}

impl Sampler for RandomSampler {
    fn name(&self) -> &str {
        "random"
    }

    fn sample(
        &self,
        ctx: &SampleContext<'_>,
        param: &str,
        dist: &Distribution,
    ) -> Result<ParamValue, TrialError> {
        let mut rng = self.rng_for(ctx.trial_number, param);
        let value = match dist {
            Distribution::Float { low, high, log } => {
                if *log {
                    let sampled: f64 = rng.random_range(low.ln()..=high.ln());
                    // exp(ln(x)) can drift just outside the bounds
                    ParamValue::Float(sampled.exp().clamp(*low, *high))
                } else {
                    ParamValue::Float(rng.random_range(*low..=*high))
                }
            }
            Distribution::Int { low, high } => ParamValue::Int(rng.random_range(*low..=*high)),
            Distribution::Categorical { choices } => {
                let idx = rng.random_range(0..choices.len());
                ParamValue::Json(choices[idx].clone())
            }
        };
        Ok(value)
    }
}

/// Exhaustive sampling over an explicit grid.
///
/// Trial `n` takes grid point `n % len`, so concurrent workers (which get
/// distinct trial numbers) never evaluate the same point twice within one
/// pass over the grid.
#[derive(Debug, Clone)]
pub struct GridSampler {
    points: Vec<BTreeMap<String, Value>>,
}

impl GridSampler {
    pub fn new(space: &Map<String, Value>) -> Result<Self, SamplerError> {
        let invalid = |reason: String| SamplerError::InvalidArgs {
            name: "grid".to_string(),
            reason,
        };

        if space.is_empty() {
            return Err(invalid("search_space is empty".to_string()));
        }

        let mut axes: BTreeMap<&str, &Vec<Value>> = BTreeMap::new();
        for (param, values) in space {
            let values = values
                .as_array()
                .ok_or_else(|| invalid(format!("values of '{param}' must be a list")))?;
            if values.is_empty() {
                return Err(invalid(format!("'{param}' has no values")));
            }
            axes.insert(param.as_str(), values);
        }

        // Cartesian product
        let mut points: Vec<BTreeMap<String, Value>> = vec![BTreeMap::new()];
        for (param, values) in axes {
            let mut next = Vec::with_capacity(points.len() * values.len());
            for point in &points {
                for value in values {
                    let mut extended = point.clone();
                    extended.insert(param.to_string(), value.clone());
                    next.push(extended);
                }
            }
            points = next;
        }

        Ok(Self { points })
    }
}

impl Sampler for GridSampler {
    fn name(&self) -> &str {
        "grid"
    }

    fn sample(
        &self,
        ctx: &SampleContext<'_>,
        param: &str,
        dist: &Distribution,
    ) -> Result<ParamValue, TrialError> {
        let fail = |reason: String| TrialError::Sampling {
            sampler: "grid".to_string(),
            name: param.to_string(),
            reason,
        };

        let idx = (ctx.trial_number % self.points.len() as u64) as usize;
        let raw = self.points[idx]
            .get(param)
            .ok_or_else(|| fail("parameter is not part of the grid search space".to_string()))?;
        dist.value_from_json(raw)
            .ok_or_else(|| fail(format!("grid value {raw} does not fit {dist:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(number: u64) -> SampleContext<'static> {
        SampleContext {
            study_name: "test",
            trial_number: number,
            history: &[],
        }
    }

    #[test]
    fn test_default_sampler_is_random() {
        let sampler = construct_sampler(None).unwrap();
        assert_eq!(sampler.name(), "random");
    }

    #[test]
    fn test_unknown_and_unsupported_samplers() {
        let unknown = SamplerConfig {
            name: "annealing".to_string(),
            args: Map::new(),
        };
        assert!(matches!(
            construct_sampler(Some(&unknown)),
            Err(SamplerError::Unknown(_))
        ));

        let tpe = SamplerConfig {
            name: "TPE".to_string(),
            args: Map::new(),
        };
        assert!(matches!(
            construct_sampler(Some(&tpe)),
            Err(SamplerError::Unsupported(_))
        ));
        let message = construct_sampler(Some(&unknown)).unwrap_err().to_string();
        assert!(message.ends_with("(available: random, grid)"));
    }

    #[test]
    fn test_random_sampler_respects_bounds() {
        let sampler = RandomSampler::new(Some(7));
        let float = Distribution::Float {
            low: -10.0,
            high: 10.0,
            log: false,
        };
        let log = Distribution::Float {
            low: 1e-4,
            high: 1e-1,
            log: true,
        };
        let int = Distribution::Int { low: 2, high: 4 };
        for n in 0..200 {
            let v = sampler.sample(&ctx(n), "x", &float).unwrap();
            assert!(float.contains(&v));
            let v = sampler.sample(&ctx(n), "lr", &log).unwrap();
            assert!(log.contains(&v));
            let v = sampler.sample(&ctx(n), "layers", &int).unwrap();
            assert!(int.contains(&v));
        }
    }

    #[test]
    fn test_seeded_random_sampler_is_reproducible() {
        let a = RandomSampler::new(Some(42));
        let b = RandomSampler::new(Some(42));
        let dist = Distribution::Float {
            low: 0.0,
            high: 1.0,
            log: false,
        };
        for n in 0..10 {
            assert_eq!(
                a.sample(&ctx(n), "x", &dist).unwrap(),
                b.sample(&ctx(n), "x", &dist).unwrap()
            );
        }
        assert_ne!(
            a.sample(&ctx(0), "x", &dist).unwrap(),
            a.sample(&ctx(0), "y", &dist).unwrap()
        );
    }

    #[test]
    fn test_grid_sampler_walks_all_points() {
        let config = SamplerConfig {
            name: "grid".to_string(),
            args: json!({"search_space": {"x": [1, 2], "opt": ["a", "b", "c"]}})
                .as_object()
                .cloned()
                .unwrap(),
        };
        let sampler = construct_sampler(Some(&config)).unwrap();
        let x = Distribution::Int { low: 0, high: 5 };
        let opt = Distribution::Categorical {
            choices: vec![json!("a"), json!("b"), json!("c")],
        };

        let mut seen = std::collections::HashSet::new();
        for n in 0..6 {
            let xv = sampler.sample(&ctx(n), "x", &x).unwrap();
            let ov = sampler.sample(&ctx(n), "opt", &opt).unwrap();
            seen.insert(format!("{xv}-{ov}"));
        }
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn test_grid_sampler_rejects_unknown_param() {
        let space = json!({"x": [0.5]}).as_object().cloned().unwrap();
        let sampler = GridSampler::new(&space).unwrap();
        let dist = Distribution::Float {
            low: 0.0,
            high: 1.0,
            log: false,
        };
        assert!(sampler.sample(&ctx(0), "y", &dist).is_err());
        assert_eq!(
            sampler.sample(&ctx(3), "x", &dist).unwrap(),
            ParamValue::Float(0.5)
        );
    }

    #[test]
    fn test_grid_sampler_rejects_empty_axis() {
        let space = json!({"x": []}).as_object().cloned().unwrap();
        assert!(GridSampler::new(&space).is_err());
    }
}
