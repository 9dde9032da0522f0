//! Parameter managers.
//!
//! A minimiser only sees a parameter vector: it reads it with `get`, proposes a
//! new one with `set`, and commits the final vector into the model with
//! `resolve`. Each manager decides what the vector means:
//!
//! | manager         | vector                   | resolve                          |
//! |-----------------|--------------------------|----------------------------------|
//! | `Regression`    | `(a², a²b²)` or a subset | `a = √x0`, `b = √x1 / a`         |
//! | `IndividualA`   | `[placeholder, c]`       | `a ← a·c`                        |
//! | `IndividualB`   | `[b]`                    | `b ← |b|`; `set` re-evaluates    |
//!
//! `resolve` never leaves the model with `a <= 0`: it fails with
//! `NegativeParameter` instead.

use crate::binning::BinVariances;
use crate::domain::{ModelParameters, Parameter};
use crate::error::ErrorModelError;
use crate::model::BasicErrorModel;

pub trait ParameterManager {
    fn get(&self) -> Vec<f64>;
    fn set(&mut self, x: &[f64]) -> Result<(), ErrorModelError>;
    /// Commit the current vector into the model and return the new parameters.
    fn resolve(&mut self) -> Result<ModelParameters, ErrorModelError>;
}

fn check_len(x: &[f64], expected: usize) -> Result<(), ErrorModelError> {
    if x.len() == expected {
        Ok(())
    } else {
        Err(ErrorModelError::ParameterCount {
            actual: x.len(),
            expected,
        })
    }
}

/// Joint regression on squared parameters.
pub struct RegressionManager<'m> {
    model: &'m mut BasicErrorModel,
    active: Vec<Parameter>,
    x: Vec<f64>,
}

impl<'m> RegressionManager<'m> {
    pub fn new(model: &'m mut BasicErrorModel) -> Self {
        let active = model.active_parameters().to_vec();
        let p = model.parameters();
        let x = match active.as_slice() {
            [Parameter::A, Parameter::B] => vec![p.a * p.a, p.a * p.a * p.b * p.b],
            [Parameter::A] => vec![p.a * p.a],
            [Parameter::B] => vec![p.b * p.b],
            _ => Vec::new(),
        };
        Self { model, active, x }
    }

    pub fn active(&self) -> &[Parameter] {
        &self.active
    }
}

impl ParameterManager for RegressionManager<'_> {
    fn get(&self) -> Vec<f64> {
        self.x.clone()
    }

    fn set(&mut self, x: &[f64]) -> Result<(), ErrorModelError> {
        check_len(x, self.x.len())?;
        self.x = x.to_vec();
        Ok(())
    }

    fn resolve(&mut self) -> Result<ModelParameters, ErrorModelError> {
        let mut p = self.model.parameters();
        let positive = |v: f64, parameter: &'static str| {
            if v > 0.0 && v.is_finite() {
                Ok(v)
            } else {
                Err(ErrorModelError::NegativeParameter { parameter })
            }
        };
        match self.active.as_slice() {
            [Parameter::A, Parameter::B] => {
                p.a = positive(self.x[0], "a^2")?.sqrt();
                p.b = positive(self.x[1], "b^2")?.sqrt() / p.a;
            }
            [Parameter::A] => p.a = positive(self.x[0], "a^2")?.sqrt(),
            [Parameter::B] => p.b = positive(self.x[0], "b^2")?.sqrt(),
            _ => {}
        }
        self.model.update(p)?;
        Ok(p)
    }
}

/// Multiplicative correction of `a` with `b` held fixed. Holds the
/// `[intercept, slope]` of the normal probability line; only the slope is applied.
pub struct IndividualAManager<'m> {
    model: &'m mut BasicErrorModel,
    x: [f64; 2],
}

impl<'m> IndividualAManager<'m> {
    pub fn new(model: &'m mut BasicErrorModel) -> Self {
        Self { model, x: [0.0, 1.0] }
    }
}

impl ParameterManager for IndividualAManager<'_> {
    fn get(&self) -> Vec<f64> {
        self.x.to_vec()
    }

    fn set(&mut self, x: &[f64]) -> Result<(), ErrorModelError> {
        check_len(x, 2)?;
        self.x = [x[0], x[1]];
        Ok(())
    }

    fn resolve(&mut self) -> Result<ModelParameters, ErrorModelError> {
        let mut p = self.model.parameters();
        let a = p.a * self.x[1];
        if !(a > 0.0 && a.is_finite()) {
            return Err(ErrorModelError::NegativeParameter { parameter: "a" });
        }
        p.a = a;
        self.model.update(p)?;
        Ok(p)
    }
}

/// Direct refinement of `b` with `a` held fixed. Every `set` re-evaluates the
/// bin variances so a minimiser can read the objective straight after.
pub struct IndividualBManager<'m> {
    model: &'m mut BasicErrorModel,
    x: [f64; 1],
}

impl<'m> IndividualBManager<'m> {
    pub fn new(model: &'m mut BasicErrorModel) -> Self {
        let b = model.parameters().b;
        Self { model, x: [b] }
    }

    /// Bin variances at the last `set` value.
    pub fn variances(&self) -> Result<&BinVariances, ErrorModelError> {
        self.model.bin_variances()
    }
}

impl ParameterManager for IndividualBManager<'_> {
    fn get(&self) -> Vec<f64> {
        self.x.to_vec()
    }

    fn set(&mut self, x: &[f64]) -> Result<(), ErrorModelError> {
        check_len(x, 1)?;
        self.x = [x[0]];
        let trial = ModelParameters::new(self.model.parameters().a, x[0]);
        self.model.trial(trial)?;
        Ok(())
    }

    fn resolve(&mut self) -> Result<ModelParameters, ErrorModelError> {
        let mut p = self.model.parameters();
        // b only enters squared
        p.b = self.x[0].abs();
        self.model.update(p)?;
        Ok(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SampleSpec, generate_table};
    use crate::domain::ErrorModelConfig;

    fn configured(config: &ErrorModelConfig) -> BasicErrorModel {
        let table = generate_table(&SampleSpec::default()).unwrap();
        let mut model = BasicErrorModel::new(config).unwrap();
        model.configure(&table, 0.4).unwrap();
        model
    }

    #[test]
    fn regression_resolves_squared_parameters() {
        let mut model = configured(&ErrorModelConfig::default());
        let mut m = RegressionManager::new(&mut model);
        assert_eq!(m.active(), &[Parameter::A, Parameter::B]);
        m.set(&[1.44, 1.44 * 0.0009]).unwrap();
        let p = m.resolve().unwrap();
        assert!((p.a - 1.2).abs() < 1e-12);
        assert!((p.b - 0.03).abs() < 1e-12);
        assert_eq!(model.parameters(), p);
    }

    #[test]
    fn regression_rejects_non_positive_squares() {
        let mut model = configured(&ErrorModelConfig::default());
        let before = model.parameters();
        let mut m = RegressionManager::new(&mut model);
        m.set(&[-0.5, 0.01]).unwrap();
        assert_eq!(
            m.resolve().unwrap_err(),
            ErrorModelError::NegativeParameter { parameter: "a^2" }
        );
        m.set(&[1.0, 0.0]).unwrap();
        assert_eq!(
            m.resolve().unwrap_err(),
            ErrorModelError::NegativeParameter { parameter: "b^2" }
        );
        assert_eq!(model.parameters(), before);
    }

    #[test]
    fn regression_with_fixed_a_only_moves_b() {
        let config = ErrorModelConfig {
            a: Some(1.1),
            ..ErrorModelConfig::default()
        };
        let mut model = configured(&config);
        let mut m = RegressionManager::new(&mut model);
        assert_eq!(m.get().len(), 1);
        m.set(&[0.0016]).unwrap();
        let p = m.resolve().unwrap();
        assert_eq!(p.a, 1.1);
        assert!((p.b - 0.04).abs() < 1e-12);
        assert!(m.set(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn individual_a_scales_and_guards_sign() {
        let mut model = configured(&ErrorModelConfig::default());
        let mut m = IndividualAManager::new(&mut model);
        assert_eq!(m.get(), vec![0.0, 1.0]);
        m.set(&[0.0, 1.5]).unwrap();
        assert!((m.resolve().unwrap().a - 1.5).abs() < 1e-12);
        m.set(&[0.0, -1.0]).unwrap();
        assert_eq!(
            m.resolve().unwrap_err(),
            ErrorModelError::NegativeParameter { parameter: "a" }
        );
        assert!((model.parameters().a - 1.5).abs() < 1e-12);
    }

    #[test]
    fn individual_b_set_updates_bins_before_resolve() {
        let mut model = configured(&ErrorModelConfig::default());
        let start = model.parameters();
        let mut m = IndividualBManager::new(&mut model);
        let v0: f64 = m.variances().unwrap().variances.iter().sum();
        m.set(&[0.2]).unwrap();
        let v1: f64 = m.variances().unwrap().variances.iter().sum();
        assert!(v1 < v0);
        m.set(&[-0.05]).unwrap();
        let p = m.resolve().unwrap();
        assert_eq!(p.b, 0.05);
        assert_eq!(p.a, start.a);
    }
}
