use crate::common::*;
use crate::error::invalid_parameter;
use serde::Serialize;

/// Hyperparameters of the decontamination model.
#[derive(Debug, Clone, Serialize)]
pub struct DecontArgs {
    /// Maximum number of EM iterations. Default: 500
    pub max_iter: usize,
    /// Stop when `max |theta(t) - theta(t-1)|` falls below this. Default: 0.001
    pub convergence: f64,
    /// Evaluate the log-likelihood every this many iterations. Default: 10
    pub iter_loglik: usize,
    /// Initial symmetric Beta prior on theta. Default: 10
    pub delta: f64,
    /// Random seed; `None` makes the run non-reproducible. Default: 12345
    pub seed: Option<u64>,
    /// Additive floor on divisions and logs. Default: 1e-20
    pub pseudocount: f64,
    /// Only used when cluster labels are not given
    pub init: InitializerArgs,
    /// Draw a progress bar over batches. Default: false
    #[serde(skip)]
    pub show_progress: bool,
}

impl Default for DecontArgs {
    fn default() -> Self {
        Self {
            max_iter: 500,
            convergence: 0.001,
            iter_loglik: 10,
            delta: 10.0,
            seed: Some(12345),
            pseudocount: DEFAULT_PSEUDOCOUNT,
            init: InitializerArgs::default(),
            show_progress: false,
        }
    }
}

impl DecontArgs {
    /// Check every EM hyperparameter (not the initializer's)
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_iter == 0 {
            return Err(invalid_parameter("max_iter must be a positive integer"));
        }
        if !(self.convergence.is_finite() && self.convergence > 0.) {
            return Err(invalid_parameter(format!(
                "convergence must be a positive number, got {}",
                self.convergence
            )));
        }
        if self.iter_loglik == 0 {
            return Err(invalid_parameter("iter_loglik must be a positive integer"));
        }
        if !(self.delta.is_finite() && self.delta > 0.) {
            return Err(invalid_parameter(format!(
                "delta must be a positive scalar, got {}",
                self.delta
            )));
        }
        if !(self.pseudocount.is_finite() && self.pseudocount >= 0.) {
            return Err(invalid_parameter(format!(
                "pseudocount must be non-negative, got {}",
                self.pseudocount
            )));
        }
        Ok(())
    }

    /// Take `delta` from a list of values as it comes from the command
    /// line; exactly one value is allowed
    pub fn set_delta_from_values(&mut self, values: &[f64]) -> anyhow::Result<()> {
        match values {
            [d] => {
                self.delta = *d;
                Ok(())
            }
            _ => Err(invalid_parameter(format!(
                "delta must be a single value, got {} values",
                values.len()
            ))),
        }
    }
}

/// Arguments handed over to the cluster initializer
#[derive(Debug, Clone, Serialize)]
pub struct InitializerArgs {
    /// Number of most variable genes to keep. Default: 5000
    pub var_genes: usize,
    /// Number of latent components (modules). Default: 50
    pub num_modules: usize,
    /// Density clustering resolution. Default: 1.0
    pub resolution: f64,
}

impl Default for InitializerArgs {
    fn default() -> Self {
        Self {
            var_genes: 5000,
            num_modules: 50,
            resolution: 1.0,
        }
    }
}

impl InitializerArgs {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.var_genes == 0 {
            return Err(invalid_parameter("var_genes must be a positive integer"));
        }
        if self.num_modules == 0 {
            return Err(invalid_parameter("num_modules must be a positive integer"));
        }
        if !(self.resolution.is_finite() && self.resolution >= 0.) {
            return Err(invalid_parameter(format!(
                "resolution must be non-negative, got {}",
                self.resolution
            )));
        }
        Ok(())
    }
}

/// What was actually used for a run
#[derive(Debug, Clone, Serialize)]
pub struct RunEcho {
    pub args: DecontArgs,
    /// The seed behind every random draw, even when `args.seed` was `None`
    pub seed_used: u64,
    pub reproducible: bool,
    pub labels_supplied: bool,
    pub batches: Vec<Box<str>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_invalid_parameter;

    #[test]
    fn defaults_are_valid() {
        assert!(DecontArgs::default().validate().is_ok());
        assert!(InitializerArgs::default().validate().is_ok());
    }

    #[test]
    fn bad_delta_is_rejected() {
        let mut args = DecontArgs {
            delta: 0.,
            ..Default::default()
        };
        assert!(is_invalid_parameter(&args.validate().unwrap_err()));

        assert!(is_invalid_parameter(
            &args.set_delta_from_values(&[1., 2.]).unwrap_err()
        ));
        args.set_delta_from_values(&[5.]).unwrap();
        assert!(args.validate().is_ok());
    }

    #[test]
    fn bad_initializer_args_are_rejected() {
        let args = InitializerArgs {
            resolution: -1.,
            ..Default::default()
        };
        assert!(is_invalid_parameter(&args.validate().unwrap_err()));
        let args = InitializerArgs {
            num_modules: 0,
            ..Default::default()
        };
        assert!(is_invalid_parameter(&args.validate().unwrap_err()));
    }
}
