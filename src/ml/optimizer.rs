//! Gradient descent step policies.

use ndarray::{Array, Dimension, Zip};
use serde::{Deserialize, Serialize};

const EPSILON: f64 = 1e-8;

/// Update rule applied to each parameter tensor after a mini-batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Optimizer {
    /// Plain `param -= rate * grad`.
    Stochastic { rate: f64 },
    /// Velocity accumulates scaled gradients and decays by `decay` each step.
    Momentum { rate: f64, decay: f64 },
    /// Adam with bias-corrected first and second moments.
    Adam {
        rate: f64,
        momentum_decay: f64,
        norm_decay: f64,
    },
}

impl Optimizer {
    pub fn momentum(rate: f64) -> Self {
        Optimizer::Momentum { rate, decay: 0.1 }
    }

    pub fn adam(rate: f64) -> Self {
        Optimizer::Adam {
            rate,
            momentum_decay: 0.1,
            norm_decay: 0.001,
        }
    }

    pub fn rate(&self) -> f64 {
        match *self {
            Optimizer::Stochastic { rate }
            | Optimizer::Momentum { rate, .. }
            | Optimizer::Adam { rate, .. } => rate,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let rate = self.rate();
        if !rate.is_finite() || rate <= 0.0 {
            return Err(format!("learning rate must be > 0 (got {rate})"));
        }
        let decays = match *self {
            Optimizer::Stochastic { .. } => vec![],
            Optimizer::Momentum { decay, .. } => vec![decay],
            Optimizer::Adam {
                momentum_decay,
                norm_decay,
                ..
            } => vec![momentum_decay, norm_decay],
        };
        for decay in decays {
            if !(0.0..1.0).contains(&decay) {
                return Err(format!("decay must be in [0, 1) (got {decay})"));
            }
        }
        Ok(())
    }

    /// Fresh optimizer state shaped like `params`.
    pub fn init<D: Dimension>(&self, params: &Array<f64, D>) -> OptimizerState<D> {
        OptimizerState {
            velocity: Array::zeros(params.raw_dim()),
            norm: Array::zeros(params.raw_dim()),
            steps: 0,
        }
    }

    /// Apply one update to `params` given the batch gradient.
    pub fn step<D: Dimension>(
        &self,
        state: &mut OptimizerState<D>,
        params: &mut Array<f64, D>,
        grads: &Array<f64, D>,
    ) {
        state.steps += 1;
        match *self {
            Optimizer::Stochastic { rate } => {
                Zip::from(params)
                    .and(grads)
                    .for_each(|param, &grad| *param -= rate * grad);
            }
            Optimizer::Momentum { rate, decay } => {
                Zip::from(params)
                    .and(grads)
                    .and(&mut state.velocity)
                    .for_each(|param, &grad, velocity| {
                        *velocity = (1.0 - decay) * *velocity + rate * grad;
                        *param -= *velocity;
                    });
            }
            Optimizer::Adam {
                rate,
                momentum_decay,
                norm_decay,
            } => {
                let t = state.steps.min(i32::MAX as u64) as i32;
                let momentum_bias = 1.0 - (1.0 - momentum_decay).powi(t);
                let norm_bias = 1.0 - (1.0 - norm_decay).powi(t);
                Zip::from(params)
                    .and(grads)
                    .and(&mut state.velocity)
                    .and(&mut state.norm)
                    .for_each(|param, &grad, velocity, norm| {
                        *velocity = (1.0 - momentum_decay) * *velocity + momentum_decay * grad;
                        *norm = (1.0 - norm_decay) * *norm + norm_decay * grad * grad;
                        let v_hat = *velocity / momentum_bias.max(EPSILON);
                        let n_hat = *norm / norm_bias.max(EPSILON);
                        *param -= rate * v_hat / (n_hat.sqrt() + EPSILON);
                    });
            }
        }
    }
}

/// Per-tensor optimizer memory.
#[derive(Debug, Clone)]
pub struct OptimizerState<D: Dimension> {
    velocity: Array<f64, D>,
    norm: Array<f64, D>,
    steps: u64,
}
