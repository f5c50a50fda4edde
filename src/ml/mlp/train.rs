use ndarray::{Array1, Array2};
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use super::model::forward;
use super::{Dense, MlpModel, MlpParams};
use crate::ml::optimizer::OptimizerState;
use crate::ml::{EarlyStopping, TrainError, argmax, encode_labels, rng_from, softmax};

/// Output of a training run.
pub(super) struct TrainOutcome {
    pub model: MlpModel,
    pub losses: Vec<f64>,
    pub scores: Vec<f64>,
}

pub(super) fn train_mlp(
    x: &Array2<f64>,
    labels: &[String],
    params: &MlpParams,
) -> Result<TrainOutcome, TrainError> {
    params.validate()?;
    if x.nrows() == 0 {
        return Err(TrainError::EmptyDataset);
    }
    if x.nrows() != labels.len() {
        return Err(TrainError::LabelCount {
            samples: x.nrows(),
            labels: labels.len(),
        });
    }
    let (classes, y) = encode_labels(labels);
    let n_classes = classes.len();
    if n_classes < 2 {
        return Err(TrainError::TooFewClasses(n_classes));
    }

    let mut rng = rng_from(params.seed);
    let mut order: Vec<usize> = (0..x.nrows()).collect();
    order.shuffle(&mut rng);
    let holdout_len = ((order.len() as f64) * params.holdout).round() as usize;
    let holdout_len = holdout_len.min(order.len().saturating_sub(1));
    let train_idx = order.split_off(holdout_len);
    // Without a holdout the training rows double as the scoring set.
    let score_idx = if order.is_empty() {
        train_idx.clone()
    } else {
        order
    };

    let mut widths = vec![x.ncols()];
    widths.extend(params.hidden_layers.iter().copied());
    widths.push(n_classes);
    let mut layers: Vec<Dense> = widths
        .windows(2)
        .map(|pair| Dense::random(pair[0], pair[1], &mut rng))
        .collect();
    let mut weight_states: Vec<OptimizerState<_>> = layers
        .iter()
        .map(|layer| params.optimizer.init(&layer.weights))
        .collect();
    let mut bias_states: Vec<OptimizerState<_>> = layers
        .iter()
        .map(|layer| params.optimizer.init(&layer.bias))
        .collect();

    let dropout = params.dropout;
    let batch_size = params.batch_size.max(1);
    let mut stopping = EarlyStopping::new(params.min_change, params.window);
    let mut losses = Vec::new();
    let mut scores = Vec::new();
    let mut best: Option<(f64, Vec<Dense>)> = None;
    let mut indices = train_idx;

    info!(
        samples = indices.len(),
        holdout = score_idx.len(),
        features = x.ncols(),
        classes = n_classes,
        hidden = ?params.hidden_layers,
        "Training multilayer perceptron"
    );

    for epoch in 1..=params.epochs {
        indices.shuffle(&mut rng);
        let mut epoch_loss = 0.0f64;
        for batch in indices.chunks(batch_size) {
            let mut grad_w: Vec<Array2<f64>> = layers
                .iter()
                .map(|layer| Array2::zeros(layer.weights.raw_dim()))
                .collect();
            let mut grad_b: Vec<Array1<f64>> = layers
                .iter()
                .map(|layer| Array1::zeros(layer.bias.raw_dim()))
                .collect();

            for &idx in batch {
                // activations[l] feeds layer l; derivatives[l] gates the output of hidden layer l.
                let mut activations = vec![x.row(idx).to_owned()];
                let mut derivatives: Vec<Array1<f64>> = Vec::with_capacity(layers.len());
                let (hidden, output) = layers.split_at(layers.len() - 1);
                for (l, layer) in hidden.iter().enumerate() {
                    let z = layer.forward(activations[l].view());
                    let mut gate = z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
                    if dropout > 0.0 {
                        gate.mapv_inplace(|g| {
                            if rng.random::<f64>() < dropout {
                                0.0
                            } else {
                                g / (1.0 - dropout)
                            }
                        });
                    }
                    activations.push(&z * &gate);
                    derivatives.push(gate);
                }
                let probs = softmax(output[0].forward(activations[hidden.len()].view()).view());

                let target = y[idx];
                epoch_loss -= probs[target].max(f64::MIN_POSITIVE).ln();
                let mut delta = probs;
                delta[target] -= 1.0;

                for l in (0..layers.len()).rev() {
                    for (unit, &d) in delta.iter().enumerate() {
                        grad_w[l].row_mut(unit).scaled_add(d, &activations[l]);
                    }
                    grad_b[l] += &delta;
                    if l > 0 {
                        delta = layers[l].weights.t().dot(&delta) * &derivatives[l - 1];
                    }
                }
            }

            let inv = 1.0 / batch.len() as f64;
            for (l, layer) in layers.iter_mut().enumerate() {
                grad_w[l] *= inv;
                grad_w[l].scaled_add(params.l2_penalty, &layer.weights);
                grad_b[l] *= inv;
                params
                    .optimizer
                    .step(&mut weight_states[l], &mut layer.weights, &grad_w[l]);
                params
                    .optimizer
                    .step(&mut bias_states[l], &mut layer.bias, &grad_b[l]);
            }
        }

        if !layers.iter().all(Dense::is_finite) {
            warn!(epoch, "Network weights diverged");
            return Err(TrainError::NonFinite { epoch });
        }

        let loss = epoch_loss / indices.len().max(1) as f64;
        let score = holdout_accuracy(&layers, x, &y, &score_idx);
        losses.push(loss);
        scores.push(score);
        info!(epoch, loss, score, "Epoch complete");

        if best.as_ref().is_none_or(|(best_score, _)| score > *best_score) {
            best = Some((score, layers.clone()));
        }
        if !loss.is_finite() {
            warn!(epoch, "Numerical instability detected, stopping early");
            break;
        }
        if stopping.update(loss) {
            debug!(epoch, "Loss stopped improving");
            break;
        }
    }

    if let Some((score, snapshot)) = best {
        debug!(score, "Restoring best network snapshot");
        layers = snapshot;
    }
    let model = MlpModel { classes, layers };
    model.validate().map_err(TrainError::InvalidParameter)?;
    info!(epochs = losses.len(), "Training complete");
    Ok(TrainOutcome {
        model,
        losses,
        scores,
    })
}

fn holdout_accuracy(layers: &[Dense], x: &Array2<f64>, y: &[usize], rows: &[usize]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    let correct = rows
        .iter()
        .filter(|&&idx| argmax(forward(layers, x.row(idx)).view()) == y[idx])
        .count();
    correct as f64 / rows.len() as f64
}
