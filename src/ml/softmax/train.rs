use ndarray::{Array1, Array2};
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use super::{SoftmaxModel, SoftmaxParams};
use crate::ml::{EarlyStopping, TrainError, encode_labels, rng_from, softmax};

pub(super) fn train_softmax(
    x: &Array2<f64>,
    labels: &[String],
    params: &SoftmaxParams,
) -> Result<(SoftmaxModel, Vec<f64>), TrainError> {
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
    let k = classes.len();
    if k < 2 {
        return Err(TrainError::TooFewClasses(k));
    }
    let dim = x.ncols();

    let mut rng = rng_from(params.seed);
    let mut weights = Array2::from_shape_fn((k, dim), |_| (rng.random::<f64>() - 0.5) * 0.01);
    let mut bias = Array1::<f64>::zeros(k);
    let mut weight_state = params.optimizer.init(&weights);
    let mut bias_state = params.optimizer.init(&bias);

    let mut indices: Vec<usize> = (0..x.nrows()).collect();
    let batch_size = params.batch_size.max(1);
    let l2 = params.l2_penalty;
    let mut stopping = EarlyStopping::new(params.min_change, params.window);
    let mut losses = Vec::new();

    info!(
        samples = x.nrows(),
        features = dim,
        classes = k,
        "Training softmax classifier"
    );

    for epoch in 1..=params.epochs {
        indices.shuffle(&mut rng);
        let mut epoch_loss = 0.0f64;
        for chunk in indices.chunks(batch_size) {
            let mut grad_w = Array2::<f64>::zeros((k, dim));
            let mut grad_b = Array1::<f64>::zeros(k);
            for &idx in chunk {
                let row = x.row(idx);
                let target = y[idx];
                let mut probs = softmax((weights.dot(&row) + &bias).view());
                epoch_loss -= probs[target].max(f64::MIN_POSITIVE).ln();
                probs[target] -= 1.0;
                for (c, &diff) in probs.iter().enumerate() {
                    grad_w.row_mut(c).scaled_add(diff, &row);
                }
                grad_b += &probs;
            }
            let inv = 1.0 / chunk.len() as f64;
            grad_w *= inv;
            grad_w.scaled_add(l2, &weights);
            grad_b *= inv;
            params
                .optimizer
                .step(&mut weight_state, &mut weights, &grad_w);
            params.optimizer.step(&mut bias_state, &mut bias, &grad_b);
        }

        let loss = epoch_loss / x.nrows() as f64;
        losses.push(loss);
        info!(epoch, loss, "Epoch complete");

        if !weights.iter().chain(bias.iter()).all(|v| v.is_finite()) {
            warn!(epoch, "Weights diverged");
            return Err(TrainError::NonFinite { epoch });
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

    let model = SoftmaxModel {
        classes,
        weights,
        bias,
    };
    info!(epochs = losses.len(), "Training complete");
    Ok((model, losses))
}
