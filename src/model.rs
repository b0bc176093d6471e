use crate::layer::DenseLayer;
use crate::matrix::{self, Matrix};
use crate::{Error, Result};

/// Weight scale used by [`Model::new`].
pub const DEFAULT_WEIGHT_SCALE: f64 = 0.01;

/// Two dense layers: `input -> hidden (ReLU) -> classes (softmax)`.
///
/// `forward` takes `&self` and allocates its own intermediates, so a trained
/// model can be shared across threads (`&Model` / `Arc<Model>`) without locks.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    l1: DenseLayer,
    l2: DenseLayer,
}

/// Hidden-layer activations retained between the forward and backward pass.
///
/// Owned by the caller and reused across epochs; the buffer is reallocated only
/// when the batch shape changes.
#[derive(Debug, Clone, Default)]
pub struct ActivationCache {
    hidden: Matrix,
}

/// The forward result paired with the activations it was computed from.
///
/// [`Model::backward`] only accepts this type, so gradients can only be taken
/// against the activations of a matching forward pass.
#[derive(Debug)]
pub struct ForwardPass<'c> {
    probs: Matrix,
    hidden: &'c Matrix,
}

impl ForwardPass<'_> {
    /// Class probabilities, shape `(n, classes)`.
    #[inline]
    pub fn probs(&self) -> &Matrix {
        &self.probs
    }

    /// Post-ReLU hidden activations, shape `(n, hidden)`.
    #[inline]
    pub fn hidden(&self) -> &Matrix {
        self.hidden
    }

    #[inline]
    pub fn into_probs(self) -> Matrix {
        self.probs
    }
}

/// Output of [`Model::predict`].
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Shape `(n, classes)`; every row sums to 1.
    pub probs: Matrix,
    /// Most likely class per row, each in `[0, classes)`.
    pub argmax: Vec<usize>,
}

/// Parameter gradients, shape-matched to `l1.W`, `l1.b`, `l2.W`, `l2.b`.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    d_w1: Matrix,
    d_b1: Vec<f64>,
    d_w2: Matrix,
    d_b2: Vec<f64>,
}

impl Gradients {
    #[inline]
    pub fn d_w1(&self) -> &Matrix {
        &self.d_w1
    }

    #[inline]
    pub fn d_b1(&self) -> &[f64] {
        &self.d_b1
    }

    #[inline]
    pub fn d_w2(&self) -> &Matrix {
        &self.d_w2
    }

    #[inline]
    pub fn d_b2(&self) -> &[f64] {
        &self.d_b2
    }
}

impl Model {
    /// Random init with [`DEFAULT_WEIGHT_SCALE`]; `l1` uses `seed`, `l2` uses `seed + 1`.
    pub fn new(input_dim: usize, hidden_dim: usize, classes: usize, seed: u64) -> Result<Self> {
        crate::ModelBuilder::new(input_dim, hidden_dim, classes)?
            .seed(seed)
            .build()
    }

    /// Chain two layers. Requires `l1.out_dim() == l2.in_dim()`.
    pub fn from_layers(l1: DenseLayer, l2: DenseLayer) -> Result<Self> {
        if l1.out_dim() != l2.in_dim() {
            return Err(Error::DimensionMismatch(format!(
                "l1 out_dim {} does not match l2 in_dim {}",
                l1.out_dim(),
                l2.in_dim()
            )));
        }
        Ok(Self { l1, l2 })
    }

    #[inline]
    pub fn l1(&self) -> &DenseLayer {
        &self.l1
    }

    #[inline]
    pub fn l2(&self) -> &DenseLayer {
        &self.l2
    }

    #[inline]
    pub(crate) fn layers_mut(&mut self) -> (&mut DenseLayer, &mut DenseLayer) {
        (&mut self.l1, &mut self.l2)
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.l1.in_dim()
    }

    #[inline]
    pub fn hidden_dim(&self) -> usize {
        self.l1.out_dim()
    }

    #[inline]
    pub fn num_classes(&self) -> usize {
        self.l2.out_dim()
    }

    pub fn num_parameters(&self) -> usize {
        let layer = |l: &DenseLayer| l.in_dim() * l.out_dim() + l.out_dim();
        layer(&self.l1) + layer(&self.l2)
    }

    fn check_input(&self, x: &Matrix) -> Result<()> {
        if x.cols() != self.input_dim() {
            return Err(Error::DimensionMismatch(format!(
                "input has {} features, model expects {}",
                x.cols(),
                self.input_dim()
            )));
        }
        Ok(())
    }

    /// `softmax(a1 W2 + b2)`
    fn head(&self, hidden: &Matrix) -> Result<Matrix> {
        let mut probs = self.l2.forward(hidden)?;
        matrix::softmax_mut(&mut probs);
        Ok(probs)
    }

    /// Class probabilities for a batch of shape `(n, input_dim)`.
    pub fn forward(&self, x: &Matrix) -> Result<Matrix> {
        self.check_input(x)?;
        let hidden = matrix::relu(&self.l1.forward(x)?);
        self.head(&hidden)
    }

    /// Forward pass that keeps the hidden activations in `cache` for [`Model::backward`].
    pub fn forward_with_cache<'c>(
        &self,
        x: &Matrix,
        cache: &'c mut ActivationCache,
    ) -> Result<ForwardPass<'c>> {
        self.check_input(x)?;
        let z1 = self.l1.forward(x)?;
        if cache.hidden.shape() != z1.shape() {
            cache.hidden = Matrix::zeros(z1.rows(), z1.cols());
        }
        matrix::relu_into(&z1, &mut cache.hidden)?;

        let hidden: &'c Matrix = &cache.hidden;
        let probs = self.head(hidden)?;
        Ok(ForwardPass { probs, hidden })
    }

    /// Probabilities plus the most likely class per row.
    pub fn predict(&self, x: &Matrix) -> Result<Prediction> {
        let probs = self.forward(x)?;
        let argmax = matrix::argmax(&probs);
        Ok(Prediction { probs, argmax })
    }

    /// Gradients of mean categorical cross-entropy w.r.t. every parameter.
    ///
    /// `x` and `labels` must be the batch that produced `pass`.
    pub fn backward(
        &self,
        x: &Matrix,
        pass: &ForwardPass<'_>,
        labels: &[usize],
    ) -> Result<Gradients> {
        self.check_input(x)?;
        let n = x.rows();
        let classes = self.num_classes();
        if n == 0 {
            return Err(Error::InvalidData("batch must not be empty".to_owned()));
        }
        if labels.len() != n {
            return Err(Error::DimensionMismatch(format!(
                "{} labels for {n} samples",
                labels.len()
            )));
        }
        if pass.probs.shape() != (n, classes) {
            return Err(Error::DimensionMismatch(format!(
                "probs shape {:?} does not match ({n}, {classes})",
                pass.probs.shape()
            )));
        }
        if pass.hidden.shape() != (n, self.hidden_dim()) {
            return Err(Error::DimensionMismatch(format!(
                "cached activations shape {:?} does not match ({n}, {})",
                pass.hidden.shape(),
                self.hidden_dim()
            )));
        }
        if let Some((i, &y)) = labels.iter().enumerate().find(|&(_, &y)| y >= classes) {
            return Err(Error::InvalidData(format!(
                "label {y} at row {i} is out of range for {classes} classes"
            )));
        }

        let inv_n = 1.0 / n as f64;

        // Softmax + cross-entropy: dL/dz2 = probs - onehot(y).
        let mut d_z2 = pass.probs.clone();
        for (i, &y) in labels.iter().enumerate() {
            d_z2[(i, y)] -= 1.0;
        }

        let mut d_w2 = matrix::dot_transpose_a(pass.hidden, &d_z2)?;
        d_w2.scale_mut(inv_n);
        let d_b2 = matrix::mean_cols(&d_z2);

        // dA1, then gated by the ReLU derivative in place.
        let mut d_z1 = matrix::dot_transpose_b(&d_z2, self.l2.weights())?;
        for (g, &a) in d_z1
            .as_mut_slice()
            .iter_mut()
            .zip(pass.hidden.as_slice())
        {
            if a <= 0.0 {
                *g = 0.0;
            }
        }

        let mut d_w1 = matrix::dot_transpose_a(x, &d_z1)?;
        d_w1.scale_mut(inv_n);
        let d_b1 = matrix::mean_cols(&d_z1);

        Ok(Gradients {
            d_w1,
            d_b1,
            d_w2,
            d_b2,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    use crate::data;
    use crate::loss::categorical_cross_entropy;

    fn assert_close(analytic: f64, numeric: f64, tol: f64) {
        let diff = (analytic - numeric).abs();
        assert!(
            diff <= tol,
            "analytic={analytic} numeric={numeric} diff={diff}"
        );
    }

    fn loss_for(model: &Model, x: &Matrix, labels: &[usize]) -> f64 {
        let probs = model.forward(x).unwrap();
        categorical_cross_entropy(&probs, labels).unwrap()
    }

    /// Central-difference estimate for every parameter, compared to `backward`.
    #[test]
    fn backward_matches_numeric_gradients() {
        let ds = data::spiral(5, 3, 11).unwrap();
        // Each arm starts at the origin, where z1 == b1 == 0 sits exactly on the ReLU
        // kink. Shift the points off it so central differences are well defined.
        let mut shifted = ds.inputs().clone();
        for v in shifted.as_mut_slice() {
            *v += 0.05;
        }
        let x = &shifted;
        // Larger weights than the default so most hidden units are active and the
        // gradients are not vanishingly small.
        let mut model = crate::ModelBuilder::new(2, 6, 3)
            .unwrap()
            .weight_scale(0.5)
            .seed(3)
            .build()
            .unwrap();

        let mut cache = ActivationCache::default();
        let pass = model.forward_with_cache(x, &mut cache).unwrap();
        let grads = model.backward(x, &pass, ds.labels()).unwrap();

        let h = 1e-5;
        let tol = 1e-4;

        for layer_idx in 0..2 {
            let n_w = {
                let (l1, l2) = model.layers_mut();
                let layer = if layer_idx == 0 { l1 } else { l2 };
                layer.params_mut().0.as_slice().len()
            };
            for p in 0..n_w {
                let perturb = |model: &mut Model, delta: f64| {
                    let (l1, l2) = model.layers_mut();
                    let layer = if layer_idx == 0 { l1 } else { l2 };
                    layer.params_mut().0.as_mut_slice()[p] += delta;
                };
                perturb(&mut model, h);
                let plus = loss_for(&model, x, ds.labels());
                perturb(&mut model, -2.0 * h);
                let minus = loss_for(&model, x, ds.labels());
                perturb(&mut model, h);

                let numeric = (plus - minus) / (2.0 * h);
                let analytic = if layer_idx == 0 {
                    grads.d_w1().as_slice()[p]
                } else {
                    grads.d_w2().as_slice()[p]
                };
                assert_close(analytic, numeric, tol);
            }

            let n_b = if layer_idx == 0 { 6 } else { 3 };
            for p in 0..n_b {
                let perturb = |model: &mut Model, delta: f64| {
                    let (l1, l2) = model.layers_mut();
                    let layer = if layer_idx == 0 { l1 } else { l2 };
                    layer.params_mut().1[p] += delta;
                };
                perturb(&mut model, h);
                let plus = loss_for(&model, x, ds.labels());
                perturb(&mut model, -2.0 * h);
                let minus = loss_for(&model, x, ds.labels());
                perturb(&mut model, h);

                let numeric = (plus - minus) / (2.0 * h);
                let analytic = if layer_idx == 0 {
                    grads.d_b1()[p]
                } else {
                    grads.d_b2()[p]
                };
                assert_close(analytic, numeric, tol);
            }
        }
    }

    #[test]
    fn gradients_are_shape_matched_to_parameters() {
        let model = Model::new(2, 8, 3, 0).unwrap();
        let ds = data::spiral(4, 3, 0).unwrap();
        let mut cache = ActivationCache::default();
        let pass = model.forward_with_cache(ds.inputs(), &mut cache).unwrap();
        let g = model.backward(ds.inputs(), &pass, ds.labels()).unwrap();

        assert_eq!(g.d_w1().shape(), model.l1().weights().shape());
        assert_eq!(g.d_b1().len(), model.l1().biases().len());
        assert_eq!(g.d_w2().shape(), model.l2().weights().shape());
        assert_eq!(g.d_b2().len(), model.l2().biases().len());
    }

    #[test]
    fn forward_with_cache_matches_forward() {
        let model = Model::new(2, 16, 3, 5).unwrap();
        let ds = data::spiral(10, 3, 1).unwrap();

        let mut cache = ActivationCache::default();
        let cached = model
            .forward_with_cache(ds.inputs(), &mut cache)
            .unwrap()
            .into_probs();
        assert_eq!(cached, model.forward(ds.inputs()).unwrap());
        assert_eq!(cache.hidden.shape(), (30, 16));
        assert!(cache.hidden.as_slice().iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn predict_rows_are_distributions() {
        let model = Model::new(2, 16, 4, 9).unwrap();
        let x = Matrix::from_vec(3, 2, vec![0.1, 0.2, -0.5, 0.9, 0.0, 0.0]).unwrap();
        let pred = model.predict(&x).unwrap();
        assert_eq!(pred.probs.shape(), (3, 4));
        for row in pred.probs.iter_rows() {
            assert_abs_diff_eq!(row.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        }
        assert!(pred.argmax.iter().all(|&c| c < 4));
    }

    #[test]
    fn forward_rejects_wrong_feature_count() {
        let model = Model::new(2, 4, 3, 0).unwrap();
        assert!(matches!(
            model.forward(&Matrix::zeros(1, 3)),
            Err(Error::DimensionMismatch(_))
        ));
    }

    #[test]
    fn backward_rejects_out_of_range_labels() {
        let model = Model::new(2, 4, 3, 0).unwrap();
        let x = Matrix::zeros(2, 2);
        let mut cache = ActivationCache::default();
        let pass = model.forward_with_cache(&x, &mut cache).unwrap();
        assert!(model.backward(&x, &pass, &[0, 3]).is_err());
        assert!(model.backward(&x, &pass, &[0]).is_err());
    }

    #[test]
    fn from_layers_requires_chained_dims() {
        let l1 = DenseLayer::new(2, 4, 0.01, 0).unwrap();
        let l2 = DenseLayer::new(5, 3, 0.01, 1).unwrap();
        assert!(Model::from_layers(l1, l2).is_err());
    }

    #[test]
    fn concurrent_readers_see_identical_outputs() {
        let model = Model::new(2, 32, 3, 1337).unwrap();
        let ds = data::spiral(20, 3, 4).unwrap();
        let expected = model.forward(ds.inputs()).unwrap();

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| model.forward(ds.inputs()).unwrap()))
                .collect();
            for h in handles {
                assert_eq!(h.join().unwrap(), expected);
            }
        });
    }
}
