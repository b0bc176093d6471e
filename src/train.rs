//! Training loop.
//!
//! Each epoch runs forward, loss, backward and one SGD step over the whole
//! dataset, strictly in that order. Every `log_every` epochs the classification
//! accuracy is recomputed and an [`EpochReport`] is handed to a
//! [`ProgressObserver`]. There is no early stopping: the loop always runs
//! `epochs` times unless a step fails.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::loss::categorical_cross_entropy;
use crate::metrics::accuracy;
use crate::{ActivationCache, Dataset, Error, Model, ModelBuilder, Result, Sgd, codec, data};

/// Hyperparameters for [`Model::fit`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitConfig {
    pub epochs: usize,
    pub lr: f64,
    pub l2: f64,
    /// Emit a progress observation every `log_every` epochs.
    pub log_every: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            epochs: 4000,
            lr: 0.1,
            l2: 1e-4,
            log_every: 400,
        }
    }
}

impl FitConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::InvalidConfig("epochs must be > 0".to_owned()));
        }
        if self.log_every == 0 {
            return Err(Error::InvalidConfig("log_every must be > 0".to_owned()));
        }
        // lr / l2 ranges are owned by `Sgd::new`.
        Sgd::new(self.lr, self.l2).map(|_| ())
    }
}

/// One progress observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    /// 1-based epoch index.
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
}

/// Summary returned by [`Model::fit`].
#[derive(Debug, Clone, PartialEq)]
pub struct FitReport {
    /// Loss and accuracy of the final epoch (measured before its update).
    pub last: EpochReport,
    /// Every report that was handed to the observer.
    pub history: Vec<EpochReport>,
}

/// Receives progress observations during training.
pub trait ProgressObserver {
    fn observe(&mut self, report: &EpochReport);
}

impl<F: FnMut(&EpochReport)> ProgressObserver for F {
    fn observe(&mut self, report: &EpochReport) {
        self(report)
    }
}

/// Observer that emits each report as a `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl ProgressObserver for LogObserver {
    fn observe(&mut self, report: &EpochReport) {
        tracing::info!(
            epoch = report.epoch,
            loss = report.loss,
            accuracy = report.accuracy,
            "epoch {} loss={:.4} acc={:.3}",
            report.epoch,
            report.loss,
            report.accuracy
        );
    }
}

/// Observer that drops every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn observe(&mut self, _report: &EpochReport) {}
}

impl Model {
    /// Full-batch training with categorical cross-entropy and L2-regularized SGD.
    ///
    /// The hidden activations of each forward pass are kept in one buffer that
    /// is reused across epochs. A NaN probability or a non-finite loss aborts the
    /// run with [`Error::NonFiniteLoss`].
    pub fn fit(
        &mut self,
        train: &Dataset,
        cfg: &FitConfig,
        observer: &mut dyn ProgressObserver,
    ) -> Result<FitReport> {
        cfg.validate()?;
        if train.is_empty() {
            return Err(Error::InvalidData(
                "train dataset must not be empty".to_owned(),
            ));
        }
        if train.input_dim() != self.input_dim() {
            return Err(Error::DimensionMismatch(format!(
                "train input_dim {} does not match model input_dim {}",
                train.input_dim(),
                self.input_dim()
            )));
        }
        if train.classes() != self.num_classes() {
            return Err(Error::DimensionMismatch(format!(
                "train has {} classes, model outputs {}",
                train.classes(),
                self.num_classes()
            )));
        }

        let opt = Sgd::new(cfg.lr, cfg.l2)?;
        let x = train.inputs();
        let y = train.labels();
        let mut cache = ActivationCache::default();
        let mut history = Vec::with_capacity(cfg.epochs / cfg.log_every);
        let mut last = None;

        for epoch in 1..=cfg.epochs {
            let pass = self.forward_with_cache(x, &mut cache)?;
            let loss = categorical_cross_entropy(pass.probs(), y)?;
            // `f64::max` swallows NaN, so the clipped loss alone cannot detect it.
            if !loss.is_finite() || pass.probs().as_slice().iter().any(|p| p.is_nan()) {
                return Err(Error::NonFiniteLoss { epoch });
            }
            tracing::debug!(epoch, loss, "epoch");

            let observe = epoch % cfg.log_every == 0;
            if observe || epoch == cfg.epochs {
                let report = EpochReport {
                    epoch,
                    loss,
                    accuracy: accuracy(pass.probs(), y)?,
                };
                if observe {
                    observer.observe(&report);
                    history.push(report);
                }
                last = Some(report);
            }

            let grads = self.backward(x, &pass, y)?;
            opt.step(self, &grads)?;
        }

        let last = last.ok_or_else(|| Error::InvalidConfig("epochs must be > 0".to_owned()))?;
        Ok(FitReport { last, history })
    }
}

/// Settings for a complete run: dataset, model shape, optimizer and output.
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```rust
/// use spiral_mlp::TrainConfig;
///
/// # fn main() -> spiral_mlp::Result<()> {
/// let cfg = TrainConfig::from_toml_str("epochs = 200\nlr = 0.5\n")?;
/// assert_eq!(cfg.epochs, 200);
/// assert_eq!(cfg.hidden, 64);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainConfig {
    pub points_per_class: usize,
    pub classes: usize,
    pub data_seed: u64,
    pub hidden: usize,
    pub model_seed: u64,
    pub weight_scale: f64,
    pub epochs: usize,
    pub lr: f64,
    pub l2: f64,
    pub log_every: usize,
    /// Where to write the trained weights. `None` keeps them in memory only.
    pub output: Option<PathBuf>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        let fit = FitConfig::default();
        Self {
            points_per_class: 100,
            classes: 3,
            data_seed: 42,
            hidden: 64,
            model_seed: 1337,
            weight_scale: crate::model::DEFAULT_WEIGHT_SCALE,
            epochs: fit.epochs,
            lr: fit.lr,
            l2: fit.l2,
            log_every: fit.log_every,
            output: None,
        }
    }
}

impl TrainConfig {
    /// Defaults with the six run-defining knobs overridden.
    pub fn new(
        points_per_class: usize,
        classes: usize,
        seed: u64,
        epochs: usize,
        lr: f64,
        l2: f64,
    ) -> Self {
        Self {
            points_per_class,
            classes,
            data_seed: seed,
            epochs,
            lr,
            l2,
            ..Self::default()
        }
    }

    pub fn fit_config(&self) -> FitConfig {
        FitConfig {
            epochs: self.epochs,
            lr: self.lr,
            l2: self.l2,
            log_every: self.log_every,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.points_per_class == 0 || self.classes == 0 || self.hidden == 0 {
            return Err(Error::InvalidConfig(format!(
                "points_per_class, classes and hidden must be > 0, got {}, {}, {}",
                self.points_per_class, self.classes, self.hidden
            )));
        }
        if !(self.weight_scale.is_finite() && self.weight_scale > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "weight_scale must be finite and > 0, got {}",
                self.weight_scale
            )));
        }
        self.fit_config().validate()
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: Self =
            toml::from_str(s).map_err(|e| Error::InvalidConfig(format!("bad config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let s = std::fs::read_to_string(p)
            .map_err(|e| Error::Io(format!("failed to read {}: {e}", p.display())))?;
        Self::from_toml_str(&s)
    }
}

/// Generate the spiral dataset, train a fresh model on it, and save it if
/// `cfg.output` is set. Progress goes to `tracing`.
pub fn train(cfg: &TrainConfig) -> Result<Model> {
    train_with_observer(cfg, &mut LogObserver)
}

pub fn train_with_observer(
    cfg: &TrainConfig,
    observer: &mut dyn ProgressObserver,
) -> Result<Model> {
    cfg.validate()?;

    let dataset = data::spiral(cfg.points_per_class, cfg.classes, cfg.data_seed)?;
    let mut model = ModelBuilder::new(dataset.input_dim(), cfg.hidden, cfg.classes)?
        .weight_scale(cfg.weight_scale)
        .seed(cfg.model_seed)
        .build()?;

    tracing::info!(
        samples = dataset.len(),
        classes = cfg.classes,
        hidden = cfg.hidden,
        parameters = model.num_parameters(),
        epochs = cfg.epochs,
        lr = cfg.lr,
        l2 = cfg.l2,
        "starting training"
    );

    let report = model.fit(&dataset, &cfg.fit_config(), observer)?;
    tracing::info!(
        epoch = report.last.epoch,
        loss = report.last.loss,
        accuracy = report.last.accuracy,
        "training complete"
    );

    if let Some(path) = &cfg.output {
        codec::save(&model, path)?;
    }
    Ok(model)
}
