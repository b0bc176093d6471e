//! A two-layer MLP classifier trained from scratch on the spiral dataset.
//!
//! `spiral-mlp` implements the forward pass, backpropagation and full-batch SGD
//! by hand on a small row-major [`Matrix`] type. It is designed to be read end
//! to end: every gradient is written out explicitly in [`Model::backward`].
//!
//! # Design goals
//!
//! - Determinism: the same seeds always produce the same dataset, weights and
//!   training trajectory.
//! - Clear contracts: shapes are validated at every public boundary and
//!   mismatches surface as [`Error::DimensionMismatch`] instead of panics.
//! - Plain persistence: trained weights round-trip through a small JSON text
//!   format (see [`codec`]).
//!
//! # Data layout and shapes
//!
//! - Scalars are `f64`.
//! - Batches are row-major with one sample per row: inputs `(n, input_dim)`,
//!   probabilities `(n, classes)`.
//! - Layer weights are row-major with shape `(in_dim, out_dim)`, so a layer
//!   computes `x · W + b`.
//!
//! # Quick start
//!
//! ```rust
//! use spiral_mlp::{FitConfig, Model, NoopObserver, data};
//!
//! # fn main() -> spiral_mlp::Result<()> {
//! let train = data::spiral(20, 3, 42)?;
//! let mut model = Model::new(2, 16, 3, 1337)?;
//!
//! let report = model.fit(
//!     &train,
//!     &FitConfig {
//!         epochs: 100,
//!         log_every: 50,
//!         ..FitConfig::default()
//!     },
//!     &mut NoopObserver,
//! )?;
//! assert_eq!(report.last.epoch, 100);
//!
//! let pred = model.predict(train.inputs())?;
//! assert_eq!(pred.argmax.len(), train.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Driving a step by hand
//!
//! [`Model::fit`] is a thin loop over the same public pieces:
//!
//! ```rust
//! use spiral_mlp::{ActivationCache, Model, Sgd, data, loss};
//!
//! # fn main() -> spiral_mlp::Result<()> {
//! let ds = data::spiral(10, 3, 0)?;
//! let mut model = Model::new(2, 8, 3, 0)?;
//! let opt = Sgd::new(0.1, 1e-4)?;
//! let mut cache = ActivationCache::default();
//!
//! let pass = model.forward_with_cache(ds.inputs(), &mut cache)?;
//! let _loss = loss::categorical_cross_entropy(pass.probs(), ds.labels())?;
//! let grads = model.backward(ds.inputs(), &pass, ds.labels())?;
//! opt.step(&mut model, &grads)?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod codec;
pub mod data;
pub mod error;
pub mod layer;
pub mod loss;
pub mod matrix;
pub mod metrics;
pub mod model;
pub mod optim;
pub mod train;

pub use builder::ModelBuilder;
pub use data::Dataset;
pub use error::{Error, FormatErrorKind, Result};
pub use layer::DenseLayer;
pub use matrix::Matrix;
pub use model::{ActivationCache, ForwardPass, Gradients, Model, Prediction};
pub use optim::Sgd;
pub use train::{
    EpochReport, FitConfig, FitReport, LogObserver, NoopObserver, ProgressObserver, TrainConfig,
    train, train_with_observer,
};
