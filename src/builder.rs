//! Model builder.
//!
//! `ModelBuilder` makes the three layer sizes explicit and lets callers override
//! the initialization scale and seed:
//!
//! ```rust
//! use spiral_mlp::ModelBuilder;
//!
//! # fn main() -> spiral_mlp::Result<()> {
//! let model = ModelBuilder::new(2, 64, 3)?
//!     .weight_scale(0.01)
//!     .seed(1337)
//!     .build()?;
//! assert_eq!(model.num_parameters(), 2 * 64 + 64 + 64 * 3 + 3);
//! # Ok(())
//! # }
//! ```

use rand::Rng;

use crate::model::DEFAULT_WEIGHT_SCALE;
use crate::{DenseLayer, Error, Model, Result};

#[derive(Debug, Clone)]
pub struct ModelBuilder {
    input_dim: usize,
    hidden_dim: usize,
    classes: usize,
    weight_scale: f64,
    seed: u64,
}

impl ModelBuilder {
    pub fn new(input_dim: usize, hidden_dim: usize, classes: usize) -> Result<Self> {
        if input_dim == 0 || hidden_dim == 0 || classes == 0 {
            return Err(Error::InvalidConfig(format!(
                "model dims must be > 0, got input={input_dim} hidden={hidden_dim} classes={classes}"
            )));
        }
        Ok(Self {
            input_dim,
            hidden_dim,
            classes,
            weight_scale: DEFAULT_WEIGHT_SCALE,
            seed: 0,
        })
    }

    /// Standard deviation of the initial weights.
    pub fn weight_scale(mut self, weight_scale: f64) -> Self {
        self.weight_scale = weight_scale;
        self
    }

    /// Seed for `l1`; `l2` is seeded with `seed + 1`.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn build(self) -> Result<Model> {
        let l1 = DenseLayer::new(self.input_dim, self.hidden_dim, self.weight_scale, self.seed)?;
        let l2 = DenseLayer::new(
            self.hidden_dim,
            self.classes,
            self.weight_scale,
            self.seed.wrapping_add(1),
        )?;
        Model::from_layers(l1, l2)
    }

    /// Draw both layers from one caller-provided RNG (the builder seed is ignored).
    pub fn build_with_rng<R: Rng + ?Sized>(self, rng: &mut R) -> Result<Model> {
        let l1 = DenseLayer::new_with_rng(self.input_dim, self.hidden_dim, self.weight_scale, rng)?;
        let l2 = DenseLayer::new_with_rng(self.hidden_dim, self.classes, self.weight_scale, rng)?;
        Model::from_layers(l1, l2)
    }
}
