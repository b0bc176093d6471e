use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing_subscriber::EnvFilter;

use spiral_mlp::{Error, Matrix, Model, TrainConfig, codec};

const DEFAULT_WEIGHTS: &str = "model/weights.json";

const USAGE: &str = "\
usage:
  spiral-mlp train [--config FILE] [--out FILE]
  spiral-mlp predict [--weights FILE] X Y [X Y ...]";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("train") => run_train(args.collect()),
        Some("predict") => run_predict(args.collect()),
        Some("-h" | "--help") => {
            println!("{USAGE}");
            Ok(())
        }
        Some(other) => bail!("unknown command `{other}`\n{USAGE}"),
        None => bail!("missing command\n{USAGE}"),
    }
}

/// Pull `--flag VALUE` out of `args`, leaving the positional arguments.
fn take_flag(args: &mut Vec<String>, flag: &str) -> Result<Option<String>> {
    let Some(pos) = args.iter().position(|a| a == flag) else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        bail!("{flag} needs a value");
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    Ok(Some(value))
}

fn run_train(mut args: Vec<String>) -> Result<()> {
    let config = take_flag(&mut args, "--config")?;
    let out = take_flag(&mut args, "--out")?;
    if let Some(extra) = args.first() {
        bail!("unexpected argument `{extra}`\n{USAGE}");
    }

    let mut cfg = match &config {
        Some(path) => {
            TrainConfig::load(path).with_context(|| format!("loading config {path}"))?
        }
        None => TrainConfig::default(),
    };
    if let Some(out) = out {
        cfg.output = Some(PathBuf::from(out));
    }
    if cfg.output.is_none() {
        cfg.output = Some(PathBuf::from(DEFAULT_WEIGHTS));
    }

    spiral_mlp::train(&cfg).context("training failed")?;
    Ok(())
}

/// Load `path`, or fall back to a fresh untrained model when the file cannot be
/// read. A file that exists but does not decode is an error.
fn load_or_fresh(path: &str) -> Result<Model> {
    match codec::load(path) {
        Ok(model) => Ok(model),
        Err(err @ Error::Io(_)) => {
            tracing::warn!(
                path,
                error = %err,
                "could not read weights, using a freshly initialised model"
            );
            Ok(Model::new(2, 64, 3, 1337)?)
        }
        Err(err) => Err(err).with_context(|| format!("loading weights from {path}")),
    }
}

fn run_predict(mut args: Vec<String>) -> Result<()> {
    let weights =
        take_flag(&mut args, "--weights")?.unwrap_or_else(|| DEFAULT_WEIGHTS.to_owned());
    if args.is_empty() || args.len() % 2 != 0 {
        bail!("predict needs coordinates as X Y pairs\n{USAGE}");
    }

    let coords = args
        .iter()
        .map(|a| {
            a.parse::<f64>()
                .with_context(|| format!("`{a}` is not a number"))
        })
        .collect::<Result<Vec<_>>>()?;
    let points = Matrix::from_vec(coords.len() / 2, 2, coords)?;

    let model = load_or_fresh(&weights)?;

    let pred = model
        .predict(&points)
        .with_context(|| format!("predicting with weights from {weights}"))?;
    for ((point, probs), class) in points
        .iter_rows()
        .zip(pred.probs.iter_rows())
        .zip(&pred.argmax)
    {
        let probs = probs
            .iter()
            .map(|p| format!("{p:.4}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!("{:.4} {:.4} -> class {class} [{probs}]", point[0], point[1]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_weights_fall_back_to_a_fresh_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let model = load_or_fresh(path.to_str().unwrap()).unwrap();
        assert_eq!(model, Model::new(2, 64, 3, 1337).unwrap());
    }

    #[test]
    fn corrupt_weights_are_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.json");
        std::fs::write(&path, r#"{"l1":{"W":[[1,NaN]]"#).unwrap();
        let err = load_or_fresh(path.to_str().unwrap()).unwrap_err();
        assert!(
            matches!(
                err.downcast_ref::<Error>(),
                Some(Error::InvalidWeightsFormat { .. })
            ),
            "{err:#}"
        );
    }

    #[test]
    fn saved_weights_are_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.json");
        let model = Model::new(2, 4, 3, 7).unwrap();
        codec::save(&model, &path).unwrap();
        let loaded = load_or_fresh(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded, codec::load(&path).unwrap());
        assert_eq!(loaded.hidden_dim(), 4);
    }
}
