//! Text encoding of trained weights.
//!
//! The format is a single JSON object with a fixed shape:
//!
//! ```text
//! {"l1":{"W":[[..],..],"b":[..]},"l2":{"W":[[..],..],"b":[..]}}
//! ```
//!
//! `W` is stored as rows of shape `(in_dim, out_dim)`; every number is written
//! with exactly ten fractional digits.
//!
//! Decoding tokenizes the whole document first and then validates it against
//! that schema: exact key sets, rank-2 `W` with equal-length rows, rank-1 `b`,
//! finite numbers only, and layer sizes that chain. Key order and whitespace do
//! not matter. Every failure is an [`Error::InvalidWeightsFormat`] naming the
//! offending field, e.g. `l2.W[3][1]`.

use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::error::FormatErrorKind;
use crate::matrix::Matrix;
use crate::{DenseLayer, Error, Model, Result};

const ROOT: &str = "<root>";
const LAYER_KEYS: [&str; 2] = ["l1", "l2"];
const PARAM_KEYS: [&str; 2] = ["W", "b"];

/// Encode `model` in the weights text format.
///
/// Fails with [`Error::InvalidData`] if any parameter is NaN or infinite, since
/// those have no representation in the format.
pub fn encode(model: &Model) -> Result<String> {
    let mut out = String::with_capacity(16 * model.num_parameters() + 64);
    out.push('{');
    for (i, (name, layer)) in [("l1", model.l1()), ("l2", model.l2())]
        .into_iter()
        .enumerate()
    {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "\"{name}\":{{\"W\":");
        write_matrix(&mut out, layer.weights(), name)?;
        out.push_str(",\"b\":");
        write_vector(&mut out, layer.biases(), &format!("{name}.b"))?;
        out.push('}');
    }
    out.push('}');
    Ok(out)
}

fn write_matrix(out: &mut String, m: &Matrix, layer: &str) -> Result<()> {
    out.push('[');
    for (i, row) in m.iter_rows().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_vector(out, row, &format!("{layer}.W[{i}]"))?;
    }
    out.push(']');
    Ok(())
}

fn write_vector(out: &mut String, v: &[f64], field: &str) -> Result<()> {
    out.push('[');
    for (j, &x) in v.iter().enumerate() {
        if !x.is_finite() {
            return Err(Error::InvalidData(format!(
                "cannot encode non-finite value {x} at {field}[{j}]"
            )));
        }
        if j > 0 {
            out.push(',');
        }
        let _ = write!(out, "{x:.10}");
    }
    out.push(']');
    Ok(())
}

/// Parse weights text back into a [`Model`].
///
/// Layer sizes are inferred from the arrays: `input = W1.rows`,
/// `hidden = b1.len`, `classes = b2.len`.
pub fn decode(text: &str) -> Result<Model> {
    if text.trim().is_empty() {
        return Err(Error::format(
            ROOT,
            FormatErrorKind::Empty,
            "weights text is empty",
        ));
    }

    let doc: Value = serde_json::from_str(text).map_err(|e| match find_bad_number(text) {
        Some((field, token)) => Error::format(
            field,
            FormatErrorKind::Numeric,
            format!("`{token}` is not a finite number ({e})"),
        ),
        None => Error::format(ROOT, FormatErrorKind::Syntax, e.to_string()),
    })?;
    let root = expect_object(&doc, ROOT)?;
    expect_keys(root, &LAYER_KEYS, ROOT)?;

    let (w1, b1) = layer_params(root, "l1")?;
    let (w2, b2) = layer_params(root, "l2")?;

    if w1.cols() != b1.len() {
        return Err(shape_error(
            "l1.b",
            format!("length {} does not match l1.W cols {}", b1.len(), w1.cols()),
        ));
    }
    if w2.rows() != b1.len() {
        return Err(shape_error(
            "l2.W",
            format!("{} rows do not match hidden size {}", w2.rows(), b1.len()),
        ));
    }
    if w2.cols() != b2.len() {
        return Err(shape_error(
            "l2.b",
            format!("length {} does not match l2.W cols {}", b2.len(), w2.cols()),
        ));
    }

    let l1 = DenseLayer::from_parts(w1, b1).map_err(|e| shape_error("l1", e.to_string()))?;
    let l2 = DenseLayer::from_parts(w2, b2).map_err(|e| shape_error("l2", e.to_string()))?;
    Model::from_layers(l1, l2).map_err(|e| shape_error(ROOT, e.to_string()))
}

enum Scope {
    /// Key of the member currently being read, once seen.
    Object(Option<String>),
    /// Index of the element currently being read.
    Array(usize),
}

fn scope_path(stack: &[Scope]) -> String {
    let mut path = String::new();
    for scope in stack {
        match scope {
            Scope::Object(Some(key)) if path.is_empty() => path.push_str(key),
            Scope::Object(Some(key)) => {
                path.push('.');
                path.push_str(key);
            }
            Scope::Object(None) => {}
            Scope::Array(i) => {
                let _ = write!(path, "[{i}]");
            }
        }
    }
    path
}

/// Locate the first bare array element that is not a finite number
/// (`abc`, `NaN`, `1e400`), returning its field path and the token.
///
/// Only consulted after the JSON parser has rejected `text`; `None` means the
/// failure is structural.
fn find_bad_number(text: &str) -> Option<(String, String)> {
    let mut stack: Vec<Scope> = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        match c {
            '{' => stack.push(Scope::Object(None)),
            '[' => stack.push(Scope::Array(0)),
            '}' | ']' => {
                stack.pop();
            }
            ',' => match stack.last_mut() {
                Some(Scope::Array(i)) => *i += 1,
                Some(Scope::Object(key)) => *key = None,
                None => {}
            },
            '"' => {
                let mut s = String::new();
                while let Some((_, c)) = chars.next() {
                    match c {
                        '"' => break,
                        '\\' => {
                            chars.next();
                        }
                        c => s.push(c),
                    }
                }
                if let Some(Scope::Object(key)) = stack.last_mut() {
                    key.get_or_insert(s);
                }
            }
            ':' => {}
            c if c.is_whitespace() => {}
            _ => {
                let mut end = start + c.len_utf8();
                while let Some(&(i, c)) = chars.peek() {
                    let delimiter = matches!(c, ',' | ']' | '}' | ':' | '[' | '{' | '"');
                    if delimiter || c.is_whitespace() {
                        break;
                    }
                    end = i + c.len_utf8();
                    chars.next();
                }
                let token = &text[start..end];
                let is_literal = matches!(token, "true" | "false" | "null");
                let is_finite = token.parse::<f64>().is_ok_and(f64::is_finite);
                if matches!(stack.last(), Some(Scope::Array(_))) && !is_literal && !is_finite {
                    return Some((scope_path(&stack), token.to_owned()));
                }
            }
        }
    }
    None
}

fn shape_error(field: &str, detail: impl Into<String>) -> Error {
    Error::format(field, FormatErrorKind::Shape, detail)
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn expect_object<'a>(v: &'a Value, field: &str) -> Result<&'a Map<String, Value>> {
    v.as_object()
        .ok_or_else(|| shape_error(field, format!("expected an object, found {}", type_name(v))))
}

/// Require exactly `keys`: report the first missing one, then any extra one.
fn expect_keys(obj: &Map<String, Value>, keys: &[&str], field: &str) -> Result<()> {
    for key in keys {
        if !obj.contains_key(*key) {
            let path = if field == ROOT {
                (*key).to_owned()
            } else {
                format!("{field}.{key}")
            };
            return Err(Error::format(
                path,
                FormatErrorKind::MissingField,
                format!("key \"{key}\" is required"),
            ));
        }
    }
    if let Some(extra) = obj.keys().find(|k| !keys.contains(&k.as_str())) {
        return Err(shape_error(field, format!("unexpected key \"{extra}\"")));
    }
    Ok(())
}

fn layer_params(root: &Map<String, Value>, name: &str) -> Result<(Matrix, Vec<f64>)> {
    let layer = expect_object(&root[name], name)?;
    expect_keys(layer, &PARAM_KEYS, name)?;
    let w = parse_matrix(&layer["W"], &format!("{name}.W"))?;
    let b = parse_vector(&layer["b"], &format!("{name}.b"))?;
    Ok((w, b))
}

fn parse_matrix(v: &Value, field: &str) -> Result<Matrix> {
    let rows = v.as_array().ok_or_else(|| {
        shape_error(
            field,
            format!("expected an array of rows, found {}", type_name(v)),
        )
    })?;
    if rows.is_empty() {
        return Err(shape_error(field, "matrix must have at least one row"));
    }

    let mut parsed = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let row_field = format!("{field}[{i}]");
        let row = parse_vector(row, &row_field)?;
        if let Some(first) = parsed.first().map(Vec::len) {
            if row.len() != first {
                return Err(shape_error(
                    &row_field,
                    format!("row has {} values, expected {first}", row.len()),
                ));
            }
        }
        parsed.push(row);
    }
    Matrix::from_rows(&parsed).map_err(|e| shape_error(field, e.to_string()))
}

fn parse_vector(v: &Value, field: &str) -> Result<Vec<f64>> {
    let items = v.as_array().ok_or_else(|| {
        shape_error(
            field,
            format!("expected an array of numbers, found {}", type_name(v)),
        )
    })?;
    if items.is_empty() {
        return Err(shape_error(field, "array must not be empty"));
    }

    items
        .iter()
        .enumerate()
        .map(|(j, item)| {
            let x = item.as_f64().ok_or_else(|| {
                Error::format(
                    format!("{field}[{j}]"),
                    FormatErrorKind::Numeric,
                    format!("expected a number, found {}", type_name(item)),
                )
            })?;
            if !x.is_finite() {
                return Err(Error::format(
                    format!("{field}[{j}]"),
                    FormatErrorKind::Numeric,
                    "number is not finite",
                ));
            }
            Ok(x)
        })
        .collect()
}

impl FromStr for Model {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        decode(s)
    }
}

/// Write the encoded weights to `path`, creating parent directories.
///
/// The file handle is flushed before returning `Ok` and closed on every path.
pub fn save<P: AsRef<Path>>(model: &Model, path: P) -> Result<()> {
    let p = path.as_ref();
    let text = encode(model)?;
    let io_err = |e: std::io::Error| Error::Io(format!("failed to write {}: {e}", p.display()));

    if let Some(dir) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(io_err)?;
    }
    let mut writer = BufWriter::new(File::create(p).map_err(io_err)?);
    writer.write_all(text.as_bytes()).map_err(io_err)?;
    writer.flush().map_err(io_err)?;

    tracing::info!(path = %p.display(), bytes = text.len(), "saved weights");
    Ok(())
}

/// Read and decode weights from `path`.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Model> {
    let p = path.as_ref();
    let text = fs::read_to_string(p)
        .map_err(|e| Error::Io(format!("failed to read {}: {e}", p.display())))?;
    let model = decode(&text)?;
    tracing::info!(
        path = %p.display(),
        input = model.input_dim(),
        hidden = model.hidden_dim(),
        classes = model.num_classes(),
        "loaded weights"
    );
    Ok(model)
}
