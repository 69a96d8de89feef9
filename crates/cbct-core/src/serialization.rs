//! Text checkpoint and artifact helpers.
//!
//! Checkpoints (`.egsdat`) are whitespace separated token streams. Fields are
//! written and read back in exactly the same order, so every component exposes
//! a `store_state`/`set_state` pair operating on [`CheckpointWriter`] and
//! [`CheckpointReader`].

use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::str::{FromStr, SplitWhitespace};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint ended before field '{field}'")]
    MissingField { field: &'static str },
    #[error("checkpoint field '{field}' has invalid value '{token}'")]
    InvalidField { field: &'static str, token: String },
    #[error("checkpoint field '{field}' expected {expected}, found {found}")]
    Mismatch {
        field: &'static str,
        expected: String,
        found: String,
    },
}

#[derive(Debug, Default, Clone)]
pub struct CheckpointWriter {
    buffer: String,
}

impl CheckpointWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn integer<T: std::fmt::Display>(&mut self, value: T) -> &mut Self {
        self.token(value)
    }

    /// Floats use the shortest representation that parses back bit-exact.
    pub fn float(&mut self, value: f64) -> &mut Self {
        self.token(value)
    }

    pub fn floats(&mut self, values: &[f64]) -> &mut Self {
        for value in values {
            self.float(*value);
        }
        self
    }

    pub fn end_line(&mut self) -> &mut Self {
        if self.buffer.ends_with(' ') {
            self.buffer.pop();
        }
        self.buffer.push('\n');
        self
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn into_string(self) -> String {
        self.buffer
    }

    fn token<T: std::fmt::Display>(&mut self, value: T) -> &mut Self {
        // Writing into a String cannot fail.
        let _ = write!(self.buffer, "{value} ");
        self
    }
}

pub struct CheckpointReader<'a> {
    tokens: SplitWhitespace<'a>,
}

impl<'a> CheckpointReader<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            tokens: source.split_whitespace(),
        }
    }

    pub fn parse<T: FromStr>(&mut self, field: &'static str) -> Result<T, CheckpointError> {
        let token = self
            .tokens
            .next()
            .ok_or(CheckpointError::MissingField { field })?;
        token.parse::<T>().map_err(|_| CheckpointError::InvalidField {
            field,
            token: token.to_string(),
        })
    }

    pub fn u64(&mut self, field: &'static str) -> Result<u64, CheckpointError> {
        self.parse(field)
    }

    pub fn usize(&mut self, field: &'static str) -> Result<usize, CheckpointError> {
        self.parse(field)
    }

    pub fn f64(&mut self, field: &'static str) -> Result<f64, CheckpointError> {
        self.parse(field)
    }

    pub fn expect_usize(
        &mut self,
        field: &'static str,
        expected: usize,
    ) -> Result<usize, CheckpointError> {
        let found = self.usize(field)?;
        if found != expected {
            return Err(CheckpointError::Mismatch {
                field,
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
        Ok(found)
    }

    /// `true` once every token has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.tokens.clone().next().is_none()
    }
}

pub fn format_fixed_f64(value: f64, width: usize, precision: usize) -> String {
    format!(
        "{value:>width$.precision$}",
        width = width,
        precision = precision
    )
}

pub fn normalize_text_artifact(content: &str) -> String {
    let mut normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    if !normalized.is_empty() && !normalized.ends_with('\n') {
        normalized.push('\n');
    }
    normalized
}

pub fn write_text_artifact(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, normalize_text_artifact(content))
}

#[cfg(test)]
mod tests {
    use super::{
        CheckpointError, CheckpointReader, CheckpointWriter, format_fixed_f64,
        normalize_text_artifact, write_text_artifact,
    };
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn fixed_width_float_formatting_is_deterministic() {
        assert_eq!(format_fixed_f64(1.23, 13, 5), "      1.23000");
    }

    #[test]
    fn normalize_text_artifact_uses_canonical_line_endings() {
        let normalized = normalize_text_artifact("alpha\r\nbeta\rgamma");
        assert_eq!(normalized, "alpha\nbeta\ngamma\n");
    }

    #[test]
    fn floats_survive_a_text_round_trip_bit_exact() {
        let values = [0.1_f64, 1.0 / 3.0, 6.02214076e23, -2.5e-300, 0.0];
        let mut writer = CheckpointWriter::new();
        writer.integer(42_u64).end_line().floats(&values).end_line();

        let text = writer.into_string();
        let mut reader = CheckpointReader::new(&text);
        assert_eq!(reader.u64("count").expect("count should parse"), 42);
        for value in values {
            let parsed = reader.f64("value").expect("value should parse");
            assert_eq!(parsed.to_bits(), value.to_bits());
        }
        assert!(reader.is_exhausted());
    }

    #[test]
    fn reader_reports_missing_and_mismatched_fields() {
        let mut reader = CheckpointReader::new("3 abc");
        assert!(matches!(
            reader.expect_usize("nreg", 4),
            Err(CheckpointError::Mismatch { field: "nreg", .. })
        ));
        assert!(matches!(
            reader.u64("ncase"),
            Err(CheckpointError::InvalidField { field: "ncase", .. })
        ));
        assert_eq!(
            reader.f64("sum"),
            Err(CheckpointError::MissingField { field: "sum" })
        );
    }

    #[test]
    fn text_artifact_writes_create_parent_directories() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("nested").join("artifact.dat");

        write_text_artifact(&path, "line 1\r\nline 2").expect("write should succeed");
        let content = fs::read_to_string(&path).expect("artifact should be readable");
        assert_eq!(content, "line 1\nline 2\n");
    }
}
