//! Plain-text numeric tables.
//!
//! One row per line, columns separated by whitespace. Lines starting with
//! `#` and blank lines are skipped on read. Floats are written in the
//! shortest exponent form that parses back to the same value, so a saved
//! table reloads bit-for-bit. Matrices of traces are stored one cell per
//! row.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use crate::error::{AnalysisError, Result};

pub fn write_float_table<W: Write>(writer: &mut W, rows: &[Vec<f64>]) -> Result<()> {
    for row in rows {
        let line: Vec<String> = row.iter().map(|v| format!("{:e}", v)).collect();
        writeln!(writer, "{}", line.join(" "))?;
    }
    Ok(())
}

pub fn write_int_table<W: Write>(writer: &mut W, rows: &[Vec<u8>]) -> Result<()> {
    for row in rows {
        let line: Vec<String> = row.iter().map(u8::to_string).collect();
        writeln!(writer, "{}", line.join(" "))?;
    }
    Ok(())
}

pub fn read_float_table<R: BufRead>(reader: R) -> Result<Vec<Vec<f64>>> {
    read_table(reader, |token| token.parse::<f64>().ok())
}

/// Read an integer table
///
/// Tokens written as floats (`1.000000000000000000e+00`) are accepted when
/// they hold an integral value in range.
pub fn read_int_table<R: BufRead>(reader: R) -> Result<Vec<Vec<u8>>> {
    read_table(reader, |token| {
        u8::from_str(token).ok().or_else(|| {
            let value = token.parse::<f64>().ok()?;
            (value.fract() == 0.0 && (0.0..=f64::from(u8::MAX)).contains(&value))
                .then_some(value as u8)
        })
    })
}

fn read_table<R, T, F>(reader: R, parse: F) -> Result<Vec<Vec<T>>>
where
    R: BufRead,
    F: Fn(&str) -> Option<T>,
{
    let mut rows: Vec<Vec<T>> = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let row = trimmed
            .split_whitespace()
            .enumerate()
            .map(|(column, token)| {
                parse(token).ok_or_else(|| AnalysisError::Parse {
                    line: index + 1,
                    message: format!("column {}: '{}' is not a valid value", column, token),
                })
            })
            .collect::<Result<Vec<T>>>()?;

        if let Some(first) = rows.first()
            && row.len() != first.len()
        {
            return Err(AnalysisError::ShapeMismatch(format!(
                "line {} has {} columns, expected {}",
                index + 1,
                row.len(),
                first.len()
            )));
        }
        rows.push(row);
    }
    Ok(rows)
}

pub fn save_float_table(path: &Path, rows: &[Vec<f64>]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_float_table(&mut writer, rows)?;
    writer.flush()?;
    Ok(())
}

pub fn load_float_table(path: &Path) -> Result<Vec<Vec<f64>>> {
    read_float_table(BufReader::new(File::open(path)?))
}

pub fn save_int_table(path: &Path, rows: &[Vec<u8>]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_int_table(&mut writer, rows)?;
    writer.flush()?;
    Ok(())
}

pub fn load_int_table(path: &Path) -> Result<Vec<Vec<u8>>> {
    read_int_table(BufReader::new(File::open(path)?))
}
