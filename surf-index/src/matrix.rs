//! Reading and writing the plain text numeric files exchanged with the
//! aggregation and training tools.
//!
//! Values are separated by whitespace and/or commas. A matrix has one row per
//! non-blank line.

use crate::IndexError;
use std::io::Write;
use std::path::Path;

fn read_rows(path: &Path) -> Result<Vec<(usize, Vec<f64>)>, IndexError> {
    let text = std::fs::read_to_string(path).map_err(IndexError::io(path))?;
    let mut rows = vec![];
    for (index, line) in text.lines().enumerate() {
        let row = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|token| !token.is_empty())
            .map(|token| {
                token.parse::<f64>().map_err(|_| IndexError::Parse {
                    path: path.to_owned(),
                    line: index + 1,
                    token: token.to_owned(),
                })
            })
            .collect::<Result<Vec<f64>, IndexError>>()?;
        if !row.is_empty() {
            rows.push((index + 1, row));
        }
    }
    if rows.is_empty() {
        return Err(IndexError::Empty {
            path: path.to_owned(),
        });
    }
    Ok(rows)
}

/// Read every value of a file as one vector.
pub fn read_vector(path: impl AsRef<Path>) -> Result<Vec<f64>, IndexError> {
    let rows = read_rows(path.as_ref())?;
    Ok(rows.into_iter().flat_map(|(_, row)| row).collect())
}

/// Read a matrix, requiring every row to have the length of the first one.
pub fn read_matrix(path: impl AsRef<Path>) -> Result<Vec<Vec<f64>>, IndexError> {
    let path = path.as_ref();
    let rows = read_rows(path)?;
    let expected = rows[0].1.len();
    if let Some((line, row)) = rows.iter().find(|(_, row)| row.len() != expected) {
        return Err(IndexError::Ragged {
            path: path.to_owned(),
            line: *line,
            expected,
            found: row.len(),
        });
    }
    Ok(rows.into_iter().map(|(_, row)| row).collect())
}

/// Write one row of values separated by single spaces.
pub fn write_row<T: std::fmt::Display>(
    mut writer: impl Write,
    row: impl IntoIterator<Item = T>,
) -> std::io::Result<()> {
    let mut separator = "";
    for value in row {
        write!(writer, "{}{}", separator, value)?;
        separator = " ";
    }
    writeln!(writer)
}
