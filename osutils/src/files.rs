use std::{fs, path::Path};

use anyhow::{Context, Error};

/// Reads a text file and returns its non-empty lines with surrounding whitespace removed.
pub fn read_nonempty_lines(path: impl AsRef<Path>) -> Result<Vec<String>, Error> {
    let contents = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Could not read file: {}", path.as_ref().display()))?;

    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

/// Reads a single-value sysfs style attribute file.
pub fn read_trimmed(path: impl AsRef<Path>) -> Result<String, Error> {
    fs::read_to_string(path.as_ref())
        .map(|value| value.trim().to_string())
        .with_context(|| format!("Could not read file: {}", path.as_ref().display()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_read_nonempty_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "first\n\n  second  \n\n").unwrap();
        assert_eq!(
            read_nonempty_lines(file.path()).unwrap(),
            vec!["first", "second"]
        );

        let empty = tempfile::NamedTempFile::new().unwrap();
        assert!(read_nonempty_lines(empty.path()).unwrap().is_empty());

        read_nonempty_lines("/nonexistent_file_1234").unwrap_err();
    }

    #[test]
    fn test_read_trimmed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0x10000090fae0b5f5").unwrap();
        assert_eq!(read_trimmed(file.path()).unwrap(), "0x10000090fae0b5f5");
    }
}
