//! Symbol universe and sector map loading.

use std::collections::HashMap;
use std::path::Path;

use batchscan_common::error::{Error, Result, ResultExt};

use crate::data::dedup_symbols;

/// The ordered, de-duplicated set of symbols a scan covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Universe {
    symbols: Vec<String>,
}

impl Universe {
    /// Build from raw symbols: trimmed, upper-cased, de-duplicated.
    pub fn from_symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let cleaned: Vec<String> = symbols
            .into_iter()
            .map(|s| s.as_ref().trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self {
            symbols: dedup_symbols(&cleaned),
        }
    }

    /// Parse a universe file body.
    ///
    /// Accepts a JSON array of strings, or one symbol per line with `#`
    /// comments and blank lines ignored.
    pub fn parse(body: &str) -> Result<Self> {
        let trimmed = body.trim_start();
        if trimmed.starts_with('[') {
            let symbols: Vec<String> = serde_json::from_str(trimmed)?;
            return Ok(Self::from_symbols(symbols));
        }

        let lines = body
            .lines()
            .map(|line| line.split('#').next().unwrap_or("").trim());
        Ok(Self::from_symbols(lines))
    }

    /// Load from a file. An empty universe is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(format!("universe file {}", path.display())));
        }
        let body = std::fs::read_to_string(path).context(format!("reading {}", path.display()))?;
        let universe = Self::parse(&body).context(format!("parsing {}", path.display()))?;

        if universe.is_empty() {
            return Err(Error::InvalidInput(format!(
                "universe file {} lists no symbols",
                path.display()
            )));
        }
        Ok(universe)
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Load a JSON object mapping symbol → sector. Keys are upper-cased.
pub fn load_sector_map(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Err(Error::NotFound(format!("sector map {}", path.display())));
    }
    let body = std::fs::read_to_string(path).context(format!("reading {}", path.display()))?;
    let raw: HashMap<String, String> =
        serde_json::from_str(&body).context(format!("parsing {}", path.display()))?;

    Ok(raw
        .into_iter()
        .map(|(symbol, sector)| (symbol.trim().to_uppercase(), sector))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_lines_with_comments() {
        let universe = Universe::parse("# large caps\naapl\nMSFT  # software\n\nAAPL\n nvda \n").unwrap();
        assert_eq!(universe.symbols(), ["AAPL", "MSFT", "NVDA"]);
    }

    #[test]
    fn test_parse_json_array() {
        let universe = Universe::parse(r#"["spy", "QQQ", "spy"]"#).unwrap();
        assert_eq!(universe.symbols(), ["SPY", "QQQ"]);
    }

    #[test]
    fn test_load_missing_and_empty() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Universe::load(&dir.path().join("none.txt")),
            Err(Error::NotFound(_))
        ));

        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "# nothing here\n").unwrap();
        assert!(matches!(Universe::load(&path), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_load_sector_map() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sectors.json");
        std::fs::write(&path, r#"{"aapl": "Technology", "XOM": "Energy"}"#).unwrap();

        let sectors = load_sector_map(&path).unwrap();
        assert_eq!(sectors["AAPL"], "Technology");
        assert_eq!(sectors["XOM"], "Energy");
    }

    #[test]
    fn test_bad_sector_map() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sectors.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(load_sector_map(&path).unwrap_err().is_bad_input());
    }
}
