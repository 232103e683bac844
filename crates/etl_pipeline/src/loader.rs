//! Raw table loading.
//!
//! The pipeline only needs "give me a parsed table for this source"; the
//! CSV loader below is the default implementation. Every cell is read as
//! text so the schema normalizer alone decides column types.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use polars::prelude::*;

use crate::config::{SourceProfile, TextEncoding};
use crate::error::{EtlError, EtlResult};

/// Capability to turn a source location into a parsed table
pub trait RawTableLoader {
    fn load(&self, path: &Path) -> EtlResult<DataFrame>;
}

/// Delimited-text loader configured from a [`SourceProfile`]
#[derive(Debug, Clone)]
pub struct CsvTableLoader {
    pub separator: u8,
    pub encoding: TextEncoding,
    pub has_header: bool,
}

impl CsvTableLoader {
    pub fn from_profile(profile: &SourceProfile) -> EtlResult<Self> {
        let separator = u8::try_from(profile.separator)
            .map_err(|_| EtlError::config(format!("separator '{}' is not a single byte", profile.separator)))?;
        Ok(Self {
            separator,
            encoding: profile.encoding,
            has_header: true,
        })
    }

    /// Same loader with another separator; reference tables are often comma separated.
    pub fn with_separator(mut self, separator: u8) -> Self {
        self.separator = separator;
        self
    }
}

impl RawTableLoader for CsvTableLoader {
    fn load(&self, path: &Path) -> EtlResult<DataFrame> {
        if !path.exists() {
            return Err(EtlError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("source file not found: {}", path.display()),
            )));
        }

        let encoding = match self.encoding {
            TextEncoding::Utf8 => CsvEncoding::Utf8,
            TextEncoding::LossyUtf8 => CsvEncoding::LossyUtf8,
        };
        let df = CsvReadOptions::default()
            .with_has_header(self.has_header)
            .with_infer_schema_length(Some(0))
            .with_parse_options(
                CsvParseOptions::default()
                    .with_separator(self.separator)
                    .with_encoding(encoding),
            )
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?;

        log::debug!(
            "Loaded {} rows x {} columns from {}",
            df.height(),
            df.width(),
            path.display()
        );
        Ok(df)
    }
}

/// Tables already parsed by some other collaborator, keyed by path
#[derive(Debug, Clone, Default)]
pub struct InMemoryLoader {
    tables: HashMap<PathBuf, DataFrame>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<P: Into<PathBuf>>(&mut self, path: P, table: DataFrame) -> &mut Self {
        self.tables.insert(path.into(), table);
        self
    }
}

impl RawTableLoader for InMemoryLoader {
    fn load(&self, path: &Path) -> EtlResult<DataFrame> {
        self.tables.get(path).cloned().ok_or_else(|| {
            EtlError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no table registered for {}", path.display()),
            ))
        })
    }
}

/// The raw inputs of a run; the national single-age table is optional
#[derive(Debug, Clone)]
pub struct RawSources {
    pub bulletin: DataFrame,
    pub areas: DataFrame,
    pub age_structure: DataFrame,
    pub national_age: Option<DataFrame>,
}

impl RawSources {
    pub fn load<L: RawTableLoader + ?Sized>(
        loader: &L,
        bulletin: &Path,
        areas: &Path,
        age_structure: &Path,
    ) -> EtlResult<Self> {
        Ok(Self {
            bulletin: loader.load(bulletin)?,
            areas: loader.load(areas)?,
            age_structure: loader.load(age_structure)?,
            national_age: None,
        })
    }

    /// Add the national single-age table read through `loader`.
    pub fn with_national_age<L: RawTableLoader + ?Sized>(mut self, loader: &L, path: &Path) -> EtlResult<Self> {
        self.national_age = Some(loader.load(path)?);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_csv_cells_are_read_as_text() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "estado;codmun;casosAcumulado").unwrap();
        writeln!(file, "SP;350010;12").unwrap();
        writeln!(file, "SP;;3").unwrap();

        let loader = CsvTableLoader::from_profile(&SourceProfile::ministry_bulletin()).unwrap();
        let df = loader.load(file.path()).unwrap();

        assert_eq!(df.height(), 2);
        assert_eq!(df.column("codmun").unwrap().dtype(), &DataType::String);
        assert_eq!(df.column("casosAcumulado").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let loader = CsvTableLoader::from_profile(&SourceProfile::default()).unwrap();
        let err = loader.load(Path::new("/nonexistent/bulletin.csv")).unwrap_err();
        assert!(matches!(err, EtlError::Io(_)));
    }

    #[test]
    fn test_in_memory_loader() {
        let mut loader = InMemoryLoader::new();
        loader.insert("a.csv", df! { "x" => ["1"] }.unwrap());
        assert_eq!(loader.load(Path::new("a.csv")).unwrap().height(), 1);
        assert!(loader.load(Path::new("b.csv")).is_err());
    }
}
