#![cfg(test)]
#![allow(dead_code)]

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;
use url::Url;

use pacproxy::adapters::{PacResolverFactory, ResolverOptions, SchemeFetcher};
use pacproxy::domain::PacLoader;

/// A PAC script on disk, addressed by a `file:` URI.
pub struct PacFixture {
    file: NamedTempFile,
    generation: u64,
}

impl PacFixture {
    pub fn new(script: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let mut file = tempfile::Builder::new().prefix("pacproxy_test_").suffix(".pac").tempfile()?;
        file.write_all(script.as_bytes())?;
        Ok(Self { file, generation: 0 })
    }

    /// Script returning `result` for every URL.
    pub fn returning(result: &str) -> Result<Self, Box<dyn std::error::Error>> {
        Self::new(&format!(
            "function FindProxyForURL(url, host) {{ return \"{}\"; }}",
            result
        ))
    }

    pub fn uri(&self) -> String {
        Url::from_file_path(self.file.path())
            .map(|u| u.to_string())
            .unwrap_or_default()
    }

    /// Replaces the script and moves its mtime forward.
    pub fn rewrite(&mut self, script: &str) -> Result<(), Box<dyn std::error::Error>> {
        std::fs::write(self.file.path(), script)?;
        self.touch()
    }

    /// Moves the mtime forward without touching the content.
    pub fn touch(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.generation += 1;
        let file = OpenOptions::new().write(true).open(self.file.path())?;
        file.set_modified(SystemTime::now() + Duration::from_secs(60 * self.generation))?;
        Ok(())
    }
}

pub fn file_loader(uri: &str) -> Result<PacLoader, Box<dyn std::error::Error>> {
    let fetcher = Arc::new(SchemeFetcher::new(false)?);
    let factory = Arc::new(PacResolverFactory::new(ResolverOptions::default()));
    Ok(PacLoader::new(uri, fetcher, factory, None)?)
}
