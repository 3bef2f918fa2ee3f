use anyhow::{Context as AnyhowContext, Result};
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use wordvec_protocol::naming::camelize_keys;
use wordvec_protocol::to_pretty_json;

/// Where command results go: pretty JSON on stdout or in `-o <file>`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Output {
    pub path: Option<PathBuf>,
    pub camel: bool,
}

impl Output {
    pub(crate) fn write<T: Serialize>(&self, value: &T) -> Result<()> {
        let mut value = serde_json::to_value(value).context("Failed to serialize output")?;
        if self.camel {
            value = camelize_keys(value);
        }
        let text = to_pretty_json(&value)?;
        match &self.path {
            Some(path) => {
                fs::write(path, text)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                log::info!("wrote output to {}", path.display());
                Ok(())
            }
            None => print_stdout(&text),
        }
    }
}

pub(crate) fn print_stdout(text: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}
