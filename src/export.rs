// Result export
// Spreadsheet writers live outside this crate and plug in through Exporter;
// JsonExporter is the bundled implementation.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDateTime;
use tracing::info;

use crate::models::FlatRow;

pub trait Exporter: Send + Sync {
    fn results_to_file(&self, rows: &[FlatRow], out_file_name: &str) -> anyhow::Result<()>;
}

// {CARRIER}_{YYYY-mm-dd_HH-MM-SS}_{o1-o2}_to_{d1-d2}.{ext}
pub fn result_file_name<S: AsRef<str>>(
    carrier: &str,
    timestamp: NaiveDateTime,
    origins: &[S],
    destinations: &[S],
    extension: &str,
) -> String {
    let join = |codes: &[S]| {
        codes
            .iter()
            .map(|code| code.as_ref().trim().to_ascii_uppercase())
            .collect::<Vec<_>>()
            .join("-")
    };

    format!(
        "{}_{}_{}_to_{}.{}",
        carrier.trim().to_ascii_uppercase(),
        timestamp.format("%Y-%m-%d_%H-%M-%S"),
        join(origins),
        join(destinations),
        extension.trim_start_matches('.')
    )
}

#[derive(Debug, Clone)]
pub struct JsonExporter {
    output_dir: PathBuf,
}

impl JsonExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl Exporter for JsonExporter {
    fn results_to_file(&self, rows: &[FlatRow], out_file_name: &str) -> anyhow::Result<()> {
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("creating output directory {}", self.output_dir.display())
        })?;

        let path = self.output_dir.join(out_file_name);
        let file = File::create(&path)
            .with_context(|| format!("creating result file {}", path.display()))?;

        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, rows)
            .with_context(|| format!("writing rows to {}", path.display()))?;
        writer.flush()?;

        info!(path = %path.display(), rows = rows.len(), "results exported");
        Ok(())
    }
}
