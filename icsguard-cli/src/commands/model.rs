//! `icsguard model` command handler

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use icsguard_detector::{Model, ModelSummary};

use crate::cli::{ModelAction, ModelArgs};
use crate::commands::load_config;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `model` command.
pub async fn execute(
    args: ModelArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ModelAction::Inspect { path } => execute_inspect(path, config_path, writer).await,
    }
}

async fn execute_inspect(
    path: Option<PathBuf>,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let path = match path {
        Some(path) => path,
        None => PathBuf::from(load_config(config_path).await?.detector.model_path),
    };
    info!(path = %path.display(), "inspecting model");

    let model = Model::load(&path)
        .await
        .map_err(|e| CliError::Model(format!("{}: {}", path.display(), e)))?;
    let report = ModelReport {
        path: path.display().to_string(),
        summary: model.summary(),
    };
    writer.render(&report)
}

#[derive(Serialize)]
pub struct ModelReport {
    pub path: String,
    #[serde(flatten)]
    pub summary: ModelSummary,
}

impl Render for ModelReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let s = &self.summary;
        writeln!(w, "Model: {}", self.path.bold())?;
        writeln!(w, "  Algorithm:     {} (format v{})", s.algorithm, s.format_version)?;
        writeln!(w, "  Trained at:    {}", s.trained_at.to_rfc3339())?;
        writeln!(w, "  Training rows: {}", s.training_samples)?;
        writeln!(
            w,
            "  Forest:        {} trees, {} samples per tree, {} nodes",
            s.trees, s.sample_size, s.nodes
        )?;
        writeln!(
            w,
            "  Params:        n_estimators={} max_samples={} contamination={} seed={}",
            s.n_estimators, s.max_samples, s.contamination, s.random_seed
        )?;
        writeln!(w, "  Threshold:     {:.4}", s.threshold)?;
        writeln!(w, "  {}", "Features:".bold())?;
        for (i, name) in s.feature_names.iter().enumerate() {
            writeln!(w, "    {:>2}. {}", i + 1, name)?;
        }
        Ok(())
    }
}
