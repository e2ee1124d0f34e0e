//! `icsguard train` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use icsguard_core::types::FeatureVector;
use icsguard_detector::model::rows::load_training_rows;
use icsguard_detector::{Model, TrainingParams};

use crate::cli::TrainArgs;
use crate::commands::load_config;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `train` command.
pub async fn execute(
    args: TrainArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = load_config(config_path).await?;
    let params = training_params(&args, TrainingParams::from_core(&config.training));
    params
        .validate()
        .map_err(|e| CliError::Config(e.to_string()))?;

    info!(input = %args.input.display(), "loading training rows");
    let rows = load_training_rows(&args.input).await?;

    let model = Model::train(&rows, params).map_err(|e| CliError::Model(e.to_string()))?;
    let flagged = count_flagged(&model, &rows)?;
    model.save(&args.output).await?;

    let report = TrainReport {
        input: args.input.display().to_string(),
        output: args.output.display().to_string(),
        samples: rows.len(),
        flagged,
        threshold: model.threshold(),
        params,
    };
    writer.render(&report)
}

/// CLI flags take precedence over `[training]`.
fn training_params(args: &TrainArgs, mut params: TrainingParams) -> TrainingParams {
    if let Some(contamination) = args.contamination {
        params.contamination = contamination;
    }
    if let Some(n_estimators) = args.n_estimators {
        params.n_estimators = n_estimators;
    }
    if let Some(max_samples) = args.max_samples {
        params.max_samples = max_samples;
    }
    if let Some(seed) = args.seed {
        params.random_seed = seed;
    }
    params
}

/// Number of training rows the fitted model marks as anomalous.
fn count_flagged(model: &Model, rows: &[FeatureVector]) -> Result<usize, CliError> {
    let order = model.feature_names();
    let mut flagged = 0;
    for row in rows {
        let values = row
            .project(order)
            .map_err(|e| CliError::Model(e.to_string()))?;
        let ordered: FeatureVector = order.iter().map(String::as_str).zip(values).collect();
        let verdict = model
            .evaluate(&ordered)
            .map_err(|e| CliError::Model(e.to_string()))?;
        if verdict.is_anomaly {
            flagged += 1;
        }
    }
    Ok(flagged)
}

#[derive(Serialize)]
pub struct TrainReport {
    pub input: String,
    pub output: String,
    pub samples: usize,
    /// Training rows above the decision threshold.
    pub flagged: usize,
    pub threshold: f64,
    pub params: TrainingParams,
}

impl Render for TrainReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Model written: {}", self.output.bold())?;
        writeln!(w, "Training rows: {} ({})", self.samples, self.input)?;
        writeln!(
            w,
            "Forest: {} trees, {} samples per tree, seed {}",
            self.params.n_estimators, self.params.max_samples, self.params.random_seed
        )?;
        writeln!(
            w,
            "Threshold: {:.4} (contamination {})",
            self.threshold, self.params.contamination
        )?;
        writeln!(
            w,
            "Flagged in training set: {}",
            self.flagged.to_string().yellow()
        )
    }
}
