//! 이상 탐지 모델의 학습과 평가, 저장
//!
//! [`Model`]은 학습된 추정기와 학습 시 특성 순서를 함께 보관합니다.
//! 평가 입력의 특성 이름과 순서가 학습 순서와 정확히 같아야 하며,
//! 다르면 [`ModelError::FeatureSchemaMismatch`]입니다.
//!
//! 학습은 오프라인 작업입니다. 라이브 루프에서는 읽기 전용으로 공유됩니다.

pub mod forest;
pub mod rows;

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use icsguard_core::config::TrainingConfig;
use icsguard_core::error::ModelError;
use icsguard_core::types::{FeatureName, FeatureVector};

use crate::error::DetectorError;

pub use forest::IsolationForest;
pub use rows::{load_training_rows, parse_training_rows};

/// 모델 파일 형식 버전
pub const MODEL_FORMAT_VERSION: u32 = 1;

const MAX_ESTIMATORS: usize = 10_000;
const MAX_CONTAMINATION: f64 = 0.5;

/// 비지도 이상치 추정기 인터페이스
pub trait OutlierEstimator {
    /// 이상 점수 (클수록 이상)
    fn anomaly_score(&self, values: &[f64]) -> f64;

    /// 학습 시 고정된 판정 임계값
    fn threshold(&self) -> f64;

    fn is_outlier(&self, values: &[f64]) -> bool {
        self.anomaly_score(values) > self.threshold()
    }
}

/// 학습 파라미터
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    pub n_estimators: usize,
    pub max_samples: usize,
    pub contamination: f64,
    pub random_seed: u64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self::from_core(&TrainingConfig::default())
    }
}

impl TrainingParams {
    pub fn from_core(config: &TrainingConfig) -> Self {
        Self {
            n_estimators: config.n_estimators,
            max_samples: config.max_samples,
            contamination: config.contamination,
            random_seed: config.random_seed,
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.n_estimators == 0 || self.n_estimators > MAX_ESTIMATORS {
            return Err(ModelError::InvalidParameter {
                field: "n_estimators".to_owned(),
                reason: format!("must be 1-{MAX_ESTIMATORS}"),
            });
        }
        if self.max_samples == 0 {
            return Err(ModelError::InvalidParameter {
                field: "max_samples".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if !(self.contamination > 0.0 && self.contamination <= MAX_CONTAMINATION) {
            return Err(ModelError::InvalidParameter {
                field: "contamination".to_owned(),
                reason: format!("must be in (0, {MAX_CONTAMINATION}]"),
            });
        }
        Ok(())
    }
}

/// 저장 가능한 추정기 종류
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum Estimator {
    IsolationForest(IsolationForest),
}

impl Estimator {
    pub fn algorithm(&self) -> &'static str {
        match self {
            Self::IsolationForest(_) => "isolation_forest",
        }
    }
}

impl OutlierEstimator for Estimator {
    fn anomaly_score(&self, values: &[f64]) -> f64 {
        match self {
            Self::IsolationForest(forest) => forest.anomaly_score(values),
        }
    }

    fn threshold(&self) -> f64 {
        match self {
            Self::IsolationForest(forest) => forest.threshold(),
        }
    }
}

/// 단일 평가 결과
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub anomaly_score: f64,
    pub is_anomaly: bool,
}

/// 학습된 모델
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    format_version: u32,
    feature_names: Vec<String>,
    params: TrainingParams,
    trained_at: DateTime<Utc>,
    training_samples: usize,
    estimator: Estimator,
}

impl Model {
    /// 정규 특성 순서로 모델을 학습합니다.
    ///
    /// 각 행은 이름으로 정규 순서에 투영됩니다. 빠진 특성이 있으면
    /// `FeatureSchemaMismatch`, 행이 없으면 `EmptyTrainingSet`입니다.
    pub fn train(samples: &[FeatureVector], params: TrainingParams) -> Result<Self, ModelError> {
        Self::train_with_features(samples, FeatureName::canonical_order(), params)
    }

    /// 지정한 특성 순서로 모델을 학습합니다.
    pub fn train_with_features(
        samples: &[FeatureVector],
        feature_names: Vec<String>,
        params: TrainingParams,
    ) -> Result<Self, ModelError> {
        params.validate()?;
        if samples.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        if feature_names.is_empty() {
            return Err(ModelError::InvalidParameter {
                field: "feature_names".to_owned(),
                reason: "at least one feature is required".to_owned(),
            });
        }

        let rows = samples
            .iter()
            .map(|sample| sample.project(&feature_names))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some((row, _)) = rows
            .iter()
            .enumerate()
            .find(|(_, values)| values.iter().any(|v| !v.is_finite()))
        {
            return Err(ModelError::InvalidParameter {
                field: "samples".to_owned(),
                reason: format!("row {row} contains a non-finite value"),
            });
        }

        let forest = IsolationForest::fit(&rows, &params)?;
        info!(
            samples = rows.len(),
            trees = forest.tree_count(),
            sample_size = forest.sample_size(),
            threshold = forest.threshold(),
            "isolation forest trained"
        );

        Ok(Self {
            format_version: MODEL_FORMAT_VERSION,
            feature_names,
            params,
            trained_at: Utc::now(),
            training_samples: rows.len(),
            estimator: Estimator::IsolationForest(forest),
        })
    }

    /// 모델이 기대하는 특성 순서
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn params(&self) -> &TrainingParams {
        &self.params
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    pub fn training_samples(&self) -> usize {
        self.training_samples
    }

    pub fn threshold(&self) -> f64 {
        self.estimator.threshold()
    }

    /// 특성 벡터 하나를 평가합니다.
    ///
    /// 벡터의 이름과 순서가 `feature_names()`와 정확히 같아야 합니다.
    pub fn evaluate(&self, vector: &FeatureVector) -> Result<Verdict, ModelError> {
        let values = vector.ordered_values(&self.feature_names)?;
        let anomaly_score = self.estimator.anomaly_score(&values);
        Ok(Verdict {
            anomaly_score,
            is_anomaly: anomaly_score > self.estimator.threshold(),
        })
    }

    pub fn to_json(&self) -> Result<String, ModelError> {
        serde_json::to_string_pretty(self).map_err(|e| ModelError::Serialize(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let model: Self =
            serde_json::from_str(json).map_err(|e| ModelError::Serialize(e.to_string()))?;
        if model.format_version != MODEL_FORMAT_VERSION {
            return Err(ModelError::Serialize(format!(
                "unsupported model format version {} (expected {})",
                model.format_version, MODEL_FORMAT_VERSION
            )));
        }
        match &model.estimator {
            Estimator::IsolationForest(forest) => forest.validate(model.feature_names.len())?,
        }
        Ok(model)
    }

    /// 모델을 JSON 파일로 저장합니다. 상위 디렉토리가 없으면 생성합니다.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), DetectorError> {
        let path = path.as_ref();
        let json = self.to_json()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, json).await?;
        info!(path = %path.display(), "model saved");
        Ok(())
    }

    /// JSON 모델 파일을 읽습니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, DetectorError> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await?;
        let model = Self::from_json(&json)?;
        info!(
            path = %path.display(),
            algorithm = model.estimator.algorithm(),
            features = model.feature_names.len(),
            "model loaded"
        );
        Ok(model)
    }

    /// `model inspect`용 요약
    pub fn summary(&self) -> ModelSummary {
        let (trees, sample_size, nodes) = match &self.estimator {
            Estimator::IsolationForest(forest) => (
                forest.tree_count(),
                forest.sample_size(),
                forest.node_count(),
            ),
        };
        ModelSummary {
            algorithm: self.estimator.algorithm().to_owned(),
            format_version: self.format_version,
            feature_names: self.feature_names.clone(),
            trained_at: self.trained_at,
            training_samples: self.training_samples,
            n_estimators: self.params.n_estimators,
            max_samples: self.params.max_samples,
            contamination: self.params.contamination,
            random_seed: self.params.random_seed,
            trees,
            sample_size,
            nodes,
            threshold: self.threshold(),
        }
    }
}

/// 모델 메타데이터 요약
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub algorithm: String,
    pub format_version: u32,
    pub feature_names: Vec<String>,
    pub trained_at: DateTime<Utc>,
    pub training_samples: usize,
    pub n_estimators: usize,
    pub max_samples: usize,
    pub contamination: f64,
    pub random_seed: u64,
    pub trees: usize,
    pub sample_size: usize,
    pub nodes: usize,
    pub threshold: f64,
}
