//! 윈도우 샘플을 공유 모델로 판정하는 이상 점수기
//!
//! 모델은 `RwLock<Arc<Model>>`에 보관됩니다. `score`는 읽기 잠금 안에서 `Arc`만 복제하고
//! 잠금 밖에서 평가하므로, [`AnomalyScorer::install`]로 모델을 교체해도
//! 진행 중인 평가는 시작할 때의 모델을 끝까지 사용합니다.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use icsguard_core::error::ModelError;
use icsguard_core::types::{ScoreResult, WindowSample};

use crate::model::Model;

/// 윈도우 이상 점수기
#[derive(Debug)]
pub struct AnomalyScorer {
    model: RwLock<Arc<Model>>,
}

impl AnomalyScorer {
    pub fn new(model: Model) -> Self {
        Self::from_shared(Arc::new(model))
    }

    pub fn from_shared(model: Arc<Model>) -> Self {
        Self {
            model: RwLock::new(model),
        }
    }

    /// 현재 모델
    pub fn model(&self) -> Arc<Model> {
        Arc::clone(&self.model.read())
    }

    /// 샘플 하나를 판정합니다.
    ///
    /// 샘플을 정규 순서 벡터로 만든 뒤 모델의 특성 순서와 정확히 대조합니다.
    pub fn score(&self, sample: &WindowSample) -> Result<ScoreResult, ModelError> {
        let model = self.model();
        let verdict = model.evaluate(&sample.to_feature_vector())?;
        Ok(ScoreResult::new(
            *sample,
            verdict.is_anomaly,
            verdict.anomaly_score,
        ))
    }

    /// 새 모델을 원자적으로 설치하고 이전 모델을 반환합니다.
    pub fn install(&self, model: Model) -> Arc<Model> {
        let next = Arc::new(model);
        let previous = std::mem::replace(&mut *self.model.write(), next);
        info!(
            threshold = self.model.read().threshold(),
            "scoring model replaced"
        );
        previous
    }
}
