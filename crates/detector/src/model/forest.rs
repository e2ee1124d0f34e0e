//! Isolation forest: 무작위 분할 앙상블 이상치 탐지기
//!
//! 각 트리는 학습 데이터에서 비복원 추출한 `ψ = min(max_samples, n)`개 점으로 자라며,
//! 깊이 한계는 `ceil(log2 ψ)`입니다. 점수는 평균 경로 길이 `E[h(x)]`로부터
//! `s(x) = 2^(-E[h(x)] / c(ψ))`로 계산되고 1에 가까울수록 고립되기 쉬운 점입니다.
//!
//! 판정 임계값은 학습 데이터 점수의 `(1 - contamination)` 분위수입니다.

use std::f64::consts::LN_2;

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use icsguard_core::error::ModelError;

use super::{OutlierEstimator, TrainingParams};

/// 오일러-마스케로니 상수
const EULER_GAMMA: f64 = 0.577_215_664_9;

/// 크기 `n`인 집합에서 실패한 이진 탐색의 평균 경로 길이 `c(n)`
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

/// 노드를 평탄한 배열로 저장하는 isolation tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn grow(data: &[Vec<f64>], rows: Vec<usize>, depth_limit: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.split(data, rows, 0, depth_limit, rng);
        tree
    }

    fn split(
        &mut self,
        data: &[Vec<f64>],
        rows: Vec<usize>,
        depth: usize,
        depth_limit: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: rows.len() });
        if depth >= depth_limit || rows.len() <= 1 {
            return id;
        }

        // 값이 모두 같은 특성으로는 나눌 수 없음
        let width = data[rows[0]].len();
        let candidates: Vec<(usize, f64, f64)> = (0..width)
            .filter_map(|feature| {
                let (lo, hi) = rows.iter().fold(
                    (f64::INFINITY, f64::NEG_INFINITY),
                    |(lo, hi), &row| (lo.min(data[row][feature]), hi.max(data[row][feature])),
                );
                (hi > lo).then_some((feature, lo, hi))
            })
            .collect();
        if candidates.is_empty() {
            return id;
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = split_point(lo, hi, rng.gen_range(0.0..1.0));
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&row| data[row][feature] <= threshold);

        let left = self.split(data, left_rows, depth + 1, depth_limit, rng);
        let right = self.split(data, right_rows, depth + 1, depth_limit, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    /// 점 `x`의 경로 길이 `h(x)` (잎 크기 보정 포함)
    pub fn path_length(&self, x: &[f64]) -> f64 {
        let mut id = 0;
        let mut depth = 0.0;
        loop {
            match self.nodes.get(id) {
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = x.get(*feature).copied().unwrap_or(0.0);
                    id = if value <= *threshold { *left } else { *right };
                    depth += 1.0;
                }
                Some(Node::Leaf { size }) => return depth + average_path_length(*size),
                None => return depth,
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// 역직렬화된 트리의 구조를 검증합니다.
    ///
    /// 자식 ID는 부모보다 크고 노드 수보다 작아야 합니다. 그래야 `path_length`가 끝납니다.
    fn validate(&self, width: usize) -> Result<(), ModelError> {
        if self.nodes.is_empty() {
            return Err(ModelError::Serialize("tree has no nodes".to_owned()));
        }
        for (id, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                threshold,
                left,
                right,
            } = node
            {
                if *feature >= width {
                    return Err(ModelError::Serialize(format!(
                        "node {id}: feature index {feature} out of range (width {width})"
                    )));
                }
                if !threshold.is_finite() {
                    return Err(ModelError::Serialize(format!(
                        "node {id}: threshold is not finite"
                    )));
                }
                for child in [*left, *right] {
                    if child <= id || child >= self.nodes.len() {
                        return Err(ModelError::Serialize(format!(
                            "node {id}: invalid child id {child}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// `[lo, hi)` 구간의 분할점. `hi - lo`가 넘쳐도 유한한 값을 냅니다.
fn split_point(lo: f64, hi: f64, t: f64) -> f64 {
    let point = lo * (1.0 - t) + hi * t;
    if point.is_finite() && point >= lo && point < hi {
        point
    } else {
        lo
    }
}

/// 학습된 isolation forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    /// 트리당 실제 샘플 수 ψ
    sample_size: usize,
    /// 이상 판정 임계값
    threshold: f64,
}

impl IsolationForest {
    /// 행 단위 데이터로 forest를 학습합니다.
    ///
    /// 같은 데이터와 같은 `random_seed`는 항상 같은 forest를 만듭니다.
    pub fn fit(data: &[Vec<f64>], params: &TrainingParams) -> Result<Self, ModelError> {
        if data.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        params.validate()?;

        let n = data.len();
        let sample_size = params.max_samples.min(n);
        let depth_limit = (sample_size as f64).log2().ceil().max(0.0) as usize;
        let mut rng = StdRng::seed_from_u64(params.random_seed);

        let trees = (0..params.n_estimators)
            .map(|_| {
                let rows = index::sample(&mut rng, n, sample_size).into_vec();
                IsolationTree::grow(data, rows, depth_limit, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            sample_size,
            threshold: 0.0,
        };

        let mut scores: Vec<f64> = data.iter().map(|row| forest.anomaly_score(row)).collect();
        scores.sort_by(f64::total_cmp);
        forest.threshold = quantile(&scores, 1.0 - params.contamination);
        Ok(forest)
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn node_count(&self) -> usize {
        self.trees.iter().map(IsolationTree::node_count).sum()
    }

    /// 파일에서 읽은 forest가 `width`개 특성 입력을 안전하게 평가할 수 있는지 검증합니다.
    pub fn validate(&self, width: usize) -> Result<(), ModelError> {
        if self.trees.is_empty() {
            return Err(ModelError::Serialize("forest has no trees".to_owned()));
        }
        if self.sample_size == 0 {
            return Err(ModelError::Serialize("sample_size must be positive".to_owned()));
        }
        if !self.threshold.is_finite() {
            return Err(ModelError::Serialize("threshold is not finite".to_owned()));
        }
        for (idx, tree) in self.trees.iter().enumerate() {
            tree.validate(width)
                .map_err(|e| ModelError::Serialize(format!("tree {idx}: {e}")))?;
        }
        Ok(())
    }

    fn mean_path_length(&self, x: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let total: f64 = self.trees.iter().map(|tree| tree.path_length(x)).sum();
        total / self.trees.len() as f64
    }
}

impl OutlierEstimator for IsolationForest {
    fn anomaly_score(&self, values: &[f64]) -> f64 {
        let normalizer = average_path_length(self.sample_size);
        if normalizer <= 0.0 {
            // ψ = 1이면 모든 점의 경로 길이가 0
            return 0.5;
        }
        (-self.mean_path_length(values) / normalizer * LN_2).exp()
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }
}

/// 정렬된 값의 선형 보간 분위수
fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        len => {
            let pos = q.clamp(0.0, 1.0) * (len - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}
