#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`source`]: 패킷 공급원 (리플레이, `pcap` feature의 libpcap 캡처)
//! - [`decode`]: Ethernet/raw IP 프레임 디코딩
//! - [`features`]: 패킷 단위 특성 추출
//! - [`window`]: 이중 트리거 윈도우 집계
//! - [`queue`]: drop-oldest 윈도우 대기 큐
//! - [`model`]: isolation forest 학습, 평가, 저장
//! - [`scorer`]: 모델 교체가 가능한 이상 점수기
//! - [`dispatch`]: 결과 디스패처와 MQTT/Elasticsearch/파일 싱크
//! - [`pipeline`]: 전체 파이프라인 오케스트레이션 (Pipeline trait 구현)
//! - [`config`]: 탐지기 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! PacketSource -> IP filter -> WindowAggregator -> WindowQueue -> AnomalyScorer -> ResultDispatcher
//!                                   ^                                                |
//!                              flush timer                              MQTT / Elasticsearch / JSONL
//! ```

pub mod config;
pub mod decode;
pub mod dispatch;
pub mod error;
pub mod features;
pub mod model;
pub mod pipeline;
pub mod queue;
pub mod scorer;
pub mod source;
pub mod stats;
pub mod window;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::{DetectorPipeline, DetectorPipelineBuilder};
pub use stats::PipelineStats;

// 설정
pub use config::{DetectorConfig, DetectorConfigBuilder};

// 에러
pub use error::DetectorError;

// 입력
pub use features::FeatureExtractor;
pub use source::{PacketSource, ReplaySource};

#[cfg(feature = "pcap")]
pub use source::PcapSource;

// 윈도우
pub use queue::WindowQueue;
pub use window::{WindowAggregator, WindowBuffer};

// 모델/점수
pub use model::{Model, ModelSummary, OutlierEstimator, TrainingParams};
pub use scorer::AnomalyScorer;

// 전송
pub use dispatch::{
    DispatchReport, ElasticsearchSink, JsonLinesSink, MqttAlertSink, ResultDispatcher,
    ResultDocument, ResultSink, SinkPolicy,
};
