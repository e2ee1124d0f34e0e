//! 파이프라인 수명 주기(start/stop/health) trait
//!
//! [`Pipeline`]은 RPITIT 기반 async trait이라 dyn 호환이 아닙니다.
//! 트레이트 객체가 필요한 곳에서는 blanket impl이 제공되는 [`DynPipeline`]을 사용합니다.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use crate::error::IcsguardError;

/// `Send` 박스 future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 파이프라인 수명 주기 trait
pub trait Pipeline: Send + Sync {
    /// 백그라운드 태스크를 기동합니다. 이미 실행 중이면 에러입니다.
    fn start(&mut self) -> impl Future<Output = Result<(), IcsguardError>> + Send;

    /// 입력을 멈추고 남은 작업을 모두 처리한 뒤 정지합니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), IcsguardError>> + Send;

    /// 현재 상태를 보고합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// dyn 호환 파이프라인 trait
pub trait DynPipeline: Send + Sync {
    fn start(&mut self) -> BoxFuture<'_, Result<(), IcsguardError>>;

    fn stop(&mut self) -> BoxFuture<'_, Result<(), IcsguardError>>;

    fn health_check(&self) -> BoxFuture<'_, HealthStatus>;
}

impl<T: Pipeline> DynPipeline for T {
    fn start(&mut self) -> BoxFuture<'_, Result<(), IcsguardError>> {
        Box::pin(Pipeline::start(self))
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), IcsguardError>> {
        Box::pin(Pipeline::stop(self))
    }

    fn health_check(&self) -> BoxFuture<'_, HealthStatus> {
        Box::pin(Pipeline::health_check(self))
    }
}

/// 파이프라인 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 손실/실패가 관측됨
    Degraded(String),
    /// 동작하지 않음
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }

    /// 두 상태 중 더 나쁜 쪽을 반환합니다.
    pub fn worst(self, other: HealthStatus) -> HealthStatus {
        if self.is_unhealthy() {
            return self;
        }
        if other.is_unhealthy() || self.is_healthy() {
            return other;
        }
        self
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}
