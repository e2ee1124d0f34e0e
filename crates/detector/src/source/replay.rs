//! 기록된 패킷 기술자를 다시 재생하는 리플레이 소스
//!
//! JSON lines 파일의 각 줄은 [`RawPacket`] 하나입니다.
//! `pace`가 켜져 있으면 첫 패킷 기준 타임스탬프 간격만큼 기다렸다가 내보냅니다.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use icsguard_core::error::CaptureError;
use icsguard_core::pipeline::BoxFuture;
use icsguard_core::types::RawPacket;

use crate::error::DetectorError;
use crate::source::PacketSource;

/// 유한 리플레이 소스
#[derive(Debug)]
pub struct ReplaySource {
    name: String,
    packets: VecDeque<RawPacket>,
    pace: bool,
    /// (재생 시작 시각, 첫 패킷 타임스탬프)
    anchor: Option<(Instant, f64)>,
}

impl ReplaySource {
    /// 메모리의 패킷 목록으로 소스를 생성합니다 (간격 재생 없음).
    pub fn from_packets(packets: impl IntoIterator<Item = RawPacket>) -> Self {
        Self {
            name: "replay:memory".to_owned(),
            packets: packets.into_iter().collect(),
            pace: false,
            anchor: None,
        }
    }

    /// JSON lines 파일에서 패킷 기술자를 읽습니다.
    ///
    /// 빈 줄은 건너뜁니다. 파싱 실패 시 `경로:줄번호` 위치와 함께 에러를 반환합니다.
    pub async fn from_jsonl(path: impl AsRef<Path>) -> Result<Self, DetectorError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DetectorError::Capture(CaptureError::OpenFailed {
                    source_name: path.display().to_string(),
                    reason: "replay file not found".to_owned(),
                })
            } else {
                DetectorError::Io(e)
            }
        })?;

        let mut packets = VecDeque::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let packet: RawPacket =
                serde_json::from_str(line).map_err(|e| DetectorError::Decode {
                    location: format!("{}:{}", path.display(), idx + 1),
                    reason: e.to_string(),
                })?;
            packets.push_back(packet);
        }

        info!(
            path = %path.display(),
            packets = packets.len(),
            "loaded replay file"
        );

        Ok(Self {
            name: format!("replay:{}", path.display()),
            packets,
            pace: false,
            anchor: None,
        })
    }

    /// 타임스탬프 간격대로 재생할지 설정합니다.
    pub fn paced(mut self, pace: bool) -> Self {
        self.pace = pace;
        self
    }

    /// 아직 내보내지 않은 패킷 수
    pub fn remaining(&self) -> usize {
        self.packets.len()
    }

    /// 다음 패킷을 내보낼 시각
    fn release_at(&mut self, timestamp: f64) -> Instant {
        let (start, first) = *self
            .anchor
            .get_or_insert_with(|| (Instant::now(), timestamp));
        let offset = Duration::try_from_secs_f64((timestamp - first).max(0.0))
            .unwrap_or(Duration::ZERO);
        start + offset
    }
}

impl PacketSource for ReplaySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_packet(&mut self) -> BoxFuture<'_, Result<Option<RawPacket>, CaptureError>> {
        Box::pin(async move {
            let Some(timestamp) = self.packets.front().map(|p| p.timestamp) else {
                debug!(source = %self.name, "replay exhausted");
                return Ok(None);
            };
            if self.pace {
                let deadline = self.release_at(timestamp);
                tokio::time::sleep_until(deadline).await;
            }
            Ok(self.packets.pop_front())
        })
    }
}
