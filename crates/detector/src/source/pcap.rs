//! libpcap 캡처 소스 (`pcap` feature)
//!
//! 블로킹 `next_packet` 호출은 전용 블로킹 스레드에서 실행되고,
//! 디코딩된 패킷은 bounded 채널로 캡처 태스크에 전달됩니다.
//! 읽기 타임아웃마다 정지 플래그를 확인하므로 종료 시 블로킹 읽기가 중단됩니다.
//!
//! ```text
//! [blocking thread] Capture::next_packet -> decode -> mpsc -> PcapSource::next_packet
//! ```

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use pcap::{Activated, Capture};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use icsguard_core::config::{CaptureConfig, CaptureSource};
use icsguard_core::error::CaptureError;
use icsguard_core::pipeline::BoxFuture;
use icsguard_core::types::RawPacket;

use crate::decode::{decode_ethernet, decode_ip};
use crate::source::PacketSource;

/// 블로킹 스레드와 캡처 태스크 사이 채널 용량
const CHANNEL_CAPACITY: usize = 4096;

/// 데이터 링크 형식
#[derive(Debug, Clone, Copy)]
enum LinkKind {
    Ethernet,
    RawIp,
}

impl LinkKind {
    fn from_linktype(linktype: pcap::Linktype) -> Option<Self> {
        match linktype.0 {
            1 => Some(Self::Ethernet),
            // DLT_RAW (12/14), LINKTYPE_RAW (101), IPV4 (228), IPV6 (229)
            12 | 14 | 101 | 228 | 229 => Some(Self::RawIp),
            _ => None,
        }
    }

    fn decode(self, frame: &[u8], timestamp: f64) -> RawPacket {
        match self {
            Self::Ethernet => decode_ethernet(frame, timestamp),
            Self::RawIp => decode_ip(frame, timestamp),
        }
    }
}

/// libpcap 기반 패킷 소스
pub struct PcapSource {
    name: String,
    rx: mpsc::Receiver<Result<RawPacket, CaptureError>>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl PcapSource {
    /// 캡처 설정에 따라 실시간 또는 파일 소스를 엽니다.
    pub fn from_config(config: &CaptureConfig) -> Result<Self, CaptureError> {
        match config.source {
            CaptureSource::Live => Self::open_live(config),
            CaptureSource::Pcap => Self::open_file(&config.pcap_path, &config.filter),
            CaptureSource::Replay => Err(CaptureError::Unsupported(
                "replay files are read by ReplaySource".to_owned(),
            )),
        }
    }

    /// 네트워크 인터페이스에서 실시간 캡처를 시작합니다.
    ///
    /// 인터페이스가 없거나 권한이 부족하면 `OpenFailed`입니다.
    pub fn open_live(config: &CaptureConfig) -> Result<Self, CaptureError> {
        let interface = config.interface.as_str();
        let open_failed = |e: pcap::Error| CaptureError::OpenFailed {
            source_name: interface.to_owned(),
            reason: e.to_string(),
        };

        let read_timeout_ms = i32::try_from(config.read_timeout_ms).unwrap_or(i32::MAX);
        let snaplen = i32::try_from(config.snaplen).unwrap_or(i32::MAX);

        let mut capture = Capture::from_device(interface)
            .map_err(open_failed)?
            .promisc(config.promiscuous)
            .snaplen(snaplen)
            .timeout(read_timeout_ms)
            .open()
            .map_err(open_failed)?;

        if !config.filter.is_empty() {
            capture.filter(&config.filter, true).map_err(open_failed)?;
        }

        info!(
            interface,
            promiscuous = config.promiscuous,
            snaplen = config.snaplen,
            filter = %config.filter,
            "live capture opened"
        );

        Self::spawn(format!("live:{interface}"), capture)
    }

    /// 오프라인 pcap 파일을 엽니다.
    pub fn open_file(path: impl AsRef<Path>, filter: &str) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let open_failed = |e: pcap::Error| CaptureError::OpenFailed {
            source_name: path.display().to_string(),
            reason: e.to_string(),
        };

        let mut capture = Capture::from_file(path).map_err(open_failed)?;
        if !filter.is_empty() {
            capture.filter(filter, true).map_err(open_failed)?;
        }

        info!(path = %path.display(), "pcap file opened");
        Self::spawn(format!("pcap:{}", path.display()), capture)
    }

    fn spawn<T>(name: String, capture: Capture<T>) -> Result<Self, CaptureError>
    where
        T: Activated + Send + 'static,
        Capture<T>: Send,
    {
        let link = LinkKind::from_linktype(capture.get_datalink()).ok_or_else(|| {
            CaptureError::Unsupported(format!(
                "datalink type {:?} on {}",
                capture.get_datalink(),
                name
            ))
        })?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let reader_stop = Arc::clone(&stop);
        let reader_name = name.clone();

        let reader = tokio::task::spawn_blocking(move || {
            read_loop(capture, link, &tx, &reader_stop);
            debug!(source = %reader_name, "capture reader exited");
        });

        Ok(Self {
            name,
            rx,
            stop,
            reader: Some(reader),
        })
    }
}

fn read_loop<T: Activated + ?Sized>(
    mut capture: Capture<T>,
    link: LinkKind,
    tx: &mpsc::Sender<Result<RawPacket, CaptureError>>,
    stop: &AtomicBool,
) {
    while !stop.load(Ordering::Relaxed) {
        match capture.next_packet() {
            Ok(frame) => {
                let ts = frame.header.ts;
                let timestamp = ts.tv_sec as f64 + ts.tv_usec as f64 / 1_000_000.0;
                let packet = link.decode(frame.data, timestamp);
                if tx.blocking_send(Ok(packet)).is_err() {
                    break;
                }
            }
            Err(pcap::Error::TimeoutExpired) => continue,
            Err(pcap::Error::NoMorePackets) => break,
            Err(e) => {
                warn!(error = %e, "capture read failed");
                if tx.blocking_send(Err(CaptureError::Read(e.to_string()))).is_err() {
                    debug!("capture receiver closed before read error was delivered");
                }
                break;
            }
        }
    }
}

impl PacketSource for PcapSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_packet(&mut self) -> BoxFuture<'_, Result<Option<RawPacket>, CaptureError>> {
        Box::pin(async move {
            match self.rx.recv().await {
                Some(Ok(packet)) => Ok(Some(packet)),
                Some(Err(e)) => Err(e),
                None => Ok(None),
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.stop.store(true, Ordering::Relaxed);
            self.rx.close();
            if let Some(reader) = self.reader.take() {
                if let Err(e) = reader.await {
                    warn!(source = %self.name, error = %e, "capture reader task failed");
                }
            }
            info!(source = %self.name, "capture closed");
        })
    }
}
