//! MQTT 알림 버스 싱크
//!
//! `rumqttc` 이벤트 루프는 별도 태스크에서 폴링되며, 연결이 끊기면 자동으로 재연결합니다.
//! 연결되지 않은 동안의 발행은 즉시 실패하여 디스패처 정책(재시도/드롭)에 맡깁니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use icsguard_core::config::AlertBusConfig;
use icsguard_core::error::DispatchError;
use icsguard_core::pipeline::BoxFuture;
use icsguard_core::types::ScoreResult;

use super::{ResultDocument, ResultSink};

const SINK_NAME: &str = "mqtt";
/// 클라이언트 요청 채널 용량
const REQUEST_CAPACITY: usize = 64;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// MQTT 알림 싱크
pub struct MqttAlertSink {
    client: AsyncClient,
    topic: String,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl MqttAlertSink {
    /// 클라이언트를 만들고 이벤트 루프 태스크를 시작합니다.
    ///
    /// 브로커 연결은 백그라운드에서 이루어지므로 이 함수는 실패하지 않습니다.
    /// tokio 런타임 안에서 호출해야 합니다.
    pub fn connect(config: &AlertBusConfig) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        options.set_clean_session(true);

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(poll_event_loop(
            event_loop,
            Arc::clone(&connected),
            cancel.clone(),
        ));

        info!(
            host = %config.host,
            port = config.port,
            topic = %config.topic,
            "alert bus client started"
        );

        Self {
            client,
            topic: config.topic.clone(),
            connected,
            cancel,
            event_loop: Mutex::new(Some(handle)),
        }
    }

    /// 브로커 연결 여부
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

async fn poll_event_loop(
    mut event_loop: EventLoop,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = event_loop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    connected.store(true, Ordering::Relaxed);
                    info!("alert bus connected");
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    connected.store(false, Ordering::Relaxed);
                    debug!("alert bus disconnect sent");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    if connected.swap(false, Ordering::Relaxed) {
                        warn!(error = %e, "alert bus connection lost");
                    } else {
                        debug!(error = %e, "alert bus connection attempt failed");
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                }
            }
        }
    }
}

impl ResultSink for MqttAlertSink {
    fn name(&self) -> &str {
        SINK_NAME
    }

    fn publish<'a>(&'a self, result: &'a ScoreResult) -> BoxFuture<'a, Result<(), DispatchError>> {
        Box::pin(async move {
            if !self.is_connected() {
                return Err(DispatchError::Sink {
                    sink: SINK_NAME.to_owned(),
                    reason: "not connected to broker".to_owned(),
                });
            }
            let payload = ResultDocument::new(result)
                .to_json()
                .map_err(|e| DispatchError::Sink {
                    sink: SINK_NAME.to_owned(),
                    reason: e.to_string(),
                })?;
            self.client
                .publish(self.topic.as_str(), QoS::AtLeastOnce, false, payload)
                .await
                .map_err(|e| DispatchError::Sink {
                    sink: SINK_NAME.to_owned(),
                    reason: e.to_string(),
                })
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let Some(mut handle) = self.event_loop.lock().take() else {
                return;
            };

            let graceful = self.is_connected()
                && self.client.try_disconnect().is_ok()
                && tokio::time::timeout(DISCONNECT_GRACE, &mut handle).await.is_ok();
            if graceful {
                info!("alert bus client closed");
                return;
            }

            self.cancel.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "alert bus event loop task failed");
            }
            info!("alert bus client closed");
        })
    }
}
