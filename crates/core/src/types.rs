//! 도메인 타입 — 패킷 기술자, 특성 벡터, 윈도우 샘플, 점수 결과
//!
//! 패킷의 각 계층(IP, TCP, UDP, 페이로드)은 `Option` 하위 구조로 표현합니다.
//! 계층이 없으면 특성 추출 시 문서화된 기본값(0)으로 대체됩니다.
//!
//! # 특성 순서
//!
//! [`FEATURE_NAMES`]의 순서는 학습과 추론이 공유하는 계약입니다.
//! 순서가 다른 벡터로 점수를 매기면 [`ModelError::FeatureSchemaMismatch`]로 거부됩니다.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ModelError;

// --- TCP 플래그 비트 ---

/// TCP FIN 플래그
pub const TCP_FLAG_FIN: u16 = 0x01;
/// TCP SYN 플래그
pub const TCP_FLAG_SYN: u16 = 0x02;
/// TCP RST 플래그
pub const TCP_FLAG_RST: u16 = 0x04;
/// TCP PSH 플래그
pub const TCP_FLAG_PSH: u16 = 0x08;
/// TCP ACK 플래그
pub const TCP_FLAG_ACK: u16 = 0x10;
/// TCP URG 플래그
pub const TCP_FLAG_URG: u16 = 0x20;
/// TCP ECE 플래그
pub const TCP_FLAG_ECE: u16 = 0x40;
/// TCP CWR 플래그
pub const TCP_FLAG_CWR: u16 = 0x80;
/// TCP NS 플래그
pub const TCP_FLAG_NS: u16 = 0x100;

/// 캡처된 패킷 기술자
///
/// 캡처 소스가 생성하고 특성 추출기가 한 번 소비한 뒤 버려집니다.
/// 리플레이 파일의 JSON 레코드 형식이기도 합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPacket {
    /// 캡처 시각 (UNIX epoch 초)
    pub timestamp: f64,
    /// 프레임 전체 길이 (바이트)
    pub length: usize,
    /// IP 계층
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpLayer>,
    /// TCP 계층
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp: Option<TcpLayer>,
    /// UDP 계층
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub udp: Option<UdpLayer>,
    /// 페이로드
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<RawPayload>,
}

impl RawPacket {
    /// 계층이 하나도 없는 패킷을 생성합니다.
    pub fn new(timestamp: f64, length: usize) -> Self {
        Self {
            timestamp,
            length,
            ip: None,
            tcp: None,
            udp: None,
            payload: None,
        }
    }

    /// IP 계층 존재 여부. 파이프라인 상류 필터의 조건입니다.
    pub fn has_ip(&self) -> bool {
        self.ip.is_some()
    }
}

/// IP 계층 (v4/v6)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpLayer {
    /// IP 버전 (4 또는 6)
    pub version: u8,
    /// 프로토콜 번호 (IPv6는 최종 next header)
    pub protocol: u8,
    /// 출발지 주소
    pub src: IpAddr,
    /// 목적지 주소
    pub dst: IpAddr,
}

/// TCP 계층
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TcpLayer {
    pub src_port: u16,
    pub dst_port: u16,
    /// 플래그 비트마스크 (`TCP_FLAG_*`)
    #[serde(default)]
    pub flags: u16,
    /// 수신 윈도우 크기
    #[serde(default)]
    pub window: u16,
}

/// UDP 계층
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UdpLayer {
    pub src_port: u16,
    pub dst_port: u16,
}

/// 전송 계층 페이로드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPayload {
    /// 페이로드 길이 (바이트)
    pub length: usize,
}

/// 고정된 10개 특성 이름
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureName {
    PacketSize,
    InterArrivalTime,
    ProtocolType,
    PortNumber,
    PacketCount,
    ByteCount,
    FlowDuration,
    TcpFlags,
    TcpWindowSize,
    PayloadLength,
}

/// 학습과 추론이 공유하는 정규 특성 순서
pub const FEATURE_NAMES: [FeatureName; 10] = [
    FeatureName::PacketSize,
    FeatureName::InterArrivalTime,
    FeatureName::ProtocolType,
    FeatureName::PortNumber,
    FeatureName::PacketCount,
    FeatureName::ByteCount,
    FeatureName::FlowDuration,
    FeatureName::TcpFlags,
    FeatureName::TcpWindowSize,
    FeatureName::PayloadLength,
];

impl FeatureName {
    /// 특성 이름 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PacketSize => "packet_size",
            Self::InterArrivalTime => "inter_arrival_time",
            Self::ProtocolType => "protocol_type",
            Self::PortNumber => "port_number",
            Self::PacketCount => "packet_count",
            Self::ByteCount => "byte_count",
            Self::FlowDuration => "flow_duration",
            Self::TcpFlags => "tcp_flags",
            Self::TcpWindowSize => "tcp_window_size",
            Self::PayloadLength => "payload_length",
        }
    }

    /// 정규 순서의 특성 이름 목록을 `String`으로 반환합니다.
    pub fn canonical_order() -> Vec<String> {
        FEATURE_NAMES.iter().map(|n| n.as_str().to_owned()).collect()
    }
}

impl fmt::Display for FeatureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FEATURE_NAMES
            .iter()
            .copied()
            .find(|n| n.as_str() == s)
            .ok_or_else(|| format!("unknown feature name: {s}"))
    }
}

/// 순서가 보존되는 (이름, 값) 특성 벡터
///
/// JSON 객체로 직렬화되며, 역직렬화 시 문서 내 키 순서를 그대로 유지합니다.
/// 같은 이름을 다시 넣으면 기존 위치의 값이 교체됩니다.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector {
    entries: Vec<(String, f64)>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// 특성을 추가하거나 기존 값을 교체합니다.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    /// 삽입 순서의 특성 이름
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// 삽입 순서의 특성 값
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 이름 기준으로 `order` 순서에 맞게 값을 재배열합니다.
    ///
    /// 표 형식 입력에서 열을 이름으로 선택하는 것과 같습니다.
    /// 추가 특성은 무시되고, 빠진 특성이 있으면 에러입니다.
    pub fn project(&self, order: &[String]) -> Result<Vec<f64>, ModelError> {
        order
            .iter()
            .map(|name| {
                self.get(name)
                    .ok_or_else(|| ModelError::schema_mismatch(order, self.names()))
            })
            .collect()
    }

    /// `order`와 위치까지 정확히 일치할 때만 값을 반환합니다.
    ///
    /// 길이나 순서가 다르면 [`ModelError::FeatureSchemaMismatch`]입니다.
    pub fn ordered_values(&self, order: &[String]) -> Result<Vec<f64>, ModelError> {
        let aligned = self.entries.len() == order.len()
            && self
                .entries
                .iter()
                .zip(order)
                .all(|((name, _), expected)| name == expected);
        if !aligned {
            return Err(ModelError::schema_mismatch(order, self.names()));
        }
        Ok(self.values().collect())
    }
}

impl<N: Into<String>> FromIterator<(N, f64)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (N, f64)>>(iter: I) -> Self {
        let mut vector = Self::new();
        for (name, value) in iter {
            vector.insert(name, value);
        }
        vector
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FeatureVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FeatureVectorVisitor;

        impl<'de> Visitor<'de> for FeatureVectorVisitor {
            type Value = FeatureVector;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object of feature name to number")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut vector = FeatureVector::with_capacity(access.size_hint().unwrap_or(10));
                while let Some((name, value)) = access.next_entry::<String, f64>()? {
                    vector.insert(name, value);
                }
                Ok(vector)
            }
        }

        deserializer.deserialize_map(FeatureVectorVisitor)
    }
}

/// 패킷 단위 특성 (집계 필드를 제외한 6개 필드)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketFeatures {
    pub packet_size: u64,
    pub protocol_type: u8,
    pub port_number: u16,
    pub tcp_flags: u16,
    pub tcp_window_size: u16,
    pub payload_length: u64,
}

impl PacketFeatures {
    /// 집계 필드를 0으로 채운 정규 순서 벡터
    pub fn to_feature_vector(&self) -> FeatureVector {
        WindowSample::from_parts(*self, WindowAggregates::default()).to_feature_vector()
    }
}

/// 윈도우 전체에 걸친 시계열 집계
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowAggregates {
    pub packet_count: u64,
    pub byte_count: u64,
    pub flow_duration: f64,
    pub inter_arrival_time: f64,
}

/// 윈도우 하나의 집계 샘플
///
/// 필드 선언 순서가 정규 특성 순서이며, JSON `features` 객체도 이 순서를 따릅니다.
/// 비어 있지 않은 윈도우에 대해서만 생성됩니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowSample {
    pub packet_size: u64,
    pub inter_arrival_time: f64,
    pub protocol_type: u8,
    pub port_number: u16,
    pub packet_count: u64,
    pub byte_count: u64,
    pub flow_duration: f64,
    pub tcp_flags: u16,
    pub tcp_window_size: u16,
    pub payload_length: u64,
}

impl WindowSample {
    /// 첫 패킷의 특성과 윈도우 집계로 샘플을 조립합니다.
    pub fn from_parts(first: PacketFeatures, aggregates: WindowAggregates) -> Self {
        Self {
            packet_size: first.packet_size,
            inter_arrival_time: aggregates.inter_arrival_time,
            protocol_type: first.protocol_type,
            port_number: first.port_number,
            packet_count: aggregates.packet_count,
            byte_count: aggregates.byte_count,
            flow_duration: aggregates.flow_duration,
            tcp_flags: first.tcp_flags,
            tcp_window_size: first.tcp_window_size,
            payload_length: first.payload_length,
        }
    }

    /// 정규 순서의 특성 벡터를 생성합니다.
    pub fn to_feature_vector(&self) -> FeatureVector {
        let mut vector = FeatureVector::with_capacity(FEATURE_NAMES.len());
        for name in FEATURE_NAMES {
            vector.insert(name.as_str(), self.value(name));
        }
        vector
    }

    /// 이름으로 특성 값을 조회합니다.
    pub fn value(&self, name: FeatureName) -> f64 {
        match name {
            FeatureName::PacketSize => self.packet_size as f64,
            FeatureName::InterArrivalTime => self.inter_arrival_time,
            FeatureName::ProtocolType => f64::from(self.protocol_type),
            FeatureName::PortNumber => f64::from(self.port_number),
            FeatureName::PacketCount => self.packet_count as f64,
            FeatureName::ByteCount => self.byte_count as f64,
            FeatureName::FlowDuration => self.flow_duration,
            FeatureName::TcpFlags => f64::from(self.tcp_flags),
            FeatureName::TcpWindowSize => f64::from(self.tcp_window_size),
            FeatureName::PayloadLength => self.payload_length as f64,
        }
    }
}

/// 디스패처에 한 번 전달되는 불변 점수 결과
///
/// 직렬화 형식은 알림 버스/결과 저장소의 문서 스키마
/// `{timestamp, is_anomaly, features}`와 같습니다. `anomaly_score`는 문서에 포함되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// 점수 산출 시각 (ISO-8601)
    pub timestamp: DateTime<Utc>,
    /// 이상 여부
    pub is_anomaly: bool,
    /// 점수를 매긴 윈도우 샘플
    pub features: WindowSample,
    /// 이상 점수 (0..1, 클수록 이상)
    #[serde(skip)]
    pub anomaly_score: f64,
}

impl ScoreResult {
    pub fn new(features: WindowSample, is_anomaly: bool, anomaly_score: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            is_anomaly,
            features,
            anomaly_score,
        }
    }
}

impl fmt::Display for ScoreResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] anomaly={} score={:.4} packets={} bytes={}",
            self.timestamp.to_rfc3339(),
            self.is_anomaly,
            self.anomaly_score,
            self.features.packet_count,
            self.features.byte_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WindowSample {
        WindowSample {
            packet_size: 100,
            inter_arrival_time: 0.5,
            protocol_type: 6,
            port_number: 502,
            packet_count: 2,
            byte_count: 250,
            flow_duration: 0.5,
            tcp_flags: TCP_FLAG_SYN | TCP_FLAG_ACK,
            tcp_window_size: 1024,
            payload_length: 12,
        }
    }

    #[test]
    fn raw_packet_without_layers_has_no_ip() {
        let packet = RawPacket::new(0.0, 60);
        assert!(!packet.has_ip());
    }

    #[test]
    fn feature_name_roundtrips_through_str() {
        for name in FEATURE_NAMES {
            assert_eq!(name.as_str().parse::<FeatureName>().unwrap(), name);
        }
        assert!("bogus".parse::<FeatureName>().is_err());
    }

    #[test]
    fn window_sample_vector_follows_canonical_order() {
        let vector = sample().to_feature_vector();
        let names: Vec<&str> = vector.names().collect();
        let expected: Vec<&str> = FEATURE_NAMES.iter().map(|n| n.as_str()).collect();
        assert_eq!(names, expected);
        assert_eq!(vector.get("byte_count"), Some(250.0));
        assert_eq!(vector.get("tcp_flags"), Some(18.0));
    }

    #[test]
    fn window_sample_json_keys_are_canonical() {
        let json = serde_json::to_string(&sample()).unwrap();
        let mut last = 0;
        for name in FEATURE_NAMES {
            let pos = json.find(&format!("\"{}\"", name.as_str())).unwrap();
            assert!(pos >= last, "{} out of order", name);
            last = pos;
        }
    }

    #[test]
    fn feature_vector_insert_replaces_in_place() {
        let mut vector = FeatureVector::new();
        vector.insert("a", 1.0);
        vector.insert("b", 2.0);
        vector.insert("a", 3.0);
        assert_eq!(vector.len(), 2);
        assert_eq!(vector.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(vector.get("a"), Some(3.0));
    }

    #[test]
    fn feature_vector_deserialize_preserves_document_order() {
        let vector: FeatureVector = serde_json::from_str(r#"{"z": 1, "a": 2.5, "m": 3}"#).unwrap();
        assert_eq!(vector.names().collect::<Vec<_>>(), vec!["z", "a", "m"]);
        assert_eq!(vector.values().collect::<Vec<_>>(), vec![1.0, 2.5, 3.0]);
        let json = serde_json::to_string(&vector).unwrap();
        assert_eq!(json, r#"{"z":1.0,"a":2.5,"m":3.0}"#);
    }

    #[test]
    fn project_reorders_by_name_and_ignores_extra() {
        let vector: FeatureVector = [("b", 2.0), ("extra", 9.0), ("a", 1.0)]
            .into_iter()
            .collect();
        let order = vec!["a".to_owned(), "b".to_owned()];
        assert_eq!(vector.project(&order).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn project_rejects_missing_name() {
        let vector: FeatureVector = [("a", 1.0)].into_iter().collect();
        let order = vec!["a".to_owned(), "b".to_owned()];
        let err = vector.project(&order).unwrap_err();
        assert!(matches!(err, ModelError::FeatureSchemaMismatch { .. }));
    }

    #[test]
    fn ordered_values_rejects_reordered_vector() {
        let vector: FeatureVector = [("b", 2.0), ("a", 1.0)].into_iter().collect();
        let order = vec!["a".to_owned(), "b".to_owned()];
        assert!(matches!(
            vector.ordered_values(&order),
            Err(ModelError::FeatureSchemaMismatch { .. })
        ));
    }

    #[test]
    fn ordered_values_rejects_length_mismatch() {
        let vector: FeatureVector = [("a", 1.0)].into_iter().collect();
        let order = vec!["a".to_owned(), "b".to_owned()];
        assert!(vector.ordered_values(&order).is_err());
    }

    #[test]
    fn packet_features_vector_zeroes_aggregates() {
        let features = PacketFeatures {
            packet_size: 60,
            protocol_type: 17,
            port_number: 53,
            ..Default::default()
        };
        let vector = features.to_feature_vector();
        assert_eq!(vector.len(), 10);
        assert_eq!(vector.get("packet_count"), Some(0.0));
        assert_eq!(vector.get("port_number"), Some(53.0));
    }

    #[test]
    fn score_result_serializes_document_schema() {
        let result = ScoreResult::new(sample(), true, 0.71);
        let value = serde_json::to_value(&result).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 3);
        assert!(object["timestamp"].is_string());
        assert_eq!(object["is_anomaly"], serde_json::json!(true));
        assert_eq!(object["features"]["byte_count"], serde_json::json!(250));
        assert!(!object.contains_key("anomaly_score"));
    }

    #[test]
    fn raw_packet_json_omits_absent_layers() {
        let packet = RawPacket::new(1.5, 60);
        let json = serde_json::to_string(&packet).unwrap();
        assert_eq!(json, r#"{"timestamp":1.5,"length":60}"#);
        let parsed: RawPacket = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, packet);
    }
}
