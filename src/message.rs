//! 핸드쉐이크 메시지 정의
//!
//! CONNECT-REQUEST / CONNECT-REPLY 세그먼트의 페이로드는 bincode로 직렬화됨.
//! 고정 헤더와 달리 필드가 늘어날 수 있는 부분이므로 serde 구조체로 둠.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::segment::{Segment, SegmentKind};
use crate::{Config, Error, Result, Session, MAX_SEGMENT_SIZE};

/// 핸드쉐이크 본문을 세그먼트로 감쌈
///
/// 헤더의 length 필드와 수신 버퍼에 들어가지 않는 본문은 보내기 전에 거부
fn control_segment(kind: SegmentKind, body: Vec<u8>) -> Result<Segment> {
    if body.len() > MAX_SEGMENT_SIZE {
        return Err(Error::InvalidConfig(format!(
            "{:?} 본문 {} bytes (최대 {})",
            kind,
            body.len(),
            MAX_SEGMENT_SIZE
        )));
    }
    Ok(Segment::new(kind, 0, Bytes::from(body)))
}

/// 픽셀 포맷 (프로토콜은 의미를 해석하지 않음)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 해석되지 않은 바이트
    Raw,
    Gray8,
    Rgb8,
    Rgba8,
}

/// 페이로드 메타데이터
///
/// 송신측 코덱이 채우고 수신측 디스플레이가 해석함
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadMeta {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
}

impl PayloadMeta {
    /// 이미지가 아닌 일반 바이트열
    pub fn raw(len: usize) -> Self {
        Self {
            width: len as u32,
            height: 1,
            pixel_format: PixelFormat::Raw,
        }
    }
}

/// 연결 요청 (수신자 → 송신자)
///
/// 수신자가 감당할 수 있는 파라미터를 제시함. 0이면 송신자 기본값 사용
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    /// 희망 세그먼트 크기 (바이트)
    pub segment_size: u32,

    /// 수신 윈도우 (세그먼트 단위)
    pub window_size: u32,

    /// FEC 그룹 크기
    pub fec_group_size: u32,

    /// 전송 대상 이름
    pub name: String,
}

impl ConnectRequest {
    pub fn new(config: &Config, name: impl Into<String>) -> Self {
        Self {
            segment_size: config.segment_size as u32,
            window_size: config.window_size as u32,
            fec_group_size: config.fec_group_size as u32,
            name: name.into(),
        }
    }

    pub fn to_segment(&self) -> Result<Segment> {
        control_segment(SegmentKind::ConnectRequest, bincode::serialize(self)?)
    }

    pub fn from_segment(segment: &Segment) -> Result<Self> {
        Ok(bincode::deserialize(&segment.payload)?)
    }
}

/// 연결 응답 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyStatus {
    Ok,
    NotFound,
    Rejected,
}

/// 연결 응답 (송신자 → 수신자)
///
/// 확정된 세션 파라미터와 페이로드 메타데이터를 담음
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectReply {
    pub status: ReplyStatus,

    /// 전체 전송 크기 (바이트)
    pub total_size: u32,

    /// 확정된 세그먼트 크기
    pub segment_size: u32,

    /// 확정된 윈도우 크기
    pub window_size: u32,

    /// 확정된 FEC 그룹 크기
    pub fec_group_size: u32,

    pub meta: PayloadMeta,
}

impl ConnectReply {
    pub fn accepted(session: &Session, meta: PayloadMeta) -> Self {
        Self {
            status: ReplyStatus::Ok,
            total_size: session.total_size,
            segment_size: session.segment_size,
            window_size: session.window_size,
            fec_group_size: session.fec_group_size,
            meta,
        }
    }

    pub fn refused(status: ReplyStatus) -> Self {
        Self {
            status,
            total_size: 0,
            segment_size: 0,
            window_size: 0,
            fec_group_size: 0,
            meta: PayloadMeta::raw(0),
        }
    }

    /// 응답에 담긴 세션 파라미터
    pub fn session(&self) -> Result<Session> {
        Session::new(
            self.total_size,
            self.segment_size,
            self.window_size,
            self.fec_group_size,
        )
    }

    pub fn to_segment(&self) -> Result<Segment> {
        control_segment(SegmentKind::ConnectReply, bincode::serialize(self)?)
    }

    pub fn from_segment(segment: &Segment) -> Result<Self> {
        Ok(bincode::deserialize(&segment.payload)?)
    }
}
