//! 세그먼트 프레이밍
//!
//! 모든 데이터그램은 고정 헤더 + 가변 페이로드로 구성됨
//!
//! ```text
//!  0       1       2               4                               8
//! +-------+-------+---------------+-------------------------------+
//! |version| kind  |    length     |           sequence            |
//! +-------+-------+---------------+-------------------------------+
//! |      aux      |             crc32             |  payload ...
//! +---------------+-------------------------------+---------------
//! ```
//!
//! 모든 정수는 big-endian. `aux`는 FEC 세그먼트에서만 의미가 있음
//! (패리티에 포함된 DATA 세그먼트 수).

use bytes::{Buf, BufMut, Bytes};

use crate::{Malformed, Result, HEADER_LEN, MAX_SEGMENT_SIZE, PROTOCOL_VERSION};

/// 세그먼트 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SegmentKind {
    /// 연결 요청 (수신자 → 송신자)
    ConnectRequest = 1,

    /// 연결 응답 (송신자 → 수신자)
    ConnectReply = 2,

    /// 데이터
    Data = 3,

    /// XOR 패리티
    Fec = 4,

    /// 누적 ACK
    Ack = 5,

    /// 전송 종료
    Fin = 6,
}

impl SegmentKind {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::ConnectRequest),
            2 => Some(Self::ConnectReply),
            3 => Some(Self::Data),
            4 => Some(Self::Fec),
            5 => Some(Self::Ack),
            6 => Some(Self::Fin),
            _ => None,
        }
    }
}

/// 전송 단위
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// 세그먼트 종류
    pub kind: SegmentKind,

    /// 페이로드 첫 바이트의 전송 내 오프셋
    pub sequence: u32,

    /// FEC: 패리티에 포함된 DATA 세그먼트 수, 그 외 0
    pub aux: u16,

    /// 페이로드
    pub payload: Bytes,
}

impl Segment {
    pub fn new(kind: SegmentKind, sequence: u32, payload: Bytes) -> Self {
        Self {
            kind,
            sequence,
            aux: 0,
            payload,
        }
    }

    pub fn data(sequence: u32, payload: Bytes) -> Self {
        Self::new(SegmentKind::Data, sequence, payload)
    }

    /// FEC 세그먼트 (`sequence`는 그룹 끝 오프셋)
    pub fn fec(sequence: u32, covered: u16, parity: Bytes) -> Self {
        Self {
            kind: SegmentKind::Fec,
            sequence,
            aux: covered,
            payload: parity,
        }
    }

    pub fn ack(sequence: u32) -> Self {
        Self::new(SegmentKind::Ack, sequence, Bytes::new())
    }

    pub fn fin(sequence: u32) -> Self {
        Self::new(SegmentKind::Fin, sequence, Bytes::new())
    }

    /// 페이로드 길이
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// 데이터그램으로 직렬화
    ///
    /// 페이로드는 `MAX_SEGMENT_SIZE` 이하여야 함 (DATA/FEC는 세션이, 핸드쉐이크는
    /// `message`의 본문 검사가 보장)
    pub fn to_bytes(&self) -> Vec<u8> {
        debug_assert!(self.payload.len() <= MAX_SEGMENT_SIZE);
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u8(PROTOCOL_VERSION);
        buf.put_u8(self.kind as u8);
        buf.put_u16(self.payload.len() as u16);
        buf.put_u32(self.sequence);
        buf.put_u16(self.aux);
        buf.put_u32(crc32fast::hash(&self.payload));
        buf.put_slice(&self.payload);
        buf
    }

    /// 데이터그램에서 역직렬화
    ///
    /// 실패해도 호출자 상태는 건드리지 않음 (손실과 동일하게 취급)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Malformed::Truncated { len: bytes.len() }.into());
        }

        let mut header = &bytes[..HEADER_LEN];
        let version = header.get_u8();
        if version != PROTOCOL_VERSION {
            return Err(Malformed::Version {
                expected: PROTOCOL_VERSION,
                got: version,
            }
            .into());
        }

        let raw_kind = header.get_u8();
        let kind = SegmentKind::from_u8(raw_kind).ok_or(Malformed::UnknownKind(raw_kind))?;

        let length = header.get_u16() as usize;
        let sequence = header.get_u32();
        let aux = header.get_u16();
        let crc = header.get_u32();

        let body = &bytes[HEADER_LEN..];
        if body.len() != length {
            return Err(Malformed::LengthMismatch {
                declared: length,
                actual: body.len(),
            }
            .into());
        }

        let actual_crc = crc32fast::hash(body);
        if actual_crc != crc {
            return Err(Malformed::Crc {
                expected: crc,
                got: actual_crc,
            }
            .into());
        }

        Ok(Self {
            kind,
            sequence,
            aux,
            payload: Bytes::copy_from_slice(body),
        })
    }
}
