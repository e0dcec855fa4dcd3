//! 에러 타입 정의

use thiserror::Error;

/// XFP 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("직렬화 에러: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("잘못된 세그먼트: {0}")]
    MalformedSegment(#[from] Malformed),

    #[error("전송 크기 초과: {size} bytes (최대 {max})")]
    TransferTooLarge { size: usize, max: usize },

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    #[error("전송 대상 없음: {name}")]
    NotFound { name: String },

    #[error("연결 요청 거절: {name}")]
    Rejected { name: String },

    #[error("전송 미완료: {received}/{total} bytes")]
    TransferIncomplete { received: u32, total: u32 },
}

/// 세그먼트 디코딩 실패 사유
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Malformed {
    #[error("헤더보다 짧음: {len} bytes")]
    Truncated { len: usize },

    #[error("유효하지 않은 프로토콜 버전: expected {expected}, got {got}")]
    Version { expected: u8, got: u8 },

    #[error("알 수 없는 세그먼트 종류: {0}")]
    UnknownKind(u8),

    #[error("길이 불일치: declared {declared}, actual {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("CRC 불일치: expected {expected:08X}, got {got:08X}")]
    Crc { expected: u32, got: u32 },

    #[error("범위 밖 세그먼트: sequence={sequence}, length={length}")]
    OutOfBounds { sequence: u32, length: usize },

    #[error("세그먼트 경계 불일치: sequence={sequence}")]
    Misaligned { sequence: u32 },

    #[error("FEC 범위 오류: sequence={sequence}, covered={covered}")]
    FecCoverage { sequence: u32, covered: u16 },
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
