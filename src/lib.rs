//! # XFP (XOR-FEC Flow Protocol)
//!
//! UDP 기반 Go-Back-N 대용량 전송 프로토콜
//!
//! ## 핵심 특징
//! - **누적 ACK**: 수신자는 다음에 기대하는 바이트 오프셋만 알림
//! - **슬라이딩 윈도우**: 협상된 세그먼트 수만큼만 in-flight 허용
//! - **XOR FEC**: 그룹당 패리티 1개로 손실 1개를 재전송 없이 복구
//! - **Go-Back-N**: RTO 발생 시 미확인 윈도우 전체 재전송
//! - **세션당 소켓**: 상태는 세션 태스크가 단독 소유 (락 없음)

pub mod catalog;
pub mod channel;
pub mod config;
pub mod error;
pub mod fec;
pub mod message;
pub mod receiver;
pub mod segment;
pub mod sender;
pub mod server;
pub mod session;
pub mod stats;

pub use catalog::{Catalog, DirectoryCatalog, MemoryCatalog, Payload};
pub use channel::Link;
pub use config::Config;
pub use error::{Error, Malformed, Result};
pub use message::{ConnectReply, ConnectRequest, PayloadMeta, PixelFormat, ReplyStatus};
pub use receiver::{ReceiveState, Receiver, TransferOutcome};
pub use segment::{Segment, SegmentKind};
pub use sender::{SendWindow, Sender};
pub use server::Server;
pub use session::Session;
pub use stats::TransferStats;

/// 프로토콜 버전
pub const PROTOCOL_VERSION: u8 = 1;

/// 세그먼트 헤더 크기 (바이트)
///
/// version(1) + kind(1) + length(2) + sequence(4) + aux(2) + crc32(4)
pub const HEADER_LEN: usize = 14;

/// 기본 세그먼트 크기 (바이트, 헤더 제외)
pub const DEFAULT_SEGMENT_SIZE: usize = 1200;

/// 최소 세그먼트 크기
pub const MIN_SEGMENT_SIZE: usize = 16;

/// 최대 세그먼트 크기 (u16 length 필드 + UDP 데이터그램 한도)
pub const MAX_SEGMENT_SIZE: usize = 65_000;

/// CONNECT-REPLY 확인용 ACK 시퀀스
pub const HANDSHAKE_ACK_SEQ: u32 = u32::MAX;

/// FIN 확인용 ACK 시퀀스
pub const FIN_ACK_SEQ: u32 = u32::MAX - 1;

/// 전송 가능한 최대 바이트 수 (시퀀스 공간에서 센티널 두 개 제외)
pub const MAX_TRANSFER_SIZE: usize = (u32::MAX - 2) as usize;
