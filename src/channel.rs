//! 데이터그램 채널
//!
//! UDP 소켓 하나를 세션이 단독 소유함. 송신하는 모든 세그먼트에
//! 시뮬레이션 손실률을 독립적으로 적용하고, 디코딩에 실패한 데이터그램은
//! 손실과 동일하게 조용히 버림.

use std::io;
use std::net::SocketAddr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::segment::Segment;
use crate::{Config, Result, HEADER_LEN, MAX_SEGMENT_SIZE};

/// 수신 버퍼 크기
const RECV_BUFFER_SIZE: usize = HEADER_LEN + MAX_SEGMENT_SIZE + 512;

/// 송신 손실 모델
#[derive(Debug)]
struct LossModel {
    rate: f64,
    rng: StdRng,
}

impl LossModel {
    fn new(rate: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rate, rng }
    }

    fn should_drop(&mut self) -> bool {
        self.rate > 0.0 && self.rng.gen_bool(self.rate)
    }
}

/// 손실 시뮬레이션이 붙은 UDP 링크
#[derive(Debug)]
pub struct Link {
    socket: UdpSocket,
    loss: LossModel,
    buf: Vec<u8>,
    dropped: u64,
    malformed: u64,
}

/// ICMP 오류로 올라오는 일시적 에러 (상대가 잠깐 없는 경우)
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset
    )
}

impl Link {
    /// 주소에 바인딩
    pub async fn bind(addr: SocketAddr, config: &Config) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::from_socket(socket, config))
    }

    pub fn from_socket(socket: UdpSocket, config: &Config) -> Self {
        Self {
            socket,
            loss: LossModel::new(config.drop_rate, config.loss_seed),
            buf: vec![0u8; RECV_BUFFER_SIZE],
            dropped: 0,
            malformed: 0,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 세그먼트 전송
    ///
    /// 손실 시뮬레이션으로 버려졌으면 `false`
    pub async fn send(&mut self, segment: &Segment, addr: SocketAddr) -> Result<bool> {
        if self.loss.should_drop() {
            self.dropped += 1;
            return Ok(false);
        }

        match self.socket.send_to(&segment.to_bytes(), addr).await {
            Ok(_) => Ok(true),
            Err(e) if is_transient(&e) => {
                warn!("전송 실패 ({}): {}", addr, e);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 세그먼트 하나를 기다림 (기한 없음)
    pub async fn recv(&mut self) -> Result<(Segment, SocketAddr)> {
        loop {
            let (len, addr) = match self.socket.recv_from(&mut self.buf).await {
                Ok(received) => received,
                Err(e) if is_transient(&e) => {
                    warn!("수신 에러: {}", e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if let Some(segment) = self.decode(len, addr) {
                return Ok((segment, addr));
            }
        }
    }

    /// `deadline`까지 세그먼트를 기다림
    ///
    /// 기한이 지나면 `None`
    pub async fn recv_until(&mut self, deadline: Instant) -> Result<Option<(Segment, SocketAddr)>> {
        match tokio::time::timeout_at(deadline, self.recv()).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// 대기 없이 이미 도착한 세그먼트를 꺼냄
    pub fn try_recv(&mut self) -> Result<Option<(Segment, SocketAddr)>> {
        loop {
            let (len, addr) = match self.socket.try_recv_from(&mut self.buf) {
                Ok(received) => received,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) if is_transient(&e) => continue,
                Err(e) => return Err(e.into()),
            };
            if let Some(segment) = self.decode(len, addr) {
                return Ok(Some((segment, addr)));
            }
        }
    }

    fn decode(&mut self, len: usize, addr: SocketAddr) -> Option<Segment> {
        match Segment::from_bytes(&self.buf[..len]) {
            Ok(segment) => Some(segment),
            Err(e) => {
                debug!("데이터그램 폐기 ({}): {}", addr, e);
                self.malformed += 1;
                None
            }
        }
    }

    /// (시뮬레이션 손실 수, 디코딩 실패 수)를 꺼내고 0으로 초기화
    pub fn take_counters(&mut self) -> (u64, u64) {
        let counters = (self.dropped, self.malformed);
        self.dropped = 0;
        self.malformed = 0;
        counters
    }
}
