//! 송신자 (서버측)
//!
//! - 슬라이딩 윈도우 + 누적 ACK
//! - 그룹마다 XOR 패리티 1개 삽입
//! - RTO 시 Go-Back-N

use std::collections::VecDeque;
use std::net::SocketAddr;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::catalog::Payload;
use crate::channel::Link;
use crate::fec::FecAccumulator;
use crate::message::{ConnectReply, ConnectRequest, ReplyStatus};
use crate::segment::{Segment, SegmentKind};
use crate::stats::TransferStats;
use crate::{Config, Error, Result, Session, FIN_ACK_SEQ, HANDSHAKE_ACK_SEQ, MAX_TRANSFER_SIZE};

/// 송신 윈도우 상태
///
/// 소켓과 무관한 순수 상태 기계. [`Sender`]가 세그먼트를 실제로 보내고
/// ACK/타임아웃을 넣어줌.
///
/// ```text
///  snd_una             snd_next
///     │                    │
///  ───┼────────────────────┼──────────────▶ 바이트 오프셋
///     │ <── in flight ───▶ │ <── 전송 가능 ─▶
/// ```
#[derive(Debug)]
pub struct SendWindow {
    session: Session,
    data: Bytes,

    /// 가장 낮은 미확인 오프셋
    snd_una: u32,

    /// 다음에 보낼 오프셋
    snd_next: u32,

    /// 지금까지 보낸 가장 먼 오프셋 (재전송 판별용)
    high_water: u32,

    /// 현재 그룹의 패리티
    fec: FecAccumulator,

    /// 보냈지만 그룹 끝이 아직 확인되지 않은 FEC의 sequence
    fec_in_flight: VecDeque<u32>,

    stats: TransferStats,
}

impl SendWindow {
    pub fn new(session: Session, data: Bytes) -> Result<Self> {
        if data.len() != session.total_size as usize {
            return Err(Error::InvalidConfig(format!(
                "payload {} bytes != total_size {}",
                data.len(),
                session.total_size
            )));
        }

        Ok(Self {
            fec: FecAccumulator::new(session.segment_size as usize),
            fec_in_flight: VecDeque::new(),
            stats: TransferStats::new(session.total_size as u64),
            session,
            data,
            snd_una: 0,
            snd_next: 0,
            high_water: 0,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn snd_una(&self) -> u32 {
        self.snd_una
    }

    pub fn snd_next(&self) -> u32 {
        self.snd_next
    }

    /// 현재 그룹에 누적된 DATA 수
    pub fn fec_group_count(&self) -> u16 {
        self.fec.count()
    }

    /// in-flight DATA 세그먼트 수
    pub fn outstanding_segments(&self) -> u32 {
        self.session.segments_between(self.snd_una, self.snd_next)
    }

    /// in-flight FEC 세그먼트 수
    pub fn outstanding_fec(&self) -> u32 {
        self.fec_in_flight.len() as u32
    }

    /// 윈도우 여유 (세그먼트 단위)
    pub fn usable(&self) -> u32 {
        self.session
            .window_size
            .saturating_sub(self.outstanding_segments() + self.outstanding_fec())
    }

    /// 모든 바이트가 확인됨
    pub fn is_complete(&self) -> bool {
        self.snd_una == self.session.total_size
    }

    /// 윈도우가 허용하는 만큼 DATA/FEC 세그먼트를 만듦
    ///
    /// 그룹을 닫는 DATA는 뒤따르는 FEC 자리까지 두 칸이 필요함
    pub fn poll_transmit(&mut self) -> Vec<Segment> {
        let total = self.session.total_size;
        let group_size = self.session.fec_group_size as u16;
        let mut usable = self.usable();
        let mut out = Vec::new();

        while usable > 0 && self.snd_next < total {
            let offset = self.snd_next;
            let len = self.session.segment_len(offset);
            let end = offset + len as u32;
            let closes_group = self.fec.count() + 1 == group_size || end == total;
            if closes_group && usable < 2 {
                break;
            }

            let payload = self.data.slice(offset as usize..end as usize);
            self.fec.fold(&payload);
            out.push(Segment::data(offset, payload));

            self.stats.data_segments += 1;
            if offset < self.high_water {
                self.stats.retransmitted_segments += 1;
            }
            self.snd_next = end;
            self.high_water = self.high_water.max(end);
            usable -= 1;

            if closes_group {
                let covered = self.fec.count();
                out.push(Segment::fec(end, covered, self.fec.take()));
                self.fec_in_flight.push_back(end);
                self.stats.fec_segments += 1;
                usable -= 1;
            }
        }

        out
    }

    /// 누적 ACK 처리
    ///
    /// `snd_una`를 전진시켰으면 `true`. 이미 확인된 구간의 ACK는 무시
    pub fn on_ack(&mut self, sequence: u32) -> bool {
        self.stats.acks += 1;
        if sequence <= self.snd_una || sequence > self.session.total_size {
            self.stats.duplicate_acks += 1;
            return false;
        }

        self.snd_una = sequence;
        self.stats.delivered_bytes = sequence as u64;

        // 되감기 이후 늦게 도착한 ACK: 진행 중이던 그룹은 더 이상 연속이 아님
        if sequence > self.snd_next {
            self.snd_next = sequence;
            self.fec.reset();
        }

        while self
            .fec_in_flight
            .front()
            .is_some_and(|&end| end <= self.snd_una)
        {
            self.fec_in_flight.pop_front();
        }

        true
    }

    /// RTO: 미확인 윈도우 전체를 처음부터 다시 보냄
    pub fn on_timeout(&mut self) {
        self.stats.timeouts += 1;
        self.snd_next = self.snd_una;
        self.fec.reset();
        self.fec_in_flight.clear();
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    pub fn into_stats(self) -> TransferStats {
        self.stats
    }
}

/// 세션 하나를 담당하는 송신자
///
/// 핸드쉐이크 응답 → 데이터 전송 → FIN 순서로 진행하고,
/// 상대가 재시도 한도 동안 응답이 없으면 조용히 끝냄
pub struct Sender {
    config: Config,
    link: Link,
    peer: SocketAddr,
}

impl Sender {
    pub fn new(config: Config, link: Link, peer: SocketAddr) -> Self {
        Self { config, link, peer }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// 연결 거절 응답 (한 번만 보냄)
    pub async fn refuse(&mut self, status: ReplyStatus) -> Result<()> {
        let reply = ConnectReply::refused(status).to_segment()?;
        self.link.send(&reply, self.peer).await?;
        debug!("연결 거절 ({}): {:?}", self.peer, status);
        Ok(())
    }

    /// 요청 하나를 끝까지 처리
    pub async fn serve(
        mut self,
        request: &ConnectRequest,
        payload: Option<Payload>,
    ) -> Result<TransferStats> {
        let Some(payload) = payload else {
            self.refuse(ReplyStatus::NotFound).await?;
            return Ok(TransferStats::default());
        };

        if payload.data.len() > MAX_TRANSFER_SIZE {
            return Err(Error::TransferTooLarge {
                size: payload.data.len(),
                max: MAX_TRANSFER_SIZE,
            });
        }

        let session = match Session::negotiate(request, &self.config, payload.data.len()) {
            Ok(session) => session,
            Err(Error::InvalidConfig(reason)) => {
                info!("파라미터 협상 실패 ({}): {}", self.peer, reason);
                self.refuse(ReplyStatus::Rejected).await?;
                return Ok(TransferStats::default());
            }
            Err(e) => return Err(e),
        };

        info!(
            "Session {} -> {}: {} bytes, segment={} window={} fec_group={}",
            request.name,
            self.peer,
            session.total_size,
            session.segment_size,
            session.window_size,
            session.fec_group_size
        );

        let reply = ConnectReply::accepted(&session, payload.meta).to_segment()?;
        let mut window = SendWindow::new(session, payload.data)?;

        if !self.handshake(&reply).await? {
            info!("수신자 응답 없음, 세션 종료: {}", self.peer);
        } else if !self.transmit(&mut window).await? {
            info!("RTO 한도 초과, 수신자 이탈로 간주: {}", self.peer);
        } else if !self.finish(session.total_size).await? {
            info!("FIN ACK 없음, 조용히 종료: {}", self.peer);
        }

        let mut stats = window.into_stats();
        let (dropped, malformed) = self.link.take_counters();
        stats.dropped_by_channel += dropped;
        stats.malformed += malformed;

        info!("Session {} done: {}", self.peer, stats.summary());
        Ok(stats)
    }

    /// CONNECT-REPLY를 보내고 그 ACK를 기다림
    async fn handshake(&mut self, reply: &Segment) -> Result<bool> {
        self.exchange(reply, HANDSHAKE_ACK_SEQ).await
    }

    /// FIN을 보내고 그 ACK를 기다림
    async fn finish(&mut self, total_size: u32) -> Result<bool> {
        self.exchange(&Segment::fin(total_size), FIN_ACK_SEQ).await
    }

    /// 제어 세그먼트를 보내고 센티널 ACK를 기다림 (RTO 간격, 재시도 한도)
    async fn exchange(&mut self, segment: &Segment, ack_seq: u32) -> Result<bool> {
        for attempt in 0..self.config.max_retries {
            if attempt > 0 {
                debug!("{:?} 재전송 #{} -> {}", segment.kind, attempt, self.peer);
            }
            self.link.send(segment, self.peer).await?;

            let deadline = Instant::now() + self.config.rto();
            while let Some((reply, from)) = self.link.recv_until(deadline).await? {
                if from == self.peer && reply.kind == SegmentKind::Ack && reply.sequence == ack_seq {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// 데이터 전송 루프
    ///
    /// 모두 확인되면 `true`, 연속 RTO가 한도를 넘으면 `false`
    async fn transmit(&mut self, window: &mut SendWindow) -> Result<bool> {
        let mut idle_timeouts = 0;

        while !window.is_complete() {
            for segment in window.poll_transmit() {
                self.link.send(&segment, self.peer).await?;
            }

            if self.await_acks(window).await? {
                idle_timeouts = 0;
                continue;
            }

            window.on_timeout();
            idle_timeouts += 1;
            debug!(
                "RTO #{}: snd_una={} 부터 재전송",
                idle_timeouts,
                window.snd_una()
            );
            if idle_timeouts >= self.config.max_retries {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// RTO 동안 ACK를 기다리고 도착한 ACK를 모두 처리
    ///
    /// `snd_una`가 전진했으면 `true`
    async fn await_acks(&mut self, window: &mut SendWindow) -> Result<bool> {
        let deadline = Instant::now() + self.config.rto();
        let mut advanced = false;

        while let Some((segment, from)) = self.link.recv_until(deadline).await? {
            advanced |= self.handle_ack(window, &segment, from);
            while let Some((segment, from)) = self.link.try_recv()? {
                advanced |= self.handle_ack(window, &segment, from);
            }
            if advanced {
                break;
            }
        }

        Ok(advanced)
    }

    fn handle_ack(&self, window: &mut SendWindow, segment: &Segment, from: SocketAddr) -> bool {
        if from != self.peer || segment.kind != SegmentKind::Ack {
            return false;
        }
        // 늦게 도착한 핸드쉐이크 ACK 등
        if segment.sequence == HANDSHAKE_ACK_SEQ || segment.sequence == FIN_ACK_SEQ {
            return false;
        }
        window.on_ack(segment.sequence)
    }
}
