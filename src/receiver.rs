//! 수신자 (클라이언트측)
//!
//! - 순서대로 도착한 바이트에 대해 누적 ACK
//! - 그룹당 손실 1개는 FEC로 즉시 복원
//! - 손실이 2개 이상이면 Recovering 모드로 송신자의 RTO를 기다림

use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::channel::Link;
use crate::fec;
use crate::message::{ConnectReply, ConnectRequest, PayloadMeta, ReplyStatus};
use crate::segment::{Segment, SegmentKind};
use crate::stats::TransferStats;
use crate::{Config, Error, Result, Session, FIN_ACK_SEQ, HANDSHAKE_ACK_SEQ};

/// 수신 모드
///
/// 그룹에서 받은 DATA 개수는 따로 세지 않음. Go-Back-N 이후 그룹 경계가
/// 어긋날 수 있으므로, FEC 판단은 `expected_seq`와 `(gap, next)` 구간으로
/// 덮인 세그먼트 각각의 존재 여부를 직접 확인해서 내림
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// 현재 그룹의 손실이 최대 1개, FEC로 복원 가능
    Tracking {
        /// 현재 그룹 시작 오프셋
        group_start: u32,

        /// 첫 손실 오프셋 (있으면 항상 `expected_seq`와 같음)
        gap: Option<u32>,

        /// 마지막으로 받은 세그먼트 다음 오프셋
        next: u32,
    },

    /// 복원 불가. `resume_from`부터의 재전송을 기다림
    Recovering { resume_from: u32 },
}

/// 수신 상태
///
/// 소켓과 무관한 순수 상태 기계. 세그먼트를 넣으면 보낼 ACK를 돌려줌
#[derive(Debug)]
pub struct ReceiveState {
    session: Session,

    /// 전체 크기로 미리 할당된 버퍼
    buffer: BytesMut,

    /// 다음에 순서대로 받을 오프셋 (누적 ACK 값)
    expected: u32,

    mode: Mode,
    fin_received: bool,
    stats: TransferStats,
}

impl ReceiveState {
    pub fn new(session: Session) -> Self {
        Self {
            buffer: BytesMut::zeroed(session.total_size as usize),
            expected: 0,
            mode: Mode::Tracking {
                group_start: 0,
                gap: None,
                next: 0,
            },
            fin_received: false,
            stats: TransferStats::new(session.total_size as u64),
            session,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn expected_seq(&self) -> u32 {
        self.expected
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn fin_received(&self) -> bool {
        self.fin_received
    }

    pub fn is_complete(&self) -> bool {
        self.expected == self.session.total_size
    }

    /// 지금까지 채워진 버퍼 (순서대로 받은 구간은 `..expected_seq`)
    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut TransferStats {
        &mut self.stats
    }

    pub fn into_parts(self) -> (Bytes, TransferStats) {
        (self.buffer.freeze(), self.stats)
    }

    /// 세그먼트 하나 처리
    ///
    /// 보내야 할 ACK가 있으면 반환. 검증에 실패한 세그먼트는 상태를 바꾸지 않음
    pub fn on_segment(&mut self, segment: &Segment) -> Result<Option<Segment>> {
        match segment.kind {
            SegmentKind::Data => self.on_data(segment.sequence, &segment.payload),
            SegmentKind::Fec => self.on_fec(segment.sequence, segment.aux, &segment.payload),
            SegmentKind::Fin => {
                if !self.fin_received {
                    debug!("FIN 수신: expected={}", self.expected);
                }
                self.fin_received = true;
                Ok(Some(self.control_ack(FIN_ACK_SEQ)))
            }
            // 핸드쉐이크 ACK 손실로 송신자가 재전송한 응답
            SegmentKind::ConnectReply => Ok(Some(self.control_ack(HANDSHAKE_ACK_SEQ))),
            SegmentKind::ConnectRequest | SegmentKind::Ack => Ok(None),
        }
    }

    fn on_data(&mut self, sequence: u32, payload: &[u8]) -> Result<Option<Segment>> {
        self.session.check_data(sequence, payload.len())?;
        let len = payload.len() as u32;

        if sequence < self.expected {
            self.stats.duplicate_segments += 1;
            return Ok(Some(self.ack()));
        }

        let (mut group_start, gap, next) = match self.mode {
            Mode::Recovering { resume_from } => {
                if sequence != self.expected {
                    self.stats.out_of_order += 1;
                    return Ok(None);
                }
                debug!("재동기화: {} (대기 시작점 {})", sequence, resume_from);
                self.store(sequence, payload);
                self.expected = sequence + len;
                self.mode = Mode::Tracking {
                    group_start: sequence,
                    gap: None,
                    next: self.expected,
                };
                return Ok(Some(self.ack()));
            }
            Mode::Tracking {
                group_start,
                gap,
                next,
            } => (group_start, gap, next),
        };

        // 그룹 하나 이상이 FEC 없이 지나감
        let span = self.session.group_span();
        if sequence as u64 >= group_start as u64 + span {
            if gap.is_some() {
                self.recover("그룹 FEC 손실");
                return Ok(None);
            }
            let elapsed = (sequence - group_start) as u64 / span;
            group_start += (elapsed * span) as u32;
        }

        if sequence == self.expected {
            self.store(sequence, payload);
            self.expected = match gap {
                Some(_) => next,
                None => sequence + len,
            };
            self.mode = Mode::Tracking {
                group_start,
                gap: None,
                next: self.expected,
            };
            return Ok(Some(self.ack()));
        }

        self.stats.out_of_order += 1;
        match gap {
            Some(_) if sequence == next => {
                self.store(sequence, payload);
                self.mode = Mode::Tracking {
                    group_start,
                    gap,
                    next: sequence + len,
                };
            }
            Some(_) if sequence > next => self.recover("두 번째 손실"),
            Some(_) => self.stats.duplicate_segments += 1,
            None if sequence == self.expected + self.session.segment_size => {
                self.store(sequence, payload);
                self.mode = Mode::Tracking {
                    group_start,
                    gap: Some(self.expected),
                    next: sequence + len,
                };
            }
            None => self.recover("연속 손실"),
        }

        Ok(None)
    }

    fn on_fec(&mut self, end: u32, covered: u16, parity: &[u8]) -> Result<Option<Segment>> {
        let start = self.session.fec_coverage(end, covered, parity.len())?;
        self.stats.fec_segments += 1;

        let Mode::Tracking {
            group_start,
            gap,
            next,
        } = self.mode
        else {
            return Ok(None);
        };
        if end <= group_start {
            return Ok(None);
        }

        let expected = self.expected;
        let present =
            |offset: u32| offset < expected || gap.is_some_and(|g| g < offset && offset < next);
        let step = self.session.segment_size as usize;
        let mut missing = (start..end).step_by(step).filter(|&offset| !present(offset));

        match (missing.next(), missing.next()) {
            (None, _) => {
                if gap.is_some_and(|g| g < start) {
                    self.recover("손실 구간의 FEC 손실");
                    return Ok(None);
                }
                self.stats.redundant_fec += 1;
                if gap.is_none() {
                    self.mode = Mode::Tracking {
                        group_start: end,
                        gap: None,
                        next: self.expected,
                    };
                }
                Ok(None)
            }
            (Some(lost), None) if lost == expected => {
                self.repair(lost, start, end, parity);
                self.expected = match gap {
                    Some(_) => next.max(lost + self.session.segment_len(lost) as u32),
                    None => lost + self.session.segment_len(lost) as u32,
                };
                self.mode = Mode::Tracking {
                    group_start: end,
                    gap: None,
                    next: self.expected,
                };
                debug!("FEC 복원: {} ({}..{})", lost, start, end);
                Ok(Some(self.ack()))
            }
            _ => {
                self.recover("FEC 복원 불가");
                Ok(None)
            }
        }
    }

    /// `[start, end)`의 나머지 세그먼트와 패리티로 `lost`를 복원
    fn repair(&mut self, lost: u32, start: u32, end: u32, parity: &[u8]) {
        let session = self.session;
        let buffer = &self.buffer;
        let others = (start..end)
            .step_by(session.segment_size as usize)
            .filter(|&offset| offset != lost)
            .map(|offset| {
                let from = offset as usize;
                &buffer[from..from + session.segment_len(offset)]
            });

        let restored = fec::reconstruct(parity, others, session.segment_len(lost));
        self.store(lost, &restored);
        self.stats.fec_repairs += 1;
    }

    fn store(&mut self, sequence: u32, payload: &[u8]) {
        let from = sequence as usize;
        self.buffer[from..from + payload.len()].copy_from_slice(payload);
        self.stats.data_segments += 1;
    }

    fn recover(&mut self, reason: &str) {
        debug!("Recovering 전환 ({}): expected={}", reason, self.expected);
        self.stats.recoveries += 1;
        self.mode = Mode::Recovering {
            resume_from: self.expected,
        };
    }

    /// 누적 ACK
    fn ack(&mut self) -> Segment {
        self.stats.acks += 1;
        self.stats.delivered_bytes = self.expected as u64;
        Segment::ack(self.expected)
    }

    fn control_ack(&mut self, sequence: u32) -> Segment {
        self.stats.acks += 1;
        Segment::ack(sequence)
    }
}

/// 수신 결과
#[derive(Debug)]
pub struct TransferOutcome {
    /// 수신 버퍼 (미완료면 일부만 채워짐)
    pub data: Bytes,
    pub meta: PayloadMeta,

    /// 모든 바이트를 받았는지
    pub complete: bool,
    pub stats: TransferStats,
}

impl TransferOutcome {
    /// 완료된 전송의 데이터
    pub fn into_data(self) -> Result<Bytes> {
        if !self.complete {
            return Err(Error::TransferIncomplete {
                received: self.stats.delivered_bytes as u32,
                total: self.data.len() as u32,
            });
        }
        Ok(self.data)
    }
}

/// 수신자
pub struct Receiver {
    config: Config,
    link: Link,
    progress: watch::Sender<u32>,
}

impl Receiver {
    /// 주소에 바인딩
    pub async fn bind(addr: SocketAddr, config: Config) -> Result<Self> {
        config.validate()?;
        let link = Link::bind(addr, &config).await?;
        let (progress, _) = watch::channel(0);
        info!("XFP Receiver bound on {}", link.local_addr()?);

        Ok(Self {
            config,
            link,
            progress,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.link.local_addr()
    }

    /// 순서대로 받은 바이트 수 구독 (점진적 표시용)
    pub fn progress(&self) -> watch::Receiver<u32> {
        self.progress.subscribe()
    }

    /// `server`에 `name`을 요청하고 끝까지 받음
    ///
    /// 송신자가 끝내 응답하지 않으면 `Ok(None)`
    pub async fn fetch(
        &mut self,
        server: SocketAddr,
        name: &str,
    ) -> Result<Option<TransferOutcome>> {
        let Some((reply, peer)) = self.connect(server, name).await? else {
            info!("연결 응답 없음: {} ({})", server, name);
            return Ok(None);
        };

        match reply.status {
            ReplyStatus::Ok => {}
            ReplyStatus::NotFound => return Err(Error::NotFound { name: name.into() }),
            ReplyStatus::Rejected => return Err(Error::Rejected { name: name.into() }),
        }

        let session = reply.session()?;
        info!(
            "Receiving {} from {}: {} bytes, segment={} window={} fec_group={}",
            name,
            peer,
            session.total_size,
            session.segment_size,
            session.window_size,
            session.fec_group_size
        );

        let mut state = ReceiveState::new(session);
        self.progress.send_replace(0);
        let ack = state.on_segment(&reply.to_segment()?)?;
        if let Some(ack) = ack {
            self.link.send(&ack, peer).await?;
        }

        self.receive(&mut state, peer).await?;

        let complete = state.is_complete();
        let (data, mut stats) = state.into_parts();
        let (dropped, malformed) = self.link.take_counters();
        stats.dropped_by_channel += dropped;
        stats.malformed += malformed;
        info!("Transfer {} {}: {}", name, if complete { "done" } else { "incomplete" }, stats.summary());

        Ok(Some(TransferOutcome {
            data,
            meta: reply.meta,
            complete,
            stats,
        }))
    }

    /// CONNECT-REQUEST를 RTO 간격으로 재시도
    ///
    /// 응답은 어느 주소에서 와도 받고, 그 주소가 세션 상대가 됨
    async fn connect(
        &mut self,
        server: SocketAddr,
        name: &str,
    ) -> Result<Option<(ConnectReply, SocketAddr)>> {
        let request = ConnectRequest::new(&self.config, name).to_segment()?;

        for attempt in 0..self.config.max_retries {
            if attempt > 0 {
                debug!("CONNECT-REQUEST 재전송 #{} -> {}", attempt, server);
            }
            self.link.send(&request, server).await?;

            let deadline = Instant::now() + self.config.rto();
            while let Some((segment, from)) = self.link.recv_until(deadline).await? {
                if segment.kind != SegmentKind::ConnectReply {
                    continue;
                }
                match ConnectReply::from_segment(&segment) {
                    // 파라미터가 어긋난 승인 응답은 깨진 응답과 같게 취급
                    Ok(reply) if reply.status == ReplyStatus::Ok => match reply.session() {
                        Ok(_) => return Ok(Some((reply, from))),
                        Err(e) => debug!("잘못된 CONNECT-REPLY 파라미터 ({}): {}", from, e),
                    },
                    Ok(reply) => return Ok(Some((reply, from))),
                    Err(e) => debug!("잘못된 CONNECT-REPLY ({}): {}", from, e),
                }
            }
        }

        Ok(None)
    }

    /// 데이터 수신 루프
    ///
    /// FIN을 받으면 linger 후 종료, 재시도 한도 동안 아무것도 오지 않으면 조용히 종료
    async fn receive(&mut self, state: &mut ReceiveState, peer: SocketAddr) -> Result<()> {
        let mut idle = 0;

        loop {
            let deadline = Instant::now() + self.config.rto();
            let Some((segment, from)) = self.link.recv_until(deadline).await? else {
                idle += 1;
                if idle >= self.config.max_retries {
                    info!(
                        "송신자 응답 없음, 수신 종료: {} ({}/{} bytes)",
                        peer,
                        state.expected_seq(),
                        state.session().total_size
                    );
                    return Ok(());
                }
                continue;
            };

            if from != peer {
                continue;
            }
            idle = 0;

            self.handle(state, &segment, peer).await?;
            if state.fin_received() {
                return self.linger(peer).await;
            }
        }
    }

    async fn handle(
        &mut self,
        state: &mut ReceiveState,
        segment: &Segment,
        peer: SocketAddr,
    ) -> Result<()> {
        match state.on_segment(segment) {
            Ok(Some(ack)) => {
                self.link.send(&ack, peer).await?;
            }
            Ok(None) => {}
            Err(Error::MalformedSegment(reason)) => {
                debug!("세그먼트 폐기 ({:?} {}): {}", segment.kind, segment.sequence, reason);
                state.stats_mut().malformed += 1;
            }
            Err(e) => return Err(e),
        }

        self.progress.send_replace(state.expected_seq());
        Ok(())
    }

    /// FIN ACK 손실에 대비해 잠시 머물며 중복 FIN에 응답
    async fn linger(&mut self, peer: SocketAddr) -> Result<()> {
        let deadline = Instant::now() + self.config.fin_linger();
        while let Some((segment, from)) = self.link.recv_until(deadline).await? {
            if from == peer && segment.kind == SegmentKind::Fin {
                self.link.send(&Segment::ack(FIN_ACK_SEQ), peer).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::sender::SendWindow;

    fn payload(total: u32) -> Bytes {
        (0..total)
            .map(|i| (i.wrapping_mul(2_654_435_761) >> 24) as u8)
            .collect::<Vec<u8>>()
            .into()
    }

    fn pair(total: u32, segment: u32, window: u32, group: u32) -> (SendWindow, ReceiveState, Bytes) {
        let session = Session::new(total, segment, window, group).unwrap();
        let data = payload(total);
        let tx = SendWindow::new(session, data.clone()).unwrap();
        (tx, ReceiveState::new(session), data)
    }

    /// `dropped`에 있는 DATA 오프셋을 빼고 전달, 돌아온 ACK 시퀀스 반환
    fn deliver(rx: &mut ReceiveState, burst: &[Segment], dropped: &[u32]) -> Vec<u32> {
        burst
            .iter()
            .filter(|s| !(s.kind == SegmentKind::Data && dropped.contains(&s.sequence)))
            .filter_map(|s| rx.on_segment(s).unwrap())
            .map(|ack| ack.sequence)
            .collect()
    }

    /// 손실 없이 끝까지 전송
    fn run_clean(tx: &mut SendWindow, rx: &mut ReceiveState) {
        for _ in 0..1000 {
            if tx.is_complete() {
                return;
            }
            let burst = tx.poll_transmit();
            let mut advanced = false;
            for ack in deliver(rx, &burst, &[]) {
                advanced |= tx.on_ack(ack);
            }
            if !advanced {
                tx.on_timeout();
            }
        }
        panic!("transfer did not finish");
    }

    #[test]
    fn test_single_loss_is_repaired_without_retransmission() {
        let (mut tx, mut rx, data) = pair(10_000, 1000, 8, 5);

        let burst = tx.poll_transmit();
        let acks = deliver(&mut rx, &burst, &[3000]);
        assert_eq!(acks, vec![1000, 2000, 3000, 5000, 6000, 7000]);
        for ack in acks {
            tx.on_ack(ack);
        }

        run_clean(&mut tx, &mut rx);
        assert!(rx.is_complete());
        assert_eq!(&rx.data()[3000..4000], &data[3000..4000]);
        assert_eq!(rx.data(), data.as_ref());
        assert_eq!(rx.stats().fec_repairs, 1);
        assert_eq!(tx.stats().retransmitted_segments, 0);
        assert_eq!(tx.stats().timeouts, 0);
    }

    #[test]
    fn test_two_losses_stall_at_first_gap() {
        let (mut tx, mut rx, data) = pair(10_000, 1000, 8, 5);

        let burst = tx.poll_transmit();
        let acks = deliver(&mut rx, &burst, &[2000, 4000]);
        assert_eq!(acks, vec![1000, 2000]);
        assert_eq!(rx.mode(), Mode::Recovering { resume_from: 2000 });
        for ack in acks {
            tx.on_ack(ack);
        }

        // Recovering 중에는 앞선 세그먼트가 와도 ACK 없음
        let burst = tx.poll_transmit();
        assert!(deliver(&mut rx, &burst, &[]).is_empty());
        assert_eq!(rx.expected_seq(), 2000);

        tx.on_timeout();
        let burst = tx.poll_transmit();
        assert_eq!(burst[0].sequence, 2000);
        let acks = deliver(&mut rx, &burst, &[]);
        assert_eq!(acks, vec![3000, 4000, 5000, 6000, 7000, 8000, 9000]);
        assert!(matches!(rx.mode(), Mode::Tracking { gap: None, .. }));
        for ack in acks {
            tx.on_ack(ack);
        }

        run_clean(&mut tx, &mut rx);
        assert_eq!(rx.data(), data.as_ref());
        assert_eq!(rx.stats().fec_repairs, 0);
        assert!(tx.stats().retransmitted_segments >= 5);
    }

    #[test]
    fn test_short_final_segment_is_repaired() {
        let (mut tx, mut rx, data) = pair(10_500, 1000, 8, 5);
        run_clean_with_drops(&mut tx, &mut rx, &[10_000]);
        assert_eq!(rx.data(), data.as_ref());
        assert_eq!(rx.stats().fec_repairs, 1);
        assert_eq!(tx.stats().retransmitted_segments, 0);
    }

    #[test]
    fn test_repair_with_short_segment_in_group() {
        for lost in [7000, 9000] {
            let (mut tx, mut rx, data) = pair(9_500, 1000, 8, 5);
            run_clean_with_drops(&mut tx, &mut rx, &[lost]);
            assert_eq!(rx.data(), data.as_ref(), "lost={}", lost);
            assert_eq!(rx.stats().fec_repairs, 1, "lost={}", lost);
            assert_eq!(tx.stats().timeouts, 0, "lost={}", lost);
        }
    }

    /// 첫 전송에서만 `dropped`를 버리고 끝까지 진행
    fn run_clean_with_drops(tx: &mut SendWindow, rx: &mut ReceiveState, dropped: &[u32]) {
        let mut sent = std::collections::HashSet::new();
        for _ in 0..1000 {
            if tx.is_complete() {
                return;
            }
            let burst = tx.poll_transmit();
            let first: Vec<u32> = burst
                .iter()
                .filter(|s| s.kind == SegmentKind::Data && sent.insert(s.sequence))
                .map(|s| s.sequence)
                .filter(|seq| dropped.contains(seq))
                .collect();
            let mut advanced = false;
            for ack in deliver(rx, &burst, &first) {
                advanced |= tx.on_ack(ack);
            }
            if !advanced {
                tx.on_timeout();
            }
        }
        panic!("transfer did not finish");
    }

    #[test]
    fn test_lost_fec_without_gap_realigns() {
        let (mut tx, mut rx, data) = pair(10_000, 1000, 8, 5);
        let burst: Vec<Segment> = tx
            .poll_transmit()
            .into_iter()
            .filter(|s| s.kind != SegmentKind::Fec)
            .collect();
        let acks = deliver(&mut rx, &burst, &[]);
        assert_eq!(acks, vec![1000, 2000, 3000, 4000, 5000, 6000, 7000]);
        assert!(matches!(rx.mode(), Mode::Tracking { group_start: 5000, .. }));
        for ack in acks {
            tx.on_ack(ack);
        }

        run_clean(&mut tx, &mut rx);
        assert_eq!(rx.data(), data.as_ref());
    }

    #[test]
    fn test_lost_fec_with_gap_falls_back() {
        let (mut tx, mut rx, _) = pair(10_000, 1000, 8, 5);
        let burst: Vec<Segment> = tx
            .poll_transmit()
            .into_iter()
            .filter(|s| s.kind != SegmentKind::Fec)
            .collect();

        // 3000 손실 + FEC 손실: 다음 그룹 DATA가 도착하면 복원 불가
        let acks = deliver(&mut rx, &burst, &[3000]);
        assert_eq!(acks, vec![1000, 2000, 3000]);
        assert_eq!(rx.mode(), Mode::Recovering { resume_from: 3000 });
    }

    #[test]
    fn test_redundant_fec_is_not_acked() {
        let (mut tx, mut rx, _) = pair(10_000, 1000, 8, 5);
        let burst = tx.poll_transmit();
        for segment in &burst {
            let ack = rx.on_segment(segment).unwrap();
            if segment.kind == SegmentKind::Fec {
                assert!(ack.is_none());
            }
        }
        assert_eq!(rx.stats().redundant_fec, 1);
    }

    #[test]
    fn test_duplicate_data_repeats_ack() {
        let (mut tx, mut rx, _) = pair(10_000, 1000, 8, 5);
        let burst = tx.poll_transmit();
        rx.on_segment(&burst[0]).unwrap();
        rx.on_segment(&burst[1]).unwrap();

        let ack = rx.on_segment(&burst[0]).unwrap().unwrap();
        assert_eq!(ack.sequence, 2000);
        assert_eq!(rx.expected_seq(), 2000);
        assert_eq!(rx.stats().duplicate_segments, 1);
    }

    #[test]
    fn test_invalid_data_leaves_state_untouched() {
        let (_, mut rx, _) = pair(10_000, 1000, 8, 5);
        let misaligned = Segment::data(500, Bytes::from(vec![0u8; 1000]));
        let out_of_bounds = Segment::data(10_000, Bytes::from(vec![0u8; 1000]));
        let bad_fec = Segment::fec(5000, 9, Bytes::from(vec![0u8; 1000]));

        for segment in [misaligned, out_of_bounds, bad_fec] {
            assert!(matches!(
                rx.on_segment(&segment),
                Err(Error::MalformedSegment(_))
            ));
        }
        assert_eq!(rx.expected_seq(), 0);
        assert_eq!(rx.data(), vec![0u8; 10_000].as_slice());
    }

    #[test]
    fn test_control_segments_are_acked_with_sentinels() {
        let (_, mut rx, _) = pair(10_000, 1000, 8, 5);
        let fin = rx.on_segment(&Segment::fin(10_000)).unwrap().unwrap();
        assert_eq!(fin.sequence, FIN_ACK_SEQ);
        assert!(rx.fin_received());

        let again = rx.on_segment(&Segment::fin(10_000)).unwrap().unwrap();
        assert_eq!(again.sequence, FIN_ACK_SEQ);

        let reply = ConnectReply::accepted(rx.session(), PayloadMeta::raw(10_000))
            .to_segment()
            .unwrap();
        let ack = rx.on_segment(&reply).unwrap().unwrap();
        assert_eq!(ack.sequence, HANDSHAKE_ACK_SEQ);

        assert!(rx.on_segment(&Segment::ack(1000)).unwrap().is_none());
    }

    #[test]
    fn test_random_loss_terminates_with_exact_bytes() {
        for seed in 0..8u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let (mut tx, mut rx, data) = pair(37_123, 1000, 12, 4);
            let mut rounds = 0;

            while !tx.is_complete() {
                rounds += 1;
                assert!(rounds < 10_000, "seed={} did not terminate", seed);

                let burst = tx.poll_transmit();
                assert!(
                    tx.outstanding_segments() + tx.outstanding_fec() <= tx.session().window_size
                );

                let delivered: Vec<&Segment> =
                    burst.iter().filter(|_| !rng.gen_bool(0.2)).collect();
                let mut advanced = false;
                for segment in delivered {
                    if let Some(ack) = rx.on_segment(segment).unwrap() {
                        assert!(ack.sequence <= rx.expected_seq() || ack.sequence >= FIN_ACK_SEQ);
                        if !rng.gen_bool(0.2) {
                            advanced |= tx.on_ack(ack.sequence);
                        }
                    }
                }
                assert!(tx.snd_una() <= rx.expected_seq());
                if !advanced {
                    tx.on_timeout();
                }
            }

            assert!(rx.is_complete(), "seed={}", seed);
            assert_eq!(rx.data(), data.as_ref(), "seed={}", seed);
        }
    }

    #[test]
    fn test_repair_in_group_shifted_by_rewind() {
        let (mut tx, mut rx, data) = pair(10_000, 1000, 8, 5);

        // 첫 윈도우는 전부 도착했지만 ACK는 하나만 돌아옴
        let burst = tx.poll_transmit();
        assert_eq!(deliver(&mut rx, &burst, &[]), vec![1000, 2000, 3000, 4000, 5000, 6000, 7000]);
        tx.on_ack(1000);
        tx.on_timeout();

        // 재전송 그룹은 1000부터 시작해서 수신자의 그룹 경계와 어긋남
        let burst = tx.poll_transmit();
        let fec: Vec<(u32, u16)> = burst
            .iter()
            .filter(|s| s.kind == SegmentKind::Fec)
            .map(|s| (s.sequence, s.aux))
            .collect();
        assert_eq!(fec, vec![(6000, 5)]);
        for ack in deliver(&mut rx, &burst, &[]) {
            tx.on_ack(ack);
        }
        assert_eq!(tx.snd_una(), 8000);

        // [6000, 10000) 그룹에서 하나 손실
        let burst = tx.poll_transmit();
        assert!(burst.iter().any(|s| s.kind == SegmentKind::Fec && s.sequence == 10_000 && s.aux == 4));
        assert_eq!(deliver(&mut rx, &burst, &[9000]), vec![9000, 10_000]);

        assert!(rx.is_complete());
        assert_eq!(rx.data(), data.as_ref());
        assert_eq!(rx.stats().fec_repairs, 1);
        assert_eq!(rx.stats().recoveries, 0);
    }

    fn quick_config() -> Config {
        Config {
            rto_ms: 20,
            max_retries: 3,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_reply_with_invalid_parameters_is_skipped() {
        let server = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let responder = tokio::spawn(async move {
            let mut buf = vec![0u8; 2048];
            let (len, from) = server.recv_from(&mut buf).await.unwrap();
            let request = Segment::from_bytes(&buf[..len]).unwrap();
            assert_eq!(request.kind, SegmentKind::ConnectRequest);

            let invalid = ConnectReply {
                status: ReplyStatus::Ok,
                total_size: 100,
                segment_size: 0,
                window_size: 8,
                fec_group_size: 4,
                meta: PayloadMeta::raw(100),
            };
            assert!(invalid.session().is_err());
            let refused = ConnectReply::refused(ReplyStatus::NotFound);
            for reply in [invalid, refused] {
                let bytes = reply.to_segment().unwrap().to_bytes();
                server.send_to(&bytes, from).await.unwrap();
            }
        });

        let mut receiver = Receiver::bind("127.0.0.1:0".parse().unwrap(), quick_config())
            .await
            .unwrap();
        let result = receiver.fetch(server_addr, "blob").await;
        responder.await.unwrap();

        assert!(matches!(result, Err(Error::NotFound { name }) if name == "blob"));
    }

    #[tokio::test]
    async fn test_oversized_name_fails_before_sending() {
        let server = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut receiver = Receiver::bind("127.0.0.1:0".parse().unwrap(), quick_config())
            .await
            .unwrap();

        let started = std::time::Instant::now();
        let result = receiver
            .fetch(server.local_addr().unwrap(), &"a".repeat(70_000))
            .await;

        assert!(matches!(result, Err(Error::InvalidConfig(_))));
        assert!(started.elapsed() < quick_config().rto());

        let mut buf = [0u8; 16];
        assert!(server.try_recv_from(&mut buf).is_err());
    }

    #[test]
    fn test_incomplete_outcome_refuses_data() {
        let outcome = TransferOutcome {
            data: Bytes::from(vec![0u8; 100]),
            meta: PayloadMeta::raw(100),
            complete: false,
            stats: TransferStats::new(100),
        };
        assert!(matches!(
            outcome.into_data(),
            Err(Error::TransferIncomplete { received: 0, total: 100 })
        ));
    }
}
