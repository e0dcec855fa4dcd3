//! 전송 통계
//!
//! 송신측과 수신측이 같은 구조체를 쓰고, 해당 없는 필드는 0으로 남음

use std::time::{Duration, Instant};

/// 세션 전송 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 전송 대상 크기 (바이트)
    pub total_bytes: u64,

    /// 확인된(송신) 또는 순서대로 수신된(수신) 바이트
    pub delivered_bytes: u64,

    /// DATA 세그먼트 수 (송신: 전송, 수신: 수락)
    pub data_segments: u64,

    /// 재전송된 DATA 세그먼트 수
    pub retransmitted_segments: u64,

    /// FEC 세그먼트 수 (송신: 전송, 수신: 도착)
    pub fec_segments: u64,

    /// FEC로 복원한 세그먼트 수
    pub fec_repairs: u64,

    /// 복원할 것이 없어 버린 FEC 수
    pub redundant_fec: u64,

    /// ACK 수 (송신: 수신, 수신: 전송)
    pub acks: u64,

    /// snd_una를 전진시키지 못한 ACK 수
    pub duplicate_acks: u64,

    /// 이미 받은 구간의 DATA 수
    pub duplicate_segments: u64,

    /// 순서가 어긋나 도착한 DATA 수
    pub out_of_order: u64,

    /// RTO 발생 횟수
    pub timeouts: u64,

    /// Recovering 모드 진입 횟수
    pub recoveries: u64,

    /// 디코딩 실패로 버린 데이터그램 수
    pub malformed: u64,

    /// 손실 시뮬레이션으로 버린 세그먼트 수
    pub dropped_by_channel: u64,
}

impl TransferStats {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            start_time: Instant::now(),
            total_bytes,
            delivered_bytes: 0,
            data_segments: 0,
            retransmitted_segments: 0,
            fec_segments: 0,
            fec_repairs: 0,
            redundant_fec: 0,
            acks: 0,
            duplicate_acks: 0,
            duplicate_segments: 0,
            out_of_order: 0,
            timeouts: 0,
            recoveries: 0,
            malformed: 0,
            dropped_by_channel: 0,
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 실효 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.delivered_bytes as f64 / elapsed
    }

    /// 재전송 비율
    pub fn retransmission_ratio(&self) -> f64 {
        if self.data_segments == 0 {
            return 0.0;
        }
        self.retransmitted_segments as f64 / self.data_segments as f64
    }

    /// 진행률 (0.0 ~ 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        self.delivered_bytes as f64 / self.total_bytes as f64
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Bytes: {}/{} | Throughput: {:.2} MB/s | DATA: {} (retx {:.1}%) | FEC: {} (repairs {}) | ACKs: {} | RTO: {} | Dropped: {}",
            self.elapsed().as_secs_f64(),
            self.delivered_bytes,
            self.total_bytes,
            self.throughput() / 1_000_000.0,
            self.data_segments,
            self.retransmission_ratio() * 100.0,
            self.fec_segments,
            self.fec_repairs,
            self.acks,
            self.timeouts,
            self.dropped_by_channel,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratios_on_empty_stats() {
        let stats = TransferStats::default();
        assert_eq!(stats.retransmission_ratio(), 0.0);
        assert_eq!(stats.progress(), 1.0);
    }

    #[test]
    fn test_progress_and_retransmission_ratio() {
        let mut stats = TransferStats::new(10_000);
        stats.delivered_bytes = 2500;
        stats.data_segments = 20;
        stats.retransmitted_segments = 5;
        assert_eq!(stats.progress(), 0.25);
        assert_eq!(stats.retransmission_ratio(), 0.25);
        assert!(stats.summary().contains("2500/10000"));
    }
}
