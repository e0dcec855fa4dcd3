//! 프로토콜 설정

use std::time::Duration;

use crate::{Error, Result, DEFAULT_SEGMENT_SIZE, MAX_SEGMENT_SIZE, MIN_SEGMENT_SIZE};

/// XFP 프로토콜 설정
///
/// 수신자는 이 값으로 CONNECT-REQUEST를 채우고,
/// 송신자는 요청값이 0일 때 자신의 값을 기본값으로 사용함
#[derive(Debug, Clone)]
pub struct Config {
    /// 세그먼트 페이로드 크기 (바이트, 헤더 제외)
    pub segment_size: usize,

    /// 수신 윈도우 크기 (세그먼트 단위, FEC 포함)
    pub window_size: usize,

    /// FEC 그룹 크기 (패리티 1개가 덮는 DATA 세그먼트 수)
    /// window_size보다 작아야 함
    pub fec_group_size: usize,

    /// 재전송 타임아웃 (밀리초)
    pub rto_ms: u64,

    /// 핸드쉐이크/FIN/무응답 대기 최대 재시도 횟수
    pub max_retries: u32,

    /// FIN 수신 후 중복 FIN에 응답하며 머무는 시간 (밀리초)
    pub fin_linger_ms: u64,

    /// 시뮬레이션 손실률 (0.0 ~ 1.0)
    /// 송신하는 모든 세그먼트에 독립적으로 적용
    pub drop_rate: f64,

    /// 손실 시뮬레이션 시드 (None이면 엔트로피 사용)
    pub loss_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            segment_size: DEFAULT_SEGMENT_SIZE,
            window_size: 32,
            fec_group_size: 8,
            rto_ms: 200,
            max_retries: 10,
            fin_linger_ms: 500,
            drop_rate: 0.0,
            loss_seed: None,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 재전송 타임아웃
    pub fn rto(&self) -> Duration {
        Duration::from_millis(self.rto_ms)
    }

    /// FIN linger 시간
    pub fn fin_linger(&self) -> Duration {
        Duration::from_millis(self.fin_linger_ms)
    }

    /// FEC 오버헤드 비율 (그룹당 패리티 1개)
    pub fn fec_overhead(&self) -> f64 {
        1.0 / self.fec_group_size.max(1) as f64
    }

    /// 설정값 검증
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SEGMENT_SIZE..=MAX_SEGMENT_SIZE).contains(&self.segment_size) {
            return Err(Error::InvalidConfig(format!(
                "segment_size {}는 {}..={} 범위여야 함",
                self.segment_size, MIN_SEGMENT_SIZE, MAX_SEGMENT_SIZE
            )));
        }
        if self.fec_group_size == 0 || self.fec_group_size >= self.window_size {
            return Err(Error::InvalidConfig(format!(
                "fec_group_size {}는 1 이상, window_size {} 미만이어야 함",
                self.fec_group_size, self.window_size
            )));
        }
        if self.window_size > u16::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "window_size {}가 너무 큼",
                self.window_size
            )));
        }
        if !(0.0..1.0).contains(&self.drop_rate) {
            return Err(Error::InvalidConfig(format!(
                "drop_rate {}는 0.0 이상 1.0 미만이어야 함",
                self.drop_rate
            )));
        }
        if self.rto_ms == 0 || self.max_retries == 0 {
            return Err(Error::InvalidConfig("rto_ms와 max_retries는 0일 수 없음".into()));
        }
        Ok(())
    }

    /// 저사양 기기용 설정
    pub fn low_spec() -> Self {
        Self {
            segment_size: 1000,
            window_size: 8,
            fec_group_size: 4,
            rto_ms: 400,
            max_retries: 12,
            fin_linger_ms: 800,
            drop_rate: 0.0,
            loss_seed: None,
        }
    }

    /// 고성능 기기용 설정
    pub fn high_performance() -> Self {
        Self {
            segment_size: 1400,
            window_size: 128,
            fec_group_size: 16,
            rto_ms: 100,
            max_retries: 10,
            fin_linger_ms: 300,
            drop_rate: 0.0,
            loss_seed: None,
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn unstable_network() -> Self {
        Self {
            segment_size: 1000,                 // 작은 세그먼트
            window_size: 24,
            fec_group_size: 4,                  // 패리티 비율 25%
            rto_ms: 300,
            max_retries: 20,
            fin_linger_ms: 1000,
            drop_rate: 0.0,
            loss_seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        for config in [
            Config::default(),
            Config::low_spec(),
            Config::high_performance(),
            Config::unstable_network(),
        ] {
            assert!(config.validate().is_ok(), "{:?}", config);
        }
    }

    #[test]
    fn test_fec_group_must_fit_window() {
        let config = Config {
            window_size: 8,
            fec_group_size: 8,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_drop_rate_bounds() {
        let config = Config {
            drop_rate: 1.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
