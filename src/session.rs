//! 세션 파라미터
//!
//! 핸드쉐이크 완료 후 세션이 끝날 때까지 변하지 않는 값들

use crate::message::ConnectRequest;
use crate::{Config, Error, Malformed, Result, MAX_SEGMENT_SIZE, MAX_TRANSFER_SIZE, MIN_SEGMENT_SIZE};

/// 협상된 세션 파라미터
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    /// 전체 전송 크기 (바이트)
    pub total_size: u32,

    /// DATA 세그먼트 최대 페이로드 (바이트)
    pub segment_size: u32,

    /// 수신 윈도우 (세그먼트 단위)
    pub window_size: u32,

    /// FEC 그룹 크기
    pub fec_group_size: u32,
}

impl Session {
    pub fn new(
        total_size: u32,
        segment_size: u32,
        window_size: u32,
        fec_group_size: u32,
    ) -> Result<Self> {
        if total_size as usize > MAX_TRANSFER_SIZE {
            return Err(Error::TransferTooLarge {
                size: total_size as usize,
                max: MAX_TRANSFER_SIZE,
            });
        }
        if !(MIN_SEGMENT_SIZE..=MAX_SEGMENT_SIZE).contains(&(segment_size as usize)) {
            return Err(Error::InvalidConfig(format!(
                "segment_size {} 범위 밖",
                segment_size
            )));
        }
        if fec_group_size == 0 || fec_group_size >= window_size || window_size > u16::MAX as u32 {
            return Err(Error::InvalidConfig(format!(
                "fec_group_size {} / window_size {} 조합 불가",
                fec_group_size, window_size
            )));
        }

        Ok(Self {
            total_size,
            segment_size,
            window_size,
            fec_group_size,
        })
    }

    /// 송신측 협상
    ///
    /// 요청값 0은 송신자 설정값으로 대체하고, 세그먼트 크기는 허용 범위로 맞춤.
    /// 전송 크기가 시퀀스 공간을 넘으면 세그먼트를 보내기 전에 실패함
    pub fn negotiate(request: &ConnectRequest, config: &Config, total_size: usize) -> Result<Self> {
        if total_size > MAX_TRANSFER_SIZE {
            return Err(Error::TransferTooLarge {
                size: total_size,
                max: MAX_TRANSFER_SIZE,
            });
        }

        let pick = |requested: u32, default: usize| {
            if requested == 0 {
                default as u32
            } else {
                requested
            }
        };

        let segment_size = pick(request.segment_size, config.segment_size)
            .clamp(MIN_SEGMENT_SIZE as u32, MAX_SEGMENT_SIZE as u32);
        let window_size = pick(request.window_size, config.window_size);
        let fec_group_size = pick(request.fec_group_size, config.fec_group_size);

        Self::new(total_size as u32, segment_size, window_size, fec_group_size)
    }

    /// `offset`에서 시작하는 DATA 세그먼트 길이
    pub fn segment_len(&self, offset: u32) -> usize {
        (self.total_size.saturating_sub(offset)).min(self.segment_size) as usize
    }

    /// 전체 DATA 세그먼트 수
    pub fn segment_count(&self) -> u32 {
        self.total_size.div_ceil(self.segment_size)
    }

    /// `[from, to)` 구간을 덮는 세그먼트 수 (올림)
    pub fn segments_between(&self, from: u32, to: u32) -> u32 {
        to.saturating_sub(from).div_ceil(self.segment_size)
    }

    /// FEC 그룹 하나가 덮는 최대 바이트 수
    pub fn group_span(&self) -> u64 {
        self.fec_group_size as u64 * self.segment_size as u64
    }

    /// DATA 세그먼트 검증: 경계 정렬, 범위, 길이
    pub fn check_data(&self, sequence: u32, length: usize) -> Result<()> {
        if sequence % self.segment_size != 0 {
            return Err(Malformed::Misaligned { sequence }.into());
        }
        if sequence >= self.total_size || length != self.segment_len(sequence) {
            return Err(Malformed::OutOfBounds { sequence, length }.into());
        }
        Ok(())
    }

    /// FEC 세그먼트가 덮는 구간의 시작 오프셋
    ///
    /// `end`는 그룹 끝(FEC의 sequence), `covered`는 포함된 DATA 세그먼트 수
    pub fn fec_coverage(&self, end: u32, covered: u16, length: usize) -> Result<u32> {
        let aligned = end == self.total_size || end % self.segment_size == 0;
        let end_index = end.div_ceil(self.segment_size);
        let covered = covered as u32;

        if end > self.total_size || !aligned || length != self.segment_size as usize {
            return Err(Malformed::OutOfBounds {
                sequence: end,
                length,
            }
            .into());
        }
        if covered == 0 || covered > self.fec_group_size || covered > end_index {
            return Err(Malformed::FecCoverage {
                sequence: end,
                covered: covered as u16,
            }
            .into());
        }

        Ok((end_index - covered) * self.segment_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(segment_size: u32, window_size: u32, fec_group_size: u32) -> ConnectRequest {
        ConnectRequest {
            segment_size,
            window_size,
            fec_group_size,
            name: "img".into(),
        }
    }

    #[test]
    fn test_negotiate_fills_defaults() {
        let config = Config::default();
        let session = Session::negotiate(&request(0, 0, 0), &config, 5000).unwrap();
        assert_eq!(session.segment_size as usize, config.segment_size);
        assert_eq!(session.window_size as usize, config.window_size);
        assert_eq!(session.fec_group_size as usize, config.fec_group_size);
        assert_eq!(session.total_size, 5000);
    }

    #[test]
    fn test_negotiate_clamps_segment_size() {
        let session =
            Session::negotiate(&request(1_000_000, 8, 5), &Config::default(), 10).unwrap();
        assert_eq!(session.segment_size as usize, MAX_SEGMENT_SIZE);
    }

    #[test]
    fn test_negotiate_rejects_oversized_transfer() {
        let result = Session::negotiate(&request(0, 0, 0), &Config::default(), MAX_TRANSFER_SIZE + 1);
        assert!(matches!(result, Err(Error::TransferTooLarge { .. })));
    }

    #[test]
    fn test_negotiate_rejects_group_not_smaller_than_window() {
        let result = Session::negotiate(&request(1000, 5, 5), &Config::default(), 100);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_segment_len_handles_short_tail() {
        let session = Session::new(10_500, 1000, 8, 5).unwrap();
        assert_eq!(session.segment_len(0), 1000);
        assert_eq!(session.segment_len(10_000), 500);
        assert_eq!(session.segment_count(), 11);
    }

    #[test]
    fn test_check_data() {
        let session = Session::new(10_500, 1000, 8, 5).unwrap();
        assert!(session.check_data(3000, 1000).is_ok());
        assert!(session.check_data(10_000, 500).is_ok());
        assert!(session.check_data(10_000, 1000).is_err());
        assert!(session.check_data(1500, 1000).is_err());
        assert!(session.check_data(11_000, 0).is_err());
    }

    #[test]
    fn test_fec_coverage() {
        let session = Session::new(10_500, 1000, 8, 5).unwrap();
        assert_eq!(session.fec_coverage(5000, 5, 1000).unwrap(), 0);
        assert_eq!(session.fec_coverage(7000, 5, 1000).unwrap(), 2000);
        // 마지막 그룹: 10_000..10_500 포함 1개
        assert_eq!(session.fec_coverage(10_500, 1, 1000).unwrap(), 10_000);
        assert_eq!(session.fec_coverage(10_500, 3, 1000).unwrap(), 8000);

        assert!(session.fec_coverage(5000, 6, 1000).is_err());
        assert!(session.fec_coverage(5500, 5, 1000).is_err());
        assert!(session.fec_coverage(2000, 3, 1000).is_err());
        assert!(session.fec_coverage(5000, 5, 999).is_err());
    }
}
