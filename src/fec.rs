//! XOR 패리티 FEC
//!
//! 그룹 내 DATA 세그먼트들을 세그먼트 크기로 0 패딩한 뒤 XOR한 값이 패리티.
//! 그룹에서 하나만 빠졌다면 패리티와 나머지 세그먼트를 다시 XOR해서 복원함.

use bytes::{Bytes, BytesMut};

/// `dst ^= src` (앞쪽 `src.len()` 바이트)
#[inline]
pub fn xor_into(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= *s;
    }
}

/// 송신측 패리티 누적기
#[derive(Debug)]
pub struct FecAccumulator {
    parity: BytesMut,
    count: u16,
    segment_size: usize,
}

impl FecAccumulator {
    pub fn new(segment_size: usize) -> Self {
        Self {
            parity: BytesMut::with_capacity(segment_size),
            count: 0,
            segment_size,
        }
    }

    /// DATA 페이로드를 현재 그룹에 누적
    ///
    /// 그룹의 첫 세그먼트는 0 패딩된 사본으로 누적기를 초기화함
    pub fn fold(&mut self, data: &[u8]) {
        debug_assert!(data.len() <= self.segment_size);
        if self.count == 0 {
            self.parity.clear();
            self.parity.resize(self.segment_size, 0);
        }
        xor_into(&mut self.parity, data);
        self.count += 1;
    }

    /// 현재 그룹에 누적된 세그먼트 수
    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// 패리티를 꺼내고 그룹을 초기화
    pub fn take(&mut self) -> Bytes {
        self.count = 0;
        self.parity.split().freeze()
    }

    /// 그룹 폐기 (RTO 등)
    pub fn reset(&mut self) {
        self.count = 0;
        self.parity.clear();
    }
}

/// 빠진 세그먼트 하나를 복원
///
/// `others`는 그룹의 나머지 세그먼트 전부. 각 세그먼트는 실제 길이 그대로
/// 넘기면 되고 (마지막 세그먼트가 짧아도 됨), 결과는 `missing_len`으로 잘림
pub fn reconstruct<'a, I>(parity: &[u8], others: I, missing_len: usize) -> Bytes
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut out = BytesMut::from(parity);
    for segment in others {
        xor_into(&mut out, segment);
    }
    out.truncate(missing_len);
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments() -> Vec<Vec<u8>> {
        (0..5u8)
            .map(|i| (0..100u8).map(|b| b.wrapping_mul(31).wrapping_add(i * 7)).collect())
            .collect()
    }

    #[test]
    fn test_recover_any_single_loss() {
        let segs = segments();
        let mut acc = FecAccumulator::new(100);
        for s in &segs {
            acc.fold(s);
        }
        assert_eq!(acc.count(), 5);
        let parity = acc.take();
        assert!(acc.is_empty());

        for lost in 0..segs.len() {
            let others = segs
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != lost)
                .map(|(_, s)| s.as_slice());
            let recovered = reconstruct(&parity, others, 100);
            assert_eq!(recovered.as_ref(), segs[lost].as_slice(), "lost={}", lost);
        }
    }

    #[test]
    fn test_recover_short_final_segment() {
        let full: Vec<u8> = vec![0xA5; 100];
        let short: Vec<u8> = (0..37u8).collect();

        let mut acc = FecAccumulator::new(100);
        acc.fold(&full);
        acc.fold(&short);
        let parity = acc.take();

        // 짧은 세그먼트 손실: 실제 길이로 잘려야 함
        let recovered = reconstruct(&parity, [full.as_slice()], short.len());
        assert_eq!(recovered.as_ref(), short.as_slice());

        // 꽉 찬 세그먼트 손실: 짧은 세그먼트는 0 패딩으로 취급
        let recovered = reconstruct(&parity, [short.as_slice()], full.len());
        assert_eq!(recovered.as_ref(), full.as_slice());
    }

    #[test]
    fn test_new_group_starts_clean() {
        let mut acc = FecAccumulator::new(4);
        acc.fold(&[1, 2, 3, 4]);
        let _ = acc.take();

        acc.fold(&[9, 9]);
        assert_eq!(acc.take().as_ref(), &[9, 9, 0, 0]);

        acc.fold(&[1, 1, 1, 1]);
        acc.reset();
        acc.fold(&[5]);
        assert_eq!(acc.take().as_ref(), &[5, 0, 0, 0]);
    }
}
