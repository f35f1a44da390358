//! 비트맵 리더
//!
//! 컬럼 존재 비트맵, NULL 비트맵, SET 값, Table-Map의 nullable 비트맵이 모두 같은
//! 규칙(바이트 내 LSB 우선, 바이트는 순서대로)을 따르므로 하나의 리더로 처리합니다.
//! SIGNEDNESS 옵션 메타데이터만 MSB 우선입니다.

/// 비트 순서
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOrder {
    /// 첫 번째 비트가 바이트의 최하위 비트
    Lsb0,
    /// 첫 번째 비트가 바이트의 최상위 비트
    Msb0,
}

/// `bits`개의 비트를 담는 데 필요한 바이트 수
pub fn bitmap_byte_len(bits: usize) -> usize {
    bits.div_ceil(8)
}

/// 읽기 전용 비트맵 뷰
#[derive(Debug, Clone, Copy)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    bit_len: usize,
    order: BitOrder,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8], bit_len: usize) -> Self {
        BitReader {
            bytes,
            bit_len,
            order: BitOrder::Lsb0,
        }
    }

    pub fn msb_first(bytes: &'a [u8], bit_len: usize) -> Self {
        BitReader {
            bytes,
            bit_len,
            order: BitOrder::Msb0,
        }
    }

    pub fn len(&self) -> usize {
        self.bit_len
    }

    pub fn is_empty(&self) -> bool {
        self.bit_len == 0
    }

    /// 범위를 벗어난 비트는 0으로 취급
    pub fn get(&self, idx: usize) -> bool {
        if idx >= self.bit_len {
            return false;
        }
        let Some(byte) = self.bytes.get(idx / 8) else {
            return false;
        };
        let mask = match self.order {
            BitOrder::Lsb0 => 1u8 << (idx % 8),
            BitOrder::Msb0 => 0x80u8 >> (idx % 8),
        };
        byte & mask != 0
    }

    pub fn count_ones(&self) -> usize {
        (0..self.bit_len).filter(|&i| self.get(i)).count()
    }

    /// 설정된 비트의 인덱스를 오름차순으로 반환
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + 'a {
        let reader = *self;
        (0..reader.bit_len).filter(move |&i| reader.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmap_byte_len() {
        assert_eq!(bitmap_byte_len(0), 0);
        assert_eq!(bitmap_byte_len(1), 1);
        assert_eq!(bitmap_byte_len(8), 1);
        assert_eq!(bitmap_byte_len(9), 2);
        assert_eq!(bitmap_byte_len(26), 4);
    }

    #[test]
    fn test_lsb_first_across_bytes() {
        let bytes = [0b0000_0101, 0b1000_0001];
        let bits = BitReader::new(&bytes, 16);
        assert!(bits.get(0));
        assert!(!bits.get(1));
        assert!(bits.get(2));
        assert!(bits.get(8));
        assert!(bits.get(15));
        assert!(!bits.get(14));
        assert_eq!(bits.count_ones(), 4);
        assert_eq!(bits.iter_ones().collect::<Vec<_>>(), vec![0, 2, 8, 15]);
    }

    #[test]
    fn test_bit_len_masks_trailing_bits() {
        // 5개 컬럼만 유효, 상위 비트는 무시
        let bytes = [0xff];
        let bits = BitReader::new(&bytes, 5);
        assert_eq!(bits.count_ones(), 5);
        assert!(!bits.get(5));
        assert!(!bits.get(100));
    }

    #[test]
    fn test_msb_first() {
        let bytes = [0b1010_0000, 0b1000_0000];
        let bits = BitReader::msb_first(&bytes, 9);
        assert!(bits.get(0));
        assert!(!bits.get(1));
        assert!(bits.get(2));
        assert!(bits.get(8));
        assert_eq!(bits.count_ones(), 3);
    }

    #[test]
    fn test_short_buffer() {
        let bits = BitReader::new(&[0x01], 16);
        assert!(bits.get(0));
        assert!(!bits.get(9));
    }
}
