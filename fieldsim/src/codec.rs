pub use tokio_modbus::{Address, ExceptionCode, Quantity};

/// 16-bit value stored in Modbus register.
pub type Word = u16;

/// Single Modbus coil or discrete input.
pub type Coil = bool;

/// Encode a value into Big or Little Endian-ordered `Word`s.
///
/// Big endian puts the most significant word at the lowest register address.
pub trait Encode {
    fn to_be_words(self) -> Vec<Word>;
    fn to_le_words(self) -> Vec<Word>;
}

macro_rules! impl_encode {
    ($num_type:ty) => {
        impl Encode for $num_type {
            fn to_be_words(self) -> Vec<Word> {
                self.to_be_bytes()
                    .chunks_exact(2)
                    .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
                    .collect()
            }
            fn to_le_words(self) -> Vec<Word> {
                let mut words = self.to_be_words();
                words.reverse();
                words
            }
        }
    };
}

impl_encode!(i16);
impl_encode!(i32);
impl_encode!(i64);
impl_encode!(u16);
impl_encode!(u32);
impl_encode!(u64);
impl_encode!(f32);
impl_encode!(f64);

/// Split the IEEE-754 bits of `value` into `(high, low)` words.
pub fn encode_f32(value: f32) -> (Word, Word) {
    encode_u32(value.to_bits())
}

/// Inverse of [`encode_f32`]; bit exact for every input, NaN payloads included.
pub fn decode_f32(hi: Word, lo: Word) -> f32 {
    f32::from_bits(decode_u32(hi, lo))
}

pub fn encode_u32(value: u32) -> (Word, Word) {
    ((value >> 16) as Word, (value & 0xffff) as Word)
}

pub fn decode_u32(hi: Word, lo: Word) -> u32 {
    (u32::from(hi) << 16) | u32::from(lo)
}

/// Description of a single input register block, generated by the derive macro.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterEntry {
    pub name: &'static str,
    pub addr: Address,
    pub cnt: Quantity,
    pub unit: &'static str,
}

/// Read-only view of a type as a table of input registers.
///
/// Implement it with `#[derive(InputRegisterModel)]` and `modbus` field attributes.
pub trait InputRegisterModel {
    /// Mapped register blocks sorted by address.
    const INPUT_REGISTERS: &'static [RegisterEntry];

    /// Word stored at `addr`, if any field is mapped there.
    fn input_register(&self, addr: Address) -> Option<Word>;

    /// Read `cnt` consecutive registers starting at `addr`.
    fn read_input_registers(&self, addr: Address, cnt: Quantity) -> Result<Vec<Word>, ExceptionCode> {
        (0..cnt)
            .map(|i| {
                addr.checked_add(i)
                    .and_then(|reg_addr| self.input_register(reg_addr))
                    .ok_or_else(|| {
                        log::warn!("Illegal data address: {}", u32::from(addr) + u32::from(i));
                        ExceptionCode::IllegalDataAddress
                    })
            })
            .collect()
    }
}

/// Fixed-size coil table with bounds-checked access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coils<const N: usize>([Coil; N]);

impl<const N: usize> Default for Coils<N> {
    fn default() -> Self {
        Self([false; N])
    }
}

impl<const N: usize> Coils<N> {
    pub const LEN: usize = N;

    fn check_range(addr: Address, cnt: usize) -> Result<std::ops::Range<usize>, ExceptionCode> {
        let start = usize::from(addr);
        if start + cnt > N {
            log::warn!("Illegal data address: {addr} (+{cnt})");
            return Err(ExceptionCode::IllegalDataAddress);
        }
        Ok(start..start + cnt)
    }

    /// Read `cnt` coils starting at `addr`.
    pub fn read(&self, addr: Address, cnt: Quantity) -> Result<Vec<Coil>, ExceptionCode> {
        let range = Self::check_range(addr, cnt.into())?;
        Ok(self.0[range].to_vec())
    }

    /// Write `values` starting at `addr` and return the stored values.
    pub fn write(&mut self, addr: Address, values: &[Coil]) -> Result<Vec<Coil>, ExceptionCode> {
        let range = Self::check_range(addr, values.len())?;
        self.0[range.clone()].copy_from_slice(values);
        Ok(self.0[range].to_vec())
    }

    /// Coil at `addr`, which must be below `N`.
    ///
    /// For the device's own coil constants. Client addresses go through [`Coils::read`].
    pub(crate) fn get(&self, addr: usize) -> Coil {
        debug_assert!(addr < N, "coil {addr} out of range for {N} coils");
        self.0[addr]
    }

    /// Set the coil at `addr`, which must be below `N`.
    pub(crate) fn set(&mut self, addr: usize, value: Coil) {
        debug_assert!(addr < N, "coil {addr} out of range for {N} coils");
        self.0[addr] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::InputRegisterModel;

    #[test]
    fn test_f32_words_are_high_then_low() {
        assert_eq!(encode_f32(1.0), (0x3f80, 0x0000));
        assert_eq!(encode_f32(-2.5), (0xc020, 0x0000));
        assert_eq!(decode_f32(0x4348, 0x0000), 200.0);
    }

    #[test]
    fn test_f32_round_trip_is_bit_exact() {
        for value in [
            0.0f32,
            -0.0,
            0.1,
            220.0,
            -273.15,
            f32::MIN_POSITIVE,
            f32::MAX,
            f32::MIN,
            f32::EPSILON,
            1.0e-45,
        ] {
            let (hi, lo) = encode_f32(value);
            assert_eq!(decode_f32(hi, lo).to_bits(), value.to_bits());
        }
        let nan = f32::from_bits(0x7fc0_1234);
        let (hi, lo) = encode_f32(nan);
        assert_eq!(decode_f32(hi, lo).to_bits(), 0x7fc0_1234);
    }

    #[test]
    fn test_u32_round_trip() {
        for value in [0u32, 1, 0xffff, 0x1_0000, 0xdead_beef, u32::MAX] {
            let (hi, lo) = encode_u32(value);
            assert_eq!(decode_u32(hi, lo), value);
        }
        assert_eq!(encode_u32(0x0001_0002), (1, 2));
    }

    #[test]
    fn test_generic_codec_matches_pair_helpers() {
        let (hi, lo) = encode_f32(23.5);
        assert_eq!(23.5f32.to_be_words(), vec![hi, lo]);
        assert_eq!(23.5f32.to_le_words(), vec![lo, hi]);
        assert_eq!(
            0x0102_0304_0506_0708u64.to_be_words(),
            vec![0x0102, 0x0304, 0x0506, 0x0708]
        );
        assert_eq!((-2i16).to_be_words(), vec![0xfffe]);
    }

    #[derive(InputRegisterModel)]
    struct Meter {
        #[modbus(addr = 10, ty = "u32")]
        high_first: u32,
        #[modbus(addr = 12, ty = "u32", ord = "le")]
        low_first: u32,
    }

    #[test]
    fn test_derived_word_order() {
        let meter = Meter {
            high_first: 0x0001_0002,
            low_first: 0x0001_0002,
        };
        assert_eq!(meter.read_input_registers(10, 4), Ok(vec![1, 2, 2, 1]));
        let (hi, lo) = encode_u32(meter.low_first);
        assert_eq!(decode_u32(hi, lo), meter.high_first);
    }

    #[test]
    fn test_coils_bounds() {
        let mut coils = Coils::<10>::default();
        assert_eq!(coils.write(1, &[true, false, true]), Ok(vec![true, false, true]));
        assert_eq!(coils.read(0, 4), Ok(vec![false, true, false, true]));
        assert_eq!(coils.read(0, 10).map(|c| c.len()), Ok(10));
        assert_eq!(coils.read(9, 2), Err(ExceptionCode::IllegalDataAddress));
        assert_eq!(coils.write(10, &[true]), Err(ExceptionCode::IllegalDataAddress));
        assert_eq!(coils.read(u16::MAX, 1), Err(ExceptionCode::IllegalDataAddress));
        // A rejected write leaves the table untouched.
        assert_eq!(coils.write(8, &[true, true, true]), Err(ExceptionCode::IllegalDataAddress));
        assert!(!coils.get(8));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "out of range")]
    fn test_coil_get_past_the_end_panics_in_debug() {
        Coils::<3>::default().get(3);
    }
}
