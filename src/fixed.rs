//! Fixed-point register values
//!
//! Every register, the accumulators and all instruction coefficients
//! share one storage format: a signed 32-bit integer holding S8.23. The
//! Q-format a value was imported with is remembered so it can be exported
//! again bit-exactly, but arithmetic always happens on the S8.23 raw value.
//!
//! Arithmetic saturates to the 24-bit range of the chip's datapath,
//! `[-1.0, 1.0)`. Saturation can be switched off per value to compare
//! against an unclamped reference; clamp events are counted either way.
//!
//! # Literature
//!
//! - FV-1 datasheet, "Instruction set" and "Number formats"
//! - <https://en.wikipedia.org/wiki/Q_(number_format)>

use save_state::InSaveState;
use save_state_macro::InSaveState;

/// Fraction bits of the internal representation
pub const FRAC_BITS: u8 = 23;
/// Integer bits of the internal representation
pub const INT_BITS: u8 = 8;
/// Largest raw value of the 24-bit datapath
pub const MAX_24: i32 = (1 << 23) - 1;
/// Smallest raw value of the 24-bit datapath
pub const MIN_24: i32 = -(1 << 23);

const ONE: f64 = (1u32 << FRAC_BITS) as f64;

/// Sign-extend the lowest `width` bits of `bits`
pub const fn sign_extend(bits: u32, width: u32) -> i32 {
    if width == 0 {
        0
    } else if width >= 32 {
        bits as i32
    } else {
        let shift = 32 - width;
        ((bits << shift) as i32) >> shift
    }
}

/// A mask covering the lowest `width` bits
pub const fn bit_mask(width: u32) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1 << width) - 1
    }
}

/// A signed Q-format `S<int>.<frac>`, the sign bit is not counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QFormat {
    pub int_bits: u8,
    pub frac_bits: u8,
}

impl QFormat {
    /// The internal format
    pub const S8_23: Self = Self::new(8, 23);
    /// Delay memory and 24-bit register contents
    pub const S_23: Self = Self::new(0, 23);
    /// 16-bit coefficients (RDAX, SOF, ...)
    pub const S1_14: Self = Self::new(1, 14);
    /// 11-bit offsets of SOF
    pub const S_10: Self = Self::new(0, 10);
    /// 11-bit coefficients of the delay memory instructions
    pub const S1_9: Self = Self::new(1, 9);
    /// 11-bit offsets of LOG and EXP
    pub const S4_6: Self = Self::new(4, 6);
    /// 16-bit offsets of CHO SOF and ramp rates
    pub const S_15: Self = Self::new(0, 15);

    /// Build a format that is representable in S8.23
    ///
    /// # Panics
    ///
    /// If the format has more integer or fraction bits than the internal
    /// representation. Use [`QFormat::checked`] for untrusted input.
    pub const fn new(int_bits: u8, frac_bits: u8) -> Self {
        match Self::checked(int_bits, frac_bits) {
            Some(fmt) => fmt,
            None => panic!("Q-format does not fit into S8.23"),
        }
    }

    pub const fn checked(int_bits: u8, frac_bits: u8) -> Option<Self> {
        if int_bits <= INT_BITS && frac_bits <= FRAC_BITS {
            Some(Self {
                int_bits,
                frac_bits,
            })
        } else {
            None
        }
    }

    /// Total width including the sign bit
    pub const fn width(&self) -> u32 {
        1 + self.int_bits as u32 + self.frac_bits as u32
    }

    const fn shift(&self) -> u32 {
        (FRAC_BITS - self.frac_bits) as u32
    }
}

impl std::fmt::Display for QFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.int_bits == 0 {
            write!(f, "S.{}", self.frac_bits)
        } else {
            write!(f, "S{}.{}", self.int_bits, self.frac_bits)
        }
    }
}

impl InSaveState for QFormat {
    fn serialize(&self, state: &mut save_state::SaveStateSerializer) {
        self.int_bits.serialize(state);
        self.frac_bits.serialize(state);
    }

    fn deserialize(
        &mut self,
        state: &mut save_state::SaveStateDeserializer,
    ) -> Result<(), save_state::OutOfData> {
        let (mut i, mut f) = (0u8, 0u8);
        i.deserialize(state)?;
        f.deserialize(state)?;
        // a corrupt snapshot must not smuggle in an unrepresentable format
        *self = Self::checked(i, f).unwrap_or(Self::S8_23);
        Ok(())
    }
}

/// A fixed-point value in S8.23 together with its declared Q-format
#[derive(Debug, Clone, Copy, InSaveState)]
pub struct Fixed {
    raw: i32,
    format: QFormat,
    saturate: bool,
    /// saturation events in the computation that produced this value
    clamps: u16,
}

impl Default for Fixed {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Fixed {
    pub const ZERO: Self = Self::from_raw(0);
    /// The largest value the datapath holds, `1 - 2^-23`
    pub const MAX: Self = Self::from_raw(MAX_24);
    /// `-1.0`
    pub const MIN: Self = Self::from_raw(MIN_24);

    /// Wrap a raw S8.23 value
    pub const fn from_raw(raw: i32) -> Self {
        Self {
            raw,
            format: QFormat::S8_23,
            saturate: true,
            clamps: 0,
        }
    }

    /// Import the lowest `fmt.width()` bits of `bits` as a value in `fmt`
    pub fn from_q(bits: u32, fmt: QFormat) -> Self {
        let mut v = Self::ZERO;
        v.set_from_q(bits, fmt);
        v
    }

    pub fn from_float(f: f64) -> Self {
        let mut v = Self::ZERO;
        v.set_from_float(f);
        v
    }

    pub fn set_from_q(&mut self, bits: u32, fmt: QFormat) -> &mut Self {
        self.raw = sign_extend(bits, fmt.width()) << fmt.shift();
        self.format = fmt;
        self.clamps = 0;
        self
    }

    /// Round `f` to the nearest S8.23 value, saturating at the limits of
    /// the 32-bit container
    pub fn set_from_float(&mut self, f: f64) -> &mut Self {
        self.raw = (f * ONE).round().clamp(i32::MIN as f64, i32::MAX as f64) as i32;
        self.clamps = 0;
        self
    }

    pub fn to_float(&self) -> f64 {
        f64::from(self.raw) / ONE
    }

    /// Export the value as a bit pattern in `fmt`, truncating the lower
    /// fraction bits the way the chip does
    ///
    /// The second element is `true` if the value did not fit into `fmt`;
    /// the bit pattern is then the truncated two's complement.
    pub fn to_q(&self, fmt: QFormat) -> (u32, bool) {
        let shifted = self.raw >> fmt.shift();
        let half = 1i64 << (fmt.width() - 1);
        let fits = (-half..half).contains(&i64::from(shifted));
        (shifted as u32 & bit_mask(fmt.width()), !fits)
    }

    /// The value as a sign-extended 24-bit delay memory word
    pub fn to_sample(&self) -> (i32, bool) {
        let (bits, overflow) = self.to_q(QFormat::S_23);
        (sign_extend(bits, 24), overflow)
    }

    pub const fn raw(&self) -> i32 {
        self.raw
    }

    pub const fn format(&self) -> QFormat {
        self.format
    }

    pub fn with_format(mut self, fmt: QFormat) -> Self {
        self.format = fmt;
        self
    }

    pub fn set_saturating(&mut self, saturate: bool) -> &mut Self {
        self.saturate = saturate;
        self
    }

    pub const fn is_saturating(&self) -> bool {
        self.saturate
    }

    /// Indicate if any operation producing this value saturated
    pub const fn overflowed(&self) -> bool {
        self.clamps > 0
    }

    /// Number of saturation events since the last call, resetting the count
    pub fn take_clamps(&mut self) -> u16 {
        core::mem::take(&mut self.clamps)
    }

    fn store(&mut self, value: i64, inherited: u16) -> &mut Self {
        let in_range = (i64::from(MIN_24)..=i64::from(MAX_24)).contains(&value);
        self.clamps = self
            .clamps
            .saturating_add(inherited)
            .saturating_add(!in_range as u16);
        self.raw = if self.saturate {
            value.clamp(MIN_24.into(), MAX_24.into()) as i32
        } else {
            value.clamp(i32::MIN.into(), i32::MAX.into()) as i32
        };
        self
    }

    pub fn add(&mut self, other: Self) -> &mut Self {
        self.store(i64::from(self.raw) + i64::from(other.raw), other.clamps)
    }

    pub fn sub(&mut self, other: Self) -> &mut Self {
        self.store(i64::from(self.raw) - i64::from(other.raw), other.clamps)
    }

    /// Fixed-point multiply with a 64-bit intermediate product
    pub fn mult(&mut self, other: Self) -> &mut Self {
        let product = (i64::from(self.raw) * i64::from(other.raw)) >> FRAC_BITS;
        self.store(product, other.clamps)
    }

    pub fn abs(&mut self) -> &mut Self {
        self.store(i64::from(self.raw).abs(), 0)
    }

    fn bitwise(&mut self, f: impl FnOnce(u32) -> u32) -> &mut Self {
        self.raw = sign_extend(f(self.raw as u32) & bit_mask(24), 24);
        self
    }

    /// Bitwise AND of the 24-bit two's complement pattern with `mask`
    pub fn and(&mut self, mask: u32) -> &mut Self {
        self.bitwise(|v| v & mask)
    }

    pub fn or(&mut self, mask: u32) -> &mut Self {
        self.bitwise(|v| v | mask)
    }

    pub fn xor(&mut self, mask: u32) -> &mut Self {
        self.bitwise(|v| v ^ mask)
    }

    pub fn not(&mut self) -> &mut Self {
        self.bitwise(|v| !v)
    }

    pub const fn is_negative(&self) -> bool {
        self.raw < 0
    }

    pub const fn is_zero(&self) -> bool {
        self.raw == 0
    }

    /// Compare at the coarser of both declared precisions
    pub fn equals(&self, other: &Self) -> bool {
        let frac = self.format.frac_bits.min(other.format.frac_bits);
        self.equals_with_precision(other, frac)
    }

    /// Compare after truncating both values to `frac_bits` fraction bits
    pub fn equals_with_precision(&self, other: &Self, frac_bits: u8) -> bool {
        let shift = FRAC_BITS.saturating_sub(frac_bits);
        (self.raw >> shift) == (other.raw >> shift)
    }

    /// The larger of two values
    pub fn max(self, other: Self) -> Self {
        if other.raw > self.raw {
            other
        } else {
            self
        }
    }
}

impl PartialEq for Fixed {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl std::fmt::Display for Fixed {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let (bits, _) = self.to_q(self.format);
        write!(
            f,
            "{:.6} ({} {:#0w$x})",
            self.to_float(),
            self.format,
            bits,
            w = (self.format.width() as usize + 3) / 4 + 2
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn epsilon(fmt: QFormat) -> f64 {
        1.0 / f64::from(1u32 << fmt.frac_bits)
    }

    #[test]
    fn import_sign_extends() {
        // 0x8000 in S1.14 is -2.0
        assert_eq!(Fixed::from_q(0x8000, QFormat::S1_14).to_float(), -2.0);
        // 0x4000 in S1.14 is 1.0
        assert_eq!(Fixed::from_q(0x4000, QFormat::S1_14).to_float(), 1.0);
        // 0x3ff in S.10 is 1 - 2^-10
        assert_eq!(
            Fixed::from_q(0x3ff, QFormat::S_10).to_float(),
            1.0 - epsilon(QFormat::S_10)
        );
        // 0x7ff in S.10 has the sign bit set and is -2^-10
        assert_eq!(
            Fixed::from_q(0x7ff, QFormat::S_10).to_float(),
            -epsilon(QFormat::S_10)
        );
        // 0x400 in S4.6 is -16.0
        assert_eq!(Fixed::from_q(0x400, QFormat::S4_6).to_float(), -16.0);
        // bits above the width are ignored
        assert_eq!(Fixed::from_q(0xffff_0001, QFormat::S1_9).raw(), 1 << 14);
    }

    #[test]
    fn export_flags_values_that_do_not_fit() {
        let v = Fixed::from_float(1.5);
        assert_eq!(v.to_q(QFormat::S1_14), (0x6000, false));
        let (bits, overflow) = v.to_q(QFormat::S_10);
        assert!(overflow);
        assert_eq!(bits, 0x600);
    }

    #[test]
    fn export_truncates_towards_negative_infinity() {
        let v = Fixed::from_raw(-1);
        assert_eq!(v.to_q(QFormat::S_10), (0x7ff, false));
    }

    #[test]
    fn multiply_add_within_precision() {
        let mut v = Fixed::from_float(0.5);
        v.mult(Fixed::from_float(0.3)).add(Fixed::from_float(0.2));
        let expected = Fixed::from_float(0.5 * 0.3 + 0.2);
        assert!((v.to_float() - expected.to_float()).abs() <= epsilon(QFormat::S1_14));
        assert!(v.equals_with_precision(&expected, 14));
        assert!(!v.overflowed());
    }

    #[test]
    fn saturation_counts_every_clamp() {
        let mut v = Fixed::from_float(0.75);
        v.add(Fixed::from_float(0.5));
        assert_eq!(v, Fixed::MAX);
        v.add(Fixed::from_float(0.5));
        v.sub(Fixed::from_float(-0.5));
        assert_eq!(v.take_clamps(), 3);
        assert_eq!(v.take_clamps(), 0);

        let mut v = Fixed::from_float(-1.0);
        v.mult(Fixed::from_q(0x8000, QFormat::S1_14));
        assert_eq!(v.raw(), MAX_24);
        assert!(v.overflowed());
        v.abs();
        assert_eq!(v.raw(), MAX_24);
    }

    #[test]
    fn abs_of_minimum_saturates() {
        let mut v = Fixed::MIN;
        v.abs();
        assert_eq!(v.raw(), MAX_24);
        assert_eq!(v.take_clamps(), 1);
    }

    #[test]
    fn unclamped_reference_keeps_the_overflow() {
        let mut v = Fixed::from_float(0.75);
        v.set_saturating(false).add(Fixed::from_float(0.5));
        assert_eq!(v.to_float(), 1.25);
        assert!(v.overflowed());
    }

    #[test]
    fn operand_clamps_propagate() {
        let mut t = Fixed::from_float(0.9);
        t.add(Fixed::from_float(0.9));
        let mut acc = Fixed::ZERO;
        acc.add(t);
        assert_eq!(acc.take_clamps(), 1);
    }

    #[test]
    fn bitwise_ops_use_the_24_bit_pattern() {
        let mut v = Fixed::from_float(-0.5); // 0xc00000
        v.and(0x7f_ffff);
        assert_eq!(v.raw(), 0x40_0000);
        let mut v = Fixed::from_float(0.25);
        v.or(0x80_0000);
        assert!(v.is_negative());
        assert_eq!(v.raw(), 0x20_0000 - 0x80_0000);
        let mut v = Fixed::from_raw(0x12_3456);
        v.xor(0xff_ffff);
        assert_eq!(v.raw(), !0x12_3456);
        let mut w = Fixed::from_raw(0x12_3456);
        w.not();
        assert_eq!(v.raw(), w.raw());
        let mut v = Fixed::from_raw(0x12_3456);
        v.and(0);
        assert!(v.is_zero());
    }

    #[test]
    fn equality_uses_the_coarser_precision() {
        let coarse = Fixed::from_q(0x100, QFormat::S_10); // 0.25
        let fine = Fixed::from_raw((1 << 21) + 3).with_format(QFormat::S_23);
        assert!(coarse.equals(&fine));
        assert_eq!(coarse, fine);
        assert!(!fine.equals_with_precision(&coarse, 23));
    }

    #[test]
    fn display_shows_value_and_format() {
        let v = Fixed::from_q(0x2000, QFormat::S1_14);
        assert_eq!(v.to_string(), "0.500000 (S1.14 0x2000)");
    }

    fn formats() -> impl Strategy<Value = QFormat> {
        (0..=INT_BITS, 0..=FRAC_BITS).prop_map(|(i, f)| QFormat::new(i, f))
    }

    proptest! {
        #[test]
        fn q_format_round_trip(fmt in formats(), bits in any::<u32>()) {
            let bits = bits & bit_mask(fmt.width());
            let v = Fixed::from_q(bits, fmt);
            prop_assert_eq!(v.to_q(fmt), (bits, false));
        }

        #[test]
        fn arithmetic_stays_in_24_bits(
            a in MIN_24..=MAX_24,
            ops in proptest::collection::vec((0u8..3, MIN_24..=MAX_24), 1..16),
        ) {
            let mut v = Fixed::from_raw(a);
            let mut expected_clamps = 0u16;
            for (op, b) in ops {
                let b = Fixed::from_raw(b);
                let exact = match op {
                    0 => i64::from(v.raw()) + i64::from(b.raw()),
                    1 => i64::from(v.raw()) - i64::from(b.raw()),
                    _ => (i64::from(v.raw()) * i64::from(b.raw())) >> FRAC_BITS,
                };
                match op {
                    0 => v.add(b),
                    1 => v.sub(b),
                    _ => v.mult(b),
                };
                if !(i64::from(MIN_24)..=i64::from(MAX_24)).contains(&exact) {
                    expected_clamps += 1;
                }
                prop_assert!((MIN_24..=MAX_24).contains(&v.raw()));
            }
            prop_assert_eq!(v.take_clamps(), expected_clamps);
        }
    }
}
