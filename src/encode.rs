//! Golomb and Rice code-word generation with the two escape mechanisms.
//!
//! A code word is a unary quotient (`q` one-bits and a terminating zero)
//! followed by a binary remainder. For a Golomb parameter that is a power of
//! two the remainder is a fixed `log2(m)`-bit field (Rice form); otherwise
//! the remainder uses two groups: values below the cutoff `2^(log2m+1) - m`
//! take `log2m` bits, the rest take `log2m + 1` bits offset by the cutoff.
//!
//! Only code words up to 32 bits are ever produced; the escape mechanisms
//! keep outliers inside that bound.

use crate::bitwriter::BitWriter;
use crate::error::CmpError;

/// Longest code word the encoder will emit, in bits.
pub const MAX_CW_LEN: u32 = 32;

/// Number of escape symbols reserved by the multi-escape mechanism.
pub const MULTI_ESCAPE_SYMBOLS: u32 = MAX_CW_LEN / 2;

/// Precomputed Golomb coding parameters for one field.
#[derive(Clone, Copy, Debug)]
pub struct GolombCoder {
    /// Golomb parameter m.
    m: u32,
    /// floor(log2(m)).
    log2_m: u32,
    /// Remainder group threshold: `2^(log2m+1) - m`.
    cutoff: u32,
    /// Fast Rice path when m is a power of two.
    rice: bool,
}

impl GolombCoder {
    /// Create a coder for Golomb parameter `m` (must be >= 1).
    pub fn new(m: u32) -> Self {
        debug_assert!(m >= 1);
        let log2_m = 31 - m.leading_zeros();
        Self {
            m,
            log2_m,
            cutoff: (2u32 << log2_m) - m,
            rice: m.is_power_of_two(),
        }
    }

    /// The Golomb parameter this coder was built for.
    #[inline]
    pub fn golomb_par(&self) -> u32 {
        self.m
    }

    #[inline]
    pub(crate) fn log2_m(&self) -> u32 {
        self.log2_m
    }

    #[inline]
    pub(crate) fn cutoff(&self) -> u32 {
        self.cutoff
    }

    #[inline]
    pub(crate) fn is_rice(&self) -> bool {
        self.rice
    }

    /// Length in bits of the code word for `value`.
    pub fn code_len(&self, value: u32) -> u32 {
        let q = value / self.m;
        let r = value - q * self.m;
        if self.rice || r < self.cutoff {
            q + 1 + self.log2_m
        } else {
            q + 1 + self.log2_m + 1
        }
    }

    /// Largest value whose code word fits into [`MAX_CW_LEN`] bits.
    ///
    /// The longest usable quotient is `31 - log2m`, and with it only group-1
    /// remainders (below the cutoff) still fit.
    pub fn max_symbol(&self) -> u32 {
        (MAX_CW_LEN - 1 - self.log2_m) * self.m + self.cutoff - 1
    }

    /// Append the code word for `value` to the stream.
    ///
    /// # Errors
    /// `Internal` if the code word would exceed 32 bits (the parameter
    /// validation layer prevents this for in-range symbols).
    pub fn encode(&self, value: u32, writer: &mut BitWriter) -> Result<(), CmpError> {
        let q = value / self.m;
        let r = value - q * self.m;

        let (rem, rem_len) = if self.rice || r < self.cutoff {
            (r, self.log2_m)
        } else {
            (r + self.cutoff, self.log2_m + 1)
        };

        let cw_len = q + 1 + rem_len;
        if cw_len > MAX_CW_LEN {
            return Err(CmpError::Internal);
        }

        // q one-bits, the zero terminator, then the remainder
        let unary = if q == 0 { 0 } else { ((1u32 << q) - 1) << 1 };
        if rem_len == 0 {
            writer.put(unary, cw_len)
        } else {
            writer.put((unary << rem_len) | rem, cw_len)
        }
    }
}

/// Encode a mapped residual with the zero-escape mechanism.
///
/// In-range residuals are shifted up by one so that the symbol 0 is free to
/// act as the escape marker; a residual at or above the spillover threshold
/// is stored as the escape marker followed by the raw value in `max_bits`
/// bits.
pub fn encode_value_zero(
    value: u32,
    spill: u32,
    max_bits: u32,
    coder: &GolombCoder,
    writer: &mut BitWriter,
) -> Result<(), CmpError> {
    if value >= spill {
        coder.encode(0, writer)?;
        writer.put(value, max_bits)
    } else {
        coder.encode(value + 1, writer)
    }
}

/// Encode a mapped residual with the multi-escape mechanism.
///
/// Residuals below the spillover threshold are coded directly. An outlier
/// `value` is coded as the escape symbol `spill + k` followed by
/// `value - spill` in `2*(k + 1)` raw bits, so the escape field grows
/// logarithmically with the outlier magnitude.
pub fn encode_value_multi(
    value: u32,
    spill: u32,
    coder: &GolombCoder,
    writer: &mut BitWriter,
) -> Result<(), CmpError> {
    if value < spill {
        return coder.encode(value, writer);
    }

    let unencoded = value - spill;
    let unencoded_len = if unencoded == 0 {
        2
    } else {
        ((31 - unencoded.leading_zeros()) / 2 + 1) * 2
    };
    let escape_offset = unencoded_len / 2 - 1;

    coder.encode(spill + escape_offset, writer)?;
    writer.put(unencoded, unencoded_len)
}
