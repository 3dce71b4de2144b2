//! Golomb and Rice code-word parsing with escape-symbol decoding.
//!
//! The decoder peeks a 32-bit window, counts the unary prefix (leading
//! one-bits before the first zero) and extracts the remainder group. A code
//! word whose decoded length would exceed 32 bits is rejected as corruption,
//! because the encoder never produces one.

use crate::bitreader::{BitReader, ReadState};
use crate::encode::{GolombCoder, MAX_CW_LEN, MULTI_ESCAPE_SYMBOLS};
use crate::error::CmpError;

/// Decode one Golomb/Rice code word from the stream.
///
/// # Errors
/// `DecoderCorruption` if no unary terminator appears within 32 bits, the
/// code word runs past the maximum length, or the stream ends inside it.
pub fn golomb_decode(coder: &GolombCoder, reader: &mut BitReader) -> Result<u32, CmpError> {
    let window = reader.peek(MAX_CW_LEN);
    let q = window.leading_ones();
    if q >= MAX_CW_LEN {
        return Err(CmpError::DecoderCorruption);
    }

    let log2_m = coder.log2_m();
    let m = coder.golomb_par();

    let (rem, cw_len) = if coder.is_rice() {
        let cw_len = q + 1 + log2_m;
        if cw_len > MAX_CW_LEN {
            return Err(CmpError::DecoderCorruption);
        }
        let rem = if log2_m == 0 {
            0
        } else {
            (window >> (MAX_CW_LEN - cw_len)) & ((1 << log2_m) - 1)
        };
        (rem, cw_len)
    } else {
        // Group 1: log2m remainder bits below the cutoff
        let short_len = q + 1 + log2_m;
        if short_len > MAX_CW_LEN {
            return Err(CmpError::DecoderCorruption);
        }
        let r1 = if log2_m == 0 {
            0
        } else {
            (window >> (MAX_CW_LEN - short_len)) & ((1 << log2_m) - 1)
        };
        if r1 < coder.cutoff() {
            (r1, short_len)
        } else {
            // Group 2: one extra remainder bit, offset by the cutoff
            let long_len = short_len + 1;
            if long_len > MAX_CW_LEN {
                return Err(CmpError::DecoderCorruption);
            }
            let r2 = (window >> (MAX_CW_LEN - long_len)) & ((1 << (log2_m + 1)) - 1);
            (r2 - coder.cutoff(), long_len)
        }
    };

    if reader.remaining() < cw_len as usize {
        return Err(CmpError::DecoderCorruption);
    }
    reader.consume(cw_len);
    if reader.refill() == ReadState::Overflow {
        return Err(CmpError::DecoderCorruption);
    }

    Ok(q * m + rem)
}

/// Decode one zero-escape value.
///
/// The symbol 0 marks an escape: the raw value follows in `max_bits` bits
/// and must lie at or above the spillover threshold, otherwise it would have
/// been coded directly and the stream is corrupt. In-range symbols are
/// shifted back down by one.
pub fn decode_value_zero(
    spill: u32,
    max_bits: u32,
    coder: &GolombCoder,
    reader: &mut BitReader,
) -> Result<u32, CmpError> {
    let symbol = golomb_decode(coder, reader)?;
    if symbol == 0 {
        let raw = reader.read_bits(max_bits)?;
        if raw < spill {
            return Err(CmpError::DecoderCorruption);
        }
        Ok(raw)
    } else {
        if symbol > spill {
            return Err(CmpError::DecoderCorruption);
        }
        // Remove the escape-marker shift; symbol >= 1 here
        Ok(symbol.wrapping_sub(1))
    }
}

/// Decode one multi-escape value.
///
/// Symbols at or above the spillover threshold select one of 16 escape
/// lengths; the unencoded field follows in `2*(k + 1)` bits. A field whose
/// top two bits are zero while a shorter escape index existed is rejected:
/// the encoder always picks the shortest escape, so the double encoding
/// marks corruption.
pub fn decode_value_multi(
    spill: u32,
    coder: &GolombCoder,
    reader: &mut BitReader,
) -> Result<u32, CmpError> {
    let symbol = golomb_decode(coder, reader)?;
    if symbol < spill {
        return Ok(symbol);
    }

    let escape_offset = symbol - spill;
    if escape_offset >= MULTI_ESCAPE_SYMBOLS {
        return Err(CmpError::DecoderCorruption);
    }

    let unencoded_len = 2 * (escape_offset + 1);
    let unencoded = reader.read_bits(unencoded_len)?;
    if escape_offset > 0 && (unencoded >> (unencoded_len - 2)) == 0 {
        return Err(CmpError::DecoderCorruption);
    }

    spill
        .checked_add(unencoded)
        .ok_or(CmpError::DecoderCorruption)
}
