//! Compression parameter set and its validation.
//!
//! The Golomb parameter and spillover threshold of every field jointly bound
//! the legally encodable residual range; violating the bound is a
//! configuration error caught here, never a runtime error inside the coding
//! loops.

use crate::encode::{GolombCoder, MULTI_ESCAPE_SYMBOLS};
use crate::error::CmpError;
use crate::records::ChunkClass;
use crate::registry;

/// Maximum model weight (a weight of n blends n/16 model, (16-n)/16 data).
pub const MAX_MODEL_WEIGHT: u8 = 16;

/// Maximum lossy rounding parameter (bits discarded per sample).
pub const MAX_LOSSY_PAR: u16 = 3;

/// Minimum spillover threshold for every mode.
pub const MIN_SPILL: u32 = 2;

/// Largest Golomb parameter storable in the imagette entity header.
pub const MAX_IMA_GOLOMB_PAR: u32 = 0xFF;

/// Largest Golomb parameter storable in the non-imagette entity header.
pub const MAX_GOLOMB_PAR: u32 = 0xFFFF;

/// Largest spillover threshold storable in the imagette entity header.
pub const MAX_IMA_SPILL_STORED: u32 = 0xFFFF;

/// Largest spillover threshold storable in the non-imagette entity header.
pub const MAX_SPILL_STORED: u32 = 0x00FF_FFFF;

/// Chunk-wide compression mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum CmpMode {
    /// Store the chunk verbatim.
    Raw = 0,
    /// Model prediction with the zero-escape mechanism.
    ModelZero = 1,
    /// Previous-sample prediction with the zero-escape mechanism.
    DiffZero = 2,
    /// Model prediction with the multi-escape mechanism.
    ModelMulti = 3,
    /// Previous-sample prediction with the multi-escape mechanism.
    DiffMulti = 4,
}

/// Outlier escape mechanism selected by the compression mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Escape {
    Zero,
    Multi,
}

impl CmpMode {
    /// Resolve the wire value from an entity header.
    pub fn from_wire(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Raw,
            1 => Self::ModelZero,
            2 => Self::DiffZero,
            3 => Self::ModelMulti,
            4 => Self::DiffMulti,
            _ => return None,
        })
    }

    /// Wire value for the entity header.
    #[inline]
    pub fn to_wire(self) -> u8 {
        self as u8
    }

    /// Whether this mode predicts from a caller-supplied model buffer.
    #[inline]
    pub fn is_model(self) -> bool {
        matches!(self, Self::ModelZero | Self::ModelMulti)
    }

    /// Whether this mode stores the chunk verbatim.
    #[inline]
    pub fn is_raw(self) -> bool {
        matches!(self, Self::Raw)
    }

    /// Escape mechanism used by this mode, `None` for raw.
    pub fn escape(self) -> Option<Escape> {
        match self {
            Self::Raw => None,
            Self::ModelZero | Self::DiffZero => Some(Escape::Zero),
            Self::ModelMulti | Self::DiffMulti => Some(Escape::Multi),
        }
    }
}

/// Golomb parameter and spillover threshold for one field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GolombPair {
    /// Golomb parameter m (1-65535).
    pub golomb: u32,
    /// Spillover threshold.
    pub spill: u32,
}

impl GolombPair {
    pub const fn new(golomb: u32, spill: u32) -> Self {
        Self { golomb, spill }
    }
}

/// Largest valid spillover threshold for a Golomb parameter and escape
/// mechanism, limited by the 32-bit code-word length.
///
/// Zero-escape codes the shifted symbol `spill` itself; multi-escape must
/// still be able to code the highest escape symbol `spill + 15`.
pub fn max_spill(golomb: u32, escape: Escape) -> u32 {
    let max_symbol = GolombCoder::new(golomb).max_symbol();
    match escape {
        Escape::Zero => max_symbol,
        Escape::Multi => max_symbol.saturating_sub(MULTI_ESCAPE_SYMBOLS - 1),
    }
}

/// Chunk-wide compression parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkParams {
    pub mode: CmpMode,
    /// Model weight 0-16.
    pub model_weight: u8,
    /// Lossy rounding parameter; 0 is lossless.
    pub lossy_par: u16,
    /// Max-bits registry version the incoming data conforms to.
    pub registry_version: u8,
    /// Imagette pixel pair.
    pub imagette: GolombPair,
    /// Adaptive imagette side pairs; selects the adaptive entity type.
    pub imagette_adaptive: Option<[GolombPair; 2]>,
    pub exp_flags: GolombPair,
    pub fx: GolombPair,
    pub ncob: GolombPair,
    pub efx: GolombPair,
    pub ecob: GolombPair,
    pub mean: GolombPair,
    pub variance: GolombPair,
    pub outliers: GolombPair,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            mode: CmpMode::DiffZero,
            model_weight: 8,
            lossy_par: 0,
            registry_version: registry::REGISTRY_VERSION_DEFAULT,
            imagette: GolombPair::new(4, 60),
            imagette_adaptive: None,
            exp_flags: GolombPair::new(2, 10),
            fx: GolombPair::new(4, 60),
            ncob: GolombPair::new(4, 60),
            efx: GolombPair::new(8, 100),
            ecob: GolombPair::new(8, 100),
            mean: GolombPair::new(4, 60),
            variance: GolombPair::new(8, 100),
            outliers: GolombPair::new(2, 10),
        }
    }
}

fn check_pair(
    pair: GolombPair,
    escape: Escape,
    max_golomb: u32,
    max_stored: u32,
    label: &'static str,
) -> Result<(), CmpError> {
    if pair.golomb == 0 || pair.golomb > max_golomb {
        return Err(CmpError::InvalidFieldParams(label));
    }
    if pair.spill < MIN_SPILL
        || pair.spill > max_stored
        || pair.spill > max_spill(pair.golomb, escape)
    {
        return Err(CmpError::InvalidFieldParams(label));
    }
    Ok(())
}

impl ChunkParams {
    /// Validate the parameter set for a chunk of the given class.
    ///
    /// Only the pairs the class actually uses are checked, so one parameter
    /// struct can serve several instrument configurations.
    pub fn validate(&self, class: ChunkClass) -> Result<(), CmpError> {
        if self.model_weight > MAX_MODEL_WEIGHT {
            return Err(CmpError::InvalidParams("model weight"));
        }
        if self.lossy_par > MAX_LOSSY_PAR {
            return Err(CmpError::InvalidParams("lossy parameter"));
        }
        if registry::max_bits_for(self.registry_version).is_none() {
            return Err(CmpError::InvalidParams("max-bits registry version"));
        }

        let Some(escape) = self.mode.escape() else {
            return Ok(()); // raw mode uses no pairs
        };

        match class {
            ChunkClass::Imagette => {
                check_pair(
                    self.imagette,
                    escape,
                    MAX_IMA_GOLOMB_PAR,
                    MAX_IMA_SPILL_STORED,
                    "imagette",
                )?;
                if let Some([ap1, ap2]) = self.imagette_adaptive {
                    check_pair(
                        ap1,
                        escape,
                        MAX_IMA_GOLOMB_PAR,
                        MAX_IMA_SPILL_STORED,
                        "adaptive 1",
                    )?;
                    check_pair(
                        ap2,
                        escape,
                        MAX_IMA_GOLOMB_PAR,
                        MAX_IMA_SPILL_STORED,
                        "adaptive 2",
                    )?;
                }
            }
            ChunkClass::ShortCadence | ChunkClass::LongCadence => {
                check_pair(self.exp_flags, escape, MAX_GOLOMB_PAR, MAX_SPILL_STORED, "exp_flags")?;
                check_pair(self.fx, escape, MAX_GOLOMB_PAR, MAX_SPILL_STORED, "fx")?;
                check_pair(self.ncob, escape, MAX_GOLOMB_PAR, MAX_SPILL_STORED, "ncob")?;
                check_pair(self.efx, escape, MAX_GOLOMB_PAR, MAX_SPILL_STORED, "efx")?;
                check_pair(self.ecob, escape, MAX_GOLOMB_PAR, MAX_SPILL_STORED, "ecob")?;
            }
            ChunkClass::FastCadence => {
                check_pair(self.fx, escape, MAX_GOLOMB_PAR, MAX_SPILL_STORED, "fx")?;
                check_pair(self.ncob, escape, MAX_GOLOMB_PAR, MAX_SPILL_STORED, "ncob")?;
                check_pair(self.efx, escape, MAX_GOLOMB_PAR, MAX_SPILL_STORED, "efx")?;
                check_pair(self.ecob, escape, MAX_GOLOMB_PAR, MAX_SPILL_STORED, "ecob")?;
            }
            ChunkClass::Auxiliary => {
                check_pair(self.mean, escape, MAX_GOLOMB_PAR, MAX_SPILL_STORED, "mean")?;
                check_pair(self.variance, escape, MAX_GOLOMB_PAR, MAX_SPILL_STORED, "variance")?;
                check_pair(self.outliers, escape, MAX_GOLOMB_PAR, MAX_SPILL_STORED, "outliers")?;
            }
        }

        Ok(())
    }

    /// Parameter pairs arranged by entity header slot for the given class.
    ///
    /// Unused slots are zero pairs.
    pub(crate) fn slot_pairs(&self, class: ChunkClass) -> [GolombPair; 6] {
        let zero = GolombPair::default();
        match class {
            ChunkClass::Imagette => [self.imagette, zero, zero, zero, zero, zero],
            ChunkClass::ShortCadence | ChunkClass::LongCadence => {
                [self.exp_flags, self.fx, self.ncob, self.efx, self.ecob, zero]
            }
            ChunkClass::FastCadence => [zero, self.fx, self.ncob, self.efx, self.ecob, zero],
            ChunkClass::Auxiliary => [self.mean, self.variance, self.outliers, zero, zero, zero],
        }
    }
}
