//! Field-by-field record codec.
//!
//! Walks the records of one collection in lock-step over the data, model and
//! updated-model buffers. Every sub-field carries its own Golomb parameter
//! and spillover threshold; the field order is fixed by the record shape's
//! table and identical on encode and decode.
//!
//! Prediction: under a model mode the model value for every sample comes
//! from the caller-supplied model buffer. Otherwise the model is 0 for the
//! first sample and the previous decoded sample after that.

use crate::bitreader::BitReader;
use crate::bitwriter::BitWriter;
use crate::decode::{decode_value_multi, decode_value_zero};
use crate::encode::{encode_value_multi, encode_value_zero, GolombCoder};
use crate::error::CmpError;
use crate::params::{Escape, GolombPair, MIN_SPILL};
use crate::records::{read_be, write_be, DataType, MAX_RECORD_FIELDS};
use crate::registry::FieldWidths;
use crate::transform::{
    map_from_pos, map_to_pos, reconstruct, round_fwd, round_inv, width_mask, ModelUpdateFn,
};

/// Per-collection coding configuration.
pub(crate) struct FieldCodec<'a> {
    pub escape: Escape,
    pub use_model: bool,
    pub lossy: u32,
    pub model_weight: u8,
    /// Parameter pairs indexed by entity header slot.
    pub pairs: [GolombPair; 6],
    pub widths: &'a FieldWidths,
    pub model_update: ModelUpdateFn,
}

impl FieldCodec<'_> {
    /// Build the per-field coders, rejecting unusable parameter pairs.
    fn coders_for(&self, ty: DataType) -> Result<[GolombCoder; MAX_RECORD_FIELDS], CmpError> {
        let mut coders = [GolombCoder::new(1); MAX_RECORD_FIELDS];
        for (i, f) in ty.fields().iter().enumerate() {
            let pair = self.pairs[f.slot];
            if pair.golomb == 0 || pair.spill < MIN_SPILL {
                return Err(CmpError::EntityHeaderInvalid("field parameter pair"));
            }
            coders[i] = GolombCoder::new(pair.golomb);
        }
        Ok(coders)
    }

    fn model_at(
        &self,
        model: Option<&[u8]>,
        off: usize,
        bytes: usize,
    ) -> Result<u32, CmpError> {
        match model {
            Some(m) => Ok(read_be(m, off, bytes)),
            None => Err(CmpError::MissingBuffer("model")),
        }
    }

    /// Encode every record of one collection payload.
    pub(crate) fn encode_records(
        &self,
        ty: DataType,
        data: &[u8],
        model: Option<&[u8]>,
        mut updated_model: Option<&mut [u8]>,
        writer: &mut BitWriter,
    ) -> Result<(), CmpError> {
        let record_size = ty.record_size();
        let fields = ty.fields();
        let coders = self.coders_for(ty)?;
        let samples = data.len() / record_size;
        let mut prev = [0u32; MAX_RECORD_FIELDS];

        for i in 0..samples {
            let base = i * record_size;
            for (j, f) in fields.iter().enumerate() {
                let off = base + f.offset;
                let raw = read_be(data, off, f.bytes);
                let width = self.widths.bits(f.width);
                let spill = self.pairs[f.slot].spill;

                let model_val = if self.use_model {
                    self.model_at(model, off, f.bytes)?
                } else if i == 0 {
                    0
                } else {
                    prev[j]
                };

                let data_r = round_fwd(raw, self.lossy);
                let model_r = round_fwd(model_val, self.lossy);
                let mapped = map_to_pos(data_r.wrapping_sub(model_r), width);
                match self.escape {
                    Escape::Zero => encode_value_zero(mapped, spill, width, &coders[j], writer)?,
                    Escape::Multi => encode_value_multi(mapped, spill, &coders[j], writer)?,
                }

                // The decoder reconstructs the value after the lossy round
                // trip; prediction state and model updates must use it too.
                let recon = reconstruct(raw, self.lossy, width);
                if self.use_model {
                    if let Some(upd) = updated_model.as_deref_mut() {
                        let updated =
                            (self.model_update)(recon, model_val, self.model_weight, self.lossy);
                        write_be(upd, off, f.bytes, updated);
                    }
                }
                prev[j] = recon;
            }
        }

        Ok(())
    }

    /// Decode `samples` records of one collection payload.
    pub(crate) fn decode_records(
        &self,
        ty: DataType,
        samples: usize,
        model: Option<&[u8]>,
        mut dst: Option<&mut [u8]>,
        mut updated_model: Option<&mut [u8]>,
        reader: &mut BitReader,
    ) -> Result<(), CmpError> {
        let record_size = ty.record_size();
        let fields = ty.fields();
        let coders = self.coders_for(ty)?;
        let mut prev = [0u32; MAX_RECORD_FIELDS];

        for i in 0..samples {
            let base = i * record_size;
            for (j, f) in fields.iter().enumerate() {
                let off = base + f.offset;
                let width = self.widths.bits(f.width);
                let spill = self.pairs[f.slot].spill;

                let mapped = match self.escape {
                    Escape::Zero => decode_value_zero(spill, width, &coders[j], reader)?,
                    Escape::Multi => decode_value_multi(spill, &coders[j], reader)?,
                };

                let model_val = if self.use_model {
                    self.model_at(model, off, f.bytes)?
                } else if i == 0 {
                    0
                } else {
                    prev[j]
                };

                let model_r = round_fwd(model_val, self.lossy);
                let diff = map_from_pos(mapped, width);
                let decoded = round_inv(diff.wrapping_add(model_r) & width_mask(width), self.lossy)
                    & width_mask(width);

                if let Some(out) = dst.as_deref_mut() {
                    write_be(out, off, f.bytes, decoded);
                }
                if self.use_model {
                    if let Some(upd) = updated_model.as_deref_mut() {
                        let updated =
                            (self.model_update)(decoded, model_val, self.model_weight, self.lossy);
                        write_be(upd, off, f.bytes, updated);
                    }
                }
                prev[j] = decoded;
            }
        }

        Ok(())
    }

    /// Run the model update over a collection stored verbatim.
    ///
    /// A raw-stored collection decodes to its exact input bytes, so both
    /// sides feed the stored values straight into the update function.
    pub(crate) fn update_models_verbatim(
        &self,
        ty: DataType,
        data: &[u8],
        model: Option<&[u8]>,
        updated_model: Option<&mut [u8]>,
    ) -> Result<(), CmpError> {
        if !self.use_model {
            return Ok(());
        }
        let Some(upd) = updated_model else {
            return Ok(());
        };

        let record_size = ty.record_size();
        let samples = data.len() / record_size;
        for i in 0..samples {
            let base = i * record_size;
            for f in ty.fields() {
                let off = base + f.offset;
                let raw = read_be(data, off, f.bytes);
                let model_val = self.model_at(model, off, f.bytes)?;
                let updated = (self.model_update)(raw, model_val, self.model_weight, self.lossy);
                write_be(upd, off, f.bytes, updated);
            }
        }
        Ok(())
    }
}
