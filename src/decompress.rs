//! Entity decompression: header parsing and the mirrored decode walk.
//!
//! The entity header is consulted first to recover every parameter of the
//! compression run; the payload is then walked collection by collection. A
//! prefix equal to the collection's data length marks a verbatim-stored
//! collection. Passing no destination buffer performs the full validation
//! and decode walk for sizing only.

use log::warn;

use crate::bitreader::BitReader;
use crate::compress::SIZE_PREFIX_LEN;
use crate::context::CodecContext;
use crate::entity::Entity;
use crate::error::CmpError;
use crate::fields::FieldCodec;
use crate::params::{CmpMode, GolombPair, MAX_LOSSY_PAR, MAX_MODEL_WEIGHT};
use crate::records::{read_be, ChunkClass, CollectionHeader, DataType, COLLECTION_HDR_SIZE};
use crate::registry;

/// Reconstruct the parameter pairs recorded in the entity header.
fn header_pairs(ent: &Entity, class: ChunkClass) -> Result<[GolombPair; 6], CmpError> {
    let zero = GolombPair::default();
    if class == ChunkClass::Imagette {
        Ok([ent.imagette_pair()?, zero, zero, zero, zero, zero])
    } else {
        Ok([
            ent.slot_pair(0)?,
            ent.slot_pair(1)?,
            ent.slot_pair(2)?,
            ent.slot_pair(3)?,
            ent.slot_pair(4)?,
            ent.slot_pair(5)?,
        ])
    }
}

/// Decompress an entity back into the original chunk.
///
/// # Arguments
/// * `ctx` - Codec context (model-update function)
/// * `entity_buf` - Entity as produced by [`crate::compress_chunk`]
/// * `model` - Model chunk used during compression; required by model modes
/// * `updated_model` - Optional buffer receiving the updated model chunk
/// * `dst` - Destination for the decompressed chunk, or `None` for sizing
///
/// # Returns
/// The decompressed chunk size in bytes.
pub fn decompress_entity(
    ctx: &CodecContext,
    entity_buf: &[u8],
    model: Option<&[u8]>,
    mut updated_model: Option<&mut [u8]>,
    mut dst: Option<&mut [u8]>,
) -> Result<u32, CmpError> {
    let ent = Entity::new(entity_buf)?;
    let (data_type, raw) = ent.data_type()?;
    let mode =
        CmpMode::from_wire(ent.mode_wire()).ok_or(CmpError::EntityHeaderInvalid("mode"))?;
    if mode.is_raw() != raw {
        return Err(CmpError::EntityHeaderInvalid("raw flag vs mode"));
    }

    let original_size = ent.original_size();
    let payload = ent.payload()?;

    if let Some(out) = dst.as_deref() {
        if out.len() < original_size {
            return Err(CmpError::BufferTooSmall);
        }
    }

    if raw {
        if payload.len() != original_size {
            warn!(
                "raw entity payload is {} bytes, header claims {}",
                payload.len(),
                original_size
            );
            return Err(CmpError::DecoderCorruption);
        }
        if let Some(out) = dst.as_deref_mut() {
            out[..original_size].copy_from_slice(payload);
        }
        return Ok(original_size as u32);
    }

    let weight = ent.model_weight();
    if weight > MAX_MODEL_WEIGHT {
        return Err(CmpError::EntityHeaderInvalid("model weight"));
    }
    let lossy = ent.lossy_par();
    if lossy > MAX_LOSSY_PAR {
        return Err(CmpError::EntityHeaderInvalid("lossy parameter"));
    }
    let widths = registry::max_bits_for(ent.registry_version())
        .ok_or(CmpError::EntityHeaderInvalid("max-bits registry version"))?;

    if mode.is_model() {
        let model_buf = model.ok_or(CmpError::MissingBuffer("model"))?;
        if model_buf.len() != original_size {
            return Err(CmpError::BufferSizeMismatch {
                name: "model",
                expected: original_size,
                actual: model_buf.len(),
            });
        }
        if let Some(upd) = updated_model.as_deref() {
            if upd.len() != original_size {
                return Err(CmpError::BufferSizeMismatch {
                    name: "updated model",
                    expected: original_size,
                    actual: upd.len(),
                });
            }
        }
    }

    let class = data_type.class();
    let codec = FieldCodec {
        escape: mode.escape().ok_or(CmpError::Internal)?,
        use_model: mode.is_model(),
        lossy: u32::from(lossy),
        model_weight: weight,
        pairs: header_pairs(&ent, class)?,
        widths,
        model_update: ctx.model_update,
    };

    let mut pos = 0;
    let mut out_off = 0;

    while out_off < original_size {
        if pos + SIZE_PREFIX_LEN + COLLECTION_HDR_SIZE > payload.len() {
            return Err(CmpError::DecoderCorruption);
        }
        let prefix = read_be(payload, pos, SIZE_PREFIX_LEN) as usize;
        let hdr_bytes = &payload[pos + SIZE_PREFIX_LEN..pos + SIZE_PREFIX_LEN + COLLECTION_HDR_SIZE];
        let hdr = CollectionHeader::parse(hdr_bytes)?;
        let ty = DataType::from_subservice(hdr.subservice)
            .ok_or(CmpError::CollectionSubserviceUnsupported(hdr.subservice))?;
        if ty.class() != class {
            return Err(CmpError::ChunkSubserviceInconsistent(hdr.subservice));
        }
        if hdr.data_len % ty.record_size() != 0 {
            return Err(CmpError::CollectionSizeInconsistent {
                data_len: hdr.data_len,
                record_size: ty.record_size(),
            });
        }
        if out_off + COLLECTION_HDR_SIZE + hdr.data_len > original_size {
            return Err(CmpError::DecoderCorruption);
        }

        let data_off = out_off + COLLECTION_HDR_SIZE;
        if let Some(out) = dst.as_deref_mut() {
            out[out_off..data_off].copy_from_slice(hdr_bytes);
        }
        if codec.use_model {
            if let Some(upd) = updated_model.as_deref_mut() {
                upd[out_off..data_off].copy_from_slice(hdr_bytes);
            }
        }

        let payload_pos = pos + SIZE_PREFIX_LEN + COLLECTION_HDR_SIZE;
        let model_col = model.map(|m| &m[data_off..data_off + hdr.data_len]);

        if prefix == hdr.data_len {
            // Stored verbatim by the raw fallback
            if payload_pos + hdr.data_len > payload.len() {
                return Err(CmpError::DecoderCorruption);
            }
            let data = &payload[payload_pos..payload_pos + hdr.data_len];
            if let Some(out) = dst.as_deref_mut() {
                out[data_off..data_off + hdr.data_len].copy_from_slice(data);
            }
            let upd_col = updated_model
                .as_deref_mut()
                .map(|u| &mut u[data_off..data_off + hdr.data_len]);
            codec.update_models_verbatim(ty, data, model_col, upd_col)?;
            pos = payload_pos + hdr.data_len;
        } else if prefix > hdr.data_len {
            return Err(CmpError::DecoderCorruption);
        } else {
            if payload_pos + prefix > payload.len() {
                return Err(CmpError::DecoderCorruption);
            }
            let mut reader = BitReader::new(&payload[payload_pos..payload_pos + prefix]);
            let samples = hdr.data_len / ty.record_size();
            let dst_col = dst
                .as_deref_mut()
                .map(|o| &mut o[data_off..data_off + hdr.data_len]);
            let upd_col = updated_model
                .as_deref_mut()
                .map(|u| &mut u[data_off..data_off + hdr.data_len]);
            codec.decode_records(ty, samples, model_col, dst_col, upd_col, &mut reader)?;
            pos = payload_pos + prefix;
        }

        out_off = data_off + hdr.data_len;
    }

    // Only the zero padding to the 4-byte boundary may remain
    if payload.len() - pos >= 4 {
        return Err(CmpError::DecoderCorruption);
    }

    Ok(original_size as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::compress_chunk;
    use crate::params::ChunkParams;
    use crate::records::write_be;

    fn fixed_now() -> u64 {
        0x0000_0012_3456
    }

    fn keep_model(_decoded: u32, model: u32, _weight: u8, _lossy: u32) -> u32 {
        model
    }

    fn ctx() -> CodecContext {
        CodecContext::new(0x0100, fixed_now, keep_model)
    }

    fn s_fx_chunk() -> Vec<u8> {
        let hdr = CollectionHeader {
            timestamp: 0x200,
            config_id: 2,
            packet_type: 0,
            subservice: 3,
            ccd_id: 1,
            sequence: 9,
            data_len: 20,
        };
        let mut chunk = vec![0u8; COLLECTION_HDR_SIZE + 20];
        hdr.write_to(&mut chunk).unwrap();
        for (i, fx) in [1000u32, 1012, 998, 1031].iter().enumerate() {
            chunk[COLLECTION_HDR_SIZE + i * 5] = 3;
            write_be(&mut chunk, COLLECTION_HDR_SIZE + i * 5 + 1, 4, *fx);
        }
        chunk
    }

    #[test]
    fn test_round_trip() {
        let chunk = s_fx_chunk();
        let params = ChunkParams::default();

        // A dirty destination buffer must not leak into the entity
        let mut entity = vec![0xAAu8; 512];
        let size =
            compress_chunk(&ctx(), &chunk, None, None, Some(&mut entity), &params).unwrap();
        entity.truncate(size as usize);

        let mut out = vec![0u8; chunk.len()];
        let got = decompress_entity(&ctx(), &entity, None, None, Some(&mut out)).unwrap();
        assert_eq!(got as usize, chunk.len());
        assert_eq!(out, chunk);
    }

    #[test]
    fn test_sizing_run_validates_without_writing() {
        let chunk = s_fx_chunk();
        let params = ChunkParams::default();

        let mut entity = vec![0u8; 512];
        let size =
            compress_chunk(&ctx(), &chunk, None, None, Some(&mut entity), &params).unwrap();
        entity.truncate(size as usize);

        let got = decompress_entity(&ctx(), &entity, None, None, None).unwrap();
        assert_eq!(got as usize, chunk.len());
    }

    #[test]
    fn test_truncated_entity_rejected() {
        let chunk = s_fx_chunk();
        let params = ChunkParams::default();

        let mut entity = vec![0u8; 512];
        let size =
            compress_chunk(&ctx(), &chunk, None, None, Some(&mut entity), &params).unwrap();
        entity.truncate(size as usize - 1);

        let mut out = vec![0u8; chunk.len()];
        assert!(decompress_entity(&ctx(), &entity, None, None, Some(&mut out)).is_err());
    }

    #[test]
    fn test_destination_too_small() {
        let chunk = s_fx_chunk();
        let params = ChunkParams::default();

        let mut entity = vec![0u8; 512];
        let size =
            compress_chunk(&ctx(), &chunk, None, None, Some(&mut entity), &params).unwrap();
        entity.truncate(size as usize);

        let mut out = vec![0u8; chunk.len() - 1];
        assert!(matches!(
            decompress_entity(&ctx(), &entity, None, None, Some(&mut out)),
            Err(CmpError::BufferTooSmall)
        ));
    }

    #[test]
    fn test_rejects_mode_raw_flag_mismatch() {
        let chunk = s_fx_chunk();
        let params = ChunkParams::default();

        let mut entity = vec![0u8; 512];
        let size =
            compress_chunk(&ctx(), &chunk, None, None, Some(&mut entity), &params).unwrap();
        entity.truncate(size as usize);

        // Flip the raw flag without changing the mode
        entity[20] |= 0x80;
        assert!(matches!(
            decompress_entity(&ctx(), &entity, None, None, None),
            Err(CmpError::EntityHeaderInvalid(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_mode() {
        let chunk = s_fx_chunk();
        let params = ChunkParams::default();

        let mut entity = vec![0u8; 512];
        let size =
            compress_chunk(&ctx(), &chunk, None, None, Some(&mut entity), &params).unwrap();
        entity.truncate(size as usize);

        entity[22] = 99;
        assert!(matches!(
            decompress_entity(&ctx(), &entity, None, None, None),
            Err(CmpError::EntityHeaderInvalid("mode"))
        ));
    }
}
