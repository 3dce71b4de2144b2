//! Chunk compression: collection walk, raw fallback and entity framing.
//!
//! A chunk is compressed into one entity. The output starts with a reserved,
//! zero-filled header region; each collection follows as a 2-byte
//! compressed-size prefix, the verbatim 12-byte collection header and the
//! compressed payload. A collection whose compressed form would not be
//! smaller than the original is stored verbatim instead (prefix equal to the
//! data length). After the loop the payload is zero-padded to a 4-byte
//! boundary and the true entity size and parameter fields are patched into
//! the header.
//!
//! Passing no destination buffer runs the identical algorithm for sizing
//! only and returns exactly the byte count a real run needs.

use log::debug;

use crate::bitwriter::BitWriter;
use crate::context::CodecContext;
use crate::entity::{self, EntityMut, ENTITY_SIZE_MAX, NON_IMAGETTE_HEADER_SIZE};
use crate::error::CmpError;
use crate::fields::FieldCodec;
use crate::params::ChunkParams;
use crate::records::{
    write_be, ChunkClass, CollectionHeader, DataType, CHUNK_SIZE_MAX, COLLECTION_HDR_SIZE,
};
use crate::registry;
use crate::transform::check_timestamp;

/// Size of the per-collection compressed-size prefix in bytes.
pub(crate) const SIZE_PREFIX_LEN: usize = 2;

/// One validated collection inside a chunk.
pub(crate) struct CollectionInfo {
    /// Byte offset of the collection header inside the chunk.
    pub offset: usize,
    /// Payload length in bytes.
    pub data_len: usize,
    /// Record shape resolved from the subservice.
    pub ty: DataType,
}

/// Walk the chunk and validate its collection structure.
///
/// Walking by `header size + data length` must exactly consume the chunk;
/// every collection must map to a supported record shape of the class
/// established by the first collection.
pub(crate) fn scan_collections(chunk: &[u8]) -> Result<Vec<CollectionInfo>, CmpError> {
    if chunk.len() < COLLECTION_HDR_SIZE {
        return Err(CmpError::ChunkTooSmall(chunk.len()));
    }
    if chunk.len() > CHUNK_SIZE_MAX {
        return Err(CmpError::ChunkTooLarge(chunk.len()));
    }

    let mut collections = Vec::new();
    let mut class: Option<ChunkClass> = None;
    let mut offset = 0;

    while offset < chunk.len() {
        if offset + COLLECTION_HDR_SIZE > chunk.len() {
            return Err(CmpError::ChunkSizeInconsistent { offset });
        }
        let hdr = CollectionHeader::parse(&chunk[offset..])?;
        let ty = DataType::from_subservice(hdr.subservice)
            .ok_or(CmpError::CollectionSubserviceUnsupported(hdr.subservice))?;

        match class {
            None => class = Some(ty.class()),
            Some(c) if c != ty.class() => {
                return Err(CmpError::ChunkSubserviceInconsistent(hdr.subservice))
            }
            Some(_) => {}
        }

        if hdr.data_len % ty.record_size() != 0 {
            return Err(CmpError::CollectionSizeInconsistent {
                data_len: hdr.data_len,
                record_size: ty.record_size(),
            });
        }
        if offset + COLLECTION_HDR_SIZE + hdr.data_len > chunk.len() {
            return Err(CmpError::ChunkSizeInconsistent { offset });
        }

        collections.push(CollectionInfo {
            offset,
            data_len: hdr.data_len,
            ty,
        });
        offset += COLLECTION_HDR_SIZE + hdr.data_len;
    }

    Ok(collections)
}

/// Upper bound on the entity size produced by [`compress_chunk`] for this
/// chunk, reached when every collection falls back to verbatim storage.
pub fn compress_chunk_bound(chunk: &[u8]) -> Result<u32, CmpError> {
    let collections = scan_collections(chunk)?;

    let mut total = NON_IMAGETTE_HEADER_SIZE;
    for col in &collections {
        total += SIZE_PREFIX_LEN + COLLECTION_HDR_SIZE + col.data_len;
    }
    total = (total + 3) & !3;

    if total > ENTITY_SIZE_MAX {
        return Err(CmpError::SizeTooLarge(total));
    }
    Ok(total as u32)
}

/// Compress a chunk of collections into a self-describing entity.
///
/// # Arguments
/// * `ctx` - Codec context (version id, timestamp source, model update)
/// * `chunk` - Chunk to compress
/// * `model` - Model chunk of identical shape; required by model modes
/// * `updated_model` - Optional buffer receiving the updated model chunk
/// * `dst` - Destination buffer, or `None` for a sizing run
/// * `params` - Chunk-wide compression parameters
///
/// # Returns
/// The entity size in bytes, or the size a real run would need when `dst`
/// is `None`.
pub fn compress_chunk(
    ctx: &CodecContext,
    chunk: &[u8],
    model: Option<&[u8]>,
    mut updated_model: Option<&mut [u8]>,
    mut dst: Option<&mut [u8]>,
    params: &ChunkParams,
) -> Result<u32, CmpError> {
    let collections = scan_collections(chunk)?;
    if chunk.len() > ENTITY_SIZE_MAX {
        return Err(CmpError::SizeTooLarge(chunk.len()));
    }

    let first_ty = collections[0].ty;
    let class = first_ty.class();
    params.validate(class)?;
    let widths = registry::max_bits_for(params.registry_version)
        .ok_or(CmpError::InvalidParams("max-bits registry version"))?;

    if params.mode.is_model() {
        let model_buf = model.ok_or(CmpError::MissingBuffer("model"))?;
        if model_buf.len() != chunk.len() {
            return Err(CmpError::BufferSizeMismatch {
                name: "model",
                expected: chunk.len(),
                actual: model_buf.len(),
            });
        }
        if let Some(upd) = updated_model.as_deref() {
            if upd.len() != chunk.len() {
                return Err(CmpError::BufferSizeMismatch {
                    name: "updated model",
                    expected: chunk.len(),
                    actual: upd.len(),
                });
            }
        }
    }

    let raw = params.mode.is_raw();
    let data_type = if class == ChunkClass::Imagette && !raw && params.imagette_adaptive.is_some()
    {
        DataType::ImagetteAdaptive
    } else {
        first_ty
    };
    let header_len = entity::header_size(data_type, raw);
    let start_timestamp = check_timestamp((ctx.now)())?;

    // Reserve the zero-filled header region before any collection is
    // processed; the true sizes are patched in below.
    if let Some(out) = dst.as_deref_mut() {
        if out.len() < header_len {
            return Err(CmpError::BufferTooSmall);
        }
        out[..header_len].fill(0);
    }

    let mut pos = header_len;

    if raw {
        let entity_size = header_len + chunk.len();
        if entity_size > ENTITY_SIZE_MAX {
            return Err(CmpError::SizeTooLarge(entity_size));
        }
        if let Some(out) = dst.as_deref_mut() {
            if out.len() < entity_size {
                return Err(CmpError::BufferTooSmall);
            }
            out[header_len..entity_size].copy_from_slice(chunk);
        }
        pos = entity_size;
    } else {
        let codec = FieldCodec {
            escape: params.mode.escape().ok_or(CmpError::Internal)?,
            use_model: params.mode.is_model(),
            lossy: u32::from(params.lossy_par),
            model_weight: params.model_weight,
            pairs: params.slot_pairs(class),
            widths,
            model_update: ctx.model_update,
        };

        for col in &collections {
            let data_start = col.offset + COLLECTION_HDR_SIZE;
            let data = &chunk[data_start..data_start + col.data_len];
            let model_col = model.map(|m| &m[data_start..data_start + col.data_len]);

            // The updated model mirrors the chunk layout, headers included.
            if codec.use_model {
                if let Some(upd) = updated_model.as_deref_mut() {
                    upd[col.offset..data_start].copy_from_slice(&chunk[col.offset..data_start]);
                }
            }

            // Compress into a window one byte short of the original payload
            // so that an exact tie still falls back to verbatim storage.
            let payload_pos = pos + SIZE_PREFIX_LEN + COLLECTION_HDR_SIZE;
            let window = col.data_len.saturating_sub(1);

            let compressed_len = if col.data_len == 0 {
                Some(0)
            } else {
                let upd_col = updated_model
                    .as_deref_mut()
                    .map(|u| &mut u[data_start..data_start + col.data_len]);
                match dst.as_deref_mut() {
                    Some(out) => {
                        if payload_pos > out.len() {
                            return Err(CmpError::BufferTooSmall);
                        }
                        let window = window.min(out.len() - payload_pos);
                        let target = &mut out[payload_pos..payload_pos + window];
                        let mut writer = BitWriter::new(Some(target));
                        match codec
                            .encode_records(col.ty, data, model_col, upd_col, &mut writer)
                            .and_then(|()| writer.pad_to_byte())
                        {
                            Ok(()) => Some(writer.byte_len()),
                            Err(CmpError::BufferTooSmall) => None,
                            Err(e) => return Err(e),
                        }
                    }
                    None => {
                        let mut writer = BitWriter::new(None);
                        codec.encode_records(col.ty, data, model_col, upd_col, &mut writer)?;
                        writer.pad_to_byte()?;
                        let len = writer.byte_len();
                        if len <= window {
                            Some(len)
                        } else {
                            None
                        }
                    }
                }
            };

            let payload_len = match compressed_len {
                Some(len) => len,
                None => {
                    debug!(
                        "collection at offset {} does not compress, storing verbatim",
                        col.offset
                    );
                    let upd_col = updated_model
                        .as_deref_mut()
                        .map(|u| &mut u[data_start..data_start + col.data_len]);
                    codec.update_models_verbatim(col.ty, data, model_col, upd_col)?;
                    col.data_len
                }
            };
            if payload_len > 0xFFFF {
                return Err(CmpError::CollectionTooLargeToFrame);
            }

            if let Some(out) = dst.as_deref_mut() {
                let end = payload_pos + payload_len;
                if end > out.len() {
                    return Err(CmpError::BufferTooSmall);
                }
                write_be(out, pos, SIZE_PREFIX_LEN, payload_len as u32);
                out[pos + SIZE_PREFIX_LEN..payload_pos]
                    .copy_from_slice(&chunk[col.offset..data_start]);
                if compressed_len.is_none() {
                    out[payload_pos..end].copy_from_slice(data);
                }
            }

            pos = payload_pos + payload_len;
        }

        // Zero padding up to the next 4-byte boundary
        let padded = (pos + 3) & !3;
        if let Some(out) = dst.as_deref_mut() {
            if padded > out.len() {
                return Err(CmpError::BufferTooSmall);
            }
            out[pos..padded].fill(0);
        }
        pos = padded;
    }

    let entity_size = pos;
    if entity_size > ENTITY_SIZE_MAX {
        return Err(CmpError::SizeTooLarge(entity_size));
    }
    let end_timestamp = check_timestamp((ctx.now)())?;

    if let Some(out) = dst.as_deref_mut() {
        let mut ent = EntityMut::new(out)?;
        ent.set_version_id(ctx.version_id);
        ent.set_entity_size(entity_size)?;
        ent.set_original_size(chunk.len())?;
        ent.set_start_timestamp(start_timestamp)?;
        ent.set_end_timestamp(end_timestamp)?;
        ent.set_data_type(data_type, raw);
        ent.set_mode_wire(params.mode.to_wire());
        ent.set_model_weight(params.model_weight);
        ent.set_registry_version(params.registry_version);
        ent.set_lossy_par(params.lossy_par);

        if !raw {
            if class == ChunkClass::Imagette {
                ent.set_imagette_pair(params.imagette)?;
                if let Some(pairs) = params.imagette_adaptive {
                    ent.set_imagette_adaptive_pairs(pairs)?;
                }
            } else {
                for (slot, pair) in params.slot_pairs(class).iter().enumerate() {
                    if pair.golomb != 0 {
                        ent.set_slot_pair(slot, *pair)?;
                    }
                }
            }
        }

        debug!(
            "chunk of {} bytes compressed into {} byte entity",
            chunk.len(),
            entity_size
        );
    }

    Ok(entity_size as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::CmpMode;

    fn fixed_now() -> u64 {
        0x0000_0012_3456
    }

    fn keep_model(_decoded: u32, model: u32, _weight: u8, _lossy: u32) -> u32 {
        model
    }

    fn ctx() -> CodecContext {
        CodecContext::new(0x0100, fixed_now, keep_model)
    }

    fn collection(subservice: u8, payload: &[u8]) -> Vec<u8> {
        let hdr = CollectionHeader {
            timestamp: 0x100,
            config_id: 1,
            packet_type: 0,
            subservice,
            ccd_id: 0,
            sequence: 0,
            data_len: payload.len(),
        };
        let mut buf = vec![0u8; COLLECTION_HDR_SIZE + payload.len()];
        hdr.write_to(&mut buf).unwrap();
        buf[COLLECTION_HDR_SIZE..].copy_from_slice(payload);
        buf
    }

    #[test]
    fn test_scan_single_collection() {
        // Subservice 3 (S_FX): 2 records of 5 bytes
        let chunk = collection(3, &[0u8; 10]);
        let cols = scan_collections(&chunk).unwrap();
        assert_eq!(cols.len(), 1);
        assert_eq!(cols[0].ty, DataType::SFx);
        assert_eq!(cols[0].data_len, 10);
    }

    #[test]
    fn test_scan_rejects_inconsistent_sizes() {
        // Data length not a record multiple
        let chunk = collection(3, &[0u8; 7]);
        assert!(matches!(
            scan_collections(&chunk),
            Err(CmpError::CollectionSizeInconsistent { .. })
        ));

        // Header claims more data than the chunk holds
        let mut chunk = collection(3, &[0u8; 10]);
        chunk.truncate(COLLECTION_HDR_SIZE + 5);
        assert!(matches!(
            scan_collections(&chunk),
            Err(CmpError::ChunkSizeInconsistent { .. })
        ));

        // Trailing bytes that are not a full header
        let mut chunk = collection(3, &[0u8; 10]);
        chunk.extend_from_slice(&[0u8; 5]);
        assert!(matches!(
            scan_collections(&chunk),
            Err(CmpError::ChunkSizeInconsistent { .. })
        ));
    }

    #[test]
    fn test_scan_rejects_unsupported_subservice() {
        let chunk = collection(40, &[0u8; 10]);
        assert!(matches!(
            scan_collections(&chunk),
            Err(CmpError::CollectionSubserviceUnsupported(40))
        ));
    }

    #[test]
    fn test_scan_rejects_mixed_classes() {
        let mut chunk = collection(3, &[0u8; 10]); // short cadence
        chunk.extend_from_slice(&collection(1, &[0u8; 4])); // imagette
        assert!(matches!(
            scan_collections(&chunk),
            Err(CmpError::ChunkSubserviceInconsistent(1))
        ));
    }

    #[test]
    fn test_scan_accepts_mixed_auxiliary() {
        let mut chunk = collection(15, &[0u8; 16]); // offset
        chunk.extend_from_slice(&collection(16, &[0u8; 20])); // background
        let cols = scan_collections(&chunk).unwrap();
        assert_eq!(cols.len(), 2);
        assert_eq!(cols[1].ty, DataType::Background);
    }

    #[test]
    fn test_scan_size_limits() {
        assert!(matches!(
            scan_collections(&[0u8; 4]),
            Err(CmpError::ChunkTooSmall(4))
        ));
    }

    #[test]
    fn test_sizing_matches_real_run() {
        let chunk = collection(3, &[1, 0, 0, 0, 100, 1, 0, 0, 0, 101]);
        let params = ChunkParams::default();

        let size = compress_chunk(&ctx(), &chunk, None, None, None, &params).unwrap();

        let mut dst = vec![0xAAu8; 1024];
        let real = compress_chunk(&ctx(), &chunk, None, None, Some(&mut dst), &params).unwrap();
        assert_eq!(size, real);
    }

    #[test]
    fn test_entity_is_word_aligned() {
        let chunk = collection(3, &[1, 0, 0, 0, 100, 1, 0, 0, 0, 101]);
        let params = ChunkParams::default();
        let size = compress_chunk(&ctx(), &chunk, None, None, None, &params).unwrap();
        assert_eq!(size % 4, 0);
    }

    #[test]
    fn test_raw_mode_size() {
        let chunk = collection(3, &[0u8; 10]);
        let mut params = ChunkParams::default();
        params.mode = CmpMode::Raw;

        let size = compress_chunk(&ctx(), &chunk, None, None, None, &params).unwrap();
        assert_eq!(size as usize, entity::GENERIC_HEADER_SIZE + chunk.len());
    }

    #[test]
    fn test_model_mode_requires_model_buffer() {
        let chunk = collection(3, &[0u8; 10]);
        let mut params = ChunkParams::default();
        params.mode = CmpMode::ModelZero;

        assert!(matches!(
            compress_chunk(&ctx(), &chunk, None, None, None, &params),
            Err(CmpError::MissingBuffer("model"))
        ));

        let model = vec![0u8; 5];
        assert!(matches!(
            compress_chunk(&ctx(), &chunk, Some(&model), None, None, &params),
            Err(CmpError::BufferSizeMismatch { name: "model", .. })
        ));
    }

    #[test]
    fn test_incompressible_collection_falls_back_to_verbatim() {
        // Alternating half-range pixels: every residual is an outlier, so
        // each 16-bit pixel would cost 19 bits and the stream expands
        let mut payload = Vec::new();
        for i in 0..8u32 {
            payload.extend_from_slice(if i % 2 == 0 {
                &[0x80, 0x00]
            } else {
                &[0x00, 0x00]
            });
        }
        let chunk = collection(1, &payload);
        let params = ChunkParams::default();

        let size = compress_chunk(&ctx(), &chunk, None, None, None, &params).unwrap();
        let bound = compress_chunk_bound(&chunk).unwrap();
        assert!(size <= bound);

        // Verbatim fallback: header + prefix + collection, padded
        let expected = entity::IMAGETTE_HEADER_SIZE + SIZE_PREFIX_LEN + chunk.len();
        assert_eq!(size as usize, (expected + 3) & !3);
    }

    #[test]
    fn test_buffer_too_small_for_header() {
        let chunk = collection(3, &[0u8; 10]);
        let params = ChunkParams::default();
        let mut dst = vec![0u8; 16];
        assert!(matches!(
            compress_chunk(&ctx(), &chunk, None, None, Some(&mut dst), &params),
            Err(CmpError::BufferTooSmall)
        ));
    }

    #[test]
    fn test_bound_covers_worst_case() {
        let chunk = collection(1, &[0xFF; 64]);
        let bound = compress_chunk_bound(&chunk).unwrap();
        assert_eq!(
            bound as usize,
            (NON_IMAGETTE_HEADER_SIZE + SIZE_PREFIX_LEN + chunk.len() + 3) & !3
        );
    }
}
