//! # ricepack
//!
//! Adaptive Golomb-Rice compression of satellite science telemetry.
//!
//! A chunk of header-prefixed science collections (imagette pixels, flux and
//! centroid measurements, offset/background/smearing statistics) is packed
//! into a compact bitstream with per-field Golomb-Rice coding and optional
//! model-based prediction, then wrapped into a self-describing binary entity
//! that a ground system can invert exactly.
//!
//! ## Design
//!
//! - **Safe Rust** - `#![forbid(unsafe_code)]`
//! - **Caller-owned buffers** - the codec never allocates data, model or
//!   destination buffers
//! - **Big-endian wire format** - byte order is explicit everywhere and
//!   independent of the host
//! - **Sizing without writing** - every operation accepts a missing
//!   destination and returns the exact byte count a real run needs
//!
//! ## API Overview
//!
//! ### High-Level Operations
//!
//! - [`compress_chunk()`] - Compress a chunk of collections into an entity
//! - [`decompress_entity()`] - Recover the original chunk from an entity
//! - [`compress_chunk_bound()`] - Worst-case entity size for a chunk
//! - [`set_model_id_and_counter()`] - Link an entity to its model chain
//!
//! ### Low-Level Components
//!
//! - [`BitWriter`] / [`BitReader`] - MSB-first bit access over byte buffers
//! - [`GolombCoder`] with [`encode_value_zero`] / [`encode_value_multi`] and
//!   their decoding counterparts - entropy coding primitives
//! - [`Entity`] / [`EntityMut`] - entity header accessors
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ricepack::{compress_chunk, decompress_entity, ChunkParams, CodecContext};
//!
//! let ctx = CodecContext::new(0x0100, mission_time, blend_model);
//! let params = ChunkParams::default();
//!
//! // Size, then compress
//! let size = compress_chunk(&ctx, &chunk, None, None, None, &params)?;
//! let mut entity = vec![0u8; size as usize];
//! compress_chunk(&ctx, &chunk, None, None, Some(&mut entity), &params)?;
//!
//! // Recover the chunk on ground
//! let mut restored = vec![0u8; chunk.len()];
//! decompress_entity(&ctx, &entity, None, None, Some(&mut restored))?;
//! assert_eq!(restored, chunk);
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

mod bitreader;
mod bitwriter;
mod compress;
mod context;
mod decode;
mod decompress;
mod encode;
mod entity;
mod error;
mod fields;
mod params;
mod records;
mod registry;
mod transform;

pub use bitreader::{BitReader, ReadState};
pub use bitwriter::BitWriter;
pub use compress::{compress_chunk, compress_chunk_bound};
pub use context::{CodecContext, TimestampFn};
pub use decode::{decode_value_multi, decode_value_zero, golomb_decode};
pub use decompress::decompress_entity;
pub use encode::{
    encode_value_multi, encode_value_zero, GolombCoder, MAX_CW_LEN, MULTI_ESCAPE_SYMBOLS,
};
pub use entity::{
    header_size, set_model_id_and_counter, Entity, EntityMut, ENTITY_SIZE_MAX,
    GENERIC_HEADER_SIZE, IMAGETTE_ADAPTIVE_HEADER_SIZE, IMAGETTE_HEADER_SIZE,
    NON_IMAGETTE_HEADER_SIZE, PARAM_SLOTS, RAW_FLAG,
};
pub use error::CmpError;
pub use params::{
    max_spill, ChunkParams, CmpMode, Escape, GolombPair, MAX_GOLOMB_PAR, MAX_IMA_GOLOMB_PAR,
    MAX_LOSSY_PAR, MAX_MODEL_WEIGHT, MIN_SPILL,
};
pub use records::{
    ChunkClass, CollectionHeader, DataType, FieldSpec, CHUNK_SIZE_MAX, COLLECTION_HDR_SIZE,
};
pub use registry::{max_bits_for, FieldWidths, WidthSel, REGISTRY_VERSION_DEFAULT};
pub use transform::{map_from_pos, map_to_pos, round_fwd, round_inv, ModelUpdateFn};
