//! Self-describing binary entity framing.
//!
//! An entity is the envelope exchanged with the ground system: a 30-byte
//! generic header, a type-specific header of 0-30 bytes and the compressed
//! (or raw) payload. All multi-byte fields are big-endian. The header size
//! is a pure function of the data type and the raw flag; it is never stored,
//! and the decoder recomputes it independently.
//!
//! The accessors below perform their own shifts and masks over a fixed byte
//! array; nothing relies on native struct or bit-field layout.

#![allow(clippy::cast_possible_truncation)]

use crate::error::CmpError;
use crate::params::GolombPair;
use crate::records::{read_be, write_be, ChunkClass, DataType};

/// Size of the generic entity header in bytes.
pub const GENERIC_HEADER_SIZE: usize = 30;

/// Total header size of a non-adaptive imagette entity.
pub const IMAGETTE_HEADER_SIZE: usize = 34;

/// Total header size of an adaptive imagette entity.
pub const IMAGETTE_ADAPTIVE_HEADER_SIZE: usize = 40;

/// Total header size of every non-imagette entity.
pub const NON_IMAGETTE_HEADER_SIZE: usize = 60;

/// Largest value of the 24-bit size fields.
pub const ENTITY_SIZE_MAX: usize = 0x00FF_FFFF;

/// Raw-mode flag in the data-type field.
pub const RAW_FLAG: u16 = 0x8000;

// Generic header field offsets.
const VERSION_ID: usize = 0; // u16
const ENTITY_SIZE: usize = 2; // u24
const ORIGINAL_SIZE: usize = 5; // u24
const START_TIMESTAMP: usize = 8; // u48
const END_TIMESTAMP: usize = 14; // u48
const DATA_TYPE: usize = 20; // u16, bit 15 = raw flag
const MODE: usize = 22; // u8
const MODEL_WEIGHT: usize = 23; // u8
const MODEL_ID: usize = 24; // u16
const MODEL_COUNTER: usize = 26; // u8
const REGISTRY_VERSION: usize = 27; // u8
const LOSSY_PAR: usize = 28; // u16

// Imagette specific header: spill u16, golomb u8, adaptive pairs, spare.
const IMA_SPILL: usize = 30;
const IMA_GOLOMB: usize = 32;
const IMA_AP1_SPILL: usize = 33;
const IMA_AP1_GOLOMB: usize = 35;
const IMA_AP2_SPILL: usize = 36;
const IMA_AP2_GOLOMB: usize = 38;

// Non-imagette specific header: six (spill u24, golomb u16) slots.
const SLOT_BASE: usize = 30;
const SLOT_STRIDE: usize = 5;

/// Number of parameter slots in the non-imagette specific header.
pub const PARAM_SLOTS: usize = 6;

/// Header size for a data type and raw flag.
///
/// Raw entities carry only the generic header regardless of type.
pub fn header_size(data_type: DataType, raw: bool) -> usize {
    if raw {
        return GENERIC_HEADER_SIZE;
    }
    match data_type.class() {
        ChunkClass::Imagette => {
            if data_type == DataType::ImagetteAdaptive {
                IMAGETTE_ADAPTIVE_HEADER_SIZE
            } else {
                IMAGETTE_HEADER_SIZE
            }
        }
        _ => NON_IMAGETTE_HEADER_SIZE,
    }
}

/// Read-only view of an entity buffer.
#[derive(Clone, Copy, Debug)]
pub struct Entity<'a> {
    buf: &'a [u8],
}

impl<'a> Entity<'a> {
    /// Create a view, checking that the buffer can hold the entity it
    /// claims to contain.
    pub fn new(buf: &'a [u8]) -> Result<Self, CmpError> {
        if buf.len() < GENERIC_HEADER_SIZE {
            return Err(CmpError::EntityTooSmall(buf.len()));
        }
        let ent = Self { buf };
        let size = ent.entity_size();
        if size < GENERIC_HEADER_SIZE || size > buf.len() {
            return Err(CmpError::EntityTooSmall(buf.len()));
        }
        Ok(ent)
    }

    pub fn version_id(&self) -> u16 {
        read_be(self.buf, VERSION_ID, 2) as u16
    }

    /// Total entity size in bytes (24-bit field).
    pub fn entity_size(&self) -> usize {
        read_be(self.buf, ENTITY_SIZE, 3) as usize
    }

    /// Size of the uncompressed chunk in bytes (24-bit field).
    pub fn original_size(&self) -> usize {
        read_be(self.buf, ORIGINAL_SIZE, 3) as usize
    }

    pub fn start_timestamp(&self) -> u64 {
        u64::from(read_be(self.buf, START_TIMESTAMP, 4)) << 16
            | u64::from(read_be(self.buf, START_TIMESTAMP + 4, 2))
    }

    pub fn end_timestamp(&self) -> u64 {
        u64::from(read_be(self.buf, END_TIMESTAMP, 4)) << 16
            | u64::from(read_be(self.buf, END_TIMESTAMP + 4, 2))
    }

    /// Data type and raw flag, with the flag stripped before the enumerant
    /// lookup.
    pub fn data_type(&self) -> Result<(DataType, bool), CmpError> {
        let wire = read_be(self.buf, DATA_TYPE, 2) as u16;
        let raw = wire & RAW_FLAG != 0;
        let ty = DataType::from_wire(wire & !RAW_FLAG)
            .ok_or(CmpError::UnsupportedType(wire & !RAW_FLAG))?;
        Ok((ty, raw))
    }

    pub fn mode_wire(&self) -> u8 {
        self.buf[MODE]
    }

    pub fn model_weight(&self) -> u8 {
        self.buf[MODEL_WEIGHT]
    }

    pub fn model_id(&self) -> u16 {
        read_be(self.buf, MODEL_ID, 2) as u16
    }

    pub fn model_counter(&self) -> u8 {
        self.buf[MODEL_COUNTER]
    }

    pub fn registry_version(&self) -> u8 {
        self.buf[REGISTRY_VERSION]
    }

    pub fn lossy_par(&self) -> u16 {
        read_be(self.buf, LOSSY_PAR, 2) as u16
    }

    /// Total header size derived from the data type and raw flag.
    pub fn header_len(&self) -> Result<usize, CmpError> {
        let (ty, raw) = self.data_type()?;
        let len = header_size(ty, raw);
        if self.entity_size() < len {
            return Err(CmpError::EntityTooSmall(self.entity_size()));
        }
        Ok(len)
    }

    /// Payload following the headers.
    pub fn payload(&self) -> Result<&'a [u8], CmpError> {
        let start = self.header_len()?;
        Ok(&self.buf[start..self.entity_size()])
    }

    /// Imagette parameter pair.
    pub fn imagette_pair(&self) -> Result<GolombPair, CmpError> {
        if self.buf.len() < IMAGETTE_HEADER_SIZE {
            return Err(CmpError::EntityTooSmall(self.buf.len()));
        }
        Ok(GolombPair::new(
            read_be(self.buf, IMA_GOLOMB, 1),
            read_be(self.buf, IMA_SPILL, 2),
        ))
    }

    /// Adaptive imagette side pairs.
    pub fn imagette_adaptive_pairs(&self) -> Result<[GolombPair; 2], CmpError> {
        if self.buf.len() < IMAGETTE_ADAPTIVE_HEADER_SIZE {
            return Err(CmpError::EntityTooSmall(self.buf.len()));
        }
        Ok([
            GolombPair::new(
                read_be(self.buf, IMA_AP1_GOLOMB, 1),
                read_be(self.buf, IMA_AP1_SPILL, 2),
            ),
            GolombPair::new(
                read_be(self.buf, IMA_AP2_GOLOMB, 1),
                read_be(self.buf, IMA_AP2_SPILL, 2),
            ),
        ])
    }

    /// Parameter pair from a non-imagette slot.
    pub fn slot_pair(&self, slot: usize) -> Result<GolombPair, CmpError> {
        if slot >= PARAM_SLOTS {
            return Err(CmpError::Internal);
        }
        if self.buf.len() < NON_IMAGETTE_HEADER_SIZE {
            return Err(CmpError::EntityTooSmall(self.buf.len()));
        }
        let base = SLOT_BASE + slot * SLOT_STRIDE;
        Ok(GolombPair::new(
            read_be(self.buf, base + 3, 2),
            read_be(self.buf, base, 3),
        ))
    }
}

/// Mutable accessor over an entity buffer.
#[derive(Debug)]
pub struct EntityMut<'a> {
    buf: &'a mut [u8],
}

impl<'a> EntityMut<'a> {
    /// Create a mutable view over a buffer that will hold at least the
    /// generic header.
    pub fn new(buf: &'a mut [u8]) -> Result<Self, CmpError> {
        if buf.len() < GENERIC_HEADER_SIZE {
            return Err(CmpError::EntityTooSmall(buf.len()));
        }
        Ok(Self { buf })
    }

    /// Zero-fill the header region.
    pub fn clear_header(&mut self, header_len: usize) -> Result<(), CmpError> {
        if self.buf.len() < header_len {
            return Err(CmpError::BufferTooSmall);
        }
        self.buf[..header_len].fill(0);
        Ok(())
    }

    pub fn set_version_id(&mut self, version_id: u16) {
        write_be(self.buf, VERSION_ID, 2, u32::from(version_id));
    }

    pub fn set_entity_size(&mut self, size: usize) -> Result<(), CmpError> {
        if size > ENTITY_SIZE_MAX {
            return Err(CmpError::SizeTooLarge(size));
        }
        write_be(self.buf, ENTITY_SIZE, 3, size as u32);
        Ok(())
    }

    pub fn set_original_size(&mut self, size: usize) -> Result<(), CmpError> {
        if size > ENTITY_SIZE_MAX {
            return Err(CmpError::SizeTooLarge(size));
        }
        write_be(self.buf, ORIGINAL_SIZE, 3, size as u32);
        Ok(())
    }

    fn set_timestamp(&mut self, offset: usize, timestamp: u64) -> Result<(), CmpError> {
        if timestamp >> 48 != 0 {
            return Err(CmpError::TimestampOutOfRange(timestamp));
        }
        write_be(self.buf, offset, 4, (timestamp >> 16) as u32);
        write_be(self.buf, offset + 4, 2, (timestamp & 0xFFFF) as u32);
        Ok(())
    }

    pub fn set_start_timestamp(&mut self, timestamp: u64) -> Result<(), CmpError> {
        self.set_timestamp(START_TIMESTAMP, timestamp)
    }

    pub fn set_end_timestamp(&mut self, timestamp: u64) -> Result<(), CmpError> {
        self.set_timestamp(END_TIMESTAMP, timestamp)
    }

    pub fn set_data_type(&mut self, data_type: DataType, raw: bool) {
        let mut wire = data_type.to_wire();
        if raw {
            wire |= RAW_FLAG;
        }
        write_be(self.buf, DATA_TYPE, 2, u32::from(wire));
    }

    pub fn set_mode_wire(&mut self, mode: u8) {
        self.buf[MODE] = mode;
    }

    pub fn set_model_weight(&mut self, weight: u8) {
        self.buf[MODEL_WEIGHT] = weight;
    }

    pub fn set_model_id(&mut self, model_id: u16) {
        write_be(self.buf, MODEL_ID, 2, u32::from(model_id));
    }

    pub fn set_model_counter(&mut self, counter: u8) {
        self.buf[MODEL_COUNTER] = counter;
    }

    pub fn set_registry_version(&mut self, version: u8) {
        self.buf[REGISTRY_VERSION] = version;
    }

    pub fn set_lossy_par(&mut self, lossy: u16) {
        write_be(self.buf, LOSSY_PAR, 2, u32::from(lossy));
    }

    pub fn set_imagette_pair(&mut self, pair: GolombPair) -> Result<(), CmpError> {
        if self.buf.len() < IMAGETTE_HEADER_SIZE {
            return Err(CmpError::BufferTooSmall);
        }
        if pair.golomb > 0xFF || pair.spill > 0xFFFF {
            return Err(CmpError::InvalidFieldParams("imagette header pair"));
        }
        write_be(self.buf, IMA_SPILL, 2, pair.spill);
        write_be(self.buf, IMA_GOLOMB, 1, pair.golomb);
        Ok(())
    }

    pub fn set_imagette_adaptive_pairs(&mut self, pairs: [GolombPair; 2]) -> Result<(), CmpError> {
        if self.buf.len() < IMAGETTE_ADAPTIVE_HEADER_SIZE {
            return Err(CmpError::BufferTooSmall);
        }
        for pair in pairs {
            if pair.golomb > 0xFF || pair.spill > 0xFFFF {
                return Err(CmpError::InvalidFieldParams("adaptive header pair"));
            }
        }
        write_be(self.buf, IMA_AP1_SPILL, 2, pairs[0].spill);
        write_be(self.buf, IMA_AP1_GOLOMB, 1, pairs[0].golomb);
        write_be(self.buf, IMA_AP2_SPILL, 2, pairs[1].spill);
        write_be(self.buf, IMA_AP2_GOLOMB, 1, pairs[1].golomb);
        Ok(())
    }

    pub fn set_slot_pair(&mut self, slot: usize, pair: GolombPair) -> Result<(), CmpError> {
        if slot >= PARAM_SLOTS {
            return Err(CmpError::Internal);
        }
        if self.buf.len() < NON_IMAGETTE_HEADER_SIZE {
            return Err(CmpError::BufferTooSmall);
        }
        if pair.golomb > 0xFFFF || pair.spill > 0x00FF_FFFF {
            return Err(CmpError::InvalidFieldParams("header pair"));
        }
        let base = SLOT_BASE + slot * SLOT_STRIDE;
        write_be(self.buf, base, 3, pair.spill);
        write_be(self.buf, base + 3, 2, pair.golomb);
        Ok(())
    }
}

/// Link an entity to the model it was compressed against.
///
/// Used by the ground pipeline to stitch model chains back together after
/// the fact; returns the entity size on success.
pub fn set_model_id_and_counter(
    entity: &mut [u8],
    model_id: u16,
    model_counter: u8,
) -> Result<u32, CmpError> {
    let size = Entity::new(entity)?.entity_size();
    let mut ent = EntityMut::new(entity)?;
    ent.set_model_id(model_id);
    ent.set_model_counter(model_counter);
    Ok(size as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_minimal_entity(buf: &mut [u8]) {
        let mut ent = EntityMut::new(buf).unwrap();
        ent.set_version_id(0x0102);
        ent.set_entity_size(GENERIC_HEADER_SIZE).unwrap();
        ent.set_original_size(0).unwrap();
        ent.set_data_type(DataType::Imagette, true);
        ent.set_mode_wire(0);
    }

    #[test]
    fn test_header_size_table() {
        assert_eq!(header_size(DataType::Imagette, false), 34);
        assert_eq!(header_size(DataType::SatImagette, false), 34);
        assert_eq!(header_size(DataType::ImagetteAdaptive, false), 40);
        assert_eq!(header_size(DataType::SFx, false), 60);
        assert_eq!(header_size(DataType::Background, false), 60);
        // Raw mode: generic header only, regardless of type
        assert_eq!(header_size(DataType::Imagette, true), 30);
        assert_eq!(header_size(DataType::SFxEfxNcobEcob, true), 30);
    }

    #[test]
    fn test_generic_header_round_trip() {
        let mut buf = [0u8; NON_IMAGETTE_HEADER_SIZE];
        {
            let mut ent = EntityMut::new(&mut buf).unwrap();
            ent.set_version_id(0xABCD);
            ent.set_entity_size(NON_IMAGETTE_HEADER_SIZE).unwrap();
            ent.set_original_size(0x123456).unwrap();
            ent.set_start_timestamp(0x0123_4567_89AB).unwrap();
            ent.set_end_timestamp(0x0123_4567_89AC).unwrap();
            ent.set_data_type(DataType::SFx, false);
            ent.set_mode_wire(2);
            ent.set_model_weight(8);
            ent.set_model_id(0xBEEF);
            ent.set_model_counter(42);
            ent.set_registry_version(1);
            ent.set_lossy_par(3);
        }

        let ent = Entity::new(&buf).unwrap();
        assert_eq!(ent.version_id(), 0xABCD);
        assert_eq!(ent.entity_size(), NON_IMAGETTE_HEADER_SIZE);
        assert_eq!(ent.original_size(), 0x123456);
        assert_eq!(ent.start_timestamp(), 0x0123_4567_89AB);
        assert_eq!(ent.end_timestamp(), 0x0123_4567_89AC);
        assert_eq!(ent.data_type().unwrap(), (DataType::SFx, false));
        assert_eq!(ent.mode_wire(), 2);
        assert_eq!(ent.model_weight(), 8);
        assert_eq!(ent.model_id(), 0xBEEF);
        assert_eq!(ent.model_counter(), 42);
        assert_eq!(ent.registry_version(), 1);
        assert_eq!(ent.lossy_par(), 3);
        assert_eq!(ent.header_len().unwrap(), NON_IMAGETTE_HEADER_SIZE);
        assert!(ent.payload().unwrap().is_empty());
    }

    #[test]
    fn test_size_field_range() {
        let mut buf = [0u8; GENERIC_HEADER_SIZE];
        let mut ent = EntityMut::new(&mut buf).unwrap();

        // 0xFFFFFF is the largest storable size
        ent.set_entity_size(0x00FF_FFFF).unwrap();
        assert!(matches!(
            ent.set_entity_size(0x0100_0000),
            Err(CmpError::SizeTooLarge(0x0100_0000))
        ));
        assert!(matches!(
            ent.set_original_size(0x0100_0000),
            Err(CmpError::SizeTooLarge(_))
        ));
    }

    #[test]
    fn test_timestamp_range() {
        let mut buf = [0u8; GENERIC_HEADER_SIZE];
        let mut ent = EntityMut::new(&mut buf).unwrap();

        ent.set_start_timestamp(0xFFFF_FFFF_FFFF).unwrap();
        assert!(matches!(
            ent.set_start_timestamp(0x0001_0000_0000_0000),
            Err(CmpError::TimestampOutOfRange(_))
        ));
    }

    #[test]
    fn test_raw_flag() {
        let mut buf = [0u8; GENERIC_HEADER_SIZE];
        build_minimal_entity(&mut buf);

        let ent = Entity::new(&buf).unwrap();
        let (ty, raw) = ent.data_type().unwrap();
        assert_eq!(ty, DataType::Imagette);
        assert!(raw);
        // Raw flag occupies bit 15 of the data-type field
        assert_eq!(read_be(&buf, 20, 2), 0x8001);
    }

    #[test]
    fn test_unknown_data_type() {
        let mut buf = [0u8; GENERIC_HEADER_SIZE];
        build_minimal_entity(&mut buf);
        buf[20] = 0x00;
        buf[21] = 99;

        let ent = Entity::new(&buf).unwrap();
        assert!(matches!(
            ent.data_type(),
            Err(CmpError::UnsupportedType(99))
        ));
    }

    #[test]
    fn test_entity_too_small() {
        let buf = [0u8; 10];
        assert!(matches!(
            Entity::new(&buf),
            Err(CmpError::EntityTooSmall(10))
        ));

        // Size field claims more than the buffer holds
        let mut buf = [0u8; GENERIC_HEADER_SIZE];
        build_minimal_entity(&mut buf);
        write_be(&mut buf, 2, 3, GENERIC_HEADER_SIZE as u32 + 1);
        assert!(Entity::new(&buf).is_err());
    }

    #[test]
    fn test_imagette_pairs() {
        let mut buf = [0u8; IMAGETTE_ADAPTIVE_HEADER_SIZE];
        {
            let mut ent = EntityMut::new(&mut buf).unwrap();
            ent.set_entity_size(IMAGETTE_ADAPTIVE_HEADER_SIZE).unwrap();
            ent.set_data_type(DataType::ImagetteAdaptive, false);
            ent.set_imagette_pair(GolombPair::new(7, 1000)).unwrap();
            ent.set_imagette_adaptive_pairs([
                GolombPair::new(3, 50),
                GolombPair::new(9, 2000),
            ])
            .unwrap();
        }

        let ent = Entity::new(&buf).unwrap();
        assert_eq!(ent.imagette_pair().unwrap(), GolombPair::new(7, 1000));
        assert_eq!(
            ent.imagette_adaptive_pairs().unwrap(),
            [GolombPair::new(3, 50), GolombPair::new(9, 2000)]
        );
        assert_eq!(ent.header_len().unwrap(), IMAGETTE_ADAPTIVE_HEADER_SIZE);
    }

    #[test]
    fn test_imagette_pair_range() {
        let mut buf = [0u8; IMAGETTE_HEADER_SIZE];
        let mut ent = EntityMut::new(&mut buf).unwrap();
        assert!(ent.set_imagette_pair(GolombPair::new(256, 10)).is_err());
        assert!(ent
            .set_imagette_pair(GolombPair::new(10, 0x10000))
            .is_err());
    }

    #[test]
    fn test_slot_pairs() {
        let mut buf = [0u8; NON_IMAGETTE_HEADER_SIZE];
        {
            let mut ent = EntityMut::new(&mut buf).unwrap();
            ent.set_entity_size(NON_IMAGETTE_HEADER_SIZE).unwrap();
            ent.set_data_type(DataType::SFx, false);
            for slot in 0..PARAM_SLOTS {
                ent.set_slot_pair(
                    slot,
                    GolombPair::new(slot as u32 + 1, 100 * (slot as u32 + 1)),
                )
                .unwrap();
            }
        }

        let ent = Entity::new(&buf).unwrap();
        for slot in 0..PARAM_SLOTS {
            assert_eq!(
                ent.slot_pair(slot).unwrap(),
                GolombPair::new(slot as u32 + 1, 100 * (slot as u32 + 1))
            );
        }
    }

    #[test]
    fn test_set_model_id_and_counter() {
        let mut buf = [0u8; GENERIC_HEADER_SIZE];
        build_minimal_entity(&mut buf);

        let size = set_model_id_and_counter(&mut buf, 0x1234, 7).unwrap();
        assert_eq!(size as usize, GENERIC_HEADER_SIZE);

        let ent = Entity::new(&buf).unwrap();
        assert_eq!(ent.model_id(), 0x1234);
        assert_eq!(ent.model_counter(), 7);

        let mut small = [0u8; 8];
        assert!(set_model_id_and_counter(&mut small, 1, 1).is_err());
    }
}
