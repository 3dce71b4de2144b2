//! Science record shapes, collection headers and chunk classes.
//!
//! All multi-byte fields are big-endian on the wire regardless of host
//! endianness; every access goes through the explicit byte accessors in this
//! module, never through native struct layout.

#![allow(clippy::cast_possible_truncation)]

use crate::error::CmpError;
use crate::registry::WidthSel;

/// Size of a collection header in bytes.
pub const COLLECTION_HDR_SIZE: usize = 12;

/// Maximum chunk size in bytes (24 MiB).
pub const CHUNK_SIZE_MAX: usize = 24 * 1024 * 1024;

/// Largest number of sub-fields in any record shape.
pub(crate) const MAX_RECORD_FIELDS: usize = 7;

/// One sub-field of a record shape.
#[derive(Clone, Copy, Debug)]
pub struct FieldSpec {
    /// Byte offset inside the record.
    pub offset: usize,
    /// Wire width in bytes (1-4).
    pub bytes: usize,
    /// Parameter slot in the entity type-specific header.
    pub slot: usize,
    /// Max-bits registry selector.
    pub width: WidthSel,
}

const fn field(offset: usize, bytes: usize, slot: usize, width: WidthSel) -> FieldSpec {
    FieldSpec {
        offset,
        bytes,
        slot,
        width,
    }
}

// Parameter slot assignment for the cadence classes:
// 0 exposure flags, 1 flux, 2 normal centre of brightness, 3 extended flux,
// 4 extended centre of brightness. The auxiliary class reuses slots 0-2 for
// mean, variance and outlier count.
const IMAGETTE_FIELDS: &[FieldSpec] = &[field(0, 2, 0, WidthSel::Imagette)];

const S_FX_FIELDS: &[FieldSpec] = &[
    field(0, 1, 0, WidthSel::SExpFlags),
    field(1, 4, 1, WidthSel::Fx),
];
const S_FX_EFX_FIELDS: &[FieldSpec] = &[
    field(0, 1, 0, WidthSel::SExpFlags),
    field(1, 4, 1, WidthSel::Fx),
    field(5, 4, 3, WidthSel::Efx),
];
const S_FX_NCOB_FIELDS: &[FieldSpec] = &[
    field(0, 1, 0, WidthSel::SExpFlags),
    field(1, 4, 1, WidthSel::Fx),
    field(5, 4, 2, WidthSel::Ncob),
    field(9, 4, 2, WidthSel::Ncob),
];
const S_FX_EFX_NCOB_ECOB_FIELDS: &[FieldSpec] = &[
    field(0, 1, 0, WidthSel::SExpFlags),
    field(1, 4, 1, WidthSel::Fx),
    field(5, 4, 2, WidthSel::Ncob),
    field(9, 4, 2, WidthSel::Ncob),
    field(13, 4, 3, WidthSel::Efx),
    field(17, 4, 4, WidthSel::Ecob),
    field(21, 4, 4, WidthSel::Ecob),
];

const L_FX_FIELDS: &[FieldSpec] = &[
    field(0, 3, 0, WidthSel::LExpFlags),
    field(3, 4, 1, WidthSel::Fx),
];
const L_FX_EFX_FIELDS: &[FieldSpec] = &[
    field(0, 3, 0, WidthSel::LExpFlags),
    field(3, 4, 1, WidthSel::Fx),
    field(7, 4, 3, WidthSel::Efx),
];
const L_FX_NCOB_FIELDS: &[FieldSpec] = &[
    field(0, 3, 0, WidthSel::LExpFlags),
    field(3, 4, 1, WidthSel::Fx),
    field(7, 4, 2, WidthSel::Ncob),
    field(11, 4, 2, WidthSel::Ncob),
];
const L_FX_EFX_NCOB_ECOB_FIELDS: &[FieldSpec] = &[
    field(0, 3, 0, WidthSel::LExpFlags),
    field(3, 4, 1, WidthSel::Fx),
    field(7, 4, 2, WidthSel::Ncob),
    field(11, 4, 2, WidthSel::Ncob),
    field(15, 4, 3, WidthSel::Efx),
    field(19, 4, 4, WidthSel::Ecob),
    field(23, 4, 4, WidthSel::Ecob),
];

const F_FX_FIELDS: &[FieldSpec] = &[field(0, 4, 1, WidthSel::Fx)];
const F_FX_EFX_FIELDS: &[FieldSpec] = &[
    field(0, 4, 1, WidthSel::Fx),
    field(4, 4, 3, WidthSel::Efx),
];
const F_FX_NCOB_FIELDS: &[FieldSpec] = &[
    field(0, 4, 1, WidthSel::Fx),
    field(4, 4, 2, WidthSel::Ncob),
    field(8, 4, 2, WidthSel::Ncob),
];
const F_FX_EFX_NCOB_ECOB_FIELDS: &[FieldSpec] = &[
    field(0, 4, 1, WidthSel::Fx),
    field(4, 4, 2, WidthSel::Ncob),
    field(8, 4, 2, WidthSel::Ncob),
    field(12, 4, 3, WidthSel::Efx),
    field(16, 4, 4, WidthSel::Ecob),
    field(20, 4, 4, WidthSel::Ecob),
];

const OFFSET_FIELDS: &[FieldSpec] = &[
    field(0, 4, 0, WidthSel::Mean),
    field(4, 4, 1, WidthSel::Variance),
];
const BACKGROUND_FIELDS: &[FieldSpec] = &[
    field(0, 4, 0, WidthSel::Mean),
    field(4, 4, 1, WidthSel::Variance),
    field(8, 2, 2, WidthSel::Outliers),
];
const SMEARING_FIELDS: &[FieldSpec] = &[
    field(0, 4, 0, WidthSel::Mean),
    field(4, 2, 1, WidthSel::SmearingVariance),
    field(6, 2, 2, WidthSel::Outliers),
];

/// Families of record shapes that may share one chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkClass {
    Imagette,
    ShortCadence,
    LongCadence,
    FastCadence,
    Auxiliary,
}

/// Record shape of a collection, also the entity data-type enumerant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum DataType {
    Imagette = 1,
    SatImagette = 2,
    SFx = 3,
    SFxEfx = 4,
    SFxNcob = 5,
    SFxEfxNcobEcob = 6,
    LFx = 7,
    LFxEfx = 8,
    LFxNcob = 9,
    LFxEfxNcobEcob = 10,
    FFx = 11,
    FFxEfx = 12,
    FFxNcob = 13,
    FFxEfxNcobEcob = 14,
    Offset = 15,
    Background = 16,
    Smearing = 17,
    /// Imagette entity carrying two adaptive parameter pairs; same record
    /// shape and decode path as [`DataType::Imagette`].
    ImagetteAdaptive = 18,
}

impl DataType {
    /// Resolve a collection's 6-bit subservice to its record shape.
    ///
    /// The adaptive-imagette enumerant is entity-only and never appears as a
    /// subservice.
    pub fn from_subservice(subservice: u8) -> Option<Self> {
        if subservice == 0 || subservice > 17 {
            return None;
        }
        Self::from_wire(u16::from(subservice))
    }

    /// Resolve an entity data-type enumerant (raw flag already stripped).
    pub fn from_wire(value: u16) -> Option<Self> {
        Some(match value {
            1 => Self::Imagette,
            2 => Self::SatImagette,
            3 => Self::SFx,
            4 => Self::SFxEfx,
            5 => Self::SFxNcob,
            6 => Self::SFxEfxNcobEcob,
            7 => Self::LFx,
            8 => Self::LFxEfx,
            9 => Self::LFxNcob,
            10 => Self::LFxEfxNcobEcob,
            11 => Self::FFx,
            12 => Self::FFxEfx,
            13 => Self::FFxNcob,
            14 => Self::FFxEfxNcobEcob,
            15 => Self::Offset,
            16 => Self::Background,
            17 => Self::Smearing,
            18 => Self::ImagetteAdaptive,
            _ => return None,
        })
    }

    /// Wire value for the entity data-type field.
    #[inline]
    pub fn to_wire(self) -> u16 {
        self as u16
    }

    /// Chunk class this shape belongs to.
    pub fn class(self) -> ChunkClass {
        match self {
            Self::Imagette | Self::SatImagette | Self::ImagetteAdaptive => ChunkClass::Imagette,
            Self::SFx | Self::SFxEfx | Self::SFxNcob | Self::SFxEfxNcobEcob => {
                ChunkClass::ShortCadence
            }
            Self::LFx | Self::LFxEfx | Self::LFxNcob | Self::LFxEfxNcobEcob => {
                ChunkClass::LongCadence
            }
            Self::FFx | Self::FFxEfx | Self::FFxNcob | Self::FFxEfxNcobEcob => {
                ChunkClass::FastCadence
            }
            Self::Offset | Self::Background | Self::Smearing => ChunkClass::Auxiliary,
        }
    }

    /// Sub-field layout of one record.
    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            Self::Imagette | Self::SatImagette | Self::ImagetteAdaptive => IMAGETTE_FIELDS,
            Self::SFx => S_FX_FIELDS,
            Self::SFxEfx => S_FX_EFX_FIELDS,
            Self::SFxNcob => S_FX_NCOB_FIELDS,
            Self::SFxEfxNcobEcob => S_FX_EFX_NCOB_ECOB_FIELDS,
            Self::LFx => L_FX_FIELDS,
            Self::LFxEfx => L_FX_EFX_FIELDS,
            Self::LFxNcob => L_FX_NCOB_FIELDS,
            Self::LFxEfxNcobEcob => L_FX_EFX_NCOB_ECOB_FIELDS,
            Self::FFx => F_FX_FIELDS,
            Self::FFxEfx => F_FX_EFX_FIELDS,
            Self::FFxNcob => F_FX_NCOB_FIELDS,
            Self::FFxEfxNcobEcob => F_FX_EFX_NCOB_ECOB_FIELDS,
            Self::Offset => OFFSET_FIELDS,
            Self::Background => BACKGROUND_FIELDS,
            Self::Smearing => SMEARING_FIELDS,
        }
    }

    /// Size of one record in bytes.
    pub fn record_size(self) -> usize {
        let fields = self.fields();
        let last = fields[fields.len() - 1];
        last.offset + last.bytes
    }
}

/// Parsed collection header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollectionHeader {
    /// 48-bit acquisition timestamp.
    pub timestamp: u64,
    /// On-board configuration identifier.
    pub config_id: u16,
    /// Packet type bit from the collection identifier.
    pub packet_type: u8,
    /// 6-bit subservice selecting the record shape.
    pub subservice: u8,
    /// 2-bit CCD identifier.
    pub ccd_id: u8,
    /// 7-bit sequence counter.
    pub sequence: u8,
    /// Payload length in bytes.
    pub data_len: usize,
}

impl CollectionHeader {
    /// Parse a collection header from the first 12 bytes of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self, CmpError> {
        if buf.len() < COLLECTION_HDR_SIZE {
            return Err(CmpError::ChunkTooSmall(buf.len()));
        }

        let timestamp = u64::from(read_be(buf, 0, 4)) << 16 | u64::from(read_be(buf, 4, 2));
        let config_id = read_be(buf, 6, 2) as u16;
        let collection_id = read_be(buf, 8, 2) as u16;
        let data_len = read_be(buf, 10, 2) as usize;

        Ok(Self {
            timestamp,
            config_id,
            packet_type: (collection_id >> 15) as u8,
            subservice: ((collection_id >> 9) & 0x3F) as u8,
            ccd_id: ((collection_id >> 7) & 0x3) as u8,
            sequence: (collection_id & 0x7F) as u8,
            data_len,
        })
    }

    /// Packed 16-bit collection identifier.
    pub fn collection_id(&self) -> u16 {
        u16::from(self.packet_type & 1) << 15
            | u16::from(self.subservice & 0x3F) << 9
            | u16::from(self.ccd_id & 0x3) << 7
            | u16::from(self.sequence & 0x7F)
    }

    /// Serialize the header into the first 12 bytes of `buf`.
    pub fn write_to(&self, buf: &mut [u8]) -> Result<(), CmpError> {
        if buf.len() < COLLECTION_HDR_SIZE {
            return Err(CmpError::BufferTooSmall);
        }
        if self.timestamp >> 48 != 0 {
            return Err(CmpError::TimestampOutOfRange(self.timestamp));
        }
        if self.data_len > 0xFFFF {
            return Err(CmpError::SizeTooLarge(self.data_len));
        }

        write_be(buf, 0, 4, (self.timestamp >> 16) as u32);
        write_be(buf, 4, 2, (self.timestamp & 0xFFFF) as u32);
        write_be(buf, 6, 2, u32::from(self.config_id));
        write_be(buf, 8, 2, u32::from(self.collection_id()));
        write_be(buf, 10, 2, self.data_len as u32);
        Ok(())
    }
}

/// Read a big-endian unsigned integer of `bytes` bytes (1-4).
#[inline]
pub(crate) fn read_be(buf: &[u8], offset: usize, bytes: usize) -> u32 {
    let mut value = 0u32;
    for i in 0..bytes {
        value = (value << 8) | u32::from(buf[offset + i]);
    }
    value
}

/// Write a big-endian unsigned integer of `bytes` bytes (1-4).
///
/// The value is masked to the field width.
#[inline]
pub(crate) fn write_be(buf: &mut [u8], offset: usize, bytes: usize, value: u32) {
    for i in 0..bytes {
        buf[offset + i] = (value >> (8 * (bytes - 1 - i))) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_seventeen_shapes_resolve() {
        for ss in 1u8..=17 {
            let ty = DataType::from_subservice(ss).unwrap();
            assert_eq!(ty.to_wire(), u16::from(ss));
            assert!(!ty.fields().is_empty());
            assert!(ty.record_size() > 0);
        }
        assert!(DataType::from_subservice(0).is_none());
        assert!(DataType::from_subservice(18).is_none());
        assert!(DataType::from_subservice(63).is_none());
    }

    #[test]
    fn test_record_sizes() {
        assert_eq!(DataType::Imagette.record_size(), 2);
        assert_eq!(DataType::SFx.record_size(), 5);
        assert_eq!(DataType::SFxEfx.record_size(), 9);
        assert_eq!(DataType::SFxNcob.record_size(), 13);
        assert_eq!(DataType::SFxEfxNcobEcob.record_size(), 25);
        assert_eq!(DataType::LFx.record_size(), 7);
        assert_eq!(DataType::LFxEfxNcobEcob.record_size(), 27);
        assert_eq!(DataType::FFx.record_size(), 4);
        assert_eq!(DataType::FFxEfxNcobEcob.record_size(), 24);
        assert_eq!(DataType::Offset.record_size(), 8);
        assert_eq!(DataType::Background.record_size(), 10);
        assert_eq!(DataType::Smearing.record_size(), 8);
    }

    #[test]
    fn test_field_tables_are_contiguous() {
        for ss in 1u8..=17 {
            let ty = DataType::from_subservice(ss).unwrap();
            let mut expected = 0;
            for f in ty.fields() {
                assert_eq!(f.offset, expected, "{ty:?}");
                assert!(f.bytes >= 1 && f.bytes <= 4);
                assert!(f.slot < 6);
                expected += f.bytes;
            }
            assert_eq!(expected, ty.record_size(), "{ty:?}");
            assert!(ty.fields().len() <= MAX_RECORD_FIELDS);
        }
    }

    #[test]
    fn test_classes() {
        assert_eq!(DataType::Imagette.class(), ChunkClass::Imagette);
        assert_eq!(DataType::SatImagette.class(), ChunkClass::Imagette);
        assert_eq!(DataType::ImagetteAdaptive.class(), ChunkClass::Imagette);
        assert_eq!(DataType::SFxEfx.class(), ChunkClass::ShortCadence);
        assert_eq!(DataType::LFxNcob.class(), ChunkClass::LongCadence);
        assert_eq!(DataType::FFx.class(), ChunkClass::FastCadence);
        assert_eq!(DataType::Offset.class(), ChunkClass::Auxiliary);
        assert_eq!(DataType::Smearing.class(), ChunkClass::Auxiliary);
    }

    #[test]
    fn test_collection_header_round_trip() {
        let hdr = CollectionHeader {
            timestamp: 0x0123_4567_89AB,
            config_id: 0xCAFE,
            packet_type: 1,
            subservice: 3,
            ccd_id: 2,
            sequence: 0x55,
            data_len: 20,
        };

        let mut buf = [0u8; COLLECTION_HDR_SIZE];
        hdr.write_to(&mut buf).unwrap();

        let parsed = CollectionHeader::parse(&buf).unwrap();
        assert_eq!(parsed, hdr);
    }

    #[test]
    fn test_collection_id_packing() {
        let hdr = CollectionHeader {
            timestamp: 0,
            config_id: 0,
            packet_type: 1,
            subservice: 0x3F,
            ccd_id: 0x3,
            sequence: 0x7F,
            data_len: 0,
        };
        assert_eq!(hdr.collection_id(), 0xFFFF);

        let hdr = CollectionHeader {
            packet_type: 0,
            subservice: 1,
            ccd_id: 0,
            sequence: 0,
            ..hdr
        };
        assert_eq!(hdr.collection_id(), 1 << 9);
    }

    #[test]
    fn test_collection_header_rejects_bad_values() {
        let hdr = CollectionHeader {
            timestamp: 1 << 48,
            config_id: 0,
            packet_type: 0,
            subservice: 1,
            ccd_id: 0,
            sequence: 0,
            data_len: 0,
        };
        let mut buf = [0u8; COLLECTION_HDR_SIZE];
        assert!(matches!(
            hdr.write_to(&mut buf),
            Err(CmpError::TimestampOutOfRange(_))
        ));

        let mut small = [0u8; 4];
        let ok = CollectionHeader {
            timestamp: 0,
            ..hdr
        };
        assert!(matches!(
            ok.write_to(&mut small),
            Err(CmpError::BufferTooSmall)
        ));
    }

    #[test]
    fn test_be_helpers() {
        let mut buf = [0u8; 4];
        write_be(&mut buf, 0, 4, 0x0102_0304);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(read_be(&buf, 0, 4), 0x0102_0304);
        assert_eq!(read_be(&buf, 1, 2), 0x0203);

        write_be(&mut buf, 1, 2, 0xBEEF);
        assert_eq!(buf, [1, 0xBE, 0xEF, 4]);
    }
}
