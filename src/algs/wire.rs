//! Fixed, versioned, little-endian wire types for in-transit block exchange.
//!
//! A message is a [`WireHdr`], a [`WireCount`] of blocks, then for each block
//! a [`WireBlockHdr`], optional explicit coordinates, and its arrays (each a
//! [`WireArrayHdr`], the UTF-8 name, then the value bytes).

use crate::data::array::{ArrayValues, Association, FieldArray, ScalarType};
use crate::data::mesh::{BlockMesh, Extent, ImageGeometry, MeshType};
use crate::sensei_error::SenseiError;
use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::mem::size_of;
use std::sync::Arc;

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// Message kinds carried in [`WireHdr::kind`].
pub const KIND_BLOCKS: u16 = 1;

// ===== Common records ======================================================

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireHdr {
    pub version_le: u16,
    pub kind_le: u16,
    pub reserved_le: u32, // keep zero
}

impl WireHdr {
    pub fn new(kind: u16) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            reserved_le: 0,
        }
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32,
}
impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u32).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

// ===== Blocks ==============================================================

const HAS_EXTENT: u16 = 1;
const HAS_GEOMETRY: u16 = 1 << 1;
const HAS_POINTS: u16 = 1 << 2;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireBlockHdr {
    pub block_id_le: u64,
    pub num_points_le: u64,
    pub num_cells_le: u64,
    pub extent_le: [i64; 6],
    /// `f64` bit patterns.
    pub origin_le: [u64; 3],
    pub spacing_le: [u64; 3],
    pub mesh_type_le: u16,
    pub flags_le: u16,
    pub n_arrays_le: u32,
}

impl WireBlockHdr {
    pub fn of(block: &BlockMesh, n_arrays: usize) -> Self {
        let mut flags = 0u16;
        let extent = block.extent.unwrap_or(Extent::EMPTY);
        if block.extent.is_some() {
            flags |= HAS_EXTENT;
        }
        let g = block.geometry.unwrap_or_default();
        if block.geometry.is_some() {
            flags |= HAS_GEOMETRY;
        }
        if block.points.is_some() {
            flags |= HAS_POINTS;
        }
        Self {
            block_id_le: (block.block_id as u64).to_le(),
            num_points_le: (block.num_points as u64).to_le(),
            num_cells_le: (block.num_cells as u64).to_le(),
            extent_le: extent.0.map(i64::to_le),
            origin_le: g.origin.map(|x| x.to_bits().to_le()),
            spacing_le: g.spacing.map(|x| x.to_bits().to_le()),
            mesh_type_le: (block.kind as u16).to_le(),
            flags_le: flags.to_le(),
            n_arrays_le: (n_arrays as u32).to_le(),
        }
    }

    pub fn block_id(&self) -> usize {
        u64::from_le(self.block_id_le) as usize
    }
    pub fn flags(&self) -> u16 {
        u16::from_le(self.flags_le)
    }
    pub fn n_arrays(&self) -> usize {
        u32::from_le(self.n_arrays_le) as usize
    }

    /// The block shell (no arrays, no explicit points).
    pub fn to_block(&self) -> BlockMesh {
        let flags = self.flags();
        let kind = MeshType::from_code(u16::from_le(self.mesh_type_le));
        let extent = (flags & HAS_EXTENT != 0).then(|| Extent(self.extent_le.map(i64::from_le)));
        let geometry = (flags & HAS_GEOMETRY != 0).then(|| ImageGeometry {
            origin: self.origin_le.map(|b| f64::from_bits(u64::from_le(b))),
            spacing: self.spacing_le.map(|b| f64::from_bits(u64::from_le(b))),
        });
        let mut block = match extent {
            Some(e) => BlockMesh::image(self.block_id(), e, geometry),
            None => BlockMesh::unstructured(self.block_id(), 0, 0),
        };
        block.kind = kind;
        block.num_points = u64::from_le(self.num_points_le) as usize;
        block.num_cells = u64::from_le(self.num_cells_le) as usize;
        block
    }
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireArrayHdr {
    pub name_len_le: u32,
    pub association_le: u16, // 0 = point, 1 = cell
    pub scalar_le: u16,
    pub components_le: u32,
    pub _pad: u32,
    pub byte_len_le: u64,
}

impl WireArrayHdr {
    pub fn of(array: &FieldArray, byte_len: usize) -> Self {
        let association = match array.association {
            Association::Point => 0u16,
            Association::Cell => 1u16,
        };
        Self {
            name_len_le: (array.name.len() as u32).to_le(),
            association_le: association.to_le(),
            scalar_le: (array.scalar_type() as u16).to_le(),
            components_le: (array.components as u32).to_le(),
            _pad: 0,
            byte_len_le: (byte_len as u64).to_le(),
        }
    }
}

// ===== Compile-time sanity checks =========================================

const_assert_eq!(size_of::<WireHdr>(), 8);
const_assert_eq!(size_of::<WireCount>(), 4);
const_assert_eq!(size_of::<WireBlockHdr>(), 128);
const_assert_eq!(size_of::<WireArrayHdr>(), 24);

// ===== Encoding =============================================================

fn put<T: Pod>(out: &mut Vec<u8>, v: &T) {
    out.extend_from_slice(bytemuck::bytes_of(v));
}

/// Serialise whole blocks (geometry, points and every array).
pub fn encode_blocks<'a, I>(blocks: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a BlockMesh>,
{
    let blocks: Vec<&BlockMesh> = blocks.into_iter().collect();
    let mut out = Vec::new();
    put(&mut out, &WireHdr::new(KIND_BLOCKS));
    put(&mut out, &WireCount::new(blocks.len()));
    for block in blocks {
        let arrays: Vec<&FieldArray> = block
            .array_iter(Association::Point)
            .chain(block.array_iter(Association::Cell))
            .collect();
        put(&mut out, &WireBlockHdr::of(block, arrays.len()));
        if let Some(xyz) = &block.points {
            put(&mut out, &(xyz.len() as u64).to_le());
            for x in xyz.iter() {
                out.extend_from_slice(&x.to_le_bytes());
            }
        }
        for array in arrays {
            let data = array.values.to_le_bytes();
            put(&mut out, &WireArrayHdr::of(array, data.len()));
            out.extend_from_slice(array.name.as_bytes());
            out.extend_from_slice(&data);
        }
    }
    out
}

/// Cursor over a received buffer; records are read unaligned.
struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    fn bytes(&mut self, n: usize) -> Result<&'a [u8], SenseiError> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.buf.len());
        let end = end.ok_or_else(|| {
            SenseiError::Wire(format!(
                "truncated message: need {n} bytes at offset {}, have {}",
                self.pos,
                self.buf.len()
            ))
        })?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn pod<T: Pod>(&mut self) -> Result<T, SenseiError> {
        Ok(bytemuck::pod_read_unaligned(self.bytes(size_of::<T>())?))
    }
}

/// Inverse of [`encode_blocks`].
pub fn decode_blocks(buf: &[u8]) -> Result<Vec<BlockMesh>, SenseiError> {
    let mut r = WireReader { buf, pos: 0 };
    let hdr: WireHdr = r.pod()?;
    if hdr.version() != WIRE_VERSION || hdr.kind() != KIND_BLOCKS {
        return Err(SenseiError::Wire(format!(
            "unexpected header version {} kind {}",
            hdr.version(),
            hdr.kind()
        )));
    }
    let n = r.pod::<WireCount>()?.get();
    // the count comes off the wire; bound it by what the buffer can hold
    let mut blocks = Vec::with_capacity(n.min(buf.len() / size_of::<WireBlockHdr>()));
    for _ in 0..n {
        let bh: WireBlockHdr = r.pod()?;
        let mut block = bh.to_block();
        if bh.flags() & HAS_POINTS != 0 {
            let len = u64::from_le(r.pod::<u64>()?) as usize;
            let raw = r.bytes(len.saturating_mul(8))?;
            let xyz: Arc<[f64]> = raw
                .chunks_exact(8)
                .map(|c| f64::from_le_bytes(bytemuck::pod_read_unaligned(c)))
                .collect();
            block.points = Some(xyz);
        }
        for _ in 0..bh.n_arrays() {
            let ah: WireArrayHdr = r.pod()?;
            let name = std::str::from_utf8(r.bytes(u32::from_le(ah.name_len_le) as usize)?)
                .map_err(|e| SenseiError::Wire(format!("array name: {e}")))?
                .to_string();
            let association = match u16::from_le(ah.association_le) {
                0 => Association::Point,
                1 => Association::Cell,
                other => return Err(SenseiError::Wire(format!("bad association {other}"))),
            };
            let scalar = ScalarType::from_code(u16::from_le(ah.scalar_le)).ok_or_else(|| {
                SenseiError::Wire(format!("bad scalar type {}", u16::from_le(ah.scalar_le)))
            })?;
            let data = r.bytes(u64::from_le(ah.byte_len_le) as usize)?;
            let values = ArrayValues::from_le_bytes(scalar, data)?;
            block.insert_array(FieldArray::new(
                name,
                association,
                u32::from_le(ah.components_le) as usize,
                values,
            ));
        }
        blocks.push(block);
    }
    if r.pos != buf.len() {
        return Err(SenseiError::Wire(format!(
            "{} trailing bytes after {n} blocks",
            buf.len() - r.pos
        )));
    }
    Ok(blocks)
}

/// Flatten `[x, y, z]` points into the layout [`BlockMesh::points`] uses.
pub fn points_from(xyz: &[[f64; 3]]) -> Arc<[f64]> {
    xyz.iter().flatten().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_guard() {
        let hdr = WireHdr::new(KIND_BLOCKS);
        assert_eq!(hdr.version(), WIRE_VERSION);
        assert_eq!(hdr.kind(), KIND_BLOCKS);
    }

    #[test]
    fn image_block_with_arrays_decodes() {
        let g = ImageGeometry {
            origin: [0.5, 0.0, -1.0],
            spacing: [0.25, 1.0, 1.0],
        };
        let mut b = BlockMesh::image(4, Extent([0, 1, 0, 1, 0, 0]), Some(g));
        b.insert_array(FieldArray::scalar(
            "pressure",
            Association::Point,
            vec![1.0f32, 2.0, 3.0, 4.0],
        ));
        b.insert_array(FieldArray::scalar("rank", Association::Cell, vec![7i32]));
        let got = decode_blocks(&encode_blocks([&b])).unwrap();
        assert_eq!(got, vec![b]);
    }

    #[test]
    fn explicit_points_survive() {
        let b = BlockMesh::unstructured(2, 0, 1)
            .with_points(points_from(&[[0.0, 0.0, 0.0], [1.0, 2.0, 3.0]]));
        let got = decode_blocks(&encode_blocks([&b])).unwrap();
        assert_eq!(got[0].num_points, 2);
        assert_eq!(got[0].points, b.points);
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let b = BlockMesh::image(0, Extent([0, 1, 0, 0, 0, 0]), None);
        let bytes = encode_blocks([&b]);
        let err = decode_blocks(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, SenseiError::Wire(_)));
    }
}
