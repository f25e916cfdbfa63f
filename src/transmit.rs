//! Sparse and Rectangle transmission payload packing, including software
//! rotation (§4.6, §4.7).
//!
//! Every function here only computes bytes; none perform I/O, and none
//! allocate a fresh buffer per pixel or per tile. Callers own the
//! scratch/pooled buffers (§3, §5) and pass them in by mutable
//! reference, reused across pixels and tiles.

use crate::buffer::ScreenBuffer;
use crate::color::Rgb565;
use crate::diff::BoundingBox;

/// Synchronizes the shadow for a rectangle transmit (§4.7 "First
/// synchronize"): copies each row of the bounding box from `submitted`
/// into `shadow`. Must complete before any tile is packed, since tiles
/// are packed by reading back out of `shadow`.
pub fn sync_rectangle(
    submitted: &[Rgb565],
    w: usize,
    shadow: &mut ScreenBuffer,
    left: usize,
    top: usize,
    bbox: BoundingBox,
) {
    let shadow_w = shadow.width();
    let diff_w = bbox.width();
    let diff_h = bbox.height();
    let abs_left = left + bbox.min_x;
    let abs_top = top + bbox.min_y;

    for row in 0..diff_h {
        let src_row_start = (bbox.min_y + row) * w + bbox.min_x;
        let src_row = &submitted[src_row_start..src_row_start + diff_w];
        let dst_row_start = (abs_top + row) * shadow_w + abs_left;
        shadow.as_mut_slice()[dst_row_start..dst_row_start + diff_w].copy_from_slice(src_row);
    }
}

/// Packs a single tile's pixels into `payload`, which is cleared and
/// resized to exactly fit; its backing allocation is the caller's to
/// reuse tile to tile, so repeated calls never grow it past the largest
/// tile seen (at most `MAX_BLOCK_HEIGHT` rows, §5).
///
/// `(log_x, log_y, log_w, log_h)` is the tile's rectangle in *logical*
/// coordinates within `source` (stride `source_stride`). When
/// `software_rotation` is set, the payload is packed transposed and the
/// returned rectangle is the physical one (§4.7). Returns the `(x, y,
/// w, h)` to encode in that tile's header.
pub fn pack_tile(
    source: &[Rgb565],
    source_stride: usize,
    log_x: usize,
    log_y: usize,
    log_w: usize,
    log_h: usize,
    software_rotation: bool,
    payload: &mut Vec<u8>,
) -> (u16, u16, u16, u16) {
    payload.clear();
    if !software_rotation {
        payload.resize(log_w * log_h * 2, 0);
        for row in 0..log_h {
            let src_start = (log_y + row) * source_stride + log_x;
            let src_row = &source[src_start..src_start + log_w];
            let dst_start = row * log_w * 2;
            for (col, &px) in src_row.iter().enumerate() {
                payload[dst_start + col * 2] = (px & 0xFF) as u8;
                payload[dst_start + col * 2 + 1] = (px >> 8) as u8;
            }
        }
        (log_x as u16, log_y as u16, log_w as u16, log_h as u16)
    } else {
        // Physical rect: (logY, logX, logH, logW).
        let phys_w = log_h;
        let phys_h = log_w;
        payload.resize(phys_w * phys_h * 2, 0);
        for row in 0..phys_h {
            for col in 0..phys_w {
                let px = source[(log_y + col) * source_stride + log_x + row];
                let dst = (row * phys_w + col) * 2;
                payload[dst] = (px & 0xFF) as u8;
                payload[dst + 1] = (px >> 8) as u8;
            }
        }
        (log_y as u16, log_x as u16, phys_w as u16, phys_h as u16)
    }
}

/// Packs a 1x1 pixel payload (two bytes, little-endian) for the sparse
/// path (§4.6). A plain stack value — the sparse path never needs a
/// heap buffer at all.
pub fn pixel_payload(color: Rgb565) -> [u8; 2] {
    [(color & 0xFF) as u8, (color >> 8) as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_rectangle_copies_bbox_rows_into_shadow() {
        let mut shadow = ScreenBuffer::new(320, 480);
        let mut submitted = vec![0u16; 320 * 480];
        submitted[20 * 320 + 10] = 0xF800;
        let bbox = BoundingBox {
            min_x: 10,
            min_y: 20,
            max_x: 10,
            max_y: 20,
        };
        sync_rectangle(&submitted, 320, &mut shadow, 0, 0, bbox);
        assert_eq!(shadow.get(10, 20).unwrap(), 0xF800);
        assert_eq!(shadow.get(9, 20).unwrap(), 0);
    }

    #[test]
    fn pack_tile_dense_overlay_splits_by_40_rows() {
        let mut shadow = ScreenBuffer::new(320, 480);
        shadow.clear_to_color(0xFFFF);
        let mut payload = Vec::new();
        let mut consumed = 0usize;
        let mut heights = Vec::new();
        while consumed < 100 {
            let tile_h = (100 - consumed).min(40);
            let (_, _, w, h) = pack_tile(shadow.as_slice(), 320, 0, consumed, 100, tile_h, false, &mut payload);
            assert_eq!(payload.len(), w as usize * h as usize * 2);
            heights.push(h as usize);
            consumed += tile_h;
        }
        assert_eq!(heights, vec![40, 40, 20]);
    }

    #[test]
    fn pack_tile_reuses_the_same_allocation_across_calls() {
        let mut shadow = ScreenBuffer::new(320, 480);
        let mut payload = Vec::new();
        pack_tile(shadow.as_slice(), 320, 0, 0, 100, 40, false, &mut payload);
        let cap_after_first = payload.capacity();
        pack_tile(shadow.as_slice(), 320, 0, 0, 10, 5, false, &mut payload);
        // Shrinking tiles must not reallocate; capacity never drops.
        assert!(payload.capacity() >= cap_after_first);
        assert_eq!(payload.len(), 10 * 5 * 2);
        let _ = &mut shadow;
    }

    #[test]
    fn pack_tile_payload_length_matches_tile_dims() {
        let shadow = ScreenBuffer::new(320, 480);
        let mut payload = Vec::new();
        let submitted = vec![0x1234u16; 50 * 7];
        let (x, y, w, h) = pack_tile(&submitted, 50, 0, 0, 50, 7, false, &mut payload);
        assert_eq!((x, y, w, h), (0, 0, 50, 7));
        assert_eq!(payload.len(), 50 * 7 * 2);
        let _ = &shadow;
    }

    #[test]
    fn software_rotation_transposes_a_horizontal_line() {
        // Logical 480x320 surface; a 480x1 line at logical (0,0).
        let submitted = vec![0xF800u16; 480];
        let mut payload = Vec::new();
        let (x, y, w, h) = pack_tile(&submitted, 480, 0, 0, 480, 1, true, &mut payload);
        assert_eq!((x, y, w, h), (0, 0, 1, 480));
        assert_eq!(payload.len(), 480 * 2);
        assert!(payload.chunks(2).all(|c| c == [0x00, 0xF8]));
    }

    #[test]
    fn pixel_payload_packs_little_endian() {
        assert_eq!(pixel_payload(0xF800), [0x00, 0xF8]);
        assert_eq!(pixel_payload(0x0000), [0x00, 0x00]);
    }
}
