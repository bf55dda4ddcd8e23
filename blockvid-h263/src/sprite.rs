//! Global motion (sprite) warp parameter derivation.
//!
//! An S-picture codes up to three control-point displacements; everything
//! else — virtual reference points on power-of-two geometry, the 2x2 affine
//! delta matrix, shifts and offsets — is derived here with integer math so
//! the per-pixel warp downstream can use shifts instead of divisions.
use blockvid_core::codecs::{CodecError, CodecResult};
use blockvid_core::io::bitreader::BitReader;
use blockvid_core::io::bitwriter::BitWriter;
use blockvid_core::io::codebook::CodebookReader;

use crate::MV;
use crate::blockcodec::Tables;
use crate::data::SPRITE_TRAJ_CODES;
use crate::pred::round_div;

/// Derived affine warp parameters, recomputed for every picture that
/// signals global motion and never cached across pictures.
#[derive(Debug,Clone,Copy,PartialEq)]
pub struct SpriteWarp {
    pub delta:       [[i32; 2]; 2],
    pub shift:       [u8; 2],
    pub offset_luma: [i32; 2],
    pub offset_chroma: [i32; 2],
    /// Number of warp points after degeneracy collapsing: 0 = identity,
    /// 1 = pure translation, 2-3 = full affine.
    pub real_points: usize,
    /// The coded control-point displacements, kept for re-emission.
    pub traj:        [(i32, i32); 3],
    accuracy:        u8,
}

fn check_marker(br: &mut BitReader) -> CodecResult<()> {
    if !br.read_bool()? {
        return Err(CodecError::InconsistentHeader);
    }
    Ok(())
}

fn read_xbits(br: &mut BitReader, len: u8) -> CodecResult<i32> {
    let bits = br.read(len)?;
    if (bits >> (len - 1)) != 0 {
        Ok(bits as i32)
    } else {
        Ok(bits as i32 - (1 << len) + 1)
    }
}

/// Reads the coded control-point displacements for `num_points` warp points.
pub fn decode_trajectory(br: &mut BitReader, tab: &Tables,
                         num_points: usize) -> CodecResult<[(i32, i32); 3]> {
    let mut d = [(0i32, 0i32); 3];
    for point in d.iter_mut().take(num_points) {
        let len = br.read_cb(&tab.traj_cb)?;
        let x = if len > 0 { read_xbits(br, len)? } else { 0 };
        check_marker(br)?;
        let len = br.read_cb(&tab.traj_cb)?;
        let y = if len > 0 { read_xbits(br, len)? } else { 0 };
        check_marker(br)?;
        *point = (x, y);
    }
    Ok(d)
}

/// Writes control-point displacements, the encoder-side mirror of
/// [`decode_trajectory`].
pub fn encode_trajectory(bw: &mut BitWriter, points: &[(i32, i32)]) -> CodecResult<()> {
    for &(x, y) in points {
        for &v in &[x, y] {
            let mut len = 0u8;
            let mag = v.abs() as u32;
            while (mag >> len) != 0 { len += 1; }
            if usize::from(len) >= SPRITE_TRAJ_CODES.len() {
                return Err(CodecError::OutOfRangeIndex);
            }
            let (code, bits) = SPRITE_TRAJ_CODES[len as usize];
            bw.write(u32::from(code), bits);
            if len > 0 {
                let coded = if v >= 0 { v } else { v + (1 << len) - 1 };
                bw.write(coded as u32, len);
            }
            bw.write1();
        }
    }
    Ok(())
}

impl SpriteWarp {
    /// Derives the warp parameters from decoded control-point displacements.
    #[allow(clippy::needless_range_loop)]
    pub fn derive(d: &[(i32, i32); 3], num_points: usize, accuracy: u8,
                  width: usize, height: usize) -> CodecResult<Self> {
        if num_points > 3 || width == 0 || height == 0 {
            return Err(CodecError::OutOfRangeIndex);
        }
        let a = 2i32 << accuracy;
        let rho = 3 - i32::from(accuracy);
        let r = 16 / a;
        let w = width as i32;
        let h = height as i32;

        let vop_ref: [[i32; 2]; 3] = [[0, 0], [w, 0], [0, h]];
        let mut dacc = [[0i32; 2]; 3];
        dacc[0] = [d[0].0, d[0].1];
        dacc[1] = [d[0].0 + d[1].0, d[0].1 + d[1].1];
        dacc[2] = [d[0].0 + d[2].0, d[0].1 + d[2].1];

        let mut alpha = 1u8;
        let mut beta = 0u8;
        while (1 << alpha) < w { alpha += 1; }
        while (1 << beta) < h { beta += 1; }
        let w2 = 1i32 << alpha;
        let h2 = 1i32 << beta;

        let mut sprite_ref = [[0i64; 2]; 3];
        for i in 0..3 {
            sprite_ref[i][0] = i64::from(a >> 1) * i64::from(2 * vop_ref[i][0] + dacc[i][0]);
            sprite_ref[i][1] = i64::from(a >> 1) * i64::from(2 * vop_ref[i][1] + dacc[i][1]);
        }

        let rdiv = |num: i64, den: i64| -> i64 {
            if num >= 0 { (num + (den >> 1)) / den } else { (num - (den >> 1)) / den }
        };
        let r64 = i64::from(r);
        let mut virtual_ref = [[0i64; 2]; 2];
        virtual_ref[0][0] = 16 * i64::from(w2)
            + rdiv(i64::from(w - w2) * (r64 * sprite_ref[0][0])
                   + i64::from(w2) * (r64 * sprite_ref[1][0] - 16 * i64::from(w)),
                   i64::from(w));
        virtual_ref[0][1] = rdiv(i64::from(w - w2) * (r64 * sprite_ref[0][1])
                                 + i64::from(w2) * r64 * sprite_ref[1][1],
                                 i64::from(w));
        virtual_ref[1][0] = rdiv(i64::from(h - h2) * (r64 * sprite_ref[0][0])
                                 + i64::from(h2) * r64 * sprite_ref[2][0],
                                 i64::from(h));
        virtual_ref[1][1] = 16 * i64::from(h2)
            + rdiv(i64::from(h - h2) * (r64 * sprite_ref[0][1])
                   + i64::from(h2) * (r64 * sprite_ref[2][1] - 16 * i64::from(h)),
                   i64::from(h));

        let mut offset = [[0i64; 2]; 2];
        let mut delta = [[0i64; 2]; 2];
        let mut shift = [0u8; 2];
        match num_points {
            0 => {
                delta[0][0] = i64::from(a);
                delta[1][1] = i64::from(a);
            },
            1 => {
                offset[0][0] = sprite_ref[0][0];
                offset[0][1] = sprite_ref[0][1];
                offset[1][0] = (sprite_ref[0][0] >> 1) | (sprite_ref[0][0] & 1);
                offset[1][1] = (sprite_ref[0][1] >> 1) | (sprite_ref[0][1] & 1);
                delta[0][0] = i64::from(a);
                delta[1][1] = i64::from(a);
            },
            2 => {
                let sh = u32::from(alpha) + rho as u32;
                offset[0][0] = sprite_ref[0][0] * (1i64 << sh)
                    + (1i64 << (sh - 1));
                offset[0][1] = sprite_ref[0][1] * (1i64 << sh)
                    + (1i64 << (sh - 1));
                offset[1][0] = (-r64 * sprite_ref[0][0] + virtual_ref[0][0])
                    + (r64 * sprite_ref[0][1] - virtual_ref[0][1])
                    + 2 * i64::from(w2) * r64 * sprite_ref[0][0]
                    - 16 * i64::from(w2) + (1i64 << (sh + 1));
                offset[1][1] = (-r64 * sprite_ref[0][1] + virtual_ref[0][1])
                    + (-r64 * sprite_ref[0][0] + virtual_ref[0][0])
                    + 2 * i64::from(w2) * r64 * sprite_ref[0][1]
                    - 16 * i64::from(w2) + (1i64 << (sh + 1));
                delta[0][0] = -r64 * sprite_ref[0][0] + virtual_ref[0][0];
                delta[0][1] =  r64 * sprite_ref[0][1] - virtual_ref[0][1];
                delta[1][0] = -r64 * sprite_ref[0][1] + virtual_ref[0][1];
                delta[1][1] = -r64 * sprite_ref[0][0] + virtual_ref[0][0];
                shift[0] = sh as u8;
                shift[1] = sh as u8 + 2;
            },
            _ => {
                let min_ab = alpha.min(beta);
                let w3 = i64::from(w2 >> min_ab);
                let h3 = i64::from(h2 >> min_ab);
                let sh = u32::from(alpha) + u32::from(beta) + rho as u32 - u32::from(min_ab);
                offset[0][0] = sprite_ref[0][0] * (1i64 << sh) + (1i64 << (sh - 1));
                offset[0][1] = sprite_ref[0][1] * (1i64 << sh) + (1i64 << (sh - 1));
                offset[1][0] = (-r64 * sprite_ref[0][0] + virtual_ref[0][0]) * h3
                    + (-r64 * sprite_ref[0][0] + virtual_ref[1][0]) * w3
                    + 2 * i64::from(w2) * h3 * r64 * sprite_ref[0][0]
                    - 16 * i64::from(w2) * h3 + (1i64 << (sh + 1));
                offset[1][1] = (-r64 * sprite_ref[0][1] + virtual_ref[0][1]) * h3
                    + (-r64 * sprite_ref[0][1] + virtual_ref[1][1]) * w3
                    + 2 * i64::from(w2) * h3 * r64 * sprite_ref[0][1]
                    - 16 * i64::from(w2) * h3 + (1i64 << (sh + 1));
                delta[0][0] = (-r64 * sprite_ref[0][0] + virtual_ref[0][0]) * h3;
                delta[0][1] = (-r64 * sprite_ref[0][0] + virtual_ref[1][0]) * w3;
                delta[1][0] = (-r64 * sprite_ref[0][1] + virtual_ref[0][1]) * h3;
                delta[1][1] = (-r64 * sprite_ref[0][1] + virtual_ref[1][1]) * w3;
                shift[0] = sh as u8;
                shift[1] = sh as u8 + 2;
            },
        }

        let mut real_points = num_points;
        if delta[0][0] == i64::from(a) << shift[0]
            && delta[0][1] == 0
            && delta[1][0] == 0
            && delta[1][1] == i64::from(a) << shift[0] {
            offset[0][0] >>= shift[0];
            offset[0][1] >>= shift[0];
            offset[1][0] >>= shift[1];
            offset[1][1] >>= shift[1];
            delta[0][0] = i64::from(a);
            delta[0][1] = 0;
            delta[1][0] = 0;
            delta[1][1] = i64::from(a);
            shift = [0, 0];
            if num_points > 1 { real_points = 1; }
        }

        for row in &offset {
            for &v in row {
                if v < i64::from(i32::min_value()) || v > i64::from(i32::max_value()) {
                    return Err(CodecError::OutOfRangeIndex);
                }
            }
        }
        for row in &delta {
            for &v in row {
                if v < i64::from(i32::min_value()) || v > i64::from(i32::max_value()) {
                    return Err(CodecError::OutOfRangeIndex);
                }
            }
        }

        Ok(SpriteWarp {
            delta: [[delta[0][0] as i32, delta[0][1] as i32],
                    [delta[1][0] as i32, delta[1][1] as i32]],
            shift,
            offset_luma:   [offset[0][0] as i32, offset[0][1] as i32],
            offset_chroma: [offset[1][0] as i32, offset[1][1] as i32],
            real_points,
            traj: *d,
            accuracy,
        })
    }

    /// Half-pel motion vector seeded into skipped macroblocks of a GMC
    /// picture: the translation component of the warp.
    pub fn skip_mv(&self) -> MV {
        let a = 2i32 << self.accuracy;
        let scale = a / 2;
        let x = round_div(self.offset_luma[0] >> self.shift[0], scale.max(1));
        let y = round_div(self.offset_luma[1] >> self.shift[0], scale.max(1));
        MV::new(x as i16, y as i16)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_points_is_identity() {
        let warp = SpriteWarp::derive(&[(0, 0); 3], 0, 1, 352, 288).unwrap();
        let a = 2 << 1;
        assert_eq!(warp.delta, [[a, 0], [0, a]]);
        assert_eq!(warp.shift, [0, 0]);
        assert_eq!(warp.offset_luma, [0, 0]);
        assert_eq!(warp.real_points, 0);
        assert_eq!(warp.skip_mv(), MV::new(0, 0));
    }

    #[test]
    fn one_zero_point_is_identity_transform() {
        // one warp point at displacement (0,0): delta = base scale,
        // shift = 0, offset = 0
        let warp = SpriteWarp::derive(&[(0, 0); 3], 1, 1, 352, 288).unwrap();
        let a = 2 << 1;
        assert_eq!(warp.delta, [[a, 0], [0, a]]);
        assert_eq!(warp.shift, [0, 0]);
        assert_eq!(warp.offset_luma, [0, 0]);
        assert_eq!(warp.skip_mv(), MV::new(0, 0));
    }

    #[test]
    fn one_point_translation() {
        let warp = SpriteWarp::derive(&[(6, -4), (0, 0), (0, 0)], 1, 1, 176, 144).unwrap();
        assert_eq!(warp.real_points, 1);
        assert_eq!(warp.shift, [0, 0]);
        // accuracy 1 -> quarter-pel units; offsets carry the deltas scaled
        // by a/2
        assert_eq!(warp.offset_luma, [(2 << 1) / 2 * 6, (2 << 1) / 2 * -4]);
        assert_eq!(warp.skip_mv(), MV::new(6, -4));
    }

    #[test]
    fn degenerate_affine_collapses() {
        // two warp points describing a pure translation must collapse to
        // the cheap representation with zero shift
        let warp = SpriteWarp::derive(&[(8, 8), (0, 0), (0, 0)], 2, 1, 256, 256).unwrap();
        assert_eq!(warp.real_points, 1);
        assert_eq!(warp.shift, [0, 0]);
        let a = 2 << 1;
        assert_eq!(warp.delta, [[a, 0], [0, a]]);
    }

    #[test]
    fn trajectory_roundtrip() {
        let tab = Tables::new();
        let pts = [(0i32, 0i32), (17, -1), (-256, 255)];
        let mut bw = BitWriter::new(Vec::new());
        encode_trajectory(&mut bw, &pts).unwrap();
        let data = bw.end();
        let mut br = BitReader::new(&data);
        let out = decode_trajectory(&mut br, &tab, 3).unwrap();
        assert_eq!(out, pts);
    }
}
