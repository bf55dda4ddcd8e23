//! Motion vector prediction and residual coding.
use blockvid_core::codecs::{CodecError, CodecResult};
use blockvid_core::io::bitreader::BitReader;
use blockvid_core::io::bitwriter::BitWriter;
use blockvid_core::io::codebook::{Codebook, CodebookReader};

use crate::{MV, ZERO_MV};
use crate::data::MV_CODES;
use crate::types::MVMode;

fn sign_extend(val: i32, bits: u8) -> i32 {
    let shift = 32 - bits;
    (val << shift) >> shift
}

/// Wraps a predicted-plus-residual vector into the representable range.
///
/// The plain mode reduces each component modulo `64 << (fcode - 1)` half-pel
/// units; long-vectors mode instead nudges by ±64 when the predictor sits
/// near the extremes; unrestricted vectors are left untouched.
pub fn add_wrapped(pred: MV, diff: MV, mode: MVMode, fcode: u8) -> MV {
    let mut new_mv = pred + diff;
    match mode {
        MVMode::Old => {
            let bits = 5 + fcode;
            new_mv.x = sign_extend(i32::from(new_mv.x), bits) as i16;
            new_mv.y = sign_extend(i32::from(new_mv.y), bits) as i16;
        },
        MVMode::Long => {
            if pred.x < -31 && new_mv.x < -63 { new_mv.x += 64; }
            if pred.x >  32 && new_mv.x >  63 { new_mv.x -= 64; }
            if pred.y < -31 && new_mv.y < -63 { new_mv.y += 64; }
            if pred.y >  32 && new_mv.y >  63 { new_mv.y -= 64; }
        },
        MVMode::Umv => {},
    }
    new_mv
}

/// Decodes one motion vector component residual: magnitude VLC, sign bit and
/// `fcode - 1` fine bits. A lookup miss means a corrupt vector and aborts
/// the macroblock.
pub fn decode_mv_component(br: &mut BitReader, mv_cb: &Codebook<u8>, fcode: u8) -> CodecResult<i16> {
    let code = i32::from(br.read_cb(mv_cb)?);
    if code == 0 { return Ok(0); }
    let sign = br.read_bool()?;
    let shift = fcode - 1;
    let mut val = code;
    if shift > 0 {
        val = (val - 1) << shift;
        val |= br.read(shift)? as i32;
        val += 1;
    }
    if sign { val = -val; }
    Ok(val as i16)
}

/// Encodes one motion vector component residual, reducing it into the
/// `64 << (fcode - 1)` modulo range first.
pub fn encode_mv_component(bw: &mut BitWriter, diff: i16, fcode: u8) -> CodecResult<()> {
    if diff == 0 {
        let (code, bits) = MV_CODES[0];
        bw.write(u32::from(code), bits);
        return Ok(());
    }
    let bit_size = fcode - 1;
    let range = 1i32 << bit_size;
    let val = sign_extend(i32::from(diff), 6 + bit_size);
    let sign = val < 0;
    let aval = val.abs() - 1;
    let code = (aval >> bit_size) + 1;
    validate!(code >= 1 && code <= 32);
    let (cw, bits) = MV_CODES[code as usize];
    bw.write(u32::from(cw), bits);
    bw.write_bit(sign);
    if bit_size > 0 {
        bw.write((aval & (range - 1)) as u32, bit_size);
    }
    Ok(())
}

/// Decodes an unrestricted-mode (reversible) motion component and applies
/// the predictor. Zero takes one bit, ±1 three; larger magnitudes are a
/// unary-continued binary expansion terminated by its own structure,
/// trailed by the sign.
pub fn decode_umv_component(br: &mut BitReader, pred: i16) -> CodecResult<i16> {
    if br.read_bool()? {
        return Ok(pred);
    }
    let mut code: i32 = 2 + (br.read(1)? as i32);
    while br.read_bool()? {
        code = (code << 1) | (br.read(1)? as i32);
        validate!(code < 32768);
    }
    let sign = (code & 1) != 0;
    let code = (code >> 1) as i16;
    Ok(if sign { pred - code } else { pred + code })
}

/// Encodes an unrestricted-mode motion component residual.
pub fn encode_umv_component(bw: &mut BitWriter, diff: i16) {
    if diff == 0 {
        bw.write1();
        return;
    }
    let sign = diff < 0;
    let mag = i32::from(diff).abs();
    let code = ((mag as u32) << 1) | (sign as u32);
    let nbits = 31 - code.leading_zeros();
    bw.write0();
    // data bits below the implicit leading one, separated by continue bits
    let mut left = nbits;
    while left > 0 {
        left -= 1;
        if left != nbits - 1 {
            bw.write1();
        }
        bw.write_bit((code >> left) & 1 != 0);
    }
    bw.write0();
}

/// Motion vector history of the current and previous macroblock row, used
/// for median prediction. Each macroblock stores four 8x8 vectors; the
/// stride leaves one spare column on each side so edge lookups stay in
/// bounds.
pub struct MVGrid {
    mv:        Vec<MV>,
    mb_w:      usize,
    mb_stride: usize,
    mb_start:  usize,
    mvmode:    MVMode,
    fcode:     u8,
}

impl MVGrid {
    pub fn new() -> Self {
        MVGrid {
            mv: Vec::new(), mb_w: 0, mb_stride: 0, mb_start: 0,
            mvmode: MVMode::Old, fcode: 1,
        }
    }
    pub fn reset(&mut self, mb_w: usize, mb_start: usize, mvmode: MVMode, fcode: u8) {
        self.mb_start  = mb_start;
        self.mb_w      = mb_w;
        self.mb_stride = mb_w * 2 + 2;
        self.mv.clear();
        self.mv.resize(self.mb_stride * 3, ZERO_MV);
        self.mvmode    = mvmode;
        self.fcode     = fcode;
    }
    pub fn update_row(&mut self) {
        self.mb_start = self.mb_w + 1;
        for i in 0..self.mb_stride {
            self.mv[i] = self.mv[self.mb_stride * 2 + i];
        }
    }

    /// Median predictor for a partition, using the neighbour set the
    /// partition index selects. The first row of a slice predicts from the
    /// left candidate only.
    #[allow(non_snake_case)]
    pub fn predictor(&self, mb_x: usize, blk_no: usize, first_line: bool, first_mb: bool) -> MV {
        let A;
        let B;
        let C;
        let last = mb_x == self.mb_w - 1;
        match blk_no {
            0 => {
                if mb_x != self.mb_start {
                    A = if !first_mb   { self.mv[self.mb_stride + mb_x * 2 - 1] } else { ZERO_MV };
                    B = if !first_line { self.mv[                 mb_x * 2] } else { A };
                    C = if !first_line && !last { self.mv[mb_x * 2 + 2] } else { ZERO_MV };
                } else {
                    A = ZERO_MV; B = ZERO_MV; C = ZERO_MV;
                }
            },
            1 => {
                A = self.mv[self.mb_stride + mb_x * 2];
                B = if !first_line { self.mv[mb_x * 2 + 1] } else { A };
                C = if !first_line && !last { self.mv[mb_x * 2 + 2] } else { ZERO_MV };
            },
            2 => {
                A = if mb_x != self.mb_start { self.mv[self.mb_stride * 2 + mb_x * 2 - 1] } else { ZERO_MV };
                B = self.mv[self.mb_stride + mb_x * 2];
                C = self.mv[self.mb_stride + mb_x * 2 + 1];
            },
            3 => {
                A = self.mv[self.mb_stride * 2 + mb_x * 2];
                B = self.mv[self.mb_stride + mb_x * 2 + 1];
                C = self.mv[self.mb_stride + mb_x * 2];
            },
            _ => { return ZERO_MV; }
        }
        if first_line && blk_no == 0 && mb_x != self.mb_start {
            // no usable row above: the left candidate stands alone
            return A;
        }
        MV::pred(A, B, C)
    }

    /// Stores the reconstructed vector of a partition (all four slots for a
    /// single-vector macroblock).
    pub fn commit(&mut self, mb_x: usize, blk_no: usize, use4: bool, mv: MV) {
        if !use4 {
            self.mv[self.mb_stride     + mb_x * 2]     = mv;
            self.mv[self.mb_stride     + mb_x * 2 + 1] = mv;
            self.mv[self.mb_stride * 2 + mb_x * 2]     = mv;
            self.mv[self.mb_stride * 2 + mb_x * 2 + 1] = mv;
        } else {
            match blk_no {
                0 => { self.mv[self.mb_stride     + mb_x * 2]     = mv; },
                1 => { self.mv[self.mb_stride     + mb_x * 2 + 1] = mv; },
                2 => { self.mv[self.mb_stride * 2 + mb_x * 2]     = mv; },
                3 => { self.mv[self.mb_stride * 2 + mb_x * 2 + 1] = mv; },
                _ => {},
            }
        }
    }

    /// Predicts a partition, applies the decoded residual with range
    /// wrapping and commits the result.
    pub fn predict(&mut self, mb_x: usize, blk_no: usize, use4: bool, diff: MV,
                   first_line: bool, first_mb: bool) -> MV {
        let pred_mv = self.predictor(mb_x, blk_no, first_line, first_mb);
        let new_mv = add_wrapped(pred_mv, diff, self.mvmode, self.fcode);
        self.commit(mb_x, blk_no, use4, new_mv);
        new_mv
    }

    pub fn set_zero_mv(&mut self, mb_x: usize) {
        self.commit(mb_x, 0, false, ZERO_MV);
    }

    pub fn get_mv(&self, mb_x: usize, blk_no: usize) -> MV {
        self.mv[self.mb_stride + mb_x * 2 + (blk_no & 1) + (blk_no >> 1) * self.mb_stride]
    }
}

impl Default for MVGrid {
    fn default() -> Self { Self::new() }
}
