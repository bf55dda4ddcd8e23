//! Picture-level decoding driver.
//!
//! Walks macroblocks in raster order, maintains the motion vector and
//! DC/AC prediction state, and hands every decoded macroblock to a
//! [`MacroblockSink`]. Pixel reconstruction happens on the consumer's side
//! of that trait.
use std::fmt;

use blockvid_core::codecs::{CodecError, CodecResult};

use crate::{MV, ZERO_MV};
use crate::motion::MVGrid;
use crate::pred::PredHistory;
use crate::types::*;

/// One format's bitstream reader: header parsing plus per-block entropy
/// decoding. Implemented by the H.263 and MPEG-4 readers.
pub trait BlockDecoder {
    fn decode_pichdr(&mut self) -> CodecResult<PicInfo>;
    fn decode_slice_header(&mut self, pinfo: &PicInfo) -> CodecResult<SliceInfo>;
    fn decode_mb_header(&mut self, pinfo: &PicInfo, slice: &SliceInfo,
                        sstate: &SliceState) -> CodecResult<MbInfo>;
    fn decode_block_intra(&mut self, info: &MbInfo, sstate: &SliceState,
                          hist: &mut PredHistory, no: usize, coded: bool,
                          blk: &mut [i16; 64]) -> CodecResult<()>;
    fn decode_block_inter(&mut self, info: &MbInfo, no: usize, coded: bool,
                          blk: &mut [i16; 64]) -> CodecResult<()>;
    fn is_slice_end(&mut self) -> bool;
}

/// A fully decoded macroblock: mode, absolute motion vectors and six
/// quantised coefficient blocks in Y0 Y1 Y2 Y3 Cb Cr order.
#[derive(Clone)]
pub struct DecodedMacroblock {
    pub mb_x:   usize,
    pub mb_y:   usize,
    pub info:   MbInfo,
    pub blocks: [[i16; 64]; 6],
}

/// Consumer of decoded macroblocks (normally the pixel reconstruction).
pub trait MacroblockSink {
    fn macroblock(&mut self, mb: &DecodedMacroblock);
}

impl MacroblockSink for Vec<DecodedMacroblock> {
    fn macroblock(&mut self, mb: &DecodedMacroblock) {
        self.push(mb.clone());
    }
}

/// A decode failure annotated with the macroblock it happened at; spatial
/// prediction makes downstream corruption hard to localise otherwise.
#[derive(Debug,Clone,Copy,PartialEq)]
pub struct DecodeError {
    pub kind: CodecError,
    pub mb_x: usize,
    pub mb_y: usize,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} at macroblock ({}, {})", self.kind, self.mb_x, self.mb_y)
    }
}

/// Raster-order macroblock decoding driver, reused across pictures.
pub struct PictureDecoder {
    mb_w:   usize,
    mb_h:   usize,
    hist:   PredHistory,
    cbpi:   CBPInfo,
    blk:    [[i16; 64]; 6],
}

impl PictureDecoder {
    pub fn new() -> Self {
        PictureDecoder {
            mb_w: 0, mb_h: 0,
            hist: PredHistory::new(),
            cbpi: CBPInfo::new(),
            blk:  [[0; 64]; 6],
        }
    }

    pub fn get_dimensions(&self) -> (usize, usize) { (self.mb_w, self.mb_h) }

    /// Decodes one picture, feeding every macroblock to `sink`.
    ///
    /// A failing macroblock aborts the rest of the picture; the caller may
    /// resynchronise at the next slice boundary with a fresh call, never
    /// mid-picture.
    pub fn decode_picture(&mut self, bd: &mut dyn BlockDecoder,
                          sink: &mut dyn MacroblockSink) -> Result<PicInfo, DecodeError> {
        let pinfo = bd.decode_pichdr()
            .map_err(|kind| DecodeError { kind, mb_x: 0, mb_y: 0 })?;
        if let Some(ref m4) = pinfo.mpeg4 {
            if !m4.vop_coded {
                return Ok(pinfo);
            }
        }
        self.mb_w = pinfo.mb_width();
        self.mb_h = pinfo.mb_height();
        let mut mvi = MVGrid::new();
        mvi.reset(self.mb_w, 0, pinfo.mvmode, pinfo.fcode);
        self.cbpi.reset(self.mb_w);
        self.hist.reset(self.mb_w, self.mb_h);

        let mut slice = SliceInfo::get_default_slice(&pinfo);
        let mut sstate = SliceState::new(pinfo.mode.is_intra());
        sstate.quant = slice.quant;

        let mut mb_pos = 0;
        for mb_y in 0..self.mb_h {
            for mb_x in 0..self.mb_w {
                let at = |kind| DecodeError { kind, mb_x, mb_y };
                self.blk = [[0; 64]; 6];

                if slice.is_at_end(mb_pos)
                    || (slice.needs_check() && mb_pos > 0 && bd.is_slice_end()) {
                    slice = bd.decode_slice_header(&pinfo).map_err(at)?;
                    mvi.reset(self.mb_w, mb_x, pinfo.mvmode, pinfo.fcode);
                    self.cbpi.reset(self.mb_w);
                    sstate.reset_slice(mb_x, mb_y);
                    sstate.quant = slice.quant;
                }

                let binfo = bd.decode_mb_header(&pinfo, &slice, &sstate).map_err(at)?;
                self.cbpi.set_cbp(mb_x, binfo.cbp);
                self.cbpi.set_q(mb_x, binfo.quant);
                sstate.quant = binfo.quant;
                let mut out_info = binfo;

                if binfo.is_intra() {
                    for i in 0..6 {
                        let coded = (binfo.cbp & (1 << (5 - i))) != 0;
                        bd.decode_block_intra(&binfo, &sstate, &mut self.hist, i,
                                              coded, &mut self.blk[i]).map_err(at)?;
                    }
                    mvi.set_zero_mv(mb_x);
                    out_info.set_mv(&[]);
                } else if binfo.is_skipped() {
                    let mv = if binfo.mcsel {
                            gmc_motion(&pinfo)
                        } else {
                            ZERO_MV
                        };
                    mvi.commit(mb_x, 0, false, mv);
                    self.hist.reset_mb(mb_x, mb_y);
                    out_info.set_mv(&[mv]);
                    out_info.mode = MbMode::Skip;
                } else {
                    let nmv = if binfo.mode == MbMode::Inter8x8 { 4 } else { 1 };
                    let mut mvs = [ZERO_MV; 4];
                    if binfo.mcsel {
                        let mv = gmc_motion(&pinfo);
                        mvi.commit(mb_x, 0, false, mv);
                        mvs[0] = mv;
                    } else {
                        for blk_no in 0..nmv {
                            mvs[blk_no] = mvi.predict(mb_x, blk_no, nmv == 4,
                                                      binfo.mv[blk_no],
                                                      sstate.first_line, sstate.first_mb);
                        }
                    }
                    out_info.set_mv(&mvs[..nmv]);
                    for i in 0..6 {
                        let coded = (binfo.cbp & (1 << (5 - i))) != 0;
                        bd.decode_block_inter(&binfo, i, coded, &mut self.blk[i])
                          .map_err(at)?;
                    }
                    self.hist.reset_mb(mb_x, mb_y);
                }

                sink.macroblock(&DecodedMacroblock {
                    mb_x, mb_y,
                    info:   out_info,
                    blocks: self.blk,
                });
                sstate.next_mb();
                mb_pos += 1;
            }
            mvi.update_row();
            self.cbpi.update_row();
            sstate.new_row();
        }
        Ok(pinfo)
    }
}

impl Default for PictureDecoder {
    fn default() -> Self { Self::new() }
}

fn gmc_motion(pinfo: &PicInfo) -> MV {
    if let Some(ref m4) = pinfo.mpeg4 {
        if let Some(ref warp) = m4.sprite {
            return warp.skip_mv();
        }
    }
    ZERO_MV
}
