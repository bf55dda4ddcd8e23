//! Picture-level encoding driver.
//!
//! The caller supplies per-macroblock data in raster order — mode, quantiser
//! and quantised coefficients from the transform stage, motion vectors from
//! the search stage — and the driver mirrors the decoder's prediction state
//! while serialising everything. Slice cuts are caller-driven: probe
//! [`bits_since_cut`] against the payload budget and call [`start_slice`]
//! where needed; the core never cuts on its own.
//!
//! [`bits_since_cut`]: ./struct.PictureEncoder.html#method.bits_since_cut
//! [`start_slice`]: ./struct.PictureEncoder.html#method.start_slice
use blockvid_core::codecs::{CodecError, CodecResult};
use blockvid_core::io::bitwriter::BitWriter;

use crate::{MV, ZERO_MV};
use crate::blockcodec::{BlockCodec, BlockCtx, IntraPrep, Tables};
use crate::h263::{encode_gob_header, encode_picture_header, gob_height};
use crate::mb::{encode_mb_header_i, encode_mb_header_p};
use crate::motion::MVGrid;
use crate::mpeg4::{encode_video_packet_header, encode_vol_header, encode_vop_header, VolInfo};
use crate::pred::PredHistory;
use crate::types::*;

/// Everything the caller provides for one macroblock.
pub struct MacroblockData {
    pub mode:   MbMode,
    pub quant:  u8,
    pub acpred: ACPredMode,
    pub mcsel:  bool,
    /// Absolute motion vectors in half-pel units, one (Inter16) or four
    /// (Inter8x8); ignored for intra and skip.
    pub mv:     [MV; 4],
    /// Quantised coefficient blocks in natural order, Y0 Y1 Y2 Y3 Cb Cr.
    pub blocks: [[i16; 64]; 6],
}

/// Raster-order macroblock encoding driver for one picture.
pub struct PictureEncoder<'a> {
    tables:     &'a Tables,
    bw:         BitWriter,
    vol:        Option<VolInfo>,
    pinfo:      PicInfo,
    codec:      BlockCodec,
    mvi:        MVGrid,
    hist:       PredHistory,
    sstate:     SliceState,
    mb_x:       usize,
    mb_y:       usize,
    mb_w:       usize,
    mb_h:       usize,
    prev_quant: u8,
    last_cut:   usize,
    started:    bool,
}

impl<'a> PictureEncoder<'a> {
    pub fn new(tables: &'a Tables) -> Self {
        PictureEncoder {
            tables,
            bw: BitWriter::new(Vec::new()),
            vol: None,
            pinfo: PicInfo {
                w: 0, h: 0, mode: PicType::I, quant: 1, mvmode: MVMode::Old,
                fcode: 1, apm: false, umv: false, ts: 0, plusinfo: None, mpeg4: None,
            },
            codec: BlockCodec::H263 { aic: false },
            mvi: MVGrid::new(),
            hist: PredHistory::new(),
            sstate: SliceState::new(true),
            mb_x: 0, mb_y: 0, mb_w: 0, mb_h: 0,
            prev_quant: 1,
            last_cut: 0,
            started: false,
        }
    }

    /// Emits an MPEG-4 VOL header and remembers the sequence state for the
    /// picture headers that follow.
    pub fn write_sequence_header(&mut self, vol: &VolInfo) -> CodecResult<()> {
        encode_vol_header(&mut self.bw, vol)?;
        self.vol = Some(*vol);
        Ok(())
    }

    /// Emits the picture header and arms the per-picture prediction state.
    pub fn start_picture(&mut self, pinfo: &PicInfo) -> CodecResult<()> {
        if pinfo.is_mpeg4() {
            let vol = match self.vol {
                Some(ref vol) => *vol,
                None => return Err(CodecError::InconsistentHeader),
            };
            encode_vop_header(&mut self.bw, &vol, pinfo)?;
        } else {
            encode_picture_header(&mut self.bw, pinfo)?;
        }
        self.pinfo = *pinfo;
        self.codec = BlockCodec::for_picture(pinfo);
        self.mb_w = pinfo.mb_width();
        self.mb_h = pinfo.mb_height();
        self.mvi.reset(self.mb_w, 0, pinfo.mvmode, pinfo.fcode);
        self.hist.reset(self.mb_w, self.mb_h);
        self.sstate = SliceState::new(pinfo.mode.is_intra());
        self.sstate.quant = pinfo.quant;
        self.mb_x = 0;
        self.mb_y = 0;
        self.prev_quant = pinfo.quant;
        self.last_cut = self.bw.tell();
        self.started = true;
        Ok(())
    }

    /// Bits accumulated since the picture start or the last slice cut, for
    /// the caller's payload budgeting.
    pub fn bits_since_cut(&self) -> usize {
        self.bw.tell() - self.last_cut
    }

    /// Starts a new GOB (H.263) or video packet (MPEG-4) at the current
    /// position, resetting the slice-local prediction context.
    pub fn start_slice(&mut self, quant: u8) -> CodecResult<()> {
        validate!(self.started && self.mb_x == 0);
        if self.pinfo.is_mpeg4() {
            let vol = match self.vol {
                Some(ref vol) => *vol,
                None => return Err(CodecError::InconsistentHeader),
            };
            let mb_num = self.mb_y * self.mb_w + self.mb_x;
            encode_video_packet_header(&mut self.bw, &vol, &self.pinfo, mb_num, quant)?;
        } else {
            let gob_no = self.mb_y / gob_height(self.pinfo.h);
            encode_gob_header(&mut self.bw, gob_no, quant)?;
        }
        self.mvi.reset(self.mb_w, self.mb_x, self.pinfo.mvmode, self.pinfo.fcode);
        self.sstate.reset_slice(self.mb_x, self.mb_y);
        self.sstate.quant = quant;
        self.prev_quant = quant;
        self.last_cut = self.bw.tell();
        Ok(())
    }

    fn use_dc_vlc(&self, quant: u8) -> bool {
        match self.pinfo.mpeg4 {
            Some(ref m4) => m4.use_intra_dc_vlc(quant),
            None         => false,
        }
    }

    fn gmc_mv(&self) -> MV {
        if let Some(ref m4) = self.pinfo.mpeg4 {
            if let Some(ref warp) = m4.sprite {
                return warp.skip_mv();
            }
        }
        ZERO_MV
    }

    /// Encodes the next macroblock in raster order.
    pub fn encode_macroblock(&mut self, mbd: &MacroblockData) -> CodecResult<()> {
        validate!(self.started);
        match mbd.mode {
            MbMode::Intra    => self.encode_intra_mb(mbd)?,
            MbMode::Skip     => self.encode_skip_mb()?,
            _                => self.encode_inter_mb(mbd)?,
        }
        self.advance();
        Ok(())
    }

    fn advance(&mut self) {
        self.sstate.next_mb();
        self.mb_x += 1;
        if self.mb_x == self.mb_w {
            self.mb_x = 0;
            self.mb_y += 1;
            self.mvi.update_row();
            self.sstate.new_row();
        }
    }

    fn encode_intra_mb(&mut self, mbd: &MacroblockData) -> CodecResult<()> {
        let use_dc_vlc = self.use_dc_vlc(mbd.quant);
        let mut preps: Vec<IntraPrep> = Vec::with_capacity(6);
        let mut cbp = 0u8;
        for no in 0..6 {
            let mut ctx = BlockCtx {
                hist: &mut self.hist,
                mb_x: self.mb_x,
                mb_y: self.mb_y,
                first_mb: self.sstate.first_mb,
                first_line: self.sstate.first_line,
                quant: mbd.quant,
            };
            let prep = self.codec.prepare_intra(&mut ctx, no, mbd.acpred,
                                                use_dc_vlc, &mbd.blocks[no])?;
            if prep.coded { cbp |= 1 << (5 - no); }
            preps.push(prep);
        }
        let mut binfo = MbInfo::new(MbMode::Intra, cbp, mbd.quant);
        binfo.acpred = mbd.acpred;
        if self.pinfo.mode.is_intra() {
            encode_mb_header_i(&mut self.bw, &self.pinfo, &binfo, self.prev_quant)?;
        } else {
            encode_mb_header_p(&mut self.bw, &self.pinfo, &binfo, self.prev_quant, &[])?;
        }
        for (no, prep) in preps.iter().enumerate() {
            self.codec.write_block_intra(&mut self.bw, self.tables, prep, no,
                                         use_dc_vlc, prep.coded)?;
        }
        self.mvi.set_zero_mv(self.mb_x);
        self.prev_quant = mbd.quant;
        self.sstate.quant = mbd.quant;
        Ok(())
    }

    fn encode_skip_mb(&mut self) -> CodecResult<()> {
        let binfo = MbInfo::new(MbMode::Skip, 0, self.prev_quant);
        encode_mb_header_p(&mut self.bw, &self.pinfo, &binfo, self.prev_quant, &[])?;
        let mv = if self.pinfo.mode.is_gmc() { self.gmc_mv() } else { ZERO_MV };
        self.mvi.commit(self.mb_x, 0, false, mv);
        self.hist.reset_mb(self.mb_x, self.mb_y);
        Ok(())
    }

    fn encode_inter_mb(&mut self, mbd: &MacroblockData) -> CodecResult<()> {
        validate!(!self.pinfo.mode.is_intra());
        let mut cbp = 0u8;
        for no in 0..6 {
            if mbd.blocks[no].iter().any(|&c| c != 0) {
                cbp |= 1 << (5 - no);
            }
        }
        let nmv = if mbd.mode == MbMode::Inter8x8 { 4 } else { 1 };
        let mut diffs = [ZERO_MV; 4];
        if mbd.mcsel {
            validate!(self.pinfo.mode.is_gmc() && mbd.mode == MbMode::Inter16);
            let mv = self.gmc_mv();
            self.mvi.commit(self.mb_x, 0, false, mv);
        } else {
            for blk_no in 0..nmv {
                let pred = self.mvi.predictor(self.mb_x, blk_no,
                                              self.sstate.first_line,
                                              self.sstate.first_mb);
                diffs[blk_no] = mbd.mv[blk_no] - pred;
                self.mvi.commit(self.mb_x, blk_no, nmv == 4, mbd.mv[blk_no]);
            }
        }
        let mut binfo = MbInfo::new(mbd.mode, cbp, mbd.quant);
        binfo.mcsel = mbd.mcsel;
        binfo.set_mv(&diffs[..nmv]);
        encode_mb_header_p(&mut self.bw, &self.pinfo, &binfo, self.prev_quant,
                           &diffs[..if mbd.mcsel { 0 } else { nmv }])?;
        for no in 0..6 {
            if (cbp & (1 << (5 - no))) != 0 {
                self.codec.write_block_inter(&mut self.bw, self.tables, &mbd.blocks[no])?;
            }
        }
        self.hist.reset_mb(self.mb_x, self.mb_y);
        self.prev_quant = mbd.quant;
        self.sstate.quant = mbd.quant;
        Ok(())
    }

    /// Flushes and returns the encoded bytes.
    pub fn finish(self) -> Vec<u8> {
        self.bw.end()
    }
}
