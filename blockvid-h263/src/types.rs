//! Common types shared by the decoding and encoding paths.
use super::{MV, ZERO_MV};

/// Picture coding type.
#[derive(Debug,Clone,Copy,PartialEq)]
pub enum PicType {
    /// Intra-coded picture.
    I,
    /// Predicted picture.
    P,
    /// Sprite/GMC-predicted picture (MPEG-4 S-VOP).
    S,
}

impl PicType {
    pub fn is_intra(self) -> bool { self == PicType::I }
    /// Tells whether pictures of this type use global motion compensation.
    pub fn is_gmc(self) -> bool { self == PicType::S }
}

/// Motion vector wrapping mode (see `MvCoder::add_wrapped`).
#[derive(Debug,Clone,Copy,PartialEq)]
pub enum MVMode {
    /// Plain H.263 ±64 wrap around the representable range.
    Old,
    /// H.263 long vectors mode: nudge by ±64 near extreme predictors.
    Long,
    /// H.263+ Annex D unrestricted vectors.
    Umv,
}

/// AC prediction direction for an intra block.
#[derive(Debug,Clone,Copy,PartialEq)]
pub enum ACPredMode {
    /// No AC prediction.
    None,
    /// DC-only prediction.
    DC,
    /// Predict from the block to the left (first column).
    Hor,
    /// Predict from the block above (first row).
    Ver,
}

/// Optional H.263+ (PLUSPTYPE) feature set.
#[derive(Debug,Clone,Copy,Default)]
pub struct PlusInfo {
    /// Advanced intra coding (Annex I).
    pub aic:            bool,
    /// Deblocking filter signalled (Annex J); filtering itself is pixel-side.
    pub deblock:        bool,
    /// Slice structured mode (Annex K).
    pub slice_struct:   bool,
    /// Modified quantisation (Annex T).
    pub modified_quant: bool,
    /// Alternative inter VLC (Annex S).
    pub alt_inter_vlc:  bool,
    /// Custom picture clock frequency.
    pub custom_pcf:     bool,
}

/// MPEG-4 per-picture state that has no H.263 counterpart.
#[derive(Debug,Clone,Copy)]
pub struct Mpeg4PicInfo {
    /// Cleared when the VOP carries no macroblock data at all.
    pub vop_coded:         bool,
    /// The 3-bit `intra_dc_vlc_thr` code; through the threshold table it
    /// decides per macroblock whether the intra DC uses the DC size VLC or
    /// joins the AC run.
    pub intra_dc_thr_code: u8,
    /// Bit width of quantiser fields (3..9, normally 5).
    pub quant_precision:   u8,
    /// Rounding control for motion compensation, carried to the consumer.
    pub rounding:          bool,
    /// Derived warp parameters for S-pictures.
    pub sprite:            Option<crate::sprite::SpriteWarp>,
}

impl Mpeg4PicInfo {
    /// Tells whether a macroblock with the given quantiser codes its intra
    /// DC through the DC size VLC.
    pub fn use_intra_dc_vlc(&self, quant: u8) -> bool {
        quant < crate::data::MPEG4_DC_THRESHOLD[(self.intra_dc_thr_code & 7) as usize]
    }
}

/// Everything the macroblock layer needs to know about the current picture.
#[derive(Debug,Clone,Copy)]
pub struct PicInfo {
    pub w:        usize,
    pub h:        usize,
    pub mode:     PicType,
    pub quant:    u8,
    pub mvmode:   MVMode,
    /// Motion vector range exponent; 1 means no fine bits.
    pub fcode:    u8,
    /// Four motion vectors per macroblock allowed (advanced prediction /
    /// MPEG-4 inter4v).
    pub apm:      bool,
    pub umv:      bool,
    /// Temporal reference, as coded.
    pub ts:       u16,
    pub plusinfo: Option<PlusInfo>,
    pub mpeg4:    Option<Mpeg4PicInfo>,
}

impl PicInfo {
    pub fn mb_width(&self) -> usize { (self.w + 15) >> 4 }
    pub fn mb_height(&self) -> usize { (self.h + 15) >> 4 }
    pub fn is_mpeg4(&self) -> bool { self.mpeg4.is_some() }
    pub fn aic(&self) -> bool {
        if let Some(ref pi) = self.plusinfo { pi.aic } else { false }
    }
}

/// Position and quantiser of a slice (GOB or video packet) within a picture.
#[derive(Debug,Clone,Copy)]
pub struct SliceInfo {
    pub mb_x:   usize,
    pub mb_y:   usize,
    pub mb_end: usize,
    pub quant:  u8,
}

const SLICE_NO_END: usize = 99_999_999;

impl SliceInfo {
    pub fn new(mb_x: usize, mb_y: usize, mb_end: usize, quant: u8) -> Self {
        SliceInfo { mb_x, mb_y, mb_end, quant }
    }
    pub fn new_gob(mb_x: usize, mb_y: usize, quant: u8) -> Self {
        SliceInfo { mb_x, mb_y, mb_end: SLICE_NO_END, quant }
    }
    pub fn get_default_slice(pinfo: &PicInfo) -> Self {
        SliceInfo { mb_x: 0, mb_y: 0, mb_end: SLICE_NO_END, quant: pinfo.quant }
    }
    pub fn get_quant(&self) -> u8 { self.quant }
    pub fn is_at_end(&self, mb_pos: usize) -> bool { self.mb_end == mb_pos }
    pub fn needs_check(&self) -> bool { self.mb_end == SLICE_NO_END }
}

/// Per-macroblock walking state with the slice-local prediction edges.
#[derive(Debug,Clone,Copy)]
pub struct SliceState {
    pub is_iframe:  bool,
    pub mb_x:       usize,
    pub mb_y:       usize,
    pub first_line: bool,
    pub first_mb:   bool,
    pub slice_mb_x: usize,
    pub slice_mb_y: usize,
    pub quant:      u8,
}

impl SliceState {
    pub fn new(is_iframe: bool) -> Self {
        SliceState {
            is_iframe, mb_x: 0, mb_y: 0, first_line: true, first_mb: true,
            slice_mb_x: 0, slice_mb_y: 0, quant: 0,
        }
    }
    pub fn next_mb(&mut self) {
        self.mb_x += 1; self.first_mb = false;
        if self.mb_x >= self.slice_mb_x && self.mb_y > self.slice_mb_y {
            self.first_line = false;
        }
    }
    pub fn new_row(&mut self) {
        self.mb_x = 0; self.mb_y += 1;
        if self.mb_x >= self.slice_mb_x && self.mb_y > self.slice_mb_y {
            self.first_line = false;
        }
        self.first_mb = true;
    }
    pub fn reset_slice(&mut self, smb_x: usize, smb_y: usize) {
        self.slice_mb_x = smb_x;
        self.slice_mb_y = smb_y;
        self.first_line = true;
        self.first_mb   = true;
    }
}

/// Macroblock coding mode.
#[derive(Debug,Clone,Copy,PartialEq)]
pub enum MbMode {
    /// Not coded; zero motion (or warp motion in GMC pictures) and no
    /// coefficients.
    Skip,
    /// Intra-coded.
    Intra,
    /// One motion vector for the whole macroblock.
    Inter16,
    /// Four motion vectors, one per 8x8 luma partition.
    Inter8x8,
}

/// Everything decoded from (or to be encoded into) a macroblock header.
#[derive(Debug,Clone,Copy)]
pub struct MbInfo {
    pub mode:   MbMode,
    /// Coded block pattern; bit `5 - i` corresponds to block `i` in the
    /// fixed Y0 Y1 Y2 Y3 Cb Cr order.
    pub cbp:    u8,
    pub quant:  u8,
    /// Motion vector residuals on decode input / absolute vectors on the
    /// encoder input side; slot count given by `num_mv`.
    pub mv:     [MV; 4],
    pub num_mv: usize,
    pub acpred: ACPredMode,
    /// Motion-compensation-selected flag of MPEG-4 S-pictures.
    pub mcsel:  bool,
}

impl MbInfo {
    pub fn new(mode: MbMode, cbp: u8, quant: u8) -> Self {
        MbInfo {
            mode, cbp, quant,
            mv:     [ZERO_MV; 4],
            num_mv: 0,
            acpred: ACPredMode::None,
            mcsel:  false,
        }
    }
    pub fn is_intra(&self) -> bool { self.mode == MbMode::Intra }
    pub fn is_skipped(&self) -> bool { self.mode == MbMode::Skip }
    pub fn set_mv(&mut self, mvs: &[MV]) {
        let mut mv_arr = [ZERO_MV; 4];
        mv_arr[..mvs.len()].copy_from_slice(mvs);
        self.mv     = mv_arr;
        self.num_mv = mvs.len();
    }
}

/// Coded-block-pattern history for one macroblock row plus the row above it.
///
/// Consumers use it to decide which block edges the deblocking filter may
/// touch; the decoder driver keeps it up to date as a courtesy since the
/// information is otherwise lost after each macroblock.
pub struct CBPInfo {
    cbp:  Vec<u8>,
    q:    Vec<u8>,
    mb_w: usize,
}

impl CBPInfo {
    pub fn new() -> Self { CBPInfo { cbp: Vec::new(), q: Vec::new(), mb_w: 0 } }
    pub fn reset(&mut self, mb_w: usize) {
        self.mb_w = mb_w;
        self.cbp.clear();
        self.cbp.resize(self.mb_w * 2, 0);
        self.q.clear();
        self.q.resize(self.mb_w * 2, 0);
    }
    pub fn update_row(&mut self) {
        for i in 0..self.mb_w {
            self.cbp[i] = self.cbp[self.mb_w + i];
            self.q[i]   = self.q[self.mb_w + i];
        }
    }
    pub fn set_cbp(&mut self, mb_x: usize, cbp: u8) {
        self.cbp[self.mb_w + mb_x] = cbp;
    }
    pub fn set_q(&mut self, mb_x: usize, q: u8) {
        self.q[self.mb_w + mb_x] = q;
    }
    pub fn get_q(&self, mb_x: usize) -> u8 { self.q[mb_x] }
    pub fn is_coded(&self, mb_x: usize, blk_no: usize) -> bool {
        (self.cbp[self.mb_w + mb_x] & (1 << (5 - blk_no))) != 0
    }
    pub fn is_coded_top(&self, mb_x: usize, blk_no: usize) -> bool {
        let cbp     = self.cbp[self.mb_w + mb_x];
        let cbp_top = self.cbp[mb_x];
        match blk_no {
            0 => (cbp_top & 0b001000) != 0,
            1 => (cbp_top & 0b000100) != 0,
            2 => (cbp     & 0b100000) != 0,
            3 => (cbp     & 0b010000) != 0,
            4 => (cbp_top & 0b000010) != 0,
            _ => (cbp_top & 0b000001) != 0,
        }
    }
}

impl Default for CBPInfo {
    fn default() -> Self { Self::new() }
}
