//! Spatial DC/AC coefficient prediction.
//!
//! The history holds, for every 8x8 block position of the current picture,
//! the most recently reconstructed DC value (scaled by the DC divisor it was
//! coded with), the first row and column of quantised AC coefficients and
//! the quantiser in effect, so the next block can predict from its left and
//! top neighbours. The arena lives for exactly one picture and is reset, not
//! reused, at every picture start.

use crate::data::{MPEG4_C_DC_SCALE, MPEG4_Y_DC_SCALE};

/// Neutral DC default used for missing neighbours, in the scaled domain.
/// It never collides with a legal stored DC since those carry the sign of
/// an actual reconstruction.
const DC_NEUTRAL: i16 = 1024;

/// Direction a DC/AC prediction came from.
#[derive(Debug,Clone,Copy,PartialEq)]
pub enum PredDir {
    Left,
    Top,
}

/// Signed division rounding half away from zero, as the standards specify
/// for all fixed-point prediction math.
pub fn round_div(a: i32, b: i32) -> i32 {
    if a >= 0 { (a + (b >> 1)) / b } else { (a - (b >> 1)) / b }
}

/// DC scale divisor for the given quantiser.
pub fn dc_scale(quant: u8, luma: bool) -> i16 {
    let q = (quant & 31) as usize;
    if luma { i16::from(MPEG4_Y_DC_SCALE[q]) } else { i16::from(MPEG4_C_DC_SCALE[q]) }
}

struct PlaneHist {
    w:   usize,
    h:   usize,
    dc:  Vec<i16>,
    row: Vec<[i16; 8]>,
    col: Vec<[i16; 8]>,
    q:   Vec<u8>,
}

impl PlaneHist {
    fn new() -> Self {
        PlaneHist { w: 0, h: 0, dc: Vec::new(), row: Vec::new(), col: Vec::new(), q: Vec::new() }
    }
    fn reset(&mut self, w: usize, h: usize) {
        self.w = w;
        self.h = h;
        self.dc.clear();
        self.dc.resize(w * h, DC_NEUTRAL);
        self.row.clear();
        self.row.resize(w * h, [0; 8]);
        self.col.clear();
        self.col.resize(w * h, [0; 8]);
        self.q.clear();
        self.q.resize(w * h, 0);
    }
    fn idx(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.h && col < self.w);
        row * self.w + col
    }
    fn dc_at(&self, row: usize, col: usize, avail: bool) -> i16 {
        if !avail { return DC_NEUTRAL; }
        self.dc[self.idx(row, col)]
    }
    fn clear_at(&mut self, row: usize, col: usize) {
        let idx = self.idx(row, col);
        self.dc[idx]  = DC_NEUTRAL;
        self.row[idx] = [0; 8];
        self.col[idx] = [0; 8];
        self.q[idx]   = 0;
    }
}

/// Per-picture spatial prediction state for all six block positions of each
/// macroblock (luma on a quarter-macroblock grid, chroma per macroblock).
pub struct PredHistory {
    luma: PlaneHist,
    cb:   PlaneHist,
    cr:   PlaneHist,
}

/// Which neighbours the slice geometry makes usable for the current block.
///
/// Blocks on the first coded line of a slice may not predict from above it
/// and the first macroblock of a slice may not predict from its left.
#[derive(Debug,Clone,Copy)]
pub struct NeighborAvail {
    pub left: bool,
    pub top:  bool,
}

impl NeighborAvail {
    /// Derives availability for block `no` of a macroblock from the slice
    /// edges. Inner blocks always see their in-macroblock neighbours.
    pub fn for_block(no: usize, first_mb: bool, first_line: bool) -> Self {
        let left = match no {
            1 | 3 => true,
            _     => !first_mb,
        };
        let top = match no {
            2 | 3 => true,
            _     => !first_line,
        };
        NeighborAvail { left, top }
    }
}

impl PredHistory {
    pub fn new() -> Self {
        PredHistory { luma: PlaneHist::new(), cb: PlaneHist::new(), cr: PlaneHist::new() }
    }

    /// Drops all state and resizes for a picture of the given macroblock
    /// dimensions.
    pub fn reset(&mut self, mb_w: usize, mb_h: usize) {
        self.luma.reset(mb_w * 2, mb_h * 2);
        self.cb.reset(mb_w, mb_h);
        self.cr.reset(mb_w, mb_h);
    }

    fn plane(&self, no: usize) -> &PlaneHist {
        match no {
            0..=3 => &self.luma,
            4     => &self.cb,
            _     => &self.cr,
        }
    }
    fn plane_mut(&mut self, no: usize) -> &mut PlaneHist {
        match no {
            0..=3 => &mut self.luma,
            4     => &mut self.cb,
            _     => &mut self.cr,
        }
    }
    fn pos(no: usize, mb_x: usize, mb_y: usize) -> (usize, usize) {
        if no < 4 {
            (mb_y * 2 + (no >> 1), mb_x * 2 + (no & 1))
        } else {
            (mb_y, mb_x)
        }
    }

    /// Computes the DC predictor for a block.
    ///
    /// Reads the left, top-left and top stored DC values (substituting the
    /// neutral default where a neighbour is missing or unusable) and picks
    /// the direction by comparing the neighbour gradients; the left
    /// neighbour wins ties. The result is in the scaled domain, the caller
    /// divides by `dc_scale`. A pure function of the stored state.
    pub fn predict_dc(&self, no: usize, mb_x: usize, mb_y: usize,
                      avail: NeighborAvail) -> (i16, PredDir) {
        let plane = self.plane(no);
        let (row, col) = Self::pos(no, mb_x, mb_y);
        let has_left = avail.left && col > 0;
        let has_top  = avail.top  && row > 0;
        let a = if has_left { plane.dc_at(row, col - 1, true) } else { DC_NEUTRAL };
        let c = if has_top  { plane.dc_at(row - 1, col, true) } else { DC_NEUTRAL };
        let b = if has_left && has_top {
                plane.dc_at(row - 1, col - 1, true)
            } else {
                DC_NEUTRAL
            };
        if (i32::from(a) - i32::from(b)).abs() < (i32::from(b) - i32::from(c)).abs() {
            (c, PredDir::Top)
        } else {
            (a, PredDir::Left)
        }
    }

    /// Adds the neighbour's first column (left prediction) or first row
    /// (top prediction) into coefficients 1..7 of the current block,
    /// rescaling by the quantiser ratio when the neighbour was coded with a
    /// different quantiser. `blk` holds coefficients in natural order.
    pub fn predict_ac(&self, no: usize, mb_x: usize, mb_y: usize,
                      avail: NeighborAvail, dir: PredDir, quant: u8,
                      blk: &mut [i16; 64]) {
        let plane = self.plane(no);
        let (row, col) = Self::pos(no, mb_x, mb_y);
        match dir {
            PredDir::Left => {
                if !avail.left || col == 0 { return; }
                let idx = plane.idx(row, col - 1);
                let nq = plane.q[idx];
                for i in 1..8 {
                    let mut v = plane.col[idx][i];
                    if nq != quant && nq != 0 {
                        v = round_div(i32::from(v) * i32::from(nq), i32::from(quant)) as i16;
                    }
                    blk[i * 8] += v;
                }
            },
            PredDir::Top => {
                if !avail.top || row == 0 { return; }
                let idx = plane.idx(row - 1, col);
                let nq = plane.q[idx];
                for i in 1..8 {
                    let mut v = plane.row[idx][i];
                    if nq != quant && nq != 0 {
                        v = round_div(i32::from(v) * i32::from(nq), i32::from(quant)) as i16;
                    }
                    blk[i] += v;
                }
            },
        }
    }

    /// Returns the stored first row/column of a neighbour without touching
    /// the block, for the encoder's residual computation.
    pub fn ac_line(&self, no: usize, mb_x: usize, mb_y: usize,
                   avail: NeighborAvail, dir: PredDir, quant: u8) -> [i16; 8] {
        let mut tmp = [0i16; 64];
        self.predict_ac(no, mb_x, mb_y, avail, dir, quant, &mut tmp);
        let mut out = [0i16; 8];
        match dir {
            PredDir::Left => for i in 1..8 { out[i] = tmp[i * 8]; },
            PredDir::Top  => for i in 1..8 { out[i] = tmp[i]; },
        }
        out
    }

    /// Stores the reconstructed DC (already multiplied by its scale) and the
    /// block's first row and column for future neighbours. This happens for
    /// every intra block whether or not AC prediction was used on it.
    pub fn store(&mut self, no: usize, mb_x: usize, mb_y: usize, quant: u8,
                 scaled_dc: i16, blk: &[i16; 64]) {
        let (row, col) = Self::pos(no, mb_x, mb_y);
        let plane = self.plane_mut(no);
        let idx = plane.idx(row, col);
        plane.dc[idx] = scaled_dc;
        for i in 0..8 {
            plane.row[idx][i] = blk[i];
            plane.col[idx][i] = blk[i * 8];
        }
        plane.q[idx] = quant;
    }

    /// Resets the history of a non-intra macroblock so later intra
    /// neighbours see the neutral defaults.
    pub fn reset_mb(&mut self, mb_x: usize, mb_y: usize) {
        for no in 0..6 {
            let (row, col) = Self::pos(no, mb_x, mb_y);
            self.plane_mut(no).clear_at(row, col);
        }
    }
}

impl Default for PredHistory {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_div_is_sign_aware() {
        assert_eq!(round_div(7, 2), 4);
        assert_eq!(round_div(-7, 2), -4);
        assert_eq!(round_div(6, 4), 2);
        assert_eq!(round_div(-6, 4), -2);
        assert_eq!(round_div(0, 8), 0);
    }

    #[test]
    fn dc_scale_is_piecewise() {
        assert_eq!(dc_scale(1, true), 8);
        assert_eq!(dc_scale(5, true), 10);
        assert_eq!(dc_scale(24, true), 32);
        assert_eq!(dc_scale(31, true), 46);
        assert_eq!(dc_scale(5, false), 9);
        assert_eq!(dc_scale(31, false), 25);
    }

    #[test]
    fn dc_direction_prefers_left_on_tie() {
        let mut hist = PredHistory::new();
        hist.reset(4, 4);
        // all neighbours neutral: gradients tie, left wins
        let avail = NeighborAvail { left: true, top: true };
        let (pred, dir) = hist.predict_dc(0, 1, 1, avail);
        assert_eq!(pred, 1024);
        assert_eq!(dir, PredDir::Left);
        // the choice must not mutate anything
        let again = hist.predict_dc(0, 1, 1, avail);
        assert_eq!(again, (pred, dir));
    }

    #[test]
    fn dc_direction_follows_gradient() {
        let mut hist = PredHistory::new();
        hist.reset(4, 4);
        let blk = [0i16; 64];
        // left 500, topleft 500, top 900: |a-b|=0 < |b-c|=400 -> top
        hist.store(1, 0, 1, 5, 500, &blk);   // left of block 0 in mb (1,1)
        hist.store(3, 0, 0, 5, 500, &blk);   // topleft
        hist.store(2, 1, 0, 5, 900, &blk);   // top
        let avail = NeighborAvail { left: true, top: true };
        let (pred, dir) = hist.predict_dc(0, 1, 1, avail);
        assert_eq!(dir, PredDir::Top);
        assert_eq!(pred, 900);
    }

    #[test]
    fn unavailable_neighbours_use_neutral() {
        let mut hist = PredHistory::new();
        hist.reset(2, 2);
        let avail = NeighborAvail::for_block(0, true, true);
        assert!(!avail.left && !avail.top);
        let (pred, dir) = hist.predict_dc(0, 0, 0, avail);
        assert_eq!((pred, dir), (1024, PredDir::Left));
    }

    #[test]
    fn ac_store_and_predict() {
        let mut hist = PredHistory::new();
        hist.reset(2, 1);
        let mut blk = [0i16; 64];
        for i in 1..8 { blk[i * 8] = i as i16; }
        hist.store(1, 0, 0, 5, 0, &blk);
        // block 0 of the next macroblock predicts from block 1's column
        let mut cur = [0i16; 64];
        let avail = NeighborAvail { left: true, top: false };
        hist.predict_ac(0, 1, 0, avail, PredDir::Left, 5, &mut cur);
        for i in 1..8 { assert_eq!(cur[i * 8], i as i16); }
        // different quantiser rescales
        let mut cur = [0i16; 64];
        hist.predict_ac(0, 1, 0, avail, PredDir::Left, 10, &mut cur);
        for i in 1..8 { assert_eq!(cur[i * 8], round_div(i as i32 * 5, 10) as i16); }
    }
}
