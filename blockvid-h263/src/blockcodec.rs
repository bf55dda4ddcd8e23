//! Bit-level entropy coding of one 8x8 coefficient block.
//!
//! Coefficients stay in the quantised domain on both paths; dequantisation
//! belongs to the pixel reconstruction downstream. The coding style is
//! selected once per picture through [`BlockCodec`], never per block.
use blockvid_core::codecs::{CodecError, CodecResult};
use blockvid_core::io::bitreader::BitReader;
use blockvid_core::io::bitwriter::BitWriter;
use blockvid_core::io::codebook::{Codebook, CodebookReader};

use crate::ZIGZAG;
use crate::data::*;
use crate::pred::{dc_scale, round_div, NeighborAvail, PredDir, PredHistory};
use crate::rltab::RLTable;
use crate::types::{ACPredMode, PicInfo};

/// All codebooks and run-length tables, built once and shared by reference.
pub struct Tables {
    pub intra_mcbpc_cb: Codebook<u8>,
    pub inter_mcbpc_cb: Codebook<u8>,
    pub cbpy_cb:        Codebook<u8>,
    pub mv_cb:          Codebook<u8>,
    pub dc_lum_cb:      Codebook<u8>,
    pub dc_chrom_cb:    Codebook<u8>,
    pub traj_cb:        Codebook<u8>,
    pub rl_inter:       RLTable,
    pub rl_intra:       RLTable,
}

impl Tables {
    pub fn new() -> Self {
        let mut cr = ShortCodeReader::new(INTRA_MCBPC);
        let intra_mcbpc_cb = Codebook::new(&mut cr).unwrap();
        let mut cr = ShortCodeReader::new(INTER_MCBPC);
        let inter_mcbpc_cb = Codebook::new(&mut cr).unwrap();
        let mut cr = ShortCodeReader::new(CBPY);
        let cbpy_cb = Codebook::new(&mut cr).unwrap();
        let mut cr = ShortCodeReader::new(MV_CODES);
        let mv_cb = Codebook::new(&mut cr).unwrap();
        let mut cr = ShortCodeReader::new(MPEG4_DC_LUM);
        let dc_lum_cb = Codebook::new(&mut cr).unwrap();
        let mut cr = ShortCodeReader::new(MPEG4_DC_CHROM);
        let dc_chrom_cb = Codebook::new(&mut cr).unwrap();
        let mut cr = ShortCodeReader::new(SPRITE_TRAJ_CODES);
        let traj_cb = Codebook::new(&mut cr).unwrap();
        Tables {
            intra_mcbpc_cb, inter_mcbpc_cb, cbpy_cb, mv_cb,
            dc_lum_cb, dc_chrom_cb, traj_cb,
            rl_inter: RLTable::new(RL_CODES_INTER),
            rl_intra: RLTable::new(RL_CODES_INTRA),
        }
    }
}

impl Default for Tables {
    fn default() -> Self { Self::new() }
}

/// The per-picture choice between the two block coding styles.
#[derive(Debug,Clone,Copy,PartialEq)]
pub enum BlockCodec {
    /// Plain H.263: literal intra DC, single fixed-length escape.
    H263 {
        /// Advanced intra coding: intra blocks use the intra table with
        /// spatial prediction instead of the literal DC.
        aic: bool,
    },
    /// MPEG-4 part 2: DC size VLC, three-tier escapes.
    Mpeg4,
}

impl BlockCodec {
    /// Picks the coding style for a picture; done once per picture from the
    /// parsed header, never per block.
    pub fn for_picture(pinfo: &PicInfo) -> Self {
        if pinfo.is_mpeg4() {
            BlockCodec::Mpeg4
        } else {
            BlockCodec::H263 { aic: pinfo.aic() }
        }
    }
}

/// Per-macroblock context the intra path needs for spatial prediction.
pub struct BlockCtx<'a> {
    pub hist:       &'a mut PredHistory,
    pub mb_x:       usize,
    pub mb_y:       usize,
    pub first_mb:   bool,
    pub first_line: bool,
    pub quant:      u8,
}

/// An intra block turned into the form that actually hits the bitstream.
pub struct IntraPrep {
    /// Residual coefficients in natural order; slot 0 holds the DC
    /// differential when the DC VLC is in use.
    pub residual: [i16; 64],
    pub dir:      PredDir,
    pub scan:     &'static [usize; 64],
    /// Whether anything beyond the separately coded DC remains.
    pub coded:    bool,
}

fn scan_for(acpred: ACPredMode, dir: PredDir) -> &'static [usize; 64] {
    match acpred {
        ACPredMode::None => &ZIGZAG,
        ACPredMode::DC   => match dir {
            PredDir::Left => &SCAN_V,
            PredDir::Top  => &SCAN_H,
        },
        ACPredMode::Hor  => &SCAN_V,
        ACPredMode::Ver  => &SCAN_H,
    }
}

fn ac_dir(acpred: ACPredMode, grad_dir: PredDir) -> PredDir {
    match acpred {
        ACPredMode::Hor => PredDir::Left,
        ACPredMode::Ver => PredDir::Top,
        _               => grad_dir,
    }
}

impl BlockCodec {
    /// Decodes one intra block into `blk` (natural order, quantised domain)
    /// and updates the prediction history.
    #[allow(clippy::too_many_arguments)]
    pub fn decode_block_intra(&self, br: &mut BitReader, tab: &Tables,
                              ctx: &mut BlockCtx, no: usize,
                              acpred: ACPredMode, use_dc_vlc: bool,
                              coded: bool, blk: &mut [i16; 64]) -> CodecResult<()> {
        match *self {
            BlockCodec::H263 { aic: false } => {
                let mut dc = br.read(8)? as i16;
                validate!(dc != 0 && dc != 128);
                if dc == 255 { dc = 128; }
                blk[0] = dc;
                if coded {
                    decode_run_loop(br, &tab.rl_inter, EscMode::H263, &ZIGZAG, 1, blk)?;
                }
                Ok(())
            },
            BlockCodec::H263 { aic: true } => {
                let avail = NeighborAvail::for_block(no, ctx.first_mb, ctx.first_line);
                let (grad_pred, grad_dir) = ctx.hist.predict_dc(no, ctx.mb_x, ctx.mb_y, avail);
                let dir = ac_dir(acpred, grad_dir);
                let pred = match acpred {
                    ACPredMode::Hor => dc_neighbor(ctx, no, avail, PredDir::Left),
                    ACPredMode::Ver => dc_neighbor(ctx, no, avail, PredDir::Top),
                    _               => grad_pred,
                };
                let scan = scan_for(acpred, grad_dir);
                if coded {
                    decode_run_loop(br, &tab.rl_intra, EscMode::H263, scan, 0, blk)?;
                }
                finish_intra(ctx, no, acpred, avail, dir, pred, blk);
                Ok(())
            },
            BlockCodec::Mpeg4 => {
                let avail = NeighborAvail::for_block(no, ctx.first_mb, ctx.first_line);
                let (pred, grad_dir) = ctx.hist.predict_dc(no, ctx.mb_x, ctx.mb_y, avail);
                let dir = ac_dir(acpred, grad_dir);
                let start;
                if use_dc_vlc {
                    blk[0] = decode_mpeg4_dc(br, tab, no)?;
                    start = 1;
                } else {
                    start = 0;
                }
                let scan = scan_for(acpred, grad_dir);
                if coded {
                    decode_run_loop(br, &tab.rl_intra, EscMode::Mpeg4, scan, start, blk)?;
                }
                finish_intra(ctx, no, acpred, avail, dir, pred, blk);
                Ok(())
            },
        }
    }

    /// Decodes one inter block into `blk`.
    pub fn decode_block_inter(&self, br: &mut BitReader, tab: &Tables,
                              coded: bool, blk: &mut [i16; 64]) -> CodecResult<()> {
        if !coded { return Ok(()); }
        let esc = match *self {
            BlockCodec::Mpeg4 => EscMode::Mpeg4,
            _                 => EscMode::H263,
        };
        decode_run_loop(br, &tab.rl_inter, esc, &ZIGZAG, 0, blk)
    }

    /// Turns an intra block into its residual form, updating the history
    /// exactly like the decoder would. Emission happens separately since
    /// the coded-block-pattern precedes the block data in the stream.
    pub fn prepare_intra(&self, ctx: &mut BlockCtx, no: usize,
                         acpred: ACPredMode, use_dc_vlc: bool,
                         blk: &[i16; 64]) -> CodecResult<IntraPrep> {
        let avail = NeighborAvail::for_block(no, ctx.first_mb, ctx.first_line);
        let (grad_pred, grad_dir) = ctx.hist.predict_dc(no, ctx.mb_x, ctx.mb_y, avail);
        let dir = ac_dir(acpred, grad_dir);
        let mut residual = *blk;

        match *self {
            BlockCodec::H263 { aic: false } => {
                let mut dc = blk[0];
                validate!(dc >= 1 && dc <= 254);
                if dc == 128 { dc = 255; }
                residual[0] = dc;
                let coded = residual.iter().skip(1).any(|&c| c != 0);
                Ok(IntraPrep { residual, dir, scan: &ZIGZAG, coded })
            },
            BlockCodec::H263 { aic: true } | BlockCodec::Mpeg4 => {
                let pred = match acpred {
                    ACPredMode::Hor => dc_neighbor(ctx, no, avail, PredDir::Left),
                    ACPredMode::Ver => dc_neighbor(ctx, no, avail, PredDir::Top),
                    _               => grad_pred,
                };
                let scale = dc_scale(ctx.quant, no < 4);
                // the advanced-intra path folds the DC into the run loop
                let want_dc_vlc = match *self {
                    BlockCodec::Mpeg4 => use_dc_vlc,
                    _                 => false,
                };
                if acpred != ACPredMode::None {
                    let line = ctx.hist.ac_line(no, ctx.mb_x, ctx.mb_y, avail, dir, ctx.quant);
                    match dir {
                        PredDir::Left => for i in 1..8 { residual[i * 8] -= line[i]; },
                        PredDir::Top  => for i in 1..8 { residual[i]     -= line[i]; },
                    }
                }
                let pred_q = round_div(i32::from(pred), i32::from(scale)) as i16;
                residual[0] = blk[0] - pred_q;
                ctx.hist.store(no, ctx.mb_x, ctx.mb_y, ctx.quant,
                               blk[0].saturating_mul(scale), blk);
                let coded = if want_dc_vlc {
                        residual.iter().skip(1).any(|&c| c != 0)
                    } else {
                        residual.iter().any(|&c| c != 0)
                    };
                let scan = scan_for(acpred, grad_dir);
                Ok(IntraPrep { residual, dir, scan, coded })
            },
        }
    }

    /// Emits a prepared intra block.
    pub fn write_block_intra(&self, bw: &mut BitWriter, tab: &Tables,
                             prep: &IntraPrep, no: usize, use_dc_vlc: bool,
                             coded: bool) -> CodecResult<()> {
        match *self {
            BlockCodec::H263 { aic: false } => {
                bw.write(prep.residual[0] as u32, 8);
                if coded {
                    encode_run_loop(bw, &tab.rl_inter, EscMode::H263, prep.scan, 1, &prep.residual)?;
                }
            },
            BlockCodec::H263 { aic: true } => {
                if coded {
                    encode_run_loop(bw, &tab.rl_intra, EscMode::H263, prep.scan, 0, &prep.residual)?;
                }
            },
            BlockCodec::Mpeg4 => {
                let start = if use_dc_vlc {
                        encode_mpeg4_dc(bw, tab, no, prep.residual[0])?;
                        1
                    } else {
                        0
                    };
                if coded {
                    encode_run_loop(bw, &tab.rl_intra, EscMode::Mpeg4, prep.scan, start, &prep.residual)?;
                }
            },
        }
        Ok(())
    }

    /// Emits one inter block; the caller has already checked it is coded.
    pub fn write_block_inter(&self, bw: &mut BitWriter, tab: &Tables,
                             blk: &[i16; 64]) -> CodecResult<()> {
        let esc = match *self {
            BlockCodec::Mpeg4 => EscMode::Mpeg4,
            _                 => EscMode::H263,
        };
        encode_run_loop(bw, &tab.rl_inter, esc, &ZIGZAG, 0, blk)
    }
}

fn dc_neighbor(ctx: &BlockCtx, no: usize, avail: NeighborAvail, dir: PredDir) -> i16 {
    // directional fetch for the explicitly signalled H.263 Annex I modes
    let probe = NeighborAvail {
        left: avail.left && dir == PredDir::Left,
        top:  avail.top  && dir == PredDir::Top,
    };
    let (pred, _) = ctx.hist.predict_dc(no, ctx.mb_x, ctx.mb_y, probe);
    pred
}

fn finish_intra(ctx: &mut BlockCtx, no: usize, acpred: ACPredMode,
                avail: NeighborAvail, dir: PredDir, pred: i16,
                blk: &mut [i16; 64]) {
    let scale = dc_scale(ctx.quant, no < 4);
    let pred_q = round_div(i32::from(pred), i32::from(scale)) as i16;
    let mut level = i32::from(blk[0]) + i32::from(pred_q);
    if level < -2048 { level = -2048; }
    if level >  2047 { level =  2047; }
    blk[0] = level as i16;
    if acpred != ACPredMode::None {
        ctx.hist.predict_ac(no, ctx.mb_x, ctx.mb_y, avail, dir, ctx.quant, blk);
    }
    ctx.hist.store(no, ctx.mb_x, ctx.mb_y, ctx.quant,
                   blk[0].saturating_mul(scale), blk);
}

#[derive(Clone,Copy,PartialEq)]
enum EscMode {
    H263,
    Mpeg4,
}

fn decode_mpeg4_dc(br: &mut BitReader, tab: &Tables, no: usize) -> CodecResult<i16> {
    let cb = if no < 4 { &tab.dc_lum_cb } else { &tab.dc_chrom_cb };
    let size = br.read_cb(cb)?;
    if size == 0 { return Ok(0); }
    let bits = br.read(size)?;
    let diff = if (bits >> (size - 1)) != 0 {
            bits as i32
        } else {
            bits as i32 - (1 << size) + 1
        };
    if size > 8 {
        let marker = br.read_bool()?;
        validate!(marker);
    }
    Ok(diff as i16)
}

fn encode_mpeg4_dc(bw: &mut BitWriter, tab: &Tables, no: usize, diff: i16) -> CodecResult<()> {
    let codes = if no < 4 { MPEG4_DC_LUM } else { MPEG4_DC_CHROM };
    let adiff = i32::from(diff).abs() as u32;
    let mut size = 0u8;
    while (adiff >> size) != 0 { size += 1; }
    if usize::from(size) >= codes.len() { return Err(CodecError::OutOfRangeIndex); }
    let (code, bits) = codes[size as usize];
    bw.write(u32::from(code), bits);
    if size > 0 {
        let v = if diff >= 0 {
                i32::from(diff)
            } else {
                i32::from(diff) + (1 << size) - 1
            };
        bw.write(v as u32, size);
        if size > 8 {
            bw.write1();
        }
    }
    Ok(())
}

/// Decodes the run-length coded part of a block starting at scan position
/// `start`, resolving escapes per coding style.
fn decode_run_loop(br: &mut BitReader, rl: &RLTable, esc: EscMode,
                   scan: &[usize; 64], start: u8, blk: &mut [i16; 64]) -> CodecResult<()> {
    let mut idx = start;
    loop {
        let sym = rl.read_sym(br)?;
        let run;
        let mut level;
        let last;
        if !sym.is_escape() {
            run   = sym.get_run();
            level = sym.get_level();
            last  = sym.is_last();
            if br.read_bool()? { level = -level; }
        } else {
            match esc {
                EscMode::H263 => {
                    last  = br.read_bool()?;
                    run   = br.read(6)? as u8;
                    level = br.read_s(8)? as i16;
                    validate!(level != 0);
                    if level == -128 {
                        let low = br.read(5)? as i16;
                        let top = br.read_s(6)? as i16;
                        level = (top << 5) | low;
                        validate!(level != 0);
                    }
                },
                EscMode::Mpeg4 => {
                    if !br.read_bool()? {
                        // level offset tier
                        let sym = rl.check_not_escape(rl.read_sym(br)?)?;
                        run   = sym.get_run();
                        last  = sym.is_last();
                        level = sym.get_level() + i16::from(rl.max_level(last, run));
                        if br.read_bool()? { level = -level; }
                    } else if !br.read_bool()? {
                        // run offset tier
                        let sym = rl.check_not_escape(rl.read_sym(br)?)?;
                        last  = sym.is_last();
                        level = sym.get_level();
                        run   = sym.get_run() + rl.max_run(last, level as u8) + 1;
                        if br.read_bool()? { level = -level; }
                    } else {
                        // fixed-length literal tier
                        last = br.read_bool()?;
                        run  = br.read(6)? as u8;
                        let marker = br.read_bool()?;
                        validate!(marker);
                        level = br.read_s(12)? as i16;
                        let marker = br.read_bool()?;
                        validate!(marker);
                        validate!(level != 0);
                    }
                },
            }
        }
        idx += run;
        if idx >= 64 { return Err(CodecError::OutOfRangeIndex); }
        blk[scan[idx as usize]] = level;
        idx += 1;
        if last { break; }
        if idx >= 64 { return Err(CodecError::OutOfRangeIndex); }
    }
    Ok(())
}

/// Encodes the run-length coded part of a block; the caller guarantees at
/// least one nonzero coefficient at or after `start`.
fn encode_run_loop(bw: &mut BitWriter, rl: &RLTable, esc: EscMode,
                   scan: &[usize; 64], start: u8, blk: &[i16; 64]) -> CodecResult<()> {
    let mut last_nz = None;
    for idx in (start..64).rev() {
        if blk[scan[idx as usize]] != 0 { last_nz = Some(idx); break; }
    }
    let last_nz = match last_nz {
        Some(idx) => idx,
        None => return Err(CodecError::OutOfRangeIndex),
    };
    let mut run = 0u8;
    for idx in start..=last_nz {
        let level = blk[scan[idx as usize]];
        if level == 0 {
            run += 1;
            continue;
        }
        let last = idx == last_nz;
        write_ac(bw, rl, esc, last, run, level)?;
        run = 0;
    }
    Ok(())
}

fn write_ac(bw: &mut BitWriter, rl: &RLTable, esc: EscMode,
            last: bool, run: u8, level: i16) -> CodecResult<()> {
    let sign = level < 0;
    let alevel = if sign { -i32::from(level) } else { i32::from(level) };
    if alevel <= 127 || esc == EscMode::Mpeg4 {
        let small = if alevel < 64 { alevel as u8 } else { 0 };
        let idx = rl.index_of(last, run, small);
        if idx != rl.escape_index() {
            rl.write_code(bw, idx);
            bw.write_bit(sign);
            return Ok(());
        }
    }
    match esc {
        EscMode::H263 => {
            validate!(alevel <= 1023);
            rl.write_escape(bw);
            bw.write_bit(last);
            bw.write(u32::from(run), 6);
            if alevel <= 127 {
                bw.write_s(i32::from(level), 8);
            } else {
                // extended level escape, flagged by the reserved -128 value
                bw.write_s(-128, 8);
                bw.write((level as u32) & 0x1F, 5);
                bw.write_s(i32::from(level) >> 5, 6);
            }
        },
        EscMode::Mpeg4 => {
            if alevel > 2047 { return Err(CodecError::OutOfRangeIndex); }
            // level offset tier
            let lvl2 = alevel - i32::from(rl.max_level(last, run));
            if lvl2 >= 1 && lvl2 < 64 {
                let idx = rl.index_of(last, run, lvl2 as u8);
                if idx != rl.escape_index() {
                    rl.write_escape(bw);
                    bw.write0();
                    rl.write_code(bw, idx);
                    bw.write_bit(sign);
                    return Ok(());
                }
            }
            // run offset tier
            if alevel < 64 {
                let max_run = rl.max_run(last, alevel as u8);
                if run > max_run {
                    let run2 = run - max_run - 1;
                    let idx = rl.index_of(last, run2, alevel as u8);
                    if idx != rl.escape_index() {
                        rl.write_escape(bw);
                        bw.write(0b10, 2);
                        rl.write_code(bw, idx);
                        bw.write_bit(sign);
                        return Ok(());
                    }
                }
            }
            // fixed-length literal tier
            rl.write_escape(bw);
            bw.write(0b11, 2);
            bw.write_bit(last);
            bw.write(u32::from(run), 6);
            bw.write1();
            bw.write_s(i32::from(level), 12);
            bw.write1();
        },
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pred::PredHistory;

    fn roundtrip_inter(codec: BlockCodec, blk: &[i16; 64]) {
        let tab = Tables::new();
        let mut bw = BitWriter::new(Vec::new());
        codec.write_block_inter(&mut bw, &tab, blk).unwrap();
        let data = bw.end();
        let mut br = BitReader::new(&data);
        let mut out = [0i16; 64];
        codec.decode_block_inter(&mut br, &tab, true, &mut out).unwrap();
        assert_eq!(&out[..], &blk[..]);
    }

    #[test]
    fn inter_roundtrip_h263() {
        let mut blk = [0i16; 64];
        blk[0] = 5; blk[1] = -3; blk[10] = 1; blk[63] = 2;
        roundtrip_inter(BlockCodec::H263 { aic: false }, &blk);
    }

    #[test]
    fn inter_roundtrip_mpeg4_escapes() {
        // walk every escape tier: direct, level offset, run offset, literal
        let mut blk = [0i16; 64];
        blk[ZIGZAG[0]] = 12;    // largest direct level for run 0
        blk[ZIGZAG[1]] = 13;    // level offset tier
        blk[ZIGZAG[30]] = 1;    // long run -> run offset tier
        blk[ZIGZAG[63]] = 1000; // literal tier
        roundtrip_inter(BlockCodec::Mpeg4, &blk);
    }

    #[test]
    fn inter_roundtrip_h263_extended_level() {
        let mut blk = [0i16; 64];
        blk[ZIGZAG[3]] = 600;
        blk[ZIGZAG[4]] = -600;
        roundtrip_inter(BlockCodec::H263 { aic: false }, &blk);
    }

    #[test]
    fn escape_tiers_are_exhaustive() {
        // every (run, level, last) outside the direct range must encode
        let tab = Tables::new();
        let codec = BlockCodec::Mpeg4;
        for &(run, level) in &[(0u8, 13i16), (1, 7), (40, 1), (63, 1), (0, 2047), (5, -300)] {
            let mut blk = [0i16; 64];
            blk[ZIGZAG[run as usize]] = level;
            let mut bw = BitWriter::new(Vec::new());
            codec.write_block_inter(&mut bw, &tab, &blk).unwrap();
            let data = bw.end();
            let mut br = BitReader::new(&data);
            let mut out = [0i16; 64];
            codec.decode_block_inter(&mut br, &tab, true, &mut out).unwrap();
            assert_eq!(&out[..], &blk[..]);
        }
    }

    #[test]
    fn overrun_is_an_error_not_a_panic() {
        let tab = Tables::new();
        let codec = BlockCodec::Mpeg4;
        // escape literal with run 63 then another coefficient would pass 64
        let mut bw = BitWriter::new(Vec::new());
        write_ac(&mut bw, &tab.rl_inter, EscMode::Mpeg4, false, 63, 5).unwrap();
        write_ac(&mut bw, &tab.rl_inter, EscMode::Mpeg4, true, 0, 5).unwrap();
        let data = bw.end();
        let mut br = BitReader::new(&data);
        let mut out = [0i16; 64];
        let ret = codec.decode_block_inter(&mut br, &tab, true, &mut out);
        assert_eq!(ret, Err(CodecError::OutOfRangeIndex));
    }

    #[test]
    fn intra_dc_roundtrip_mpeg4() {
        let tab = Tables::new();
        let codec = BlockCodec::Mpeg4;
        let mut hist_e = PredHistory::new();
        hist_e.reset(2, 2);
        let mut hist_d = PredHistory::new();
        hist_d.reset(2, 2);

        let mut blk = [0i16; 64];
        blk[0] = 128;

        let mut ctx = BlockCtx {
            hist: &mut hist_e, mb_x: 0, mb_y: 0,
            first_mb: true, first_line: true, quant: 8,
        };
        let prep = codec.prepare_intra(&mut ctx, 0, ACPredMode::None, true, &blk).unwrap();
        assert!(!prep.coded);
        let mut bw = BitWriter::new(Vec::new());
        codec.write_block_intra(&mut bw, &tab, &prep, 0, true, prep.coded).unwrap();
        let data = bw.end();

        let mut br = BitReader::new(&data);
        let mut out = [0i16; 64];
        let mut ctx = BlockCtx {
            hist: &mut hist_d, mb_x: 0, mb_y: 0,
            first_mb: true, first_line: true, quant: 8,
        };
        codec.decode_block_intra(&mut br, &tab, &mut ctx, 0,
                                 ACPredMode::None, true, prep.coded, &mut out).unwrap();
        assert_eq!(out[0], 128);
        // history keeps the scaled reconstruction for the next neighbour
        let avail = NeighborAvail { left: true, top: false };
        let (pred, _) = hist_d.predict_dc(1, 0, 0, avail);
        assert_eq!(pred, 128 * dc_scale(8, true));
    }

    #[test]
    fn intra_roundtrip_h263_plain() {
        let tab = Tables::new();
        let codec = BlockCodec::H263 { aic: false };
        let mut hist = PredHistory::new();
        hist.reset(1, 1);
        let mut blk = [0i16; 64];
        blk[0] = 200; blk[5] = 3; blk[8] = -1;
        let mut ctx = BlockCtx {
            hist: &mut hist, mb_x: 0, mb_y: 0,
            first_mb: true, first_line: true, quant: 10,
        };
        let prep = codec.prepare_intra(&mut ctx, 0, ACPredMode::None, false, &blk).unwrap();
        assert!(prep.coded);
        let mut bw = BitWriter::new(Vec::new());
        codec.write_block_intra(&mut bw, &tab, &prep, 0, false, prep.coded).unwrap();
        let data = bw.end();
        let mut br = BitReader::new(&data);
        let mut out = [0i16; 64];
        let mut hist2 = PredHistory::new();
        hist2.reset(1, 1);
        let mut ctx = BlockCtx {
            hist: &mut hist2, mb_x: 0, mb_y: 0,
            first_mb: true, first_line: true, quant: 10,
        };
        codec.decode_block_intra(&mut br, &tab, &mut ctx, 0,
                                 ACPredMode::None, false, prep.coded, &mut out).unwrap();
        assert_eq!(&out[..], &blk[..]);
    }

    #[test]
    fn mpeg4_intra_ac_prediction_roundtrip() {
        let tab = Tables::new();
        let codec = BlockCodec::Mpeg4;
        let mut hist_e = PredHistory::new();
        hist_e.reset(2, 1);
        let mut hist_d = PredHistory::new();
        hist_d.reset(2, 1);

        // block 0 establishes history, block 1 of the same macroblock
        // predicts its first column from it
        let mut blk0 = [0i16; 64];
        blk0[0] = 100;
        for i in 1..8 { blk0[i * 8] = i as i16; blk0[i] = -(i as i16); }
        let mut blk1 = [0i16; 64];
        blk1[0] = 101;
        for i in 1..8 { blk1[i * 8] = i as i16 - 2; }

        let mut preps = Vec::new();
        let data = {
            let mut bw = BitWriter::new(Vec::new());
            for (no, blk) in [blk0, blk1].iter().enumerate() {
                let mut ctx = BlockCtx {
                    hist: &mut hist_e, mb_x: 0, mb_y: 0,
                    first_mb: true, first_line: true, quant: 6,
                };
                let acpred = if no == 0 { ACPredMode::None } else { ACPredMode::DC };
                let prep = codec.prepare_intra(&mut ctx, no, acpred, true, blk).unwrap();
                codec.write_block_intra(&mut bw, &tab, &prep, no, true, prep.coded).unwrap();
                preps.push(prep.coded);
            }
            bw.end()
        };

        let mut br = BitReader::new(&data);
        for (no, blk) in [blk0, blk1].iter().enumerate() {
            let mut ctx = BlockCtx {
                hist: &mut hist_d, mb_x: 0, mb_y: 0,
                first_mb: true, first_line: true, quant: 6,
            };
            let acpred = if no == 0 { ACPredMode::None } else { ACPredMode::DC };
            let mut out = [0i16; 64];
            codec.decode_block_intra(&mut br, &tab, &mut ctx, no,
                                     acpred, true, preps[no], &mut out).unwrap();
            assert_eq!(&out[..], &blk[..], "block {}", no);
        }
    }
}
