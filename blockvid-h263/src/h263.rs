//! H.263 and H.263+ picture/GOB layer coding.
use blockvid_core::codecs::{CodecError, CodecResult};
use blockvid_core::io::bitreader::BitReader;
use blockvid_core::io::bitwriter::BitWriter;

use crate::blockcodec::{BlockCodec, BlockCtx, Tables};
use crate::data::H263_SIZES;
use crate::decoder::BlockDecoder;
use crate::mb::{decode_mb_header_i, decode_mb_header_p};
use crate::pred::PredHistory;
use crate::types::*;

/// Picture start code value of the 22-bit sync word.
const PSC: u32 = 0x20;

/// Number of macroblock rows per GOB for a given picture height.
pub fn gob_height(h: usize) -> usize {
    if h <= 400 { 1 } else if h <= 800 { 2 } else { 4 }
}

fn check_marker(br: &mut BitReader) -> CodecResult<()> {
    if !br.read_bool()? {
        return Err(CodecError::InconsistentHeader);
    }
    Ok(())
}

/// H.263+ state that persists across pictures until the next full PLUSPTYPE
/// (UFEP = 1) re-signals it.
#[derive(Debug,Clone,Copy,Default)]
pub struct PlusState {
    valid:    bool,
    w:        usize,
    h:        usize,
    umvplus:  bool,
    apm:      bool,
    plusinfo: PlusInfo,
}

/// Bitstream reader for H.263 version 1 and H.263+ pictures.
pub struct H263Reader<'a> {
    br:         BitReader<'a>,
    tables:     &'a Tables,
    plus:       &'a mut PlusState,
    codec:      BlockCodec,
    gob_height: usize,
}

impl<'a> H263Reader<'a> {
    pub fn new(src: &'a [u8], tables: &'a Tables, plus: &'a mut PlusState) -> Self {
        H263Reader {
            br: BitReader::new(src),
            tables,
            plus,
            codec: BlockCodec::H263 { aic: false },
            gob_height: 1,
        }
    }

    fn find_startcode(&mut self) -> CodecResult<()> {
        self.br.align();
        let mut sync = self.br.read(22)?;
        while sync != PSC {
            if self.br.left() < 8 {
                return Err(CodecError::InconsistentHeader);
            }
            sync = ((sync << 8) | self.br.read(8)?) & 0x3F_FFFF;
        }
        Ok(())
    }

    fn decode_pichdr_v1(&mut self, sfmt: u32, ts: u16) -> CodecResult<PicInfo> {
        let br = &mut self.br;
        let (w, h) = H263_SIZES[sfmt as usize];
        validate!(w != 0);
        let is_intra = !br.read_bool()?;
        let long_vectors = br.read_bool()?;
        if br.read_bool()? {
            // syntax-based arithmetic coding
            return Err(CodecError::UnsupportedFeature);
        }
        let apm = br.read_bool()?;
        if br.read_bool()? {
            // PB-frames
            return Err(CodecError::UnsupportedFeature);
        }
        let quant = br.read(5)? as u8;
        validate!(quant != 0);
        if br.read_bool()? {
            // continuous presence multipoint
            return Err(CodecError::UnsupportedFeature);
        }
        skip_pei(br)?;
        Ok(PicInfo {
            w, h,
            mode: if is_intra { PicType::I } else { PicType::P },
            quant,
            mvmode: if long_vectors { MVMode::Long } else { MVMode::Old },
            fcode: 1,
            apm,
            umv: long_vectors,
            ts,
            plusinfo: None,
            mpeg4: None,
        })
    }

    fn decode_opptype(&mut self) -> CodecResult<u32> {
        let br = &mut self.br;
        let sfmt = br.read(3)?;
        let custom_pcf = br.read_bool()?;
        let umvplus = br.read_bool()?;
        if br.read_bool()? {
            return Err(CodecError::UnsupportedFeature); // SAC
        }
        let apm = br.read_bool()?;
        let aic = br.read_bool()?;
        let deblock = br.read_bool()?;
        let slice_struct = br.read_bool()?;
        if br.read_bool()? {
            return Err(CodecError::UnsupportedFeature); // reference picture selection
        }
        if br.read_bool()? {
            return Err(CodecError::UnsupportedFeature); // independent segments
        }
        let alt_inter_vlc = br.read_bool()?;
        let modified_quant = br.read_bool()?;
        check_marker(br)?; // start code emulation guard, always set
        let reserved = br.read(3)?;
        validate!(reserved == 0);
        self.plus.umvplus = umvplus;
        self.plus.apm = apm;
        self.plus.plusinfo = PlusInfo {
            aic, deblock, slice_struct, modified_quant, alt_inter_vlc, custom_pcf,
        };
        Ok(sfmt)
    }

    fn decode_pichdr_plus(&mut self, ts: u16) -> CodecResult<PicInfo> {
        let ufep = self.br.read(3)?;
        validate!(ufep <= 1);
        let opt_sfmt = if ufep == 1 {
                Some(self.decode_opptype()?)
            } else {
                if !self.plus.valid {
                    return Err(CodecError::InconsistentHeader);
                }
                None
            };
        let br = &mut self.br;
        // MPPTYPE
        let ptype = br.read(3)?;
        let mode = match ptype {
            0 => PicType::I,
            1 => PicType::P,
            _ => return Err(CodecError::UnsupportedFeature),
        };
        let rpr_rru = br.read(2)?;
        validate!(rpr_rru == 0);
        let _rounding = br.read_bool()?;
        br.read(4)?; // reserved + CPM
        if let Some(sfmt) = opt_sfmt {
            let (w, h) = if sfmt == 6 {
                    // custom picture format record
                    let par = br.read(4)?;
                    let w = ((br.read(9)? as usize) + 1) * 4;
                    check_marker(br)?;
                    let h = (br.read(9)? as usize) * 4;
                    validate!(h != 0);
                    if par == 0xF {
                        let pw = br.read(8)?;
                        let ph = br.read(8)?;
                        validate!(pw != 0 && ph != 0);
                    }
                    (w, h)
                } else {
                    let (w, h) = H263_SIZES[sfmt as usize];
                    validate!(w != 0);
                    (w, h)
                };
            self.plus.w = w;
            self.plus.h = h;
            if self.plus.plusinfo.custom_pcf {
                br.read(1)?; // clock conversion code
                let divisor = br.read(7)?;
                validate!(divisor != 0);
            }
        }
        if self.plus.plusinfo.custom_pcf {
            br.read(2)?; // extended temporal reference
        }
        if ufep == 1 {
            if self.plus.umvplus && !br.read_bool()? {
                // limited unrestricted vectors indicator
                br.read(1)?;
            }
            if self.plus.plusinfo.slice_struct {
                if br.read_bool()? {
                    return Err(CodecError::UnsupportedFeature); // rectangular slices
                }
                if br.read_bool()? {
                    return Err(CodecError::UnsupportedFeature); // arbitrary slice order
                }
            }
        }
        let quant = br.read(5)? as u8;
        validate!(quant != 0);
        skip_pei(br)?;
        self.plus.valid = true;
        Ok(PicInfo {
            w: self.plus.w,
            h: self.plus.h,
            mode,
            quant,
            mvmode: if self.plus.umvplus { MVMode::Umv } else { MVMode::Old },
            fcode: 1,
            apm: self.plus.apm,
            umv: self.plus.umvplus,
            ts,
            plusinfo: Some(self.plus.plusinfo),
            mpeg4: None,
        })
    }
}

fn skip_pei(br: &mut BitReader) -> CodecResult<()> {
    while br.read_bool()? {
        br.read(8)?;
    }
    Ok(())
}

impl<'a> BlockDecoder for H263Reader<'a> {
    fn decode_pichdr(&mut self) -> CodecResult<PicInfo> {
        self.find_startcode()?;
        let ts = self.br.read(8)? as u16;
        check_marker(&mut self.br)?;
        let id = self.br.read(1)?;
        validate!(id == 0);
        self.br.read(1)?; // split screen indicator
        self.br.read(1)?; // document camera indicator
        self.br.read(1)?; // freeze picture release
        let sfmt = self.br.read(3)?;
        validate!(sfmt != 0);
        let pinfo = if sfmt == 7 {
                self.decode_pichdr_plus(ts)?
            } else {
                self.decode_pichdr_v1(sfmt, ts)?
            };
        self.codec = BlockCodec::for_picture(&pinfo);
        self.gob_height = gob_height(pinfo.h);
        Ok(pinfo)
    }

    fn decode_slice_header(&mut self, pinfo: &PicInfo) -> CodecResult<SliceInfo> {
        let br = &mut self.br;
        let zeros = br.read(16)?;
        validate!(zeros == 0);
        // stuffing may pad the sync; seek the terminating one bit
        let mut left = br.left().min(32);
        loop {
            if left <= 13 { return Err(CodecError::InconsistentHeader); }
            if br.read_bool()? { break; }
            left -= 1;
        }
        let gn = br.read(5)? as usize;
        let _gfid = br.read(2)?;
        let gquant = br.read(5)? as u8;
        validate!(gquant != 0);
        let mb_y = gn * self.gob_height;
        validate!(mb_y < pinfo.mb_height());
        Ok(SliceInfo::new_gob(0, mb_y, gquant))
    }

    fn decode_mb_header(&mut self, pinfo: &PicInfo, slice: &SliceInfo,
                        sstate: &SliceState) -> CodecResult<MbInfo> {
        let quant = sstate.quant.max(1);
        let _ = slice;
        match pinfo.mode {
            PicType::I => decode_mb_header_i(&mut self.br, self.tables, pinfo, quant),
            _          => decode_mb_header_p(&mut self.br, self.tables, pinfo, quant),
        }
    }

    fn decode_block_intra(&mut self, info: &MbInfo, sstate: &SliceState,
                          hist: &mut PredHistory, no: usize, coded: bool,
                          blk: &mut [i16; 64]) -> CodecResult<()> {
        let mut ctx = BlockCtx {
            hist,
            mb_x: sstate.mb_x,
            mb_y: sstate.mb_y,
            first_mb: sstate.first_mb,
            first_line: sstate.first_line,
            quant: info.quant,
        };
        self.codec.decode_block_intra(&mut self.br, self.tables, &mut ctx, no,
                                      info.acpred, false, coded, blk)
    }

    fn decode_block_inter(&mut self, _info: &MbInfo, _no: usize, coded: bool,
                          blk: &mut [i16; 64]) -> CodecResult<()> {
        self.codec.decode_block_inter(&mut self.br, self.tables, coded, blk)
    }

    fn is_slice_end(&mut self) -> bool { self.br.peek(16) == 0 }
}

/// Emits an H.263 picture header matching what [`H263Reader`] parses. The
/// plus (PLUSPTYPE) layout is used whenever optional features or custom
/// dimensions require it.
pub fn encode_picture_header(bw: &mut BitWriter, pinfo: &PicInfo) -> CodecResult<()> {
    bw.align();
    bw.write(PSC, 22);
    bw.write(u32::from(pinfo.ts & 0xFF), 8);
    bw.write1(); // marker
    bw.write0(); // H.263 id
    bw.write0(); // split screen
    bw.write0(); // document camera
    bw.write0(); // freeze picture release
    let std_fmt = H263_SIZES.iter().position(|&(w, h)| w == pinfo.w && h == pinfo.h);
    let plain = pinfo.plusinfo.is_none()
        && std_fmt.is_some()
        && pinfo.mvmode != MVMode::Umv;
    if plain {
        bw.write(std_fmt.unwrap() as u32, 3);
        bw.write_bit(pinfo.mode != PicType::I);
        bw.write_bit(pinfo.mvmode == MVMode::Long);
        bw.write0(); // no SAC
        bw.write_bit(pinfo.apm);
        bw.write0(); // no PB-frames
        bw.write(u32::from(pinfo.quant), 5);
        bw.write0(); // no CPM
        bw.write0(); // no PEI
        return Ok(());
    }
    let plus = pinfo.plusinfo.unwrap_or_default();
    bw.write(7, 3);          // extended PTYPE follows
    bw.write(1, 3);          // UFEP: full OPPTYPE present
    let custom = std_fmt.is_none();
    bw.write(if custom { 6 } else { std_fmt.unwrap() as u32 }, 3);
    bw.write_bit(plus.custom_pcf);
    bw.write_bit(pinfo.mvmode == MVMode::Umv);
    bw.write0();             // no SAC
    bw.write_bit(pinfo.apm);
    bw.write_bit(plus.aic);
    bw.write_bit(plus.deblock);
    bw.write_bit(plus.slice_struct);
    bw.write0();             // no reference picture selection
    bw.write0();             // no independent segments
    bw.write_bit(plus.alt_inter_vlc);
    bw.write_bit(plus.modified_quant);
    bw.write1();             // start code emulation guard
    bw.write(0, 3);          // reserved
    // MPPTYPE
    bw.write(if pinfo.mode == PicType::I { 0 } else { 1 }, 3);
    bw.write(0, 2);          // no RPR/RRU
    bw.write0();             // rounding type
    bw.write(0, 4);          // reserved + CPM
    if custom {
        validate!(pinfo.w % 4 == 0 && pinfo.h % 4 == 0 && pinfo.w <= 2048 && pinfo.h <= 1152);
        bw.write(2, 4);      // aspect 12:11
        bw.write((pinfo.w / 4 - 1) as u32, 9);
        bw.write1();
        bw.write((pinfo.h / 4) as u32, 9);
    }
    if plus.custom_pcf {
        bw.write0();         // 1000 * 1.001 clock
        bw.write(1, 7);      // divisor
    }
    if plus.custom_pcf {
        bw.write(0, 2);      // extended temporal reference
    }
    if pinfo.mvmode == MVMode::Umv {
        bw.write1();         // unlimited range
    }
    if plus.slice_struct {
        bw.write0();
        bw.write0();
    }
    bw.write(u32::from(pinfo.quant), 5);
    bw.write0();             // no PEI
    Ok(())
}

/// Emits a GOB header at a byte-aligned position.
pub fn encode_gob_header(bw: &mut BitWriter, gob_no: usize, quant: u8) -> CodecResult<()> {
    bw.align();
    bw.write(1, 17);
    bw.write(gob_no as u32, 5);
    bw.write(0, 2); // GFID
    bw.write(u32::from(quant), 5);
    Ok(())
}
