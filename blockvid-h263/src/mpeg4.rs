//! MPEG-4 part 2 layer parsing and emission.
//!
//! The start-code-delimited stream is surfaced as a sequence of typed
//! [`Layer`] records; the picture reader keeps scanning past unrecognised
//! layers until a VOP appears, so no unstructured control transfer is
//! needed for the "skip unknown, keep searching" behaviour.
use blockvid_core::codecs::{CodecError, CodecResult};
use blockvid_core::io::bitreader::BitReader;
use blockvid_core::io::bitwriter::BitWriter;

use crate::blockcodec::{BlockCodec, BlockCtx, Tables};
use crate::data::MPEG4_DC_THRESHOLD;
use crate::decoder::BlockDecoder;
use crate::mb::{decode_mb_header_i, decode_mb_header_p};
use crate::pred::PredHistory;
use crate::sprite::{decode_trajectory, encode_trajectory, SpriteWarp};
use crate::types::*;

const START_VOL_FIRST: u8 = 0x20;
const START_VOL_LAST:  u8 = 0x2F;
const START_USER_DATA: u8 = 0xB2;
const START_GOP:       u8 = 0xB3;
const START_VISOBJSEQ: u8 = 0xB0;
const START_VISOBJ:    u8 = 0xB5;
const START_VOP:       u8 = 0xB6;

/// Stuffing-plus-zero-run windows announcing a resync marker, by bit
/// position within the byte.
const RESYNC_PREFIX: [u32; 8] = [
    0x7F00, 0x7E00, 0x7C00, 0x7800, 0x7000, 0x6000, 0x4000, 0x0000,
];

/// Sprite coding mode of the sequence.
#[derive(Debug,Clone,Copy,PartialEq)]
pub enum SpriteUsage {
    None,
    Gmc,
}

/// Sequence (video object layer) state that persists across pictures until
/// the next VOL header re-signals it.
#[derive(Debug,Clone,Copy)]
pub struct VolInfo {
    pub width:               usize,
    pub height:              usize,
    pub time_resolution:     u16,
    pub time_increment_bits: u8,
    pub quant_precision:     u8,
    pub sprite:              SpriteUsage,
    pub warp_points:         usize,
    pub warp_accuracy:       u8,
    pub resync_marker:       bool,
    pub interlaced:          bool,
}

/// Derives the time increment field width from the signalled resolution.
pub fn time_increment_bits(resolution: u16) -> u8 {
    let mut bits = 0u8;
    while ((u32::from(resolution) - 1) >> bits) != 0 { bits += 1; }
    bits.max(1)
}

/// One start-code-delimited record of the stream.
pub enum Layer {
    Sequence(VolInfo),
    UserData,
    Gop,
    Picture(PicInfo),
    Unknown(u8),
}

/// Bitstream reader for MPEG-4 part 2 pictures.
pub struct Mpeg4Reader<'a> {
    br:     BitReader<'a>,
    tables: &'a Tables,
    vol:    &'a mut Option<VolInfo>,
    codec:  BlockCodec,
    fcode:  u8,
    thr:    u8,
    mode:   PicType,
    mb_w:   usize,
    mb_num: usize,
}

impl<'a> Mpeg4Reader<'a> {
    pub fn new(src: &'a [u8], tables: &'a Tables, vol: &'a mut Option<VolInfo>) -> Self {
        Mpeg4Reader {
            br: BitReader::new(src),
            tables,
            vol,
            codec: BlockCodec::Mpeg4,
            fcode: 1,
            thr: 0,
            mode: PicType::I,
            mb_w: 0,
            mb_num: 0,
        }
    }

    fn find_startcode(&mut self) -> CodecResult<u8> {
        self.br.align();
        while self.br.peek(24) != 1 {
            if self.br.left() < 32 {
                return Err(CodecError::ShortData);
            }
            self.br.skip(8)?;
        }
        self.br.skip(24)?;
        Ok(self.br.read(8)? as u8)
    }

    fn check_marker(&mut self) -> CodecResult<()> {
        if !self.br.read_bool()? {
            return Err(CodecError::InconsistentHeader);
        }
        Ok(())
    }

    /// Parses the next start-code-delimited layer.
    pub fn next_layer(&mut self) -> CodecResult<Layer> {
        let code = self.find_startcode()?;
        match code {
            START_VOL_FIRST..=START_VOL_LAST => {
                let vol = self.decode_vol_header()?;
                *self.vol = Some(vol);
                Ok(Layer::Sequence(vol))
            },
            START_USER_DATA => {
                self.skip_to_next_startcode();
                Ok(Layer::UserData)
            },
            START_GOP => {
                self.br.read(20)?; // time code + closed + broken link
                Ok(Layer::Gop)
            },
            START_VOP => Ok(Layer::Picture(self.decode_vop_header()?)),
            START_VISOBJSEQ | START_VISOBJ => {
                self.skip_to_next_startcode();
                Ok(Layer::Unknown(code))
            },
            _ => {
                self.skip_to_next_startcode();
                Ok(Layer::Unknown(code))
            },
        }
    }

    fn skip_to_next_startcode(&mut self) {
        self.br.align();
        while self.br.left() >= 32 && self.br.peek(24) != 1 {
            let _ = self.br.skip(8);
        }
    }

    fn decode_vol_header(&mut self) -> CodecResult<VolInfo> {
        let br = &mut self.br;
        br.read(1)?; // random accessible
        br.read(8)?; // video object type indication
        let ver_id = if br.read_bool()? {
                let ver = br.read(4)?;
                br.read(3)?; // priority
                ver
            } else {
                1
            };
        let aspect = br.read(4)?;
        if aspect == 0xF {
            let pw = br.read(8)?;
            let ph = br.read(8)?;
            validate!(pw != 0 && ph != 0);
        }
        if br.read_bool()? {
            // VOL control parameters
            let chroma = br.read(2)?;
            validate!(chroma == 1);
            br.read(1)?; // low delay
            if br.read_bool()? {
                // VBV parameters
                br.read(15)?;
                if !br.read_bool()? { return Err(CodecError::InconsistentHeader); }
                br.read(15)?;
                if !br.read_bool()? { return Err(CodecError::InconsistentHeader); }
                br.read(15)?;
                if !br.read_bool()? { return Err(CodecError::InconsistentHeader); }
                br.read(3)?;
                br.read(11)?;
                if !br.read_bool()? { return Err(CodecError::InconsistentHeader); }
                br.read(15)?;
                if !br.read_bool()? { return Err(CodecError::InconsistentHeader); }
            }
        }
        let shape = br.read(2)?;
        if shape != 0 {
            return Err(CodecError::UnsupportedFeature);
        }
        self.check_marker()?;
        let br = &mut self.br;
        let time_resolution = br.read(16)? as u16;
        validate!(time_resolution != 0);
        let tbits = time_increment_bits(time_resolution);
        self.check_marker()?;
        let br = &mut self.br;
        if br.read_bool()? {
            br.read(tbits)?; // fixed VOP time increment
        }
        self.check_marker()?;
        let width = self.br.read(13)? as usize;
        self.check_marker()?;
        let height = self.br.read(13)? as usize;
        self.check_marker()?;
        validate!(width != 0 && height != 0);
        let br = &mut self.br;
        let interlaced = br.read_bool()?;
        br.read(1)?; // OBMC disable
        let sprite_code = if ver_id == 1 { br.read(1)? } else { br.read(2)? };
        let sprite = match sprite_code {
            0 => SpriteUsage::None,
            2 => SpriteUsage::Gmc,
            _ => return Err(CodecError::UnsupportedFeature), // static sprites
        };
        let mut warp_points = 0;
        let mut warp_accuracy = 0;
        if sprite == SpriteUsage::Gmc {
            warp_points = br.read(6)? as usize;
            validate!(warp_points <= 3);
            warp_accuracy = br.read(2)? as u8;
            if br.read_bool()? {
                return Err(CodecError::UnsupportedFeature); // brightness change
            }
        }
        let quant_precision = if br.read_bool()? {
                let prec = br.read(4)? as u8;
                let bpp = br.read(4)?;
                validate!(bpp == 8);
                validate!(prec >= 3 && prec <= 9);
                prec
            } else {
                5
            };
        if br.read_bool()? {
            // quantisation matrices; values are checked and dropped, the
            // dequantiser downstream owns them
            for _ in 0..2 {
                if br.read_bool()? {
                    for _ in 0..64 {
                        if br.read(8)? == 0 { break; }
                    }
                }
            }
        }
        if ver_id != 1 && br.read_bool()? {
            return Err(CodecError::UnsupportedFeature); // quarter sample
        }
        if !br.read_bool()? {
            return Err(CodecError::UnsupportedFeature); // complexity estimation
        }
        let resync_marker = !br.read_bool()?;
        if br.read_bool()? {
            return Err(CodecError::UnsupportedFeature); // data partitioning
        }
        if ver_id != 1 {
            if br.read_bool()? {
                return Err(CodecError::UnsupportedFeature); // newpred
            }
            if br.read_bool()? {
                return Err(CodecError::UnsupportedFeature); // reduced resolution
            }
        }
        if br.read_bool()? {
            return Err(CodecError::UnsupportedFeature); // scalability
        }
        Ok(VolInfo {
            width, height,
            time_resolution,
            time_increment_bits: tbits,
            quant_precision,
            sprite,
            warp_points,
            warp_accuracy,
            resync_marker,
            interlaced,
        })
    }

    fn decode_vop_header(&mut self) -> CodecResult<PicInfo> {
        let vol = match *self.vol {
            Some(ref vol) => *vol,
            None => return Err(CodecError::InconsistentHeader),
        };
        let mode = match self.br.read(2)? {
            0 => PicType::I,
            1 => PicType::P,
            3 => {
                if vol.sprite != SpriteUsage::Gmc {
                    return Err(CodecError::UnsupportedFeature);
                }
                PicType::S
            },
            _ => return Err(CodecError::UnsupportedFeature), // B-VOP
        };
        while self.br.read_bool()? {} // modulo time base
        self.check_marker()?;
        let ts = self.br.read(vol.time_increment_bits)? as u16;
        self.check_marker()?;
        let vop_coded = self.br.read_bool()?;
        let mut m4 = Mpeg4PicInfo {
            vop_coded,
            intra_dc_thr_code: 0,
            quant_precision: vol.quant_precision,
            rounding: false,
            sprite: None,
        };
        let mut pinfo = PicInfo {
            w: vol.width,
            h: vol.height,
            mode,
            quant: 1,
            mvmode: MVMode::Old,
            fcode: 1,
            apm: true,
            umv: false,
            ts,
            plusinfo: None,
            mpeg4: Some(m4),
        };
        if !vop_coded {
            self.setup_picture(&pinfo);
            return Ok(pinfo);
        }
        if mode != PicType::I {
            m4.rounding = self.br.read_bool()?;
        }
        m4.intra_dc_thr_code = self.br.read(3)? as u8;
        if vol.interlaced {
            self.br.read(1)?; // top field first
            if self.br.read_bool()? {
                return Err(CodecError::UnsupportedFeature); // alternate scan
            }
        }
        if mode == PicType::S {
            let d = decode_trajectory(&mut self.br, self.tables, vol.warp_points)?;
            let warp = SpriteWarp::derive(&d, vol.warp_points, vol.warp_accuracy,
                                          vol.width, vol.height)?;
            m4.sprite = Some(warp);
        }
        let quant = self.br.read(vol.quant_precision)? as u8;
        validate!(quant != 0);
        pinfo.quant = quant;
        if mode != PicType::I {
            let fcode = self.br.read(3)? as u8;
            validate!(fcode != 0);
            pinfo.fcode = fcode;
        }
        pinfo.mpeg4 = Some(m4);
        self.setup_picture(&pinfo);
        Ok(pinfo)
    }

    fn setup_picture(&mut self, pinfo: &PicInfo) {
        self.codec = BlockCodec::for_picture(pinfo);
        self.fcode = pinfo.fcode;
        self.mode = pinfo.mode;
        self.thr = pinfo.mpeg4.map(|m| m.intra_dc_thr_code).unwrap_or(0);
        self.mb_w = pinfo.mb_width();
        self.mb_num = pinfo.mb_width() * pinfo.mb_height();
    }

    fn resync_len(&self) -> u8 {
        match self.mode {
            PicType::I => 16,
            _          => 15 + self.fcode,
        }
    }

    fn mb_num_bits(&self) -> u8 {
        let mut bits = 1u8;
        while ((self.mb_num.max(2) - 1) >> bits) != 0 { bits += 1; }
        bits
    }
}

impl<'a> BlockDecoder for Mpeg4Reader<'a> {
    fn decode_pichdr(&mut self) -> CodecResult<PicInfo> {
        loop {
            match self.next_layer()? {
                Layer::Picture(pinfo) => return Ok(pinfo),
                _ => continue,
            }
        }
    }

    /// Parses a video packet header at a resync marker.
    fn decode_slice_header(&mut self, pinfo: &PicInfo) -> CodecResult<SliceInfo> {
        let vol = match *self.vol {
            Some(ref vol) => *vol,
            None => return Err(CodecError::InconsistentHeader),
        };
        // stuffing: a zero bit then ones up to the byte boundary
        let pad = 8 - ((self.br.tell() & 7) as u8);
        let stuffing = self.br.read(pad)?;
        validate!(stuffing == (1 << (pad - 1)) - 1);
        let mut zeros = 0;
        while !self.br.read_bool()? {
            zeros += 1;
            validate!(zeros <= 32);
        }
        validate!(zeros == self.resync_len());
        let mb_num = self.br.read(self.mb_num_bits())? as usize;
        validate!(mb_num < self.mb_num);
        let quant = self.br.read(vol.quant_precision)? as u8;
        validate!(quant != 0);
        if self.br.read_bool()? {
            // header extension: repeated picture fields, values already known
            while self.br.read_bool()? {}
            self.check_marker()?;
            self.br.read(vol.time_increment_bits)?;
            self.check_marker()?;
            self.br.read(2)?; // coding type
            self.br.read(3)?; // intra dc vlc threshold
            if pinfo.mode == PicType::S {
                decode_trajectory(&mut self.br, self.tables, vol.warp_points)?;
            }
            if pinfo.mode != PicType::I {
                let fcode = self.br.read(3)?;
                validate!(fcode != 0);
            }
        }
        Ok(SliceInfo::new_gob(mb_num % self.mb_w, mb_num / self.mb_w, quant))
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
        let use_dc_vlc = info.quant < MPEG4_DC_THRESHOLD[(self.thr & 7) as usize];
        let mut ctx = BlockCtx {
            hist,
            mb_x: sstate.mb_x,
            mb_y: sstate.mb_y,
            first_mb: sstate.first_mb,
            first_line: sstate.first_line,
            quant: info.quant,
        };
        self.codec.decode_block_intra(&mut self.br, self.tables, &mut ctx, no,
                                      info.acpred, use_dc_vlc, coded, blk)
    }

    fn decode_block_inter(&mut self, _info: &MbInfo, _no: usize, coded: bool,
                          blk: &mut [i16; 64]) -> CodecResult<()> {
        self.codec.decode_block_inter(&mut self.br, self.tables, coded, blk)
    }

    fn is_slice_end(&mut self) -> bool {
        if let Some(ref vol) = *self.vol {
            if !vol.resync_marker { return false; }
        }
        let k = (self.br.tell() & 7) as usize;
        self.br.peek(16) == RESYNC_PREFIX[k]
    }
}

/// Emits a minimal VOL header matching what [`Mpeg4Reader`] parses.
pub fn encode_vol_header(bw: &mut BitWriter, vol: &VolInfo) -> CodecResult<()> {
    bw.align();
    bw.write(1, 24);
    bw.write(u32::from(START_VOL_FIRST), 8);
    bw.write0();                 // random accessible
    bw.write(1, 8);              // simple object type
    let ver_id = if vol.sprite == SpriteUsage::Gmc { 2 } else { 1 };
    if ver_id != 1 {
        bw.write1();
        bw.write(ver_id, 4);
        bw.write(1, 3);          // priority
    } else {
        bw.write0();
    }
    bw.write(1, 4);              // square pixels
    bw.write0();                 // no VOL control parameters
    bw.write(0, 2);              // rectangular shape
    bw.write1();
    bw.write(u32::from(vol.time_resolution), 16);
    bw.write1();
    bw.write0();                 // no fixed VOP rate
    bw.write1();
    bw.write(vol.width as u32, 13);
    bw.write1();
    bw.write(vol.height as u32, 13);
    bw.write1();
    bw.write_bit(vol.interlaced);
    bw.write1();                 // OBMC disable
    if ver_id == 1 {
        bw.write0();             // no sprite
    } else {
        bw.write(2, 2);          // GMC sprite
        bw.write(vol.warp_points as u32, 6);
        bw.write(u32::from(vol.warp_accuracy), 2);
        bw.write0();             // no brightness change
    }
    if vol.quant_precision != 5 {
        bw.write1();
        bw.write(u32::from(vol.quant_precision), 4);
        bw.write(8, 4);
    } else {
        bw.write0();             // 8-bit video, 5-bit quantisers
    }
    bw.write0();                 // H.263-style quantisation
    if ver_id != 1 {
        bw.write0();             // no quarter sample
    }
    bw.write1();                 // complexity estimation disabled
    bw.write_bit(!vol.resync_marker);
    bw.write0();                 // no data partitioning
    if ver_id != 1 {
        bw.write0();             // no newpred
        bw.write0();             // no reduced resolution
    }
    bw.write0();                 // no scalability
    Ok(())
}

/// Emits a VOP header matching what [`Mpeg4Reader`] parses.
pub fn encode_vop_header(bw: &mut BitWriter, vol: &VolInfo, pinfo: &PicInfo) -> CodecResult<()> {
    let m4 = match pinfo.mpeg4 {
        Some(ref m4) => *m4,
        None => return Err(CodecError::InconsistentHeader),
    };
    bw.align();
    bw.write(1, 24);
    bw.write(u32::from(START_VOP), 8);
    bw.write(match pinfo.mode {
        PicType::I => 0,
        PicType::P => 1,
        PicType::S => 3,
    }, 2);
    bw.write0();                 // modulo time base ends immediately
    bw.write1();
    bw.write(u32::from(pinfo.ts) & ((1 << vol.time_increment_bits) - 1),
             vol.time_increment_bits);
    bw.write1();
    bw.write_bit(m4.vop_coded);
    if !m4.vop_coded {
        return Ok(());
    }
    if pinfo.mode != PicType::I {
        bw.write_bit(m4.rounding);
    }
    bw.write(u32::from(m4.intra_dc_thr_code), 3);
    if vol.interlaced {
        bw.write0();             // top field first
        bw.write0();             // no alternate scan
    }
    if pinfo.mode == PicType::S {
        let warp = match m4.sprite {
            Some(ref warp) => *warp,
            None => return Err(CodecError::InconsistentHeader),
        };
        encode_trajectory(bw, &warp.traj[..vol.warp_points])?;
    }
    bw.write(u32::from(pinfo.quant), vol.quant_precision);
    if pinfo.mode != PicType::I {
        bw.write(u32::from(pinfo.fcode), 3);
    }
    Ok(())
}

/// Emits a video packet (resync) header.
pub fn encode_video_packet_header(bw: &mut BitWriter, vol: &VolInfo, pinfo: &PicInfo,
                                  mb_num: usize, quant: u8) -> CodecResult<()> {
    // stuffing: zero bit plus ones up to the byte boundary
    let pad = 8 - ((bw.tell() & 7) as u8);
    bw.write((1 << (pad - 1)) - 1, pad);
    let zeros = match pinfo.mode {
        PicType::I => 16,
        _          => 15 + pinfo.fcode,
    };
    bw.write(0, zeros);
    bw.write1();
    let total = pinfo.mb_width() * pinfo.mb_height();
    let mut bits = 1u8;
    while ((total.max(2) - 1) >> bits) != 0 { bits += 1; }
    bw.write(mb_num as u32, bits);
    bw.write(u32::from(quant), vol.quant_precision);
    bw.write0();                 // no header extension
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn test_vol() -> VolInfo {
        VolInfo {
            width: 176, height: 144,
            time_resolution: 30,
            time_increment_bits: time_increment_bits(30),
            quant_precision: 5,
            sprite: SpriteUsage::None,
            warp_points: 0,
            warp_accuracy: 0,
            resync_marker: true,
            interlaced: false,
        }
    }

    #[test]
    fn time_increment_width_formula() {
        assert_eq!(time_increment_bits(1), 1);
        assert_eq!(time_increment_bits(2), 1);
        assert_eq!(time_increment_bits(3), 2);
        assert_eq!(time_increment_bits(25), 5);
        assert_eq!(time_increment_bits(30), 5);
        assert_eq!(time_increment_bits(25000), 15);
    }

    #[test]
    fn vol_header_roundtrip() {
        let tab = Tables::new();
        let vol_in = test_vol();
        let mut bw = BitWriter::new(Vec::new());
        encode_vol_header(&mut bw, &vol_in).unwrap();
        let data = bw.end();
        let mut vol = None;
        let mut rd = Mpeg4Reader::new(&data, &tab, &mut vol);
        match rd.next_layer().unwrap() {
            Layer::Sequence(v) => {
                assert_eq!((v.width, v.height), (176, 144));
                assert_eq!(v.time_resolution, 30);
                assert_eq!(v.time_increment_bits, 5);
                assert_eq!(v.quant_precision, 5);
                assert_eq!(v.sprite, SpriteUsage::None);
                assert!(v.resync_marker);
            },
            _ => panic!("expected a sequence layer"),
        }
        assert!(vol.is_some());
    }

    #[test]
    fn vop_header_roundtrip() {
        let tab = Tables::new();
        let vol_in = test_vol();
        let m4 = Mpeg4PicInfo {
            vop_coded: true,
            intra_dc_thr_code: 2,
            quant_precision: 5,
            rounding: true,
            sprite: None,
        };
        let pinfo_in = PicInfo {
            w: 176, h: 144, mode: PicType::P, quant: 9, mvmode: MVMode::Old,
            fcode: 2, apm: true, umv: false, ts: 7, plusinfo: None,
            mpeg4: Some(m4),
        };
        let mut bw = BitWriter::new(Vec::new());
        encode_vol_header(&mut bw, &vol_in).unwrap();
        encode_vop_header(&mut bw, &vol_in, &pinfo_in).unwrap();
        let data = bw.end();
        let mut vol = None;
        let mut rd = Mpeg4Reader::new(&data, &tab, &mut vol);
        let out = rd.decode_pichdr().unwrap();
        assert_eq!(out.mode, PicType::P);
        assert_eq!(out.quant, 9);
        assert_eq!(out.fcode, 2);
        assert_eq!(out.ts, 7);
        let m4_out = out.mpeg4.unwrap();
        assert!(m4_out.vop_coded);
        assert_eq!(m4_out.intra_dc_thr_code, 2);
        assert!(m4_out.rounding);
    }

    #[test]
    fn gmc_vop_header_roundtrip() {
        let tab = Tables::new();
        let mut vol_in = test_vol();
        vol_in.sprite = SpriteUsage::Gmc;
        vol_in.warp_points = 1;
        vol_in.warp_accuracy = 1;
        let d = [(6, -4), (0, 0), (0, 0)];
        let warp = SpriteWarp::derive(&d, 1, 1, 176, 144).unwrap();
        let m4 = Mpeg4PicInfo {
            vop_coded: true,
            intra_dc_thr_code: 0,
            quant_precision: 5,
            rounding: false,
            sprite: Some(warp),
        };
        let pinfo_in = PicInfo {
            w: 176, h: 144, mode: PicType::S, quant: 5, mvmode: MVMode::Old,
            fcode: 1, apm: true, umv: false, ts: 1, plusinfo: None,
            mpeg4: Some(m4),
        };
        let mut bw = BitWriter::new(Vec::new());
        encode_vol_header(&mut bw, &vol_in).unwrap();
        encode_vop_header(&mut bw, &vol_in, &pinfo_in).unwrap();
        let data = bw.end();
        let mut vol = None;
        let mut rd = Mpeg4Reader::new(&data, &tab, &mut vol);
        let out = rd.decode_pichdr().unwrap();
        assert_eq!(out.mode, PicType::S);
        let got = out.mpeg4.unwrap().sprite.unwrap();
        assert_eq!(got, warp);
        assert_eq!(got.skip_mv(), crate::MV::new(6, -4));
    }

    #[test]
    fn unknown_layers_are_skipped() {
        let tab = Tables::new();
        let vol_in = test_vol();
        let m4 = Mpeg4PicInfo {
            vop_coded: false,
            intra_dc_thr_code: 0,
            quant_precision: 5,
            rounding: false,
            sprite: None,
        };
        let pinfo_in = PicInfo {
            w: 176, h: 144, mode: PicType::I, quant: 4, mvmode: MVMode::Old,
            fcode: 1, apm: true, umv: false, ts: 0, plusinfo: None,
            mpeg4: Some(m4),
        };
        let mut bw = BitWriter::new(Vec::new());
        // visual object sequence, user data, then the real layers
        bw.write(1, 24);
        bw.write(u32::from(START_VISOBJSEQ), 8);
        bw.write(0xFE, 8);
        bw.write(1, 24);
        bw.write(u32::from(START_USER_DATA), 8);
        for &b in b"lavc" { bw.write(u32::from(b), 8); }
        encode_vol_header(&mut bw, &vol_in).unwrap();
        encode_vop_header(&mut bw, &vol_in, &pinfo_in).unwrap();
        let data = bw.end();
        let mut vol = None;
        let mut rd = Mpeg4Reader::new(&data, &tab, &mut vol);
        let out = rd.decode_pichdr().unwrap();
        assert_eq!(out.mode, PicType::I);
        assert!(!out.mpeg4.unwrap().vop_coded);
    }

    #[test]
    fn video_packet_roundtrip() {
        let tab = Tables::new();
        let vol_in = test_vol();
        let m4 = Mpeg4PicInfo {
            vop_coded: true,
            intra_dc_thr_code: 0,
            quant_precision: 5,
            rounding: false,
            sprite: None,
        };
        let pinfo = PicInfo {
            w: 176, h: 144, mode: PicType::I, quant: 4, mvmode: MVMode::Old,
            fcode: 1, apm: true, umv: false, ts: 0, plusinfo: None,
            mpeg4: Some(m4),
        };
        let mut bw = BitWriter::new(Vec::new());
        bw.write(0x55, 7); // some macroblock payload, unaligned
        encode_video_packet_header(&mut bw, &vol_in, &pinfo, 22, 11).unwrap();
        let data = bw.end();
        let mut vol = Some(vol_in);
        let mut rd = Mpeg4Reader::new(&data, &tab, &mut vol);
        rd.setup_picture(&pinfo);
        rd.br.skip(7).unwrap();
        assert!(rd.is_slice_end());
        let slice = rd.decode_slice_header(&pinfo).unwrap();
        assert_eq!(slice.quant, 11);
        assert_eq!(slice.mb_y, 2);
        assert_eq!(slice.mb_x, 0);
    }
}
