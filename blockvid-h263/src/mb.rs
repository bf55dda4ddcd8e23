//! Macroblock header coding shared by the per-format bitstream readers and
//! writers: MCBPC/CBPY, AC prediction flags, quantiser updates and motion
//! vector residuals.
use blockvid_core::codecs::{CodecError, CodecResult};
use blockvid_core::io::bitreader::BitReader;
use blockvid_core::io::bitwriter::BitWriter;
use blockvid_core::io::codebook::CodebookReader;

use crate::MV;
use crate::blockcodec::Tables;
use crate::data::{CBPY, DQUANT_TAB, INTER_MCBPC, INTER_MCBPC_STUFFING, INTRA_MCBPC, INTRA_MCBPC_STUFFING};
use crate::motion::{decode_mv_component, decode_umv_component, encode_mv_component, encode_umv_component};
use crate::types::{ACPredMode, MVMode, MbInfo, MbMode, PicInfo};

pub const QUANT_MIN: u8 = 1;
pub const QUANT_MAX: u8 = 31;

fn clamp_quant(q: i16) -> u8 {
    q.max(i16::from(QUANT_MIN)).min(i16::from(QUANT_MAX)) as u8
}

/// Applies a quantiser update. The 2-bit form indexes the signed delta
/// table; with modified quantisation in force a set first bit selects a
/// one-step change and a cleared one a 5-bit absolute value. Out-of-range
/// results are clamped, matching the lenient behaviour of existing
/// decoders, never rejected.
pub fn decode_dquant(br: &mut BitReader, quant: u8, modified_quant: bool) -> CodecResult<u8> {
    if modified_quant {
        if br.read_bool()? {
            let up = br.read_bool()?;
            let q = i16::from(quant) + if up { 1 } else { -1 };
            Ok(clamp_quant(q))
        } else {
            Ok(clamp_quant(br.read(5)? as i16))
        }
    } else {
        let idx = br.read(2)? as usize;
        Ok(clamp_quant(i16::from(quant) + i16::from(DQUANT_TAB[idx])))
    }
}

fn encode_dquant(bw: &mut BitWriter, old: u8, new: u8, modified_quant: bool) -> CodecResult<()> {
    let delta = i16::from(new) - i16::from(old);
    if modified_quant {
        match delta {
            1  => { bw.write1(); bw.write1(); },
            -1 => { bw.write1(); bw.write0(); },
            _  => { bw.write0(); bw.write(u32::from(new), 5); },
        }
        return Ok(());
    }
    for (idx, &d) in DQUANT_TAB.iter().enumerate() {
        if i16::from(d) == delta {
            bw.write(idx as u32, 2);
            return Ok(());
        }
    }
    Err(CodecError::OutOfRangeIndex)
}

fn decode_acpred_flag(br: &mut BitReader, pinfo: &PicInfo) -> CodecResult<ACPredMode> {
    if pinfo.is_mpeg4() {
        return Ok(if br.read_bool()? { ACPredMode::DC } else { ACPredMode::None });
    }
    if pinfo.aic() {
        // Annex I signals the prediction direction explicitly
        if br.read_bool()? {
            return Ok(if br.read_bool()? { ACPredMode::Ver } else { ACPredMode::Hor });
        }
        return Ok(ACPredMode::DC);
    }
    Ok(ACPredMode::None)
}

fn encode_acpred_flag(bw: &mut BitWriter, pinfo: &PicInfo, acpred: ACPredMode) {
    if pinfo.is_mpeg4() {
        bw.write_bit(acpred != ACPredMode::None);
        return;
    }
    if pinfo.aic() {
        match acpred {
            ACPredMode::Hor => { bw.write1(); bw.write0(); },
            ACPredMode::Ver => { bw.write1(); bw.write1(); },
            _               => { bw.write0(); },
        }
    }
}

fn modified_quant(pinfo: &PicInfo) -> bool {
    if let Some(ref pi) = pinfo.plusinfo { pi.modified_quant } else { false }
}

/// Decodes the macroblock header of an I-picture.
pub fn decode_mb_header_i(br: &mut BitReader, tab: &Tables, pinfo: &PicInfo,
                          quant: u8) -> CodecResult<MbInfo> {
    let mut cbpc = br.read_cb(&tab.intra_mcbpc_cb)?;
    while cbpc == INTRA_MCBPC_STUFFING {
        cbpc = br.read_cb(&tab.intra_mcbpc_cb)?;
    }
    let acpred = decode_acpred_flag(br, pinfo)?;
    let cbpy = br.read_cb(&tab.cbpy_cb)?;
    let mut q = quant;
    if (cbpc & 4) != 0 {
        q = decode_dquant(br, q, modified_quant(pinfo))?;
    }
    let cbp = (cbpy << 2) | (cbpc & 3);
    let mut binfo = MbInfo::new(MbMode::Intra, cbp, q);
    binfo.acpred = acpred;
    Ok(binfo)
}

/// Decodes the macroblock header of a P- or S-picture. Motion vectors come
/// out as residuals; the caller applies the spatial predictors.
pub fn decode_mb_header_p(br: &mut BitReader, tab: &Tables, pinfo: &PicInfo,
                          quant: u8) -> CodecResult<MbInfo> {
    if br.read_bool()? {
        // not coded: plain skip, or GMC motion in sprite pictures
        let mut binfo = MbInfo::new(MbMode::Skip, 0, quant);
        binfo.mcsel = pinfo.mode.is_gmc();
        return Ok(binfo);
    }
    let mut cbpc = br.read_cb(&tab.inter_mcbpc_cb)?;
    while cbpc == INTER_MCBPC_STUFFING {
        cbpc = br.read_cb(&tab.inter_mcbpc_cb)?;
    }
    let is_intra = (cbpc & 0x04) != 0;
    let dquant   = (cbpc & 0x08) != 0;
    let is_4v    = (cbpc & 0x10) != 0;
    let mut q = quant;

    if is_intra {
        let acpred = decode_acpred_flag(br, pinfo)?;
        let cbpy = br.read_cb(&tab.cbpy_cb)?;
        if dquant {
            q = decode_dquant(br, q, modified_quant(pinfo))?;
        }
        let cbp = (cbpy << 2) | (cbpc & 3);
        let mut binfo = MbInfo::new(MbMode::Intra, cbp, q);
        binfo.acpred = acpred;
        return Ok(binfo);
    }

    let mcsel = if pinfo.mode.is_gmc() && !is_4v {
            br.read_bool()?
        } else {
            false
        };
    let cbpy = br.read_cb(&tab.cbpy_cb)? ^ 0xF;
    if dquant {
        q = decode_dquant(br, q, modified_quant(pinfo))?;
    }
    let cbp = (cbpy << 2) | (cbpc & 3);
    let mode = if is_4v { MbMode::Inter8x8 } else { MbMode::Inter16 };
    let mut binfo = MbInfo::new(mode, cbp, q);
    binfo.mcsel = mcsel;
    if mcsel {
        return Ok(binfo);
    }
    let nmv = if is_4v { 4 } else { 1 };
    let mut mvs = [MV::new(0, 0); 4];
    for mv in mvs.iter_mut().take(nmv) {
        *mv = decode_mv_residual(br, tab, pinfo)?;
    }
    binfo.set_mv(&mvs[..nmv]);
    Ok(binfo)
}

fn decode_mv_residual(br: &mut BitReader, tab: &Tables, pinfo: &PicInfo) -> CodecResult<MV> {
    if pinfo.mvmode == MVMode::Umv {
        let x = decode_umv_component(br, 0)?;
        let y = decode_umv_component(br, 0)?;
        if x == 1 && y == 1 {
            // stuffing bit against start code emulation
            br.read_bool()?;
        }
        Ok(MV::new(x, y))
    } else {
        let x = decode_mv_component(br, &tab.mv_cb, pinfo.fcode)?;
        let y = decode_mv_component(br, &tab.mv_cb, pinfo.fcode)?;
        Ok(MV::new(x, y))
    }
}

fn encode_mv_residual(bw: &mut BitWriter, pinfo: &PicInfo, diff: MV) -> CodecResult<()> {
    if pinfo.mvmode == MVMode::Umv {
        encode_umv_component(bw, diff.x);
        encode_umv_component(bw, diff.y);
        if diff.x == 1 && diff.y == 1 {
            bw.write1();
        }
        Ok(())
    } else {
        encode_mv_component(bw, diff.x, pinfo.fcode)?;
        encode_mv_component(bw, diff.y, pinfo.fcode)
    }
}

fn write_cbpy(bw: &mut BitWriter, cbp: u8, intra: bool) {
    let mut cbpy = (cbp >> 2) & 0xF;
    if !intra { cbpy ^= 0xF; }
    let (code, bits) = CBPY[cbpy as usize];
    bw.write(u32::from(code), bits);
}

/// Emits the macroblock header of an I-picture macroblock.
pub fn encode_mb_header_i(bw: &mut BitWriter, pinfo: &PicInfo, binfo: &MbInfo,
                          prev_quant: u8) -> CodecResult<()> {
    let dquant = binfo.quant != prev_quant;
    let idx = (if dquant { 4 } else { 0 }) + usize::from(binfo.cbp & 3);
    let (code, bits) = INTRA_MCBPC[idx];
    bw.write(u32::from(code), bits);
    encode_acpred_flag(bw, pinfo, binfo.acpred);
    write_cbpy(bw, binfo.cbp, true);
    if dquant {
        encode_dquant(bw, prev_quant, binfo.quant, modified_quant(pinfo))?;
    }
    Ok(())
}

/// Emits the macroblock header of a P- or S-picture macroblock, including
/// the motion vector residuals supplied by the caller.
pub fn encode_mb_header_p(bw: &mut BitWriter, pinfo: &PicInfo, binfo: &MbInfo,
                          prev_quant: u8, mv_diff: &[MV]) -> CodecResult<()> {
    if binfo.is_skipped() {
        bw.write1();
        return Ok(());
    }
    bw.write0();
    let dquant = binfo.quant != prev_quant;
    let base = match binfo.mode {
        MbMode::Intra    => if dquant { 12 } else { 4 },
        MbMode::Inter8x8 => 16,
        _                => if dquant { 8 } else { 0 },
    };
    if binfo.mode == MbMode::Inter8x8 && dquant {
        // the four-vector mode has no quantiser-update variant
        return Err(CodecError::OutOfRangeIndex);
    }
    let idx = base + usize::from(binfo.cbp & 3);
    let (code, bits) = INTER_MCBPC[idx];
    bw.write(u32::from(code), bits);
    if binfo.is_intra() {
        encode_acpred_flag(bw, pinfo, binfo.acpred);
        write_cbpy(bw, binfo.cbp, true);
        if dquant {
            encode_dquant(bw, prev_quant, binfo.quant, modified_quant(pinfo))?;
        }
        return Ok(());
    }
    if pinfo.mode.is_gmc() && binfo.mode == MbMode::Inter16 {
        bw.write_bit(binfo.mcsel);
    }
    write_cbpy(bw, binfo.cbp, false);
    if dquant {
        encode_dquant(bw, prev_quant, binfo.quant, modified_quant(pinfo))?;
    }
    if !binfo.mcsel {
        for diff in mv_diff {
            encode_mv_residual(bw, pinfo, *diff)?;
        }
    }
    Ok(())
}
