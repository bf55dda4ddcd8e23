//! Whole-picture encode/decode round trips across the supported formats.
use blockvid_h263::{MV, ZERO_MV};
use blockvid_h263::blockcodec::Tables;
use blockvid_h263::decoder::{DecodedMacroblock, PictureDecoder};
use blockvid_h263::encoder::{MacroblockData, PictureEncoder};
use blockvid_h263::h263::{H263Reader, PlusState};
use blockvid_h263::mpeg4::{time_increment_bits, Mpeg4Reader, SpriteUsage, VolInfo};
use blockvid_h263::types::*;

const QCIF_MB: usize = 11 * 9;

fn empty_mb(mode: MbMode, quant: u8) -> MacroblockData {
    MacroblockData {
        mode,
        quant,
        acpred: ACPredMode::None,
        mcsel: false,
        mv: [ZERO_MV; 4],
        blocks: [[0; 64]; 6],
    }
}

fn intra_mb(quant: u8, seed: usize) -> MacroblockData {
    let mut mb = empty_mb(MbMode::Intra, quant);
    for no in 0..6 {
        mb.blocks[no][0] = 96 + ((seed * 7 + no * 3) % 64) as i16;
        if (seed + no) % 2 == 0 {
            mb.blocks[no][1] = 3;
            mb.blocks[no][8] = -2;
        }
        if (seed + no) % 3 == 0 {
            mb.blocks[no][9] = 1;
        }
    }
    mb
}

fn inter_mb(quant: u8, mv: MV, seed: usize) -> MacroblockData {
    let mut mb = empty_mb(MbMode::Inter16, quant);
    mb.mv[0] = mv;
    for no in 0..6 {
        if (seed + no) % 2 == 0 {
            mb.blocks[no][no] = 2 + (seed % 3) as i16;
            mb.blocks[no][16] = -1;
        }
    }
    mb
}

fn h263_pinfo(mode: PicType, quant: u8) -> PicInfo {
    PicInfo {
        w: 176, h: 144, mode, quant, mvmode: MVMode::Old, fcode: 1,
        apm: false, umv: false, ts: 1, plusinfo: None, mpeg4: None,
    }
}

fn check_blocks(got: &DecodedMacroblock, want: &MacroblockData) {
    for no in 0..6 {
        assert_eq!(&got.blocks[no][..], &want.blocks[no][..],
                   "block {} of macroblock ({}, {})", no, got.mb_x, got.mb_y);
    }
}

#[test]
fn h263_intra_picture_roundtrip() {
    let tables = Tables::new();
    let pinfo = h263_pinfo(PicType::I, 12);
    let mut enc = PictureEncoder::new(&tables);
    enc.start_picture(&pinfo).unwrap();
    let mut input = Vec::new();
    for pos in 0..QCIF_MB {
        let mb = intra_mb(12, pos);
        enc.encode_macroblock(&mb).unwrap();
        input.push(mb);
    }
    let data = enc.finish();

    let mut plus = PlusState::default();
    let mut rd = H263Reader::new(&data, &tables, &mut plus);
    let mut dec = PictureDecoder::new();
    let mut out: Vec<DecodedMacroblock> = Vec::new();
    let got = dec.decode_picture(&mut rd, &mut out).unwrap();
    assert_eq!(got.mode, PicType::I);
    assert_eq!((got.w, got.h), (176, 144));
    assert_eq!(out.len(), QCIF_MB);
    for (got, want) in out.iter().zip(input.iter()) {
        assert!(got.info.is_intra());
        check_blocks(got, want);
    }
}

#[test]
fn h263_inter_picture_roundtrip() {
    let tables = Tables::new();
    let mut pinfo = h263_pinfo(PicType::P, 10);
    pinfo.apm = true; // four-vector macroblocks need advanced prediction
    let mut enc = PictureEncoder::new(&tables);
    enc.start_picture(&pinfo).unwrap();
    let mut input = Vec::new();
    for pos in 0..QCIF_MB {
        let mb = match pos % 4 {
            0 => empty_mb(MbMode::Skip, 10),
            1 => inter_mb(10, MV::new((pos % 5) as i16 - 2, -((pos % 3) as i16)), pos),
            2 => intra_mb(10, pos),
            _ => {
                let mut mb = inter_mb(10, ZERO_MV, pos);
                mb.mode = MbMode::Inter8x8;
                mb.mv = [MV::new(1, 0), MV::new(0, 1), MV::new(-1, 0), MV::new(2, -2)];
                mb
            },
        };
        enc.encode_macroblock(&mb).unwrap();
        input.push(mb);
    }
    let data = enc.finish();

    let mut plus = PlusState::default();
    let mut rd = H263Reader::new(&data, &tables, &mut plus);
    let mut dec = PictureDecoder::new();
    let mut out: Vec<DecodedMacroblock> = Vec::new();
    dec.decode_picture(&mut rd, &mut out).unwrap();
    assert_eq!(out.len(), QCIF_MB);
    for (got, want) in out.iter().zip(input.iter()) {
        assert_eq!(got.info.mode, want.mode, "mode at ({}, {})", got.mb_x, got.mb_y);
        check_blocks(got, want);
        match want.mode {
            MbMode::Inter16 => assert_eq!(got.info.mv[0], want.mv[0]),
            MbMode::Inter8x8 => assert_eq!(&got.info.mv[..], &want.mv[..]),
            MbMode::Skip => assert_eq!(got.info.mv[0], ZERO_MV),
            MbMode::Intra => {},
        }
    }
}

#[test]
fn h263_gob_cut_resets_prediction() {
    let tables = Tables::new();
    let pinfo = h263_pinfo(PicType::P, 8);
    let mut enc = PictureEncoder::new(&tables);
    enc.start_picture(&pinfo).unwrap();
    let mut input = Vec::new();
    for pos in 0..QCIF_MB {
        if pos == 11 || pos == 44 {
            assert!(enc.bits_since_cut() > 0);
            enc.start_slice(8).unwrap();
        }
        let mb = inter_mb(8, MV::new(2, 1), pos);
        enc.encode_macroblock(&mb).unwrap();
        input.push(mb);
    }
    let data = enc.finish();

    let mut plus = PlusState::default();
    let mut rd = H263Reader::new(&data, &tables, &mut plus);
    let mut dec = PictureDecoder::new();
    let mut out: Vec<DecodedMacroblock> = Vec::new();
    dec.decode_picture(&mut rd, &mut out).unwrap();
    assert_eq!(out.len(), QCIF_MB);
    for (got, want) in out.iter().zip(input.iter()) {
        assert_eq!(got.info.mv[0], want.mv[0],
                   "motion at ({}, {})", got.mb_x, got.mb_y);
        check_blocks(got, want);
    }
}

#[test]
fn h263plus_aic_umv_roundtrip() {
    let tables = Tables::new();
    let mut pinfo = h263_pinfo(PicType::P, 9);
    pinfo.w = 320;
    pinfo.h = 240;
    pinfo.mvmode = MVMode::Umv;
    pinfo.umv = true;
    pinfo.plusinfo = Some(PlusInfo {
        aic: true, deblock: false, slice_struct: false,
        modified_quant: false, alt_inter_vlc: false, custom_pcf: false,
    });
    let mb_count = pinfo.mb_width() * pinfo.mb_height();
    let mut enc = PictureEncoder::new(&tables);
    enc.start_picture(&pinfo).unwrap();
    let mut input = Vec::new();
    for pos in 0..mb_count {
        let mb = match pos % 3 {
            0 => {
                let mut mb = intra_mb(9, pos);
                mb.acpred = match pos % 9 {
                    0 => ACPredMode::DC,
                    3 => ACPredMode::Hor,
                    _ => ACPredMode::Ver,
                };
                mb
            },
            1 => inter_mb(9, MV::new(70, -50), pos),
            _ => empty_mb(MbMode::Skip, 9),
        };
        enc.encode_macroblock(&mb).unwrap();
        input.push(mb);
    }
    let data = enc.finish();

    let mut plus = PlusState::default();
    let mut rd = H263Reader::new(&data, &tables, &mut plus);
    let mut dec = PictureDecoder::new();
    let mut out: Vec<DecodedMacroblock> = Vec::new();
    let got = dec.decode_picture(&mut rd, &mut out).unwrap();
    assert_eq!(got.mvmode, MVMode::Umv);
    assert!(got.plusinfo.unwrap().aic);
    assert_eq!(out.len(), mb_count);
    for (got, want) in out.iter().zip(input.iter()) {
        assert_eq!(got.info.mode, want.mode);
        if want.mode == MbMode::Intra {
            assert_eq!(got.info.acpred, want.acpred);
        }
        if want.mode == MbMode::Inter16 {
            assert_eq!(got.info.mv[0], want.mv[0]);
        }
        check_blocks(got, want);
    }
}

fn qcif_vol() -> VolInfo {
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

fn mpeg4_pinfo(mode: PicType, quant: u8, fcode: u8) -> PicInfo {
    PicInfo {
        w: 176, h: 144, mode, quant, mvmode: MVMode::Old, fcode,
        apm: true, umv: false, ts: 2, plusinfo: None,
        mpeg4: Some(Mpeg4PicInfo {
            vop_coded: true,
            intra_dc_thr_code: 0,
            quant_precision: 5,
            rounding: false,
            sprite: None,
        }),
    }
}

#[test]
fn mpeg4_intra_and_inter_pictures_roundtrip() {
    let tables = Tables::new();
    let vol = qcif_vol();
    let mut enc = PictureEncoder::new(&tables);
    enc.write_sequence_header(&vol).unwrap();

    let ipic = mpeg4_pinfo(PicType::I, 6, 1);
    enc.start_picture(&ipic).unwrap();
    let mut i_input = Vec::new();
    for pos in 0..QCIF_MB {
        let mut mb = intra_mb(6, pos);
        if pos % 2 == 1 {
            mb.acpred = ACPredMode::DC;
        }
        enc.encode_macroblock(&mb).unwrap();
        i_input.push(mb);
    }

    let ppic = mpeg4_pinfo(PicType::P, 6, 2);
    enc.start_picture(&ppic).unwrap();
    let mut p_input = Vec::new();
    for pos in 0..QCIF_MB {
        let mb = match pos % 3 {
            0 => inter_mb(6, MV::new(40, -33), pos),
            1 => empty_mb(MbMode::Skip, 6),
            _ => intra_mb(6, pos),
        };
        enc.encode_macroblock(&mb).unwrap();
        p_input.push(mb);
    }
    let data = enc.finish();

    let mut vol_state = None;
    let mut rd = Mpeg4Reader::new(&data, &tables, &mut vol_state);
    let mut dec = PictureDecoder::new();

    let mut out: Vec<DecodedMacroblock> = Vec::new();
    let got = dec.decode_picture(&mut rd, &mut out).unwrap();
    assert_eq!(got.mode, PicType::I);
    assert_eq!(out.len(), QCIF_MB);
    for (got, want) in out.iter().zip(i_input.iter()) {
        check_blocks(got, want);
    }

    let mut out: Vec<DecodedMacroblock> = Vec::new();
    let got = dec.decode_picture(&mut rd, &mut out).unwrap();
    assert_eq!(got.mode, PicType::P);
    assert_eq!(got.fcode, 2);
    assert_eq!(out.len(), QCIF_MB);
    for (got, want) in out.iter().zip(p_input.iter()) {
        assert_eq!(got.info.mode, want.mode);
        check_blocks(got, want);
        if want.mode == MbMode::Inter16 {
            assert_eq!(got.info.mv[0], want.mv[0]);
        }
    }
}

#[test]
fn mpeg4_video_packet_roundtrip() {
    let tables = Tables::new();
    let vol = qcif_vol();
    let mut enc = PictureEncoder::new(&tables);
    enc.write_sequence_header(&vol).unwrap();
    let ppic = mpeg4_pinfo(PicType::P, 7, 1);
    enc.start_picture(&ppic).unwrap();
    let mut input = Vec::new();
    for pos in 0..QCIF_MB {
        if pos == 33 {
            enc.start_slice(7).unwrap();
        }
        let mb = inter_mb(7, MV::new(-3, 4), pos);
        enc.encode_macroblock(&mb).unwrap();
        input.push(mb);
    }
    let data = enc.finish();

    let mut vol_state = None;
    let mut rd = Mpeg4Reader::new(&data, &tables, &mut vol_state);
    let mut dec = PictureDecoder::new();
    let mut out: Vec<DecodedMacroblock> = Vec::new();
    dec.decode_picture(&mut rd, &mut out).unwrap();
    assert_eq!(out.len(), QCIF_MB);
    for (got, want) in out.iter().zip(input.iter()) {
        assert_eq!(got.info.mv[0], want.mv[0],
                   "motion at ({}, {})", got.mb_x, got.mb_y);
        check_blocks(got, want);
    }
}

#[test]
fn mpeg4_gmc_picture_roundtrip() {
    let tables = Tables::new();
    let mut vol = qcif_vol();
    vol.sprite = SpriteUsage::Gmc;
    vol.warp_points = 1;
    vol.warp_accuracy = 1;

    let d = [(6, -4), (0, 0), (0, 0)];
    let warp = blockvid_h263::sprite::SpriteWarp::derive(&d, 1, 1, 176, 144).unwrap();
    let mut spic = mpeg4_pinfo(PicType::S, 5, 1);
    if let Some(ref mut m4) = spic.mpeg4 {
        m4.sprite = Some(warp);
    }

    let mut enc = PictureEncoder::new(&tables);
    enc.write_sequence_header(&vol).unwrap();
    enc.start_picture(&spic).unwrap();
    let mut input = Vec::new();
    for pos in 0..QCIF_MB {
        let mb = match pos % 3 {
            0 => empty_mb(MbMode::Skip, 5),
            1 => {
                let mut mb = inter_mb(5, ZERO_MV, pos);
                mb.mcsel = true;
                mb
            },
            _ => inter_mb(5, MV::new(2, 2), pos),
        };
        enc.encode_macroblock(&mb).unwrap();
        input.push(mb);
    }
    let data = enc.finish();

    let mut vol_state = None;
    let mut rd = Mpeg4Reader::new(&data, &tables, &mut vol_state);
    let mut dec = PictureDecoder::new();
    let mut out: Vec<DecodedMacroblock> = Vec::new();
    let got = dec.decode_picture(&mut rd, &mut out).unwrap();
    assert_eq!(got.mode, PicType::S);
    let gmc_mv = warp.skip_mv();
    assert_eq!(gmc_mv, MV::new(6, -4));
    for (got, want) in out.iter().zip(input.iter()) {
        match want.mode {
            MbMode::Skip => {
                // a skipped macroblock of a GMC picture rides the warp
                assert!(got.info.mcsel);
                assert_eq!(got.info.mv[0], gmc_mv);
            },
            _ => {
                if want.mcsel {
                    assert!(got.info.mcsel);
                    assert_eq!(got.info.mv[0], gmc_mv);
                } else {
                    assert_eq!(got.info.mv[0], want.mv[0]);
                }
            },
        }
        check_blocks(got, want);
    }
}

#[test]
fn mpeg4_uncoded_vop_produces_no_macroblocks() {
    let tables = Tables::new();
    let vol = qcif_vol();
    let mut enc = PictureEncoder::new(&tables);
    enc.write_sequence_header(&vol).unwrap();
    let mut pic = mpeg4_pinfo(PicType::P, 7, 1);
    if let Some(ref mut m4) = pic.mpeg4 {
        m4.vop_coded = false;
    }
    enc.start_picture(&pic).unwrap();
    let data = enc.finish();

    let mut vol_state = None;
    let mut rd = Mpeg4Reader::new(&data, &tables, &mut vol_state);
    let mut dec = PictureDecoder::new();
    let mut out: Vec<DecodedMacroblock> = Vec::new();
    let got = dec.decode_picture(&mut rd, &mut out).unwrap();
    assert!(!got.mpeg4.unwrap().vop_coded);
    assert!(out.is_empty());
}

#[test]
fn truncated_stream_reports_coordinates() {
    let tables = Tables::new();
    let pinfo = h263_pinfo(PicType::I, 12);
    let mut enc = PictureEncoder::new(&tables);
    enc.start_picture(&pinfo).unwrap();
    for pos in 0..QCIF_MB {
        enc.encode_macroblock(&intra_mb(12, pos)).unwrap();
    }
    let data = enc.finish();
    let cut = &data[..data.len() / 2];

    let mut plus = PlusState::default();
    let mut rd = H263Reader::new(cut, &tables, &mut plus);
    let mut dec = PictureDecoder::new();
    let mut out: Vec<DecodedMacroblock> = Vec::new();
    let err = dec.decode_picture(&mut rd, &mut out).unwrap_err();
    assert!(err.mb_x > 0 || err.mb_y > 0);
    assert!(!out.is_empty());
    let msg = format!("{}", err);
    assert!(msg.contains("macroblock"));
}
