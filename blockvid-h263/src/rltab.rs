//! Run-length code table with the derived arrays used to invert
//! `(run, level, last)` into a code index when encoding.
use blockvid_core::io::bitreader::BitReader;
use blockvid_core::io::bitwriter::BitWriter;
use blockvid_core::io::codebook::{Codebook, CodebookReader};
use blockvid_core::codecs::{CodecError, CodecResult};
use crate::data::{RLCodeDesc, RLCodeReader, RLSym};

/// An immutable run-length code table.
///
/// Construction is explicit and the value is shared by reference afterwards;
/// there is no process-wide lazily initialised state.
pub struct RLTable {
    codes:     &'static [RLCodeDesc],
    cb:        Codebook<RLSym>,
    max_level: [[u8; 64]; 2],
    max_run:   [[u8; 64]; 2],
    first_idx: [[u16; 64]; 2],
}

const NO_INDEX: u16 = 0xFFFF;

impl RLTable {
    /// Builds the table from a static code list whose final entry is the
    /// escape code.
    pub fn new(codes: &'static [RLCodeDesc]) -> Self {
        let mut cr = RLCodeReader::new(codes);
        let cb = Codebook::new(&mut cr).expect("overlapping codes in RL table");

        let mut max_level = [[0u8; 64]; 2];
        let mut max_run   = [[0u8; 64]; 2];
        let mut first_idx = [[NO_INDEX; 64]; 2];
        for (idx, desc) in codes.iter().enumerate() {
            let sym = desc.sym;
            if sym.is_escape() { continue; }
            let last = sym.last as usize;
            let run  = sym.run as usize;
            let lvl  = sym.level as u8;
            if lvl > max_level[last][run] { max_level[last][run] = lvl; }
            if sym.run > max_run[last][lvl as usize] { max_run[last][lvl as usize] = sym.run; }
            if first_idx[last][run] == NO_INDEX { first_idx[last][run] = idx as u16; }
            // encoding relies on levels of one run being stored contiguously
            debug_assert_eq!(idx, first_idx[last][run] as usize + lvl as usize - 1);
        }
        Self { codes, cb, max_level, max_run, first_idx }
    }

    /// The reserved index meaning "not representable directly"; equals the
    /// number of regular entries and never names a valid code.
    pub fn escape_index(&self) -> usize { self.codes.len() - 1 }

    /// Largest level directly codable for the given run.
    pub fn max_level(&self, last: bool, run: u8) -> u8 {
        if run < 64 { self.max_level[last as usize][run as usize] } else { 0 }
    }

    /// Largest run directly codable for the given absolute level.
    pub fn max_run(&self, last: bool, level: u8) -> u8 {
        if level < 64 { self.max_run[last as usize][level as usize] } else { 0 }
    }

    /// Resolves `(run, level, last)` to a code index, or to the escape index
    /// when the pair lies outside the table.
    pub fn index_of(&self, last: bool, run: u8, level: u8) -> usize {
        if run >= 64 || level == 0 || level > self.max_level(last, run) {
            return self.escape_index();
        }
        let first = self.first_idx[last as usize][run as usize];
        first as usize + level as usize - 1
    }

    /// Reads the next run-length symbol from the bitstream.
    pub fn read_sym(&self, br: &mut BitReader) -> CodecResult<RLSym> {
        let sym = br.read_cb(&self.cb)?;
        Ok(sym)
    }

    /// Writes the codeword for the given index.
    pub fn write_code(&self, bw: &mut BitWriter, idx: usize) {
        let desc = &self.codes[idx];
        bw.write(u32::from(desc.code), desc.bits);
    }

    /// Writes the escape codeword.
    pub fn write_escape(&self, bw: &mut BitWriter) {
        self.write_code(bw, self.escape_index());
    }

    /// Looks up the symbol stored at a code index.
    pub fn sym(&self, idx: usize) -> RLSym { self.codes[idx].sym }

    /// Guards a decoded escape re-lookup: the symbol must not be another
    /// escape.
    pub fn check_not_escape(&self, sym: RLSym) -> CodecResult<RLSym> {
        if sym.is_escape() { return Err(CodecError::MalformedCode); }
        Ok(sym)
    }
}
