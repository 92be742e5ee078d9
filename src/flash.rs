use crate::error::FlashError;
use std::fs::File;
use std::io;
use std::io::{Read, Write};
use std::path::PathBuf;

// NB. addresses are u32 as per the target's bus; lengths are usize to stop endless casting

/// program granularity of the medium
pub const WORD_SIZE: usize = 4;

/// status register bits, matching the STM32F1 flash controller
pub const FLASH_SR_PGERR: u32 = 0x04;
pub const FLASH_SR_WRPRTERR: u32 = 0x10;

/// outcome of the last erase or program operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashStatus {
    Complete,
    Fault(u32),
}

/// Block-erasable, word-programmable non-volatile memory. Erase sets every
/// bit of a page; programming can only clear bits.
pub trait FlashMedium {
    /// erase the page starting at `page_addr`
    fn erase_page(&mut self, page_addr: u32);

    /// program one little-endian word
    fn program_word(&mut self, addr: u32, word: u32);

    /// read one little-endian word
    fn read_word(&self, addr: u32) -> u32;

    /// status of the last erase/program
    fn status(&self) -> FlashStatus;

    /// size of the erase unit
    fn page_size(&self) -> usize;

    /// push any buffered contents to backing storage
    fn sync(&mut self) -> Result<(), io::Error> {
        Ok(())
    }

    /// read a run of bytes a word at a time; `addr` must be word-aligned
    fn read_bytes(&self, addr: u32, buf: &mut [u8]) {
        for (i, chunk) in buf.chunks_mut(WORD_SIZE).enumerate() {
            let word = self.read_word(addr + (i * WORD_SIZE) as u32).to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
    }
}

/// RAM-backed flash, optionally mirrored to an image file on disk
pub struct SimulatedFlash {
    bytes: Box<[u8]>,
    base_addr: u32,
    page_size: usize,
    status: FlashStatus,
    image: Option<PathBuf>,
}

const ERASED: u8 = 0xff;

impl SimulatedFlash {
    /// An erased medium of `pages` pages starting at `base_addr`. The whole
    /// medium has to lie inside the 32-bit address space.
    pub fn new(base_addr: u32, page_size: usize, pages: usize) -> Result<Self, FlashError> {
        let len = page_size
            .checked_mul(pages)
            .filter(|_| page_size != 0)
            .filter(|len| u64::from(base_addr) + *len as u64 <= 1 << 32)
            .ok_or(FlashError::Geometry { page_size, pages })?;
        Ok(SimulatedFlash {
            bytes: vec![ERASED; len].into_boxed_slice(),
            base_addr,
            page_size,
            status: FlashStatus::Complete,
            image: None,
        })
    }

    /// back the medium with an image file; an existing file is loaded, a
    /// missing one leaves the medium erased
    pub fn with_image(mut self, path: impl Into<PathBuf>) -> Result<Self, io::Error> {
        let path = path.into();
        match File::open(&path) {
            Ok(mut f) => self.load(&mut f)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        self.image = Some(path);
        Ok(self)
    }

    /// replace the contents from a raw image; short images leave the tail erased
    pub fn load(&mut self, reader: &mut impl Read) -> Result<(), io::Error> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        let len = buf.len().min(self.bytes.len());
        self.bytes.fill(ERASED);
        self.bytes[..len].copy_from_slice(&buf[..len]);
        Ok(())
    }

    /// dump the raw contents
    pub fn save(&self, writer: &mut impl Write) -> Result<(), io::Error> {
        writer.write_all(&self.bytes)
    }

    pub fn base_addr(&self) -> u32 {
        self.base_addr
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// offset into `bytes` for a span, if the whole span is on the medium
    fn offset(&self, addr: u32, len: usize) -> Option<usize> {
        let off = addr.checked_sub(self.base_addr)? as usize;
        (off + len <= self.bytes.len()).then_some(off)
    }
}

impl FlashMedium for SimulatedFlash {
    fn erase_page(&mut self, page_addr: u32) {
        let page_size = self.page_size;
        match self.offset(page_addr, page_size) {
            Some(off) if off % page_size == 0 => {
                self.bytes[off..off + page_size].fill(ERASED);
                self.status = FlashStatus::Complete;
            }
            _ => self.status = FlashStatus::Fault(FLASH_SR_WRPRTERR),
        }
    }

    fn program_word(&mut self, addr: u32, word: u32) {
        let off = match self.offset(addr, WORD_SIZE) {
            Some(off) if off % WORD_SIZE == 0 => off,
            _ => {
                self.status = FlashStatus::Fault(FLASH_SR_WRPRTERR);
                return;
            }
        };
        let cell = &mut self.bytes[off..off + WORD_SIZE];
        // the controller refuses to program a cell that isn't erased
        if cell.iter().any(|b| *b != ERASED) {
            self.status = FlashStatus::Fault(FLASH_SR_PGERR);
            return;
        }
        for (c, w) in cell.iter_mut().zip(word.to_le_bytes()) {
            *c &= w;
        }
        self.status = FlashStatus::Complete;
    }

    fn read_word(&self, addr: u32) -> u32 {
        match self.offset(addr, WORD_SIZE) {
            Some(off) => {
                let mut w = [0u8; WORD_SIZE];
                w.copy_from_slice(&self.bytes[off..off + WORD_SIZE]);
                u32::from_le_bytes(w)
            }
            None => u32::MAX,
        }
    }

    fn status(&self) -> FlashStatus {
        self.status
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn sync(&mut self) -> Result<(), io::Error> {
        if let Some(path) = &self.image {
            let mut f = File::create(path)?;
            self.save(&mut f)?;
            f.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: u32 = 0x0800_0000;

    #[test]
    fn test_geometry_checked() {
        assert!(matches!(
            SimulatedFlash::new(BASE, 1024, usize::MAX),
            Err(FlashError::Geometry { page_size: 1024, .. })
        ));
        assert!(matches!(
            SimulatedFlash::new(BASE, 0, 1),
            Err(FlashError::Geometry { .. })
        ));
        assert!(SimulatedFlash::new(u32::MAX - 1023, 1024, 2).is_err());
        assert!(SimulatedFlash::new(u32::MAX - 1023, 1024, 1).is_ok());
    }

    #[test]
    fn test_new_is_erased() {
        let f = SimulatedFlash::new(BASE, 1024, 2).unwrap();
        assert_eq!(f.len(), 2048);
        assert!(f.bytes.iter().all(|b| *b == 0xff));
        assert_eq!(f.read_word(BASE + 1020), 0xffff_ffff);
    }

    #[test]
    fn test_program_and_read_word() {
        let mut f = SimulatedFlash::new(BASE, 1024, 1).unwrap();
        f.program_word(BASE + 4, 0x0403_0201);
        assert_eq!(f.status(), FlashStatus::Complete);
        assert_eq!(f.read_word(BASE + 4), 0x0403_0201);
        assert_eq!(f.bytes[4..8], [1, 2, 3, 4]);
    }

    #[test]
    fn test_program_unerased_word_faults() {
        let mut f = SimulatedFlash::new(BASE, 1024, 1).unwrap();
        f.program_word(BASE, 0x0000_00ff);
        f.program_word(BASE, 0x1234_5678);
        assert_eq!(f.status(), FlashStatus::Fault(FLASH_SR_PGERR));
        assert_eq!(f.read_word(BASE), 0x0000_00ff);
    }

    #[test]
    fn test_erase_restores_page_only() {
        let mut f = SimulatedFlash::new(BASE, 1024, 2).unwrap();
        f.program_word(BASE, 0);
        f.program_word(BASE + 1024, 0);
        f.erase_page(BASE);
        assert_eq!(f.status(), FlashStatus::Complete);
        assert_eq!(f.read_word(BASE), 0xffff_ffff);
        assert_eq!(f.read_word(BASE + 1024), 0);
    }

    #[test]
    fn test_out_of_range_is_write_protect_fault() {
        let mut f = SimulatedFlash::new(BASE, 1024, 1).unwrap();
        f.program_word(BASE + 1024, 0);
        assert_eq!(f.status(), FlashStatus::Fault(FLASH_SR_WRPRTERR));
        f.erase_page(BASE - 1024);
        assert_eq!(f.status(), FlashStatus::Fault(FLASH_SR_WRPRTERR));
        f.erase_page(BASE + 4);
        assert_eq!(f.status(), FlashStatus::Fault(FLASH_SR_WRPRTERR));
    }

    #[test]
    fn test_read_bytes_partial_word() {
        let mut f = SimulatedFlash::new(BASE, 1024, 1).unwrap();
        f.program_word(BASE, 0x0403_0201);
        f.program_word(BASE + 4, 0x0807_0605);
        let mut buf = [0u8; 6];
        f.read_bytes(BASE, &mut buf);
        assert_eq!(buf, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_image_round_trip() -> Result<(), io::Error> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("script.bin");

        let mut f = SimulatedFlash::new(BASE, 64, 1).unwrap().with_image(&path)?;
        f.program_word(BASE, 0xdead_beef);
        f.sync()?;

        let g = SimulatedFlash::new(BASE, 64, 1).unwrap().with_image(&path)?;
        assert_eq!(g.read_word(BASE), 0xdead_beef);
        assert_eq!(g.read_word(BASE + 4), 0xffff_ffff);
        Ok(())
    }

    #[test]
    fn test_load_short_image() -> Result<(), io::Error> {
        let mut f = SimulatedFlash::new(BASE, 16, 1).unwrap();
        let mut src: &[u8] = &[0, 1, 2, 3, 4];
        f.load(&mut src)?;
        assert_eq!(f.bytes[..], [0, 1, 2, 3, 4, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
        Ok(())
    }
}
