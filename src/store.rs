use crate::error::FlashError;
use crate::flash::{FlashMedium, FlashStatus, WORD_SIZE};
use crate::report::REPORT_SIZE;
use tracing::{debug, info, warn};

/// The script region: a contiguous array of records at a fixed address.
///
/// Writing always erases the page holding the region start first, so every
/// program replaces the whole previous script.
pub struct ScriptStore<M: FlashMedium> {
    medium: M,
    base_addr: u32,
    capacity: usize,
}

impl<M: FlashMedium> ScriptStore<M> {
    /// a region of `capacity` bytes starting at `base_addr`
    pub fn new(medium: M, base_addr: u32, capacity: usize) -> Self {
        ScriptStore {
            medium,
            base_addr,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// how many whole records fit in the region
    pub fn record_capacity(&self) -> usize {
        self.capacity / REPORT_SIZE
    }

    pub fn medium(&self) -> &M {
        &self.medium
    }

    pub fn medium_mut(&mut self) -> &mut M {
        &mut self.medium
    }

    fn page_addr(&self) -> u32 {
        let page_size = self.medium.page_size() as u32;
        self.base_addr - self.base_addr % page_size
    }

    /// Erase, then program `data` word by word, reading each word back
    /// straight after writing it. Stops at the first fault or mismatch.
    /// `data.len()` must be a multiple of the word size.
    pub fn program(&mut self, data: &[u8]) -> Result<(), FlashError> {
        if data.len() % WORD_SIZE != 0 {
            return Err(FlashError::Misaligned {
                len: data.len(),
                granularity: WORD_SIZE,
            });
        }
        if data.len() > self.capacity {
            return Err(FlashError::TooLarge {
                len: data.len(),
                capacity: self.capacity,
            });
        }

        let page_addr = self.page_addr();
        self.medium.erase_page(page_addr);
        if let FlashStatus::Fault(status) = self.medium.status() {
            warn!(page_addr, status, "page erase failed");
            return Err(FlashError::MediumFault {
                address: page_addr,
                status,
            });
        }

        let result = self.program_words(data);
        // the page was erased regardless, so the backing image must follow;
        // a program failure outranks a sync failure
        if let Err(e) = self.medium.sync() {
            if result.is_ok() {
                return Err(e.into());
            }
            warn!(error = %e, "image sync failed after program error");
        }
        if result.is_ok() {
            info!(bytes = data.len(), "programmed script region");
        }
        result
    }

    fn program_words(&mut self, data: &[u8]) -> Result<(), FlashError> {
        for (i, chunk) in data.chunks_exact(WORD_SIZE).enumerate() {
            let address = self.base_addr + (i * WORD_SIZE) as u32;
            let mut w = [0u8; WORD_SIZE];
            w.copy_from_slice(chunk);
            let expected = u32::from_le_bytes(w);

            self.medium.program_word(address, expected);
            if let FlashStatus::Fault(status) = self.medium.status() {
                warn!(address, status, "program fault");
                return Err(FlashError::MediumFault { address, status });
            }
            let actual = self.medium.read_word(address);
            if actual != expected {
                warn!(address, expected, actual, "verify mismatch");
                return Err(FlashError::VerifyFailed {
                    address,
                    expected,
                    actual,
                });
            }
        }
        debug!(words = data.len() / WORD_SIZE, "all words verified");
        Ok(())
    }

    /// read `len` bytes from the region start, without any validation
    pub fn read(&self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.read_into(&mut buf);
        buf
    }

    pub fn read_into(&self, buf: &mut [u8]) {
        self.medium.read_bytes(self.base_addr, buf);
    }

    /// raw record at `index`; `None` past the end of the region
    pub fn read_record(&self, index: usize) -> Option<[u8; REPORT_SIZE]> {
        if index >= self.record_capacity() {
            return None;
        }
        let mut bytes = [0u8; REPORT_SIZE];
        self.medium
            .read_bytes(self.base_addr + (index * REPORT_SIZE) as u32, &mut bytes);
        Some(bytes)
    }
}
