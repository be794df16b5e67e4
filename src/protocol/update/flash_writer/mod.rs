//! Sequential flash writer: erase-before-write with look-ahead erase,
//! little-endian word packing, and strict in-order commits. Owns the
//! commit cursor the update engine checks response offsets against.
use crate::error::AppendError;
use crate::protocol::messages::READ_CHUNK;

/// Flash programming primitives provided by the platform.
///
/// Sectors are indexed from 0 and may have differing sizes;
/// `sector_size` returning 0 means "past the end of flash".
pub trait Flash {
    type Error: core::fmt::Debug;

    fn sector_size(&self, sector: u16) -> u32;
    fn is_erased(&self, sector: u16) -> bool;
    fn erase_sector(&mut self, sector: u16) -> Result<(), Self::Error>;
    /// Program `words` starting at byte `offset`. A failure is
    /// transient: the same words may be written again.
    fn write_words(&mut self, offset: u32, words: &[u32]) -> Result<(), Self::Error>;
    /// Push any buffered words out to the device.
    fn flush(&mut self) -> Result<(), Self::Error>;
    /// Keep the flash controller unlocked across calls.
    fn set_keep_unlocked(&mut self, keep: bool);
}

/// Strictly sequential writer over a [`Flash`] device.
pub struct FlashWriter<F: Flash> {
    flash: F,
    /// Next byte offset to commit; increases monotonically.
    ofs: u32,
    /// Sector currently being filled.
    sector: u16,
    /// Byte offset inside the current sector.
    sector_ofs: u32,
    /// One past the highest sector guaranteed erased this update.
    erased_to: u16,
}

impl<F: Flash> FlashWriter<F> {
    pub fn new(flash: F) -> Self {
        Self {
            flash,
            ofs: 0,
            sector: 0,
            sector_ofs: 0,
            erased_to: 0,
        }
    }

    /// Next byte offset the writer will commit.
    #[inline]
    pub fn offset(&self) -> u32 {
        self.ofs
    }

    /// Rewind all cursors for a fresh image.
    pub fn reset(&mut self) {
        self.ofs = 0;
        self.sector = 0;
        self.sector_ofs = 0;
        self.erased_to = 0;
    }

    /// Keep the controller unlocked for the duration of the update.
    pub fn unlock(&mut self) {
        self.flash.set_keep_unlocked(true);
    }

    /// Flush buffered words and drop the keep-unlocked state. The
    /// relock happens even when the flush fails.
    pub fn relock(&mut self) -> Result<(), F::Error> {
        let flushed = self.flash.flush();
        self.flash.set_keep_unlocked(false);
        flushed
    }

    /// Erase at least up to `sector`, then keep erasing forward while
    /// sectors exist and are not already erased.
    ///
    /// Batching the erases up front is much faster than erasing between
    /// chunks on devices with few large sectors; stopping at the first
    /// already-erased sector keeps small images cheap on large parts.
    /// Idempotent below the high-water mark.
    pub fn erase_to(&mut self, sector: u16) -> Result<(), F::Error> {
        if sector < self.erased_to {
            return Ok(());
        }
        self.flash.erase_sector(sector)?;
        self.erased_to = sector + 1;
        while self.flash.sector_size(self.erased_to) != 0 && !self.flash.is_erased(self.erased_to) {
            self.flash.erase_sector(self.erased_to)?;
            self.erased_to += 1;
        }
        Ok(())
    }

    /// Commit `data` at the current offset.
    ///
    /// Handles the erase preconditions (current sector on its first
    /// byte, next sector when the write crosses into it), packs the
    /// bytes into `ceil(len/4)` little-endian words, and advances the
    /// cursors only when the device accepted the write.
    pub fn append(&mut self, data: &[u8]) -> Result<(), AppendError<F::Error>> {
        debug_assert!(data.len() <= READ_CHUNK);

        let sector_size = self.flash.sector_size(self.sector);
        if sector_size == 0 {
            return Err(AppendError::ImageTooBig);
        }
        if self.sector_ofs == 0 {
            self.erase_to(self.sector).map_err(AppendError::Erase)?;
        }
        if self.sector_ofs + data.len() as u32 > sector_size {
            self.erase_to(self.sector + 1).map_err(AppendError::Erase)?;
        }

        let mut words = [0u32; READ_CHUNK / 4];
        let n_words = data.len().div_ceil(4);
        for (word, chunk) in words.iter_mut().zip(data.chunks(4)) {
            let mut raw = [0u8; 4];
            raw[..chunk.len()].copy_from_slice(chunk);
            *word = u32::from_le_bytes(raw);
        }
        self.flash
            .write_words(self.ofs, &words[..n_words])
            .map_err(AppendError::Write)?;

        self.ofs += data.len() as u32;
        self.sector_ofs += data.len() as u32;
        if self.sector_ofs >= sector_size {
            self.sector += 1;
            self.sector_ofs -= sector_size;
        }
        Ok(())
    }
}
