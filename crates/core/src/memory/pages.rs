//! Sparse page-backed byte store.
//!
//! Regions of the emulated address space can be many megabytes but are mostly untouched.
//! Pages are materialised on first write and read back as zero until then, which gives the
//! same lazy behaviour an anonymous mapping would without any host-side unsafety.

use std::collections::HashMap;

use crate::common::constants::PAGE_SIZE;

type Page = Box<[u8; PAGE_SIZE as usize]>;

/// Lazily allocated byte storage addressed by absolute emulated address.
#[derive(Clone, Debug, Default)]
pub struct PageStore {
    pages: HashMap<u32, Page>,
}

impl PageStore {
    /// Creates an empty store; every byte reads as zero.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    const fn split(addr: u32) -> (u32, usize) {
        (addr / PAGE_SIZE, (addr % PAGE_SIZE) as usize)
    }

    /// Reads one byte.
    #[inline]
    pub fn read_u8(&self, addr: u32) -> u8 {
        let (page, offset) = Self::split(addr);
        self.pages.get(&page).map_or(0, |p| p[offset])
    }

    /// Writes one byte, materialising its page if needed.
    #[inline]
    pub fn write_u8(&mut self, addr: u32, val: u8) {
        let (page, offset) = Self::split(addr);
        if val == 0 && !self.pages.contains_key(&page) {
            return;
        }
        self.pages
            .entry(page)
            .or_insert_with(|| Box::new([0; PAGE_SIZE as usize]))[offset] = val;
    }

    /// Zeroes `len` bytes starting at `addr`.
    pub fn zero(&mut self, addr: u32, len: u32) {
        for i in 0..len {
            self.write_u8(addr.wrapping_add(i), 0);
        }
    }

    /// Copies `len` bytes from `src` to `dst`; the ranges may overlap.
    pub fn copy(&mut self, src: u32, dst: u32, len: u32) {
        let bytes: Vec<u8> = (0..len)
            .map(|i| self.read_u8(src.wrapping_add(i)))
            .collect();
        for (i, b) in (0u32..).zip(bytes) {
            self.write_u8(dst.wrapping_add(i), b);
        }
    }

    /// Number of materialised pages.
    pub fn resident_pages(&self) -> usize {
        self.pages.len()
    }

    /// Drops every page.
    pub fn clear(&mut self) {
        self.pages.clear();
    }
}
