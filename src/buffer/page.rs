use super::buffer_pool::BufferPoolManager;
use log::error;
use parking_lot::RwLock;
use std::ops::Deref;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;

pub type PageId = u32;
pub type AtomicPageId = AtomicU32;

pub const INVALID_PAGE_ID: PageId = 0;
pub const PAGE_SIZE: usize = 4096;

#[derive(Debug)]
pub struct Page {
    pub page_id: PageId,
    data: [u8; PAGE_SIZE],
    // reference count held against the frame
    pub pin_count: u32,
    // whether the frame's bytes differ from the on-disk page
    pub is_dirty: bool,
}

impl Page {
    pub fn empty() -> Self {
        Self::new(INVALID_PAGE_ID)
    }

    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            data: [0; PAGE_SIZE],
            pin_count: 0,
            is_dirty: false,
        }
    }

    pub fn with_pin_count(mut self, pin_count: u32) -> Self {
        self.pin_count = pin_count;
        self
    }

    pub fn with_data(mut self, data: [u8; PAGE_SIZE]) -> Self {
        self.data = data;
        self
    }

    pub fn destroy(&mut self) {
        self.page_id = INVALID_PAGE_ID;
        self.data = [0; PAGE_SIZE];
        self.pin_count = 0;
        self.is_dirty = false;
    }

    pub fn set_data(&mut self, data: [u8; PAGE_SIZE]) {
        self.data = data;
        self.is_dirty = true;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.is_dirty = true;
        &mut self.data
    }

    pub fn replace(&mut self, other: Page) {
        self.page_id = other.page_id;
        self.data = other.data;
        self.pin_count = other.pin_count;
        self.is_dirty = other.is_dirty;
    }
}

/// A pinned handle to a frame. Holding a `PageRef` keeps the frame pinned;
/// dropping it performs the balancing unpin.
#[derive(Debug)]
pub struct PageRef {
    pub(crate) page: Arc<RwLock<Page>>,
    pub(crate) bpm: Arc<BufferPoolManager>,
}

impl Deref for PageRef {
    type Target = Arc<RwLock<Page>>;

    fn deref(&self) -> &Self::Target {
        &self.page
    }
}

impl Drop for PageRef {
    fn drop(&mut self) {
        let page_id = self.page.read().page_id;
        // Dirtiness is tracked on the frame itself by Page::set_data and
        // Page::data_mut, so the unpin carries no extra dirty bit.
        if !self.bpm.unpin_page(page_id, false) {
            error!("Failed to unpin page {} on PageRef drop", page_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_builder() {
        let page = Page::new(3).with_pin_count(1u32);
        assert_eq!(page.page_id, 3);
        assert_eq!(page.pin_count, 1);
        assert!(!page.is_dirty);
        assert!(page.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn page_set_data_marks_dirty() {
        let mut page = Page::new(1);
        let mut data = [0u8; PAGE_SIZE];
        data[0] = 42;
        page.set_data(data);
        assert!(page.is_dirty);
        assert_eq!(page.data()[0], 42);

        page.destroy();
        assert_eq!(page.page_id, INVALID_PAGE_ID);
        assert!(!page.is_dirty);
        assert!(page.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn page_data_mut_marks_dirty() {
        let mut page = Page::new(1);
        page.data_mut()[7] = 9;
        assert!(page.is_dirty);
        assert_eq!(page.data()[7], 9);
    }
}
