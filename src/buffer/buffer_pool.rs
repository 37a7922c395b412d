use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::{collections::VecDeque, sync::Arc};

use crate::buffer::page::{Page, PageId, PageRef, PAGE_SIZE};
use crate::config::BufferPoolConfig;
use crate::error::{VellumError, VellumResult};
use crate::storage::disk_scheduler::DiskScheduler;
use crate::utils::cache::lru_k::LRUKReplacer;
use crate::utils::cache::{AccessType, Replacer};

pub type FrameId = usize;

/// Fixed-capacity cache of disk pages. Frames are selected from the free
/// list first, then by evicting the LRU-K victim; dirty victims are
/// written back synchronously before the frame is reused.
#[derive(Debug)]
pub struct BufferPoolManager {
    pool: Vec<Arc<RwLock<Page>>>,
    replacer: RwLock<LRUKReplacer>,
    pub disk_scheduler: Arc<DiskScheduler>,
    page_table: DashMap<PageId, FrameId>,
    free_list: Mutex<VecDeque<FrameId>>,
    // Serializes the public operations; held across any disk wait they
    // perform, so operations on the same page id are linearized.
    latch: Mutex<()>,
}

impl BufferPoolManager {
    pub fn new(num_pages: usize, disk_scheduler: Arc<DiskScheduler>) -> Self {
        Self::new_with_config(
            BufferPoolConfig {
                buffer_pool_size: num_pages,
                ..Default::default()
            },
            disk_scheduler,
        )
    }

    pub fn new_with_config(config: BufferPoolConfig, disk_scheduler: Arc<DiskScheduler>) -> Self {
        let num_pages = config.buffer_pool_size;
        let mut free_list = VecDeque::with_capacity(num_pages);
        let mut pool = Vec::with_capacity(num_pages);
        for i in 0..num_pages {
            free_list.push_back(i);
            pool.push(Arc::new(RwLock::new(Page::empty())));
        }

        Self {
            pool,
            replacer: RwLock::new(LRUKReplacer::with_k(num_pages, config.lru_k_k)),
            disk_scheduler,
            page_table: DashMap::new(),
            free_list: Mutex::new(free_list),
            latch: Mutex::new(()),
        }
    }

    /// Allocates a fresh page id, reserves a pinned frame for it and hands
    /// back a writable handle. Fails only when every frame is pinned, in
    /// which case no page id is allocated and no state changes.
    pub fn new_page(self: &Arc<Self>) -> VellumResult<PageRef> {
        let _guard = self.latch.lock();

        if self.free_list.lock().is_empty() && self.replacer.read().size() == 0 {
            return Err(VellumError::Storage(
                "Cannot new page because buffer pool is full and no page to evict".to_string(),
            ));
        }

        let frame_id = self.allocate_frame()?;

        let rx_alloc = self.disk_scheduler.schedule_allocate()?;
        let new_page_id = rx_alloc
            .recv()
            .map_err(|e| {
                VellumError::Internal(format!("Failed to receive allocated page_id: {}", e))
            })?
            // The frame is already reserved; a failed allocation cannot be
            // rolled back into a consistent pool.
            .unwrap_or_else(|e| panic!("page allocation failed after frame reservation: {}", e));

        self.page_table.insert(new_page_id, frame_id);
        let new_page = Page::new(new_page_id).with_pin_count(1u32);
        self.pool[frame_id].write().replace(new_page);

        let mut replacer = self.replacer.write();
        replacer.record_access(frame_id, AccessType::Unknown);
        replacer.set_evictable(frame_id, false);
        drop(replacer);

        Ok(PageRef {
            page: self.pool[frame_id].clone(),
            bpm: Arc::clone(self),
        })
    }

    /// Returns a pinned handle to the page, reading it from disk on a miss.
    /// Fails identically to [`BufferPoolManager::new_page`].
    pub fn fetch_page(
        self: &Arc<Self>,
        page_id: PageId,
        access_type: AccessType,
    ) -> VellumResult<PageRef> {
        let _guard = self.latch.lock();

        if let Some(frame_id_ref) = self.page_table.get(&page_id) {
            let frame_id = *frame_id_ref;
            drop(frame_id_ref);

            let page = self.pool[frame_id].clone();
            page.write().pin_count += 1;
            let mut replacer = self.replacer.write();
            replacer.record_access(frame_id, access_type);
            replacer.set_evictable(frame_id, false);
            drop(replacer);

            Ok(PageRef {
                page,
                bpm: Arc::clone(self),
            })
        } else {
            let frame_id = self.allocate_frame()?;

            let rx_read = self.disk_scheduler.schedule_read(page_id)?;
            let page_data_bytes = rx_read
                .recv()
                .map_err(|e| {
                    VellumError::Internal(format!("Failed to receive page data: {}", e))
                })?
                .unwrap_or_else(|e| panic!("page {} has not been fetched from disk: {}", page_id, e));

            let mut page_data_array = [0u8; PAGE_SIZE];
            let copy_len = std::cmp::min(page_data_bytes.len(), PAGE_SIZE);
            page_data_array[..copy_len].copy_from_slice(&page_data_bytes[..copy_len]);

            self.page_table.insert(page_id, frame_id);
            let new_page = Page::new(page_id)
                .with_pin_count(1u32)
                .with_data(page_data_array);
            self.pool[frame_id].write().replace(new_page);

            let mut replacer = self.replacer.write();
            replacer.record_access(frame_id, access_type);
            replacer.set_evictable(frame_id, false);
            drop(replacer);

            Ok(PageRef {
                page: self.pool[frame_id].clone(),
                bpm: Arc::clone(self),
            })
        }
    }

    /// Drops one pin. Returns false if the page is not resident or its pin
    /// count is already zero. A true `is_dirty` sticks until the page is
    /// flushed or evicted.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let _guard = self.latch.lock();

        let Some(frame_id_ref) = self.page_table.get(&page_id) else {
            return false;
        };
        let frame_id = *frame_id_ref;
        drop(frame_id_ref);

        let mut page = self.pool[frame_id].write();
        if is_dirty {
            page.is_dirty = true;
        }
        if page.pin_count == 0 {
            return false;
        }
        page.pin_count -= 1;
        if page.pin_count == 0 {
            drop(page);
            self.replacer.write().set_evictable(frame_id, true);
        }
        true
    }

    /// Writes the page's current bytes to disk, dirty or not, and clears
    /// the dirty flag. Returns false if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> VellumResult<bool> {
        let _guard = self.latch.lock();
        self.flush_page_inner(page_id)
    }

    fn flush_page_inner(&self, page_id: PageId) -> VellumResult<bool> {
        let Some(frame_id_ref) = self.page_table.get(&page_id) else {
            return Ok(false);
        };
        let frame_id = *frame_id_ref;
        drop(frame_id_ref);

        let data_bytes = {
            let page = self.pool[frame_id].read();
            Bytes::copy_from_slice(page.data())
        };

        let rx_write = self.disk_scheduler.schedule_write(page_id, data_bytes)?;
        rx_write
            .recv()
            .map_err(|e| VellumError::Internal(format!("Failed to receive flush result: {}", e)))?
            .unwrap_or_else(|e| panic!("page {} has not been flushed to disk: {}", page_id, e));

        self.pool[frame_id].write().is_dirty = false;
        Ok(true)
    }

    /// Flushes every resident page, unconditionally of its dirty flag.
    pub fn flush_all_pages(&self) -> VellumResult<()> {
        let _guard = self.latch.lock();

        let page_ids: Vec<PageId> = self.page_table.iter().map(|e| *e.key()).collect();
        for page_id in page_ids {
            self.flush_page_inner(page_id)?;
        }
        Ok(())
    }

    /// Frees the frame holding the page and retires the page id. Returns
    /// false if the page is resident and pinned; a non-resident page is
    /// vacuously deleted.
    pub fn delete_page(&self, page_id: PageId) -> VellumResult<bool> {
        let _guard = self.latch.lock();

        if let Some(frame_id_ref) = self.page_table.get(&page_id) {
            let frame_id = *frame_id_ref;
            drop(frame_id_ref);

            let page = self.pool[frame_id].clone();
            if page.read().pin_count > 0 {
                return Ok(false);
            }

            page.write().destroy();
            self.page_table.remove(&page_id);
            self.free_list.lock().push_back(frame_id);
            self.replacer.write().remove(frame_id);

            let rx_dealloc = self.disk_scheduler.schedule_deallocate(page_id)?;
            rx_dealloc.recv().map_err(|e| {
                VellumError::Internal(format!("Failed to receive deallocate result: {}", e))
            })??;
        }

        Ok(true)
    }

    /// Number of frames currently eligible for eviction.
    pub fn evictable_count(&self) -> usize {
        self.replacer.read().size()
    }

    fn allocate_frame(&self) -> VellumResult<FrameId> {
        if let Some(frame_id) = self.free_list.lock().pop_front() {
            return Ok(frame_id);
        }

        let victim = self.replacer.write().evict();
        if let Some(frame_id) = victim {
            let evicted_page_lock = self.pool[frame_id].clone();
            let evicted_page = evicted_page_lock.read();
            let evicted_page_id = evicted_page.page_id;
            let is_dirty = evicted_page.is_dirty;

            if is_dirty {
                let data_bytes = Bytes::copy_from_slice(evicted_page.data());
                drop(evicted_page);

                let rx_write = self
                    .disk_scheduler
                    .schedule_write(evicted_page_id, data_bytes)?;
                rx_write
                    .recv()
                    .map_err(|e| {
                        VellumError::Internal(format!(
                            "Failed to receive evicted page flush result: {}",
                            e
                        ))
                    })?
                    .unwrap_or_else(|e| {
                        panic!(
                            "evicted page {} has not been written back to disk: {}",
                            evicted_page_id, e
                        )
                    });
            } else {
                drop(evicted_page);
            }

            self.page_table.remove(&evicted_page_id);
            Ok(frame_id)
        } else {
            Err(VellumError::Storage(
                "Cannot allocate free frame".to_string(),
            ))
        }
    }
}
