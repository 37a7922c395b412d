use log::debug;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};
use std::io::{Read, Seek, SeekFrom, Write};

use crate::buffer::{AtomicPageId, PageId, INVALID_PAGE_ID, PAGE_SIZE};
use crate::error::{VellumError, VellumResult};

static EMPTY_PAGE: [u8; PAGE_SIZE] = [0; PAGE_SIZE];

/// The page file. Page `p` lives at byte offset `(p - 1) * PAGE_SIZE`;
/// page id 0 is reserved as INVALID_PAGE_ID.
#[derive(Debug)]
pub struct DiskManager {
    next_page_id: AtomicPageId,
    // Use a mutex to wrap the file handle to ensure that only one thread
    // can access the file at the same time among multiple threads.
    db_file: Mutex<File>,
    // Retired page ids, handed back out before the counter advances.
    free_pages: Mutex<Vec<PageId>>,
}

impl DiskManager {
    pub fn try_new(db_path: impl AsRef<Path>) -> VellumResult<Self> {
        let db_file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(db_path.as_ref())?;

        let db_file_len = db_file.metadata()?.len();
        if db_file_len % PAGE_SIZE as u64 != 0 {
            return Err(VellumError::Internal(format!(
                "db file size not a multiple of page size {}",
                PAGE_SIZE
            )));
        }
        let next_page_id = (db_file_len / PAGE_SIZE as u64) as PageId + 1;
        debug!("Initialized disk_manager next_page_id: {}", next_page_id);

        Ok(Self {
            next_page_id: AtomicPageId::new(next_page_id),
            db_file: Mutex::new(db_file),
            free_pages: Mutex::new(Vec::new()),
        })
    }

    pub fn read_page(&self, page_id: PageId) -> VellumResult<[u8; PAGE_SIZE]> {
        if page_id == INVALID_PAGE_ID {
            return Err(VellumError::Storage(
                "read_page: invalid page id".to_string(),
            ));
        }
        let mut guard = self.db_file.lock().unwrap();
        guard.seek(SeekFrom::Start((page_id - 1) as u64 * PAGE_SIZE as u64))?;

        let mut page = [0u8; PAGE_SIZE];
        guard.read_exact(&mut page)?;
        Ok(page)
    }

    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> VellumResult<()> {
        if page_id == INVALID_PAGE_ID {
            return Err(VellumError::Storage(
                "write_page: invalid page id".to_string(),
            ));
        }
        if data.len() != PAGE_SIZE {
            return Err(VellumError::Internal(format!(
                "Page size is not {}",
                PAGE_SIZE
            )));
        }
        let mut guard = self.db_file.lock().unwrap();
        Self::write_page_internal(&mut guard, page_id, data)
    }

    /// Hands out a retired id if one exists, otherwise advances the
    /// monotonic counter and zero-fills the new page on disk.
    pub fn allocate_page(&self) -> VellumResult<PageId> {
        if let Some(page_id) = self.free_pages.lock().unwrap().pop() {
            return Ok(page_id);
        }

        let mut guard = self.db_file.lock().unwrap();
        let page_id = self.next_page_id.fetch_add(1, Ordering::SeqCst);
        Self::write_page_internal(&mut guard, page_id, &EMPTY_PAGE)?;
        Ok(page_id)
    }

    /// Retirement hook. The page's bytes are zeroed but the file is not
    /// shrunk; the id becomes a reuse candidate.
    pub fn deallocate_page(&self, page_id: PageId) -> VellumResult<()> {
        if page_id == INVALID_PAGE_ID {
            return Err(VellumError::Storage(
                "deallocate_page: invalid page id".to_string(),
            ));
        }
        let mut guard = self.db_file.lock().unwrap();
        Self::write_page_internal(&mut guard, page_id, &EMPTY_PAGE)?;
        drop(guard);

        let mut free_pages = self.free_pages.lock().unwrap();
        if !free_pages.contains(&page_id) {
            free_pages.push(page_id);
        }
        Ok(())
    }

    fn write_page_internal(
        guard: &mut MutexGuard<File>,
        page_id: PageId,
        data: &[u8],
    ) -> VellumResult<()> {
        guard.seek(SeekFrom::Start((page_id - 1) as u64 * PAGE_SIZE as u64))?;
        guard.write_all(data)?;
        guard.flush()?;
        Ok(())
    }

    pub fn db_file_len(&self) -> VellumResult<u64> {
        let guard = self.db_file.lock().unwrap();
        let meta = guard.metadata()?;
        Ok(meta.len())
    }
}
