use super::disk_manager::DiskManager;
use crate::buffer::PageId;
use crate::config::IOSchedulerConfig;
use crate::error::{VellumError, VellumResult};
use bytes::{Bytes, BytesMut};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

// Type alias for the sender part of the result channel
pub type DiskCommandResultSender<T> = Sender<VellumResult<T>>;
// Type alias for the receiver part of the result channel
pub type DiskCommandResultReceiver<T> = Receiver<VellumResult<T>>;

// Commands sent from BufferPoolManager to the DiskScheduler workers
#[derive(Debug, Clone)]
pub enum DiskRequest {
    ReadPage {
        page_id: PageId,
        result_sender: DiskCommandResultSender<BytesMut>,
    },
    WritePage {
        page_id: PageId,
        data: Bytes,
        result_sender: DiskCommandResultSender<()>,
    },
    AllocatePage {
        result_sender: DiskCommandResultSender<PageId>,
    },
    DeallocatePage {
        page_id: PageId,
        result_sender: DiskCommandResultSender<()>,
    },
    Shutdown,
}

// Structure to manage the background I/O threads
#[derive(Debug)]
pub struct DiskScheduler {
    request_sender: Sender<DiskRequest>,
    // Dispatcher thread receives all requests and forwards to workers
    dispatcher_thread: Option<thread::JoinHandle<()>>,
    // Worker threads execute actual I/O tasks concurrently
    worker_threads: Vec<thread::JoinHandle<()>>,
    pub config: IOSchedulerConfig,
}

impl DiskScheduler {
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        Self::new_with_config(disk_manager, IOSchedulerConfig::default())
    }

    pub fn new_with_config(disk_manager: Arc<DiskManager>, config: IOSchedulerConfig) -> Self {
        let worker_count = config.workers;
        let (request_sender, request_receiver) = mpsc::channel::<DiskRequest>();

        // Create per-worker channels
        let mut worker_senders = Vec::with_capacity(worker_count);
        let mut worker_threads = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let (tx, rx) = mpsc::channel::<DiskRequest>();
            worker_senders.push(tx);
            let dm = disk_manager.clone();
            let handle = thread::Builder::new()
                .name(format!("disk-scheduler-worker-{}", i))
                .spawn(move || {
                    Self::io_worker_loop(rx, dm);
                })
                .expect("Failed to spawn DiskScheduler worker thread");
            worker_threads.push(handle);
        }

        // Spawn dispatcher thread to forward requests in round-robin
        let dispatcher_thread = thread::Builder::new()
            .name("disk-scheduler-dispatcher".to_string())
            .spawn(move || {
                Self::dispatcher_loop(request_receiver, worker_senders);
            })
            .expect("Failed to spawn DiskScheduler dispatcher thread");

        DiskScheduler {
            request_sender,
            dispatcher_thread: Some(dispatcher_thread),
            worker_threads,
            config,
        }
    }

    // Dispatcher: forwards incoming requests to worker queues
    fn dispatcher_loop(receiver: Receiver<DiskRequest>, worker_senders: Vec<Sender<DiskRequest>>) {
        log::debug!("DiskScheduler dispatcher thread started.");
        let mut rr_idx: usize = 0;
        while let Ok(request) = receiver.recv() {
            match request {
                DiskRequest::Shutdown => {
                    log::debug!("Dispatcher received Shutdown. Broadcasting to workers...");
                    for tx in &worker_senders {
                        let _ = tx.send(DiskRequest::Shutdown);
                    }
                    break;
                }
                other => {
                    if worker_senders.is_empty() {
                        log::error!("No worker_senders available to handle request");
                        break;
                    }
                    // Try to send to a live worker; attempt up to N times
                    let n = worker_senders.len();
                    let mut attempts = 0usize;
                    let mut sent = false;
                    while attempts < n {
                        let idx = rr_idx % n;
                        rr_idx = rr_idx.wrapping_add(1);
                        if worker_senders[idx].send(other.clone()).is_ok() {
                            sent = true;
                            break;
                        }
                        attempts += 1;
                    }
                    if !sent {
                        log::error!("All worker_senders are closed; dropping request");
                        break;
                    }
                }
            }
        }
        log::debug!("DiskScheduler dispatcher thread finished.");
    }

    // The background worker loop that processes disk requests
    fn io_worker_loop(receiver: Receiver<DiskRequest>, disk_manager: Arc<DiskManager>) {
        log::debug!("Disk I/O worker thread started.");
        while let Ok(request) = receiver.recv() {
            match request {
                DiskRequest::ReadPage {
                    page_id,
                    result_sender,
                } => {
                    let result = disk_manager.read_page(page_id);
                    let bytes_result = result.map(|data| BytesMut::from(&data[..]));
                    if result_sender.send(bytes_result).is_err() {
                        log::error!(
                            "DiskScheduler failed to send ReadPage result for {}",
                            page_id
                        );
                    }
                }
                DiskRequest::WritePage {
                    page_id,
                    data,
                    result_sender,
                } => {
                    let result = disk_manager.write_page(page_id, &data);
                    if result_sender.send(result).is_err() {
                        log::error!(
                            "DiskScheduler failed to send WritePage result for {}",
                            page_id
                        );
                    }
                }
                DiskRequest::AllocatePage { result_sender } => {
                    let result = disk_manager.allocate_page();
                    if result_sender.send(result).is_err() {
                        log::error!("DiskScheduler failed to send AllocatePage result");
                    }
                }
                DiskRequest::DeallocatePage {
                    page_id,
                    result_sender,
                } => {
                    let result = disk_manager.deallocate_page(page_id);
                    if result_sender.send(result).is_err() {
                        log::error!(
                            "DiskScheduler failed to send DeallocatePage result for {}",
                            page_id
                        );
                    }
                }
                DiskRequest::Shutdown => {
                    log::debug!("Disk I/O worker thread received Shutdown signal.");
                    break;
                }
            }
        }
        log::debug!("Disk I/O worker thread finished.");
    }

    // --- Public methods to send requests ---

    pub fn schedule_read(
        &self,
        page_id: PageId,
    ) -> VellumResult<DiskCommandResultReceiver<BytesMut>> {
        let (tx, rx) = mpsc::channel();
        self.request_sender
            .send(DiskRequest::ReadPage {
                page_id,
                result_sender: tx,
            })
            .map_err(|e| VellumError::Internal(format!("Failed to send Read request: {}", e)))?;
        Ok(rx)
    }

    pub fn schedule_write(
        &self,
        page_id: PageId,
        data: Bytes,
    ) -> VellumResult<DiskCommandResultReceiver<()>> {
        let (tx, rx) = mpsc::channel();
        self.request_sender
            .send(DiskRequest::WritePage {
                page_id,
                data,
                result_sender: tx,
            })
            .map_err(|e| VellumError::Internal(format!("Failed to send Write request: {}", e)))?;
        Ok(rx)
    }

    pub fn schedule_allocate(&self) -> VellumResult<DiskCommandResultReceiver<PageId>> {
        let (tx, rx) = mpsc::channel();
        self.request_sender
            .send(DiskRequest::AllocatePage { result_sender: tx })
            .map_err(|e| {
                VellumError::Internal(format!("Failed to send Allocate request: {}", e))
            })?;
        Ok(rx)
    }

    pub fn schedule_deallocate(
        &self,
        page_id: PageId,
    ) -> VellumResult<DiskCommandResultReceiver<()>> {
        let (tx, rx) = mpsc::channel();
        self.request_sender
            .send(DiskRequest::DeallocatePage {
                page_id,
                result_sender: tx,
            })
            .map_err(|e| {
                VellumError::Internal(format!("Failed to send Deallocate request: {}", e))
            })?;
        Ok(rx)
    }
}

// Implement Drop for graceful shutdown
impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // Send shutdown signal. Ignore error if channel already closed.
        let _ = self.request_sender.send(DiskRequest::Shutdown);

        // Join dispatcher first
        if let Some(handle) = self.dispatcher_thread.take() {
            if let Err(e) = handle.join() {
                log::error!("Disk dispatcher thread panicked: {:?}", e);
            }
        }

        // Then join all workers
        for handle in self.worker_threads.drain(..) {
            if let Err(e) = handle.join() {
                log::error!("Disk worker thread panicked: {:?}", e);
            }
        }
    }
}
