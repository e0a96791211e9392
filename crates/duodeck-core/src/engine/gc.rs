//! RT-safe garbage collection for track buffers
//!
//! Loading a new track onto a playing deck replaces a `LoadedTrack` whose
//! sample buffer can be hundreds of megabytes. Freeing that on the audio
//! thread means munmap/madvise syscalls and an audible dropout. Track
//! buffers are therefore held in `basedrop::Shared<T>`: dropping the last
//! reference on the audio thread enqueues a pointer (~50ns), and the actual
//! deallocation happens on a background GC thread.

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// Global handle for creating Shared<T> allocations
static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// Initialize the global collector and return a handle
fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("duodeck-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it lives on this thread
            let mut collector = Collector::new();

            let handle = collector.handle();
            tx.send(handle).expect("failed to send GC handle");

            log::info!("track buffer GC thread started");

            loop {
                collector.collect();
                // 100ms is fast enough for memory reclamation
                thread::sleep(Duration::from_millis(100));
            }
        })
        .expect("failed to spawn GC thread");

    rx.recv().expect("failed to receive GC handle")
}

/// Get a handle for creating `Shared<T>` allocations
///
/// The handle is lightweight and can be cloned. The first call spawns the
/// collector thread.
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}
