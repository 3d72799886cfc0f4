/// Request sequencing for the poll loops
///
/// Each poll target has at most one request in flight. Starting a new one
/// aborts the previous task, and every completion carries the id it was
/// started with so late arrivals from an older request are discarded.
use log::debug;
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub type RequestId = u64;

/// A finished request, tagged with the id it was started under
#[derive(Debug)]
pub struct Completion<T> {
    pub id: RequestId,
    pub result: T,
}

#[derive(Debug)]
pub struct RequestTracker {
    name: &'static str,
    next_id: RequestId,
    latest: Option<RequestId>,
    in_flight: Option<JoinHandle<()>>,
}

impl RequestTracker {
    pub fn new(name: &'static str) -> Self {
        RequestTracker {
            name,
            next_id: 1,
            latest: None,
            in_flight: None,
        }
    }

    /// Allocate a new id, cancelling whatever was still in flight
    pub fn begin(&mut self) -> RequestId {
        self.cancel();
        let id = self.next_id;
        self.next_id += 1;
        self.latest = Some(id);
        id
    }

    /// Spawn `request` under a fresh id and deliver its result on `tx`
    pub fn spawn<T, F>(&mut self, tx: &mpsc::UnboundedSender<Completion<T>>, request: F) -> RequestId
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let id = self.begin();
        let tx = tx.clone();
        self.in_flight = Some(tokio::spawn(async move {
            let result = request.await;
            // Receiver gone means the view is shutting down
            let _ = tx.send(Completion { id, result });
        }));
        id
    }

    /// True if `id` belongs to the newest request; that request is then settled
    pub fn accept(&mut self, id: RequestId) -> bool {
        if self.latest == Some(id) {
            self.latest = None;
            self.in_flight = None;
            true
        } else {
            debug!("Discarding stale {} response #{}", self.name, id);
            false
        }
    }

    pub fn is_pending(&self) -> bool {
        self.latest.is_some()
    }

    /// Abort the in-flight request, if any
    pub fn cancel(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            if !handle.is_finished() {
                debug!("Cancelling in-flight {} request", self.name);
            }
            handle.abort();
        }
        self.latest = None;
    }
}

impl Drop for RequestTracker {
    fn drop(&mut self) {
        self.cancel();
    }
}
