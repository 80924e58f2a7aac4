//! Batching decorator for mutating calls
//!
//! A [`ChangeQueue`] wraps anything implementing [`DataMutations`] and
//! exposes the same operations. Calls to the intercepted methods are
//! buffered and replayed later, one by one and in order, when the queue is
//! flushed: manually, when `max` calls are waiting, or `delay` milliseconds
//! after the most recent call.

use std::sync::Arc;

use dv_core::Id;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::QueueOptions;
use crate::dataset::DataInput;
use crate::DataError;

/// The mutating operations of a table
pub trait DataMutations: Send + Sync + 'static {
    fn add(&self, data: DataInput, sender_id: Option<&str>) -> Result<Vec<Id>, DataError>;

    fn update(&self, data: DataInput, sender_id: Option<&str>) -> Result<Vec<Id>, DataError>;

    fn remove(&self, ids: Vec<Id>, sender_id: Option<&str>) -> Result<Vec<Id>, DataError>;

    fn clear(&self, sender_id: Option<&str>) -> Result<Vec<Id>, DataError>;
}

/// Names of the operations a queue can intercept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Add,
    Update,
    Remove,
    Clear,
}

/// A buffered invocation
#[derive(Debug, Clone, PartialEq)]
pub enum QueuedCall {
    Add(DataInput),
    Update(DataInput),
    Remove(Vec<Id>),
    Clear,
}

impl QueuedCall {
    pub fn method(&self) -> Method {
        match self {
            QueuedCall::Add(_) => Method::Add,
            QueuedCall::Update(_) => Method::Update,
            QueuedCall::Remove(_) => Method::Remove,
            QueuedCall::Clear => Method::Clear,
        }
    }

    fn invoke<T: DataMutations + ?Sized>(self, target: &T, sender_id: Option<&str>) -> Result<Vec<Id>, DataError> {
        match self {
            QueuedCall::Add(data) => target.add(data, sender_id),
            QueuedCall::Update(data) => target.update(data, sender_id),
            QueuedCall::Remove(ids) => target.remove(ids, sender_id),
            QueuedCall::Clear => target.clear(sender_id),
        }
    }
}

struct QueueEntry {
    call: QueuedCall,
    sender_id: Option<String>,
}

struct QueueState {
    buffer: Vec<QueueEntry>,
    options: QueueOptions,
    timer: Option<JoinHandle<()>>,
    destroyed: bool,
}

/// Buffers calls to the intercepted methods of `T`
pub struct ChangeQueue<T: DataMutations> {
    target: Arc<T>,
    replace: Vec<Method>,
    state: Arc<Mutex<QueueState>>,
}

impl<T: DataMutations> ChangeQueue<T> {
    /// Wrap `target`, intercepting the methods listed in `replace`
    pub fn attach(target: Arc<T>, replace: &[Method], options: QueueOptions) -> Self {
        debug!("Attaching change queue for {:?} ({:?})", replace, options);
        Self {
            target,
            replace: replace.to_vec(),
            state: Arc::new(Mutex::new(QueueState {
                buffer: Vec::new(),
                options,
                timer: None,
                destroyed: false,
            })),
        }
    }

    /// The wrapped target
    pub fn target(&self) -> &Arc<T> {
        &self.target
    }

    pub fn options(&self) -> QueueOptions {
        self.state.lock().options
    }

    /// Number of buffered calls
    pub fn len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Change delay and max. Flushes right away if the buffer already
    /// exceeds the new max, and restarts the timer for a new delay.
    pub fn configure(&self, options: QueueOptions) -> Result<(), DataError> {
        let (exceeded, pending) = {
            let mut state = self.state.lock();
            state.options = options;
            if options.delay.is_none() {
                if let Some(timer) = state.timer.take() {
                    timer.abort();
                }
            }
            (options.is_exceeded(state.buffer.len()), !state.buffer.is_empty())
        };
        if exceeded {
            self.flush()
        } else {
            if pending {
                self.schedule();
            }
            Ok(())
        }
    }

    /// Replay every buffered call in order. All calls are attempted; the
    /// errors of those that failed are returned together.
    pub fn flush(&self) -> Result<(), DataError> {
        if let Some(timer) = self.state.lock().timer.take() {
            timer.abort();
        }
        flush_buffer(self.target.as_ref(), &self.state)
    }

    /// Flush and stop intercepting. Later calls go straight to the target.
    pub fn destroy(&self) -> Result<(), DataError> {
        self.state.lock().destroyed = true;
        self.flush()
    }

    fn intercepts(&self, method: Method) -> bool {
        self.replace.contains(&method) && !self.state.lock().destroyed
    }

    /// Buffer a call, or run it directly when its method is not intercepted
    pub fn dispatch(&self, call: QueuedCall, sender_id: Option<&str>) -> Result<Vec<Id>, DataError> {
        if !self.intercepts(call.method()) {
            return call.invoke(self.target.as_ref(), sender_id);
        }

        let exceeded = {
            let mut state = self.state.lock();
            state.buffer.push(QueueEntry {
                call,
                sender_id: sender_id.map(str::to_string),
            });
            state.options.is_exceeded(state.buffer.len())
        };

        if exceeded {
            self.flush()?;
        } else {
            self.schedule();
        }
        Ok(Vec::new())
    }

    /// Restart the debounce timer, if a delay is configured
    fn schedule(&self) {
        let Some(delay) = self.state.lock().options.delay_duration() else {
            return;
        };
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No async runtime available, queued calls wait for a manual flush");
                return;
            }
        };

        let target = self.target.clone();
        let state = self.state.clone();
        let timer = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = flush_buffer(target.as_ref(), &state) {
                error!("Queued flush failed: {}", e);
            }
        });

        if let Some(previous) = self.state.lock().timer.replace(timer) {
            previous.abort();
        }
    }
}

fn flush_buffer<T: DataMutations + ?Sized>(target: &T, state: &Mutex<QueueState>) -> Result<(), DataError> {
    let entries = std::mem::take(&mut state.lock().buffer);
    if entries.is_empty() {
        return Ok(());
    }
    debug!("Flushing {} queued call(s)", entries.len());

    let errors: Vec<DataError> = entries
        .into_iter()
        .filter_map(|entry| entry.call.invoke(target, entry.sender_id.as_deref()).err())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(DataError::QueueFlush(errors))
    }
}

impl<T: DataMutations> DataMutations for ChangeQueue<T> {
    fn add(&self, data: DataInput, sender_id: Option<&str>) -> Result<Vec<Id>, DataError> {
        self.dispatch(QueuedCall::Add(data), sender_id)
    }

    fn update(&self, data: DataInput, sender_id: Option<&str>) -> Result<Vec<Id>, DataError> {
        self.dispatch(QueuedCall::Update(data), sender_id)
    }

    fn remove(&self, ids: Vec<Id>, sender_id: Option<&str>) -> Result<Vec<Id>, DataError> {
        self.dispatch(QueuedCall::Remove(ids), sender_id)
    }

    fn clear(&self, sender_id: Option<&str>) -> Result<Vec<Id>, DataError> {
        self.dispatch(QueuedCall::Clear, sender_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every call; `remove` of id 0 fails
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl DataMutations for Recorder {
        fn add(&self, data: DataInput, _: Option<&str>) -> Result<Vec<Id>, DataError> {
            self.calls.lock().push(format!("add:{}", data.into_records().len()));
            Ok(Vec::new())
        }

        fn update(&self, _: DataInput, _: Option<&str>) -> Result<Vec<Id>, DataError> {
            self.calls.lock().push("update".into());
            Ok(Vec::new())
        }

        fn remove(&self, ids: Vec<Id>, _: Option<&str>) -> Result<Vec<Id>, DataError> {
            self.calls.lock().push(format!("remove:{}", ids[0]));
            if ids[0] == Id::Int(0) {
                return Err(DataError::MissingId(Id::Int(0)));
            }
            Ok(ids)
        }

        fn clear(&self, _: Option<&str>) -> Result<Vec<Id>, DataError> {
            self.calls.lock().push("clear".into());
            Ok(Vec::new())
        }
    }

    fn queue(max: Option<usize>) -> ChangeQueue<Recorder> {
        ChangeQueue::attach(
            Arc::new(Recorder::default()),
            &[Method::Add, Method::Remove],
            QueueOptions { delay: None, max },
        )
    }

    #[test]
    fn test_buffers_until_flush() {
        let queue = queue(None);
        queue.add(DataInput::Many(vec![]), None).unwrap();
        queue.remove(vec![Id::Int(1)], None).unwrap();

        assert_eq!(queue.len(), 2);
        assert!(queue.target().calls.lock().is_empty());

        queue.flush().unwrap();
        assert_eq!(*queue.target().calls.lock(), vec!["add:0", "remove:1"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_non_intercepted_methods_run_directly() {
        let queue = queue(None);
        queue.update(DataInput::Many(vec![]), None).unwrap();
        assert_eq!(*queue.target().calls.lock(), vec!["update"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_max_triggers_flush() {
        let queue = queue(Some(2));
        queue.remove(vec![Id::Int(1)], None).unwrap();
        assert_eq!(queue.len(), 1);
        queue.remove(vec![Id::Int(2)], None).unwrap();
        assert!(queue.is_empty());
        assert_eq!(queue.target().calls.lock().len(), 2);
    }

    #[test]
    fn test_configure_flushes_when_already_exceeded() {
        let queue = queue(None);
        for i in 1..=3 {
            queue.remove(vec![Id::Int(i)], None).unwrap();
        }
        queue.configure(QueueOptions { delay: None, max: Some(2) }).unwrap();
        assert!(queue.is_empty());
        assert_eq!(queue.target().calls.lock().len(), 3);
    }

    #[test]
    fn test_flush_attempts_all_and_aggregates_errors() {
        let queue = queue(None);
        queue.remove(vec![Id::Int(0)], None).unwrap();
        queue.remove(vec![Id::Int(5)], None).unwrap();
        queue.remove(vec![Id::Int(0)], None).unwrap();

        let err = queue.flush().unwrap_err();
        match err {
            DataError::QueueFlush(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(*queue.target().calls.lock(), vec!["remove:0", "remove:5", "remove:0"]);
    }

    #[test]
    fn test_destroy_flushes_and_detaches() {
        let queue = queue(None);
        queue.add(DataInput::Many(vec![]), None).unwrap();
        queue.destroy().unwrap();
        assert_eq!(queue.target().calls.lock().len(), 1);

        queue.add(DataInput::Many(vec![]), None).unwrap();
        assert!(queue.is_empty());
        assert_eq!(queue.target().calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_delay_debounces() {
        let queue = ChangeQueue::attach(
            Arc::new(Recorder::default()),
            &[Method::Add],
            QueueOptions { delay: Some(30), max: None },
        );

        queue.add(DataInput::Many(vec![]), None).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        queue.add(DataInput::Many(vec![]), None).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(queue.target().calls.lock().is_empty());

        tokio::time::sleep(std::time::Duration::from_millis(80)).await;
        assert_eq!(queue.target().calls.lock().len(), 2);
        assert!(queue.is_empty());
    }
}
