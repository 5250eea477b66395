//! Tracking Context
//!
//! The tracking context records which computation is currently running so
//! that reads can be attributed to it.
//!
//! # Implementation
//!
//! The context is a stack of frames owned by the thread's runtime. Running
//! an effect, computed or getter watcher pushes a frame for its subscriber;
//! every reactive read records its [`DepKey`] into the top frame. When the
//! computation completes the frame is popped and its keys become the
//! subscriber's new dependency set.
//!
//! Untracked frames (see [`untrack`](crate::untrack)) carry no subscriber,
//! so reads inside them are not recorded by the enclosing computation.

use indexmap::IndexSet;

use super::registry::DepKey;
use super::runtime::Runtime;
use super::SubscriberId;

/// One entry of the tracking stack.
#[derive(Debug)]
struct Frame {
    /// The computation running in this frame, `None` for untracked frames.
    subscriber: Option<SubscriberId>,
    /// Keys read during this frame, in first-read order.
    dependencies: IndexSet<DepKey>,
}

/// Stack of running computations.
#[derive(Debug, Default)]
pub struct TrackingContext {
    frames: Vec<Frame>,
}

impl TrackingContext {
    pub(crate) fn push(&mut self, subscriber: Option<SubscriberId>) {
        self.frames.push(Frame {
            subscriber,
            dependencies: IndexSet::new(),
        });
    }

    pub(crate) fn pop(&mut self) -> Option<(Option<SubscriberId>, IndexSet<DepKey>)> {
        self.frames
            .pop()
            .map(|frame| (frame.subscriber, frame.dependencies))
    }

    /// The subscriber whose reads are currently being recorded.
    pub fn current(&self) -> Option<SubscriberId> {
        self.frames.last().and_then(|frame| frame.subscriber)
    }

    /// Record a read. Ignored when nothing is tracking.
    pub(crate) fn track(&mut self, key: DepKey) {
        if let Some(frame) = self.frames.last_mut() {
            if frame.subscriber.is_some() {
                frame.dependencies.insert(key);
            }
        }
    }

    /// Number of frames on the stack, tracked or not.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

/// Guard that pops its frame when dropped.
///
/// Keeps the stack balanced even if the computation panics.
pub struct ContextGuard {
    subscriber: Option<SubscriberId>,
    finished: bool,
}

impl ContextGuard {
    /// Enter a tracking frame for the given subscriber.
    pub fn enter(subscriber: SubscriberId) -> Self {
        Runtime::push_frame(Some(subscriber));
        Self {
            subscriber: Some(subscriber),
            finished: false,
        }
    }

    /// Enter a frame that records nothing.
    pub fn untracked() -> Self {
        Runtime::push_frame(None);
        Self {
            subscriber: None,
            finished: false,
        }
    }

    /// Pop the frame and return the keys read while it was on top.
    pub fn finish(mut self) -> IndexSet<DepKey> {
        self.finished = true;
        self.pop_checked()
    }

    fn pop_checked(&self) -> IndexSet<DepKey> {
        match Runtime::pop_frame() {
            Some((subscriber, dependencies)) => {
                debug_assert_eq!(
                    subscriber, self.subscriber,
                    "TrackingContext mismatch: expected {:?}, got {:?}",
                    self.subscriber, subscriber
                );
                dependencies
            }
            None => IndexSet::new(),
        }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.pop_checked();
        }
    }
}
