//! Latest-wins intake between the vision producer and the control tick.
//!
//! The producer (a camera thread, a stdin reader, a test) publishes
//! [`FeatureVector`]s into a [`FeatureMailbox`]; a newer vector overwrites
//! an unread older one.  The control tick takes whatever is present via
//! [`FeaturePort`] and never blocks.
//!
//! ```text
//! ┌──────────────┐  FeatureVector  ┌──────────────┐
//! │   Producer   │────(latest)────▶│ Control Tick │
//! │  (any task)  │                 │   (sync)     │
//! └──────────────┘                 └──────────────┘
//!        │          EngineCommand          ▲
//!        └────────────(queued)─────────────┘
//! ```
//!
//! Commands travel on a separate bounded [`CommandQueue`] because, unlike
//! features, none of them may be dropped in favour of a newer one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;

use crate::app::commands::EngineCommand;
use crate::app::ports::FeaturePort;
use crate::sensors::FeatureVector;

/// Depth of the command queue.
pub const COMMAND_DEPTH: usize = 8;

struct Shared {
    latest: Signal<CriticalSectionRawMutex, FeatureVector>,
    published: AtomicU64,
    closed: AtomicBool,
}

/// Cloneable handle to one latest-wins slot. Clones share the slot.
#[derive(Clone)]
pub struct FeatureMailbox {
    shared: Arc<Shared>,
}

impl Default for FeatureMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureMailbox {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                latest: Signal::new(),
                published: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Overwrite the slot with `fv`.
    pub fn publish(&self, fv: FeatureVector) {
        self.shared.latest.signal(fv);
        self.shared.published.fetch_add(1, Ordering::Relaxed);
    }

    /// Take the pending vector, if any.
    pub fn take(&self) -> Option<FeatureVector> {
        self.shared.latest.try_take()
    }

    /// Producer has finished; no more vectors will arrive.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Vectors published so far, including overwritten ones.
    pub fn published(&self) -> u64 {
        self.shared.published.load(Ordering::Relaxed)
    }
}

impl FeaturePort for FeatureMailbox {
    fn latest_features(&mut self) -> Option<FeatureVector> {
        self.take()
    }
}

/// Bounded FIFO of operator commands.
#[derive(Clone)]
pub struct CommandQueue {
    channel: Arc<Channel<CriticalSectionRawMutex, EngineCommand, COMMAND_DEPTH>>,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    pub fn new() -> Self {
        Self {
            channel: Arc::new(Channel::new()),
        }
    }

    /// Enqueue without blocking. Hands the command back when full.
    pub fn try_send(&self, cmd: EngineCommand) -> Result<(), EngineCommand> {
        self.channel.try_send(cmd).map_err(|e| match e {
            embassy_sync::channel::TrySendError::Full(cmd) => cmd,
        })
    }

    pub fn try_receive(&self) -> Option<EngineCommand> {
        self.channel.try_receive().ok()
    }
}
