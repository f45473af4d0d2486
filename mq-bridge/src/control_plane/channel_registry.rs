//! Per-identity channel state shared by the supervisors and the facade.

use crate::broker::BrokerChannel;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Readiness flag plus the identity's teardown generation.
///
/// The generation only ever grows. It is bumped by every deliberate teardown so
/// work started before the teardown can tell it has been superseded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Readiness {
    ready: bool,
    generation: u64,
}

/// Identity-keyed channel handles, done-signals and readiness flags.
///
/// Every accessor is a single short critical section on one map; no guard is
/// ever held across an `.await` and no method touches two maps under lock.
#[derive(Default)]
pub(crate) struct ChannelRegistry {
    channels: DashMap<String, Arc<dyn BrokerChannel>>,
    done: DashMap<String, oneshot::Sender<()>>,
    // entries are kept after teardown so generations never restart
    ready: DashMap<String, Readiness>,
}

impl ChannelRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Stores `channel` for `identity`, handing back the handle it displaced.
    pub(crate) fn replace_channel(
        &self,
        identity: &str,
        channel: Arc<dyn BrokerChannel>,
    ) -> Option<Arc<dyn BrokerChannel>> {
        self.channels.insert(identity.to_string(), channel)
    }

    pub(crate) fn channel(&self, identity: &str) -> Option<Arc<dyn BrokerChannel>> {
        self.channels
            .get(identity)
            .map(|entry| entry.value().clone())
    }

    pub(crate) fn remove_channel(&self, identity: &str) -> Option<Arc<dyn BrokerChannel>> {
        self.channels.remove(identity).map(|(_, channel)| channel)
    }

    pub(crate) fn has_channel(&self, identity: &str) -> bool {
        self.channels.contains_key(identity)
    }

    pub(crate) fn identities(&self) -> Vec<String> {
        let mut identities: Vec<String> = self
            .channels
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        identities.sort();
        identities
    }

    /// Installs a fresh done-signal for `identity`.
    ///
    /// The previous sender, if any, is dropped, which releases whichever watcher
    /// was still waiting on it.
    pub(crate) fn arm_done(&self, identity: &str) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.done.insert(identity.to_string(), tx);
        rx
    }

    /// Fires the done-signal. Returns `false` when no watcher was listening.
    pub(crate) fn signal_done(&self, identity: &str) -> bool {
        match self.done.remove(identity) {
            Some((_, tx)) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub(crate) fn set_ready(&self, identity: &str, ready: bool) {
        self.ready.entry(identity.to_string()).or_default().ready = ready;
    }

    pub(crate) fn is_ready(&self, identity: &str) -> bool {
        self.ready.get(identity).map_or(false, |entry| entry.ready)
    }

    pub(crate) fn generation(&self, identity: &str) -> u64 {
        self.ready.get(identity).map_or(0, |entry| entry.generation)
    }

    /// Clears readiness and starts a new teardown generation in one step.
    pub(crate) fn begin_teardown(&self, identity: &str) {
        let mut entry = self.ready.entry(identity.to_string()).or_default();
        entry.ready = false;
        entry.generation += 1;
    }

    /// Sets readiness unless a teardown happened after `generation` was read.
    pub(crate) fn mark_ready(&self, identity: &str, generation: u64) -> bool {
        let mut entry = self.ready.entry(identity.to_string()).or_default();
        if entry.generation != generation {
            return false;
        }
        entry.ready = true;
        true
    }

    /// Removes `channel` if it is still the one held for `identity`.
    pub(crate) fn remove_channel_if_current(
        &self,
        identity: &str,
        channel: &Arc<dyn BrokerChannel>,
    ) -> bool {
        self.channels
            .remove_if(identity, |_, current| Arc::ptr_eq(current, channel))
            .is_some()
    }
}
