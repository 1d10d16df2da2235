//! Writer configuration.

/// How buffers travel from producers to the worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Handoff {
    /// Zero-capacity channel: `submit` returns only once a worker has taken the buffer.
    #[default]
    Rendezvous,
    /// Queue up to `n` buffers. Producers return as soon as their buffer is
    /// queued, so the worker no longer paces them one write at a time.
    Bounded(usize),
}

impl Handoff {
    pub fn capacity(self) -> usize {
        match self {
            Handoff::Rendezvous => 0,
            Handoff::Bounded(n) => n,
        }
    }

    pub fn from_capacity(n: usize) -> Self {
        if n == 0 {
            Handoff::Rendezvous
        } else {
            Handoff::Bounded(n)
        }
    }
}

/// Whether `start` may be called more than once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StartPolicy {
    /// A second `start` fails with `WriterError::AlreadyStarted`.
    #[default]
    Once,
    /// Every `start` spawns another worker draining the same channel.
    Unguarded,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriterConfig {
    pub handoff: Handoff,
    pub start_policy: StartPolicy,
    /// permission bits used when the file is created
    pub mode: u32,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            handoff: Handoff::Rendezvous,
            start_policy: StartPolicy::Once,
            mode: 0o644,
        }
    }
}

impl WriterConfig {
    pub fn handoff(mut self, handoff: Handoff) -> Self {
        self.handoff = handoff;
        self
    }

    pub fn start_policy(mut self, policy: StartPolicy) -> Self {
        self.start_policy = policy;
        self
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_plain_writer() {
        let config = WriterConfig::default();
        assert_eq!(config.handoff, Handoff::Rendezvous);
        assert_eq!(config.start_policy, StartPolicy::Once);
        assert_eq!(config.mode, 0o644);
    }

    #[test]
    fn zero_capacity_is_rendezvous() {
        assert_eq!(Handoff::from_capacity(0), Handoff::Rendezvous);
        assert_eq!(Handoff::from_capacity(8), Handoff::Bounded(8));
        assert_eq!(Handoff::Bounded(8).capacity(), 8);
        assert_eq!(Handoff::Rendezvous.capacity(), 0);
    }

    #[test]
    fn setters_chain() {
        let config = WriterConfig::default()
            .handoff(Handoff::Bounded(4))
            .start_policy(StartPolicy::Unguarded)
            .mode(0o600);
        assert_eq!(config.handoff, Handoff::Bounded(4));
        assert_eq!(config.start_policy, StartPolicy::Unguarded);
        assert_eq!(config.mode, 0o600);
    }
}
