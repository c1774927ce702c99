//! Runtime configuration.

use zonewire::Zone;

/// What to do with a handle that claims to belong to this zone but was never
/// issued by it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnknownHandles {
    /// Log and drop. Nothing is sent.
    #[default]
    Reject,
    /// Forward it to the other zone anyway, as if it were foreign.
    Forward,
}

/// Configuration fixed when a runtime is built.
#[derive(Clone, Debug)]
pub struct Config {
    /// The zone this runtime executes in.
    pub zone: Zone,
    /// Log every envelope at `info` instead of `trace`. Can be toggled later.
    pub verbose_logging: bool,
    pub unknown_handles: UnknownHandles,
}

impl Config {
    pub fn new(zone: Zone) -> Self {
        Self {
            zone,
            verbose_logging: false,
            unknown_handles: UnknownHandles::default(),
        }
    }
}
