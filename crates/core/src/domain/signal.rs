// Control signal vocabulary

use std::fmt;

/// Command delivered to a worker on its private signal channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// First activation of a slot (Idle or Stopped -> Active).
    Init,
    /// Reactivation of a parked slot (Sleeping -> Active).
    Resume,
    /// Park the slot (Active -> Sleeping).
    Sleep,
    /// Terminate the slot. `force` abandons the in-flight item.
    Stop { force: bool },
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Init => write!(f, "INIT"),
            Signal::Resume => write!(f, "RESUME"),
            Signal::Sleep => write!(f, "SLEEP"),
            Signal::Stop { force: false } => write!(f, "STOP"),
            Signal::Stop { force: true } => write!(f, "FORCE_STOP"),
        }
    }
}
