//! Cross-context messaging: the raw channel, correlated point-to-point commands,
//! and ping-checked fan-out to child frames.

pub mod bus;
pub mod fanout;
pub mod messenger;
pub mod protocol;

pub use bus::{BusError, BusPoster, Envelope, EnvelopeReceiver, WindowBus, WindowMessagePoster};
pub use fanout::{AllFramesMessenger, FanoutError, FanoutState};
pub use messenger::{CommandListener, FrameMessenger, MessengerError};
pub use protocol::{Command, CommandResponse, RunnerCommands, WindowMessage};
