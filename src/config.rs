use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

use crate::{Error, FrameResult};

/// Timing policy for the frame protocol and the event dispatch hub.
///
/// All durations are (de)serialized as integer milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRelayConfig {
    /// How long a child frame gets to answer a liveness ping.
    #[serde(default = "default_ping_timeout", with = "duration_ms")]
    pub ping_timeout: Duration,

    /// Upper bound for a child's recursive start/stop before it is treated as absent.
    #[serde(default = "default_frame_command_timeout", with = "duration_ms")]
    pub frame_command_timeout: Duration,

    /// Wait between a Tab keydown and re-reading the focused element.
    #[serde(default = "default_keyboard_trap_delay", with = "duration_ms")]
    pub keyboard_trap_delay: Duration,

    #[serde(default = "default_event_response_timeout", with = "duration_ms")]
    pub event_response_timeout: Duration,

    #[serde(default = "default_fire_and_forget_delay", with = "duration_ms")]
    pub fire_and_forget_delay: Duration,

    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

impl Default for FrameRelayConfig {
    fn default() -> Self {
        Self {
            ping_timeout: default_ping_timeout(),
            frame_command_timeout: default_frame_command_timeout(),
            keyboard_trap_delay: default_keyboard_trap_delay(),
            event_response_timeout: default_event_response_timeout(),
            fire_and_forget_delay: default_fire_and_forget_delay(),
            bus_capacity: default_bus_capacity(),
        }
    }
}

impl FrameRelayConfig {
    pub fn validate(&self) -> FrameResult<()> {
        let durations = [
            ("ping_timeout", self.ping_timeout),
            ("frame_command_timeout", self.frame_command_timeout),
            ("keyboard_trap_delay", self.keyboard_trap_delay),
            ("event_response_timeout", self.event_response_timeout),
            ("fire_and_forget_delay", self.fire_and_forget_delay),
        ];
        for (name, duration) in durations {
            if duration.is_zero() {
                return Err(Error::Config(format!("{} must be greater than 0", name)));
            }
        }
        if self.bus_capacity == 0 {
            return Err(Error::Config("bus_capacity must be greater than 0".to_string()));
        }
        Ok(())
    }
}

fn default_ping_timeout() -> Duration {
    Duration::from_millis(1000)
}

fn default_frame_command_timeout() -> Duration {
    Duration::from_millis(30_000)
}

fn default_keyboard_trap_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_event_response_timeout() -> Duration {
    Duration::from_secs(240)
}

fn default_fire_and_forget_delay() -> Duration {
    Duration::from_secs(120)
}

fn default_bus_capacity() -> usize {
    256
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> FrameResult<T> {
    let file = File::open(path)
        .map_err(|e| Error::Internal(format!("Failed to open config file: {}", e)))?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)
        .map_err(|e| Error::Internal(format!("Failed to parse config file: {}", e)))?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> FrameResult<T> {
    let config = serde_json::from_str(s)
        .map_err(|e| Error::Internal(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
