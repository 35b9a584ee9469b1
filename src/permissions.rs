use cpal::traits::{DeviceTrait, HostTrait};

/// Outcome of the launch-time microphone check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicrophonePermission {
    /// An input device is reachable and configurable
    Granted,
    /// No usable input device (access refused or no hardware)
    Denied,
}

impl MicrophonePermission {
    /// Whether recording may start
    pub const fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Check microphone access by querying the default input device
///
/// On macOS the first query triggers the system permission prompt; a refused
/// prompt makes the device config query fail.
pub fn check_microphone_permission() -> MicrophonePermission {
    tracing::info!("checking microphone permission");

    let host = cpal::default_host();
    let Some(device) = host.default_input_device() else {
        tracing::error!("no input device available");
        return MicrophonePermission::Denied;
    };

    match device.default_input_config() {
        Ok(config) => {
            tracing::info!(
                sample_rate = config.sample_rate(),
                channels = config.channels(),
                "microphone permission granted"
            );
            MicrophonePermission::Granted
        }
        Err(e) => {
            tracing::error!("microphone access refused: {}", e);
            MicrophonePermission::Denied
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_granted() {
        assert!(MicrophonePermission::Granted.is_granted());
        assert!(!MicrophonePermission::Denied.is_granted());
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_check_microphone_permission() {
        assert_eq!(
            check_microphone_permission(),
            MicrophonePermission::Granted
        );
    }
}
