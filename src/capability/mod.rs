//! Start-up capability probe
//!
//! Works out once whether voice input can work at all: secure context,
//! microphone API and permission, recognition engine. The probe never fails;
//! every problem folds into the [`CapabilityVerdict`] the orchestrator reads.

use crate::{ConciergeError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Hostnames that count as a secure context even over plain HTTP
const LOCAL_HOSTS: &[&str] = &["localhost", "127.0.0.1", "::1", "[::1]"];

/// Loopback spellings known to make browser recognition flaky
const DEGRADED_LOOPBACKS: &[&str] = &["::1", "[::1]", "0.0.0.0"];

/// Microphone permission as far as the probe could tell
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MicPermission {
    /// Not asked yet, or the prompt is still open
    #[default]
    Unknown,
    Granted,
    Denied,
    /// No media API to ask through
    Unsupported,
}

impl std::fmt::Display for MicPermission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MicPermission::Unknown => write!(f, "unknown"),
            MicPermission::Granted => write!(f, "granted"),
            MicPermission::Denied => write!(f, "denied"),
            MicPermission::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// Which media-device API the host exposes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaApi {
    /// Promise-based `getUserMedia` on the media devices object
    Standard,
    /// Old callback-style `getUserMedia`
    Legacy,
    Missing,
}

/// The host environment the kiosk runs in
#[async_trait]
pub trait Environment: Send + Sync {
    /// Whether the host itself reports a secure context
    fn is_secure_context(&self) -> bool;

    /// Page protocol, e.g. `https:`
    fn protocol(&self) -> String;

    fn hostname(&self) -> String;

    /// Whether a speech recognition engine can be constructed
    fn has_recognition_engine(&self) -> bool;

    fn media_api(&self) -> MediaApi;

    /// Ask for microphone access through `api`; `Ok(true)` when granted
    async fn request_microphone(&self, api: MediaApi) -> Result<bool>;
}

/// Result of the start-up probe
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CapabilityVerdict {
    pub https_ok: bool,
    pub mic_api_available: bool,
    pub mic_permission: MicPermission,
    pub recognition_api_available: bool,
    /// Host is a loopback spelling known to degrade recognition
    pub degraded_loopback: bool,
}

impl CapabilityVerdict {
    /// Whether voice input can be attempted at all
    pub fn voice_input_possible(&self) -> bool {
        self.https_ok
            && self.mic_api_available
            && self.recognition_api_available
            && !matches!(
                self.mic_permission,
                MicPermission::Denied | MicPermission::Unsupported
            )
    }

    /// Whether the UI should show the "allow microphone" affordance
    pub fn permission_outstanding(&self) -> bool {
        self.mic_permission == MicPermission::Unknown
    }

    /// Record a permission answer learned after start-up
    pub fn record_permission(&mut self, granted: bool) {
        if self.mic_permission == MicPermission::Unsupported {
            return;
        }
        self.mic_permission = if granted {
            MicPermission::Granted
        } else {
            MicPermission::Denied
        };
    }

    /// Human readable reason voice input is unavailable
    pub fn unavailable_reason(&self) -> Option<&'static str> {
        if !self.https_ok {
            Some("voice input needs a secure (HTTPS) connection")
        } else if !self.recognition_api_available {
            Some("speech recognition is not supported here")
        } else if !self.mic_api_available {
            Some("no microphone API is available")
        } else if self.mic_permission == MicPermission::Denied {
            Some("microphone access was denied")
        } else if self.mic_permission == MicPermission::Unsupported {
            Some("microphone access is not supported")
        } else {
            None
        }
    }
}

pub fn is_local_host(hostname: &str) -> bool {
    LOCAL_HOSTS.contains(&hostname)
}

pub fn is_degraded_loopback(hostname: &str) -> bool {
    DEGRADED_LOOPBACKS.contains(&hostname)
}

pub struct CapabilityProbe<'a> {
    env: &'a dyn Environment,
    permission_timeout: Duration,
}

impl<'a> CapabilityProbe<'a> {
    pub fn new(env: &'a dyn Environment) -> Self {
        Self {
            env,
            permission_timeout: Duration::from_secs(3),
        }
    }

    /// Bound how long the permission check may take before it counts as outstanding
    pub fn with_permission_timeout(mut self, timeout: Duration) -> Self {
        self.permission_timeout = timeout;
        self
    }

    pub async fn probe(&self) -> CapabilityVerdict {
        let hostname = self.env.hostname();
        let https_ok = self.env.is_secure_context()
            || self.env.protocol() == "https:"
            || is_local_host(&hostname);
        let degraded_loopback = is_degraded_loopback(&hostname);
        if degraded_loopback {
            warn!(
                "Host {} is a loopback address known to degrade speech recognition; prefer localhost",
                hostname
            );
        }

        let recognition_api_available = self.env.has_recognition_engine();
        let api = self.env.media_api();
        let mic_api_available = api != MediaApi::Missing;
        let mic_permission = self.check_permission(api).await;

        let verdict = CapabilityVerdict {
            https_ok,
            mic_api_available,
            mic_permission,
            recognition_api_available,
            degraded_loopback,
        };
        info!(
            "Capability verdict: https={} mic_api={} permission={} recognition={}",
            verdict.https_ok,
            verdict.mic_api_available,
            verdict.mic_permission,
            verdict.recognition_api_available
        );
        verdict
    }

    async fn check_permission(&self, api: MediaApi) -> MicPermission {
        if api == MediaApi::Missing {
            debug!("No media API, microphone permission unsupported");
            return MicPermission::Unsupported;
        }

        match tokio::time::timeout(self.permission_timeout, self.env.request_microphone(api)).await
        {
            Ok(Ok(true)) => MicPermission::Granted,
            Ok(Ok(false)) | Ok(Err(ConciergeError::PermissionDenied)) => MicPermission::Denied,
            Ok(Err(e)) => {
                warn!("Microphone permission check failed: {}", e);
                MicPermission::Unknown
            }
            Err(_) => {
                debug!("Microphone permission prompt still open");
                MicPermission::Unknown
            }
        }
    }
}
