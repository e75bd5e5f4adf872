//! Avatar sync controller
//!
//! Switches the avatar between its idle and talking loops. Switching is slow
//! and may be requested from several places at once (speech events and backup
//! timers), so requests are idempotent and at most one load runs at a time;
//! a request made during a load replaces any earlier pending one.
//!
//! Any load failure drops the avatar to a static image for good.

use crate::{ConciergeError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    /// Animation asset for the idle loop
    pub idle_asset: String,

    /// Animation asset for the talking loop
    pub talking_asset: String,

    /// Static image shown when animation is unavailable
    pub fallback_image: String,

    pub load_timeout_ms: u64,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            idle_asset: "avatar/idle.json".to_string(),
            talking_asset: "avatar/talking.json".to_string(),
            fallback_image: "avatar/still.png".to_string(),
            load_timeout_ms: 8000,
        }
    }
}

impl AvatarConfig {
    pub fn asset_for(&self, visual: Visual) -> &str {
        match visual {
            Visual::Idle => &self.idle_asset,
            Visual::Talking => &self.talking_asset,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Visual {
    #[default]
    Idle,
    Talking,
}

impl std::fmt::Display for Visual {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Visual::Idle => write!(f, "idle"),
            Visual::Talking => write!(f, "talking"),
        }
    }
}

/// Draws the avatar
#[async_trait]
pub trait AvatarRenderer: Send + Sync {
    /// Whether the animation library is present at all
    fn is_available(&self) -> bool;

    /// Load and start looping `asset` for `visual`
    async fn load(&self, visual: Visual, asset: &str) -> Result<()>;

    /// Replace the animation with a static image
    fn show_fallback(&self, image: &str);
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AvatarState {
    pub current_visual: Visual,
    pub loading: bool,
    /// Visual the in-flight load will show
    pub in_flight: Option<Visual>,
    /// Latest visual requested while a load was in flight
    pub pending_target: Option<Visual>,
    pub initialized: bool,
    pub fallback: bool,
}

impl AvatarState {
    /// The visual the avatar will show once everything settles
    fn effective_target(&self) -> Visual {
        self.pending_target
            .or(self.in_flight)
            .unwrap_or(self.current_visual)
    }
}

#[derive(Clone)]
pub struct AvatarController {
    renderer: Arc<dyn AvatarRenderer>,
    config: AvatarConfig,
    state: Arc<Mutex<AvatarState>>,
}

impl AvatarController {
    pub fn new(renderer: Arc<dyn AvatarRenderer>, config: AvatarConfig) -> Self {
        Self {
            renderer,
            config,
            state: Arc::new(Mutex::new(AvatarState::default())),
        }
    }

    pub fn state(&self) -> AvatarState {
        self.state.lock().clone()
    }

    pub fn is_fallback(&self) -> bool {
        self.state.lock().fallback
    }

    /// Load the idle visual; falls back to the static image on any failure
    pub async fn init(&self) -> bool {
        if !self.renderer.is_available() {
            warn!("Avatar animation library unavailable, using static image");
            self.fall_back();
            return false;
        }

        {
            let mut state = self.state.lock();
            state.loading = true;
            state.in_flight = Some(Visual::Idle);
        }

        match self.load_with_timeout(Visual::Idle).await {
            Ok(()) => {
                info!("Avatar ready");
                let next = {
                    let mut state = self.state.lock();
                    state.initialized = true;
                    state.current_visual = Visual::Idle;
                    self.settle(&mut state)
                };
                if let Some(target) = next {
                    self.begin_load(target);
                }
                true
            }
            Err(e) => {
                warn!("Avatar failed to load: {}", e);
                self.fall_back();
                false
            }
        }
    }

    pub fn start_talking(&self) {
        self.request(Visual::Talking);
    }

    pub fn stop_talking(&self) {
        self.request(Visual::Idle);
    }

    fn request(&self, target: Visual) {
        let start = {
            let mut state = self.state.lock();
            if state.fallback {
                return;
            }
            if state.effective_target() == target {
                debug!("Avatar already heading to {}", target);
                return;
            }

            if state.loading {
                // Latest request wins once the current load settles
                state.pending_target = if state.in_flight == Some(target) {
                    None
                } else {
                    Some(target)
                };
                false
            } else if !state.initialized {
                // Applied once init has shown the idle visual
                state.pending_target = if target == state.current_visual {
                    None
                } else {
                    Some(target)
                };
                false
            } else {
                state.loading = true;
                state.in_flight = Some(target);
                true
            }
        };

        if start {
            self.begin_load(target);
        }
    }

    fn begin_load(&self, target: Visual) {
        let controller = self.clone();
        tokio::spawn(async move {
            let mut target = target;
            loop {
                debug!("Avatar switching to {}", target);
                if let Err(e) = controller.load_with_timeout(target).await {
                    warn!("Avatar switch to {} failed: {}", target, e);
                    controller.fall_back();
                    return;
                }

                let next = {
                    let mut state = controller.state.lock();
                    state.current_visual = target;
                    controller.settle(&mut state)
                };
                match next {
                    Some(pending) => target = pending,
                    None => return,
                }
            }
        });
    }

    /// Finish an in-flight load; returns the next target if one is pending
    fn settle(&self, state: &mut AvatarState) -> Option<Visual> {
        match state.pending_target.take() {
            Some(pending) if pending != state.current_visual => {
                state.in_flight = Some(pending);
                Some(pending)
            }
            _ => {
                state.loading = false;
                state.in_flight = None;
                None
            }
        }
    }

    async fn load_with_timeout(&self, visual: Visual) -> Result<()> {
        let asset = self.config.asset_for(visual).to_string();
        let timeout = Duration::from_millis(self.config.load_timeout_ms);
        match tokio::time::timeout(timeout, self.renderer.load(visual, &asset)).await {
            Ok(result) => result,
            Err(_) => Err(ConciergeError::AvatarLoad(format!(
                "{} did not load within {}ms",
                asset, self.config.load_timeout_ms
            ))),
        }
    }

    fn fall_back(&self) {
        {
            let mut state = self.state.lock();
            state.fallback = true;
            state.loading = false;
            state.in_flight = None;
            state.pending_target = None;
            state.current_visual = Visual::Idle;
        }
        self.renderer.show_fallback(&self.config.fallback_image);
    }
}
