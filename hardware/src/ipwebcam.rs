//! HTTP client for the IP Webcam frame camera.
//!
//! The capture camera is a phone running the IP Webcam app on the bench
//! network. The rig uses three of its endpoints:
//!
//! - `POST /photo_save_only.jpg` - capture a full-resolution photo to phone
//!   storage without streaming it back
//! - `POST /ptz?zoom=N` - set zoom
//! - `POST /settings/focusmode?set=off` - lock focus
//!
//! Every call blocks with a short global deadline. Error classification is
//! what the transport's recovery policy keys on: a deadline miss becomes
//! [`CameraError::Timeout`] (the app is known to wedge briefly and recover
//! after re-priming), a non-2xx answer becomes [`CameraError::Status`] and
//! anything connection-level becomes [`CameraError::Transport`] - both of
//! the latter are non-transient as far as the transport is concerned.

use std::time::Duration;

use shared::rig_config::RigConfig;
use shared::rig_interface::{CameraError, FocusMode, FrameCamera};
use tracing::debug;
use ureq::Agent;

/// Blocking client for one IP Webcam instance.
pub struct IpWebcam {
    agent: Agent,
    base_url: String,
}

impl IpWebcam {
    /// Client for the camera at `base_url` with a per-request deadline.
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: config.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Client for the camera described by the rig config.
    pub fn from_config(config: &RigConfig) -> Self {
        Self::new(&config.camera_base_url, config.camera_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post(&self, path_and_query: &str) -> Result<(), CameraError> {
        let url = format!("{}{}", self.base_url, path_and_query);
        match self.agent.post(&url).send_empty() {
            Ok(response) => {
                debug!("POST {} -> {}", path_and_query, response.status());
                Ok(())
            }
            Err(ureq::Error::StatusCode(code)) => Err(CameraError::Status(code)),
            Err(ureq::Error::Timeout(_)) => Err(CameraError::Timeout),
            Err(ureq::Error::Io(e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                ) =>
            {
                Err(CameraError::Timeout)
            }
            Err(e) => Err(CameraError::Transport(e.to_string())),
        }
    }
}

impl FrameCamera for IpWebcam {
    fn capture(&mut self) -> Result<(), CameraError> {
        self.post("/photo_save_only.jpg")
    }

    fn set_zoom(&mut self, percent: u32) -> Result<(), CameraError> {
        self.post(&format!("/ptz?zoom={percent}"))
    }

    fn set_focus_mode(&mut self, mode: FocusMode) -> Result<(), CameraError> {
        self.post(&format!("/settings/focusmode?set={}", mode.query_value()))
    }
}
