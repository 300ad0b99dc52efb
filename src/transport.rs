use crate::config::Settings;
use crate::error::TransportError;
use crate::fade::{FadeOutcome, Fader, VolumeControl};
use async_trait::async_trait;
use log::{debug, info};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::time::Duration;

#[async_trait(?Send)]
pub trait PlaybackTransport {
    async fn transition(&self, url: &str, volume: f32) -> Result<(), TransportError>;
    async fn hard_cut(&self, url: &str, volume: f32) -> Result<(), TransportError>;
    async fn fade_out_and_pause(&self) -> Result<(), TransportError>;
    async fn resume_fade_in(&self, volume: f32) -> Result<(), TransportError>;

    async fn restart_current(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn load_silently(&self, _url: &str) -> Result<(), TransportError> {
        Ok(())
    }

    fn set_volume(&self, _volume: f32) {}

    fn preload(&self, _url: &str) {}
}

#[derive(Debug, Default)]
pub struct NullTransport;

#[async_trait(?Send)]
impl PlaybackTransport for NullTransport {
    async fn transition(&self, _url: &str, _volume: f32) -> Result<(), TransportError> {
        Ok(())
    }

    async fn hard_cut(&self, _url: &str, _volume: f32) -> Result<(), TransportError> {
        Ok(())
    }

    async fn fade_out_and_pause(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn resume_fade_in(&self, _volume: f32) -> Result<(), TransportError> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct SimulatedTransport {
    fader: Fader,
    level: Cell<f32>,
    paused: Cell<bool>,
    current: RefCell<Option<String>>,
    preloaded: RefCell<Option<String>>,
    unplayable: RefCell<HashSet<String>>,
    fade: Duration,
    crossfade: Duration,
}

impl SimulatedTransport {
    pub fn new(settings: &Settings) -> Self {
        Self {
            fader: Fader::new(Duration::from_millis(settings.fade_step_ms)),
            level: Cell::new(0.0),
            paused: Cell::new(true),
            current: RefCell::new(None),
            preloaded: RefCell::new(None),
            unplayable: RefCell::new(HashSet::new()),
            fade: Duration::from_millis(settings.fade_ms),
            crossfade: Duration::from_millis(settings.crossfade_ms),
        }
    }

    pub fn mark_unplayable(&self, url: impl Into<String>) {
        self.unplayable.borrow_mut().insert(url.into());
    }

    pub fn current_url(&self) -> Option<String> {
        self.current.borrow().clone()
    }

    pub fn preloaded_url(&self) -> Option<String> {
        self.preloaded.borrow().clone()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.get()
    }

    fn load(&self, url: &str) -> Result<(), TransportError> {
        if self.unplayable.borrow().contains(url) {
            return Err(TransportError::Transition {
                url: url.to_string(),
                reason: String::from("source could not be decoded"),
            });
        }
        self.current.replace(Some(url.to_string()));
        let mut preloaded = self.preloaded.borrow_mut();
        if preloaded.as_deref() == Some(url) {
            *preloaded = None;
        }
        Ok(())
    }
}

impl VolumeControl for SimulatedTransport {
    fn level(&self) -> f32 {
        self.level.get()
    }

    fn set_level(&self, level: f32) {
        self.level.set(level);
    }
}

#[async_trait(?Send)]
impl PlaybackTransport for SimulatedTransport {
    async fn transition(&self, url: &str, volume: f32) -> Result<(), TransportError> {
        let audible = !self.paused.get() && self.current.borrow().is_some();
        if audible {
            let half = self.crossfade / 2;
            if self.fader.ramp(self, 0.0, half).await == FadeOutcome::Superseded {
                debug!("fade-out before {url} was superseded");
            }
            self.load(url)?;
            self.fader.ramp(self, volume, half).await;
        } else {
            self.load(url)?;
            self.level.set(0.0);
            self.paused.set(false);
            self.fader.ramp(self, volume, self.fade).await;
        }
        self.paused.set(false);
        info!("now playing {url}");
        Ok(())
    }

    async fn hard_cut(&self, url: &str, volume: f32) -> Result<(), TransportError> {
        self.fader.cancel();
        self.load(url)?;
        self.level.set(volume.clamp(0.0, 1.0));
        self.paused.set(false);
        info!("cut to {url}");
        Ok(())
    }

    async fn fade_out_and_pause(&self) -> Result<(), TransportError> {
        self.fader.ramp(self, 0.0, self.fade).await;
        self.paused.set(true);
        Ok(())
    }

    async fn resume_fade_in(&self, volume: f32) -> Result<(), TransportError> {
        if self.current.borrow().is_none() {
            return Err(TransportError::Unavailable);
        }
        self.paused.set(false);
        self.fader.ramp(self, volume, self.fade).await;
        Ok(())
    }

    async fn restart_current(&self) -> Result<(), TransportError> {
        match self.current.borrow().as_deref() {
            Some(url) => {
                debug!("restarting {url}");
                Ok(())
            }
            None => Err(TransportError::Unavailable),
        }
    }

    async fn load_silently(&self, url: &str) -> Result<(), TransportError> {
        self.fader.cancel();
        self.load(url)?;
        self.level.set(0.0);
        self.paused.set(true);
        Ok(())
    }

    fn set_volume(&self, volume: f32) {
        self.fader.cancel();
        if !self.paused.get() {
            self.level.set(volume.clamp(0.0, 1.0));
        }
    }

    fn preload(&self, url: &str) {
        self.preloaded.replace(Some(url.to_string()));
    }
}
