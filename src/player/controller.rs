// src/player/controller.rs

//! Playback controller
//!
//! A two-state machine (`Stopped` / `Playing`) fed by player transport events.
//! Every transition that needs the device issues exactly one `play` or `stop`
//! command. Command failures are logged and dropped: the next transport event
//! re-sends fresh state anyway, and video playback must never be interrupted
//! by the device.

use log::{debug, error, info, warn};
use std::future::Future;
use crate::error::Result;
use crate::handy::api::{DeviceApi, PlayRequest};
use crate::handy::clock_sync::{ClockOffset, LocalClock};

const SEC_TO_MS: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerEvent {
    /// Playback (re)started after load or seek.
    Restart,
    PauseChanged(bool),
    SpeedChanged(f64),
    /// Manual override keys.
    ManualStop,
    ManualPlay,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

#[allow(async_fn_in_trait)]
pub trait PlayerQuery {
    /// Current playback position in seconds, `None` before anything is loaded.
    async fn playback_time(&mut self) -> Result<Option<f64>>;
}

#[allow(async_fn_in_trait)]
pub trait PlayerEvents {
    async fn next_event(&mut self) -> Result<PlayerEvent>;
}

pub struct PlaybackController<'a, D, C> {
    device: &'a D,
    clock: C,
    offset: ClockOffset,
    state: PlaybackState,
    rate: f64,
}

impl<'a, D: DeviceApi, C: LocalClock> PlaybackController<'a, D, C> {
    pub fn new(device: &'a D, clock: C, offset: ClockOffset) -> Self {
        Self {
            device,
            clock,
            offset,
            state: PlaybackState::Stopped,
            rate: 1.0,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Applies one event. Returns `Flow::Quit` when the player is going away.
    pub async fn handle<P: PlayerQuery>(&mut self, event: PlayerEvent, player: &mut P) -> Flow {
        debug!("Player event {:?} in state {:?}", event, self.state);
        match event {
            PlayerEvent::Restart | PlayerEvent::ManualPlay | PlayerEvent::PauseChanged(false) => {
                self.play(player).await;
            }
            PlayerEvent::PauseChanged(true) | PlayerEvent::ManualStop => {
                self.stop().await;
            }
            PlayerEvent::SpeedChanged(rate) => {
                self.rate = rate;
                if self.state == PlaybackState::Playing {
                    self.play(player).await;
                }
            }
            PlayerEvent::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    async fn play<P: PlayerQuery>(&mut self, player: &mut P) {
        let position_s = match player.playback_time().await {
            Ok(t) => t.unwrap_or(0.0),
            Err(e) => {
                error!("Couldn't read playback position: {}", e);
                return;
            }
        };

        let request = PlayRequest {
            estimated_server_time: self.offset.server_time_ms(&self.clock),
            start_time: (position_s * SEC_TO_MS) as i64,
            playback_rate: Some(self.rate),
        };
        self.state = PlaybackState::Playing;

        if let Err(e) = self.device.play(&request).await {
            warn!("Play command failed at {}ms: {}", request.start_time, e);
        }
    }

    async fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
        if let Err(e) = self.device.stop().await {
            warn!("Stop command failed: {}", e);
        }
    }

    /// Final release: always sends `stop`, whatever the current state.
    pub async fn shutdown(mut self) {
        info!("Stopping device");
        self.stop().await;
    }
}

/// Feeds player events into the controller until the player quits, the event
/// stream fails, or `interrupt` resolves. The device is stopped exactly once
/// on every one of those paths.
pub async fn run_until_quit<D, C, P, I>(
    mut controller: PlaybackController<'_, D, C>,
    player: &mut P,
    interrupt: I,
) -> Result<()>
where
    D: DeviceApi,
    C: LocalClock,
    P: PlayerEvents + PlayerQuery,
    I: Future<Output = ()>,
{
    tokio::pin!(interrupt);

    let outcome = loop {
        let next = tokio::select! {
            event = player.next_event() => Some(event),
            _ = &mut interrupt => None,
        };

        match next {
            Some(Ok(event)) => {
                if controller.handle(event, player).await == Flow::Quit {
                    info!("Player quit");
                    break Ok(());
                }
            }
            Some(Err(e)) => {
                error!("Player event stream failed: {}", e);
                break Err(e);
            }
            None => {
                info!("Interrupted");
                break Ok(());
            }
        }
    };

    controller.shutdown().await;
    outcome
}
