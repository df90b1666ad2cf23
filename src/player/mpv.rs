// src/player/mpv.rs

//! mpv driven over its JSON IPC socket.
//!
//! mpv is spawned with `--input-ipc-server`, then asked to observe `pause`
//! and `speed` and to forward the UP/DOWN keys as script messages. Incoming
//! lines are either replies (carrying our `request_id`) or events; events that
//! arrive while we wait for a reply are queued and handed out later in order.

use log::{debug, info, warn};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::process::{Child, Command};
use crate::error::{HandyError, Result};
use super::controller::{PlayerEvent, PlayerEvents, PlayerQuery};

const STOP_MESSAGE: &str = "handy-stop";
const PLAY_MESSAGE: &str = "handy-play";
const CONNECT_ATTEMPTS: u32 = 60;

pub struct MpvPlayer {
    child: Child,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    socket_path: PathBuf,
    next_id: i64,
    queued: VecDeque<PlayerEvent>,
}

impl MpvPlayer {
    /// Starts mpv on `video` and wires up observers and key bindings.
    pub async fn launch(mpv_path: &str, video: &Path) -> Result<Self> {
        let socket_path = std::env::temp_dir().join(format!("handy-sync-mpv-{}.sock", std::process::id()));
        let _ = tokio::fs::remove_file(&socket_path).await;

        info!("Launching {} on {}", mpv_path, video.display());
        let mut child = Command::new(mpv_path)
            .arg(format!("--input-ipc-server={}", socket_path.display()))
            .arg("--force-window=yes")
            .arg("--input-default-bindings=yes")
            .arg("--input-vo-keyboard=yes")
            .arg("--osc=yes")
            .arg(video)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HandyError::Player(format!("failed to launch {}: {}", mpv_path, e)))?;

        let stream = connect(&socket_path, &mut child).await?;
        let (read_half, writer) = stream.into_split();

        let mut player = Self {
            child,
            reader: BufReader::new(read_half),
            writer,
            socket_path,
            next_id: 1,
            queued: VecDeque::new(),
        };

        for property in [(1, "pause"), (2, "speed")] {
            let reply = player.request(json!(["observe_property", property.0, property.1])).await?;
            if let Some(err) = reply_error(&reply) {
                player.close().await;
                return Err(HandyError::Player(format!("couldn't observe {}: {}", property.1, err)));
            }
        }

        // Manual control is optional; an mpv without `keybind` still plays.
        for (key, message) in [("UP", STOP_MESSAGE), ("DOWN", PLAY_MESSAGE)] {
            let reply = player
                .request(json!(["keybind", key, format!("script-message {}", message)]))
                .await?;
            if let Some(err) = reply_error(&reply) {
                warn!("Couldn't bind {} to {}: {}", key, message, err);
            }
        }

        Ok(player)
    }

    async fn send_line(&mut self, message: &Value) -> Result<()> {
        let mut line = message.to_string();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Reads one JSON line; `None` means mpv closed the socket.
    async fn read_message(&mut self) -> Result<Option<Value>> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line).await? == 0 {
                return Ok(None);
            }
            match serde_json::from_str(&line) {
                Ok(v) => return Ok(Some(v)),
                Err(_) => debug!("Skipping non-JSON IPC line: {}", line.trim()),
            }
        }
    }

    /// Sends a command and waits for its reply, queueing any events seen meanwhile.
    async fn request(&mut self, command: Value) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;
        self.send_line(&json!({ "command": command, "request_id": id })).await?;

        loop {
            let message = self
                .read_message()
                .await?
                .ok_or_else(|| HandyError::Player("mpv IPC closed".to_string()))?;

            if message.get("request_id").and_then(Value::as_i64) == Some(id) {
                return Ok(message);
            }
            if let Some(event) = translate_event(&message) {
                self.queued.push_back(event);
            }
        }
    }

    /// Asks mpv to quit and reaps the process.
    pub async fn close(mut self) {
        if self.child.try_wait().ok().flatten().is_none() {
            let _ = self.send_line(&json!({ "command": ["quit"] })).await;
            match tokio::time::timeout(Duration::from_secs(2), self.child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    warn!("mpv did not exit, killing it");
                    let _ = self.child.kill().await;
                }
            }
        }
        let _ = tokio::fs::remove_file(&self.socket_path).await;
    }
}

async fn connect(socket_path: &Path, child: &mut Child) -> Result<UnixStream> {
    for _ in 0..CONNECT_ATTEMPTS {
        tokio::time::sleep(Duration::from_millis(100)).await;
        match UnixStream::connect(socket_path).await {
            Ok(stream) => {
                info!("mpv IPC connected");
                return Ok(stream);
            }
            Err(_) => {
                if let Ok(Some(status)) = child.try_wait() {
                    return Err(HandyError::Player(format!(
                        "mpv exited before IPC connected (status={})",
                        status
                    )));
                }
            }
        }
    }
    let _ = child.kill().await;
    Err(HandyError::Player(format!(
        "timed out connecting to mpv IPC at {}",
        socket_path.display()
    )))
}

/// The error string of a failed command reply, `None` on success.
pub fn reply_error(reply: &Value) -> Option<String> {
    match reply.get("error").and_then(Value::as_str) {
        Some("success") => None,
        Some(err) => Some(err.to_string()),
        None => Some("reply without status".to_string()),
    }
}

/// Maps an mpv event object to a transport event; irrelevant events are `None`.
pub fn translate_event(message: &Value) -> Option<PlayerEvent> {
    match message.get("event")?.as_str()? {
        "playback-restart" => Some(PlayerEvent::Restart),
        "end-file" | "shutdown" => Some(PlayerEvent::Quit),
        "property-change" => {
            let data = message.get("data")?;
            match message.get("name")?.as_str()? {
                "pause" => data.as_bool().map(PlayerEvent::PauseChanged),
                "speed" => data.as_f64().map(PlayerEvent::SpeedChanged),
                _ => None,
            }
        }
        "client-message" => match message.get("args")?.get(0)?.as_str()? {
            STOP_MESSAGE => Some(PlayerEvent::ManualStop),
            PLAY_MESSAGE => Some(PlayerEvent::ManualPlay),
            _ => None,
        },
        _ => None,
    }
}

impl PlayerEvents for MpvPlayer {
    async fn next_event(&mut self) -> Result<PlayerEvent> {
        if let Some(event) = self.queued.pop_front() {
            return Ok(event);
        }
        loop {
            let Some(message) = self.read_message().await? else {
                return Ok(PlayerEvent::Quit);
            };
            if let Some(event) = translate_event(&message) {
                return Ok(event);
            }
        }
    }
}

impl PlayerQuery for MpvPlayer {
    async fn playback_time(&mut self) -> Result<Option<f64>> {
        let reply = self.request(json!(["get_property", "playback-time"])).await?;
        if reply_error(&reply).is_some() {
            // "property unavailable" before the file is loaded
            return Ok(None);
        }
        Ok(reply.get("data").and_then(Value::as_f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_events_are_recognised() {
        assert_eq!(translate_event(&json!({"event": "playback-restart"})), Some(PlayerEvent::Restart));
        assert_eq!(translate_event(&json!({"event": "end-file", "reason": "quit"})), Some(PlayerEvent::Quit));
        assert_eq!(translate_event(&json!({"event": "shutdown"})), Some(PlayerEvent::Quit));
    }

    #[test]
    fn observed_properties_become_events() {
        assert_eq!(
            translate_event(&json!({"event": "property-change", "id": 1, "name": "pause", "data": true})),
            Some(PlayerEvent::PauseChanged(true))
        );
        assert_eq!(
            translate_event(&json!({"event": "property-change", "id": 2, "name": "speed", "data": 1.25})),
            Some(PlayerEvent::SpeedChanged(1.25))
        );
        assert_eq!(
            translate_event(&json!({"event": "property-change", "id": 2, "name": "speed"})),
            None
        );
        assert_eq!(
            translate_event(&json!({"event": "property-change", "name": "volume", "data": 50})),
            None
        );
    }

    #[test]
    fn key_messages_map_to_manual_overrides() {
        assert_eq!(
            translate_event(&json!({"event": "client-message", "args": ["handy-stop"]})),
            Some(PlayerEvent::ManualStop)
        );
        assert_eq!(
            translate_event(&json!({"event": "client-message", "args": ["handy-play"]})),
            Some(PlayerEvent::ManualPlay)
        );
        assert_eq!(translate_event(&json!({"event": "client-message", "args": ["other"]})), None);
    }

    #[test]
    fn failed_replies_are_detected() {
        assert_eq!(reply_error(&json!({"request_id": 1, "error": "success", "data": null})), None);
        assert_eq!(
            reply_error(&json!({"request_id": 2, "error": "invalid parameter"})),
            Some("invalid parameter".to_string())
        );
        assert_eq!(
            reply_error(&json!({"request_id": 3, "data": 1})),
            Some("reply without status".to_string())
        );
    }

    #[test]
    fn replies_are_not_events() {
        assert_eq!(translate_event(&json!({"request_id": 3, "error": "success", "data": 1.0})), None);
        assert_eq!(translate_event(&json!({"event": "seek"})), None);
    }
}
