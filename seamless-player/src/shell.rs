//! Line-oriented command shell
//!
//! Stands in for a graphical front end: parses one command per line and
//! drives the engine. Tracks are addressed by their 1-based position in the
//! track list or by a prefix of their id.

use crate::audio::AudioOutput;
use crate::playback::Engine;
use seamless_common::events::EngineEvent;
use seamless_common::track::{TrackId, TrackSnapshot};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const HELP: &str = "\
Commands:
  add <path> [name]             add a track
  remove|play|pause|stop|toggle <track>
  volume <track> <0-1>          set volume
  fade <track> <0-1> [secs]     fade volume
  seek <track> <secs>           jump to position
  loop <track> on|off           enable or disable the loop
  loop-start <track> [secs]     set loop start (current position if omitted)
  loop-end <track> [secs]       set loop end (current position if omitted)
  notes <track> <text>          replace the track notes
  focus <track> [secs]          fade one track in and the rest out
  play-all | pause-all | stop-all
  fade-all <0-1> [secs] | fade-in | fade-out
  master <0-1>                  master volume
  devices                       list output devices
  list | clear | help | quit
<track> is a list number (1, 2, ...) or the start of a track id.";

/// Shell input errors
#[derive(Error, Debug, PartialEq)]
pub enum ShellError {
    #[error("Unknown command '{0}' (try 'help')")]
    UnknownCommand(String),

    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("Not a number: '{0}'")]
    InvalidNumber(String),

    #[error("Expected 'on' or 'off', got '{0}'")]
    InvalidSwitch(String),

    #[error("No track matches '{0}'")]
    UnknownTrack(String),

    #[error("'{0}' matches more than one track")]
    AmbiguousTrack(String),

    #[error("Engine error: {0}")]
    Engine(String),
}

/// How a command names a track
#[derive(Debug, Clone, PartialEq)]
pub enum TrackRef {
    /// 1-based list position; also tried as an id prefix when out of range
    Index(usize),
    /// Leading characters of the track id
    IdPrefix(String),
}

impl TrackRef {
    fn parse(token: &str) -> Self {
        match token.parse::<usize>() {
            // "0482" keeps its leading zero as an id prefix
            Ok(index) if index.to_string() == token => TrackRef::Index(index),
            _ => TrackRef::IdPrefix(token.to_ascii_lowercase()),
        }
    }

    /// Find the track this reference names in `tracks`.
    pub fn resolve(&self, tracks: &[TrackSnapshot]) -> Result<TrackId, ShellError> {
        match self {
            TrackRef::Index(index) => match index.checked_sub(1).and_then(|i| tracks.get(i)) {
                Some(track) => Ok(track.track.id),
                None => resolve_prefix(&index.to_string(), tracks),
            },
            TrackRef::IdPrefix(prefix) => resolve_prefix(prefix, tracks),
        }
    }
}

fn resolve_prefix(prefix: &str, tracks: &[TrackSnapshot]) -> Result<TrackId, ShellError> {
    let mut matches = tracks
        .iter()
        .filter(|t| t.track.id.to_string().starts_with(prefix));
    match (matches.next(), matches.next()) {
        (Some(track), None) => Ok(track.track.id),
        (Some(_), Some(_)) => Err(ShellError::AmbiguousTrack(prefix.to_string())),
        (None, _) => Err(ShellError::UnknownTrack(prefix.to_string())),
    }
}

/// One parsed shell command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add { path: PathBuf, name: Option<String> },
    Remove(TrackRef),
    Play(TrackRef),
    Pause(TrackRef),
    Stop(TrackRef),
    Toggle(TrackRef),
    Volume(TrackRef, f32),
    Fade { track: TrackRef, target: f32, secs: Option<f64> },
    Seek(TrackRef, f64),
    Loop(TrackRef, bool),
    LoopStart(TrackRef, Option<f64>),
    LoopEnd(TrackRef, Option<f64>),
    Notes(TrackRef, String),
    Focus(TrackRef, Option<f64>),
    PlayAll,
    PauseAll,
    StopAll,
    FadeAll { target: f32, secs: Option<f64> },
    FadeIn,
    FadeOut,
    Master(f32),
    Devices,
    List,
    Clear,
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, ShellError> {
        let line = line.trim();
        let Some((word, rest)) = split_word(line) else {
            return Ok(None);
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "add" => {
                let (path, name) =
                    split_word(rest).ok_or(ShellError::MissingArgument("path"))?;
                let name = (!name.is_empty()).then(|| name.to_string());
                Command::Add {
                    path: PathBuf::from(path),
                    name,
                }
            }
            "remove" | "rm" => Command::Remove(track_arg(rest)?.0),
            "play" => Command::Play(track_arg(rest)?.0),
            "pause" => Command::Pause(track_arg(rest)?.0),
            "stop" => Command::Stop(track_arg(rest)?.0),
            "toggle" => Command::Toggle(track_arg(rest)?.0),
            "volume" | "vol" => {
                let (track, rest) = track_arg(rest)?;
                Command::Volume(track, number(rest, "volume")?)
            }
            "fade" => {
                let (track, rest) = track_arg(rest)?;
                let (target, rest) =
                    split_word(rest).ok_or(ShellError::MissingArgument("target"))?;
                Command::Fade {
                    track,
                    target: parse_number(target)?,
                    secs: optional_number(rest)?,
                }
            }
            "seek" => {
                let (track, rest) = track_arg(rest)?;
                Command::Seek(track, number(rest, "seconds")?)
            }
            "loop" => {
                let (track, rest) = track_arg(rest)?;
                let switch = match rest.trim().to_ascii_lowercase().as_str() {
                    "on" | "true" | "1" => true,
                    "off" | "false" | "0" => false,
                    "" => return Err(ShellError::MissingArgument("on|off")),
                    other => return Err(ShellError::InvalidSwitch(other.to_string())),
                };
                Command::Loop(track, switch)
            }
            "loop-start" => {
                let (track, rest) = track_arg(rest)?;
                Command::LoopStart(track, optional_number(rest)?)
            }
            "loop-end" => {
                let (track, rest) = track_arg(rest)?;
                Command::LoopEnd(track, optional_number(rest)?)
            }
            "notes" => {
                let (track, rest) = track_arg(rest)?;
                Command::Notes(track, rest.trim().to_string())
            }
            "focus" => {
                let (track, rest) = track_arg(rest)?;
                Command::Focus(track, optional_number(rest)?)
            }
            "play-all" => Command::PlayAll,
            "pause-all" => Command::PauseAll,
            "stop-all" => Command::StopAll,
            "fade-all" => {
                let (target, rest) =
                    split_word(rest).ok_or(ShellError::MissingArgument("target"))?;
                Command::FadeAll {
                    target: parse_number(target)?,
                    secs: optional_number(rest)?,
                }
            }
            "fade-in" => Command::FadeIn,
            "fade-out" => Command::FadeOut,
            "master" => Command::Master(number(rest, "volume")?),
            "devices" => Command::Devices,
            "list" | "ls" => Command::List,
            "clear" => Command::Clear,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(ShellError::UnknownCommand(other.to_string())),
        };
        Ok(Some(command))
    }
}

fn split_word(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    if text.is_empty() {
        return None;
    }
    match text.find(char::is_whitespace) {
        Some(end) => Some((&text[..end], text[end..].trim_start())),
        None => Some((text, "")),
    }
}

fn track_arg(rest: &str) -> Result<(TrackRef, &str), ShellError> {
    let (token, rest) = split_word(rest).ok_or(ShellError::MissingArgument("track"))?;
    Ok((TrackRef::parse(token), rest))
}

fn parse_number<T: std::str::FromStr>(token: &str) -> Result<T, ShellError> {
    token
        .parse()
        .map_err(|_| ShellError::InvalidNumber(token.to_string()))
}

fn number<T: std::str::FromStr>(rest: &str, what: &'static str) -> Result<T, ShellError> {
    let (token, _) = split_word(rest).ok_or(ShellError::MissingArgument(what))?;
    parse_number(token)
}

fn optional_number(rest: &str) -> Result<Option<f64>, ShellError> {
    split_word(rest)
        .map(|(token, _)| parse_number(token))
        .transpose()
}

/// Result of executing a command
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Nothing to print
    Done,
    Text(String),
    Quit,
}

/// Track list kept fresh by engine events
#[derive(Clone, Default)]
pub struct SnapshotCache {
    tracks: Arc<RwLock<Vec<TrackSnapshot>>>,
}

impl SnapshotCache {
    pub async fn get(&self) -> Vec<TrackSnapshot> {
        self.tracks.read().await.clone()
    }

    pub async fn refresh(&self, engine: &Engine) {
        *self.tracks.write().await = engine.list_tracks();
    }

    /// Re-read the track list on every `StateChanged`; log degraded tracks.
    pub fn spawn_refresher(&self, engine: Arc<Engine>) -> JoinHandle<()> {
        let cache = self.clone();
        let mut events = engine.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(EngineEvent::StateChanged) => cache.refresh(&engine).await,
                    Ok(EngineEvent::TrackDegraded { track_id, reason }) => {
                        warn!("Track {} is unavailable: {}", track_id, reason);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Snapshot cache skipped {} events", skipped);
                        cache.refresh(&engine).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

/// Executes parsed commands against an engine
pub struct Shell {
    engine: Arc<Engine>,
    cache: SnapshotCache,
    fade_secs: f64,
    json: bool,
}

impl Shell {
    pub fn new(engine: Arc<Engine>, cache: SnapshotCache, fade_secs: f64, json: bool) -> Self {
        Self {
            engine,
            cache,
            fade_secs,
            json,
        }
    }

    /// Parse and execute one input line.
    pub async fn handle_line(&self, line: &str) -> Result<Reply, ShellError> {
        match Command::parse(line)? {
            Some(command) => self.execute(command).await,
            None => Ok(Reply::Done),
        }
    }

    pub async fn execute(&self, command: Command) -> Result<Reply, ShellError> {
        let engine = &self.engine;

        match command {
            Command::Add { path, name } => {
                let id = engine
                    .add_track(&path, name)
                    .await
                    .map_err(|e| ShellError::Engine(e.to_string()))?;
                let degraded = engine.unit(id).map_or(true, |unit| unit.is_degraded());
                let note = if degraded { " (unavailable)" } else { "" };
                return Ok(Reply::Text(format!("added {}{}", short_id(id), note)));
            }
            Command::Remove(track) => engine.remove_track(self.resolve(&track)?),
            Command::Play(track) => engine.play(self.resolve(&track)?),
            Command::Pause(track) => engine.pause(self.resolve(&track)?),
            Command::Stop(track) => engine.stop(self.resolve(&track)?),
            Command::Toggle(track) => engine.toggle(self.resolve(&track)?),
            Command::Volume(track, volume) => engine.set_volume(self.resolve(&track)?, volume),
            Command::Fade {
                track,
                target,
                secs,
            } => engine.fade_to(
                self.resolve(&track)?,
                target,
                secs.unwrap_or(self.fade_secs),
            ),
            Command::Seek(track, secs) => engine.seek(self.resolve(&track)?, secs),
            Command::Loop(track, active) => engine.set_loop_active(self.resolve(&track)?, active),
            Command::LoopStart(track, secs) => {
                let id = self.resolve(&track)?;
                match secs {
                    Some(secs) => engine.set_loop_start(id, secs),
                    None => engine.mark_loop_start(id),
                }
            }
            Command::LoopEnd(track, secs) => {
                let id = self.resolve(&track)?;
                match secs {
                    Some(secs) => engine.set_loop_end(id, secs),
                    None => engine.mark_loop_end(id),
                }
            }
            Command::Notes(track, text) => engine.set_notes(self.resolve(&track)?, text),
            Command::Focus(track, secs) => engine.focus_track(
                self.resolve(&track)?,
                Some(secs.unwrap_or(self.fade_secs)),
            ),
            Command::PlayAll => engine.play_all(),
            Command::PauseAll => engine.pause_all(),
            Command::StopAll => engine.stop_all(),
            Command::FadeAll { target, secs } => {
                engine.fade_all_to(target, secs.unwrap_or(self.fade_secs))
            }
            Command::FadeIn => engine.fade_all_to(1.0, self.fade_secs),
            Command::FadeOut => engine.fade_all_to(0.0, self.fade_secs),
            Command::Master(volume) => engine.set_master_volume(volume),
            Command::Devices => {
                let devices = AudioOutput::list_devices()
                    .map_err(|e| ShellError::Engine(e.to_string()))?;
                let current = engine.output_device();
                return Ok(Reply::Text(format_device_list(&devices, current.as_deref())));
            }
            Command::List => {
                let tracks = self.cache.get().await;
                return Ok(Reply::Text(self.render_list(&tracks)));
            }
            Command::Clear => engine.clear(),
            Command::Help => return Ok(Reply::Text(HELP.to_string())),
            Command::Quit => return Ok(Reply::Quit),
        }
        Ok(Reply::Done)
    }

    fn resolve(&self, track: &TrackRef) -> Result<TrackId, ShellError> {
        track.resolve(&self.engine.list_tracks())
    }

    fn render_list(&self, tracks: &[TrackSnapshot]) -> String {
        if self.json {
            return serde_json::to_string_pretty(tracks)
                .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e));
        }
        format_track_list(tracks, self.engine.master_volume())
    }
}

/// Human-readable track table
pub fn format_track_list(tracks: &[TrackSnapshot], master: f32) -> String {
    let mut out = format!("master {:.2}, {} track(s)\n", master, tracks.len());
    for (index, snapshot) in tracks.iter().enumerate() {
        let state = &snapshot.state;
        let status = if snapshot.degraded {
            "n/a "
        } else if state.playing {
            "play"
        } else {
            "stop"
        };
        let fading = if state.fading { " ~" } else { "" };
        let looping = if state.loop_region.active {
            format!(
                "  loop {:.1}-{:.1}",
                state.loop_region.start, state.loop_region.end
            )
        } else {
            String::new()
        };
        let _ = writeln!(
            out,
            "{:>2}. [{}] {} {}  vol {:.2}{}  {}{}",
            index + 1,
            status,
            short_id(snapshot.track.id),
            snapshot.track.name,
            state.volume,
            fading,
            snapshot.clock(),
            looping
        );
        if !snapshot.track.notes.is_empty() {
            let _ = writeln!(out, "      {}", snapshot.track.notes);
        }
    }
    out
}

/// One device per line; the device in use is marked with `*`.
pub fn format_device_list(devices: &[String], current: Option<&str>) -> String {
    if devices.is_empty() {
        return "no output devices found".to_string();
    }
    devices
        .iter()
        .map(|name| {
            let marker = if Some(name.as_str()) == current { '*' } else { ' ' };
            format!("{} {}", marker, name)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn short_id(id: TrackId) -> String {
    id.to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use seamless_common::track::{PlaybackState, TrackSource};

    fn snapshot(name: &str) -> TrackSnapshot {
        TrackSnapshot {
            track: TrackSource::new(name, format!("/music/{}.ogg", name)),
            state: PlaybackState::default(),
            degraded: false,
        }
    }

    fn snapshot_with_id(name: &str, id: &str) -> TrackSnapshot {
        let mut snapshot = snapshot(name);
        snapshot.track.id = id.parse().unwrap();
        snapshot
    }

    #[test]
    fn test_parse_transport() {
        assert_eq!(
            Command::parse("play 2").unwrap(),
            Some(Command::Play(TrackRef::Index(2)))
        );
        assert_eq!(
            Command::parse("  TOGGLE ab12 ").unwrap(),
            Some(Command::Toggle(TrackRef::IdPrefix("ab12".to_string())))
        );
        assert_eq!(Command::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(
            Command::parse("volume 1 0.4").unwrap(),
            Some(Command::Volume(TrackRef::Index(1), 0.4))
        );
        assert_eq!(
            Command::parse("fade 1 0 3.5").unwrap(),
            Some(Command::Fade {
                track: TrackRef::Index(1),
                target: 0.0,
                secs: Some(3.5)
            })
        );
        assert_eq!(
            Command::parse("fade-all 1").unwrap(),
            Some(Command::FadeAll { target: 1.0, secs: None })
        );
        assert_eq!(
            Command::parse("volume 1 loud"),
            Err(ShellError::InvalidNumber("loud".to_string()))
        );
        assert_eq!(
            Command::parse("seek 1"),
            Err(ShellError::MissingArgument("seconds"))
        );
    }

    #[test]
    fn test_parse_loop_commands() {
        assert_eq!(
            Command::parse("loop 3 on").unwrap(),
            Some(Command::Loop(TrackRef::Index(3), true))
        );
        assert_eq!(
            Command::parse("loop 3 maybe"),
            Err(ShellError::InvalidSwitch("maybe".to_string()))
        );
        assert_eq!(
            Command::parse("loop-start 3").unwrap(),
            Some(Command::LoopStart(TrackRef::Index(3), None))
        );
        assert_eq!(
            Command::parse("loop-end 3 20").unwrap(),
            Some(Command::LoopEnd(TrackRef::Index(3), Some(20.0)))
        );
    }

    #[test]
    fn test_parse_free_text() {
        assert_eq!(
            Command::parse("add /music/rain.flac Heavy Rain").unwrap(),
            Some(Command::Add {
                path: PathBuf::from("/music/rain.flac"),
                name: Some("Heavy Rain".to_string())
            })
        );
        assert_eq!(
            Command::parse("notes 1 fade in slowly").unwrap(),
            Some(Command::Notes(TrackRef::Index(1), "fade in slowly".to_string()))
        );
        assert_eq!(
            Command::parse("dance"),
            Err(ShellError::UnknownCommand("dance".to_string()))
        );
    }

    #[test]
    fn test_resolve_track_refs() {
        let tracks = vec![
            snapshot_with_id("a", "a1b2c3d4-0000-4000-8000-000000000001"),
            snapshot_with_id("b", "e5f6a7b8-0000-4000-8000-000000000002"),
        ];

        assert_eq!(TrackRef::Index(2).resolve(&tracks), Ok(tracks[1].track.id));
        assert!(TrackRef::Index(0).resolve(&tracks).is_err());
        assert_eq!(
            TrackRef::Index(3).resolve(&tracks),
            Err(ShellError::UnknownTrack("3".to_string()))
        );

        let prefix = tracks[0].track.id.to_string()[..8].to_string();
        assert_eq!(
            TrackRef::IdPrefix(prefix).resolve(&tracks),
            Ok(tracks[0].track.id)
        );
        assert_eq!(
            TrackRef::IdPrefix(String::new()).resolve(&tracks),
            Err(ShellError::AmbiguousTrack(String::new()))
        );
    }

    #[test]
    fn test_numeric_id_prefix_resolves() {
        let tracks = vec![
            snapshot_with_id("a", "48213f00-0000-4000-8000-000000000001"),
            snapshot_with_id("b", "04821c00-0000-4000-8000-000000000002"),
        ];

        let by_digits = Command::parse("play 4821").unwrap();
        assert_eq!(by_digits, Some(Command::Play(TrackRef::Index(4821))));
        assert_eq!(TrackRef::Index(4821).resolve(&tracks), Ok(tracks[0].track.id));

        // In range, so the list position wins
        assert_eq!(TrackRef::Index(1).resolve(&tracks), Ok(tracks[0].track.id));

        assert_eq!(
            Command::parse("play 0482").unwrap(),
            Some(Command::Play(TrackRef::IdPrefix("0482".to_string())))
        );
        assert_eq!(
            TrackRef::IdPrefix("0482".to_string()).resolve(&tracks),
            Ok(tracks[1].track.id)
        );
    }

    #[test]
    fn test_format_device_list() {
        let devices = vec!["Speakers".to_string(), "USB DAC".to_string()];
        assert_eq!(
            format_device_list(&devices, Some("USB DAC")),
            "  Speakers\n* USB DAC"
        );
        assert_eq!(format_device_list(&[], None), "no output devices found");
        assert_eq!(Command::parse("devices").unwrap(), Some(Command::Devices));
    }

    #[test]
    fn test_format_track_list() {
        let mut track = snapshot("rain");
        track.state.duration = 90.0;
        track.state.position = 30.0;
        track.state.playing = true;
        track.track.notes = "intro".to_string();

        let text = format_track_list(&[track], 0.8);
        assert!(text.starts_with("master 0.80, 1 track(s)"));
        assert!(text.contains("[play]"));
        assert!(text.contains("00:30 / 01:30"));
        assert!(text.contains("intro"));
    }
}
