//! HTTP/2 connection-level accounting: the settings sent in the client
//! preface and the window-update/GOAWAY bookkeeping that follows from
//! them. No frame parsing or HPACK lives here — the surrounding codec
//! is an external collaborator (§1 Non-goals); this module only tracks
//! the counters the pool needs to decide when to emit control frames.

use std::collections::HashMap;

pub const DEFAULT_WINDOW_SIZE: u32 = 65_535;
pub const DEFAULT_MAX_HEADER_LIST_SIZE: u32 = 8_192;

#[derive(Clone, Copy, Debug)]
pub struct Http2Settings {
    pub initial_stream_window_size: u32,
    pub initial_connection_window_size: u32,
    pub max_frame_size: u32,
    pub max_header_list_size: u32,
}

impl Default for Http2Settings {
    fn default() -> Http2Settings {
        Http2Settings {
            initial_stream_window_size: DEFAULT_WINDOW_SIZE,
            initial_connection_window_size: DEFAULT_WINDOW_SIZE,
            max_frame_size: 16_384,
            max_header_list_size: DEFAULT_MAX_HEADER_LIST_SIZE,
        }
    }
}

/// A `WINDOW_UPDATE` frame the connection must emit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WindowUpdate {
    /// `0` identifies the connection-level window.
    pub stream_id: u32,
    pub increment: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GoAwayReason {
    FrameSizeError,
}

/// Per-connection HTTP/2 state: the preface settings plus consumed-byte
/// counters for the connection window and each open stream.
pub struct Http2State {
    settings: Http2Settings,
    connection_consumed: u32,
    connection_window_updates_sent: u32,
    stream_consumed: HashMap<u32, u32>,
    goaway_sent: bool,
}

impl Http2State {
    pub fn new(settings: Http2Settings) -> Http2State {
        Http2State {
            settings: settings,
            connection_consumed: 0,
            connection_window_updates_sent: 0,
            stream_consumed: HashMap::new(),
            goaway_sent: false,
        }
    }

    pub fn settings(&self) -> &Http2Settings {
        &self.settings
    }

    /// The `WINDOW_UPDATE` frame for the client preface, if the
    /// configured connection window is larger than the protocol
    /// default (stream 0, per the preface-time rule in §4.5).
    pub fn preface_connection_window_update(&self) -> Option<WindowUpdate> {
        if self.settings.initial_connection_window_size > DEFAULT_WINDOW_SIZE {
            Some(WindowUpdate {
                stream_id: 0,
                increment: self.settings.initial_connection_window_size - DEFAULT_WINDOW_SIZE,
            })
        } else {
            None
        }
    }

    /// Records `len` bytes of DATA received on `stream_id`, returning
    /// any `WINDOW_UPDATE`s now due (stream- and/or connection-level,
    /// each emitted once per half-window consumed).
    pub fn on_data_received(&mut self, stream_id: u32, len: u32) -> Vec<WindowUpdate> {
        let mut updates = Vec::new();

        let stream_half = self.settings.initial_stream_window_size / 2;
        let consumed = self.stream_consumed.entry(stream_id).or_insert(0);
        *consumed += len;
        while *consumed >= stream_half && stream_half > 0 {
            updates.push(WindowUpdate {
                stream_id: stream_id,
                increment: stream_half,
            });
            *consumed -= stream_half;
        }

        let conn_half = self.settings.initial_connection_window_size / 2;
        self.connection_consumed += len;
        while self.connection_consumed >= conn_half && conn_half > 0 {
            self.connection_window_updates_sent += 1;
            updates.push(WindowUpdate {
                stream_id: 0,
                increment: conn_half,
            });
            self.connection_consumed -= conn_half;
        }

        updates
    }

    /// A frame of `len` bytes arrived from the peer. `Some` if it
    /// exceeds the negotiated `MAX_FRAME_SIZE`, in which case the
    /// connection must GOAWAY and disconnect.
    pub fn on_frame_received(&mut self, len: u32) -> Option<GoAwayReason> {
        if self.goaway_sent {
            return None;
        }
        if len > self.settings.max_frame_size {
            self.goaway_sent = true;
            Some(GoAwayReason::FrameSizeError)
        } else {
            None
        }
    }

    pub fn remove_stream(&mut self, stream_id: u32) {
        self.stream_consumed.remove(&stream_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preface_emits_connection_window_update_above_default() {
        let settings = Http2Settings {
            initial_stream_window_size: 96 * 1024,
            initial_connection_window_size: 128 * 1024,
            ..Http2Settings::default()
        };
        let state = Http2State::new(settings);
        let update = state.preface_connection_window_update().unwrap();
        assert_eq!(update.stream_id, 0);
        assert_eq!(update.increment, 128 * 1024 - DEFAULT_WINDOW_SIZE);
    }

    #[test]
    fn half_window_consumption_emits_stream_and_connection_updates() {
        let settings = Http2Settings {
            initial_stream_window_size: 96 * 1024,
            initial_connection_window_size: 128 * 1024,
            ..Http2Settings::default()
        };
        let mut state = Http2State::new(settings);
        let updates = state.on_data_received(3, 96 * 1024 / 2);
        assert!(updates.contains(&WindowUpdate {
            stream_id: 3,
            increment: 0xC000,
        }));

        let updates = state.on_data_received(3, 128 * 1024 / 2 - 96 * 1024 / 2);
        assert!(updates.contains(&WindowUpdate {
            stream_id: 0,
            increment: 0x10000,
        }));
    }

    #[test]
    fn oversized_frame_triggers_goaway() {
        let settings = Http2Settings {
            max_frame_size: 32_768,
            ..Http2Settings::default()
        };
        let mut state = Http2State::new(settings);
        assert_eq!(state.on_frame_received(32_769), Some(GoAwayReason::FrameSizeError));
        // Already torn down; a second oversized frame is not re-reported.
        assert_eq!(state.on_frame_received(32_769), None);
    }
}
