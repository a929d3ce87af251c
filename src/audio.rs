//! The audio engine boundary.
//!
//! The interpreter never renders sound. Music natives issue abstract calls
//! through [`AudioEngine`]; what happens on the other side (scsynth over OSC,
//! a WASM build, nothing at all) is the host's business.
//!
//! [`OfflineEngine`] is the engine used when no audio backend is attached. It
//! allocates node ids, tracks the tempo, and records the SuperCollider
//! commands it would have sent so hosts and tests can inspect them.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// Tempo used until a host or a program sets one.
pub const DEFAULT_BPM: f64 = 120.0;

/// First node id handed out by [`OfflineEngine`].
pub const FIRST_NODE_ID: i64 = 1000;

/// Positional argument of a raw engine message.
#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Number(f64),
    String(String),
}

impl fmt::Display for OscArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OscArg::Number(n) => write!(f, "{}", n),
            OscArg::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for OscArg {
    fn from(n: f64) -> Self {
        OscArg::Number(n)
    }
}

impl From<&str> for OscArg {
    fn from(s: &str) -> Self {
        OscArg::String(s.to_string())
    }
}

/// Calls the interpreter makes into the audio collaborator. All calls are
/// fire-and-forget: they return immediately and completion is invisible to
/// the language.
pub trait AudioEngine {
    /// Starts a synth and returns its node id.
    fn trigger_synth(&mut self, name: &str, params: &BTreeMap<String, f64>) -> i64;
    fn free_synth(&mut self, node_id: i64);
    fn set_synth_param(&mut self, node_id: i64, param: &str, value: f64);
    fn send_raw(&mut self, address: &str, args: &[OscArg]);
    fn current_bpm(&self) -> f64;
    fn set_current_bpm(&mut self, bpm: f64);
}

/// Engine handle shared between the host and the interpreter.
pub type SharedEngine = Rc<RefCell<dyn AudioEngine>>;

/// A message as it would go over the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscArg>,
}

impl fmt::Display for OscMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct OfflineEngine {
    next_node_id: i64,
    bpm: f64,
    sent: Vec<OscMessage>,
}

impl Default for OfflineEngine {
    fn default() -> Self {
        OfflineEngine {
            next_node_id: FIRST_NODE_ID,
            bpm: DEFAULT_BPM,
            sent: Vec::new(),
        }
    }
}

impl OfflineEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bpm(bpm: f64) -> Self {
        OfflineEngine {
            bpm,
            ..Self::default()
        }
    }

    /// Wraps the engine for handing to a `Runtime` while keeping access to it.
    pub fn shared() -> Rc<RefCell<OfflineEngine>> {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Messages recorded so far, oldest first.
    pub fn messages(&self) -> &[OscMessage] {
        &self.sent
    }

    pub fn take_messages(&mut self) -> Vec<OscMessage> {
        std::mem::take(&mut self.sent)
    }

    fn record(&mut self, address: &str, args: Vec<OscArg>) {
        let message = OscMessage {
            address: address.to_string(),
            args,
        };
        debug!(%message, "offline engine");
        self.sent.push(message);
    }
}

impl AudioEngine for OfflineEngine {
    fn trigger_synth(&mut self, name: &str, params: &BTreeMap<String, f64>) -> i64 {
        let node_id = self.next_node_id;
        self.next_node_id += 1;

        // /s_new name id addAction target k1 v1 ...
        let mut args = vec![name.into(), OscArg::Number(node_id as f64), 0.0.into(), 0.0.into()];
        for (key, value) in params {
            args.push(key.as_str().into());
            args.push((*value).into());
        }
        self.record("/s_new", args);
        node_id
    }

    fn free_synth(&mut self, node_id: i64) {
        self.record("/n_free", vec![OscArg::Number(node_id as f64)]);
    }

    fn set_synth_param(&mut self, node_id: i64, param: &str, value: f64) {
        self.record(
            "/n_set",
            vec![OscArg::Number(node_id as f64), param.into(), value.into()],
        );
    }

    fn send_raw(&mut self, address: &str, args: &[OscArg]) {
        self.record(address, args.to_vec());
    }

    fn current_bpm(&self) -> f64 {
        self.bpm
    }

    fn set_current_bpm(&mut self, bpm: f64) {
        debug!(bpm, "tempo changed");
        self.bpm = bpm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_ids_are_sequential() {
        let mut engine = OfflineEngine::new();
        let params = BTreeMap::new();
        assert_eq!(engine.trigger_synth("sonic-pi-beep", &params), 1000);
        assert_eq!(engine.trigger_synth("sonic-pi-beep", &params), 1001);
    }

    #[test]
    fn test_trigger_records_s_new() {
        let mut engine = OfflineEngine::new();
        let mut params = BTreeMap::new();
        params.insert("note".to_string(), 60.0);
        params.insert("amp".to_string(), 0.5);
        engine.trigger_synth("sonic-pi-saw", &params);

        assert_eq!(
            engine.messages()[0].to_string(),
            "/s_new sonic-pi-saw 1000 0 0 amp 0.5 note 60"
        );
    }

    #[test]
    fn test_free_and_set_param() {
        let mut engine = OfflineEngine::new();
        engine.set_synth_param(1000, "cutoff", 80.0);
        engine.free_synth(1000);

        let sent: Vec<String> = engine.take_messages().iter().map(|m| m.to_string()).collect();
        assert_eq!(sent, vec!["/n_set 1000 cutoff 80", "/n_free 1000"]);
        assert!(engine.messages().is_empty());
    }

    #[test]
    fn test_bpm() {
        let mut engine = OfflineEngine::new();
        assert_eq!(engine.current_bpm(), DEFAULT_BPM);
        engine.set_current_bpm(90.0);
        assert_eq!(engine.current_bpm(), 90.0);
        assert_eq!(OfflineEngine::with_bpm(140.0).current_bpm(), 140.0);
    }
}
