//! Music theory tables and the natives that talk to the audio engine.

use crate::audio::OscArg;
use crate::evaluator::{EvalError, EvalResult, Interpreter, check_arity, expect_number};
use crate::source::Span;
use crate::value::{SynthNode, Value, format_number};
use std::collections::BTreeMap;
use tracing::info;

/// Semitone offset of each note name from C.
const NOTE_OFFSETS: [(&str, i64); 17] = [
    ("C", 0),
    ("C#", 1),
    ("Db", 1),
    ("D", 2),
    ("D#", 3),
    ("Eb", 3),
    ("E", 4),
    ("F", 5),
    ("F#", 6),
    ("Gb", 6),
    ("G", 7),
    ("G#", 8),
    ("Ab", 8),
    ("A", 9),
    ("A#", 10),
    ("Bb", 10),
    ("B", 11),
];

const CHORD_PATTERNS: [(&str, &[i64]); 9] = [
    ("maj", &[0, 4, 7]),
    ("min", &[0, 3, 7]),
    ("maj7", &[0, 4, 7, 11]),
    ("min7", &[0, 3, 7, 10]),
    ("dom7", &[0, 4, 7, 10]),
    ("dim", &[0, 3, 6]),
    ("aug", &[0, 4, 8]),
    ("sus2", &[0, 2, 7]),
    ("sus4", &[0, 5, 7]),
];

const SCALE_PATTERNS: [(&str, &[i64]); 5] = [
    ("major", &[0, 2, 4, 5, 7, 9, 11]),
    ("minor", &[0, 2, 3, 5, 7, 8, 10]),
    ("pentatonic", &[0, 2, 4, 7, 9]),
    ("blues", &[0, 3, 5, 6, 7, 10]),
    ("chromatic", &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]),
];

fn lookup<T: Copy>(table: &[(&str, T)], name: &str) -> Option<T> {
    table
        .iter()
        .find(|(entry, _)| *entry == name)
        .map(|(_, value)| *value)
}

/// Converts a note name such as `C4`, `f#3` or `Bb2` to its MIDI number.
///
/// The letter is case-insensitive, the accidental is `#` or `b`, and the
/// octave is one or more decimal digits (`C-1` is not expressible).
pub fn note_to_midi(text: &str) -> Result<i64, String> {
    let malformed = || format!("invalid note format: {}", text);

    let mut chars = text.chars();
    let letter = chars
        .next()
        .map(|c| c.to_ascii_uppercase())
        .filter(|c| ('A'..='G').contains(c))
        .ok_or_else(malformed)?;
    let rest = chars.as_str();
    let (accidental, octave) = match rest.chars().next() {
        Some(c @ ('#' | 'b')) => (Some(c), &rest[1..]),
        _ => (None, rest),
    };
    if octave.is_empty() || !octave.chars().all(|c| c.is_ascii_digit()) {
        return Err(malformed());
    }
    let octave: i64 = octave.parse().map_err(|_| malformed())?;

    let mut name = letter.to_string();
    name.extend(accidental);
    let offset = lookup(&NOTE_OFFSETS, &name).ok_or_else(|| format!("invalid note: {}", name))?;
    octave
        .checked_add(1)
        .and_then(|octave| octave.checked_mul(12))
        .and_then(|base| base.checked_add(offset))
        .ok_or_else(malformed)
}

pub fn midi_to_freq(midi: f64) -> f64 {
    440.0 * 2f64.powf((midi - 69.0) / 12.0)
}

/// Binds the music natives in the interpreter's global frame.
pub fn register(interpreter: &mut Interpreter) {
    interpreter.define_native("note", music_note);
    interpreter.define_native("midi->freq", music_midi_to_freq);
    interpreter.define_native("chord", music_chord);
    interpreter.define_native("scale", music_scale);

    interpreter.define_native("bpm", music_bpm);
    interpreter.define_native("play-note", music_play_note);
    interpreter.define_native("synth", music_synth);
    interpreter.define_native("free", music_free);
    interpreter.define_native("set-param", music_set_param);
    interpreter.define_native("osc", music_osc);
    interpreter.define_native("sleep", music_sleep);
}

fn expect_name<'a>(value: &'a Value, span: Span, operator: &str) -> EvalResult<&'a str> {
    value.as_name().ok_or_else(|| EvalError::TypeMismatch {
        name: operator.to_string(),
        expected: "keyword or string".to_string(),
        found: value.type_name(),
        span,
    })
}

fn note_value(value: &Value, span: Span, operator: &str) -> EvalResult<f64> {
    let text = expect_name(value, span, operator)?;
    note_to_midi(text)
        .map(|midi| midi as f64)
        .map_err(|message| EvalError::InvalidNote(message, span))
}

/// A chord or scale root: a MIDI number or a note name.
fn root_value(value: &Value, span: Span, operator: &str) -> EvalResult<f64> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::Keyword(_) | Value::String(_) => note_value(value, span, operator),
        other => Err(EvalError::TypeMismatch {
            name: operator.to_string(),
            expected: "note keyword or MIDI number".to_string(),
            found: other.type_name(),
            span,
        }),
    }
}

fn node_id(value: &Value, span: Span, operator: &str) -> EvalResult<i64> {
    match value {
        Value::Number(n) if n.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(n) => {
            Ok(*n as i64)
        }
        Value::Number(n) => Err(EvalError::InvalidArguments(
            format!("{} requires a whole-number node id, got {}", operator, format_number(*n)),
            span,
        )),
        Value::SynthNode(node) => Ok(node.id),
        other => Err(EvalError::TypeMismatch {
            name: operator.to_string(),
            expected: "node id or synth-node".to_string(),
            found: other.type_name(),
            span,
        }),
    }
}

fn build_pattern(
    args: &[Value],
    span: Span,
    operator: &str,
    kind: &'static str,
    table: &[(&str, &'static [i64])],
) -> EvalResult {
    check_arity!(args, 2, span, operator);
    let root = root_value(&args[0], span, operator)?;
    let pattern_name = expect_name(&args[1], span, operator)?;
    let pattern = lookup(table, pattern_name).ok_or_else(|| EvalError::UnknownPattern {
        kind,
        name: pattern_name.to_string(),
        span,
    })?;
    Ok(Value::Vector(
        pattern
            .iter()
            .map(|interval| Value::Number(root + *interval as f64))
            .collect(),
    ))
}

fn trigger(interpreter: &Interpreter, synth: String, params: BTreeMap<String, f64>) -> Value {
    let engine = interpreter.engine();
    let id = engine.borrow_mut().trigger_synth(&synth, &params);
    Value::SynthNode(SynthNode { id, synth, params })
}

// (note :C4) -> 60
pub fn music_note(_: &mut Interpreter, args: Vec<Value>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "note");
    Ok(Value::Number(note_value(&args[0], span, "note")?))
}

// (midi->freq 69) -> 440
pub fn music_midi_to_freq(_: &mut Interpreter, args: Vec<Value>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "midi->freq");
    let midi = expect_number!(&args[0], span, "midi->freq");
    Ok(Value::Number(midi_to_freq(midi)))
}

// (chord :C4 :maj7) -> [60 64 67 71]
pub fn music_chord(_: &mut Interpreter, args: Vec<Value>, span: Span) -> EvalResult {
    build_pattern(&args, span, "chord", "chord", &CHORD_PATTERNS)
}

// (scale :C4 :major) -> [60 62 64 65 67 69 71]
pub fn music_scale(_: &mut Interpreter, args: Vec<Value>, span: Span) -> EvalResult {
    build_pattern(&args, span, "scale", "scale", &SCALE_PATTERNS)
}

/// `(bpm)` reads the engine tempo, `(bpm n)` sets it and returns `n`.
pub fn music_bpm(interpreter: &mut Interpreter, args: Vec<Value>, span: Span) -> EvalResult {
    let engine = interpreter.engine();
    match args.as_slice() {
        [] => {
            let bpm = engine.borrow().current_bpm();
            Ok(Value::Number(bpm))
        }
        [Value::Number(bpm)] => {
            engine.borrow_mut().set_current_bpm(*bpm);
            Ok(Value::Number(*bpm))
        }
        _ => Err(EvalError::InvalidArguments(
            "bpm requires 0 or 1 number argument".to_string(),
            span,
        )),
    }
}

pub fn music_play_note(interpreter: &mut Interpreter, args: Vec<Value>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "play-note");
    let note = expect_number!(&args[0], span, "play-note");

    let config = interpreter.config();
    let synth = config.synth_name(&config.default_synth);
    let params = BTreeMap::from([
        ("note".to_string(), note),
        ("amp".to_string(), config.default_amp),
        ("pan".to_string(), 0.0),
    ]);
    Ok(trigger(interpreter, synth, params))
}

/// `(synth :saw {:note 60 :cutoff 80})`. Keyword keys lose their colon and
/// non-numeric parameter values are dropped.
pub fn music_synth(interpreter: &mut Interpreter, args: Vec<Value>, span: Span) -> EvalResult {
    check_arity!(args, 1, 2, span, "synth");
    let synth = interpreter
        .config()
        .synth_name(expect_name(&args[0], span, "synth")?);

    let mut params = BTreeMap::new();
    match args.get(1) {
        None => {}
        Some(Value::Map(pairs)) => {
            for (key, value) in pairs {
                if let Value::Number(n) = value {
                    let param = key.strip_prefix(':').unwrap_or(key);
                    params.insert(param.to_string(), *n);
                }
            }
        }
        Some(other) => {
            return Err(EvalError::TypeMismatch {
                name: "synth".to_string(),
                expected: "map of params".to_string(),
                found: other.type_name(),
                span,
            });
        }
    }
    Ok(trigger(interpreter, synth, params))
}

pub fn music_free(interpreter: &mut Interpreter, args: Vec<Value>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "free");
    let id = node_id(&args[0], span, "free")?;
    interpreter.engine().borrow_mut().free_synth(id);
    Ok(Value::Nil)
}

pub fn music_set_param(interpreter: &mut Interpreter, args: Vec<Value>, span: Span) -> EvalResult {
    check_arity!(args, 3, span, "set-param");
    let id = node_id(&args[0], span, "set-param")?;
    let param = expect_name(&args[1], span, "set-param")?;
    let value = expect_number!(&args[2], span, "set-param");
    interpreter
        .engine()
        .borrow_mut()
        .set_synth_param(id, param, value);
    Ok(Value::Nil)
}

// (osc "/s_new" "sonic-pi-beep" -1 0 0 "note" 60)
pub fn music_osc(interpreter: &mut Interpreter, args: Vec<Value>, span: Span) -> EvalResult {
    check_arity!(args, min 1, span, "osc");
    let address = expect_name(&args[0], span, "osc")?;
    let osc_args = args[1..]
        .iter()
        .map(|arg| match arg {
            Value::Number(n) => Ok(OscArg::Number(*n)),
            Value::String(s) | Value::Keyword(s) => Ok(OscArg::String(s.clone())),
            other => Err(EvalError::InvalidArguments(
                format!("cannot convert {} to OSC argument", other.type_name()),
                span,
            )),
        })
        .collect::<EvalResult<Vec<_>>>()?;
    interpreter.engine().borrow_mut().send_raw(address, &osc_args);
    Ok(Value::Nil)
}

/// Logs the requested pause. Evaluation never suspends.
pub fn music_sleep(_: &mut Interpreter, args: Vec<Value>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "sleep");
    let seconds = expect_number!(&args[0], span, "sleep");
    info!("sleep for {} seconds", seconds);
    Ok(Value::Nil)
}
