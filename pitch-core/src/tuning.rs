//! # Musical Tuning Module
//!
//! Conversions between frequency, fractional MIDI note numbers and note
//! names, in twelve-tone equal temperament with A4 = 440 Hz = MIDI 69.
//!
//! Pitch tracking works in the semitone domain, where equal musical
//! intervals are equal numeric distances; these helpers are the only
//! place that knows about the reference pitch.

use once_cell::sync::Lazy;

/// Reference frequency of A4.
pub const A4_FREQUENCY: f64 = 440.0;

/// MIDI note number of A4.
pub const A4_MIDI: f64 = 69.0;

/// Note names for MIDI 0 (C-1) through 127 (G9).
static NOTE_NAMES: Lazy<Vec<String>> = Lazy::new(|| {
    const PITCH_CLASSES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];
    (0..128)
        .map(|midi: i32| {
            // MIDI 60 is C4, so octave numbers start at -1.
            let octave = midi / 12 - 1;
            format!("{}{}", PITCH_CLASSES[(midi % 12) as usize], octave)
        })
        .collect()
});

/// Fractional MIDI note number of a frequency.
pub fn frequency_to_midi(freq: f64) -> f64 {
    A4_MIDI + 12.0 * (freq / A4_FREQUENCY).log2()
}

/// Frequency of a (possibly fractional) MIDI note number.
pub fn midi_to_frequency(midi: f64) -> f64 {
    A4_FREQUENCY * 2f64.powf((midi - A4_MIDI) / 12.0)
}

/// Nearest integer note and the signed deviation from it in cents.
///
/// Positive cents mean the frequency is sharp of the returned note.
pub fn nearest_midi_note(freq: f64) -> (i32, f64) {
    let exact = frequency_to_midi(freq);
    let nearest = exact.round();
    (nearest as i32, (exact - nearest) * 100.0)
}

/// Deviation of `freq` from `reference` in cents.
///
/// - 100 cents = 1 semitone
/// - 1200 cents = 1 octave
pub fn cents_between(freq: f64, reference: f64) -> f64 {
    1200.0 * (freq / reference).log2()
}

/// Name of a MIDI note, e.g. `"A4"` or `"C#5"`. `None` outside 0..=127.
pub fn note_name(midi: i32) -> Option<&'static str> {
    usize::try_from(midi)
        .ok()
        .and_then(|index| NOTE_NAMES.get(index))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_pitch() {
        assert_eq!(frequency_to_midi(440.0), 69.0);
        assert!((midi_to_frequency(69.0) - 440.0).abs() < 1e-9);
        assert!((midi_to_frequency(60.0) - 261.6256).abs() < 1e-3);
    }

    #[test]
    fn test_nearest_note_and_cents() {
        let (note, cents) = nearest_midi_note(440.0);
        assert_eq!(note, 69);
        assert!(cents.abs() < 1e-9);

        // Deviations under half a semitone stay on the same note.
        let (note, cents) = nearest_midi_note(midi_to_frequency(69.2));
        assert_eq!(note, 69);
        assert!((cents - 20.0).abs() < 1e-6);

        let (note, cents) = nearest_midi_note(midi_to_frequency(68.7));
        assert_eq!(note, 69);
        assert!((cents + 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_cents_between() {
        assert!((cents_between(880.0, 440.0) - 1200.0).abs() < 1e-9);
        assert!((cents_between(440.0, 880.0) + 1200.0).abs() < 1e-9);
    }

    #[test]
    fn test_note_names() {
        assert_eq!(note_name(69), Some("A4"));
        assert_eq!(note_name(60), Some("C4"));
        assert_eq!(note_name(61), Some("C#4"));
        assert_eq!(note_name(0), Some("C-1"));
        assert_eq!(note_name(127), Some("G9"));
        assert_eq!(note_name(128), None);
        assert_eq!(note_name(-1), None);
    }
}
