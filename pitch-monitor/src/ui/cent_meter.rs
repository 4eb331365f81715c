//! # Cent Meter
//!
//! A one-line text meter showing how far the sung pitch is from the
//! nearest note, with a needle between -50 and +50 cents.

/// The meter shows deviations from -50 to +50 cents.
const METER_RANGE: f32 = 50.0;

/// Character cells between the two ends of the meter. Odd, so the
/// centre falls on a cell.
const METER_WIDTH: usize = 21;

/// How close the pitch is to the note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accuracy {
    InTune,
    Close,
    Off,
}

impl Accuracy {
    pub fn from_cents(cents: f32) -> Self {
        if cents.abs() < 5.0 {
            Accuracy::InTune
        } else if cents.abs() < 20.0 {
            Accuracy::Close
        } else {
            Accuracy::Off
        }
    }
}

/// Draws the meter, e.g. `[---------|-*-------]`.
///
/// `None` draws an empty meter with only the centre mark.
pub fn render(cents: Option<f32>) -> String {
    let centre = METER_WIDTH / 2;
    let needle = cents.map(|c| {
        let clamped = c.clamp(-METER_RANGE, METER_RANGE);
        let position = (clamped + METER_RANGE) / (2.0 * METER_RANGE) * (METER_WIDTH - 1) as f32;
        position.round() as usize
    });

    let mut meter = String::with_capacity(METER_WIDTH + 2);
    meter.push('[');
    for cell in 0..METER_WIDTH {
        let mark = if needle == Some(cell) {
            match cents.map(Accuracy::from_cents) {
                Some(Accuracy::InTune) => '#',
                Some(Accuracy::Close) => '*',
                _ => '!',
            }
        } else if cell == centre {
            '|'
        } else {
            '-'
        };
        meter.push(mark);
    }
    meter.push(']');
    meter
}
