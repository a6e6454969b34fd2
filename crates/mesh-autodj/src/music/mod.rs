//! Music theory utilities for harmonic mixing
//!
//! Keys are held in Camelot notation: a wheel position 1-12 plus a mode
//! letter (A = minor, B = major). Musical notation ("Am", "C#m", "Bb") is
//! accepted on input and converted once at parse time.

use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

/// Camelot mode letter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyMode {
    /// Minor keys
    A,
    /// Major keys
    B,
}

impl KeyMode {
    pub fn opposite(self) -> Self {
        match self {
            KeyMode::A => KeyMode::B,
            KeyMode::B => KeyMode::A,
        }
    }

    fn letter(self) -> char {
        match self {
            KeyMode::A => 'A',
            KeyMode::B => 'B',
        }
    }
}

/// A key on the Camelot wheel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CamelotKey {
    position: u8,
    mode: KeyMode,
}

/// How two keys relate on the wheel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRelation {
    /// Same position, same mode
    Identical,
    /// One step around the wheel, same mode
    Adjacent,
    /// Same position, opposite mode (relative major/minor)
    Relative,
    /// Anything else
    Clash,
}

impl KeyRelation {
    /// Identical, adjacent and relative keys mix without a key clash
    pub fn is_compatible(self) -> bool {
        !matches!(self, KeyRelation::Clash)
    }
}

// Index by semitone root (0=C, 1=C#, ...)
const CAMELOT_MAJOR: [u8; 12] = [8, 3, 10, 5, 12, 7, 2, 9, 4, 11, 6, 1];
const CAMELOT_MINOR: [u8; 12] = [5, 12, 7, 2, 9, 4, 11, 6, 1, 8, 3, 10];

/// Compatible neighbours for every wheel slot, indexed by [`CamelotKey::slot`].
///
/// Entries are `[position - 1, position + 1, relative]`, wrapping 12 → 1.
static COMPATIBLE: LazyLock<[[CamelotKey; 3]; 24]> = LazyLock::new(|| {
    std::array::from_fn(|slot| {
        let key = CamelotKey::from_slot(slot);
        [key.step(-1), key.step(1), key.relative()]
    })
});

impl CamelotKey {
    /// Create a key from wheel position (1-12) and mode
    pub fn new(position: u8, mode: KeyMode) -> Option<Self> {
        (1..=12)
            .contains(&position)
            .then_some(Self { position, mode })
    }

    pub fn position(&self) -> u8 {
        self.position
    }

    pub fn mode(&self) -> KeyMode {
        self.mode
    }

    /// Parse either Camelot ("8A", "12b", "08 B") or musical notation
    /// ("Am", "C#m", "F", "Bb", "A minor")
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        Self::parse_camelot(s).or_else(|| Self::parse_musical(s))
    }

    fn parse_camelot(s: &str) -> Option<Self> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let (split, letter) = compact.char_indices().last()?;
        let mode = match letter {
            'A' | 'a' => KeyMode::A,
            'B' | 'b' => KeyMode::B,
            _ => return None,
        };
        let digits = &compact[..split];
        let position: u8 = digits.parse().ok()?;
        Self::new(position, mode)
    }

    fn parse_musical(s: &str) -> Option<Self> {
        let mut chars = s.chars().peekable();

        let base_root = match chars.next()?.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };

        let root = match chars.peek() {
            Some('#') | Some('♯') => {
                chars.next();
                (base_root + 1) % 12
            }
            Some('b') | Some('♭') => {
                chars.next();
                (base_root + 11) % 12
            }
            _ => base_root,
        };

        let rest: String = chars.collect::<String>().trim().to_lowercase();
        let minor = match rest.as_str() {
            "" | "maj" | "major" => false,
            r if r.starts_with('m') && !r.starts_with("maj") => true,
            _ => return None,
        };

        let position = if minor {
            CAMELOT_MINOR[root]
        } else {
            CAMELOT_MAJOR[root]
        };
        let mode = if minor { KeyMode::A } else { KeyMode::B };
        Some(Self { position, mode })
    }

    /// Relative major/minor (same position, opposite mode)
    pub fn relative(&self) -> Self {
        Self {
            position: self.position,
            mode: self.mode.opposite(),
        }
    }

    /// Move `steps` positions around the wheel, keeping the mode
    fn step(&self, steps: i8) -> Self {
        let zero_based = (self.position as i8 - 1 + steps).rem_euclid(12) as u8;
        Self {
            position: zero_based + 1,
            mode: self.mode,
        }
    }

    /// Dense index 0..24 (A keys first)
    fn slot(&self) -> usize {
        let base = match self.mode {
            KeyMode::A => 0,
            KeyMode::B => 12,
        };
        base + (self.position as usize - 1)
    }

    fn from_slot(slot: usize) -> Self {
        let mode = if slot < 12 { KeyMode::A } else { KeyMode::B };
        Self {
            position: (slot % 12) as u8 + 1,
            mode,
        }
    }

    /// Keys that mix cleanly with this one, excluding itself
    pub fn compatible_keys(&self) -> &'static [CamelotKey; 3] {
        &COMPATIBLE[self.slot()]
    }

    /// Classify the relationship from `self` to `other`
    pub fn relation(&self, other: &CamelotKey) -> KeyRelation {
        if self == other {
            return KeyRelation::Identical;
        }
        if other.mode != self.mode {
            return if other.position == self.position {
                KeyRelation::Relative
            } else {
                KeyRelation::Clash
            };
        }
        if self.compatible_keys().contains(other) {
            KeyRelation::Adjacent
        } else {
            KeyRelation::Clash
        }
    }
}

impl fmt::Display for CamelotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.position, self.mode.letter())
    }
}

impl TryFrom<String> for CamelotKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unrecognised key '{}'", value))
    }
}

impl From<CamelotKey> for String {
    fn from(key: CamelotKey) -> Self {
        key.to_string()
    }
}
