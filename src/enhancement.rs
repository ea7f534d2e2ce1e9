//! Enhancement tables - normalized RGB built from a frame's color tables.
//!
//! Levels 1-17 are the fixed graphics colors and index the color table
//! directly. Levels 18-255 are image levels and go through the stretch
//! table first. Level 0 stays black.

use crate::layout::TABLE_ENTRIES;

/// First level routed through the stretch table
pub const FIRST_IMAGE_LEVEL: usize = 18;

// =============================================================================
// RGB COLOR
// =============================================================================

/// Color table entry, packed `0x00RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Self = Self { r: 0, g: 0, b: 0 };

    /// Create from packed `0x00RRGGBB`
    #[inline]
    pub fn from_packed(packed: u32) -> Self {
        Self {
            r: ((packed >> 16) & 0xFF) as u8,
            g: ((packed >> 8) & 0xFF) as u8,
            b: (packed & 0xFF) as u8,
        }
    }

    /// Pack to `0x00RRGGBB`
    #[inline]
    pub fn to_packed(&self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }
}

// =============================================================================
// ENHANCEMENT TABLE
// =============================================================================

/// Per-level RGB in `0.0..=1.0`, one row per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct EnhancementTable {
    pub red: [f32; TABLE_ENTRIES],
    pub green: [f32; TABLE_ENTRIES],
    pub blue: [f32; TABLE_ENTRIES],
}

impl EnhancementTable {
    pub fn from_tables(stretch: &[i32; TABLE_ENTRIES], color: &[u32; TABLE_ENTRIES]) -> Self {
        let mut table = Self {
            red: [0.0; TABLE_ENTRIES],
            green: [0.0; TABLE_ENTRIES],
            blue: [0.0; TABLE_ENTRIES],
        };

        for level in 1..TABLE_ENTRIES {
            let rgb = if level < FIRST_IMAGE_LEVEL {
                Rgb::from_packed(color[level])
            } else {
                // A stretch entry outside the color table renders black
                usize::try_from(stretch[level])
                    .ok()
                    .and_then(|i| color.get(i))
                    .map_or(Rgb::BLACK, |&c| Rgb::from_packed(c))
            };
            table.red[level] = rgb.r as f32 / 255.0;
            table.green[level] = rgb.g as f32 / 255.0;
            table.blue[level] = rgb.b as f32 / 255.0;
        }
        table
    }

    /// `[red, green, blue]` rows, the shape display toolkits take.
    pub fn to_rows(&self) -> [[f32; TABLE_ENTRIES]; 3] {
        [self.red, self.green, self.blue]
    }
}
