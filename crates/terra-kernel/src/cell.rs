//! Bit-packed terrain cell encoding.
//!
//! Every cell of the terrain raster is one byte:
//!
//! ```text
//! bit 7    LAND
//! bit 6    SHORE   derived at export time, never ground truth
//! bit 5    OCEAN
//! bits 0-4 magnitude (0-31): elevation on land, depth on water
//! ```
//!
//! A water cell without the `OCEAN` bit is a lake. Land is split into bands
//! by magnitude: plains 0-9, highland 10-19, mountain 20-31.
//!
//! Older map tooling labels bit 6 "lake" and bit 5 "shore/ocean", with the
//! meaning depending on the land bit. This codec gives each bit one meaning:
//! bit 6 is only ever `SHORE` and bit 5 only ever `OCEAN`. There is no lake
//! bit; `is_lake` is "neither `LAND` nor `OCEAN`".

use bytemuck::{Pod, Zeroable};

/// Largest value the magnitude field can hold.
pub const MAX_MAGNITUDE: u8 = 31;

/// First magnitude of the highland band.
pub const HIGHLAND_MIN_MAGNITUDE: u8 = 10;

/// First magnitude of the mountain band.
pub const MOUNTAIN_MIN_MAGNITUDE: u8 = 20;

/// Cell flag bits.
pub struct CellBits;

impl CellBits {
    /// Cell is land - bit 7
    pub const LAND: u8 = 1 << 7;
    /// Water cell touching land - bit 6
    pub const SHORE: u8 = 1 << 6;
    /// Water cell belongs to the ocean - bit 5
    pub const OCEAN: u8 = 1 << 5;
    /// Magnitude field - bits 0-4
    pub const MAGNITUDE: u8 = 0x1F;
}

/// Closed set of terrain types a brush can stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerrainType {
    /// Open water
    Ocean,
    /// Inland water
    Lake,
    /// Low land
    Plains,
    /// Middle land
    Highland,
    /// High land
    Mountain,
}

impl TerrainType {
    /// All terrain types, in band order.
    pub const ALL: [Self; 5] = [
        Self::Ocean,
        Self::Lake,
        Self::Plains,
        Self::Highland,
        Self::Mountain,
    ];

    /// Whether this type sets the land bit.
    #[must_use]
    pub const fn is_land(self) -> bool {
        matches!(self, Self::Plains | Self::Highland | Self::Mountain)
    }

    /// Derives the type of an encoded cell.
    #[must_use]
    pub const fn classify(cell: TerrainCell) -> Self {
        let decoded = cell.decode();
        if decoded.is_land {
            if decoded.magnitude >= MOUNTAIN_MIN_MAGNITUDE {
                Self::Mountain
            } else if decoded.magnitude >= HIGHLAND_MIN_MAGNITUDE {
                Self::Highland
            } else {
                Self::Plains
            }
        } else if decoded.is_lake {
            Self::Lake
        } else {
            Self::Ocean
        }
    }

    /// Stable numeric code shared with the brush shader.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Ocean => 0,
            Self::Lake => 1,
            Self::Plains => 2,
            Self::Highland => 3,
            Self::Mountain => 4,
        }
    }

    /// Lowercase display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ocean => "ocean",
            Self::Lake => "lake",
            Self::Plains => "plains",
            Self::Highland => "highland",
            Self::Mountain => "mountain",
        }
    }
}

impl std::str::FromStr for TerrainType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown terrain type '{s}'"))
    }
}

/// Decoded view of a terrain cell. Pure bit extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedCell {
    /// Land bit
    pub is_land: bool,
    /// Water that is not ocean
    pub is_lake: bool,
    /// Shore bit
    pub is_shore: bool,
    /// Ocean bit
    pub is_ocean: bool,
    /// Magnitude 0-31
    pub magnitude: u8,
}

/// A single packed terrain cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct TerrainCell(pub u8);

impl Default for TerrainCell {
    fn default() -> Self {
        Self::OCEAN
    }
}

impl TerrainCell {
    /// Uniform fill value of an untouched raster.
    pub const OCEAN: Self = Self(CellBits::OCEAN);

    /// Packs a terrain type and magnitude (clamped to 0-31).
    #[must_use]
    pub const fn encode(terrain: TerrainType, magnitude: u8) -> Self {
        let magnitude = if magnitude > MAX_MAGNITUDE {
            MAX_MAGNITUDE
        } else {
            magnitude
        };
        let bits = match terrain {
            TerrainType::Plains | TerrainType::Highland | TerrainType::Mountain => CellBits::LAND,
            TerrainType::Ocean => CellBits::OCEAN,
            TerrainType::Lake => 0,
        };
        Self(bits | magnitude)
    }

    /// Unpacks the flag bits and magnitude.
    #[must_use]
    pub const fn decode(self) -> DecodedCell {
        let is_land = self.0 & CellBits::LAND != 0;
        let is_ocean = self.0 & CellBits::OCEAN != 0;
        DecodedCell {
            is_land,
            is_lake: !is_land && !is_ocean,
            is_shore: self.0 & CellBits::SHORE != 0,
            is_ocean,
            magnitude: self.0 & CellBits::MAGNITUDE,
        }
    }

    /// Whether the land bit is set.
    #[must_use]
    pub const fn is_land(self) -> bool {
        self.0 & CellBits::LAND != 0
    }

    /// Whether the shore bit is set.
    #[must_use]
    pub const fn is_shore(self) -> bool {
        self.0 & CellBits::SHORE != 0
    }

    /// Magnitude field.
    #[must_use]
    pub const fn magnitude(self) -> u8 {
        self.0 & CellBits::MAGNITUDE
    }

    /// Returns the cell with its magnitude replaced (clamped), flags kept.
    #[must_use]
    pub const fn with_magnitude(self, magnitude: u8) -> Self {
        let magnitude = if magnitude > MAX_MAGNITUDE {
            MAX_MAGNITUDE
        } else {
            magnitude
        };
        Self((self.0 & !CellBits::MAGNITUDE) | magnitude)
    }

    /// Returns the cell with a flag set.
    #[must_use]
    pub const fn with_flag(self, flag: u8) -> Self {
        Self(self.0 | flag)
    }

    /// Returns the cell with a flag cleared.
    #[must_use]
    pub const fn without_flag(self, flag: u8) -> Self {
        Self(self.0 & !flag)
    }

    /// Raw byte value.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }
}

/// Packs a terrain type and magnitude into a cell byte.
#[must_use]
pub const fn encode_cell(terrain: TerrainType, magnitude: u8) -> u8 {
    TerrainCell::encode(terrain, magnitude).0
}

/// Unpacks a cell byte.
#[must_use]
pub const fn decode_cell(byte: u8) -> DecodedCell {
    TerrainCell(byte).decode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cell_size() {
        assert_eq!(std::mem::size_of::<TerrainCell>(), 1);
    }

    #[test]
    fn test_land_encoding() {
        let cell = TerrainCell::encode(TerrainType::Plains, 5);
        assert_eq!(cell.raw(), 0b1000_0101);
        let decoded = cell.decode();
        assert!(decoded.is_land);
        assert!(!decoded.is_lake);
        assert!(!decoded.is_ocean);
        assert_eq!(decoded.magnitude, 5);
    }

    #[test]
    fn test_water_encoding() {
        let ocean = decode_cell(encode_cell(TerrainType::Ocean, 3));
        assert!(ocean.is_ocean && !ocean.is_land && !ocean.is_lake);
        assert_eq!(ocean.magnitude, 3);

        let lake = decode_cell(encode_cell(TerrainType::Lake, 7));
        assert!(lake.is_lake && !lake.is_ocean && !lake.is_land);
        assert_eq!(lake.magnitude, 7);
    }

    #[test]
    fn test_flag_bits_have_one_meaning() {
        let ocean_shore = decode_cell(0b0110_0001);
        assert!(ocean_shore.is_shore && ocean_shore.is_ocean && !ocean_shore.is_lake);

        let lake_shore = decode_cell(0b0100_0010);
        assert!(lake_shore.is_shore && lake_shore.is_lake && !lake_shore.is_ocean);
        assert_eq!(lake_shore.magnitude, 2);
    }

    #[test]
    fn test_magnitude_clamped() {
        assert_eq!(TerrainCell::encode(TerrainType::Mountain, 200).magnitude(), 31);
        assert_eq!(TerrainCell::OCEAN.with_magnitude(99).magnitude(), 31);
    }

    #[test]
    fn test_default_is_ocean_fill() {
        assert_eq!(TerrainCell::default(), TerrainCell::OCEAN);
        assert_eq!(TerrainCell::OCEAN.raw(), 0x20);
    }

    #[test]
    fn test_classify_bands() {
        let classify = |terrain, magnitude: u8| {
            TerrainType::classify(TerrainCell::encode(terrain, magnitude))
        };
        assert_eq!(classify(TerrainType::Plains, 9), TerrainType::Plains);
        assert_eq!(classify(TerrainType::Plains, 10), TerrainType::Highland);
        assert_eq!(classify(TerrainType::Mountain, 25), TerrainType::Mountain);
        assert_eq!(classify(TerrainType::Lake, 1), TerrainType::Lake);
        let ocean_shore = TerrainCell::OCEAN.with_flag(CellBits::SHORE);
        assert_eq!(TerrainType::classify(ocean_shore), TerrainType::Ocean);
    }

    #[test]
    fn test_terrain_type_from_str() {
        assert_eq!("Highland".parse::<TerrainType>(), Ok(TerrainType::Highland));
        assert!("swamp".parse::<TerrainType>().is_err());
    }

    proptest! {
        #[test]
        fn prop_encode_preserves_clamped_magnitude(idx in 0usize..5, magnitude in any::<u8>()) {
            let terrain = TerrainType::ALL[idx];
            let decoded = decode_cell(encode_cell(terrain, magnitude));
            prop_assert_eq!(decoded.magnitude, magnitude.min(MAX_MAGNITUDE));
            prop_assert_eq!(decoded.is_land, terrain.is_land());
            prop_assert!(!(decoded.is_land && decoded.is_ocean));
            prop_assert!(!decoded.is_shore);
        }
    }
}
