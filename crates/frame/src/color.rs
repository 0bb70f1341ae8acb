/// Matrix name used whenever a frame's matrix code is missing from [`ColorMatrix::name`]'s table.
pub const DEFAULT_MATRIX: &str = "709";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorRange {
    Limited,
    Full,
}

impl ColorRange {
    /// Decode the host's `_ColorRange` frame property (0 = full, 1 = limited).
    pub fn from_prop(value: i64) -> Option<Self> {
        match value {
            0 => Some(ColorRange::Full),
            1 => Some(ColorRange::Limited),
            _ => None,
        }
    }

    pub fn as_prop(&self) -> i64 {
        match self {
            ColorRange::Full => 0,
            ColorRange::Limited => 1,
        }
    }
}

/// Integer matrix code as carried in frame metadata (ITU-T H.273 numbering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorMatrix(pub u8);

impl ColorMatrix {
    pub const RGB: Self = Self(0);
    pub const BT709: Self = Self(1);
    pub const UNSPECIFIED: Self = Self(2);
    pub const FCC: Self = Self(4);
    pub const BT470BG: Self = Self(5);
    pub const ST170M: Self = Self(6);
    pub const ST240M: Self = Self(7);
    pub const BT2020_NCL: Self = Self(9);
    pub const BT2020_CL: Self = Self(10);

    fn lookup(self) -> Option<&'static str> {
        match self.0 {
            1 | 2 => Some("709"),
            4 => Some("fcc"),
            5 => Some("470bg"),
            6 => Some("170m"),
            7 => Some("240m"),
            9 => Some("2020ncl"),
            10 => Some("2020cl"),
            _ => None,
        }
    }

    /// Resampler matrix name; unknown codes map to [`DEFAULT_MATRIX`].
    pub fn name(self) -> &'static str {
        self.lookup().unwrap_or(DEFAULT_MATRIX)
    }

    pub fn is_known(self) -> bool {
        self.lookup().is_some()
    }

    /// The code a frame carries after a conversion that used [`Self::name`].
    pub fn resolved(self) -> Self {
        if self.is_known() { self } else { Self::BT709 }
    }
}
