//! # Capture Pixel Formats
//!
//! Destination formats the VDIN write path can store, and the bit depth and
//! packing options that drive stride computation.

// =============================================================================
// COLOR SPACE / LAYOUT
// =============================================================================

/// Color space of the captured signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    /// Luma/chroma
    Yuv,
    /// Red/green/blue
    Rgb,
}

/// Memory layout of a stored frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelLayout {
    /// Packed 4:2:2
    Yuv422,
    /// Packed 4:4:4
    Yuv444,
    /// Semi-planar 4:2:0, CbCr order
    Nv12,
    /// Semi-planar 4:2:0, CrCb order
    Nv21,
    /// Packed 4:4:4, G/B/R component order
    Gbr,
    /// Packed 4:4:4, B/R/G component order
    Brg,
}

/// Chroma sampling derived from a layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sampling {
    /// Full chroma resolution
    Full444,
    /// Horizontal chroma subsampling
    Sub422,
    /// Horizontal and vertical chroma subsampling, separate chroma plane
    Sub420,
}

impl PixelLayout {
    /// Chroma sampling of this layout
    pub const fn sampling(self) -> Sampling {
        match self {
            Self::Yuv422 => Sampling::Sub422,
            Self::Yuv444 | Self::Gbr | Self::Brg => Sampling::Full444,
            Self::Nv12 | Self::Nv21 => Sampling::Sub420,
        }
    }

    /// Check if chroma is stored in a trailing plane
    pub const fn is_semi_planar(self) -> bool {
        matches!(self, Self::Nv12 | Self::Nv21)
    }
}

/// Destination pixel format: color space x layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelFormat {
    /// Color space
    pub space: ColorSpace,
    /// Memory layout
    pub layout: PixelLayout,
}

impl PixelFormat {
    /// YUV 4:2:2 packed
    pub const YUV422: Self = Self::new(ColorSpace::Yuv, PixelLayout::Yuv422);
    /// YUV 4:4:4 packed
    pub const YUV444: Self = Self::new(ColorSpace::Yuv, PixelLayout::Yuv444);
    /// YUV NV12
    pub const NV12: Self = Self::new(ColorSpace::Yuv, PixelLayout::Nv12);
    /// YUV NV21
    pub const NV21: Self = Self::new(ColorSpace::Yuv, PixelLayout::Nv21);
    /// RGB 4:4:4 in GBR order
    pub const GBR: Self = Self::new(ColorSpace::Rgb, PixelLayout::Gbr);
    /// RGB 4:4:4 in BRG order
    pub const BRG: Self = Self::new(ColorSpace::Rgb, PixelLayout::Brg);

    /// Create a format
    pub const fn new(space: ColorSpace, layout: PixelLayout) -> Self {
        Self { space, layout }
    }

    /// Check if chroma is subsampled
    pub const fn is_chroma_subsampled(self) -> bool {
        !matches!(self.layout.sampling(), Sampling::Full444)
    }

    /// Every supported color space x layout combination
    pub const ALL: [Self; 12] = [
        Self::new(ColorSpace::Yuv, PixelLayout::Yuv422),
        Self::new(ColorSpace::Yuv, PixelLayout::Yuv444),
        Self::new(ColorSpace::Yuv, PixelLayout::Nv12),
        Self::new(ColorSpace::Yuv, PixelLayout::Nv21),
        Self::new(ColorSpace::Yuv, PixelLayout::Gbr),
        Self::new(ColorSpace::Yuv, PixelLayout::Brg),
        Self::new(ColorSpace::Rgb, PixelLayout::Yuv422),
        Self::new(ColorSpace::Rgb, PixelLayout::Yuv444),
        Self::new(ColorSpace::Rgb, PixelLayout::Nv12),
        Self::new(ColorSpace::Rgb, PixelLayout::Nv21),
        Self::new(ColorSpace::Rgb, PixelLayout::Gbr),
        Self::new(ColorSpace::Rgb, PixelLayout::Brg),
    ];
}

// =============================================================================
// BIT DEPTH / PACKING
// =============================================================================

/// Source component bit depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BitDepth {
    /// 8 bits per component
    #[default]
    Eight,
    /// 10 bits per component
    Ten,
}

impl BitDepth {
    /// Map a raw bit depth, falling back to 8-bit for anything unsupported
    pub fn from_bits(bits: u8) -> Self {
        match bits {
            8 => Self::Eight,
            10 => Self::Ten,
            other => {
                log::warn!("vdin: unsupported bit depth {}, using 8-bit", other);
                Self::Eight
            },
        }
    }

    /// Bits per component
    pub const fn bits(self) -> u8 {
        match self {
            Self::Eight => 8,
            Self::Ten => 10,
        }
    }
}

/// 10-bit packing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Packing {
    /// Components padded to byte boundaries
    #[default]
    Padded,
    /// Components packed back to back (5 bytes per 2 pixels in 4:2:2)
    Full,
}

// =============================================================================
// FORMAT DESCRIPTOR
// =============================================================================

/// Everything the geometry planner needs to know about the stored format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatDescriptor {
    /// Destination format
    pub format: PixelFormat,
    /// Source bit depth
    pub bitdepth: BitDepth,
    /// Packing mode (only meaningful for 10-bit)
    pub packing: Packing,
}

impl FormatDescriptor {
    /// Create a descriptor
    pub const fn new(format: PixelFormat, bitdepth: BitDepth, packing: Packing) -> Self {
        Self {
            format,
            bitdepth,
            packing,
        }
    }

    /// 8-bit descriptor for `format`
    pub const fn eight_bit(format: PixelFormat) -> Self {
        Self::new(format, BitDepth::Eight, Packing::Padded)
    }
}
