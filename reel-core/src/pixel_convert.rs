// PIXEL CONVERT - planar YUV/GBR to packed RGBA
//
// Decoders hand back planar images: one luma plane and two chroma planes,
// the chroma planes possibly subsampled (chroma shift 1 = half size on that
// axis). The host wants one packed RGBA8 buffer.
//
// CPU path only, integer math with per-color-space lookup tables.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Color Spaces
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorSpace {
    BT601,    // SD, also the fallback for untagged streams
    BT709,    // HD
    BT2020,   // UHD
    SRGB,     // Planes already hold G, B, R
}

impl Default for ColorSpace {
    fn default() -> Self {
        Self::BT601
    }
}

impl ColorSpace {
    /// (Wr, Wb); Wg = 1 - Wr - Wb
    pub fn coefficients(&self) -> (f64, f64) {
        match self {
            Self::BT601 => (0.299, 0.114),
            Self::BT709 => (0.2126, 0.0722),
            Self::BT2020 => (0.2627, 0.0593),
            Self::SRGB => (0.299, 0.114),
        }
    }
}

// ============================================================================
// Planar image
// ============================================================================

/// Decoded planar image. Plane 0 is luma (or G for `SRGB`), planes 1 and 2
/// are Cb/Cr (or B/R).
#[derive(Debug, Clone, Default)]
pub struct VideoFrame {
    pub width: usize,
    pub height: usize,
    pub planes: [Vec<u8>; 3],
    /// Bytes per row, per plane
    pub linesize: [usize; 3],
    /// log2 chroma reduction along x
    pub chroma_shift_w: u8,
    /// log2 chroma reduction along y
    pub chroma_shift_h: u8,
    pub color_space: ColorSpace,
    /// Seconds
    pub pts: f64,
}

impl VideoFrame {
    /// Allocate a tightly packed frame.
    pub fn new(width: usize, height: usize, chroma_shift_w: u8, chroma_shift_h: u8) -> Self {
        let mut frame = Self::default();
        frame.reshape(width, height, chroma_shift_w, chroma_shift_h);
        frame
    }

    /// Resize in place, keeping allocations where possible.
    pub fn reshape(&mut self, width: usize, height: usize, chroma_shift_w: u8, chroma_shift_h: u8) {
        self.width = width;
        self.height = height;
        self.chroma_shift_w = chroma_shift_w;
        self.chroma_shift_h = chroma_shift_h;

        let (cw, ch) = self.chroma_size();
        self.linesize = [width, cw, cw];
        self.planes[0].resize(width * height, 0);
        self.planes[1].resize(cw * ch, 0);
        self.planes[2].resize(cw * ch, 0);
    }

    /// Chroma plane dimensions, rounded up.
    pub fn chroma_size(&self) -> (usize, usize) {
        let w = shifted(self.width, self.chroma_shift_w);
        let h = shifted(self.height, self.chroma_shift_h);
        (w, h)
    }

    fn plane_dims(&self, index: usize) -> (usize, usize) {
        if index == 0 {
            (self.width, self.height)
        } else {
            self.chroma_size()
        }
    }

    fn check_planes(&self) -> Result<(), ConvertError> {
        for plane in 0..3 {
            let (w, h) = self.plane_dims(plane);
            if h == 0 || w == 0 {
                continue;
            }
            let stride = self.linesize[plane];
            let needed = stride * (h - 1) + w;
            if stride < w || self.planes[plane].len() < needed {
                return Err(ConvertError::PlaneTooSmall { plane });
            }
        }
        Ok(())
    }
}

fn shifted(len: usize, shift: u8) -> usize {
    let unit = 1usize << shift;
    (len + unit - 1) >> shift
}

// ============================================================================
// Packed output
// ============================================================================

/// Packed RGBA8 framebuffer, `width * height * 4` bytes.
#[derive(Debug, Clone, Default)]
pub struct RgbaFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    /// Bumped every time new pixels land in `data`
    pub generation: u64,
}

impl RgbaFrame {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width as usize * height as usize * 4],
            generation: 0,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }
}

// ============================================================================
// Layout selection
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConvertError {
    #[error("Unsupported chroma layout: shift ({shift_w}, {shift_h})")]
    UnsupportedLayout { shift_w: u8, shift_h: u8 },
    #[error("Plane {plane} is smaller than its stride and height require")]
    PlaneTooSmall { plane: usize },
    #[error("Output buffer is {got} bytes, need {need}")]
    BufferSize { got: usize, need: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaLayout {
    /// Full-resolution G/B/R planes
    Gbr,
    Yuv420,
    Yuv422,
    Yuv444,
}

impl ChromaLayout {
    /// Pick the conversion for a frame. First match wins.
    pub fn classify(shift_w: u8, shift_h: u8, color_space: ColorSpace) -> Result<Self, ConvertError> {
        match (shift_w, shift_h) {
            (0, 0) if color_space == ColorSpace::SRGB => Ok(Self::Gbr),
            (1, 1) => Ok(Self::Yuv420),
            (1, 0) => Ok(Self::Yuv422),
            (0, 0) => Ok(Self::Yuv444),
            // 4:1:1 (2, 0) included: recognized, never converted
            _ => Err(ConvertError::UnsupportedLayout { shift_w, shift_h }),
        }
    }
}

// ============================================================================
// Converter
// ============================================================================

const FIX_SHIFT: i32 = 16;
const FIX_HALF: i32 = 1 << (FIX_SHIFT - 1);

pub struct PixelConverter {
    color_space: ColorSpace,
    // 16.16 fixed point, limited range (Y 16-235, C 16-240) to full range
    y_table: [i32; 256],
    v_table_r: [i32; 256],
    u_table_g: [i32; 256],
    v_table_g: [i32; 256],
    u_table_b: [i32; 256],
}

impl PixelConverter {
    pub fn new(color_space: ColorSpace) -> Self {
        let mut converter = Self {
            color_space,
            y_table: [0; 256],
            v_table_r: [0; 256],
            u_table_g: [0; 256],
            v_table_g: [0; 256],
            u_table_b: [0; 256],
        };
        converter.build_tables();
        converter
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    fn build_tables(&mut self) {
        let (wr, wb) = self.color_space.coefficients();
        let wg = 1.0 - wr - wb;

        // R = Y + 2(1-Wr)Cr
        // G = Y - 2Wb(1-Wb)/Wg Cb - 2Wr(1-Wr)/Wg Cr
        // B = Y + 2(1-Wb)Cb
        let cr_r = 2.0 * (1.0 - wr);
        let cb_g = -2.0 * wb * (1.0 - wb) / wg;
        let cr_g = -2.0 * wr * (1.0 - wr) / wg;
        let cb_b = 2.0 * (1.0 - wb);

        let one = (1 << FIX_SHIFT) as f64;
        let y_scale = 255.0 / 219.0;
        let c_scale = 255.0 / 224.0;

        for i in 0..256 {
            let y = (i as f64) - 16.0;
            let c = (i as f64) - 128.0;

            self.y_table[i] = (y * y_scale * one).round() as i32;
            self.v_table_r[i] = (c * c_scale * cr_r * one).round() as i32;
            self.u_table_g[i] = (c * c_scale * cb_g * one).round() as i32;
            self.v_table_g[i] = (c * c_scale * cr_g * one).round() as i32;
            self.u_table_b[i] = (c * c_scale * cb_b * one).round() as i32;
        }
    }

    #[inline]
    fn yuv_to_rgba(&self, y: u8, u: u8, v: u8, out: &mut [u8]) {
        let yc = self.y_table[y as usize] + FIX_HALF;
        let r = (yc + self.v_table_r[v as usize]) >> FIX_SHIFT;
        let g = (yc + self.u_table_g[u as usize] + self.v_table_g[v as usize]) >> FIX_SHIFT;
        let b = (yc + self.u_table_b[u as usize]) >> FIX_SHIFT;
        out[0] = r.clamp(0, 255) as u8;
        out[1] = g.clamp(0, 255) as u8;
        out[2] = b.clamp(0, 255) as u8;
        out[3] = 255;
    }

    /// Convert `src` into `dst` (packed RGBA8, `width * height * 4` bytes).
    pub fn convert(&self, src: &VideoFrame, dst: &mut [u8]) -> Result<ChromaLayout, ConvertError> {
        let layout = ChromaLayout::classify(src.chroma_shift_w, src.chroma_shift_h, src.color_space)?;

        let need = src.width * src.height * 4;
        if dst.len() < need {
            return Err(ConvertError::BufferSize { got: dst.len(), need });
        }
        src.check_planes()?;

        match layout {
            ChromaLayout::Gbr => gbr_to_rgba(src, dst),
            ChromaLayout::Yuv420 | ChromaLayout::Yuv422 | ChromaLayout::Yuv444 => {
                self.planar_to_rgba(src, dst)
            }
        }
        Ok(layout)
    }

    // One loop covers 4:2:0, 4:2:2 and 4:4:4; the shifts pick the chroma sample.
    fn planar_to_rgba(&self, src: &VideoFrame, dst: &mut [u8]) {
        let (sw, sh) = (src.chroma_shift_w, src.chroma_shift_h);
        let [ys, us, vs] = src.linesize;

        for row in 0..src.height {
            let y_row = &src.planes[0][row * ys..];
            let c_off = (row >> sh) * us;
            let u_row = &src.planes[1][c_off..];
            let v_row = &src.planes[2][(row >> sh) * vs..];
            let out_row = &mut dst[row * src.width * 4..(row + 1) * src.width * 4];

            for (x, px) in out_row.chunks_exact_mut(4).enumerate() {
                let cx = x >> sw;
                self.yuv_to_rgba(y_row[x], u_row[cx], v_row[cx], px);
            }
        }
    }
}

/// Plane 2 is red, plane 0 green, plane 1 blue.
fn gbr_to_rgba(src: &VideoFrame, dst: &mut [u8]) {
    let [gs, bs, rs] = src.linesize;

    for row in 0..src.height {
        let g_row = &src.planes[0][row * gs..];
        let b_row = &src.planes[1][row * bs..];
        let r_row = &src.planes[2][row * rs..];
        let out_row = &mut dst[row * src.width * 4..(row + 1) * src.width * 4];

        for (x, px) in out_row.chunks_exact_mut(4).enumerate() {
            px[0] = r_row[x];
            px[1] = g_row[x];
            px[2] = b_row[x];
            px[3] = 255;
        }
    }
}
