use crate::InvalidInput;

/// Interleaved 8-bit RGB image, row-major, `len = w * h * 3`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl RgbImage {
    pub const CHANNELS: usize = 3;

    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height * Self::CHANNELS],
        }
    }

    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Result<Self, InvalidInput> {
        let expected = width * height * Self::CHANNELS;
        if data.len() != expected {
            return Err(InvalidInput::BufferSize {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Interleave three equally sized planes.
    pub fn from_planes(
        width: usize,
        height: usize,
        planes: [&[u8]; 3],
    ) -> Result<Self, InvalidInput> {
        let n = width * height;
        if let Some(bad) = planes.iter().find(|p| p.len() != n) {
            return Err(InvalidInput::BufferSize {
                expected: n,
                got: bad.len(),
            });
        }
        let mut data = Vec::with_capacity(n * Self::CHANNELS);
        for i in 0..n {
            data.extend(planes.iter().map(|p| p[i]));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.width + x) * Self::CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Extract one channel as a contiguous plane.
    pub fn channel(&self, c: usize) -> Vec<u8> {
        self.data
            .iter()
            .skip(c)
            .step_by(Self::CHANNELS)
            .copied()
            .collect()
    }
}

/// Single-channel label mask, row-major. `0` is background.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl Mask {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Result<Self, InvalidInput> {
        if data.len() != width * height {
            return Err(InvalidInput::BufferSize {
                expected: width * height,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> u8) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    /// Value at signed coordinates, `0` outside the mask.
    #[inline]
    pub fn get_or_zero(&self, x: i64, y: i64) -> u8 {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return 0;
        }
        self.data[y as usize * self.width + x as usize]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: u8) {
        self.data[y * self.width + x] = v;
    }

    /// Fill the half-open rectangle `[x0, x1) x [y0, y1)`, clipped to the mask.
    pub fn fill_rect(&mut self, x0: usize, y0: usize, x1: usize, y1: usize, v: u8) {
        for y in y0..y1.min(self.height) {
            for x in x0..x1.min(self.width) {
                self.set(x, y, v);
            }
        }
    }

    pub fn count_nonzero(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|&v| v == 0)
    }
}

/// One raster band as `f64` samples, row-major. Non-finite values are nodata.
#[derive(Clone, Debug, PartialEq)]
pub struct Band {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f64>,
}

impl Band {
    pub fn new(width: usize, height: usize, fill: f64) -> Self {
        Self {
            width,
            height,
            data: vec![fill; width * height],
        }
    }

    pub fn from_raw(width: usize, height: usize, data: Vec<f64>) -> Result<Self, InvalidInput> {
        if data.len() != width * height {
            return Err(InvalidInput::BufferSize {
                expected: width * height,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.width + x]
    }

    /// Min and max over finite samples, `None` if there are none.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planes_interleave() {
        let r = [1u8, 2, 3, 4];
        let g = [10u8, 20, 30, 40];
        let b = [100u8, 200, 250, 255];
        let img = RgbImage::from_planes(2, 2, [&r, &g, &b]).unwrap();
        assert_eq!(img.pixel(1, 0), [2, 20, 200]);
        assert_eq!(img.pixel(0, 1), [3, 30, 250]);
        assert_eq!(img.channel(2), b.to_vec());
        assert!(RgbImage::from_planes(2, 2, [&r, &g, &b[..3]]).is_err());
    }

    #[test]
    fn mask_helpers() {
        let mut m = Mask::new(5, 4);
        m.fill_rect(1, 1, 10, 3, 2);
        assert_eq!(m.count_nonzero(), 8);
        assert_eq!(m.get_or_zero(-1, 0), 0);
        assert_eq!(m.get_or_zero(4, 2), 2);
        assert!(!m.is_empty());
        assert!(Mask::from_raw(2, 2, vec![0; 3]).is_err());
    }

    #[test]
    fn band_min_max_ignores_nodata() {
        let b = Band::from_raw(2, 2, vec![f64::NAN, 3.0, -1.0, f64::INFINITY]).unwrap();
        assert_eq!(b.min_max(), Some((-1.0, 3.0)));
        assert_eq!(Band::new(3, 1, f64::NAN).min_max(), None);
    }
}
