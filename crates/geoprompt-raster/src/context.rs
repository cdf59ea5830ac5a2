use geoprompt_core::{
    AffineTransform, BoundingBox, Crs, InvalidInput, ReprojectError, Reprojector, RgbImage,
};

/// Mapping between a source raster window and its resampled model-input image.
///
/// Built once per ROI selection and never mutated; owners swap the whole
/// value (usually behind an `Arc`) when the selection changes.
#[derive(Clone, Debug)]
pub struct ImageContext {
    image: RgbImage,
    source_bbox: BoundingBox,
    scale: (f64, f64),
    resolution_factor: f64,
}

impl ImageContext {
    /// `scale` is world units per source pixel, `resolution_factor` the
    /// source-to-model pixel ratio.
    pub fn new(
        image: RgbImage,
        source_bbox: BoundingBox,
        scale: (f64, f64),
        resolution_factor: f64,
    ) -> Self {
        Self {
            image,
            source_bbox,
            scale,
            resolution_factor,
        }
    }

    #[inline]
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.image.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.image.height
    }

    #[inline]
    pub fn source_bbox(&self) -> &BoundingBox {
        &self.source_bbox
    }

    #[inline]
    pub fn source_crs(&self) -> &Crs {
        &self.source_bbox.crs
    }

    #[inline]
    pub fn scale(&self) -> (f64, f64) {
        self.scale
    }

    #[inline]
    pub fn resolution_factor(&self) -> f64 {
        self.resolution_factor
    }

    /// Offset in source world units to offset in model pixels.
    #[inline]
    pub fn resolve(&self, dx: f64, dy: f64) -> (f64, f64) {
        (
            dx / self.scale.0 * self.resolution_factor,
            dy / self.scale.1 * self.resolution_factor,
        )
    }

    /// World point (source CRS) to model pixel, measured from the top-left
    /// corner of the source bbox. `None` when the scale is zero.
    pub fn internal_point(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        if self.scale.0 == 0.0 || self.scale.1 == 0.0 {
            return None;
        }
        Some(self.resolve(x - self.source_bbox.x_min, self.source_bbox.y_max - y))
    }

    /// Box in the source CRS to `[px_min, py_min, px_max, py_max]`.
    ///
    /// The world top edge (`y_max`) becomes the pixel `py_min` after the flip.
    pub fn internal_box(&self, bbox: &BoundingBox) -> Result<Option<[f64; 4]>, InvalidInput> {
        self.source_bbox.ensure_same_crs(bbox)?;
        let Some((x0, y0)) = self.internal_point(bbox.x_min, bbox.y_max) else {
            return Ok(None);
        };
        let Some((x1, y1)) = self.internal_point(bbox.x_max, bbox.y_min) else {
            return Ok(None);
        };
        Ok(Some([x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)]))
    }

    /// Model-pixel to source-world transform.
    pub fn pixel_to_world(&self) -> AffineTransform {
        let b = &self.source_bbox;
        AffineTransform::from_bounds(b.x_min, b.y_min, b.x_max, b.y_max, self.width(), self.height())
    }

    /// Source bbox expressed in `target`.
    ///
    /// `target` must already be concrete; the project placeholder is rejected.
    pub fn to_crs(
        &self,
        target: &Crs,
        reprojector: &dyn Reprojector,
    ) -> Result<BoundingBox, ReprojectError> {
        target.ensure_resolved()?;
        reprojector.reproject_bbox(&self.source_bbox, target)
    }

    /// Model-pixel to `target`-world transform for vectorizing masks.
    pub fn output_transform(
        &self,
        target: &Crs,
        reprojector: &dyn Reprojector,
    ) -> Result<AffineTransform, ReprojectError> {
        let b = self.to_crs(target, reprojector)?;
        Ok(AffineTransform::from_bounds(
            b.x_min,
            b.y_min,
            b.x_max,
            b.y_max,
            self.width(),
            self.height(),
        ))
    }
}
