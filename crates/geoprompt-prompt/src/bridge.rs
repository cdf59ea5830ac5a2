use std::sync::Arc;

use geoprompt_core::{BoundingBox, Crs, InvalidInput, Mask, Reprojector};
use geoprompt_raster::ImageContext;
use geoprompt_vector::{extract_polygons, Feature, Polygon, VectorSink};
use log::{debug, info};
use parking_lot::RwLock;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Embedding, ModelHandle, ModelSlot, PixelPrompt, PointLabel, PromptError, PromptPoint,
};

/// An embedded image ready for prompting.
#[derive(Debug)]
pub struct Session {
    pub context: Arc<ImageContext>,
    pub embedding: Embedding,
    /// Model that produced `embedding`.
    pub model: Arc<ModelHandle>,
}

/// Resolves world-space prompts against the active image and turns the
/// returned masks into polygons in the caller's CRS.
pub struct PromptBridge {
    slot: Arc<ModelSlot>,
    reprojector: Arc<dyn Reprojector>,
    session: RwLock<Option<Arc<Session>>>,
}

fn scale_is_zero() -> PromptError {
    InvalidInput::NonPositive {
        name: "source pixel scale",
    }
    .into()
}

impl PromptBridge {
    pub fn new(slot: Arc<ModelSlot>, reprojector: Arc<dyn Reprojector>) -> Self {
        Self {
            slot,
            reprojector,
            session: RwLock::new(None),
        }
    }

    pub fn slot(&self) -> &Arc<ModelSlot> {
        &self.slot
    }

    /// Current session, if any.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.read().clone()
    }

    /// Embed `context` with the current model and make it the active session.
    pub fn set_context(&self, context: Arc<ImageContext>) -> Result<(), PromptError> {
        let model = self.slot.snapshot()?;
        let embedding = model.model.embed(context.image())?;
        info!(
            "image context {}x{} over {} embedded (model generation {})",
            context.width(),
            context.height(),
            context.source_bbox(),
            model.generation
        );
        *self.session.write() = Some(Arc::new(Session {
            context,
            embedding,
            model,
        }));
        Ok(())
    }

    pub fn clear_context(&self) {
        *self.session.write() = None;
    }

    /// Active session, re-embedded first if the slot has committed a newer
    /// model since the session was built.
    fn active(&self) -> Result<Arc<Session>, PromptError> {
        let session = self.session().ok_or(PromptError::NoActiveContext)?;
        let current = self.slot.snapshot()?;
        if current.generation == session.model.generation {
            return Ok(session);
        }

        let embedding = current.model.embed(session.context.image())?;
        debug!(
            "re-embedded active context for model generation {} (was {})",
            current.generation, session.model.generation
        );
        let fresh = Arc::new(Session {
            context: session.context.clone(),
            embedding,
            model: current,
        });
        let mut stored = self.session.write();
        // a context set meanwhile wins over the refreshed one
        if stored.as_ref().is_some_and(|s| Arc::ptr_eq(s, &session)) {
            *stored = Some(fresh.clone());
        }
        Ok(fresh)
    }

    fn to_pixels(
        &self,
        session: &Session,
        points: &[PromptPoint],
    ) -> Result<Vec<PixelPrompt>, PromptError> {
        let ctx = &session.context;
        points
            .iter()
            .map(|p| {
                let (x, y) = self
                    .reprojector
                    .reproject_point(p.x, p.y, &p.crs, ctx.source_crs())?;
                let (px, py) = ctx.internal_point(x, y).ok_or_else(scale_is_zero)?;
                Ok(PixelPrompt {
                    x: px,
                    y: py,
                    label: p.label,
                })
            })
            .collect()
    }

    fn vectorize(
        &self,
        session: &Session,
        mask: Option<Mask>,
        output_crs: &Crs,
    ) -> Result<Vec<Polygon>, PromptError> {
        let Some(mask) = mask else {
            return Ok(Vec::new());
        };
        let ctx = &session.context;
        if (mask.width, mask.height) != (ctx.width(), ctx.height()) {
            return Err(InvalidInput::MaskSize {
                expected: (ctx.width(), ctx.height()),
                got: (mask.width, mask.height),
            }
            .into());
        }
        let transform = session
            .context
            .output_transform(output_crs, self.reprojector.as_ref())?;
        let polygons: Vec<Polygon> = extract_polygons(&mask, &transform, output_crs)
            .into_iter()
            .map(|v| v.polygon)
            .collect();
        debug!("mask yielded {} polygon(s) in {output_crs}", polygons.len());
        Ok(polygons)
    }

    fn run_points(
        &self,
        session: &Session,
        points: &[PromptPoint],
        output_crs: &Crs,
    ) -> Result<Vec<Polygon>, PromptError> {
        if points.is_empty() {
            return Err(InvalidInput::NoPoints.into());
        }
        output_crs.ensure_resolved()?;
        let pixels = self.to_pixels(session, points)?;
        let mask = session
            .model
            .model
            .prompt_points(&session.embedding, &pixels)?;
        self.vectorize(session, mask, output_crs)
    }

    fn run_box(
        &self,
        session: &Session,
        bbox: &BoundingBox,
        output_crs: &Crs,
    ) -> Result<Vec<Polygon>, PromptError> {
        bbox.validate()?;
        output_crs.ensure_resolved()?;
        let ctx = &session.context;
        let native = self.reprojector.reproject_bbox(bbox, ctx.source_crs())?;
        let pixel_box = ctx.internal_box(&native)?.ok_or_else(scale_is_zero)?;
        let mask = session
            .model
            .model
            .prompt_box(&session.embedding, pixel_box)?;
        self.vectorize(session, mask, output_crs)
    }

    /// Segment from labelled points; polygons are returned in `output_crs`.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(points = points.len()))
    )]
    pub fn point_prompt(
        &self,
        points: &[PromptPoint],
        output_crs: &Crs,
    ) -> Result<Vec<Polygon>, PromptError> {
        let session = self.active()?;
        self.run_points(&session, points, output_crs)
    }

    /// Segment from a box in any CRS; polygons are returned in `output_crs`.
    pub fn box_prompt(
        &self,
        bbox: &BoundingBox,
        output_crs: &Crs,
    ) -> Result<Vec<Polygon>, PromptError> {
        let session = self.active()?;
        self.run_box(&session, bbox, output_crs)
    }

    /// Live preview while the pointer moves.
    ///
    /// `pointer` is treated as an extra foreground point after `committed`.
    /// Nothing is persisted and failures only produce an empty preview.
    pub fn stream_points(
        &self,
        committed: &[PromptPoint],
        pointer: &PromptPoint,
        output_crs: &Crs,
    ) -> Vec<Polygon> {
        let mut points = Vec::with_capacity(committed.len() + 1);
        points.extend_from_slice(committed);
        points.push(PromptPoint {
            label: PointLabel::Foreground,
            ..pointer.clone()
        });
        match self.point_prompt(&points, output_crs) {
            Ok(polygons) => polygons,
            Err(e) => {
                debug!("preview prompt failed: {e}");
                Vec::new()
            }
        }
    }

    /// Write `polygons` unless a different model was committed while the
    /// prompt ran.
    fn commit(
        &self,
        session: &Session,
        polygons: Vec<Polygon>,
        class_id: i64,
        sink: &mut dyn VectorSink,
    ) -> Result<Vec<Feature>, PromptError> {
        let started = session.model.generation;
        let current = self.slot.generation();
        if current != started {
            return Err(PromptError::Superseded { started, current });
        }
        let features: Vec<Feature> = polygons
            .into_iter()
            .enumerate()
            .map(|(i, p)| Feature::new(p, i as u64 + 1, class_id))
            .collect();
        sink.write_features(&features)?;
        info!("committed {} feature(s) with class {class_id}", features.len());
        Ok(features)
    }

    /// Run a point prompt and write the result to `sink` once.
    pub fn finalize_points(
        &self,
        points: &[PromptPoint],
        output_crs: &Crs,
        class_id: i64,
        sink: &mut dyn VectorSink,
    ) -> Result<Vec<Feature>, PromptError> {
        let session = self.active()?;
        let polygons = self.run_points(&session, points, output_crs)?;
        self.commit(&session, polygons, class_id, sink)
    }

    /// Run a box prompt and write the result to `sink` once.
    pub fn finalize_box(
        &self,
        bbox: &BoundingBox,
        output_crs: &Crs,
        class_id: i64,
        sink: &mut dyn VectorSink,
    ) -> Result<Vec<Feature>, PromptError> {
        let session = self.active()?;
        let polygons = self.run_box(&session, bbox, output_crs)?;
        self.commit(&session, polygons, class_id, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ModelError, ModelLoader, ModelSpec, SegmentationModel};
    use geoprompt_core::{BuiltinReprojector, RgbImage};
    use geoprompt_vector::MemorySink;
    use parking_lot::Mutex;

    /// Records the pixel prompts it receives and answers with a fixed square.
    #[derive(Default)]
    struct Recorder {
        points: Mutex<Vec<PixelPrompt>>,
        boxes: Mutex<Vec<[f64; 4]>>,
        fail: bool,
    }

    impl SegmentationModel for Recorder {
        fn embed(&self, image: &RgbImage) -> Result<Embedding, ModelError> {
            Ok(Embedding::new((image.width, image.height)))
        }
        fn prompt_points(
            &self,
            e: &Embedding,
            p: &[PixelPrompt],
        ) -> Result<Option<Mask>, ModelError> {
            if self.fail {
                return Err(ModelError::new("out of memory"));
            }
            self.points.lock().extend_from_slice(p);
            let &(w, h) = e.downcast_ref::<(usize, usize)>().ok_or_else(|| ModelError::new("bad embedding"))?;
            let mut m = Mask::new(w, h);
            m.fill_rect(10, 10, 20, 20, 1);
            Ok(Some(m))
        }
        fn prompt_box(&self, _e: &Embedding, b: [f64; 4]) -> Result<Option<Mask>, ModelError> {
            self.boxes.lock().push(b);
            Ok(None)
        }
    }

    /// Loader that hands out a model the test keeps a handle to.
    struct Swap(Arc<Recorder>);

    impl ModelLoader for Swap {
        fn load(&self, _spec: &ModelSpec) -> Result<Arc<dyn SegmentationModel>, ModelError> {
            Ok(self.0.clone())
        }
    }

    /// Answers with a mask of a fixed size regardless of the embedding.
    struct FixedMask(usize, usize);

    impl SegmentationModel for FixedMask {
        fn embed(&self, _image: &RgbImage) -> Result<Embedding, ModelError> {
            Ok(Embedding::new(()))
        }
        fn prompt_points(
            &self,
            _e: &Embedding,
            _p: &[PixelPrompt],
        ) -> Result<Option<Mask>, ModelError> {
            let mut m = Mask::new(self.0, self.1);
            m.fill_rect(0, 0, 10, 10, 1);
            Ok(Some(m))
        }
        fn prompt_box(&self, _e: &Embedding, _b: [f64; 4]) -> Result<Option<Mask>, ModelError> {
            Ok(None)
        }
    }

    /// Switches the slot to another model while answering a prompt.
    #[derive(Default)]
    struct SwitchesMidPrompt {
        slot: std::sync::OnceLock<Arc<ModelSlot>>,
    }

    impl SegmentationModel for SwitchesMidPrompt {
        fn embed(&self, image: &RgbImage) -> Result<Embedding, ModelError> {
            Ok(Embedding::new((image.width, image.height)))
        }
        fn prompt_points(
            &self,
            _e: &Embedding,
            _p: &[PixelPrompt],
        ) -> Result<Option<Mask>, ModelError> {
            let slot = self.slot.get().ok_or_else(|| ModelError::new("no slot"))?;
            slot.switch("facebook/sam-vit-huge", "cpu", &Swap(Arc::default()))
                .map_err(|e| ModelError::new(e.to_string()))?;
            let mut m = Mask::new(100, 100);
            m.fill_rect(10, 10, 20, 20, 1);
            Ok(Some(m))
        }
        fn prompt_box(&self, _e: &Embedding, _b: [f64; 4]) -> Result<Option<Mask>, ModelError> {
            Ok(None)
        }
    }

    fn context() -> Arc<ImageContext> {
        Arc::new(ImageContext::new(
            RgbImage::new(100, 100),
            BoundingBox::new(0.0, 0.0, 200.0, 200.0, Crs::epsg(3857)),
            (1.0, 1.0),
            0.5,
        ))
    }

    fn bridge(model: Arc<Recorder>) -> PromptBridge {
        let slot = Arc::new(ModelSlot::with_model(model, ModelSpec::default()));
        PromptBridge::new(slot, Arc::new(BuiltinReprojector))
    }

    #[test]
    fn prompts_without_context_fail() {
        let b = bridge(Arc::new(Recorder::default()));
        let pts = [PromptPoint::foreground(1.0, 1.0, Crs::epsg(3857))];
        assert!(matches!(
            b.point_prompt(&pts, &Crs::epsg(3857)),
            Err(PromptError::NoActiveContext)
        ));
    }

    #[test]
    fn empty_points_are_invalid() {
        let b = bridge(Arc::new(Recorder::default()));
        b.set_context(context()).unwrap();
        assert!(matches!(
            b.point_prompt(&[], &Crs::epsg(3857)),
            Err(PromptError::Invalid(InvalidInput::NoPoints))
        ));
    }

    #[test]
    fn points_are_resolved_to_model_pixels() {
        let model = Arc::new(Recorder::default());
        let b = bridge(model.clone());
        b.set_context(context()).unwrap();
        let pts = [
            PromptPoint::foreground(50.0, 150.0, Crs::epsg(3857)),
            PromptPoint::background(100.0, 100.0, Crs::epsg(3857)),
        ];
        let polys = b.point_prompt(&pts, &Crs::epsg(3857)).unwrap();
        let seen = model.points.lock().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!((seen[0].x, seen[0].y), (25.0, 25.0));
        assert_eq!((seen[1].x, seen[1].y, seen[1].label), (50.0, 50.0, PointLabel::Background));

        // model square [10, 20) px is [20, 40] x [160, 180] in world units
        assert_eq!(polys.len(), 1);
        let bb = polys[0].bounds();
        assert_eq!((bb.x_min, bb.x_max, bb.y_min, bb.y_max), (20.0, 40.0, 160.0, 180.0));
    }

    #[test]
    fn box_is_flipped_into_pixel_order() {
        let model = Arc::new(Recorder::default());
        let b = bridge(model.clone());
        b.set_context(context()).unwrap();
        let polys = b
            .box_prompt(
                &BoundingBox::new(20.0, 40.0, 60.0, 180.0, Crs::epsg(3857)),
                &Crs::epsg(3857),
            )
            .unwrap();
        assert!(polys.is_empty());
        assert_eq!(model.boxes.lock()[0], [10.0, 10.0, 30.0, 80.0]);
    }

    #[test]
    fn project_placeholder_output_is_rejected() {
        let b = bridge(Arc::new(Recorder::default()));
        b.set_context(context()).unwrap();
        let pts = [PromptPoint::foreground(50.0, 50.0, Crs::epsg(3857))];
        let err = b.point_prompt(&pts, &Crs::project()).unwrap_err();
        assert!(matches!(err, PromptError::Invalid(InvalidInput::UnresolvedCrs(_))));
    }

    #[test]
    fn streaming_swallows_errors() {
        let b = bridge(Arc::new(Recorder {
            fail: true,
            ..Default::default()
        }));
        b.set_context(context()).unwrap();
        let pointer = PromptPoint::background(10.0, 10.0, Crs::epsg(3857));
        assert!(b.stream_points(&[], &pointer, &Crs::epsg(3857)).is_empty());
    }

    #[test]
    fn streaming_adds_pointer_as_foreground() {
        let model = Arc::new(Recorder::default());
        let b = bridge(model.clone());
        b.set_context(context()).unwrap();
        let committed = [PromptPoint::background(100.0, 100.0, Crs::epsg(3857))];
        let pointer = PromptPoint::background(10.0, 10.0, Crs::epsg(3857));
        let polys = b.stream_points(&committed, &pointer, &Crs::epsg(3857));
        assert_eq!(polys.len(), 1);
        let seen = model.points.lock().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].label, PointLabel::Foreground);
    }

    #[test]
    fn finalize_writes_once_with_attributes() {
        let b = bridge(Arc::new(Recorder::default()));
        b.set_context(context()).unwrap();
        let mut sink = MemorySink::new();
        let pts = [PromptPoint::foreground(50.0, 150.0, Crs::epsg(3857))];
        let features = b.finalize_points(&pts, &Crs::epsg(3857), 7, &mut sink).unwrap();
        assert_eq!(sink.writes, 1);
        assert_eq!(sink.features, features);
        assert_eq!(features[0].attributes.id, 1);
        assert_eq!(features[0].attributes.class, 7);
        assert_eq!(features[0].attributes.area, 400.0);
    }

    #[test]
    fn mask_of_wrong_size_is_rejected() {
        let slot = Arc::new(ModelSlot::with_model(
            Arc::new(FixedMask(50, 50)),
            ModelSpec::default(),
        ));
        let b = PromptBridge::new(slot, Arc::new(BuiltinReprojector));
        b.set_context(context()).unwrap();
        let pts = [PromptPoint::foreground(50.0, 150.0, Crs::epsg(3857))];
        let err = b.point_prompt(&pts, &Crs::epsg(3857)).unwrap_err();
        assert!(matches!(
            err,
            PromptError::Invalid(InvalidInput::MaskSize {
                expected: (100, 100),
                got: (50, 50)
            })
        ));
    }

    #[test]
    fn prompts_after_model_switch_use_new_model() {
        let old = Arc::new(Recorder::default());
        let new = Arc::new(Recorder::default());
        let b = bridge(old.clone());
        b.set_context(context()).unwrap();
        b.slot()
            .switch("facebook/sam-vit-huge", "cpu", &Swap(new.clone()))
            .unwrap();

        let mut sink = MemorySink::new();
        let pts = [PromptPoint::foreground(50.0, 150.0, Crs::epsg(3857))];
        let features = b.finalize_points(&pts, &Crs::epsg(3857), 1, &mut sink).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(sink.writes, 1);
        assert!(old.points.lock().is_empty());
        assert_eq!(new.points.lock().len(), 1);
        assert_eq!(b.session().unwrap().model.generation, 2);

        // later prompts keep the refreshed session
        b.finalize_points(&pts, &Crs::epsg(3857), 1, &mut sink).unwrap();
        assert_eq!(sink.writes, 2);
    }

    #[test]
    fn switch_during_prompt_discards_result() {
        let model = Arc::new(SwitchesMidPrompt::default());
        let slot = Arc::new(ModelSlot::with_model(model.clone(), ModelSpec::default()));
        assert!(model.slot.set(slot.clone()).is_ok());
        let b = PromptBridge::new(slot, Arc::new(BuiltinReprojector));
        b.set_context(context()).unwrap();

        let mut sink = MemorySink::new();
        let pts = [PromptPoint::foreground(50.0, 150.0, Crs::epsg(3857))];
        let err = b.finalize_points(&pts, &Crs::epsg(3857), 1, &mut sink).unwrap_err();
        assert!(matches!(err, PromptError::Superseded { started: 1, current: 2 }));
        assert_eq!(sink.writes, 0);

        // the next prompt runs on the model committed meanwhile
        b.finalize_points(&pts, &Crs::epsg(3857), 1, &mut sink).unwrap();
        assert_eq!(sink.writes, 1);
    }
}
