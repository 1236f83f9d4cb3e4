use crate::error::{GeolocError, Result};
use crate::estimate::LocationEstimate;
use crate::traits::LocationModel;

/// Asks sub-models in order; the first estimate wins.
///
/// # Examples
///
/// ```
/// use geoloc::estimate::FixedModel;
/// use geoloc::model::{ModelParams, PipelineModel};
/// use geoloc::traits::LocationModel;
///
/// let p = ModelParams::default();
/// let never = FixedModel::new(4326, &p).unwrap().with_fail_interval(1);
/// let always = FixedModel::new(4326, &p).unwrap().with_fail_interval(0);
/// let models: Vec<Box<dyn LocationModel>> = vec![Box::new(never), Box::new(always)];
/// let mut m = PipelineModel::new(models).unwrap();
/// m.build().unwrap();
/// assert!(m.locate(&["foo"], 0.5).unwrap().is_some());
/// ```
pub struct PipelineModel {
    models: Vec<Box<dyn LocationModel>>,
}

impl PipelineModel {
    /// Pipeline over `models`, which must share an SRID.
    ///
    /// # Errors
    ///
    /// Fails if `models` is empty or their SRIDs differ.
    pub fn new(models: Vec<Box<dyn LocationModel>>) -> Result<Self> {
        let first = models
            .first()
            .ok_or_else(|| GeolocError::empty_input("pipeline models"))?
            .srid();
        if let Some(m) = models.iter().find(|m| m.srid() != first) {
            return Err(GeolocError::SridMismatch {
                expected: first,
                actual: m.srid(),
            });
        }
        Ok(Self { models })
    }

    /// Number of sub-models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Always false; an empty pipeline cannot be constructed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl std::fmt::Debug for PipelineModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineModel")
            .field("models", &self.models.len())
            .finish()
    }
}

impl LocationModel for PipelineModel {
    fn build(&mut self) -> Result<()> {
        self.models.iter_mut().try_for_each(|m| m.build())
    }

    fn locate(&self, tokens: &[&str], confidence: f64) -> Result<Option<Box<dyn LocationEstimate>>> {
        for m in &self.models {
            if let Some(est) = m.locate(tokens, confidence)? {
                return Ok(Some(est));
            }
        }
        Ok(None)
    }

    fn srid(&self) -> u32 {
        self.models[0].srid()
    }
}
