use crate::error::Result;
use crate::estimate::LocationEstimate;
use crate::srs::{transform, GeoPoint};
use serde::Serialize;
use std::collections::BTreeMap;

/// Accuracy of one estimate against the true location, ready to serialize.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimateReport {
    /// Distance from the best point, km.
    pub sae: f64,
    /// Comprehensive error, km.
    pub cae: f64,
    /// Contour of the true point; -1 when the estimate has none.
    pub contour: f64,
    /// Prediction region contains the true point.
    pub covers: bool,
    /// Estimate-specific coverage test.
    pub coverst: bool,
    /// Prediction region area, km².
    pub pred_area: Option<f64>,
    /// Coverage the region was built for.
    pub pred_coverage: Option<f64>,
    /// Best point in the estimate's SRID.
    pub best_point: Option<[f64; 2]>,
    /// Contributing factors and their weights.
    pub explanation: BTreeMap<String, f64>,
}

impl EstimateReport {
    /// Evaluates a prepared `estimate` against `true_point`, which is first
    /// brought into the estimate's SRID.
    ///
    /// # Errors
    ///
    /// Fails if `true_point` cannot be transformed.
    ///
    /// # Panics
    ///
    /// Panics if `estimate` is not prepared.
    pub fn evaluate(estimate: &dyn LocationEstimate, true_point: &GeoPoint) -> Result<Self> {
        let pt = transform(true_point, estimate.srid())?;
        Ok(Self {
            sae: estimate.sae(&pt),
            cae: estimate.cae(&pt),
            contour: estimate.contour(&pt),
            covers: estimate.covers_p(&pt),
            coverst: estimate.coverst_p(&pt),
            pred_area: estimate.pred_area(),
            pred_coverage: estimate.pred_coverage(),
            best_point: estimate.best_point().map(|p| [p.x(), p.y()]),
            explanation: estimate.explanation(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmm::GeoGmm;
    use crate::model::ModelParams;
    use crate::srs::{transform_copy, GeoMultiPoint, Geom, SRID_WGS84};
    use geo::Point;

    fn estimate(srid: u32) -> GeoGmm {
        let params = ModelParams::default();
        let mp = GeoMultiPoint::from_coords(
            SRID_WGS84,
            &[(-106.6, 35.1), (-106.7, 35.0), (-106.5, 35.2), (-106.6, 35.0), (-106.65, 35.15)],
        )
        .expect("wgs84");
        let mp = transform_copy(&mp, srid).expect("project");
        let mut g = GeoGmm::fit_token("abq", &mp, &params).expect("fit");
        g.prepare(Some(0.9)).expect("prepare");
        g
    }

    #[test]
    fn test_near_and_far() {
        let est = estimate(SRID_WGS84);
        let near = Geom::new(SRID_WGS84, Point::new(-106.6, 35.1)).expect("wgs84");
        let r = EstimateReport::evaluate(&est, &near).expect("report");
        assert!(r.sae < 10.0);
        assert!(r.covers && r.coverst);
        assert!(r.contour > 0.5);
        assert_eq!(r.pred_coverage, Some(0.9));
        assert_eq!(r.explanation["abq"], 1.0);

        let far = Geom::new(SRID_WGS84, Point::new(-74.0, 40.7)).expect("wgs84");
        let r = EstimateReport::evaluate(&est, &far).expect("report");
        assert!(r.sae > 2500.0 && r.cae > 2500.0);
        assert!(!r.covers && !r.coverst);
        assert!(r.contour < 0.01);
    }

    #[test]
    fn test_reprojects_true_point() {
        let est = estimate(54009);
        let near = Geom::new(SRID_WGS84, Point::new(-106.6, 35.1)).expect("wgs84");
        let r = EstimateReport::evaluate(&est, &near).expect("report");
        assert!(r.sae < 10.0);
        assert!(r.covers);
        let json = serde_json::to_value(&r).expect("json");
        assert!(json["pred_area"].as_f64().expect("area") > 0.0);
    }
}
