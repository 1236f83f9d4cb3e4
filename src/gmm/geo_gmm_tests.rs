use super::*;
use crate::srs::{bounding_box, lat_bounds, SRID_WGS84};
use approx::assert_relative_eq;
use geo::{BoundingRect, Rect};

fn params(pairs: &[(&str, &str)]) -> ModelParams {
    ModelParams::from_pairs(pairs.iter().copied()).expect("valid params")
}

fn mp(coords: &[(f64, f64)]) -> GeoMultiPoint {
    GeoMultiPoint::from_coords(SRID_WGS84, coords).expect("wgs84")
}

fn pt(x: f64, y: f64) -> GeoPoint {
    Geom::new(SRID_WGS84, Point::new(x, y)).expect("wgs84")
}

fn bbox(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> GeoPolygon {
    Geom::new(SRID_WGS84, Rect::new((xmin, ymin), (xmax, ymax)).to_polygon()).expect("wgs84")
}

fn weights(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|&(k, v)| (k.to_string(), v)).collect()
}

/// Two components pinned at (1, 1) and (10, 10), combined alone and prepared.
fn two_spikes() -> GeoGmm {
    let p = params(&[("component_sz_min", "1")]);
    let g = GeoGmm::from_fit(&mp(&[(1.0, 1.0), (10.0, 10.0)]), 2, &["foo"], &p).expect("fit");
    GeoGmm::combine(&[&g], &weights(&[("foo", 1.0)]), 0.95, &p)
        .expect("combine")
        .expect("nonzero weight")
}

fn blobs() -> GeoGmm {
    let mut coords = Vec::new();
    for (cx, cy) in [(0.0, 0.0), (8.0, 4.0)] {
        for i in 0..5 {
            for j in 0..5 {
                coords.push((cx + 0.3 * f64::from(i), cy + 0.2 * f64::from(j)));
            }
        }
    }
    let p = params(&[]);
    let mut g = GeoGmm::from_fit(&mp(&coords), 2, &["blob"], &p).expect("fit");
    g.prepare(Some(0.5)).expect("prepare");
    g
}

#[test]
fn test_best_point_weighted_avg() {
    let p = params(&[("component_sz_min", "1")]);
    let points = mp(&[(1.0, 1.0), (1.1, 1.0), (0.9, 1.1), (5.0, 5.0), (4.5, 5.0)]);
    let mut g = GeoGmm::from_fit(&points, 2, &["foo"], &p).expect("fit");
    g.populate_best_point().expect("best point");
    let bp = g.best_point().expect("populated");
    assert_relative_eq!(bp.x(), 2.5, epsilon = 1e-6);
    assert_relative_eq!(bp.y(), 2.62, epsilon = 1e-6);
}

#[test]
fn test_best_point_max_mean() {
    let p = params(&[("component_sz_min", "1"), ("best_point_f", "max_mean")]);
    let points = mp(&[(1.0, 1.0), (1.1, 1.0), (0.9, 1.1), (5.0, 5.0), (4.5, 5.0)]);
    let mut g = GeoGmm::from_fit(&points, 2, &["foo"], &p).expect("fit");
    g.populate_best_point().expect("best point");
    let bp = g.best_point().expect("populated");
    assert_relative_eq!(bp.x(), 1.0, epsilon = 1e-6);
    assert_relative_eq!(bp.y(), 1.1 / 3.0 + 2.0 / 3.0, epsilon = 1e-6);
}

#[test]
fn test_parse_best_point() {
    assert_eq!("max_mean".parse::<BestPoint>().expect("known"), BestPoint::MaxMean);
    assert!("median".parse::<BestPoint>().is_err());
}

#[test]
fn test_combine_single_input_is_identity() {
    let p = params(&[("component_sz_min", "1")]);
    let g = GeoGmm::from_fit(&mp(&[(1.0, 2.0), (3.0, 4.0), (7.0, 1.0)]), 2, &["foo"], &p)
        .expect("fit");
    let c = GeoGmm::combine(&[&g], &weights(&[("foo", 0.25)]), 0.9, &p)
        .expect("combine")
        .expect("nonzero weight");
    assert_eq!(c.mixture().means(), g.mixture().means());
    assert_eq!(c.mixture().covariances(), g.mixture().covariances());
    for (a, b) in c.mixture().weights().iter().zip(g.mixture().weights()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-12);
    }
    assert_eq!(c.explanation(), weights(&[("foo", 1.0)]));
    assert!(c.prepared());
    assert!(c.fit_stats().is_none());
    assert_ne!(c.id(), g.id());
}

#[test]
fn test_combine_token_accounting() {
    let p = params(&[("component_sz_min", "1")]);
    let points = mp(&[(1.0, 2.0), (3.0, 4.0)]);
    let gs: Vec<GeoGmm> = ["a", "b", "c", "d"]
        .iter()
        .map(|t| GeoGmm::from_fit(&points, 1, &[*t], &p).expect("fit"))
        .collect();
    let refs: Vec<&GeoGmm> = gs.iter().collect();
    // d sits exactly at the drop threshold and is removed.
    let w = weights(&[("a", 1.0), ("b", 3.0), ("c", 4.0), ("d", 0.004)]);
    let c = GeoGmm::combine(&refs, &w, 0.5, &p).expect("combine").expect("some");
    let tokens: Vec<&str> = c.tokens().keys().map(String::as_str).collect();
    assert_eq!(tokens, vec!["a", "b", "c"]);
    assert_relative_eq!(c.tokens().values().sum::<f64>(), 1.0, epsilon = 1e-12);
    assert_relative_eq!(c.tokens()["c"], 0.5, epsilon = 1e-12);
    assert_relative_eq!(c.mixture().weights().iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    assert_eq!(c.n_points(), 6);
}

#[test]
fn test_combine_null_location() {
    let p = params(&[("component_sz_min", "1")]);
    let g = GeoGmm::from_fit(&mp(&[(1.0, 2.0), (3.0, 4.0)]), 1, &["foo"], &p).expect("fit");
    assert!(GeoGmm::combine(&[&g], &weights(&[("foo", 0.0)]), 0.95, &p)
        .expect("combine")
        .is_none());
    assert!(GeoGmm::combine(&[&g], &weights(&[]), 0.95, &p).expect("combine").is_none());
    assert!(GeoGmm::combine(&[], &weights(&[("foo", 1.0)]), 0.95, &p)
        .expect("combine")
        .is_none());
}

#[test]
#[should_panic(expected = "SRID mismatch")]
fn test_combine_rejects_mixed_srids() {
    let p = params(&[("component_sz_min", "1")]);
    let a = GeoGmm::from_fit(&mp(&[(1.0, 2.0), (3.0, 4.0)]), 1, &["a"], &p).expect("fit");
    let other = GeoMultiPoint::from_coords(54003, &[(1.0, 2.0), (3.0, 4.0)]).expect("miller");
    let b = GeoGmm::from_fit(&other, 1, &["b"], &p).expect("fit");
    let _ = GeoGmm::combine(&[&a, &b], &weights(&[("a", 1.0), ("b", 1.0)]), 0.5, &p);
}

#[test]
#[should_panic(expected = "single-token")]
fn test_combine_rejects_combined_inputs() {
    let p = params(&[("component_sz_min", "1")]);
    let points = mp(&[(1.0, 2.0), (3.0, 4.0)]);
    let a = GeoGmm::from_fit(&points, 1, &["a"], &p).expect("fit");
    let b = GeoGmm::from_fit(&points, 1, &["b"], &p).expect("fit");
    let w = weights(&[("a", 1.0), ("b", 1.0)]);
    let c = GeoGmm::combine(&[&a, &b], &w, 0.5, &p).expect("combine").expect("some");
    let _ = GeoGmm::combine(&[&c], &w, 0.5, &p);
}

#[test]
fn test_samples_sorted_and_deterministic() {
    let g = two_spikes();
    let samples = g.samples().expect("prepared");
    assert_eq!(samples.len(), 1000);
    assert!(samples.windows(2).all(|w| w[0].log_prob >= w[1].log_prob));
    for s in samples {
        let (lp, c) = g.mixture().score_and_component(s.point[0], s.point[1]);
        assert_eq!(lp, s.log_prob);
        assert_eq!(c, s.component);
    }
    let again = two_spikes();
    assert_eq!(again.samples(), g.samples());
}

#[test]
fn test_unprepare_releases_samples() {
    let mut g = two_spikes();
    let before: Vec<Sample> = g.samples().expect("prepared").to_vec();
    g.unprepare();
    g.unprepare();
    assert!(!g.prepared());
    assert!(g.samples().is_none());
    assert!(g.samples_inbound().is_none());
    g.prepare(None).expect("re-prepare");
    assert_eq!(g.samples().expect("prepared"), &before[..]);
}

#[test]
fn test_pred_region_needs_samples() {
    let p = params(&[("component_sz_min", "1")]);
    let mut g = GeoGmm::from_fit(&mp(&[(1.0, 2.0), (3.0, 4.0)]), 1, &["foo"], &p).expect("fit");
    assert!(g.prepare(None).is_err());
    assert!(g.populate_pred_region(0.5).is_err());
    assert!(!g.prepared());
}

#[test]
fn test_pred_region_rejects_bad_coverage() {
    let mut g = two_spikes();
    for c in [0.0, 1.0, -0.5, f64::NAN] {
        assert!(matches!(
            g.populate_pred_region(c),
            Err(GeolocError::InvalidHyperparameter { .. })
        ));
    }
    assert!(g.prepare(Some(1.0)).is_err());
    assert_eq!(g.pred_coverage(), Some(0.95));
    assert!(g.populate_pred_region(0.5).is_ok());
}

#[test]
fn test_likelihood_polygon() {
    let g = two_spikes();
    let big = g.likelihood_polygon(&bbox(0.9, 0.9, 1.1, 1.1)).expect("prepared");
    let small = g.likelihood_polygon(&bbox(0.95, 0.95, 1.05, 1.05)).expect("prepared");
    assert!(big > 0.45 && big < 0.55, "big {big}");
    assert!(small > 0.33 && small < 0.45, "small {small}");
    let far = bbox(50.0, 50.0, 51.0, 51.0);
    let hits = g.likelihood_polygons(
        &[bbox(0.9, 0.9, 1.1, 1.1), far, bbox(0.95, 0.95, 1.05, 1.05)],
        LIKELIHOOD_THRESHOLD,
    );
    assert_eq!(hits.iter().map(|h| h.0).collect::<Vec<_>>(), vec![0, 2]);
    assert_eq!(hits[0].1, big);
}

#[test]
fn test_coverage_monotonicity() {
    let mut g = blobs();
    let mut last = 0.0;
    for c in [0.1, 0.3, 0.5, 0.7, 0.9, 0.99] {
        g.populate_pred_region(c).expect("region");
        let area = g.pred_area().expect("area");
        assert!(area >= last - 1e-6, "area {area} < {last} at {c}");
        last = area;
    }
    assert!(last > 0.0);
}

#[test]
fn test_threshold_matches_coverage() {
    let g = blobs();
    let t = g.pred_region_threshold().expect("region");
    let samples = g.samples().expect("prepared");
    let above = samples.iter().filter(|s| s.log_prob > t).count();
    assert!((499..=500).contains(&above), "above {above}");
}

#[test]
fn test_tiny_coverage_pads_the_top_sample() {
    let mut g = blobs();
    g.populate_pred_region(0.001).expect("region");
    assert!(!g.pred_region().expect("region").geom().0.is_empty());
    let area = g.pred_area().expect("area");
    assert!(area > 0.0 && area < 1.0, "area {area}");
    let top = g.samples().expect("prepared")[0].point;
    assert!(g.covers_p(&pt(top[0], top[1])));
}

#[test]
fn test_collinear_samples_give_nonempty_region() {
    let mut g = blobs();
    g.samples = Some(
        (0..10)
            .map(|i| Sample {
                point: [0.1 * f64::from(i), 0.1 * f64::from(i)],
                log_prob: -f64::from(i),
                component: 0,
            })
            .collect(),
    );
    g.populate_pred_region(0.5).expect("region");
    assert!(!g.pred_region().expect("region").geom().0.is_empty());
    assert!(g.pred_area().expect("area") > 0.0);
    for i in 0..5 {
        let v = 0.1 * f64::from(i);
        assert!(g.covers_p(&pt(v, v)), "sample {i} not covered");
    }
    assert!(!g.covers_p(&pt(0.9, 0.9)));
}

#[test]
fn test_metrics_near_and_far() {
    let g = two_spikes();
    let near = pt(1.0, 1.0);
    let far = pt(-40.0, -40.0);
    assert!(g.coverst_p(&near));
    assert!(g.covers_p(&near));
    assert!(!g.coverst_p(&far));
    assert!(!g.covers_p(&far));
    assert_relative_eq!(g.contour(&near), 1.0);
    assert_relative_eq!(g.contour(&far), 0.0);
    // Samples split between the two spikes, ~1400 km apart.
    let cae = g.cae(&near);
    assert!(cae > 500.0 && cae < 900.0, "cae {cae}");
    // Best point is midway, inside neither spike's hull.
    assert!(!g.covers_p(g.best_point().expect("best point")));
    assert!(g.sae(&near) > 600.0);
}

#[test]
fn test_cae_of_tight_component() {
    let p = params(&[("component_sz_min", "1")]);
    let g = GeoGmm::from_fit(&mp(&[(1.0, 1.0)]), 1, &["foo"], &p).expect("fit");
    let c = GeoGmm::combine(&[&g], &weights(&[("foo", 1.0)]), 0.9, &p)
        .expect("combine")
        .expect("some");
    let truth = pt(1.0, 1.0);
    assert!(c.cae(&truth) < 10.0);
    assert!(c.sae(&truth) < 1e-6);
}

#[test]
#[should_panic(expected = "SRID")]
fn test_score_pt_rejects_other_srid() {
    let g = two_spikes();
    let p = Geom::new(54003, Point::new(1.0, 1.0)).expect("miller");
    let _ = g.score_pt(&p);
}

#[test]
fn test_polar_samples_are_trimmed() {
    let p = params(&[("component_sz_min", "1")]);
    let points = mp(&[(9.9, 89.97), (10.0, 89.99), (10.1, 89.98)]);
    let mut g = GeoGmm::from_fit(&points, 1, &["polar"], &p).expect("fit");
    g.prepare(Some(0.9)).expect("prepare");
    let n_in = g.samples_inbound().expect("prepared").len();
    assert!(n_in < 1000 && n_in > 0, "inbound {n_in}");
    let (_, north) = lat_bounds(&SpatialRef::WGS84);
    let region = g.pred_region().expect("region");
    if let Some(r) = region.geom().bounding_rect() {
        assert!(r.max().y <= north + 1e-9);
    }
    let world = bounding_box(&SpatialRef::WGS84);
    assert!(g.likelihood_polygon(&world).expect("prepared") < 1.0);
}

#[test]
fn test_to_geojson() {
    let g = two_spikes();
    let gj = g.to_geojson().expect("geojson");
    assert_eq!(gj["features"][1]["geometry"]["type"], "MultiPolygon");
    assert_eq!(gj["features"][1]["properties"]["coverage"], 0.95);
}
