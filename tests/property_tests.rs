//! Property-based tests using proptest.
//!
//! These tests verify invariants of mixtures, trimming, prediction regions
//! and token weights.

use geo::{MultiPoint, Point};
use geoloc::prelude::*;
use geoloc::srs::{self, GeodesicMethod, Trim};
use geoloc::weight::{inverse, scale};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn points_strategy(n: usize) -> impl Strategy<Value = Vec<(f64, f64)>> {
    proptest::collection::vec((-30.0f64..30.0, -30.0f64..30.0), n)
}

fn weights_strategy() -> impl Strategy<Value = BTreeMap<String, f64>> {
    proptest::collection::vec(-50.0f64..50.0, 1..8).prop_map(|v| {
        v.into_iter()
            .enumerate()
            .map(|(i, w)| (format!("t{i}"), w))
            .collect()
    })
}

fn fitted(token: &str, coords: &[(f64, f64)], k: usize) -> GeoGmm {
    let params = ModelParams::from_pairs([("component_sz_min", "1"), ("mc_sample_ct", "300")])
        .expect("params");
    let mp = GeoMultiPoint::from_coords(4326, coords).expect("wgs84");
    GeoGmm::from_fit(&mp, k, &[token], &params).expect("fit")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn fitted_weights_are_a_distribution(pts in points_strategy(12), k in 1usize..4) {
        let g = fitted("x", &pts, k);
        let w = g.mixture().weights();
        prop_assert!(w.iter().all(|&v| v >= 0.0));
        prop_assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn combined_weights_are_a_distribution(
        a in points_strategy(8),
        b in points_strategy(8),
        wa in 0.0f64..5.0,
        wb in 0.01f64..5.0,
    ) {
        let ga = fitted("a", &a, 2);
        let gb = fitted("b", &b, 1);
        let weights: BTreeMap<String, f64> =
            [("a".to_string(), wa), ("b".to_string(), wb)].into_iter().collect();
        let params = ModelParams::default();
        let c = GeoGmm::combine(&[&ga, &gb], &weights, 0.5, &params)
            .expect("combine")
            .expect("some weight is positive");
        let w = c.mixture().weights();
        prop_assert!(w.iter().all(|&v| v >= 0.0));
        prop_assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        let t: f64 = c.tokens().values().sum();
        prop_assert!((t - 1.0).abs() < 1e-9);
        prop_assert!(c.tokens().keys().all(|k| weights[k] > 0.0));
    }

    #[test]
    fn trim_is_idempotent(pts in proptest::collection::vec((-180.0f64..180.0, -90.0f64..90.0), 0..30)) {
        let mp = Geom::new(4326, MultiPoint::new(pts.iter().map(|&(x, y)| Point::new(x, y)).collect()))
            .expect("wgs84");
        let once = mp.trim();
        prop_assert!(once.len() <= mp.len());
        prop_assert_eq!(once.trim(), once.clone());
        prop_assert!(once.coords().iter().all(|&(_, y)| y.abs() <= srs::LATMAX));
    }

    #[test]
    fn region_grows_with_coverage(pts in points_strategy(10), lo in 0.05f64..0.5, step in 0.05f64..0.45) {
        let mut g = fitted("x", &pts, 2);
        g.prepare(Some(lo)).expect("prepare");
        let small = g.pred_area().expect("area");
        g.populate_pred_region(lo + step).expect("region");
        let large = g.pred_area().expect("area");
        prop_assert!(large >= small * (1.0 - 1e-9), "{} < {}", large, small);
    }

    #[test]
    fn scale_keeps_order_and_bounds(w in weights_strategy()) {
        let s = scale(&w);
        prop_assert!(s.values().all(|&v| v > 0.0 || w.values().all(|&x| x >= 0.0)));
        for (a, b) in w.keys().zip(w.keys().skip(1)) {
            if w[a] < w[b] {
                prop_assert!(s[a] <= s[b]);
            }
        }
    }

    #[test]
    fn inverse_reverses_order_when_negative(w in weights_strategy()) {
        let inv = inverse(&w);
        if w.values().any(|&v| v < 0.0) {
            let max = inv.values().copied().fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(inv.values().all(|&v| v >= 1.0 - 1e-9));
            for (a, b) in w.keys().zip(w.keys().skip(1)) {
                if w[a] < w[b] {
                    prop_assert!(inv[a] >= inv[b]);
                }
            }
            prop_assert!(max >= 1.0);
        } else {
            prop_assert_eq!(inv, w);
        }
    }

    #[test]
    fn distance_is_symmetric(
        x1 in -179.0f64..179.0, y1 in -80.0f64..80.0,
        x2 in -179.0f64..179.0, y2 in -80.0f64..80.0,
    ) {
        let a = Geom::new(4326, Point::new(x1, y1)).expect("wgs84");
        let b = Geom::new(4326, Point::new(x2, y2)).expect("wgs84");
        for m in [GeodesicMethod::Spherical, GeodesicMethod::Ellipsoidal] {
            let ab = srs::geodesic_distance(&a, &b, m);
            let ba = srs::geodesic_distance(&b, &a, m);
            prop_assert!(ab >= 0.0);
            prop_assert!((ab - ba).abs() < 1e-6);
        }
    }
}
