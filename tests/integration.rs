//! Integration tests for geoloc.
//!
//! These tests verify end-to-end workflows: fitting token models, locating
//! messages, learning weights and exporting results.

use geo::Point;
use geoloc::estimate::FixedModel;
use geoloc::model::{PipelineModel, MISC_FEATURES};
use geoloc::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

const CITIES: [(&str, f64, f64); 3] = [
    ("paris", 2.35, 48.85),
    ("nairobi", 36.82, -1.29),
    ("denver", -104.99, 39.74),
];

fn wgs84(x: f64, y: f64) -> GeoPoint {
    Geom::new(4326, Point::new(x, y)).expect("wgs84")
}

fn scatter(rng: &mut StdRng, x: f64, y: f64, sd: f64, n: usize) -> Vec<(f64, f64)> {
    let nx = Normal::new(x, sd).expect("normal");
    let ny = Normal::new(y, sd).expect("normal");
    (0..n).map(|_| (nx.sample(rng), ny.sample(rng))).collect()
}

/// Weights tokens by the spread of their points.
fn params() -> ModelParams {
    ModelParams::from_pairs([("weight_feature", "variance")]).expect("params")
}

/// Each city token is observed near its city; "lol" is observed everywhere.
fn corpus(seed: u64) -> Vec<(String, GeoMultiPoint)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::new();
    let mut everywhere = Vec::new();
    for (name, x, y) in CITIES {
        let pts = scatter(&mut rng, x, y, 0.2, 40);
        everywhere.extend(scatter(&mut rng, x, y, 3.0, 15));
        out.push((name.to_string(), GeoMultiPoint::from_coords(4326, &pts).expect("wgs84")));
    }
    out.push(("lol".to_string(), GeoMultiPoint::from_coords(4326, &everywhere).expect("wgs84")));
    out
}

#[test]
fn test_token_model_workflow() {
    let mut model = TokenModel::new(corpus(1), 4326, params()).expect("model");
    model.build().expect("build");

    for (name, x, y) in CITIES {
        let est = model
            .locate(&[name, "lol"], 0.9)
            .expect("locate")
            .expect("estimate");
        let report = EstimateReport::evaluate(&*est, &wgs84(x, y)).expect("report");
        assert!(report.sae < 50.0, "{name}: sae {}", report.sae);
        assert!(report.covers, "{name}: region misses the city");
        assert!(report.pred_area.expect("area") > 0.0);
        assert!(report.explanation[name] > report.explanation.get("lol").copied().unwrap_or(0.0));
    }

    assert!(model.locate(&["unheard", "of"], 0.9).expect("locate").is_none());

    let summary = model.token_summary("paris").expect("summary");
    assert_eq!(summary.point_ct, 40);
    assert!(MISC_FEATURES.iter().all(|f| summary.features.get(f).is_some()));
}

#[test]
fn test_prediction_region_is_calibrated() {
    let mut rng = StdRng::seed_from_u64(7);
    let train = scatter(&mut rng, 10.0, 45.0, 0.5, 200);
    let test = scatter(&mut rng, 10.0, 45.0, 0.5, 200);
    let mp = GeoMultiPoint::from_coords(4326, &train).expect("wgs84");
    let mut model = TokenModel::new([("alps", mp)], 4326, ModelParams::default()).expect("model");
    model.build().expect("build");

    let est = model.locate(&["alps"], 0.9).expect("locate").expect("estimate");
    let covered = test
        .iter()
        .filter(|&&(x, y)| est.covers_p(&wgs84(x, y)))
        .count() as f64
        / test.len() as f64;
    assert!(covered > 0.75 && covered < 0.99, "coverage {covered}");

    let wide = model.locate(&["alps"], 0.99).expect("locate").expect("estimate");
    assert!(wide.pred_area().expect("area") > est.pred_area().expect("area"));
}

#[test]
fn test_optimized_weights_workflow() {
    let params = ModelParams::from_pairs([("weight_f", "sae_opt"), ("opt_reg", "0.1")]).expect("params");
    let mut rng = StdRng::seed_from_u64(3);
    let messages: Vec<Message> = CITIES
        .iter()
        .flat_map(|&(name, x, y)| {
            scatter(&mut rng, x, y, 0.2, 5)
                .into_iter()
                .map(move |(px, py)| Message::new([name, "lol"], wgs84(px, py)))
        })
        .collect();
    let mut model = TokenModel::new(corpus(2), 4326, params)
        .expect("model")
        .with_messages(messages)
        .expect("messages");
    model.build().expect("build");

    let w = model.token_weights();
    for (name, _, _) in CITIES {
        assert!(w[name] > w["lol"], "{name}: {w:?}");
    }
}

#[test]
fn test_projected_model_exports_wgs84() {
    let mut model = TokenModel::new(corpus(4), 54009, params()).expect("model");
    model.build().expect("build");
    assert_eq!(model.srid(), 54009);

    let est = model.locate(&["denver"], 0.8).expect("locate").expect("estimate");
    assert_eq!(est.srid(), 54009);
    let gj = est.to_geojson().expect("geojson");
    let lon = gj["features"][0]["geometry"]["coordinates"][0].as_f64().expect("lon");
    assert!((lon + 104.99).abs() < 0.5, "lon {lon}");

    let report = EstimateReport::evaluate(&*est, &wgs84(-104.99, 39.74)).expect("report");
    assert!(report.sae < 50.0);
}

#[test]
fn test_geofile_export() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut model = TokenModel::new(corpus(5), 4326, params()).expect("model");
    model.build().expect("build");
    let base = dir.path().join("nairobi");
    let written = model
        .dump_geofiles(base.to_str().expect("utf8"), 32, "nairobi")
        .expect("dump");
    let names: Vec<String> = written
        .iter()
        .map(|p| p.file_name().expect("name").to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        [
            "nairobi.points.geojson",
            "nairobi.pr.geojson",
            "nairobi.png",
            "nairobi.pgw",
            "nairobi.prj"
        ]
    );
    let points: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&written[0]).expect("read")).expect("json");
    assert_eq!(points["features"].as_array().expect("features").len(), 40);
}

#[test]
fn test_model_variants_agree_on_single_token() {
    let corpus = corpus(6);
    let mut message = MessageModel::new(corpus.clone(), 4326, ModelParams::default()).expect("model");
    let mut all = AllPointsModel::new(corpus.clone(), 4326, ModelParams::default()).expect("model");
    message.build().expect("build");
    all.build().expect("build");

    let est = message.locate(&["paris"], 0.9).expect("locate").expect("estimate");
    assert!(est.sae(&wgs84(2.35, 48.85)) < 50.0);

    // the global mixture knows nothing of tokens
    let a = all.locate(&["paris"], 0.9).expect("locate").expect("estimate");
    let b = all.locate(&["denver"], 0.9).expect("locate").expect("estimate");
    assert_eq!(a.best_point(), b.best_point());

    let fixed = FixedModel::new(4326, &ModelParams::default())
        .expect("fixed")
        .with_fail_interval(0);
    let models: Vec<Box<dyn LocationModel>> = vec![Box::new(message), Box::new(fixed)];
    let mut pipeline = PipelineModel::new(models).expect("pipeline");
    pipeline.build().expect("build");
    let est = pipeline.locate(&["unknown"], 0.5).expect("locate").expect("fixed fallback");
    assert!(est.covers_p(&wgs84(-73.99, 40.73)));
}

#[test]
fn test_params_from_json() {
    let p = ModelParams::from_json(r#"{"gmm_fit_f": "exhaustive", "component_ct_max": 4, "seed": 9}"#)
        .expect("params");
    assert_eq!(p.component_ct_max, 4);
    assert!(ModelParams::from_json(r#"{"nope": 1}"#).is_err());

    let mut rng = StdRng::seed_from_u64(8);
    let mut pts = scatter(&mut rng, 0.0, 0.0, 0.3, 30);
    pts.extend(scatter(&mut rng, 8.0, 8.0, 0.3, 30));
    let mp = GeoMultiPoint::from_coords(4326, &pts).expect("wgs84");
    let g = GeoGmm::fit_token("two", &mp, &p).expect("fit");
    assert!(g.n_components() >= 2 && g.n_components() < 4);
}
