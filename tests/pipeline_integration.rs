/// Integration tests for the batch storm pipeline
///
/// These tests verify:
/// 1. CSV export → memory store → storms → named, volume-converted tables
/// 2. Parallel and sequential aggregation write identical artifacts
/// 3. run_summary.json describes the threshold sweep
/// 4. The same run against PostgreSQL matches the offline run (ignored)
///
/// Prerequisites for the ignored tests:
/// - PostgreSQL running, DATABASE_URL set in .env
///
/// Run with: cargo test --test pipeline_integration -- --include-ignored --test-threads=1

use storm_events::analysis::aggregation::CancelFlag;
use storm_events::config::{parse_config, PipelineConfig};
use storm_events::export::read_table_file;
use storm_events::gauges::{load_catalog, GaugeCatalog};
use storm_events::ingest::load_observations;
use storm_events::pipeline::{run_pipeline, RunOptions, RunSummary, SUMMARY_FILE};
use storm_events::store::{MemoryObservationStore, ObservationStore, PgObservationStore};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const CATALOG: &str = r#"
[[gauge]]
code = "4594"
name = "Driftwood 4 SSE"
role = "rain"

[[gauge]]
code = "3991"
name = "Jollyville 2 SW"
role = "rain"

[[gauge]]
code = "3963"
name = "Mansfield Dam"
role = "lake"
volume_table = "tables/Travis.txt"

[[gauge]]
code = "1995"
name = "Buchanan Dam"
role = "lake"
volume_table = "tables/Buchanan.txt"

[[gauge]]
code = "2958"
name = "Wirtz Dam"
role = "lake"
"#;

const TRAVIS: &str = "ft-MSL,acre-feet\n660.5,1057500\n660.9,1067500\n661.0,1070000\n";
const BUCHANAN: &str = "ft-MSL,acre-feet\n1017.9,877500\n1018.0,880000\n";

/// Fourteen hours, two storms under a ±1 h window at threshold 1.0:
/// moving sums rise past 1.0 at 02:00 (closing 04:00) and 08:00 (closing 11:00).
const OBSERVATIONS: &str = "collection_time,gauge,sensor,value
2015-10-30 00:00:00,4594,rain,0.0
2015-10-30 01:00:00,4594,rain,0.0
2015-10-30 02:00:00,4594,rain,0.8
2015-10-30 02:00:00,3963,lake_level,660.5
2015-10-30T03:00:00Z,4594,rain,0.6
2015-10-30 03:00:00,3991,rain,0.2
2015-10-30 04:00:00,4594,rain,0.0
2015-10-30 04:00:00,3963,lake_level,660.9
2015-10-30 04:00:00,2958,lake_level,825.3
2015-10-30 05:00:00,4594,rain,0.0
2015-10-30 06:00:00,4594,rain,0.0
2015-10-30 07:00:00,4594,rain,0.0
2015-10-30 08:00:00,4594,rain,0.3
2015-10-30 08:00:00,3991,rain,\u{a0}
2015-10-30 09:00:00,4594,rain,1.2
2015-10-30 09:00:00,3991,rain,---
2015-10-30 09:00:00,3963,lake_level,661.0
2015-10-30 10:00:00,4594,rain,0.1
2015-10-30 10:00:00,1995,lake_level,1018.04
2015-10-30 11:00:00,4594,rain,0.0
2015-10-30 12:00:00,4594,rain,0.0
2015-10-30 13:00:00,4594,rain,0.0
";

const STORMS_TOML: &str = "
[window]
leading_hours = 1
trailing_hours = 1

[detection]
thresholds = [1.0, 5.0]

[aggregation]
workers = 3
progress_every = 1
";

struct Workspace {
    dir: tempfile::TempDir,
    catalog: GaugeCatalog,
    config: PipelineConfig,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::create_dir_all(dir.path().join("tables")).unwrap();
        fs::write(dir.path().join("tables/Travis.txt"), TRAVIS).unwrap();
        fs::write(dir.path().join("tables/Buchanan.txt"), BUCHANAN).unwrap();
        fs::write(dir.path().join("gauges.toml"), CATALOG).unwrap();
        fs::write(dir.path().join("export.csv"), OBSERVATIONS).unwrap();

        let catalog = load_catalog(dir.path().join("gauges.toml")).expect("catalog should load");
        let config = parse_config(STORMS_TOML, Path::new("storms.toml")).expect("config should parse");
        Workspace { dir, catalog, config }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn memory_store(&self) -> MemoryObservationStore {
        let observations = load_observations(self.path("export.csv"), &self.config.store).expect("export should parse");
        MemoryObservationStore::new(observations)
    }

    fn run<S: ObservationStore + 'static>(&self, store: S, out: &str, config: &PipelineConfig) -> RunSummary {
        let options = RunOptions {
            output_dir: self.path(out),
            moving_sum_cache: None,
            write_raw: true,
        };
        run_pipeline(config, &self.catalog, Arc::new(store), &options, CancelFlag::new()).expect("pipeline run")
    }
}

fn approx(actual: Option<f64>, expected: f64) {
    let actual = actual.expect("expected a value, got absent");
    assert!((actual - expected).abs() < 1e-9, "expected {}, got {}", expected, actual);
}

#[test]
fn test_offline_run_produces_named_volume_tables() {
    let ws = Workspace::new();
    let summary = ws.run(ws.memory_store(), "out", &ws.config);

    assert_eq!(summary.rain_rows, 14);
    assert_eq!(summary.thresholds[0].storms, 2);
    assert_eq!(summary.thresholds[1].storms, 0);

    let rain = read_table_file(ws.path("out/rain_1_1_thres1.csv")).unwrap();
    assert_eq!(rain.len(), 2);
    assert_eq!(rain.column_names(), vec!["Driftwood 4 SSE", "Jollyville 2 SW"]);
    assert_eq!(rain.start_time[0].to_rfc3339(), "2015-10-30T02:00:00+00:00");
    assert_eq!(rain.end_time[0].to_rfc3339(), "2015-10-30T04:00:00+00:00");
    assert_eq!(rain.start_time[1].to_rfc3339(), "2015-10-30T08:00:00+00:00");
    assert_eq!(rain.end_time[1].to_rfc3339(), "2015-10-30T11:00:00+00:00");
    approx(rain.value(0, "Driftwood 4 SSE"), 1.4);
    approx(rain.value(1, "Driftwood 4 SSE"), 1.6);
    approx(rain.value(0, "Jollyville 2 SW"), 0.2);
    assert_eq!(rain.value(1, "Jollyville 2 SW"), None, "no-data markers must not sum to zero");

    let lake = read_table_file(ws.path("out/lake_1_1_thres1.csv")).unwrap();
    assert_eq!(
        lake.column_names(),
        vec!["Mansfield Dam_min", "Mansfield Dam_max", "Buchanan Dam_min", "Buchanan Dam_max"],
        "Wirtz has no volume table and is dropped"
    );
    assert_eq!(lake.value(0, "Mansfield Dam_min"), Some(1057500.0));
    assert_eq!(lake.value(0, "Mansfield Dam_max"), Some(1067500.0));
    assert_eq!(lake.value(1, "Mansfield Dam_min"), Some(1070000.0));
    assert_eq!(lake.value(0, "Buchanan Dam_max"), None);
    assert_eq!(lake.value(1, "Buchanan Dam_max"), Some(880000.0), "1018.04 ft rounds to 1018.0");

    let raw_lake = read_table_file(ws.path("out/raw_lake_1_1_thres1.csv")).unwrap();
    assert_eq!(raw_lake.value(0, "2958_min"), Some(825.3));
    assert_eq!(raw_lake.value(1, "1995_max"), Some(1018.04));
}

#[test]
fn test_parallel_and_sequential_artifacts_match() {
    let ws = Workspace::new();
    let mut sequential = ws.config.clone();
    sequential.aggregation.workers = 1;

    ws.run(ws.memory_store(), "parallel", &ws.config);
    ws.run(ws.memory_store(), "sequential", &sequential);

    for name in ["rain_1_1_thres1.csv", "lake_1_1_thres1.csv", "raw_rain_1_1_thres1.csv", "rain_1_1_thres5.csv"] {
        let parallel = fs::read_to_string(ws.path("parallel").join(name)).unwrap();
        let sequential = fs::read_to_string(ws.path("sequential").join(name)).unwrap();
        assert_eq!(parallel, sequential, "{} differs between worker counts", name);
    }
}

#[test]
fn test_summary_manifest() {
    let ws = Workspace::new();
    ws.run(ws.memory_store(), "out", &ws.config);

    let manifest = fs::read_to_string(ws.path("out").join(SUMMARY_FILE)).unwrap();
    let json: serde_json::Value = serde_json::from_str(&manifest).unwrap();
    assert_eq!(json["leading_hours"], 1);
    assert_eq!(json["trailing_hours"], 1);
    assert_eq!(json["rain_gauges"], 2);
    assert_eq!(json["lake_gauges"], 3);
    assert_eq!(json["thresholds"][0]["storms"], 2);
    assert_eq!(json["thresholds"][1]["lake_file"], "lake_1_1_thres5.csv");
    assert_eq!(json["thresholds"][0]["raw_rain_file"], "raw_rain_1_1_thres1.csv");
}

#[test]
#[ignore] // Only run when database is available
fn test_postgres_run_matches_offline_run() {
    let ws = Workspace::new();
    let mut config = ws.config.clone();
    config.store.table = "storm_events_it_hydromet".to_string();

    let observations = load_observations(ws.path("export.csv"), &config.store).unwrap();
    let client = storm_events::db::connect_with_validation().expect("DATABASE_URL must point at a test database");
    let loader = PgObservationStore::from_clients(vec![client], &config.store);
    loader.ensure_table().unwrap();
    loader.insert_observations(&observations).unwrap();

    let store = PgObservationStore::connect(3, &config.store).expect("connect");
    let pg = ws.run(store, "pg", &config);
    let offline = ws.run(ws.memory_store(), "offline", &config);
    assert_eq!(pg.thresholds, offline.thresholds);

    let pg_rain = read_table_file(ws.path("pg/rain_1_1_thres1.csv")).unwrap();
    let offline_rain = read_table_file(ws.path("offline/rain_1_1_thres1.csv")).unwrap();
    assert_eq!(pg_rain.start_time, offline_rain.start_time);
    assert_eq!(pg_rain.value(1, "Jollyville 2 SW"), None);
}
