use mtf_core::candle::Candle;
use mtf_core::config::EvaluationConfig;
use mtf_core::runner::{detect_divergences, run_signal_evaluation, RunRequest};
use mtf_core::source::MemorySource;
use mtf_core::timeframe::Timeframe;
use mtf_data::SqliteCandleSource;
use rusqlite::Connection;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

const M5: i64 = 300_000;
const H1: i64 = 3_600_000;
const H4: i64 = 4 * H1;
const T0: i64 = 1_704_067_200_000;

fn tmp_db_path(tag: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    std::env::temp_dir().join(format!("mtf_eval_{tag}_{nanos}.db"))
}

fn candle(t: i64, c: f64) -> Candle {
    Candle { t, o: c - 0.2, h: c + 0.5, l: c - 0.5, c, v: 100.0 }
}

fn series() -> Vec<(Timeframe, Vec<Candle>)> {
    let base = (0..300)
        .map(|k| {
            let x = k as f64;
            candle(T0 + k * M5, 100.0 + 0.3 * x + 4.0 * (x / 9.0).sin())
        })
        .collect();
    let hourly = (0..260)
        .map(|i| candle(T0 + (i - 240) * H1, 50.0 + 0.2 * i as f64))
        .collect();
    let four_hour = (0..260)
        .map(|j| candle(T0 + (j - 255) * H4, 40.0 + 0.1 * j as f64))
        .collect();
    vec![(Timeframe::M5, base), (Timeframe::H1, hourly), (Timeframe::H4, four_hour)]
}

fn write_db(path: &PathBuf, data: &[(Timeframe, Vec<Candle>)]) {
    let mut conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE candles (
            symbol TEXT NOT NULL, interval TEXT NOT NULL, t INTEGER NOT NULL,
            o REAL, h REAL, l REAL, c REAL, v REAL,
            PRIMARY KEY (symbol, interval, t)
        );",
    )
    .unwrap();
    let tx = conn.transaction().unwrap();
    for (tf, candles) in data {
        for c in candles {
            tx.execute(
                "INSERT INTO candles (symbol, interval, t, o, h, l, c, v) VALUES ('BTC', ?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                (tf.to_string(), c.t, c.o, c.h, c.l, c.c, c.v),
            )
            .unwrap();
        }
    }
    tx.commit().unwrap();
}

#[test]
fn sqlite_and_memory_sources_produce_the_same_run() {
    let data = series();
    let path = tmp_db_path("run");
    write_db(&path, &data);

    let mut mem = MemorySource::new();
    for (tf, candles) in &data {
        mem.insert("BTC", *tf, candles.clone());
    }
    let sqlite = SqliteCandleSource::open(&path).unwrap();

    let cfg = EvaluationConfig::default();
    let req = RunRequest::from_config("BTC", Timeframe::M5, &cfg);
    let from_db = run_signal_evaluation(&sqlite, &req, &cfg).unwrap();
    let from_mem = run_signal_evaluation(&mem, &req, &cfg).unwrap();

    assert_eq!(from_db.candles, from_mem.candles);
    assert_eq!(from_db.events, from_mem.events);
    assert_eq!(from_db.timeline, from_mem.timeline);
    assert_eq!(from_db.summary, from_mem.summary);
    assert!(!from_db.timeline.is_empty());

    let _ = std::fs::remove_file(&path);
}

#[test]
fn unknown_symbol_yields_an_empty_run() {
    let path = tmp_db_path("empty");
    write_db(&path, &series());
    let sqlite = SqliteCandleSource::open(&path).unwrap();

    let cfg = EvaluationConfig::default();
    let req = RunRequest::from_config("DOGE", Timeframe::M5, &cfg);
    let out = run_signal_evaluation(&sqlite, &req, &cfg).unwrap();
    assert!(out.candles.is_empty());
    assert!(out.events.is_empty());
    assert!(out.latest.is_none());

    let divs = detect_divergences(&sqlite, "DOGE", Timeframe::M5, &cfg).unwrap();
    assert!(divs.is_empty());

    let _ = std::fs::remove_file(&path);
}
