//! Self-telemetry flush cadence through the full pipeline.

use super::common::{pipeline, Record};
use std::collections::HashSet;
use std::time::Duration;

/// Big enough for a whole flush window per batch; batches hand off about
/// every other window.
const WINDOW_PACKET: u32 = 8000;

#[test]
fn test_stats_flush_windows_reach_the_sink() {
    let p = pipeline(WINDOW_PACKET, Duration::from_millis(300));
    p.connect(1);

    // ~1 s of paced ticking crosses several flush windows
    for _ in 0..20 {
        p.tick();
        std::thread::sleep(Duration::from_millis(50));
    }
    let records = p.recv_until_silence();
    let stats: Vec<&Record> = records
        .iter()
        .filter(|r| r.measurement.starts_with("stats_"))
        .collect();

    // Every accumulator shows up
    for name in [
        "interval",
        "duration",
        "influx_persist",
        "influx_enqueue",
        "zmq_enqueue",
    ] {
        assert!(
            stats
                .iter()
                .any(|r| r.measurement == format!("stats_{name}_count")),
            "missing counts for {name}"
        );
        assert!(
            stats
                .iter()
                .any(|r| r.measurement == format!("stats_{name}_alltimemax")),
            "missing all-time max for {name}"
        );
    }

    // At least two distinct flush windows were delivered
    let flush_stamps: HashSet<i64> = stats
        .iter()
        .filter(|r| r.measurement == "stats_interval_count")
        .map(|r| r.timestamp_us)
        .collect();
    assert!(
        flush_stamps.len() >= 2,
        "expected >= 2 flush windows, saw {}",
        flush_stamps.len()
    );

    // Paced ticks produced interval observations, so an average appears
    assert!(stats.iter().any(|r| r.measurement == "stats_interval_avg"));

    // All-time maxima never decrease across windows
    let mut ordered: Vec<(i64, u64)> = stats
        .iter()
        .filter(|r| r.measurement == "stats_interval_alltimemax")
        .map(|r| (r.timestamp_us, r.value.parse::<u64>().unwrap()))
        .collect();
    ordered.sort_unstable();
    assert!(
        ordered.windows(2).all(|w| w[0].1 <= w[1].1),
        "all-time max decreased: {ordered:?}"
    );

    p.shutdown();
}
